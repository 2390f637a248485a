//! Typed view over the `system_config` key/value table.

use rust_decimal::prelude::*;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::info;

use super::DomainError;
use crate::db;

pub const POINTS_PER_PESO: &str = "pointsPerPeso";
pub const POINTS_LIMIT: &str = "pointsLimit";
pub const CONFIG_SECURITY_KEY: &str = "configSecurityKey";
pub const SYSTEM_NAME: &str = "systemName";
pub const WELCOME_MESSAGE: &str = "welcomeMessage";

/// Keys the admin screen may write
pub const CONFIG_KEYS: [&str; 5] = [
    POINTS_PER_PESO,
    POINTS_LIMIT,
    CONFIG_SECURITY_KEY,
    SYSTEM_NAME,
    WELCOME_MESSAGE,
];

#[derive(Debug, Clone, PartialEq)]
pub struct SystemSettings {
    pub points_per_peso: Decimal,
    /// Balance above which a credit raises a warning; 0 disables it
    pub points_limit: i64,
    pub security_key: String,
    pub system_name: String,
    pub welcome_message: String,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            points_per_peso: Decimal::new(1, 1),
            points_limit: 10_000,
            security_key: "0000".to_string(),
            system_name: "Programa de Puntos".to_string(),
            welcome_message: "Bienvenido".to_string(),
        }
    }
}

impl SystemSettings {
    /// Build from raw rows, falling back to defaults for missing or unparsable values
    pub fn from_map(raw: &HashMap<String, String>) -> Self {
        let defaults = Self::default();

        Self {
            points_per_peso: raw
                .get(POINTS_PER_PESO)
                .and_then(|v| Decimal::from_str(v.trim()).ok())
                .filter(|d| d.is_sign_positive() && !d.is_zero())
                .unwrap_or(defaults.points_per_peso),
            points_limit: raw
                .get(POINTS_LIMIT)
                .and_then(|v| v.trim().parse::<i64>().ok())
                .unwrap_or(defaults.points_limit),
            security_key: raw
                .get(CONFIG_SECURITY_KEY)
                .cloned()
                .unwrap_or(defaults.security_key),
            system_name: raw.get(SYSTEM_NAME).cloned().unwrap_or(defaults.system_name),
            welcome_message: raw
                .get(WELCOME_MESSAGE)
                .cloned()
                .unwrap_or(defaults.welcome_message),
        }
    }

    pub fn exceeds_points_limit(&self, balance: i64) -> bool {
        self.points_limit > 0 && balance > self.points_limit
    }
}

pub async fn load_settings(pool: &PgPool) -> Result<SystemSettings, DomainError> {
    let raw = db::settings::load_config(pool).await?;
    Ok(SystemSettings::from_map(&raw))
}

/// Raw key/value pairs for the admin screen, with the security key masked
pub async fn load_admin_view(pool: &PgPool) -> Result<HashMap<String, String>, DomainError> {
    let mut raw = db::settings::load_config(pool).await?;
    if raw.contains_key(CONFIG_SECURITY_KEY) {
        raw.insert(CONFIG_SECURITY_KEY.to_string(), "****".to_string());
    }
    Ok(raw)
}

/// Validate and upsert the submitted keys. Unknown keys are rejected as a whole.
pub async fn update_settings(
    pool: &PgPool,
    configs: &HashMap<String, Value>,
) -> Result<Vec<String>, DomainError> {
    if configs.is_empty() {
        return Err(DomainError::Validation("No se enviaron configuraciones".to_string()));
    }

    let mut entries = Vec::with_capacity(configs.len());
    for (key, value) in configs {
        entries.push((key.clone(), normalize_config_value(key, value)?));
    }
    entries.sort();

    db::settings::upsert_config(pool, &entries).await?;

    let keys: Vec<String> = entries.into_iter().map(|(k, _)| k).collect();
    info!(?keys, "System configuration updated");
    Ok(keys)
}

/// Check a value against the rules for its key and return the string to store
pub fn normalize_config_value(key: &str, value: &Value) -> Result<String, DomainError> {
    let raw = value_as_string(value)
        .ok_or_else(|| DomainError::Validation(format!("{}: valor inválido", key)))?;

    match key {
        POINTS_PER_PESO => Ok(parse_positive_decimal(&raw, key)?.normalize().to_string()),
        POINTS_LIMIT => match raw.trim().parse::<i64>() {
            Ok(limit) if limit >= 0 => Ok(limit.to_string()),
            _ => Err(DomainError::Validation(format!(
                "{}: debe ser un entero mayor o igual a 0",
                key
            ))),
        },
        CONFIG_SECURITY_KEY => {
            if is_valid_security_key_format(&raw) {
                Ok(raw)
            } else {
                Err(DomainError::Validation(
                    "La clave de seguridad debe tener exactamente 4 dígitos".to_string(),
                ))
            }
        }
        SYSTEM_NAME | WELCOME_MESSAGE => {
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.chars().count() > 500 {
                Err(DomainError::Validation(format!(
                    "{}: debe tener entre 1 y 500 caracteres",
                    key
                )))
            } else {
                Ok(trimmed.to_string())
            }
        }
        other => Err(DomainError::Validation(format!(
            "Clave de configuración desconocida: {}",
            other
        ))),
    }
}

/// A security key is exactly four ASCII digits
pub fn is_valid_security_key_format(key: &str) -> bool {
    key.len() == 4 && key.bytes().all(|b| b.is_ascii_digit())
}

/// Numbers and strings are accepted; everything else is not a config value
pub fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parse a strictly positive ratio from a JSON number or numeric string
pub fn parse_positive_ratio(value: &Value, field: &str) -> Result<Decimal, DomainError> {
    let raw = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => {
            return Err(DomainError::Validation(format!(
                "{}: debe ser un número positivo",
                field
            )))
        }
    };
    parse_positive_decimal(&raw, field)
}

fn parse_positive_decimal(raw: &str, field: &str) -> Result<Decimal, DomainError> {
    let trimmed = raw.trim();
    let parsed = Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| DomainError::Validation(format!("{}: debe ser un número positivo", field)))?;

    if parsed <= Decimal::ZERO {
        return Err(DomainError::Validation(format!(
            "{}: debe ser un número positivo",
            field
        )));
    }
    Ok(parsed)
}

/// Points granted for a purchase amount: `floor(amount × ratio)`
pub fn points_for_amount(amount: Decimal, points_per_peso: Decimal) -> Result<i64, DomainError> {
    amount
        .checked_mul(points_per_peso)
        .and_then(|points| points.floor().to_i64())
        .map(|points| points.max(0))
        .ok_or_else(|| DomainError::Validation("Los puntos de la orden exceden el máximo permitido".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_security_key_format() {
        assert!(is_valid_security_key_format("1234"));
        assert!(is_valid_security_key_format("0000"));

        assert!(!is_valid_security_key_format("12a4"));
        assert!(!is_valid_security_key_format("123"));
        assert!(!is_valid_security_key_format("12345"));
        assert!(!is_valid_security_key_format(""));
        // Non-ASCII digits are not accepted
        assert!(!is_valid_security_key_format("١٢٣٤"));
    }

    #[test]
    fn test_points_for_amount() {
        assert_eq!(points_for_amount(dec!(1000), dec!(0.1)).unwrap(), 100);
        assert_eq!(points_for_amount(dec!(999.99), dec!(0.1)).unwrap(), 99);
        assert_eq!(points_for_amount(dec!(0), dec!(0.1)).unwrap(), 0);
        assert_eq!(points_for_amount(dec!(250), dec!(2)).unwrap(), 500);
    }

    #[test]
    fn test_points_for_amount_overflow_is_an_error() {
        assert!(matches!(
            points_for_amount(Decimal::MAX, dec!(2)),
            Err(DomainError::Validation(_))
        ));
        // fits in a Decimal, not in an i64
        assert!(matches!(
            points_for_amount(dec!(9999999999.99), dec!(1000000000000)),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn test_parse_positive_ratio() {
        assert_eq!(parse_positive_ratio(&json!(0.5), "r").unwrap(), dec!(0.5));
        assert_eq!(parse_positive_ratio(&json!("2"), "r").unwrap(), dec!(2));

        assert!(parse_positive_ratio(&json!(0), "r").is_err());
        assert!(parse_positive_ratio(&json!(-1), "r").is_err());
        assert!(parse_positive_ratio(&json!("abc"), "r").is_err());
        assert!(parse_positive_ratio(&Value::Null, "r").is_err());
        assert!(parse_positive_ratio(&json!(true), "r").is_err());
    }

    #[test]
    fn test_normalize_config_value() {
        assert_eq!(normalize_config_value(POINTS_PER_PESO, &json!(0.25)).unwrap(), "0.25");
        assert_eq!(normalize_config_value(POINTS_LIMIT, &json!("5000")).unwrap(), "5000");
        assert_eq!(normalize_config_value(SYSTEM_NAME, &json!("  Tienda  ")).unwrap(), "Tienda");
        assert_eq!(normalize_config_value(CONFIG_SECURITY_KEY, &json!("4821")).unwrap(), "4821");

        assert!(normalize_config_value(POINTS_LIMIT, &json!(-3)).is_err());
        assert!(normalize_config_value(CONFIG_SECURITY_KEY, &json!("12a4")).is_err());
        assert!(normalize_config_value("unknownKey", &json!("x")).is_err());
        assert!(normalize_config_value(SYSTEM_NAME, &json!({"a": 1})).is_err());
    }

    #[test]
    fn test_settings_from_map_falls_back_to_defaults() {
        let mut raw = HashMap::new();
        raw.insert(POINTS_PER_PESO.to_string(), "not-a-number".to_string());
        raw.insert(POINTS_LIMIT.to_string(), "2500".to_string());
        raw.insert(SYSTEM_NAME.to_string(), "Café Central".to_string());

        let settings = SystemSettings::from_map(&raw);
        assert_eq!(settings.points_per_peso, dec!(0.1));
        assert_eq!(settings.points_limit, 2500);
        assert_eq!(settings.system_name, "Café Central");
        assert_eq!(settings.security_key, "0000");
    }

    #[test]
    fn test_points_limit_warning() {
        let settings = SystemSettings {
            points_limit: 100,
            ..SystemSettings::default()
        };
        assert!(!settings.exceeds_points_limit(100));
        assert!(settings.exceeds_points_limit(101));

        let disabled = SystemSettings {
            points_limit: 0,
            ..SystemSettings::default()
        };
        assert!(!disabled.exceeds_points_limit(1_000_000));
    }
}
