use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::models::records::{OrderWithItems, Reward, User};

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

/// Fields every public form carries for the abuse heuristics
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSignals {
    /// Honeypot, hidden from humans
    #[serde(default)]
    pub website: Option<String>,
    /// Epoch millis when the form was rendered
    #[serde(default)]
    pub form_started_at: Option<i64>,
    #[serde(default)]
    pub fingerprint: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub cedula: Option<String>,
    #[serde(default)]
    pub captcha_token: Option<String>,
    #[serde(flatten)]
    pub signals: FormSignals,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(flatten)]
    pub signals: FormSignals,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteProfileRequest {
    pub cedula: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub success: bool,
    pub user: User,
}

/// Body sent by the OAuth session library after a successful provider login
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthSessionSyncRequest {
    pub email: String,
    pub name: String,
    pub session_token: String,
    pub expires: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Scanning
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResponse {
    pub success: bool,
    pub message: String,
    pub points_earned: i64,
    pub new_total_points: i64,
    pub points_warning: bool,
    pub order: OrderWithItems,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanPreviewResponse {
    pub success: bool,
    pub already_scanned: bool,
    pub order: OrderWithItems,
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ConfigUpdateRequest {
    pub configs: HashMap<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub success: bool,
    pub configs: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityKeyRequest {
    #[serde(default)]
    pub security_key: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalculateRequest {
    #[serde(default)]
    pub old_points_per_peso: Value,
    #[serde(default)]
    pub new_points_per_peso: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalculationResponse {
    pub success: bool,
    pub message: String,
    pub recalculated_users: u64,
    pub total_users: u64,
    pub failed_users: u64,
    pub multiplier: f64,
    pub old_ratio: f64,
    pub new_ratio: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicConfigResponse {
    pub success: bool,
    pub system_name: String,
    pub welcome_message: String,
    pub points_per_peso: Decimal,
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub stock: Option<i32>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub points_cost: i64,
    #[serde(default)]
    pub stock: Option<i32>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}

/// Outcome of a catalog delete: rows still referenced are only deactivated
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub success: bool,
    pub deleted: bool,
    pub deactivated: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct RewardListResponse {
    pub success: bool,
    pub rewards: Vec<Reward>,
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    /// Signed adjustment applied to the spendable balance
    #[serde(default)]
    pub points_adjustment: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub success: bool,
    pub users: Vec<User>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemInput {
    #[serde(default)]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub unit_price: Option<Decimal>,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub items: Vec<OrderItemInput>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub success: bool,
    pub order: OrderWithItems,
    /// Payload to embed in the printed QR code
    pub qr_payload: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderListQuery {
    #[serde(default)]
    pub scanned: Option<bool>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBackupRequest {
    #[serde(default)]
    pub older_than_days: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBackupResponse {
    pub success: bool,
    pub exported_at: DateTime<Utc>,
    pub deleted_orders: u64,
    pub orders: Vec<OrderWithItems>,
}

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct ClaimListQuery {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateClaimRequest {
    pub status: String,
    #[serde(default)]
    pub admin_notes: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimCreatedResponse {
    pub success: bool,
    pub message: String,
    pub claim_id: i64,
    pub points_spent: i64,
    pub remaining_points: i64,
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_users: i64,
    pub total_orders: i64,
    pub scanned_orders: i64,
    pub pending_claims: i64,
    pub points_issued: i64,
    pub points_outstanding: i64,
}

/// Generic `{ success, message }` body
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_register_request_reads_form_signals() {
        let body = json!({
            "email": "ana@example.com",
            "password": "secreto123",
            "name": "Ana",
            "website": "http://spam.example",
            "formStartedAt": 1700000000000i64
        });

        let request: RegisterRequest = serde_json::from_value(body).unwrap();
        assert_eq!(request.signals.website.as_deref(), Some("http://spam.example"));
        assert_eq!(request.signals.form_started_at, Some(1700000000000));
        assert!(request.signals.fingerprint.is_none());
        assert!(request.cedula.is_none());
    }

    #[test]
    fn test_order_item_input_accepts_numeric_price() {
        let item: OrderItemInput = serde_json::from_value(json!({
            "productName": "Café",
            "unitPrice": 12.5,
            "quantity": 2
        }))
        .unwrap();

        assert_eq!(item.unit_price, Some(Decimal::new(125, 1)));
        assert_eq!(item.quantity, 2);
    }
}
