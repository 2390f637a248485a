use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Account role stored as TEXT in `users.role`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "USER" => Some(Role::User),
            "ADMIN" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reward claim lifecycle
///
/// `PENDING -> APPROVED | REJECTED`, `APPROVED -> COMPLETED`. Transitions are
/// driven by admins only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClaimStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Pending => "PENDING",
            ClaimStatus::Approved => "APPROVED",
            ClaimStatus::Rejected => "REJECTED",
            ClaimStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(ClaimStatus::Pending),
            "APPROVED" => Some(ClaimStatus::Approved),
            "REJECTED" => Some(ClaimStatus::Rejected),
            "COMPLETED" => Some(ClaimStatus::Completed),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: ClaimStatus) -> bool {
        matches!(
            (self, next),
            (ClaimStatus::Pending, ClaimStatus::Approved)
                | (ClaimStatus::Pending, ClaimStatus::Rejected)
                | (ClaimStatus::Approved, ClaimStatus::Completed)
        )
    }
}

/// `users` table
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub email: String,
    pub cedula: Option<String>,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub role: String,
    pub puntos: i64,
    pub puntos_historicos: i64,
    pub profile_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn role(&self) -> Role {
        Role::parse(&self.role).unwrap_or(Role::User)
    }

    pub fn is_admin(&self) -> bool {
        self.role() == Role::Admin
    }
}

/// `orders` table
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    pub scan_code: String,
    pub customer_name: Option<String>,
    pub notes: Option<String>,
    pub total_amount: Decimal,
    pub total_points: i64,
    pub is_scanned: bool,
    pub scanned_at: Option<DateTime<Utc>>,
    pub scanned_by: Option<i64>,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// `order_items` table; product fields are a snapshot taken at order creation
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: Option<i64>,
    pub product_name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
}

/// An order together with its line items
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// `qr_scans` audit table (append-only)
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrScan {
    pub id: i64,
    pub order_id: Option<i64>,
    pub scan_code: String,
    pub user_id: i64,
    pub points_earned: i64,
    pub scanned_at: DateTime<Utc>,
}

/// `products` table
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock: Option<i32>,
    pub image_url: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `rewards` table
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub points_cost: i64,
    pub stock: Option<i32>,
    pub image_url: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `reward_claims` table
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardClaim {
    pub id: i64,
    pub user_id: i64,
    pub reward_id: i64,
    pub points_spent: i64,
    pub status: String,
    pub admin_notes: Option<String>,
    pub validated_by: Option<i64>,
    pub validated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RewardClaim {
    pub fn status(&self) -> Option<ClaimStatus> {
        ClaimStatus::parse(&self.status)
    }
}

/// Claim joined with reward and user names for listings
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimDetail {
    pub id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub user_email: String,
    pub reward_id: i64,
    pub reward_name: String,
    pub points_spent: i64,
    pub status: String,
    pub admin_notes: Option<String>,
    pub validated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// `sessions` table, written by the OAuth session library
#[derive(Debug, Clone, FromRow)]
pub struct SessionRecord {
    pub session_token: String,
    pub user_id: i64,
    pub expires: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_status_transitions() {
        use ClaimStatus::*;

        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Approved.can_transition_to(Completed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Pending));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Completed.can_transition_to(Pending));
    }

    #[test]
    fn test_status_and_role_codes() {
        assert_eq!(ClaimStatus::parse("APPROVED"), Some(ClaimStatus::Approved));
        assert_eq!(ClaimStatus::parse("approved"), None);
        assert_eq!(ClaimStatus::Completed.as_str(), "COMPLETED");

        assert_eq!(Role::parse("ADMIN"), Some(Role::Admin));
        assert_eq!(Role::parse("root"), None);
        assert_eq!(Role::User.to_string(), "USER");
    }
}
