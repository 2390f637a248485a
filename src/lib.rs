pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod domain;
pub mod models;
pub mod security;

// Re-export commonly used types
pub use api::{create_router, AppState};

pub use config::AppConfig;

pub use db::{create_lazy_pool, create_pool, health_check, run_migrations, with_retry, DatabaseError};

pub use domain::{
    check_redemption, create_claim, credit_scan, preview_scan, recalculate_points, validate_claim, ClaimReceipt,
    RecalculationMode, RecalculationReport, ScanCredit,
};
