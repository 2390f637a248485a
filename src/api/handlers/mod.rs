// Thin handlers: extract, call the domain layer, shape the response

pub mod admin_catalog;
pub mod admin_claims;
pub mod admin_config;
pub mod admin_dashboard;
pub mod admin_orders;
pub mod admin_users;
pub mod auth;
pub mod internal;
pub mod rewards;
pub mod scan;
pub mod user;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

/// `(page, limit, offset)` from optional 1-based query parameters
pub(crate) fn page_window(page: Option<i64>, limit: Option<i64>) -> (i64, i64, i64) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    (page, limit, (page - 1) * limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_window() {
        assert_eq!(page_window(None, None), (1, 20, 0));
        assert_eq!(page_window(Some(3), Some(10)), (3, 10, 20));
        assert_eq!(page_window(Some(0), Some(1000)), (1, 100, 0));
        assert_eq!(page_window(Some(-2), Some(0)), (1, 1, 0));
    }
}
