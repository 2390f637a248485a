use axum::{extract::State, Json};
use serde::Serialize;

use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::{AdminUser, ApiJson, ApiPath, ApiQuery};
use crate::api::state::AppState;
use crate::db;
use crate::domain;
use crate::models::{ClaimDetail, ClaimListQuery, ClaimStatus, RewardClaim, ValidateClaimRequest};

#[derive(Serialize)]
pub struct ClaimListResponse {
    success: bool,
    claims: Vec<ClaimDetail>,
}

#[derive(Serialize)]
pub struct ClaimResponse {
    success: bool,
    claim: RewardClaim,
}

fn parse_status(raw: &str) -> Result<ClaimStatus, ApiError> {
    ClaimStatus::parse(&raw.trim().to_uppercase())
        .ok_or_else(|| ApiError::Validation(format!("status: estado desconocido {}", raw)))
}

pub async fn list_claims(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    ApiQuery(query): ApiQuery<ClaimListQuery>,
) -> ApiResult<Json<ClaimListResponse>> {
    let status = query.status.as_deref().map(parse_status).transpose()?;
    let claims = db::claims::list_claims(&state.pool, status).await?;
    Ok(Json(ClaimListResponse { success: true, claims }))
}

#[tracing::instrument(skip(state, admin, request), fields(admin_id = admin.user_id))]
pub async fn validate_claim(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(claim_id): ApiPath<i64>,
    ApiJson(request): ApiJson<ValidateClaimRequest>,
) -> ApiResult<Json<ClaimResponse>> {
    let next = parse_status(&request.status)?;
    let notes = request.admin_notes.as_deref().map(str::trim).filter(|n| !n.is_empty());

    let claim = domain::validate_claim(&state.pool, claim_id, next, admin.user_id, notes).await?;
    Ok(Json(ClaimResponse { success: true, claim }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("approved").unwrap(), ClaimStatus::Approved);
        assert_eq!(parse_status(" REJECTED ").unwrap(), ClaimStatus::Rejected);
        assert!(parse_status("shipped").is_err());
    }
}
