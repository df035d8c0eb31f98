//! Internal account handlers.
//!
//! - `POST /internal/v1/accounts/{id}/reconcile` - Back-fill identity
//!
//! Called by the account service after signup or email verification. The
//! route is internal; deployment keeps it off the public ingress.

use crate::errors::BcError;
use crate::models::ReconcileSummary;
use crate::repositories::AccountsRepository;
use crate::routes::AppState;
use crate::services::ReconcilerService;
use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Handler for POST /internal/v1/accounts/{id}/reconcile
///
/// Link the account's identity across historical slots, co-broadcaster
/// entries, and tips. Idempotent; safe to call repeatedly.
///
/// # Response
///
/// - 200 OK: summary of linked records (all zeros when nothing matched)
/// - 404 Not Found: unknown account
#[instrument(
    skip_all,
    name = "bc.accounts.reconcile",
    fields(method = "POST", endpoint = "/internal/v1/accounts/{id}/reconcile")
)]
pub async fn reconcile_account(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<ReconcileSummary>, BcError> {
    let account = AccountsRepository::find_by_id(&state.pool, account_id)
        .await?
        .ok_or_else(|| BcError::NotFound("Account not found".to_string()))?;

    let summary = ReconcilerService::reconcile_account(&state.pool, &account).await?;
    Ok(Json(summary))
}
