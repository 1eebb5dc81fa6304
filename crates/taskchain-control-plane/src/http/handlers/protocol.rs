//! Governance protocol handlers over the audit chain.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    Json,
};
use tracing::warn;

use crate::http::responses::{
    AccessQuery, AccessResponse, ApiError, AppendResponse, EntriesQuery, EntriesResponse,
    GrantRequest, RecordComplianceRequest, RegisterStandardRequest, VerifyResponse,
};
use crate::state::AppState;

use super::json_body;

const DEFAULT_ENTRIES_LIMIT: usize = 50;
const MAX_ENTRIES_LIMIT: usize = 1000;

/// POST /protocol/standard
pub async fn register_standard(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RegisterStandardRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AppendResponse>), ApiError> {
    let req = json_body(body)?;
    let hash = state
        .chain
        .register_standard(&req.actor, &req.standard, req.definition)
        .await?;
    Ok((StatusCode::CREATED, Json(AppendResponse { hash })))
}

/// POST /protocol/compliance
pub async fn record_compliance(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RecordComplianceRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AppendResponse>), ApiError> {
    let req = json_body(body)?;
    let hash = state
        .chain
        .record_compliance(&req.actor, &req.standard, &req.subject, req.compliant, req.evidence)
        .await?;
    Ok((StatusCode::CREATED, Json(AppendResponse { hash })))
}

/// POST /protocol/grant
pub async fn grant(
    State(state): State<Arc<AppState>>,
    body: Result<Json<GrantRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AppendResponse>), ApiError> {
    let req = json_body(body)?;
    let hash = if req.revoke {
        state.chain.revoke_role(&req.actor, &req.role, &req.subject).await?
    } else {
        state.chain.grant_role(&req.actor, &req.role, &req.subject).await?
    };
    Ok((StatusCode::CREATED, Json(AppendResponse { hash })))
}

/// GET /protocol/access?role=&subject=
pub async fn access(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AccessQuery>,
) -> Result<Json<AccessResponse>, ApiError> {
    let granted = state.chain.has_grant(&query.role, &query.subject).await?;
    Ok(Json(AccessResponse {
        role: query.role,
        subject: query.subject,
        granted,
    }))
}

/// GET /protocol/entries?limit=
pub async fn entries(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EntriesQuery>,
) -> Result<Json<EntriesResponse>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_ENTRIES_LIMIT)
        .min(MAX_ENTRIES_LIMIT);
    let entries = state.chain.entries(limit).await?;
    Ok(Json(EntriesResponse {
        count: entries.len(),
        entries,
    }))
}

/// GET /protocol/verify
pub async fn verify(State(state): State<Arc<AppState>>) -> Result<Json<VerifyResponse>, ApiError> {
    let verification = state.chain.verify().await?;
    if !verification.valid {
        warn!(
            broken_at = verification.broken_at_hash.as_deref().unwrap_or(""),
            "Audit chain failed verification"
        );
    }
    Ok(Json(VerifyResponse {
        valid: verification.valid,
        broken_at: verification.broken_at_hash,
        entries: verification.entries,
    }))
}
