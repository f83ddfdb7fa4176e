//! Generation handlers: price list, admission, status and history.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use genledger_core::{GenerationJob, JobFamily, JobStatus, RequestId, StatusSnapshot};
use genledger_store::Store;

use crate::admission::{self, AdmitRequest};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::credits::PageQuery;
use crate::state::AppState;
use crate::status;

/// One model in the price list.
#[derive(Debug, Serialize)]
pub struct ModelResponse {
    /// Model identifier.
    pub model: String,
    /// Job family.
    pub family: JobFamily,
    /// Credits per job.
    pub credits: i64,
}

/// Price list response.
#[derive(Debug, Serialize)]
pub struct ListModelsResponse {
    /// Models sorted by family then name.
    pub models: Vec<ModelResponse>,
}

/// List models and their prices.
pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<ListModelsResponse> {
    let models = state
        .config
        .pricing
        .sorted()
        .into_iter()
        .map(|(model, price)| ModelResponse {
            model: model.to_string(),
            family: price.family,
            credits: price.credits,
        })
        .collect();

    Json(ListModelsResponse { models })
}

/// Generation request.
#[derive(Debug, Deserialize)]
pub struct CreateGenerationRequest {
    /// Job family.
    pub family: JobFamily,
    /// Model identifier.
    pub model: String,
    /// Idempotency key (UUID). Generated if absent.
    #[serde(default)]
    pub request_id: Option<String>,
    /// Generation input, passed to the provider untouched.
    #[serde(default)]
    pub input: serde_json::Value,
}

/// Generation admission response.
#[derive(Debug, Serialize)]
pub struct CreateGenerationResponse {
    /// The job's request ID.
    pub request_id: String,
    /// Job status after dispatch.
    pub status: JobStatus,
    /// Credits charged.
    pub credits_charged: i64,
    /// Balance after the charge.
    pub new_balance: i64,
    /// Whether this request repeated an earlier admission.
    pub replayed: bool,
}

/// Admit a generation job.
///
/// Returns `202 Accepted` for a new job and `200 OK` when the request ID was
/// already admitted.
pub async fn create_generation(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateGenerationRequest>,
) -> Result<(StatusCode, Json<CreateGenerationResponse>), ApiError> {
    let request_id = body
        .request_id
        .as_deref()
        .map(str::parse::<RequestId>)
        .transpose()
        .map_err(|_| ApiError::BadRequest("request_id must be a UUID".into()))?;

    let admitted = admission::admit(
        &state,
        auth.user_id,
        AdmitRequest {
            family: body.family,
            model: body.model,
            request_id,
            input: body.input,
        },
    )
    .await?;

    let status = if admitted.replayed {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };

    Ok((
        status,
        Json(CreateGenerationResponse {
            request_id: admitted.job.request_id.to_string(),
            status: admitted.job.status,
            credits_charged: admitted.job.credits_charged,
            new_balance: admitted.balance,
            replayed: admitted.replayed,
        }),
    ))
}

/// Get the status of one of the caller's jobs.
pub async fn get_generation_status(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(request_id): Path<String>,
) -> Result<Json<StatusSnapshot>, ApiError> {
    let request_id: RequestId = request_id
        .parse()
        .map_err(|_| ApiError::BadRequest("request_id must be a UUID".into()))?;

    let snapshot = status::resolve(&state, &auth.user_id, &request_id).await?;
    Ok(Json(snapshot))
}

/// Job summary for listings. Never includes provider-reported cost.
#[derive(Debug, Serialize)]
pub struct GenerationResponse {
    /// Request ID.
    pub request_id: String,
    /// Job family.
    pub family: JobFamily,
    /// Model identifier.
    pub model: String,
    /// Credits charged.
    pub credits_charged: i64,
    /// Lifecycle status.
    pub status: JobStatus,
    /// Result location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_location: Option<String>,
    /// Failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    /// Created timestamp.
    pub created_at: String,
    /// Completion timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl From<&GenerationJob> for GenerationResponse {
    fn from(job: &GenerationJob) -> Self {
        Self {
            request_id: job.request_id.to_string(),
            family: job.family,
            model: job.model.clone(),
            credits_charged: job.credits_charged,
            status: job.status,
            result_location: job.result_location.clone(),
            error_detail: job.error_detail.clone(),
            created_at: job.created_at.to_rfc3339(),
            completed_at: job.completed_at.map(|at| at.to_rfc3339()),
        }
    }
}

/// List generations response.
#[derive(Debug, Serialize)]
pub struct ListGenerationsResponse {
    /// Jobs (newest first).
    pub generations: Vec<GenerationResponse>,
    /// Whether there are more jobs.
    pub has_more: bool,
}

/// List the caller's jobs.
pub async fn list_generations(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<ListGenerationsResponse>, ApiError> {
    let limit = query.capped_limit();
    let jobs = state
        .store
        .list_jobs_by_user(&auth.user_id, limit + 1, query.offset)?;

    let has_more = jobs.len() > limit;
    let generations = jobs.iter().take(limit).map(GenerationResponse::from).collect();

    Ok(Json(ListGenerationsResponse {
        generations,
        has_more,
    }))
}
