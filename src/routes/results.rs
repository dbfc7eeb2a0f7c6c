use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::record::ResultRecord;
use crate::services::notifier::NotifyError;

/// Job reference accepted either as `?predictionId=` or as a JSON body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsRequest {
    pub prediction_id: Option<String>,
}

/// POST /results — (re)deliver a completed job's result to its conversation.
pub async fn deliver_results(
    State(state): State<AppState>,
    Query(query): Query<ResultsRequest>,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let prediction_id = query.prediction_id.or_else(|| {
        serde_json::from_slice::<ResultsRequest>(&body)
            .ok()
            .and_then(|b| b.prediction_id)
    });

    let Some(prediction_id) = prediction_id else {
        return (StatusCode::BAD_REQUEST, "predictionId is required");
    };
    let Ok(job_id) = Uuid::parse_str(prediction_id.trim()) else {
        return (StatusCode::BAD_REQUEST, "predictionId must be a UUID");
    };

    match state.notifier.deliver(job_id).await {
        Ok(()) => (StatusCode::OK, "Ok"),
        Err(NotifyError::NotFound(_)) => (StatusCode::NOT_FOUND, "No results found"),
        Err(e @ (NotifyError::Transport(_) | NotifyError::Callback(_))) => {
            tracing::error!(job_id = %job_id, error = %e, "Result delivery failed");
            (StatusCode::BAD_GATEWAY, "Delivery failed")
        }
        Err(e @ NotifyError::StoreUnavailable(_)) => {
            tracing::error!(job_id = %job_id, error = %e, "Result lookup failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Error")
        }
    }
}

/// GET /api/v1/results/{job_id} — fetch a result record.
pub async fn get_result(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ResultRecord>, StatusCode> {
    match state.records.get(job_id).await {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "Result lookup failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
