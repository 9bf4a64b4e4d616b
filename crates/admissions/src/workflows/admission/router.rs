use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use super::domain::{
    Actor, Application, ApplicationId, ApplicationStatus, ApplicationSubmission, TrackingToken,
};
use super::service::{
    AdmissionError, AdmissionRequest, AdmissionService, ApplicationQuery, LinkKind, StatusUpdate,
};
use super::transitions;

/// Header carrying the staff member's display name on staff routes.
pub const STAFF_HEADER: &str = "x-staff-name";

const CHECK_DETAILS: &str = "we could not find an application matching those details; please check your details and try again";

/// Applicant-facing routes. Everything past submission is gated by the tracking token.
pub fn public_router(service: Arc<AdmissionService>) -> Router {
    Router::new()
        .route("/api/v1/admissions/applications", post(submit_handler))
        .route("/api/v1/admissions/tracking/resolve", post(resolve_handler))
        .route("/api/v1/admissions/tracking/:token", get(track_handler))
        .route(
            "/api/v1/admissions/tracking/:token/documents",
            put(documents_handler),
        )
        .route(
            "/api/v1/admissions/tracking/:token/payment-receipt",
            put(payment_receipt_handler),
        )
        .with_state(service)
}

/// Admissions-office routes.
pub fn staff_router(service: Arc<AdmissionService>) -> Router {
    Router::new()
        .route("/api/v1/admissions/staff/applications", get(list_handler))
        .route("/api/v1/admissions/staff/walk-ins", post(walk_in_handler))
        .route("/api/v1/admissions/staff/summary", get(summary_handler))
        .route(
            "/api/v1/admissions/staff/applications/:application_id",
            get(detail_handler),
        )
        .route(
            "/api/v1/admissions/staff/applications/:application_id/history",
            get(history_handler),
        )
        .route(
            "/api/v1/admissions/staff/applications/:application_id/status",
            patch(status_handler),
        )
        .route(
            "/api/v1/admissions/staff/applications/:application_id/admit",
            post(admit_handler),
        )
        .route(
            "/api/v1/admissions/staff/applications/:application_id/links/:kind",
            put(link_handler),
        )
        .with_state(service)
}

pub fn admission_router(service: Arc<AdmissionService>) -> Router {
    public_router(service.clone()).merge(staff_router(service))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResolveRequest {
    pub reference_number: String,
    pub date_of_birth: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LinkRequest {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WalkInRequest {
    pub lead: ApplicationStatus,
    #[serde(flatten)]
    pub submission: ApplicationSubmission,
}

fn staff_actor(headers: &HeaderMap) -> Actor {
    let name = headers
        .get(STAFF_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or("admissions office");
    Actor::staff(name)
}

/// Staff see the real reason for every failure.
fn staff_error(err: AdmissionError) -> Response {
    let (status, code) = match &err {
        AdmissionError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation"),
        AdmissionError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
        AdmissionError::InvalidTransition(_) => (StatusCode::CONFLICT, "invalid_transition"),
        AdmissionError::Conflict => (StatusCode::CONFLICT, "conflict"),
        AdmissionError::AdmissionFailed { .. } => (StatusCode::BAD_GATEWAY, "admission_failed"),
        AdmissionError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
    };

    let mut payload = json!({
        "error": err.to_string(),
        "code": code,
    });
    match &err {
        AdmissionError::AdmissionFailed { step, .. } => {
            payload["step"] = json!(step);
        }
        AdmissionError::InvalidTransition(transition) => {
            payload["from"] = json!(transition.from);
            payload["to"] = json!(transition.to);
        }
        _ => {}
    }
    (status, axum::Json(payload)).into_response()
}

/// Applicants never learn which field or record was wrong.
fn public_error(err: AdmissionError) -> Response {
    match err {
        AdmissionError::NotFound => (
            StatusCode::NOT_FOUND,
            axum::Json(json!({ "error": CHECK_DETAILS })),
        )
            .into_response(),
        AdmissionError::Validation(_) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            axum::Json(json!({ "error": CHECK_DETAILS })),
        )
            .into_response(),
        AdmissionError::Conflict => (
            StatusCode::CONFLICT,
            axum::Json(json!({ "error": "your application changed while saving; please try again" })),
        )
            .into_response(),
        other => {
            error!(error = %other, "public admission request failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                axum::Json(json!({ "error": "admissions are temporarily unavailable" })),
            )
                .into_response()
        }
    }
}

pub(crate) async fn submit_handler(
    State(service): State<Arc<AdmissionService>>,
    axum::Json(submission): axum::Json<ApplicationSubmission>,
) -> Response {
    match service.submit(submission) {
        Ok(application) => {
            let payload = json!({
                "reference_number": application.reference_number,
                "tracking_token": application.tracking_token,
                "status": application.status.label(),
            });
            (StatusCode::CREATED, axum::Json(payload)).into_response()
        }
        Err(err) => public_error(err),
    }
}

pub(crate) async fn resolve_handler(
    State(service): State<Arc<AdmissionService>>,
    axum::Json(request): axum::Json<ResolveRequest>,
) -> Response {
    match service.resolve_tracking_token(&request.reference_number, &request.date_of_birth) {
        Ok(token) => {
            (StatusCode::OK, axum::Json(json!({ "tracking_token": token }))).into_response()
        }
        Err(err) => public_error(err),
    }
}

pub(crate) async fn track_handler(
    State(service): State<Arc<AdmissionService>>,
    Path(token): Path<String>,
) -> Response {
    match service.get_by_tracking_token(&TrackingToken(token)) {
        Ok(record) => (StatusCode::OK, axum::Json(record.tracking_view())).into_response(),
        Err(err) => public_error(err),
    }
}

pub(crate) async fn documents_handler(
    State(service): State<Arc<AdmissionService>>,
    Path(token): Path<String>,
    axum::Json(request): axum::Json<LinkRequest>,
) -> Response {
    let token = TrackingToken(token);
    match service.submit_documents_link(&token, &request.url) {
        Ok(application) => link_ack(application.documents_link),
        Err(err) => public_error(err),
    }
}

pub(crate) async fn payment_receipt_handler(
    State(service): State<Arc<AdmissionService>>,
    Path(token): Path<String>,
    axum::Json(request): axum::Json<LinkRequest>,
) -> Response {
    let token = TrackingToken(token);
    match service.submit_payment_receipt_link(&token, &request.url) {
        Ok(application) => link_ack(application.payment_receipt_link),
        Err(err) => public_error(err),
    }
}

fn link_ack(stored: Option<String>) -> Response {
    (
        StatusCode::OK,
        axum::Json(json!({ "accepted": true, "link": stored })),
    )
        .into_response()
}

pub(crate) async fn list_handler(
    State(service): State<Arc<AdmissionService>>,
    Query(query): Query<ApplicationQuery>,
) -> Response {
    match service.list(&query) {
        Ok(applications) => (StatusCode::OK, axum::Json(applications)).into_response(),
        Err(err) => staff_error(err),
    }
}

pub(crate) async fn summary_handler(State(service): State<Arc<AdmissionService>>) -> Response {
    match service.pipeline_summary() {
        Ok(summary) => (StatusCode::OK, axum::Json(summary)).into_response(),
        Err(err) => staff_error(err),
    }
}

pub(crate) async fn walk_in_handler(
    State(service): State<Arc<AdmissionService>>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<WalkInRequest>,
) -> Response {
    match service.register_walk_in(request.submission, request.lead, staff_actor(&headers)) {
        Ok(application) => (StatusCode::CREATED, axum::Json(application)).into_response(),
        Err(err) => staff_error(err),
    }
}

/// Staff view of one application plus the moves the status dropdown may offer.
#[derive(Serialize)]
struct ApplicationDetail {
    #[serde(flatten)]
    application: Application,
    next_statuses: Vec<ApplicationStatus>,
}

pub(crate) async fn detail_handler(
    State(service): State<Arc<AdmissionService>>,
    Path(application_id): Path<String>,
) -> Response {
    match service.get(&ApplicationId(application_id)) {
        Ok(record) => {
            let detail = ApplicationDetail {
                next_statuses: transitions::next_statuses(record.status()),
                application: record.application,
            };
            (StatusCode::OK, axum::Json(detail)).into_response()
        }
        Err(err) => staff_error(err),
    }
}

pub(crate) async fn history_handler(
    State(service): State<Arc<AdmissionService>>,
    Path(application_id): Path<String>,
) -> Response {
    match service.history(&ApplicationId(application_id)) {
        Ok(history) => (StatusCode::OK, axum::Json(history)).into_response(),
        Err(err) => staff_error(err),
    }
}

pub(crate) async fn status_handler(
    State(service): State<Arc<AdmissionService>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    axum::Json(update): axum::Json<StatusUpdate>,
) -> Response {
    let actor = staff_actor(&headers);
    let id = ApplicationId(application_id);
    let result = tokio::task::spawn_blocking(move || service.update_status(&id, update, actor)).await;

    match result {
        Ok(Ok(change)) => {
            let payload = json!({
                "application": change.application,
                "notification_sent": change.notification_sent(),
                "notification": change.notification,
                "admission": change.admission,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Ok(Err(err)) => staff_error(err),
        Err(join) => blocking_failure(join),
    }
}

pub(crate) async fn admit_handler(
    State(service): State<Arc<AdmissionService>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<AdmissionRequest>,
) -> Response {
    let actor = staff_actor(&headers);
    let id = ApplicationId(application_id);
    // Credential hashing is CPU bound.
    let result = tokio::task::spawn_blocking(move || service.admit(&id, request, actor)).await;

    match result {
        Ok(Ok(outcome)) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Ok(Err(err)) => staff_error(err),
        Err(join) => blocking_failure(join),
    }
}

pub(crate) async fn link_handler(
    State(service): State<Arc<AdmissionService>>,
    Path((application_id, kind)): Path<(String, String)>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<LinkRequest>,
) -> Response {
    let kind = match kind.as_str() {
        "documents" => LinkKind::Documents,
        "payment-receipt" => LinkKind::PaymentReceipt,
        other => {
            let payload = json!({
                "error": format!("unknown link kind '{other}'"),
                "code": "not_found",
            });
            return (StatusCode::NOT_FOUND, axum::Json(payload)).into_response();
        }
    };

    let actor = staff_actor(&headers);
    match service.attach_link(&ApplicationId(application_id), kind, &request.url, &actor) {
        Ok(application) => (StatusCode::OK, axum::Json(application)).into_response(),
        Err(err) => staff_error(err),
    }
}

fn blocking_failure(err: tokio::task::JoinError) -> Response {
    error!(error = %err, "admission task did not complete");
    let payload = json!({
        "error": "admission task did not complete",
        "code": "internal",
    });
    (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
}
