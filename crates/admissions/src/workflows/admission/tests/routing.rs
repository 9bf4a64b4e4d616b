use std::sync::Arc;

use axum::extract::State;
use axum::http::{Method, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;
use crate::workflows::admission::domain::ApplicationStatus;
use crate::workflows::admission::router::{self, admission_router, STAFF_HEADER};
use crate::workflows::admission::service::AdmissionPorts;

fn submission_json() -> Value {
    serde_json::to_value(submission()).expect("serialize submission")
}

#[tokio::test]
async fn submit_route_returns_reference_and_token() {
    let harness = Harness::new();
    let app = admission_router(harness.service.clone());

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/v1/admissions/applications",
            &submission_json(),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert!(payload["reference_number"]
        .as_str()
        .expect("reference")
        .starts_with("KSIS-"));
    assert_eq!(payload["tracking_token"].as_str().map(str::len), Some(32));
    assert_eq!(payload["status"], "enquiry_new");
}

#[tokio::test]
async fn public_validation_errors_do_not_name_fields() {
    let harness = Harness::new();
    let mut body = submission_json();
    body["email"] = json!("not-an-email");

    let submission = serde_json::from_value(body).expect("still a submission");
    let response =
        router::submit_handler(State(harness.service.clone()), axum::Json(submission)).await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = read_json_body(response).await;
    let message = payload["error"].as_str().expect("message");
    assert!(message.contains("check your details"));
    assert!(!message.contains("email"));
}

#[tokio::test]
async fn resolve_route_hides_wrong_birth_date() {
    let harness = Harness::new();
    let application = harness.submit();
    let app = admission_router(harness.service.clone());

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/admissions/tracking/resolve",
            &json!({
                "reference_number": application.reference_number.0,
                "date_of_birth": "2020-01-01",
            }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let payload = read_json_body(response).await;
    assert!(payload["error"]
        .as_str()
        .expect("message")
        .contains("check your details"));

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/v1/admissions/tracking/resolve",
            &json!({
                "reference_number": application.reference_number.0,
                "date_of_birth": "2021-01-01",
            }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["tracking_token"], application.tracking_token.0);
}

#[tokio::test]
async fn tracking_routes_show_status_and_accept_links() {
    let harness = Harness::new();
    let application = harness.submit();
    let token = application.tracking_token.0.clone();
    let app = admission_router(harness.service.clone());

    let response = app
        .clone()
        .oneshot(json_request(
            Method::PUT,
            &format!("/api/v1/admissions/tracking/{token}/documents"),
            &json!({ "url": "https://drive.google.com/folder/abc" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get_request(&format!("/api/v1/admissions/tracking/{token}")))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "enquiry_new");
    assert_eq!(
        payload["documents_link"],
        "https://drive.google.com/folder/abc"
    );
    assert_eq!(
        payload["remarks"],
        "We will contact you within 2-3 business days"
    );
    assert!(payload.get("email").is_none());
}

#[tokio::test]
async fn unknown_token_is_not_found() {
    let harness = Harness::new();
    let app = admission_router(harness.service.clone());

    let response = app
        .oneshot(get_request("/api/v1/admissions/tracking/deadbeef"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn status_route_reports_invalid_transitions() {
    let harness = Harness::new();
    let application = harness.submit();
    let app = admission_router(harness.service.clone());

    let response = app
        .oneshot(json_request(
            Method::PATCH,
            &format!(
                "/api/v1/admissions/staff/applications/{}/status",
                application.id.0
            ),
            &json!({ "status": "payment_pending" }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let payload = read_json_body(response).await;
    assert_eq!(payload["code"], "invalid_transition");
    assert_eq!(payload["from"], "enquiry_new");
    assert_eq!(payload["to"], "payment_pending");
}

#[tokio::test]
async fn status_route_requires_remarks_for_hold() {
    let harness = Harness::new();
    let application = harness.submit();
    harness.move_to(&application.id, ApplicationStatus::DocumentsPending);
    let app = admission_router(harness.service.clone());
    let uri = format!(
        "/api/v1/admissions/staff/applications/{}/status",
        application.id.0
    );

    let response = app
        .clone()
        .oneshot(json_request(
            Method::PATCH,
            &uri,
            &json!({ "status": "on_hold", "remarks": "  " }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = read_json_body(response).await;
    assert_eq!(payload["code"], "validation");

    let response = app
        .oneshot(json_request(
            Method::PATCH,
            &uri,
            &json!({ "status": "on_hold", "remarks": "missing TC" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["application"]["status"], "on_hold");
    assert_eq!(payload["notification_sent"], true);
}

#[tokio::test]
async fn admit_route_returns_numbers_and_credentials() {
    let harness = Harness::new();
    let application = harness.verified_application();
    let app = admission_router(harness.service.clone());

    let response = app
        .oneshot(json_request(
            Method::POST,
            &format!(
                "/api/v1/admissions/staff/applications/{}/admit",
                application.id.0
            ),
            &json!({ "section": "A", "academic_year": "2025-2026" }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["admission_number"], "ADM-2025-MEDA-0001");
    assert_eq!(payload["roll_number"], "2025-PRE_KG-A-001");
    assert_eq!(payload["parent_credentials"]["login_email"], PARENT_EMAIL);
    assert_eq!(
        payload["parent_credentials"]["default_password"]
            .as_str()
            .map(str::len),
        Some(12)
    );
    assert_eq!(payload["application"]["status"], "admitted");
}

#[tokio::test]
async fn admit_route_names_the_failed_step() {
    let harness = Harness::with(|store, ports| AdmissionPorts {
        students: Arc::new(FailingStudents {
            inner: store.clone(),
        }),
        ..ports
    });
    let application = harness.verified_application();
    let app = admission_router(harness.service.clone());

    let response = app
        .oneshot(json_request(
            Method::POST,
            &format!(
                "/api/v1/admissions/staff/applications/{}/admit",
                application.id.0
            ),
            &json!({ "section": "A", "academic_year": "2025-2026" }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let payload = read_json_body(response).await;
    assert_eq!(payload["code"], "admission_failed");
    assert_eq!(payload["step"], "student_creation");
    assert_eq!(
        harness.status_of(&application.id),
        ApplicationStatus::DocumentsVerified
    );
}

#[tokio::test]
async fn walk_in_route_records_staff_actor() {
    let harness = Harness::new();
    let app = admission_router(harness.service.clone());
    let mut body = submission_json();
    body["lead"] = json!("enquiry_warm");

    let mut request = json_request(Method::POST, "/api/v1/admissions/staff/walk-ins", &body);
    request
        .headers_mut()
        .insert(STAFF_HEADER, "Lakshmi".parse().expect("header value"));

    let response = app.oneshot(request).await.expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "enquiry_warm");

    let id = payload["id"].as_str().expect("id").to_string();
    let history = harness
        .service
        .history(&crate::workflows::admission::ApplicationId(id))
        .expect("history");
    assert_eq!(history[0].actor, crate::workflows::admission::Actor::staff("Lakshmi"));
}

#[tokio::test]
async fn staff_list_supports_filter_and_sort() {
    let harness = Harness::new();
    harness.submit();
    let diya = harness
        .service
        .submit(sibling_submission())
        .expect("submitted");
    harness.move_to(&diya.id, ApplicationStatus::EnquiryHot);
    let app = admission_router(harness.service.clone());

    let response = app
        .clone()
        .oneshot(get_request(
            "/api/v1/admissions/staff/applications?status=enquiry_hot",
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    let listed = payload.as_array().expect("array");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["applicant"]["student_name"], "Diya R");

    let response = app
        .oneshot(get_request(
            "/api/v1/admissions/staff/applications?sort=student_name&direction=asc",
        ))
        .await
        .expect("route executes");
    let payload = read_json_body(response).await;
    let names: Vec<_> = payload
        .as_array()
        .expect("array")
        .iter()
        .map(|application| application["applicant"]["student_name"].clone())
        .collect();
    assert_eq!(names, vec![json!("Aarav R"), json!("Diya R")]);
}

#[tokio::test]
async fn staff_detail_history_and_summary_routes() {
    let harness = Harness::new();
    let application = harness.submit();
    harness.move_to(&application.id, ApplicationStatus::DocumentsPending);
    let app = admission_router(harness.service.clone());

    let response = app
        .clone()
        .oneshot(get_request(&format!(
            "/api/v1/admissions/staff/applications/{}",
            application.id.0
        )))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["applicant"]["parent"]["email"], PARENT_EMAIL);
    let mut next: Vec<&str> = payload["next_statuses"]
        .as_array()
        .expect("next statuses")
        .iter()
        .filter_map(|status| status.as_str())
        .collect();
    next.sort_unstable();
    assert_eq!(next, ["documents_verified", "on_hold", "rejected"]);

    let response = app
        .clone()
        .oneshot(get_request(&format!(
            "/api/v1/admissions/staff/applications/{}/history",
            application.id.0
        )))
        .await
        .expect("route executes");
    let payload = read_json_body(response).await;
    assert_eq!(payload.as_array().map(Vec::len), Some(2));

    let response = app
        .clone()
        .oneshot(get_request("/api/v1/admissions/staff/summary"))
        .await
        .expect("route executes");
    let payload = read_json_body(response).await;
    assert_eq!(payload["total"], 1);
    assert_eq!(payload["by_status"]["documents_pending"], 1);

    let response = app
        .oneshot(get_request("/api/v1/admissions/staff/applications/missing"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn staff_link_route_rejects_unknown_kind() {
    let harness = Harness::new();
    let application = harness.submit();
    let app = admission_router(harness.service.clone());

    let response = app
        .clone()
        .oneshot(json_request(
            Method::PUT,
            &format!(
                "/api/v1/admissions/staff/applications/{}/links/transcript",
                application.id.0
            ),
            &json!({ "url": "https://drive.google.com/x" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(json_request(
            Method::PUT,
            &format!(
                "/api/v1/admissions/staff/applications/{}/links/payment-receipt",
                application.id.0
            ),
            &json!({ "url": "https://pay.example.org/r/1" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["payment_receipt_link"], "https://pay.example.org/r/1");
}

#[tokio::test]
async fn store_outage_is_unavailable_on_both_surfaces() {
    let harness = Harness::with(|_, ports| AdmissionPorts {
        applications: Arc::new(UnavailableApplications),
        ..ports
    });
    let app = admission_router(harness.service.clone());

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/admissions/applications",
            &submission_json(),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = app
        .oneshot(get_request("/api/v1/admissions/staff/applications"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let payload = read_json_body(response).await;
    assert_eq!(payload["code"], "unavailable");
}
