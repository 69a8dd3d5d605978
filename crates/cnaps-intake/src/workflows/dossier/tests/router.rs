use super::common::*;
use crate::workflows::dossier::repository::DossierRepository;
use crate::workflows::dossier::router::dossier_router;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::util::ServiceExt;

const BOUNDARY: &str = "cnaps-test-boundary";

fn router(fx: &Fixture, token: &str) -> axum::Router {
    dossier_router(fx.service.clone(), token.to_string())
}

fn text_part(name: &str, value: &str) -> Vec<u8> {
    format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
    )
    .into_bytes()
}

fn file_part(name: &str, filename: &str, bytes: &[u8]) -> Vec<u8> {
    let mut part = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    part.extend_from_slice(bytes);
    part.extend_from_slice(b"\r\n");
    part
}

fn multipart_request(parts: Vec<Vec<u8>>) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(&part);
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    Request::builder()
        .method("POST")
        .uri("/submit")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("request builds")
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json payload")
}

#[tokio::test]
async fn submit_multipart_creates_a_dossier() {
    let fx = fixture();
    let request = multipart_request(vec![
        text_part("nom", "Dupont"),
        text_part("prenom", "Jean"),
        text_part("email", "jean@example.com"),
        file_part("piece_identite", "cni.pdf", b"%PDF-1.4 fake"),
    ]);

    let response = router(&fx, "")
        .oneshot(request)
        .await
        .expect("handler runs");
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = json_body(response).await;
    assert_eq!(body["id"], 1);
    assert_eq!(body["last_name"], "Dupont");
    assert_eq!(body["status"], "");
    assert_eq!(body["files"].as_array().expect("files").len(), 1);
}

#[tokio::test]
async fn submit_records_formation_and_session() {
    let fx = fixture();
    let request = multipart_request(vec![
        text_part("nom", "Dupont"),
        text_part("prenom", "Jean"),
        text_part("email", "jean@example.com"),
        text_part("formation", "CQP APS"),
        text_part("session", "2026-09"),
        file_part("piece_identite", "cni.pdf", b"%PDF-1.4 fake"),
    ]);

    let response = router(&fx, "")
        .oneshot(request)
        .await
        .expect("handler runs");
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = json_body(response).await;
    assert_eq!(body["formation"], "CQP APS");
    assert_eq!(body["session"], "2026-09");
}

#[tokio::test]
async fn admin_listing_carries_the_email_audit_for_preview() {
    let fx = fixture();
    fx.service
        .submit(submission(vec![identity_png()]))
        .await
        .expect("submit");

    let response = router(&fx, "")
        .oneshot(
            Request::builder()
                .uri("/admin")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("handler runs");
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let audit = &body[0]["emails"]["accuse_reception"];
    assert_eq!(audit["outcome"], "Sent");
    assert!(audit["body"].as_str().expect("rendered body").contains("reçu"));
    assert!(!audit["attempted_at"].is_null());
}

#[tokio::test]
async fn submit_without_required_fields_is_unprocessable() {
    let fx = fixture();
    let request = multipart_request(vec![
        text_part("nom", "Dupont"),
        file_part("piece_identite", "cni.pdf", b"%PDF-1.4 fake"),
    ]);

    let response = router(&fx, "")
        .oneshot(request)
        .await
        .expect("handler runs");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn admin_listing_requires_the_shared_secret() {
    let fx = fixture();

    let denied = router(&fx, "s3cret")
        .oneshot(
            Request::builder()
                .uri("/admin")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("handler runs");
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    let allowed = router(&fx, "s3cret")
        .oneshot(
            Request::builder()
                .uri("/admin")
                .header("x-admin-token", "s3cret")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("handler runs");
    assert_eq!(allowed.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_listing_is_open_without_a_configured_secret() {
    let fx = fixture();
    let response = router(&fx, "")
        .oneshot(
            Request::builder()
                .uri("/admin")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("handler runs");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn set_status_rejects_unknown_labels() {
    let fx = fixture();
    let response = router(&fx, "")
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/set_status")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "id": 1, "status": "accepted" }).to_string(),
                ))
                .expect("request builds"),
        )
        .await
        .expect("handler runs");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn set_status_on_unknown_dossier_is_not_found() {
    let fx = fixture();
    let response = router(&fx, "")
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/set_status")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "id": 99, "status": "conforme" }).to_string(),
                ))
                .expect("request builds"),
        )
        .await
        .expect("handler runs");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_reports_whether_anything_was_removed() {
    let fx = fixture();
    fx.service
        .submit(submission(vec![identity_png()]))
        .await
        .expect("submit");

    let response = router(&fx, "")
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/delete")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "id": 1 }).to_string()))
                .expect("request builds"),
        )
        .await
        .expect("handler runs");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["deleted"], true);
}

#[tokio::test]
async fn unknown_upload_is_a_404() {
    let fx = fixture();
    let response = router(&fx, "")
        .oneshot(
            Request::builder()
                .uri("/uploads/nothing_here.pdf")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("handler runs");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stored_upload_streams_back_with_content_type() {
    let fx = fixture();
    let dossier = fx
        .service
        .submit(submission(vec![residence_pdf()]))
        .await
        .expect("submit");
    let name = dossier.files[0].as_str().to_string();

    let response = router(&fx, "")
        .oneshot(
            Request::builder()
                .uri(format!("/uploads/{name}"))
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("handler runs");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        Some("application/pdf")
    );
}

#[tokio::test]
async fn download_returns_a_zip_attachment() {
    let fx = fixture();
    fx.service
        .submit(submission(vec![residence_pdf()]))
        .await
        .expect("submit");

    let response = router(&fx, "")
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/download")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "id": 1 }).to_string()))
                .expect("request builds"),
        )
        .await
        .expect("handler runs");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        Some("application/zip")
    );
    let disposition = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .expect("disposition set");
    assert!(disposition.contains("dossier_dupont_jean.zip"));
}

#[tokio::test]
async fn check_status_without_a_link_is_a_no_op() {
    let fx = fixture();
    fx.service
        .submit(submission(vec![identity_png()]))
        .await
        .expect("submit");

    let response = router(&fx, "")
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/check_status")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "id": 1 }).to_string()))
                .expect("request builds"),
        )
        .await
        .expect("handler runs");
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert!(body.get("cnaps_status").is_none(), "no probe result recorded");
}

#[tokio::test]
async fn reset_wipes_the_store() {
    let fx = fixture();
    fx.service
        .submit(submission(vec![identity_png()]))
        .await
        .expect("submit");

    let response = router(&fx, "")
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/reset")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("handler runs");
    assert_eq!(response.status(), StatusCode::OK);
    assert!(fx.repository.list().expect("list").is_empty());
}
