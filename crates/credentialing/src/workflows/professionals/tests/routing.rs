use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use serde_json::json;
use tower::ServiceExt;

use super::common::*;
use crate::workflows::professionals::professional_router;
use crate::workflows::ACTOR_HEADER;

const CPF: &str = "52998224725";

fn json_request(method: Method, uri: &str, body: serde_json::Value, actor: bool) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if actor {
        builder = builder.header(ACTOR_HEADER, "staff-1");
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

#[tokio::test]
async fn register_returns_created_record() {
    let fixture = fixture();
    let org = fixture.organization("Clinic", None);
    let app = professional_router(fixture.service.clone());

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/v1/professionals",
            json!({
                "organization_id": org.id,
                "full_name": "Ana Souza",
                "cpf": "529.982.247-25",
                "email": "Ana@Example.com"
            }),
            true,
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json_body(response).await;
    assert_eq!(body["professional"]["cpf"], CPF);
    assert_eq!(body["professional"]["email"], "ana@example.com");
}

#[tokio::test]
async fn mutations_without_actor_are_unauthorized() {
    let fixture = fixture();
    let org = fixture.organization("Clinic", None);
    let app = professional_router(fixture.service.clone());

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/v1/professionals",
            json!({ "organization_id": org.id, "full_name": "Ana Souza", "cpf": CPF }),
            false,
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_cpf_is_a_conflict_and_invalid_cpf_is_unprocessable() {
    let fixture = fixture();
    let org = fixture.organization("Clinic", None);
    fixture.register(&org, CPF);
    let app = professional_router(fixture.service.clone());

    let duplicate = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/professionals",
            json!({ "organization_id": org.id, "full_name": "Ana Souza", "cpf": CPF }),
            true,
        ))
        .await
        .expect("response");
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);
    let body = read_json_body(duplicate).await;
    assert!(body["error"].as_str().expect("message").contains(CPF));

    let invalid = app
        .oneshot(json_request(
            Method::POST,
            "/api/v1/professionals",
            json!({ "organization_id": org.id, "full_name": "Ana Souza", "cpf": "123" }),
            true,
        ))
        .await
        .expect("response");
    assert_eq!(invalid.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn unknown_professional_is_not_found() {
    let fixture = fixture();
    let app = professional_router(fixture.service.clone());

    let response = app
        .oneshot(get_request(&format!(
            "/api/v1/professionals/{}",
            crate::ids::ProfessionalId::new()
        )))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn pending_version_is_applied_through_the_api() {
    let fixture = fixture();
    let org = fixture.organization("Clinic", None);
    let record = fixture.register(&org, CPF);
    let app = professional_router(fixture.service.clone());

    let mut snapshot = full_snapshot(&fixture, CPF);
    snapshot.qualifications[0]
        .specialties
        .push(crate::workflows::professionals::SpecialtySnapshot {
            id: None,
            specialty_id: fixture.dermatology,
            rqe_number: Some("4411".to_string()),
        });

    let created = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/v1/professionals/{}/versions", record.id()),
            json!({ "snapshot": snapshot, "source_type": "import", "source_id": "batch-7" }),
            true,
        ))
        .await
        .expect("response");
    assert_eq!(created.status(), StatusCode::CREATED);
    let body = read_json_body(created).await;
    assert_eq!(body["version"]["status"], "pending");
    assert!(body["sync"].is_null());
    let version_id = body["version"]["id"].as_str().expect("id").to_string();

    let diffs = app
        .clone()
        .oneshot(get_request(&format!(
            "/api/v1/professional-versions/{version_id}/diffs"
        )))
        .await
        .expect("response");
    assert_eq!(diffs.status(), StatusCode::OK);
    let diffs = read_json_body(diffs).await;
    assert!(diffs
        .as_array()
        .expect("list")
        .iter()
        .any(|diff| diff["change_type"] == "added" && diff["entity_type"] == "qualification"));

    let applied = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/v1/professional-versions/{version_id}/apply"),
            json!({}),
            true,
        ))
        .await
        .expect("response");
    assert_eq!(applied.status(), StatusCode::OK);
    let body = read_json_body(applied).await;
    assert_eq!(body["version"]["status"], "applied");
    assert_eq!(body["sync"]["inserted"], 6);

    let again = app
        .oneshot(json_request(
            Method::POST,
            &format!("/api/v1/professional-versions/{version_id}/apply"),
            json!({}),
            true,
        ))
        .await
        .expect("response");
    assert_eq!(again.status(), StatusCode::CONFLICT);

    let live = fixture.service.get(&record.id()).expect("record");
    assert_eq!(live.specialties.len(), 2);
}

#[tokio::test]
async fn snapshot_and_personal_info_round_through_the_api() {
    let fixture = fixture();
    let org = fixture.organization("Clinic", None);
    let record = fixture.register(&org, CPF);
    fixture.apply(&record, full_snapshot(&fixture, CPF));
    let app = professional_router(fixture.service.clone());

    let patched = app
        .clone()
        .oneshot(json_request(
            Method::PATCH,
            &format!("/api/v1/professionals/{}/personal-info", record.id()),
            json!({ "phone": "+55 11 99999-0000" }),
            true,
        ))
        .await
        .expect("response");
    assert_eq!(patched.status(), StatusCode::OK);

    let snapshot = app
        .oneshot(get_request(&format!(
            "/api/v1/professionals/{}/snapshot",
            record.id()
        )))
        .await
        .expect("response");
    assert_eq!(snapshot.status(), StatusCode::OK);
    let body = read_json_body(snapshot).await;
    assert_eq!(body["personal_info"]["phone"], "+55 11 99999-0000");
    assert_eq!(body["qualifications"].as_array().expect("list").len(), 1);
    assert_eq!(body["companies"][0]["cnpj"], "11222333000181");
}

#[tokio::test]
async fn reject_requires_a_pending_version() {
    let fixture = fixture();
    let org = fixture.organization("Clinic", None);
    let record = fixture.register(&org, CPF);
    let initial = fixture.service.versions(&record.id()).expect("versions")[0].id;
    let app = professional_router(fixture.service.clone());

    let response = app
        .oneshot(json_request(
            Method::POST,
            &format!("/api/v1/professional-versions/{initial}/reject"),
            json!({ "reason": "late" }),
            true,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CONFLICT);
}
