use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::{Organization, OrganizationDirectory, OrganizationSettings};
use crate::ids::OrganizationId;
use crate::storage::RepositoryError;
use crate::validation::require_text;

#[derive(Debug, Deserialize)]
pub struct NewOrganization {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<OrganizationId>,
    #[serde(default)]
    pub settings: OrganizationSettings,
}

/// Router exposing the minimal tenant registration needed to drive screenings.
pub fn organization_router<D>(directory: Arc<D>) -> Router
where
    D: OrganizationDirectory + 'static,
{
    Router::new()
        .route("/api/v1/organizations", post(create_handler::<D>))
        .route(
            "/api/v1/organizations/:organization_id",
            get(fetch_handler::<D>),
        )
        .with_state(directory)
}

pub(crate) async fn create_handler<D>(
    State(directory): State<Arc<D>>,
    Json(payload): Json<NewOrganization>,
) -> Response
where
    D: OrganizationDirectory + 'static,
{
    let name = match require_text("name", &payload.name) {
        Ok(name) => name,
        Err(err) => {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    };

    if let Some(parent_id) = payload.parent_id {
        match directory.fetch(&parent_id) {
            Ok(Some(parent)) if parent.parent_id.is_none() => {}
            Ok(Some(_)) => {
                return (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({ "error": "parent organization is itself a child" })),
                )
                    .into_response()
            }
            Ok(None) => {
                return (
                    StatusCode::NOT_FOUND,
                    Json(json!({ "error": format!("organization {parent_id} not found") })),
                )
                    .into_response()
            }
            Err(err) => return repository_failure(err),
        }
    }

    let organization = Organization {
        id: OrganizationId::new(),
        name,
        parent_id: payload.parent_id,
        settings: payload.settings,
        created_at: Utc::now(),
    };

    match directory.insert(organization) {
        Ok(stored) => (StatusCode::CREATED, Json(stored)).into_response(),
        Err(err) => repository_failure(err),
    }
}

pub(crate) async fn fetch_handler<D>(
    State(directory): State<Arc<D>>,
    Path(organization_id): Path<OrganizationId>,
) -> Response
where
    D: OrganizationDirectory + 'static,
{
    match directory.fetch(&organization_id) {
        Ok(Some(organization)) => (StatusCode::OK, Json(organization)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("organization {organization_id} not found") })),
        )
            .into_response(),
        Err(err) => repository_failure(err),
    }
}

fn repository_failure(err: RepositoryError) -> Response {
    let status = match err {
        RepositoryError::Conflict => StatusCode::CONFLICT,
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryOrganizationDirectory;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn create(app: &Router, body: Value) -> (StatusCode, Value) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/organizations")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("body");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[tokio::test]
    async fn hierarchies_stop_at_one_level() {
        let app = organization_router(Arc::new(InMemoryOrganizationDirectory::default()));

        let (status, parent) = create(&app, json!({ "name": "Rede Saude" })).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(parent["settings"]["client_validation_enabled"], true);

        let (status, child) = create(
            &app,
            json!({
                "name": "Rede Saude Norte",
                "parent_id": parent["id"],
                "settings": { "client_validation_enabled": false, "token_ttl_hours": 24 }
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(child["settings"]["token_ttl_hours"], 24);

        let (status, _) = create(
            &app,
            json!({ "name": "Posto Norte", "parent_id": child["id"] }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn blank_names_and_unknown_parents_are_rejected() {
        let app = organization_router(Arc::new(InMemoryOrganizationDirectory::default()));

        let (status, _) = create(&app, json!({ "name": "   " })).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = create(
            &app,
            json!({ "name": "Orphan", "parent_id": OrganizationId::new() }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
