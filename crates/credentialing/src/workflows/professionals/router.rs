use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::VersionSourceType;
use super::repository::ProfessionalRepository;
use super::service::{
    NewProfessional, NewVersion, PersonalInfoPatch, ProfessionalError, ProfessionalService,
};
use super::snapshot::ProfessionalSnapshot;
use crate::ids::{ProfessionalId, VersionId};
use crate::storage::RepositoryError;
use crate::tenancy::OrganizationDirectory;
use crate::workflows::{actor_from, missing_actor};

/// Body of `POST /api/v1/professionals/:professional_id/versions`.
#[derive(Debug, Deserialize)]
pub struct VersionRequest {
    pub snapshot: ProfessionalSnapshot,
    #[serde(default = "default_source_type")]
    pub source_type: VersionSourceType,
    #[serde(default)]
    pub source_id: Option<String>,
}

fn default_source_type() -> VersionSourceType {
    VersionSourceType::Direct
}

#[derive(Debug, Deserialize)]
pub struct RejectVersionRequest {
    pub reason: String,
}

/// Router exposing registration, snapshots and the version lifecycle.
pub fn professional_router<R, O>(service: Arc<ProfessionalService<R, O>>) -> Router
where
    R: ProfessionalRepository + 'static,
    O: OrganizationDirectory + 'static,
{
    Router::new()
        .route("/api/v1/professionals", post(register_handler::<R, O>))
        .route(
            "/api/v1/professionals/:professional_id",
            get(get_handler::<R, O>),
        )
        .route(
            "/api/v1/professionals/:professional_id/snapshot",
            get(snapshot_handler::<R, O>),
        )
        .route(
            "/api/v1/professionals/:professional_id/personal-info",
            patch(personal_info_handler::<R, O>),
        )
        .route(
            "/api/v1/professionals/:professional_id/versions",
            post(create_version_handler::<R, O>).get(list_versions_handler::<R, O>),
        )
        .route(
            "/api/v1/professional-versions/:version_id",
            get(version_handler::<R, O>),
        )
        .route(
            "/api/v1/professional-versions/:version_id/diffs",
            get(diffs_handler::<R, O>),
        )
        .route(
            "/api/v1/professional-versions/:version_id/apply",
            post(apply_handler::<R, O>),
        )
        .route(
            "/api/v1/professional-versions/:version_id/reject",
            post(reject_handler::<R, O>),
        )
        .with_state(service)
}

/// Maps professional errors onto HTTP statuses.
pub(crate) fn professional_error_response(error: ProfessionalError) -> Response {
    let status = match &error {
        ProfessionalError::NotFound
        | ProfessionalError::VersionNotFound
        | ProfessionalError::UnknownOrganization(_)
        | ProfessionalError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        ProfessionalError::DuplicateCpf { .. }
        | ProfessionalError::DuplicateEmail { .. }
        | ProfessionalError::DuplicateCouncilRegistration { .. }
        | ProfessionalError::VersionNotPending { .. }
        | ProfessionalError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        ProfessionalError::Validation(_)
        | ProfessionalError::UnknownSpecialty(_)
        | ProfessionalError::DuplicateNaturalKey { .. }
        | ProfessionalError::InvalidSnapshot(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ProfessionalError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let payload = json!({
        "error": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}

pub(crate) async fn register_handler<R, O>(
    State(service): State<Arc<ProfessionalService<R, O>>>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<NewProfessional>,
) -> Response
where
    R: ProfessionalRepository + 'static,
    O: OrganizationDirectory + 'static,
{
    let Some(actor) = actor_from(&headers) else {
        return missing_actor();
    };
    match service.register(request, &actor) {
        Ok(record) => (StatusCode::CREATED, axum::Json(record)).into_response(),
        Err(error) => professional_error_response(error),
    }
}

pub(crate) async fn get_handler<R, O>(
    State(service): State<Arc<ProfessionalService<R, O>>>,
    Path(professional_id): Path<ProfessionalId>,
) -> Response
where
    R: ProfessionalRepository + 'static,
    O: OrganizationDirectory + 'static,
{
    match service.get(&professional_id) {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(error) => professional_error_response(error),
    }
}

pub(crate) async fn snapshot_handler<R, O>(
    State(service): State<Arc<ProfessionalService<R, O>>>,
    Path(professional_id): Path<ProfessionalId>,
) -> Response
where
    R: ProfessionalRepository + 'static,
    O: OrganizationDirectory + 'static,
{
    match service.snapshot(&professional_id) {
        Ok(snapshot) => (StatusCode::OK, axum::Json(snapshot)).into_response(),
        Err(error) => professional_error_response(error),
    }
}

pub(crate) async fn personal_info_handler<R, O>(
    State(service): State<Arc<ProfessionalService<R, O>>>,
    Path(professional_id): Path<ProfessionalId>,
    headers: HeaderMap,
    axum::Json(changes): axum::Json<PersonalInfoPatch>,
) -> Response
where
    R: ProfessionalRepository + 'static,
    O: OrganizationDirectory + 'static,
{
    let Some(actor) = actor_from(&headers) else {
        return missing_actor();
    };
    match service.update_personal_info(&professional_id, changes, &actor) {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(error) => professional_error_response(error),
    }
}

pub(crate) async fn create_version_handler<R, O>(
    State(service): State<Arc<ProfessionalService<R, O>>>,
    Path(professional_id): Path<ProfessionalId>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<VersionRequest>,
) -> Response
where
    R: ProfessionalRepository + 'static,
    O: OrganizationDirectory + 'static,
{
    let Some(actor) = actor_from(&headers) else {
        return missing_actor();
    };
    let request = NewVersion {
        professional_id,
        snapshot: request.snapshot,
        source_type: request.source_type,
        source_id: request.source_id,
        created_by: actor,
    };
    match service.create_version(request) {
        Ok(outcome) => (StatusCode::CREATED, axum::Json(outcome)).into_response(),
        Err(error) => professional_error_response(error),
    }
}

pub(crate) async fn list_versions_handler<R, O>(
    State(service): State<Arc<ProfessionalService<R, O>>>,
    Path(professional_id): Path<ProfessionalId>,
) -> Response
where
    R: ProfessionalRepository + 'static,
    O: OrganizationDirectory + 'static,
{
    match service.versions(&professional_id) {
        Ok(versions) => (StatusCode::OK, axum::Json(versions)).into_response(),
        Err(error) => professional_error_response(error),
    }
}

pub(crate) async fn version_handler<R, O>(
    State(service): State<Arc<ProfessionalService<R, O>>>,
    Path(version_id): Path<VersionId>,
) -> Response
where
    R: ProfessionalRepository + 'static,
    O: OrganizationDirectory + 'static,
{
    match service.version(&version_id) {
        Ok(version) => (StatusCode::OK, axum::Json(version)).into_response(),
        Err(error) => professional_error_response(error),
    }
}

pub(crate) async fn diffs_handler<R, O>(
    State(service): State<Arc<ProfessionalService<R, O>>>,
    Path(version_id): Path<VersionId>,
) -> Response
where
    R: ProfessionalRepository + 'static,
    O: OrganizationDirectory + 'static,
{
    match service.diffs(&version_id) {
        Ok(diffs) => (StatusCode::OK, axum::Json(diffs)).into_response(),
        Err(error) => professional_error_response(error),
    }
}

pub(crate) async fn apply_handler<R, O>(
    State(service): State<Arc<ProfessionalService<R, O>>>,
    Path(version_id): Path<VersionId>,
    headers: HeaderMap,
) -> Response
where
    R: ProfessionalRepository + 'static,
    O: OrganizationDirectory + 'static,
{
    let Some(actor) = actor_from(&headers) else {
        return missing_actor();
    };
    match service.apply_version(&version_id, &actor) {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(error) => professional_error_response(error),
    }
}

pub(crate) async fn reject_handler<R, O>(
    State(service): State<Arc<ProfessionalService<R, O>>>,
    Path(version_id): Path<VersionId>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<RejectVersionRequest>,
) -> Response
where
    R: ProfessionalRepository + 'static,
    O: OrganizationDirectory + 'static,
{
    let Some(actor) = actor_from(&headers) else {
        return missing_actor();
    };
    match service.reject_version(&version_id, &request.reason, &actor) {
        Ok(version) => (StatusCode::OK, axum::Json(version)).into_response(),
        Err(error) => professional_error_response(error),
    }
}
