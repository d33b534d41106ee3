use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::domain::{ScreeningProcess, ScreeningStatus, StepOutcome};
use super::repository::{ScreeningNotifier, ScreeningRepository};
use super::service::{
    Assignment, DocumentRequirement, NewScreeningProcess, PaymentInfo, ScreeningError,
    ScreeningService,
};
use crate::ids::{DocumentId, OrganizationId, ScreeningProcessId};
use crate::storage::RepositoryError;
use crate::tenancy::OrganizationDirectory;
use crate::workflows::professionals::router::professional_error_response;
use crate::workflows::professionals::{ProfessionalRepository, ProfessionalSnapshot};
use crate::workflows::{actor_from, missing_actor};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub organization_id: OrganizationId,
    #[serde(default)]
    pub status: Option<ScreeningStatus>,
}

#[derive(Debug, Deserialize)]
pub struct OutcomeRequest {
    pub outcome: StepOutcome,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SelectDocumentsRequest {
    pub documents: Vec<DocumentRequirement>,
}

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub file_reference: String,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub decision: StepOutcome,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReasonRequest {
    pub reason: String,
}

type SharedService<S, R, O, N> = Arc<ScreeningService<S, R, O, N>>;

/// Router exposing the screening workflow to staff and, through the access token, to professionals.
pub fn screening_router<S, R, O, N>(service: SharedService<S, R, O, N>) -> Router
where
    S: ScreeningRepository + 'static,
    R: ProfessionalRepository + 'static,
    O: OrganizationDirectory + 'static,
    N: ScreeningNotifier + 'static,
{
    Router::new()
        .route(
            "/api/v1/screenings",
            post(create_handler::<S, R, O, N>).get(list_handler::<S, R, O, N>),
        )
        .route(
            "/api/v1/screenings/:process_id",
            get(get_handler::<S, R, O, N>),
        )
        .route(
            "/api/v1/screenings/:process_id/conversation",
            post(conversation_handler::<S, R, O, N>),
        )
        .route(
            "/api/v1/screenings/:process_id/professional-data",
            post(professional_data_handler::<S, R, O, N>),
        )
        .route(
            "/api/v1/screenings/:process_id/documents",
            post(select_documents_handler::<S, R, O, N>),
        )
        .route(
            "/api/v1/screenings/:process_id/documents/:document_id/upload",
            post(upload_handler::<S, R, O, N>),
        )
        .route(
            "/api/v1/screenings/:process_id/documents/:document_id/review",
            post(review_handler::<S, R, O, N>),
        )
        .route(
            "/api/v1/screenings/:process_id/document-upload/complete",
            post(complete_upload_handler::<S, R, O, N>),
        )
        .route(
            "/api/v1/screenings/:process_id/document-review/complete",
            post(complete_review_handler::<S, R, O, N>),
        )
        .route(
            "/api/v1/screenings/:process_id/payment-info",
            post(payment_info_handler::<S, R, O, N>),
        )
        .route(
            "/api/v1/screenings/:process_id/client-validation",
            post(client_validation_handler::<S, R, O, N>),
        )
        .route(
            "/api/v1/screenings/:process_id/skip",
            post(skip_handler::<S, R, O, N>),
        )
        .route(
            "/api/v1/screenings/:process_id/reject",
            post(reject_handler::<S, R, O, N>),
        )
        .route(
            "/api/v1/screenings/:process_id/cancel",
            post(cancel_handler::<S, R, O, N>),
        )
        .route(
            "/api/v1/screenings/:process_id/token/renew",
            post(renew_token_handler::<S, R, O, N>),
        )
        .route(
            "/api/v1/screenings/:process_id/assignment",
            patch(assignment_handler::<S, R, O, N>),
        )
        .route(
            "/api/v1/screening-access/:token",
            get(access_handler::<S, R, O, N>),
        )
        .route(
            "/api/v1/screening-access/:token/documents/:document_id",
            post(access_upload_handler::<S, R, O, N>),
        )
        .with_state(service)
}

/// Maps screening errors onto HTTP statuses.
pub(crate) fn screening_error_response(error: ScreeningError) -> Response {
    let status = match error {
        ScreeningError::DocumentsRejected { rejected } => {
            let payload = json!({
                "error": "documents rejected; correction requested",
                "rejected_documents": rejected,
            });
            return (StatusCode::CONFLICT, axum::Json(payload)).into_response();
        }
        ScreeningError::Professional(error) => return professional_error_response(error),
        ScreeningError::NotFound
        | ScreeningError::DocumentNotFound(_)
        | ScreeningError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        ScreeningError::ActiveProcessExists { .. }
        | ScreeningError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        ScreeningError::InvalidConfiguration(_)
        | ScreeningError::Terminal { .. }
        | ScreeningError::StepNotCurrent { .. }
        | ScreeningError::StepNotConfigured(_)
        | ScreeningError::StepRequired(_)
        | ScreeningError::InvalidStepData(_)
        | ScreeningError::IncompleteStep(_)
        | ScreeningError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ScreeningError::InvalidToken | ScreeningError::TokenExpired => StatusCode::UNAUTHORIZED,
        ScreeningError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let payload = json!({
        "error": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}

fn respond(result: Result<impl serde::Serialize, ScreeningError>, success: StatusCode) -> Response {
    match result {
        Ok(body) => (success, axum::Json(body)).into_response(),
        Err(error) => screening_error_response(error),
    }
}

pub(crate) async fn create_handler<S, R, O, N>(
    State(service): State<SharedService<S, R, O, N>>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<NewScreeningProcess>,
) -> Response
where
    S: ScreeningRepository + 'static,
    R: ProfessionalRepository + 'static,
    O: OrganizationDirectory + 'static,
    N: ScreeningNotifier + 'static,
{
    let Some(actor) = actor_from(&headers) else {
        return missing_actor();
    };
    respond(
        service
            .create(request, &actor)
            .map(ScreeningProcess::into_issued),
        StatusCode::CREATED,
    )
}

pub(crate) async fn list_handler<S, R, O, N>(
    State(service): State<SharedService<S, R, O, N>>,
    Query(query): Query<ListQuery>,
    headers: HeaderMap,
) -> Response
where
    S: ScreeningRepository + 'static,
    R: ProfessionalRepository + 'static,
    O: OrganizationDirectory + 'static,
    N: ScreeningNotifier + 'static,
{
    if actor_from(&headers).is_none() {
        return missing_actor();
    }
    respond(
        service.list(&query.organization_id, query.status),
        StatusCode::OK,
    )
}

pub(crate) async fn get_handler<S, R, O, N>(
    State(service): State<SharedService<S, R, O, N>>,
    Path(process_id): Path<ScreeningProcessId>,
    headers: HeaderMap,
) -> Response
where
    S: ScreeningRepository + 'static,
    R: ProfessionalRepository + 'static,
    O: OrganizationDirectory + 'static,
    N: ScreeningNotifier + 'static,
{
    if actor_from(&headers).is_none() {
        return missing_actor();
    }
    respond(service.get(&process_id), StatusCode::OK)
}

pub(crate) async fn conversation_handler<S, R, O, N>(
    State(service): State<SharedService<S, R, O, N>>,
    Path(process_id): Path<ScreeningProcessId>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<OutcomeRequest>,
) -> Response
where
    S: ScreeningRepository + 'static,
    R: ProfessionalRepository + 'static,
    O: OrganizationDirectory + 'static,
    N: ScreeningNotifier + 'static,
{
    let Some(actor) = actor_from(&headers) else {
        return missing_actor();
    };
    respond(
        service.complete_conversation(&process_id, request.outcome, request.notes, &actor),
        StatusCode::OK,
    )
}

pub(crate) async fn professional_data_handler<S, R, O, N>(
    State(service): State<SharedService<S, R, O, N>>,
    Path(process_id): Path<ScreeningProcessId>,
    headers: HeaderMap,
    axum::Json(snapshot): axum::Json<ProfessionalSnapshot>,
) -> Response
where
    S: ScreeningRepository + 'static,
    R: ProfessionalRepository + 'static,
    O: OrganizationDirectory + 'static,
    N: ScreeningNotifier + 'static,
{
    let Some(actor) = actor_from(&headers) else {
        return missing_actor();
    };
    respond(
        service.complete_professional_data(&process_id, snapshot, &actor),
        StatusCode::OK,
    )
}

pub(crate) async fn select_documents_handler<S, R, O, N>(
    State(service): State<SharedService<S, R, O, N>>,
    Path(process_id): Path<ScreeningProcessId>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<SelectDocumentsRequest>,
) -> Response
where
    S: ScreeningRepository + 'static,
    R: ProfessionalRepository + 'static,
    O: OrganizationDirectory + 'static,
    N: ScreeningNotifier + 'static,
{
    if actor_from(&headers).is_none() {
        return missing_actor();
    }
    respond(
        service.select_required_documents(&process_id, request.documents),
        StatusCode::OK,
    )
}

pub(crate) async fn upload_handler<S, R, O, N>(
    State(service): State<SharedService<S, R, O, N>>,
    Path((process_id, document_id)): Path<(ScreeningProcessId, DocumentId)>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<UploadRequest>,
) -> Response
where
    S: ScreeningRepository + 'static,
    R: ProfessionalRepository + 'static,
    O: OrganizationDirectory + 'static,
    N: ScreeningNotifier + 'static,
{
    let Some(actor) = actor_from(&headers) else {
        return missing_actor();
    };
    respond(
        service.upload_document(&process_id, &document_id, &request.file_reference, &actor),
        StatusCode::OK,
    )
}

pub(crate) async fn review_handler<S, R, O, N>(
    State(service): State<SharedService<S, R, O, N>>,
    Path((process_id, document_id)): Path<(ScreeningProcessId, DocumentId)>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<ReviewRequest>,
) -> Response
where
    S: ScreeningRepository + 'static,
    R: ProfessionalRepository + 'static,
    O: OrganizationDirectory + 'static,
    N: ScreeningNotifier + 'static,
{
    let Some(actor) = actor_from(&headers) else {
        return missing_actor();
    };
    respond(
        service.review_document(
            &process_id,
            &document_id,
            request.decision,
            request.note,
            &actor,
        ),
        StatusCode::OK,
    )
}

pub(crate) async fn complete_upload_handler<S, R, O, N>(
    State(service): State<SharedService<S, R, O, N>>,
    Path(process_id): Path<ScreeningProcessId>,
    headers: HeaderMap,
) -> Response
where
    S: ScreeningRepository + 'static,
    R: ProfessionalRepository + 'static,
    O: OrganizationDirectory + 'static,
    N: ScreeningNotifier + 'static,
{
    let Some(actor) = actor_from(&headers) else {
        return missing_actor();
    };
    respond(
        service.complete_document_upload(&process_id, &actor),
        StatusCode::OK,
    )
}

pub(crate) async fn complete_review_handler<S, R, O, N>(
    State(service): State<SharedService<S, R, O, N>>,
    Path(process_id): Path<ScreeningProcessId>,
    headers: HeaderMap,
) -> Response
where
    S: ScreeningRepository + 'static,
    R: ProfessionalRepository + 'static,
    O: OrganizationDirectory + 'static,
    N: ScreeningNotifier + 'static,
{
    let Some(actor) = actor_from(&headers) else {
        return missing_actor();
    };
    respond(
        service.complete_document_review(&process_id, &actor),
        StatusCode::OK,
    )
}

pub(crate) async fn payment_info_handler<S, R, O, N>(
    State(service): State<SharedService<S, R, O, N>>,
    Path(process_id): Path<ScreeningProcessId>,
    headers: HeaderMap,
    axum::Json(payment): axum::Json<PaymentInfo>,
) -> Response
where
    S: ScreeningRepository + 'static,
    R: ProfessionalRepository + 'static,
    O: OrganizationDirectory + 'static,
    N: ScreeningNotifier + 'static,
{
    let Some(actor) = actor_from(&headers) else {
        return missing_actor();
    };
    respond(
        service.complete_payment_info(&process_id, payment, &actor),
        StatusCode::OK,
    )
}

pub(crate) async fn client_validation_handler<S, R, O, N>(
    State(service): State<SharedService<S, R, O, N>>,
    Path(process_id): Path<ScreeningProcessId>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<OutcomeRequest>,
) -> Response
where
    S: ScreeningRepository + 'static,
    R: ProfessionalRepository + 'static,
    O: OrganizationDirectory + 'static,
    N: ScreeningNotifier + 'static,
{
    let Some(actor) = actor_from(&headers) else {
        return missing_actor();
    };
    respond(
        service.complete_client_validation(&process_id, request.outcome, request.notes, &actor),
        StatusCode::OK,
    )
}

pub(crate) async fn skip_handler<S, R, O, N>(
    State(service): State<SharedService<S, R, O, N>>,
    Path(process_id): Path<ScreeningProcessId>,
    headers: HeaderMap,
) -> Response
where
    S: ScreeningRepository + 'static,
    R: ProfessionalRepository + 'static,
    O: OrganizationDirectory + 'static,
    N: ScreeningNotifier + 'static,
{
    let Some(actor) = actor_from(&headers) else {
        return missing_actor();
    };
    respond(service.skip_step(&process_id, &actor), StatusCode::OK)
}

pub(crate) async fn reject_handler<S, R, O, N>(
    State(service): State<SharedService<S, R, O, N>>,
    Path(process_id): Path<ScreeningProcessId>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<ReasonRequest>,
) -> Response
where
    S: ScreeningRepository + 'static,
    R: ProfessionalRepository + 'static,
    O: OrganizationDirectory + 'static,
    N: ScreeningNotifier + 'static,
{
    let Some(actor) = actor_from(&headers) else {
        return missing_actor();
    };
    respond(
        service.reject(&process_id, &request.reason, &actor),
        StatusCode::OK,
    )
}

pub(crate) async fn cancel_handler<S, R, O, N>(
    State(service): State<SharedService<S, R, O, N>>,
    Path(process_id): Path<ScreeningProcessId>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<ReasonRequest>,
) -> Response
where
    S: ScreeningRepository + 'static,
    R: ProfessionalRepository + 'static,
    O: OrganizationDirectory + 'static,
    N: ScreeningNotifier + 'static,
{
    let Some(actor) = actor_from(&headers) else {
        return missing_actor();
    };
    respond(
        service.cancel(&process_id, &request.reason, &actor),
        StatusCode::OK,
    )
}

pub(crate) async fn renew_token_handler<S, R, O, N>(
    State(service): State<SharedService<S, R, O, N>>,
    Path(process_id): Path<ScreeningProcessId>,
    headers: HeaderMap,
) -> Response
where
    S: ScreeningRepository + 'static,
    R: ProfessionalRepository + 'static,
    O: OrganizationDirectory + 'static,
    N: ScreeningNotifier + 'static,
{
    if actor_from(&headers).is_none() {
        return missing_actor();
    }
    respond(
        service
            .renew_access_token(&process_id, Utc::now())
            .map(ScreeningProcess::into_issued),
        StatusCode::OK,
    )
}

pub(crate) async fn assignment_handler<S, R, O, N>(
    State(service): State<SharedService<S, R, O, N>>,
    Path(process_id): Path<ScreeningProcessId>,
    headers: HeaderMap,
    axum::Json(assignment): axum::Json<Assignment>,
) -> Response
where
    S: ScreeningRepository + 'static,
    R: ProfessionalRepository + 'static,
    O: OrganizationDirectory + 'static,
    N: ScreeningNotifier + 'static,
{
    if actor_from(&headers).is_none() {
        return missing_actor();
    }
    respond(service.assign(&process_id, assignment), StatusCode::OK)
}

pub(crate) async fn access_handler<S, R, O, N>(
    State(service): State<SharedService<S, R, O, N>>,
    Path(token): Path<String>,
) -> Response
where
    S: ScreeningRepository + 'static,
    R: ProfessionalRepository + 'static,
    O: OrganizationDirectory + 'static,
    N: ScreeningNotifier + 'static,
{
    respond(
        service
            .authenticate(&token, Utc::now())
            .map(|process| process.access_view()),
        StatusCode::OK,
    )
}

pub(crate) async fn access_upload_handler<S, R, O, N>(
    State(service): State<SharedService<S, R, O, N>>,
    Path((token, document_id)): Path<(String, DocumentId)>,
    axum::Json(request): axum::Json<UploadRequest>,
) -> Response
where
    S: ScreeningRepository + 'static,
    R: ProfessionalRepository + 'static,
    O: OrganizationDirectory + 'static,
    N: ScreeningNotifier + 'static,
{
    respond(
        service
            .upload_with_token(&token, &document_id, &request.file_reference, Utc::now())
            .map(|process| process.access_view()),
        StatusCode::OK,
    )
}
