use std::sync::Arc;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Path, Query, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{
    DocumentSet, EmploymentDetails, PersonalDetails, RegistrationFilter, RegistrationId,
    RegistrationStatus, VerificationDetails,
};
use super::repository::RegistrationStore;
use super::service::{RegistrationError, RegistrationWorkflow};

/// Router builder exposing every registration workflow operation over JSON.
pub fn registration_router<S>(workflow: Arc<RegistrationWorkflow<S>>) -> Router
where
    S: RegistrationStore + 'static,
{
    Router::new()
        .route(
            "/api/v1/registrations",
            post(create_handler::<S>).get(list_handler::<S>),
        )
        .route(
            "/api/v1/registrations/:registration_id",
            get(detail_handler::<S>),
        )
        .route(
            "/api/v1/registrations/:registration_id/verification",
            put(verification_handler::<S>),
        )
        .route(
            "/api/v1/registrations/:registration_id/personal-info",
            put(personal_info_handler::<S>),
        )
        .route(
            "/api/v1/registrations/:registration_id/employment-info",
            put(employment_info_handler::<S>),
        )
        .route(
            "/api/v1/registrations/:registration_id/documents",
            put(documents_handler::<S>),
        )
        .route(
            "/api/v1/registrations/:registration_id/submit",
            post(submit_handler::<S>),
        )
        .route(
            "/api/v1/registrations/:registration_id/approve",
            post(approve_handler::<S>),
        )
        .route(
            "/api/v1/registrations/:registration_id/reject",
            post(reject_handler::<S>),
        )
        .route(
            "/api/v1/registrations/:registration_id/incomplete",
            post(incomplete_handler::<S>),
        )
        .route(
            "/api/v1/registrations/:registration_id/history",
            get(history_handler::<S>),
        )
        .with_state(workflow)
}

type Workflow<S> = State<Arc<RegistrationWorkflow<S>>>;

/// JSON request body whose rejections use the same `{"error": ..}` shape as workflow errors.
pub(crate) struct JsonBody<T>(pub(crate) T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                let payload = json!({ "error": rejection.body_text() });
                Err((rejection.status(), axum::Json(payload)).into_response())
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListQuery {
    status: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct DetailQuery {
    #[serde(default)]
    include_history: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitRequest {
    #[serde(default)]
    declaration: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewRequest {
    reviewer: String,
    #[serde(default)]
    reason: String,
}

pub(crate) async fn create_handler<S>(State(workflow): Workflow<S>) -> Response
where
    S: RegistrationStore + 'static,
{
    match workflow.create_registration().await {
        Ok(registration) => (StatusCode::CREATED, axum::Json(registration)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn list_handler<S>(
    State(workflow): Workflow<S>,
    Query(query): Query<ListQuery>,
) -> Response
where
    S: RegistrationStore + 'static,
{
    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match RegistrationStatus::parse(raw) {
            Some(status) => Some(status),
            None => {
                let payload = json!({
                    "error": format!("unknown registration status '{raw}'"),
                });
                return (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response();
            }
        },
    };
    let filter = RegistrationFilter {
        status,
        limit: query.limit.unwrap_or(RegistrationFilter::DEFAULT_LIMIT),
    };

    match workflow.list_registrations(filter).await {
        Ok(registrations) => (StatusCode::OK, axum::Json(registrations)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn detail_handler<S>(
    State(workflow): Workflow<S>,
    Path(registration_id): Path<String>,
    Query(query): Query<DetailQuery>,
) -> Response
where
    S: RegistrationStore + 'static,
{
    let id = RegistrationId(registration_id);
    match workflow.get_registration(&id, query.include_history).await {
        Ok(aggregate) => (StatusCode::OK, axum::Json(aggregate)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn verification_handler<S>(
    State(workflow): Workflow<S>,
    Path(registration_id): Path<String>,
    JsonBody(details): JsonBody<VerificationDetails>,
) -> Response
where
    S: RegistrationStore + 'static,
{
    let id = RegistrationId(registration_id);
    match workflow.save_verification_data(&id, details).await {
        Ok(saved) => (StatusCode::OK, axum::Json(saved)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn personal_info_handler<S>(
    State(workflow): Workflow<S>,
    Path(registration_id): Path<String>,
    JsonBody(details): JsonBody<PersonalDetails>,
) -> Response
where
    S: RegistrationStore + 'static,
{
    let id = RegistrationId(registration_id);
    match workflow.save_personal_info(&id, details).await {
        Ok(saved) => (StatusCode::OK, axum::Json(saved)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn employment_info_handler<S>(
    State(workflow): Workflow<S>,
    Path(registration_id): Path<String>,
    JsonBody(details): JsonBody<EmploymentDetails>,
) -> Response
where
    S: RegistrationStore + 'static,
{
    let id = RegistrationId(registration_id);
    match workflow.save_employment_info(&id, details).await {
        Ok(saved) => (StatusCode::OK, axum::Json(saved)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn documents_handler<S>(
    State(workflow): Workflow<S>,
    Path(registration_id): Path<String>,
    JsonBody(documents): JsonBody<DocumentSet>,
) -> Response
where
    S: RegistrationStore + 'static,
{
    let id = RegistrationId(registration_id);
    match workflow.save_document_uploads(&id, documents).await {
        Ok(saved) => (StatusCode::OK, axum::Json(saved)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn submit_handler<S>(
    State(workflow): Workflow<S>,
    Path(registration_id): Path<String>,
    JsonBody(request): JsonBody<SubmitRequest>,
) -> Response
where
    S: RegistrationStore + 'static,
{
    let id = RegistrationId(registration_id);
    match workflow.submit_registration(&id, request.declaration).await {
        Ok(registration) => (StatusCode::OK, axum::Json(registration)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn approve_handler<S>(
    State(workflow): Workflow<S>,
    Path(registration_id): Path<String>,
    JsonBody(request): JsonBody<ReviewRequest>,
) -> Response
where
    S: RegistrationStore + 'static,
{
    let id = RegistrationId(registration_id);
    match workflow.approve_registration(&id, &request.reviewer).await {
        Ok(registration) => (StatusCode::OK, axum::Json(registration)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn reject_handler<S>(
    State(workflow): Workflow<S>,
    Path(registration_id): Path<String>,
    JsonBody(request): JsonBody<ReviewRequest>,
) -> Response
where
    S: RegistrationStore + 'static,
{
    let id = RegistrationId(registration_id);
    match workflow
        .reject_registration(&id, &request.reviewer, &request.reason)
        .await
    {
        Ok(registration) => (StatusCode::OK, axum::Json(registration)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn incomplete_handler<S>(
    State(workflow): Workflow<S>,
    Path(registration_id): Path<String>,
    JsonBody(request): JsonBody<ReviewRequest>,
) -> Response
where
    S: RegistrationStore + 'static,
{
    let id = RegistrationId(registration_id);
    match workflow
        .mark_incomplete(&id, &request.reviewer, &request.reason)
        .await
    {
        Ok(registration) => (StatusCode::OK, axum::Json(registration)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn history_handler<S>(
    State(workflow): Workflow<S>,
    Path(registration_id): Path<String>,
) -> Response
where
    S: RegistrationStore + 'static,
{
    let id = RegistrationId(registration_id);
    match workflow.registration_history(&id).await {
        Ok(history) => (StatusCode::OK, axum::Json(history)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) fn status_for(error: &RegistrationError) -> StatusCode {
    match error {
        RegistrationError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        RegistrationError::NotFound(_) => StatusCode::NOT_FOUND,
        RegistrationError::DuplicateIdentifier { .. } => StatusCode::CONFLICT,
        RegistrationError::Persistence(err) if err.is_unavailable() => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        RegistrationError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: RegistrationError) -> Response {
    let payload = json!({
        "error": error.to_string(),
    });
    (status_for(&error), axum::Json(payload)).into_response()
}
