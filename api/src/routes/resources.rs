use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodRouter, get};
use axum::{Json, Router};
use crm_gateway_core::envelope::Envelope;
use crm_gateway_core::options::ListParams;
use crm_gateway_core::{Operation, Outcome, Relation, ResourceKind};
use serde_json::Value;

use crate::error::AppError;
use crate::extract::{AppJson, AppQuery};
use crate::state::AppState;

/// Resource families with REST collections. Stages are reachable only
/// through `/pipelines/{id}/stages`.
const REST_RESOURCES: [ResourceKind; 7] = [
    ResourceKind::Deal,
    ResourceKind::Person,
    ResourceKind::Organization,
    ResourceKind::Activity,
    ResourceKind::Pipeline,
    ResourceKind::Note,
    ResourceKind::User,
];

pub fn router() -> Router<AppState> {
    let mut router = Router::new().route("/users/me", get(current_user));

    for kind in REST_RESOURCES {
        router = router
            .route(&format!("/{}", kind.plural()), collection_routes(kind))
            .route(&format!("/{}/{{id}}", kind.plural()), item_routes(kind));
    }

    for relation in Relation::ALL {
        let path = format!(
            "/{}/{{id}}/{}",
            relation.owner().plural(),
            relation.segment()
        );
        router = router.route(
            &path,
            get(move |State(state): State<AppState>, Path(id): Path<String>| async move {
                run(&state, Operation::Related { relation, id }).await
            }),
        );
    }

    router
}

/// `GET /{resource}` lists; `POST /{resource}` creates (writable families only).
fn collection_routes(kind: ResourceKind) -> MethodRouter<AppState> {
    let routes = get(
        move |State(state): State<AppState>, AppQuery(params): AppQuery<ListParams>| async move {
            run(&state, Operation::List { kind, params }).await
        },
    );
    if !kind.descriptor().writable {
        return routes;
    }
    routes.post(
        move |State(state): State<AppState>, AppJson(body): AppJson<Value>| async move {
            run(&state, Operation::Create { kind, body }).await
        },
    )
}

/// `GET /{resource}/{id}`; `PUT` and `DELETE` for writable families.
fn item_routes(kind: ResourceKind) -> MethodRouter<AppState> {
    let routes = get(
        move |State(state): State<AppState>, Path(id): Path<String>| async move {
            run(&state, Operation::Get { kind, id }).await
        },
    );
    if !kind.descriptor().writable {
        return routes;
    }
    routes
        .put(
            move |State(state): State<AppState>,
                  Path(id): Path<String>,
                  AppJson(body): AppJson<Value>| async move {
                run(&state, Operation::Update { kind, id, body }).await
            },
        )
        .delete(
            move |State(state): State<AppState>, Path(id): Path<String>| async move {
                run(&state, Operation::Delete { kind, id }).await
            },
        )
}

/// Current authenticated CRM user
pub async fn current_user(State(state): State<AppState>) -> Result<Response, AppError> {
    run(&state, Operation::CurrentUser).await
}

async fn run(state: &AppState, operation: Operation) -> Result<Response, AppError> {
    let kind = operation.kind();
    let outcome = state.gateway.execute(operation).await?;
    Ok(outcome_response(kind, outcome))
}

fn outcome_response(kind: ResourceKind, outcome: Outcome) -> Response {
    match outcome {
        Outcome::Listed(items) => Json(Envelope::ok(Value::Array(items))).into_response(),
        Outcome::Found(item) | Outcome::Updated(item) => Json(Envelope::ok(item)).into_response(),
        Outcome::Created(item) => (StatusCode::CREATED, Json(Envelope::ok(item))).into_response(),
        Outcome::Deleted => Json(Envelope::confirmed(format!(
            "{} deleted successfully",
            kind.label()
        )))
        .into_response(),
        Outcome::NotFound { message } => {
            (StatusCode::NOT_FOUND, Json(Envelope::failure(message))).into_response()
        }
    }
}
