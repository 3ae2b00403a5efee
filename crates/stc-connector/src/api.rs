//! Control API.
//!
//! - `GET /Modules` lists every module that declares endpoints, with its status
//! - `POST /Modules/State` starts or stops a module: `{"on": true, "moduleId": "w1"}`
//! - `GET /{moduleId}{path}` serves the GET operations modules declare

use crate::lifecycle::LifecycleManager;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use stc_common::{Error, ModuleID};
use stc_module_api::{Endpoint, EndpointError, EndpointHandler, HttpOperation, Status};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const MODULES_PATH: &str = "/Modules";
const STATE_PATH: &str = "/Modules/State";

/// Shared state of the control API.
#[derive(Clone)]
pub struct ApiState {
    lifecycle: LifecycleManager,
    started: String,
}

impl ApiState {
    pub fn new(lifecycle: LifecycleManager, started: DateTime<Utc>) -> Self {
        Self {
            lifecycle,
            started: started.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Response of `GET /Modules`.
#[derive(Debug, Serialize)]
pub struct ModulesInfo {
    pub started: String,
    pub modules: Vec<ModuleInfo>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInfo {
    pub id: ModuleID,
    pub name: String,
    pub description: String,
    pub file_name: String,
    pub file_path: String,
    pub status: Status,
    pub endpoints: Vec<Endpoint>,
}

/// Body of `POST /Modules/State`, echoed back with any errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleState {
    #[serde(default)]
    pub on: bool,
    #[serde(default)]
    pub module_id: String,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Creates the control router, including every module-declared GET operation.
pub fn create_router(state: ApiState) -> Router {
    let mut router = Router::new()
        .route(MODULES_PATH, get(modules_handler))
        .route(STATE_PATH, post(state_handler));

    let mut mounted: HashSet<String> =
        [MODULES_PATH, STATE_PATH].iter().map(|p| p.to_string()).collect();

    for handle in state.lifecycle.registry().list() {
        for endpoint in handle.prefixed_endpoints() {
            for op in endpoint.operations {
                if op.method != HttpOperation::Get {
                    debug!("[API] Skipping {} {}, only GET is served", op.method, op.path);
                    continue;
                }
                if op.path.contains([':', '*']) {
                    warn!("[API] Skipping {}, path parameters are not supported", op.path);
                    continue;
                }
                if !mounted.insert(op.path.clone()) {
                    warn!("[API] Skipping {}, path already registered", op.path);
                    continue;
                }

                debug!("[API] Registering GET {} for module {}", op.path, handle.id());
                let handler = Arc::clone(&op.handler);
                router = router.route(
                    &op.path,
                    get(move || {
                        let handler = Arc::clone(&handler);
                        async move { module_endpoint(handler) }
                    }),
                );
            }
        }
    }

    router.with_state(state)
}

/// Snapshot of all modules declaring endpoints, sorted by ID.
async fn modules_handler(State(state): State<ApiState>) -> Json<ModulesInfo> {
    let modules = state
        .lifecycle
        .registry()
        .list()
        .into_iter()
        .filter(|handle| !handle.endpoints().is_empty())
        .map(|handle| ModuleInfo {
            id: handle.id().clone(),
            name: handle.name().to_string(),
            description: handle.description().to_string(),
            file_name: handle.data().file_name().to_string(),
            file_path: handle.data().file_path().display().to_string(),
            status: handle.data().status(),
            endpoints: handle.prefixed_endpoints(),
        })
        .collect();

    Json(ModulesInfo {
        started: state.started.clone(),
        modules,
    })
}

async fn state_handler(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<Json<ModuleState>, ApiError> {
    let mut request = match serde_json::from_slice::<ModuleState>(&body) {
        Ok(request) if !request.module_id.is_empty() => request,
        Ok(request) => {
            return Err(ApiError::state(
                StatusCode::BAD_REQUEST,
                request,
                "POST body is not in the right format",
            ))
        }
        Err(_) => {
            return Err(ApiError::state(
                StatusCode::BAD_REQUEST,
                ModuleState::default(),
                "POST body is not in the right format",
            ))
        }
    };
    request.errors.clear();

    let id = ModuleID::from(request.module_id.as_str());
    let result = if request.on {
        state.lifecycle.start(&id, false).await
    } else {
        state.lifecycle.stop(&id).await
    };

    match result {
        Ok(()) => {}
        Err(e @ Error::ModuleNotFound { .. }) => {
            return Err(ApiError::state(StatusCode::BAD_REQUEST, request, e.to_string()));
        }
        Err(e) => {
            let mut errors = state
                .lifecycle
                .registry()
                .get(&id)
                .map(|handle| handle.data().status().last_errors_vec())
                .unwrap_or_default();
            if errors.is_empty() {
                errors.push(e.to_string());
            }
            request.errors = errors;
            return Err(ApiError::State {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                state: request,
            });
        }
    }

    info!(
        "[API] Requested state change for module with id: {} from REST service, module is now {}",
        id,
        if request.on { "running" } else { "stopped" }
    );
    Ok(Json(request))
}

fn module_endpoint(handler: EndpointHandler) -> Response {
    match handler() {
        Ok(value) => (
            [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
            Json(value),
        )
            .into_response(),
        Err(e) => ApiError::Endpoint(e).into_response(),
    }
}

/// API error type.
#[derive(Debug)]
pub enum ApiError {
    /// A module endpoint failed.
    Endpoint(EndpointError),
    /// A state change was rejected or failed.
    State { status: StatusCode, state: ModuleState },
}

impl ApiError {
    fn state(status: StatusCode, mut state: ModuleState, message: impl Into<String>) -> Self {
        state.errors.push(message.into());
        Self::State { status, state }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Endpoint(e) => {
                let status =
                    StatusCode::from_u16(e.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                error!("[API] Endpoint error: {} - {}", status, e.message);

                let body = json!({
                    "error": {
                        "status": status.canonical_reason().unwrap_or_default(),
                        "code": status.as_u16(),
                        "message": e.message,
                    }
                });
                (status, Json(body)).into_response()
            }
            ApiError::State { status, state } => {
                error!(
                    "[API] Requested state change for module with id: {} from REST service, but failed: {:?}",
                    state.module_id, state.errors
                );
                (status, Json(state)).into_response()
            }
        }
    }
}
