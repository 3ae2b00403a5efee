//! HTTP endpoints declared by modules.
//!
//! A module declares its endpoints once, during `setup()`. The connector
//! mounts every GET operation on the control server under `/{module_id}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stc_common::ModuleID;
use std::fmt;
use std::sync::Arc;

/// HTTP operation of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpOperation {
    Get,
    Post,
    Patch,
    Delete,
}

impl fmt::Display for HttpOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpOperation::Get => write!(f, "GET"),
            HttpOperation::Post => write!(f, "POST"),
            HttpOperation::Patch => write!(f, "PATCH"),
            HttpOperation::Delete => write!(f, "DELETE"),
        }
    }
}

/// Error returned by an endpoint handler, rendered with its HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct EndpointError {
    pub status: u16,
    pub message: String,
}

impl EndpointError {
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_status(400, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_status(404, message)
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::with_status(405, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_status(500, message)
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::with_status(501, message)
    }
}

/// Handler behind an endpoint operation. Returns the JSON document to send.
pub type EndpointHandler =
    Arc<dyn Fn() -> std::result::Result<Value, EndpointError> + Send + Sync>;

/// A single operation of an endpoint.
#[derive(Clone, Serialize)]
pub struct Operation {
    #[serde(rename = "operation")]
    pub method: HttpOperation,
    /// Path relative to the module, e.g. `/Settings`.
    pub path: String,
    #[serde(skip)]
    pub handler: EndpointHandler,
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("method", &self.method)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Operation {
    /// Creates a GET operation.
    pub fn get<F>(path: impl Into<String>, handler: F) -> Self
    where
        F: Fn() -> std::result::Result<Value, EndpointError> + Send + Sync + 'static,
    {
        Self {
            method: HttpOperation::Get,
            path: path.into(),
            handler: Arc::new(handler),
        }
    }

    /// Invokes the handler.
    pub fn handle(&self) -> std::result::Result<Value, EndpointError> {
        (self.handler)()
    }
}

/// A named group of operations declared by a module.
#[derive(Debug, Clone, Serialize)]
pub struct Endpoint {
    pub name: String,
    pub operations: Vec<Operation>,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, operations: Vec<Operation>) -> Self {
        Self {
            name: name.into(),
            operations,
        }
    }

    /// Copy of this endpoint with every path prefixed by `/{module_id}`.
    pub fn prefixed(&self, module_id: &ModuleID) -> Self {
        Self {
            name: self.name.clone(),
            operations: self
                .operations
                .iter()
                .map(|op| Operation {
                    method: op.method,
                    path: format!("/{}{}", module_id, op.path),
                    handler: Arc::clone(&op.handler),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prefixed_paths() {
        let ep = Endpoint::new(
            "Settings",
            vec![Operation::get("/Settings", || Ok(json!({ "ok": true })))],
        );
        let prefixed = ep.prefixed(&ModuleID::from("w1"));

        assert_eq!(prefixed.operations[0].path, "/w1/Settings");
        assert_eq!(ep.operations[0].path, "/Settings");
        assert_eq!(prefixed.operations[0].handle().unwrap(), json!({ "ok": true }));
    }

    #[test]
    fn test_serialization_skips_handler() {
        let ep = Endpoint::new("Settings", vec![Operation::get("/Settings", || Ok(json!(null)))]);
        let value = serde_json::to_value(&ep).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "Settings",
                "operations": [{ "operation": "GET", "path": "/Settings" }]
            })
        );
    }

    #[test]
    fn test_endpoint_error_status() {
        assert_eq!(EndpointError::not_found("x").status, 404);
        assert_eq!(EndpointError::bad_request("x").status, 400);
        assert_eq!(EndpointError::internal("boom").to_string(), "boom");
    }
}
