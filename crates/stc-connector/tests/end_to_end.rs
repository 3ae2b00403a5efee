//! End-to-end tests: artifacts on disk, a local SensorThings sink and the
//! control API over TCP.

use async_trait::async_trait;
use axum::{extract::Request, http::StatusCode, Router};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::Deserialize;
use serde_json::{json, Value};
use stc_common::{Error, ModuleID, Result};
use stc_connector::{Config, Connector};
use stc_module_api::{
    Endpoint, ErrorMessage, FactoryRegistry, Module, ModuleBase, Observation, Operation,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

#[derive(Debug, Deserialize)]
struct SinkSettings {
    sink: String,
}

/// Posts one observation to the configured sink on every start.
struct SinkModule {
    base: ModuleBase,
    sink: String,
}

#[async_trait]
impl Module for SinkModule {
    fn base(&self) -> &ModuleBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ModuleBase {
        &mut self.base
    }

    async fn setup(&mut self) -> Result<()> {
        let settings: SinkSettings = self.base.load_settings()?;
        self.sink = settings.sink.clone();
        self.base.set_endpoints(vec![Endpoint::new(
            "Settings",
            vec![Operation::get("/Settings", move || {
                Ok(json!({ "sink": settings.sink }))
            })],
        )]);
        Ok(())
    }

    async fn start(&mut self, _is_startup: bool) -> Result<()> {
        let sender = self
            .base
            .sender()
            .ok_or_else(|| Error::module("module data not bound"))?;
        sender.send_observation(&self.sink, "1", Observation::new(21.5));
        Ok(())
    }

    async fn stop(&mut self) {}
}

fn factories() -> FactoryRegistry {
    let factories = FactoryRegistry::new();
    for name in ["alpha", "weather"] {
        factories.register(name, || {
            Ok(Box::new(SinkModule {
                base: ModuleBase::new("Sink", "posts a test observation"),
                sink: String::new(),
            }) as Box<dyn Module>)
        });
    }
    factories
}

/// Local sink answering `201 Created` and recording request paths.
async fn spawn_sink() -> (String, Arc<Mutex<Vec<String>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&received);
    let app = Router::new().fallback(move |request: Request| {
        let recorder = Arc::clone(&recorder);
        async move {
            recorder.lock().unwrap().push(request.uri().path().to_string());
            StatusCode::CREATED
        }
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{}/v1.0", addr), received)
}

fn write_artifact(dir: &Path, stem: &str, settings: Value) {
    let ext = std::env::consts::DLL_EXTENSION;
    std::fs::write(dir.join(format!("{}.{}", stem, ext)), b"").unwrap();
    std::fs::write(dir.join(format!("{}.json", stem)), settings.to_string()).unwrap();
}

async fn request(addr: SocketAddr, method: &str, path: &str, body: Option<Value>) -> (u16, Value) {
    let client = Client::builder(TokioExecutor::new()).build_http::<Full<Bytes>>();
    let body = body.map(|b| b.to_string()).unwrap_or_default();
    let request = hyper::Request::builder()
        .method(method)
        .uri(format!("http://{}{}", addr, path))
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap();

    let response = client.request(request).await.unwrap();
    let status = response.status().as_u16();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_connector_end_to_end() {
    let (sink, received) = spawn_sink().await;

    let dir = tempfile::tempdir().unwrap();
    write_artifact(dir.path(), "alpha", json!({ "sink": sink }));
    write_artifact(dir.path(), "weather", json!({ "moduleId": "w1", "sink": sink }));

    let mut config = Config::default();
    config.connector.host = "127.0.0.1".to_string();
    config.connector.port = 0;
    config.connector.start_modules_on_startup = true;
    config.connector.module_path = Some(dir.path().to_path_buf());
    config.connector.delivery_timeout_seconds = Some(5);

    let factories = factories();
    let mut connector = Connector::start(config, &factories).await.unwrap();
    connector.wait_for_startup().await;

    let server = connector.bind().await.unwrap();
    let addr = server.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server_task = tokio::spawn(server.run(async move {
        let _ = stop_rx.await;
    }));

    // Both modules are listed with distinct IDs and running
    let (status, body) = request(addr, "GET", "/Modules", None).await;
    assert_eq!(status, 200);
    let modules = body["modules"].as_array().unwrap();
    assert_eq!(modules.len(), 2);

    let ids: Vec<&str> = modules.iter().map(|m| m["id"].as_str().unwrap()).collect();
    assert!(ids.contains(&"w1"));
    let generated = ids.iter().find(|id| **id != "w1").unwrap();
    assert_eq!(generated.len(), 8);
    for module in modules {
        assert_eq!(module["status"]["running"], true);
        assert_eq!(module["status"]["fatal"], false);
    }

    // The generated ID is reported on the module's error log
    let alpha = connector.registry().get(&ModuleID::from(*generated)).unwrap();
    wait_until(|| alpha.data().status().error_count() == 1).await;
    assert!(alpha
        .data()
        .status()
        .last_errors()
        .next()
        .unwrap()
        .starts_with("No ID set for module alpha."));

    // Each module delivered its observation
    wait_until(|| received.lock().unwrap().len() == 2).await;
    assert!(received
        .lock()
        .unwrap()
        .iter()
        .all(|path| path == "/v1.0/Datastreams(1)/Observations"));

    let w1 = connector.registry().get(&ModuleID::from("w1")).unwrap();
    wait_until(|| w1.data().status().observations_posted_ok() == 1).await;
    assert_eq!(w1.data().status().observations_posted_failed(), 0);

    // Module endpoints are mounted under the module ID
    let (status, body) = request(addr, "GET", "/w1/Settings", None).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "sink": sink }));

    // A fatal error stops the module for good
    w1.data().bus().send_error(ErrorMessage::new(
        ModuleID::from("w1"),
        Error::module("incorrect api key"),
        true,
    ));
    wait_until(|| w1.data().is_fatal() && !w1.data().is_running()).await;

    let (status, body) = request(
        addr,
        "POST",
        "/Modules/State",
        Some(json!({ "on": true, "moduleId": "w1" })),
    )
    .await;
    assert_eq!(status, 500);
    assert_eq!(body["errors"][0], "incorrect api key");
    assert!(!w1.data().is_running());

    // Stopping the other module through the API
    let (status, body) = request(
        addr,
        "POST",
        "/Modules/State",
        Some(json!({ "on": false, "moduleId": generated })),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["on"], false);
    assert!(!alpha.data().is_running());

    stop_tx.send(()).unwrap();
    server_task.await.unwrap().unwrap();
    connector.shutdown().await;
}

#[tokio::test]
async fn test_unknown_artifact_is_listed_as_fatal_only_in_registry() {
    let dir = tempfile::tempdir().unwrap();
    write_artifact(dir.path(), "mystery", json!({}));

    let mut config = Config::default();
    config.connector.module_path = Some(dir.path().to_path_buf());

    let factories = factories();
    let connector = Connector::start(config, &factories).await.unwrap();

    let handles = connector.registry().list();
    assert_eq!(handles.len(), 1);
    let data = handles[0].data();
    assert!(data.is_fatal());
    assert!(data
        .status()
        .last_errors_vec()
        .iter()
        .any(|e| e.contains("not exported properly")));

    // Dummies declare no endpoints and are left out of the listing
    let (status, body) = {
        use tower::util::ServiceExt;
        let response = connector
            .router()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/Modules")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice::<Value>(&bytes).unwrap())
    };
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["modules"], json!([]));

    connector.shutdown().await;
}
