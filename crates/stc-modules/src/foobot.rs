//! Foobot air quality module.
//!
//! Polls the latest datapoint of every mapped Foobot device and publishes
//! the mapped sensors to their Datastreams. Settings (`foobot.json`):
//!
//! ```json
//! {
//!   "secretKey": "...",
//!   "fetchIntervalSeconds": 600,
//!   "mappings": [
//!     { "uuid": "240D676D40002482", "name": "office", "server": "http://sink/v1.0",
//!       "streams": [ { "sensor": "pm", "streamId": "12" }, { "sensor": "co2", "streamId": "13" } ] }
//!   ]
//! }
//! ```
//!
//! The Foobot API allows roughly 200 requests a day, so the fetch interval
//! never goes below 500 seconds.

use async_trait::async_trait;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use stc_common::{Error, Result};
use stc_module_api::{
    Endpoint, EndpointError, Module, ModuleBase, ModuleSender, Observation, Operation,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Name the module factory is registered under.
pub const FACTORY_NAME: &str = "foobot";

pub const MIN_FETCH_INTERVAL_SECS: u64 = 500;

const DEFAULT_API_URL: &str = "https://api.foobot.io/v2";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const REDACTED: &str = "********";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoobotSettings {
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub fetch_interval_seconds: u64,
    #[serde(default)]
    pub mappings: Vec<Mapping>,
    /// Base URL of the Foobot API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl FoobotSettings {
    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_interval_seconds.max(MIN_FETCH_INTERVAL_SECS))
    }

    fn api_url(&self) -> &str {
        self.api_url
            .as_deref()
            .unwrap_or(DEFAULT_API_URL)
            .trim_end_matches('/')
    }

    /// Copy safe to show on the settings endpoint.
    fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.secret_key.is_empty() {
            copy.secret_key = REDACTED.to_string();
        }
        copy
    }
}

/// Links a Foobot device to a SensorThings server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mapping {
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    pub server: String,
    #[serde(default)]
    pub streams: Vec<Stream>,
}

/// Foobot sensor to Datastream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    pub sensor: String,
    pub stream_id: String,
}

/// Datapoint response of the Foobot API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FoobotReading {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub start: i64,
    #[serde(default)]
    pub end: i64,
    #[serde(default)]
    pub sensors: Vec<String>,
    #[serde(default)]
    pub units: Vec<String>,
    #[serde(default)]
    pub datapoints: Vec<Vec<f64>>,
}

/// Observations for the mapped sensors of one reading, as `(datastream, observation)`.
pub fn observations_for(mapping: &Mapping, reading: &FoobotReading) -> Vec<(String, Observation)> {
    let Some(values) = reading.datapoints.first() else {
        return Vec::new();
    };
    let phenomenon_time = DateTime::from_timestamp(reading.end, 0);

    let mut observations = Vec::new();
    for (sensor, value) in reading.sensors.iter().zip(values) {
        for stream in mapping.streams.iter().filter(|s| &s.sensor == sensor) {
            let mut observation = Observation::new(*value);
            if let Some(at) = phenomenon_time {
                observation = observation.with_phenomenon_time(at);
            }
            observations.push((stream.stream_id.clone(), observation));
        }
    }
    observations
}

enum FetchError {
    Unauthorized,
    Other(String),
}

async fn fetch_reading(
    client: &reqwest::Client,
    settings: &FoobotSettings,
    mapping: &Mapping,
) -> std::result::Result<FoobotReading, FetchError> {
    let url = format!(
        "{}/device/{}/datapoint/0/last/0/",
        settings.api_url(),
        mapping.uuid
    );

    let response = client
        .get(&url)
        .header("X-API-KEY-TOKEN", &settings.secret_key)
        .send()
        .await
        .map_err(|e| FetchError::Other(e.to_string()))?;

    if response.status() == reqwest::StatusCode::UNAUTHORIZED {
        return Err(FetchError::Unauthorized);
    }
    if !response.status().is_success() {
        return Err(FetchError::Other(format!(
            "foobot api returned {} for device {}",
            response.status(),
            mapping.uuid
        )));
    }

    response
        .json::<FoobotReading>()
        .await
        .map_err(|e| FetchError::Other(e.to_string()))
}

/// Fetches every mapping once. Returns false when polling must end.
async fn poll_once(client: &reqwest::Client, settings: &FoobotSettings, sender: &ModuleSender) -> bool {
    for mapping in &settings.mappings {
        match fetch_reading(client, settings, mapping).await {
            Ok(reading) => {
                let observations = observations_for(mapping, &reading);
                debug!(
                    "[Foobot] {} sensor value(s) from device {}",
                    observations.len(),
                    mapping.uuid
                );
                for (stream_id, observation) in observations {
                    sender.send_observation(&mapping.server, &stream_id, observation);
                }
            }
            Err(FetchError::Unauthorized) => {
                sender.send_error(Error::module("incorrect api key"), true);
                return false;
            }
            Err(FetchError::Other(message)) => {
                warn!("[Foobot] Fetching device {} failed: {}", mapping.uuid, message);
                sender.send_error(Error::module(message), false);
            }
        }
    }
    true
}

/// Publishes Foobot readings to a SensorThings server.
pub struct FoobotModule {
    base: ModuleBase,
    settings: Arc<FoobotSettings>,
    poller: Option<JoinHandle<()>>,
}

impl FoobotModule {
    pub fn new() -> Self {
        Self {
            base: ModuleBase::new(
                "Foobot",
                "Publish Foobot sensor readings to a SensorThings server",
            ),
            settings: Arc::new(FoobotSettings::default()),
            poller: None,
        }
    }

    pub fn settings(&self) -> &FoobotSettings {
        &self.settings
    }

    fn settings_endpoint(&self) -> Endpoint {
        let redacted = self.settings.redacted();
        Endpoint::new(
            "Settings",
            vec![Operation::get("/Settings", move || {
                serde_json::to_value(&redacted)
                    .map_err(|e| EndpointError::internal(e.to_string()))
            })],
        )
    }
}

impl Default for FoobotModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Module for FoobotModule {
    fn base(&self) -> &ModuleBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ModuleBase {
        &mut self.base
    }

    async fn setup(&mut self) -> Result<()> {
        let settings: FoobotSettings = self.base.load_settings()?;
        self.settings = Arc::new(settings);
        self.base.set_endpoints(vec![self.settings_endpoint()]);

        if self.settings.secret_key.is_empty() {
            self.base
                .send_error(Error::module("missing config parameters"), true);
        }
        Ok(())
    }

    async fn start(&mut self, _is_startup: bool) -> Result<()> {
        self.stop().await;

        let sender = self
            .base
            .sender()
            .ok_or_else(|| Error::Internal("module data not bound".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::module(format!("failed to build HTTP client: {}", e)))?;

        let settings = Arc::clone(&self.settings);
        let period = settings.fetch_interval();
        info!(
            "[Foobot] Polling {} device(s) every {:?}",
            settings.mappings.len(),
            period
        );

        self.poller = Some(tokio::spawn(async move {
            // First tick fires immediately
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if !poll_once(&client, &settings, &sender).await {
                    break;
                }
            }
        }));
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, http::StatusCode, routing::get, Json, Router};
    use serde_json::json;
    use stc_common::ModuleID;
    use stc_module_api::{MessageBus, ModuleData};
    use tempfile::tempdir;
    use tokio::net::TcpListener;

    fn reading() -> FoobotReading {
        FoobotReading {
            uuid: "dev1".to_string(),
            start: 1_500_000_000,
            end: 1_500_000_000,
            sensors: vec!["time".into(), "pm".into(), "co2".into()],
            units: vec!["s".into(), "ugm3".into(), "ppm".into()],
            datapoints: vec![vec![1_500_000_000.0, 12.5, 480.0]],
        }
    }

    fn mapping(server: &str) -> Mapping {
        Mapping {
            uuid: "dev1".to_string(),
            name: "office".to_string(),
            server: server.to_string(),
            streams: vec![
                Stream { sensor: "pm".into(), stream_id: "12".into() },
                Stream { sensor: "co2".into(), stream_id: "13".into() },
            ],
        }
    }

    #[test]
    fn test_fetch_interval_minimum() {
        let mut settings = FoobotSettings::default();
        assert_eq!(settings.fetch_interval(), Duration::from_secs(500));
        settings.fetch_interval_seconds = 100;
        assert_eq!(settings.fetch_interval(), Duration::from_secs(500));
        settings.fetch_interval_seconds = 900;
        assert_eq!(settings.fetch_interval(), Duration::from_secs(900));
    }

    #[test]
    fn test_observations_for_mapped_sensors() {
        let observations = observations_for(&mapping("http://sink"), &reading());
        assert_eq!(observations.len(), 2);

        let (stream, pm) = &observations[0];
        assert_eq!(stream, "12");
        assert_eq!(pm.result, Some(json!(12.5)));
        assert_eq!(pm.phenomenon_time.as_deref(), Some("2017-07-14T02:40:00Z"));

        assert_eq!(observations[1].0, "13");
        assert_eq!(observations[1].1.result, Some(json!(480.0)));
    }

    #[test]
    fn test_observations_for_empty_reading() {
        let empty = FoobotReading::default();
        assert!(observations_for(&mapping("http://sink"), &empty).is_empty());
    }

    #[test]
    fn test_settings_are_redacted() {
        let settings = FoobotSettings {
            secret_key: "top-secret".to_string(),
            ..Default::default()
        };
        assert_eq!(settings.redacted().secret_key, REDACTED);
        assert_eq!(FoobotSettings::default().redacted().secret_key, "");
    }

    async fn spawn_api(status: StatusCode) -> String {
        let app = Router::new().route(
            "/v2/device/:uuid/datapoint/0/last/0/",
            get(move |Path(uuid): Path<String>| async move {
                let body = json!({
                    "uuid": uuid,
                    "start": 1_500_000_000,
                    "end": 1_500_000_000,
                    "sensors": ["pm", "co2"],
                    "units": ["ugm3", "ppm"],
                    "datapoints": [[12.5, 480.0]]
                });
                (status, Json(body))
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{}/v2", addr)
    }

    fn bound_module(
        dir: &std::path::Path,
        settings: serde_json::Value,
    ) -> (FoobotModule, stc_module_api::BusReceivers) {
        std::fs::write(dir.join("foobot.json"), settings.to_string()).unwrap();
        let (bus, receivers) = MessageBus::new();
        let data = Arc::new(ModuleData::new("1.0", "foobot.so", dir.join("foobot.so"), bus, 0));
        let mut module = FoobotModule::new();
        module.set_module_data(data);
        (module, receivers)
    }

    #[tokio::test]
    async fn test_setup_without_secret_is_fatal() {
        let dir = tempdir().unwrap();
        let (mut module, mut receivers) =
            bound_module(dir.path(), json!({ "moduleId": "fb", "mappings": [] }));

        module.setup().await.unwrap();

        assert!(module.module_data().unwrap().is_fatal());
        let msg = receivers.errors.try_recv().unwrap();
        assert!(msg.fatal);
        assert_eq!(msg.module_id, ModuleID::from("fb"));
        assert_eq!(msg.error.to_string(), "missing config parameters");
    }

    #[tokio::test]
    async fn test_setup_without_secret_or_id_records_error() {
        let dir = tempdir().unwrap();
        let (mut module, _receivers) = bound_module(dir.path(), json!({}));

        module.setup().await.unwrap();

        let status = module.module_data().unwrap().status();
        assert!(status.fatal());
        assert_eq!(status.last_errors().next(), Some("missing config parameters"));
    }

    #[tokio::test]
    async fn test_settings_endpoint_hides_secret() {
        let dir = tempdir().unwrap();
        let (mut module, _receivers) = bound_module(
            dir.path(),
            json!({ "moduleId": "fb", "secretKey": "abc", "fetchIntervalSeconds": 600 }),
        );

        module.setup().await.unwrap();
        assert_eq!(module.id(), ModuleID::from("fb"));

        let endpoints = module.endpoints();
        let value = endpoints[0].operations[0].handle().unwrap();
        assert_eq!(value["secretKey"], REDACTED);
        assert_eq!(value["fetchIntervalSeconds"], 600);
    }

    #[tokio::test]
    async fn test_polling_publishes_observations() {
        let api = spawn_api(StatusCode::OK).await;
        let dir = tempdir().unwrap();
        let (mut module, mut receivers) = bound_module(
            dir.path(),
            json!({
                "moduleId": "fb",
                "secretKey": "abc",
                "apiUrl": api,
                "mappings": [{
                    "uuid": "dev1", "server": "http://sink/v1.0",
                    "streams": [{ "sensor": "pm", "streamId": "12" }]
                }]
            }),
        );

        module.setup().await.unwrap();
        module.start(true).await.unwrap();

        let msg = tokio::time::timeout(Duration::from_secs(5), receivers.observations.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.module_id, ModuleID::from("fb"));
        assert_eq!(msg.host, "http://sink/v1.0");
        assert_eq!(msg.datastream_id, "12");
        assert_eq!(msg.observation.result, Some(json!(12.5)));

        module.stop().await;
    }

    #[tokio::test]
    async fn test_unauthorized_is_fatal() {
        let api = spawn_api(StatusCode::UNAUTHORIZED).await;
        let dir = tempdir().unwrap();
        let (mut module, mut receivers) = bound_module(
            dir.path(),
            json!({
                "moduleId": "fb",
                "secretKey": "wrong",
                "apiUrl": api,
                "mappings": [{ "uuid": "dev1", "server": "http://sink/v1.0", "streams": [] }]
            }),
        );

        module.setup().await.unwrap();
        module.start(false).await.unwrap();

        let msg = tokio::time::timeout(Duration::from_secs(5), receivers.errors.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(msg.fatal);
        assert_eq!(msg.error.to_string(), "incorrect api key");
        assert!(module.module_data().unwrap().is_fatal());

        module.stop().await;
    }
}
