//! Delivery to the downstream SensorThings server.
//!
//! Observations go to `{host}/Datastreams({id})/Observations`, locations to
//! `{host}/Things({id})/Locations`. Both are JSON POSTs expecting `201 Created`.

use serde::Serialize;
use stc_common::{Error, Result};
use stc_module_api::{DeliveryOutcome, LocationMessage, ObservationMessage};
use std::time::Duration;
use tracing::{debug, warn};

/// Status the sink answers with when an entity was created.
pub const CREATED: u16 = 201;

/// Returns `host` with exactly one trailing slash appended if it had none.
pub fn host_with_suffix(host: &str) -> String {
    if host.ends_with('/') {
        host.to_string()
    } else {
        format!("{}/", host)
    }
}

pub fn observation_url(host: &str, datastream_id: &str) -> String {
    format!(
        "{}Datastreams({})/Observations",
        host_with_suffix(host),
        datastream_id
    )
}

pub fn location_url(host: &str, thing_id: &str) -> String {
    format!("{}Things({})/Locations", host_with_suffix(host), thing_id)
}

/// HTTP client used by the dispatcher. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SinkClient {
    client: reqwest::Client,
    timeout: Option<Duration>,
}

impl SinkClient {
    /// Creates a client. `None` means requests never time out.
    pub fn new(request_timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(limit) = request_timeout {
            builder = builder.timeout(limit);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Http(format!("failed to build sink client: {}", e)))?;

        Ok(Self {
            client,
            timeout: request_timeout,
        })
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Posts `payload` as JSON and compares the response status with `expected_status`.
    pub async fn post_json<T: Serialize>(
        &self,
        url: &str,
        payload: &T,
        expected_status: u16,
    ) -> DeliveryOutcome {
        let response = match self.client.post(url).json(payload).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                let limit = self.timeout.unwrap_or_default();
                warn!("[Sink] POST {} timed out after {:?}", url, limit);
                return DeliveryOutcome::Failed(format!("Timeout after {:?}", limit));
            }
            Err(e) => {
                warn!("[Sink] POST {} failed: {}", url, e);
                return DeliveryOutcome::Failed(e.to_string());
            }
        };

        let status = response.status().as_u16();
        if status == expected_status {
            debug!("[Sink] POST {} -> {}", url, status);
            return DeliveryOutcome::Delivered;
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => format!("Failed to read body: {}", e),
        };
        warn!(
            "[Sink] POST {} returned {}, expected {}",
            url, status, expected_status
        );
        DeliveryOutcome::Rejected { status, body }
    }

    /// Delivers an observation and completes the message.
    pub async fn deliver_observation(&self, msg: ObservationMessage) {
        let url = observation_url(&msg.host, &msg.datastream_id);
        let outcome = self.post_json(&url, &msg.observation, CREATED).await;
        msg.completion.complete(&outcome);
    }

    /// Delivers a location and completes the message.
    pub async fn deliver_location(&self, msg: LocationMessage) {
        let url = location_url(&msg.host, &msg.thing_id);
        let outcome = self.post_json(&url, &msg.location, CREATED).await;
        msg.completion.complete(&outcome);
    }
}
