//! SensorThings payloads produced by modules.
//!
//! Only the fields a connector module can set when creating entities are
//! modelled; everything is optional and omitted from the JSON body when unset.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single sensor reading posted to a Datastream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phenomenon_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_quality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_of_interest: Option<FeatureOfInterest>,
}

impl Observation {
    /// Creates an observation carrying only a result.
    pub fn new(result: impl Into<Value>) -> Self {
        Self {
            result: Some(result.into()),
            ..Default::default()
        }
    }

    /// Sets the phenomenon time, formatted as RFC 3339.
    pub fn with_phenomenon_time(mut self, at: DateTime<Utc>) -> Self {
        self.phenomenon_time = Some(at.to_rfc3339_opts(SecondsFormat::AutoSi, true));
        self
    }

    pub fn with_feature_of_interest(mut self, feature: FeatureOfInterest) -> Self {
        self.feature_of_interest = Some(feature);
        self
    }

    /// Stable text form of the result, used to detect repeated values.
    pub fn result_key(&self) -> String {
        match &self.result {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }
}

/// The phenomenon an Observation is detecting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureOfInterest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature: Option<Value>,
}

/// Last known location of a Thing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Value>,
}

impl Location {
    /// Creates a GeoJSON point location.
    pub fn point(name: impl Into<String>, longitude: f64, latitude: f64) -> Self {
        Self {
            name: Some(name.into()),
            description: None,
            encoding_type: Some("application/vnd.geo+json".to_string()),
            location: Some(serde_json::json!({
                "type": "Point",
                "coordinates": [longitude, latitude],
            })),
        }
    }
}
