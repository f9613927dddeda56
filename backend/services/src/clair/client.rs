use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use portauthority_shared::Feature;

use crate::error::ServiceError;

/// A layer record as the Analyzer's `/v1/layers` API sees it. `path` points
/// the Analyzer at the registry blob; the headers travel with it so the
/// Analyzer can authenticate its own fetch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Layer {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parent_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub format: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub indexed_by_version: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<Feature>,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClairError {
    #[serde(rename = "Message", default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayerEnvelope {
    #[serde(rename = "Layer", skip_serializing_if = "Option::is_none")]
    pub layer: Option<Layer>,
    #[serde(rename = "Error", skip_serializing_if = "Option::is_none")]
    pub error: Option<ClairError>,
}

/// Analyzer API client.
#[derive(Clone)]
pub struct Client {
    address: String,
    http: reqwest::Client,
}

impl Client {
    /// `address` is the Analyzer base URL; `timeout` bounds every call.
    pub fn new(address: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .build()?;
        Ok(Self {
            address: address.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Indexes one layer. 200 and 201 both count as accepted.
    pub async fn post_layers(&self, layer: &Layer) -> Result<LayerEnvelope, ServiceError> {
        let url = format!("{}/v1/layers", self.address);
        let body = LayerEnvelope {
            layer: Some(layer.clone()),
            error: None,
        };

        let resp = self.http.post(&url).json(&body).send().await?;
        let status = resp.status();
        if status != reqwest::StatusCode::OK && status != reqwest::StatusCode::CREATED {
            return Err(ServiceError::StatusCode(status.as_u16()));
        }

        Ok(resp.json::<LayerEnvelope>().await?)
    }

    /// Fetches a layer's merged view. Requesting vulnerabilities implies
    /// features.
    pub async fn get_layers(
        &self,
        name: &str,
        with_features: bool,
        with_vulnerabilities: bool,
    ) -> Result<LayerEnvelope, ServiceError> {
        let url = format!("{}/v1/layers/{}", self.address, name);

        let mut req = self.http.get(&url);
        if with_vulnerabilities {
            req = req.query(&[("vulnerabilities", "")]);
        } else if with_features {
            req = req.query(&[("features", "")]);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(ServiceError::StatusCode(status.as_u16()));
        }

        Ok(resp.json::<LayerEnvelope>().await?)
    }
}
