use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error payload carried inside every response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(rename = "Message", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "Type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            kind: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Image {
    #[serde(rename = "ID", skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_layer: Option<String>,
    #[serde(default)]
    pub registry: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub digest: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing)]
    pub registry_user: String,
    #[serde(default, skip_serializing)]
    pub registry_password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<Feature>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violations: Option<Vec<Violation>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageEnvelope {
    #[serde(rename = "Image", skip_serializing_if = "Option::is_none")]
    pub image: Option<Image>,
    #[serde(rename = "Error", skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesEnvelope {
    #[serde(rename = "Images", skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<Image>>,
    #[serde(rename = "Error", skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Container {
    #[serde(rename = "ID", skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub image_scanned: bool,
    #[serde(rename = "ImageID", default)]
    pub image_id: String,
    #[serde(default)]
    pub image_registry: String,
    #[serde(default)]
    pub image_repo: String,
    #[serde(default)]
    pub image_tag: String,
    #[serde(default)]
    pub image_digest: String,
    #[serde(rename = "Features", skip_serializing_if = "Option::is_none")]
    pub image_features: Option<Vec<Feature>>,
    #[serde(rename = "Violations", skip_serializing_if = "Option::is_none")]
    pub image_violations: Option<Vec<Violation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerEnvelope {
    #[serde(rename = "Container", skip_serializing_if = "Option::is_none")]
    pub container: Option<Container>,
    #[serde(rename = "Error", skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainersEnvelope {
    #[serde(rename = "Containers", skip_serializing_if = "Option::is_none")]
    pub containers: Option<Vec<Container>>,
    #[serde(rename = "Error", skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

/// Vulnerability policy. The list fields are JSON arrays end to end: they
/// arrive as arrays in the API, are stored in JSON columns, and the policy
/// engine parses them once per evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Policy {
    #[serde(rename = "ID", skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub allowed_risk_severity: Vec<String>,
    #[serde(rename = "AllowedCVENames", default)]
    pub allowed_cve_names: Vec<String>,
    #[serde(default)]
    pub allow_not_fixed: bool,
    #[serde(default)]
    pub not_allowed_cve_names: Vec<String>,
    #[serde(rename = "NotAllowedOSNames", default)]
    pub not_allowed_os_names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyEnvelope {
    #[serde(rename = "Policy", skip_serializing_if = "Option::is_none")]
    pub policy: Option<Policy>,
    #[serde(rename = "Error", skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoliciesEnvelope {
    #[serde(rename = "Policies", skip_serializing_if = "Option::is_none")]
    pub policies: Option<Vec<Policy>>,
    #[serde(rename = "Error", skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

/// A package found in an image layer by the Analyzer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Feature {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version_format: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vulnerabilities: Vec<Vulnerability>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub added_by: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Vulnerability {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub link: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub fixed_by: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fixed_in: Vec<Feature>,
}

/// A single rule match produced by policy evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Type")]
pub enum Violation {
    BlacklistedOs,
    #[serde(rename_all = "PascalCase")]
    BlacklistedCve {
        feature_name: String,
        feature_version: String,
        vulnerability: Vulnerability,
    },
    #[serde(rename_all = "PascalCase")]
    Basic {
        feature_name: String,
        feature_version: String,
        vulnerability: Vulnerability,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Crawler {
    #[serde(rename = "ID", skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(rename = "Type", default, skip_serializing_if = "String::is_empty")]
    pub crawler_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scan: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<CrawlerMessages>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CrawlerMessages {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerEnvelope {
    #[serde(rename = "Crawler", skip_serializing_if = "Option::is_none")]
    pub crawler: Option<Crawler>,
    #[serde(rename = "Error", skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

/// Request body for `POST /v1/crawlers/registry`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RegCrawlerRequest {
    #[serde(default)]
    pub max_threads: u32,
    #[serde(default)]
    pub registry: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub repos: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegCrawlerEnvelope {
    #[serde(rename = "RegCrawler", skip_serializing_if = "Option::is_none")]
    pub reg_crawler: Option<RegCrawlerRequest>,
    #[serde(rename = "Error", skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

/// Request body for `POST /v1/crawlers/k8s`. The kubeconfig arrives
/// base64-encoded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct K8sCrawlerRequest {
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub kube_config: String,
    #[serde(default)]
    pub scan: bool,
    #[serde(default)]
    pub max_threads: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct K8sCrawlerEnvelope {
    #[serde(rename = "K8sCrawler", skip_serializing_if = "Option::is_none")]
    pub k8s_crawler: Option<K8sCrawlerRequest>,
    #[serde(rename = "Error", skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

// The ImagePolicyWebhook review protocol uses lowercase JSON keys, unlike the
// rest of the API.

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct K8sImagePolicy {
    #[serde(
        rename = "apiVersion",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec: Option<K8sImageSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ImageReviewStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct K8sImageSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<K8sContainer>,
    #[serde(
        default,
        skip_serializing_if = "std::collections::BTreeMap::is_empty"
    )]
    pub annotations: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct K8sContainer {
    #[serde(default)]
    pub image: String,
}

/// Verdict of an image policy review.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageReviewStatus {
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct K8sImagePolicyEnvelope {
    #[serde(rename = "K8sImagePolicy", skip_serializing_if = "Option::is_none")]
    pub k8s_image_policy: Option<K8sImagePolicy>,
    #[serde(rename = "Error", skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}
