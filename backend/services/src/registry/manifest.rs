use serde::{Deserialize, Serialize};

/// Docker Registry v1 manifest. Layer order is reversed relative to v2:
/// `fs_layers[0]` is the topmost layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestV1 {
    #[serde(rename = "schemaVersion", default)]
    pub schema_version: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub architecture: String,
    #[serde(rename = "fsLayers", default)]
    pub fs_layers: Vec<FsLayer>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FsLayer {
    #[serde(rename = "blobSum", default)]
    pub blob_sum: String,
}

/// Docker Registry v2 manifest. `layers[0]` is the base layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestV2 {
    #[serde(rename = "schemaVersion", default)]
    pub schema_version: i64,
    #[serde(rename = "mediaType", default)]
    pub media_type: String,
    #[serde(default)]
    pub config: Descriptor,
    #[serde(default)]
    pub layers: Vec<Descriptor>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Descriptor {
    #[serde(rename = "mediaType", default)]
    pub media_type: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub digest: String,
}

pub const MANIFEST_V1_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v1+prettyjws";
pub const MANIFEST_V2_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";
