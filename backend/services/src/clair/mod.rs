pub mod client;

use std::collections::HashMap;

use log::{debug, error};
use md5::{Digest, Md5};

pub use client::{Client, Layer, LayerEnvelope};

use crate::error::ServiceError;

/// An image prepared for the Analyzer: coordinates, layers ordered topmost
/// first, and the Authorization header the Analyzer should replay against the
/// registry.
#[derive(Debug, Clone, Default)]
pub struct PushImage {
    pub digest: String,
    pub registry: String,
    pub repo: String,
    pub tag: String,
    pub layers: Vec<String>,
    pub authorization: String,
}

pub fn md5_hex(text: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Computes the POST sequence for an image, bottom layer first so every
/// layer's parent already exists when it lands.
///
/// Layer names are md5(digest + blob) so the same blob shared by two images
/// still gets per-image records, preserving each image's own parent chain.
/// `parent` alternates between the raw blob digest recorded after a push and
/// the md5(digest + raw) form computed at the top of the next iteration; the
/// first push has no parent.
pub fn layer_posts(image: &PushImage) -> Vec<Layer> {
    let mut posts = Vec::with_capacity(image.layers.len());
    let mut parent = String::new();

    for blob in image.layers.iter().rev() {
        if !parent.is_empty() {
            parent = md5_hex(&format!("{}{}", image.digest, parent));
        }

        debug!("precalculated layer hash input: {}{}", image.digest, blob);
        let name = md5_hex(&format!("{}{}", image.digest, blob));

        let mut headers = HashMap::new();
        if !image.authorization.is_empty() {
            headers.insert("Authorization".to_string(), image.authorization.clone());
        }

        posts.push(Layer {
            name,
            parent_name: parent.clone(),
            path: format!("{}/v2/{}/blobs/{}", image.registry, image.repo, blob),
            format: "Docker".to_string(),
            headers,
            ..Default::default()
        });

        parent = blob.clone();
    }

    posts
}

/// Pushes an image's layers into the Analyzer. A failed layer aborts the push
/// naming the offending blob.
pub async fn push(client: &Client, image: &PushImage) -> Result<(), ServiceError> {
    for (blob, layer) in image.layers.iter().rev().zip(layer_posts(image)) {
        let envelope = client.post_layers(&layer).await.map_err(|err| {
            ServiceError::Internal(anyhow::anyhow!(
                "error pushing layer {blob} to clair: {err}"
            ))
        })?;

        match (&envelope.error, &envelope.layer) {
            (Some(err), _) => error!("clair rejected layer {blob}: {}", err.message),
            (None, Some(indexed)) => debug!(
                "indexed layer name={} parent={} version={}",
                indexed.name, indexed.parent_name, indexed.indexed_by_version
            ),
            (None, None) => {}
        }
    }

    Ok(())
}

/// Fetches the merged feature+vulnerability view for each of an image's
/// layer records.
pub async fn get(
    client: &Client,
    image: &PushImage,
) -> Result<Vec<LayerEnvelope>, ServiceError> {
    let mut layers = Vec::with_capacity(image.layers.len());
    for layer in &image.layers {
        let envelope = client.get_layers(layer, false, false).await.map_err(|err| {
            ServiceError::Internal(anyhow::anyhow!(
                "error getting data for layer {layer} in image {}/{}:{}: {err}",
                image.registry,
                image.repo,
                image.tag
            ))
        })?;
        layers.push(envelope);
    }
    Ok(layers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_matches_known_vector() {
        // md5("abc")
        assert_eq!(md5_hex("abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    fn push_image(digest: &str, layers: &[&str]) -> PushImage {
        PushImage {
            digest: digest.to_string(),
            registry: "https://registry.example.com".to_string(),
            repo: "team/app".to_string(),
            tag: "1.0".to_string(),
            layers: layers.iter().map(|l| l.to_string()).collect(),
            authorization: "Bearer token".to_string(),
        }
    }

    #[test]
    fn single_layer_pushes_without_parent() {
        let image = push_image("sha256:aaa", &["L0"]);
        let posts = layer_posts(&image);
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].name, md5_hex("sha256:aaaL0"));
        assert_eq!(posts[0].parent_name, "");
    }

    #[test]
    fn layers_post_bottom_first_with_chained_parents() {
        let image = push_image("sha256:aaa", &["L0", "L1", "L2"]);
        let posts = layer_posts(&image);
        assert_eq!(posts.len(), 3);

        // Bottom layer first, no parent.
        assert_eq!(posts[0].name, md5_hex("sha256:aaaL2"));
        assert_eq!(posts[0].parent_name, "");

        // Each later push names md5(digest + previous raw blob) as parent.
        assert_eq!(posts[1].name, md5_hex("sha256:aaaL1"));
        assert_eq!(posts[1].parent_name, md5_hex("sha256:aaaL2"));

        assert_eq!(posts[2].name, md5_hex("sha256:aaaL0"));
        assert_eq!(posts[2].parent_name, md5_hex("sha256:aaaL1"));
    }

    #[test]
    fn paths_point_at_registry_blobs() {
        let image = push_image("sha256:aaa", &["L0", "L1"]);
        let posts = layer_posts(&image);
        assert_eq!(
            posts[0].path,
            "https://registry.example.com/v2/team/app/blobs/L1"
        );
        assert_eq!(
            posts[1].path,
            "https://registry.example.com/v2/team/app/blobs/L0"
        );
        assert_eq!(posts[0].format, "Docker");
        assert_eq!(
            posts[0].headers.get("Authorization"),
            Some(&"Bearer token".to_string())
        );
    }

    #[test]
    fn shared_blobs_get_distinct_names_per_image() {
        let first = layer_posts(&push_image("sha256:aaa", &["shared"]));
        let second = layer_posts(&push_image("sha256:bbb", &["shared"]));
        assert_ne!(first[0].name, second[0].name);
    }
}
