use chrono::Utc;
use log::debug;

use crate::clair::{self, PushImage};
use crate::datastore::{Datastore, ImageRecord};
use crate::entity::images;
use crate::error::ServiceError;
use crate::registry::{self, Token};

/// The per-image-scoped identifier of the topmost layer, as the Analyzer
/// knows it.
pub fn top_layer_hash(digest: &str, layers: &[String]) -> String {
    layers
        .first()
        .map(|layer| clair::md5_hex(&format!("{digest}{layer}")))
        .unwrap_or_default()
}

/// Sends a single image through the scan pipeline: upsert the image row
/// (first observation wins for `first_seen` and manifests), then push its
/// layers to the Analyzer. A push failure aborts the scan but leaves the row
/// behind, so admission later sees a known-but-unscored image.
pub async fn scan_image(
    store: &Datastore,
    clair_client: &clair::Client,
    token: &Token,
    image: &registry::Image,
) -> Result<images::Model, ServiceError> {
    let existing = store
        .get_image(&image.registry, &image.repo, &image.tag, &image.digest)
        .await
        .map_err(|err| {
            ServiceError::Internal(anyhow::anyhow!(
                "error looking up image in database: {err}"
            ))
        })?;

    let now = Utc::now();
    let record = match existing {
        Some(row) => ImageRecord {
            top_layer: row.top_layer,
            registry: row.registry,
            repo: row.repo,
            tag: row.tag,
            digest: row.digest,
            manifest_v2: row.manifest_v2,
            manifest_v1: row.manifest_v1,
            first_seen: row.first_seen.with_timezone(&Utc),
            last_seen: now,
        },
        None => ImageRecord {
            top_layer: top_layer_hash(&image.digest, &image.layers),
            registry: image.registry.clone(),
            repo: image.repo.clone(),
            tag: image.tag.clone(),
            digest: image.digest.clone(),
            manifest_v2: image.manifest_v2.clone(),
            manifest_v1: image.manifest_v1.clone(),
            first_seen: now,
            last_seen: now,
        },
    };

    store.upsert_image(&record).await.map_err(|err| {
        ServiceError::Internal(anyhow::anyhow!(
            "error updating image {}/{}:{}: {err}",
            image.registry,
            image.repo,
            image.tag
        ))
    })?;
    debug!("updated image {}", image.digest);

    let row = store
        .get_image(&image.registry, &image.repo, &image.tag, &image.digest)
        .await?
        .ok_or(ServiceError::NotFound)?;

    clair::push(
        clair_client,
        &PushImage {
            digest: image.digest.clone(),
            registry: image.registry.clone(),
            repo: image.repo.clone(),
            tag: image.tag.clone(),
            layers: image.layers.clone(),
            authorization: token.bearer_header(),
        },
    )
    .await?;
    debug!("clair finished scanning layers: {}", image.digest);

    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clair::md5_hex;

    #[test]
    fn top_layer_is_md5_of_digest_and_first_layer() {
        let layers = vec!["L0".to_string(), "L1".to_string()];
        assert_eq!(
            top_layer_hash("sha256:aaa", &layers),
            md5_hex("sha256:aaaL0")
        );
    }

    #[test]
    fn top_layer_is_empty_without_layers() {
        assert_eq!(top_layer_hash("sha256:aaa", &[]), "");
    }
}
