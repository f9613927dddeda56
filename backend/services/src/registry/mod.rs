pub mod auth;
pub mod manifest;

use log::debug;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use auth::{auth_registry, AuthConfig, Token};
pub use manifest::{ManifestV1, ManifestV2};

use crate::error::ServiceError;

/// The well-known empty layer blob; carries no content worth indexing.
const EMPTY_LAYER: &str = "sha256:a3ed95caeb02ffe68cdd9fd84406680ae93d633cb16422d00e8a7c22955b46d4";

/// An image resolved from a registry: coordinates, layers ordered topmost
/// first, and both manifest documents for storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Image {
    pub registry: String,
    pub repo: String,
    pub tag: String,
    pub digest: String,
    pub layers: Vec<String>,
    pub manifest_v2: Value,
    pub manifest_v1: Value,
}

/// Client for the Docker Registry HTTP API v2. Construction pings the
/// registry to verify it is reachable. Every request applies Basic auth for
/// the registry's own host and answers bearer challenges with a fresh token
/// exchange; nothing is cached, since scope can differ per repo.
#[derive(Clone)]
pub struct Registry {
    pub url: String,
    username: String,
    password: String,
    http: reqwest::Client,
}

impl Registry {
    pub async fn new(
        registry_url: &str,
        username: &str,
        password: &str,
    ) -> Result<Self, ServiceError> {
        let url = registry_url.trim_end_matches('/').to_string();
        let username = auth::effective_username(&url, username, password);
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        let registry = Self {
            url,
            username,
            password: password.to_string(),
            http,
        };
        registry.ping().await?;
        Ok(registry)
    }

    pub async fn ping(&self) -> Result<(), ServiceError> {
        let url = format!("{}/v2/", self.url);
        debug!("registry.ping url={url}");
        self.get(&url, None).await.map(|_| ())
    }

    /// Ordered repository names, following catalog pagination.
    pub async fn repositories(&self) -> Result<Vec<String>, ServiceError> {
        #[derive(Deserialize)]
        struct CatalogPage {
            #[serde(default)]
            repositories: Vec<String>,
        }

        let mut repos = Vec::new();
        let mut url = format!("{}/v2/_catalog", self.url);
        loop {
            let resp = self.get(&url, None).await?;
            let next = link_next(resp.headers()).map(|l| self.absolute(&l));
            let page: CatalogPage = resp.json().await?;
            repos.extend(page.repositories);
            match next {
                Some(n) => url = n,
                None => break,
            }
        }
        Ok(repos)
    }

    /// Ordered tags of a repository, following pagination.
    pub async fn tags(&self, repo: &str) -> Result<Vec<String>, ServiceError> {
        #[derive(Deserialize)]
        struct TagsPage {
            #[serde(default)]
            tags: Option<Vec<String>>,
        }

        let mut tags = Vec::new();
        let mut url = format!("{}/v2/{}/tags/list", self.url, repo);
        loop {
            let resp = self.get(&url, None).await?;
            let next = link_next(resp.headers()).map(|l| self.absolute(&l));
            let page: TagsPage = resp.json().await?;
            tags.extend(page.tags.unwrap_or_default());
            match next {
                Some(n) => url = n,
                None => break,
            }
        }
        Ok(tags)
    }

    /// v1 manifest, typed plus the raw document for storage.
    pub async fn manifest(
        &self,
        repo: &str,
        tag: &str,
    ) -> Result<(ManifestV1, Value), ServiceError> {
        let url = format!("{}/v2/{}/manifests/{}", self.url, repo, tag);
        let resp = self
            .get(&url, Some(manifest::MANIFEST_V1_MEDIA_TYPE))
            .await?;
        let raw: Value = resp.json().await?;
        let typed: ManifestV1 = serde_json::from_value(raw.clone())?;
        Ok((typed, raw))
    }

    /// v2 manifest, typed plus the raw document for storage.
    pub async fn manifest_v2(
        &self,
        repo: &str,
        tag: &str,
    ) -> Result<(ManifestV2, Value), ServiceError> {
        let url = format!("{}/v2/{}/manifests/{}", self.url, repo, tag);
        let resp = self
            .get(&url, Some(manifest::MANIFEST_V2_MEDIA_TYPE))
            .await?;
        let raw: Value = resp.json().await?;
        let typed: ManifestV2 = serde_json::from_value(raw.clone())?;
        Ok((typed, raw))
    }

    /// Content digest as reported by the `Docker-Content-Digest` header for a
    /// v1 manifest request.
    pub async fn manifest_digest(&self, repo: &str, tag: &str) -> Result<String, ServiceError> {
        self.digest_header(repo, tag, manifest::MANIFEST_V1_MEDIA_TYPE)
            .await
    }

    /// Content digest for a v2 manifest request.
    pub async fn manifest_digest_v2(&self, repo: &str, tag: &str) -> Result<String, ServiceError> {
        self.digest_header(repo, tag, manifest::MANIFEST_V2_MEDIA_TYPE)
            .await
    }

    async fn digest_header(
        &self,
        repo: &str,
        tag: &str,
        media_type: &str,
    ) -> Result<String, ServiceError> {
        let url = format!("{}/v2/{}/manifests/{}", self.url, repo, tag);
        let resp = self.get(&url, Some(media_type)).await?;
        resp.headers()
            .get("Docker-Content-Digest")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                ServiceError::Internal(anyhow::anyhow!(
                    "registry did not return a content digest for {repo}:{tag}"
                ))
            })
    }

    /// Resolves a repo/tag to an [`Image`]: prefers the v2 digest and layers,
    /// falling back to v1 where v2 is unavailable. Both manifests are kept
    /// for storage when present.
    pub async fn get_image(&self, repo: &str, tag: &str) -> Result<Image, ServiceError> {
        let digest = match self.manifest_digest_v2(repo, tag).await {
            Ok(digest) => digest,
            Err(err) => {
                debug!("error getting v2 content digest: {err}");
                self.manifest_digest(repo, tag).await.map_err(|err| {
                    ServiceError::Internal(anyhow::anyhow!(
                        "unable to obtain either v1 or v2 digest: {err}"
                    ))
                })?
            }
        };

        let v2 = match self.manifest_v2(repo, tag).await {
            Ok(found) => Some(found),
            Err(err) => {
                debug!(
                    "error getting v2 manifest: {err} for image {}/{repo}:{tag}",
                    self.url
                );
                None
            }
        };
        let v1 = match self.manifest(repo, tag).await {
            Ok(found) => Some(found),
            Err(err) => {
                debug!(
                    "error getting v1 manifest: {err} for image {}/{repo}:{tag}",
                    self.url
                );
                None
            }
        };

        if v2.is_none() && v1.is_none() {
            return Err(ServiceError::Internal(anyhow::anyhow!(
                "neither Docker v1 nor v2 manifest could be obtained for {}/{repo}:{tag}",
                self.url
            )));
        }

        let layers = ordered_layers(v2.as_ref().map(|m| &m.0), v1.as_ref().map(|m| &m.0));
        if layers.is_empty() {
            return Err(ServiceError::Internal(anyhow::anyhow!(
                "image manifest contained no layers: {}/{repo}:{tag}",
                self.url
            )));
        }

        Ok(Image {
            registry: self.url.clone(),
            repo: repo.to_string(),
            tag: tag.to_string(),
            digest,
            layers,
            manifest_v2: v2.map(|m| m.1).unwrap_or(Value::Null),
            manifest_v1: v1.map(|m| m.1).unwrap_or(Value::Null),
        })
    }

    async fn get(
        &self,
        url: &str,
        accept: Option<&str>,
    ) -> Result<reqwest::Response, ServiceError> {
        let resp = self.send(url, accept, None).await?;
        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            if let Some(challenge) = auth::parse_bearer_challenge(resp.headers()) {
                let token =
                    auth::token_request(&self.http, &challenge, &self.username, &self.password)
                        .await?;
                let retried = self.send(url, accept, Some(&token.token)).await?;
                return error_for_status(retried);
            }
        }
        error_for_status(resp)
    }

    async fn send(
        &self,
        url: &str,
        accept: Option<&str>,
        bearer: Option<&str>,
    ) -> Result<reqwest::Response, ServiceError> {
        let mut req = self.http.get(url);
        if let Some(accept) = accept {
            req = req.header(reqwest::header::ACCEPT, accept);
        }
        match bearer {
            Some(token) => req = req.bearer_auth(token),
            None => {
                if url.starts_with(&self.url)
                    && (!self.username.is_empty() || !self.password.is_empty())
                {
                    req = req.basic_auth(&self.username, Some(&self.password));
                }
            }
        }
        Ok(req.send().await?)
    }

    fn absolute(&self, link: &str) -> String {
        if link.starts_with('/') {
            format!("{}{}", self.url, link)
        } else {
            link.to_string()
        }
    }
}

fn error_for_status(resp: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
    let status = resp.status().as_u16();
    if status >= 400 {
        Err(ServiceError::StatusCode(status))
    } else {
        Ok(resp)
    }
}

/// Builds the topmost-first layer list. v2 wins when present; its layer order
/// is reversed relative to v1. The empty layer is skipped either way.
pub fn ordered_layers(v2: Option<&ManifestV2>, v1: Option<&ManifestV1>) -> Vec<String> {
    let mut layers = Vec::new();

    if let Some(manifest) = v2 {
        for descriptor in manifest.layers.iter().rev() {
            if descriptor.digest != EMPTY_LAYER {
                layers.push(descriptor.digest.clone());
            }
        }
    }

    if layers.is_empty() {
        if let Some(manifest) = v1 {
            for fs_layer in &manifest.fs_layers {
                if fs_layer.blob_sum != EMPTY_LAYER {
                    layers.push(fs_layer.blob_sum.clone());
                }
            }
        }
    }

    layers
}

/// Next-page target from a pagination `Link` header.
fn link_next(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(reqwest::header::LINK)?.to_str().ok()?;
    for part in value.split(',') {
        let part = part.trim();
        if !part.contains("rel=\"next\"") {
            continue;
        }
        let start = part.find('<')?;
        let end = part.find('>')?;
        return Some(part[start + 1..end].to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::manifest::{Descriptor, FsLayer};
    use super::*;

    fn v2_manifest(digests: &[&str]) -> ManifestV2 {
        ManifestV2 {
            layers: digests
                .iter()
                .map(|d| Descriptor {
                    digest: d.to_string(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    fn v1_manifest(blob_sums: &[&str]) -> ManifestV1 {
        ManifestV1 {
            fs_layers: blob_sums
                .iter()
                .map(|b| FsLayer {
                    blob_sum: b.to_string(),
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn v2_layers_are_reversed_to_top_first() {
        let layers = ordered_layers(Some(&v2_manifest(&["base", "mid", "top"])), None);
        assert_eq!(layers, vec!["top", "mid", "base"]);
    }

    #[test]
    fn v1_layers_are_kept_in_order() {
        let layers = ordered_layers(None, Some(&v1_manifest(&["top", "mid", "base"])));
        assert_eq!(layers, vec!["top", "mid", "base"]);
    }

    #[test]
    fn v2_wins_over_v1() {
        let layers = ordered_layers(
            Some(&v2_manifest(&["base", "top"])),
            Some(&v1_manifest(&["other"])),
        );
        assert_eq!(layers, vec!["top", "base"]);
    }

    #[test]
    fn empty_layer_is_skipped() {
        let layers = ordered_layers(Some(&v2_manifest(&["base", EMPTY_LAYER, "top"])), None);
        assert_eq!(layers, vec!["top", "base"]);
    }

    #[test]
    fn link_header_yields_next_page() {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::LINK,
            "</v2/_catalog?last=app&n=100>; rel=\"next\"".parse().unwrap(),
        );
        assert_eq!(
            link_next(&headers),
            Some("/v2/_catalog?last=app&n=100".to_string())
        );
        assert_eq!(link_next(&HeaderMap::new()), None);
    }
}
