use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context as _;
use chrono::Utc;
use k8s_openapi::api::core::v1::{Namespace, Pod};
use kube::api::ListParams;
use kube::config::KubeConfigOptions;
use kube::Api;
use log::{debug, error, info};
use portauthority_shared::{parse_image_digest, parse_image_path, CrawlerMessages};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::{
    scan_image, STATUS_ERROR, STATUS_FINISHED, STATUS_GETTING_CONTAINERS,
    STATUS_SCANNING_CONTAINERS, STATUS_STARTED,
};
use crate::clair;
use crate::datastore::{ContainerRecord, Datastore};
use crate::error::ServiceError;
use crate::registry::{auth_registry, AuthConfig, Registry};

const DEFAULT_SCAN_THREADS: u32 = 10;

/// Decodes the base64-encoded kubeconfig supplied on a crawl request.
pub fn parse_kubeconfig(encoded: &str) -> Result<kube::config::Kubeconfig, ServiceError> {
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|err| ServiceError::BadRequest(format!("invalid kubeconfig encoding: {err}")))?;
    let yaml = String::from_utf8(decoded)
        .map_err(|err| ServiceError::BadRequest(format!("kubeconfig is not valid utf-8: {err}")))?;
    kube::config::Kubeconfig::from_yaml(&yaml)
        .map_err(|err| ServiceError::BadRequest(format!("invalid kubeconfig: {err}")))
}

/// One entry of the server's registry credential table. `username` and
/// `password` name environment variables resolved at scan time, never stored
/// secrets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct K8sCrawlCredential {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Configuration for one cluster crawl.
#[derive(Clone)]
pub struct K8sCrawler {
    pub crawler_id: i64,
    pub context: String,
    pub kubeconfig: kube::config::Kubeconfig,
    pub max_threads: u32,
    pub reg_auth: Vec<K8sCrawlCredential>,
    pub scan: bool,
}

/// Enumerates every pod container in the cluster, upserting a Container row
/// per observation, then optionally scans the deduplicated image set.
pub async fn run(store: Datastore, clair_client: clair::Client, config: K8sCrawler) {
    let start = Instant::now();

    if let Err(err) = store
        .update_crawler(config.crawler_id, STATUS_STARTED, None, None)
        .await
    {
        error!("unable to update db status: {err}");
        return;
    }

    let (containers, cluster_host) = match get_container_images(&store, &config).await {
        Ok(found) => found,
        Err(err) => {
            let message = format!("error getting container images: {err}");
            error!("{message}");
            if let Err(err) = store
                .update_crawler(
                    config.crawler_id,
                    STATUS_ERROR,
                    Some(&CrawlerMessages {
                        summary: None,
                        error: Some(message),
                    }),
                    Some(Utc::now()),
                )
                .await
            {
                error!("error updating crawler in db: {err}");
            }
            return;
        }
    };

    if !config.scan {
        let elapsed = start.elapsed();
        let summary = format!(
            "** {} total images in {cluster_host} processed in {elapsed:.2?} **",
            containers.len()
        );
        if let Err(err) = store
            .update_crawler(
                config.crawler_id,
                STATUS_FINISHED,
                Some(&CrawlerMessages {
                    summary: Some(summary),
                    error: None,
                }),
                Some(Utc::now()),
            )
            .await
        {
            error!("unable to update db status: {err}");
            return;
        }
        info!(
            "** K8s crawl #{} in {cluster_host} of {} total images completed in {elapsed:.2?} **",
            config.crawler_id,
            containers.len()
        );
        return;
    }

    debug!("scanning enabled, begin gathering docker images");

    // Repulling the same content hash buys nothing; scan each digest once.
    let deduped = dedupe_by_digest(&containers);
    debug!(
        "duplicate removal: {} total containers, {} purged, {} unique",
        containers.len(),
        containers.len() - deduped.len(),
        deduped.len()
    );

    if let Err(err) = store
        .update_crawler(config.crawler_id, STATUS_SCANNING_CONTAINERS, None, None)
        .await
    {
        error!("unable to update db status: {err}");
        return;
    }

    let max_threads = if config.max_threads == 0 {
        DEFAULT_SCAN_THREADS
    } else {
        config.max_threads
    };
    let semaphore = Arc::new(Semaphore::new(max_threads as usize));
    let scanned_success = Arc::new(AtomicU64::new(0));
    let scanned_failed = Arc::new(AtomicU64::new(0));
    let not_scanned = Arc::new(AtomicU64::new(0));
    let mut workers = JoinSet::new();

    for container in deduped.iter().cloned() {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        let store = store.clone();
        let clair_client = clair_client.clone();
        let reg_auth = config.reg_auth.clone();
        let scanned_success = scanned_success.clone();
        let scanned_failed = scanned_failed.clone();
        let not_scanned = not_scanned.clone();
        workers.spawn(async move {
            let _permit = permit;

            let (registry_url, repo) = normalize_registry(
                &container.image_id,
                &container.image_registry,
                &container.image_repo,
            );

            match resolve_credentials(&reg_auth, &registry_url) {
                Some((username, password)) => {
                    let result = scan_container_image(
                        &store,
                        &clair_client,
                        &registry_url,
                        &repo,
                        &container.image_tag,
                        &username,
                        &password,
                    )
                    .await;
                    match result {
                        Ok(()) => {
                            scanned_success.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(err) => {
                            error!(
                                "k8s crawler image scan: {registry_url}/{repo}:{} -- unable to send the image to clair: {err}",
                                container.image_tag
                            );
                            scanned_failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
                None => {
                    debug!(
                        "k8s crawler image scan: no creds supplied for registry {registry_url} in repo {repo}"
                    );
                    not_scanned.fetch_add(1, Ordering::Relaxed);
                }
            }
        });
    }

    while workers.join_next().await.is_some() {}

    let success = scanned_success.load(Ordering::Relaxed);
    let failures = scanned_failed.load(Ordering::Relaxed);
    let skipped = not_scanned.load(Ordering::Relaxed);
    let elapsed = start.elapsed();

    let summary = format!(
        "** {} images in {cluster_host} processed in {elapsed:.2?} ** Scan Details: {success} Successful -- {failures} Failed -- {skipped} Skipped",
        deduped.len()
    );
    if let Err(err) = store
        .update_crawler(
            config.crawler_id,
            STATUS_FINISHED,
            Some(&CrawlerMessages {
                summary: Some(summary),
                error: None,
            }),
            Some(Utc::now()),
        )
        .await
    {
        error!("unable to update db status: {err}");
        return;
    }
    info!(
        "** K8s crawl #{} in {cluster_host} of {} images completed in {elapsed:.2?} ** Scan Details: {success} Successful -- {failures} Failed -- {skipped} Skipped",
        config.crawler_id,
        deduped.len()
    );
}

/// Phase A: list every namespace's pods and upsert one Container row per
/// container status. Returns every observation plus the cluster host.
async fn get_container_images(
    store: &Datastore,
    config: &K8sCrawler,
) -> Result<(Vec<ContainerRecord>, String), ServiceError> {
    let options = KubeConfigOptions {
        context: (!config.context.is_empty()).then(|| config.context.clone()),
        ..Default::default()
    };
    let kube_config = kube::Config::from_custom_kubeconfig(config.kubeconfig.clone(), &options)
        .await
        .context("error loading kubeconfig")?;
    let cluster_host = kube_config.cluster_url.to_string();

    let client = kube::Client::try_from(kube_config).context("error creating client")?;

    let namespaces: Api<Namespace> = Api::all(client.clone());
    let namespace_list = namespaces
        .list(&ListParams::default())
        .await
        .context("error getting namespaces")?;

    store
        .update_crawler(config.crawler_id, STATUS_GETTING_CONTAINERS, None, None)
        .await?;

    let mut observed = Vec::new();
    for namespace in namespace_list {
        let namespace_name = namespace.metadata.name.clone().unwrap_or_default();
        let annotations = parse_annotations(namespace.metadata.annotations.as_ref());

        let pods: Api<Pod> = Api::namespaced(client.clone(), &namespace_name);
        let pod_list = pods
            .list(&ListParams::default())
            .await
            .context("error getting pods")?;
        debug!(
            "there are {} pods in namespace {namespace_name}",
            pod_list.items.len()
        );

        for pod in pod_list {
            let statuses = pod
                .status
                .and_then(|status| status.container_statuses)
                .unwrap_or_default();

            for container_status in statuses {
                let image_ref = parse_image_path(&container_status.image);
                let image_digest =
                    parse_image_digest(&container_status.image_id).unwrap_or_default();

                let existing = store
                    .get_container(
                        &namespace_name,
                        &cluster_host,
                        &container_status.name,
                        &container_status.image,
                        &container_status.image_id,
                    )
                    .await
                    .map_err(|err| {
                        ServiceError::Internal(anyhow::anyhow!(
                            "error getting container from database: {err}"
                        ))
                    })?;

                let now = Utc::now();
                let record = ContainerRecord {
                    namespace: namespace_name.clone(),
                    cluster: cluster_host.clone(),
                    name: container_status.name.clone(),
                    image: container_status.image.clone(),
                    image_id: container_status.image_id.clone(),
                    image_registry: image_ref.registry.clone(),
                    image_repo: image_ref.repo.clone(),
                    image_tag: image_ref.tag.clone(),
                    image_digest,
                    annotations: annotations.clone(),
                    first_seen: existing
                        .map(|row| row.first_seen.with_timezone(&Utc))
                        .unwrap_or(now),
                    last_seen: now,
                };

                store.upsert_container(&record).await.map_err(|err| {
                    ServiceError::Internal(anyhow::anyhow!(
                        "error upserting container {namespace_name}-{cluster_host}-{}-{}-{}: {err}",
                        record.name,
                        record.image,
                        record.image_id
                    ))
                })?;
                debug!("container updated: {} {}", record.image, record.image_id);

                observed.push(record);
            }
        }
    }

    info!("finished getting containers for cluster: {cluster_host}");
    Ok((observed, cluster_host))
}

async fn scan_container_image(
    store: &Datastore,
    clair_client: &clair::Client,
    registry_url: &str,
    repo: &str,
    tag: &str,
    username: &str,
    password: &str,
) -> Result<(), ServiceError> {
    let token = auth_registry(&AuthConfig {
        registry_url: registry_url.to_string(),
        repo: repo.to_string(),
        tag: tag.to_string(),
        username: username.to_string(),
        password: password.to_string(),
    })
    .await?;

    let hub = Registry::new(registry_url, username, password).await?;
    let image = hub.get_image(repo, tag).await?;
    scan_image(store, clair_client, &token, &image).await?;
    debug!("k8s crawler image scan finished scan: {repo}");
    Ok(())
}

/// Namespace annotation values that parse as JSON are stored structurally;
/// anything else is kept as the original string.
fn parse_annotations(
    annotations: Option<&std::collections::BTreeMap<String, String>>,
) -> Value {
    let mut merged = serde_json::Map::new();
    if let Some(annotations) = annotations {
        for (key, value) in annotations {
            match serde_json::from_str::<Value>(value) {
                Ok(parsed) => merged.insert(key.clone(), parsed),
                Err(_) => merged.insert(key.clone(), Value::String(value.clone())),
            };
        }
    }
    Value::Object(merged)
}

/// Drops repeat observations of the same content digest, keeping the first.
pub fn dedupe_by_digest(containers: &[ContainerRecord]) -> Vec<ContainerRecord> {
    let mut encountered = HashSet::new();
    let mut result = Vec::new();
    for container in containers {
        if encountered.insert(container.image_digest.clone()) {
            result.push(container.clone());
        } else {
            debug!(
                "duplicate: {} {}",
                container.image_id, container.image_digest
            );
        }
    }
    result
}

/// Rewrites observed registry coordinates into a fetchable registry URL:
/// public Docker images route to registry-1.docker.io with a `library/`
/// prefix for single-segment repos, gcr.io collapses to its canonical host,
/// and schemeless hosts get https.
pub fn normalize_registry(image_id: &str, registry: &str, repo: &str) -> (String, String) {
    let library_repo = || {
        if repo.contains('/') {
            repo.to_string()
        } else {
            format!("library/{repo}")
        }
    };

    if image_id.contains("docker-pullable")
        && (registry.is_empty() || registry.contains("docker.io"))
    {
        return ("https://registry-1.docker.io".to_string(), library_repo());
    }
    if registry.contains("docker.io") {
        return ("https://registry-1.docker.io".to_string(), library_repo());
    }
    if registry.contains("gcr.io") {
        return ("https://gcr.io".to_string(), repo.to_string());
    }
    if !registry.contains("http") {
        return (format!("https://{registry}"), repo.to_string());
    }
    (registry.to_string(), repo.to_string())
}

/// Substring-matches the observed registry against the credential table and
/// resolves the winning entry's environment variables.
pub fn resolve_credentials(
    credentials: &[K8sCrawlCredential],
    registry_url: &str,
) -> Option<(String, String)> {
    for entry in credentials {
        if !entry.url.is_empty() && registry_url.contains(&entry.url) {
            let username = std::env::var(&entry.username).unwrap_or_default();
            let password = std::env::var(&entry.password).unwrap_or_default();
            return Some((username, password));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn container(digest: &str) -> ContainerRecord {
        let now = Utc::now();
        ContainerRecord {
            namespace: "default".into(),
            cluster: "https://cluster.example.com".into(),
            name: "app".into(),
            image: "app:1".into(),
            image_id: format!("docker-pullable://app@{digest}"),
            image_registry: String::new(),
            image_repo: "app".into(),
            image_tag: "1".into(),
            image_digest: digest.into(),
            annotations: Value::Object(serde_json::Map::new()),
            first_seen: now,
            last_seen: now,
        }
    }

    #[test]
    fn dedupe_keeps_first_occurrence_per_digest() {
        let containers = vec![container("A"), container("A"), container("B")];
        let deduped = dedupe_by_digest(&containers);
        assert_eq!(deduped.len(), 2);
        let digests: Vec<_> = deduped.iter().map(|c| c.image_digest.as_str()).collect();
        assert_eq!(digests, vec!["A", "B"]);
    }

    #[test]
    fn public_docker_images_route_to_registry_one() {
        let (registry, repo) = normalize_registry("docker-pullable://nginx@sha256:abc", "", "nginx");
        assert_eq!(registry, "https://registry-1.docker.io");
        assert_eq!(repo, "library/nginx");

        let (registry, repo) =
            normalize_registry("docker://sha256:abc", "docker.io", "team/app");
        assert_eq!(registry, "https://registry-1.docker.io");
        assert_eq!(repo, "team/app");
    }

    #[test]
    fn gcr_collapses_to_canonical_host() {
        let (registry, repo) =
            normalize_registry("docker-pullable://x@sha256:abc", "us.gcr.io", "project/app");
        assert_eq!(registry, "https://gcr.io");
        assert_eq!(repo, "project/app");
    }

    #[test]
    fn schemeless_registries_get_https() {
        let (registry, _) = normalize_registry(
            "docker-pullable://x@sha256:abc",
            "registry.example.com",
            "app",
        );
        assert_eq!(registry, "https://registry.example.com");
    }

    #[test]
    fn credentials_match_by_substring() {
        std::env::set_var("PA_TEST_REG_USER", "svc-user");
        std::env::set_var("PA_TEST_REG_PASS", "svc-pass");
        let table = vec![K8sCrawlCredential {
            url: "registry.example.com".into(),
            username: "PA_TEST_REG_USER".into(),
            password: "PA_TEST_REG_PASS".into(),
        }];

        let matched = resolve_credentials(&table, "https://registry.example.com");
        assert_eq!(
            matched,
            Some((String::from("svc-user"), String::from("svc-pass")))
        );

        assert_eq!(resolve_credentials(&table, "https://other.example.com"), None);
    }

    #[test]
    fn annotation_values_parse_as_json_when_possible() {
        let mut raw = std::collections::BTreeMap::new();
        raw.insert("threshold".to_string(), "{\"max\": 3}".to_string());
        raw.insert("owner".to_string(), "team-a".to_string());

        let merged = parse_annotations(Some(&raw));
        assert_eq!(merged["threshold"]["max"], 3);
        assert_eq!(merged["owner"], "team-a");
    }
}
