use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use log::{error, info};
use portauthority_shared::CrawlerMessages;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use super::{scan_image, STATUS_FINISHED, STATUS_STARTED};
use crate::clair;
use crate::datastore::Datastore;
use crate::error::ServiceError;
use crate::registry::{Registry, Token};

/// Buffered image slots between the producer walking the registry and the
/// scan workers.
const IMAGE_CHANNEL_CAPACITY: usize = 50;

/// Configuration for one registry crawl. Empty repo/tag sets mean no filter.
#[derive(Debug, Clone)]
pub struct RegCrawler {
    pub crawler_id: i64,
    pub max_threads: u32,
    pub username: String,
    pub password: String,
    pub registry_url: String,
    pub token: Token,
    pub repos: HashSet<String>,
    pub tags: HashSet<String>,
}

/// Walks a registry, resolving every repo/tag that passes the filters to an
/// image and feeding it through a bounded scan pool. The crawl row records
/// progress; completion is observable only through it.
pub async fn run(store: Datastore, clair_client: clair::Client, config: RegCrawler) {
    let start = Instant::now();

    if let Err(err) = store
        .update_crawler(config.crawler_id, STATUS_STARTED, None, None)
        .await
    {
        error!("could not update crawler in db: {err}");
        return;
    }

    let (tx, mut rx) = mpsc::channel(IMAGE_CHANNEL_CAPACITY);
    tokio::spawn(produce_images(config.clone(), tx));

    let semaphore = Arc::new(Semaphore::new(config.max_threads.max(1) as usize));
    let total = Arc::new(AtomicU64::new(0));
    let failed = Arc::new(AtomicU64::new(0));
    let mut workers = JoinSet::new();
    let mut crawl_error: Option<ServiceError> = None;

    while let Some(item) = rx.recv().await {
        let image = match item {
            Ok(image) => image,
            Err(err) => {
                crawl_error = Some(err);
                break;
            }
        };

        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        let store = store.clone();
        let clair_client = clair_client.clone();
        let token = config.token.clone();
        let total = total.clone();
        let failed = failed.clone();
        workers.spawn(async move {
            let _permit = permit;
            let result = scan_image(&store, &clair_client, &token, &image).await;
            total.fetch_add(1, Ordering::Relaxed);
            if let Err(err) = result {
                error!(
                    "crawl scan error for image {}/{}:{}: {err}",
                    image.registry, image.repo, image.tag
                );
                failed.fetch_add(1, Ordering::Relaxed);
            }
        });
    }

    while workers.join_next().await.is_some() {}

    let scanned = total.load(Ordering::Relaxed);
    let failures = failed.load(Ordering::Relaxed);
    let elapsed = start.elapsed();

    let (status, messages) = match crawl_error {
        Some(err) => {
            let message = format!(
                "** Crawl of {} produced error: {err} **",
                config.registry_url
            );
            error!("{message}");
            (
                STATUS_FINISHED,
                CrawlerMessages {
                    summary: None,
                    error: Some(message),
                },
            )
        }
        None => {
            info!(
                "registry crawl #{} in {} of {scanned} images completed in {elapsed:.2?} with {failures} scan failures",
                config.crawler_id, config.registry_url
            );
            (
                STATUS_FINISHED,
                CrawlerMessages {
                    summary: Some(format!(
                        "** {scanned} images in {} processed in {elapsed:.2?} with {failures} scan failures **",
                        config.registry_url
                    )),
                    error: None,
                },
            )
        }
    };

    if let Err(err) = store
        .update_crawler(config.crawler_id, status, Some(&messages), Some(Utc::now()))
        .await
    {
        error!("could not update crawler in db: {err}");
    }
}

/// Producer side of the crawl: resolves each repo/tag that passes the
/// filters and sends it down the channel. A fatal listing error is sent as
/// the final item; dropping the sender closes the channel either way.
async fn produce_images(
    config: RegCrawler,
    tx: mpsc::Sender<Result<crate::registry::Image, ServiceError>>,
) {
    let hub = match Registry::new(&config.registry_url, &config.username, &config.password).await {
        Ok(hub) => hub,
        Err(err) => {
            let _ = tx
                .send(Err(ServiceError::Internal(anyhow::anyhow!(
                    "error connecting to registry {}: {err}",
                    config.registry_url
                ))))
                .await;
            return;
        }
    };

    let repos = match hub.repositories().await {
        Ok(repos) => repos,
        Err(err) => {
            let _ = tx
                .send(Err(ServiceError::Internal(anyhow::anyhow!(
                    "error listing repositories for {}: {err}",
                    config.registry_url
                ))))
                .await;
            return;
        }
    };

    for repo in repos {
        if !config.repos.is_empty() && !config.repos.contains(&repo) {
            continue;
        }

        let tags = match hub.tags(&repo).await {
            Ok(tags) => tags,
            Err(err) => {
                let _ = tx
                    .send(Err(ServiceError::Internal(anyhow::anyhow!(
                        "error listing tags for {}/{repo}: {err}",
                        config.registry_url
                    ))))
                    .await;
                return;
            }
        };

        for tag in tags {
            if !config.tags.is_empty() && !config.tags.contains(&tag) {
                continue;
            }

            match hub.get_image(&repo, &tag).await {
                Ok(image) => {
                    if tx.send(Ok(image)).await.is_err() {
                        return;
                    }
                }
                Err(err) => {
                    error!(
                        "error getting image {}/{repo}:{tag}: {err}",
                        config.registry_url
                    );
                }
            }
        }
    }
}
