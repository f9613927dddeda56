use std::collections::{HashMap, HashSet};
use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;
use log::{error, warn};
use serde::Deserialize;
use serde_json::json;

use portauthority_services::crawler::{self, K8sCrawlCredential, K8sCrawler, RegCrawler};
use portauthority_services::datastore::{Datastore, PolicyRecord};
use portauthority_services::registry::{auth_registry, AuthConfig, Registry};
use portauthority_services::{clair, policy, ServiceError};
use portauthority_shared::{
    ApiError, Container, ContainerEnvelope, ContainersEnvelope, Crawler, CrawlerEnvelope, Feature,
    Image, ImageEnvelope, ImagesEnvelope, K8sCrawlerEnvelope, PoliciesEnvelope, Policy,
    PolicyEnvelope, RegCrawlerEnvelope,
};

use crate::metrics::ApiMetrics;
use crate::query_validation::validate_date_param;

/// Default registry for image posts naming docker.io or no registry at all.
pub const PUBLIC_DOCKER: &str = "https://registry-1.docker.io";

pub struct AppState {
    pub store: Datastore,
    pub clair: clair::Client,
    pub image_webhook_default_block: bool,
    pub reg_auth: Vec<K8sCrawlCredential>,
    pub timeout: Duration,
    pub metrics: ApiMetrics,
}

fn status_for(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::NotFound => StatusCode::NOT_FOUND,
        ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Merged feature view for a stored image, straight from the Analyzer.
async fn fetch_features(
    state: &AppState,
    top_layer: &str,
    with_features: bool,
    with_vulnerabilities: bool,
) -> Result<Vec<Feature>, ServiceError> {
    let layer_data = state
        .clair
        .get_layers(top_layer, with_features, with_vulnerabilities)
        .await?;
    Ok(layer_data
        .layer
        .map(|layer| layer.features)
        .unwrap_or_default())
}

#[derive(Debug, Default, Deserialize)]
pub struct ImageListParams {
    #[serde(default)]
    pub registry: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub date_start: String,
    #[serde(default)]
    pub date_end: String,
    #[serde(default)]
    pub limit: String,
}

pub async fn list_images(
    state: web::Data<AppState>,
    query: web::Query<ImageListParams>,
) -> impl Responder {
    for date in [&query.date_start, &query.date_end] {
        if let Err(message) = validate_date_param(date) {
            return HttpResponse::BadRequest().json(ImagesEnvelope {
                images: None,
                error: Some(ApiError::new(message)),
            });
        }
    }

    match state
        .store
        .get_all_images(
            &query.registry,
            &query.repo,
            &query.tag,
            &query.digest,
            &query.date_start,
            &query.date_end,
            &query.limit,
        )
        .await
    {
        Ok(images) => HttpResponse::Ok().json(ImagesEnvelope {
            images: Some(images.into_iter().map(Image::from).collect()),
            error: None,
        }),
        Err(err) => {
            error!("failed to list images: {err}");
            HttpResponse::build(status_for(&err)).json(ImagesEnvelope {
                images: None,
                error: Some(ApiError::new(err.to_string())),
            })
        }
    }
}

pub async fn get_image(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    query: web::Query<HashMap<String, String>>,
) -> impl Responder {
    let with_features = query.contains_key("features");
    let with_vulnerabilities = query.contains_key("vulnerabilities");
    let policy_name = query.get("policy").cloned();

    let db_image = match state.store.get_image_by_id(path.into_inner()).await {
        Ok(image) => image,
        Err(err) => {
            return HttpResponse::build(status_for(&err)).json(ImageEnvelope {
                image: None,
                error: Some(ApiError::new(err.to_string())),
            })
        }
    };

    let mut image = Image::from(db_image.clone());

    if with_features || with_vulnerabilities {
        match fetch_features(&state, &db_image.top_layer, with_features, with_vulnerabilities)
            .await
        {
            Ok(features) => image.features = Some(features),
            Err(err) => {
                warn!("error getting clair layer data: {err}");
                return HttpResponse::InternalServerError().json(ImageEnvelope {
                    image: None,
                    error: Some(ApiError::new(err.to_string())),
                });
            }
        }
    }

    if let Some(policy_name) = policy_name {
        let features = match fetch_features(&state, &db_image.top_layer, true, true).await {
            Ok(features) => features,
            Err(err) => {
                warn!("error getting clair layer data: {err}");
                return HttpResponse::InternalServerError().json(ImageEnvelope {
                    image: None,
                    error: Some(ApiError::new(err.to_string())),
                });
            }
        };

        let db_policy = match state.store.get_policy(&policy_name).await {
            Ok(Some(policy)) => policy,
            Ok(None) => {
                return HttpResponse::NotFound().json(ImageEnvelope {
                    image: None,
                    error: Some(ApiError::new("policy requested is not valid")),
                })
            }
            Err(err) => {
                return HttpResponse::build(status_for(&err)).json(ImageEnvelope {
                    image: None,
                    error: Some(ApiError::new(err.to_string())),
                })
            }
        };

        match policy::get_violations(&db_policy, &features) {
            Ok(violations) => image.violations = Some(violations),
            Err(err) => {
                warn!("error getting violations: {err}");
                return HttpResponse::build(status_for(&err)).json(ImageEnvelope {
                    image: None,
                    error: Some(ApiError::new(err.to_string())),
                });
            }
        }
    }

    HttpResponse::Ok().json(ImageEnvelope {
        image: Some(image),
        error: None,
    })
}

/// Synchronous scan of one image: authenticate, resolve manifests, upsert,
/// and push to the Analyzer before answering.
pub async fn post_image(
    state: web::Data<AppState>,
    body: web::Json<ImageEnvelope>,
) -> impl Responder {
    let request = match body.into_inner().image {
        Some(image) => image,
        None => {
            return HttpResponse::BadRequest().json(ImageEnvelope {
                image: None,
                error: Some(ApiError::new("failed to provide image")),
            })
        }
    };

    // Assume public Docker when no registry is supplied
    let mut registry_url = request.registry.clone();
    let mut repo = request.repo.clone();
    if registry_url.is_empty() || registry_url.to_lowercase() == "https://docker.io" {
        registry_url = PUBLIC_DOCKER.to_string();
        if !repo.contains('/') {
            repo = format!("library/{repo}");
        }
    }

    let token = match auth_registry(&AuthConfig {
        registry_url: registry_url.clone(),
        repo: repo.clone(),
        tag: request.tag.clone(),
        username: request.registry_user.clone(),
        password: request.registry_password.clone(),
    })
    .await
    {
        Ok(token) => token,
        Err(err) => {
            error!("registry auth failed for {registry_url}: {err}");
            return HttpResponse::BadRequest().json(ImageEnvelope {
                image: None,
                error: Some(ApiError::new(
                    "error making request to get registry for auth token",
                )),
            });
        }
    };

    let hub = match Registry::new(
        &registry_url,
        &request.registry_user,
        &request.registry_password,
    )
    .await
    {
        Ok(hub) => hub,
        Err(err) => {
            error!("registry connect failed for {registry_url}: {err}");
            return HttpResponse::BadRequest().json(ImageEnvelope {
                image: None,
                error: Some(ApiError::new(
                    "error making initial request to registry for auth",
                )),
            });
        }
    };

    let docker_image = match hub.get_image(&repo, &request.tag).await {
        Ok(image) => image,
        Err(err) => {
            return HttpResponse::BadRequest().json(ImageEnvelope {
                image: None,
                error: Some(ApiError::new(err.to_string())),
            })
        }
    };

    match crawler::scan_image(&state.store, &state.clair, &token, &docker_image).await {
        Ok(row) => HttpResponse::Created().json(ImageEnvelope {
            image: Some(Image::from(row)),
            error: None,
        }),
        Err(err) => HttpResponse::build(status_for(&err)).json(ImageEnvelope {
            image: None,
            error: Some(ApiError::new(err.to_string())),
        }),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ContainerListParams {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub image_id: String,
    #[serde(default)]
    pub date_start: String,
    #[serde(default)]
    pub date_end: String,
    #[serde(default)]
    pub limit: String,
}

pub async fn list_containers(
    state: web::Data<AppState>,
    query: web::Query<ContainerListParams>,
) -> impl Responder {
    for date in [&query.date_start, &query.date_end] {
        if let Err(message) = validate_date_param(date) {
            return HttpResponse::BadRequest().json(ContainersEnvelope {
                containers: None,
                error: Some(ApiError::new(message)),
            });
        }
    }

    match state
        .store
        .get_all_containers(
            &query.namespace,
            &query.cluster,
            &query.name,
            &query.image,
            &query.image_id,
            &query.date_start,
            &query.date_end,
            &query.limit,
        )
        .await
    {
        Ok(containers) => HttpResponse::Ok().json(ContainersEnvelope {
            containers: Some(containers.into_iter().map(Container::from).collect()),
            error: None,
        }),
        Err(err) => {
            error!("failed to list containers: {err}");
            HttpResponse::build(status_for(&err)).json(ContainersEnvelope {
                containers: None,
                error: Some(ApiError::new(err.to_string())),
            })
        }
    }
}

pub async fn get_container(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    query: web::Query<HashMap<String, String>>,
) -> impl Responder {
    let with_features = query.contains_key("features");
    let with_vulnerabilities = query.contains_key("vulnerabilities");
    let policy_name = query.get("policy").cloned();

    let db_container = match state.store.get_container_by_id(path.into_inner()).await {
        Ok(container) => container,
        Err(err) => {
            return HttpResponse::build(status_for(&err)).json(ContainerEnvelope {
                container: None,
                error: Some(ApiError::new(err.to_string())),
            })
        }
    };

    let mut container = Container::from(db_container.clone());

    // The container's image may never have gone through a scan; that is an
    // answer, not an error.
    let db_image = match state
        .store
        .get_image_by_digest(&db_container.image_digest)
        .await
    {
        Ok(image) => image,
        Err(ServiceError::NotFound) => {
            container.image_scanned = false;
            return HttpResponse::Ok().json(ContainerEnvelope {
                container: Some(container),
                error: None,
            });
        }
        Err(err) => {
            return HttpResponse::build(status_for(&err)).json(ContainerEnvelope {
                container: None,
                error: Some(ApiError::new(err.to_string())),
            })
        }
    };
    container.image_scanned = true;

    if with_features || with_vulnerabilities {
        match fetch_features(&state, &db_image.top_layer, with_features, with_vulnerabilities)
            .await
        {
            Ok(features) => container.image_features = Some(features),
            Err(err) => {
                warn!("error getting clair layer data: {err}");
                return HttpResponse::InternalServerError().json(ContainerEnvelope {
                    container: None,
                    error: Some(ApiError::new(err.to_string())),
                });
            }
        }
    }

    if let Some(policy_name) = policy_name {
        let features = match fetch_features(&state, &db_image.top_layer, true, true).await {
            Ok(features) => features,
            Err(err) => {
                warn!("error getting clair layer data: {err}");
                return HttpResponse::InternalServerError().json(ContainerEnvelope {
                    container: None,
                    error: Some(ApiError::new(err.to_string())),
                });
            }
        };

        let db_policy = match state.store.get_policy(&policy_name).await {
            Ok(Some(policy)) => policy,
            Ok(None) => {
                return HttpResponse::NotFound().json(ContainerEnvelope {
                    container: None,
                    error: Some(ApiError::new("policy requested is not valid")),
                })
            }
            Err(err) => {
                return HttpResponse::build(status_for(&err)).json(ContainerEnvelope {
                    container: None,
                    error: Some(ApiError::new(err.to_string())),
                })
            }
        };

        match policy::get_violations(&db_policy, &features) {
            Ok(violations) => container.image_violations = Some(violations),
            Err(err) => {
                warn!("error getting violations: {err}");
                return HttpResponse::build(status_for(&err)).json(ContainerEnvelope {
                    container: None,
                    error: Some(ApiError::new(err.to_string())),
                });
            }
        }
    }

    HttpResponse::Ok().json(ContainerEnvelope {
        container: Some(container),
        error: None,
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct PolicyListParams {
    #[serde(default)]
    pub name: String,
}

pub async fn list_policies(
    state: web::Data<AppState>,
    query: web::Query<PolicyListParams>,
) -> impl Responder {
    match state.store.get_all_policies(&query.name).await {
        Ok(policies) if policies.is_empty() => HttpResponse::NotFound().json(PoliciesEnvelope {
            policies: None,
            error: Some(ApiError::new("policies requested are not valid")),
        }),
        Ok(policies) => HttpResponse::Ok().json(PoliciesEnvelope {
            policies: Some(policies.into_iter().map(Policy::from).collect()),
            error: None,
        }),
        Err(err) => HttpResponse::build(status_for(&err)).json(PoliciesEnvelope {
            policies: None,
            error: Some(ApiError::new(err.to_string())),
        }),
    }
}

pub async fn get_policy(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    match state.store.get_policy(&path.into_inner()).await {
        Ok(Some(policy)) => HttpResponse::Ok().json(PolicyEnvelope {
            policy: Some(Policy::from(policy)),
            error: None,
        }),
        Ok(None) => HttpResponse::NotFound().json(PolicyEnvelope {
            policy: None,
            error: Some(ApiError::new("policy requested is not valid")),
        }),
        Err(err) => HttpResponse::build(status_for(&err)).json(PolicyEnvelope {
            policy: None,
            error: Some(ApiError::new(err.to_string())),
        }),
    }
}

pub async fn post_policy(
    state: web::Data<AppState>,
    body: web::Json<PolicyEnvelope>,
) -> impl Responder {
    let request = match body.into_inner().policy {
        Some(policy) => policy,
        None => {
            return HttpResponse::BadRequest().json(PolicyEnvelope {
                policy: None,
                error: Some(ApiError::new("failed to provide policy")),
            })
        }
    };

    if request.name.is_empty() {
        return HttpResponse::BadRequest().json(PolicyEnvelope {
            policy: None,
            error: Some(ApiError::new("failed to provide policy name")),
        });
    }

    let now = Utc::now();
    let record = PolicyRecord {
        name: request.name.clone(),
        allowed_risk_severity: json!(request.allowed_risk_severity),
        allowed_cve_names: json!(request.allowed_cve_names),
        allow_not_fixed: request.allow_not_fixed,
        not_allowed_cve_names: json!(request.not_allowed_cve_names),
        not_allowed_os_names: json!(request.not_allowed_os_names),
        created: now,
        updated: now,
    };

    if let Err(err) = state.store.upsert_policy(&record).await {
        return HttpResponse::build(status_for(&err)).json(PolicyEnvelope {
            policy: None,
            error: Some(ApiError::new(err.to_string())),
        });
    }

    match state.store.get_policy(&request.name).await {
        Ok(Some(policy)) => HttpResponse::Created().json(PolicyEnvelope {
            policy: Some(Policy::from(policy)),
            error: None,
        }),
        Ok(None) => HttpResponse::NotFound().json(PolicyEnvelope {
            policy: None,
            error: Some(ApiError::new("policy requested is not valid")),
        }),
        Err(err) => HttpResponse::build(status_for(&err)).json(PolicyEnvelope {
            policy: None,
            error: Some(ApiError::new(err.to_string())),
        }),
    }
}

pub async fn get_crawler(state: web::Data<AppState>, path: web::Path<i64>) -> impl Responder {
    match state.store.get_crawler(path.into_inner()).await {
        Ok(crawler) => HttpResponse::Ok().json(CrawlerEnvelope {
            crawler: Some(Crawler::from(crawler)),
            error: None,
        }),
        Err(err) => HttpResponse::build(status_for(&err)).json(CrawlerEnvelope {
            crawler: None,
            error: Some(ApiError::new(err.to_string())),
        }),
    }
}

fn crawler_error(status: StatusCode, message: impl Into<String>) -> HttpResponse {
    HttpResponse::build(status).json(CrawlerEnvelope {
        crawler: None,
        error: Some(ApiError::new(message)),
    })
}

/// Launches a crawl. The crawler row is persisted before the crawl is
/// spawned, so the caller can poll `/crawlers/:id` immediately.
pub async fn post_crawler(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Bytes,
) -> impl Responder {
    let crawler_type = path.into_inner().to_lowercase();

    match crawler_type.as_str() {
        "registry" => post_registry_crawler(state, &body).await,
        "k8s" => post_k8s_crawler(state, &body).await,
        other => crawler_error(
            StatusCode::BAD_REQUEST,
            format!("'{other}' is not a valid type for /crawlers/:type"),
        ),
    }
}

async fn post_registry_crawler(state: web::Data<AppState>, body: &[u8]) -> HttpResponse {
    let envelope: RegCrawlerEnvelope = match serde_json::from_slice(body) {
        Ok(envelope) => envelope,
        Err(err) => return crawler_error(StatusCode::BAD_REQUEST, err.to_string()),
    };
    let request = match envelope.reg_crawler {
        Some(request) => request,
        None => {
            return crawler_error(StatusCode::BAD_REQUEST, "failed to provide registry crawler")
        }
    };

    // Public Docker tokens are scoped per repo and tag; a registry-wide token
    // cannot exist for it, so this pathway refuses docker.io outright.
    if request.registry.is_empty() || request.registry.contains("docker.io") {
        return crawler_error(
            StatusCode::BAD_REQUEST,
            "public Docker is not supported by the registry crawler",
        );
    }

    // One token shared across the whole crawl keeps logins down.
    let token = match auth_registry(&AuthConfig {
        registry_url: request.registry.clone(),
        username: request.username.clone(),
        password: request.password.clone(),
        ..Default::default()
    })
    .await
    {
        Ok(token) => token,
        Err(err) => {
            error!("registry auth failed for {}: {err}", request.registry);
            return crawler_error(
                StatusCode::BAD_REQUEST,
                "error making request to get registry for auth token",
            );
        }
    };

    let started = Utc::now();
    let crawler_id = match state
        .store
        .insert_crawler("registry", crawler::STATUS_INITIALIZING, started)
        .await
    {
        Ok(id) => id,
        Err(err) => return crawler_error(StatusCode::BAD_REQUEST, err.to_string()),
    };

    let config = RegCrawler {
        crawler_id,
        max_threads: if request.max_threads == 0 {
            10
        } else {
            request.max_threads
        },
        username: request.username,
        password: request.password,
        registry_url: request.registry,
        token,
        repos: request.repos.into_iter().collect::<HashSet<_>>(),
        tags: request.tags.into_iter().collect::<HashSet<_>>(),
    };

    // Crawl runs in the background; status lives in the crawler row.
    tokio::spawn(crawler::registry::run(
        state.store.clone(),
        state.clair.clone(),
        config,
    ));

    HttpResponse::Created().json(CrawlerEnvelope {
        crawler: Some(Crawler {
            id: Some(crawler_id),
            crawler_type: "registry".to_string(),
            started: Some(started),
            ..Default::default()
        }),
        error: None,
    })
}

async fn post_k8s_crawler(state: web::Data<AppState>, body: &[u8]) -> HttpResponse {
    let envelope: K8sCrawlerEnvelope = match serde_json::from_slice(body) {
        Ok(envelope) => envelope,
        Err(err) => return crawler_error(StatusCode::BAD_REQUEST, err.to_string()),
    };
    let request = match envelope.k8s_crawler {
        Some(request) => request,
        None => return crawler_error(StatusCode::BAD_REQUEST, "failed to provide k8s crawler"),
    };

    let kubeconfig = match crawler::parse_kubeconfig(&request.kube_config) {
        Ok(kubeconfig) => kubeconfig,
        Err(err) => return crawler_error(StatusCode::BAD_REQUEST, err.to_string()),
    };

    let started = Utc::now();
    let crawler_id = match state
        .store
        .insert_crawler("k8s", crawler::STATUS_INITIALIZING, started)
        .await
    {
        Ok(id) => id,
        Err(err) => return crawler_error(StatusCode::BAD_REQUEST, err.to_string()),
    };

    let config = K8sCrawler {
        crawler_id,
        context: request.context,
        kubeconfig,
        max_threads: request.max_threads,
        reg_auth: state.reg_auth.clone(),
        scan: request.scan,
    };

    // Crawl runs in the background; status lives in the crawler row.
    tokio::spawn(crawler::k8s::run(
        state.store.clone(),
        state.clair.clone(),
        config,
    ));

    HttpResponse::Created().json(CrawlerEnvelope {
        crawler: Some(Crawler {
            id: Some(crawler_id),
            crawler_type: "k8s".to_string(),
            scan: request.scan.to_string(),
            started: Some(started),
            ..Default::default()
        }),
        error: None,
    })
}

pub async fn get_metrics(state: web::Data<AppState>) -> impl Responder {
    match state.metrics.encode() {
        Ok(body) => HttpResponse::Ok()
            .content_type("application/openmetrics-text; version=1.0.0; charset=utf-8")
            .body(body),
        Err(err) => {
            error!("failed to encode metrics: {err}");
            HttpResponse::InternalServerError().finish()
        }
    }
}
