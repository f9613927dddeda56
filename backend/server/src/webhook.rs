use std::collections::BTreeMap;

use actix_web::{web, HttpResponse, Responder};
use log::{debug, error};

use portauthority_services::{policy, ServiceError};
use portauthority_shared::{
    parse_image_path, ApiError, ImageReviewStatus, K8sImagePolicy, K8sImagePolicyEnvelope,
    K8sImageSpec,
};

use crate::handlers::AppState;

/// Per-request override of the server's default-block setting.
pub const WEBHOOK_ENABLE_ANNOTATION: &str =
    "alpha.image-policy.k8s.io/portauthority-webhook-enable";
/// Names the policy to apply; absent means "default".
pub const POLICY_ANNOTATION: &str = "alpha.image-policy.k8s.io/policy";

pub const DEFAULT_POLICY: &str = "default";

/// Outcome of resolving the webhook-enable annotation against the server's
/// default-block setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEnable {
    /// The deployment's own annotation turned the webhook off.
    UserDisabled,
    /// No annotation, and the server default leaves the webhook off.
    AdminDisabled,
    Enabled,
}

pub fn resolve_webhook_enable(
    annotations: &BTreeMap<String, String>,
    default_block: bool,
) -> Result<WebhookEnable, String> {
    match annotations.get(WEBHOOK_ENABLE_ANNOTATION) {
        Some(raw) => match raw.parse::<bool>() {
            Ok(true) => Ok(WebhookEnable::Enabled),
            Ok(false) => Ok(WebhookEnable::UserDisabled),
            Err(_) => Err(format!(
                "Improperly formatted portauthority-webhook user annotation {raw}"
            )),
        },
        None => {
            if default_block {
                Ok(WebhookEnable::Enabled)
            } else {
                Ok(WebhookEnable::AdminDisabled)
            }
        }
    }
}

pub fn not_scanned_reason(image: &str) -> String {
    format!("Image Not Scanned: {image}")
}

pub fn violation_reason(policy_name: &str, count: usize, image: &str) -> String {
    format!("Scan policy \"{policy_name}\" detected \"{count}\" violations for image: {image}")
}

fn review(request: &K8sImagePolicy, namespace: &str, allowed: bool, reason: &str) -> K8sImagePolicy {
    K8sImagePolicy {
        api_version: request.api_version.clone(),
        kind: request.kind.clone(),
        status: Some(ImageReviewStatus {
            allowed,
            reason: reason.to_string(),
        }),
        spec: Some(K8sImageSpec {
            namespace: namespace.to_string(),
            ..Default::default()
        }),
    }
}

fn internal_error(err: &ServiceError) -> HttpResponse {
    HttpResponse::InternalServerError().json(K8sImagePolicyEnvelope {
        k8s_image_policy: None,
        error: Some(ApiError::new(err.to_string())),
    })
}

/// Admission decision for a Kubernetes ImagePolicyWebhook review: resolve
/// each container's image, join stored scan state with live Analyzer
/// results, apply the requested policy, and answer allow or deny. Any path
/// that reaches a verdict answers 200; only errors that prevent one are 5xx.
pub async fn post_k8s_image_policy(
    state: web::Data<AppState>,
    body: web::Json<K8sImagePolicy>,
) -> impl Responder {
    let request = body.into_inner();
    let spec = match &request.spec {
        Some(spec) => spec.clone(),
        None => {
            error!("failed to provide k8s policy");
            return HttpResponse::BadRequest().json(K8sImagePolicyEnvelope {
                k8s_image_policy: None,
                error: Some(ApiError::new("Failed to provide k8s policy")),
            });
        }
    };
    let namespace = spec.namespace.clone();

    match resolve_webhook_enable(&spec.annotations, state.image_webhook_default_block) {
        Ok(WebhookEnable::UserDisabled) => {
            state.metrics.record_webhook(false, &namespace, "", true);
            return HttpResponse::Ok().json(review(
                &request,
                &namespace,
                true,
                "User disabled image webhook",
            ));
        }
        Ok(WebhookEnable::AdminDisabled) => {
            state.metrics.record_webhook(false, &namespace, "", true);
            return HttpResponse::Ok().json(review(
                &request,
                &namespace,
                true,
                "Image webhook disabled by an administrator",
            ));
        }
        Ok(WebhookEnable::Enabled) => {}
        Err(message) => {
            error!("{message}");
            return HttpResponse::BadRequest().json(K8sImagePolicyEnvelope {
                k8s_image_policy: None,
                error: Some(ApiError::new(
                    "Improperly formatted portauthority-webhook user annotation",
                )),
            });
        }
    }

    if spec.containers.is_empty() {
        state.metrics.record_webhook(true, &namespace, "", false);
        return HttpResponse::Ok().json(review(
            &request,
            &namespace,
            false,
            "Invalid number of container images supplied",
        ));
    }

    let policy_name = spec
        .annotations
        .get(POLICY_ANNOTATION)
        .cloned()
        .unwrap_or_else(|| DEFAULT_POLICY.to_string());

    let db_policy = match state.store.get_policy(&policy_name).await {
        Ok(Some(policy)) => policy,
        Ok(None) => {
            debug!("policy requested could not be found: {policy_name}");
            state
                .metrics
                .record_webhook(true, &namespace, &policy_name, false);
            return HttpResponse::Ok().json(review(
                &request,
                &namespace,
                false,
                &format!("policy requested could not be found: {policy_name}"),
            ));
        }
        Err(err) => {
            error!("error looking up policy \"{policy_name}\" in the database: {err}");
            return internal_error(&err);
        }
    };

    let mut allowed = true;
    let mut reason = String::new();

    // First failing container decides; the rest are not consulted.
    for container in &spec.containers {
        let image_ref = parse_image_path(&container.image);

        let lookup = if !image_ref.digest.is_empty() {
            state.store.get_image_by_digest(&image_ref.digest).await
        } else {
            state
                .store
                .get_image_by_rrt(&image_ref.registry, &image_ref.repo, &image_ref.tag)
                .await
        };

        let db_image = match lookup {
            Ok(image) => image,
            Err(ServiceError::NotFound) => {
                allowed = false;
                reason = not_scanned_reason(&container.image);
                debug!("{reason}");
                break;
            }
            Err(err) => {
                error!("{err}");
                return internal_error(&err);
            }
        };

        let features = match state.clair.get_layers(&db_image.top_layer, true, true).await {
            Ok(layer_data) => layer_data
                .layer
                .map(|layer| layer.features)
                .unwrap_or_default(),
            Err(err) => {
                error!("error getting layer data: {err}");
                return internal_error(&err);
            }
        };

        let violations = match policy::get_violations(&db_policy, &features) {
            Ok(violations) => violations,
            Err(err) => {
                error!("error getting violations: {err}");
                return internal_error(&err);
            }
        };

        if !violations.is_empty() {
            allowed = false;
            reason = violation_reason(&policy_name, violations.len(), &container.image);
            debug!("{reason}");
            break;
        }
    }

    state
        .metrics
        .record_webhook(true, &namespace, &db_policy.name, allowed);
    HttpResponse::Ok().json(review(&request, &namespace, allowed, &reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotations(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn user_annotation_false_disables() {
        let result = resolve_webhook_enable(
            &annotations(&[(WEBHOOK_ENABLE_ANNOTATION, "false")]),
            true,
        );
        assert_eq!(result, Ok(WebhookEnable::UserDisabled));
    }

    #[test]
    fn user_annotation_true_enables_even_when_default_off() {
        let result = resolve_webhook_enable(
            &annotations(&[(WEBHOOK_ENABLE_ANNOTATION, "true")]),
            false,
        );
        assert_eq!(result, Ok(WebhookEnable::Enabled));
    }

    #[test]
    fn absent_annotation_follows_server_default() {
        assert_eq!(
            resolve_webhook_enable(&annotations(&[]), false),
            Ok(WebhookEnable::AdminDisabled)
        );
        assert_eq!(
            resolve_webhook_enable(&annotations(&[]), true),
            Ok(WebhookEnable::Enabled)
        );
    }

    #[test]
    fn malformed_annotation_is_an_error() {
        let result = resolve_webhook_enable(
            &annotations(&[(WEBHOOK_ENABLE_ANNOTATION, "maybe")]),
            true,
        );
        assert!(result.is_err());
    }

    #[test]
    fn deny_reasons_match_review_protocol() {
        assert_eq!(
            not_scanned_reason("reg.x/nope:latest"),
            "Image Not Scanned: reg.x/nope:latest"
        );
        assert_eq!(
            violation_reason("default", 1, "reg.x/app:1"),
            "Scan policy \"default\" detected \"1\" violations for image: reg.x/app:1"
        );
    }
}
