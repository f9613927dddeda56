use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::{Registry, Unit};

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct WebhookLabels {
    pub enabled: String,
    pub namespace: String,
    pub policy: String,
    pub allowed: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RouteLabels {
    pub route: String,
    pub code: String,
}

/// API metrics. The registry is owned here rather than process-global so
/// tests can build their own scoped instance.
pub struct ApiMetrics {
    registry: Registry,
    webhook_responses: Family<WebhookLabels, Counter>,
    response_duration: Family<RouteLabels, Histogram>,
}

impl ApiMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("portauthority");

        let webhook_responses = Family::<WebhookLabels, Counter>::default();
        registry.register(
            "api_k8s_image_policy_webhook_response_status",
            "Number of allowed or denied responses recorded",
            webhook_responses.clone(),
        );

        let response_duration = Family::<RouteLabels, Histogram>::new_with_constructor(|| {
            Histogram::new(exponential_buckets(0.009375, 2.0, 10))
        });
        registry.register_with_unit(
            "api_response_duration",
            "Duration of receiving and answering an API request",
            Unit::Seconds,
            response_duration.clone(),
        );

        Self {
            registry,
            webhook_responses,
            response_duration,
        }
    }

    pub fn record_webhook(&self, enabled: bool, namespace: &str, policy: &str, allowed: bool) {
        self.webhook_responses
            .get_or_create(&WebhookLabels {
                enabled: enabled.to_string(),
                namespace: namespace.to_string(),
                policy: policy.to_string(),
                allowed: allowed.to_string(),
            })
            .inc();
    }

    pub fn observe_response(&self, route: &str, code: u16, seconds: f64) {
        self.response_duration
            .get_or_create(&RouteLabels {
                route: route.to_string(),
                code: code.to_string(),
            })
            .observe(seconds);
    }

    /// Prometheus text exposition of everything recorded so far.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_verdicts_are_counted_by_labels() {
        let metrics = ApiMetrics::new();
        metrics.record_webhook(true, "team-a", "default", false);
        metrics.record_webhook(true, "team-a", "default", false);

        let exposition = metrics.encode().unwrap();
        assert!(exposition.contains("portauthority_api_k8s_image_policy_webhook_response_status"));
        assert!(exposition.contains("namespace=\"team-a\""));
        assert!(exposition.contains("allowed=\"false\""));
    }

    #[test]
    fn response_durations_encode_as_histogram() {
        let metrics = ApiMetrics::new();
        metrics.observe_response("/v1/images", 200, 0.02);

        let exposition = metrics.encode().unwrap();
        assert!(exposition.contains("portauthority_api_response_duration_seconds"));
        assert!(exposition.contains("route=\"/v1/images\""));
    }
}
