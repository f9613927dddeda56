use std::time::{Duration, Instant};

use actix_web::body::{BoxBody, MessageBody};
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::middleware::Next;
use actix_web::{web, HttpResponse};

use crate::handlers::AppState;

/// Literal body returned when a request overruns the configured window.
pub const TIMEOUT_RESPONSE: &str = "{\"Error\":{\"Message\":\"Port Authority failed to respond within the configured timeout window.\",\"Type\":\"Timeout\"}}";

const FALLBACK_TIMEOUT: Duration = Duration::from_secs(900);

/// Bounds every request by the configured timeout and records the response
/// duration under the matched route pattern.
pub async fn instrument(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<BoxBody>, actix_web::Error> {
    let state = req.app_data::<web::Data<AppState>>().cloned();
    let route = req
        .match_pattern()
        .unwrap_or_else(|| req.path().to_string());
    let method = req.method().clone();
    let http_req = req.request().clone();
    let window = state
        .as_ref()
        .map(|s| s.timeout)
        .unwrap_or(FALLBACK_TIMEOUT);

    let start = Instant::now();
    match tokio::time::timeout(window, next.call(req)).await {
        Ok(result) => {
            let res = result?;
            let status = res.status().as_u16();
            if let Some(state) = &state {
                state
                    .metrics
                    .observe_response(&route, status, start.elapsed().as_secs_f64());
            }
            log::info!(
                "handled HTTP request method={method} route={route} status={status} elapsed={:?}",
                start.elapsed()
            );
            Ok(res.map_into_boxed_body())
        }
        Err(_) => {
            let status = actix_web::http::StatusCode::SERVICE_UNAVAILABLE;
            if let Some(state) = &state {
                state
                    .metrics
                    .observe_response(&route, status.as_u16(), start.elapsed().as_secs_f64());
            }
            log::warn!("request timed out method={method} route={route}");
            let response = HttpResponse::build(status)
                .content_type("application/json;charset=utf-8")
                .body(TIMEOUT_RESPONSE);
            Ok(ServiceResponse::new(http_req, response))
        }
    }
}
