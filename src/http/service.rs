//! Request handling: derive the client and resource keys from an HTTP
//! request and answer with the limiter's decision.

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};

use crate::ratelimit::{Decision, RateLimiter};

/// Client key used when neither a forwarding header nor a peer address is
/// available.
pub const UNKNOWN_CLIENT: &str = "unknown";

const FORWARDED_FOR: &str = "x-forwarded-for";
const ROOT: &str = "/";

/// Build the router. `/` and every path with a registered rule are rate
/// limited as their own resource; other paths get 404.
pub fn router(rate_limiter: Arc<RateLimiter>) -> Router {
    Router::new().fallback(admit).with_state(rate_limiter)
}

/// Derive the client key for a request.
///
/// Uses the first entry of the first `X-Forwarded-For` header, falling back
/// to the peer address and then to [`UNKNOWN_CLIENT`].
pub fn client_key(headers: &HeaderMap, peer: Option<IpAddr>) -> String {
    headers
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|client| !client.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|ip| ip.to_string()))
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

#[instrument(skip_all, fields(path = %request.uri().path()))]
async fn admit(State(rate_limiter): State<Arc<RateLimiter>>, request: Request) -> Response {
    let resource = request.uri().path().to_string();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let client = client_key(request.headers(), peer);

    if !is_served(&rate_limiter, &resource) {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("No resource at {}", resource) })),
        )
            .into_response();
    }

    match rate_limiter.check(&client, &resource) {
        Ok(Decision::Allowed { remaining }) => (
            StatusCode::OK,
            Json(json!({
                "message": format!("Request to {} admitted", resource),
                "resource": resource,
                "remaining": remaining,
            })),
        )
            .into_response(),
        Ok(Decision::Rejected { retry_after }) => (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, retry_after_secs(retry_after).to_string())],
            Json(json!({
                "error": format!(
                    "Rate limit exceeded for {}. Please try again later.",
                    resource
                ),
            })),
        )
            .into_response(),
        Err(e) => {
            warn!(client = %client, error = %e, "Rejected malformed admission request");
            (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

/// The root is served under the default rule; any other path needs a rule
/// of its own. Unknown paths never reach the limiter, so they cannot
/// create windows.
fn is_served(rate_limiter: &RateLimiter, resource: &str) -> bool {
    resource == ROOT || rate_limiter.rules().override_for(resource).is_some()
}

/// Whole seconds for a `Retry-After` header, rounded up and at least one.
fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}
