//! Routes owned by the panel itself, separate from the host application's.

use std::sync::Arc;

use crate::cache::{CacheStore, cache_key};
use crate::context::Context;
use crate::router::Router;
use crate::{Response, StatusCode};

/// Name of the route serving cached toolbar HTML.
pub const DEBUG_DATA: &str = "debug_data";

const EXPIRED_HTML: &str = "<!DOCTYPE html>\n<html><head><title>Debug data expired</title></head>\
<body><p>The debug data for this request is no longer available. \
Reload the page to capture it again.</p></body></html>";

/// The panel's route table: `GET {prefix}/data/:timestamp`.
pub fn routes(prefix: &str, cache: Arc<dyn CacheStore>) -> Router {
    let mut router = Router::new();
    router.get_named(
        DEBUG_DATA,
        &format!("{}/data/:timestamp<decimal>", prefix.trim_end_matches('/')),
        move |ctx: Context| {
            let cache = Arc::clone(&cache);
            async move {
                let timestamp = ctx.params().get("timestamp").unwrap_or_default();
                debug_data(cache.as_ref(), timestamp)
            }
        },
    );
    router
}

/// Serves the toolbar cached for `timestamp`, or an "expired" page.
pub fn debug_data(cache: &dyn CacheStore, timestamp: &str) -> Response {
    match cache.get(&cache_key(timestamp)) {
        Some(html) => Response::html(StatusCode::Ok, &*html),
        None => {
            tracing::debug!(timestamp, "debug data missing or expired");
            Response::html(StatusCode::NotFound, EXPIRED_HTML)
        }
    }
}
