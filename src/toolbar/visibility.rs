use tracing::trace;

use crate::Request;
use crate::config::Settings;
use crate::router::Router;

/// Decides whether `request` gets a toolbar.
///
/// All three must hold:
///
/// 1. the client's IP is in `settings.internal_ips` (no recorded peer means no);
/// 2. the path does not resolve to one of the toolbar's own routes, so the
///    toolbar never instruments itself;
/// 3. `settings.debug` is on.
///
/// A path that fails to resolve is simply not a toolbar route.
pub fn show_toolbar(settings: &Settings, toolbar_routes: &Router, request: &Request) -> bool {
    let Some(ip) = request.remote_ip() else {
        trace!(path = %request.path(), "toolbar hidden: unknown client address");
        return false;
    };
    if !settings.is_internal_ip(ip) {
        trace!(client = %ip, "toolbar hidden: client not in internal_ips");
        return false;
    }

    if let Some(route) = toolbar_routes.resolve(request.path()) {
        trace!(path = %request.path(), route = ?route.name, "toolbar hidden: toolbar route");
        return false;
    }

    settings.debug
}
