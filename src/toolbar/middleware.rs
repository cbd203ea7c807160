use std::sync::Arc;

use tracing::debug;

use super::{Toolbar, ToolbarRenderer, show_toolbar};
use crate::config::Settings;
use crate::error::ConfigError;
use crate::context::Context;
use crate::middleware::{BoxResponse, Middleware, Next};
use crate::router::Router;
use crate::{Request, Response, StatusCode};

/// The two phases of the toolbar middleware.
///
/// The toolbar created in the request phase is handed back to the response
/// phase by the caller; nothing is stashed in shared state between them.
pub trait ToolbarHooks: Send + Sync {
    /// Request phase: a toolbar when this request should get one.
    fn process_request(&self, request: &Request) -> Option<Toolbar>;

    /// Response phase: may render `toolbar` into the response.
    fn process_response(&self, toolbar: Option<&mut Toolbar>, response: Response) -> Response;
}

/// Default toolbar middleware.
///
/// Creates a toolbar for requests that pass [`show_toolbar`] and renders it
/// into HTML responses just before the closing `</body>` tag. Usable on its
/// own as a [`Middleware`], or wrapped by [`DebugPanel`](crate::panel::DebugPanel).
#[derive(Clone)]
pub struct DebugToolbar {
    settings: Arc<Settings>,
    renderer: Arc<dyn ToolbarRenderer>,
    routes: Arc<Router>,
}

impl DebugToolbar {
    /// Creates the toolbar. It claims everything under `settings.url_prefix`
    /// as its own.
    ///
    /// # Errors
    ///
    /// Whatever [`Settings::validate`] rejects, e.g. a root `url_prefix` whose
    /// claim would cover every path.
    pub fn new(settings: Arc<Settings>, renderer: Arc<dyn ToolbarRenderer>) -> Result<Self, ConfigError> {
        settings.validate()?;
        let mut routes = Router::new();
        routes.get(&format!("{}/*", settings.prefix()), |_ctx: Context| async {
            Response::new(StatusCode::NotFound)
        });
        Ok(Self {
            settings,
            renderer,
            routes: Arc::new(routes),
        })
    }

    /// Returns the settings the toolbar was built with.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Returns the routes the toolbar claims as its own.
    pub fn routes(&self) -> &Router {
        &self.routes
    }
}

impl ToolbarHooks for DebugToolbar {
    fn process_request(&self, request: &Request) -> Option<Toolbar> {
        show_toolbar(&self.settings, &self.routes, request)
            .then(|| Toolbar::new(request, Arc::clone(&self.renderer)))
    }

    fn process_response(&self, toolbar: Option<&mut Toolbar>, mut response: Response) -> Response {
        let Some(toolbar) = toolbar else {
            return response;
        };
        toolbar.record_response(&response);

        if !response.is_html() {
            return response;
        }
        let html = toolbar.render();
        match insert_before_body_close(response.body_ref(), &html) {
            Some(body) => response.set_body(body),
            None => debug!(path = %toolbar.path(), "no </body> in HTML response, toolbar not inserted"),
        }
        response
    }
}

impl Middleware for DebugToolbar {
    fn handle(&self, ctx: Context, next: Next) -> BoxResponse {
        let mut toolbar = self.process_request(ctx.request());
        let hooks = self.clone();
        Box::pin(async move {
            let response = next.run(ctx).await;
            hooks.process_response(toolbar.as_mut(), response)
        })
    }
}

/// Inserts `html` before the last `</body>` (any case) in `body`.
///
/// `None` when the body has no closing body tag.
pub fn insert_before_body_close(body: &[u8], html: &str) -> Option<Vec<u8>> {
    const TAG: &[u8] = b"</body>";
    let at = body
        .windows(TAG.len())
        .rposition(|window| window.eq_ignore_ascii_case(TAG))?;

    let mut out = Vec::with_capacity(body.len() + html.len());
    out.extend_from_slice(&body[..at]);
    out.extend_from_slice(html.as_bytes());
    out.extend_from_slice(&body[at..]);
    Some(out)
}
