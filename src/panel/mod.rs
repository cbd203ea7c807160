//! The debug panel: toolbar middleware whose renders are fetchable later.
//!
//! [`DebugPanel`] sits where the toolbar middleware would. For each request it
//! either serves one of its own routes (see [`urls`]) without involving the
//! toolbar at all, or lets the toolbar run as usual and then stores the
//! rendered toolbar in the cache. The response then carries an
//! [`DATA_URL_HEADER`] pointing at the stored copy, so a browser extension or
//! other client can fetch the toolbar for responses that never show it
//! (JSON APIs, redirects, XHR).

use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::{CacheStore, MemoryCache, cache_key};
use crate::config::Settings;
use crate::error::ConfigError;
use crate::context::Context;
use crate::http::request::join_origin;
use crate::middleware::{BoxResponse, Middleware, Next};
use crate::router::Router;
use crate::toolbar::{DebugToolbar, Toolbar, ToolbarHooks, ToolbarRenderer};
use crate::Response;

mod clock;
pub mod urls;

pub use clock::{Timestamp, TimestampClock};

/// Response header carrying the absolute URL of the cached toolbar.
pub const DATA_URL_HEADER: &str = "X-debug-data-url";

struct Inner<H> {
    toolbar: H,
    routes: Router,
    cache: Arc<dyn CacheStore>,
    clock: TimestampClock,
}

/// Middleware wrapping a toolbar ([`ToolbarHooks`]) with a render cache.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use debug_panel::config::Settings;
/// use debug_panel::panel::DebugPanel;
/// use debug_panel::toolbar::BasicRenderer;
/// use debug_panel::context::Context;
/// use debug_panel::{Pipeline, Response, StatusCode};
///
/// let settings = Arc::new(Settings { debug: true, ..Settings::default() });
/// let app = Pipeline::new(|_ctx: Context| async { Response::html(StatusCode::Ok, "<body></body>") })
///     .layer(DebugPanel::new(settings, Arc::new(BasicRenderer)).unwrap());
/// ```
pub struct DebugPanel<H = DebugToolbar> {
    inner: Arc<Inner<H>>,
}

impl<H> Clone for DebugPanel<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl DebugPanel<DebugToolbar> {
    /// Panel around the default [`DebugToolbar`], caching in a [`MemoryCache`]
    /// sized from `settings.cache`.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] when `settings` fail [`Settings::validate`].
    pub fn new(settings: Arc<Settings>, renderer: Arc<dyn ToolbarRenderer>) -> Result<Self, ConfigError> {
        let toolbar = DebugToolbar::new(Arc::clone(&settings), renderer)?;
        let cache = Arc::new(MemoryCache::new(
            settings.cache.timeout(),
            settings.cache.max_entries,
        ));
        let prefix = settings.prefix().to_owned();
        Ok(Self::with_hooks(&prefix, toolbar, cache))
    }
}

impl<H> DebugPanel<H>
where
    H: ToolbarHooks + 'static,
{
    /// Panel around any toolbar implementation and cache backend, with its
    /// routes mounted under `prefix`.
    pub fn with_hooks(prefix: &str, toolbar: H, cache: Arc<dyn CacheStore>) -> Self {
        let routes = urls::routes(prefix, Arc::clone(&cache));
        Self {
            inner: Arc::new(Inner {
                toolbar,
                routes,
                cache,
                clock: TimestampClock::new(),
            }),
        }
    }

    /// Returns the wrapped toolbar.
    pub fn toolbar(&self) -> &H {
        &self.inner.toolbar
    }

    /// The panel's own route table.
    pub fn routes(&self) -> &Router {
        &self.inner.routes
    }

    /// Returns the cache renders are written to.
    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.inner.cache
    }
}

impl<H> Inner<H> {
    // Caches the render and points the response at it.
    fn publish(&self, toolbar: &mut Toolbar, origin: &str, response: &mut Response) {
        let timestamp = self.clock.next().to_string();
        let key = cache_key(&timestamp);
        let html = toolbar.render();
        let bytes = html.len();
        self.cache.set(&key, html);

        match self
            .routes
            .reverse(urls::DEBUG_DATA, &[("timestamp", timestamp.as_str())])
        {
            Some(path) => {
                let url = join_origin(origin, &path);
                debug!(key = %key, bytes, url = %url, "cached toolbar render");
                response.headers_mut().set(DATA_URL_HEADER, url);
            }
            None => warn!(key = %key, "cannot reverse debug data route, header not set"),
        }
    }
}

impl<H> Middleware for DebugPanel<H>
where
    H: ToolbarHooks + 'static,
{
    fn handle(&self, ctx: Context, next: Next) -> BoxResponse {
        let inner = Arc::clone(&self.inner);

        Box::pin(async move {
            if inner.routes.resolve(ctx.request().path()).is_some() {
                debug!(path = %ctx.request().path(), "serving debug panel route");
                return inner.routes.route(ctx.into_request()).await;
            }

            let mut toolbar = inner.toolbar.process_request(ctx.request());
            let origin = ctx.request().origin();

            let response = next.run(ctx).await;
            let mut response = inner.toolbar.process_response(toolbar.as_mut(), response);

            if let Some(toolbar) = toolbar.as_mut() {
                inner.publish(toolbar, &origin, &mut response);
            }
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Pipeline;
    use crate::{Request, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counts {
        requests: AtomicUsize,
        responses: AtomicUsize,
        renders: AtomicUsize,
    }

    struct CountingRenderer(Arc<Counts>);

    impl ToolbarRenderer for CountingRenderer {
        fn render(&self, toolbar: &Toolbar) -> String {
            let n = self.0.renders.fetch_add(1, Ordering::SeqCst) + 1;
            format!("<div id=\"djDebug\">{} render {n}</div>", toolbar.path())
        }
    }

    // Counts each phase and swaps the body for the render when shown.
    struct Hooks {
        counts: Arc<Counts>,
        show: bool,
    }

    impl ToolbarHooks for Hooks {
        fn process_request(&self, request: &Request) -> Option<Toolbar> {
            self.counts.requests.fetch_add(1, Ordering::SeqCst);
            self.show.then(|| {
                Toolbar::new(request, Arc::new(CountingRenderer(Arc::clone(&self.counts))))
            })
        }

        fn process_response(&self, toolbar: Option<&mut Toolbar>, mut response: Response) -> Response {
            self.counts.responses.fetch_add(1, Ordering::SeqCst);
            if let Some(toolbar) = toolbar {
                let html = toolbar.render();
                response.set_body(html.as_bytes().to_vec());
            }
            response
        }
    }

    fn panel(show: bool) -> (DebugPanel<Hooks>, Arc<Counts>) {
        let counts = Arc::new(Counts::default());
        let hooks = Hooks {
            counts: Arc::clone(&counts),
            show,
        };
        let panel = DebugPanel::with_hooks("/__debug__", hooks, Arc::new(MemoryCache::default()));
        (panel, counts)
    }

    fn app(panel: DebugPanel<Hooks>) -> Pipeline {
        Pipeline::new(|_ctx: Context| async { Response::new(StatusCode::Ok).body("app") }).layer(panel)
    }

    fn get(path: &str) -> Request {
        let raw = format!("GET {path} HTTP/1.1\r\nHost: testserver:8000\r\n\r\n");
        Request::parse(raw.as_bytes())
            .unwrap()
            .0
            .with_remote_addr("127.0.0.1:40000".parse().unwrap())
    }

    fn data_path(url: &str) -> &str {
        url.strip_prefix("http://testserver:8000").unwrap()
    }

    #[tokio::test]
    async fn internal_route_bypasses_toolbar_hooks() {
        let (panel, counts) = panel(true);
        panel
            .cache()
            .set(&cache_key("1700000000.000001"), "<div>cached</div>".into());

        let res = app(panel).handle(get("/__debug__/data/1700000000.000001/")).await;

        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.body_ref(), b"<div>cached</div>");
        assert!(res.headers().get(DATA_URL_HEADER).is_none());
        assert_eq!(counts.requests.load(Ordering::SeqCst), 0);
        assert_eq!(counts.responses.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn internal_route_with_wrong_method_still_bypasses() {
        let (panel, counts) = panel(true);
        let raw = b"POST /__debug__/data/1.5 HTTP/1.1\r\nHost: x\r\n\r\n";
        let res = app(panel).handle(Request::parse(raw).unwrap().0).await;
        assert_eq!(res.status(), StatusCode::MethodNotAllowed);
        assert_eq!(counts.requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn hidden_toolbar_leaves_response_alone() {
        let (panel, counts) = panel(false);
        let res = app(panel).handle(get("/page")).await;

        assert_eq!(res.body_ref(), b"app");
        assert!(res.headers().get(DATA_URL_HEADER).is_none());
        assert_eq!(counts.requests.load(Ordering::SeqCst), 1);
        assert_eq!(counts.responses.load(Ordering::SeqCst), 1);
        assert_eq!(counts.renders.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rendered_toolbar_is_cached_and_linked() {
        let (panel, counts) = panel(true);
        let routes_panel = panel.clone();
        let app = app(panel);

        let res = app.handle(get("/page")).await;

        let urls: Vec<_> = res.headers().get_all(DATA_URL_HEADER).collect();
        assert_eq!(urls.len(), 1);
        let path = data_path(urls[0]);

        let resolved = routes_panel.routes().resolve(path).unwrap();
        assert_eq!(resolved.name, Some(urls::DEBUG_DATA));
        let timestamp = resolved.params.get("timestamp").unwrap();
        let cached = routes_panel.cache().get(&cache_key(timestamp)).unwrap();

        // Rendered once, shared by the body and the cache.
        assert_eq!(counts.renders.load(Ordering::SeqCst), 1);
        assert_eq!(res.body_ref(), cached.as_bytes());
        assert_eq!(&*cached, "<div id=\"djDebug\">/page render 1</div>");

        let fetched = app.handle(get(path)).await;
        assert_eq!(fetched.status(), StatusCode::Ok);
        assert_eq!(fetched.body_ref(), cached.as_bytes());
    }

    #[tokio::test]
    async fn toolbar_not_rendered_into_body_is_still_cached() {
        struct NoInsert(Arc<Counts>);
        impl ToolbarHooks for NoInsert {
            fn process_request(&self, request: &Request) -> Option<Toolbar> {
                Some(Toolbar::new(request, Arc::new(CountingRenderer(Arc::clone(&self.0)))))
            }
            fn process_response(&self, _toolbar: Option<&mut Toolbar>, response: Response) -> Response {
                response
            }
        }

        let counts = Arc::new(Counts::default());
        let panel = DebugPanel::with_hooks(
            "/__debug__",
            NoInsert(Arc::clone(&counts)),
            Arc::new(MemoryCache::default()),
        );
        let cache = Arc::clone(panel.cache());
        let app = Pipeline::new(|_ctx: Context| async { Response::new(StatusCode::Ok).body("{}") }).layer(panel);

        let res = app.handle(get("/api")).await;
        let url = res.headers().get(DATA_URL_HEADER).unwrap();
        let timestamp = url.trim_end_matches('/').rsplit('/').next().unwrap();
        assert!(cache.get(&cache_key(timestamp)).is_some());
        assert_eq!(res.body_ref(), b"{}");
        assert_eq!(counts.renders.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn back_to_back_responses_get_distinct_keys() {
        let (panel, _) = panel(true);
        let app = app(panel);

        let mut urls = Vec::new();
        for _ in 0..50 {
            let res = app.handle(get("/page")).await;
            urls.push(res.headers().get(DATA_URL_HEADER).unwrap().to_owned());
        }
        let unique: std::collections::HashSet<_> = urls.iter().collect();
        assert_eq!(unique.len(), urls.len());
    }

    #[tokio::test]
    async fn default_panel_inserts_toolbar_and_links_it() {
        let settings = Arc::new(Settings {
            debug: true,
            ..Settings::default()
        });
        let panel = DebugPanel::new(settings, Arc::new(crate::toolbar::BasicRenderer)).unwrap();
        let app = Pipeline::new(|_ctx: Context| async {
            Response::html(StatusCode::Ok, "<html><body><h1>Home</h1></body></html>")
        })
        .layer(panel);

        let res = app.handle(get("/")).await;
        let body = String::from_utf8(res.body_ref().to_vec()).unwrap();
        assert!(body.contains("<h1>Home</h1><div id=\"djDebug\""));

        let url = res.headers().get(DATA_URL_HEADER).unwrap().to_owned();
        assert!(url.starts_with("http://testserver:8000/__debug__/data/"));

        let fetched = app.handle(get(data_path(&url))).await;
        assert_eq!(fetched.status(), StatusCode::Ok);
        assert!(body.contains(std::str::from_utf8(fetched.body_ref()).unwrap()));
    }

    #[test]
    fn root_prefix_is_rejected_at_construction() {
        let settings = Arc::new(Settings {
            debug: true,
            url_prefix: "/".to_owned(),
            ..Settings::default()
        });
        let err = DebugPanel::new(settings, Arc::new(crate::toolbar::BasicRenderer)).err();
        assert!(matches!(err, Some(ConfigError::InvalidUrlPrefix(prefix)) if prefix == "/"));
    }

    #[tokio::test]
    async fn never_expiring_cache_timeout_still_publishes() {
        let mut settings = Settings {
            debug: true,
            ..Settings::default()
        };
        settings.cache.timeout_secs = u64::MAX;
        let panel = DebugPanel::new(Arc::new(settings), Arc::new(crate::toolbar::BasicRenderer)).unwrap();
        let app = Pipeline::new(|_ctx: Context| async { Response::new(StatusCode::Ok).body("{}") }).layer(panel);

        let res = app.handle(get("/api")).await;
        let url = res.headers().get(DATA_URL_HEADER).unwrap().to_owned();
        let fetched = app.handle(get(data_path(&url))).await;
        assert_eq!(fetched.status(), StatusCode::Ok);
    }
}
