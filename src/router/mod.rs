//! Request routing: map URL patterns to handlers, resolve paths, reverse names.
//!
//! Three pattern styles are supported:
//!
//! | Pattern                      | Example match              | Captured params                   |
//! |------------------------------|----------------------------|-----------------------------------|
//! | `/ping`                      | `/ping`                    | *(none)*                          |
//! | `/data/:timestamp<decimal>`  | `/data/1712.25`            | `timestamp → "1712.25"`           |
//! | `/static/*`                  | `/static/css/app.css`      | `wildcard → "/css/app.css"`       |
//!
//! A captured segment may carry a kind: `<int>` (ASCII digits) or `<decimal>`
//! (digits, a dot, digits). Segments failing their kind make the whole pattern
//! miss, so the path falls through to whatever handles unmatched requests.
//!
//! Trailing slashes are normalized on patterns and paths. Routes are tried in
//! registration order; the first match wins.

use std::pin::Pin;
use std::sync::Arc;

use crate::context::{Context, PathParams};
use crate::{Method, Request, Response, StatusCode};

/// Type-erased async handler stored in the route table.
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Blanket-implemented for any `Fn(Context) -> impl Future<Output = Response>`
/// that is `Send + Sync + 'static`.
pub trait IntoHandler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin((self)(ctx))
    }
}

// Accepted shapes for a captured segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamKind {
    Any,
    Int,
    Decimal,
}

impl ParamKind {
    fn parse(kind: &str) -> Self {
        match kind {
            "int" => ParamKind::Int,
            "decimal" => ParamKind::Decimal,
            _ => ParamKind::Any,
        }
    }

    fn accepts(self, value: &str) -> bool {
        let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        match self {
            ParamKind::Any => !value.is_empty(),
            ParamKind::Int => digits(value),
            ParamKind::Decimal => value
                .split_once('.')
                .is_some_and(|(whole, frac)| digits(whole) && digits(frac)),
        }
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Static(String),
    Parameter { name: String, kind: ParamKind },
}

#[derive(Debug, Clone)]
enum Pattern {
    Exact(String),
    Parameterized { segments: Vec<Segment> },
    Wildcard(String),
}

fn trim_trailing_slash(path: &str) -> &str {
    if path != "/" && path.ends_with('/') {
        &path[..path.len() - 1]
    } else {
        path
    }
}

impl Pattern {
    // Classification order: `/*` suffix → wildcard, any `:` → parameterized,
    // otherwise exact.
    fn parse(pattern: &str) -> Self {
        let pattern = trim_trailing_slash(pattern);

        if let Some(prefix) = pattern.strip_suffix("/*") {
            return Pattern::Wildcard(prefix.to_string());
        }

        if pattern.contains(':') {
            let segments = pattern
                .split('/')
                .filter(|s| !s.is_empty())
                .map(|s| match s.strip_prefix(':') {
                    Some(param) => match param.split_once('<') {
                        Some((name, kind)) => Segment::Parameter {
                            name: name.to_string(),
                            kind: ParamKind::parse(kind.trim_end_matches('>')),
                        },
                        None => Segment::Parameter {
                            name: param.to_string(),
                            kind: ParamKind::Any,
                        },
                    },
                    None => Segment::Static(s.to_string()),
                })
                .collect();

            return Pattern::Parameterized { segments };
        }

        Pattern::Exact(pattern.to_string())
    }

    fn matches(&self, path: &str) -> Option<PathParams> {
        let path = trim_trailing_slash(path);

        match self {
            Pattern::Exact(p) => (p == path).then(PathParams::new),
            Pattern::Parameterized { segments } => {
                let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
                if segments.len() != path_segments.len() {
                    return None;
                }

                let mut params = PathParams::new();
                for (seg, path_seg) in segments.iter().zip(path_segments) {
                    match seg {
                        Segment::Static(s) if s != path_seg => return None,
                        Segment::Static(_) => {}
                        Segment::Parameter { name, kind } => {
                            if !kind.accepts(path_seg) {
                                return None;
                            }
                            params.insert(name.clone(), path_seg);
                        }
                    }
                }
                Some(params)
            }
            Pattern::Wildcard(prefix) => {
                let suffix = path.strip_prefix(prefix.as_str())?;
                if !suffix.is_empty() && !suffix.starts_with('/') {
                    return None;
                }
                let mut params = PathParams::new();
                params.insert("wildcard", suffix);
                Some(params)
            }
        }
    }

    // Rebuild a concrete path from captured values; `None` if a value is
    // missing or would not match its own segment.
    fn reverse(&self, values: &[(&str, &str)]) -> Option<String> {
        let lookup = |key: &str| values.iter().find(|(k, _)| *k == key).map(|(_, v)| *v);

        match self {
            Pattern::Exact(p) => Some(p.clone()),
            Pattern::Wildcard(prefix) => Some(format!("{prefix}{}", lookup("wildcard")?)),
            Pattern::Parameterized { segments } => {
                let mut path = String::new();
                for seg in segments {
                    path.push('/');
                    match seg {
                        Segment::Static(s) => path.push_str(s),
                        Segment::Parameter { name, kind } => {
                            let value = lookup(name)?;
                            if value.contains('/') || !kind.accepts(value) {
                                return None;
                            }
                            path.push_str(value);
                        }
                    }
                }
                path.push('/');
                Some(path)
            }
        }
    }
}

struct Route {
    method: Method,
    name: Option<String>,
    pattern: Pattern,
    handler: Handler,
}

/// A path that resolved against a [`Router`], independent of method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a> {
    /// Name the route was registered under, if any.
    pub name: Option<&'a str>,
    pub params: PathParams,
}

/// Route table that resolves paths, dispatches requests and reverses names.
///
/// # Examples
///
/// ```rust
/// use debug_panel::context::Context;
/// use debug_panel::{Router, Response, StatusCode};
///
/// let mut router = Router::new();
/// router.get_named("data", "/data/:stamp<decimal>", |_ctx: Context| async {
///     Response::new(StatusCode::Ok)
/// });
///
/// assert!(router.resolve("/data/17.5").is_some());
/// assert!(router.resolve("/data/latest").is_none());
/// assert_eq!(router.reverse("data", &[("stamp", "17.5")]).as_deref(), Some("/data/17.5/"));
/// ```
pub struct Router {
    routes: Vec<Route>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Creates an empty router.
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Register an anonymous `GET` route.
    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Get, None, path, handler);
    }

    /// Register a `GET` route that can be found again with [`reverse`](Self::reverse).
    pub fn get_named(&mut self, name: &str, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Get, Some(name), path, handler);
    }

    fn add_route(&mut self, method: Method, name: Option<&str>, path: &str, handler: impl IntoHandler) {
        let handler: Handler = Arc::new(move |ctx: Context| handler.call(ctx));
        self.routes.push(Route {
            method,
            name: name.map(str::to_owned),
            pattern: Pattern::parse(path),
            handler,
        });
    }

    /// Returns the number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if no routes are registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Resolve `path` against the table, ignoring the request method.
    ///
    /// `None` is the ordinary "not one of ours" outcome, not an error.
    pub fn resolve(&self, path: &str) -> Option<RouteMatch<'_>> {
        self.routes.iter().find_map(|route| {
            route.pattern.matches(path).map(|params| RouteMatch {
                name: route.name.as_deref(),
                params,
            })
        })
    }

    /// Build the path for the route registered as `name`.
    ///
    /// Parameterized routes are reversed with a trailing slash; lookups ignore
    /// it either way.
    pub fn reverse(&self, name: &str, params: &[(&str, &str)]) -> Option<String> {
        self.routes
            .iter()
            .find(|route| route.name.as_deref() == Some(name))
            .and_then(|route| route.pattern.reverse(params))
    }

    /// Dispatch `request` to the first route matching both method and path.
    ///
    /// Falls back to `405 Method Not Allowed` when only the path matched, and
    /// to `404 Not Found` when nothing did.
    pub async fn route(&self, request: Request) -> Response {
        let mut path_matched = false;

        for route in &self.routes {
            let Some(params) = route.pattern.matches(request.path()) else {
                continue;
            };
            if &route.method == request.method() {
                let ctx = Context::with_params(request, params);
                return (route.handler)(ctx).await;
            }
            path_matched = true;
        }

        if path_matched {
            Response::new(StatusCode::MethodNotAllowed)
        } else {
            Response::new(StatusCode::NotFound)
        }
    }
}
