//! Middleware chain: ordered layers in front of a terminal endpoint.
//!
//! A [`Pipeline`] owns the layers and the endpoint. Each request gets a fresh
//! [`Next`] cursor; a layer either answers on its own or calls
//! [`Next::run`] and then decorates what comes back.

use std::{future::Future, pin::Pin, sync::Arc};

use crate::router::{Handler, IntoHandler, Router};
use crate::{Request, Response, context::Context};

/// Boxed future returned by every middleware.
pub type BoxResponse = Pin<Box<dyn Future<Output = Response> + Send>>;

/// Type-erased, cheaply cloneable middleware.
pub type MiddlewareHandler = Arc<dyn Fn(Context, Next) -> BoxResponse + Send + Sync + 'static>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// Cursor into the rest of the chain for one request.
///
/// Consumed by [`run`](Self::run), so a layer can forward at most once.
pub struct Next {
    middlewares: Arc<[MiddlewareHandler]>,
    index: usize,
    endpoint: Handler,
}

impl Next {
    /// Invokes the next layer, or the endpoint once the layers are exhausted.
    pub async fn run(mut self, ctx: Context) -> Response {
        match self.middlewares.get(self.index).cloned() {
            Some(handler) => {
                self.index += 1;
                handler(ctx, self).await
            }
            None => (self.endpoint)(ctx).await,
        }
    }
}

/// A request/response interceptor.
///
/// Implementations may forward (`next.run(ctx).await`), short-circuit by
/// returning their own response, or forward and then modify the response.
/// They are shared across Tokio tasks, so must be `Send + Sync`.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: Context, next: Next) -> BoxResponse;
}

/// Ordered middleware layers terminated by an endpoint handler.
///
/// Layers run in the order they were added: the first one added sees the
/// request first and the response last.
///
/// # Examples
///
/// ```rust
/// use debug_panel::context::Context;
/// use debug_panel::{Pipeline, Response, StatusCode};
///
/// let pipeline = Pipeline::new(|_ctx: Context| async { Response::new(StatusCode::Ok).body("app") });
/// assert_eq!(pipeline.len(), 0);
/// ```
pub struct Pipeline {
    middlewares: Arc<[MiddlewareHandler]>,
    endpoint: Handler,
}

impl Pipeline {
    /// Creates a pipeline that ends in `endpoint`.
    pub fn new(endpoint: impl IntoHandler) -> Self {
        let endpoint: Handler = Arc::new(move |ctx: Context| endpoint.call(ctx));
        Self {
            middlewares: Arc::from(Vec::new()),
            endpoint,
        }
    }

    /// A pipeline whose endpoint dispatches through `router`.
    pub fn from_router(router: Router) -> Self {
        let router = Arc::new(router);
        Self::new(move |ctx: Context| {
            let router = Arc::clone(&router);
            async move { router.route(ctx.into_request()).await }
        })
    }

    /// Appends a layer behind the ones already added.
    #[must_use]
    pub fn layer<M>(self, middleware: M) -> Self
    where
        M: Middleware + 'static,
    {
        let mut middlewares = self.middlewares.to_vec();
        middlewares.push(from_middleware(Arc::new(middleware)));
        Self {
            middlewares: Arc::from(middlewares),
            endpoint: self.endpoint,
        }
    }

    /// Returns the number of layered middlewares.
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Returns `true` when no middleware is layered.
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Runs `request` through every layer and the endpoint.
    pub async fn handle(&self, request: Request) -> Response {
        let next = Next {
            middlewares: Arc::clone(&self.middlewares),
            index: 0,
            endpoint: Arc::clone(&self.endpoint),
        };
        next.run(Context::new(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StatusCode;

    struct Tag(&'static str);

    impl Middleware for Tag {
        fn handle(&self, ctx: Context, next: Next) -> BoxResponse {
            let tag = self.0;
            Box::pin(async move {
                let mut response = next.run(ctx).await;
                response.headers_mut().append("X-Trail", tag);
                response
            })
        }
    }

    struct Deny;

    impl Middleware for Deny {
        fn handle(&self, _ctx: Context, _next: Next) -> BoxResponse {
            Box::pin(async { Response::new(StatusCode::Forbidden) })
        }
    }

    fn request(path: &str) -> Request {
        let raw = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        Request::parse(raw.as_bytes()).unwrap().0
    }

    #[tokio::test]
    async fn empty_pipeline_calls_endpoint() {
        let pipeline = Pipeline::new(|_ctx: Context| async { Response::new(StatusCode::Ok).body("app") });
        let res = pipeline.handle(request("/")).await;
        assert_eq!(res.body_ref(), b"app");
    }

    #[tokio::test]
    async fn layers_unwind_in_reverse_order() {
        let pipeline = Pipeline::new(|_ctx: Context| async { Response::new(StatusCode::Ok) })
            .layer(Tag("outer"))
            .layer(Tag("inner"));
        let res = pipeline.handle(request("/")).await;
        let trail: Vec<_> = res.headers().get_all("x-trail").collect();
        assert_eq!(trail, vec!["inner", "outer"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_endpoint() {
        let pipeline = Pipeline::new(|_ctx: Context| async { Response::new(StatusCode::Ok) })
            .layer(Tag("outer"))
            .layer(Deny);
        let res = pipeline.handle(request("/")).await;
        assert_eq!(res.status(), StatusCode::Forbidden);
        assert_eq!(res.headers().get("x-trail"), Some("outer"));
    }

    #[tokio::test]
    async fn router_endpoint() {
        let mut router = Router::new();
        router.get("/ping", |_ctx: Context| async { Response::new(StatusCode::Ok).body("pong") });
        let pipeline = Pipeline::from_router(router);
        assert_eq!(pipeline.handle(request("/ping")).await.body_ref(), b"pong");
        assert_eq!(
            pipeline.handle(request("/nope")).await.status(),
            StatusCode::NotFound
        );
    }
}
