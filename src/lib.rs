//! # debug-panel
//!
//! A debug toolbar extension that keeps every rendered toolbar fetchable after
//! the fact. Responses that got a toolbar carry an `X-debug-data-url` header;
//! a GET on that URL returns the toolbar HTML from the cache, which makes the
//! toolbar usable for JSON APIs and background requests that never show HTML.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use debug_panel::config::Settings;
//! use debug_panel::panel::DebugPanel;
//! use debug_panel::toolbar::BasicRenderer;
//! use debug_panel::context::Context;
//! use debug_panel::{Pipeline, Response, Server, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Arc::new(Settings { debug: true, ..Settings::default() });
//!
//!     let app = Pipeline::new(|_ctx: Context| async {
//!         Response::new(StatusCode::Ok)
//!             .header("Content-Type", "application/json")
//!             .body(r#"{"ok":true}"#)
//!     })
//!     .layer(DebugPanel::new(settings, Arc::new(BasicRenderer))?);
//!
//!     Server::bind("127.0.0.1:8000").await?.serve(app).await?;
//!     Ok(())
//! }
//! ```

// ── The panel and the toolbar it wraps ────────────────────────────────────────
pub mod cache;
pub mod config;
pub mod error;
pub mod panel;
pub mod toolbar;

// ── Host plumbing: HTTP types, routing, middleware chain, server ─────────────
pub mod context;
pub mod http;
pub mod middleware;
pub mod router;
pub mod server;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use middleware::{Middleware, Pipeline};
pub use panel::DebugPanel;
pub use router::Router;
pub use server::{Server, ServerError};
