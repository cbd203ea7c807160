//! The debug toolbar the panel wraps.
//!
//! - [`Toolbar`]: per-request toolbar state with a memoized render.
//! - [`ToolbarRenderer`]: turns a toolbar into HTML; hosts plug their panels in here.
//! - [`ToolbarHooks`] / [`DebugToolbar`]: the request/response hooks of the
//!   toolbar middleware.
//! - [`show_toolbar`]: who gets to see the toolbar.

use std::fmt::Write as _;
use std::net::IpAddr;
use std::sync::Arc;

use crate::{Method, Request, Response, StatusCode};

mod middleware;
mod visibility;

pub use middleware::{DebugToolbar, ToolbarHooks, insert_before_body_close};
pub use visibility::show_toolbar;

/// Produces the toolbar's HTML.
pub trait ToolbarRenderer: Send + Sync {
    /// Returns the toolbar's HTML for the request it was created for.
    fn render(&self, toolbar: &Toolbar) -> String;
}

/// Toolbar state for a single request.
///
/// Rendering is memoized: the first [`render`](Self::render) call invokes the
/// renderer and every later call hands back the same `Arc<str>`.
pub struct Toolbar {
    method: Method,
    path: String,
    remote_ip: Option<IpAddr>,
    status: Option<StatusCode>,
    renderer: Arc<dyn ToolbarRenderer>,
    rendered: Option<Arc<str>>,
}

impl Toolbar {
    /// Creates an unrendered toolbar for `request`.
    pub fn new(request: &Request, renderer: Arc<dyn ToolbarRenderer>) -> Self {
        let path = match request.query_string() {
            Some(query) => format!("{}?{query}", request.path()),
            None => request.path().to_owned(),
        };
        Self {
            method: request.method().clone(),
            path,
            remote_ip: request.remote_ip(),
            status: None,
            renderer,
            rendered: None,
        }
    }

    /// Returns the request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path, with its query string when there was one.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the client address, if the server recorded one.
    pub fn remote_ip(&self) -> Option<IpAddr> {
        self.remote_ip
    }

    /// Status of the response the toolbar is attached to, once known.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Records what the application answered, for the renderer to show.
    pub fn record_response(&mut self, response: &Response) {
        self.status = Some(response.status());
    }

    /// Returns `true` once [`render`](Self::render) has run.
    pub fn is_rendered(&self) -> bool {
        self.rendered.is_some()
    }

    /// Renders the toolbar, or returns the earlier render.
    pub fn render(&mut self) -> Arc<str> {
        if let Some(html) = &self.rendered {
            return Arc::clone(html);
        }
        let renderer = Arc::clone(&self.renderer);
        let html: Arc<str> = Arc::from(renderer.render(self));
        self.rendered = Some(Arc::clone(&html));
        html
    }
}

/// Minimal renderer: a `djDebug` block summarizing the request.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicRenderer;

impl ToolbarRenderer for BasicRenderer {
    fn render(&self, toolbar: &Toolbar) -> String {
        let mut html = String::from("<div id=\"djDebug\" class=\"djdt-hidden\">\n<ul id=\"djDebugPanelList\">\n");
        let status = toolbar
            .status()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_owned());
        let client = toolbar
            .remote_ip()
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "-".to_owned());

        for (label, value) in [
            ("Request", format!("{} {}", toolbar.method(), toolbar.path())),
            ("Status", status),
            ("Client", client),
        ] {
            let _ = writeln!(
                html,
                "<li><strong>{}</strong> {}</li>",
                escape_html(label),
                escape_html(&value)
            );
        }
        html.push_str("</ul>\n</div>");
        html
    }
}

/// Escapes text for inclusion in HTML element content or attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}
