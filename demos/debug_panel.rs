//! Small app behind the debug panel.
//!
//! ```text
//! DEBUG_PANEL_DEBUG=true RUST_LOG=debug_panel=debug cargo run --example debug_panel
//! cargo run --example debug_panel -- panel.yaml
//! curl -i http://127.0.0.1:8000/api/items
//! curl "$(curl -si http://127.0.0.1:8000/api/items | grep -i x-debug-data-url | cut -d' ' -f2 | tr -d '\r')"
//! ```

use std::sync::Arc;

use debug_panel::config::Settings;
use debug_panel::context::Context;
use debug_panel::panel::DebugPanel;
use debug_panel::toolbar::BasicRenderer;
use debug_panel::{Pipeline, Response, Router, Server, StatusCode};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug_panel=debug")),
        )
        .init();

    // Optional YAML file as the first argument; env vars still win.
    let settings = match std::env::args().nth(1) {
        Some(path) => Settings::load_from_file(path)?,
        None => Settings::load()?,
    };
    let settings = Arc::new(settings);
    if !settings.debug {
        tracing::warn!("debug is off; set DEBUG_PANEL_DEBUG=true to see the toolbar");
    }

    let mut router = Router::new();
    router.get("/", |_ctx: Context| async {
        Response::html(
            StatusCode::Ok,
            "<!DOCTYPE html><html><body><h1>debug-panel demo</h1>\
             <p>Try <a href=\"/api/items\">/api/items</a>.</p></body></html>",
        )
    });
    router.get("/api/items/:id<int>", |ctx: Context| async move {
        let id = ctx.params().get("id").unwrap_or_default().to_owned();
        Response::new(StatusCode::Ok)
            .header("Content-Type", "application/json")
            .body(format!(r#"{{"id":{id}}}"#))
    });
    router.get("/api/items", |_ctx: Context| async {
        Response::new(StatusCode::Ok)
            .header("Content-Type", "application/json")
            .body(r#"[{"id":1},{"id":2}]"#)
    });

    let app = Pipeline::from_router(router).layer(DebugPanel::new(settings, Arc::new(BasicRenderer))?);

    Server::bind("127.0.0.1:8000").await?.serve(app).await?;
    Ok(())
}
