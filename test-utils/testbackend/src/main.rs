use axum::extract::{Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use clap::Parser;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};

/// Upstream test server for the proxy e2e harness.
///
/// Serves the pages and endpoints the scenarios assert on, and exposes a few
/// knobs so the harness can exercise its readiness and teardown edge cases.
#[derive(Parser, Debug)]
#[command(name = "testbackend")]
#[command(about = "Upstream test server for proxy e2e testing", long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(long, default_value = "4000")]
    port: u16,

    /// Directory for uploaded files (defaults to the OS temp dir)
    #[arg(long)]
    upload_dir: Option<PathBuf>,

    /// Seconds to wait before binding (readiness-timing scenarios)
    #[arg(long, default_value = "0")]
    startup_delay: u64,

    /// Announce readiness on stderr instead of stdout
    #[arg(long)]
    announce_stderr: bool,

    /// Do not print the listen banner
    #[arg(long)]
    quiet_start: bool,

    /// Exit immediately with this code instead of serving
    #[arg(long)]
    fail_start: Option<i32>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .init();

    let args = Args::parse();

    if let Some(code) = args.fail_start {
        std::process::exit(code);
    }

    if args.startup_delay > 0 {
        sleep(Duration::from_secs(args.startup_delay)).await;
    }

    let upload_dir = args
        .upload_dir
        .unwrap_or_else(|| std::env::temp_dir().join("testbackend-uploads"));
    if let Err(e) = tokio::fs::create_dir_all(&upload_dir).await {
        error!("Failed to create upload dir {}: {}", upload_dir.display(), e);
        std::process::exit(1);
    }

    let app = Router::new()
        .route("/", get(index))
        .route("/js/app.bundle.js", get(bundle))
        .route("/css/app.css", get(css))
        .route("/simple-form", post(simple_form))
        .route("/upload", post(upload))
        .with_state(Arc::new(upload_dir));

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    // The banner is the readiness signal the harness sniffs for; it must
    // only appear once the listener accepts connections.
    if !args.quiet_start {
        if args.announce_stderr {
            eprintln!("backend listening on http://{addr}");
        } else {
            info!("backend listening on http://{addr}");
        }
    }

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}

const INDEX_HTML: &str = "<!doctype html>\n<html>\n<head><title>testbackend</title></head>\n<body><h1>App Works!</h1></body>\n</html>\n";

const APP_CSS: &str = "body { margin: 0; font-family: sans-serif; }\nh1 { color: #333; }\n";

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// A generated bundle well past 100 KiB, so compression scenarios have a
/// body where gzip visibly changes the transfer size.
async fn bundle() -> impl IntoResponse {
    let mut js = String::with_capacity(160 * 1024);
    js.push_str("(function () {\n  \"use strict\";\n");
    for i in 0..2000 {
        js.push_str(&format!(
            "  function handler{i}(payload) {{ return {{ id: {i}, kind: \"handler\", payload: payload }}; }}\n"
        ));
    }
    js.push_str("  window.__handlerCount = 2000;\n})();\n");
    ([(header::CONTENT_TYPE, "application/javascript")], js)
}

async fn css() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/css")], APP_CSS)
}

/// Echo submitted form fields back as JSON.
async fn simple_form(Form(fields): Form<BTreeMap<String, String>>) -> Json<BTreeMap<String, String>> {
    Json(fields)
}

#[derive(Debug, Serialize)]
struct SavedFile {
    size: u64,
    path: String,
}

/// Store each uploaded part and report where it landed, so scenarios can
/// compare digests of what they sent against what arrived.
async fn upload(
    State(upload_dir): State<Arc<PathBuf>>,
    mut multipart: Multipart,
) -> Result<Json<Vec<SavedFile>>, StatusCode> {
    let mut saved = Vec::new();
    let mut part = 0u32;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        let name = field
            .file_name()
            .map(|n| n.to_string())
            .unwrap_or_else(|| "upload.bin".to_string());
        let data = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
        let path = upload_dir.join(format!("{}-{part}-{name}", std::process::id()));
        tokio::fs::write(&path, &data)
            .await
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        info!("Stored upload: {} ({} bytes)", path.display(), data.len());
        saved.push(SavedFile {
            size: data.len() as u64,
            path: path.display().to_string(),
        });
        part += 1;
    }
    Ok(Json(saved))
}
