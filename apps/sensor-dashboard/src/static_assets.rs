use anyhow::Result;
use axum::extract::Request;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::HeaderValue;
use axum::middleware::{from_fn, Next};
use axum::response::{Html, Response};
use axum::routing::{get, get_service};
use axum::Router;
use std::path::PathBuf;
use tower_http::services::{ServeDir, ServeFile};

const PLACEHOLDER_INDEX: &str = r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>Sensor Dashboard</title>
  </head>
  <body style="font-family: system-ui; padding: 24px">
    <h1>Sensor Dashboard</h1>
    <p>No client bundle is configured. Start the server with <code>--static-root</code> to serve one.</p>
    <ul>
      <li><a href="/api/sensors/chart/temperature">Temperature chart</a></li>
      <li><a href="/api/sensors/chart/humidity">Humidity chart</a></li>
      <li><a href="/api/sensors/chart/pressure">Pressure chart</a></li>
      <li><a href="/api/openapi.json">OpenAPI document</a></li>
    </ul>
  </body>
</html>
"#;

fn cache_policy(path: &str, content_type: &str) -> &'static str {
    if path.starts_with("/assets/") {
        // Bundler output is content-hashed.
        "public, max-age=31536000, immutable"
    } else if content_type.starts_with("text/html") {
        "no-store"
    } else {
        "public, max-age=86400"
    }
}

async fn apply_cache_headers(req: Request, next: Next) -> Response {
    let path = req.uri().path().to_owned();
    let mut response = next.run(req).await;
    if response.headers().contains_key(CACHE_CONTROL) {
        return response;
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let policy = cache_policy(&path, content_type);
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static(policy));
    response
}

/// Serves the client bundle from `static_root` with SPA fallback to
/// `index.html`, or a placeholder page when no root is given.
pub fn service(static_root: Option<PathBuf>) -> Result<Router> {
    let router = match static_root {
        Some(root) => {
            if !root.exists() {
                anyhow::bail!("static_root not found at {}", root.display());
            }
            let index = root.join("index.html");
            let dir = ServeDir::new(root)
                .append_index_html_on_directories(true)
                .not_found_service(ServeFile::new(index));
            Router::new()
                .fallback_service(get_service(dir))
                .layer(from_fn(apply_cache_headers))
        }
        None => {
            async fn placeholder() -> Html<&'static str> {
                Html(PLACEHOLDER_INDEX)
            }
            Router::new()
                .route("/", get(placeholder))
                .fallback(get(placeholder))
        }
    };
    Ok(router)
}
