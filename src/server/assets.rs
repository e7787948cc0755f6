use std::path::{Path, PathBuf};

use axum::{
    extract::State,
    http::{StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use tracing::debug;

use super::AppState;

pub(super) async fn serve_asset(State(state): State<AppState>, uri: Uri) -> Response {
    let path = uri.path();
    let Some(file) = resolve(&state.assets, path) else {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    };
    match tokio::fs::read(&file).await {
        Ok(body) => {
            let name = file.file_name().and_then(|name| name.to_str()).unwrap_or_default();
            ([(header::CONTENT_TYPE, mime_type(name))], body).into_response()
        },
        Err(err) => {
            debug!("asset {path} unavailable: {err}");
            (StatusCode::NOT_FOUND, "not found").into_response()
        },
    }
}

/// Maps a request path under `root`; `None` for anything trying to leave it.
fn resolve(root: &Path, path: &str) -> Option<PathBuf> {
    let mut resolved = root.to_path_buf();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return None,
            segment if segment.contains('\\') => return None,
            segment => resolved.push(segment),
        }
    }
    if path.ends_with('/') || resolved == root {
        resolved.push("index.html");
    }
    Some(resolved)
}

pub fn mime_type(filename: &str) -> &'static str {
    let ext = filename.rsplit('.').next().unwrap_or("").to_lowercase();
    match ext.as_str() {
        // the client refuses to instantiate wasm served under any other type
        "wasm" => "application/wasm",
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" | "map" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "webp" => "image/webp",
        "woff2" => "font/woff2",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_inside_root() {
        let root = Path::new("/srv/static");
        assert_eq!(resolve(root, "/"), Some(root.join("index.html")));
        assert_eq!(resolve(root, "/js/app.js"), Some(root.join("js/app.js")));
        assert_eq!(resolve(root, "/js/"), Some(root.join("js/index.html")));
        assert_eq!(resolve(root, "/./a.wasm"), Some(root.join("a.wasm")));
        assert_eq!(resolve(root, "/../etc/passwd"), None);
        assert_eq!(resolve(root, "/js/..\\..\\x"), None);
    }

    #[test]
    fn wasm_gets_its_own_type() {
        assert_eq!(mime_type("main.wasm"), "application/wasm");
        assert_eq!(mime_type("MAIN.WASM"), "application/wasm");
        assert_eq!(mime_type("wasm_exec.js"), "text/javascript; charset=utf-8");
        assert_eq!(mime_type("blob"), "application/octet-stream");
    }
}
