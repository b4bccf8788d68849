//! # Static-Asset Cache
//!
//! Preloads a directory of static assets into memory at startup, each
//! one already shaped as a 200 [`Response`] so a cache hit costs a map
//! lookup and nothing else.
//!
//! ## Overview
//!
//! - Keys are the file's path relative to the static root, lowercased,
//!   with forward slashes.
//! - `Content-Type` comes from a suffix table seeded with common web
//!   types; callers may add pairs with [`StaticFilesCache::add_mime_for_suffix`]
//!   before the directory walk.
//! - Entries are immutable once loaded; concurrent readers share them
//!   through `Arc`.
//!
//! HEAD handling is not done here: the dispatcher serves the same cached
//! response and drops the body on the way out.

use crate::config::ServerConfig;
use crate::http::response::{Response, StatusCode};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

static DEFAULT_MIME_TYPES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("html", "text/html; charset=UTF-8"),
        ("htm", "text/html; charset=UTF-8"),
        ("css", "text/css"),
        ("js", "application/javascript"),
        ("json", "application/json"),
        ("txt", "text/plain"),
        ("xml", "application/xml"),
        ("png", "image/png"),
        ("jpg", "image/jpeg"),
        ("jpeg", "image/jpeg"),
        ("gif", "image/gif"),
        ("svg", "image/svg+xml"),
        ("webp", "image/webp"),
        ("ico", "image/x-icon"),
        ("woff2", "font/woff2"),
        ("wasm", "application/wasm"),
        ("pdf", "application/pdf"),
    ])
});

/// In-memory map from lowercased asset path to a prebuilt response.
pub struct StaticFilesCache {
    entries: HashMap<String, Arc<Response>>,
    mime_types: HashMap<String, String>,
    cache_time_seconds: u64,
}

impl StaticFilesCache {
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            entries: HashMap::new(),
            mime_types: DEFAULT_MIME_TYPES
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            cache_time_seconds: config.static_file_cache_time_seconds,
        }
    }

    /// Register an extra suffix → MIME pair. Call before
    /// [`StaticFilesCache::load_directory`]; files already loaded keep
    /// the type they were loaded with.
    pub fn add_mime_for_suffix(&mut self, suffix: &str, mime: &str) {
        self.mime_types
            .insert(suffix.to_lowercase(), mime.to_string());
    }

    /// Walk `root` recursively and preload every regular file.
    ///
    /// Returns the number of assets loaded. A missing root is not an
    /// error; the cache just stays empty.
    pub fn load_directory(&mut self, root: &Path) -> io::Result<usize> {
        if !root.is_dir() {
            warn!(directory = %root.display(), "static directory missing, cache left empty");
            return Ok(0);
        }
        let before = self.entries.len();
        self.walk(root, root)?;
        let loaded = self.entries.len() - before;
        info!(
            directory = %root.display(),
            assets = loaded,
            "static assets preloaded"
        );
        Ok(loaded)
    }

    fn walk(&mut self, root: &Path, dir: &Path) -> io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                self.walk(root, &path)?;
            } else if file_type.is_file() {
                self.load_file(root, &path)?;
            }
        }
        Ok(())
    }

    fn load_file(&mut self, root: &Path, path: &Path) -> io::Result<()> {
        let key = relative_key(root, path);
        let bytes = fs::read(path)?;
        let mime = self.mime_for(path);
        let mut response = Response::with_typed_body(StatusCode::Ok, &mime, bytes);
        if self.cache_time_seconds > 0 {
            response.add_header(
                "Cache-Control",
                &format!("max-age={}", self.cache_time_seconds),
            );
        }
        debug!(path = %key, mime = %mime, bytes = response.body.len(), "static asset loaded");
        self.entries.insert(key, Arc::new(response));
        Ok(())
    }

    fn mime_for(&self, path: &Path) -> String {
        path.extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .and_then(|ext| self.mime_types.get(&ext).cloned())
            .unwrap_or_else(|| "application/octet-stream".to_string())
    }

    /// Fetch the prebuilt response for an already-lowercased path.
    #[must_use]
    pub fn get_static_response(&self, path: &str) -> Option<Arc<Response>> {
        self.entries.get(path.trim_start_matches('/')).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn relative_key(root: &Path, path: &Path) -> String {
    let rel: PathBuf = path.strip_prefix(root).unwrap_or(path).to_path_buf();
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().to_lowercase())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ServerConfig {
        ServerConfig::default()
    }

    #[test]
    fn test_mime_defaults() {
        let cache = StaticFilesCache::new(&config());
        assert_eq!(cache.mime_for(Path::new("style.css")), "text/css");
        assert_eq!(
            cache.mime_for(Path::new("index.HTML")),
            "text/html; charset=UTF-8"
        );
        assert_eq!(
            cache.mime_for(Path::new("blob.unknown")),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_add_mime_for_suffix() {
        let mut cache = StaticFilesCache::new(&config());
        cache.add_mime_for_suffix("moon", "image/x-moon");
        assert_eq!(cache.mime_for(Path::new("a.moon")), "image/x-moon");
    }

    #[test]
    fn test_missing_directory_is_empty_not_error() {
        let mut cache = StaticFilesCache::new(&config());
        let loaded = cache
            .load_directory(Path::new("/definitely/not/here"))
            .unwrap();
        assert_eq!(loaded, 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_relative_key_is_lowercased_forward_slashed() {
        assert_eq!(
            relative_key(Path::new("/srv/static"), Path::new("/srv/static/Img/Moon.PNG")),
            "img/moon.png"
        );
    }
}
