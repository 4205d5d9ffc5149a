//! Files served from a directory mounted under a URL prefix.
//!
//! [`RoutesCollection::register_static_directory`](crate::router::RoutesCollection::register_static_directory)
//! wires a [`StaticLookup`] before-handler and a [`StaticServe`] handler
//! around a shared [`StaticFiles`] root.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::debug;

use crate::router::{Control, Exchange};
use crate::scope::{Handler, Scope};
use crate::server::ResponseError;

/// URL variable carrying the requested file.
pub const FILE_VARIABLE: &str = "file";
/// Typed binding the lookup leaves for the serving handler.
pub const RESOLVED_FILE: &str = "static_file";

pub struct StaticFiles {
    base_dir: PathBuf,
}

impl StaticFiles {
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self { base_dir: base.into() }
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn map_path(&self, url_path: &str) -> Option<PathBuf> {
        let mut pb = self.base_dir.clone();
        for comp in Path::new(url_path.trim_start_matches('/')).components() {
            match comp {
                Component::Normal(s) => pb.push(s),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(pb)
    }

    /// Map a URL path to an existing regular file inside the root.
    ///
    /// # Errors
    ///
    /// `NotFound` for traversal attempts, missing files and directories;
    /// `PermissionDenied` when a symlink leads outside the root.
    pub fn resolve(&self, url_path: &str) -> io::Result<PathBuf> {
        let mapped = self
            .map_path(url_path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "invalid path"))?;
        let root = self.base_dir.canonicalize()?;
        let full = mapped.canonicalize()?;
        if !full.starts_with(&root) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "path escapes the static root",
            ));
        }
        if !full.is_file() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "not a regular file"));
        }
        Ok(full)
    }

    /// Read a file and pick its content type.
    ///
    /// # Errors
    ///
    /// See [`StaticFiles::resolve`], plus read errors.
    pub fn load(&self, url_path: &str) -> io::Result<(Vec<u8>, &'static str)> {
        let path = self.resolve(url_path)?;
        let bytes = fs::read(&path)?;
        let ct = content_type(&path, &bytes);
        Ok((bytes, ct))
    }
}

/// Content type for a file: extension overrides for stylesheets, scripts
/// and SVG, then magic bytes, then the extension, then a text/binary guess.
pub fn content_type(path: &Path, bytes: &[u8]) -> &'static str {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "css" => return "text/css",
        "js" | "mjs" => return "application/javascript",
        "svg" => return "image/svg+xml",
        _ => {}
    }
    if let Some(sniffed) = sniff(bytes) {
        return sniffed;
    }
    match ext.as_str() {
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "txt" => "text/plain",
        "xml" => "application/xml",
        "wasm" => "application/wasm",
        "csv" => "text/csv",
        _ if std::str::from_utf8(bytes).is_ok() => "text/plain",
        _ => "application/octet-stream",
    }
}

fn sniff(bytes: &[u8]) -> Option<&'static str> {
    const SIGNATURES: &[(&[u8], &str)] = &[
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"%PDF-", "application/pdf"),
        (b"PK\x03\x04", "application/zip"),
        (b"\x1f\x8b", "application/gzip"),
        (b"wOFF", "font/woff"),
        (b"wOF2", "font/woff2"),
        (b"\x00\x00\x01\x00", "image/x-icon"),
        (b"\x00asm", "application/wasm"),
    ];
    if let Some((_, ct)) = SIGNATURES.iter().find(|(magic, _)| bytes.starts_with(magic)) {
        return Some(*ct);
    }
    if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }

    let head = &bytes[..bytes.len().min(512)];
    let start = head.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(head.len());
    let head = head[start..].to_ascii_lowercase();
    if head.starts_with(b"<!doctype html") || head.starts_with(b"<html") {
        return Some("text/html");
    }
    if head.starts_with(b"<?xml") {
        return Some("application/xml");
    }
    None
}

/// Before-handler: turns the `file` URL variable into a path inside the
/// root, or rejects the route.
pub struct StaticLookup {
    files: Arc<StaticFiles>,
}

impl StaticLookup {
    pub fn new(files: Arc<StaticFiles>) -> Self {
        Self { files }
    }
}

impl Handler for StaticLookup {
    fn call(&self, scope: &mut Scope) -> anyhow::Result<()> {
        let requested = scope.resolve::<String>(FILE_VARIABLE);
        match requested.as_deref().map(|f| self.files.resolve(f)) {
            Some(Ok(path)) => {
                scope.bind_typed(RESOLVED_FILE, path);
            }
            Some(Err(err)) => {
                debug!(
                    file = requested.as_deref().unwrap_or(""),
                    root = %self.files.base_dir().display(),
                    error = %err,
                    "Static file rejected"
                );
                scope.invoke(|control: Control| control.reject())?;
            }
            None => scope.invoke(|control: Control| control.reject())?,
        }
        Ok(())
    }

    fn describe(&self) -> &'static str {
        "static_lookup"
    }
}

/// Handler: streams the file resolved by [`StaticLookup`].
pub struct StaticServe;

impl Handler for StaticServe {
    fn call(&self, scope: &mut Scope) -> anyhow::Result<()> {
        let path = scope
            .resolve::<PathBuf>(RESOLVED_FILE)
            .context("static file was not resolved before serving")?;
        let bytes = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        let ct = content_type(&path, &bytes);
        let exchange = scope.invoke(|ex: Exchange| ex)?;
        exchange.with_response(|res| -> Result<(), ResponseError> {
            res.set_header("Content-Type", ct)?;
            res.append_body(&bytes);
            Ok(())
        })??;
        Ok(())
    }

    fn describe(&self) -> &'static str {
        "static_serve"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_path_prevents_traversal() {
        let sf = StaticFiles::new("tests/staticdata");
        assert!(sf.map_path("../Cargo.toml").is_none());
        assert!(sf.map_path("a/../../Cargo.toml").is_none());
        assert!(sf.map_path("./hello.txt").is_some());
    }

    #[test]
    fn test_extension_overrides_win_over_sniffing() {
        assert_eq!(content_type(Path::new("a.css"), b"<html>"), "text/css");
        assert_eq!(content_type(Path::new("a.JS"), b""), "application/javascript");
        assert_eq!(content_type(Path::new("a.svg"), b"<?xml"), "image/svg+xml");
    }

    #[test]
    fn test_sniffing() {
        assert_eq!(content_type(Path::new("noext"), b"\x89PNG\r\n\x1a\nrest"), "image/png");
        assert_eq!(content_type(Path::new("page.bin"), b"  <!DOCTYPE html><p>"), "text/html");
        assert_eq!(content_type(Path::new("data.json"), b"{}"), "application/json");
        assert_eq!(content_type(Path::new("notes"), b"plain words"), "text/plain");
        assert_eq!(content_type(Path::new("blob"), &[0xff, 0xfe, 0x00]), "application/octet-stream");
    }
}
