//! Static asset lookup under a fixed root directory.

use std::path::{Component, Path, PathBuf};

use percent_encoding::percent_decode_str;

use crate::error::AssetError;

/// A file ready to be sent.
#[derive(Debug, Clone)]
pub struct Asset {
    pub path: PathBuf,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Content type for a file, chosen by extension
pub fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "html" => "text/html; charset=UTF-8",
        "css" => "text/css; charset=UTF-8",
        "js" => "text/javascript; charset=UTF-8",
        "json" => "application/json; charset=UTF-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// Map a request path to a path under `root` without touching the filesystem.
///
/// `/` maps to `index`. The path is percent-decoded and normalised; any
/// `..` that would climb above `root`, or an absolute path smuggled in
/// through encoding, is rejected.
pub fn resolve(root: &Path, request_path: &str, index: &str) -> Result<PathBuf, AssetError> {
    let relative = if request_path == "/" {
        index.to_string()
    } else {
        percent_decode_str(request_path.trim_start_matches('/'))
            .decode_utf8()
            .map_err(|_| AssetError::BadEncoding(request_path.to_string()))?
            .into_owned()
    };

    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(&relative).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(AssetError::Forbidden(request_path.to_string()));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(AssetError::Forbidden(request_path.to_string()));
            }
        }
    }

    let resolved: PathBuf = parts.iter().fold(root.to_path_buf(), |acc, p| acc.join(p));
    if !resolved.starts_with(root) {
        return Err(AssetError::Forbidden(request_path.to_string()));
    }
    Ok(resolved)
}

/// Root directory of the built UI.
///
/// The root is resolved on every read, so it may be created or rebuilt
/// while the server runs.
#[derive(Debug, Clone)]
pub struct AssetRoot {
    root: PathBuf,
    index: String,
}

impl AssetRoot {
    pub fn new(root: impl Into<PathBuf>, index: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            index: index.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load the file a request path points at
    pub async fn load(&self, request_path: &str) -> Result<Asset, AssetError> {
        let path = resolve(&self.root, request_path, &self.index)?;
        self.read(path, request_path).await
    }

    /// Load the index document
    pub async fn load_index(&self) -> Result<Asset, AssetError> {
        self.read(self.root.join(&self.index), "/").await
    }

    async fn read(&self, path: PathBuf, request_path: &str) -> Result<Asset, AssetError> {
        let canonical_root = tokio::fs::canonicalize(&self.root)
            .await
            .map_err(|e| AssetError::from_io(path.clone(), e))?;

        // Symlinks may still point outside the root once followed.
        let real = tokio::fs::canonicalize(&path)
            .await
            .map_err(|e| AssetError::from_io(path.clone(), e))?;
        if !real.starts_with(&canonical_root) {
            return Err(AssetError::Forbidden(request_path.to_string()));
        }

        let metadata = tokio::fs::metadata(&real)
            .await
            .map_err(|e| AssetError::from_io(path.clone(), e))?;
        if metadata.is_dir() {
            return Err(AssetError::IsDirectory(path));
        }

        let bytes = tokio::fs::read(&real)
            .await
            .map_err(|e| AssetError::from_io(path.clone(), e))?;

        Ok(Asset {
            content_type: content_type(&path),
            path,
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn test_content_types() {
        assert_eq!(content_type(Path::new("index.html")), "text/html; charset=UTF-8");
        assert_eq!(content_type(Path::new("app.CSS")), "text/css; charset=UTF-8");
        assert_eq!(content_type(Path::new("main.js")), "text/javascript; charset=UTF-8");
        assert_eq!(content_type(Path::new("data.json")), "application/json; charset=UTF-8");
        assert_eq!(content_type(Path::new("a.png")), "image/png");
        assert_eq!(content_type(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(content_type(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(content_type(Path::new("logo.svg")), "image/svg+xml");
        assert_eq!(content_type(Path::new("blob.xyz")), "application/octet-stream");
        assert_eq!(content_type(Path::new("Makefile")), "application/octet-stream");
    }

    #[test]
    fn test_resolve_root_is_index() {
        let root = Path::new("/srv/ui");
        assert_eq!(resolve(root, "/", "index.html").unwrap(), root.join("index.html"));
    }

    #[test]
    fn test_resolve_normalises_inside_root() {
        let root = Path::new("/srv/ui");
        assert_eq!(
            resolve(root, "/assets/./img/../app.js", "index.html").unwrap(),
            root.join("assets/app.js")
        );
        assert_eq!(
            resolve(root, "//assets/my%20logo.svg", "index.html").unwrap(),
            root.join("assets/my logo.svg")
        );
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let root = Path::new("/srv/ui");
        for path in [
            "/../../etc/passwd",
            "/assets/../../secret",
            "/%2e%2e/%2e%2e/etc/passwd",
            "/..%2f..%2fetc/passwd",
            "/%2Fetc/passwd",
        ] {
            assert!(
                matches!(resolve(root, path, "index.html"), Err(AssetError::Forbidden(_))),
                "{path} should be rejected"
            );
        }
    }

    #[test]
    fn test_resolve_rejects_invalid_encoding() {
        assert!(matches!(
            resolve(Path::new("/srv/ui"), "/%ff%fe.html", "index.html"),
            Err(AssetError::BadEncoding(_))
        ));
    }

    #[tokio::test]
    async fn test_load_file_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
        fs::create_dir(dir.path().join("assets")).unwrap();
        fs::write(dir.path().join("assets/logo.svg"), "<svg/>").unwrap();

        let assets = AssetRoot::new(dir.path(), "index.html");

        let index = assets.load("/").await.unwrap();
        assert_eq!(index.bytes, b"<h1>home</h1>");
        assert_eq!(index.content_type, "text/html; charset=UTF-8");

        let logo = assets.load("/assets/logo.svg").await.unwrap();
        assert_eq!(logo.content_type, "image/svg+xml");

        assert!(matches!(
            assets.load("/assets").await,
            Err(AssetError::IsDirectory(_))
        ));
        assert!(matches!(
            assets.load("/missing.js").await,
            Err(AssetError::NotFound(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_out_of_root_is_forbidden() {
        let outer = tempfile::tempdir().unwrap();
        let root = outer.path().join("dist");
        fs::create_dir(&root).unwrap();
        fs::write(outer.path().join("secret.txt"), "top secret").unwrap();
        std::os::unix::fs::symlink(outer.path().join("secret.txt"), root.join("leak.txt")).unwrap();

        let assets = AssetRoot::new(&root, "index.html");
        assert!(matches!(
            assets.load("/leak.txt").await,
            Err(AssetError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_root_created_after_startup() {
        let outer = tempfile::tempdir().unwrap();
        let root = outer.path().join("dist");
        let assets = AssetRoot::new(&root, "index.html");

        assert!(matches!(
            assets.load("/index.html").await,
            Err(AssetError::NotFound(_))
        ));

        fs::create_dir(&root).unwrap();
        fs::write(root.join("index.html"), "<h1>late</h1>").unwrap();

        let index = assets.load("/index.html").await.unwrap();
        assert_eq!(index.bytes, b"<h1>late</h1>");
        assert_eq!(assets.load_index().await.unwrap().bytes, b"<h1>late</h1>");
    }

    #[tokio::test]
    async fn test_relative_root_is_resolved() {
        let cwd = std::env::current_dir().unwrap();
        let dir = tempfile::tempdir_in(&cwd).unwrap();
        fs::write(dir.path().join("index.html"), "<h1>rel</h1>").unwrap();
        let relative = dir.path().strip_prefix(&cwd).unwrap().to_path_buf();

        let assets = AssetRoot::new(relative, "index.html");
        assert_eq!(assets.load("/").await.unwrap().bytes, b"<h1>rel</h1>");
    }
}
