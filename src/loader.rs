//! Loading response bodies from outside the mock definition.
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// A rendered body starting with this marker is replaced by the content the
/// [`ResourceLoader`] returns for the rest of the string.
pub const EXTERNAL_REFERENCE_MARKER: &str = "file://";

#[derive(Debug, thiserror::Error)]
#[error("failed to load `{reference}`: {reason}")]
pub struct LoadError {
    pub reference: String,
    pub reason: String,
}

/// Resolves an external reference found in a rendered body template.
///
/// The reference has already gone through variable substitution, so it may depend on the
/// request (e.g. `file://users/{{id}}.json`).
#[async_trait]
pub trait ResourceLoader: Send + Sync {
    async fn load(&self, reference: &str) -> Result<Vec<u8>, LoadError>;
}

/// Loads references from the filesystem, resolving relative paths against a base directory.
#[derive(Debug, Clone)]
pub struct FsLoader {
    base_dir: PathBuf,
}

impl FsLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn resolve(&self, reference: &str) -> PathBuf {
        let path = Path::new(reference);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

impl Default for FsLoader {
    /// Resolve against the current working directory.
    fn default() -> Self {
        Self::new(".")
    }
}

#[async_trait]
impl ResourceLoader for FsLoader {
    async fn load(&self, reference: &str) -> Result<Vec<u8>, LoadError> {
        let path = self.resolve(reference);
        tokio::fs::read(&path).await.map_err(|e| LoadError {
            reference: reference.to_string(),
            reason: format!("{} ({})", e, path.display()),
        })
    }
}

/// Split `body` into the reference it points to, if it starts with the external marker.
pub(crate) fn external_reference(body: &str) -> Option<&str> {
    body.strip_prefix(EXTERNAL_REFERENCE_MARKER)
        .map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_bodies_starting_with_the_marker_are_references() {
        assert_eq!(external_reference("file://a/b.json"), Some("a/b.json"));
        assert_eq!(external_reference("file:// a.json\n"), Some("a.json"));
        assert_eq!(external_reference(" file://a.json"), None);
        assert_eq!(external_reference("{\"a\": 1}"), None);
    }

    #[tokio::test]
    async fn fs_loader_resolves_relative_paths_against_its_base() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("user.json"), b"{\"id\": 1}").unwrap();
        let loader = FsLoader::new(dir.path());

        assert_eq!(loader.load("user.json").await.unwrap(), b"{\"id\": 1}");
        let err = loader.load("missing.json").await.unwrap_err();
        assert_eq!(err.reference, "missing.json");
    }
}
