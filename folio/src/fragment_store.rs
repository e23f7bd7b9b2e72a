//! Whole-file access to sources, fragments and diagrams
//!
//! Names are `/`-separated paths relative to the store root, e.g.
//! `chapters/Chapter-4-Methodology.html`. Reads and writes are whole-file:
//! a fragment is read in full or the read fails.

#[cfg(test)]
use std::cell::RefCell;
#[cfg(test)]
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Errors raised by a fragment store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Fragment not found: {0}")]
    NotFound(String),

    #[error("IO error on fragment {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid fragment name: {0}")]
    InvalidName(String),
}

/// Addressable set of named fragments
pub trait FragmentStore {
    /// Read a whole fragment as UTF-8 text
    fn read(&self, name: &str) -> Result<String, StoreError>;

    /// Replace a whole fragment, creating parent directories as needed
    fn write(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// All fragment names under `dir`, sorted
    fn list(&self, dir: &str) -> Result<Vec<String>, StoreError>;
}

/// Join a directory and a file name into a store name
pub fn join_name(dir: &str, file: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() || dir == "." {
        file.to_string()
    } else {
        format!("{}/{}", dir, file)
    }
}

/// Store backed by a directory on disk
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a name to a path, rejecting anything that escapes the root
    fn resolve(&self, name: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if name.is_empty() || escapes {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl FragmentStore for DirStore {
    fn read(&self, name: &str) -> Result<String, StoreError> {
        let path = self.resolve(name)?;
        fs::read_to_string(&path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => StoreError::NotFound(name.to_string()),
            _ => StoreError::Io {
                name: name.to_string(),
                source,
            },
        })
    }

    fn write(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.resolve(name)?;
        let io_err = |source| StoreError::Io {
            name: name.to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(&path, bytes).map_err(io_err)
    }

    fn list(&self, dir: &str) -> Result<Vec<String>, StoreError> {
        let base = if dir.is_empty() {
            self.root.clone()
        } else {
            self.resolve(dir)?
        };
        if !base.exists() {
            return Err(StoreError::NotFound(dir.to_string()));
        }

        let mut names: Vec<String> = WalkDir::new(&base)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .filter_map(|e| {
                e.path()
                    .strip_prefix(&self.root)
                    .ok()
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
            })
            .collect();
        names.sort();
        Ok(names)
    }
}

/// In-memory store for tests
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: RefCell<BTreeMap<String, Vec<u8>>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(self, name: &str, content: &str) -> Self {
        self.files
            .borrow_mut()
            .insert(name.to_string(), content.as_bytes().to_vec());
        self
    }
}

#[cfg(test)]
impl FragmentStore for MemoryStore {
    fn read(&self, name: &str) -> Result<String, StoreError> {
        let files = self.files.borrow();
        let bytes = files
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        String::from_utf8(bytes.clone()).map_err(|e| StoreError::Io {
            name: name.to_string(),
            source: std::io::Error::new(ErrorKind::InvalidData, e),
        })
    }

    fn write(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        if name.is_empty() || name.split('/').any(|part| part == "..") {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        self.files
            .borrow_mut()
            .insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn list(&self, dir: &str) -> Result<Vec<String>, StoreError> {
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir.trim_end_matches('/'))
        };
        Ok(self
            .files
            .borrow()
            .keys()
            .filter(|name| name.starts_with(&prefix))
            .cloned()
            .collect())
    }
}

/// Response from the save endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveResponse {
    pub status: u16,
    pub body: String,
}

impl SaveResponse {
    fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// The single write path used to save an edited report back to storage
///
/// Mirrors a `POST /save-paper` handler: the body is written to one fixed
/// fragment and every other request path is answered with 404.
#[derive(Debug, Clone)]
pub struct SaveEndpoint {
    path: String,
    target: String,
}

impl SaveEndpoint {
    /// Request path accepted by default
    pub const DEFAULT_PATH: &'static str = "/save-paper";

    pub fn new(target: impl Into<String>) -> Self {
        Self {
            path: Self::DEFAULT_PATH.to_string(),
            target: target.into(),
        }
    }

    /// Handle one save request
    ///
    /// # Parameters
    /// * `store` - Store receiving the write
    /// * `request_path` - Path the request was sent to
    /// * `content_length` - Declared body length in bytes
    /// * `body` - Raw request body
    ///
    /// # Returns
    /// * 200 when the first `content_length` bytes were written
    /// * 404 for any other request path
    /// * 400 when the body is shorter than declared or not UTF-8
    /// * 500 when the write fails
    pub fn handle(
        &self,
        store: &dyn FragmentStore,
        request_path: &str,
        content_length: usize,
        body: &[u8],
    ) -> SaveResponse {
        if request_path != self.path {
            return SaveResponse::new(404, "Endpoint not found");
        }
        let Some(content) = body.get(..content_length) else {
            return SaveResponse::new(
                400,
                format!(
                    "Body has {} bytes, Content-Length declared {}",
                    body.len(),
                    content_length
                ),
            );
        };
        if std::str::from_utf8(content).is_err() {
            return SaveResponse::new(400, "Body is not valid UTF-8");
        }

        match store.write(&self.target, content) {
            Ok(()) => {
                log::info!("Saved {} bytes to {}", content_length, self.target);
                SaveResponse::new(200, "File saved successfully")
            }
            Err(e) => {
                log::warn!("Save to {} failed: {}", self.target, e);
                SaveResponse::new(500, e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_dir_store_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::new(dir.path());

        store
            .write("chapters/Chapter-1-Introduction.html", b"<p>hi</p>")
            .unwrap();

        assert_eq!(
            store.read("chapters/Chapter-1-Introduction.html").unwrap(),
            "<p>hi</p>"
        );
        assert_eq!(
            store.list("chapters").unwrap(),
            vec!["chapters/Chapter-1-Introduction.html".to_string()]
        );
    }

    #[test]
    fn test_dir_store_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::new(dir.path());

        assert!(matches!(
            store.read("chapters/missing.html"),
            Err(StoreError::NotFound(name)) if name == "chapters/missing.html"
        ));
    }

    #[test]
    fn test_dir_store_rejects_escaping_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::new(dir.path());

        assert!(matches!(
            store.write("../outside.html", b"x"),
            Err(StoreError::InvalidName(_))
        ));
        assert!(matches!(
            store.read("/etc/passwd"),
            Err(StoreError::InvalidName(_))
        ));
    }

    #[test]
    fn test_memory_store_list_by_directory() {
        let store = MemoryStore::new()
            .with("diagrams/01.html", "a")
            .with("diagrams/02.html", "b")
            .with("chapters/x.html", "c");

        assert_eq!(
            store.list("diagrams").unwrap(),
            vec!["diagrams/01.html".to_string(), "diagrams/02.html".to_string()]
        );
    }

    #[test]
    fn test_join_name() {
        assert_eq!(join_name("chapters/", "a.html"), "chapters/a.html");
        assert_eq!(join_name("", "a.html"), "a.html");
        assert_eq!(join_name(".", "a.html"), "a.html");
    }

    #[test]
    fn test_save_endpoint_writes_declared_length() {
        let store = MemoryStore::new();
        let endpoint = SaveEndpoint::new("paper.html");

        let response = endpoint.handle(&store, "/save-paper", 5, b"<p>x</p>");

        assert_eq!(response, SaveResponse::new(200, "File saved successfully"));
        assert_eq!(store.read("paper.html").unwrap(), "<p>x<");
    }

    #[test]
    fn test_save_endpoint_rejects_other_paths() {
        let store = MemoryStore::new();
        let endpoint = SaveEndpoint::new("paper.html");

        let response = endpoint.handle(&store, "/upload", 3, b"abc");

        assert_eq!(response.status, 404);
        assert_eq!(response.body, "Endpoint not found");
        assert!(store.read("paper.html").is_err());
    }

    #[test]
    fn test_save_endpoint_short_body_is_bad_request() {
        let store = MemoryStore::new();
        let endpoint = SaveEndpoint::new("paper.html");

        assert_eq!(endpoint.handle(&store, "/save-paper", 10, b"abc").status, 400);
    }

    #[test]
    fn test_save_endpoint_write_failure_is_server_error() {
        let store = MemoryStore::new();
        let endpoint = SaveEndpoint::new("../escape.html");

        assert_eq!(endpoint.handle(&store, "/save-paper", 3, b"abc").status, 500);
    }
}
