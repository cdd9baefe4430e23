//! Reversible encoding of file locations into the strings stored in file records.
//!
//! Files under the workspace root are stored as `<WS>` followed by the workspace relative
//! path, so an index survives moving the workspace. Every other file is stored as `<EXT>`
//! followed by its absolute `file://` URI.

use std::path::{Path, PathBuf};

use serde::Serialize;

const WORKSPACE_PREFIX: &str = "<WS>";
const EXTERNAL_PREFIX: &str = "<EXT>";
const FILE_SCHEME: &str = "file://";

/// Location of an indexed file.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct IndexLocation {
    /// Absolute `file://` URI.
    pub uri: String,
    /// Path relative to the workspace root, for workspace files.
    pub workspace_path: Option<String>,
}

impl IndexLocation {
    /// Location of the file at `path`.
    pub fn from_path(path: &Path) -> Self {
        Self {
            uri: path_to_uri(path),
            workspace_path: None,
        }
    }

    /// Absolute path of the file, if the URI uses the file scheme.
    pub fn path(&self) -> Option<PathBuf> {
        self.uri.strip_prefix(FILE_SCHEME).map(PathBuf::from)
    }
}

/// Converts between [`IndexLocation`]s and stored location strings.
#[derive(Clone, Debug, Default)]
pub struct LocationConverter {
    workspace_root: Option<PathBuf>,
}

impl LocationConverter {
    /// Converter resolving `<WS>` paths against `workspace_root`.
    pub fn new(workspace_root: Option<PathBuf>) -> Self {
        Self { workspace_root }
    }

    /// Encodes `location` for storage.
    pub fn to_internal(&self, location: &IndexLocation) -> String {
        if let Some(relative) = location.workspace_path.as_deref() {
            return format!("{WORKSPACE_PREFIX}{}", relative.trim_start_matches('/'));
        }
        if let (Some(root), Some(path)) = (self.workspace_root.as_deref(), location.path()) {
            if let Ok(relative) = path.strip_prefix(root) {
                return format!("{WORKSPACE_PREFIX}{}", slashed(relative));
            }
        }
        format!("{EXTERNAL_PREFIX}{}", location.uri)
    }

    /// Decodes a stored location string. Returns `None` for strings this converter did
    /// not produce, or for workspace paths when no workspace root is configured.
    pub fn from_internal(&self, internal: &str) -> Option<IndexLocation> {
        if let Some(relative) = internal.strip_prefix(WORKSPACE_PREFIX) {
            let root = self.workspace_root.as_deref()?;
            return Some(IndexLocation {
                uri: path_to_uri(&root.join(relative)),
                workspace_path: Some(relative.to_string()),
            });
        }
        let uri = internal.strip_prefix(EXTERNAL_PREFIX)?;
        Some(IndexLocation {
            uri: uri.to_string(),
            workspace_path: None,
        })
    }
}

fn slashed(path: &Path) -> String {
    path.components()
        .map(|part| part.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn path_to_uri(path: &Path) -> String {
    let text = slashed(path);
    let text = text.trim_start_matches('/');
    format!("{FILE_SCHEME}/{text}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_files_become_relative() {
        let converter = LocationConverter::new(Some(PathBuf::from("/work/project")));
        let location = IndexLocation::from_path(Path::new("/work/project/src/main.c"));
        let internal = converter.to_internal(&location);
        assert_eq!(internal, "<WS>src/main.c");
        let decoded = converter.from_internal(&internal).unwrap();
        assert_eq!(decoded.uri, "file:///work/project/src/main.c");
        assert_eq!(decoded.workspace_path.as_deref(), Some("src/main.c"));
    }

    #[test]
    fn external_files_keep_their_uri() {
        let converter = LocationConverter::new(Some(PathBuf::from("/work/project")));
        let location = IndexLocation::from_path(Path::new("/usr/include/stdio.h"));
        let internal = converter.to_internal(&location);
        assert_eq!(internal, "<EXT>file:///usr/include/stdio.h");
        assert_eq!(converter.from_internal(&internal), Some(location));
    }

    #[test]
    fn unknown_encodings_are_rejected() {
        let converter = LocationConverter::default();
        assert!(converter.from_internal("/plain/path").is_none());
        assert!(converter.from_internal("<WS>a.c").is_none());
    }
}
