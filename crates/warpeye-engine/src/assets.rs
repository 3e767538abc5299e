use std::path::{Path, PathBuf};

use crate::error::EngineError;

/// Folder name searched for when no explicit location is given.
pub const ASSETS_DIR_NAME: &str = "resources";

/// A validated root directory containing warpeye runtime assets (scenes + JSON).
#[derive(Debug, Clone)]
pub struct AssetsRoot {
    path: PathBuf,
}

impl AssetsRoot {
    /// Locate the `resources/` directory.
    ///
    /// Resolution order:
    /// 1) `WARPEYE_ASSETS` env var (if set and existing)
    /// 2) Search upward from `start_dir` for a folder named `resources`
    pub fn discover(start_dir: &Path) -> Result<Self, EngineError> {
        if let Ok(p) = std::env::var("WARPEYE_ASSETS") {
            let pb = PathBuf::from(p);
            if pb.is_dir() {
                return Ok(Self { path: pb });
            }
        }
        Self::search_upward(start_dir)
    }

    fn search_upward(start_dir: &Path) -> Result<Self, EngineError> {
        let mut cur = start_dir.to_path_buf();
        loop {
            let cand = cur.join(ASSETS_DIR_NAME);
            if cand.is_dir() {
                return Ok(Self { path: cand });
            }
            if !cur.pop() {
                break;
            }
        }

        Err(EngineError::AssetsNotFound {
            start_dir: start_dir.to_path_buf(),
        })
    }

    /// Use `path` as-is (e.g. from the command line).
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve a config-provided path against the root unless it is already absolute.
    pub fn resolve(&self, rel: impl AsRef<Path>) -> PathBuf {
        let rel = rel.as_ref();
        if rel.is_absolute() {
            rel.to_path_buf()
        } else {
            self.path.join(rel)
        }
    }

    /// Choose OS-specific JSON config if present, otherwise fall back to `<stem>.json`.
    ///
    /// Example: `warpeye.linux.json` overrides `warpeye.json` on Linux.
    pub fn pick_platform_json(&self, stem: &str) -> PathBuf {
        let os = if cfg!(target_os = "windows") {
            "windows"
        } else if cfg!(target_os = "macos") {
            "macos"
        } else if cfg!(target_os = "linux") {
            "linux"
        } else {
            "other"
        };

        let platform = self.path.join(format!("{stem}.{os}.json"));
        if platform.exists() {
            platform
        } else {
            self.path.join(format!("{stem}.json"))
        }
    }
}

/// Read a UTF-8 file into a String.
pub fn read_to_string_result(path: &Path) -> Result<String, EngineError> {
    std::fs::read_to_string(path).map_err(|e| EngineError::io(path, e))
}

/// Parse a file as an untyped JSON value.
pub fn load_json_value(path: &Path) -> Result<serde_json::Value, EngineError> {
    let s = read_to_string_result(path)?;
    serde_json::from_str(&s).map_err(|e| EngineError::Json {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Deserialize JSON from a file.
pub fn load_json_result<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, EngineError> {
    let s = read_to_string_result(path)?;
    serde_json::from_str(&s).map_err(|e| EngineError::Json {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_walks_up_to_resources() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("resources")).unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let root = AssetsRoot::search_upward(&nested).unwrap();
        assert_eq!(root.path(), dir.path().join("resources"));
    }

    #[test]
    fn search_fails_without_resources() {
        let dir = tempfile::tempdir().unwrap();
        let err = AssetsRoot::search_upward(dir.path()).unwrap_err();
        assert!(matches!(err, EngineError::AssetsNotFound { .. }));
    }

    #[test]
    fn platform_json_falls_back_to_stem() {
        let dir = tempfile::tempdir().unwrap();
        let root = AssetsRoot::at(dir.path());
        assert_eq!(root.pick_platform_json("warpeye"), dir.path().join("warpeye.json"));
    }

    #[test]
    fn resolve_keeps_absolute_paths() {
        let root = AssetsRoot::at("/tmp/resources");
        assert_eq!(root.resolve("scenes"), PathBuf::from("/tmp/resources/scenes"));
        assert_eq!(root.resolve("/abs/scenes"), PathBuf::from("/abs/scenes"));
    }
}
