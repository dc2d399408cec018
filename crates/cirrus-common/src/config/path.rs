//! Configuration path types for multi-file loading.

use std::path::{Path, PathBuf};

/// A configuration source - either a single file or a directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigPath {
    /// A single configuration file.
    File(PathBuf),
    /// A directory containing configuration files.
    Dir(PathBuf),
}

impl ConfigPath {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn dir(path: impl Into<PathBuf>) -> Self {
        Self::Dir(path.into())
    }

    /// Classify a path by looking at the filesystem.
    pub fn detect(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.is_dir() {
            Self::Dir(path)
        } else {
            Self::File(path)
        }
    }

    pub fn as_path(&self) -> &Path {
        match self {
            Self::File(path) | Self::Dir(path) => path,
        }
    }
}

/// Check if a path has a YAML extension.
pub fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext == "yaml" || ext == "yml")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_yaml_file() {
        assert!(is_yaml_file(Path::new("cirrus.yaml")));
        assert!(is_yaml_file(Path::new("conf.d/accounts.yml")));
        assert!(!is_yaml_file(Path::new("cirrus.toml")));
        assert!(!is_yaml_file(Path::new("README")));
    }

    #[test]
    fn test_detect_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(ConfigPath::detect(dir.path()), ConfigPath::dir(dir.path()));

        let file = dir.path().join("cirrus.yaml");
        assert_eq!(ConfigPath::detect(&file), ConfigPath::file(&file));
        assert_eq!(ConfigPath::detect(&file).as_path(), file.as_path());
    }
}
