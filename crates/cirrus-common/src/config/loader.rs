//! Assembling one configuration from many files.

use std::path::{Path, PathBuf};

use crate::config::{ConfigPath, interpolate, is_yaml_file};
use crate::error::ConfigError;

/// A configuration that can be assembled from several partial files.
///
/// Each file is parsed on its own and folded into `Self::default()` in
/// order. Implementations decide what counts as a conflict in `merge`.
pub trait Mergeable: Sized + Default {
    /// Parse one interpolated YAML document.
    fn parse_yaml(contents: &str) -> Result<Self, ConfigError>;

    /// Fold another partial config into this one.
    fn merge(&mut self, other: Self) -> Result<(), ConfigError>;
}

/// Load and merge configuration from files and directories.
///
/// A directory stands for its `.yaml`/`.yml` files sorted by name. Loading
/// continues past a bad file so that every problem is reported together.
pub fn load_from_paths<C: Mergeable>(paths: &[ConfigPath]) -> Result<C, ConfigError> {
    let mut errors = Vec::new();
    let files: Vec<PathBuf> = paths
        .iter()
        .flat_map(|path| match expand(path) {
            Ok(files) => files,
            Err(e) => {
                errors.push(format!("{}: {e}", path.as_path().display()));
                Vec::new()
            }
        })
        .collect();

    let mut config = C::default();
    for file in &files {
        if let Err(e) = read(file).and_then(|partial: C| config.merge(partial)) {
            errors.push(format!("{}: {e}", file.display()));
        }
    }

    if errors.is_empty() {
        Ok(config)
    } else {
        Err(ConfigError::MultipleErrors { errors })
    }
}

/// The files a config path stands for, in merge order.
fn expand(path: &ConfigPath) -> Result<Vec<PathBuf>, ConfigError> {
    let dir = match path {
        ConfigPath::File(file) => return Ok(vec![file.clone()]),
        ConfigPath::Dir(dir) => dir,
    };

    let entries = std::fs::read_dir(dir).map_err(|source| ConfigError::ReadDir {
        path: dir.clone(),
        source,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_yaml_file(path))
        .collect();
    files.sort();
    Ok(files)
}

fn read<C: Mergeable>(path: &Path) -> Result<C, ConfigError> {
    if !is_yaml_file(path) {
        return Err(ConfigError::UnsupportedFormat {
            path: path.to_path_buf(),
        });
    }

    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile { source })?;
    let interpolated = interpolate(&raw);
    if !interpolated.is_ok() {
        return Err(ConfigError::EnvInterpolation {
            message: interpolated.errors.join("\n"),
        });
    }
    C::parse_yaml(&interpolated.text)
}
