//! Multi-file configuration loading.
//!
//! Every path is loaded, interpolated and parsed; partial configs are merged
//! by component key and every failure is reported at once.

use std::path::Path;

use indexmap::IndexMap;

use crate::config::{ConfigPath, LoggingConfig, MetricsConfig, interpolate, is_yaml_file};
use crate::error::ConfigError;

/// Trait for configs that can be merged from multiple files.
pub trait Mergeable: Sized + Default {
    type Key: Eq + std::hash::Hash + Clone + std::fmt::Display;
    type Component;

    fn components_mut(&mut self) -> &mut IndexMap<Self::Key, Self::Component>;
    fn metrics_mut(&mut self) -> &mut MetricsConfig;
    fn logging_mut(&mut self) -> &mut LoggingConfig;
    fn parse_yaml(contents: &str) -> Result<Self, ConfigError>;

    fn merge(&mut self, mut other: Self) -> Result<(), ConfigError> {
        let duplicates: Vec<String> = other
            .components_mut()
            .keys()
            .filter(|key| self.components_mut().contains_key(*key))
            .map(|key| key.to_string())
            .collect();

        if !duplicates.is_empty() {
            return Err(ConfigError::DuplicateComponents { keys: duplicates });
        }

        for (key, component) in other.components_mut().drain(..) {
            self.components_mut().insert(key, component);
        }

        self.metrics_mut()
            .merge_from(std::mem::take(other.metrics_mut()));
        self.logging_mut()
            .merge_from(std::mem::take(other.logging_mut()));
        Ok(())
    }
}

/// Load and merge configuration from files and directories.
pub fn load_from_paths<C: Mergeable>(paths: &[ConfigPath]) -> Result<C, ConfigError> {
    let mut config = C::default();
    let mut errors = Vec::new();

    for path in paths {
        let (display, loaded) = match path {
            ConfigPath::File(file_path) => (file_path.display(), load_file::<C>(file_path)),
            ConfigPath::Dir(dir_path) => (dir_path.display(), load_dir::<C>(dir_path)),
        };

        match loaded.and_then(|partial| config.merge(partial)) {
            Ok(()) => {}
            Err(e) => errors.push(format!("{display}: {e}")),
        }
    }

    if !errors.is_empty() {
        return Err(ConfigError::MultipleErrors { errors });
    }
    Ok(config)
}

fn load_file<C: Mergeable>(path: &Path) -> Result<C, ConfigError> {
    if !is_yaml_file(path) {
        return Err(ConfigError::UnsupportedFormat {
            path: path.to_path_buf(),
        });
    }

    let contents =
        std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile { source })?;

    let result = interpolate(&contents);
    if !result.is_ok() {
        return Err(ConfigError::EnvInterpolation {
            message: result.errors.join("\n"),
        });
    }

    C::parse_yaml(&result.text)
}

fn load_dir<C: Mergeable>(dir: &Path) -> Result<C, ConfigError> {
    let mut config = C::default();
    let mut errors = Vec::new();

    let mut files: Vec<_> = std::fs::read_dir(dir)
        .map_err(|source| ConfigError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_yaml_file(path))
        .collect();

    files.sort();

    for path in files {
        match load_file::<C>(&path).and_then(|partial| config.merge(partial)) {
            Ok(()) => {}
            Err(e) => errors.push(format!("{}: {}", path.display(), e)),
        }
    }

    if !errors.is_empty() {
        return Err(ConfigError::MultipleErrors { errors });
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Default, Deserialize)]
    struct TestConfig {
        #[serde(default)]
        jobs: IndexMap<String, String>,
        #[serde(default)]
        metrics: MetricsConfig,
        #[serde(default)]
        logging: LoggingConfig,
    }

    impl Mergeable for TestConfig {
        type Key = String;
        type Component = String;

        fn components_mut(&mut self) -> &mut IndexMap<String, String> {
            &mut self.jobs
        }

        fn metrics_mut(&mut self) -> &mut MetricsConfig {
            &mut self.metrics
        }

        fn logging_mut(&mut self) -> &mut LoggingConfig {
            &mut self.logging
        }

        fn parse_yaml(contents: &str) -> Result<Self, ConfigError> {
            serde_yaml::from_str(contents).map_err(|source| ConfigError::YamlParse { source })
        }
    }

    #[test]
    fn test_directory_files_merge_in_name_order() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.yaml"), "jobs:\n  box: b\n").unwrap();
        std::fs::write(
            dir.path().join("a.yml"),
            "jobs:\n  saas: a\nmetrics:\n  address: 0.0.0.0:9090\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let config: TestConfig = load_from_paths(&[ConfigPath::dir(dir.path())]).unwrap();

        let keys: Vec<_> = config.jobs.keys().cloned().collect();
        assert_eq!(keys, vec!["saas", "box"]);
        assert_eq!(config.metrics.address.as_deref(), Some("0.0.0.0:9090"));
    }

    #[test]
    fn test_duplicate_jobs_across_files_rejected() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("first.yaml");
        let second = dir.path().join("second.yaml");
        std::fs::write(&first, "jobs:\n  saas: one\n").unwrap();
        std::fs::write(&second, "jobs:\n  saas: two\n").unwrap();

        let err = load_from_paths::<TestConfig>(&[ConfigPath::file(&first), ConfigPath::file(&second)])
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("Duplicate job keys: saas"), "{message}");
    }

    #[test]
    fn test_errors_are_aggregated() {
        let dir = TempDir::new().unwrap();
        let toml = dir.path().join("config.toml");
        std::fs::write(&toml, "").unwrap();
        let missing = dir.path().join("missing.yaml");

        let err = load_from_paths::<TestConfig>(&[ConfigPath::file(&toml), ConfigPath::file(&missing)])
            .unwrap_err();

        match err {
            ConfigError::MultipleErrors { errors } => assert_eq!(errors.len(), 2),
            other => panic!("expected MultipleErrors, got {other:?}"),
        }
    }
}
