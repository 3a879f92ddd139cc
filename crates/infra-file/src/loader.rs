//! Compose file loader.
//!
//! Reads a compose file, deserializes it with the format its extension
//! implies, fills job names from their keys, resolves relative template
//! paths against the file's directory and validates the result.

use stackcompose_core::domain::{ComposeConfig, DomainError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors while loading a compose file
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to read compose file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid compose file: {0}")]
    Invalid(#[from] DomainError),
}

/// Serialization format of a compose file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Yaml,
    Json,
}

impl FileFormat {
    /// `.json` is JSON; everything else is read as YAML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => FileFormat::Json,
            _ => FileFormat::Yaml,
        }
    }
}

/// Loader for compose files.
pub struct ComposeFileLoader;

impl ComposeFileLoader {
    /// Load and validate a compose file from disk.
    ///
    /// `~` is expanded. Relative template paths are resolved against the
    /// directory containing the compose file.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<ComposeConfig, LoadError> {
        let path = expand(path.as_ref());
        info!("Reading compose file");

        let content = std::fs::read_to_string(&path).map_err(|e| LoadError::Read {
            path: path.clone(),
            source: e,
        })?;

        let mut config = Self::parse(&content, FileFormat::from_path(&path))?;

        let base_dir = path.parent().unwrap_or(Path::new("."));
        Self::resolve_templates(&mut config, base_dir);

        config.validate()?;
        debug!(
            jobs = config.jobs.len(),
            stacks = config.total_stacks(),
            "Compose file loaded"
        );
        Ok(config)
    }

    /// Parse compose content without validating or touching the filesystem.
    pub fn parse(content: &str, format: FileFormat) -> Result<ComposeConfig, LoadError> {
        let mut config: ComposeConfig = match format {
            FileFormat::Yaml => serde_yaml::from_str(content)?,
            FileFormat::Json => serde_json::from_str(content)?,
        };
        config.normalize();
        Ok(config)
    }

    fn resolve_templates(config: &mut ComposeConfig, base_dir: &Path) {
        for job in config.jobs.values_mut() {
            for stack in job.stacks.iter_mut() {
                if stack.template_file.trim().is_empty() {
                    continue;
                }
                let template = expand(Path::new(&stack.template_file));
                let resolved = if template.is_absolute() {
                    template
                } else {
                    base_dir.join(template)
                };
                stack.template_file = resolved.to_string_lossy().into_owned();
            }
        }
    }
}

fn expand(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(raw.as_ref()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const YAML: &str = r#"
description: two levels
vars:
  AWS_REGION: eu-central-1
jobs:
  network:
    order: 1
    stacks:
      - stack_name: vpc
        template_file: templates/vpc.yml
        parameters:
          CidrBlock: 10.0.0.0/16
  app:
    order: 2
    stacks:
      - stack_name: service
        template_file: /abs/service.yml
        capabilities: [CAPABILITY_IAM]
"#;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "stackcompose_loader_{}_{}",
            name,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_parse_yaml() {
        let config = ComposeFileLoader::parse(YAML, FileFormat::Yaml).unwrap();
        assert_eq!(config.description.as_deref(), Some("two levels"));
        assert_eq!(config.jobs.len(), 2);
        assert_eq!(config.jobs["network"].name, "network");
        assert_eq!(config.jobs["network"].order, 1);
        assert_eq!(
            config.jobs["network"].stacks[0].parameters["CidrBlock"],
            "10.0.0.0/16"
        );
        assert_eq!(
            config.jobs["app"].stacks[0].capabilities,
            vec!["CAPABILITY_IAM"]
        );
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{"jobs": {"solo": {"order": 3, "stacks": [{"stack_name": "one", "template_file": "one.json"}]}}}"#;
        let config = ComposeFileLoader::parse(json, FileFormat::Json).unwrap();
        assert_eq!(config.jobs["solo"].name, "solo");
        assert!(config.vars.is_empty());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = "jobs:\n  a:\n    ordr: 1\n    stacks: []\n";
        let err = ComposeFileLoader::parse(yaml, FileFormat::Yaml).unwrap_err();
        assert!(matches!(err, LoadError::Yaml(_)));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(FileFormat::from_path(Path::new("x.JSON")), FileFormat::Json);
        assert_eq!(FileFormat::from_path(Path::new("x.yml")), FileFormat::Yaml);
        assert_eq!(FileFormat::from_path(Path::new("compose")), FileFormat::Yaml);
    }

    #[test]
    fn test_load_resolves_relative_templates() {
        let dir = temp_dir("resolve");
        let path = dir.join("stack-compose.yml");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(YAML.as_bytes())
            .unwrap();

        let config = ComposeFileLoader::load(&path).unwrap();
        assert_eq!(
            PathBuf::from(&config.jobs["network"].stacks[0].template_file),
            dir.join("templates/vpc.yml")
        );
        assert_eq!(config.jobs["app"].stacks[0].template_file, "/abs/service.yml");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_rejects_invalid_config() {
        let dir = temp_dir("invalid");
        let path = dir.join("empty.yml");
        std::fs::write(&path, "jobs:\n  broken:\n    order: 1\n    stacks: []\n").unwrap();

        let err = ComposeFileLoader::load(&path).unwrap_err();
        assert!(matches!(err, LoadError::Invalid(DomainError::EmptyJob(ref j)) if j == "broken"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_file() {
        let err = ComposeFileLoader::load("/definitely/not/here.yml").unwrap_err();
        assert!(matches!(err, LoadError::Read { .. }));
    }
}
