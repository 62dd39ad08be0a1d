//! Ambient `cf` configuration
//!
//! Reads the JSON file `cf` keeps under its home directory. The file belongs
//! to `cf`; this crate never writes it.

use crate::error::{Error, Result};
use crate::resource::json::at_path;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Field holding the targeted space guid
pub const SPACE_GUID_FIELD: &str = "SpaceFields.GUID";

/// Location of the `cf` configuration, optionally for a saved target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfConfig {
    cf_home: PathBuf,
    target: Option<String>,
}

/// The directory `cf` uses as its home
///
/// `CF_HOME` wins over the user's home directory.
pub fn get_cf_home() -> PathBuf {
    if let Ok(path) = std::env::var("CF_HOME") {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Saved target names become file names; keep them to a safe alphabet
fn validate_target_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !name.starts_with('.')
}

impl CfConfig {
    pub fn new(cf_home: PathBuf, target: Option<String>) -> Self {
        Self { cf_home, target }
    }

    /// Configuration for the ambient `cf` home, with no named target
    pub fn from_env() -> Self {
        Self::new(get_cf_home(), None)
    }

    pub fn with_target(mut self, target: Option<&str>) -> Self {
        self.target = target.map(str::to_string);
        self
    }

    pub fn cf_home(&self) -> &Path {
        &self.cf_home
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// `<home>/.cf/config.json`, or `<home>/.cf/targets/<name>.config.json`
    pub fn config_file_path(&self) -> Result<PathBuf> {
        let dir = self.cf_home.join(".cf");
        match &self.target {
            None => Ok(dir.join("config.json")),
            Some(name) if validate_target_name(name) => {
                Ok(dir.join("targets").join(format!("{}.config.json", name)))
            },
            Some(name) => {
                tracing::warn!("Invalid characters in target name");
                Err(Error::Config(format!("Invalid target name: {}", name)))
            },
        }
    }

    /// Parsed configuration, or `None` if the file does not exist
    pub async fn read(&self) -> Result<Option<Value>> {
        let path = self.config_file_path()?;

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No cf configuration at {:?}", path);
                return Ok(None);
            },
            Err(e) => {
                return Err(Error::Config(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            },
        };

        serde_json::from_str(&content).map(Some).map_err(|e| {
            Error::Config(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Value at a dotted field path, e.g. `OrganizationFields.Name`
    pub async fn get_field(&self, field: &str) -> Result<Option<Value>> {
        Ok(self
            .read()
            .await?
            .and_then(|config| at_path(&config, field).cloned()))
    }

    /// Non-empty string at a dotted field path
    pub async fn get_string_field(&self, field: &str) -> Result<Option<String>> {
        Ok(self
            .get_field(field)
            .await?
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|s| !s.is_empty()))
    }

    /// Guid of the targeted space
    pub async fn get_space_guid(&self) -> Result<Option<String>> {
        self.get_string_field(SPACE_GUID_FIELD).await
    }
}

impl Default for CfConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(home: &Path, relative: &str, content: &str) {
        let path = home.join(".cf").join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_config_file_paths() {
        let config = CfConfig::new(PathBuf::from("/home/dev"), None);
        assert_eq!(
            config.config_file_path().unwrap(),
            PathBuf::from("/home/dev/.cf/config.json")
        );

        let config = config.with_target(Some("prod-eu"));
        assert_eq!(
            config.config_file_path().unwrap(),
            PathBuf::from("/home/dev/.cf/targets/prod-eu.config.json")
        );
    }

    #[test]
    fn test_target_names_cannot_escape() {
        let config = CfConfig::new(PathBuf::from("/home/dev"), Some("../../etc".to_string()));
        assert!(config.config_file_path().is_err());
        assert!(!validate_target_name(""));
        assert!(!validate_target_name(".hidden"));
        assert!(validate_target_name("dev_1.eu"));
    }

    #[tokio::test]
    async fn test_reads_space_guid() {
        let home = tempfile::tempdir().unwrap();
        write_config(
            home.path(),
            "config.json",
            r#"{"SpaceFields": {"GUID": "space-1", "Name": "dev"}, "Target": "https://api.cf.example.com"}"#,
        );

        let config = CfConfig::new(home.path().to_path_buf(), None);
        assert_eq!(
            config.get_space_guid().await.unwrap(),
            Some("space-1".to_string())
        );
        assert_eq!(
            config.get_string_field("Target").await.unwrap(),
            Some("https://api.cf.example.com".to_string())
        );
        assert_eq!(config.get_field("Missing.Field").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_space_guid_is_none() {
        let home = tempfile::tempdir().unwrap();
        write_config(home.path(), "config.json", r#"{"SpaceFields": {"GUID": ""}}"#);

        let config = CfConfig::new(home.path().to_path_buf(), None);
        assert_eq!(config.get_space_guid().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_named_target_file() {
        let home = tempfile::tempdir().unwrap();
        write_config(
            home.path(),
            "targets/staging.config.json",
            r#"{"SpaceFields": {"GUID": "space-staging"}}"#,
        );

        let config = CfConfig::new(home.path().to_path_buf(), Some("staging".to_string()));
        assert_eq!(
            config.get_space_guid().await.unwrap(),
            Some("space-staging".to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_not_an_error() {
        let home = tempfile::tempdir().unwrap();
        let config = CfConfig::new(home.path().to_path_buf(), None);
        assert_eq!(config.read().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_malformed_file_is_a_config_error() {
        let home = tempfile::tempdir().unwrap();
        write_config(home.path(), "config.json", "{ // not json");

        let config = CfConfig::new(home.path().to_path_buf(), None);
        assert!(matches!(config.read().await, Err(Error::Config(_))));
    }
}
