use crate::core::{Result, SaveLoadError, Version};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Save/load configuration
///
/// Built with chained setters, the same way connection settings are built:
///
/// ```
/// use ecs_saveload::SaveLoadParameters;
///
/// let params = SaveLoadParameters::new("1.2.0", "saves")
///     .file_extension("sav")
///     .batch_size(100);
/// assert_eq!(params.save_path("slot1"), std::path::Path::new("saves/slot1.sav"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveLoadParameters {
    /// Version stamped on every saved component and used as the migration target on load
    pub app_version: String,

    /// Directory holding save files
    pub saves_path: PathBuf,

    /// Save file extension, without the dot
    pub file_extension: String,

    /// Entities rebuilt between cooperative yields during async loads
    pub batch_size: usize,

    /// Scope written and read when no current scope is set
    pub default_scope: String,
}

impl SaveLoadParameters {
    pub fn new(app_version: impl Into<String>, saves_path: impl AsRef<Path>) -> Self {
        Self {
            app_version: app_version.into(),
            saves_path: saves_path.as_ref().to_path_buf(),
            file_extension: "db".to_string(),
            batch_size: 50,
            default_scope: "DEFAULT".to_string(),
        }
    }

    /// Set the file extension
    pub fn file_extension(mut self, extension: &str) -> Self {
        self.file_extension = extension.trim_start_matches('.').to_string();
        self
    }

    /// Set the async load batch size
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the default scope id
    pub fn default_scope(mut self, scope: &str) -> Self {
        self.default_scope = scope.to_string();
        self
    }

    /// Set the running application version
    pub fn app_version(mut self, version: &str) -> Self {
        self.app_version = version.to_string();
        self
    }

    /// Full path of the file backing `save_name`.
    pub fn save_path(&self, save_name: &str) -> PathBuf {
        self.saves_path
            .join(format!("{}.{}", save_name, self.file_extension))
    }

    pub fn validate(&self) -> Result<()> {
        Version::parse(&self.app_version)?;
        if self.batch_size == 0 {
            return Err(SaveLoadError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.file_extension.is_empty() {
            return Err(SaveLoadError::InvalidConfig(
                "file_extension must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SaveLoadParameters {
    fn default() -> Self {
        Self::new("0.0.1", "saves")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_setters() {
        let params = SaveLoadParameters::default();
        assert_eq!(params.file_extension, "db");
        assert_eq!(params.batch_size, 50);
        assert_eq!(params.default_scope, "DEFAULT");
        assert!(params.validate().is_ok());

        let params = params.file_extension(".sav").default_scope("hub");
        assert_eq!(params.save_path("a"), PathBuf::from("saves").join("a.sav"));
        assert_eq!(params.default_scope, "hub");
    }

    #[test]
    fn validation_rejects_bad_values() {
        let bad_version = SaveLoadParameters::new("latest", "saves");
        assert!(matches!(
            bad_version.validate(),
            Err(SaveLoadError::InvalidVersion(_))
        ));

        let zero_batch = SaveLoadParameters::default().batch_size(0);
        assert!(matches!(
            zero_batch.validate(),
            Err(SaveLoadError::InvalidConfig(_))
        ));
    }
}
