//! Repository configuration, stored as `grove.toml` in the repository root.
//!
//! ```toml
//! [objects]
//! compress_threshold = 512
//! compression_level = 3
//! fsync = true
//!
//! [refs]
//! lock_timeout_ms = 5000
//! checkpoint_ref = "refs/stash"
//! default_branch = "main"
//!
//! [user]
//! name = "Ada"
//! email = "ada@example.com"
//! ```
//!
//! Every section and key is optional; missing values take their defaults.

use std::path::Path;
use std::time::Duration;

use grove_refs::{branch_ref, validate_ref_name};
use grove_store::LooseConfig;
use grove_types::PersonIdent;
use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};

/// File name of the configuration inside a repository root.
pub const CONFIG_FILE: &str = "grove.toml";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Loose object storage tuning.
    pub objects: LooseConfig,
    pub refs: RefsConfig,
    /// Identity used when the caller does not supply one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserConfig>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefsConfig {
    /// How long a reference update waits for a lock held by someone else.
    pub lock_timeout_ms: u64,
    /// Reference that checkpoint commits are recorded under.
    pub checkpoint_ref: String,
    /// Branch a freshly opened repository works on.
    pub default_branch: String,
}

impl Default for RefsConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5000,
            checkpoint_ref: "refs/stash".to_string(),
            default_branch: "main".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    pub name: String,
    pub email: String,
}

impl RepositoryConfig {
    /// load config from file
    pub fn load(path: &Path) -> SdkResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RepositoryConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// save config to file
    pub fn save(&self, path: &Path) -> SdkResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the stores would refuse later.
    pub fn validate(&self) -> SdkResult<()> {
        validate_ref_name(&self.refs.checkpoint_ref)
            .map_err(|e| SdkError::Config(format!("refs.checkpoint_ref: {e}")))?;
        branch_ref(&self.refs.default_branch)
            .map_err(|e| SdkError::Config(format!("refs.default_branch: {e}")))?;
        if !(1..=22).contains(&self.objects.compression_level) {
            return Err(SdkError::Config(format!(
                "objects.compression_level must be within 1..=22, got {}",
                self.objects.compression_level
            )));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.refs.lock_timeout_ms)
    }

    /// The configured identity stamped with the current time.
    pub fn identity(&self) -> Option<PersonIdent> {
        self.user
            .as_ref()
            .map(|u| PersonIdent::now(u.name.clone(), u.email.clone()))
    }
}
