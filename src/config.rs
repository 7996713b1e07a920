//! Configuration for recording, suggesting and maintenance.
//!
//! Every section has sensible defaults, so an empty JSON object is a valid
//! configuration file. Values are handed to the components at construction
//! time; nothing reads configuration lazily.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HindsightError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HindsightConfig {
    /// Suggestion engine settings.
    pub suggest: SuggestConfig,
    /// Query recorder settings.
    pub recorder: RecorderConfig,
    /// Maintenance job settings.
    pub maintenance: MaintenanceConfig,
    /// Term store settings.
    pub store: StoreConfig,
}

impl HindsightConfig {
    /// Load a configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref())?;
        let config: HindsightConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Check all sections for out-of-range values.
    pub fn validate(&self) -> Result<()> {
        self.suggest.validate()?;
        self.recorder.validate()?;
        self.maintenance.validate()?;
        self.store.validate()
    }
}

/// Settings of the suggestion engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestConfig {
    /// Maximum number of suggestions returned per request.
    pub limit: usize,
    /// Number of most recent complete words used as scoring context.
    pub context_window: usize,
    /// Language used to pick linguistic preprocessors (stop words).
    pub language: String,
}

impl Default for SuggestConfig {
    fn default() -> Self {
        SuggestConfig {
            limit: 4,
            context_window: 4,
            language: "english".to_string(),
        }
    }
}

impl SuggestConfig {
    pub fn validate(&self) -> Result<()> {
        if self.context_window == 0 {
            return Err(HindsightError::invalid_config(
                "suggest.context_window must be at least 1",
            ));
        }
        if self.language.trim().is_empty() {
            return Err(HindsightError::invalid_config(
                "suggest.language must not be empty",
            ));
        }
        Ok(())
    }
}

/// Settings of the query recorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// How often a recording is attempted when its commit loses a race
    /// against a concurrent recording.
    pub max_commit_attempts: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        RecorderConfig {
            max_commit_attempts: 8,
        }
    }
}

impl RecorderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_commit_attempts == 0 {
            return Err(HindsightError::invalid_config(
                "recorder.max_commit_attempts must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Settings of the maintenance jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Number of terms processed per transaction.
    pub batch_size: usize,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        MaintenanceConfig { batch_size: 100 }
    }
}

impl MaintenanceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(HindsightError::invalid_config(
                "maintenance.batch_size must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Settings of the term store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory of the durable store. `None` keeps everything in memory.
    pub path: Option<PathBuf>,
    /// Whether every commit is fsynced before it returns.
    pub sync_writes: bool,
    /// Number of log records after which the log is folded into a snapshot.
    pub checkpoint_after: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            path: None,
            sync_writes: true,
            checkpoint_after: 1024,
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.checkpoint_after == 0 {
            return Err(HindsightError::invalid_config(
                "store.checkpoint_after must be at least 1",
            ));
        }
        Ok(())
    }
}
