//! Experiment configuration.
//!
//! [`ExperimentConfig`] holds the run schedule and the learning
//! hyperparameters. Every field has a default, so a JSON file only needs to
//! name the values it changes.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::training::TrainerConfig;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Run schedule and hyperparameters for a competitive training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    // --- Schedule ---
    /// Steps after which an episode is cut off.
    pub max_episode_len: usize,
    /// The run stops once more than this many episodes have started.
    pub num_episodes: usize,
    /// Environment steps collected before the first update.
    pub warmup_steps: usize,
    /// Update both teams every this many environment steps.
    pub update_rate: usize,
    /// Episodes per statistics window (and log line) in training mode.
    pub save_rate: usize,
    /// Episodes per statistics window in test mode.
    pub test_window: usize,
    /// Master switch for gradient updates.
    pub is_training: bool,
    /// Render every step instead of learning.
    pub display: bool,

    // --- Learning ---
    pub batch_size: usize,
    pub gamma: f64,
    pub tau: f64,
    pub actor_learning_rate: f64,
    pub critic_learning_rate: f64,
    pub hidden_units: usize,
    /// Capacity of each team's replay memory.
    pub buffer_size: usize,

    // --- Output ---
    /// Directory for histories and model weights.
    pub model_dir: PathBuf,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            max_episode_len: 25,
            num_episodes: 40_000,
            warmup_steps: 1024 * 25,
            update_rate: 100,
            save_rate: 1000,
            test_window: 10,
            is_training: true,
            display: false,
            batch_size: 1024,
            gamma: 0.95,
            tau: 0.01,
            actor_learning_rate: 1e-2,
            critic_learning_rate: 1e-2,
            hidden_units: 64,
            buffer_size: 1_000_000,
            model_dir: PathBuf::from("Models"),
        }
    }
}

impl ExperimentConfig {
    /// Loads and validates a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ExperimentConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("max_episode_len", self.max_episode_len),
            ("num_episodes", self.num_episodes),
            ("update_rate", self.update_rate),
            ("save_rate", self.save_rate),
            ("test_window", self.test_window),
            ("batch_size", self.batch_size),
            ("hidden_units", self.hidden_units),
            ("buffer_size", self.buffer_size),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be > 0", name)));
            }
        }
        if self.buffer_size < self.batch_size {
            return Err(ConfigError::Invalid("buffer_size must be >= batch_size".into()));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(ConfigError::Invalid("gamma must be in [0, 1]".into()));
        }
        if !(self.tau > 0.0 && self.tau <= 1.0) {
            return Err(ConfigError::Invalid("tau must be in (0, 1]".into()));
        }
        if self.actor_learning_rate <= 0.0 || self.critic_learning_rate <= 0.0 {
            return Err(ConfigError::Invalid("learning rates must be > 0".into()));
        }
        Ok(())
    }

    /// Trainer hyperparameters derived from this config.
    pub fn trainer_config(&self) -> TrainerConfig {
        TrainerConfig {
            gamma: self.gamma,
            tau: self.tau,
            actor_learning_rate: self.actor_learning_rate,
            critic_learning_rate: self.critic_learning_rate,
            opponent_learning_rate: self.actor_learning_rate,
            batch_size: self.batch_size,
            hidden_units: self.hidden_units,
            ..TrainerConfig::default()
        }
    }
}
