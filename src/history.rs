//! Rolling episode statistics and their on-disk history file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while writing or reading a history file.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reward history of a run.
///
/// `reward_episodes` holds the summed reward of every agent per episode;
/// `reward_episodes_by_agents[i]` holds agent `i`'s reward per episode. The
/// last entry of each is the episode in progress when the run stopped.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct History {
    /// Identifier of the run that produced this history.
    pub run_id: String,
    pub scenario: String,
    pub reward_episodes: Vec<f32>,
    pub reward_episodes_by_agents: Vec<Vec<f32>>,
    /// Windowed mean of `reward_episodes` at every statistics checkpoint.
    pub final_ep_rewards: Vec<f32>,
    /// Windowed per-agent means at every checkpoint, agents in order.
    pub final_ep_ag_rewards: Vec<f32>,
}

impl History {
    /// Starts an empty history with one in-progress episode for `n_agents`.
    pub fn new(run_id: String, scenario: String, n_agents: usize) -> Self {
        Self {
            run_id,
            scenario,
            reward_episodes: vec![0.0],
            reward_episodes_by_agents: vec![vec![0.0]; n_agents],
            final_ep_rewards: Vec::new(),
            final_ep_ag_rewards: Vec::new(),
        }
    }

    /// Number of started episodes, including the one in progress.
    pub fn episodes(&self) -> usize {
        self.reward_episodes.len()
    }

    /// Adds one step of per-agent rewards to the episode in progress.
    pub fn record_step(&mut self, rewards: &[f32]) {
        for (i, &reward) in rewards.iter().enumerate() {
            if let Some(total) = self.reward_episodes.last_mut() {
                *total += reward;
            }
            if let Some(agent) = self
                .reward_episodes_by_agents
                .get_mut(i)
                .and_then(|a| a.last_mut())
            {
                *agent += reward;
            }
        }
    }

    /// Opens a new zeroed episode entry for the total and every agent.
    pub fn start_episode(&mut self) {
        self.reward_episodes.push(0.0);
        for agent in &mut self.reward_episodes_by_agents {
            agent.push(0.0);
        }
    }

    /// Appends windowed means to the checkpoint series and returns the
    /// mean total episode reward of the window.
    pub fn checkpoint(&mut self, window: usize) -> f32 {
        let mean = tail_mean(&self.reward_episodes, window);
        self.final_ep_rewards.push(mean);
        for agent in &self.reward_episodes_by_agents {
            self.final_ep_ag_rewards.push(tail_mean(agent, window));
        }
        mean
    }

    /// Writes the history as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), HistoryError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| HistoryError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| HistoryError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads a history written by [`History::save`].
    pub fn load(path: &Path) -> Result<Self, HistoryError> {
        let content = fs::read_to_string(path).map_err(|source| HistoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Mean of the last `window` values (all values if fewer). Empty input
/// yields 0.
pub fn tail_mean(values: &[f32], window: usize) -> f32 {
    let start = values.len().saturating_sub(window);
    let tail = &values[start..];
    if tail.is_empty() {
        return 0.0;
    }
    tail.iter().sum::<f32>() / tail.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_mean_uses_last_window() {
        assert!((tail_mean(&[1.0, 2.0, 3.0, 4.0], 2) - 3.5).abs() < 1e-6);
    }

    #[test]
    fn tail_mean_short_history() {
        assert!((tail_mean(&[2.0, 4.0], 10) - 3.0).abs() < 1e-6);
        assert_eq!(tail_mean(&[], 3), 0.0);
    }

    #[test]
    fn record_step_accumulates_totals_and_agents() {
        let mut history = History::new("run".into(), "s".into(), 2);
        history.record_step(&[1.0, 2.0]);
        history.record_step(&[0.5, -1.0]);
        assert_eq!(history.reward_episodes, vec![2.5]);
        assert_eq!(history.reward_episodes_by_agents, vec![vec![1.5], vec![1.0]]);
    }

    #[test]
    fn start_episode_opens_zero_entries() {
        let mut history = History::new("run".into(), "s".into(), 3);
        history.record_step(&[1.0, 1.0, 1.0]);
        history.start_episode();
        assert_eq!(history.episodes(), 2);
        assert_eq!(history.reward_episodes, vec![3.0, 0.0]);
        for agent in &history.reward_episodes_by_agents {
            assert_eq!(agent, &vec![1.0, 0.0]);
        }
    }

    #[test]
    fn checkpoint_appends_window_means() {
        let mut history = History::new("run".into(), "s".into(), 2);
        history.record_step(&[1.0, 3.0]);
        history.start_episode();
        history.record_step(&[3.0, 5.0]);
        let mean = history.checkpoint(2);
        assert!((mean - 6.0).abs() < 1e-6);
        assert_eq!(history.final_ep_rewards, vec![6.0]);
        assert_eq!(history.final_ep_ag_rewards, vec![2.0, 4.0]);
    }

    #[test]
    fn save_creates_directories_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Models").join("history_simple_adversary_0.json");
        let mut history = History::new("abc".into(), "simple_adversary".into(), 1);
        history.record_step(&[0.25]);
        history.save(&path).unwrap();

        let loaded = History::load(&path).unwrap();
        assert_eq!(loaded, history);
    }

    #[test]
    fn load_missing_file_reports_path() {
        let err = History::load(Path::new("missing/history.json")).unwrap_err();
        assert!(err.to_string().contains("missing/history.json"));
    }
}
