//! rivals - competitive two-team actor-critic training
//!
//! Trains an "own" team against an "adversary" team in a shared
//! multi-agent environment. Each team has its own DDPG-style trainer and
//! replay memory; a single loop splits observations, rewards and actions by
//! team, records transitions, and interleaves environment steps with
//! periodic updates of both teams.

pub mod config;
pub mod environment;
pub mod error;
pub mod history;
pub mod network;
pub mod runner;
pub mod team;
pub mod training;

pub use config::ExperimentConfig;
pub use environment::{make_env, MultiAgentEnv};
pub use error::RunError;
pub use history::History;
pub use runner::{build_trainer, run, run_with_memories, RunOptions, RunSummary};
pub use team::{Side, TeamLayout};
pub use training::{ActionType, CriticInputs, ExplorationMode, Trainer};

/// Identifier type used for runs.
pub type Id = String;

/// Generates a new unique identifier (UUID v4).
pub fn generate_id() -> Id {
    uuid::Uuid::new_v4().to_string()
}
