//! Multi-agent environments.
//!
//! The training loop only talks to environments through [`MultiAgentEnv`].
//! A small particle world with the `simple_adversary` scenario is provided
//! so the loop can run end to end.

pub mod particle;
pub mod simple_adversary;

use thiserror::Error;

use crate::team::{Action, Observation};

pub use particle::{Vec2, World};
pub use simple_adversary::SimpleAdversary;

/// Errors raised by environments.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EnvError {
    #[error("Unknown scenario '{0}'")]
    UnknownScenario(String),

    #[error("Expected {expected} actions, got {actual}")]
    ActionCount { expected: usize, actual: usize },

    #[error("Action for agent {agent} has width {actual}, expected {expected}")]
    ActionWidth {
        agent: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Action for agent {agent} is not one-hot")]
    NotOneHot { agent: usize },
}

/// Static description of one environment agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentInfo {
    /// Display name.
    pub name: String,
    /// Whether this agent plays on the adversary team.
    pub adversary: bool,
}

/// Result of a single environment step, one entry per agent.
#[derive(Debug, Clone)]
pub struct EnvStep {
    pub observations: Vec<Observation>,
    pub rewards: Vec<f32>,
    pub dones: Vec<bool>,
}

/// A simultaneous-move multi-agent environment.
///
/// All per-agent vectors are in the order given by [`MultiAgentEnv::agents`].
pub trait MultiAgentEnv {
    /// The agents of this environment, in environment order.
    fn agents(&self) -> &[AgentInfo];

    /// Observation dimension per agent.
    fn observation_dims(&self) -> Vec<usize>;

    /// Width of each agent's action vector.
    fn action_dim(&self) -> usize;

    /// Reseeds the environment's random number generator.
    fn seed(&mut self, seed: u64);

    /// Starts a new episode and returns the initial observations.
    fn reset(&mut self) -> Vec<Observation>;

    /// Applies one action per agent and advances the simulation.
    fn step(&mut self, actions: &[Action]) -> Result<EnvStep, EnvError>;

    /// Text rendering of the current state.
    fn render(&self) -> String;

    /// Number of agents.
    fn n_agents(&self) -> usize {
        self.agents().len()
    }
}

/// Builds a named scenario.
///
/// `discrete_action` requires one-hot action vectors; otherwise each action
/// component is read as a continuous value in `[0, 1]`.
pub fn make_env(
    scenario_name: &str,
    discrete_action: bool,
) -> Result<Box<dyn MultiAgentEnv>, EnvError> {
    match scenario_name {
        "simple_adversary" => Ok(Box::new(SimpleAdversary::new(2, discrete_action))),
        other => Err(EnvError::UnknownScenario(other.to_string())),
    }
}
