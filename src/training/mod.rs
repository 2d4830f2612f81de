//! Training infrastructure: per-team replay memory and the competitive
//! DDPG trainer.

pub mod ddpg;
pub mod replay;

pub use ddpg::{
    ActionType, CriticInputs, ExplorationMode, Losses, TeamSpec, Trainer, TrainerConfig,
    TrainerError,
};
pub use replay::{ReplayBuffer, Transition};
