use thiserror::Error;

use crate::config::ConfigError;
use crate::environment::EnvError;
use crate::history::HistoryError;
use crate::team::Side;
use crate::training::TrainerError;

/// Errors that end a training or evaluation run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Environment error: {0}")]
    Env(#[from] EnvError),

    #[error("Trainer error: {0}")]
    Trainer(#[from] TrainerError),

    #[error("History error: {0}")]
    History(#[from] HistoryError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("The {0} team has no agents")]
    EmptyTeam(Side),

    #[error("Agents of the {side} team have different observation widths: {dims:?}")]
    MixedObservationDims { side: Side, dims: Vec<usize> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_error_converts() {
        let err: RunError = EnvError::UnknownScenario("x".into()).into();
        assert_eq!(err.to_string(), "Environment error: Unknown scenario 'x'");
    }

    #[test]
    fn mixed_dims_display() {
        let err = RunError::MixedObservationDims {
            side: Side::Own,
            dims: vec![10, 8],
        };
        assert_eq!(
            err.to_string(),
            "Agents of the own team have different observation widths: [10, 8]"
        );
    }
}
