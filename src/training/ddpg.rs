//! Competitive DDPG trainer.
//!
//! One [`Trainer`] drives one team. All agents of the team share a single
//! actor (parameter sharing); a critic scores team actions and is trained
//! from the team's replay memory. Discrete actions use the Gumbel-softmax
//! relaxation so the actor can be trained through the critic.
//!
//! Optional critic inputs:
//! - `model_own`: the critic sees the joint observations and actions of the
//!   whole own team instead of a single agent's.
//! - `model_adv`: the critic additionally sees the opponent team's joint
//!   observations and actions. Opponent actions at the next state come from
//!   an opponent model fitted to the opponent's recorded behaviour.

use std::path::Path;

use log::debug;
use rand::Rng;
use tch::{nn, nn::OptimizerConfig, Device, Kind, TchError, Tensor};
use thiserror::Error;

use super::replay::{ReplayBuffer, Transition};
use crate::network::{ActorNetwork, CriticNetwork};
use crate::team::{Action, Observation, Side};

/// Errors raised by a trainer.
#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("Tensor error: {0}")]
    Tch(#[from] TchError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Observation for {side} agent {agent} has width {actual}, expected {expected}")]
    ObservationWidth {
        side: Side,
        agent: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Replay memories are misaligned: own holds {own}, opponent holds {opponent}")]
    MisalignedMemories { own: usize, opponent: usize },
}

/// How actions are represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    /// One-hot action vectors.
    Discrete,
    /// Per-component values in `[0, 1]`.
    Continuous,
}

/// Whether actions are sampled for exploration or chosen greedily.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplorationMode {
    Train,
    Test,
}

/// Shape of one team as seen by a trainer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeamSpec {
    pub n_agents: usize,
    pub obs_dim: usize,
    pub action_dim: usize,
}

impl TeamSpec {
    /// Width of the joint observation-and-action vector of the team.
    pub fn joint_dim(&self) -> usize {
        self.n_agents * (self.obs_dim + self.action_dim)
    }
}

/// Which extra information the critic conditions on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CriticInputs {
    pub model_own: bool,
    pub model_adv: bool,
}

/// Trainer hyperparameters.
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    /// Discount factor.
    pub gamma: f64,
    /// Polyak coefficient for target networks.
    pub tau: f64,
    pub actor_learning_rate: f64,
    pub critic_learning_rate: f64,
    /// Learning rate of the opponent model.
    pub opponent_learning_rate: f64,
    pub batch_size: usize,
    pub hidden_units: usize,
    /// Maximum gradient norm for every optimizer step.
    pub grad_clip: f64,
    /// Weight of the squared-logits penalty in the actor loss.
    pub policy_regularization: f64,
    /// Entropy bonus of the opponent model.
    pub opponent_entropy: f64,
    /// Gaussian noise added to continuous actions while exploring.
    pub exploration_noise: f64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            gamma: 0.95,
            tau: 0.01,
            actor_learning_rate: 1e-2,
            critic_learning_rate: 1e-2,
            opponent_learning_rate: 1e-2,
            batch_size: 1024,
            hidden_units: 64,
            grad_clip: 0.5,
            policy_regularization: 1e-3,
            opponent_entropy: 1e-3,
            exploration_noise: 0.1,
        }
    }
}

/// Losses from one optimization step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Losses {
    pub critic: f64,
    pub actor: f64,
    pub opponent_model: Option<f64>,
}

/// Learned approximation of the opponent team's policy.
struct OpponentModel {
    policy: ActorNetwork,
    opt: nn::Optimizer,
}

impl OpponentModel {
    /// One maximum-likelihood step towards the opponent's recorded actions.
    fn fit(&mut self, batch: &Batch, action_type: ActionType, config: &TrainerConfig) -> f64 {
        let logits = Trainer::batched_logits(&self.policy, &batch.obs);
        let loss = match action_type {
            ActionType::Discrete => {
                let log_probs = logits.log_softmax(-1, Kind::Float);
                let nll = -(&log_probs * &batch.actions)
                    .sum_dim_intlist([-1].as_slice(), false, Kind::Float)
                    .mean(Kind::Float);
                let entropy = -(log_probs.exp() * &log_probs)
                    .sum_dim_intlist([-1].as_slice(), false, Kind::Float)
                    .mean(Kind::Float);
                nll - entropy * config.opponent_entropy
            }
            ActionType::Continuous => logits
                .sigmoid()
                .mse_loss(&batch.actions, tch::Reduction::Mean),
        };
        self.opt.backward_step_clip_norm(&loss, config.grad_clip);
        loss.double_value(&[])
    }

    /// Greedy opponent actions `[B, m, act]`.
    fn predict(&self, obs: &Tensor, action_type: ActionType) -> Tensor {
        tch::no_grad(|| greedy_action(&Trainer::batched_logits(&self.policy, obs), action_type))
    }
}

/// Opponent batch paired with the opponent model's next actions.
struct OpponentBatch {
    batch: Batch,
    next_actions: Tensor,
}

/// A team batch as tensors: `[B, n, obs]`, `[B, n, act]`, `[B]`, `[B, n, obs]`, `[B]`.
struct Batch {
    obs: Tensor,
    actions: Tensor,
    rewards: Tensor,
    next_obs: Tensor,
    dones: Tensor,
}

impl Batch {
    fn from_transitions(transitions: &[&Transition], team: &TeamSpec, device: Device) -> Self {
        let b = transitions.len() as i64;
        let n = team.n_agents as i64;
        let to_tensor = |values: Vec<f32>, width: usize| {
            Tensor::from_slice(&values)
                .reshape([b, n, width as i64])
                .to_device(device)
        };
        let rewards: Vec<f32> = transitions.iter().map(|t| t.reward).collect();
        let dones: Vec<f32> = transitions.iter().map(|t| t.done).collect();
        Self {
            obs: to_tensor(
                flatten_rows(transitions.iter().map(|t| &t.observations)),
                team.obs_dim,
            ),
            actions: to_tensor(
                flatten_rows(transitions.iter().map(|t| &t.actions)),
                team.action_dim,
            ),
            rewards: Tensor::from_slice(&rewards).to_device(device),
            next_obs: to_tensor(
                flatten_rows(transitions.iter().map(|t| &t.next_observations)),
                team.obs_dim,
            ),
            dones: Tensor::from_slice(&dones).to_device(device),
        }
    }
}

fn flatten_rows<'a>(rows: impl Iterator<Item = &'a Vec<Vec<f32>>>) -> Vec<f32> {
    rows.flat_map(|agents| agents.iter().flatten().copied()).collect()
}

/// Actor-critic trainer for one team.
pub struct Trainer {
    side: Side,
    team: TeamSpec,
    opponent: TeamSpec,
    inputs: CriticInputs,
    action_type: ActionType,
    config: TrainerConfig,
    actor: ActorNetwork,
    target_actor: ActorNetwork,
    critic: CriticNetwork,
    target_critic: CriticNetwork,
    actor_opt: nn::Optimizer,
    critic_opt: nn::Optimizer,
    opponent_model: Option<OpponentModel>,
    device: Device,
    updates: u64,
}

impl Trainer {
    /// Creates a trainer for `side`, whose team has shape `team` and whose
    /// opponents have shape `opponent`.
    pub fn new(
        side: Side,
        team: TeamSpec,
        opponent: TeamSpec,
        inputs: CriticInputs,
        action_type: ActionType,
        config: TrainerConfig,
        device: Device,
    ) -> Result<Self, TrainerError> {
        let hidden = config.hidden_units;
        let critic_dim = Self::critic_input_dim(&team, &opponent, inputs);

        let actor = ActorNetwork::new(team.obs_dim, team.action_dim, hidden, device);
        let mut target_actor = ActorNetwork::new(team.obs_dim, team.action_dim, hidden, device);
        target_actor.hard_update_from(&actor)?;

        let critic = CriticNetwork::new(critic_dim, hidden, device);
        let mut target_critic = CriticNetwork::new(critic_dim, hidden, device);
        target_critic.hard_update_from(&critic)?;

        let actor_opt = nn::Adam::default().build(actor.var_store(), config.actor_learning_rate)?;
        let critic_opt =
            nn::Adam::default().build(critic.var_store(), config.critic_learning_rate)?;

        let opponent_model = if inputs.model_adv {
            let policy =
                ActorNetwork::new(opponent.obs_dim, opponent.action_dim, hidden, device);
            let opt =
                nn::Adam::default().build(policy.var_store(), config.opponent_learning_rate)?;
            Some(OpponentModel { policy, opt })
        } else {
            None
        };

        Ok(Self {
            side,
            team,
            opponent,
            inputs,
            action_type,
            config,
            actor,
            target_actor,
            critic,
            target_critic,
            actor_opt,
            critic_opt,
            opponent_model,
            device,
            updates: 0,
        })
    }

    /// Width of the critic input for the given team shapes.
    pub fn critic_input_dim(team: &TeamSpec, opponent: &TeamSpec, inputs: CriticInputs) -> usize {
        let own = if inputs.model_own {
            team.joint_dim()
        } else {
            team.obs_dim + team.action_dim
        };
        let adv = if inputs.model_adv {
            opponent.joint_dim()
        } else {
            0
        };
        own + adv
    }

    /// Number of completed optimization steps.
    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Chooses one action per team agent.
    pub fn exploration_action(
        &self,
        observations: &[Observation],
        mode: ExplorationMode,
    ) -> Result<Vec<Action>, TrainerError> {
        if observations.is_empty() {
            return Ok(Vec::new());
        }
        for (agent, obs) in observations.iter().enumerate() {
            if obs.len() != self.team.obs_dim {
                return Err(TrainerError::ObservationWidth {
                    side: self.side,
                    agent,
                    expected: self.team.obs_dim,
                    actual: obs.len(),
                });
            }
        }

        let n = observations.len() as i64;
        let flat: Vec<f32> = observations.iter().flatten().copied().collect();
        let obs = Tensor::from_slice(&flat)
            .reshape([n, self.team.obs_dim as i64])
            .to_device(self.device);

        let actions = tch::no_grad(|| {
            let logits = self.actor.forward(&obs);
            match mode {
                ExplorationMode::Train => self.sample_action(&logits),
                ExplorationMode::Test => greedy_action(&logits, self.action_type),
            }
        });

        let flat: Vec<f32> = Vec::<f32>::try_from(actions.to_device(Device::Cpu).flatten(0, -1))?;
        Ok(flat
            .chunks(self.team.action_dim)
            .map(|c| c.to_vec())
            .collect())
    }

    /// Exploratory action from logits (no gradient path).
    fn sample_action(&self, logits: &Tensor) -> Tensor {
        match self.action_type {
            ActionType::Discrete => one_hot_argmax(&gumbel_softmax(logits, false)),
            ActionType::Continuous => {
                let mean = logits.sigmoid();
                let noise = mean.randn_like() * self.config.exploration_noise;
                (mean + noise).clamp(0.0, 1.0)
            }
        }
    }

    /// Differentiable action from logits, used for the actor loss.
    fn relaxed_action(&self, logits: &Tensor) -> Tensor {
        match self.action_type {
            ActionType::Discrete => gumbel_softmax(logits, true),
            ActionType::Continuous => logits.sigmoid(),
        }
    }

    /// Applies an actor to a `[B, n, obs]` batch, returning `[B, n, act]` logits.
    fn batched_logits(actor: &ActorNetwork, obs: &Tensor) -> Tensor {
        let size = obs.size();
        let (b, n) = (size[0], size[1]);
        actor
            .forward(&obs.reshape([b * n, size[2]]))
            .reshape([b, n, actor.out_dim() as i64])
    }

    /// Builds critic inputs of shape `[B, k, in]`, where `k` is 1 when the
    /// critic sees the joint own team and the team size otherwise.
    fn critic_input(
        &self,
        obs: &Tensor,
        actions: &Tensor,
        opponent: Option<(&Tensor, &Tensor)>,
    ) -> Tensor {
        let b = obs.size()[0];
        let mut input = if self.inputs.model_own {
            Tensor::cat(&[obs.reshape([b, -1]), actions.reshape([b, -1])], 1).unsqueeze(1)
        } else {
            Tensor::cat(&[obs, actions], 2)
        };
        if let Some((opp_obs, opp_actions)) = opponent {
            let k = input.size()[1];
            let joint = Tensor::cat(&[opp_obs.reshape([b, -1]), opp_actions.reshape([b, -1])], 1)
                .unsqueeze(1)
                .expand([b, k, -1], false);
            input = Tensor::cat(&[input, joint], 2);
        }
        input
    }

    /// Q values of shape `[B, k]`.
    fn q_values(critic: &CriticNetwork, input: &Tensor) -> Tensor {
        let size = input.size();
        critic
            .forward(&input.reshape([size[0] * size[1], size[2]]))
            .reshape([size[0], size[1]])
    }

    /// Runs one optimization step on a batch drawn from `own_memory`.
    ///
    /// `opponent_memory` must have been written in lockstep with
    /// `own_memory`; it is read only when the critic models the opponent.
    /// Returns `None` while the own memory holds fewer than `batch_size`
    /// transitions.
    pub fn optimize<R: Rng + ?Sized>(
        &mut self,
        own_memory: &ReplayBuffer,
        opponent_memory: &ReplayBuffer,
        rng: &mut R,
    ) -> Result<Option<Losses>, TrainerError> {
        if own_memory.len() < self.config.batch_size {
            return Ok(None);
        }
        if self.opponent_model.is_some() && own_memory.len() != opponent_memory.len() {
            return Err(TrainerError::MisalignedMemories {
                own: own_memory.len(),
                opponent: opponent_memory.len(),
            });
        }

        let indices = own_memory.sample_indices(self.config.batch_size, rng);
        let own = Batch::from_transitions(&own_memory.gather(&indices), &self.team, self.device);
        let (opp, opponent_loss) = match self.opponent_model.as_mut() {
            Some(model) => {
                let batch = Batch::from_transitions(
                    &opponent_memory.gather(&indices),
                    &self.opponent,
                    self.device,
                );
                let loss = model.fit(&batch, self.action_type, &self.config);
                let next_actions = model.predict(&batch.next_obs, self.action_type);
                (
                    Some(OpponentBatch {
                        batch,
                        next_actions,
                    }),
                    Some(loss),
                )
            }
            None => (None, None),
        };
        let critic_loss = self.update_critic(&own, opp.as_ref());
        let actor_loss = self.update_actor(&own, opp.as_ref());

        self.target_actor.soft_update_from(&self.actor, self.config.tau);
        self.target_critic.soft_update_from(&self.critic, self.config.tau);
        self.updates += 1;

        let losses = Losses {
            critic: critic_loss,
            actor: actor_loss,
            opponent_model: opponent_loss,
        };
        debug!(
            "[{} trainer] update {}: critic={:.4} actor={:.4} opponent={:?}",
            self.side, self.updates, losses.critic, losses.actor, losses.opponent_model
        );
        Ok(Some(losses))
    }

    /// Bootstrapped targets `r + gamma (1 - done) Q'(s', pi'(s'))` of shape `[B, k]`.
    fn critic_target(&self, own: &Batch, opp: Option<&OpponentBatch>) -> Tensor {
        tch::no_grad(|| {
            let next_logits = Self::batched_logits(&self.target_actor, &own.next_obs);
            let next_actions = self.sample_action(&next_logits);
            let input = self.critic_input(
                &own.next_obs,
                &next_actions,
                opp.map(|o| (&o.batch.next_obs, &o.next_actions)),
            );
            let next_q = Self::q_values(&self.target_critic, &input);
            let not_done = (1.0_f64 - own.dones.shallow_clone()).unsqueeze(1);
            own.rewards.unsqueeze(1) + next_q * not_done * self.config.gamma
        })
    }

    fn update_critic(&mut self, own: &Batch, opp: Option<&OpponentBatch>) -> f64 {
        let target = self.critic_target(own, opp);
        let input = self.critic_input(
            &own.obs,
            &own.actions,
            opp.map(|o| (&o.batch.obs, &o.batch.actions)),
        );
        let q = Self::q_values(&self.critic, &input);
        let loss = q.mse_loss(&target, tch::Reduction::Mean);
        self.critic_opt.backward_step_clip_norm(&loss, self.config.grad_clip);
        loss.double_value(&[])
    }

    fn update_actor(&mut self, own: &Batch, opp: Option<&OpponentBatch>) -> f64 {
        let logits = Self::batched_logits(&self.actor, &own.obs);
        let actions = self.relaxed_action(&logits);
        let input = self.critic_input(
            &own.obs,
            &actions,
            opp.map(|o| (&o.batch.obs, &o.batch.actions)),
        );
        let q = Self::q_values(&self.critic, &input);
        let regularization = logits.pow_tensor_scalar(2).mean(Kind::Float);
        let loss = -q.mean(Kind::Float) + regularization * self.config.policy_regularization;
        self.actor_opt.backward_step_clip_norm(&loss, self.config.grad_clip);
        loss.double_value(&[])
    }

    /// Saves the trainer's networks under `dir` with the given file prefix.
    pub fn save_models(&self, dir: &Path, prefix: &str) -> Result<(), TrainerError> {
        std::fs::create_dir_all(dir)?;
        self.actor.save(&dir.join(format!("{}_actor.ot", prefix)))?;
        self.critic.save(&dir.join(format!("{}_critic.ot", prefix)))?;
        if let Some(model) = &self.opponent_model {
            model.policy.save(&dir.join(format!("{}_opponent.ot", prefix)))?;
        }
        Ok(())
    }

    /// Restores networks saved by [`Trainer::save_models`] and syncs the
    /// target networks.
    pub fn load_models(&mut self, dir: &Path, prefix: &str) -> Result<(), TrainerError> {
        self.actor.load(&dir.join(format!("{}_actor.ot", prefix)))?;
        self.critic.load(&dir.join(format!("{}_critic.ot", prefix)))?;
        if let Some(model) = self.opponent_model.as_mut() {
            model.policy.load(&dir.join(format!("{}_opponent.ot", prefix)))?;
        }
        self.target_actor.hard_update_from(&self.actor)?;
        self.target_critic.hard_update_from(&self.critic)?;
        Ok(())
    }
}

/// Deterministic action from logits.
fn greedy_action(logits: &Tensor, action_type: ActionType) -> Tensor {
    match action_type {
        ActionType::Discrete => one_hot_argmax(logits),
        ActionType::Continuous => logits.sigmoid(),
    }
}

/// One-hot encoding of the argmax over the last dimension.
fn one_hot_argmax(logits: &Tensor) -> Tensor {
    let n_classes = *logits.size().last().unwrap_or(&1);
    logits
        .argmax(-1, false)
        .one_hot(n_classes)
        .to_kind(Kind::Float)
}

/// Gumbel-softmax sample over the last dimension.
///
/// With `hard`, the forward value is one-hot while gradients flow through
/// the soft sample (straight-through estimator).
fn gumbel_softmax(logits: &Tensor, hard: bool) -> Tensor {
    let uniform = logits.rand_like();
    let gumbel = -(-(uniform + 1e-20).log() + 1e-20).log();
    let soft = (logits + gumbel).softmax(-1, Kind::Float);
    if hard {
        let one_hot = one_hot_argmax(&soft);
        (one_hot - &soft).detach() + soft
    } else {
        soft
    }
}
