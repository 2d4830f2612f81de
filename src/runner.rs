//! The competitive experience-collection and training loop.
//!
//! Each environment step:
//! 1. both trainers pick actions for their own team's observations,
//! 2. the joint action is stepped through the environment,
//! 3. observations and rewards are split by team and each team's
//!    transition is written to its replay memory,
//! 4. on the update cadence, both trainers run one optimization step.
//!
//! Episode reward statistics are checkpointed on a fixed episode window and
//! the full history is written when the run ends.

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use log::info;
use rand::Rng;
use tch::Device;

use crate::config::ExperimentConfig;
use crate::environment::MultiAgentEnv;
use crate::error::RunError;
use crate::history::History;
use crate::team::{team_reward, Side, TeamLayout};
use crate::training::{
    ActionType, CriticInputs, ExplorationMode, Losses, ReplayBuffer, TeamSpec, Trainer,
};

/// Options for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: ExperimentConfig,
    /// Scenario name, used in output file names.
    pub scenario_name: String,
    /// Run counter, used in output file names.
    pub cnt: u64,
    /// Train (explore and learn) when true; evaluate greedily otherwise.
    pub flag_train: bool,
    /// Pause between rendered frames in display mode.
    pub render_delay: Duration,
}

impl RunOptions {
    pub fn new(config: ExperimentConfig, scenario_name: impl Into<String>) -> Self {
        Self {
            config,
            scenario_name: scenario_name.into(),
            cnt: 0,
            flag_train: true,
            render_delay: Duration::from_millis(100),
        }
    }

    /// Path of the history file written at the end of the run.
    pub fn history_path(&self) -> PathBuf {
        let prefix = if self.flag_train {
            "history"
        } else {
            "test_history"
        };
        self.config.model_dir.join(format!(
            "{}_{}_{}.json",
            prefix, self.scenario_name, self.cnt
        ))
    }

    /// File prefix of the final model weights of `side`.
    pub fn model_prefix(&self, side: Side) -> String {
        format!("{}{}_fin_{}", self.scenario_name, side.tag(), self.cnt)
    }
}

/// Outcome of a finished run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub history: History,
    pub history_path: Option<PathBuf>,
    /// Environment steps taken.
    pub train_steps: u64,
    pub own_updates: u64,
    pub adv_updates: u64,
    pub last_own_losses: Option<Losses>,
    pub last_adv_losses: Option<Losses>,
}

/// Team shape of `side` as seen through the environment.
pub fn team_spec(
    env: &dyn MultiAgentEnv,
    layout: &TeamLayout,
    side: Side,
) -> Result<TeamSpec, RunError> {
    let all_dims = env.observation_dims();
    let dims: Vec<usize> = layout.indices(side).iter().map(|&i| all_dims[i]).collect();
    let obs_dim = *dims.first().ok_or(RunError::EmptyTeam(side))?;
    if dims.iter().any(|&d| d != obs_dim) {
        return Err(RunError::MixedObservationDims { side, dims });
    }
    Ok(TeamSpec {
        n_agents: dims.len(),
        obs_dim,
        action_dim: env.action_dim(),
    })
}

/// Builds the trainer for `side` of `env`.
pub fn build_trainer(
    env: &dyn MultiAgentEnv,
    side: Side,
    inputs: CriticInputs,
    action_type: ActionType,
    config: &ExperimentConfig,
    device: Device,
) -> Result<Trainer, RunError> {
    let layout = TeamLayout::from_agents(env.agents());
    let team = team_spec(env, &layout, side)?;
    let opponent = team_spec(env, &layout, side.opponent())?;
    Ok(Trainer::new(
        side,
        team,
        opponent,
        inputs,
        action_type,
        config.trainer_config(),
        device,
    )?)
}

/// Runs the competitive loop until more than `num_episodes` episodes have
/// started.
pub fn run<R: Rng + ?Sized>(
    env: &mut dyn MultiAgentEnv,
    learner_own: &mut Trainer,
    learner_adv: &mut Trainer,
    options: &RunOptions,
    rng: &mut R,
) -> Result<RunSummary, RunError> {
    options.config.validate()?;
    let mut memory_own = ReplayBuffer::new(options.config.buffer_size);
    let mut memory_adv = ReplayBuffer::new(options.config.buffer_size);
    run_with_memories(
        env,
        learner_own,
        learner_adv,
        &mut memory_own,
        &mut memory_adv,
        options,
        rng,
    )
}

/// Like [`run`], but records transitions into caller-owned memories.
///
/// The memories must be written in lockstep; pass two empty buffers or the
/// pair left behind by an earlier run.
pub fn run_with_memories<R: Rng + ?Sized>(
    env: &mut dyn MultiAgentEnv,
    learner_own: &mut Trainer,
    learner_adv: &mut Trainer,
    memory_own: &mut ReplayBuffer,
    memory_adv: &mut ReplayBuffer,
    options: &RunOptions,
    rng: &mut R,
) -> Result<RunSummary, RunError> {
    let cfg = &options.config;
    cfg.validate()?;
    let mode = if options.flag_train {
        ExplorationMode::Train
    } else {
        ExplorationMode::Test
    };
    let window = if options.flag_train {
        cfg.save_rate
    } else {
        cfg.test_window
    };

    let layout = TeamLayout::from_agents(env.agents());
    info!("observation dims: {:?}", env.observation_dims());
    info!("action dim: {}", env.action_dim());

    let mut history = History::new(
        crate::generate_id(),
        options.scenario_name.clone(),
        layout.n_agents(),
    );
    let (mut obs_own, mut obs_adv) = layout.split(&env.reset());
    let mut episode_step = 0usize;
    let mut train_step = 0u64;
    let mut last_own_losses = None;
    let mut last_adv_losses = None;
    let mut t_start = Instant::now();

    info!("Starting iterations...");
    let history_path = loop {
        let action_own = learner_own.exploration_action(&obs_own, mode)?;
        let action_adv = learner_adv.exploration_action(&obs_adv, mode)?;

        let actions = layout.combine(&action_own, &action_adv);
        let step = env.step(&actions)?;
        let (new_obs_own, new_obs_adv) = layout.split(&step.observations);
        let (rew_own, rew_adv) = layout.split(&step.rewards);

        episode_step += 1;
        let done = step.dones.iter().all(|&d| d);
        let terminal = episode_step >= cfg.max_episode_len;
        let done_flag = if done { 1.0 } else { 0.0 };

        memory_own.add(
            obs_own,
            action_own,
            team_reward(&rew_own),
            new_obs_own.clone(),
            done_flag,
        );
        memory_adv.add(
            obs_adv,
            action_adv,
            team_reward(&rew_adv),
            new_obs_adv.clone(),
            done_flag,
        );
        obs_own = new_obs_own;
        obs_adv = new_obs_adv;
        history.record_step(&step.rewards);

        if done || terminal {
            (obs_own, obs_adv) = layout.split(&env.reset());
            episode_step = 0;
            history.start_episode();
        }

        train_step += 1;

        if cfg.display {
            thread::sleep(options.render_delay);
            info!("step {}\n{}", train_step, env.render());
            if history.episodes() > cfg.num_episodes {
                break None;
            }
            continue;
        }

        let do_learn = train_step > cfg.warmup_steps as u64
            && train_step % cfg.update_rate as u64 == 0
            && cfg.is_training;
        if options.flag_train && do_learn {
            if let Some(losses) = learner_own.optimize(memory_own, memory_adv, rng)? {
                last_own_losses = Some(losses);
            }
            if let Some(losses) = learner_adv.optimize(memory_adv, memory_own, rng)? {
                last_adv_losses = Some(losses);
            }
        }

        if terminal && history.episodes() % window == 0 {
            let mean = history.checkpoint(window);
            info!(
                "steps: {}, episodes: {}, mean episode reward: {}, time: {:.3}",
                train_step,
                history.episodes(),
                mean,
                t_start.elapsed().as_secs_f64()
            );
            t_start = Instant::now();
        }

        if history.episodes() > cfg.num_episodes {
            let path = options.history_path();
            history.save(&path)?;
            info!("...Finished total of {} episodes.", history.episodes());
            if options.flag_train {
                learner_own.save_models(&cfg.model_dir, &options.model_prefix(Side::Own))?;
                learner_adv.save_models(&cfg.model_dir, &options.model_prefix(Side::Adversary))?;
            }
            break Some(path);
        }
    };

    Ok(RunSummary {
        history,
        history_path,
        train_steps: train_step,
        own_updates: learner_own.updates(),
        adv_updates: learner_adv.updates(),
        last_own_losses,
        last_adv_losses,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{AgentInfo, EnvError, EnvStep, SimpleAdversary};
    use crate::team::{Action, Observation};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Two agents whose episodes report done after a fixed number of steps.
    struct ScriptedEnv {
        agents: Vec<AgentInfo>,
        done_at: usize,
        step: usize,
        resets: usize,
    }

    impl ScriptedEnv {
        fn new(done_at: usize) -> Self {
            let agents = vec![
                AgentInfo {
                    name: "chaser".into(),
                    adversary: true,
                },
                AgentInfo {
                    name: "runner".into(),
                    adversary: false,
                },
            ];
            Self {
                agents,
                done_at,
                step: 0,
                resets: 0,
            }
        }

        fn observations(&self) -> Vec<Observation> {
            vec![vec![self.step as f32; 3]; 2]
        }
    }

    impl MultiAgentEnv for ScriptedEnv {
        fn agents(&self) -> &[AgentInfo] {
            &self.agents
        }

        fn observation_dims(&self) -> Vec<usize> {
            vec![3, 3]
        }

        fn action_dim(&self) -> usize {
            5
        }

        fn seed(&mut self, _seed: u64) {}

        fn reset(&mut self) -> Vec<Observation> {
            self.step = 0;
            self.resets += 1;
            self.observations()
        }

        fn step(&mut self, actions: &[Action]) -> Result<EnvStep, EnvError> {
            if actions.len() != self.agents.len() {
                return Err(EnvError::ActionCount {
                    expected: self.agents.len(),
                    actual: actions.len(),
                });
            }
            self.step += 1;
            let done = self.step == self.done_at;
            Ok(EnvStep {
                observations: self.observations(),
                rewards: vec![-1.0, 2.0],
                dones: vec![done; 2],
            })
        }

        fn render(&self) -> String {
            format!("step {}", self.step)
        }
    }

    fn small_config(model_dir: PathBuf) -> ExperimentConfig {
        ExperimentConfig {
            max_episode_len: 5,
            num_episodes: 6,
            warmup_steps: 10,
            update_rate: 5,
            save_rate: 2,
            test_window: 2,
            batch_size: 8,
            hidden_units: 16,
            buffer_size: 1000,
            model_dir,
            ..ExperimentConfig::default()
        }
    }

    fn trainers(env: &dyn MultiAgentEnv, config: &ExperimentConfig) -> (Trainer, Trainer) {
        let inputs = CriticInputs {
            model_own: true,
            model_adv: true,
        };
        let own = build_trainer(
            env,
            Side::Own,
            inputs,
            ActionType::Discrete,
            config,
            Device::Cpu,
        )
        .unwrap();
        let adv = build_trainer(
            env,
            Side::Adversary,
            inputs,
            ActionType::Discrete,
            config,
            Device::Cpu,
        )
        .unwrap();
        (own, adv)
    }

    #[test]
    fn team_specs_for_simple_adversary() {
        let env = SimpleAdversary::new(2, true);
        let layout = TeamLayout::from_agents(env.agents());
        let own = team_spec(&env, &layout, Side::Own).unwrap();
        let adv = team_spec(&env, &layout, Side::Adversary).unwrap();
        assert_eq!(
            own,
            TeamSpec {
                n_agents: 2,
                obs_dim: 10,
                action_dim: 5
            }
        );
        assert_eq!(
            adv,
            TeamSpec {
                n_agents: 1,
                obs_dim: 8,
                action_dim: 5
            }
        );
    }

    #[test]
    fn file_names() {
        let mut options = RunOptions::new(ExperimentConfig::default(), "simple_adversary");
        options.cnt = 3;
        assert_eq!(
            options.history_path(),
            PathBuf::from("Models/history_simple_adversary_3.json")
        );
        assert_eq!(options.model_prefix(Side::Own), "simple_adversaryown_fin_3");
        assert_eq!(options.model_prefix(Side::Adversary), "simple_adversaryadv_fin_3");
        options.flag_train = false;
        assert_eq!(
            options.history_path(),
            PathBuf::from("Models/test_history_simple_adversary_3.json")
        );
    }

    #[test]
    fn training_run_learns_checkpoints_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_config(dir.path().to_path_buf());
        let mut env = SimpleAdversary::new(2, true);
        env.seed(5);
        let (mut own, mut adv) = trainers(&env, &config);
        let options = RunOptions::new(config, "simple_adversary");
        let mut rng = StdRng::seed_from_u64(5);

        let summary = run(&mut env, &mut own, &mut adv, &options, &mut rng).unwrap();

        // Episodes end every 5 steps; the run stops when the 7th starts.
        assert_eq!(summary.train_steps, 30);
        assert_eq!(summary.history.episodes(), 7);
        assert_eq!(summary.history.reward_episodes_by_agents.len(), 3);
        // Updates at steps 15, 20, 25, 30.
        assert_eq!(summary.own_updates, 4);
        assert_eq!(summary.adv_updates, 4);
        assert!(summary.last_own_losses.is_some());
        // Checkpoints when episodes 2, 4, 6 start.
        assert_eq!(summary.history.final_ep_rewards.len(), 3);
        assert_eq!(summary.history.final_ep_ag_rewards.len(), 9);

        let path = summary.history_path.unwrap();
        assert_eq!(path, dir.path().join("history_simple_adversary_0.json"));
        let saved = History::load(&path).unwrap();
        assert_eq!(saved.run_id, summary.history.run_id);
        assert_eq!(saved.episodes(), 7);
        assert_eq!(saved.final_ep_rewards.len(), 3);
        assert!(dir
            .path()
            .join("simple_adversaryown_fin_0_actor.ot")
            .exists());
        assert!(dir
            .path()
            .join("simple_adversaryadv_fin_0_critic.ot")
            .exists());
    }

    #[test]
    fn done_ends_episodes_before_the_step_limit() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExperimentConfig {
            num_episodes: 3,
            warmup_steps: 1000,
            save_rate: 1,
            ..small_config(dir.path().to_path_buf())
        };
        let mut env = ScriptedEnv::new(3);
        let (mut own, mut adv) = trainers(&env, &config);
        let options = RunOptions::new(config, "scripted");
        let mut memory_own = ReplayBuffer::new(100);
        let mut memory_adv = ReplayBuffer::new(100);
        let mut rng = StdRng::seed_from_u64(0);

        let summary = run_with_memories(
            &mut env,
            &mut own,
            &mut adv,
            &mut memory_own,
            &mut memory_adv,
            &options,
            &mut rng,
        )
        .unwrap();

        // Each episode is cut at step 3 of 5; the 4th starts after step 9.
        assert_eq!(summary.train_steps, 9);
        assert_eq!(env.resets, 4);
        assert_eq!(summary.history.reward_episodes, vec![3.0, 3.0, 3.0, 0.0]);
        // Statistics are only checkpointed when the step limit is reached.
        assert!(summary.history.final_ep_rewards.is_empty());

        for memory in [&memory_own, &memory_adv] {
            assert_eq!(memory.len(), 9);
            let dones: Vec<f32> = (0..9).map(|i| memory.get(i).unwrap().done).collect();
            assert_eq!(dones, vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0]);
        }
        assert_eq!(memory_own.get(2).unwrap().reward, 2.0);
        assert_eq!(memory_adv.get(2).unwrap().reward, -1.0);
    }

    #[test]
    fn test_run_never_updates_or_saves_models() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_config(dir.path().to_path_buf());
        let mut env = SimpleAdversary::new(2, true);
        let (mut own, mut adv) = trainers(&env, &config);
        let mut options = RunOptions::new(config, "simple_adversary");
        options.flag_train = false;
        let mut rng = StdRng::seed_from_u64(0);

        let summary = run(&mut env, &mut own, &mut adv, &options, &mut rng).unwrap();

        assert_eq!(summary.own_updates, 0);
        assert_eq!(summary.adv_updates, 0);
        assert_eq!(
            summary.history_path.unwrap(),
            dir.path().join("test_history_simple_adversary_0.json")
        );
        assert!(!dir
            .path()
            .join("simple_adversaryown_fin_0_actor.ot")
            .exists());
    }

    #[test]
    fn learning_switch_disables_updates() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExperimentConfig {
            is_training: false,
            ..small_config(dir.path().to_path_buf())
        };
        let mut env = SimpleAdversary::new(2, true);
        let (mut own, mut adv) = trainers(&env, &config);
        let options = RunOptions::new(config, "simple_adversary");
        let mut rng = StdRng::seed_from_u64(0);

        let summary = run(&mut env, &mut own, &mut adv, &options, &mut rng).unwrap();
        assert_eq!(summary.own_updates, 0);
        assert!(summary.last_own_losses.is_none());
    }

    #[test]
    fn display_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExperimentConfig {
            display: true,
            num_episodes: 1,
            ..small_config(dir.path().join("out"))
        };
        let mut env = SimpleAdversary::new(2, true);
        let (mut own, mut adv) = trainers(&env, &config);
        let mut options = RunOptions::new(config, "simple_adversary");
        options.render_delay = Duration::ZERO;
        let mut rng = StdRng::seed_from_u64(0);

        let summary = run(&mut env, &mut own, &mut adv, &options, &mut rng).unwrap();
        assert_eq!(summary.train_steps, 5);
        assert!(summary.history_path.is_none());
        assert_eq!(summary.own_updates, 0);
        assert!(!dir.path().join("out").exists());
    }
}
