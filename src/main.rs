use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tch::Device;

use rivals::{
    build_trainer, make_env, run, ActionType, CriticInputs, ExperimentConfig, RunOptions, Side,
};

/// Train an own team against an adversary team.
#[derive(Parser)]
#[command(name = "rivals", about = "Competitive two-team actor-critic training")]
struct Cli {
    /// Scenario to run
    #[arg(long, default_value = "simple_adversary")]
    scenario: String,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Evaluate greedily instead of training
    #[arg(long)]
    test_only: bool,

    /// Override number of episodes
    #[arg(long)]
    episodes: Option<usize>,

    /// Run counter; also selects the seed
    #[arg(long, default_value_t = 0)]
    cnt: u64,

    /// Render every step instead of learning
    #[arg(long)]
    display: bool,

    /// Load this scenario's final models before running
    #[arg(long)]
    load_models: bool,

    /// Use continuous instead of one-hot actions
    #[arg(long)]
    continuous: bool,

    /// Critic sees only each agent's own observation and action
    #[arg(long)]
    no_model_own: bool,

    /// Critic ignores the opponent team
    #[arg(long)]
    no_model_adv: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ExperimentConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ExperimentConfig::default(),
    };
    config.num_episodes = match (cli.episodes, cli.test_only) {
        (Some(episodes), _) => episodes,
        (None, true) => 100,
        (None, false) => config.num_episodes,
    };
    config.display |= cli.display;
    config.validate().context("validating config")?;

    let seed = cli.cnt + 12_345_678;
    let device = Device::cuda_if_available();
    tch::manual_seed(seed as i64);
    if device.is_cuda() {
        tch::Cuda::manual_seed_all(seed);
    }
    let mut rng = StdRng::seed_from_u64(seed);

    let action_type = if cli.continuous {
        ActionType::Continuous
    } else {
        ActionType::Discrete
    };
    let mut env = make_env(&cli.scenario, action_type == ActionType::Discrete)
        .with_context(|| format!("creating scenario '{}'", cli.scenario))?;
    env.seed(seed);

    let inputs = CriticInputs {
        model_own: !cli.no_model_own,
        model_adv: !cli.no_model_adv,
    };
    let mut learner_own =
        build_trainer(env.as_ref(), Side::Own, inputs, action_type, &config, device)
            .context("building own trainer")?;
    let mut learner_adv =
        build_trainer(env.as_ref(), Side::Adversary, inputs, action_type, &config, device)
            .context("building adversary trainer")?;

    let options = RunOptions {
        cnt: cli.cnt,
        flag_train: !cli.test_only,
        ..RunOptions::new(config, cli.scenario.clone())
    };

    if cli.load_models {
        let dir = &options.config.model_dir;
        learner_own
            .load_models(dir, &options.model_prefix(Side::Own))
            .context("loading own models")?;
        learner_adv
            .load_models(dir, &options.model_prefix(Side::Adversary))
            .context("loading adversary models")?;
        info!("Loaded models from {}", dir.display());
    }

    let summary = run(
        env.as_mut(),
        &mut learner_own,
        &mut learner_adv,
        &options,
        &mut rng,
    )
    .context("running")?;

    if let Some(path) = &summary.history_path {
        info!("History written to {}", path.display());
    }
    info!(
        "{} steps, {} own updates, {} adversary updates",
        summary.train_steps, summary.own_updates, summary.adv_updates
    );
    Ok(())
}
