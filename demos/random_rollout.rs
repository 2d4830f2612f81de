// Demonstration: roll out uniformly random actions in a scenario and report
// per-team episode rewards.
//
// Build/run from this repo root:
//   cargo run --example random_rollout -- --episodes 5 --seed 42

use std::env;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rivals::team::team_reward;
use rivals::{make_env, TeamLayout};

fn main() {
    let args: Vec<String> = env::args().collect();
    let scenario = arg_value(&args, "--scenario").unwrap_or("simple_adversary");
    let episodes: usize = arg_value(&args, "--episodes")
        .and_then(|s| s.parse().ok())
        .unwrap_or(5);
    let seed: u64 = arg_value(&args, "--seed")
        .and_then(|s| s.parse().ok())
        .unwrap_or(42);
    let episode_len = 25;

    let mut env = match make_env(scenario, true) {
        Ok(env) => env,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };
    env.seed(seed);
    let mut rng = StdRng::seed_from_u64(seed);
    let layout = TeamLayout::from_agents(env.agents());
    let action_dim = env.action_dim();

    for episode in 0..episodes {
        env.reset();
        let (mut own_total, mut adv_total) = (0.0f32, 0.0f32);
        for _ in 0..episode_len {
            let actions: Vec<Vec<f32>> = (0..env.n_agents())
                .map(|_| {
                    let mut a = vec![0.0; action_dim];
                    a[rng.gen_range(0..action_dim)] = 1.0;
                    a
                })
                .collect();
            let step = match env.step(&actions) {
                Ok(step) => step,
                Err(e) => {
                    eprintln!("{}", e);
                    std::process::exit(1);
                }
            };
            let (own, adv) = layout.split(&step.rewards);
            own_total += team_reward(&own);
            adv_total += team_reward(&adv);
        }
        println!(
            "episode {}: own reward {:.3}, adversary reward {:.3}",
            episode, own_total, adv_total
        );
    }
    println!("{}", env.render());
}

fn arg_value<'a>(args: &'a [String], key: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == key)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}
