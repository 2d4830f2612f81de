//! The `simple_adversary` scenario.
//!
//! One adversary and `n` good agents share a field with `n` landmarks, one
//! of which is the goal. Good agents know which landmark is the goal and are
//! rewarded for covering it while keeping the adversary away from it. The
//! adversary does not see the goal and must infer it from the good agents'
//! behaviour.

use std::fmt::Write as _;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::particle::{Vec2, World};
use super::{AgentInfo, EnvError, EnvStep, MultiAgentEnv};
use crate::team::{Action, Observation};

/// The `simple_adversary` environment.
#[derive(Debug)]
pub struct SimpleAdversary {
    world: World,
    agents: Vec<AgentInfo>,
    n_good: usize,
    goal: usize,
    discrete_action: bool,
    rng: StdRng,
}

impl SimpleAdversary {
    /// Number of adversaries in this scenario.
    pub const N_ADVERSARIES: usize = 1;

    /// Creates the scenario with `n_good` good agents and as many landmarks.
    pub fn new(n_good: usize, discrete_action: bool) -> Self {
        let n_agents = Self::N_ADVERSARIES + n_good;
        let agents = (0..n_agents)
            .map(|i| {
                let adversary = i < Self::N_ADVERSARIES;
                AgentInfo {
                    name: format!("agent {}", i),
                    adversary,
                }
            })
            .collect();
        let mut env = Self {
            world: World::new(n_agents, n_good),
            agents,
            n_good,
            goal: 0,
            discrete_action,
            rng: StdRng::seed_from_u64(0),
        };
        env.reset();
        env
    }

    fn goal_position(&self) -> Vec2 {
        self.world.landmarks[self.goal]
    }

    fn observation(&self, agent: usize) -> Observation {
        let me = self.world.bodies[agent].position;
        let mut obs = Vec::new();
        if !self.agents[agent].adversary {
            let goal = self.goal_position() - me;
            obs.extend([goal.x, goal.y]);
        }
        for landmark in &self.world.landmarks {
            let rel = *landmark - me;
            obs.extend([rel.x, rel.y]);
        }
        for (j, body) in self.world.bodies.iter().enumerate() {
            if j == agent {
                continue;
            }
            let rel = body.position - me;
            obs.extend([rel.x, rel.y]);
        }
        obs
    }

    fn observations(&self) -> Vec<Observation> {
        (0..self.agents.len()).map(|i| self.observation(i)).collect()
    }

    fn distance_to_goal(&self, agent: usize) -> f32 {
        self.world.bodies[agent]
            .position
            .distance_to(&self.goal_position())
    }

    fn reward(&self, agent: usize) -> f32 {
        if self.agents[agent].adversary {
            return -self.distance_to_goal(agent);
        }
        let adversary_distance: f32 = (0..self.agents.len())
            .filter(|&i| self.agents[i].adversary)
            .map(|i| self.distance_to_goal(i))
            .sum();
        let closest_good = (0..self.agents.len())
            .filter(|&i| !self.agents[i].adversary)
            .map(|i| self.distance_to_goal(i))
            .fold(f32::INFINITY, f32::min);
        adversary_distance - closest_good
    }
}

impl MultiAgentEnv for SimpleAdversary {
    fn agents(&self) -> &[AgentInfo] {
        &self.agents
    }

    fn observation_dims(&self) -> Vec<usize> {
        let n_landmarks = self.n_good;
        let n_others = self.agents.len() - 1;
        self.agents
            .iter()
            .map(|a| {
                let base = 2 * n_landmarks + 2 * n_others;
                if a.adversary {
                    base
                } else {
                    base + 2
                }
            })
            .collect()
    }

    fn action_dim(&self) -> usize {
        World::ACTION_DIM
    }

    fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn reset(&mut self) -> Vec<Observation> {
        self.goal = self.rng.gen_range(0..self.world.landmarks.len());
        for body in &mut self.world.bodies {
            body.position = Vec2::random(&mut self.rng, 1.0);
            body.velocity = Vec2::zero();
        }
        for landmark in &mut self.world.landmarks {
            *landmark = Vec2::random(&mut self.rng, 0.9);
        }
        self.observations()
    }

    fn step(&mut self, actions: &[Action]) -> Result<EnvStep, EnvError> {
        if actions.len() != self.agents.len() {
            return Err(EnvError::ActionCount {
                expected: self.agents.len(),
                actual: actions.len(),
            });
        }
        for (agent, action) in actions.iter().enumerate() {
            if action.len() != World::ACTION_DIM {
                return Err(EnvError::ActionWidth {
                    agent,
                    expected: World::ACTION_DIM,
                    actual: action.len(),
                });
            }
            if self.discrete_action && !is_one_hot(action) {
                return Err(EnvError::NotOneHot { agent });
            }
        }

        self.world.step(actions);

        let rewards = (0..self.agents.len()).map(|i| self.reward(i)).collect();
        Ok(EnvStep {
            observations: self.observations(),
            rewards,
            dones: vec![false; self.agents.len()],
        })
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for (i, (info, body)) in self.agents.iter().zip(&self.world.bodies).enumerate() {
            let role = if info.adversary { "adversary" } else { "good" };
            let _ = writeln!(
                out,
                "{:>9} {} at {} (goal distance {:.3})",
                role,
                i,
                body.position,
                self.distance_to_goal(i)
            );
        }
        for (j, landmark) in self.world.landmarks.iter().enumerate() {
            let marker = if j == self.goal { " <- goal" } else { "" };
            let _ = writeln!(out, " landmark {} at {}{}", j, landmark, marker);
        }
        out
    }
}

fn is_one_hot(action: &[f32]) -> bool {
    action.iter().all(|&x| x == 0.0 || x == 1.0)
        && action.iter().filter(|&&x| x == 1.0).count() == 1
}
