//! Team bookkeeping for competitive environments.
//!
//! Every environment agent belongs either to the own team or to the
//! adversary team. [`TeamLayout`] records which environment slots belong to
//! which side so that per-agent vectors (observations, rewards, actions) can
//! be split into team-local vectors and recombined in environment order.

use std::fmt;

use crate::environment::AgentInfo;

/// A per-agent observation vector.
pub type Observation = Vec<f32>;

/// A per-agent action vector (one-hot for discrete actions).
pub type Action = Vec<f32>;

/// Which side of the competition an agent plays on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Own,
    Adversary,
}

impl Side {
    /// Returns the opposing side.
    pub fn opponent(&self) -> Side {
        match self {
            Side::Own => Side::Adversary,
            Side::Adversary => Side::Own,
        }
    }

    /// Short tag used in model file names.
    pub fn tag(&self) -> &'static str {
        match self {
            Side::Own => "own",
            Side::Adversary => "adv",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Own => write!(f, "own"),
            Side::Adversary => write!(f, "adversary"),
        }
    }
}

/// Environment slot indices of each team, in environment order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamLayout {
    own: Vec<usize>,
    adversary: Vec<usize>,
}

impl TeamLayout {
    /// Builds the layout from the environment's agent list.
    pub fn from_agents(agents: &[AgentInfo]) -> Self {
        let mut own = Vec::new();
        let mut adversary = Vec::new();
        for (i, agent) in agents.iter().enumerate() {
            if agent.adversary {
                adversary.push(i);
            } else {
                own.push(i);
            }
        }
        Self { own, adversary }
    }

    /// Total number of environment agents.
    pub fn n_agents(&self) -> usize {
        self.own.len() + self.adversary.len()
    }

    /// Number of agents on the given side.
    pub fn team_size(&self, side: Side) -> usize {
        self.indices(side).len()
    }

    /// Environment slot indices of the given side.
    pub fn indices(&self, side: Side) -> &[usize] {
        match side {
            Side::Own => &self.own,
            Side::Adversary => &self.adversary,
        }
    }

    /// Splits a per-agent slice into `(own, adversary)` vectors.
    ///
    /// Order within each team follows environment order.
    ///
    /// # Panics
    ///
    /// Panics if `values.len()` differs from the number of agents.
    pub fn split<T: Clone>(&self, values: &[T]) -> (Vec<T>, Vec<T>) {
        assert_eq!(
            values.len(),
            self.n_agents(),
            "Per-agent vector length must match number of agents"
        );
        let own = self.own.iter().map(|&i| values[i].clone()).collect();
        let adv = self.adversary.iter().map(|&i| values[i].clone()).collect();
        (own, adv)
    }

    /// Recombines team vectors into a single per-agent vector in
    /// environment order. Inverse of [`TeamLayout::split`].
    ///
    /// # Panics
    ///
    /// Panics if either team vector has the wrong length.
    pub fn combine<T: Clone>(&self, own: &[T], adversary: &[T]) -> Vec<T> {
        assert_eq!(own.len(), self.own.len(), "Own team vector has wrong length");
        assert_eq!(
            adversary.len(),
            self.adversary.len(),
            "Adversary team vector has wrong length"
        );
        let mut slots: Vec<Option<T>> = vec![None; self.n_agents()];
        for (value, &i) in own.iter().zip(&self.own) {
            slots[i] = Some(value.clone());
        }
        for (value, &i) in adversary.iter().zip(&self.adversary) {
            slots[i] = Some(value.clone());
        }
        slots.into_iter().flatten().collect()
    }
}

/// Shared team reward: the sum of the team's per-agent rewards.
pub fn team_reward(rewards: &[f32]) -> f32 {
    rewards.iter().sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agents(flags: &[bool]) -> Vec<AgentInfo> {
        flags
            .iter()
            .enumerate()
            .map(|(i, &adversary)| AgentInfo {
                name: format!("agent {}", i),
                adversary,
            })
            .collect()
    }

    #[test]
    fn split_preserves_order_within_team() {
        let layout = TeamLayout::from_agents(&agents(&[true, false, false]));
        let (own, adv) = layout.split(&["a0", "g1", "g2"]);
        assert_eq!(own, vec!["g1", "g2"]);
        assert_eq!(adv, vec!["a0"]);
    }

    #[test]
    fn combine_puts_adversaries_first_when_they_lead() {
        let layout = TeamLayout::from_agents(&agents(&[true, false, false]));
        let combined = layout.combine(&[1, 2], &[0]);
        assert_eq!(combined, vec![0, 1, 2]);
    }

    #[test]
    fn combine_inverts_split_for_interleaved_layout() {
        let layout = TeamLayout::from_agents(&agents(&[false, true, false, true]));
        let values = vec![10, 11, 12, 13];
        let (own, adv) = layout.split(&values);
        assert_eq!(own, vec![10, 12]);
        assert_eq!(adv, vec![11, 13]);
        assert_eq!(layout.combine(&own, &adv), values);
    }

    #[test]
    fn team_sizes() {
        let layout = TeamLayout::from_agents(&agents(&[true, false, false]));
        assert_eq!(layout.team_size(Side::Own), 2);
        assert_eq!(layout.team_size(Side::Adversary), 1);
        assert_eq!(layout.n_agents(), 3);
    }

    #[test]
    #[should_panic(expected = "must match number of agents")]
    fn split_rejects_wrong_length() {
        let layout = TeamLayout::from_agents(&agents(&[true, false]));
        layout.split(&[1, 2, 3]);
    }

    #[test]
    fn team_reward_sums() {
        assert!((team_reward(&[1.0, -0.5, 2.0]) - 2.5).abs() < 1e-6);
        assert_eq!(team_reward(&[]), 0.0);
    }

    #[test]
    fn opponent_side() {
        assert_eq!(Side::Own.opponent(), Side::Adversary);
        assert_eq!(Side::Adversary.opponent(), Side::Own);
        assert_eq!(Side::Adversary.tag(), "adv");
    }
}
