//! Per-team replay memory.
//!
//! Each team writes exactly one transition per environment step. Memories
//! created with the same capacity and written in lockstep therefore keep
//! the same step in the same slot, so a single index set drawn from one
//! memory selects aligned transitions from both.

use rand::seq::index;
use rand::Rng;

use crate::team::{Action, Observation};

/// A single team transition.
#[derive(Debug, Clone)]
pub struct Transition {
    /// Per-agent observations before the step.
    pub observations: Vec<Observation>,
    /// Per-agent actions taken.
    pub actions: Vec<Action>,
    /// Shared team reward.
    pub reward: f32,
    /// Per-agent observations after the step.
    pub next_observations: Vec<Observation>,
    /// 1.0 when every environment agent reported done, else 0.0.
    pub done: f32,
}

/// Fixed-capacity ring buffer of team transitions.
#[derive(Debug)]
pub struct ReplayBuffer {
    storage: Vec<Transition>,
    capacity: usize,
    next_slot: usize,
}

impl ReplayBuffer {
    /// Creates an empty buffer holding at most `capacity` transitions.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Replay capacity must be positive");
        Self {
            storage: Vec::new(),
            capacity,
            next_slot: 0,
        }
    }

    /// Stores a transition, overwriting the oldest one when full.
    pub fn add(
        &mut self,
        observations: Vec<Observation>,
        actions: Vec<Action>,
        reward: f32,
        next_observations: Vec<Observation>,
        done: f32,
    ) {
        let transition = Transition {
            observations,
            actions,
            reward,
            next_observations,
            done,
        };
        if self.storage.len() < self.capacity {
            self.storage.push(transition);
        } else {
            self.storage[self.next_slot] = transition;
        }
        self.next_slot = (self.next_slot + 1) % self.capacity;
    }

    /// Number of stored transitions.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Returns true if nothing has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Draws `batch_size` distinct slot indices uniformly at random.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `batch_size` transitions are stored.
    pub fn sample_indices<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Vec<usize> {
        assert!(batch_size <= self.len(), "Not enough transitions to sample");
        index::sample(rng, self.len(), batch_size).into_vec()
    }

    /// Returns the transitions stored at `indices`.
    pub fn gather(&self, indices: &[usize]) -> Vec<&Transition> {
        indices.iter().map(|&i| &self.storage[i]).collect()
    }

    /// Returns the transition in slot `index`, if any.
    pub fn get(&self, index: usize) -> Option<&Transition> {
        self.storage.get(index)
    }
}
