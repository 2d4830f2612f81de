//! Point-mass particle world.
//!
//! Agents are damped point masses driven by action forces; landmarks are
//! static. Integration follows a semi-implicit Euler step.

use std::fmt;
use std::ops::{Add, Mul, Sub};

use rand::Rng;

/// A 2D vector in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Euclidean norm.
    pub fn norm(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: &Vec2) -> f32 {
        (*self - *other).norm()
    }

    /// Uniform sample in `[-bound, bound]²`.
    pub fn random<R: Rng + ?Sized>(rng: &mut R, bound: f32) -> Self {
        Self::new(rng.gen_range(-bound..=bound), rng.gen_range(-bound..=bound))
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

impl fmt::Display for Vec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:+.2}, {:+.2})", self.x, self.y)
    }
}

/// A moving agent body.
#[derive(Debug, Clone)]
pub struct Body {
    pub position: Vec2,
    pub velocity: Vec2,
    pub mass: f32,
    /// Force multiplier applied to action inputs.
    pub accel: f32,
}

impl Body {
    pub fn new() -> Self {
        Self {
            position: Vec2::zero(),
            velocity: Vec2::zero(),
            mass: 1.0,
            accel: 5.0,
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::new()
    }
}

/// The physical world: agent bodies and static landmarks.
#[derive(Debug, Clone)]
pub struct World {
    pub bodies: Vec<Body>,
    pub landmarks: Vec<Vec2>,
    /// Integration step.
    pub dt: f32,
    /// Fraction of velocity lost per step.
    pub damping: f32,
}

impl World {
    /// Width of an agent action vector: `[noop, +x, -x, +y, -y]`.
    pub const ACTION_DIM: usize = 5;

    pub fn new(n_bodies: usize, n_landmarks: usize) -> Self {
        Self {
            bodies: vec![Body::new(); n_bodies],
            landmarks: vec![Vec2::zero(); n_landmarks],
            dt: 0.1,
            damping: 0.25,
        }
    }

    /// Converts an action vector into a movement force.
    ///
    /// Discrete actions are one-hot, continuous ones are per-component
    /// magnitudes; both decode the same way.
    pub fn action_force(action: &[f32], accel: f32) -> Vec2 {
        Vec2::new(action[1] - action[2], action[3] - action[4]) * accel
    }

    /// Advances the world by one step with one action per body.
    pub fn step(&mut self, actions: &[Vec<f32>]) {
        debug_assert_eq!(actions.len(), self.bodies.len());
        for (body, action) in self.bodies.iter_mut().zip(actions) {
            let force = Self::action_force(action, body.accel);
            body.velocity = body.velocity * (1.0 - self.damping);
            body.velocity = body.velocity + force * (self.dt / body.mass);
            body.position = body.position + body.velocity * self.dt;
        }
    }
}
