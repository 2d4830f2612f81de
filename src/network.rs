//! Actor and critic networks using tch-rs (PyTorch bindings).
//!
//! Both are two-hidden-layer MLPs with ReLU activations. Each network owns
//! its [`nn::VarStore`], which makes target copies and per-network
//! optimizers straightforward.

use std::path::Path;

use tch::{nn, nn::Module, Device, TchError, Tensor};

fn mlp(p: &nn::Path, input_dim: usize, hidden: usize, out_dim: usize) -> nn::Sequential {
    nn::seq()
        .add(nn::linear(
            p / "l1",
            input_dim as i64,
            hidden as i64,
            Default::default(),
        ))
        .add_fn(|x| x.relu())
        .add(nn::linear(
            p / "l2",
            hidden as i64,
            hidden as i64,
            Default::default(),
        ))
        .add_fn(|x| x.relu())
        .add(nn::linear(
            p / "l3",
            hidden as i64,
            out_dim as i64,
            Default::default(),
        ))
}

/// Polyak update `target ← tau · source + (1 − tau) · target`.
fn soft_update(target: &nn::VarStore, source: &nn::VarStore, tau: f64) {
    let source_vars = source.variables();
    tch::no_grad(|| {
        for (name, mut dst) in target.variables() {
            if let Some(src) = source_vars.get(&name) {
                let blended = src * tau + &dst * (1.0 - tau);
                dst.copy_(&blended);
            }
        }
    });
}

/// MLP actor producing unnormalized action logits.
///
/// Architecture: `input_dim → hidden → hidden → out_dim`.
pub struct ActorNetwork {
    vs: nn::VarStore,
    net: nn::Sequential,
    out_dim: usize,
}

impl ActorNetwork {
    /// Creates a new actor network.
    pub fn new(input_dim: usize, out_dim: usize, hidden: usize, device: Device) -> Self {
        let vs = nn::VarStore::new(device);
        let net = mlp(&vs.root(), input_dim, hidden, out_dim);
        Self { vs, net, out_dim }
    }

    /// Forward pass: returns action logits of shape `[batch, out_dim]`.
    pub fn forward(&self, obs: &Tensor) -> Tensor {
        self.net.forward(obs)
    }

    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    /// Copies all weights from `other`.
    pub fn hard_update_from(&mut self, other: &ActorNetwork) -> Result<(), TchError> {
        self.vs.copy(&other.vs)
    }

    /// Moves weights a fraction `tau` toward `other`.
    pub fn soft_update_from(&mut self, other: &ActorNetwork, tau: f64) {
        soft_update(&self.vs, &other.vs, tau);
    }

    pub fn save(&self, path: &Path) -> Result<(), TchError> {
        self.vs.save(path)
    }

    pub fn load(&mut self, path: &Path) -> Result<(), TchError> {
        self.vs.load(path)
    }
}

/// MLP critic producing a scalar action value.
///
/// Architecture: `input_dim → hidden → hidden → 1`.
pub struct CriticNetwork {
    vs: nn::VarStore,
    net: nn::Sequential,
}

impl CriticNetwork {
    /// Creates a new critic network.
    pub fn new(input_dim: usize, hidden: usize, device: Device) -> Self {
        let vs = nn::VarStore::new(device);
        let net = mlp(&vs.root(), input_dim, hidden, 1);
        Self { vs, net }
    }

    /// Forward pass: returns Q values of shape `[batch]`.
    pub fn forward(&self, input: &Tensor) -> Tensor {
        self.net.forward(input).squeeze_dim(-1)
    }

    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    pub fn hard_update_from(&mut self, other: &CriticNetwork) -> Result<(), TchError> {
        self.vs.copy(&other.vs)
    }

    pub fn soft_update_from(&mut self, other: &CriticNetwork, tau: f64) {
        soft_update(&self.vs, &other.vs, tau);
    }

    pub fn save(&self, path: &Path) -> Result<(), TchError> {
        self.vs.save(path)
    }

    pub fn load(&mut self, path: &Path) -> Result<(), TchError> {
        self.vs.load(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Kind;

    #[test]
    fn actor_forward_shape() {
        let actor = ActorNetwork::new(10, 5, 64, Device::Cpu);
        let obs = Tensor::randn([4, 10], (Kind::Float, Device::Cpu));
        assert_eq!(actor.forward(&obs).size(), &[4, 5]);
    }

    #[test]
    fn critic_forward_shape() {
        let critic = CriticNetwork::new(15, 64, Device::Cpu);
        let input = Tensor::randn([4, 15], (Kind::Float, Device::Cpu));
        assert_eq!(critic.forward(&input).size(), &[4]);
    }

    #[test]
    fn hard_update_makes_outputs_equal() {
        let source = ActorNetwork::new(6, 3, 16, Device::Cpu);
        let mut target = ActorNetwork::new(6, 3, 16, Device::Cpu);
        target.hard_update_from(&source).unwrap();
        let obs = Tensor::randn([2, 6], (Kind::Float, Device::Cpu));
        let diff = (source.forward(&obs) - target.forward(&obs))
            .abs()
            .max()
            .double_value(&[]);
        assert!(diff < 1e-6);
    }

    #[test]
    fn soft_update_with_tau_one_copies() {
        let source = CriticNetwork::new(6, 16, Device::Cpu);
        let mut target = CriticNetwork::new(6, 16, Device::Cpu);
        target.soft_update_from(&source, 1.0);
        let input = Tensor::randn([3, 6], (Kind::Float, Device::Cpu));
        let diff = (source.forward(&input) - target.forward(&input))
            .abs()
            .max()
            .double_value(&[]);
        assert!(diff < 1e-5);
    }

    #[test]
    fn save_and_load_restore_weights() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("actor.ot");
        let source = ActorNetwork::new(4, 2, 8, Device::Cpu);
        source.save(&path).unwrap();

        let mut restored = ActorNetwork::new(4, 2, 8, Device::Cpu);
        restored.load(&path).unwrap();
        let obs = Tensor::randn([2, 4], (Kind::Float, Device::Cpu));
        let diff = (source.forward(&obs) - restored.forward(&obs))
            .abs()
            .max()
            .double_value(&[]);
        assert!(diff < 1e-6);
    }
}
