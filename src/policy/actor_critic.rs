//! Convolutional actor-critic policy for ColorGrid
//!
//! # Architecture
//!
//! ```text
//! Observation planes [5, W, H]
//!         |
//!  [Conv 3x3, stride 3] LeakyReLU
//!  [Conv 3x3]           LeakyReLU
//!  [Conv 3x3]           LeakyReLU
//!         |
//!      Flatten ---- concat ---- goal info [3]
//!         |
//!    [Dense(192)] Tanh
//!         |
//!    [LSTM(192)] (optional)
//!      /  |   \
//! Policy Value Goal
//!  64-64  64-64  |
//!    |      |    |
//!  [4]    [1]   [3]
//! ```
//!
//! The recurrent state is carried across collection steps by the caller and
//! stored with every sample; updates run one LSTM step from the stored state.

use std::path::Path;

use anyhow::{Context, Result, bail};
use tch::{
    Device, Kind, Tensor,
    nn::{self, Init, LSTMState, Module, OptimizerConfig, RNN},
};

use crate::env::color_grid::{NUM_ACTIONS, NUM_COLORS, NUM_PLANES};

/// Smallest grid side the convolution stack accepts
pub const MIN_GRID_SIZE: usize = 15;

/// Width of the shared feature layer and the LSTM
pub const FEATURE_DIM: i64 = 192;

/// Architecture configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorCriticConfig {
    /// Grid width of the observations
    pub grid_width: usize,
    /// Grid height of the observations
    pub grid_height: usize,
    /// Insert an LSTM after the feature layer
    pub use_lstm: bool,
}

impl ActorCriticConfig {
    /// Configuration for a grid of the given size
    pub fn new(grid_width: usize, grid_height: usize, use_lstm: bool) -> Self {
        Self { grid_width, grid_height, use_lstm }
    }

    /// Spatial size after the convolution stack
    ///
    /// Returns `None` if the grid is too small.
    pub fn conv_output_size(&self) -> Option<(i64, i64)> {
        let side = |n: usize| {
            // stride-3 conv, then two unpadded 3x3 convs
            let after_first = (n.checked_sub(3)? / 3 + 1) as i64;
            let out = after_first - 4;
            (out >= 1).then_some(out)
        };
        Some((side(self.grid_width)?, side(self.grid_height)?))
    }
}

/// LSTM `(h, c)` state for a batch, each `[batch, FEATURE_DIM]`
#[derive(Debug)]
pub struct RecurrentState {
    /// Hidden state
    pub h: Tensor,
    /// Cell state
    pub c: Tensor,
}

impl RecurrentState {
    /// Zero state for `batch` sequences
    pub fn zeros(batch: i64, device: Device) -> Self {
        Self {
            h: Tensor::zeros([batch, FEATURE_DIM], (Kind::Float, device)),
            c: Tensor::zeros([batch, FEATURE_DIM], (Kind::Float, device)),
        }
    }

    /// Zero the rows whose sequence starts a new episode
    ///
    /// # Arguments
    /// * `episode_starts` - Float mask `[batch]`, 1.0 where an episode starts
    pub fn reset_where(&self, episode_starts: &Tensor) -> Self {
        let keep = (1.0_f64 - episode_starts.to_kind(Kind::Float)).unsqueeze(-1);
        Self { h: &self.h * &keep, c: &self.c * &keep }
    }

    /// Split into per-row `(h, c)` vectors for buffer storage
    pub fn to_rows(&self) -> Result<Vec<(Vec<f32>, Vec<f32>)>> {
        let batch = self.h.size()[0] as usize;
        let width = FEATURE_DIM as usize;
        let flat = |t: &Tensor| -> Result<Vec<f32>> {
            let t = t.to_device(Device::Cpu).to_kind(Kind::Float).contiguous().view([-1]);
            Vec::<f32>::try_from(&t).context("failed to read recurrent state")
        };
        let h = flat(&self.h)?;
        let c = flat(&self.c)?;
        Ok((0..batch)
            .map(|i| {
                let row = i * width..(i + 1) * width;
                (h[row.clone()].to_vec(), c[row].to_vec())
            })
            .collect())
    }

    fn shallow_clone(&self) -> Self {
        Self { h: self.h.shallow_clone(), c: self.c.shallow_clone() }
    }
}

/// Raw network outputs
#[derive(Debug)]
pub struct PolicyOutput {
    /// Action logits `[batch, NUM_ACTIONS]`
    pub logits: Tensor,
    /// Value estimates `[batch]`
    pub values: Tensor,
    /// Goal-colour logits `[batch, NUM_COLORS]`
    pub goal_logits: Tensor,
    /// Recurrent state after this step (`None` without an LSTM)
    pub state: Option<RecurrentState>,
}

/// Sampled actions for a batch of observations
#[derive(Debug)]
pub struct ActOutput {
    /// Sampled actions `[batch]` (int64)
    pub actions: Tensor,
    /// Log probabilities of the sampled actions `[batch]`
    pub log_probs: Tensor,
    /// Value estimates `[batch]`
    pub values: Tensor,
    /// Recurrent state to use for the next step
    pub next_state: Option<RecurrentState>,
}

/// Re-evaluation of stored actions during an update
#[derive(Debug)]
pub struct Evaluation {
    /// Log probabilities of the given actions `[batch]`
    pub log_probs: Tensor,
    /// Entropy of the action distribution `[batch]`
    pub entropy: Tensor,
    /// Value estimates `[batch]`
    pub values: Tensor,
    /// Goal-colour logits `[batch, NUM_COLORS]`
    pub goal_logits: Tensor,
}

/// CNN (+LSTM) actor-critic with a goal-prediction head
pub struct ActorCritic {
    vs: nn::VarStore,
    conv1: nn::Conv2D,
    conv2: nn::Conv2D,
    conv3: nn::Conv2D,
    feature: nn::Linear,
    lstm: Option<nn::LSTM>,
    policy_net: nn::Sequential,
    value_net: nn::Sequential,
    goal_head: nn::Linear,
    config: ActorCriticConfig,
}

impl std::fmt::Debug for ActorCritic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorCritic")
            .field("config", &self.config)
            .field("device", &self.vs.device())
            .finish_non_exhaustive()
    }
}

fn linear_config(gain: f64) -> nn::LinearConfig {
    let mut config = nn::LinearConfig::default();
    config.ws_init = Init::Orthogonal { gain };
    config.bs_init = Some(Init::Const(0.0));
    config
}

fn conv_config(stride: i64) -> nn::ConvConfig {
    nn::ConvConfig {
        stride,
        ws_init: Init::Orthogonal { gain: 2.0_f64.sqrt() },
        bs_init: Init::Const(0.0),
        ..Default::default()
    }
}

/// Two tanh hidden layers of 64 followed by an output layer
fn head(path: nn::Path, out_dim: i64, out_gain: f64) -> nn::Sequential {
    let hidden = linear_config(2.0_f64.sqrt());
    nn::seq()
        .add(nn::linear(&path / "fc1", FEATURE_DIM, 64, hidden))
        .add_fn(|x| x.tanh())
        .add(nn::linear(&path / "fc2", 64, 64, hidden))
        .add_fn(|x| x.tanh())
        .add(nn::linear(&path / "out", 64, out_dim, linear_config(out_gain)))
}

impl ActorCritic {
    /// Create a policy on the best available device
    pub fn new(config: ActorCriticConfig) -> Result<Self> {
        Self::with_device(config, Device::cuda_if_available())
    }

    /// Create a policy on a specific device
    ///
    /// Fails if the grid is smaller than [`MIN_GRID_SIZE`] in either
    /// dimension.
    pub fn with_device(config: ActorCriticConfig, device: Device) -> Result<Self> {
        let Some((out_w, out_h)) = config.conv_output_size() else {
            bail!(
                "grid {}x{} is too small for the convolution stack (minimum {}x{})",
                config.grid_width,
                config.grid_height,
                MIN_GRID_SIZE,
                MIN_GRID_SIZE
            );
        };
        tracing::debug!("ActorCritic using device: {:?}", device);

        let vs = nn::VarStore::new(device);
        let root = vs.root();

        let conv1 = nn::conv2d(&root / "conv1", NUM_PLANES as i64, 32, 3, conv_config(3));
        let conv2 = nn::conv2d(&root / "conv2", 32, 64, 3, conv_config(1));
        let conv3 = nn::conv2d(&root / "conv3", 64, 64, 3, conv_config(1));

        let flat_size = 64 * out_w * out_h + NUM_COLORS as i64;
        let feature =
            nn::linear(&root / "feature", flat_size, FEATURE_DIM, linear_config(2.0_f64.sqrt()));
        let lstm = config
            .use_lstm
            .then(|| nn::lstm(&root / "lstm", FEATURE_DIM, FEATURE_DIM, Default::default()));

        let policy_net = head(&root / "policy", NUM_ACTIONS as i64, 0.01);
        let value_net = head(&root / "value", 1, 1.0);
        let goal_head =
            nn::linear(&root / "goal", FEATURE_DIM, NUM_COLORS as i64, linear_config(1.0));

        Ok(Self {
            vs,
            conv1,
            conv2,
            conv3,
            feature,
            lstm,
            policy_net,
            value_net,
            goal_head,
            config,
        })
    }

    /// Architecture configuration
    pub fn config(&self) -> ActorCriticConfig {
        self.config
    }

    /// Whether the policy carries recurrent state
    pub fn is_recurrent(&self) -> bool {
        self.lstm.is_some()
    }

    /// Size of the stored recurrent state per sample (0 when feed-forward)
    pub fn hidden_dim(&self) -> usize {
        if self.is_recurrent() { FEATURE_DIM as usize } else { 0 }
    }

    /// Fresh recurrent state for `batch` environments
    pub fn initial_state(&self, batch: usize) -> Option<RecurrentState> {
        self.is_recurrent().then(|| RecurrentState::zeros(batch as i64, self.device()))
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `observations` - Flattened planes `[batch, NUM_PLANES * W * H]`
    /// * `goal_info` - `[batch, NUM_COLORS]`
    /// * `state` - Recurrent state; zeros are used when `None`
    pub fn forward(
        &self,
        observations: &Tensor,
        goal_info: &Tensor,
        state: Option<&RecurrentState>,
    ) -> PolicyOutput {
        let batch = observations.size()[0];
        let grid = observations.to_device(self.device()).to_kind(Kind::Float).view([
            batch,
            NUM_PLANES as i64,
            self.config.grid_width as i64,
            self.config.grid_height as i64,
        ]);

        let conv = grid
            .apply(&self.conv1)
            .leaky_relu()
            .apply(&self.conv2)
            .leaky_relu()
            .apply(&self.conv3)
            .leaky_relu()
            .flatten(1, -1);
        let goal_info = goal_info.to_device(self.device()).to_kind(Kind::Float);
        let features = Tensor::cat(&[&conv, &goal_info], 1).apply(&self.feature).tanh();

        let (features, state) = match &self.lstm {
            Some(lstm) => {
                let previous = state
                    .map(RecurrentState::shallow_clone)
                    .unwrap_or_else(|| RecurrentState::zeros(batch, self.device()));
                let previous = LSTMState((previous.h.unsqueeze(0), previous.c.unsqueeze(0)));
                let next = lstm.step(&features, &previous);
                let h = next.h().squeeze_dim(0);
                let c = next.c().squeeze_dim(0);
                (h.shallow_clone(), Some(RecurrentState { h, c }))
            }
            None => (features, None),
        };

        PolicyOutput {
            logits: self.policy_net.forward(&features),
            values: self.value_net.forward(&features).squeeze_dim(-1),
            goal_logits: self.goal_head.forward(&features),
            state,
        }
    }

    /// Sample actions without tracking gradients
    pub fn act(
        &self,
        observations: &Tensor,
        goal_info: &Tensor,
        state: Option<&RecurrentState>,
    ) -> ActOutput {
        tch::no_grad(|| {
            let output = self.forward(observations, goal_info, state);
            let log_probs_all = output.logits.log_softmax(-1, Kind::Float);
            let actions = log_probs_all.exp().multinomial(1, true).squeeze_dim(-1);
            let log_probs =
                log_probs_all.gather(-1, &actions.unsqueeze(-1), false).squeeze_dim(-1);
            ActOutput { actions, log_probs, values: output.values, next_state: output.state }
        })
    }

    /// Value estimates without tracking gradients
    pub fn value(
        &self,
        observations: &Tensor,
        goal_info: &Tensor,
        state: Option<&RecurrentState>,
    ) -> Tensor {
        tch::no_grad(|| self.forward(observations, goal_info, state).values)
    }

    /// Evaluate stored actions: log probabilities, entropy, values, goal logits
    pub fn evaluate(
        &self,
        observations: &Tensor,
        goal_info: &Tensor,
        actions: &Tensor,
        state: Option<&RecurrentState>,
    ) -> Evaluation {
        let output = self.forward(observations, goal_info, state);

        let log_probs = output.logits.log_softmax(-1, Kind::Float);
        let probs = log_probs.exp();
        let actions = actions.to_device(self.device()).to_kind(Kind::Int64);
        let action_log_probs = log_probs.gather(-1, &actions.unsqueeze(-1), false).squeeze_dim(-1);
        let entropy = -(probs * &log_probs).sum_dim_intlist(-1, false, Kind::Float);

        Evaluation {
            log_probs: action_log_probs,
            entropy,
            values: output.values,
            goal_logits: output.goal_logits,
        }
    }

    /// Get the device this policy is on (CPU or CUDA)
    pub fn device(&self) -> Device {
        self.vs.device()
    }

    /// Get reference to variable store
    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    /// Get mutable reference to variable store
    pub fn var_store_mut(&mut self) -> &mut nn::VarStore {
        &mut self.vs
    }

    /// Create an Adam optimizer (eps 1e-5) for this policy
    pub fn optimizer(&self, learning_rate: f64) -> Result<nn::Optimizer> {
        let adam = nn::Adam { eps: 1e-5, ..Default::default() };
        adam.build(&self.vs, learning_rate).context("failed to build Adam optimizer")
    }

    /// Save model parameters to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.vs.save(path).with_context(|| format!("failed to save policy to {}", path.display()))
    }

    /// Load model parameters from a file
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.vs
            .load(path)
            .with_context(|| format!("failed to load policy from {}", path.display()))
    }

    /// Freeze gradients
    pub fn freeze(&mut self) {
        self.vs.freeze();
    }

    /// Unfreeze gradients
    pub fn unfreeze(&mut self) {
        self.vs.unfreeze();
    }
}
