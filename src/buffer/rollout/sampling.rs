//! Minibatch sampling for rollout data
//!
//! A rollout batch is uploaded to the training device once; minibatches are
//! then gathered from the device tensors with `index_select`.

use rand::{Rng, seq::SliceRandom};
use tch::{Device, Kind, Tensor};

use super::RolloutBatch;
use crate::env::color_grid::NUM_COLORS;

/// Generate minibatch indices for PPO training
///
/// Creates shuffled minibatches from a buffer of the given size.
/// Each minibatch contains `batch_size` samples except possibly the last.
///
/// # Arguments
/// * `buffer_size` - Total number of samples in buffer
/// * `batch_size` - Desired size of each minibatch
/// * `rng` - Random number generator used for shuffling
///
/// # Returns
/// Vector of vectors, where each inner vector contains indices for one minibatch
pub fn generate_minibatch_indices<R: Rng + ?Sized>(
    buffer_size: usize,
    batch_size: usize,
    rng: &mut R,
) -> Vec<Vec<usize>> {
    let mut indices: Vec<usize> = (0..buffer_size).collect();
    indices.shuffle(rng);

    indices.chunks(batch_size.max(1)).map(|chunk| chunk.to_vec()).collect()
}

/// Rollout data as device tensors
#[derive(Debug)]
pub struct TensorBatch {
    /// Observations \[batch, obs_dim\]
    pub observations: Tensor,
    /// Goal info \[batch, NUM_COLORS\]
    pub goal_info: Tensor,
    /// Goal targets \[batch\] (int64)
    pub goal_targets: Tensor,
    /// Recurrent `(h, c)` state, each \[batch, hidden_dim\]
    pub recurrent_state: Option<(Tensor, Tensor)>,
    /// Actions \[batch\] (int64)
    pub actions: Tensor,
    /// Old log probabilities \[batch\]
    pub old_log_probs: Tensor,
    /// Old value estimates \[batch\]
    pub old_values: Tensor,
    /// Advantages \[batch\]
    pub advantages: Tensor,
    /// Returns \[batch\]
    pub returns: Tensor,
}

impl TensorBatch {
    /// Upload a flattened rollout batch to `device`
    pub fn from_batch(batch: &RolloutBatch, device: Device) -> Self {
        let n = batch.len() as i64;
        let floats = |data: &[f32]| Tensor::from_slice(data).to_device(device);
        let matrix = |data: &[f32], cols: usize| floats(data).view([n, cols as i64]);

        let recurrent_state = (batch.hidden_dim > 0).then(|| {
            (matrix(&batch.hidden, batch.hidden_dim), matrix(&batch.cell, batch.hidden_dim))
        });

        Self {
            observations: matrix(&batch.observations, batch.obs_dim),
            goal_info: matrix(&batch.goal_info, NUM_COLORS),
            goal_targets: Tensor::from_slice(&batch.goal_targets).to_device(device),
            recurrent_state,
            actions: Tensor::from_slice(&batch.actions).to_device(device),
            old_log_probs: floats(&batch.log_probs),
            old_values: floats(&batch.values),
            advantages: floats(&batch.advantages),
            returns: floats(&batch.returns),
        }
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.actions.size()[0] as usize
    }

    /// Check if batch is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gather the samples at `indices`
    pub fn select(&self, indices: &[usize]) -> TensorBatch {
        let indices: Vec<i64> = indices.iter().map(|&i| i as i64).collect();
        let index = Tensor::from_slice(&indices).to_device(self.actions.device());
        let pick = |t: &Tensor| t.index_select(0, &index);

        TensorBatch {
            observations: pick(&self.observations),
            goal_info: pick(&self.goal_info),
            goal_targets: pick(&self.goal_targets),
            recurrent_state: self.recurrent_state.as_ref().map(|(h, c)| (pick(h), pick(c))),
            actions: pick(&self.actions),
            old_log_probs: pick(&self.old_log_probs),
            old_values: pick(&self.old_values),
            advantages: pick(&self.advantages),
            returns: pick(&self.returns),
        }
    }

    /// Explained variance of the stored value estimates against the returns
    ///
    /// `1 - Var(R - V) / Var(R)`, NaN when the returns have no variance.
    pub fn explained_variance(&self) -> f64 {
        explained_variance(&self.old_values, &self.returns)
    }
}

/// `1 - Var(returns - values) / Var(returns)`, NaN when `Var(returns) == 0`
pub(crate) fn explained_variance(values: &Tensor, returns: &Tensor) -> f64 {
    let returns = returns.to_kind(Kind::Double);
    let var_returns = returns.var(false).double_value(&[]);
    if var_returns == 0.0 {
        return f64::NAN;
    }
    let residual = (&returns - values.to_kind(Kind::Double)).var(false).double_value(&[]);
    1.0 - residual / var_returns
}
