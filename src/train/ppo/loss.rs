//! PPO loss terms
//!
//! Policy, value, entropy and goal-prediction losses. Diagnostics are
//! returned as plain `f64` next to the differentiable loss tensors.

use tch::{Kind, Tensor};

/// Normalize advantages to zero mean and unit variance
///
/// Batches with fewer than two samples are returned unchanged.
pub fn normalize_advantages(advantages: &Tensor) -> Tensor {
    if advantages.numel() < 2 {
        return advantages.shallow_clone();
    }
    let mean = advantages.mean(Kind::Float);
    let std = advantages.std(true);
    (advantages - mean) / (std + 1e-8)
}

/// Compute PPO policy loss with clipping
///
/// Returns (policy_loss, clip_fraction, approx_kl), where approx_kl is the
/// low-variance estimator `mean((r - 1) - log r)`.
///
/// # Arguments
/// * `log_probs` - Log probabilities of actions under current policy
/// * `old_log_probs` - Log probabilities of actions under old policy
/// * `advantages` - Advantages (already normalized if requested)
/// * `clip_range` - PPO clipping parameter (epsilon)
pub fn compute_policy_loss(
    log_probs: &Tensor,
    old_log_probs: &Tensor,
    advantages: &Tensor,
    clip_range: f64,
) -> (Tensor, f64, f64) {
    let log_ratio = log_probs - old_log_probs;
    let ratio = log_ratio.exp();

    let pg_loss_1 = -advantages * &ratio;
    let pg_loss_2 = -advantages * ratio.clamp(1.0 - clip_range, 1.0 + clip_range);
    let policy_loss = pg_loss_1.maximum(&pg_loss_2).mean(Kind::Float);

    let (clip_fraction, approx_kl) = tch::no_grad(|| {
        let clip_fraction = (&ratio - 1.0)
            .abs()
            .gt(clip_range)
            .to_kind(Kind::Float)
            .mean(Kind::Float)
            .double_value(&[]);
        let approx_kl = ((&ratio - 1.0) - &log_ratio).mean(Kind::Float).double_value(&[]);
        (clip_fraction, approx_kl)
    });

    (policy_loss, clip_fraction, approx_kl)
}

/// Compute value function loss
///
/// `0.5 * mean((v - R)^2)`, or with `clip_range` set
/// `0.5 * mean(max((v - R)^2, (v_old + clip(v - v_old) - R)^2))`.
///
/// # Arguments
/// * `values` - Predicted values under current value function
/// * `old_values` - Values recorded during collection
/// * `returns` - Computed returns (targets)
/// * `clip_range` - Clip range for the value update, `None` disables clipping
pub fn compute_value_loss(
    values: &Tensor,
    old_values: &Tensor,
    returns: &Tensor,
    clip_range: Option<f64>,
) -> Tensor {
    let unclipped = (values - returns).square();
    let per_sample = match clip_range {
        Some(clip) => {
            let values_clipped = old_values + (values - old_values).clamp(-clip, clip);
            let clipped = (values_clipped - returns).square();
            unclipped.maximum(&clipped)
        }
        None => unclipped,
    };
    0.5 * per_sample.mean(Kind::Float)
}

/// Compute entropy loss (negative mean entropy)
pub fn compute_entropy_loss(entropy: &Tensor) -> Tensor {
    -entropy.mean(Kind::Float)
}

/// Cross-entropy between goal logits and the true goal colour
///
/// # Arguments
/// * `goal_logits` - `[batch, NUM_COLORS]`
/// * `goal_targets` - `[batch]` colour indices (int64)
pub fn compute_goal_loss(goal_logits: &Tensor, goal_targets: &Tensor) -> Tensor {
    goal_logits.cross_entropy_for_logits(&goal_targets.to_device(goal_logits.device()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(t: &Tensor) -> f64 {
        t.double_value(&[])
    }

    #[test]
    fn test_policy_loss_on_policy() {
        let log_probs = Tensor::from_slice(&[-1.0_f32, -0.5, -2.0]);
        let advantages = Tensor::from_slice(&[1.0_f32, -1.0, 3.0]);
        let (loss, clip_fraction, approx_kl) =
            compute_policy_loss(&log_probs, &log_probs, &advantages, 0.2);

        // ratio == 1: loss = -mean(A)
        assert!((scalar(&loss) + 1.0).abs() < 1e-6);
        assert_eq!(clip_fraction, 0.0);
        assert!(approx_kl.abs() < 1e-9);
    }

    #[test]
    fn test_policy_loss_is_clipped() {
        let old = Tensor::from_slice(&[0.0_f32]);
        let new = Tensor::from_slice(&[2.0_f32.ln()]);
        let advantages = Tensor::from_slice(&[1.0_f32]);
        let (loss, clip_fraction, approx_kl) = compute_policy_loss(&new, &old, &advantages, 0.2);

        // max(-2, -1.2) = -1.2
        assert!((scalar(&loss) + 1.2).abs() < 1e-5);
        assert_eq!(clip_fraction, 1.0);
        assert!((approx_kl - (1.0 - 2.0_f64.ln())).abs() < 1e-5);
    }

    #[test]
    fn test_value_loss_unclipped() {
        let values = Tensor::from_slice(&[1.0_f32, 2.0]);
        let returns = Tensor::from_slice(&[0.0_f32, 0.0]);
        let loss = compute_value_loss(&values, &values, &returns, None);
        assert!((scalar(&loss) - 1.25).abs() < 1e-6);
    }

    #[test]
    fn test_value_loss_clipped_takes_pessimistic_term() {
        let values = Tensor::from_slice(&[1.0_f32]);
        let old_values = Tensor::from_slice(&[0.0_f32]);
        let returns = Tensor::from_slice(&[1.0_f32]);

        // Unclipped error is 0, clipped prediction 0.2 gives 0.64
        let loss = compute_value_loss(&values, &old_values, &returns, Some(0.2));
        assert!((scalar(&loss) - 0.32).abs() < 1e-6);

        let loss = compute_value_loss(&values, &old_values, &returns, None);
        assert!(scalar(&loss).abs() < 1e-9);
    }

    #[test]
    fn test_entropy_loss() {
        let entropy = Tensor::from_slice(&[1.0_f32, 3.0]);
        assert!((scalar(&compute_entropy_loss(&entropy)) + 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_goal_loss_uniform_logits() {
        let logits = Tensor::zeros([4, 3], tch::kind::FLOAT_CPU);
        let targets = Tensor::from_slice(&[0_i64, 1, 2, 0]);
        let loss = compute_goal_loss(&logits, &targets);
        assert!((scalar(&loss) - 3.0_f64.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_normalize_advantages() {
        let advantages = Tensor::from_slice(&[1.0_f32, 2.0, 3.0]);
        let normalized = Vec::<f32>::try_from(&normalize_advantages(&advantages)).unwrap();
        for (actual, expected) in normalized.iter().zip([-1.0, 0.0, 1.0]) {
            assert!((actual - expected).abs() < 1e-5);
        }

        let single = Tensor::from_slice(&[5.0_f32]);
        assert_eq!(scalar(&normalize_advantages(&single)), 5.0);
    }
}
