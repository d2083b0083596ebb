//! Generalized Advantage Estimation (GAE) computation
//!
//! Episode boundaries are expressed as episode-start flags: `episode_starts[t]`
//! is true when the observation at step `t` is the first of a new episode,
//! i.e. the episode running at step `t - 1` ended on that step.

/// Compute GAE for a single environment
///
/// ```text
/// nonterminal_t = 1 - start_{t+1}        (1 - last_done at the final step)
/// δ_t = r_t + γ V_{t+1} nonterminal_t - V_t
/// A_t = δ_t + γ λ nonterminal_t A_{t+1}
/// R_t = A_t + V_t
/// ```
///
/// # Arguments
/// * `rewards` - Rewards per step
/// * `values` - Value estimates per step
/// * `episode_starts` - Episode-start flags per step
/// * `last_value` - Value estimate of the observation after the final step
/// * `last_done` - Whether that observation starts a new episode
/// * `gamma` - Discount factor
/// * `gae_lambda` - GAE lambda parameter
/// * `advantages` - Output advantages
/// * `returns` - Output returns
#[allow(clippy::too_many_arguments)]
pub fn compute_gae_single_env(
    rewards: &[f32],
    values: &[f32],
    episode_starts: &[bool],
    last_value: f32,
    last_done: bool,
    gamma: f32,
    gae_lambda: f32,
    advantages: &mut [f32],
    returns: &mut [f32],
) {
    let num_steps = rewards.len();
    debug_assert_eq!(values.len(), num_steps);
    debug_assert_eq!(episode_starts.len(), num_steps);
    debug_assert_eq!(advantages.len(), num_steps);
    debug_assert_eq!(returns.len(), num_steps);

    let mut last_gae = 0.0;
    for t in (0..num_steps).rev() {
        let (next_value, next_done) = if t == num_steps - 1 {
            (last_value, last_done)
        } else {
            (values[t + 1], episode_starts[t + 1])
        };
        let next_non_terminal = if next_done { 0.0 } else { 1.0 };

        let delta = rewards[t] + gamma * next_value * next_non_terminal - values[t];
        last_gae = delta + gamma * gae_lambda * next_non_terminal * last_gae;

        advantages[t] = last_gae;
        returns[t] = last_gae + values[t];
    }
}
