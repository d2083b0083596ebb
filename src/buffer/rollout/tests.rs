//! Tests for rollout buffer functionality

mod gae_tests {
    use crate::buffer::rollout::compute_gae_single_env;

    fn run(
        rewards: &[f32],
        values: &[f32],
        starts: &[bool],
        last_value: f32,
        last_done: bool,
        gamma: f32,
        gae_lambda: f32,
    ) -> (Vec<f32>, Vec<f32>) {
        let mut advantages = vec![0.0; rewards.len()];
        let mut returns = vec![0.0; rewards.len()];
        compute_gae_single_env(
            rewards,
            values,
            starts,
            last_value,
            last_done,
            gamma,
            gae_lambda,
            &mut advantages,
            &mut returns,
        );
        (advantages, returns)
    }

    fn assert_close(actual: &[f32], expected: &[f32]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-6, "expected {expected:?}, got {actual:?}");
        }
    }

    #[test]
    fn test_gae_accumulates_within_episode() {
        // gamma = 0.5, lambda = 1: A2 = 1, A1 = 1 + 0.5, A0 = 1 + 0.75
        let (advantages, returns) =
            run(&[1.0, 1.0, 1.0], &[0.0, 0.0, 0.0], &[false, false, false], 0.0, false, 0.5, 1.0);
        assert_close(&advantages, &[1.75, 1.5, 1.0]);
        assert_close(&returns, &[1.75, 1.5, 1.0]);
    }

    #[test]
    fn test_gae_stops_at_episode_start() {
        // Step 2 starts a new episode, so nothing flows from step 2 into step 1
        let (advantages, _) =
            run(&[1.0, 1.0, 1.0], &[0.0, 0.0, 0.0], &[false, false, true], 0.0, false, 0.5, 1.0);
        assert_close(&advantages, &[1.5, 1.0, 1.0]);
    }

    #[test]
    fn test_gae_bootstraps_from_last_value() {
        // δ1 = 0.5 * 4 - 2 = 0, δ0 = 0.5 * 2 - 1 = 0
        let (advantages, returns) =
            run(&[0.0, 0.0], &[1.0, 2.0], &[false, false], 4.0, false, 0.5, 0.5);
        assert_close(&advantages, &[0.0, 0.0]);
        assert_close(&returns, &[1.0, 2.0]);
    }

    #[test]
    fn test_gae_last_done_blocks_bootstrap() {
        // δ1 = -2, A0 = δ0 + 0.25 * A1 = -0.5
        let (advantages, returns) =
            run(&[0.0, 0.0], &[1.0, 2.0], &[false, false], 4.0, true, 0.5, 0.5);
        assert_close(&advantages, &[-0.5, -2.0]);
        assert_close(&returns, &[0.5, 0.0]);
    }

    #[test]
    fn test_gae_lambda_zero_is_td_error() {
        let (advantages, _) = run(&[1.0, 2.0], &[0.5, 1.0], &[false, false], 3.0, false, 0.9, 0.0);
        // δ1 = 2 + 0.9 * 3 - 1 = 3.7, δ0 = 1 + 0.9 * 1 - 0.5 = 1.4
        assert_close(&advantages, &[1.4, 3.7]);
    }
}

mod buffer_tests {
    use tch::Device;

    use crate::buffer::rollout::{
        RolloutBuffer, TensorBatch, Transition, generate_minibatch_indices,
    };
    use rand::{SeedableRng, rngs::StdRng};

    fn transition(obs: Vec<f32>, action: i64, reward: f32, value: f32, start: bool) -> Transition {
        Transition {
            observation: obs,
            goal_info: [1.0, 0.0, 0.0],
            goal_target: 0,
            recurrent_state: None,
            action,
            log_prob: -0.5,
            value,
            reward,
            episode_start: start,
        }
    }

    #[test]
    fn test_buffer_creation() {
        let buffer = RolloutBuffer::new(128, 4, 10, 0);
        assert_eq!(buffer.shape(), (128, 4, 10));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_add_transition() {
        let mut buffer = RolloutBuffer::new(10, 2, 4, 0);
        buffer.add(0, 1, transition(vec![1.0, 2.0, 3.0, 4.0], 3, 1.0, 0.5, true));

        assert_eq!(buffer.observation(0, 1), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(buffer.len(), 2);
        assert!(!buffer.is_full());
    }

    #[test]
    #[should_panic(expected = "Observation dimension mismatch")]
    fn test_add_wrong_obs_dim() {
        let mut buffer = RolloutBuffer::new(2, 1, 4, 0);
        buffer.add(0, 0, transition(vec![0.0; 3], 0, 0.0, 0.0, false));
    }

    #[test]
    fn test_compute_advantages_per_env() {
        let mut buffer = RolloutBuffer::new(2, 2, 1, 0);
        for step in 0..2 {
            buffer.add(step, 0, transition(vec![0.0], 0, 1.0, 0.0, false));
            buffer.add(step, 1, transition(vec![0.0], 0, 0.0, 0.0, false));
        }
        buffer.compute_advantages(&[0.0, 0.0], &[false, false], 0.5, 1.0);

        assert_eq!(buffer.env_advantages(0), vec![1.5, 1.0]);
        assert_eq!(buffer.env_advantages(1), vec![0.0, 0.0]);
        assert_eq!(buffer.env_returns(0), vec![1.5, 1.0]);
    }

    #[test]
    fn test_get_batch_is_step_major() {
        let mut buffer = RolloutBuffer::new(2, 2, 2, 0);
        for step in 0..2 {
            for env in 0..2 {
                let obs = vec![step as f32, env as f32];
                buffer.add(step, env, transition(obs, (step * 2 + env) as i64, 1.0, 0.5, false));
            }
        }
        buffer.compute_advantages(&[0.0, 0.0], &[false, false], 0.99, 0.95);

        let batch = buffer.get_batch();
        assert_eq!(batch.len(), 4);
        assert_eq!(batch.actions, vec![0, 1, 2, 3]);
        assert_eq!(batch.observations, vec![0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0]);
        assert_eq!(batch.goal_info.len(), 12);
        assert!(batch.hidden.is_empty());
    }

    #[test]
    #[should_panic(expected = "Must compute advantages before getting batch")]
    fn test_get_batch_without_advantages() {
        let buffer = RolloutBuffer::new(2, 2, 3, 0);
        buffer.get_batch();
    }

    #[test]
    fn test_buffer_reset() {
        let mut buffer = RolloutBuffer::new(10, 2, 1, 0);
        buffer.add(0, 0, transition(vec![1.0], 1, 1.0, 0.5, false));
        buffer.compute_advantages(&[0.0, 0.0], &[false, false], 0.99, 0.95);

        buffer.reset();
        assert!(buffer.is_empty());
        assert!(!buffer.advantages_computed);
    }

    #[test]
    fn test_mean_episode_reward() {
        let mut buffer = RolloutBuffer::new(3, 2, 1, 0);
        for step in 0..3 {
            buffer.add(step, 0, transition(vec![0.0], 0, 1.0, 0.0, false));
            buffer.add(step, 1, transition(vec![0.0], 0, -1.0 + step as f32, 0.0, false));
        }
        // env 0 sums to 3, env 1 sums to 0
        assert_eq!(buffer.mean_episode_reward(), 1.5);
    }

    #[test]
    fn test_recurrent_state_is_stored() {
        let mut buffer = RolloutBuffer::new(1, 2, 1, 2);
        for env in 0..2 {
            let mut t = transition(vec![0.0], 0, 0.0, 0.0, false);
            t.recurrent_state = Some((vec![env as f32; 2], vec![-(env as f32); 2]));
            buffer.add(0, env, t);
        }
        buffer.compute_advantages(&[0.0, 0.0], &[false, false], 0.99, 0.95);

        let batch = buffer.get_batch();
        assert_eq!(batch.hidden, vec![0.0, 0.0, 1.0, 1.0]);
        assert_eq!(batch.cell, vec![0.0, 0.0, -1.0, -1.0]);
    }

    #[test]
    fn test_minibatch_indices_cover_buffer() {
        let mut rng = StdRng::seed_from_u64(0);
        let batches = generate_minibatch_indices(10, 4, &mut rng);
        assert_eq!(batches.iter().map(Vec::len).collect::<Vec<_>>(), vec![4, 4, 2]);

        let mut all: Vec<usize> = batches.into_iter().flatten().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_tensor_batch_select() {
        let mut buffer = RolloutBuffer::new(2, 2, 3, 0);
        for step in 0..2 {
            for env in 0..2 {
                let obs = vec![(step * 2 + env) as f32; 3];
                buffer.add(step, env, transition(obs, (step * 2 + env) as i64, 0.0, 0.0, false));
            }
        }
        buffer.compute_advantages(&[0.0, 0.0], &[false, false], 0.99, 0.95);

        let tensors = TensorBatch::from_batch(&buffer.get_batch(), Device::Cpu);
        assert_eq!(tensors.len(), 4);
        assert_eq!(tensors.observations.size(), vec![4, 3]);
        assert!(tensors.recurrent_state.is_none());

        let picked = tensors.select(&[3, 1]);
        assert_eq!(picked.len(), 2);
        assert_eq!(Vec::<i64>::try_from(&picked.actions).unwrap(), vec![3, 1]);
        assert_eq!(picked.observations.double_value(&[0, 0]), 3.0);
    }

    #[test]
    fn test_explained_variance() {
        let mut buffer = RolloutBuffer::new(2, 1, 1, 0);
        buffer.add(0, 0, transition(vec![0.0], 0, 1.0, 0.0, false));
        buffer.add(1, 0, transition(vec![0.0], 0, 0.0, 0.0, false));
        buffer.compute_advantages(&[0.0], &[false], 1.0, 1.0);

        // Zero values explain nothing
        let tensors = TensorBatch::from_batch(&buffer.get_batch(), Device::Cpu);
        assert!(tensors.explained_variance().abs() < 1e-9);

        // Constant returns have no variance
        let mut flat = RolloutBuffer::new(2, 1, 1, 0);
        flat.add(0, 0, transition(vec![0.0], 0, 0.0, 0.0, false));
        flat.add(1, 0, transition(vec![0.0], 0, 0.0, 0.0, false));
        flat.compute_advantages(&[0.0], &[false], 1.0, 1.0);
        let tensors = TensorBatch::from_batch(&flat.get_batch(), Device::Cpu);
        assert!(tensors.explained_variance().is_nan());
    }
}
