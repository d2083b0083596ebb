//! Policy networks
//!
//! Convolutional actor-critic built on tch-rs.

pub mod actor_critic;

pub use actor_critic::{
    ActOutput, ActorCritic, ActorCriticConfig, Evaluation, PolicyOutput, RecurrentState,
};
