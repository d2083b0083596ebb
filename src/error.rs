//! Structured error types for the ColorGrid environment
//!
//! Training code propagates these through `anyhow`; the typed variants exist
//! so callers (and tests) can match on environment failures.

/// Errors raised by the ColorGrid environment.
#[derive(Debug, thiserror::Error)]
pub enum ColorGridError {
    /// Action index outside `0..4`
    #[error("invalid action index {0} (expected 0..4)")]
    InvalidAction(i64),

    /// Every cell is occupied when a block has to respawn
    #[error("no free cell left to spawn a {color} block")]
    NoFreeCell {
        /// Colour of the block that could not be placed
        color: &'static str,
    },

    /// Configuration rejected by validation
    #[error("invalid environment config: {0}")]
    InvalidConfig(String),

    /// `step` called before the first `reset`
    #[error("environment stepped before reset")]
    NotReset,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_action_display() {
        let err = ColorGridError::InvalidAction(7);
        assert_eq!(err.to_string(), "invalid action index 7 (expected 0..4)");
    }

    #[test]
    fn test_no_free_cell_display() {
        let err = ColorGridError::NoFreeCell { color: "red" };
        assert_eq!(err.to_string(), "no free cell left to spawn a red block");
    }

    #[test]
    fn test_converts_into_anyhow() {
        let err: anyhow::Error = ColorGridError::NotReset.into();
        assert!(err.downcast_ref::<ColorGridError>().is_some());
    }
}
