//! Configuration of a garbling run.

use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

/// The number of instructions executed per slice unless configured otherwise.
pub const DEFAULT_TIME_SLICE: usize = 1 << 16;

/// How the evaluator consumes the garbler's batches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Batches are evaluated as they arrive. Supports programs that branch on revealed values.
    #[default]
    Continuous,
    /// All batches are fetched into a store first, then replayed. Only for branch-free programs.
    Buffered,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Continuous => f.write_str("continuous"),
            Mode::Buffered => f.write_str("buffered"),
        }
    }
}

/// The two roles of a garbled circuit run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Party 0, produces the garbled gates.
    Garbler,
    /// Party 1, evaluates the garbled gates.
    Evaluator,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Garbler => f.write_str("garbler"),
            Role::Evaluator => f.write_str("evaluator"),
        }
    }
}

/// The configuration both parties must agree on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Continuous or buffered evaluation.
    pub mode: Mode,
    /// The number of instructions per slice; every slice produces one batch.
    pub time_slice: usize,
    /// If set, the buffered evaluator stores batches in temporary files in this directory.
    pub store_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            time_slice: DEFAULT_TIME_SLICE,
            store_dir: None,
        }
    }
}

impl EngineConfig {
    /// Sets the mode.
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the number of instructions per slice.
    pub fn with_time_slice(mut self, time_slice: usize) -> Self {
        self.time_slice = time_slice;
        self
    }

    /// Stores buffered batches in temporary files in `dir`.
    pub fn with_store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store_dir = Some(dir.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.time_slice == 0 {
            return Err(ConfigError::ZeroTimeSlice);
        }
        Ok(())
    }
}

/// A run was configured in a way that cannot be honored.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The program depends on a revealed value while running in buffered mode.
    #[error(
        "the {role} hit an instruction that depends on a revealed value in buffered mode; \
         programs that branch on revealed values must run in continuous mode"
    )]
    RestartInBufferedMode {
        /// The role that detected it.
        role: Role,
    },
    /// The parties are configured with different modes.
    #[error("local mode {local} does not match the peer's mode {peer}")]
    ModeMismatch {
        /// This party's mode.
        local: Mode,
        /// The other party's mode.
        peer: Mode,
    },
    /// The parties are configured with different time slices.
    #[error("local time slice {local} does not match the peer's time slice {peer}")]
    TimeSliceMismatch {
        /// This party's time slice.
        local: usize,
        /// The other party's time slice.
        peer: usize,
    },
    /// A role type was constructed with a configuration for the other mode.
    #[error("a {typed} role cannot run with a {configured} configuration")]
    RoleModeConflict {
        /// The mode of the role type.
        typed: Mode,
        /// The configured mode.
        configured: Mode,
    },
    /// The time slice must allow at least one instruction.
    #[error("the time slice must be at least 1")]
    ZeroTimeSlice,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_builders() {
        let config = EngineConfig::default();
        assert_eq!(config.mode, Mode::Continuous);
        assert_eq!(config.time_slice, DEFAULT_TIME_SLICE);
        assert!(config.validate().is_ok());

        let config = config.with_mode(Mode::Buffered).with_time_slice(0);
        assert_eq!(config.mode, Mode::Buffered);
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeSlice));
    }

    #[test]
    fn store_dir_survives_serialization() {
        let config: EngineConfig = bincode::deserialize(
            &bincode::serialize(&EngineConfig::default().with_store_dir("/tmp")).unwrap(),
        )
        .unwrap();
        assert_eq!(config.store_dir, Some(PathBuf::from("/tmp")));
    }

    #[test]
    fn errors_name_the_offending_role() {
        let err = ConfigError::RestartInBufferedMode {
            role: Role::Evaluator,
        };
        assert!(err.to_string().starts_with("the evaluator"));
    }
}
