//! Continuous and buffered execution, encoded in the role types.
//!
//! Only the [`Continuous`] roles have a restart path. The [`Buffered`] roles turn a restart into a
//! [`ConfigError::RestartInBufferedMode`], since the batches they consume were produced before any
//! revealed value was known.

use tracing::debug;

use crate::{
    channel::{Channel, MsgChannel},
    config::{ConfigError, EngineConfig, Mode},
    protocol::Error,
};

mod sealed {
    pub trait Sealed {}
}

/// The execution strategy of a role.
pub trait Strategy: sealed::Sealed {
    /// The mode this strategy implements.
    const MODE: Mode;
}

/// Batches are evaluated as they arrive; revealed values can be branched on.
#[derive(Debug, Clone, Copy, Default)]
pub struct Continuous;

/// All batches are stored first and replayed afterwards; only for branch-free programs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Buffered;

impl sealed::Sealed for Continuous {}
impl sealed::Sealed for Buffered {}

impl Strategy for Continuous {
    const MODE: Mode = Mode::Continuous;
}

impl Strategy for Buffered {
    const MODE: Mode = Mode::Buffered;
}

/// Validates the local configuration against the role type `S`.
pub(crate) fn check<S: Strategy>(config: &EngineConfig) -> Result<(), ConfigError> {
    config.validate()?;
    if config.mode != S::MODE {
        return Err(ConfigError::RoleModeConflict {
            typed: S::MODE,
            configured: config.mode,
        });
    }
    Ok(())
}

/// Exchanges mode and time slice with the peer; both must match.
pub(crate) async fn handshake<S: Strategy>(
    channel: &mut MsgChannel<impl Channel>,
    peer: usize,
    config: &EngineConfig,
) -> Result<(), Error> {
    check::<S>(config)?;
    let local = (S::MODE, config.time_slice as u64);
    channel.send_to(peer, "mode handshake", &local).await?;
    let (mode, time_slice): (Mode, u64) = channel.recv_from(peer, "mode handshake").await?;
    if mode != S::MODE {
        return Err(ConfigError::ModeMismatch {
            local: S::MODE,
            peer: mode,
        }
        .into());
    }
    if time_slice != local.1 {
        return Err(ConfigError::TimeSliceMismatch {
            local: config.time_slice,
            peer: time_slice as usize,
        }
        .into());
    }
    let mode = S::MODE;
    debug!(%mode, time_slice, "handshake complete");
    Ok(())
}
