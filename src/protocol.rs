//! Secure 2-party computation of a garbled circuit program, with communication via channels.
use tracing::{Level, instrument};

use crate::{
    channel::{self, Channel, SimpleChannel},
    config::{ConfigError, EngineConfig, Mode},
    evaluator::Evaluator,
    garbler::Garbler,
    interpreter::{InterpreterError, Program},
    mode::{Buffered, Continuous},
    store::StoreError,
};

/// The party index of the garbler.
pub const GARBLER: usize = 0;
/// The party index of the evaluator.
pub const EVALUATOR: usize = 1;

/// A custom error type for garbled circuit computation and communication.
///
/// A restart request is not an error: it is handled inside the roles and never surfaces here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A message could not be sent or received.
    #[error("channel error: {0}")]
    Channel(#[from] channel::Error),
    /// The peer sent something the protocol does not allow at this point.
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),
    /// The run was configured in a way that cannot be honored.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
    /// The program is malformed or ran out of inputs.
    #[error("interpreter error: {0}")]
    Interpreter(#[from] InterpreterError),
    /// A temporary batch store could not be written or read.
    #[error("batch store error: {0}")]
    Store(#[from] StoreError),
}

/// Malformed, out-of-order or duplicate messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    /// A control tag other than `MORE` or `DONE`.
    #[error("unexpected control tag {0:#x}")]
    UnexpectedTag(u64),
    /// A gate batch and a mask batch with different sequence numbers.
    #[error("gate batch {gates} is paired with mask batch {masks}")]
    MismatchedBatchPair {
        /// The sequence number of the gate batch.
        gates: u64,
        /// The sequence number of the mask batch.
        masks: u64,
    },
    /// A batch arrived or was replayed out of order.
    #[error("expected batch {expected}, got batch {actual}")]
    OutOfOrderBatch {
        /// The sequence number of the next batch.
        expected: u64,
        /// The sequence number of the received batch.
        actual: u64,
    },
    /// A batch does not start at the next gate.
    #[error("expected a batch starting at gate {expected}, got gate {actual}")]
    UnexpectedGateIndex {
        /// The index of the next gate.
        expected: u64,
        /// The first gate index of the received batch.
        actual: u64,
    },
    /// The program needed more gates, inputs or masks than the batch contains.
    #[error("the batch has no data left for the current slice")]
    BatchExhausted,
    /// The slice ended before consuming the whole batch.
    #[error("{0} unused gates, labels or masks are left in the batch")]
    TrailingBatchData(usize),
    /// The garbler sent `DONE` before the program finished.
    #[error("the garbler finished before the program did")]
    UnexpectedDone,
    /// The garbler sent another batch after the program finished.
    #[error("expected DONE after the program finished")]
    MissingDone,
    /// Batches are left over after the program finished.
    #[error("{0} stored batches are left over after the program finished")]
    TrailingBatches(u64),
    /// The OT extension was set up a second time.
    #[error("the OT extension was already set up")]
    OtSetupRepeated,
    /// The OT extension was used before it was set up.
    #[error("the OT extension is not set up")]
    OtNotSetUp,
    /// An OT message could not be decoded.
    #[error("invalid OT message: {0}")]
    InvalidOtMessage(&'static str),
    /// The evaluator opened a different number of values than are pending.
    #[error("expected {expected} opened values, got {actual}")]
    OpeningCountMismatch {
        /// The number of pending values.
        expected: usize,
        /// The number of received values.
        actual: usize,
    },
    /// The evaluator input labels of a batch do not match its input count.
    #[error("expected {expected} evaluator input labels, got {actual}")]
    MissingInputLabels {
        /// The input count of the batch.
        expected: u64,
        /// The number of labels available.
        actual: u64,
    },
}

/// The outputs of one party.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outputs {
    /// Every value revealed to both parties, in program order.
    pub revealed: Vec<u64>,
    /// The values revealed to the evaluator only (always empty for the garbler).
    pub private: Vec<u64>,
}

/// Runs the garbler for the configured mode.
#[instrument(level = Level::DEBUG, skip_all, fields(mode = %config.mode), err)]
pub async fn garble(
    channel: impl Channel,
    program: &Program,
    inputs: &[bool],
    config: &EngineConfig,
) -> Result<Outputs, Error> {
    match config.mode {
        Mode::Continuous => {
            Garbler::<_, Continuous>::new(channel, config)
                .await?
                .run(program, inputs)
                .await
        }
        Mode::Buffered => {
            Garbler::<_, Buffered>::new(channel, config)
                .await?
                .run(program, inputs)
                .await
        }
    }
}

/// Runs the evaluator for the configured mode.
#[instrument(level = Level::DEBUG, skip_all, fields(mode = %config.mode), err)]
pub async fn evaluate(
    channel: impl Channel,
    program: &Program,
    inputs: &[bool],
    config: &EngineConfig,
) -> Result<Outputs, Error> {
    match config.mode {
        Mode::Continuous => {
            Evaluator::<_, Continuous>::new(channel, config)
                .await?
                .run(program, inputs)
                .await
        }
        Mode::Buffered => {
            Evaluator::<_, Buffered>::new(channel, config)
                .await?
                .run(program, inputs)
                .await
        }
    }
}

/// Runs both parties on in-memory channels and returns the garbler's and the evaluator's outputs.
pub async fn simulate_yao(
    program: &Program,
    garbler_inputs: &[bool],
    evaluator_inputs: &[bool],
    config: &EngineConfig,
) -> Result<(Outputs, Outputs), Error> {
    let (garbler, evaluator) = SimpleChannel::pair();
    futures::future::try_join(
        garble(garbler, program, garbler_inputs, config),
        evaluate(evaluator, program, evaluator_inputs, config),
    )
    .await
}
