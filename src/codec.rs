//! The gate stream exchanged between garbler and evaluator.
//!
//! Every batch pair is preceded by a 64-bit control tag. A batch pair consists of a [`GateBatch`]
//! and a [`MaskBatch`], each serialized as a length-prefixed sequence of fixed-size records.

use std::vec;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    channel::{Channel, MsgChannel},
    data_types::{Gate, Label, OutputMask},
    protocol::{Error, ProtocolViolation},
};

/// The control tag announcing that another batch pair follows.
pub const MORE: u64 = 0;
/// The control tag announcing that no further batches follow.
pub const DONE: u64 = u64::MAX;

/// A decoded control tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlTag {
    /// Another batch pair follows.
    More,
    /// The run is complete.
    Done,
}

impl TryFrom<u64> for ControlTag {
    type Error = ProtocolViolation;

    fn try_from(tag: u64) -> Result<Self, Self::Error> {
        match tag {
            MORE => Ok(ControlTag::More),
            DONE => Ok(ControlTag::Done),
            tag => Err(ProtocolViolation::UnexpectedTag(tag)),
        }
    }
}

impl From<ControlTag> for u64 {
    fn from(tag: ControlTag) -> Self {
        match tag {
            ControlTag::More => MORE,
            ControlTag::Done => DONE,
        }
    }
}

/// The garbled gates and garbler input labels of one slice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateBatch {
    /// The position of the batch in the run.
    pub seq: u64,
    /// The global index of the first gate, used as the hash tweak.
    pub first_gate: u64,
    /// The half-gates ciphertexts, one per AND gate.
    pub gates: Vec<Gate>,
    /// The garbler's active input labels consumed in this slice.
    pub garbler_inputs: Vec<Label>,
    /// The number of evaluator input wires transferred by OT for this slice.
    pub evaluator_inputs: u64,
}

/// The output masks of one slice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskBatch {
    /// The position of the batch in the run, equal to that of its [`GateBatch`].
    pub seq: u64,
    /// One mask per revealed wire.
    pub masks: Vec<OutputMask>,
}

/// Accumulates what the garbler produces during a slice.
#[derive(Debug, Default)]
pub(crate) struct BatchBuilder {
    first_gate: u64,
    gates: Vec<Gate>,
    garbler_inputs: Vec<Label>,
    evaluator_zero_labels: Vec<Label>,
    masks: Vec<OutputMask>,
}

impl BatchBuilder {
    pub(crate) fn push_gate(&mut self, gate: Gate) {
        self.gates.push(gate);
    }

    pub(crate) fn push_garbler_input(&mut self, label: Label) {
        self.garbler_inputs.push(label);
    }

    pub(crate) fn push_evaluator_input(&mut self, zero_label: Label) {
        self.evaluator_zero_labels.push(zero_label);
    }

    pub(crate) fn push_mask(&mut self, mask: OutputMask) {
        self.masks.push(mask);
    }

    /// Empties the builder, returning the batch pair and the zero labels of the evaluator inputs.
    ///
    /// `next_gate` is the global index of the first gate of the following batch.
    pub(crate) fn take(&mut self, seq: u64, next_gate: u64) -> (GateBatch, MaskBatch, Vec<Label>) {
        let gates = GateBatch {
            seq,
            first_gate: std::mem::replace(&mut self.first_gate, next_gate),
            gates: std::mem::take(&mut self.gates),
            garbler_inputs: std::mem::take(&mut self.garbler_inputs),
            evaluator_inputs: self.evaluator_zero_labels.len() as u64,
        };
        let masks = MaskBatch {
            seq,
            masks: std::mem::take(&mut self.masks),
        };
        (gates, masks, std::mem::take(&mut self.evaluator_zero_labels))
    }
}

/// Hands out the contents of one received batch pair, in order.
#[derive(Debug, Default)]
pub(crate) struct BatchCursor {
    gates: vec::IntoIter<Gate>,
    garbler_inputs: vec::IntoIter<Label>,
    evaluator_inputs: vec::IntoIter<Label>,
    masks: vec::IntoIter<OutputMask>,
}

impl BatchCursor {
    /// Pairs a batch with the evaluator input labels received for it by OT.
    pub(crate) fn new(
        gates: GateBatch,
        masks: MaskBatch,
        evaluator_inputs: Vec<Label>,
    ) -> Result<Self, ProtocolViolation> {
        if gates.seq != masks.seq {
            return Err(ProtocolViolation::MismatchedBatchPair {
                gates: gates.seq,
                masks: masks.seq,
            });
        }
        if evaluator_inputs.len() as u64 != gates.evaluator_inputs {
            return Err(ProtocolViolation::MissingInputLabels {
                expected: gates.evaluator_inputs,
                actual: evaluator_inputs.len() as u64,
            });
        }
        Ok(Self {
            gates: gates.gates.into_iter(),
            garbler_inputs: gates.garbler_inputs.into_iter(),
            evaluator_inputs: evaluator_inputs.into_iter(),
            masks: masks.masks.into_iter(),
        })
    }

    pub(crate) fn next_gate(&mut self) -> Result<Gate, ProtocolViolation> {
        self.gates.next().ok_or(ProtocolViolation::BatchExhausted)
    }

    pub(crate) fn next_garbler_input(&mut self) -> Result<Label, ProtocolViolation> {
        self.garbler_inputs
            .next()
            .ok_or(ProtocolViolation::BatchExhausted)
    }

    pub(crate) fn next_evaluator_input(&mut self) -> Result<Label, ProtocolViolation> {
        self.evaluator_inputs
            .next()
            .ok_or(ProtocolViolation::BatchExhausted)
    }

    pub(crate) fn next_mask(&mut self) -> Result<OutputMask, ProtocolViolation> {
        self.masks.next().ok_or(ProtocolViolation::BatchExhausted)
    }

    /// Checks that the slice consumed the whole batch.
    pub(crate) fn finish(&self) -> Result<(), ProtocolViolation> {
        let leftover = self.gates.len()
            + self.garbler_inputs.len()
            + self.evaluator_inputs.len()
            + self.masks.len();
        if leftover == 0 {
            Ok(())
        } else {
            Err(ProtocolViolation::TrailingBatchData(leftover))
        }
    }
}

/// Sends `MORE` followed by the batch pair.
pub(crate) async fn send_batch(
    channel: &mut MsgChannel<impl Channel>,
    peer: usize,
    gates: &GateBatch,
    masks: &MaskBatch,
) -> Result<(), Error> {
    debug!(
        seq = gates.seq,
        gates = gates.gates.len(),
        masks = masks.masks.len(),
        "sending batch"
    );
    channel.send_tag(peer, ControlTag::More.into()).await?;
    channel.send_to(peer, "gate batch", gates).await?;
    channel.send_to(peer, "mask batch", masks).await?;
    Ok(())
}

/// Sends the `DONE` tag.
pub(crate) async fn send_done(channel: &mut MsgChannel<impl Channel>, peer: usize) -> Result<(), Error> {
    channel.send_tag(peer, ControlTag::Done.into()).await?;
    Ok(())
}

/// Receives the next batch pair, or `None` if the peer sent `DONE`.
pub(crate) async fn recv_batch(
    channel: &mut MsgChannel<impl Channel>,
    peer: usize,
) -> Result<Option<(GateBatch, MaskBatch)>, Error> {
    match ControlTag::try_from(channel.recv_tag(peer).await?)? {
        ControlTag::Done => Ok(None),
        ControlTag::More => {
            let gates: GateBatch = channel.recv_from(peer, "gate batch").await?;
            let masks: MaskBatch = channel.recv_from(peer, "mask batch").await?;
            debug!(seq = gates.seq, gates = gates.gates.len(), "received batch");
            Ok(Some((gates, masks)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::SimpleChannel;

    fn gate(i: u128) -> Gate {
        Gate([Label(i), Label(i + 1)])
    }

    #[test]
    fn builder_tracks_first_gate_and_resets() {
        let mut builder = BatchBuilder::default();
        builder.push_gate(gate(1));
        builder.push_gate(gate(3));
        builder.push_garbler_input(Label(9));
        builder.push_evaluator_input(Label(10));
        builder.push_mask(OutputMask(true));
        let (gates, masks, zero_labels) = builder.take(0, 2);
        assert_eq!(gates.first_gate, 0);
        assert_eq!(gates.gates.len(), 2);
        assert_eq!(gates.evaluator_inputs, 1);
        assert_eq!(masks.masks, vec![OutputMask(true)]);
        assert_eq!(zero_labels, vec![Label(10)]);

        let (gates, masks, zero_labels) = builder.take(1, 2);
        assert_eq!(gates.seq, 1);
        assert_eq!(gates.first_gate, 2);
        assert!(gates.gates.is_empty() && masks.masks.is_empty() && zero_labels.is_empty());
    }

    #[test]
    fn cursor_detects_exhaustion_and_leftovers() {
        let gates = GateBatch {
            seq: 4,
            first_gate: 0,
            gates: vec![gate(1)],
            garbler_inputs: vec![],
            evaluator_inputs: 1,
        };
        let masks = MaskBatch {
            seq: 4,
            masks: vec![OutputMask(false)],
        };
        let mut cursor = BatchCursor::new(gates.clone(), masks.clone(), vec![Label(2)]).unwrap();
        assert_eq!(cursor.finish(), Err(ProtocolViolation::TrailingBatchData(3)));
        assert_eq!(cursor.next_gate(), Ok(gate(1)));
        assert_eq!(cursor.next_gate(), Err(ProtocolViolation::BatchExhausted));
        assert_eq!(cursor.next_garbler_input(), Err(ProtocolViolation::BatchExhausted));
        assert_eq!(cursor.next_evaluator_input(), Ok(Label(2)));
        assert_eq!(cursor.next_mask(), Ok(OutputMask(false)));
        assert_eq!(cursor.finish(), Ok(()));

        assert_eq!(
            BatchCursor::new(gates.clone(), masks.clone(), vec![]).unwrap_err(),
            ProtocolViolation::MissingInputLabels {
                expected: 1,
                actual: 0
            }
        );
        let masks = MaskBatch { seq: 5, ..masks };
        assert_eq!(
            BatchCursor::new(gates, masks, vec![Label(2)]).unwrap_err(),
            ProtocolViolation::MismatchedBatchPair { gates: 4, masks: 5 }
        );
    }

    #[tokio::test]
    async fn batches_are_framed_by_control_tags() -> Result<(), Error> {
        let (a, b) = SimpleChannel::pair();
        let (mut a, mut b) = (MsgChannel(a), MsgChannel(b));
        let gates = GateBatch {
            seq: 0,
            first_gate: 7,
            gates: vec![gate(5)],
            garbler_inputs: vec![Label(1)],
            evaluator_inputs: 0,
        };
        let masks = MaskBatch {
            seq: 0,
            masks: vec![OutputMask(true), OutputMask(false)],
        };
        send_batch(&mut a, 1, &gates, &masks).await?;
        send_done(&mut a, 1).await?;
        a.send_tag(1, 42).await?;

        assert_eq!(recv_batch(&mut b, 0).await?, Some((gates, masks)));
        assert_eq!(recv_batch(&mut b, 0).await?, None);
        let err = recv_batch(&mut b, 0).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolViolation::UnexpectedTag(42))
        ));
        Ok(())
    }
}
