//! Correlated oblivious transfer, used to hand the evaluator the labels of its own inputs.
//!
//! * `chou_orlandi`: Chou-Orlandi base OT over Ristretto.
//! * `alsz`: ALSZ-style OT extension with the correlation fixed to Δ.

mod alsz;
mod chou_orlandi;

use rand::{CryptoRng, RngCore};
use tracing::debug;

use crate::{
    channel::{Channel, MsgChannel},
    data_types::{Delta, Label},
    protocol::{Error, ProtocolViolation},
};

/// A correlated OT primitive whose correlation is the garbler's offset Δ.
///
/// After `setup`, every round of `extend_correlated` yields `q_i` to the sender and
/// `q_i ⊕ r_i·Δ` to the receiver, for the receiver's choice bits `r_i`.
pub(crate) trait CorrelatedOt {
    /// Sets the primitive up once per peer pairing: as the sender if a correlation is given,
    /// as the receiver otherwise.
    async fn setup(
        &mut self,
        channel: &mut MsgChannel<impl Channel>,
        peer: usize,
        correlation: Option<Delta>,
        rng: &mut (impl CryptoRng + RngCore),
    ) -> Result<(), Error>;

    /// Runs one extension round of `count` correlated OTs. The sender ignores `choices`.
    async fn extend_correlated(
        &mut self,
        channel: &mut MsgChannel<impl Channel>,
        peer: usize,
        count: usize,
        choices: &[bool],
    ) -> Result<Vec<Label>, Error>;
}

/// The ALSZ OT extension over Chou-Orlandi base OTs.
#[derive(Default)]
pub(crate) enum OtExtension {
    #[default]
    Idle,
    Sender(alsz::Sender),
    Receiver(alsz::Receiver),
}

impl CorrelatedOt for OtExtension {
    async fn setup(
        &mut self,
        channel: &mut MsgChannel<impl Channel>,
        peer: usize,
        correlation: Option<Delta>,
        rng: &mut (impl CryptoRng + RngCore),
    ) -> Result<(), Error> {
        if !matches!(self, OtExtension::Idle) {
            return Err(ProtocolViolation::OtSetupRepeated.into());
        }
        *self = match correlation {
            Some(delta) => OtExtension::Sender(alsz::Sender::setup(channel, peer, delta, rng).await?),
            None => OtExtension::Receiver(alsz::Receiver::setup(channel, peer, rng).await?),
        };
        debug!(sender = correlation.is_some(), "OT extension set up");
        Ok(())
    }

    async fn extend_correlated(
        &mut self,
        channel: &mut MsgChannel<impl Channel>,
        peer: usize,
        count: usize,
        choices: &[bool],
    ) -> Result<Vec<Label>, Error> {
        match self {
            OtExtension::Idle => Err(ProtocolViolation::OtNotSetUp.into()),
            OtExtension::Sender(sender) => sender.extend(channel, peer, count).await,
            OtExtension::Receiver(receiver) => {
                if choices.len() != count {
                    return Err(ProtocolViolation::MissingInputLabels {
                        expected: count as u64,
                        actual: choices.len() as u64,
                    }
                    .into());
                }
                receiver.extend(channel, peer, choices).await
            }
        }
    }
}
