//! Wire labels for both parties' inputs.
//!
//! The garbler samples the zero label of every input wire itself. For its own inputs it sends the
//! active label along with the gate batch. For the evaluator's inputs it queues the zero labels
//! and, once the batch was sent, serves them through one correlated OT round per queued entry:
//! the evaluator learns exactly the label selected by its input bit and the garbler learns
//! nothing about that bit.

use std::collections::VecDeque;

use rand::{CryptoRng, Rng, RngCore};
use tracing::debug;

use crate::{
    channel::{Channel, MsgChannel},
    data_types::{Delta, Label},
    ot::{CorrelatedOt, OtExtension},
    protocol::{Error, ProtocolViolation},
};

/// Produces the garbler's label pairs and transfers the evaluator's input labels.
pub(crate) struct WireKeySource<O: CorrelatedOt = OtExtension> {
    peer: usize,
    ot: O,
    delta: Option<Delta>,
    pending: VecDeque<Vec<Label>>,
}

impl<O: CorrelatedOt> WireKeySource<O> {
    pub(crate) fn new(peer: usize, ot: O) -> Self {
        Self {
            peer,
            ot,
            delta: None,
            pending: VecDeque::new(),
        }
    }

    /// Sets up the OT primitive, as the sender (garbler) if `delta` is given.
    pub(crate) async fn setup(
        &mut self,
        channel: &mut MsgChannel<impl Channel>,
        delta: Option<Delta>,
        rng: &mut (impl CryptoRng + RngCore),
    ) -> Result<(), Error> {
        self.ot.setup(channel, self.peer, delta, rng).await?;
        self.delta = delta;
        Ok(())
    }

    /// Returns a fresh label pair `(L0, L0 ⊕ Δ)`.
    pub(crate) fn derive(&self, rng: &mut impl Rng) -> Result<(Label, Label), Error> {
        let delta = self.delta.ok_or(ProtocolViolation::OtNotSetUp)?;
        let zero = Label::random(rng);
        Ok((zero, zero ^ delta))
    }

    /// Queues the zero labels of the evaluator inputs of one batch.
    pub(crate) fn obliviously_transfer(&mut self, zero_labels: Vec<Label>) {
        if !zero_labels.is_empty() {
            self.pending.push_back(zero_labels);
        }
    }

    /// The number of queued transfers.
    pub(crate) fn pending_transfers(&self) -> usize {
        self.pending.len()
    }

    /// Serves every queued transfer, one extension round each, in order.
    pub(crate) async fn process_receiver_inputs(
        &mut self,
        channel: &mut MsgChannel<impl Channel>,
    ) -> Result<(), Error> {
        while let Some(zero_labels) = self.pending.pop_front() {
            let qs = self
                .ot
                .extend_correlated(channel, self.peer, zero_labels.len(), &[])
                .await?;
            let masked: Vec<Label> = zero_labels.iter().zip(qs).map(|(l0, q)| *l0 ^ q).collect();
            channel
                .send_to(self.peer, "evaluator input labels", &masked)
                .await?;
            debug!(wires = masked.len(), "sent evaluator input labels");
        }
        Ok(())
    }

    /// Receives the labels selected by `choices`, one per wire.
    pub(crate) async fn receive(
        &mut self,
        channel: &mut MsgChannel<impl Channel>,
        choices: &[bool],
    ) -> Result<Vec<Label>, Error> {
        let ts = self
            .ot
            .extend_correlated(channel, self.peer, choices.len(), choices)
            .await?;
        let masked: Vec<Label> = channel
            .recv_vec_from(self.peer, "evaluator input labels", choices.len())
            .await?;
        debug!(wires = masked.len(), "received evaluator input labels");
        Ok(masked.into_iter().zip(ts).map(|(m, t)| m ^ t).collect())
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::channel::SimpleChannel;

    /// A mock primitive where both sides draw `q_i` from the same seeded PRG.
    struct MockOt {
        rng: ChaCha20Rng,
        delta: Delta,
        set_up: bool,
    }

    impl MockOt {
        fn new(seed: u64, delta: Delta) -> Self {
            Self {
                rng: ChaCha20Rng::seed_from_u64(seed),
                delta,
                set_up: false,
            }
        }
    }

    impl CorrelatedOt for MockOt {
        async fn setup(
            &mut self,
            _: &mut MsgChannel<impl Channel>,
            _: usize,
            _: Option<Delta>,
            _: &mut (impl CryptoRng + RngCore),
        ) -> Result<(), Error> {
            if std::mem::replace(&mut self.set_up, true) {
                return Err(ProtocolViolation::OtSetupRepeated.into());
            }
            Ok(())
        }

        async fn extend_correlated(
            &mut self,
            _: &mut MsgChannel<impl Channel>,
            _: usize,
            count: usize,
            choices: &[bool],
        ) -> Result<Vec<Label>, Error> {
            let qs = (0..count).map(|_| Label::random(&mut self.rng));
            if choices.is_empty() {
                Ok(qs.collect())
            } else {
                Ok(qs.zip(choices).map(|(q, r)| q ^ (*r & self.delta)).collect())
            }
        }
    }

    fn fraction(hits: usize, total: usize) -> f64 {
        hits as f64 / total as f64
    }

    #[tokio::test]
    async fn receiver_learns_only_the_selected_label() -> Result<(), Error> {
        const WIRES: usize = 4000;
        let (a, b) = SimpleChannel::pair();
        let (mut a, mut b) = (MsgChannel(a), MsgChannel(b));
        let mut rng = ChaCha20Rng::seed_from_u64(1234);
        let delta = Delta::random(&mut rng);

        let mut garbler = WireKeySource::new(1, MockOt::new(77, delta));
        let mut evaluator = WireKeySource::new(0, MockOt::new(77, delta));
        garbler.setup(&mut a, Some(delta), &mut rng).await?;
        evaluator.setup(&mut b, None, &mut rng).await?;

        let pairs: Vec<(Label, Label)> = (0..WIRES)
            .map(|_| garbler.derive(&mut rng))
            .collect::<Result<_, _>>()?;
        let choices: Vec<bool> = (0..WIRES).map(|_| rng.random()).collect();
        garbler.obliviously_transfer(pairs.iter().map(|(l0, _)| *l0).collect());
        assert_eq!(garbler.pending_transfers(), 1);

        let (_, received) = futures::future::try_join(
            garbler.process_receiver_inputs(&mut a),
            evaluator.receive(&mut b, &choices),
        )
        .await?;
        assert_eq!(garbler.pending_transfers(), 0);

        let mut color_hits = 0;
        for (((l0, l1), r), label) in pairs.iter().zip(&choices).zip(&received) {
            assert_eq!(*label, if *r { *l1 } else { *l0 });
            assert_ne!(*label, if *r { *l0 } else { *l1 });
            if label.color() == *r {
                color_hits += 1;
            }
        }
        // the received label on its own does not reveal the choice
        let bias = fraction(color_hits, WIRES);
        assert!((0.45..0.55).contains(&bias), "bias {bias}");
        Ok(())
    }

    #[tokio::test]
    async fn masked_labels_are_independent_of_the_choice() -> Result<(), Error> {
        const WIRES: usize = 4000;
        let (a, b) = SimpleChannel::pair();
        let (mut a, mut b) = (MsgChannel(a), MsgChannel(b));
        let mut rng = ChaCha20Rng::seed_from_u64(99);
        let delta = Delta::random(&mut rng);
        let mut garbler = WireKeySource::new(1, MockOt::new(5, delta));
        let mut receiver_ot = MockOt::new(5, delta);
        garbler.setup(&mut a, Some(delta), &mut rng).await?;
        receiver_ot.setup(&mut b, 0, None, &mut rng).await?;

        let pairs: Vec<(Label, Label)> = (0..WIRES)
            .map(|_| garbler.derive(&mut rng))
            .collect::<Result<_, _>>()?;
        let choices: Vec<bool> = (0..WIRES).map(|_| rng.random()).collect();
        garbler.obliviously_transfer(pairs.iter().map(|(l0, _)| *l0).collect());
        garbler.process_receiver_inputs(&mut a).await?;

        // the receiver's side of the round, keeping the transcript it saw
        let ts = receiver_ot
            .extend_correlated(&mut b, 0, WIRES, &choices)
            .await?;
        let masked: Vec<Label> = b.recv_vec_from(0, "evaluator input labels", WIRES).await?;

        let mut hits = 0;
        for ((((l0, l1), r), m), t) in pairs.iter().zip(&choices).zip(&masked).zip(ts) {
            assert_eq!(*m ^ t, if *r { *l1 } else { *l0 });
            if m.color() == *r {
                hits += 1;
            }
        }
        let bias = fraction(hits, WIRES);
        assert!((0.45..0.55).contains(&bias), "bias {bias}");
        Ok(())
    }

    #[tokio::test]
    async fn setup_is_required_and_unique() {
        let (a, _b) = SimpleChannel::pair();
        let mut a = MsgChannel(a);
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        let delta = Delta::random(&mut rng);
        let mut garbler = WireKeySource::new(1, MockOt::new(0, delta));
        assert!(matches!(
            garbler.derive(&mut rng),
            Err(Error::Protocol(ProtocolViolation::OtNotSetUp))
        ));
        garbler.setup(&mut a, Some(delta), &mut rng).await.unwrap();
        assert!(garbler.derive(&mut rng).is_ok());
        assert!(matches!(
            garbler.setup(&mut a, Some(delta), &mut rng).await,
            Err(Error::Protocol(ProtocolViolation::OtSetupRepeated))
        ));
    }
}
