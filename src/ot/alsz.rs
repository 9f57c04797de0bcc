//! Correlated oblivious transfer extension in the style of Asharov-Lindell-Schneider-Zohner
//! (cf. <https://eprint.iacr.org/2016/602>, Protocol 4).
//!
//! The extension sender's base-OT choice bits are the bits of the free-XOR offset Δ, so that the
//! extended outputs satisfy `t_i = q_i ⊕ r_i·Δ` for the receiver's choice bits `r_i`. The column
//! PRGs are kept across rounds, each round consuming one column segment per base OT.

use rand::{CryptoRng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::debug;

use crate::{
    channel::{Channel, MsgChannel},
    data_types::{Delta, Label},
    ot::chou_orlandi,
    protocol::{Error, ProtocolViolation},
    utils::{boolvec_to_u8vec, transpose_columns, xor_inplace},
};

/// The number of base OTs, equal to the label length.
const NROWS: usize = 128;

fn prg(seed: u128) -> ChaCha20Rng {
    ChaCha20Rng::from_seed(*blake3::hash(&seed.to_le_bytes()).as_bytes())
}

/// The extension sender, holding Δ.
pub(crate) struct Sender {
    delta: Delta,
    rngs: Vec<ChaCha20Rng>,
}

/// The extension receiver.
pub(crate) struct Receiver {
    rngs: Vec<(ChaCha20Rng, ChaCha20Rng)>,
}

impl Sender {
    /// Runs the base OTs as their receiver, choosing by the bits of Δ.
    pub(crate) async fn setup(
        channel: &mut MsgChannel<impl Channel>,
        peer: usize,
        delta: Delta,
        rng: &mut (impl CryptoRng + RngCore),
    ) -> Result<Self, Error> {
        let choices: Vec<bool> = (0..NROWS).map(|i| delta.bit(i)).collect();
        let seeds = chou_orlandi::receive(channel, peer, &choices, rng).await?;
        Ok(Self {
            delta,
            rngs: seeds.into_iter().map(prg).collect(),
        })
    }

    /// Returns `q_i` for `count` fresh correlated OTs.
    pub(crate) async fn extend(
        &mut self,
        channel: &mut MsgChannel<impl Channel>,
        peer: usize,
        count: usize,
    ) -> Result<Vec<Label>, Error> {
        let ncols = count.div_ceil(8);
        let uvec: Vec<Vec<u8>> = channel
            .recv_vec_from(peer, "ALSZ_OT_setup", self.rngs.len())
            .await?;
        let mut qs = Vec::with_capacity(NROWS);
        for (j, (rng, u)) in self.rngs.iter_mut().zip(uvec).enumerate() {
            if u.len() != ncols {
                return Err(ProtocolViolation::InvalidOtMessage("column length").into());
            }
            let mut q = vec![0u8; ncols];
            rng.fill_bytes(&mut q);
            if self.delta.bit(j) {
                xor_inplace(&mut q, &u);
            }
            qs.push(q);
        }
        debug!(count, "correlated OT extension (sender)");
        Ok(transpose_columns(&qs, count).into_iter().map(Label).collect())
    }
}

impl Receiver {
    /// Runs the base OTs as their sender, with a pair of random seeds per base OT.
    pub(crate) async fn setup(
        channel: &mut MsgChannel<impl Channel>,
        peer: usize,
        rng: &mut (impl CryptoRng + RngCore),
    ) -> Result<Self, Error> {
        let seeds: Vec<(u128, u128)> = (0..NROWS)
            .map(|_| {
                let mut k0 = [0u8; 16];
                let mut k1 = [0u8; 16];
                rng.fill_bytes(&mut k0);
                rng.fill_bytes(&mut k1);
                (u128::from_le_bytes(k0), u128::from_le_bytes(k1))
            })
            .collect();
        chou_orlandi::send(channel, peer, &seeds, rng).await?;
        Ok(Self {
            rngs: seeds.into_iter().map(|(k0, k1)| (prg(k0), prg(k1))).collect(),
        })
    }

    /// Returns `t_i = q_i ⊕ r_i·Δ` for one correlated OT per choice bit `r_i`.
    pub(crate) async fn extend(
        &mut self,
        channel: &mut MsgChannel<impl Channel>,
        peer: usize,
        choices: &[bool],
    ) -> Result<Vec<Label>, Error> {
        let r = boolvec_to_u8vec(choices);
        let ncols = r.len();
        let mut ts = Vec::with_capacity(NROWS);
        let mut uvec = Vec::with_capacity(NROWS);
        for (rng0, rng1) in self.rngs.iter_mut() {
            let mut t = vec![0u8; ncols];
            rng0.fill_bytes(&mut t);
            let mut u = vec![0u8; ncols];
            rng1.fill_bytes(&mut u);
            xor_inplace(&mut u, &t);
            xor_inplace(&mut u, &r);
            ts.push(t);
            uvec.push(u);
        }
        channel.send_to(peer, "ALSZ_OT_setup", &uvec).await?;
        debug!(count = choices.len(), "correlated OT extension (receiver)");
        Ok(transpose_columns(&ts, choices.len())
            .into_iter()
            .map(Label)
            .collect())
    }
}
