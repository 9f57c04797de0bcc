//! Chou-Orlandi base oblivious transfer (cf. <https://eprint.iacr.org/2015/267>) over the
//! Ristretto group.
//!
//! The receiver's points are randomized per transfer and the transfer index is hashed into every
//! key, so that the keys of different transfers are independent.

use curve25519_dalek::{
    ristretto::{CompressedRistretto, RistrettoPoint},
    scalar::Scalar,
};
use rand::{CryptoRng, RngCore};

use crate::{
    channel::{Channel, MsgChannel},
    protocol::{Error, ProtocolViolation},
    utils::RngCompat,
};

fn hash_pt(tweak: u128, pt: &RistrettoPoint) -> u128 {
    let h = blake3::keyed_hash(pt.compress().as_bytes(), &tweak.to_le_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&h.as_bytes()[..16]);
    u128::from_le_bytes(bytes)
}

fn decompress(bytes: [u8; 32]) -> Result<RistrettoPoint, ProtocolViolation> {
    CompressedRistretto(bytes)
        .decompress()
        .ok_or(ProtocolViolation::InvalidOtMessage("not a Ristretto point"))
}

/// Sends one of two messages per transfer.
pub(crate) async fn send(
    channel: &mut MsgChannel<impl Channel>,
    peer: usize,
    inputs: &[(u128, u128)],
    rng: &mut (impl CryptoRng + RngCore),
) -> Result<(), Error> {
    let y = Scalar::random(&mut RngCompat(&mut *rng));
    let s = RistrettoPoint::mul_base(&y);
    channel
        .send_to(peer, "CO_OT_s", &s.compress().to_bytes())
        .await?;
    let ys = y * s;

    let r_points: Vec<[u8; 32]> = channel.recv_vec_from(peer, "CO_OT_r", inputs.len()).await?;
    let mut c0c1 = Vec::with_capacity(inputs.len());
    for (i, (r, (m0, m1))) in r_points.into_iter().zip(inputs).enumerate() {
        let yr = y * decompress(r)?;
        let k0 = hash_pt(i as u128, &yr);
        let k1 = hash_pt(i as u128, &(yr - ys));
        c0c1.push((k0 ^ m0, k1 ^ m1));
    }
    channel.send_to(peer, "CO_OT_c0c1", &c0c1).await?;
    Ok(())
}

/// Receives the message selected by each choice bit.
pub(crate) async fn receive(
    channel: &mut MsgChannel<impl Channel>,
    peer: usize,
    choices: &[bool],
    rng: &mut (impl CryptoRng + RngCore),
) -> Result<Vec<u128>, Error> {
    let s: [u8; 32] = channel.recv_from(peer, "CO_OT_s").await?;
    let s = decompress(s)?;

    let mut keys = Vec::with_capacity(choices.len());
    let mut r_points = Vec::with_capacity(choices.len());
    for (i, b) in choices.iter().enumerate() {
        let x = Scalar::random(&mut RngCompat(&mut *rng));
        let c = if *b { Scalar::ONE } else { Scalar::ZERO };
        let r = c * s + RistrettoPoint::mul_base(&x);
        r_points.push(r.compress().to_bytes());
        keys.push(hash_pt(i as u128, &(x * s)));
    }
    channel.send_to(peer, "CO_OT_r", &r_points).await?;

    let c0c1: Vec<(u128, u128)> = channel
        .recv_vec_from(peer, "CO_OT_c0c1", choices.len())
        .await?;
    Ok(choices
        .iter()
        .zip(keys)
        .zip(c0c1)
        .map(|((b, k), (c0, c1))| k ^ if *b { c1 } else { c0 })
        .collect())
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::channel::SimpleChannel;

    #[tokio::test]
    async fn receiver_gets_the_chosen_messages() -> Result<(), Error> {
        let (a, b) = SimpleChannel::pair();
        let (mut a, mut b) = (MsgChannel(a), MsgChannel(b));
        let inputs: Vec<(u128, u128)> = (0..8).map(|i| (i, 100 + i)).collect();
        let choices = vec![true, false, false, true, true, true, false, false];

        let mut rng_a = ChaCha20Rng::seed_from_u64(1);
        let mut rng_b = ChaCha20Rng::seed_from_u64(2);
        let ((), received) = futures::future::try_join(
            send(&mut a, 1, &inputs, &mut rng_a),
            receive(&mut b, 0, &choices, &mut rng_b),
        )
        .await?;

        for ((m0, m1), (b, r)) in inputs.iter().zip(choices.iter().zip(received)) {
            assert_eq!(r, if *b { *m1 } else { *m0 });
        }
        Ok(())
    }

    #[tokio::test]
    async fn invalid_points_are_rejected() {
        let (a, b) = SimpleChannel::pair();
        let (mut a, mut b) = (MsgChannel(a), MsgChannel(b));
        // not a canonical encoding of any point
        a.send_to(1, "CO_OT_s", &[0xffu8; 32]).await.unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        let err = receive(&mut b, 0, &[true], &mut rng).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolViolation::InvalidOtMessage(_))
        ));
    }
}
