//! Bridges the rand 0.9 generators used throughout the crate to the rand_core 0.6 traits expected
//! by `curve25519-dalek`.
use rand::{CryptoRng, RngCore};

/// Implements [`rand_core_0_6::RngCore`] and [`rand_core_0_6::CryptoRng`] for any rand 0.9
/// generator, so that it can sample Ristretto scalars.
pub(crate) struct RngCompat<R>(pub(crate) R);

impl<R: RngCore> rand_core_0_6::RngCore for RngCompat<R> {
    fn next_u32(&mut self) -> u32 {
        self.0.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.0.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.fill_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core_0_6::Error> {
        self.0.fill_bytes(dest);
        Ok(())
    }
}

impl<R: CryptoRng> rand_core_0_6::CryptoRng for RngCompat<R> {}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    #[test]
    fn forwards_to_the_wrapped_generator() {
        let mut direct = ChaCha20Rng::seed_from_u64(3);
        let mut wrapped = RngCompat(ChaCha20Rng::seed_from_u64(3));
        assert_eq!(
            rand_core_0_6::RngCore::next_u64(&mut wrapped),
            direct.next_u64()
        );
    }
}
