//! The cryptographic hash function used to garble circuits.

use crate::data_types::Label;

/// Derives the tweak for one half of an AND gate from its global gate index.
pub(crate) fn tweak(gate: u64, half: u8) -> u128 {
    ((gate as u128) << 1) | (half & 1) as u128
}

/// Hashes a label under the given tweak, yielding a label-sized pad.
pub(crate) fn hash(label: Label, tweak: u128) -> Label {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&label.0.to_le_bytes());
    hasher.update(&tweak.to_le_bytes());
    let mut output_reader = hasher.finalize_xof();
    let mut bytes = [0u8; 16];
    output_reader.fill(&mut bytes);
    Label(u128::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tweaks_do_not_collide() {
        assert_ne!(tweak(0, 1), tweak(1, 0));
        assert_eq!(tweak(3, 0), 6);
        assert_eq!(tweak(3, 1), 7);
    }

    #[test]
    fn hash_depends_on_tweak_and_label() {
        let label = Label(0x1234_5678);
        assert_eq!(hash(label, 1), hash(label, 1));
        assert_ne!(hash(label, 1), hash(label, 2));
        assert_ne!(hash(label, 1), hash(Label(0x1234_5679), 1));
    }
}
