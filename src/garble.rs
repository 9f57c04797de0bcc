//! Half-gates garbling and evaluation of AND gates.
//!
//! XOR gates are free (the XOR of the input labels) and NOT gates flip the garbler's zero label by
//! the offset Δ while the evaluator keeps its label unchanged, so only AND gates produce a
//! ciphertext.

use crate::{
    data_types::{Delta, Gate, Label},
    hash::{hash, tweak},
};

/// Garbles an AND gate given the zero labels of both inputs.
///
/// Returns the two half-gate ciphertexts and the zero label of the output wire.
pub(crate) fn garble_and(a0: Label, b0: Label, delta: Delta, gate_index: u64) -> (Gate, Label) {
    let j0 = tweak(gate_index, 0);
    let j1 = tweak(gate_index, 1);
    let pa = a0.color();
    let pb = b0.color();
    let a1 = a0 ^ delta;
    let b1 = b0 ^ delta;

    let ha0 = hash(a0, j0);
    let hb0 = hash(b0, j1);

    // garbler half gate
    let tg = ha0 ^ hash(a1, j0) ^ (pb & delta);
    let wg0 = ha0 ^ tg.select(pa);

    // evaluator half gate
    let te = hb0 ^ hash(b1, j1) ^ a0;
    let we0 = hb0 ^ (te ^ a0).select(pb);

    (Gate([tg, te]), wg0 ^ we0)
}

/// Evaluates an AND gate using exactly the two labels held for its inputs.
pub(crate) fn evaluate_and(a: Label, b: Label, gate: &Gate, gate_index: u64) -> Label {
    let Gate([tg, te]) = *gate;
    let wg = hash(a, tweak(gate_index, 0)) ^ tg.select(a.color());
    let we = hash(b, tweak(gate_index, 1)) ^ (te ^ a).select(b.color());
    wg ^ we
}

/// The garbler's zero label of the output of a NOT gate.
pub(crate) fn garble_not(a0: Label, delta: Delta) -> Label {
    a0 ^ delta
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn active(zero: Label, bit: bool, delta: Delta) -> Label {
        zero ^ (bit & delta)
    }

    #[test]
    fn and_xor_not_for_all_inputs() {
        let mut rng = StdRng::seed_from_u64(42);
        for gate_index in 0..16 {
            let delta = Delta::random(&mut rng);
            let a0 = Label::random(&mut rng);
            let b0 = Label::random(&mut rng);
            let (gate, c0) = garble_and(a0, b0, delta, gate_index);
            let x0 = a0 ^ b0;
            let n0 = garble_not(a0, delta);
            for (a, b) in [(false, false), (false, true), (true, false), (true, true)] {
                let la = active(a0, a, delta);
                let lb = active(b0, b, delta);

                let c = evaluate_and(la, lb, &gate, gate_index);
                assert_eq!(c, active(c0, a & b, delta));
                assert_ne!(c, active(c0, !(a & b), delta));

                assert_eq!(la ^ lb, active(x0, a ^ b, delta));
                assert_eq!(la, active(n0, !a, delta));
            }
        }
    }

    #[test]
    fn wrong_gate_index_does_not_decrypt() {
        let mut rng = StdRng::seed_from_u64(1);
        let delta = Delta::random(&mut rng);
        let a0 = Label::random(&mut rng);
        let b0 = Label::random(&mut rng);
        let (gate, c0) = garble_and(a0, b0, delta, 5);
        let a1 = a0 ^ delta;
        let b1 = b0 ^ delta;
        let c = evaluate_and(a1, b1, &gate, 6);
        assert_ne!(c, c0);
        assert_ne!(c, c0 ^ delta);
    }

    proptest! {
        #[test]
        fn and_gate_matches_truth_table(
            seed in any::<u64>(),
            gate_index in any::<u64>(),
            a in any::<bool>(),
            b in any::<bool>(),
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let delta = Delta::random(&mut rng);
            let a0 = Label::random(&mut rng);
            let b0 = Label::random(&mut rng);
            let (gate, c0) = garble_and(a0, b0, delta, gate_index >> 1);
            let c = evaluate_and(
                active(a0, a, delta),
                active(b0, b, delta),
                &gate,
                gate_index >> 1,
            );
            prop_assert_eq!(c, active(c0, a & b, delta));
        }
    }
}
