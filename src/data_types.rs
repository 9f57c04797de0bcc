//! Data types used across different parts of the garbling engine.

use std::ops::{BitAnd, BitXor, BitXorAssign};

use rand::Rng;
use serde::{Deserialize, Serialize};
use subtle::{Choice, ConditionallySelectable};

/// The free-XOR offset known only to the garbler.
///
/// Every wire carries two labels that differ by exactly this value. The least significant bit is
/// always set, so that the two labels of a wire always have opposite colors. A `Delta` is never
/// serialized.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct Delta(pub(crate) u128);

impl Delta {
    /// Samples a fresh offset with its color bit forced to one.
    pub(crate) fn random(rng: &mut impl Rng) -> Self {
        Delta(rng.random::<u128>() | 1)
    }

    /// Returns bit `i` of the offset, used as the base-OT choice of the extension sender.
    pub(crate) fn bit(&self, i: usize) -> bool {
        (self.0 >> i) & 1 == 1
    }
}

impl std::fmt::Debug for Delta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Delta(..)")
    }
}

impl BitAnd<Delta> for bool {
    type Output = Label;

    fn bitand(self, rhs: Delta) -> Self::Output {
        Label::conditional_select(&Label(0), &Label(rhs.0), Choice::from(self as u8))
    }
}

/// A 128-bit wire label, representing one boolean value on one wire.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label(pub(crate) u128);

impl Label {
    /// Samples a uniformly random label.
    pub(crate) fn random(rng: &mut impl Rng) -> Self {
        Label(rng.random())
    }

    /// The point-and-permute color of the label (its least significant bit).
    pub fn color(&self) -> bool {
        self.0 & 1 == 1
    }

    /// Returns the label if `choice` is set, the all-zero label otherwise.
    pub(crate) fn select(self, choice: bool) -> Self {
        Label::conditional_select(&Label(0), &self, Choice::from(choice as u8))
    }
}

impl ConditionallySelectable for Label {
    fn conditional_select(a: &Self, b: &Self, choice: Choice) -> Self {
        Label(u128::conditional_select(&a.0, &b.0, choice))
    }
}

impl BitXor for Label {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self::Output {
        Label(self.0 ^ rhs.0)
    }
}

impl BitXorAssign for Label {
    fn bitxor_assign(&mut self, rhs: Self) {
        self.0 ^= rhs.0;
    }
}

impl BitXor<Delta> for Label {
    type Output = Self;

    fn bitxor(self, rhs: Delta) -> Self::Output {
        Label(self.0 ^ rhs.0)
    }
}

/// A garbled AND gate: the two half-gate ciphertexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gate(pub(crate) [Label; 2]);

/// Blinds the color of a revealed wire: the color of the wire's zero label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputMask(pub(crate) bool);

impl OutputMask {
    /// Strips the mask from the color of the label held by the evaluator.
    pub(crate) fn decode(self, label: Label) -> bool {
        label.color() ^ self.0
    }
}
