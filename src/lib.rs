//! A Rust implementation of two-party garbled circuit (Yao) execution, with support for programs
//! that branch on values revealed during the run.
//!
//! Two parties, the garbler (party 0) and the evaluator (party 1), run the same boolean circuit
//! [`interpreter::Program`]. The garbler garbles every AND gate with half-gates (XOR and NOT are
//! free) and streams the ciphertexts to the evaluator in batches, one batch per time slice. The
//! evaluator obtains the labels of its own inputs through a correlated OT extension and resolves
//! each gate to the single label implied by the labels it holds.
//!
//! ## Runtime branching
//!
//! A program may reveal a value and then use it as a memory offset or a jump condition. Until
//! such a value has been opened to both parties, the instruction using it is *tainted*: it does
//! nothing, the slice ends, and the role rewinds the program counter by one instruction. In
//! [`config::Mode::Continuous`] the evaluator then opens the pending values to the garbler and
//! both parties re-execute the instruction. In [`config::Mode::Buffered`] the evaluator fetches
//! all batches before evaluating any of them, so a taint is a [`config::ConfigError`] instead.
//!
//! ## Main Components
//!
//! * [`protocol`]: [`protocol::garble`], [`protocol::evaluate`] and [`protocol::simulate_yao`].
//! * [`Garbler`] and [`Evaluator`]: the two roles, typed by their [`mode::Strategy`].
//! * [`channel`]: Communication abstractions for exchanging data between the parties.
//! * [`codec`]: The control tags and batches exchanged between the parties.
//! * [`interpreter`]: The bytecode the parties execute.
//!
//! ## Example
//!
//! ```ignore
//! use yao_runtime::{
//!     config::EngineConfig,
//!     interpreter::{Instruction, Program},
//!     protocol::simulate_yao,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let program = Program::new(
//!     vec![
//!         Instruction::InputGarbler(0),
//!         Instruction::InputEvaluator(1),
//!         Instruction::And { dst: 2, lhs: 0, rhs: 1 },
//!         Instruction::Reveal { dst: 0, src: vec![2] },
//!     ],
//!     0,
//! )?;
//! let (garbler, evaluator) =
//!     simulate_yao(&program, &[true], &[true], &EngineConfig::default()).await?;
//! assert_eq!(garbler.revealed, vec![1]);
//! assert_eq!(evaluator.revealed, vec![1]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Security Properties
//!
//! The implementation is secure against semi-honest adversaries. The free-XOR offset never leaves
//! the garbler, and the evaluator only ever holds one label per wire.
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod channel;
pub mod codec;
pub mod config;
pub mod interpreter;
pub mod mode;
pub mod protocol;
pub mod taint;

mod data_types;
mod evaluator;
mod garble;
mod garbler;
mod hash;
mod keys;
mod ot;
mod store;
mod utils;

pub use data_types::{Gate, Label, OutputMask};
pub use evaluator::Evaluator;
pub use garbler::Garbler;
pub use store::StoreError;
