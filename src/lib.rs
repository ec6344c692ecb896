// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.

//! reverso-kernel: deterministic, provably reversible pixel operations.
//!
//! Pure computation only. No I/O, no clock, no unseeded randomness: the
//! same sequence replayed on the same bytes gives the same result on every
//! machine, which is what lets verification run in a separate process.

pub mod config;
pub mod error;
pub mod types;
pub mod ops;
pub mod digest;
pub mod sequence;
pub mod replay;
pub mod sample;
pub mod verify;
pub mod proof;

pub use digest::{content_hash, ContentHash};
pub use error::{KernelError, KernelResult};
pub use ops::{Operation, OperationKind, Region};
pub use sequence::{Instruction, InstructionSequence};
pub use verify::{verify, ComparisonMethod, OriginalRef, Verdict, VerificationOutcome};

#[cfg(test)]
pub mod tests;
