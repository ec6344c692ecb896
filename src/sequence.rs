// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Instruction sequences.
//!
//! An [`InstructionSequence`] is the ordered, immutable record of the
//! operations that turned one image into one variant. It is the output of
//! generation and the input of verification.
//!
//! # Invariants
//! - `instructions[i].index == i` (strictly monotonic, no gaps)
//! - every operation validates against `shape`
//! - forward replay of the sequence on the image yields the variant bytes,
//!   reverse replay of the inverses on the variant yields the image bytes
//!
//! There is no mutating API: a sequence is built once, through validation,
//! and then only read, encoded and replayed.

use serde::{Deserialize, Serialize};

use crate::digest::{hash_bytes, ContentHash};
use crate::error::{KernelError, Result};
use crate::ops::Operation;
use crate::replay::{replay_forward, replay_reverse};
use crate::types::id::ImageId;
use crate::types::image::{ImageBuffer, ImageShape};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub index: u32,
    pub op: Operation,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionSequence {
    image_id: ImageId,
    shape: ImageShape,
    instructions: Vec<Instruction>,
}

impl InstructionSequence {
    /// Builds a sequence, validating every operation against `shape`.
    ///
    /// Fails with [`KernelError::Configuration`] on the first operation whose
    /// parameters fall outside their domain.
    pub fn new(image_id: ImageId, shape: ImageShape, ops: impl IntoIterator<Item = Operation>) -> Result<Self> {
        shape.validate()?;
        let mut instructions = Vec::new();
        for (i, op) in ops.into_iter().enumerate() {
            op.validate(&shape)
                .map_err(|e| KernelError::configuration(format!("operation #{}: {}", i, e)))?;
            let index = u32::try_from(i)
                .map_err(|_| KernelError::configuration("sequence longer than u32::MAX operations"))?;
            instructions.push(Instruction { index, op });
        }
        Ok(Self { image_id, shape, instructions })
    }

    pub fn image_id(&self) -> ImageId {
        self.image_id
    }

    pub fn shape(&self) -> ImageShape {
        self.shape
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn operations(&self) -> impl DoubleEndedIterator<Item = &Operation> + '_ {
        self.instructions.iter().map(|i| &i.op)
    }

    /// Inverse operations in the order they must be applied.
    pub fn inverse_operations(&self) -> impl Iterator<Item = Operation> + '_ {
        self.instructions.iter().rev().map(|i| i.op.invert())
    }

    /// Re-checks the invariants of a sequence that arrived from storage or
    /// over the wire. Violations are malformed data, reported as
    /// [`KernelError::Application`].
    pub fn check_integrity(&self) -> Result<()> {
        self.shape.validate().map_err(KernelError::into_application)?;
        for (i, ins) in self.instructions.iter().enumerate() {
            if ins.index as usize != i {
                return Err(KernelError::application(format!(
                    "instruction at position {} carries index {}",
                    i, ins.index
                )));
            }
            ins.op
                .validate(&self.shape)
                .map_err(|e| KernelError::application(format!("operation #{}: {}", i, e)))?;
        }
        Ok(())
    }

    /// Forward replay on a copy of `source`.
    pub fn apply(&self, source: &ImageBuffer) -> Result<ImageBuffer> {
        replay_forward(self, source)
    }

    /// Reverse replay on a copy of `modified`.
    pub fn reverse(&self, modified: &ImageBuffer) -> Result<ImageBuffer> {
        replay_reverse(self, modified)
    }

    /// Canonical bincode encoding.
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| KernelError::Encoding(e.to_string()))
    }

    /// Decodes and integrity-checks a canonical encoding.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (seq, read): (Self, usize) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| KernelError::Encoding(e.to_string()))?;
        if read != bytes.len() {
            return Err(KernelError::Encoding(format!(
                "{} trailing bytes after sequence",
                bytes.len() - read
            )));
        }
        seq.check_integrity()?;
        Ok(seq)
    }

    /// BLAKE3 of the canonical encoding.
    pub fn digest(&self) -> Result<ContentHash> {
        Ok(hash_bytes(&self.encode()?))
    }
}
