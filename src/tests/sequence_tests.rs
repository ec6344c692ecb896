// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use serde::Serialize;

use super::noise;
use crate::error::KernelError;
use crate::ops::{Operation, Region};
use crate::sequence::{Instruction, InstructionSequence};
use crate::types::{ImageBuffer, ImageId, ImageShape, PixelFormat};

fn rgb_4x4() -> ImageBuffer {
    let shape = ImageShape::new(4, 4, PixelFormat::Rgb8);
    ImageBuffer::new(shape, (0..48u8).collect()).unwrap()
}

#[test]
fn test_xor_then_rotate_on_4x4_rgb() {
    let source = rgb_4x4();
    assert_eq!(source.len(), 48);

    let seq = InstructionSequence::new(
        ImageId::new(),
        source.shape(),
        vec![Operation::xor_mask(7, 3), Operation::channel_rotate(1)],
    )
    .unwrap();
    assert_eq!(seq.len(), 2);
    assert_eq!(seq.instructions()[0].index, 0);
    assert_eq!(seq.instructions()[1].index, 1);

    let variant = seq.apply(&source).unwrap();
    assert_eq!(variant.len(), 48);
    assert_ne!(variant, source);

    // Inverses run last to first: rotate(-1), then the xor again.
    let inverses: Vec<Operation> = seq.inverse_operations().collect();
    assert_eq!(inverses, vec![Operation::channel_rotate(-1), Operation::xor_mask(7, 3)]);

    let reversed = seq.reverse(&variant).unwrap();
    assert_eq!(reversed.as_bytes(), source.as_bytes());
}

#[test]
fn test_order_matters() {
    let source = noise(ImageShape::new(4, 4, PixelFormat::Rgb8), 8);
    let id = ImageId::new();
    let ab = InstructionSequence::new(id, source.shape(), vec![Operation::xor_mask(7, 5), Operation::channel_rotate(1)]).unwrap();
    let ba = InstructionSequence::new(id, source.shape(), vec![Operation::channel_rotate(1), Operation::xor_mask(7, 5)]).unwrap();
    assert_ne!(ab.apply(&source).unwrap(), ba.apply(&source).unwrap());
}

#[test]
fn test_permute_block_not_dividing_width_is_configuration_error() {
    let shape = ImageShape::new(4, 4, PixelFormat::Rgb8);
    let res = InstructionSequence::new(
        ImageId::new(),
        shape,
        vec![Operation::xor_mask(1, 2), Operation::permute_block(9, 3)],
    );
    match res {
        Err(KernelError::Configuration(msg)) => assert!(msg.contains("operation #1"), "{}", msg),
        other => panic!("expected configuration error, got {:?}", other),
    }
}

#[test]
fn test_empty_sequence_is_identity() {
    let source = noise(ImageShape::new(3, 2, PixelFormat::GrayAlpha8), 4);
    let seq = InstructionSequence::new(ImageId::new(), source.shape(), Vec::new()).unwrap();
    assert!(seq.is_empty());
    assert_eq!(seq.apply(&source).unwrap(), source);
    assert_eq!(seq.reverse(&source).unwrap(), source);
}

#[test]
fn test_shape_mismatch_is_application_error() {
    let seq = InstructionSequence::new(
        ImageId::new(),
        ImageShape::new(4, 4, PixelFormat::Rgb8),
        vec![Operation::xor_mask(1, 1)],
    )
    .unwrap();
    let other = noise(ImageShape::new(4, 4, PixelFormat::Rgba8), 1);
    assert!(matches!(seq.reverse(&other), Err(KernelError::Application(_))));
}

#[test]
fn test_encode_decode_and_digest() {
    let shape = ImageShape::new(8, 8, PixelFormat::Rgba8);
    let seq = InstructionSequence::new(
        ImageId::new(),
        shape,
        vec![
            Operation::permute_block(5, 8).within(Region::new(8, 16)),
            Operation::xor_mask(6, 17),
            Operation::channel_rotate(-3),
        ],
    )
    .unwrap();

    let bytes = seq.encode().unwrap();
    let decoded = InstructionSequence::decode(&bytes).unwrap();
    assert_eq!(decoded, seq);
    assert_eq!(decoded.digest().unwrap(), seq.digest().unwrap());

    let mut trailing = bytes.clone();
    trailing.push(0);
    assert!(matches!(InstructionSequence::decode(&trailing), Err(KernelError::Encoding(_))));
    assert!(InstructionSequence::decode(&bytes[..bytes.len() - 1]).is_err());
}

/// Same field layout as `InstructionSequence`, without its constructor checks.
#[derive(Serialize)]
struct RawSequence {
    image_id: ImageId,
    shape: ImageShape,
    instructions: Vec<Instruction>,
}

fn encode_raw(raw: &RawSequence) -> Vec<u8> {
    bincode::serde::encode_to_vec(raw, bincode::config::standard()).unwrap()
}

#[test]
fn test_decode_rejects_gapped_indices() {
    let raw = RawSequence {
        image_id: ImageId::new(),
        shape: ImageShape::new(4, 4, PixelFormat::Rgb8),
        instructions: vec![
            Instruction { index: 0, op: Operation::xor_mask(1, 1) },
            Instruction { index: 2, op: Operation::xor_mask(2, 1) },
        ],
    };
    assert!(matches!(
        InstructionSequence::decode(&encode_raw(&raw)),
        Err(KernelError::Application(_))
    ));
}

#[test]
fn test_decode_reports_invalid_stored_operation_as_application_error() {
    let raw = RawSequence {
        image_id: ImageId::new(),
        shape: ImageShape::new(4, 4, PixelFormat::Rgb8),
        instructions: vec![Instruction { index: 0, op: Operation::permute_block(1, 3) }],
    };
    assert!(matches!(
        InstructionSequence::decode(&encode_raw(&raw)),
        Err(KernelError::Application(_))
    ));
}
