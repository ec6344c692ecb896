// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use super::noise;
use crate::config::KERNEL_VERSION;
use crate::digest::content_hash;
use crate::error::KernelError;
use crate::ops::Operation;
use crate::sequence::InstructionSequence;
use crate::types::{ImageBuffer, ImageId, ImageShape, PixelFormat};
use crate::verify::{verify, ComparisonMethod, OriginalRef, Verdict};

fn fixture() -> (ImageBuffer, InstructionSequence, ImageBuffer) {
    let source = noise(ImageShape::new(6, 4, PixelFormat::Rgb8), 77);
    let seq = InstructionSequence::new(
        ImageId::new(),
        source.shape(),
        vec![
            Operation::permute_block(10, 3),
            Operation::xor_mask(11, 9),
            Operation::channel_rotate(2),
            Operation::permute_block(12, 6),
        ],
    )
    .unwrap();
    let variant = seq.apply(&source).unwrap();
    (source, seq, variant)
}

#[test]
fn test_exact_match() {
    let (source, seq, variant) = fixture();
    let outcome = verify(&seq, &variant, &OriginalRef::Exact(source.as_bytes().to_vec())).unwrap();
    assert!(outcome.is_match());
    assert_eq!(outcome.method, ComparisonMethod::ExactBytes);
    assert_eq!(outcome.reversed_hash, content_hash(&source));
    assert!(outcome.first_mismatch.is_none());
    assert!(outcome.diagnostic.is_none());
}

#[test]
fn test_hash_match() {
    let (source, seq, variant) = fixture();
    let outcome = verify(&seq, &variant, &OriginalRef::ContentHash(content_hash(&source))).unwrap();
    assert_eq!(outcome.verdict, Verdict::Match);
    assert_eq!(outcome.method, ComparisonMethod::ContentHash);
}

#[test]
fn test_exact_mismatch_names_first_offset() {
    let (source, seq, variant) = fixture();
    let mut original = source.into_bytes();
    original[17] ^= 0xff;
    original[30] ^= 0x01;
    let outcome = verify(&seq, &variant, &OriginalRef::Exact(original)).unwrap();
    assert_eq!(outcome.verdict, Verdict::Mismatch);
    assert_eq!(outcome.first_mismatch, Some(17));
    assert!(outcome.diagnostic.unwrap().contains("byte 17"));
}

#[test]
fn test_length_mismatch_is_a_mismatch() {
    let (source, seq, variant) = fixture();
    let mut original = source.into_bytes();
    original.push(0);
    let outcome = verify(&seq, &variant, &OriginalRef::Exact(original)).unwrap();
    assert_eq!(outcome.verdict, Verdict::Mismatch);
    assert_eq!(outcome.first_mismatch, Some(72));
}

#[test]
fn test_tampered_variant_is_a_mismatch() {
    let (source, seq, variant) = fixture();
    let mut bytes = variant.into_bytes();
    bytes[0] = bytes[0].wrapping_add(1);
    let tampered = ImageBuffer::new(source.shape(), bytes).unwrap();
    let outcome = verify(&seq, &tampered, &OriginalRef::ContentHash(content_hash(&source))).unwrap();
    assert_eq!(outcome.verdict, Verdict::Mismatch);
    assert!(outcome.diagnostic.is_some());
}

#[test]
fn test_shape_mismatch_is_an_error_not_a_verdict() {
    let (source, seq, _) = fixture();
    let wrong = noise(ImageShape::new(4, 6, PixelFormat::Rgb8), 1);
    let res = verify(&seq, &wrong, &OriginalRef::Exact(source.into_bytes()));
    assert!(matches!(res, Err(KernelError::Application(_))));
}

#[test]
fn test_proof_fields() {
    let (source, seq, variant) = fixture();
    let outcome = verify(&seq, &variant, &OriginalRef::Exact(source.as_bytes().to_vec())).unwrap();
    let proof = &outcome.proof;
    assert_eq!(proof.kernel_version, KERNEL_VERSION);
    assert_eq!(proof.sequence_digest, seq.digest().unwrap());
    assert_eq!(proof.variant_hash, content_hash(&variant));
    assert_eq!(proof.reversed_hash, content_hash(&source));
    assert_eq!(proof.verdict, Verdict::Match);

    // Verification is deterministic down to the receipt.
    let again = verify(&seq, &variant, &OriginalRef::Exact(source.into_bytes())).unwrap();
    assert_eq!(again, outcome);
}
