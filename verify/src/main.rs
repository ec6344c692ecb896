// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use clap::Parser;
use std::path::PathBuf;
use std::fs;
use anyhow::{Context, Result};

use reverso_kernel::digest::ContentHash;
use reverso_kernel::proof::ReversalProof;
use reverso_kernel::sequence::InstructionSequence;
use reverso_kernel::types::ImageBuffer;
use reverso_kernel::verify::{verify, OriginalRef, Verdict};

/// Offline auditor: replays a stored instruction sequence backwards over a
/// variant and checks the result against the original.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Canonically encoded instruction sequence
    #[arg(long)]
    sequence: PathBuf,

    /// Raw pixel bytes of the variant, in the sequence's shape
    #[arg(long)]
    variant: PathBuf,

    /// Raw pixel bytes of the original, compared byte for byte
    #[arg(long, conflicts_with = "original_hash", required_unless_present = "original_hash")]
    original: Option<PathBuf>,

    /// Hex content hash of the original
    #[arg(long)]
    original_hash: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    eprintln!("Reverso Verifier v{}", env!("CARGO_PKG_VERSION"));

    // 1. Sequence
    let seq_bytes = fs::read(&args.sequence).context("Failed to read sequence file")?;
    let sequence = InstructionSequence::decode(&seq_bytes)
        .map_err(|e| anyhow::anyhow!("Failed to decode sequence: {}", e))?;
    let shape = sequence.shape();
    eprintln!(
        "Sequence: {} operations on {}x{} {:?}",
        sequence.len(),
        shape.width,
        shape.height,
        shape.format
    );

    // 2. Variant
    let variant_bytes = fs::read(&args.variant).context("Failed to read variant file")?;
    let variant = ImageBuffer::new(shape, variant_bytes)
        .map_err(|e| anyhow::anyhow!("Variant does not fit the sequence: {}", e))?;

    // 3. Original reference
    let original = match (&args.original, &args.original_hash) {
        (Some(path), _) => OriginalRef::Exact(fs::read(path).context("Failed to read original file")?),
        (None, Some(hex)) => {
            let hash: ContentHash = hex.parse().map_err(|e| anyhow::anyhow!("Bad original hash: {}", e))?;
            OriginalRef::ContentHash(hash)
        }
        (None, None) => anyhow::bail!("Either --original or --original-hash is required"),
    };

    // 4. Reverse and compare
    let outcome = verify(&sequence, &variant, &original)
        .map_err(|e| anyhow::anyhow!("Reversal failed: {}", e))?;

    // 5. Output JSON
    let proof: &ReversalProof = &outcome.proof;
    println!("{}", serde_json::to_string_pretty(proof)?);

    if outcome.verdict == Verdict::Mismatch {
        anyhow::bail!(
            "Mismatch: {}",
            outcome.diagnostic.as_deref().unwrap_or("reversed image differs from original")
        );
    }
    Ok(())
}
