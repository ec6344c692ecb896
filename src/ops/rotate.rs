// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Cyclic channel rotation (R -> G -> B -> R for amount 1).

use crate::config::MAX_ROTATE_AMOUNT;
use crate::error::{KernelError, Result};
use crate::ops::region::{pixel_range, Region};
use crate::types::image::ImageShape;

pub(crate) fn validate(amount: i32, region: Option<&Region>, shape: &ImageShape) -> Result<()> {
    if !(-MAX_ROTATE_AMOUNT..=MAX_ROTATE_AMOUNT).contains(&amount) {
        return Err(KernelError::configuration(format!(
            "ChannelRotate amount {} outside -{}..={}",
            amount, MAX_ROTATE_AMOUNT, MAX_ROTATE_AMOUNT
        )));
    }
    if let Some(r) = region {
        r.check(shape)?;
    }
    Ok(())
}

pub(crate) fn apply(amount: i32, region: Option<&Region>, shape: &ImageShape, bytes: &mut [u8]) -> Result<()> {
    validate(amount, region, shape)?;
    let c = shape.channels();
    let k = amount.rem_euclid(c as i32) as usize;
    if k == 0 {
        return Ok(());
    }
    let range = pixel_range(region, shape)?;
    for px in bytes[range.start * c..range.end * c].chunks_exact_mut(c) {
        px.rotate_right(k);
    }
    Ok(())
}
