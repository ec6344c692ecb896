// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Pixel formats and variant lifecycle.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PixelFormat {
    Gray8 = 0,
    GrayAlpha8 = 1,
    Rgb8 = 2,
    Rgba8 = 3,
}

impl PixelFormat {
    /// Bytes (and channels) per pixel. Every supported format is 8 bits per channel.
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::GrayAlpha8 => 2,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(PixelFormat::Gray8),
            1 => Some(PixelFormat::GrayAlpha8),
            2 => Some(PixelFormat::Rgb8),
            3 => Some(PixelFormat::Rgba8),
            _ => None,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gray8" | "l" => Some(PixelFormat::Gray8),
            "gray_alpha8" | "la" => Some(PixelFormat::GrayAlpha8),
            "rgb8" | "rgb" => Some(PixelFormat::Rgb8),
            "rgba8" | "rgba" => Some(PixelFormat::Rgba8),
            _ => None,
        }
    }
}

/// Lifecycle of a variant.
///
/// Transitions are monotonic: `Generated` -> `VerificationRequested` -> one
/// of the terminal states. The status is the single source of truth both
/// services consult when protocol messages arrive late or twice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantStatus {
    Generated,
    VerificationRequested,
    VerifiedOk,
    VerifiedFailed,
    VerificationError,
}

impl VariantStatus {
    fn rank(self) -> u8 {
        match self {
            VariantStatus::Generated => 0,
            VariantStatus::VerificationRequested => 1,
            VariantStatus::VerifiedOk
            | VariantStatus::VerifiedFailed
            | VariantStatus::VerificationError => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }

    /// Whether moving from `self` to `next` respects the lifecycle.
    pub fn can_transition_to(self, next: VariantStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VariantStatus::Generated => "generated",
            VariantStatus::VerificationRequested => "verification_requested",
            VariantStatus::VerifiedOk => "verified_ok",
            VariantStatus::VerifiedFailed => "verified_failed",
            VariantStatus::VerificationError => "verification_error",
        }
    }
}
