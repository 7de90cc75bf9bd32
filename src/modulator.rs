//! Per-sample deviation
//!
//! Runs inside the sample tick: integer arithmetic only, no allocation,
//! same work for every sample value.

use crate::{config::*, constants::*};

/// Which end of the numerator range the safety clamp pinned.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Saturation {
    /// Numerator offset would have gone below 0
    Low,
    /// Numerator offset would have gone above 63
    High,
}

/// Result of applying one sample.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Deviation {
    pub live: LiveConfig,
    /// Set when the clamp fired; the margin reserved by the
    /// calculator was not enough for this sample.
    pub saturation: Option<Saturation>,
}

/// Soft-knee pre-limiter, 4:1 above ±2047.
#[inline]
pub fn soft_knee(sample: i16) -> i32 {
    let v = sample as i32;
    let magnitude = v.abs();
    if magnitude <= SOFT_KNEE {
        v
    } else {
        v.signum() * (SOFT_KNEE + ((magnitude - SOFT_KNEE) >> SOFT_KNEE_SHIFT))
    }
}

/// Pre-limited sample in fractional codeword LSBs.
#[inline]
pub fn codeword_delta(base: &SynthesizerConfig, sample: i16) -> i32 {
    (soft_knee(sample) * base.deviation_unit as i32) >> SAMPLE_SCALE_SHIFT
}

/// Base configuration moved by one audio sample.
#[inline]
pub fn apply(base: &SynthesizerConfig, sample: i16) -> Deviation {
    let mut frac = base.base_fraction as i32 + codeword_delta(base, sample);
    let mut sdm2 = base.numerator_offset as i32;

    // borrow / carry across the 16-bit fraction
    if frac < 0 {
        let borrow = (-frac + (FRAC_MODULUS - 1)) >> 16;
        frac += borrow * FRAC_MODULUS;
        sdm2 -= borrow;
    } else if frac > FRAC_MAX as i32 {
        let carry = frac >> 16;
        frac -= carry * FRAC_MODULUS;
        sdm2 += carry;
    }

    let mut saturation = None;
    if sdm2 < 0 {
        sdm2 = 0;
        frac = 0;
        saturation = Some(Saturation::Low);
    } else if sdm2 > SDM2_MAX as i32 {
        sdm2 = SDM2_MAX as i32;
        frac = FRAC_MAX as i32;
        saturation = Some(Saturation::High);
    }

    Deviation {
        live: LiveConfig {
            numerator_offset: sdm2 as u8,
            fraction: frac as u16,
        },
        saturation,
    }
}
