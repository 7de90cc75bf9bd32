//! Constants

/// Minimum VCO frequency the APLL locks reliably at
pub const VCO_FREQ_MIN: u64 = 350_000_000;

/// Largest output divider selector (`o_div`, 5 bits)
pub const O_DIV_MAX: u8 = 31;

/// Largest integer numerator offset (`sdm2`, 6 bits)
pub const SDM2_MAX: u8 = 63;

/// Fixed integer part of the feedback numerator:
/// N = 4 + sdm2 + frac / 65536
pub const NUMERATOR_BASE: u32 = 4;

/// Modulus of the 16-bit fractional codeword (`sdm1:sdm0`)
pub const FRAC_MODULUS: i32 = 1 << 16;

/// Largest fractional codeword
pub const FRAC_MAX: u16 = u16::MAX;

/// Minimum supported crystal frequency
pub const REF_CLOCK_MIN: u32 = 10_000_000;

/// Maximum supported crystal frequency
pub const REF_CLOCK_MAX: u32 = 50_000_000;

/// Samples with a magnitude up to the knee pass the pre-limiter unchanged
pub const SOFT_KNEE: i32 = 2047;

/// Attenuation above the knee is `1 / 2^SOFT_KNEE_SHIFT` (4:1)
pub const SOFT_KNEE_SHIFT: u32 = 2;

/// Scaled sample to codeword shift; full scale i16 maps to one deviation unit
pub const SAMPLE_SCALE_SHIFT: u32 = 15;

/// Default carrier, Hz
pub const DEFAULT_CARRIER_HZ: u32 = 100_000_000;

/// Default peak deviation, Hz (±75 kHz broadcast)
pub const DEFAULT_PEAK_DEVIATION_HZ: u32 = 75_000;

/// Default audio sample rate, Hz
pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 8_000;
