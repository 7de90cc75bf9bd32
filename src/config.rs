//! APLL coefficient calculations
//!
//! f_out = f_xtal × (4 + sdm2 + frac / 65536) / (2 × (o_div + 2))
//!
//! where:
//! f_xtal is the crystal (reference clock) frequency.
//! sdm2 is the integer numerator offset (0 to 63).
//! frac is the 16-bit fractional codeword (sdm1:sdm0).
//! o_div is the output divider selector (0 to 31).

use log::warn;

use crate::{constants::*, errors::*};

/// Platform queries the calculator needs.
pub trait Platform {
    /// Crystal frequency, Hz
    fn reference_clock_hz(&self) -> u32;

    /// True on revision 0 silicon, which uses a different register layout
    fn is_rev0(&self) -> bool;
}

/// Transmitter settings.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Carrier frequency, Hz
    pub carrier_hz: u32,
    /// Peak deviation at full modulation, Hz
    pub peak_deviation_hz: u32,
    /// Audio sample rate the tick runs at, Hz
    pub sample_rate_hz: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            carrier_hz: DEFAULT_CARRIER_HZ,
            peak_deviation_hz: DEFAULT_PEAK_DEVIATION_HZ,
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
        }
    }
}

impl Settings {
    pub fn with_carrier_hz(mut self, carrier_hz: u32) -> Self {
        self.carrier_hz = carrier_hz;
        self
    }

    pub fn with_peak_deviation_hz(mut self, peak_deviation_hz: u32) -> Self {
        self.peak_deviation_hz = peak_deviation_hz;
        self
    }

    pub fn with_sample_rate_hz(mut self, sample_rate_hz: u32) -> Self {
        self.sample_rate_hz = sample_rate_hz;
        self
    }

    /// Base synthesizer configuration for these settings.
    pub fn synthesizer_config<P: Platform>(&self, platform: &P) -> Result<SynthesizerConfig> {
        SynthesizerConfig::compute(platform, self.carrier_hz, self.peak_deviation_hz)
    }
}

/// Unmodulated APLL configuration, computed once per start.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SynthesizerConfig {
    /// Output divider selector (`o_div`)
    pub divider: u8,
    /// Integer numerator offset (`sdm2`)
    pub numerator_offset: u8,
    /// Fractional codeword of the carrier, kept at least
    /// `deviation_unit` away from both codeword ends
    pub base_fraction: u16,
    /// Codeword LSBs per configured peak deviation
    pub deviation_unit: u16,
    /// Revision 0 register layout
    pub hardware_revision_flag: bool,
    reference_clock_hz: u32,
}

impl SynthesizerConfig {
    /// Queries the platform once for the crystal frequency and silicon
    /// revision, then derives the coefficients.
    pub fn compute<P: Platform>(
        platform: &P,
        carrier_hz: u32,
        peak_deviation_hz: u32,
    ) -> Result<Self> {
        let reference_clock_hz = platform.reference_clock_hz();
        let rev0 = platform.is_rev0();
        Self::derive(reference_clock_hz, carrier_hz, peak_deviation_hz, rev0).map_err(|e| {
            warn!("APLL configuration rejected: {}", e);
            e.into()
        })
    }

    /// Pure coefficient derivation.
    pub fn derive(
        reference_clock_hz: u32,
        carrier_hz: u32,
        peak_deviation_hz: u32,
        hardware_revision_flag: bool,
    ) -> core::result::Result<Self, ConfigurationError> {
        if !(REF_CLOCK_MIN..=REF_CLOCK_MAX).contains(&reference_clock_hz) {
            return Err(ConfigurationError::InvalidReferenceClock(reference_clock_hz));
        }

        let divider = (0..=O_DIV_MAX)
            .find(|d| vco_hz(carrier_hz, *d) >= VCO_FREQ_MIN)
            .ok_or(ConfigurationError::DividerOutOfRange { carrier_hz })?;

        // N = 4 + sdm2 + frac / 65536
        let multiplier = vco_hz(carrier_hz, divider) as f64 / reference_clock_hz as f64;
        let whole = libm::floor(multiplier);
        let mut multiplier_int = whole as u32;
        let mut fraction = libm::round((multiplier - whole) * FRAC_MODULUS as f64) as u32;
        if fraction == FRAC_MODULUS as u32 {
            fraction = 0;
            multiplier_int += 1;
        }

        let numerator_offset = multiplier_int
            .checked_sub(NUMERATOR_BASE)
            .filter(|n| *n <= SDM2_MAX as u32)
            .ok_or(ConfigurationError::NumeratorOutOfRange { multiplier_int })?;

        let lsb_hz = hz_per_lsb(reference_clock_hz, divider);
        let deviation_unit = libm::round(peak_deviation_hz as f64 / lsb_hz)
            .min(FRAC_MAX as f64) as u16;
        if 2 * deviation_unit as u32 > FRAC_MAX as u32 {
            return Err(ConfigurationError::DeviationOutOfRange { deviation_unit });
        }

        // keep at least ±deviation_unit of codeword margin
        let deviation = deviation_unit as u32;
        if fraction < deviation {
            fraction = deviation;
        } else if fraction > FRAC_MAX as u32 - deviation {
            fraction = FRAC_MAX as u32 - deviation;
        }

        Ok(SynthesizerConfig {
            divider,
            numerator_offset: numerator_offset as u8,
            base_fraction: fraction as u16,
            deviation_unit,
            hardware_revision_flag,
            reference_clock_hz,
        })
    }

    /// Crystal frequency the configuration was derived from, Hz
    pub fn reference_clock_hz(&self) -> u32 {
        self.reference_clock_hz
    }

    /// Nominal VCO frequency for `carrier_hz` at this divider.
    pub fn vco_hz(&self, carrier_hz: u32) -> u64 {
        vco_hz(carrier_hz, self.divider)
    }

    /// Output frequency step of one fractional codeword LSB, Hz
    pub fn hz_per_lsb(&self) -> f64 {
        hz_per_lsb(self.reference_clock_hz, self.divider)
    }

    /// Unmodulated register state.
    pub fn live(&self) -> LiveConfig {
        LiveConfig {
            numerator_offset: self.numerator_offset,
            fraction: self.base_fraction,
        }
    }

    /// Output frequency the base coefficients actually produce, Hz.
    /// Differs from the requested carrier by the codeword rounding
    /// and by the margin reservation.
    pub fn carrier_hz(&self) -> f64 {
        self.output_hz(&self.live())
    }

    /// Output frequency for a live register state, Hz
    pub fn output_hz(&self, live: &LiveConfig) -> f64 {
        let numerator = (NUMERATOR_BASE + live.numerator_offset as u32) as f64
            + live.fraction as f64 / FRAC_MODULUS as f64;
        self.reference_clock_hz as f64 * numerator / (2.0 * (self.divider as f64 + 2.0))
    }
}

/// Register state written on every tick.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LiveConfig {
    /// Integer numerator offset (`sdm2`)
    pub numerator_offset: u8,
    /// Fractional codeword (`sdm1:sdm0`)
    pub fraction: u16,
}

impl LiveConfig {
    /// `sdm0`
    #[inline]
    pub fn fraction_low(&self) -> u8 {
        (self.fraction & 0xFF) as u8
    }

    /// `sdm1`
    #[inline]
    pub fn fraction_high(&self) -> u8 {
        (self.fraction >> 8) as u8
    }

    /// Numerator above the fixed base of 4, in codeword LSBs
    #[inline]
    pub fn codeword(&self) -> i32 {
        self.numerator_offset as i32 * FRAC_MODULUS + self.fraction as i32
    }
}

#[inline]
fn vco_hz(carrier_hz: u32, divider: u8) -> u64 {
    carrier_hz as u64 * 2 * (divider as u64 + 2)
}

#[inline]
fn hz_per_lsb(reference_clock_hz: u32, divider: u8) -> f64 {
    reference_clock_hz as f64 / (2.0 * (divider as f64 + 2.0) * FRAC_MODULUS as f64)
}
