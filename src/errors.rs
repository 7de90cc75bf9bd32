//! Errors

/// Start-up configuration errors.
///
/// Reported before any register is touched; the scheduler never runs
/// with a configuration that produced one of these.
#[derive(thiserror::Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// No output divider puts the VCO at or above its minimum frequency
    #[error("carrier {carrier_hz} Hz is too low for any output divider")]
    DividerOutOfRange { carrier_hz: u32 },

    /// Integer numerator offset would fall outside 0..=63
    #[error("numerator {multiplier_int} is outside the APLL range")]
    NumeratorOutOfRange { multiplier_int: u32 },

    /// Requested deviation leaves no room in the fractional codeword
    #[error("deviation of {deviation_unit} LSB leaves no codeword margin")]
    DeviationOutOfRange { deviation_unit: u16 },

    /// Crystal frequency outside the supported range
    #[error("reference clock {0} Hz is not supported")]
    InvalidReferenceClock(u32),

    /// Only mono and stereo sources can be downmixed
    #[error("{0} channel audio is not supported")]
    UnsupportedChannels(u8),

    /// Tick rate is 0 or too high for a whole-microsecond timer period
    #[error("sample rate {0} Hz has no timer period")]
    InvalidSampleRate(u32),

    /// Source sample rate differs from the tick rate
    #[error("source sample rate {source_hz} Hz does not match tick rate {tick_hz} Hz")]
    SampleRateMismatch { source_hz: u32, tick_hz: u32 },
}

/// Crate error
#[derive(thiserror::Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// `start` called while the scheduler is already running
    #[error("modulator is already running")]
    AlreadyRunning,

    /// Periodic timer could not be cancelled
    #[error("timer error")]
    Timer,

    /// APLL register bus write failed
    #[error("register bus error")]
    Bus,
}

pub type Result<T> = core::result::Result<T, Error>;
