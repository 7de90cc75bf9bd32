#![cfg_attr(not(test), no_std)]

//! FM transmitter built on the ESP32 audio PLL (APLL).
//!
//! The carrier is the APLL output itself. Its fractional codeword is
//! rewritten once per audio sample so the output frequency follows the
//! audio waveform.

pub mod constants;
pub mod errors;
pub mod config;
pub mod modulator;
pub mod register;
pub mod device;
pub mod source;
pub mod queue;
pub mod scheduler;

pub use config::{LiveConfig, Platform, Settings, SynthesizerConfig};
pub use errors::{ConfigurationError, Error};
pub use modulator::{apply, Deviation, Saturation};
pub use device::{Apll, RegisterSink, RegisterWrite};
pub use queue::{BufferedSource, Refill, SampleQueue};
pub use scheduler::{SamplePeriod, Scheduler, Skip, TickOutcome, TickStats};
pub use source::{AudioSource, EndOfStream, PcmSource, SampleFormat};
