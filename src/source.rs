//! Audio sources
//!
//! The sample tick pulls one mono sample per period from an
//! [`AudioSource`]. Sources handed to the tick must answer immediately;
//! anything that has to touch storage goes through [`crate::queue`].

use crate::errors::ConfigurationError;

/// Source ran out of samples. Cleared by [`AudioSource::restart`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EndOfStream;

/// Restartable mono PCM stream at a fixed sample rate.
pub trait AudioSource {
    /// Rate the samples were authored for, Hz
    fn sample_rate_hz(&self) -> u32;

    /// Next sample.
    ///
    /// `WouldBlock` means no sample is staged yet (buffer underrun);
    /// `Other(EndOfStream)` means the stream is finished until restarted.
    fn read_next(&mut self) -> nb::Result<i16, EndOfStream>;

    /// Rewinds to the first sample.
    fn restart(&mut self);
}

impl<S: AudioSource + ?Sized> AudioSource for &mut S {
    fn sample_rate_hz(&self) -> u32 {
        (**self).sample_rate_hz()
    }

    fn read_next(&mut self) -> nb::Result<i16, EndOfStream> {
        (**self).read_next()
    }

    fn restart(&mut self) {
        (**self).restart()
    }
}

/// Sample encoding of an in-memory PCM block
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SampleFormat {
    /// Unsigned 8 bit, 128 is silence
    U8,
    /// Signed 16 bit little endian
    S16Le,
}

impl SampleFormat {
    #[inline]
    fn bytes(self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::S16Le => 2,
        }
    }

    #[inline]
    fn decode(self, b: &[u8]) -> i16 {
        match self {
            SampleFormat::U8 => ((b[0] as i16) - 128) << 8,
            SampleFormat::S16Le => i16::from_le_bytes([b[0], b[1]]),
        }
    }
}

/// PCM block already in memory, e.g. a clip embedded in flash.
///
/// Interleaved stereo is averaged down to mono. A trailing partial
/// frame is ignored.
#[derive(Debug, Clone)]
pub struct PcmSource<'a> {
    data: &'a [u8],
    format: SampleFormat,
    channels: u8,
    sample_rate_hz: u32,
    pos: usize,
}

impl<'a> PcmSource<'a> {
    pub fn new(
        data: &'a [u8],
        format: SampleFormat,
        channels: u8,
        sample_rate_hz: u32,
    ) -> Result<Self, ConfigurationError> {
        if !(1..=2).contains(&channels) {
            return Err(ConfigurationError::UnsupportedChannels(channels));
        }
        Ok(PcmSource { data, format, channels, sample_rate_hz, pos: 0 })
    }

    /// Mono signed 16-bit little endian block
    pub fn mono_s16(data: &'a [u8], sample_rate_hz: u32) -> Self {
        PcmSource { data, format: SampleFormat::S16Le, channels: 1, sample_rate_hz, pos: 0 }
    }

    /// Bytes per frame
    #[inline]
    fn frame_len(&self) -> usize {
        self.format.bytes() * self.channels as usize
    }

    /// Whole frames in the block
    pub fn frames(&self) -> usize {
        self.data.len() / self.frame_len()
    }
}

impl<'a> AudioSource for PcmSource<'a> {
    fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    fn read_next(&mut self) -> nb::Result<i16, EndOfStream> {
        let frame_len = self.frame_len();
        let frame = self
            .data
            .get(self.pos..self.pos + frame_len)
            .ok_or(nb::Error::Other(EndOfStream))?;
        self.pos += frame_len;

        let step = self.format.bytes();
        let left = self.format.decode(&frame[..step]);
        if self.channels == 2 {
            let right = self.format.decode(&frame[step..]);
            Ok(((left as i32 + right as i32) / 2) as i16)
        } else {
            Ok(left)
        }
    }

    fn restart(&mut self) {
        self.pos = 0;
    }
}
