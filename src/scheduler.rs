//! Sample-rate scheduler
//!
//! Owns the periodic timer, the register sink and, while running, the
//! audio source and the base configuration. The application calls
//! [`Scheduler::tick`] from the timer interrupt, or [`Scheduler::poll`]
//! from a loop.
//!
//! `tick` does a bounded amount of integer work: one source read (two
//! when the source wraps), one modulator step, one sink write. Faults
//! are counted in [`TickStats`] and never returned.

use core::convert::Infallible;
use core::mem;
use core::sync::atomic::{compiler_fence, Ordering};

use embedded_hal::timer::{Cancel, CountDown, Periodic};
use log::{info, warn};

use crate::config::{LiveConfig, SynthesizerConfig};
use crate::device::{RegisterSink, RegisterWrite};
use crate::errors::*;
use crate::modulator::{self, Saturation};
use crate::source::{AudioSource, EndOfStream};

/// Timer period of one audio sample
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SamplePeriod {
    pub micros: u32,
}

impl SamplePeriod {
    /// 125 µs at 8 kHz. `None` for a rate of 0 or one whose period
    /// rounds down to 0 µs.
    pub fn from_rate_hz(sample_rate_hz: u32) -> Option<Self> {
        match 1_000_000u32.checked_div(sample_rate_hz) {
            Some(micros) if micros > 0 => Some(SamplePeriod { micros }),
            _ => None,
        }
    }
}

/// Why a tick left the registers alone
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Skip {
    /// Source ended again right after a restart
    SourceExhausted,
    /// Buffered source had nothing staged
    Underrun,
}

/// What one tick did
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Scheduler is stopped
    Idle,
    Written(LiveConfig),
    /// Written, but the numerator was pinned at one end of its range
    Clamped(LiveConfig, Saturation),
    Skipped(Skip),
}

/// Per-tick counters, reset by every start.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TickStats {
    pub ticks: u32,
    pub writes: u32,
    /// Source restarts after an end of stream
    pub restarts: u32,
    /// Ticks skipped because the source stayed empty after a restart
    pub exhausted: u32,
    /// Ticks skipped on buffer underrun
    pub underruns: u32,
    /// Writes where the saturation clamp fired
    pub clamps: u32,
}

impl TickStats {
    /// Any tick skipped or clamped
    pub fn has_faults(&self) -> bool {
        self.exhausted != 0 || self.underruns != 0 || self.clamps != 0
    }
}

enum State<SRC> {
    Stopped,
    Running {
        base: SynthesizerConfig,
        source: SRC,
    },
}

/// Drives the modulator at the audio sample rate.
pub struct Scheduler<TIM, SINK, SRC> {
    timer: TIM,
    sink: SINK,
    sample_rate_hz: u32,
    state: State<SRC>,
    stats: TickStats,
}

impl<TIM, SINK, SRC> Scheduler<TIM, SINK, SRC>
where TIM: CountDown + Periodic + Cancel,
      SamplePeriod: Into<TIM::Time>,
      SINK: RegisterSink,
      SRC: AudioSource,
{
    /// Creates a stopped scheduler ticking at `sample_rate_hz`.
    pub fn new(timer: TIM, sink: SINK, sample_rate_hz: u32) -> Self {
        Scheduler {
            timer,
            sink,
            sample_rate_hz,
            state: State::Stopped,
            stats: TickStats::default(),
        }
    }

    /// Programs the unmodulated carrier and arms the periodic timer.
    ///
    /// Nothing is written when the tick rate has no timer period, the
    /// source does not match it, or the scheduler is already running.
    pub fn start(&mut self, base: SynthesizerConfig, source: SRC) -> Result<()> {
        if let State::Running { .. } = self.state {
            return Err(Error::AlreadyRunning);
        }
        let period = match SamplePeriod::from_rate_hz(self.sample_rate_hz) {
            Some(p) => p,
            None => {
                let e = ConfigurationError::InvalidSampleRate(self.sample_rate_hz);
                warn!("FM start rejected: {}", e);
                return Err(e.into());
            }
        };
        let source_hz = source.sample_rate_hz();
        if source_hz != self.sample_rate_hz {
            let e = ConfigurationError::SampleRateMismatch {
                source_hz,
                tick_hz: self.sample_rate_hz,
            };
            warn!("FM start rejected: {}", e);
            return Err(e.into());
        }

        info!(
            "FM o_div={} sdm2={} frac={:#06x} dev={} LSB, carrier {} Hz",
            base.divider,
            base.numerator_offset,
            base.base_fraction,
            base.deviation_unit,
            base.carrier_hz() as u64,
        );

        self.sink.write(&RegisterWrite::new(&base, &base.live()));
        self.stats = TickStats::default();
        self.state = State::Running { base, source };

        // base must be in place before the first tick can fire
        compiler_fence(Ordering::Release);
        self.timer.start(period);
        Ok(())
    }

    /// One sample period. Call from the timer interrupt.
    pub fn tick(&mut self) -> TickOutcome {
        let (base, source) = match &mut self.state {
            State::Running { base, source } => (&*base, source),
            State::Stopped => return TickOutcome::Idle,
        };
        self.stats.ticks = self.stats.ticks.wrapping_add(1);

        let sample = match source.read_next() {
            Ok(s) => s,
            Err(nb::Error::WouldBlock) => {
                self.stats.underruns = self.stats.underruns.wrapping_add(1);
                return TickOutcome::Skipped(Skip::Underrun);
            }
            Err(nb::Error::Other(EndOfStream)) => {
                self.stats.restarts = self.stats.restarts.wrapping_add(1);
                source.restart();
                match source.read_next() {
                    Ok(s) => s,
                    Err(nb::Error::WouldBlock) => {
                        self.stats.underruns = self.stats.underruns.wrapping_add(1);
                        return TickOutcome::Skipped(Skip::Underrun);
                    }
                    Err(nb::Error::Other(EndOfStream)) => {
                        self.stats.exhausted = self.stats.exhausted.wrapping_add(1);
                        return TickOutcome::Skipped(Skip::SourceExhausted);
                    }
                }
            }
        };

        let d = modulator::apply(base, sample);
        self.sink.write(&RegisterWrite::new(base, &d.live));
        self.stats.writes = self.stats.writes.wrapping_add(1);

        match d.saturation {
            None => TickOutcome::Written(d.live),
            Some(s) => {
                self.stats.clamps = self.stats.clamps.wrapping_add(1);
                TickOutcome::Clamped(d.live, s)
            }
        }
    }

    /// Runs a tick when the timer period elapsed.
    pub fn poll(&mut self) -> nb::Result<TickOutcome, Infallible> {
        if let State::Stopped = self.state {
            return Ok(TickOutcome::Idle);
        }
        match self.timer.wait() {
            Ok(()) => Ok(self.tick()),
            Err(nb::Error::WouldBlock) => Err(nb::Error::WouldBlock),
            Err(nb::Error::Other(v)) => match v {},
        }
    }

    /// Cancels the timer and hands the source back. The last written
    /// coefficients stay in the APLL.
    ///
    /// If the timer cannot be cancelled the scheduler keeps running and
    /// keeps the source.
    pub fn stop(&mut self) -> Result<Option<SRC>> {
        if let State::Stopped = self.state {
            return Ok(None);
        }
        self.timer.cancel().map_err(|_| Error::Timer)?;
        let source = match mem::replace(&mut self.state, State::Stopped) {
            State::Running { source, .. } => source,
            State::Stopped => return Ok(None),
        };

        let s = &self.stats;
        if s.has_faults() {
            warn!(
                "FM stopped after {} ticks: {} exhausted, {} underruns, {} clamps",
                s.ticks, s.exhausted, s.underruns, s.clamps
            );
        } else {
            info!("FM stopped after {} ticks", s.ticks);
        }
        Ok(Some(source))
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running { .. })
    }

    /// Base configuration while running
    pub fn base(&self) -> Option<&SynthesizerConfig> {
        match &self.state {
            State::Running { base, .. } => Some(base),
            State::Stopped => None,
        }
    }

    pub fn stats(&self) -> &TickStats {
        &self.stats
    }

    pub fn sink(&self) -> &SINK {
        &self.sink
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    /// Releases the timer and the sink.
    pub fn free(self) -> (TIM, SINK) {
        (self.timer, self.sink)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::SampleQueue;
    use crate::source::PcmSource;

    #[derive(Default)]
    struct Timer {
        started: Vec<SamplePeriod>,
        cancelled: u32,
        cancel_fails: bool,
        expired: bool,
    }

    impl CountDown for Timer {
        type Time = SamplePeriod;

        fn start<T>(&mut self, count: T)
        where T: Into<SamplePeriod>
        {
            self.started.push(count.into());
        }

        fn wait(&mut self) -> nb::Result<(), void::Void> {
            if self.expired {
                self.expired = false;
                Ok(())
            } else {
                Err(nb::Error::WouldBlock)
            }
        }
    }

    impl Periodic for Timer {}

    impl Cancel for Timer {
        type Error = ();

        fn cancel(&mut self) -> core::result::Result<(), ()> {
            if self.cancel_fails {
                return Err(());
            }
            self.cancelled += 1;
            Ok(())
        }
    }

    #[derive(Default)]
    struct Sink {
        writes: Vec<RegisterWrite>,
    }

    impl RegisterSink for Sink {
        fn write(&mut self, w: &RegisterWrite) {
            self.writes.push(*w);
        }
    }

    fn le_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn broadcast() -> SynthesizerConfig {
        SynthesizerConfig::derive(40_000_000, 100_000_000, 75_000, false).unwrap()
    }

    fn scheduler<'a>() -> Scheduler<Timer, Sink, PcmSource<'a>> {
        Scheduler::new(Timer::default(), Sink::default(), 8_000)
    }

    #[test]
    fn start_programs_carrier_and_arms_timer() {
        let data = le_bytes(&[0]);
        let mut s = scheduler();
        s.start(broadcast(), PcmSource::mono_s16(&data, 8_000)).unwrap();

        assert!(s.is_running());
        let (timer, sink) = s.free();
        assert_eq!(timer.started, vec![SamplePeriod { micros: 125 }]);
        assert_eq!(sink.writes, vec![RegisterWrite::new(&broadcast(), &broadcast().live())]);
    }

    #[test]
    fn tick_writes_modulated_sample() {
        let data = le_bytes(&[0, i16::MAX]);
        let base = broadcast();
        let mut s = scheduler();
        s.start(base, PcmSource::mono_s16(&data, 8_000)).unwrap();

        assert_eq!(s.tick(), TickOutcome::Written(base.live()));
        let up = modulator::apply(&base, i16::MAX).live;
        assert_eq!(s.tick(), TickOutcome::Written(up));
        assert_eq!(s.sink().writes.last(), Some(&RegisterWrite::new(&base, &up)));
        assert_eq!(s.stats().writes, 2);
    }

    #[test]
    fn sample_rate_mismatch_touches_nothing() {
        let data = le_bytes(&[0]);
        let mut s = scheduler();
        let e = s.start(broadcast(), PcmSource::mono_s16(&data, 44_100)).unwrap_err();

        assert_eq!(
            e,
            Error::Configuration(ConfigurationError::SampleRateMismatch {
                source_hz: 44_100,
                tick_hz: 8_000,
            })
        );
        assert!(!s.is_running());
        assert_eq!(s.tick(), TickOutcome::Idle);
        let (timer, sink) = s.free();
        assert!(timer.started.is_empty());
        assert!(sink.writes.is_empty());
    }

    #[test]
    fn end_of_stream_loops_to_first_sample() {
        let data = le_bytes(&[100, 200, 300]);
        let base = broadcast();
        let mut s = scheduler();
        s.start(base, PcmSource::mono_s16(&data, 8_000)).unwrap();

        let first = s.tick();
        s.tick();
        s.tick();
        assert_eq!(s.tick(), first);
        assert_eq!(s.stats().restarts, 1);
        assert_eq!(s.stats().writes, 4);
        assert!(!s.stats().has_faults());
    }

    #[test]
    fn empty_source_skips_tick() {
        let mut s = scheduler();
        s.start(broadcast(), PcmSource::mono_s16(&[], 8_000)).unwrap();

        assert_eq!(s.tick(), TickOutcome::Skipped(Skip::SourceExhausted));
        assert_eq!(s.stats().exhausted, 1);
        assert_eq!(s.stats().restarts, 1);
        // only the start-up write
        assert_eq!(s.sink().writes.len(), 1);
    }

    #[test]
    fn clamp_is_counted_and_still_written() {
        let data = le_bytes(&[i16::MIN]);
        let mut base = broadcast();
        base.numerator_offset = 0;
        base.base_fraction = 0;
        base.deviation_unit = 65535;
        let mut s = scheduler();
        s.start(base, PcmSource::mono_s16(&data, 8_000)).unwrap();

        let low = LiveConfig { numerator_offset: 0, fraction: 0 };
        assert_eq!(s.tick(), TickOutcome::Clamped(low, Saturation::Low));
        assert_eq!(s.stats().clamps, 1);
        assert_eq!(s.sink().writes.len(), 2);
    }

    #[test]
    fn stop_cancels_and_returns_source() {
        let data = le_bytes(&[7, 8]);
        let mut s = scheduler();
        s.start(broadcast(), PcmSource::mono_s16(&data, 8_000)).unwrap();
        s.tick();

        let mut src = s.stop().unwrap().unwrap();
        assert!(!s.is_running());
        assert_eq!(s.tick(), TickOutcome::Idle);
        assert_eq!(s.sink().writes.len(), 2);
        assert_eq!(src.read_next(), Ok(8));
        assert_eq!(s.stop().unwrap().map(|_| ()), None);

        let (timer, _) = s.free();
        assert_eq!(timer.cancelled, 1);
    }

    #[test]
    fn failed_cancel_keeps_source() {
        let data = le_bytes(&[7, 8]);
        let mut s = scheduler();
        s.start(broadcast(), PcmSource::mono_s16(&data, 8_000)).unwrap();
        s.timer.cancel_fails = true;

        assert_eq!(s.stop().map(|_| ()), Err(Error::Timer));
        assert!(s.is_running());
        assert!(matches!(s.tick(), TickOutcome::Written(_)));

        s.timer.cancel_fails = false;
        let mut src = s.stop().unwrap().unwrap();
        assert_eq!(src.read_next(), Ok(8));
    }

    #[test]
    fn sample_period_needs_a_whole_microsecond() {
        assert_eq!(SamplePeriod::from_rate_hz(8_000), Some(SamplePeriod { micros: 125 }));
        assert_eq!(SamplePeriod::from_rate_hz(1_000_000), Some(SamplePeriod { micros: 1 }));
        assert_eq!(SamplePeriod::from_rate_hz(1_000_001), None);
        assert_eq!(SamplePeriod::from_rate_hz(0), None);
    }

    #[test]
    fn unusable_tick_rate_is_rejected() {
        for hz in [0, 2_000_000] {
            let data = le_bytes(&[0]);
            let mut s = Scheduler::new(Timer::default(), Sink::default(), hz);
            let e = s.start(broadcast(), PcmSource::mono_s16(&data, hz)).unwrap_err();

            assert_eq!(e, Error::Configuration(ConfigurationError::InvalidSampleRate(hz)));
            assert!(!s.is_running());
            let (timer, sink) = s.free();
            assert!(timer.started.is_empty());
            assert!(sink.writes.is_empty());
        }
    }

    #[test]
    fn second_start_is_rejected() {
        let data = le_bytes(&[0]);
        let mut s = scheduler();
        s.start(broadcast(), PcmSource::mono_s16(&data, 8_000)).unwrap();
        let e = s.start(broadcast(), PcmSource::mono_s16(&data, 8_000)).unwrap_err();
        assert_eq!(e, Error::AlreadyRunning);
    }

    #[test]
    fn poll_waits_for_timer() {
        let data = le_bytes(&[0]);
        let mut s = scheduler();
        assert_eq!(s.poll(), Ok(TickOutcome::Idle));
        s.start(broadcast(), PcmSource::mono_s16(&data, 8_000)).unwrap();

        assert_eq!(s.poll(), Err(nb::Error::WouldBlock));
        s.timer.expired = true;
        assert_eq!(s.poll(), Ok(TickOutcome::Written(broadcast().live())));
    }

    #[test]
    fn buffered_underrun_skips_tick() {
        let data = le_bytes(&[5, 6]);
        let mut upstream = PcmSource::mono_s16(&data, 8_000);
        let mut q = SampleQueue::<4>::new(8_000);
        let (mut refill, src) = q.split();

        let mut s = Scheduler::new(Timer::default(), Sink::default(), 8_000);
        s.start(broadcast(), src).unwrap();
        assert_eq!(s.tick(), TickOutcome::Skipped(Skip::Underrun));

        refill.pump(&mut upstream);
        assert!(matches!(s.tick(), TickOutcome::Written(_)));
        assert!(matches!(s.tick(), TickOutcome::Written(_)));
        // drained: restart request, retry finds nothing staged yet
        assert_eq!(s.tick(), TickOutcome::Skipped(Skip::Underrun));
        refill.pump(&mut upstream);
        let first = modulator::apply(&broadcast(), 5).live;
        assert_eq!(s.tick(), TickOutcome::Written(first));
        assert_eq!(s.stats().underruns, 2);
        assert_eq!(s.stats().restarts, 1);
    }
}
