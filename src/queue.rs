//! Bounded refill queue between a loader and the sample tick
//!
//! The tick must not touch storage. A loader running at low priority
//! calls [`Refill::pump`] to move samples from a slow upstream source
//! into a fixed ring; the tick reads them through [`BufferedSource`].
//!
//! ```text
//!  upstream ──pump()──▶ [ StaticRb<Staged, N> ] ─read_next()─▶ tick
//!      ▲                                              │
//!      └──────── restart generation (atomic) ◀──────┘
//! ```

use core::sync::atomic::{AtomicU32, Ordering};

use log::debug;
use ringbuf::traits::{Consumer, Observer, Producer, SplitRef};
use ringbuf::{StaticCons, StaticProd, StaticRb};

use crate::source::{AudioSource, EndOfStream};

/// `drained` value before any upstream ended
const NOT_DRAINED: u32 = u32::MAX;

/// Next restart generation, skipping [`NOT_DRAINED`]
#[inline]
fn next_generation(g: u32) -> u32 {
    match g.wrapping_add(1) {
        NOT_DRAINED => 0,
        n => n,
    }
}

/// State shared by both ends
#[derive(Debug)]
struct Control {
    /// Bumped by every restart request; only the consumer writes it
    generation: AtomicU32,
    /// Generation whose upstream hit its end
    drained: AtomicU32,
}

impl Default for Control {
    fn default() -> Self {
        Control {
            generation: AtomicU32::new(0),
            drained: AtomicU32::new(NOT_DRAINED),
        }
    }
}

/// Sample tagged with the restart generation it was read in
#[derive(Debug, Copy, Clone, Default)]
struct Staged {
    generation: u32,
    sample: i16,
}

/// Storage for a refill queue of `N` samples.
pub struct SampleQueue<const N: usize> {
    rb: StaticRb<Staged, N>,
    control: Control,
    sample_rate_hz: u32,
}

impl<const N: usize> SampleQueue<N> {
    pub fn new(sample_rate_hz: u32) -> Self {
        SampleQueue {
            rb: StaticRb::default(),
            control: Control::default(),
            sample_rate_hz,
        }
    }

    /// Splits into the loader end and the tick end.
    pub fn split(&mut self) -> (Refill<'_, N>, BufferedSource<'_, N>) {
        let (prod, cons) = self.rb.split_ref();
        let control = &self.control;
        let generation = control.generation.load(Ordering::Acquire);
        (
            Refill { prod, control, generation },
            BufferedSource { cons, control, sample_rate_hz: self.sample_rate_hz },
        )
    }
}

/// Loader end of the queue.
pub struct Refill<'a, const N: usize> {
    prod: StaticProd<'a, Staged, N>,
    control: &'a Control,
    /// Generation the upstream read position belongs to
    generation: u32,
}

impl<'a, const N: usize> Refill<'a, N> {
    /// Moves samples from `upstream` until the queue is full, the
    /// upstream would block, or it ends. Rewinds the upstream first if
    /// the reader restarted since the last call. Returns the number of
    /// samples queued.
    ///
    /// A restart that lands while this runs stops the loop; the sample
    /// read from the old position is dropped and the rewind happens on
    /// the next call.
    pub fn pump<S: AudioSource>(&mut self, upstream: &mut S) -> usize {
        let generation = self.control.generation.load(Ordering::Acquire);
        if generation != self.generation {
            upstream.restart();
            self.generation = generation;
            debug!("refill: upstream restarted");
        }
        if self.control.drained.load(Ordering::Acquire) == generation {
            return 0;
        }

        let mut queued = 0;
        while !self.prod.is_full() {
            let read = upstream.read_next();
            if self.control.generation.load(Ordering::Acquire) != generation {
                break;
            }
            match read {
                Ok(sample) => {
                    if self.prod.try_push(Staged { generation, sample }).is_err() {
                        break;
                    }
                    queued += 1;
                }
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(EndOfStream)) => {
                    self.control.drained.store(generation, Ordering::Release);
                    debug!("refill: upstream drained");
                    break;
                }
            }
        }
        queued
    }

    /// Free slots
    pub fn vacant(&self) -> usize {
        self.prod.vacant_len()
    }

    /// True once the upstream ended and no restart is pending
    pub fn is_drained(&self) -> bool {
        let generation = self.control.generation.load(Ordering::Acquire);
        self.control.drained.load(Ordering::Acquire) == generation
    }
}

/// Tick end of the queue. Never blocks.
pub struct BufferedSource<'a, const N: usize> {
    cons: StaticCons<'a, Staged, N>,
    control: &'a Control,
    sample_rate_hz: u32,
}

impl<'a, const N: usize> BufferedSource<'a, N> {
    /// Staged samples, including ones a restart made stale
    pub fn available(&self) -> usize {
        self.cons.occupied_len()
    }

    /// Pops until a sample of `generation` turns up. At most `N` pops.
    fn pop_current(&mut self, generation: u32) -> Option<i16> {
        while let Some(staged) = self.cons.try_pop() {
            if staged.generation == generation {
                return Some(staged.sample);
            }
        }
        None
    }
}

impl<'a, const N: usize> AudioSource for BufferedSource<'a, N> {
    fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    fn read_next(&mut self) -> nb::Result<i16, EndOfStream> {
        let generation = self.control.generation.load(Ordering::Relaxed);
        if let Some(sample) = self.pop_current(generation) {
            return Ok(sample);
        }
        if self.control.drained.load(Ordering::Acquire) != generation {
            return Err(nb::Error::WouldBlock);
        }
        // the last push happens before `drained` is raised
        self.pop_current(generation).ok_or(nb::Error::Other(EndOfStream))
    }

    /// Drops staged samples and asks the loader to rewind. Reads
    /// report `WouldBlock` until the next [`Refill::pump`].
    fn restart(&mut self) {
        self.cons.clear();
        let generation = self.control.generation.load(Ordering::Relaxed);
        self.control.generation.store(next_generation(generation), Ordering::Release);
    }
}
