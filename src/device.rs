//! Register sink and the APLL device behind it

use embedded_hal::blocking::i2c::Write;

use crate::config::{LiveConfig, SynthesizerConfig};
use crate::errors::*;
use crate::register::*;

/// One complete coefficient update.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RegisterWrite {
    /// Output divider selector (`o_div`)
    pub divider: u8,
    /// Integer numerator offset (`sdm2`), 0 to 63
    pub numerator_offset: u8,
    /// `sdm0`
    pub fraction_low: u8,
    /// `sdm1`
    pub fraction_high: u8,
    /// Revision 0 register layout
    pub hardware_revision_flag: bool,
}

impl RegisterWrite {
    /// Splits a live configuration into register bytes.
    #[inline]
    pub fn new(base: &SynthesizerConfig, live: &LiveConfig) -> Self {
        RegisterWrite {
            divider: base.divider,
            numerator_offset: live.numerator_offset,
            fraction_low: live.fraction_low(),
            fraction_high: live.fraction_high(),
            hardware_revision_flag: base.hardware_revision_flag,
        }
    }
}

/// Destination of coefficient updates.
///
/// Called from the sample tick. Implementations must return in bounded
/// time and cannot fail; faults are recorded on the implementation's side.
pub trait RegisterSink {
    fn write(&mut self, write: &RegisterWrite);
}

/// ESP32 APLL on the internal register bus
pub struct Apll<I2C> {
    i2c: I2C,
    rs: RegisterSet,
    bus_errors: u32,
}

impl<I2C> Apll<I2C>
where I2C: Write,
{
    /// Creates the device with zeroed register shadows.
    pub fn new(i2c: I2C) -> Self {
        Self::with_shadow(i2c, RegisterSet::default())
    }

    /// Creates the device from register contents read back at boot, so
    /// masked writes keep the bits this driver does not own.
    pub fn with_shadow(i2c: I2C, rs: RegisterSet) -> Self {
        Apll { i2c, rs, bus_errors: 0 }
    }

    /// Programs new coefficients. Blocking call: six bus writes, so
    /// the bus must complete each one in bounded time for this to serve
    /// as the tick's [`RegisterSink`].
    pub fn write_coefficients(&mut self, w: &RegisterWrite) -> Result<()> {
        self.rs = self.rs.with_coefficients(
            w.divider,
            w.numerator_offset,
            w.fraction_high,
            w.fraction_low,
            w.hardware_revision_flag,
        );
        for data in self.rs.to_writes().iter() {
            self.i2c.write(I2C_APLL, data).map_err(|_| Error::Bus)?;
        }
        Ok(())
    }

    /// Current register shadow
    pub fn registers(&self) -> &RegisterSet {
        &self.rs
    }

    /// Failed writes since creation
    pub fn bus_errors(&self) -> u32 {
        self.bus_errors
    }

    /// Releases the bus.
    pub fn free(self) -> I2C {
        self.i2c
    }
}

impl<I2C> RegisterSink for Apll<I2C>
where I2C: Write,
{
    #[inline]
    fn write(&mut self, w: &RegisterWrite) {
        if self.write_coefficients(w).is_err() {
            self.bus_errors = self.bus_errors.wrapping_add(1);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Bus {
        writes: Vec<(u8, [u8; 2])>,
        fail: bool,
    }

    impl Write for Bus {
        type Error = ();

        fn write(&mut self, address: u8, bytes: &[u8]) -> core::result::Result<(), ()> {
            if self.fail {
                return Err(());
            }
            self.writes.push((address, [bytes[0], bytes[1]]));
            Ok(())
        }
    }

    fn update() -> RegisterWrite {
        RegisterWrite {
            divider: 0,
            numerator_offset: 6,
            fraction_low: 0xEC,
            fraction_high: 0x01,
            hardware_revision_flag: false,
        }
    }

    #[test]
    fn write_programs_apll_block() {
        let mut apll = Apll::new(Bus::default());
        apll.write(&update());

        let bus = apll.free();
        assert_eq!(bus.writes.len(), 6);
        assert!(bus.writes.iter().all(|(a, _)| *a == I2C_APLL));
        assert_eq!(bus.writes[0].1, [7, 6]);
        assert_eq!(bus.writes[1].1, [9, 0xEC]);
        assert_eq!(bus.writes[2].1, [8, 0x01]);
        assert_eq!(bus.writes[5].1, [4, 0]);
    }

    #[test]
    fn bus_failure_is_counted_not_raised() {
        let mut apll = Apll::new(Bus { fail: true, ..Bus::default() });
        apll.write(&update());
        apll.write(&update());
        assert_eq!(apll.bus_errors(), 2);
        assert_eq!(apll.write_coefficients(&update()), Err(Error::Bus));
    }

    #[test]
    fn split_from_live_config() {
        let base = SynthesizerConfig::derive(40_000_000, 100_000_000, 75_000, false).unwrap();
        let live = LiveConfig { numerator_offset: 6, fraction: 0x01EC };
        assert_eq!(RegisterWrite::new(&base, &live), update());
    }
}
