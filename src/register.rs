//! APLL registers
//!
//! The ESP32 audio PLL is programmed through the internal register I2C
//! bus, block `0x6D`. Registers are 8 bits wide; only the ones the
//! transmitter rewrites are modelled here.

use core::marker::PhantomData;

/// APLL block address on the internal register bus
pub const I2C_APLL: u8 = 0x6D;

/// First SDM stop value, written before the revision specific one
pub const SDM_STOP_VAL_1: u8 = 0x09;

/// SDM stop value for revision 0 silicon
pub const SDM_STOP_VAL_2_REV0: u8 = 0x69;

/// SDM stop value for revision 1+ silicon
pub const SDM_STOP_VAL_2_REV1: u8 = 0x49;

/// Register marker types
macro_rules! gen_register_marker {
    ($r:ident, $n:tt) => {
        /// Register marker
        #[derive(Debug,Copy,Clone,PartialEq,Eq)]
        pub struct $r {}

        impl Address for $r { #[inline] fn address() -> u8 { $n } }
    }
}

/// Register address on the APLL block
pub trait Address {
    fn address() -> u8;
}

gen_register_marker!(OrOutputDiv, 4);
gen_register_marker!(SdmStop, 5);
gen_register_marker!(Dsdm2, 7);
gen_register_marker!(Dsdm1, 8);
gen_register_marker!(Dsdm0, 9);


/// Single 8-bit register shadow
#[derive(Debug,Copy,Clone,PartialEq,Eq)]
pub struct Reg<R> {
    /// Register byte
    pub w: u8,
    phantom: PhantomData<R>,
}

impl<R> Default for Reg<R> {
    #[inline]
    fn default() -> Self { Reg { w: 0, phantom: PhantomData } }
}

/// Bit operations on register bytes
impl<R: Address> Reg<R> {
    #[inline]
    pub fn new(w: u8) -> Self {
        Reg { w, phantom: PhantomData }
    }

    #[inline]
    pub fn get<F>(&self) -> F
    where F: BitField<R> + From<u8>
    {
        F::from((self.w >> F::offset()) & F::mask())
    }

    #[inline]
    pub fn set<F>(mut self, f: F) -> Self
    where F: BitField<R> + Into<u8>
    {
        let fbits = (f.into() & F::mask()) << F::offset();
        let rbits = self.w & !(F::mask() << F::offset());
        self.w = rbits | fbits;
        self
    }

    /// Bus write for this register: address and byte
    #[inline]
    pub fn write(&self) -> [u8; 2] {
        [R::address(), self.w]
    }
}


/// Bit operations on register bytes
pub trait BitField<R> {
    /// Number of bits in the bit field
    fn num_bits() -> u8;

    /// Offset from 0
    fn offset() -> u8;

    #[inline]
    fn mask() -> u8 {
        (0xFFu16 >> (8 - Self::num_bits())) as u8
    }
}

/// Small bitfield-encoded numbers boilerplate
macro_rules! gen_bitfield_struct {
	($(#[$meta:meta])*, $r:ty, $n:ident, $nb:tt, $off:tt) => {
        $(#[$meta])*
        #[derive(Debug,Copy,Clone,PartialEq,Eq)]
        pub struct $n(pub u8);

        impl BitField<$r> for $n {
            #[inline] fn num_bits() -> u8 { $nb }
            #[inline] fn offset() -> u8 { $off }
        }

        impl From<u8> for $n { #[inline] fn from(x: u8) -> Self { $n(x) } }
        impl From<$n> for u8 { #[inline] fn from(x: $n) -> u8 { x.0 } }
	};
}

gen_bitfield_struct!(
    /// Output divider selector, bits [4:0]. The APLL output is
    /// f_vco / (2 × (o_div + 2)).
    , OrOutputDiv, ODiv, 5, 0
);

gen_bitfield_struct!(
    /// Integer numerator offset, bits [5:0].
    , Dsdm2, Sdm2, 6, 0
);

gen_bitfield_struct!(
    /// High byte of the fractional codeword.
    , Dsdm1, Sdm1, 8, 0
);

gen_bitfield_struct!(
    /// Low byte of the fractional codeword.
    , Dsdm0, Sdm0, 8, 0
);

gen_bitfield_struct!(
    /// Sigma-delta modulator stop sequence value.
    , SdmStop, StopVal, 8, 0
);


/// Shadow of the APLL registers the transmitter rewrites.
///
/// Masked fields keep the surrounding bits of their register untouched.
#[derive(Debug,Copy,Clone,Default,PartialEq,Eq)]
pub struct RegisterSet {
    pub or_output_div: Reg<OrOutputDiv>,
    pub sdm_stop: Reg<SdmStop>,
    pub dsdm2: Reg<Dsdm2>,
    pub dsdm1: Reg<Dsdm1>,
    pub dsdm0: Reg<Dsdm0>,
}

impl RegisterSet {

    /// Updates the coefficient fields.
    ///
    /// Revision 0 silicon has no usable fractional part: `sdm1` and
    /// `sdm0` are forced to 0 and a different SDM stop value is used.
    pub fn with_coefficients(
        mut self,
        o_div: u8,
        sdm2: u8,
        sdm1: u8,
        sdm0: u8,
        is_rev0: bool,
    ) -> Self {
        let (sdm1, sdm0, stop) = if is_rev0 {
            (0, 0, SDM_STOP_VAL_2_REV0)
        } else {
            (sdm1, sdm0, SDM_STOP_VAL_2_REV1)
        };
        self.or_output_div = self.or_output_div.set(ODiv(o_div));
        self.dsdm2 = self.dsdm2.set(Sdm2(sdm2));
        self.dsdm1 = self.dsdm1.set(Sdm1(sdm1));
        self.dsdm0 = self.dsdm0.set(Sdm0(sdm0));
        self.sdm_stop = self.sdm_stop.set(StopVal(stop));
        self
    }

    /// Bus writes in device order: numerator, SDM stop sequence, divider.
    pub fn to_writes(&self) -> [[u8; 2]; 6] {
        [
            self.dsdm2.write(),
            self.dsdm0.write(),
            self.dsdm1.write(),
            Reg::<SdmStop>::new(SDM_STOP_VAL_1).write(),
            self.sdm_stop.write(),
            self.or_output_div.write(),
        ]
    }
}
