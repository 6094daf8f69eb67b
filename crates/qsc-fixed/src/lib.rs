#![forbid(unsafe_code)]

//! Q8.8 fixed-point arithmetic as performed by the resizer datapath.
//!
//! Values carry 8 fractional bits. The register itself is 32 bits wide so a
//! promoted 8-bit sample (up to `255 << 8`) never wraps; products are formed
//! in 64 bits and narrowed back with two's-complement wrapping, which keeps
//! every primitive total.

use std::fmt;

pub const FRAC_BITS: u32 = 8;
pub const ONE: i32 = 1 << FRAC_BITS;
pub const FRAC_MASK: i32 = ONE - 1;
/// Half an LSB of the integer part; turns the final truncating shift into
/// round-to-nearest.
pub const ROUNDING_BIAS: i64 = 0x0080;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fixed(i32);

impl Fixed {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(ONE);

    #[must_use]
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> i32 {
        self.0
    }

    #[must_use]
    pub const fn wrapping_add(self, rhs: Self) -> Self {
        Self(self.0.wrapping_add(rhs.0))
    }

    #[must_use]
    pub const fn wrapping_sub(self, rhs: Self) -> Self {
        Self(self.0.wrapping_sub(rhs.0))
    }

    #[must_use]
    pub fn to_f64(self) -> f64 {
        f64::from(self.0) / f64::from(ONE)
    }
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4} (raw=0x{:X})", self.to_f64(), self.0)
    }
}

/// Promotes an 8-bit sample; exact, no fractional part.
#[must_use]
pub const fn to_fixed(sample: u8) -> Fixed {
    Fixed((sample as i32) << FRAC_BITS)
}

/// `x * 256` truncated toward zero.
///
/// This is a truncation, not a round-to-nearest: `1.0 / 0.75` becomes `0x155`,
/// not `0x156`. Values beyond the register saturate and NaN maps to zero.
#[must_use]
pub fn float_to_fixed(x: f32) -> Fixed {
    Fixed((x * ONE as f32) as i32)
}

/// `(a * b) >> 8` with an arithmetic (sign-preserving) shift.
#[must_use]
pub const fn fixed_multiply(a: Fixed, b: Fixed) -> Fixed {
    let product = (a.0 as i64) * (b.0 as i64);
    Fixed((product >> FRAC_BITS) as i32)
}

/// `a + (b - a) * t`.
#[must_use]
pub const fn lerp(a: Fixed, b: Fixed, t: Fixed) -> Fixed {
    let term = fixed_multiply(b.wrapping_sub(a), t);
    a.wrapping_add(term)
}

/// Rounds to the nearest integer and clamps into `[0, 255]`.
#[must_use]
pub const fn saturate_to_byte(x: Fixed) -> u8 {
    saturate_raw_to_byte(x.0 as i64)
}

/// Same rounding as [`saturate_to_byte`] for an arbitrary wide accumulator.
#[must_use]
pub const fn saturate_raw_to_byte(raw: i64) -> u8 {
    let rounded = raw.saturating_add(ROUNDING_BIAS) >> FRAC_BITS;
    if rounded < 0 {
        0
    } else if rounded > u8::MAX as i64 {
        u8::MAX
    } else {
        rounded as u8
    }
}

/// Integer source coordinate addressed by a position accumulator.
#[must_use]
pub const fn integer_part(acc: i32) -> i32 {
    acc >> FRAC_BITS
}

/// Interpolation weight derived from the low byte of a position accumulator.
///
/// The 8-bit fraction is shifted into the integer byte before it reaches
/// [`lerp`]; the hardware feeds the raw fraction into a full Q8.8 multiplier
/// input the same way.
#[must_use]
pub const fn fraction_weight(acc: i32) -> Fixed {
    Fixed((acc & FRAC_MASK) << FRAC_BITS)
}

#[cfg(test)]
mod tests {
    use super::{
        Fixed, ONE, float_to_fixed, fixed_multiply, fraction_weight, integer_part, lerp,
        saturate_raw_to_byte, saturate_to_byte, to_fixed,
    };
    use proptest::prelude::*;

    #[test]
    fn promotion_is_exact() {
        assert_eq!(to_fixed(0).raw(), 0);
        assert_eq!(to_fixed(1).raw(), 0x100);
        assert_eq!(to_fixed(255).raw(), 0xFF00);
        assert_eq!(saturate_to_byte(to_fixed(200)), 200);
    }

    #[test]
    fn float_conversion_truncates() {
        assert_eq!(float_to_fixed(1.0).raw(), 256);
        assert_eq!(float_to_fixed(2.0).raw(), 512);
        // 1/0.75 * 256 = 341.33.. -> 341
        assert_eq!(float_to_fixed(1.0 / 0.75).raw(), 0x155);
        // 0.999 * 256 = 255.74 -> 255, no rounding up
        assert_eq!(float_to_fixed(0.999).raw(), 255);
        assert_eq!(float_to_fixed(-1.5).raw(), -384);
        assert_eq!(float_to_fixed(f32::NAN).raw(), 0);
    }

    #[test]
    fn multiply_shifts_arithmetically() {
        let half = Fixed::from_raw(0x80);
        assert_eq!(fixed_multiply(to_fixed(10), half).raw(), 5 << 8);
        assert_eq!(fixed_multiply(Fixed::from_raw(-512), half).raw(), -256);
        // -1 * 1/256 = -1/65536, floors to -1 raw rather than truncating to 0
        assert_eq!(
            fixed_multiply(Fixed::from_raw(-1), Fixed::from_raw(1)).raw(),
            -1
        );
    }

    #[test]
    fn lerp_endpoints() {
        let a = to_fixed(16);
        let b = to_fixed(32);
        assert_eq!(lerp(a, b, Fixed::ZERO), a);
        assert_eq!(lerp(a, b, Fixed::ONE), b);
        assert_eq!(lerp(a, b, Fixed::from_raw(ONE / 2)), to_fixed(24));
        assert_eq!(lerp(b, a, Fixed::from_raw(ONE / 4)), to_fixed(28));
    }

    #[test]
    fn rounding_bias_is_half_lsb() {
        assert_eq!(saturate_to_byte(Fixed::from_raw(0x017F)), 1);
        assert_eq!(saturate_to_byte(Fixed::from_raw(0x0180)), 2);
        assert_eq!(saturate_to_byte(Fixed::from_raw(0x0FF7F)), 255);
        assert_eq!(saturate_to_byte(Fixed::from_raw(0x10000)), 255);
        assert_eq!(saturate_to_byte(Fixed::from_raw(-0x81)), 0);
        assert_eq!(saturate_to_byte(Fixed::from_raw(-0x80)), 0);
    }

    #[test]
    fn saturation_handles_register_extremes() {
        assert_eq!(saturate_to_byte(Fixed::from_raw(i32::MAX)), 255);
        assert_eq!(saturate_to_byte(Fixed::from_raw(i32::MIN)), 0);
        assert_eq!(saturate_raw_to_byte(i64::MAX), 255);
        assert_eq!(saturate_raw_to_byte(i64::MIN), 0);
    }

    #[test]
    fn accumulator_decomposition() {
        let acc = 0x0355;
        assert_eq!(integer_part(acc), 3);
        assert_eq!(fraction_weight(acc).raw(), 0x5500);
        assert_eq!(fraction_weight(0x0400).raw(), 0);
    }

    proptest! {
        #[test]
        fn saturate_never_leaves_byte_range(raw in any::<i64>()) {
            let byte = saturate_raw_to_byte(raw);
            let narrow = i32::try_from(raw).map(|r| saturate_to_byte(Fixed::from_raw(r)));
            if let Ok(narrow) = narrow {
                prop_assert_eq!(narrow, byte);
            }
            prop_assert!(u16::from(byte) <= 255);
        }

        #[test]
        fn promoted_samples_survive_saturation(sample in any::<u8>()) {
            prop_assert_eq!(saturate_to_byte(to_fixed(sample)), sample);
        }

        #[test]
        fn lerp_with_zero_weight_is_identity(a in any::<u8>(), b in any::<u8>()) {
            prop_assert_eq!(lerp(to_fixed(a), to_fixed(b), Fixed::ZERO), to_fixed(a));
            prop_assert_eq!(lerp(to_fixed(a), to_fixed(b), Fixed::ONE), to_fixed(b));
        }
    }
}
