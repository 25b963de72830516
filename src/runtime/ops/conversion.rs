//! Float to integer truncation.
//!
//! The range check happens in the source float type against bounds that it
//! represents exactly, so no value is rounded before being compared. Each
//! bound is the nearest float outside the destination's range.
//!
//! Integer width changes, int to float conversions, promotion, demotion and
//! reinterpretation are plain casts in the executor.

use crate::runtime::TrapKind;

macro_rules! trunc {
    ($name:ident, $sat:ident, $src:ty => $via:ty => $dst:ty, $lo:expr, $hi:expr) => {
        /// Trapping truncation: NaN is an invalid conversion, anything
        /// outside `($lo, $hi)` after dropping the fraction overflows.
        #[inline]
        pub fn $name(x: $src) -> Result<$dst, TrapKind> {
            if x.is_nan() {
                return Err(TrapKind::InvalidConversionToInteger);
            }
            if !(x > $lo && x < $hi) {
                return Err(TrapKind::IntegerOverflow);
            }
            Ok(x as $via as $dst)
        }

        /// Saturating truncation: NaN becomes 0, out of range clamps.
        #[inline]
        pub fn $sat(x: $src) -> $dst {
            x as $via as $dst
        }
    };
}

trunc!(i32_trunc_f32_s, i32_trunc_sat_f32_s, f32 => i32 => i32, -2147483904.0, 2147483648.0);
trunc!(i32_trunc_f32_u, i32_trunc_sat_f32_u, f32 => u32 => i32, -1.0, 4294967296.0);
trunc!(i32_trunc_f64_s, i32_trunc_sat_f64_s, f64 => i32 => i32, -2147483649.0, 2147483648.0);
trunc!(i32_trunc_f64_u, i32_trunc_sat_f64_u, f64 => u32 => i32, -1.0, 4294967296.0);
trunc!(
    i64_trunc_f32_s,
    i64_trunc_sat_f32_s,
    f32 => i64 => i64,
    -9223373136366403584.0,
    9223372036854775808.0
);
trunc!(i64_trunc_f32_u, i64_trunc_sat_f32_u, f32 => u64 => i64, -1.0, 18446744073709551616.0);
trunc!(
    i64_trunc_f64_s,
    i64_trunc_sat_f64_s,
    f64 => i64 => i64,
    -9223372036854777856.0,
    9223372036854775808.0
);
trunc!(i64_trunc_f64_u, i64_trunc_sat_f64_u, f64 => u64 => i64, -1.0, 18446744073709551616.0);

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const OVERFLOW: TrapKind = TrapKind::IntegerOverflow;
    const INVALID: TrapKind = TrapKind::InvalidConversionToInteger;

    #[rstest]
    #[case(1.9, Ok(1))]
    #[case(-1.9, Ok(-1))]
    #[case(-2147483648.0, Ok(i32::MIN))]
    #[case(2147483520.0, Ok(2147483520))]
    #[case(2147483648.0, Err(OVERFLOW))]
    #[case(-2147483904.0, Err(OVERFLOW))]
    #[case(f32::INFINITY, Err(OVERFLOW))]
    #[case(f32::NEG_INFINITY, Err(OVERFLOW))]
    #[case(f32::NAN, Err(INVALID))]
    fn test_i32_trunc_f32_s(#[case] x: f32, #[case] expected: Result<i32, TrapKind>) {
        assert_eq!(i32_trunc_f32_s(x), expected);
    }

    #[rstest]
    #[case(-0.9, Ok(0))]
    #[case(-1.0, Err(OVERFLOW))]
    #[case(4294967040.0, Ok(-256))]
    #[case(4294967296.0, Err(OVERFLOW))]
    fn test_i32_trunc_f32_u(#[case] x: f32, #[case] expected: Result<i32, TrapKind>) {
        assert_eq!(i32_trunc_f32_u(x), expected);
    }

    #[rstest]
    #[case(-2147483648.9, Ok(i32::MIN))]
    #[case(-2147483649.0, Err(OVERFLOW))]
    #[case(2147483647.9, Ok(i32::MAX))]
    #[case(2147483648.0, Err(OVERFLOW))]
    fn test_i32_trunc_f64_s(#[case] x: f64, #[case] expected: Result<i32, TrapKind>) {
        assert_eq!(i32_trunc_f64_s(x), expected);
    }

    #[test]
    fn test_i32_trunc_f64_u() {
        assert_eq!(i32_trunc_f64_u(4294967295.9), Ok(-1));
        assert_eq!(i32_trunc_f64_u(4294967296.0), Err(OVERFLOW));
        assert_eq!(i32_trunc_f64_u(-0.99), Ok(0));
        assert_eq!(i32_trunc_f64_u(f64::NAN), Err(INVALID));
    }

    #[test]
    fn test_i64_trunc() {
        assert_eq!(i64_trunc_f32_s(-9223372036854775808.0), Ok(i64::MIN));
        assert_eq!(i64_trunc_f32_s(9223372036854775808.0), Err(OVERFLOW));
        assert_eq!(i64_trunc_f64_s(-9223372036854775808.0), Ok(i64::MIN));
        assert_eq!(i64_trunc_f64_s(9223372036854774784.0), Ok(9223372036854774784));
        assert_eq!(i64_trunc_f64_s(9223372036854775808.0), Err(OVERFLOW));
        assert_eq!(i64_trunc_f64_u(18446744073709549568.0), Ok(-2048));
        assert_eq!(i64_trunc_f64_u(18446744073709551616.0), Err(OVERFLOW));
        assert_eq!(i64_trunc_f32_u(-0.5), Ok(0));
        assert_eq!(i64_trunc_f64_u(f64::NAN), Err(INVALID));
    }

    #[test]
    fn test_trunc_sat() {
        assert_eq!(i32_trunc_sat_f32_s(f32::NAN), 0);
        assert_eq!(i32_trunc_sat_f32_s(3e9), i32::MAX);
        assert_eq!(i32_trunc_sat_f32_s(-3e9), i32::MIN);
        assert_eq!(i32_trunc_sat_f32_u(-5.0), 0);
        assert_eq!(i32_trunc_sat_f64_u(5e9), -1);
        assert_eq!(i64_trunc_sat_f64_s(f64::INFINITY), i64::MAX);
        assert_eq!(i64_trunc_sat_f64_u(f64::NEG_INFINITY), 0);
        assert_eq!(i64_trunc_sat_f32_u(1e20), -1);
        assert_eq!(i64_trunc_sat_f64_s(-1.5), -1);
    }
}
