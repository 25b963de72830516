//! Integer operations that can trap.
//!
//! Everything else in the integer instruction set maps to a single
//! `wrapping_*`, shift or bit-count call in the executor.

use crate::runtime::TrapKind;

macro_rules! int_div_rem {
    ($signed:ty, $unsigned:ty, $div_s:ident, $div_u:ident, $rem_s:ident, $rem_u:ident) => {
        /// Signed division, truncating toward zero.
        ///
        /// Traps on a zero divisor, and on `MIN / -1` whose result does not
        /// fit.
        #[inline]
        pub fn $div_s(c1: $signed, c2: $signed) -> Result<$signed, TrapKind> {
            if c2 == 0 {
                return Err(TrapKind::IntegerDivideByZero);
            }
            c1.checked_div(c2).ok_or(TrapKind::IntegerOverflow)
        }

        #[inline]
        pub fn $div_u(c1: $signed, c2: $signed) -> Result<$signed, TrapKind> {
            if c2 == 0 {
                return Err(TrapKind::IntegerDivideByZero);
            }
            Ok(((c1 as $unsigned) / (c2 as $unsigned)) as $signed)
        }

        /// Signed remainder with the sign of the dividend. `MIN % -1` is 0.
        #[inline]
        pub fn $rem_s(c1: $signed, c2: $signed) -> Result<$signed, TrapKind> {
            if c2 == 0 {
                return Err(TrapKind::IntegerDivideByZero);
            }
            Ok(c1.wrapping_rem(c2))
        }

        #[inline]
        pub fn $rem_u(c1: $signed, c2: $signed) -> Result<$signed, TrapKind> {
            if c2 == 0 {
                return Err(TrapKind::IntegerDivideByZero);
            }
            Ok(((c1 as $unsigned) % (c2 as $unsigned)) as $signed)
        }
    };
}

int_div_rem!(i32, u32, i32_div_s, i32_div_u, i32_rem_s, i32_rem_u);
int_div_rem!(i64, u64, i64_div_s, i64_div_u, i64_rem_s, i64_rem_u);

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(7, 2, Ok(3))]
    #[case(-7, 2, Ok(-3))]
    #[case(7, -2, Ok(-3))]
    #[case(i32::MIN, 1, Ok(i32::MIN))]
    #[case(1, 0, Err(TrapKind::IntegerDivideByZero))]
    #[case(i32::MIN, -1, Err(TrapKind::IntegerOverflow))]
    fn test_i32_div_s(#[case] c1: i32, #[case] c2: i32, #[case] expected: Result<i32, TrapKind>) {
        assert_eq!(i32_div_s(c1, c2), expected);
    }

    #[rstest]
    #[case(7, 2, Ok(1))]
    #[case(-7, 2, Ok(-1))]
    #[case(7, -2, Ok(1))]
    #[case(i32::MIN, -1, Ok(0))]
    #[case(1, 0, Err(TrapKind::IntegerDivideByZero))]
    fn test_i32_rem_s(#[case] c1: i32, #[case] c2: i32, #[case] expected: Result<i32, TrapKind>) {
        assert_eq!(i32_rem_s(c1, c2), expected);
    }

    #[test]
    fn test_i32_unsigned() {
        assert_eq!(i32_div_u(-1, 2), Ok(0x7fff_ffff));
        assert_eq!(i32_rem_u(-1, 2), Ok(1));
        assert_eq!(i32_div_u(i32::MIN, -1), Ok(0));
        assert_eq!(i32_div_u(1, 0), Err(TrapKind::IntegerDivideByZero));
        assert_eq!(i32_rem_u(1, 0), Err(TrapKind::IntegerDivideByZero));
    }

    #[test]
    fn test_i64() {
        assert_eq!(i64_div_s(i64::MIN, -1), Err(TrapKind::IntegerOverflow));
        assert_eq!(i64_rem_s(i64::MIN, -1), Ok(0));
        assert_eq!(i64_div_s(-9, 4), Ok(-2));
        assert_eq!(i64_div_u(-1, 1 << 32), Ok(0xffff_ffff));
        assert_eq!(i64_rem_u(0, 0), Err(TrapKind::IntegerDivideByZero));
    }
}
