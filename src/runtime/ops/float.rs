//! Float operations with WebAssembly-specific semantics.
//!
//! Results may be any NaN; the stack canonicalises on push.

macro_rules! float_ops {
    ($t:ty, $min:ident, $max:ident, $nearest:ident) => {
        /// NaN if either operand is NaN; -0.0 is less than +0.0.
        #[inline]
        pub fn $min(c1: $t, c2: $t) -> $t {
            if c1.is_nan() || c2.is_nan() {
                <$t>::NAN
            } else if c1 == 0.0 && c2 == 0.0 {
                <$t>::from_bits(c1.to_bits() | c2.to_bits())
            } else {
                c1.min(c2)
            }
        }

        /// NaN if either operand is NaN; +0.0 is greater than -0.0.
        #[inline]
        pub fn $max(c1: $t, c2: $t) -> $t {
            if c1.is_nan() || c2.is_nan() {
                <$t>::NAN
            } else if c1 == 0.0 && c2 == 0.0 {
                <$t>::from_bits(c1.to_bits() & c2.to_bits())
            } else {
                c1.max(c2)
            }
        }

        /// Round to nearest, ties to even.
        #[inline]
        pub fn $nearest(c1: $t) -> $t {
            c1.round_ties_even()
        }
    };
}

float_ops!(f32, f32_min, f32_max, f32_nearest);
float_ops!(f64, f64_min, f64_max, f64_nearest);
