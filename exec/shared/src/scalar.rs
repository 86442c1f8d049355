//! Scalar cell values

use std::{fmt::Debug, ops::Add};

/// Numeric value that can be reduced and stored in shared fields
///
/// Values round-trip losslessly through a `u64` bit pattern, which is how
/// [`GridField`](crate::field::GridField) stores them atomically.
pub trait Scalar:
    Copy + Debug + Default + PartialOrd + Add<Output = Self> + Send + Sync + 'static
{
    /// Identity of addition
    const ZERO: Self;

    /// Identity of the minimum
    const MAX: Self;

    /// Bit pattern of this value
    fn to_bits(self) -> u64;

    /// Value with a given bit pattern
    fn from_bits(bits: u64) -> Self;

    /// Smallest of two values
    #[inline]
    fn min_of(self, other: Self) -> Self {
        if other < self {
            other
        } else {
            self
        }
    }
}

macro_rules! impl_scalar_int {
    ($($t:ty),*) => {
        $(
            impl Scalar for $t {
                const ZERO: Self = 0;
                const MAX: Self = <$t>::MAX;

                #[inline]
                fn to_bits(self) -> u64 {
                    self as u64
                }

                #[inline]
                fn from_bits(bits: u64) -> Self {
                    bits as $t
                }
            }
        )*
    };
}
impl_scalar_int!(i32, i64, u32, u64, usize);

macro_rules! impl_scalar_float {
    ($($t:ty),*) => {
        $(
            impl Scalar for $t {
                const ZERO: Self = 0.0;
                const MAX: Self = <$t>::INFINITY;

                #[inline]
                fn to_bits(self) -> u64 {
                    u64::from(<$t>::to_bits(self))
                }

                #[inline]
                fn from_bits(bits: u64) -> Self {
                    <$t>::from_bits(bits as _)
                }
            }
        )*
    };
}
impl_scalar_float!(f32, f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_round_trip_signed() {
        for x in [-7i32, i32::MIN, i32::MAX] {
            assert_eq!(<i32 as Scalar>::from_bits(Scalar::to_bits(x)), x);
        }
        for x in [-0.5f32, f32::INFINITY] {
            assert_eq!(<f32 as Scalar>::from_bits(Scalar::to_bits(x)), x);
        }
    }

    #[test]
    fn min_identity() {
        assert_eq!(f64::MAX.min_of(3.0), 3.0);
        assert_eq!(<f64 as Scalar>::MAX, f64::INFINITY);
        assert_eq!(<u32 as Scalar>::MAX.min_of(9), 9);
    }
}
