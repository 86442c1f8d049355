//! Reduction operators

use crate::scalar::Scalar;
use std::marker::PhantomData;

/// Associative and commutative combine rule with an identity element
///
/// Backends start every partial accumulator at [`identity()`], let kernels
/// update it, merge partials with [`combine()`] in unspecified order, and
/// finally fold the merged value into the caller's accumulator.
///
/// [`identity()`]: Reduction::identity
/// [`combine()`]: Reduction::combine
pub trait Reduction: Send + Sync + 'static {
    /// Accumulated value
    type Value: Copy + Send + Sync + 'static;

    /// Value that leaves any other value unchanged when combined with it
    fn identity() -> Self::Value;

    /// Merge two partial results
    fn combine(a: Self::Value, b: Self::Value) -> Self::Value;

    /// Merge any number of partial results
    fn combine_all(partials: impl IntoIterator<Item = Self::Value>) -> Self::Value {
        partials
            .into_iter()
            .fold(Self::identity(), |acc, x| Self::combine(acc, x))
    }
}

/// Summation
#[derive(Copy, Clone, Debug, Default)]
pub struct Sum<T>(PhantomData<T>);
//
impl<T: Scalar> Reduction for Sum<T> {
    type Value = T;

    #[inline]
    fn identity() -> T {
        T::ZERO
    }

    #[inline]
    fn combine(a: T, b: T) -> T {
        a + b
    }
}

/// Minimum
#[derive(Copy, Clone, Debug, Default)]
pub struct Min<T>(PhantomData<T>);
//
impl<T: Scalar> Reduction for Min<T> {
    type Value = T;

    #[inline]
    fn identity() -> T {
        T::MAX
    }

    #[inline]
    fn combine(a: T, b: T) -> T {
        a.min_of(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identities() {
        assert_eq!(Sum::<i64>::combine(Sum::<i64>::identity(), 5), 5);
        assert_eq!(Min::<f64>::combine(Min::<f64>::identity(), -2.5), -2.5);
        assert_eq!(Min::<u32>::combine_all([]), u32::MAX);
    }

    #[test]
    fn combine_all() {
        assert_eq!(Sum::<u32>::combine_all([1, 2, 3, 4]), 10);
        assert_eq!(Min::<i32>::combine_all([4, -1, 7]), -1);
    }
}
