//! Message combiners
//!
//! A combiner folds several messages addressed to the same vertex within one
//! superstep into a single message. Registering one switches the incoming
//! cache from array mode to combining mode.
//!
//! The operation must be associative and commutative: caches combine in
//! arrival order, and arrival order across workers is not deterministic.
//! This is a precondition of every implementation and is not checked.

use std::marker::PhantomData;
use std::ops::AddAssign;

/// Reduces two messages for the same vertex into one
pub trait MessageCombiner<M>: Send + Sync {
    /// Update `first` so that it represents both `first` and `second`
    fn combine(&self, first: &mut M, second: M);
}

/// Keeps the smaller message
#[derive(Debug, Clone, Copy, Default)]
pub struct MinCombiner;

impl<M: PartialOrd + Send> MessageCombiner<M> for MinCombiner {
    fn combine(&self, first: &mut M, second: M) {
        if second < *first {
            *first = second;
        }
    }
}

/// Keeps the larger message
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxCombiner;

impl<M: PartialOrd + Send> MessageCombiner<M> for MaxCombiner {
    fn combine(&self, first: &mut M, second: M) {
        if second > *first {
            *first = second;
        }
    }
}

/// Adds messages together
///
/// Uses the message type's `+=`, so plain integers panic on overflow in
/// debug builds. Pick a type that cannot overflow for the job, or one with
/// defined overflow such as [`std::num::Wrapping`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SumCombiner;

impl<M: AddAssign + Send> MessageCombiner<M> for SumCombiner {
    fn combine(&self, first: &mut M, second: M) {
        *first += second;
    }
}

/// Adapts a closure into a combiner
///
/// ```
/// use pregel_runtime::combiner::{FnCombiner, MessageCombiner};
///
/// let bitwise_or = FnCombiner::new(|a: &mut u32, b: u32| *a |= b);
/// let mut acc = 0b0101;
/// bitwise_or.combine(&mut acc, 0b0010);
/// assert_eq!(acc, 0b0111);
/// ```
pub struct FnCombiner<M, F> {
    f: F,
    _marker: PhantomData<fn(M)>,
}

impl<M, F> FnCombiner<M, F>
where
    F: Fn(&mut M, M) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

impl<M, F> MessageCombiner<M> for FnCombiner<M, F>
where
    F: Fn(&mut M, M) + Send + Sync,
{
    fn combine(&self, first: &mut M, second: M) {
        (self.f)(first, second)
    }
}
