//! Miscellaneous utility structs and functions.

use std::fmt::Debug;
use std::ops::Range;

use serde::{Deserialize, Serialize};

/// An interval on the real number line.
#[derive(Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval<T> {
    pub min: T,
    pub max: T,
}

impl<T> Interval<T> {
    /// Creates a new interval.
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }
}

impl<T: std::ops::Sub<T, Output = T> + Copy> Interval<T> {
    /// Gets the magnitude of the interval.
    pub fn length(&self) -> T {
        self.max - self.min
    }
}

impl Interval<f64> {
    /// The indices of the time steps of length `dt` which start inside the interval.
    pub fn steps(&self, dt: f64) -> Range<usize> {
        let start = (self.min / dt).max(0.0) as usize;
        let end = (self.max / dt).max(0.0) as usize;
        start..end
    }
}

impl<T: Debug> Debug for Interval<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Interval({:?}, {:?})", &self.min, &self.max)
    }
}

/// Index of the bin of width `width` containing `value`, with bin 0 starting at zero.
pub(crate) fn bin_index(value: f64, width: f64) -> usize {
    (value / width).max(0.0) as usize
}
