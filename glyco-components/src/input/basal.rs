use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use thiserror::Error;

/// A shared basal insulin rate, in insulin units per minute.
///
/// Clones share the same cell, so a message handler can hold one handle while
/// the simulation reads another. The rate is stored as `f64` bits in an
/// [`AtomicU64`], which makes every read and write whole: a reader never
/// observes a partially written value.
///
/// Only the latest value is kept.
///
/// # Examples
///
/// ```
/// use glyco_components::input::BasalRate;
///
/// let basal = BasalRate::default();
/// let handle = basal.clone();
///
/// handle.set(0.02).unwrap();
/// handle.set(0.015).unwrap();
/// assert_eq!(basal.get(), 0.015);
///
/// assert!(handle.set(-1.0).is_err());
/// assert_eq!(basal.get(), 0.015);
/// ```
#[derive(Debug, Clone, Default)]
pub struct BasalRate(Arc<AtomicU64>);

/// Error returned when a basal rate is negative or not finite.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("invalid basal rate {rate}: must be finite and non-negative")]
pub struct BasalRateError {
    pub rate: f64,
}

impl BasalRate {
    /// Creates a new cell holding `rate`.
    ///
    /// # Errors
    ///
    /// Returns a [`BasalRateError`] if `rate` is negative or not finite.
    pub fn new(rate: f64) -> Result<Self, BasalRateError> {
        let cell = Self::default();
        cell.set(rate)?;
        Ok(cell)
    }

    /// Returns the current rate.
    #[must_use]
    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    /// Replaces the current rate.
    ///
    /// # Errors
    ///
    /// Returns a [`BasalRateError`] and leaves the current rate untouched if
    /// `rate` is negative or not finite.
    pub fn set(&self, rate: f64) -> Result<(), BasalRateError> {
        if !rate.is_finite() || rate < 0.0 {
            return Err(BasalRateError { rate });
        }
        self.0.store(rate.to_bits(), Ordering::Release);
        Ok(())
    }
}
