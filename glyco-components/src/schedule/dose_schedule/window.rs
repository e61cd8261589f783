use std::ops::Range;

use thiserror::Error;

/// Associates an amount with a non-empty, half-open window of simulated time.
///
/// A `DoseWindow` delivers `amount` over `[start, start + duration)`.
/// Time is in simulated minutes; the unit of `amount` depends on what is being
/// delivered (grams of carbohydrate for meals, insulin units for boluses).
///
/// # Examples
///
/// ```
/// use glyco_components::schedule::dose_schedule::DoseWindow;
///
/// let breakfast = DoseWindow::new(30.0, 60.0, 45.0).unwrap();
/// assert!(breakfast.contains(30.0));
/// assert!(breakfast.contains(89.9));
/// assert!(!breakfast.contains(90.0));
///
/// assert!(DoseWindow::new(0.0, 0.0, 10.0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoseWindow {
    start: f64,
    duration: f64,
    amount: f64,
}

/// Error returned when a [`DoseWindow`] cannot be created.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum WindowError {
    #[error("window values must be finite (start {start}, duration {duration}, amount {amount})")]
    NonFinite {
        start: f64,
        duration: f64,
        amount: f64,
    },
    #[error("empty window: duration ({duration}) must be positive")]
    Empty { duration: f64 },
    #[error("negative amount: {amount}")]
    NegativeAmount { amount: f64 },
}

impl DoseWindow {
    /// Creates a window delivering `amount` over `[start, start + duration)`.
    ///
    /// # Errors
    ///
    /// Returns a [`WindowError`] if any value is not finite, if `duration`
    /// is not positive, or if `amount` is negative.
    pub fn new(start: f64, duration: f64, amount: f64) -> Result<Self, WindowError> {
        if !(start.is_finite() && duration.is_finite() && amount.is_finite()) {
            return Err(WindowError::NonFinite {
                start,
                duration,
                amount,
            });
        }
        if duration <= 0.0 {
            return Err(WindowError::Empty { duration });
        }
        if amount < 0.0 {
            return Err(WindowError::NegativeAmount { amount });
        }

        Ok(Self {
            start,
            duration,
            amount,
        })
    }

    /// Returns the inclusive start of the window.
    #[must_use]
    pub fn start(&self) -> f64 {
        self.start
    }

    /// Returns the exclusive end of the window.
    #[must_use]
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    #[must_use]
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Returns the total amount delivered across the whole window.
    #[must_use]
    pub fn amount(&self) -> f64 {
        self.amount
    }

    #[must_use]
    pub fn range(&self) -> Range<f64> {
        self.start..self.end()
    }

    /// Returns `true` if `time` falls within `[start, end)`.
    #[must_use]
    pub fn contains(&self, time: f64) -> bool {
        self.start <= time && time < self.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_creation() {
        let window = DoseWindow::new(10.0, 20.0, 50.0).unwrap();
        assert_eq!(window.start(), 10.0);
        assert_eq!(window.end(), 30.0);
        assert_eq!(window.duration(), 20.0);
        assert_eq!(window.amount(), 50.0);
        assert_eq!(window.range(), 10.0..30.0);
    }

    #[test]
    fn rejects_invalid_windows() {
        assert_eq!(
            DoseWindow::new(0.0, 0.0, 1.0),
            Err(WindowError::Empty { duration: 0.0 })
        );
        assert_eq!(
            DoseWindow::new(0.0, -5.0, 1.0),
            Err(WindowError::Empty { duration: -5.0 })
        );
        assert_eq!(
            DoseWindow::new(0.0, 5.0, -1.0),
            Err(WindowError::NegativeAmount { amount: -1.0 })
        );
        assert!(matches!(
            DoseWindow::new(f64::NAN, 5.0, 1.0),
            Err(WindowError::NonFinite { .. })
        ));
    }

    #[test]
    fn zero_amount_is_allowed() {
        assert!(DoseWindow::new(0.0, 5.0, 0.0).is_ok());
    }

    #[test]
    fn contains_is_half_open() {
        let window = DoseWindow::new(10.0, 10.0, 1.0).unwrap();
        assert!(!window.contains(9.999));
        assert!(window.contains(10.0));
        assert!(window.contains(19.999));
        assert!(!window.contains(20.0));
    }
}
