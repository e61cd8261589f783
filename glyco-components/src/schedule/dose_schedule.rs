mod kernel;
mod window;

use std::convert::Infallible;

use glyco_core::Component;

pub use kernel::AbsorptionKernel;
pub use window::{DoseWindow, WindowError};

/// A fixed schedule of [`DoseWindow`]s delivered through one [`AbsorptionKernel`].
///
/// Unlike a step schedule, windows may overlap: the schedule's rate at any
/// time is the sum of every window active at that time.
///
/// # Examples
///
/// ```
/// use glyco_components::schedule::dose_schedule::{AbsorptionKernel, DoseSchedule, DoseWindow};
///
/// let schedule = DoseSchedule::new(
///     [
///         DoseWindow::new(0.0, 10.0, 20.0).unwrap(),
///         DoseWindow::new(5.0, 10.0, 10.0).unwrap(),
///     ],
///     AbsorptionKernel::Uniform,
/// );
///
/// assert_eq!(schedule.rate_at(-1.0), 0.0);
/// assert_eq!(schedule.rate_at(2.0), 2.0);
/// assert_eq!(schedule.rate_at(7.0), 3.0);
/// assert_eq!(schedule.rate_at(12.0), 1.0);
/// assert_eq!(schedule.rate_at(15.0), 0.0);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DoseSchedule {
    windows: Vec<DoseWindow>,
    kernel: AbsorptionKernel,
}

impl DoseSchedule {
    /// Creates a schedule from an iterator over [`DoseWindow`]s.
    ///
    /// The resulting schedule is ordered by increasing start time.
    pub fn new<I>(windows: I, kernel: AbsorptionKernel) -> Self
    where
        I: IntoIterator<Item = DoseWindow>,
    {
        let mut windows: Vec<_> = windows.into_iter().collect();
        windows.sort_by(|a, b| a.start().total_cmp(&b.start()));
        Self { windows, kernel }
    }

    /// Returns all windows in order of increasing start time.
    #[must_use]
    pub fn windows(&self) -> &[DoseWindow] {
        &self.windows
    }

    #[must_use]
    pub fn kernel(&self) -> AbsorptionKernel {
        self.kernel
    }

    /// Returns the total amount delivered by the whole schedule.
    #[must_use]
    pub fn total_amount(&self) -> f64 {
        self.windows.iter().map(DoseWindow::amount).sum()
    }

    /// Returns the summed delivery rate of every window active at `time`.
    ///
    /// Windows starting after `time` are skipped without being visited.
    #[must_use]
    pub fn rate_at(&self, time: f64) -> f64 {
        let started = self.windows.partition_point(|window| window.start() <= time);
        self.windows[..started]
            .iter()
            .map(|window| self.kernel.rate(window, time))
            .sum()
    }
}

impl Component for DoseSchedule {
    type Input = f64;
    type Output = f64;
    type Error = Infallible;

    /// Returns the schedule's delivery rate at the input time.
    fn call(&self, input: Self::Input) -> Result<Self::Output, Self::Error> {
        Ok(self.rate_at(input))
    }
}
