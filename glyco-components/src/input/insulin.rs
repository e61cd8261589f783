use std::convert::Infallible;

use glyco_core::Component;

use crate::schedule::dose_schedule::DoseSchedule;

use super::{BasalRate, BasalRateError};

/// Exogenous insulin delivery: a fixed bolus schedule plus a basal infusion.
///
/// Rates are insulin units per minute. Boluses follow the same window and
/// kernel semantics as meals. The basal part is a [`BasalRate`] cell that an
/// external controller may update at any time; the latest value applies to
/// every evaluation made after the update and to none made before it.
#[derive(Debug, Clone, Default)]
pub struct InsulinInput {
    boluses: DoseSchedule,
    basal: BasalRate,
}

impl InsulinInput {
    /// Creates an input from a bolus schedule with a zero basal rate.
    #[must_use]
    pub fn new(boluses: DoseSchedule) -> Self {
        Self {
            boluses,
            basal: BasalRate::default(),
        }
    }

    /// Replaces the basal cell with one that shares `basal`'s value.
    #[must_use]
    pub fn with_basal(mut self, basal: BasalRate) -> Self {
        self.basal = basal;
        self
    }

    /// Returns a handle to the basal cell used by this input.
    #[must_use]
    pub fn basal_handle(&self) -> BasalRate {
        self.basal.clone()
    }

    /// Returns the current basal rate (U/min).
    #[must_use]
    pub fn basal_rate(&self) -> f64 {
        self.basal.get()
    }

    /// Replaces the basal rate used by all future evaluations.
    ///
    /// # Errors
    ///
    /// Returns a [`BasalRateError`] if `rate` is negative or not finite.
    pub fn update_basal_rate(&self, rate: f64) -> Result<(), BasalRateError> {
        self.basal.set(rate)
    }

    /// Returns the scheduled bolus rate (U/min) at `time`, excluding basal.
    #[must_use]
    pub fn bolus_rate_at(&self, time: f64) -> f64 {
        self.boluses.rate_at(time)
    }

    /// Returns the total delivery rate (U/min) at `time`.
    #[must_use]
    pub fn rate_at(&self, time: f64) -> f64 {
        self.bolus_rate_at(time) + self.basal_rate()
    }

    #[must_use]
    pub fn boluses(&self) -> &DoseSchedule {
        &self.boluses
    }
}

impl Component for InsulinInput {
    type Input = f64;
    type Output = f64;
    type Error = Infallible;

    fn call(&self, input: Self::Input) -> Result<Self::Output, Self::Error> {
        Ok(self.rate_at(input))
    }
}

#[cfg(test)]
mod tests {
    use crate::schedule::dose_schedule::{AbsorptionKernel, DoseWindow};

    use super::*;

    fn insulin() -> InsulinInput {
        InsulinInput::new(DoseSchedule::new(
            [DoseWindow::new(30.0, 10.0, 2.0).unwrap()],
            AbsorptionKernel::Uniform,
        ))
    }

    #[test]
    fn bolus_only_without_basal() {
        let insulin = insulin();
        assert_eq!(insulin.rate_at(0.0), 0.0);
        assert_eq!(insulin.rate_at(35.0), 0.2);
        assert_eq!(insulin.rate_at(40.0), 0.0);
    }

    #[test]
    fn basal_adds_to_every_time() {
        let insulin = insulin();
        insulin.update_basal_rate(0.05).unwrap();

        assert_eq!(insulin.rate_at(0.0), 0.05);
        assert_eq!(insulin.rate_at(35.0), 0.2 + 0.05);
        assert_eq!(insulin.bolus_rate_at(35.0), 0.2);
    }

    #[test]
    fn only_the_latest_basal_rate_survives() {
        let insulin = insulin();
        let before = insulin.rate_at(0.0);

        insulin.update_basal_rate(0.1).unwrap();
        insulin.update_basal_rate(0.02).unwrap();

        assert_eq!(before, 0.0);
        assert_eq!(insulin.basal_rate(), 0.02);
        assert_eq!(insulin.rate_at(0.0), 0.02);
    }

    #[test]
    fn handle_updates_are_seen_by_the_input() {
        let insulin = insulin();
        let handle = insulin.basal_handle();

        handle.set(0.3).unwrap();
        assert_eq!(insulin.call(0.0), Ok(0.3));
    }

    #[test]
    fn with_basal_shares_an_existing_cell() {
        let basal = BasalRate::new(0.4).unwrap();
        let insulin = InsulinInput::default().with_basal(basal.clone());

        assert_eq!(insulin.basal_rate(), 0.4);
        basal.set(0.0).unwrap();
        assert_eq!(insulin.rate_at(100.0), 0.0);
    }
}
