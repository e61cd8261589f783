use std::convert::Infallible;

use glyco_core::Component;

use crate::schedule::dose_schedule::DoseSchedule;

/// Carbohydrate appearance driven by a fixed meal schedule.
///
/// Each meal is a [`DoseWindow`](crate::schedule::dose_schedule::DoseWindow)
/// whose amount is grams of carbohydrate. The rate at time `t` (minutes) is
/// in grams per minute and is zero outside every meal window.
///
/// The schedule never changes after construction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MealInput {
    schedule: DoseSchedule,
}

impl MealInput {
    #[must_use]
    pub fn new(schedule: DoseSchedule) -> Self {
        Self { schedule }
    }

    /// Returns the carbohydrate appearance rate (g/min) at `time`.
    #[must_use]
    pub fn rate_at(&self, time: f64) -> f64 {
        self.schedule.rate_at(time)
    }

    /// Returns the total carbohydrate (g) across every scheduled meal.
    #[must_use]
    pub fn total_carbs(&self) -> f64 {
        self.schedule.total_amount()
    }

    #[must_use]
    pub fn schedule(&self) -> &DoseSchedule {
        &self.schedule
    }
}

impl Component for MealInput {
    type Input = f64;
    type Output = f64;
    type Error = Infallible;

    fn call(&self, input: Self::Input) -> Result<Self::Output, Self::Error> {
        Ok(self.rate_at(input))
    }
}
