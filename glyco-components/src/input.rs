//! Exogenous inputs that drive the physiological model.
//!
//! Both inputs map simulated time (minutes) to a delivery rate per minute:
//! [`MealInput`] in grams of carbohydrate, [`InsulinInput`] in insulin units.

mod basal;
mod insulin;
mod meal;

pub use basal::{BasalRate, BasalRateError};
pub use insulin::InsulinInput;
pub use meal::MealInput;
