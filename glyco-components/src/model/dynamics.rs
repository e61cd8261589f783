use glyco_core::{
    Component,
    solve::ode::{Integratable, State},
};

use crate::input::{InsulinInput, MealInput};

use super::minimal::{Derivative, MinimalModel, ModelError, StateVector};

/// The minimal model coupled to a patient's meal and insulin inputs.
///
/// This is the right-hand side handed to the ODE solver for one integration
/// window. The basal rate is read once when the dynamics are built, so a
/// basal change arriving mid-window takes effect on the next window.
#[derive(Debug, Clone, Copy)]
pub struct PatientDynamics<'a> {
    model: &'a MinimalModel,
    meals: &'a MealInput,
    insulin: &'a InsulinInput,
    basal_rate: f64,
}

/// Input for [`PatientDynamics`]: a point in simulated time and the state there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DynamicsInput {
    /// Simulated time (min).
    pub time: f64,
    pub state: StateVector,
}

impl<'a> PatientDynamics<'a> {
    /// Builds the dynamics, snapshotting the current basal rate.
    #[must_use]
    pub fn new(model: &'a MinimalModel, meals: &'a MealInput, insulin: &'a InsulinInput) -> Self {
        Self {
            model,
            meals,
            insulin,
            basal_rate: insulin.basal_rate(),
        }
    }

    /// The basal rate (U/min) applied throughout this window.
    #[must_use]
    pub fn basal_rate(&self) -> f64 {
        self.basal_rate
    }

    /// Total insulin delivery (U/min) at `time`.
    #[must_use]
    pub fn insulin_rate_at(&self, time: f64) -> f64 {
        self.insulin.bolus_rate_at(time) + self.basal_rate
    }
}

impl Component for PatientDynamics<'_> {
    type Input = DynamicsInput;
    type Output = Derivative;
    type Error = ModelError;

    fn call(&self, input: Self::Input) -> Result<Self::Output, Self::Error> {
        let DynamicsInput { time, state } = input;
        self.model.derivative(
            time,
            state,
            self.meals.rate_at(time),
            self.insulin_rate_at(time),
        )
    }
}

impl Integratable<3> for PatientDynamics<'_> {
    fn apply_state(_initial_conditions: &Self::Input, state: State<3>) -> Self::Input {
        DynamicsInput {
            time: state.x,
            state: state.y.into(),
        }
    }

    fn extract_state(input: &Self::Input) -> State<3> {
        State {
            x: input.time,
            y: input.state.into(),
        }
    }

    fn extract_derivative(output: &Self::Output) -> [f64; 3] {
        (*output).into()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use crate::{
        model::minimal::PatientType,
        schedule::dose_schedule::{AbsorptionKernel, DoseSchedule, DoseWindow},
    };

    use super::*;

    fn meals() -> MealInput {
        let window = DoseWindow::new(10.0, 20.0, 40.0).unwrap();
        MealInput::new(DoseSchedule::new([window], AbsorptionKernel::Uniform))
    }

    #[test]
    fn meal_window_drives_glucose() {
        let model = MinimalModel::new(PatientType::Diabetic);
        let meals = meals();
        let insulin = InsulinInput::default();
        let dynamics = PatientDynamics::new(&model, &meals, &insulin);

        let state = model.equilibrium();
        let before = dynamics.call(DynamicsInput { time: 5.0, state }).unwrap();
        let during = dynamics.call(DynamicsInput { time: 15.0, state }).unwrap();

        assert_relative_eq!(before.glucose, 0.0);
        assert_relative_eq!(during.glucose, 1000.0 * 2.0 / 117.0);
    }

    #[test]
    fn basal_is_snapshotted_at_construction() {
        let model = MinimalModel::new(PatientType::Diabetic);
        let meals = MealInput::default();
        let insulin = InsulinInput::default();
        insulin.update_basal_rate(0.012).unwrap();

        let dynamics = PatientDynamics::new(&model, &meals, &insulin);
        insulin.update_basal_rate(0.5).unwrap();

        let state = model.equilibrium();
        let derivative = dynamics.call(DynamicsInput { time: 0.0, state }).unwrap();

        assert_relative_eq!(dynamics.basal_rate(), 0.012);
        assert_relative_eq!(derivative.insulin, 1.0);
    }

    #[test]
    fn state_conversions_follow_glucose_action_insulin_order() {
        let input = DynamicsInput {
            time: 7.0,
            state: StateVector::new(120.0, 0.001, 15.0),
        };

        let state = PatientDynamics::extract_state(&input);
        assert_eq!(state.x, 7.0);
        assert_eq!(state.y, [120.0, 0.001, 15.0]);

        let applied = PatientDynamics::apply_state(
            &input,
            State {
                x: 9.0,
                y: [100.0, 0.0, 10.0],
            },
        );
        assert_eq!(applied.time, 9.0);
        assert_eq!(applied.state, StateVector::new(100.0, 0.0, 10.0));
    }
}
