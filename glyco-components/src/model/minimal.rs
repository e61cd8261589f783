//! The Bergman minimal model of glucose–insulin dynamics.
//!
//! Three states evolve in simulated minutes:
//!
//! ```text
//! dG/dt = −(p1 + X)·G + p1·Gb + 1000·Ra(t) / VG
//! dX/dt = −p2·X + p3·(I − Ib)
//! dI/dt = −n·(I − Ib) + γ·max(G − h, 0) + 1000·u(t) / VI
//! ```
//!
//! `Ra(t)` is carbohydrate appearance (g/min) and `u(t)` exogenous insulin
//! delivery (U/min). The factors of 1000 convert grams to milligrams over a
//! volume in decilitres, and insulin units to micro-units over a volume in
//! litres.

mod params;

use glyco_core::Component;
use thiserror::Error;

pub use params::{BergmanParams, ParamError};

/// Which default coefficient set applies to a patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatientType {
    Normal,
    Diabetic,
}

impl PatientType {
    #[must_use]
    pub fn from_diabetic(diabetic: bool) -> Self {
        if diabetic { Self::Diabetic } else { Self::Normal }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Diabetic => "diabetic",
        }
    }
}

/// The model state `(G, X, I)`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StateVector {
    /// Plasma glucose `G` (mg/dL).
    pub glucose: f64,
    /// Remote insulin action `X` (1/min).
    pub insulin_action: f64,
    /// Plasma insulin `I` (µU/mL).
    pub insulin: f64,
}

/// The time derivative of a [`StateVector`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Derivative {
    pub glucose: f64,
    pub insulin_action: f64,
    pub insulin: f64,
}

/// Input to [`MinimalModel`] when used as a [`Component`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelInput {
    /// Simulated time (min).
    pub time: f64,
    pub state: StateVector,
    /// Carbohydrate appearance rate (g/min).
    pub meal_rate: f64,
    /// Exogenous insulin delivery rate (U/min).
    pub insulin_rate: f64,
}

/// Error returned when the model cannot produce a usable derivative.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ModelError {
    #[error("non-finite derivative at t = {time} min: {derivative:?}")]
    NonFinite { time: f64, derivative: Derivative },
}

/// The minimal model, parameterised for one patient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinimalModel {
    patient: PatientType,
    params: BergmanParams,
}

impl StateVector {
    #[must_use]
    pub fn new(glucose: f64, insulin_action: f64, insulin: f64) -> Self {
        Self {
            glucose,
            insulin_action,
            insulin,
        }
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.glucose.is_finite() && self.insulin_action.is_finite() && self.insulin.is_finite()
    }
}

impl From<[f64; 3]> for StateVector {
    fn from([glucose, insulin_action, insulin]: [f64; 3]) -> Self {
        Self::new(glucose, insulin_action, insulin)
    }
}

impl From<StateVector> for [f64; 3] {
    fn from(state: StateVector) -> Self {
        [state.glucose, state.insulin_action, state.insulin]
    }
}

impl From<Derivative> for [f64; 3] {
    fn from(derivative: Derivative) -> Self {
        [
            derivative.glucose,
            derivative.insulin_action,
            derivative.insulin,
        ]
    }
}

impl Derivative {
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.glucose.is_finite() && self.insulin_action.is_finite() && self.insulin.is_finite()
    }
}

impl MinimalModel {
    /// Creates a model using the default coefficients for `patient`.
    #[must_use]
    pub fn new(patient: PatientType) -> Self {
        Self {
            patient,
            params: BergmanParams::defaults_for(patient),
        }
    }

    /// Creates a model with explicit coefficients.
    #[must_use]
    pub fn with_params(patient: PatientType, params: BergmanParams) -> Self {
        Self { patient, params }
    }

    #[must_use]
    pub fn patient(&self) -> PatientType {
        self.patient
    }

    #[must_use]
    pub fn params(&self) -> &BergmanParams {
        &self.params
    }

    /// Overrides named coefficients; unnamed ones keep their values.
    ///
    /// # Errors
    ///
    /// Returns a [`ParamError`] and leaves the model unchanged if any name is
    /// unknown or any value is invalid.
    pub fn update_params<'a, I>(&mut self, params: I) -> Result<(), ParamError>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        self.params.update(params)
    }

    /// Returns the basal steady state `(Gb, 0, Ib)`.
    ///
    /// With no meals and no exogenous insulin this state has a zero
    /// derivative whenever `Gb ≤ h` or `γ = 0`.
    #[must_use]
    pub fn equilibrium(&self) -> StateVector {
        StateVector::new(self.params.gb, 0.0, self.params.ib)
    }

    /// Evaluates the model's time derivative.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::NonFinite`] if any component of the derivative
    /// is not finite.
    pub fn derivative(
        &self,
        time: f64,
        state: StateVector,
        meal_rate: f64,
        insulin_rate: f64,
    ) -> Result<Derivative, ModelError> {
        let BergmanParams {
            p1,
            p2,
            p3,
            n,
            gamma,
            h,
            gb,
            ib,
            vg,
            vi,
        } = self.params;
        let StateVector {
            glucose: g,
            insulin_action: x,
            insulin: i,
        } = state;

        let derivative = Derivative {
            glucose: -(p1 + x) * g + p1 * gb + 1000.0 * meal_rate / vg,
            insulin_action: -p2 * x + p3 * (i - ib),
            insulin: -n * (i - ib) + gamma * (g - h).max(0.0) + 1000.0 * insulin_rate / vi,
        };

        if derivative.is_finite() {
            Ok(derivative)
        } else {
            Err(ModelError::NonFinite { time, derivative })
        }
    }
}

impl Component for MinimalModel {
    type Input = ModelInput;
    type Output = Derivative;
    type Error = ModelError;

    fn call(&self, input: Self::Input) -> Result<Self::Output, Self::Error> {
        let ModelInput {
            time,
            state,
            meal_rate,
            insulin_rate,
        } = input;
        self.derivative(time, state, meal_rate, insulin_rate)
    }
}
