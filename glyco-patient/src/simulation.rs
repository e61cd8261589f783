//! Stepping the patient forward one window at a time.

use glyco_components::{
    input::{BasalRate, InsulinInput, MealInput},
    model::{
        dynamics::{DynamicsInput, PatientDynamics},
        minimal::{MinimalModel, StateVector},
    },
    schedule::dose_schedule::AbsorptionKernel,
    solver::ode::{Method, Solver, SolverError, SolverInput},
};
use glyco_core::Component;
use thiserror::Error;
use uom::si::time::minute;

use crate::profile::{PatientProfile, ProfileError, SimSettings};

/// Error returned when a simulation step cannot produce a usable state.
#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("integration over [{start}, {end}) min failed")]
    Solver {
        start: f64,
        end: f64,
        #[source]
        source: SolverError,
    },
    #[error("integration produced a non-finite state at t = {time} min: {state:?}")]
    NonFinite { time: f64, state: StateVector },
    #[error("integration stopped at t = {reached} min, short of {expected} min")]
    Incomplete { reached: f64, expected: f64 },
    #[error("trajectory is full ({capacity} slots)")]
    TrajectoryFull { capacity: usize },
}

/// The trajectory computed so far.
///
/// `trajectory()[0]` is the initial state and every stored state is final.
/// The trajectory never grows past the capacity it was created with.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationState {
    trajectory: Vec<StateVector>,
    capacity: usize,
}

/// What one step produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// Step index after the step, so the first step reports 1.
    pub step: usize,
    /// Simulated minutes at the end of the step.
    pub time: u64,
    pub state: StateVector,
}

/// One patient's model, inputs, and trajectory.
#[derive(Debug)]
pub struct Simulation {
    model: MinimalModel,
    meals: MealInput,
    insulin: InsulinInput,
    settings: SimSettings,
    method: Method,
    state: SimulationState,
    integrations: usize,
}

impl SimulationState {
    /// Creates a trajectory holding only `init`, with room for `capacity`
    /// states in total.
    #[must_use]
    pub fn new(init: StateVector, capacity: usize) -> Self {
        Self {
            trajectory: vec![init],
            capacity: capacity.max(1),
        }
    }

    /// Index of the latest stored state.
    #[must_use]
    pub fn step_index(&self) -> usize {
        self.trajectory.len() - 1
    }

    /// The latest stored state.
    #[must_use]
    pub fn current(&self) -> StateVector {
        self.trajectory[self.step_index()]
    }

    #[must_use]
    pub fn trajectory(&self) -> &[StateVector] {
        &self.trajectory
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether every slot has been written.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.trajectory.len() >= self.capacity
    }

    /// Appends the next state.
    ///
    /// # Errors
    ///
    /// Returns [`IntegrationError::TrajectoryFull`] if every slot is written.
    pub fn push(&mut self, state: StateVector) -> Result<(), IntegrationError> {
        if self.is_full() {
            return Err(IntegrationError::TrajectoryFull {
                capacity: self.capacity,
            });
        }
        self.trajectory.push(state);
        Ok(())
    }

    #[must_use]
    pub fn into_trajectory(self) -> Vec<StateVector> {
        self.trajectory
    }
}

impl Simulation {
    /// Creates a simulation positioned at `settings.init_state()`.
    #[must_use]
    pub fn new(
        model: MinimalModel,
        meals: MealInput,
        insulin: InsulinInput,
        settings: SimSettings,
        method: Method,
    ) -> Self {
        Self {
            model,
            meals,
            insulin,
            state: SimulationState::new(settings.init_state(), settings.simu_length()),
            settings,
            method,
            integrations: 0,
        }
    }

    /// Builds a simulation from a parsed profile using the default kernel.
    ///
    /// # Errors
    ///
    /// Returns a [`ProfileError`] if any part of the profile is invalid.
    pub fn from_profile(profile: &PatientProfile, method: Method) -> Result<Self, ProfileError> {
        let kernel = AbsorptionKernel::default();
        let model = profile.model()?;
        let meals = profile.meal_input(kernel)?;
        let insulin = profile.insulin_input(kernel)?;
        let settings = profile.sim_settings(&model)?;
        Ok(Self::new(model, meals, insulin, settings, method))
    }

    #[must_use]
    pub fn model(&self) -> &MinimalModel {
        &self.model
    }

    #[must_use]
    pub fn meals(&self) -> &MealInput {
        &self.meals
    }

    #[must_use]
    pub fn insulin(&self) -> &InsulinInput {
        &self.insulin
    }

    #[must_use]
    pub fn settings(&self) -> &SimSettings {
        &self.settings
    }

    #[must_use]
    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    /// A handle to the basal cell, for updating from another context.
    #[must_use]
    pub fn basal_handle(&self) -> BasalRate {
        self.insulin.basal_handle()
    }

    #[must_use]
    pub fn basal_rate(&self) -> f64 {
        self.insulin.basal_rate()
    }

    /// Number of successful integrations so far.
    #[must_use]
    pub fn integrations(&self) -> usize {
        self.integrations
    }

    /// Whether the last slot of the trajectory has been written.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state.is_full()
    }

    /// Integrates across the next window and stores the result.
    ///
    /// The window is `[k·Δ, (k+1)·Δ)` for step index `k` and interval `Δ`.
    /// The basal rate is read once, before integrating.
    ///
    /// # Errors
    ///
    /// Returns an [`IntegrationError`] if the trajectory is already full, the
    /// solver fails, or the result is not finite. The trajectory is left
    /// unchanged on error.
    pub fn step(&mut self) -> Result<Tick, IntegrationError> {
        if self.state.is_full() {
            return Err(IntegrationError::TrajectoryFull {
                capacity: self.state.capacity(),
            });
        }

        let step = self.state.step_index();
        let interval = self.settings.simu_interval().get::<minute>();
        #[allow(clippy::cast_precision_loss)]
        let start = step as f64 * interval;
        let end = start + interval;

        let dynamics = PatientDynamics::new(&self.model, &self.meals, &self.insulin);
        let solver = Solver::new(dynamics);
        let output = solver
            .call(SolverInput {
                initial_conditions: DynamicsInput {
                    time: start,
                    state: self.state.current(),
                },
                x_end: end,
                method: self.method,
            })
            .map_err(|source| IntegrationError::Solver { start, end, source })?;

        let last = Solver::final_state(&output).ok_or(IntegrationError::Incomplete {
            reached: start,
            expected: end,
        })?;
        if (last.x - end).abs() > 1e-9 * end.abs().max(1.0) {
            return Err(IntegrationError::Incomplete {
                reached: last.x,
                expected: end,
            });
        }

        let next = StateVector::from(last.y);
        if !next.is_finite() {
            return Err(IntegrationError::NonFinite {
                time: end,
                state: next,
            });
        }

        self.state.push(next)?;
        self.integrations += 1;

        let step = self.state.step_index();
        Ok(Tick {
            step,
            time: step as u64 * u64::from(self.settings.simu_interval_minutes()),
            state: next,
        })
    }

    /// Consumes the simulation, returning its trajectory.
    #[must_use]
    pub fn into_state(self) -> SimulationState {
        self.state
    }
}
