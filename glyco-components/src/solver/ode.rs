use std::{cell::RefCell, rc::Rc};

use glyco_core::{
    Component,
    solve::ode::{Integratable, State},
};
use ode_solvers::{OutputType, SVector, System, dop_shared::IntegrationError};
use thiserror::Error;

/// Solves an [`Integratable`] component that defines a system of ODEs.
#[derive(Debug)]
pub struct Solver<C: Integratable<N>, const N: usize> {
    component: C,
}

/// Input for [`Solver::call`].
#[derive(Debug)]
pub struct SolverInput<C: Integratable<N>, const N: usize> {
    /// The initial conditions for integration.
    ///
    /// This input defines the initial system [`State`] using
    /// [`Integratable::extract_state`] and is used to reconstruct component
    /// inputs during integration with [`Integratable::apply_state`].
    pub initial_conditions: C::Input,

    /// The endpoint of the integration interval.
    ///
    /// The last accepted step lands on this point, so the final reported
    /// state is a true solver step rather than an interpolated sample.
    pub x_end: f64,

    /// The numerical integration method to use.
    pub method: Method,
}

/// Output for [`Solver::call`].
#[derive(Debug)]
pub struct SolverOutput<C: Integratable<N>, const N: usize> {
    /// Number of times the component was called during integration.
    pub component_calls: u32,

    /// The input integration started from, used to reconstruct component inputs from solver states.
    pub initial_conditions: C::Input,

    /// The accepted solver steps, ending at `x_end`.
    pub steps: Vec<State<N>>,
}

/// Error returned by [`Solver::call`].
#[derive(Debug, Error)]
pub enum SolverError {
    /// The integrator gave up: step size underflow, too many steps, or a
    /// problem that looks stiff.
    #[error(transparent)]
    Integration(#[from] IntegrationError),

    #[error("component call failed during integration")]
    Component {
        #[source]
        error: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

/// Supported numerical integration methods.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Method {
    /// Adaptive Dormand–Prince 5(4) Runge–Kutta method.
    ///
    /// An explicit embedded method that estimates local truncation error from
    /// its 5th and 4th order solutions and adjusts the step size to keep that
    /// error within `abs_tol` and `rel_tol`.
    Dopri5 { abs_tol: f64, rel_tol: f64 },

    /// Adaptive Dormand–Prince 8(5,3) Runge–Kutta method.
    ///
    /// Higher order and more expensive per step than `Dopri5`, usually worth
    /// it only for very tight tolerances.
    Dop853 { abs_tol: f64, rel_tol: f64 },
}

impl Default for Method {
    fn default() -> Self {
        Self::Dopri5 {
            abs_tol: 1e-8,
            rel_tol: 1e-6,
        }
    }
}

impl<C: Integratable<N>, const N: usize> Solver<C, N> {
    /// Creates a new ODE solver for the given component.
    pub fn new(component: C) -> Self {
        Self { component }
    }

    /// Returns the last state reported by the solver, if any.
    #[must_use]
    pub fn final_state(output: &SolverOutput<C, N>) -> Option<State<N>> {
        output.steps.last().copied()
    }

    /// Reconstructs the component input at the final integration step.
    ///
    /// Returns `None` if `output.steps` is empty.
    #[must_use]
    pub fn final_component_input(&self, output: &SolverOutput<C, N>) -> Option<C::Input> {
        Self::final_state(output).map(|state| C::apply_state(&output.initial_conditions, state))
    }
}

impl<C: Integratable<N>, const N: usize> Component for Solver<C, N> {
    type Input = SolverInput<C, N>;
    type Output = SolverOutput<C, N>;
    type Error = SolverError;

    /// Integrates the component from its initial state to `x_end`.
    ///
    /// # Errors
    ///
    /// Returns `SolverError::Integration` if the numerical solver fails, or
    /// `SolverError::Component` if any component call fails during integration.
    fn call(&self, input: Self::Input) -> Result<Self::Output, Self::Error> {
        let SolverInput {
            initial_conditions,
            x_end,
            method,
        } = input;

        let component_error = Rc::new(RefCell::new(None));
        let system = OdeSystem {
            component: &self.component,
            initial_conditions: &initial_conditions,
            call_error: Rc::clone(&component_error),
        };

        let State { x: x_start, y } = C::extract_state(&initial_conditions);
        let y_start = y.into();

        let (stats, x_out, y_out) = match method {
            Method::Dopri5 { abs_tol, rel_tol } => {
                let mut stepper = ode_solvers::Dopri5::new(
                    system, x_start, x_end, x_end - x_start, y_start, rel_tol, abs_tol,
                );
                stepper.set_output(OutputType::Sparse);
                let stats = stepper.integrate()?;
                (stats, stepper.x_out().clone(), stepper.y_out().clone())
            }
            Method::Dop853 { abs_tol, rel_tol } => {
                let mut stepper = ode_solvers::Dop853::new(
                    system, x_start, x_end, x_end - x_start, y_start, rel_tol, abs_tol,
                );
                stepper.set_output(OutputType::Sparse);
                let stats = stepper.integrate()?;
                (stats, stepper.x_out().clone(), stepper.y_out().clone())
            }
        };

        if let Some(error) = component_error.borrow_mut().take() {
            return Err(SolverError::Component {
                error: Box::new(error),
            });
        }

        let steps = x_out
            .into_iter()
            .zip(y_out)
            .map(|(x, y)| State { x, y: y.into() })
            .collect();

        Ok(SolverOutput {
            component_calls: stats.num_eval,
            initial_conditions,
            steps,
        })
    }
}

/// Adapts a component into an `ode_solvers` system.
struct OdeSystem<'a, C: Integratable<N>, const N: usize> {
    component: &'a C,
    initial_conditions: &'a C::Input,
    call_error: Rc<RefCell<Option<C::Error>>>,
}

impl<C: Integratable<N>, const N: usize> System<f64, SVector<f64, N>> for OdeSystem<'_, C, N> {
    fn system(&self, x: f64, y: &SVector<f64, N>, dy: &mut SVector<f64, N>) {
        let state = State { x, y: (*y).into() };
        let input = C::apply_state(self.initial_conditions, state);

        match self.component.call(input) {
            Ok(output) => {
                let derivative = C::extract_derivative(&output);
                *dy = SVector::from_row_slice(&derivative);
            }
            Err(error) => {
                // Keep only the first failure; a zero slope lets the
                // stepper accept the step so `solout` can halt it.
                let mut slot = self.call_error.borrow_mut();
                if slot.is_none() {
                    *slot = Some(error);
                }
                *dy = SVector::zeros();
            }
        }
    }

    fn solout(&mut self, _x: f64, _y: &SVector<f64, N>, _dy: &SVector<f64, N>) -> bool {
        self.call_error.borrow().is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::{convert::Infallible, fmt};

    use approx::assert_relative_eq;

    use super::*;

    /// dy/dx = slope.
    struct Linear {
        slope: f64,
    }

    impl Component for Linear {
        type Input = State<1>;
        type Output = f64;
        type Error = Infallible;

        fn call(&self, _input: Self::Input) -> Result<Self::Output, Self::Error> {
            Ok(self.slope)
        }
    }

    impl Integratable<1> for Linear {
        fn apply_state(_initial_conditions: &Self::Input, state: State<1>) -> Self::Input {
            state
        }

        fn extract_state(input: &Self::Input) -> State<1> {
            *input
        }

        fn extract_derivative(output: &Self::Output) -> [f64; 1] {
            [*output]
        }
    }

    /// dy/dx = -k·y, failing once x passes `fail_after`.
    struct Decay {
        k: f64,
        fail_after: f64,
    }

    #[derive(Debug)]
    struct PastLimit(f64);

    impl fmt::Display for PastLimit {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "evaluated past limit at x = {}", self.0)
        }
    }

    impl std::error::Error for PastLimit {}

    impl Component for Decay {
        type Input = State<1>;
        type Output = f64;
        type Error = PastLimit;

        fn call(&self, input: Self::Input) -> Result<Self::Output, Self::Error> {
            if input.x > self.fail_after {
                Err(PastLimit(input.x))
            } else {
                Ok(-self.k * input.y[0])
            }
        }
    }

    impl Integratable<1> for Decay {
        fn apply_state(_initial_conditions: &Self::Input, state: State<1>) -> Self::Input {
            state
        }

        fn extract_state(input: &Self::Input) -> State<1> {
            *input
        }

        fn extract_derivative(output: &Self::Output) -> [f64; 1] {
            [*output]
        }
    }

    #[test]
    fn solve_a_linear_ode() {
        let solver = Solver::new(Linear { slope: 2.0 });

        let input = SolverInput {
            initial_conditions: State { x: 0.0, y: [4.0] },
            x_end: 1.0,
            method: Method::default(),
        };

        let output = solver.call(input).unwrap();
        let last = Solver::final_state(&output).unwrap();

        assert_relative_eq!(last.x, 1.0, max_relative = 1e-12);
        assert_relative_eq!(last.y[0], 6.0, max_relative = 1e-9);
        assert!(output.component_calls > 0);
    }

    #[test]
    fn exponential_decay_matches_closed_form() {
        let k = 0.03;
        let x_end = 30.0;

        for method in [
            Method::default(),
            Method::Dop853 {
                abs_tol: 1e-10,
                rel_tol: 1e-8,
            },
        ] {
            let solver = Solver::new(Decay {
                k,
                fail_after: f64::INFINITY,
            });
            let output = solver
                .call(SolverInput {
                    initial_conditions: State { x: 0.0, y: [28.0] },
                    x_end,
                    method,
                })
                .unwrap();

            let input = solver.final_component_input(&output).unwrap();
            assert_relative_eq!(input.x, x_end, max_relative = 1e-12);
            assert_relative_eq!(input.y[0], 28.0 * (-k * x_end).exp(), max_relative = 1e-5);
        }
    }

    #[test]
    fn long_window_end_state_is_an_accepted_step() {
        let k = 0.05;
        let solver = Solver::new(Decay {
            k,
            fail_after: f64::INFINITY,
        });

        for x_end in [30.0, 60.0, 120.0] {
            let output = solver
                .call(SolverInput {
                    initial_conditions: State { x: 0.0, y: [100.0] },
                    x_end,
                    method: Method::default(),
                })
                .unwrap();

            assert!(output.steps.len() > 2);

            let last = Solver::final_state(&output).unwrap();
            assert_relative_eq!(last.x, x_end, max_relative = 1e-12);
            assert_relative_eq!(last.y[0], 100.0 * (-k * x_end).exp(), max_relative = 1e-5);
        }
    }

    #[test]
    fn component_failure_is_reported() {
        let solver = Solver::new(Decay {
            k: 1.0,
            fail_after: 0.25,
        });

        let result = solver.call(SolverInput {
            initial_conditions: State { x: 0.0, y: [1.0] },
            x_end: 1.0,
            method: Method::default(),
        });

        assert!(matches!(result, Err(SolverError::Component { .. })));
    }
}
