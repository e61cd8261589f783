use crate::Component;

/// A [`Component`] whose output is the time derivative of part of its input.
///
/// Implementors describe a system of `N` first-order ODEs. A solver never
/// looks inside the component's types; it only moves values between them and
/// the flat [`State<N>`] it integrates.
pub trait Integratable<const N: usize>: Component {
    /// Builds the input for evaluating the derivative at `state`.
    ///
    /// Anything in the input that is not part of the state is taken from
    /// `initial_conditions`.
    fn apply_state(initial_conditions: &Self::Input, state: State<N>) -> Self::Input;

    /// Reads the starting point of an integration out of an input.
    fn extract_state(input: &Self::Input) -> State<N>;

    /// Flattens an output into derivatives, ordered like [`State::y`].
    fn extract_derivative(output: &Self::Output) -> [f64; N];
}

/// A point on an ODE trajectory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct State<const N: usize> {
    /// Simulated time.
    pub x: f64,

    /// State variables at `x`, in the order used by
    /// [`Integratable::extract_derivative`].
    pub y: [f64; N],
}

impl<const N: usize> State<N> {
    /// Returns `true` if the independent variable and every dependent
    /// variable are finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.iter().all(|value| value.is_finite())
    }
}
