/// The core trait for defining components in Glyco.
///
/// A `Component` takes an input and produces an output. Input functions,
/// physiological models, and solvers are all components, which lets a solver
/// wrap a model without knowing anything about its internals.
///
/// ## Implementing `Component`
///
/// To define a `Component`, implement the [`call()`] method, which takes
/// an input and returns either an output or an error. Components should be
/// deterministic, always producing the same result for a given input.
///
/// # Example
///
/// ```
/// use std::convert::Infallible;
/// use glyco_core::Component;
///
/// /// Clearance at a fixed first-order rate.
/// struct Clearance {
///     rate: f64,
/// }
///
/// impl Component for Clearance {
///     type Input = f64;
///     type Output = f64;
///     type Error = Infallible;
///
///     fn call(&self, concentration: f64) -> Result<f64, Self::Error> {
///         Ok(-self.rate * concentration)
///     }
/// }
///
/// let clearance = Clearance { rate: 0.5 };
/// assert_eq!(clearance.call(10.0), Ok(-5.0));
/// ```
pub trait Component {
    type Input;
    type Output;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Calls the component with the given input and returns a result.
    ///
    /// This is the only method required when implementing `Component`.
    ///
    /// # Errors
    ///
    /// Each component defines its own `Error` type, allowing it to determine
    /// what constitutes a failure within its domain.
    fn call(&self, input: Self::Input) -> Result<Self::Output, Self::Error>;
}
