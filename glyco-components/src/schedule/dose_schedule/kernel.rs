use std::f64::consts::TAU;

use super::DoseWindow;

/// The shape used to spread a window's amount across its duration.
///
/// Every kernel delivers exactly [`DoseWindow::amount`] over the window and
/// contributes nothing outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AbsorptionKernel {
    /// Constant rate `amount / duration` across the window.
    ///
    /// Steps up at the window start and back down at its end.
    Uniform,

    /// Raised-cosine rate `amount / duration · (1 − cos(2π·τ / duration))`.
    ///
    /// Rises from zero to twice the mean rate at mid-window and falls back to
    /// zero, so the rate is continuous at both edges.
    #[default]
    RaisedCosine,
}

impl AbsorptionKernel {
    /// Returns the delivery rate of `window` at `time`.
    ///
    /// Returns `0.0` when `time` is outside the window.
    #[must_use]
    pub fn rate(self, window: &DoseWindow, time: f64) -> f64 {
        if !window.contains(time) {
            return 0.0;
        }

        let mean_rate = window.amount() / window.duration();
        match self {
            Self::Uniform => mean_rate,
            Self::RaisedCosine => {
                let phase = (time - window.start()) / window.duration();
                mean_rate * (1.0 - (TAU * phase).cos())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    /// Composite Simpson's rule over `[a, b]` with `intervals` (even) panels.
    fn simpson(f: impl Fn(f64) -> f64, a: f64, b: f64, intervals: usize) -> f64 {
        let h = (b - a) / intervals as f64;
        let interior: f64 = (1..intervals)
            .map(|i| {
                let weight = if i % 2 == 0 { 2.0 } else { 4.0 };
                weight * f(a + h * i as f64)
            })
            .sum();
        h / 3.0 * (f(a) + interior + f(b - 1e-12))
    }

    #[test]
    fn uniform_rate_is_constant_inside_window() {
        let window = DoseWindow::new(0.0, 30.0, 60.0).unwrap();
        let kernel = AbsorptionKernel::Uniform;

        assert_eq!(kernel.rate(&window, 0.0), 2.0);
        assert_eq!(kernel.rate(&window, 29.0), 2.0);
        assert_eq!(kernel.rate(&window, 30.0), 0.0);
        assert_eq!(kernel.rate(&window, -0.1), 0.0);
    }

    #[test]
    fn raised_cosine_is_zero_at_edges_and_peaks_mid_window() {
        let window = DoseWindow::new(100.0, 60.0, 30.0).unwrap();
        let kernel = AbsorptionKernel::RaisedCosine;

        assert_relative_eq!(kernel.rate(&window, 100.0), 0.0);
        assert_relative_eq!(kernel.rate(&window, 130.0), 1.0);
        assert!(kernel.rate(&window, 159.999) < 1e-6);
        assert_eq!(kernel.rate(&window, 160.0), 0.0);
    }

    #[test]
    fn every_kernel_delivers_the_full_amount() {
        let window = DoseWindow::new(20.0, 45.0, 75.0).unwrap();

        for kernel in [AbsorptionKernel::Uniform, AbsorptionKernel::RaisedCosine] {
            let delivered = simpson(|t| kernel.rate(&window, t), 20.0, 65.0, 2000);
            assert_relative_eq!(delivered, 75.0, max_relative = 1e-4);
        }
    }
}
