use thiserror::Error;

use super::PatientType;

/// Coefficients of the Bergman minimal model.
///
/// | field   | key     | unit                   |
/// |---------|---------|------------------------|
/// | `p1`    | `p1`    | 1/min                  |
/// | `p2`    | `p2`    | 1/min                  |
/// | `p3`    | `p3`    | 1/min² per µU/mL       |
/// | `n`     | `n`     | 1/min                  |
/// | `gamma` | `gamma` | µU/mL per mg/dL per min |
/// | `h`     | `h`     | mg/dL                  |
/// | `gb`    | `Gb`    | mg/dL                  |
/// | `ib`    | `Ib`    | µU/mL                  |
/// | `vg`    | `VG`    | dL                     |
/// | `vi`    | `VI`    | L                      |
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BergmanParams {
    /// Insulin-independent glucose effectiveness.
    pub p1: f64,
    /// Decay rate of remote insulin action.
    pub p2: f64,
    /// Gain of remote insulin action.
    pub p3: f64,
    /// Plasma insulin clearance rate.
    pub n: f64,
    /// Pancreatic secretion gain above the glucose threshold.
    pub gamma: f64,
    /// Glucose threshold for pancreatic secretion.
    pub h: f64,
    /// Basal glucose.
    pub gb: f64,
    /// Basal insulin.
    pub ib: f64,
    /// Glucose distribution volume.
    pub vg: f64,
    /// Insulin distribution volume.
    pub vi: f64,
}

/// Error returned when a named coefficient cannot be applied.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    #[error("unknown Bergman parameter `{name}`")]
    Unknown { name: String },
    #[error("Bergman parameter `{name}` must be finite, got {value}")]
    NonFinite { name: String, value: f64 },
    #[error("Bergman parameter `{name}` must be positive, got {value}")]
    NonPositive { name: String, value: f64 },
}

impl BergmanParams {
    /// Every coefficient name accepted by [`BergmanParams::set`].
    pub const NAMES: [&'static str; 10] =
        ["p1", "p2", "p3", "n", "gamma", "h", "Gb", "Ib", "VG", "VI"];

    /// Healthy subject, from Bergman's IVGTT fits.
    pub const NORMAL: Self = Self {
        p1: 0.030_82,
        p2: 0.020_93,
        p3: 1.062e-5,
        n: 0.3,
        gamma: 0.003_349,
        h: 89.5,
        gb: 92.0,
        ib: 7.3,
        vg: 117.0,
        vi: 12.0,
    };

    /// Type 1 diabetic subject, after Fisher's parameterisation: no glucose
    /// effectiveness and no endogenous secretion.
    pub const DIABETIC: Self = Self {
        p1: 0.0,
        p2: 0.025,
        p3: 1.3e-5,
        n: 0.0926,
        gamma: 0.0,
        h: 80.0,
        gb: 81.0,
        ib: 15.0,
        vg: 117.0,
        vi: 12.0,
    };

    /// Returns the default coefficients for `patient`.
    #[must_use]
    pub fn defaults_for(patient: PatientType) -> Self {
        match patient {
            PatientType::Normal => Self::NORMAL,
            PatientType::Diabetic => Self::DIABETIC,
        }
    }

    /// Overrides a single named coefficient.
    ///
    /// Names are matched exactly (see [`BergmanParams::NAMES`]). The
    /// distribution volumes `VG` and `VI` must be positive.
    ///
    /// # Errors
    ///
    /// Returns a [`ParamError`] and leaves `self` untouched if the name is
    /// unknown or the value is invalid.
    pub fn set(&mut self, name: &str, value: f64) -> Result<(), ParamError> {
        if !value.is_finite() {
            return Err(ParamError::NonFinite {
                name: name.to_owned(),
                value,
            });
        }

        let slot = match name {
            "p1" => &mut self.p1,
            "p2" => &mut self.p2,
            "p3" => &mut self.p3,
            "n" => &mut self.n,
            "gamma" => &mut self.gamma,
            "h" => &mut self.h,
            "Gb" => &mut self.gb,
            "Ib" => &mut self.ib,
            "VG" | "VI" if value <= 0.0 => {
                return Err(ParamError::NonPositive {
                    name: name.to_owned(),
                    value,
                });
            }
            "VG" => &mut self.vg,
            "VI" => &mut self.vi,
            _ => {
                return Err(ParamError::Unknown {
                    name: name.to_owned(),
                });
            }
        };

        *slot = value;
        Ok(())
    }

    /// Overrides every named coefficient in `params`.
    ///
    /// Coefficients not named keep their current values.
    ///
    /// # Errors
    ///
    /// Returns the first [`ParamError`] encountered. No override is applied
    /// unless all of them are valid.
    pub fn update<'a, I>(&mut self, params: I) -> Result<(), ParamError>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut updated = *self;
        for (name, value) in params {
            updated.set(name, value)?;
        }
        *self = updated;
        Ok(())
    }
}
