//! The patient profile document.
//!
//! A profile is loaded once at startup. It is kept twice: as the raw JSON
//! text, which is echoed back verbatim to anyone who asks for it, and as a
//! typed [`PatientProfile`] that configures the model and its inputs.

use std::{collections::BTreeMap, fs, path::Path, sync::Arc, time::Duration};

use glyco_components::{
    input::{InsulinInput, MealInput},
    model::minimal::{MinimalModel, ParamError, PatientType, StateVector},
    schedule::dose_schedule::{AbsorptionKernel, DoseSchedule, DoseWindow, WindowError},
};
use serde::Deserialize;
use serde_json::{
    Value,
    value::{RawValue, to_raw_value},
};
use thiserror::Error;
use uom::si::{f64::Time, time::minute};

use crate::numeric;

/// Error returned when a profile cannot be loaded or applied.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("failed to read profile {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed profile document")]
    Json(#[from] serde_json::Error),
    #[error("invalid meal at index {index}")]
    Meal {
        index: usize,
        #[source]
        source: WindowError,
    },
    #[error("invalid bolus at index {index}")]
    Bolus {
        index: usize,
        #[source]
        source: WindowError,
    },
    #[error(transparent)]
    Param(#[from] ParamError),
    #[error("invalid simulation settings: {0}")]
    Settings(String),
}

/// A scheduled meal: `carbs` grams absorbed over `[time, time + duration)`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct MealEntry {
    #[serde(deserialize_with = "numeric::float")]
    pub time: f64,
    #[serde(deserialize_with = "numeric::float")]
    pub carbs: f64,
    #[serde(deserialize_with = "numeric::float")]
    pub duration: f64,
}

/// A scheduled bolus: `dose` units delivered over `[time, time + duration)`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BolusEntry {
    #[serde(deserialize_with = "numeric::float")]
    pub time: f64,
    #[serde(deserialize_with = "numeric::float")]
    pub dose: f64,
    #[serde(deserialize_with = "numeric::float")]
    pub duration: f64,
}

/// Initial `(G0, X0, I0)` as written in the document.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct InitStateEntry {
    #[serde(rename = "G0", deserialize_with = "numeric::float")]
    pub glucose: f64,
    #[serde(rename = "X0", deserialize_with = "numeric::float")]
    pub insulin_action: f64,
    #[serde(rename = "I0", deserialize_with = "numeric::float")]
    pub insulin: f64,
}

/// Simulation timing as written in the document, before validation.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SimSettingsEntry {
    /// Wall-clock seconds between ticks.
    #[serde(deserialize_with = "numeric::float")]
    pub disp_interval: f64,
    /// Simulated minutes per tick.
    #[serde(deserialize_with = "numeric::count")]
    pub simu_interval: u32,
    /// Number of trajectory slots, including the initial state.
    #[serde(deserialize_with = "numeric::count")]
    pub simu_length: u32,
    pub init_state: InitStateEntry,
}

/// The typed view of a patient profile document.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PatientProfile {
    pub diabetic: bool,
    pub meals: Vec<MealEntry>,
    pub bolus_insulins: Vec<BolusEntry>,
    #[serde(deserialize_with = "numeric::float_map")]
    pub bergman_param: BTreeMap<String, f64>,
    #[serde(default)]
    pub sim_settings: Option<SimSettingsEntry>,
}

/// Validated simulation timing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimSettings {
    disp_interval: Duration,
    simu_interval: u32,
    simu_length: usize,
    init_state: StateVector,
}

/// A profile as loaded: the raw document plus its typed view.
#[derive(Debug, Clone)]
pub struct ProfileDocument {
    raw: Arc<RawValue>,
    profile: PatientProfile,
}

impl PatientProfile {
    #[must_use]
    pub fn patient_type(&self) -> PatientType {
        PatientType::from_diabetic(self.diabetic)
    }

    /// Builds the minimal model: patient-type defaults plus any overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::Param`] for an unknown or invalid coefficient.
    pub fn model(&self) -> Result<MinimalModel, ProfileError> {
        let mut model = MinimalModel::new(self.patient_type());
        model.update_params(
            self.bergman_param
                .iter()
                .map(|(name, value)| (name.as_str(), *value)),
        )?;
        Ok(model)
    }

    /// Builds the meal input.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::Meal`] naming the first invalid meal.
    pub fn meal_input(&self, kernel: AbsorptionKernel) -> Result<MealInput, ProfileError> {
        let windows = self
            .meals
            .iter()
            .enumerate()
            .map(|(index, meal)| {
                DoseWindow::new(meal.time, meal.duration, meal.carbs)
                    .map_err(|source| ProfileError::Meal { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MealInput::new(DoseSchedule::new(windows, kernel)))
    }

    /// Builds the insulin input with a zero basal rate.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::Bolus`] naming the first invalid bolus.
    pub fn insulin_input(&self, kernel: AbsorptionKernel) -> Result<InsulinInput, ProfileError> {
        let windows = self
            .bolus_insulins
            .iter()
            .enumerate()
            .map(|(index, bolus)| {
                DoseWindow::new(bolus.time, bolus.duration, bolus.dose)
                    .map_err(|source| ProfileError::Bolus { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(InsulinInput::new(DoseSchedule::new(windows, kernel)))
    }

    /// Resolves the simulation settings, falling back to defaults when the
    /// document has none.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::Settings`] if the settings are out of range.
    pub fn sim_settings(&self, model: &MinimalModel) -> Result<SimSettings, ProfileError> {
        match self.sim_settings {
            Some(entry) => SimSettings::new(
                entry.disp_interval,
                entry.simu_interval,
                entry.simu_length,
                StateVector::new(
                    entry.init_state.glucose,
                    entry.init_state.insulin_action,
                    entry.init_state.insulin,
                ),
            ),
            None => Ok(SimSettings::defaults_for(model)),
        }
    }
}

impl SimSettings {
    /// One day of one-minute slots, one slot per second.
    pub const DEFAULT_LENGTH: u32 = 1440;

    /// Validates and creates simulation settings.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::Settings`] if `disp_interval` is not a positive
    /// finite number of seconds, if `simu_interval` or `simu_length` is zero,
    /// or if the initial state is not finite.
    pub fn new(
        disp_interval: f64,
        simu_interval: u32,
        simu_length: u32,
        init_state: StateVector,
    ) -> Result<Self, ProfileError> {
        if !(disp_interval.is_finite() && disp_interval > 0.0) {
            return Err(ProfileError::Settings(format!(
                "disp_interval must be a positive number of seconds, got {disp_interval}"
            )));
        }
        let disp_interval = Duration::try_from_secs_f64(disp_interval)
            .map_err(|error| ProfileError::Settings(format!("disp_interval: {error}")))?;
        if disp_interval.is_zero() {
            return Err(ProfileError::Settings(
                "disp_interval rounds to zero".into(),
            ));
        }
        if simu_interval == 0 {
            return Err(ProfileError::Settings(
                "simu_interval must be at least one minute".into(),
            ));
        }
        if simu_length == 0 {
            return Err(ProfileError::Settings(
                "simu_length must be at least 1".into(),
            ));
        }
        if !init_state.is_finite() {
            return Err(ProfileError::Settings(format!(
                "init_state must be finite, got {init_state:?}"
            )));
        }

        Ok(Self {
            disp_interval,
            simu_interval,
            simu_length: simu_length as usize,
            init_state,
        })
    }

    /// Settings used when a profile has none: start at the model's basal
    /// equilibrium.
    #[must_use]
    pub fn defaults_for(model: &MinimalModel) -> Self {
        Self {
            disp_interval: Duration::from_secs(1),
            simu_interval: 1,
            simu_length: Self::DEFAULT_LENGTH as usize,
            init_state: model.equilibrium(),
        }
    }

    /// Wall-clock time between ticks.
    #[must_use]
    pub fn disp_interval(&self) -> Duration {
        self.disp_interval
    }

    /// Simulated time covered by one tick.
    #[must_use]
    pub fn simu_interval(&self) -> Time {
        Time::new::<minute>(f64::from(self.simu_interval))
    }

    /// Whole simulated minutes covered by one tick.
    #[must_use]
    pub fn simu_interval_minutes(&self) -> u32 {
        self.simu_interval
    }

    #[must_use]
    pub fn simu_length(&self) -> usize {
        self.simu_length
    }

    #[must_use]
    pub fn init_state(&self) -> StateVector {
        self.init_state
    }
}

impl ProfileDocument {
    /// Reads and parses a profile from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::Io`] if the file cannot be read or
    /// [`ProfileError::Json`] if it is not a valid profile.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Parses a profile from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::Json`] if the text is not a valid profile.
    ///
    /// Key order, number formatting, and insignificant whitespace inside the
    /// document are kept as written.
    pub fn from_json_str(text: &str) -> Result<Self, ProfileError> {
        let raw: Box<RawValue> = serde_json::from_str(text)?;
        Self::from_raw(raw)
    }

    /// Wraps an already-parsed JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::Json`] if the value is not a valid profile.
    pub fn from_value(value: Value) -> Result<Self, ProfileError> {
        Self::from_raw(to_raw_value(&value)?)
    }

    fn from_raw(raw: Box<RawValue>) -> Result<Self, ProfileError> {
        let profile: PatientProfile = serde_json::from_str(raw.get())?;
        Ok(Self {
            raw: Arc::from(raw),
            profile,
        })
    }

    /// The document exactly as loaded.
    #[must_use]
    pub fn raw(&self) -> &Arc<RawValue> {
        &self.raw
    }

    #[must_use]
    pub fn profile(&self) -> &PatientProfile {
        &self.profile
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use serde_json::json;

    use super::*;

    fn document() -> Value {
        json!({
            "diabetic": true,
            "meals": [
                {"time": 60, "carbs": "45", "duration": 30},
                {"time": 0, "carbs": 20, "duration": 15}
            ],
            "bolus_insulins": [{"time": 55, "dose": 4.5, "duration": 10}],
            "bergman_param": {"p2": "0.03", "Gb": 90},
            "sim_settings": {
                "disp_interval": 0.5,
                "simu_interval": "5",
                "simu_length": 288,
                "init_state": {"G0": 120, "X0": 0, "I0": "15"}
            }
        })
    }

    #[test]
    fn parses_lenient_numbers() {
        let doc = ProfileDocument::from_value(document()).unwrap();
        let profile = doc.profile();

        assert!(profile.diabetic);
        assert_eq!(profile.meals[0].carbs, 45.0);
        assert_eq!(profile.bergman_param["p2"], 0.03);

        let settings = profile.sim_settings.unwrap();
        assert_eq!(settings.simu_interval, 5);
        assert_eq!(settings.init_state.insulin, 15.0);
    }

    #[test]
    fn raw_document_is_preserved() {
        let raw = document();
        let doc = ProfileDocument::from_value(raw.clone()).unwrap();
        let echoed: Value = serde_json::from_str(doc.raw().get()).unwrap();
        assert_eq!(echoed, raw);
    }

    #[test]
    fn raw_text_keeps_key_order_and_number_format() {
        let text = concat!(
            r#"{"sim_settings":{"simu_length":3,"simu_interval":5,"disp_interval":1.0,"#,
            r#""init_state":{"I0":15,"X0":0,"G0":120}},"meals":[],"diabetic":true,"#,
            r#""bolus_insulins":[],"bergman_param":{"p2":0.0250}}"#,
        );
        let doc = ProfileDocument::from_json_str(text).unwrap();

        assert_eq!(doc.raw().get(), text);
        assert_eq!(doc.profile().bergman_param["p2"], 0.025);
    }

    #[test]
    fn builds_model_with_overrides() {
        let doc = ProfileDocument::from_value(document()).unwrap();
        let model = doc.profile().model().unwrap();

        assert_eq!(model.patient(), PatientType::Diabetic);
        assert_eq!(model.params().p2, 0.03);
        assert_eq!(model.params().gb, 90.0);
        assert_eq!(model.params().p3, 1.3e-5);
    }

    #[test]
    fn builds_inputs_in_time_order() {
        let doc = ProfileDocument::from_value(document()).unwrap();
        let meals = doc.profile().meal_input(AbsorptionKernel::Uniform).unwrap();
        let insulin = doc
            .profile()
            .insulin_input(AbsorptionKernel::Uniform)
            .unwrap();

        assert_eq!(meals.schedule().windows()[0].start(), 0.0);
        assert_relative_eq!(meals.total_carbs(), 65.0);
        assert_relative_eq!(meals.rate_at(70.0), 1.5);
        assert_relative_eq!(insulin.rate_at(60.0), 0.45);
    }

    #[test]
    fn resolves_settings() {
        let doc = ProfileDocument::from_value(document()).unwrap();
        let model = doc.profile().model().unwrap();
        let settings = doc.profile().sim_settings(&model).unwrap();

        assert_eq!(settings.disp_interval(), Duration::from_millis(500));
        assert_relative_eq!(settings.simu_interval().get::<minute>(), 5.0);
        assert_eq!(settings.simu_length(), 288);
        assert_eq!(settings.init_state(), StateVector::new(120.0, 0.0, 15.0));
    }

    #[test]
    fn missing_settings_fall_back_to_equilibrium() {
        let mut raw = document();
        raw.as_object_mut().unwrap().remove("sim_settings");
        let doc = ProfileDocument::from_value(raw).unwrap();
        let model = doc.profile().model().unwrap();
        let settings = doc.profile().sim_settings(&model).unwrap();

        assert_eq!(settings.disp_interval(), Duration::from_secs(1));
        assert_eq!(settings.simu_interval_minutes(), 1);
        assert_eq!(settings.simu_length(), 1440);
        assert_eq!(settings.init_state(), StateVector::new(90.0, 0.0, 15.0));
    }

    #[test]
    fn unknown_parameter_is_rejected() {
        let mut raw = document();
        raw["bergman_param"]["p9"] = json!(1.0);
        let doc = ProfileDocument::from_value(raw).unwrap();

        assert!(matches!(
            doc.profile().model(),
            Err(ProfileError::Param(ParamError::Unknown { .. }))
        ));
    }

    #[test]
    fn invalid_meal_names_its_index() {
        let mut raw = document();
        raw["meals"][1]["duration"] = json!(0);
        let doc = ProfileDocument::from_value(raw).unwrap();

        assert!(matches!(
            doc.profile().meal_input(AbsorptionKernel::default()),
            Err(ProfileError::Meal { index: 1, .. })
        ));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let state = StateVector::new(100.0, 0.0, 10.0);

        assert!(SimSettings::new(0.0, 1, 10, state).is_err());
        assert!(SimSettings::new(f64::NAN, 1, 10, state).is_err());
        assert!(SimSettings::new(1.0, 0, 10, state).is_err());
        assert!(SimSettings::new(1.0, 1, 0, state).is_err());
        assert!(SimSettings::new(1.0, 1, 10, StateVector::new(f64::INFINITY, 0.0, 0.0)).is_err());
        assert!(SimSettings::new(1.0, 1, 1, state).is_ok());
    }

    #[test]
    fn malformed_documents_are_rejected() {
        assert!(matches!(
            ProfileDocument::from_json_str("{"),
            Err(ProfileError::Json(_))
        ));
        assert!(matches!(
            ProfileDocument::from_json_str(r#"{"diabetic": true}"#),
            Err(ProfileError::Json(_))
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let error = ProfileDocument::load("/nonexistent/profile.json").unwrap_err();
        assert!(matches!(
            error,
            ProfileError::Io { ref path, .. } if path == "/nonexistent/profile.json"
        ));
    }
}
