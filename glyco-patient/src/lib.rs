//! A real-time virtual patient.
//!
//! A [`SimulationController`] steps the Bergman minimal model for one
//! patient on a wall-clock cadence, publishing a simulated CGM reading and a
//! telemetry sample after every step. An external closed-loop controller
//! adjusts the patient's basal insulin by publishing to the insulin topic.
//!
//! Transport sits behind [`MessagingGateway`]: [`LoopbackGateway`] runs
//! entirely in-process, and `MqttGateway` (feature `mqtt`) talks to a broker.

pub mod config;
pub mod controller;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod messages;
mod numeric;
pub mod profile;
pub mod simulation;
pub mod topics;

pub use config::{Config, ConfigError};
pub use controller::{Phase, RunReport, SimulationController};
pub use error::SimError;
pub use gateway::{GatewayError, LoopbackGateway, MessagingGateway, QoS};
pub use profile::{PatientProfile, ProfileDocument, ProfileError, SimSettings};
pub use simulation::{IntegrationError, Simulation, SimulationState};
pub use topics::Topics;

#[cfg(feature = "mqtt")]
pub use gateway::{MqttGateway, MqttSettings};
