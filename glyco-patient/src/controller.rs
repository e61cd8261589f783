//! The real-time loop that drives one virtual patient.

use std::{error::Error as StdError, future::Future, sync::Arc};

use glyco_components::{model::minimal::StateVector, solver::ode::Method};
use jiff::Timestamp;
use serde_json::value::RawValue;
use tokio::{
    sync::watch,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tracing::{debug, error, info};

use crate::{
    error::SimError,
    gateway::{HandlerError, Message, MessagingGateway, Outbound, QoS},
    messages::{CgmReading, InsulinCommand, PayloadError, ProfileEnvelope, Telemetry},
    profile::{ProfileDocument, ProfileError},
    simulation::Simulation,
    topics::Topics,
};

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    Running,
    /// Every trajectory slot was filled.
    Completed,
    /// A tick, the transport, or an inbound message failed.
    Aborted,
    /// The shutdown signal fired.
    Stopped,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub phase: Phase,
    /// Final step index.
    pub steps: usize,
    pub integrations: usize,
    pub trajectory: Vec<StateVector>,
}

/// Owns a [`Simulation`] and publishes it through a [`MessagingGateway`].
///
/// On start the controller installs its handlers, connects, subscribes to
/// profile requests and insulin commands, and announces the profile. It then
/// ticks once per display interval: each tick integrates one simulated
/// interval and publishes a CGM reading and a telemetry sample. The gateway
/// is always disconnected when the run ends, however it ends.
pub struct SimulationController<G: MessagingGateway + ?Sized> {
    gateway: Arc<G>,
    simulation: Simulation,
    profile: Arc<RawValue>,
    topics: Topics,
    phase: watch::Sender<Phase>,
}

impl<G: MessagingGateway + ?Sized> SimulationController<G> {
    /// Builds the simulation described by `document`.
    ///
    /// # Errors
    ///
    /// Returns a [`ProfileError`] if the profile cannot be turned into a
    /// simulation.
    pub fn new(
        gateway: Arc<G>,
        document: &ProfileDocument,
        topics: Topics,
        method: Method,
    ) -> Result<Self, ProfileError> {
        let profile = document.profile();
        let simulation = Simulation::from_profile(profile, method)?;

        info!(
            "[Controller] Patient: {}, {} meal(s), {} bolus(es)",
            simulation.model().patient().as_str(),
            profile.meals.len(),
            profile.bolus_insulins.len()
        );
        if !profile.bergman_param.is_empty() {
            info!("[Controller] Custom Bergman parameters: {:?}", profile.bergman_param);
        }
        let settings = simulation.settings();
        info!(
            "[Controller] Settings: every {:?} advance {} min, {} slots, from {:?}",
            settings.disp_interval(),
            settings.simu_interval_minutes(),
            settings.simu_length(),
            settings.init_state()
        );

        let (phase, _) = watch::channel(Phase::Initializing);
        Ok(Self {
            gateway,
            simulation,
            profile: Arc::clone(document.raw()),
            topics,
            phase,
        })
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Follows the phase from outside the run, including a final
    /// [`Phase::Aborted`] that `run` reports only as an error.
    #[must_use]
    pub fn watch_phase(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    #[must_use]
    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    #[must_use]
    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Runs until the trajectory is full, `shutdown` resolves, or something
    /// fails, then disconnects.
    ///
    /// # Errors
    ///
    /// Returns the error that aborted the run. A failure to disconnect is
    /// returned only if the run itself succeeded.
    pub async fn run<F>(mut self, shutdown: F) -> Result<RunReport, SimError>
    where
        F: Future<Output = ()> + Send,
    {
        let outcome = self.drive(shutdown).await;
        let teardown = self.gateway.disconnect().await;

        let phase = match outcome {
            Ok(phase) => phase,
            Err(error) => {
                self.phase.send_replace(Phase::Aborted);
                error!("[Controller] Run aborted: {}", chain(&error));
                if let Err(teardown) = teardown {
                    error!("[Controller] Disconnect failed: {}", chain(&teardown));
                }
                return Err(error);
            }
        };
        self.phase.send_replace(phase);
        teardown?;

        let steps = self.simulation.state().step_index();
        let integrations = self.simulation.integrations();
        info!("[Controller] Run {phase:?} after {steps} step(s)");

        Ok(RunReport {
            phase,
            steps,
            integrations,
            trajectory: self.simulation.into_state().into_trajectory(),
        })
    }

    async fn drive<F>(&mut self, shutdown: F) -> Result<Phase, SimError>
    where
        F: Future<Output = ()> + Send,
    {
        self.install_handlers();

        self.gateway.connect().await?;
        self.gateway
            .subscribe(&self.topics.request_filter(), QoS::AtLeastOnce)
            .await?;
        self.gateway
            .subscribe(&self.topics.insulin, QoS::AtLeastOnce)
            .await?;

        let announcement = serde_json::to_vec(&ProfileEnvelope {
            profile: &self.profile,
        })?;
        self.gateway
            .publish(&self.topics.attributes, announcement, QoS::AtLeastOnce)
            .await?;

        self.phase.send_replace(Phase::Running);
        info!(
            "[Controller] Running: CGM on {}, telemetry on {}, insulin on {}",
            self.topics.cgm, self.topics.telemetry, self.topics.insulin
        );

        if self.simulation.is_complete() {
            return Ok(Phase::Completed);
        }

        let period = self.simulation.settings().disp_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let gateway = Arc::clone(&self.gateway);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => {
                    info!("[Controller] Stop requested");
                    return Ok(Phase::Stopped);
                }
                error = gateway.failed() => return Err(error.into()),
                _ = ticker.tick() => {
                    self.tick().await?;
                    if self.simulation.is_complete() {
                        return Ok(Phase::Completed);
                    }
                }
            }
        }
    }

    fn install_handlers(&self) {
        let profile = Arc::clone(&self.profile);
        let topics = self.topics.clone();
        self.gateway.on_message(
            &self.topics.request_filter(),
            Arc::new(
                move |message: &Message| -> Result<Option<Outbound>, HandlerError> {
                    let Some(topic) = topics.response_topic(&message.topic) else {
                        return Ok(None);
                    };
                    debug!("[Controller] Profile requested, replying on {topic}");
                    let payload = serde_json::to_vec(&ProfileEnvelope { profile: &profile })?;
                    Ok(Some(Outbound {
                        topic,
                        payload,
                        qos: QoS::AtLeastOnce,
                    }))
                },
            ),
        );

        let basal = self.simulation.basal_handle();
        self.gateway.on_message(
            &self.topics.insulin,
            Arc::new(
                move |message: &Message| -> Result<Option<Outbound>, HandlerError> {
                    let command = InsulinCommand::parse(&message.payload)?;
                    basal
                        .set(command.insulin_rate)
                        .map_err(PayloadError::from)?;
                    info!(
                        "[Controller] Basal rate set to {} U/min",
                        command.insulin_rate
                    );
                    Ok(None)
                },
            ),
        );
    }

    async fn tick(&mut self) -> Result<(), SimError> {
        let tick = self.simulation.step()?;
        debug!(
            "[Controller] Step {} at {} min: G = {:.2}, X = {:.5}, I = {:.2}",
            tick.step,
            tick.time,
            tick.state.glucose,
            tick.state.insulin_action,
            tick.state.insulin
        );

        let reading = CgmReading {
            glucose: tick.state.glucose,
            time: tick.time,
        };
        self.gateway
            .publish(
                &self.topics.cgm,
                serde_json::to_vec(&reading)?,
                QoS::AtLeastOnce,
            )
            .await?;

        let telemetry = Telemetry {
            timestamp: Timestamp::now().as_millisecond(),
            insulin: tick.state.insulin,
            glucose: tick.state.glucose,
        };
        self.gateway
            .publish(
                &self.topics.telemetry,
                serde_json::to_vec(&telemetry)?,
                QoS::AtLeastOnce,
            )
            .await?;

        Ok(())
    }
}

/// Formats an error with all of its sources.
fn chain(error: &(dyn StdError + 'static)) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}
