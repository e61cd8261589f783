use std::sync::Arc;

use anyhow::{Context, anyhow};
use glyco_patient::{Config, MqttGateway, ProfileDocument, SimulationController, logging};
use tracing::{Level, error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(source) => {
            logging::init(Level::INFO).map_err(|error| anyhow!(error))?;
            return Err(logged(anyhow::Error::new(source).context("invalid configuration")));
        }
    };
    logging::init(config.log_level).map_err(|error| anyhow!(error))?;

    info!("[Main] Topics: {:?}", config.topics);
    info!(
        "[Main] Broker {}:{} as {}",
        config.host,
        config.port,
        config.client_id()
    );

    let document = ProfileDocument::load(&config.profile_path)
        .with_context(|| format!("failed to load {}", config.profile_path.display()))
        .map_err(logged)?;

    let gateway = Arc::new(MqttGateway::new(&config.mqtt_settings()));
    let controller =
        SimulationController::new(gateway, &document, config.topics.clone(), config.method)
            .context("invalid patient profile")
            .map_err(logged)?;

    info!("[Main] Press Ctrl+C to stop the simulation");
    let report = controller
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("[Main] Cannot listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!(
        "[Main] Finished: {:?} after {} step(s), {} integration(s)",
        report.phase, report.steps, report.integrations
    );
    Ok(())
}

/// Records a startup failure before it ends the process.
fn logged(error: anyhow::Error) -> anyhow::Error {
    error!("[Main] {error:#}");
    error
}
