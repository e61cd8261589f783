use tracing::Level;

/// Installs the global `tracing` subscriber, writing to stderr at `level`.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init(level: Level) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
}
