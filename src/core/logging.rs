//! Logging initialization

/// Initialize the logging system
///
/// Uses env_logger with default filter level of `info`.
/// Override with RUST_LOG environment variable.
///
/// # Example
/// ```
/// planetoid::core::logging::init();
/// log::info!("Planet generator started");
/// ```
pub fn init() {
    // Tests and embedders may have installed a logger already.
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    ).try_init();
}
