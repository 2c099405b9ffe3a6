use std::sync::Arc;
use tokio::sync::Notify;
use whalewatch::{
    arguments::{get_config_path_override, is_help_requested, print_help, set_cmd_args},
    config::MonitorConfig,
    logger::{self, LogTag},
    run::{build_runtime, run_monitor},
};

const DEFAULT_CONFIG_PATH: &str = "whalewatch.json";

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    set_cmd_args(std::env::args().collect());

    if is_help_requested() {
        print_help();
        return Ok(());
    }

    let config_path = get_config_path_override().unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = MonitorConfig::load(&config_path)?;
    logger::info(
        LogTag::System,
        &format!(
            "starting whale monitor: {} chain(s), threshold {} base units",
            config.chains.len(),
            config.whale_threshold_base_units
        ),
    );

    let runtime = build_runtime(config)?;

    let shutdown = Arc::new(Notify::new());
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            logger::info(LogTag::System, "interrupt received, shutting down");
            shutdown.notify_waiters();
        })?;
    }

    run_monitor(&runtime, shutdown).await;
    logger::info(LogTag::System, "stopped cleanly");
    Ok(())
}
