//! Runtime wiring: builds the monitor stack and drives the polling loop

use crate::config::{api_key_from_env, MonitorConfig};
use crate::events::EventProcessor;
use crate::logger::{self, LogTag};
use crate::monitor::{MovementConsumer, WhaleMonitor};
use crate::provider::NoditClient;
use crate::utils::check_shutdown_or_delay;
use std::sync::Arc;
use tokio::sync::Notify;

pub struct Runtime {
    pub monitor: Arc<WhaleMonitor>,
    pub processor: Arc<EventProcessor>,
}

/// Construct the full pipeline from configuration: provider client, monitor,
/// and event processor sharing the monitor's queue and alert buffer
pub fn build_runtime(config: MonitorConfig) -> Result<Runtime, anyhow::Error> {
    config.validate()?;
    let client = NoditClient::new(
        &config.api_base_url,
        &api_key_from_env(),
        config.request_timeout(),
    )?;

    let monitor = Arc::new(WhaleMonitor::new(config.clone(), Arc::new(client))?);
    let consumer = Arc::new(MovementConsumer::new(
        monitor.alerts_buffer(),
        config.alert_threshold_usd,
        config.max_stored_alerts,
    ));
    let processor = Arc::new(EventProcessor::new(
        monitor.queue(),
        consumer,
        config.batch_size,
    ));
    Ok(Runtime { monitor, processor })
}

/// Poll until shutdown. Each cycle aggregates the configured window and
/// publishes new movements; the event processor drains them concurrently.
pub async fn run_monitor(runtime: &Runtime, shutdown: Arc<Notify>) {
    let interval = runtime.monitor.config().update_interval();
    logger::info(
        LogTag::Monitor,
        &format!("polling every {}s", interval.as_secs()),
    );

    let processor_handle = runtime.processor.start(shutdown.clone());

    loop {
        let published = runtime.monitor.poll_once().await;
        logger::debug(
            LogTag::Monitor,
            &format!(
                "cycle complete: {} new events, {} queued",
                published,
                runtime.monitor.queue().len()
            ),
        );
        if check_shutdown_or_delay(&shutdown, interval).await {
            break;
        }
    }

    logger::info(LogTag::Monitor, "shutdown requested, stopping");
    if let Some(handle) = processor_handle {
        if let Err(err) = handle.await {
            logger::error(LogTag::Monitor, &format!("processor task failed: {}", err));
        }
    }
}
