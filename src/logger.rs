//! Tagged logging for whalewatch
//!
//! Provides level functions (`error`/`warning`/`info`/`debug`) with a module
//! tag, colored console output, and per-module debug gating driven by
//! `--debug-<module>` command-line flags.
//!
//! ```ignore
//! use whalewatch::logger::{self, LogTag};
//!
//! logger::info(LogTag::Monitor, "aggregation cycle complete");
//! logger::debug(LogTag::Cache, "stale hit for transfers:ethereum"); // --debug-cache only
//! ```

use crate::arguments;
use chrono::Utc;
use colored::*;
use std::io::{self, Write};

/// Source module of a log line; controls the printed label and which
/// `--debug-*` flag gates debug output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTag {
    System,
    Config,
    Cache,
    Provider,
    Prices,
    Whales,
    Monitor,
    Events,
}

impl LogTag {
    fn label(&self) -> &'static str {
        match self {
            LogTag::System => "SYSTEM",
            LogTag::Config => "CONFIG",
            LogTag::Cache => "CACHE",
            LogTag::Provider => "PROVIDER",
            LogTag::Prices => "PRICES",
            LogTag::Whales => "WHALES",
            LogTag::Monitor => "MONITOR",
            LogTag::Events => "EVENTS",
        }
    }

    /// Whether debug output for this tag is enabled via CLI flags
    fn debug_enabled(&self) -> bool {
        if arguments::is_verbose_enabled() {
            return true;
        }
        match self {
            LogTag::Cache => arguments::is_debug_cache_enabled(),
            LogTag::Provider => arguments::is_debug_provider_enabled(),
            LogTag::Prices => arguments::is_debug_prices_enabled(),
            LogTag::Whales => arguments::is_debug_whales_enabled(),
            LogTag::Events => arguments::is_debug_events_enabled(),
            _ => false,
        }
    }
}

fn timestamp() -> String {
    Utc::now().format("%H:%M:%S%.3f").to_string()
}

fn emit(symbol: ColoredString, tag: LogTag, message: &str) {
    println!(
        "{} {} {} {}",
        symbol,
        format!("[{}]", timestamp()).dimmed(),
        tag.label().bold(),
        message
    );
    let _ = io::stdout().flush();
}

/// Log at ERROR level (always shown, critical issues)
pub fn error(tag: LogTag, message: &str) {
    emit("✖".red().bold(), tag, &message.red().to_string());
}

/// Log at WARNING level (important but non-fatal issues)
pub fn warning(tag: LogTag, message: &str) {
    emit("⚠".yellow().bold(), tag, &message.yellow().to_string());
}

/// Log at INFO level (standard operations)
pub fn info(tag: LogTag, message: &str) {
    emit("ℹ".blue().bold(), tag, message);
}

/// Log at DEBUG level; only shown with the tag's `--debug-*` flag or `--verbose`
pub fn debug(tag: LogTag, message: &str) {
    if tag.debug_enabled() {
        emit("·".purple().bold(), tag, &message.dimmed().to_string());
    }
}
