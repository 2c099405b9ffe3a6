/// Command-line flags for whalewatch
///
/// Flags are captured once into a process-wide store; the logger reads its
/// `--debug-*` gating from here so it needs no wiring of its own.
use once_cell::sync::Lazy;
use std::env;
use std::sync::Mutex;

pub static CMD_ARGS: Lazy<Mutex<Vec<String>>> = Lazy::new(|| Mutex::new(env::args().collect()));

/// Replace the stored arguments; called from `main` and from tests
pub fn set_cmd_args(args: Vec<String>) {
    if let Ok(mut cmd_args) = CMD_ARGS.lock() {
        *cmd_args = args;
    }
}

pub fn get_cmd_args() -> Vec<String> {
    match CMD_ARGS.lock() {
        Ok(args) => args.clone(),
        Err(_) => env::args().collect(),
    }
}

/// True when `arg` appears verbatim on the command line
pub fn has_arg(arg: &str) -> bool {
    get_cmd_args().iter().any(|a| a == arg)
}

/// Value following `flag`, if present
pub fn get_arg_value(flag: &str) -> Option<String> {
    let args = get_cmd_args();
    for (i, arg) in args.iter().enumerate() {
        if arg == flag && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }
    None
}

// =============================================================================
// DEBUG FLAGS
// =============================================================================

/// Cache module debug mode
pub fn is_debug_cache_enabled() -> bool {
    has_arg("--debug-cache")
}

/// Upstream provider debug mode
pub fn is_debug_provider_enabled() -> bool {
    has_arg("--debug-provider")
}

/// Price resolver debug mode
pub fn is_debug_prices_enabled() -> bool {
    has_arg("--debug-prices")
}

/// Whale filter debug mode
pub fn is_debug_whales_enabled() -> bool {
    has_arg("--debug-whales")
}

/// Event queue debug mode
pub fn is_debug_events_enabled() -> bool {
    has_arg("--debug-events")
}

/// Show all debug output regardless of per-module flags
pub fn is_verbose_enabled() -> bool {
    has_arg("--verbose")
}

/// Help requested via -h or --help
pub fn is_help_requested() -> bool {
    has_arg("--help") || has_arg("-h")
}

/// Config file path override (--config <path>)
pub fn get_config_path_override() -> Option<String> {
    get_arg_value("--config")
}

/// Print usage information for the whalewatch binary
pub fn print_help() {
    println!("whalewatch - multi-chain whale movement monitor");
    println!();
    println!("USAGE:");
    println!("    whalewatch [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --config <path>      Path to JSON config file (default: whalewatch.json)");
    println!("    --verbose            Show all debug output");
    println!("    --debug-cache        Debug output for the rate-aware cache");
    println!("    --debug-provider     Debug output for upstream provider calls");
    println!("    --debug-prices       Debug output for the price resolver");
    println!("    --debug-whales       Debug output for the whale filter");
    println!("    --debug-events       Debug output for the event queue/processor");
    println!("    -h, --help           Print this help message");
    println!();
    println!("ENVIRONMENT:");
    println!("    WHALEWATCH_API_KEY   Upstream provider API key (default: demo key)");
}
