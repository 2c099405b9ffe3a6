pub mod arguments;
pub mod cache;
pub mod chains;
pub mod config;
pub mod errors;
pub mod events;
pub mod logger;
pub mod monitor;
pub mod normalize;
pub mod pricing;
pub mod provider;
pub mod run;
pub mod units;
pub mod utils;
pub mod whales;
