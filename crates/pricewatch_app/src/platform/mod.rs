//! Process wiring for the pricewatch binary.
mod app;
mod config;

pub use app::run_app;
