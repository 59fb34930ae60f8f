//! Pricewatch core: target registry, configuration and pure row helpers.
mod config;
mod normalize;
mod registry;
mod schedule;
mod snapshot;

pub use config::{BrowserOptions, ConfigError, RendererKind, StoreOptions, TrackerConfig};
pub use normalize::normalize_price;
pub use registry::{default_targets, Target, TargetRegistry};
pub use schedule::DailySchedule;
pub use snapshot::{header_row, PriceRow, PriceSnapshot, DATE_COLUMN, DATE_FORMAT};
