//! Job Insights core engine
//!
//! Harvests job posting metrics from the host page's own data-fetch traffic,
//! correlates clicks and client-side navigation with the harvested records and
//! shows the result in a transient overlay panel.
//!
//! The engine never talks to the browser directly. Everything it needs from the
//! page (timers, the fetch primitive, the DOM, the overlay surface) goes through
//! the traits in [`host`], which `insights-web` implements with `web-sys` and
//! [`host::manual::ManualHost`] implements in memory.

pub mod cache;
pub mod config;
pub mod controller;
pub mod error;
pub mod extractor;
pub mod host;
pub mod interceptor;
pub mod presenter;
pub mod record;
pub mod watcher;

pub use cache::RecordCache;
pub use config::Config;
pub use controller::{ControllerStats, InsightsController};
pub use error::{ConfigError, HarvestError, HostError, InsightsError};
pub use extractor::IdExtractor;
pub use host::{DomNode, EventSource, Host, Network, Scheduler, Surface};
pub use interceptor::{HarvestReport, Interceptor};
pub use presenter::{Panel, Presenter};
pub use record::Record;
pub use watcher::InteractionWatcher;
