//! Lifecycle controller: wires the components together for one page context.
//!
//! Owned explicitly by whoever embeds the engine (the wasm binding keeps one
//! per page). `init` and `destroy` are idempotent, so the fetch wrapper and the
//! listeners can never be stacked.

use crate::cache::RecordCache;
use crate::config::Config;
use crate::error::{ConfigError, InsightsError};
use crate::extractor::IdExtractor;
use crate::host::{Host, ResponseObserver};
use crate::interceptor::Interceptor;
use crate::presenter::Presenter;
use crate::watcher::InteractionWatcher;
use serde::Serialize;
use std::cell::Cell;
use std::rc::Rc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControllerStats {
    pub initialized: bool,
    pub cached_records: usize,
    pub overlay_visible: bool,
}

pub struct InsightsController<H: Host> {
    host: Rc<H>,
    cache: Rc<RecordCache>,
    interceptor: Rc<Interceptor>,
    presenter: Presenter<H>,
    watcher: InteractionWatcher<H>,
    initialized: Cell<bool>,
}

impl<H: Host> InsightsController<H> {
    /// Build every component; nothing is attached to the host until `init`
    pub fn new(host: Rc<H>, config: &Config) -> Result<Self, ConfigError> {
        let cache = Rc::new(RecordCache::new());
        let extractor = Rc::new(IdExtractor::from_config(&config.extraction)?);

        let interceptor = Rc::new(Interceptor::new(
            config.interceptor.clone(),
            Rc::clone(&cache),
            Rc::clone(&extractor),
        ));
        let presenter = Presenter::new(
            Rc::clone(&host),
            Rc::clone(&cache),
            config.presenter.clone(),
        )?;
        let watcher = InteractionWatcher::new(
            Rc::clone(&host),
            extractor,
            presenter.clone(),
            config.watcher.clone(),
        );

        Ok(Self {
            host,
            cache,
            interceptor,
            presenter,
            watcher,
            initialized: Cell::new(false),
        })
    }

    /// Install the fetch wrapper and the interaction listeners.
    ///
    /// Returns `Ok(false)` when already initialized. On failure anything
    /// installed so far is rolled back.
    pub fn init(&self) -> Result<bool, InsightsError> {
        if self.initialized.get() {
            debug!("Already initialized, skipping");
            return Ok(false);
        }

        info!("Initializing job insights");

        let observer: Rc<dyn ResponseObserver> = self.interceptor.clone();
        self.host.wrap_fetch(observer)?;

        if let Err(e) = self.watcher.install() {
            warn!("Failed to install interaction listeners: {}", e);
            self.host.restore_fetch();
            return Err(e.into());
        }

        self.initialized.set(true);
        Ok(true)
    }

    /// Detach from the host and drop all session state
    pub fn destroy(&self) {
        if !self.initialized.get() {
            return;
        }

        self.watcher.uninstall();
        self.host.restore_fetch();
        self.presenter.clear();
        self.cache.clear();
        self.initialized.set(false);

        info!("Job insights torn down");
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.get()
    }

    pub fn cache(&self) -> &Rc<RecordCache> {
        &self.cache
    }

    pub fn interceptor(&self) -> &Rc<Interceptor> {
        &self.interceptor
    }

    pub fn presenter(&self) -> &Presenter<H> {
        &self.presenter
    }

    pub fn stats(&self) -> ControllerStats {
        ControllerStats {
            initialized: self.initialized.get(),
            cached_records: self.cache.len(),
            overlay_visible: self.presenter.is_showing(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdRule;
    use crate::host::manual::ManualHost;

    fn controller() -> (Rc<ManualHost>, InsightsController<ManualHost>) {
        let host = Rc::new(ManualHost::default());
        let controller = InsightsController::new(Rc::clone(&host), &Config::default()).unwrap();
        (host, controller)
    }

    #[test]
    fn test_init_is_idempotent() {
        let (host, controller) = controller();

        assert!(controller.init().unwrap());
        assert!(!controller.init().unwrap());

        assert_eq!(host.wrap_count(), 1);
        assert_eq!(host.listener_count(), 2);
    }

    #[test]
    fn test_reinit_after_destroy() {
        let (host, controller) = controller();

        controller.init().unwrap();
        controller.destroy();
        assert!(!host.is_fetch_wrapped());
        assert_eq!(host.listener_count(), 0);

        assert!(controller.init().unwrap());
        assert!(host.is_fetch_wrapped());
        assert_eq!(host.listener_count(), 2);
    }

    #[test]
    fn test_failed_wrap_leaves_nothing_installed() {
        let (host, controller) = controller();
        host.set_network_available(false);

        assert!(controller.init().is_err());
        assert!(!controller.is_initialized());
        assert_eq!(host.listener_count(), 0);

        host.set_network_available(true);
        assert!(controller.init().unwrap());
    }

    #[test]
    fn test_invalid_rule_rejected_at_construction() {
        let mut config = Config::default();
        config.extraction.rules = vec![IdRule::new("broken", "(")];

        let result = InsightsController::new(Rc::new(ManualHost::default()), &config);
        assert!(matches!(result, Err(ConfigError::InvalidPattern { .. })));
    }

    #[test]
    fn test_unusable_date_settings_rejected_at_construction() {
        let mut config = Config::default();
        config.presenter.date_format = Some("%Y-%Q".to_string());
        let result = InsightsController::new(Rc::new(ManualHost::default()), &config);
        assert!(matches!(result, Err(ConfigError::InvalidDateFormat(_))));

        let mut config = Config::default();
        config.presenter.utc_offset_minutes = Some(i32::MAX);
        let result = InsightsController::new(Rc::new(ManualHost::default()), &config);
        assert!(matches!(result, Err(ConfigError::InvalidUtcOffset(_))));
    }

    #[test]
    fn test_destroy_without_init_is_noop() {
        let (host, controller) = controller();
        controller.destroy();
        assert!(!controller.is_initialized());
        assert_eq!(host.listener_count(), 0);
    }

    #[test]
    fn test_stats() {
        let (host, controller) = controller();
        controller.init().unwrap();
        host.fetch(
            "https://www.linkedin.com/voyager/api/jobs/jobPostings/1",
            true,
            r#"{"jobPostingId":"1"}"#,
        );

        assert_eq!(
            controller.stats(),
            ControllerStats {
                initialized: true,
                cached_records: 1,
                overlay_visible: false,
            }
        );
    }
}
