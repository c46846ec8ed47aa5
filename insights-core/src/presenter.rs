//! Overlay panel presentation.
//!
//! At most one panel is visible at a time. A new `show` destroys the current
//! panel (cancelling its auto-dismiss timer) before mounting the next one, so
//! the only states are idle and shown.

use crate::cache::RecordCache;
use crate::config::PresenterConfig;
use crate::error::ConfigError;
use crate::host::{OverlayHandle, Placement, Rect, Scheduler, Size, Surface, TimerId};
use crate::record::{format_count, format_timestamp, DisplayFormat, Record};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::{debug, warn};

pub const PANEL_HEADER: &str = "Job Insights";

/// Class on the root element of every mounted panel
pub const OVERLAY_CLASS: &str = "job-insights-overlay";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanelRow {
    pub label: String,
    pub value: String,
}

/// Display model of one overlay
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Panel {
    pub record_id: String,
    pub header: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    /// Listed, Expires, Views, Applies; always in this order
    pub rows: Vec<PanelRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footnote: Option<String>,
}

impl Panel {
    /// `timestamp` renders a present timestamp; absent ones show `N/A`
    pub fn from_record(record: &Record, timestamp: impl Fn(DateTime<Utc>) -> String) -> Self {
        let row = |label: &str, value: String| PanelRow {
            label: label.to_string(),
            value,
        };

        let subtitle = match (&record.title, &record.company) {
            (Some(title), Some(company)) => Some(format!("{} · {}", title, company)),
            (Some(only), None) | (None, Some(only)) => Some(only.clone()),
            (None, None) => None,
        };

        Self {
            record_id: record.id.clone(),
            header: PANEL_HEADER.to_string(),
            subtitle,
            rows: vec![
                row("Listed", format_timestamp(record.listed_at, &timestamp)),
                row("Expires", format_timestamp(record.expire_at, &timestamp)),
                row("Views", format_count(record.view_count)),
                row("Applies", format_count(record.application_count)),
            ],
            footnote: record
                .original_listed_at
                .map(|ts| format!("Originally listed {}", timestamp(ts))),
        }
    }
}

/// Pin the panel inside the detail pane's top-right corner when the pane is
/// known, otherwise in the viewport's top-right corner.
pub fn compute_placement(anchor: Option<Rect>, viewport: Size, panel: Size, margin: f64) -> Placement {
    match anchor {
        Some(rect) => {
            let left = (rect.right - panel.width - margin)
                .min(viewport.width - panel.width - margin)
                .max(margin);
            let top = (rect.top + margin).max(margin);
            Placement::Anchored { left, top }
        }
        None => Placement::Corner {
            top: margin,
            right: margin,
        },
    }
}

struct ActiveOverlay {
    record_id: String,
    handle: OverlayHandle,
    timer: TimerId,
    generation: u64,
}

#[derive(Default)]
struct PresenterState {
    active: Option<ActiveOverlay>,
    generation: u64,
}

struct PresenterInner<H> {
    host: Rc<H>,
    cache: Rc<RecordCache>,
    config: PresenterConfig,
    format: DisplayFormat,
    state: RefCell<PresenterState>,
}

/// Owns the single active overlay
pub struct Presenter<H> {
    inner: Rc<PresenterInner<H>>,
}

impl<H> Clone for Presenter<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<H: Surface + Scheduler + 'static> Presenter<H> {
    /// Fails when the configured date format or offset is unusable
    pub fn new(
        host: Rc<H>,
        cache: Rc<RecordCache>,
        config: PresenterConfig,
    ) -> Result<Self, ConfigError> {
        let format = DisplayFormat::from_config(&config)?;
        Ok(Self {
            inner: Rc::new(PresenterInner {
                host,
                cache,
                config,
                format,
                state: RefCell::new(PresenterState::default()),
            }),
        })
    }

    /// Show the record for `id`, replacing any visible panel.
    ///
    /// Returns whether a panel is now showing that record. A cache miss is a
    /// silent no-op and leaves any current panel alone.
    pub fn show(&self, id: &str) -> bool {
        let Some(record) = self.inner.cache.get(id) else {
            debug!("No data found for job {}", id);
            return false;
        };

        self.dismiss();

        let inner = &self.inner;
        let generation = {
            let mut state = inner.state.borrow_mut();
            state.generation += 1;
            state.generation
        };

        let panel = Panel::from_record(&record, |at| {
            inner
                .format
                .render(at)
                .unwrap_or_else(|| inner.host.locale_timestamp(at))
        });
        let on_close: Rc<dyn Fn()> = {
            let weak = Rc::downgrade(inner);
            Rc::new(move || dismiss_generation(&weak, generation))
        };

        let handle = match inner.host.mount(&panel, on_close) {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Failed to mount insights panel: {}", e);
                return false;
            }
        };

        let size = inner.host.measure(handle);
        let anchor = inner.host.anchor_bounds(&inner.config.anchor_selectors);
        if anchor.is_none() {
            debug!("Detail pane not found, using default panel position");
        }
        let placement = compute_placement(anchor, inner.host.viewport(), size, inner.config.margin_px);
        inner.host.place(handle, placement);

        let timer = {
            let weak = Rc::downgrade(inner);
            inner.host.set_timeout(
                inner.config.auto_dismiss(),
                Box::new(move || dismiss_generation(&weak, generation)),
            )
        };

        inner.state.borrow_mut().active = Some(ActiveOverlay {
            record_id: record.id,
            handle,
            timer,
            generation,
        });

        true
    }

    /// Destroy the visible panel, if any
    pub fn dismiss(&self) {
        let active = self.inner.state.borrow_mut().active.take();
        if let Some(active) = active {
            destroy(&self.inner, active);
        }
    }

    /// Dismiss and sweep any stray panel elements from the surface
    pub fn clear(&self) {
        self.dismiss();
        self.inner.host.clear_overlays();
    }

    pub fn is_showing(&self) -> bool {
        self.inner.state.borrow().active.is_some()
    }

    /// Id of the record on screen
    pub fn current(&self) -> Option<String> {
        self.inner
            .state
            .borrow()
            .active
            .as_ref()
            .map(|a| a.record_id.clone())
    }

    /// Auto-dismiss timer of the visible panel
    pub fn pending_timer(&self) -> Option<TimerId> {
        self.inner.state.borrow().active.as_ref().map(|a| a.timer)
    }
}

/// Dismiss only if the panel from `generation` is still the visible one
fn dismiss_generation<H: Surface + Scheduler>(weak: &Weak<PresenterInner<H>>, generation: u64) {
    let Some(inner) = weak.upgrade() else {
        return;
    };

    let active = {
        let mut state = inner.state.borrow_mut();
        let is_current = state
            .active
            .as_ref()
            .is_some_and(|active| active.generation == generation);
        if is_current {
            state.active.take()
        } else {
            None
        }
    };

    if let Some(active) = active {
        destroy(&inner, active);
    }
}

fn destroy<H: Surface + Scheduler>(inner: &PresenterInner<H>, active: ActiveOverlay) {
    inner.host.clear_timeout(active.timer);
    inner.host.unmount(active.handle);
    debug!("Dismissed panel for job {}", active.record_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::manual::ManualHost;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn setup() -> (Rc<ManualHost>, Rc<RecordCache>, Presenter<ManualHost>) {
        let host = Rc::new(ManualHost::default());
        let cache = Rc::new(RecordCache::new());
        let config = PresenterConfig {
            date_format: Some("%-m/%-d/%Y %H:%M".to_string()),
            utc_offset_minutes: Some(0),
            ..PresenterConfig::default()
        };
        let presenter = Presenter::new(Rc::clone(&host), Rc::clone(&cache), config).unwrap();
        (host, cache, presenter)
    }

    fn record(id: &str, views: u64) -> Record {
        let mut record = Record::new(id);
        record.view_count = Some(views);
        record
    }

    #[test]
    fn test_panel_rows_in_fixed_order() {
        let mut record = record("1", 10);
        record.listed_at = crate::record::timestamp_from_millis(1_700_000_000_000);
        record.title = Some("Engineer".to_string());
        record.company = Some("Acme".to_string());

        let format = DisplayFormat::new(Some("%-m/%-d/%Y %H:%M"), Some(0)).unwrap();
        let panel = Panel::from_record(&record, |at| format.render(at).unwrap());

        let rows: Vec<_> = panel
            .rows
            .iter()
            .map(|r| (r.label.as_str(), r.value.as_str()))
            .collect();
        assert_eq!(
            rows,
            [
                ("Listed", "11/14/2023 22:13"),
                ("Expires", "N/A"),
                ("Views", "10"),
                ("Applies", "N/A"),
            ]
        );
        assert_eq!(panel.subtitle.as_deref(), Some("Engineer · Acme"));
        assert_eq!(panel.footnote, None);
    }

    #[test]
    fn test_host_locale_used_without_pattern() {
        let host = Rc::new(ManualHost::default());
        let cache = Rc::new(RecordCache::new());
        let presenter =
            Presenter::new(Rc::clone(&host), Rc::clone(&cache), PresenterConfig::default()).unwrap();

        let mut record = record("A", 1);
        record.listed_at = crate::record::timestamp_from_millis(1_700_000_000_000);
        record.original_listed_at = crate::record::timestamp_from_millis(1_690_000_000_000);
        cache.put(record);
        presenter.show("A");

        let panel = &host.visible_panels()[0];
        assert_eq!(panel.rows[0].value, "11/14/2023 10:13:20 PM");
        assert_eq!(
            panel.footnote.as_deref(),
            Some("Originally listed 7/22/2023 4:26:40 AM")
        );
    }

    #[test]
    fn test_unusable_date_settings_rejected() {
        let host = Rc::new(ManualHost::default());
        let cache = Rc::new(RecordCache::new());

        let bad_format = PresenterConfig {
            date_format: Some("%Y-%Q".to_string()),
            ..PresenterConfig::default()
        };
        assert!(matches!(
            Presenter::new(Rc::clone(&host), Rc::clone(&cache), bad_format),
            Err(ConfigError::InvalidDateFormat(_))
        ));

        let bad_offset = PresenterConfig {
            utc_offset_minutes: Some(i32::MAX),
            ..PresenterConfig::default()
        };
        assert!(matches!(
            Presenter::new(host, cache, bad_offset),
            Err(ConfigError::InvalidUtcOffset(_))
        ));
    }

    #[test]
    fn test_show_miss_is_noop() {
        let (host, _cache, presenter) = setup();

        assert!(!presenter.show("missing"));
        assert!(host.visible_panels().is_empty());
        assert!(!presenter.is_showing());
        assert_eq!(host.pending_timers(), 0);
    }

    #[test]
    fn test_second_show_replaces_first() {
        let (host, cache, presenter) = setup();
        cache.put(record("A", 1));
        cache.put(record("B", 2));

        assert!(presenter.show("A"));
        let timer_a = presenter.pending_timer().unwrap();
        assert!(presenter.show("B"));

        let panels = host.visible_panels();
        assert_eq!(panels.len(), 1);
        assert_eq!(panels[0].record_id, "B");
        assert_eq!(panels[0].rows[2].value, "2");
        assert!(!host.is_pending(timer_a));
        assert_eq!(presenter.current().as_deref(), Some("B"));
    }

    #[test]
    fn test_miss_keeps_current_panel() {
        let (host, cache, presenter) = setup();
        cache.put(record("A", 1));

        presenter.show("A");
        presenter.show("missing");

        assert_eq!(presenter.current().as_deref(), Some("A"));
        assert_eq!(host.visible_panels().len(), 1);
    }

    #[test]
    fn test_auto_dismiss() {
        let (host, cache, presenter) = setup();
        cache.put(record("A", 1));
        presenter.show("A");

        host.advance(Duration::from_millis(9_999));
        assert!(presenter.is_showing());

        host.advance(Duration::from_millis(1));
        assert!(!presenter.is_showing());
        assert!(host.visible_panels().is_empty());
    }

    #[test]
    fn test_replacement_restarts_auto_dismiss() {
        let (host, cache, presenter) = setup();
        cache.put(record("A", 1));
        cache.put(record("B", 2));

        presenter.show("A");
        host.advance(Duration::from_secs(6));
        presenter.show("B");
        host.advance(Duration::from_secs(6));

        // A's timer would have fired at 10s; B's is due at 16s
        assert_eq!(presenter.current().as_deref(), Some("B"));
        host.advance(Duration::from_secs(4));
        assert!(!presenter.is_showing());
    }

    #[test]
    fn test_close_control_dismisses_and_cancels_timer() {
        let (host, cache, presenter) = setup();
        cache.put(record("A", 1));
        presenter.show("A");
        let timer = presenter.pending_timer().unwrap();

        let handle = host.overlay_handles()[0];
        host.press_close(handle);

        assert!(!presenter.is_showing());
        assert!(host.visible_panels().is_empty());
        assert!(!host.is_pending(timer));
    }

    #[test]
    fn test_stale_close_does_not_remove_newer_panel() {
        let (host, cache, presenter) = setup();
        cache.put(record("A", 1));
        cache.put(record("B", 2));

        presenter.show("A");
        let overlay_a = host.overlays()[0].clone();
        presenter.show("B");

        // late click on A's close control after B replaced it
        overlay_a.close();

        assert_eq!(presenter.current().as_deref(), Some("B"));
        assert_eq!(host.visible_panels().len(), 1);
    }

    #[test]
    fn test_placement_anchored_to_detail_pane() {
        let (host, cache, presenter) = setup();
        host.set_anchor(".jobs-details", Rect::new(400.0, 100.0, 1000.0, 700.0));
        host.set_panel_size(Size::new(280.0, 180.0));
        cache.put(record("A", 1));

        presenter.show("A");

        assert_eq!(
            host.overlays()[0].placement,
            Some(Placement::Anchored {
                left: 700.0,
                top: 120.0
            })
        );
    }

    #[test]
    fn test_placement_defaults_without_anchor() {
        let (host, cache, presenter) = setup();
        cache.put(record("A", 1));
        presenter.show("A");

        assert_eq!(
            host.overlays()[0].placement,
            Some(Placement::Corner {
                top: 20.0,
                right: 20.0
            })
        );
    }

    #[test]
    fn test_compute_placement_clamps_to_viewport() {
        let viewport = Size::new(800.0, 600.0);
        let panel = Size::new(280.0, 180.0);

        // pane wider than the viewport: right edge of the viewport wins
        let placement = compute_placement(
            Some(Rect::new(0.0, -50.0, 2000.0, 900.0)),
            viewport,
            panel,
            20.0,
        );
        assert_eq!(placement, Placement::Anchored { left: 500.0, top: 20.0 });

        // pane narrower than the panel: never off the left edge
        let placement =
            compute_placement(Some(Rect::new(0.0, 0.0, 100.0, 100.0)), viewport, panel, 20.0);
        assert_eq!(placement, Placement::Anchored { left: 20.0, top: 20.0 });
    }

    #[test]
    fn test_anchored_panel_kept_inside_narrow_viewport() {
        let (host, cache, presenter) = setup();
        host.set_viewport(Size::new(900.0, 700.0));
        host.set_anchor(".jobs-details", Rect::new(400.0, 100.0, 1000.0, 700.0));
        cache.put(record("A", 1));

        presenter.show("A");

        // 900 - 280 - 20 beats the pane's own right edge
        assert_eq!(
            host.overlays()[0].placement,
            Some(Placement::Anchored {
                left: 600.0,
                top: 120.0
            })
        );
    }

    #[test]
    fn test_clear_sweeps_surface() {
        let (host, cache, presenter) = setup();
        cache.put(record("A", 1));
        presenter.show("A");

        presenter.clear();
        assert!(host.visible_panels().is_empty());
        assert_eq!(host.pending_timers(), 0);
    }
}
