//! Host page abstraction.
//!
//! Everything the engine needs from the page it runs in. The browser binding
//! implements these with `web-sys`; [`manual::ManualHost`] implements them in
//! memory with a virtual clock.

pub mod manual;

use crate::error::HostError;
use crate::presenter::Panel;
use chrono::{DateTime, Utc};
use std::rc::Rc;
use std::time::Duration;

/// Deferred unit of work for [`Scheduler::set_timeout`]
pub type Task = Box<dyn FnOnce()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OverlayHandle(pub u32);

/// Page-space rectangle (CSS pixels)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Where an overlay is pinned in the viewport
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    /// Offsets from the viewport's top-left corner
    Anchored { left: f64, top: f64 },
    /// Offsets from the viewport's top-right corner
    Corner { top: f64, right: f64 },
}

/// A response seen by the fetch wrapper
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedResponse {
    pub url: String,
    pub ok: bool,
    pub body: String,
}

/// Side branch of the fetch wrapper
pub trait ResponseObserver {
    /// Whether the response to `url` should be cloned and handed to `observe`
    fn wants(&self, url: &str) -> bool;

    /// Called once the cloned body has been read. Must not panic.
    fn observe(&self, response: InterceptedResponse);
}

pub trait Scheduler {
    fn set_timeout(&self, delay: Duration, task: Task) -> TimerId;

    /// Cancel a pending task; unknown or fired ids are ignored
    fn clear_timeout(&self, id: TimerId);
}

/// The page's outbound request primitive
pub trait Network {
    /// Replace the primitive with a wrapper that always delegates to the
    /// original and feeds matching responses to `observer` on the side.
    fn wrap_fetch(&self, observer: Rc<dyn ResponseObserver>) -> Result<(), HostError>;

    /// Put the original primitive back
    fn restore_fetch(&self);
}

/// Where overlay panels are drawn
pub trait Surface {
    /// Attach a panel; `on_close` backs its close control
    fn mount(&self, panel: &Panel, on_close: Rc<dyn Fn()>) -> Result<OverlayHandle, HostError>;

    fn measure(&self, overlay: OverlayHandle) -> Size;

    fn place(&self, overlay: OverlayHandle, placement: Placement);

    fn unmount(&self, overlay: OverlayHandle);

    /// Remove every overlay element this engine may have left behind
    fn clear_overlays(&self);

    /// Bounds of the first element matching any selector
    fn anchor_bounds(&self, selectors: &[String]) -> Option<Rect>;

    fn viewport(&self) -> Size;

    /// Date and time in the reader's locale and time zone
    fn locale_timestamp(&self, at: DateTime<Utc>) -> String;
}

/// Read-only view of a DOM element
pub trait DomNode: Clone + 'static {
    fn parent(&self) -> Option<Self>;

    /// Lowercase tag name
    fn tag_name(&self) -> String;

    fn attribute(&self, name: &str) -> Option<String>;

    fn has_class(&self, class: &str) -> bool;

    fn children(&self) -> Vec<Self>;

    /// Target of an anchor element
    fn link_target(&self) -> Option<String> {
        if self.tag_name() == "a" {
            self.attribute("href")
        } else {
            None
        }
    }
}

/// User and page events
pub trait EventSource {
    type Node: DomNode;

    /// Current page URL
    fn location(&self) -> String;

    /// Document-level click listener; the handler receives the event target
    fn on_click(&self, handler: Rc<dyn Fn(Self::Node)>) -> Result<ListenerId, HostError>;

    /// Structural page changes and history navigation. The handler receives
    /// any element nodes added to the document (empty for history events).
    fn on_mutation(&self, handler: Rc<dyn Fn(Vec<Self::Node>)>) -> Result<ListenerId, HostError>;

    fn remove_listener(&self, id: ListenerId);
}

/// Everything the controller needs from a page
pub trait Host: Scheduler + Network + Surface + EventSource + 'static {}

impl<T> Host for T where T: Scheduler + Network + Surface + EventSource + 'static {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_dimensions() {
        let rect = Rect::new(10.0, 20.0, 110.0, 70.0);
        assert_eq!(rect.width(), 100.0);
        assert_eq!(rect.height(), 50.0);
    }
}
