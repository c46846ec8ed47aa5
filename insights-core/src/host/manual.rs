//! In-memory host with a virtual clock.
//!
//! Drives the engine without a browser: timers only fire when the clock is
//! advanced, requests are simulated with [`ManualHost::fetch`], overlays are
//! recorded instead of drawn, and the DOM is a tree of [`ManualNode`]s.

use super::{
    DomNode, EventSource, InterceptedResponse, ListenerId, Network, OverlayHandle, Placement,
    Rect, ResponseObserver, Scheduler, Size, Surface, Task, TimerId,
};
use crate::error::HostError;
use crate::presenter::Panel;
use chrono::{DateTime, Utc};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::{Rc, Weak};
use std::time::Duration;

struct PendingTimer {
    id: TimerId,
    due: Duration,
    task: Task,
}

/// An overlay as recorded by the manual surface
#[derive(Clone)]
pub struct MountedOverlay {
    pub panel: Panel,
    pub placement: Option<Placement>,
    on_close: Rc<dyn Fn()>,
}

impl MountedOverlay {
    /// Press this overlay's close control
    pub fn close(&self) {
        (self.on_close)();
    }
}

/// What the original request primitive handed back to its caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub ok: bool,
    pub body: String,
}

type ClickHandler = Rc<dyn Fn(ManualNode)>;
type MutationHandler = Rc<dyn Fn(Vec<ManualNode>)>;

pub struct ManualHost {
    next_id: Cell<u32>,

    now: Cell<Duration>,
    timers: RefCell<Vec<PendingTimer>>,

    observer: RefCell<Option<Rc<dyn ResponseObserver>>>,
    wrap_count: Cell<u32>,
    network_available: Cell<bool>,

    overlays: RefCell<BTreeMap<OverlayHandle, MountedOverlay>>,
    anchor: Cell<Option<Rect>>,
    anchor_selectors: RefCell<HashSet<String>>,
    viewport: Cell<Size>,
    panel_size: Cell<Size>,

    location: RefCell<String>,
    click_handlers: RefCell<HashMap<ListenerId, ClickHandler>>,
    mutation_handlers: RefCell<HashMap<ListenerId, MutationHandler>>,
}

impl ManualHost {
    pub fn new(location: &str) -> Self {
        Self {
            next_id: Cell::new(1),
            now: Cell::new(Duration::ZERO),
            timers: RefCell::new(Vec::new()),
            observer: RefCell::new(None),
            wrap_count: Cell::new(0),
            network_available: Cell::new(true),
            overlays: RefCell::new(BTreeMap::new()),
            anchor: Cell::new(None),
            anchor_selectors: RefCell::new(HashSet::new()),
            viewport: Cell::new(Size::new(1280.0, 800.0)),
            panel_size: Cell::new(Size::new(280.0, 180.0)),
            location: RefCell::new(location.to_string()),
            click_handlers: RefCell::new(HashMap::new()),
            mutation_handlers: RefCell::new(HashMap::new()),
        }
    }

    fn next_id(&self) -> u32 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    // ---- clock ----

    pub fn now(&self) -> Duration {
        self.now.get()
    }

    /// Move the clock forward, running every task that falls due in order.
    /// Tasks scheduled by running tasks are honoured within the same call.
    pub fn advance(&self, by: Duration) {
        let target = self.now.get() + by;

        loop {
            let next = {
                let mut timers = self.timers.borrow_mut();
                let position = timers
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.due <= target)
                    .min_by_key(|(_, t)| (t.due, t.id))
                    .map(|(i, _)| i);
                position.map(|i| timers.remove(i))
            };

            match next {
                Some(timer) => {
                    self.now.set(timer.due);
                    (timer.task)();
                }
                None => break,
            }
        }

        self.now.set(target);
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().len()
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.timers.borrow().iter().any(|t| t.id == id)
    }

    // ---- network ----

    /// Perform a request through whatever primitive is currently installed.
    ///
    /// The caller always gets the original response; a wrapper only adds the
    /// observer side branch.
    pub fn fetch(&self, url: &str, ok: bool, body: &str) -> FetchResult {
        let result = FetchResult {
            ok,
            body: body.to_string(),
        };

        let observer = self.observer.borrow().clone();
        if let Some(observer) = observer {
            if observer.wants(url) {
                observer.observe(InterceptedResponse {
                    url: url.to_string(),
                    ok,
                    body: body.to_string(),
                });
            }
        }

        result
    }

    pub fn is_fetch_wrapped(&self) -> bool {
        self.observer.borrow().is_some()
    }

    /// Total number of wrappers ever installed
    pub fn wrap_count(&self) -> u32 {
        self.wrap_count.get()
    }

    /// Make the next `wrap_fetch` calls fail
    pub fn set_network_available(&self, available: bool) {
        self.network_available.set(available);
    }

    // ---- surface ----

    pub fn overlays(&self) -> Vec<MountedOverlay> {
        self.overlays.borrow().values().cloned().collect()
    }

    pub fn visible_panels(&self) -> Vec<Panel> {
        self.overlays
            .borrow()
            .values()
            .map(|o| o.panel.clone())
            .collect()
    }

    /// Press the close control of a mounted overlay
    pub fn press_close(&self, overlay: OverlayHandle) {
        let mounted = self.overlays.borrow().get(&overlay).cloned();
        if let Some(mounted) = mounted {
            mounted.close();
        }
    }

    pub fn overlay_handles(&self) -> Vec<OverlayHandle> {
        self.overlays.borrow().keys().copied().collect()
    }

    /// Make `selector` resolve to `bounds` in `anchor_bounds`
    pub fn set_anchor(&self, selector: &str, bounds: Rect) {
        self.anchor_selectors.borrow_mut().insert(selector.to_string());
        self.anchor.set(Some(bounds));
    }

    pub fn set_viewport(&self, size: Size) {
        self.viewport.set(size);
    }

    pub fn set_panel_size(&self, size: Size) {
        self.panel_size.set(size);
    }

    // ---- events ----

    pub fn click(&self, target: &ManualNode) {
        let handlers: Vec<_> = self.click_handlers.borrow().values().cloned().collect();
        for handler in handlers {
            handler(target.clone());
        }
    }

    /// Client-side navigation: update the location and signal a page change
    pub fn navigate(&self, url: &str) {
        *self.location.borrow_mut() = url.to_string();
        self.notify_mutation(Vec::new());
    }

    /// Signal that nodes were added to the document
    pub fn add_nodes(&self, nodes: Vec<ManualNode>) {
        self.notify_mutation(nodes);
    }

    fn notify_mutation(&self, nodes: Vec<ManualNode>) {
        let handlers: Vec<_> = self.mutation_handlers.borrow().values().cloned().collect();
        for handler in handlers {
            handler(nodes.clone());
        }
    }

    pub fn listener_count(&self) -> usize {
        self.click_handlers.borrow().len() + self.mutation_handlers.borrow().len()
    }
}

impl Default for ManualHost {
    fn default() -> Self {
        Self::new("https://www.linkedin.com/jobs/search/")
    }
}

impl Scheduler for ManualHost {
    fn set_timeout(&self, delay: Duration, task: Task) -> TimerId {
        let id = TimerId(self.next_id());
        self.timers.borrow_mut().push(PendingTimer {
            id,
            due: self.now.get() + delay,
            task,
        });
        id
    }

    fn clear_timeout(&self, id: TimerId) {
        self.timers.borrow_mut().retain(|t| t.id != id);
    }
}

impl Network for ManualHost {
    fn wrap_fetch(&self, observer: Rc<dyn ResponseObserver>) -> Result<(), HostError> {
        if !self.network_available.get() {
            return Err(HostError::Unavailable("fetch"));
        }
        *self.observer.borrow_mut() = Some(observer);
        self.wrap_count.set(self.wrap_count.get() + 1);
        Ok(())
    }

    fn restore_fetch(&self) {
        self.observer.borrow_mut().take();
    }
}

impl Surface for ManualHost {
    fn mount(&self, panel: &Panel, on_close: Rc<dyn Fn()>) -> Result<OverlayHandle, HostError> {
        let handle = OverlayHandle(self.next_id());
        self.overlays.borrow_mut().insert(
            handle,
            MountedOverlay {
                panel: panel.clone(),
                placement: None,
                on_close,
            },
        );
        Ok(handle)
    }

    fn measure(&self, _overlay: OverlayHandle) -> Size {
        self.panel_size.get()
    }

    fn place(&self, overlay: OverlayHandle, placement: Placement) {
        if let Some(mounted) = self.overlays.borrow_mut().get_mut(&overlay) {
            mounted.placement = Some(placement);
        }
    }

    fn unmount(&self, overlay: OverlayHandle) {
        self.overlays.borrow_mut().remove(&overlay);
    }

    fn clear_overlays(&self) {
        self.overlays.borrow_mut().clear();
    }

    fn anchor_bounds(&self, selectors: &[String]) -> Option<Rect> {
        let known = self.anchor_selectors.borrow();
        if selectors.iter().any(|s| known.contains(s)) {
            self.anchor.get()
        } else {
            None
        }
    }

    fn viewport(&self) -> Size {
        self.viewport.get()
    }

    // en-US in UTC, whatever the machine running the tests is set to
    fn locale_timestamp(&self, at: DateTime<Utc>) -> String {
        at.format("%-m/%-d/%Y %-I:%M:%S %p").to_string()
    }
}

impl EventSource for ManualHost {
    type Node = ManualNode;

    fn location(&self) -> String {
        self.location.borrow().clone()
    }

    fn on_click(&self, handler: Rc<dyn Fn(ManualNode)>) -> Result<ListenerId, HostError> {
        let id = ListenerId(self.next_id());
        self.click_handlers.borrow_mut().insert(id, handler);
        Ok(id)
    }

    fn on_mutation(
        &self,
        handler: Rc<dyn Fn(Vec<ManualNode>)>,
    ) -> Result<ListenerId, HostError> {
        let id = ListenerId(self.next_id());
        self.mutation_handlers.borrow_mut().insert(id, handler);
        Ok(id)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.click_handlers.borrow_mut().remove(&id);
        self.mutation_handlers.borrow_mut().remove(&id);
    }
}

struct NodeData {
    tag: String,
    attributes: RefCell<BTreeMap<String, String>>,
    classes: RefCell<Vec<String>>,
    parent: RefCell<Weak<NodeData>>,
    children: RefCell<Vec<ManualNode>>,
}

/// Element in the manual DOM tree
#[derive(Clone)]
pub struct ManualNode(Rc<NodeData>);

impl ManualNode {
    pub fn element(tag: &str) -> Self {
        Self(Rc::new(NodeData {
            tag: tag.to_lowercase(),
            attributes: RefCell::new(BTreeMap::new()),
            classes: RefCell::new(Vec::new()),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
        }))
    }

    pub fn with_attr(self, name: &str, value: &str) -> Self {
        self.0
            .attributes
            .borrow_mut()
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_class(self, class: &str) -> Self {
        self.0.classes.borrow_mut().push(class.to_string());
        self
    }

    /// Anchor element pointing at `href`
    pub fn link(href: &str) -> Self {
        Self::element("a").with_attr("href", href)
    }

    /// Attach `child` under this node and return it
    pub fn append(&self, child: ManualNode) -> ManualNode {
        *child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
        self.0.children.borrow_mut().push(child.clone());
        child
    }

    pub fn ptr_eq(&self, other: &ManualNode) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl DomNode for ManualNode {
    fn parent(&self) -> Option<Self> {
        self.0.parent.borrow().upgrade().map(ManualNode)
    }

    fn tag_name(&self) -> String {
        self.0.tag.clone()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.0.attributes.borrow().get(name).cloned()
    }

    fn has_class(&self, class: &str) -> bool {
        self.0.classes.borrow().iter().any(|c| c == class)
    }

    fn children(&self) -> Vec<Self> {
        self.0.children.borrow().clone()
    }
}
