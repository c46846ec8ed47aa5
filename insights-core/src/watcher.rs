//! Click and client-side navigation watching.
//!
//! The host page renders and fetches asynchronously, so every resolution runs
//! after a short settle delay. If the matching harvest has not landed by then
//! the lookup simply misses; there is no retry.

use crate::config::WatcherConfig;
use crate::error::HostError;
use crate::extractor::IdExtractor;
use crate::host::{DomNode, Host, ListenerId, TimerId};
use crate::presenter::{Presenter, OVERLAY_CLASS};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::{debug, trace, Level};

/// Detects location changes by comparing against the last value seen.
///
/// The host has no navigation event for in-app routing, so the signal is
/// "the page changed and the URL is different now". Detection latency is
/// bounded by how often the host reports page changes.
#[derive(Debug, Default)]
pub struct NavigationTracker {
    last: Option<String>,
}

impl NavigationTracker {
    pub fn new(initial: &str) -> Self {
        Self {
            last: Some(initial.to_string()),
        }
    }

    /// Returns `true` (and remembers `current`) when it differs from the last
    /// value seen
    pub fn has_changed(&mut self, current: &str) -> bool {
        if self.last.as_deref() == Some(current) {
            return false;
        }
        self.last = Some(current.to_string());
        true
    }

    pub fn reset(&mut self, current: &str) {
        self.last = Some(current.to_string());
    }
}

/// Recognises job cards and job links in the host DOM
#[derive(Debug, Clone)]
pub struct CardMatcher {
    id_attributes: Vec<String>,
    card_classes: Vec<String>,
    job_link_marker: String,
}

impl CardMatcher {
    pub fn new(config: &WatcherConfig) -> Self {
        Self {
            id_attributes: config.id_attributes.clone(),
            card_classes: config.card_classes.clone(),
            job_link_marker: config.job_link_marker.clone(),
        }
    }

    /// Card by markup alone: an id attribute or a card class
    pub fn is_listing<N: DomNode>(&self, node: &N) -> bool {
        self.id_attributes
            .iter()
            .any(|attr| node.attribute(attr).is_some())
            || self.card_classes.iter().any(|class| node.has_class(class))
    }

    pub fn is_job_link<N: DomNode>(&self, node: &N) -> bool {
        node.link_target()
            .is_some_and(|href| href.contains(self.job_link_marker.as_str()))
    }

    pub fn is_card<N: DomNode>(&self, node: &N) -> bool {
        self.is_listing(node) || self.is_job_link(node)
    }

    /// Whether `node` sits inside one of our own panels
    pub fn in_overlay<N: DomNode>(&self, node: &N) -> bool {
        let mut current = Some(node.clone());
        while let Some(node) = current {
            if node.has_class(OVERLAY_CLASS) {
                return true;
            }
            current = node.parent();
        }
        false
    }

    /// The target itself or its nearest ancestor that is a card
    pub fn closest_card<N: DomNode>(&self, target: N) -> Option<N> {
        let mut node = Some(target);
        while let Some(current) = node {
            if self.is_card(&current) {
                return Some(current);
            }
            node = current.parent();
        }
        None
    }

    /// First id attribute present on the node, in configured order
    pub fn id_attribute<N: DomNode>(&self, node: &N) -> Option<String> {
        self.id_attributes
            .iter()
            .filter_map(|attr| node.attribute(attr))
            .find(|value| !value.trim().is_empty())
    }

    /// Link target of the first job link under `root`, depth first
    pub fn find_job_link<N: DomNode>(&self, root: &N) -> Option<String> {
        let mut stack: Vec<N> = root.children().into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            if self.is_job_link(&node) {
                return node.link_target();
            }
            stack.extend(node.children().into_iter().rev());
        }
        None
    }

    /// Whether `node` is, or contains, a listing card
    pub fn contains_listing<N: DomNode>(&self, node: &N) -> bool {
        if self.is_listing(node) {
            return true;
        }
        node.children().iter().any(|child| self.contains_listing(child))
    }
}

struct WatcherInner<H: Host> {
    host: Rc<H>,
    extractor: Rc<IdExtractor>,
    presenter: Presenter<H>,
    config: WatcherConfig,
    matcher: CardMatcher,
    navigation: RefCell<NavigationTracker>,
    listeners: RefCell<Vec<ListenerId>>,
    pending: RefCell<Vec<TimerId>>,
}

/// Turns clicks and route changes into presenter requests
pub struct InteractionWatcher<H: Host> {
    inner: Rc<WatcherInner<H>>,
}

impl<H: Host> InteractionWatcher<H> {
    pub fn new(
        host: Rc<H>,
        extractor: Rc<IdExtractor>,
        presenter: Presenter<H>,
        config: WatcherConfig,
    ) -> Self {
        let matcher = CardMatcher::new(&config);
        let navigation = NavigationTracker::new(&host.location());
        Self {
            inner: Rc::new(WatcherInner {
                host,
                extractor,
                presenter,
                config,
                matcher,
                navigation: RefCell::new(navigation),
                listeners: RefCell::new(Vec::new()),
                pending: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Register the click and page-change listeners
    pub fn install(&self) -> Result<(), HostError> {
        let inner = &self.inner;
        inner.navigation.borrow_mut().reset(&inner.host.location());

        let weak = Rc::downgrade(inner);
        let click = inner.host.on_click(Rc::new(move |target: H::Node| {
            if let Some(inner) = weak.upgrade() {
                handle_click(&inner, target);
            }
        }))?;

        let weak = Rc::downgrade(inner);
        let mutation = inner.host.on_mutation(Rc::new(move |added: Vec<H::Node>| {
            if let Some(inner) = weak.upgrade() {
                handle_mutation(&inner, added);
            }
        }));

        let mutation = match mutation {
            Ok(id) => id,
            Err(e) => {
                inner.host.remove_listener(click);
                return Err(e);
            }
        };

        inner.listeners.borrow_mut().extend([click, mutation]);
        debug!("Interaction listeners installed");
        Ok(())
    }

    /// Remove listeners and cancel resolutions still waiting to settle
    pub fn uninstall(&self) {
        let inner = &self.inner;
        let listeners: Vec<_> = inner.listeners.borrow_mut().drain(..).collect();
        for id in listeners {
            inner.host.remove_listener(id);
        }

        let pending: Vec<_> = inner.pending.borrow_mut().drain(..).collect();
        for id in pending {
            inner.host.clear_timeout(id);
        }
    }

    /// Resolve the job id for a clicked card
    pub fn resolve_card_id(&self, card: &H::Node) -> Option<String> {
        resolve_card_id(&*self.inner, card)
    }

    pub fn is_installed(&self) -> bool {
        !self.inner.listeners.borrow().is_empty()
    }

    pub fn pending_resolutions(&self) -> usize {
        self.inner.pending.borrow().len()
    }
}

fn handle_click<H: Host>(inner: &Rc<WatcherInner<H>>, target: H::Node) {
    if inner.matcher.in_overlay(&target) {
        return;
    }
    let Some(card) = inner.matcher.closest_card(target) else {
        return;
    };

    trace!("Job card clicked");
    schedule(inner, inner.config.click_settle(), move |inner| {
        match resolve_card_id(inner, &card) {
            Some(id) => {
                inner.presenter.show(&id);
            }
            None => debug!("Clicked card carries no job id"),
        }
    });
}

fn handle_mutation<H: Host>(inner: &Rc<WatcherInner<H>>, added: Vec<H::Node>) {
    // diagnostics only; walking added subtrees is not free on a live page
    if tracing::enabled!(Level::DEBUG) {
        let listings = added
            .iter()
            .filter(|node| inner.matcher.contains_listing(*node))
            .count();
        if listings > 0 {
            debug!("New job listings detected ({} nodes)", listings);
        }
    }

    let location = inner.host.location();
    if !inner.navigation.borrow_mut().has_changed(&location) {
        return;
    }

    trace!("Location changed to {}", location);
    schedule(inner, inner.config.navigation_settle(), move |inner| {
        if let Some(id) = inner.extractor.extract(&location) {
            inner.presenter.show(&id);
        }
    });
}

/// Id attribute, then the card's own link, then the page location, then any
/// job link inside the card
fn resolve_card_id<H: Host>(inner: &WatcherInner<H>, card: &H::Node) -> Option<String> {
    inner
        .matcher
        .id_attribute(card)
        .or_else(|| {
            card.link_target()
                .and_then(|href| inner.extractor.extract(&href))
        })
        .or_else(|| inner.extractor.extract(&inner.host.location()))
        .or_else(|| {
            inner
                .matcher
                .find_job_link(card)
                .and_then(|href| inner.extractor.extract(&href))
        })
}

/// Run `task` after `delay`, tracking the timer so teardown can cancel it
fn schedule<H, F>(inner: &Rc<WatcherInner<H>>, delay: std::time::Duration, task: F)
where
    H: Host,
    F: FnOnce(&WatcherInner<H>) + 'static,
{
    let weak: Weak<WatcherInner<H>> = Rc::downgrade(inner);
    let slot: Rc<RefCell<Option<TimerId>>> = Rc::new(RefCell::new(None));
    let own_id = Rc::clone(&slot);

    let id = inner.host.set_timeout(
        delay,
        Box::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if let Some(id) = own_id.borrow_mut().take() {
                inner.pending.borrow_mut().retain(|pending| *pending != id);
            }
            task(&*inner);
        }),
    );

    *slot.borrow_mut() = Some(id);
    inner.pending.borrow_mut().push(id);
}
