//! `web-sys` implementation of the host traits.

use crate::style::{OVERLAY_CLASS, STYLES, STYLE_ELEMENT_ID};
use chrono::{DateTime, Utc};
use insights_core::host::{
    DomNode, EventSource, InterceptedResponse, ListenerId, Network, OverlayHandle, Placement,
    Rect, ResponseObserver, Scheduler, Size, Surface, Task, TimerId,
};
use insights_core::{HostError, Panel};
use js_sys::{Array, Date, Function, Promise, Reflect};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{
    Document, Element, Event, EventTarget, HtmlAnchorElement, HtmlElement, MutationObserver,
    MutationObserverInit, MutationRecord, Node, Request, Response, Window,
};

pub(crate) fn js_error(value: JsValue) -> HostError {
    HostError::Js(
        value
            .as_string()
            .unwrap_or_else(|| format!("{:?}", value)),
    )
}

/// Drop a value once the current callback has returned. Closures may not be
/// freed while they are running.
fn release_later<T: 'static>(value: T) {
    spawn_local(async move { drop(value) });
}

/// Element wrapper handed to the interaction watcher
#[derive(Debug, Clone)]
pub struct WebNode(pub Element);

impl DomNode for WebNode {
    fn parent(&self) -> Option<Self> {
        self.0.parent_element().map(WebNode)
    }

    fn tag_name(&self) -> String {
        self.0.tag_name().to_lowercase()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.0.get_attribute(name)
    }

    fn has_class(&self, class: &str) -> bool {
        self.0.class_list().contains(class)
    }

    fn children(&self) -> Vec<Self> {
        let children = self.0.children();
        (0..children.length())
            .filter_map(|i| children.item(i))
            .map(WebNode)
            .collect()
    }

    // Resolved against the document base, unlike the raw attribute
    fn link_target(&self) -> Option<String> {
        self.0.dyn_ref::<HtmlAnchorElement>().map(|a| a.href())
    }
}

struct PendingTimer {
    handle: i32,
    _callback: Closure<dyn FnMut()>,
}

struct FetchPatch {
    original: Function,
    active: Rc<Cell<bool>>,
    wrapper: Closure<dyn FnMut(JsValue, JsValue) -> JsValue>,
    tap: Closure<dyn FnMut(JsValue) -> JsValue>,
}

struct MountedOverlay {
    element: HtmlElement,
    _on_close: Closure<dyn FnMut(Event)>,
}

enum Listener {
    Click(Closure<dyn FnMut(Event)>),
    Mutation {
        observer: MutationObserver,
        _callback: Closure<dyn FnMut(Array, MutationObserver)>,
        history: Closure<dyn FnMut(Event)>,
    },
}

/// The live page
pub struct WebHost {
    window: Window,
    document: Document,
    next_id: Cell<u32>,
    timers: Rc<RefCell<HashMap<TimerId, PendingTimer>>>,
    fetch: RefCell<Option<FetchPatch>>,
    overlays: RefCell<HashMap<OverlayHandle, MountedOverlay>>,
    listeners: RefCell<HashMap<ListenerId, Listener>>,
}

impl WebHost {
    pub fn new(window: Window) -> Result<Self, HostError> {
        let document = window.document().ok_or(HostError::Unavailable("document"))?;
        Ok(Self {
            window,
            document,
            next_id: Cell::new(1),
            timers: Rc::new(RefCell::new(HashMap::new())),
            fetch: RefCell::new(None),
            overlays: RefCell::new(HashMap::new()),
            listeners: RefCell::new(HashMap::new()),
        })
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    fn next_id(&self) -> u32 {
        let id = self.next_id.get();
        self.next_id.set(id.wrapping_add(1));
        id
    }

    fn create(&self, tag: &str, class: &str) -> Result<HtmlElement, HostError> {
        let element = self
            .document
            .create_element(tag)
            .map_err(js_error)?
            .dyn_into::<HtmlElement>()
            .map_err(|_| HostError::Js(format!("<{}> is not an HTML element", tag)))?;
        element.set_class_name(class);
        Ok(element)
    }

    fn create_text(&self, tag: &str, class: &str, text: &str) -> Result<HtmlElement, HostError> {
        let element = self.create(tag, class)?;
        element.set_text_content(Some(text));
        Ok(element)
    }

    fn ensure_styles(&self) -> Result<(), HostError> {
        if self.document.get_element_by_id(STYLE_ELEMENT_ID).is_some() {
            return Ok(());
        }
        let head = self
            .document
            .head()
            .ok_or(HostError::Unavailable("document.head"))?;
        let style = self.create_text("style", "", STYLES)?;
        style.set_id(STYLE_ELEMENT_ID);
        head.append_child(&style).map_err(js_error)?;
        Ok(())
    }

    /// Build the overlay tree. Text goes in through `textContent` only.
    fn render(&self, panel: &Panel) -> Result<HtmlElement, HostError> {
        let root = self.create("div", OVERLAY_CLASS)?;
        // not a card id attribute; clicks inside the panel must not look like card clicks
        root.set_attribute("data-record-id", &panel.record_id)
            .map_err(js_error)?;

        let header = self.create_text("div", "job-insights-header", &panel.header)?;
        root.append_child(&header).map_err(js_error)?;

        if let Some(subtitle) = &panel.subtitle {
            let line = self.create_text("div", "job-insights-subtitle", subtitle)?;
            root.append_child(&line).map_err(js_error)?;
        }

        for row in &panel.rows {
            let line = self.create("div", "job-insights-row")?;
            let label = self.create_text("span", "job-insights-label", &row.label)?;
            let value = self.create_text("span", "job-insights-value", &row.value)?;
            line.append_child(&label).map_err(js_error)?;
            line.append_child(&value).map_err(js_error)?;
            root.append_child(&line).map_err(js_error)?;
        }

        if let Some(footnote) = &panel.footnote {
            let line = self.create_text("div", "job-insights-footnote", footnote)?;
            root.append_child(&line).map_err(js_error)?;
        }

        Ok(root)
    }

    fn overlay_element(&self, overlay: OverlayHandle) -> Option<HtmlElement> {
        self.overlays
            .borrow()
            .get(&overlay)
            .map(|mounted| mounted.element.clone())
    }
}

fn px(value: f64) -> String {
    format!("{}px", value.round())
}

fn request_url(input: &JsValue) -> Option<String> {
    if let Some(url) = input.as_string() {
        return Some(url);
    }
    if let Some(request) = input.dyn_ref::<Request>() {
        return Some(request.url());
    }
    // URL objects
    Reflect::get(input, &JsValue::from_str("href"))
        .ok()
        .and_then(|href| href.as_string())
}

async fn read_text(response: &Response) -> Result<String, JsValue> {
    let text = JsFuture::from(response.text()?).await?;
    Ok(text.as_string().unwrap_or_default())
}

/// Hand a response to the observer without touching the caller's body
fn forward_response(response: &Response, observer: &Rc<dyn ResponseObserver>) {
    let url = response.url();
    if !response.ok() {
        observer.observe(InterceptedResponse {
            url,
            ok: false,
            body: String::new(),
        });
        return;
    }

    let copy = match Response::clone(response) {
        Ok(copy) => copy,
        Err(e) => {
            debug!("Could not clone response for {}: {:?}", url, e);
            return;
        }
    };

    let observer = Rc::clone(observer);
    spawn_local(async move {
        match read_text(&copy).await {
            Ok(body) => observer.observe(InterceptedResponse {
                url,
                ok: true,
                body,
            }),
            Err(e) => debug!("Could not read response body for {}: {:?}", url, e),
        }
    });
}

/// `promise.then(tap)`, keeping whatever `tap` returns as the resolved value
fn chain(promise: &JsValue, tap: &Function) -> Result<JsValue, JsValue> {
    let then: Function = Reflect::get(promise, &JsValue::from_str("then"))?.dyn_into()?;
    then.call1(promise, tap)
}

impl Scheduler for WebHost {
    fn set_timeout(&self, delay: Duration, task: Task) -> TimerId {
        let id = TimerId(self.next_id());

        let timers = Rc::downgrade(&self.timers);
        let callback = Closure::once(move || {
            let fired = timers
                .upgrade()
                .and_then(|timers| timers.borrow_mut().remove(&id));
            task();
            // this closure is still on the stack
            if let Some(fired) = fired {
                release_later(fired);
            }
        });

        let millis = i32::try_from(delay.as_millis()).unwrap_or(i32::MAX);
        match self.window.set_timeout_with_callback_and_timeout_and_arguments_0(
            callback.as_ref().unchecked_ref(),
            millis,
        ) {
            Ok(handle) => {
                self.timers.borrow_mut().insert(
                    id,
                    PendingTimer {
                        handle,
                        _callback: callback,
                    },
                );
            }
            Err(e) => warn!("setTimeout failed: {:?}", e),
        }
        id
    }

    fn clear_timeout(&self, id: TimerId) {
        let removed = self.timers.borrow_mut().remove(&id);
        if let Some(timer) = removed {
            self.window.clear_timeout_with_handle(timer.handle);
        }
    }
}

impl Network for WebHost {
    fn wrap_fetch(&self, observer: Rc<dyn ResponseObserver>) -> Result<(), HostError> {
        if self.fetch.borrow().is_some() {
            debug!("fetch already wrapped");
            return Ok(());
        }

        let original: Function = Reflect::get(&self.window, &JsValue::from_str("fetch"))
            .map_err(js_error)?
            .dyn_into()
            .map_err(|_| HostError::Unavailable("fetch"))?;

        let tap_observer = Rc::clone(&observer);
        let tap = Closure::wrap(Box::new(move |value: JsValue| -> JsValue {
            if let Some(response) = value.dyn_ref::<Response>() {
                forward_response(response, &tap_observer);
            }
            value
        }) as Box<dyn FnMut(JsValue) -> JsValue>);
        let tap_fn: Function = tap.as_ref().clone().unchecked_into();

        let active = Rc::new(Cell::new(true));
        let wrapper_active = Rc::clone(&active);
        let delegate = original.clone();
        let this: JsValue = self.window.clone().into();
        let wrapper = Closure::wrap(Box::new(move |input: JsValue, init: JsValue| -> JsValue {
            let result = if init.is_undefined() {
                delegate.call1(&this, &input)
            } else {
                delegate.call2(&this, &input, &init)
            };
            let promise = match result {
                Ok(promise) => promise,
                Err(e) => return Promise::reject(&e).into(),
            };

            let observed = wrapper_active.get()
                && request_url(&input).is_some_and(|url| observer.wants(&url));
            if !observed {
                return promise;
            }

            match chain(&promise, &tap_fn) {
                Ok(chained) => chained,
                Err(e) => {
                    debug!("Could not observe fetch: {:?}", e);
                    promise
                }
            }
        }) as Box<dyn FnMut(JsValue, JsValue) -> JsValue>);

        Reflect::set(&self.window, &JsValue::from_str("fetch"), wrapper.as_ref())
            .map_err(js_error)?;

        *self.fetch.borrow_mut() = Some(FetchPatch {
            original,
            active,
            wrapper,
            tap,
        });
        debug!("fetch wrapped");
        Ok(())
    }

    fn restore_fetch(&self) {
        let Some(patch) = self.fetch.borrow_mut().take() else {
            return;
        };

        patch.active.set(false);
        if let Err(e) = Reflect::set(&self.window, &JsValue::from_str("fetch"), &patch.original) {
            warn!("Could not restore fetch: {:?}", e);
        }

        // Page code may still hold the wrapper; keep it callable as a plain
        // pass-through.
        patch.wrapper.forget();
        patch.tap.forget();
        debug!("fetch restored");
    }
}

impl Surface for WebHost {
    fn mount(&self, panel: &Panel, on_close: Rc<dyn Fn()>) -> Result<OverlayHandle, HostError> {
        self.ensure_styles()?;
        let body = self
            .document
            .body()
            .ok_or(HostError::Unavailable("document.body"))?;

        let root = self.render(panel)?;

        let close = self.create_text("button", "job-insights-close", "\u{00d7}")?;
        close.set_attribute("type", "button").map_err(js_error)?;
        close.set_attribute("aria-label", "Close").map_err(js_error)?;
        let callback = Closure::wrap(Box::new(move |event: Event| {
            // keep the page's own click handling away from the panel
            event.stop_propagation();
            on_close();
        }) as Box<dyn FnMut(Event)>);
        close
            .add_event_listener_with_callback("click", callback.as_ref().unchecked_ref())
            .map_err(js_error)?;
        root.append_child(&close).map_err(js_error)?;

        body.append_child(&root).map_err(js_error)?;

        let handle = OverlayHandle(self.next_id());
        self.overlays.borrow_mut().insert(
            handle,
            MountedOverlay {
                element: root,
                _on_close: callback,
            },
        );
        Ok(handle)
    }

    fn measure(&self, overlay: OverlayHandle) -> Size {
        self.overlay_element(overlay)
            .map(|el| Size::new(el.offset_width() as f64, el.offset_height() as f64))
            .unwrap_or_default()
    }

    fn place(&self, overlay: OverlayHandle, placement: Placement) {
        let Some(element) = self.overlay_element(overlay) else {
            return;
        };
        let style = element.style();

        let result = match placement {
            Placement::Anchored { left, top } => style
                .set_property("left", &px(left))
                .and_then(|_| style.set_property("top", &px(top)))
                .and_then(|_| style.remove_property("right").map(|_| ())),
            Placement::Corner { top, right } => style
                .set_property("top", &px(top))
                .and_then(|_| style.set_property("right", &px(right)))
                .and_then(|_| style.remove_property("left").map(|_| ())),
        };

        if let Err(e) = result {
            warn!("Could not position overlay: {:?}", e);
        }
    }

    fn unmount(&self, overlay: OverlayHandle) {
        let removed = self.overlays.borrow_mut().remove(&overlay);
        if let Some(mounted) = removed {
            mounted.element.remove();
            // may be running inside this overlay's own close handler
            release_later(mounted);
        }
    }

    fn clear_overlays(&self) {
        let mounted: Vec<MountedOverlay> = self
            .overlays
            .borrow_mut()
            .drain()
            .map(|(_, mounted)| mounted)
            .collect();
        for overlay in mounted {
            overlay.element.remove();
            release_later(overlay);
        }

        let selector = format!(".{}", OVERLAY_CLASS);
        if let Ok(stray) = self.document.query_selector_all(&selector) {
            for i in 0..stray.length() {
                if let Some(element) = stray.get(i).and_then(|n| n.dyn_into::<Element>().ok()) {
                    element.remove();
                }
            }
        }

        if let Some(style) = self.document.get_element_by_id(STYLE_ELEMENT_ID) {
            style.remove();
        }
    }

    fn anchor_bounds(&self, selectors: &[String]) -> Option<Rect> {
        if selectors.is_empty() {
            return None;
        }
        let element = self
            .document
            .query_selector(&selectors.join(", "))
            .ok()
            .flatten()?;
        let bounds = element.get_bounding_client_rect();
        Some(Rect::new(
            bounds.left(),
            bounds.top(),
            bounds.right(),
            bounds.bottom(),
        ))
    }

    fn viewport(&self) -> Size {
        let dimension = |value: Result<JsValue, JsValue>| {
            value.ok().and_then(|v| v.as_f64()).unwrap_or_default()
        };
        Size::new(
            dimension(self.window.inner_width()),
            dimension(self.window.inner_height()),
        )
    }

    fn locale_timestamp(&self, at: DateTime<Utc>) -> String {
        let date = Date::new(&JsValue::from_f64(at.timestamp_millis() as f64));
        let locale = self
            .window
            .navigator()
            .language()
            .unwrap_or_else(|| "en-US".to_string());
        let day: String = date.to_locale_date_string(&locale, &JsValue::UNDEFINED).into();
        let time: String = date.to_locale_time_string(&locale).into();
        format!("{} {}", day, time)
    }
}

fn target_element(target: EventTarget) -> Option<Element> {
    match target.dyn_into::<Element>() {
        Ok(element) => Some(element),
        // text nodes
        Err(other) => other
            .dyn_into::<Node>()
            .ok()
            .and_then(|node| node.parent_element()),
    }
}

fn added_elements(records: &Array) -> Vec<WebNode> {
    let mut added = Vec::new();
    for record in records.iter() {
        let Ok(record) = record.dyn_into::<MutationRecord>() else {
            continue;
        };
        let nodes = record.added_nodes();
        for i in 0..nodes.length() {
            if let Some(element) = nodes.get(i).and_then(|n| n.dyn_into::<Element>().ok()) {
                added.push(WebNode(element));
            }
        }
    }
    added
}

impl EventSource for WebHost {
    type Node = WebNode;

    fn location(&self) -> String {
        self.window.location().href().unwrap_or_default()
    }

    fn on_click(&self, handler: Rc<dyn Fn(WebNode)>) -> Result<ListenerId, HostError> {
        let callback = Closure::wrap(Box::new(move |event: Event| {
            if let Some(element) = event.target().and_then(target_element) {
                handler(WebNode(element));
            }
        }) as Box<dyn FnMut(Event)>);

        self.document
            .add_event_listener_with_callback("click", callback.as_ref().unchecked_ref())
            .map_err(js_error)?;

        let id = ListenerId(self.next_id());
        self.listeners
            .borrow_mut()
            .insert(id, Listener::Click(callback));
        Ok(id)
    }

    fn on_mutation(&self, handler: Rc<dyn Fn(Vec<WebNode>)>) -> Result<ListenerId, HostError> {
        let on_added = Rc::clone(&handler);
        let callback = Closure::wrap(Box::new(move |records: Array, _: MutationObserver| {
            on_added(added_elements(&records));
        }) as Box<dyn FnMut(Array, MutationObserver)>);

        let observer =
            MutationObserver::new(callback.as_ref().unchecked_ref()).map_err(js_error)?;
        let options = MutationObserverInit::new();
        options.set_child_list(true);
        options.set_subtree(true);
        observer
            .observe_with_options(&self.document, &options)
            .map_err(js_error)?;

        let history = Closure::wrap(Box::new(move |_: Event| {
            handler(Vec::new());
        }) as Box<dyn FnMut(Event)>);
        if let Err(e) = self
            .window
            .add_event_listener_with_callback("popstate", history.as_ref().unchecked_ref())
        {
            observer.disconnect();
            return Err(js_error(e));
        }

        let id = ListenerId(self.next_id());
        self.listeners.borrow_mut().insert(
            id,
            Listener::Mutation {
                observer,
                _callback: callback,
                history,
            },
        );
        Ok(id)
    }

    fn remove_listener(&self, id: ListenerId) {
        let removed = self.listeners.borrow_mut().remove(&id);
        let Some(listener) = removed else {
            return;
        };

        let detached = match &listener {
            Listener::Click(callback) => self
                .document
                .remove_event_listener_with_callback("click", callback.as_ref().unchecked_ref()),
            Listener::Mutation {
                observer, history, ..
            } => {
                observer.disconnect();
                self.window.remove_event_listener_with_callback(
                    "popstate",
                    history.as_ref().unchecked_ref(),
                )
            }
        };
        if let Err(e) = detached {
            warn!("Could not detach listener: {:?}", e);
        }

        release_later(listener);
    }
}
