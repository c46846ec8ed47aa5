//! Job Insights content script
//!
//! Binds the core engine to the live page. One controller exists per page
//! context; it is created when the module starts, initialized once the DOM is
//! ready and torn down when the page is hidden or unloaded.

mod host;
mod style;

pub use host::{WebHost, WebNode};

use host::js_error;
use insights_core::{Config, HostError, InsightsController, InsightsError};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::{debug, error, info, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Event, Window};

const BUNDLED_CONFIG: &str = include_str!("../insights.toml");

thread_local! {
    static CONTROLLER: RefCell<Option<Rc<InsightsController<WebHost>>>> = RefCell::new(None);
    static LIFECYCLE_BOUND: Cell<bool> = Cell::new(false);
}

#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());

    if let Err(e) = attach(bundled_config()) {
        error!("Job insights failed to start: {}", e);
    }
}

/// Restart with a caller-supplied TOML configuration
#[wasm_bindgen(js_name = startWithConfig)]
pub fn start_with_config(toml: &str) -> Result<(), JsValue> {
    let config = Config::from_toml_str(toml).map_err(|e| JsValue::from_str(&e.to_string()))?;
    attach(config).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Tear down the current controller, if any
#[wasm_bindgen]
pub fn destroy() {
    destroy_current();
}

/// Controller state as JSON
#[wasm_bindgen]
pub fn stats() -> String {
    current()
        .map(|controller| controller.stats())
        .and_then(|stats| serde_json::to_string(&stats).ok())
        .unwrap_or_else(|| "null".to_string())
}

fn bundled_config() -> Config {
    match Config::from_toml_str(BUNDLED_CONFIG) {
        Ok(config) => config,
        Err(e) => {
            warn!("Bundled config invalid, using defaults: {}", e);
            Config::default()
        }
    }
}

fn apply_log_level(level: &str) {
    match level.parse::<log::LevelFilter>() {
        Ok(filter) => log::set_max_level(filter),
        Err(_) => warn!("Unknown log level {:?}, keeping default", level),
    }
}

fn current() -> Option<Rc<InsightsController<WebHost>>> {
    CONTROLLER.with(|slot| slot.borrow().clone())
}

fn attach(config: Config) -> Result<(), InsightsError> {
    apply_log_level(&config.general.log_level);

    let window = web_sys::window().ok_or(HostError::Unavailable("window"))?;
    let href = window.location().href().map_err(js_error)?;
    if !config.applies_to(&href) {
        info!("Not a job page, staying idle: {}", href);
        return Ok(());
    }

    let host = Rc::new(WebHost::new(window.clone())?);
    let loading = host.document().ready_state() == "loading";
    let document = host.document().clone();
    let controller = Rc::new(InsightsController::new(host, &config)?);

    let previous = CONTROLLER.with(|slot| slot.borrow_mut().replace(controller));
    if let Some(previous) = previous {
        previous.destroy();
    }

    bind_lifecycle(&window)?;

    if loading {
        let ready = Closure::once_into_js(init_current);
        document
            .add_event_listener_with_callback("DOMContentLoaded", ready.unchecked_ref())
            .map_err(js_error)?;
        debug!("Waiting for DOMContentLoaded");
    } else {
        init_current();
    }
    Ok(())
}

fn init_current() {
    let Some(controller) = current() else {
        return;
    };
    match controller.init() {
        Ok(true) => info!("Job insights active"),
        Ok(false) => debug!("Job insights already active"),
        Err(e) => error!("Job insights init failed: {}", e),
    }
}

fn destroy_current() {
    if let Some(controller) = current() {
        controller.destroy();
    }
}

/// Page lifetime listeners; bound once per page
fn bind_lifecycle(window: &Window) -> Result<(), HostError> {
    if LIFECYCLE_BOUND.with(Cell::get) {
        return Ok(());
    }

    for event in ["pagehide", "beforeunload"] {
        let teardown = Closure::wrap(Box::new(|_: Event| destroy_current()) as Box<dyn FnMut(Event)>);
        window
            .add_event_listener_with_callback(event, teardown.as_ref().unchecked_ref())
            .map_err(js_error)?;
        teardown.forget();
    }

    // back/forward cache restores a page that was already torn down
    let restore = Closure::wrap(Box::new(|_: Event| init_current()) as Box<dyn FnMut(Event)>);
    window
        .add_event_listener_with_callback("pageshow", restore.as_ref().unchecked_ref())
        .map_err(js_error)?;
    restore.forget();

    LIFECYCLE_BOUND.with(|bound| bound.set(true));
    Ok(())
}
