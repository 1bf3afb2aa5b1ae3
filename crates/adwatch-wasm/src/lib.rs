//! Adwatch WASM - Browser bindings for ad watch tracking
//!
//! Wraps the core tracker around a JavaScript player object and a send
//! function, so any player (a `<video>` element, an iframe API) can be
//! instrumented from the page:
//!
//! ```javascript
//! import init, { AdwatchTracker } from '@adwatch/wasm';
//!
//! await init();
//! const tracker = new AdwatchTracker(playerAdapter, (name, props) => {
//!     gtag('event', name, props);
//! }, { video_id: 'spring-ad' });
//!
//! video.addEventListener('play', () => tracker.reportPlay(video.currentTime));
//! setInterval(() => tracker.tick(), tracker.pollIntervalMs());
//! ```

use wasm_bindgen::prelude::*;

mod tracker;

pub use tracker::{AdwatchTracker, PlayerHandle};

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    web_sys::console::log_1(&"[Adwatch WASM] Initialized".into());
}

/// Library version
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
