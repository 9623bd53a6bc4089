//! Cross-platform logging module.
//!
//! The `log_*!` macros format their arguments once and hand them to the
//! platform backend together with the calling module:
//! - Web: `web_sys::console`, prefixed with the module path
//! - Native: `tracing`, with the module recorded as a field

#[cfg(target_arch = "wasm32")]
fn console_line(module: &str, msg: &str) -> wasm_bindgen::JsValue {
    format!("[{}] {}", module, msg).into()
}

#[cfg(target_arch = "wasm32")]
pub fn log_info_impl(module: &str, msg: &str) {
    web_sys::console::log_1(&console_line(module, msg));
}

#[cfg(not(target_arch = "wasm32"))]
pub fn log_info_impl(module: &str, msg: &str) {
    tracing::info!(module, "{}", msg);
}

#[cfg(target_arch = "wasm32")]
pub fn log_error_impl(module: &str, msg: &str) {
    web_sys::console::error_1(&console_line(module, msg));
}

#[cfg(not(target_arch = "wasm32"))]
pub fn log_error_impl(module: &str, msg: &str) {
    tracing::error!(module, "{}", msg);
}

#[cfg(target_arch = "wasm32")]
pub fn log_warn_impl(module: &str, msg: &str) {
    web_sys::console::warn_1(&console_line(module, msg));
}

#[cfg(not(target_arch = "wasm32"))]
pub fn log_warn_impl(module: &str, msg: &str) {
    tracing::warn!(module, "{}", msg);
}

#[cfg(target_arch = "wasm32")]
pub fn log_debug_impl(module: &str, msg: &str) {
    web_sys::console::debug_1(&console_line(module, msg));
}

#[cfg(not(target_arch = "wasm32"))]
pub fn log_debug_impl(module: &str, msg: &str) {
    tracing::debug!(module, "{}", msg);
}

/// Initialize the native log subscriber.
///
/// `RUST_LOG` wins when set; otherwise the client's own modules log at debug.
#[cfg(not(target_arch = "wasm32"))]
pub fn init() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("marketdash_client=debug"));
    // A subscriber may already be installed (tests, embedding apps).
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(target_arch = "wasm32")]
pub fn init() {}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logging::log_info_impl(module_path!(), &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logging::log_error_impl(module_path!(), &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logging::log_warn_impl(module_path!(), &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logging::log_debug_impl(module_path!(), &format!($($arg)*))
    };
}
