//! Capture a rendered web page to a file.
//!
//! A [`CaptureRequest`](request::CaptureRequest) names the resource and the
//! output. [`Capturer`](capture::Capturer) launches a
//! [`RenderEngine`](engine::RenderEngine), loads the resource, lets the
//! [`CompletionOrchestrator`](orchestrator::CompletionOrchestrator) pick the
//! moment the page is ready, and exports it through the
//! [`SerializationDispatcher`](dispatch::SerializationDispatcher).

pub mod capture;
pub mod config;
pub mod dispatch;
pub mod dom_scripts;
pub mod engine;
pub mod format;
pub mod logging;
pub mod orchestrator;
pub mod request;
pub mod runtime;
pub mod session;
pub mod surface;

pub use capture::{CaptureError, Capturer};
pub use config::{ConfigOverrides, Verbosity, WebcaptConfig};
pub use format::{FormatCatalog, OutputFormat};
pub use orchestrator::CaptureOutcome;
pub use request::CaptureRequest;
pub use runtime::ChromiumoxideRuntime;
