//! Seam between the capture core and the browser engine.
//!
//! The core never talks to Chromium directly. It launches a [`RenderEngine`]
//! from a [`LaunchPlan`], asks it to load a [`CaptureRequest`], and receives a
//! [`LoadedPage`]: a page handle implementing [`CapturePage`] plus the stream
//! of readiness [`EngineSignal`]s the orchestrator consumes.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use image::RgbaImage;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::WebcaptConfig;
use crate::format::PrintKind;
use crate::request::{CaptureRequest, FeatureToggles};
use crate::surface::SvgSurface;

/// Size in CSS pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Physical paper size for print documents, in inches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_in: f64,
    pub height_in: f64,
}

impl PageSize {
    /// ISO A4, 210 x 297 mm.
    pub const A4: PageSize = PageSize {
        width_in: 8.27,
        height_in: 11.69,
    };
}

/// Readiness notifications emitted by the engine while a page loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineSignal {
    /// Initial layout is available.
    LayoutReady,
    /// The main resource finished loading. `success` is informational.
    LoadComplete { success: bool },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("browser engine error: {0}")]
    Message(String),
    #[error("browser engine not initialized")]
    NotInitialized,
    #[error("browser engine feature unsupported: {0}")]
    Unsupported(String),
}

/// Everything needed to start the engine, derived from configuration and the
/// request.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchPlan {
    pub chrome_executable: Option<PathBuf>,
    pub headless: bool,
    pub sandbox: bool,
    /// Extra command line switches passed through untouched.
    pub args: Vec<String>,
    pub viewport: Size,
    pub user_data_dir: Option<PathBuf>,
    pub features: FeatureToggles,
}

impl LaunchPlan {
    pub fn new(config: &WebcaptConfig, request: &CaptureRequest) -> Self {
        LaunchPlan {
            chrome_executable: config.chrome_executable.clone(),
            headless: config.headless,
            sandbox: config.sandbox,
            args: config.chrome_args.clone(),
            viewport: Size::new(request.min_width, request.default_height),
            user_data_dir: config.user_data_dir.clone(),
            features: request.features.clone(),
        }
    }
}

/// Operations the dispatcher needs from a loaded page.
#[async_trait]
pub trait CapturePage: Send + Sync {
    /// Size of the laid out document, including content outside the viewport.
    async fn content_size(&self) -> Result<Size, EngineError>;

    async fn set_viewport(&self, size: Size) -> Result<(), EngineError>;

    /// Paint the current viewport onto a vector surface.
    async fn paint_vector(&self, surface: &mut SvgSurface) -> Result<(), EngineError>;

    /// Print the document, paginated to `page`.
    async fn print_document(&self, kind: PrintKind, page: PageSize) -> Result<Vec<u8>, EngineError>;

    /// Visible text of the main frame.
    async fn plain_text(&self) -> Result<String, EngineError>;

    /// Serialized markup of the main frame.
    async fn markup(&self) -> Result<String, EngineError>;

    /// Indented dump of the layout tree.
    async fn structural_dump(&self) -> Result<String, EngineError>;

    /// Paint the current viewport onto a raster surface. The surface is
    /// already sized to the viewport.
    async fn paint_raster(&self, surface: &mut RgbaImage) -> Result<(), EngineError>;
}

/// A page whose load has been started, together with its signal stream.
pub struct LoadedPage<P> {
    pub page: P,
    pub signals: mpsc::UnboundedReceiver<EngineSignal>,
}

impl<P> fmt::Debug for LoadedPage<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedPage").finish_non_exhaustive()
    }
}

/// Adapter that owns the browser process.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    type Page: CapturePage + 'static;

    async fn launch(&self, plan: &LaunchPlan) -> Result<(), EngineError>;

    /// Start loading the request's resource. Returns once the navigation has
    /// been issued; completion is reported through the signal stream.
    async fn load(&self, request: &CaptureRequest) -> Result<LoadedPage<Self::Page>, EngineError>;

    async fn shutdown(&self) -> Result<(), EngineError> {
        Err(EngineError::Unsupported(
            "engine shutdown not implemented".to_string(),
        ))
    }
}
