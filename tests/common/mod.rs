//! In-memory engine and page used by the integration tests.

#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use tokio::sync::mpsc;
use webcapt::engine::{
    CapturePage, EngineError, EngineSignal, LaunchPlan, LoadedPage, PageSize, RenderEngine, Size,
};
use webcapt::format::PrintKind;
use webcapt::request::CaptureRequest;
use webcapt::surface::SvgSurface;

pub const PAINT_COLOR: Rgba<u8> = Rgba([200, 30, 30, 255]);

/// Page with fixed content that records how it was exported.
pub struct ScriptedPage {
    pub content: Size,
    pub text: String,
    pub markup: String,
    pub tree: String,
    pub document: Vec<u8>,
    pub exports: AtomicUsize,
    pub viewports: Mutex<Vec<Size>>,
}

impl ScriptedPage {
    pub fn new(content: Size) -> Self {
        Self {
            content,
            text: "hi".to_string(),
            markup: "<html><body><p>hi</p></body></html>".to_string(),
            tree: "layer at (0,0) size 800x600\n".to_string(),
            document: b"%PDF-1.4\n%scripted\n".to_vec(),
            exports: AtomicUsize::new(0),
            viewports: Mutex::new(Vec::new()),
        }
    }

    pub fn export_count(&self) -> usize {
        self.exports.load(Ordering::SeqCst)
    }

    pub fn last_viewport(&self) -> Option<Size> {
        self.viewports.lock().unwrap().last().copied()
    }

    fn record(&self) {
        self.exports.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CapturePage for ScriptedPage {
    async fn content_size(&self) -> Result<Size, EngineError> {
        Ok(self.content)
    }

    async fn set_viewport(&self, size: Size) -> Result<(), EngineError> {
        self.viewports.lock().unwrap().push(size);
        Ok(())
    }

    async fn paint_vector(&self, surface: &mut SvgSurface) -> Result<(), EngineError> {
        self.record();
        let size = surface.size();
        surface.fill_rect(0, 0, size.width, size.height, "#c81e1e");
        Ok(())
    }

    async fn print_document(&self, kind: PrintKind, _page: PageSize) -> Result<Vec<u8>, EngineError> {
        self.record();
        match kind {
            PrintKind::Pdf => Ok(self.document.clone()),
            PrintKind::PostScript => Err(EngineError::Unsupported("PostScript".into())),
        }
    }

    async fn plain_text(&self) -> Result<String, EngineError> {
        self.record();
        Ok(self.text.clone())
    }

    async fn markup(&self) -> Result<String, EngineError> {
        self.record();
        Ok(self.markup.clone())
    }

    async fn structural_dump(&self) -> Result<String, EngineError> {
        self.record();
        Ok(self.tree.clone())
    }

    async fn paint_raster(&self, surface: &mut RgbaImage) -> Result<(), EngineError> {
        self.record();
        for pixel in surface.pixels_mut() {
            *pixel = PAINT_COLOR;
        }
        Ok(())
    }
}

/// Engine handing out [`ScriptedPage`]s and a pre-recorded signal sequence.
pub struct ScriptedEngine {
    pub content: Size,
    pub signals: Vec<EngineSignal>,
    /// Keep the signal stream open after the scripted signals.
    pub keep_open: bool,
    pub fail_load: bool,
    pub launches: Mutex<Vec<LaunchPlan>>,
    pub loads: AtomicUsize,
    pub shutdowns: AtomicUsize,
    held: Mutex<Option<mpsc::UnboundedSender<EngineSignal>>>,
}

impl ScriptedEngine {
    pub fn new(content: Size, signals: Vec<EngineSignal>) -> Self {
        Self {
            content,
            signals,
            keep_open: false,
            fail_load: false,
            launches: Mutex::new(Vec::new()),
            loads: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
            held: Mutex::new(None),
        }
    }

    pub fn ready(content: Size) -> Self {
        Self::new(
            content,
            vec![
                EngineSignal::LayoutReady,
                EngineSignal::LoadComplete { success: true },
            ],
        )
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RenderEngine for ScriptedEngine {
    type Page = ScriptedPage;

    async fn launch(&self, plan: &LaunchPlan) -> Result<(), EngineError> {
        self.launches.lock().unwrap().push(plan.clone());
        Ok(())
    }

    async fn load(&self, _request: &CaptureRequest) -> Result<LoadedPage<Self::Page>, EngineError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_load {
            return Err(EngineError::Message("connection refused".into()));
        }

        let (tx, signals) = mpsc::unbounded_channel();
        for signal in &self.signals {
            let _ = tx.send(*signal);
        }
        if self.keep_open {
            *self.held.lock().unwrap() = Some(tx);
        }

        Ok(LoadedPage {
            page: ScriptedPage::new(self.content),
            signals,
        })
    }

    async fn shutdown(&self) -> Result<(), EngineError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
