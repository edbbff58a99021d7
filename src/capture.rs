//! Top level capture flow and its error taxonomy.

use log::{debug, warn};
use thiserror::Error;

use crate::config::WebcaptConfig;
use crate::dispatch::ExportError;
use crate::engine::{EngineError, LaunchPlan, LoadedPage, RenderEngine};
use crate::orchestrator::{CaptureOutcome, CompletionOrchestrator};
use crate::request::{CaptureRequest, RequestError};

/// Every way a capture can fail. All of them end the process.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("invalid configuration: {0}")]
    Configuration(#[from] RequestError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("page load was abandoned before it could be captured")]
    Abandoned,
}

/// Runs one capture against a [`RenderEngine`].
pub struct Capturer<E: RenderEngine> {
    engine: E,
    config: WebcaptConfig,
}

impl<E: RenderEngine> Capturer<E> {
    pub fn new(engine: E, config: WebcaptConfig) -> Self {
        Self { engine, config }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn config(&self) -> &WebcaptConfig {
        &self.config
    }

    /// Launch the engine, load the request, wait for the page to settle and
    /// export it. The engine is shut down whether or not the capture worked.
    pub async fn capture(&self, request: &CaptureRequest) -> Result<CaptureOutcome, CaptureError> {
        let plan = LaunchPlan::new(&self.config, request);
        self.engine.launch(&plan).await?;

        let result = self.load_and_export(request).await;

        if let Err(err) = self.engine.shutdown().await {
            warn!("engine shutdown failed: {err}");
        }
        result
    }

    async fn load_and_export(&self, request: &CaptureRequest) -> Result<CaptureOutcome, CaptureError> {
        debug!("loading {} ({})", request.url, request.method);
        let LoadedPage { page, mut signals } = self.engine.load(request).await?;
        CompletionOrchestrator::for_request(request)
            .run(&page, &mut signals)
            .await
    }
}
