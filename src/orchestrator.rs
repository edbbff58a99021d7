//! Event loop deciding the single instant a capture is taken.
//!
//! [`CompletionOrchestrator::run`] multiplexes the engine's signal stream, the
//! optional post-readiness delay and the optional absolute timeout in one
//! `tokio::select!` loop, feeds them into a [`CaptureSession`], and runs the
//! [`SerializationDispatcher`] exactly once when the session fires.

use std::pin::Pin;
use std::time::Duration;

use log::debug;
use tokio::sync::mpsc;
use tokio::time::{self, Sleep};

use crate::capture::CaptureError;
use crate::dispatch::{ExportReport, SerializationDispatcher};
use crate::engine::{CapturePage, EngineSignal};
use crate::request::CaptureRequest;
use crate::session::{CaptureSession, FireTrigger, SessionAction};

/// Result of a completed capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOutcome {
    pub trigger: FireTrigger,
    /// `None` when the capture fired before the load finished.
    pub load_succeeded: Option<bool>,
    pub report: ExportReport,
}

#[derive(Debug, Clone)]
pub struct CompletionOrchestrator {
    delay: Duration,
    max_wait: Option<Duration>,
    dispatcher: SerializationDispatcher,
}

impl CompletionOrchestrator {
    pub fn new(
        delay: Duration,
        max_wait: Option<Duration>,
        dispatcher: SerializationDispatcher,
    ) -> Self {
        Self {
            delay,
            max_wait,
            dispatcher,
        }
    }

    pub fn for_request(request: &CaptureRequest) -> Self {
        Self::new(
            request.delay,
            request.max_wait,
            SerializationDispatcher::from_request(request),
        )
    }

    pub fn dispatcher(&self) -> &SerializationDispatcher {
        &self.dispatcher
    }

    /// Wait for the page to settle, then export it.
    ///
    /// The timeout is armed on entry. The delay timer is armed once both
    /// readiness signals have arrived. If the signal stream closes while no
    /// timer is pending the load is abandoned.
    pub async fn run<P>(
        &self,
        page: &P,
        signals: &mut mpsc::UnboundedReceiver<EngineSignal>,
    ) -> Result<CaptureOutcome, CaptureError>
    where
        P: CapturePage + ?Sized,
    {
        let mut session = CaptureSession::new(self.delay);
        let mut delay_timer: Option<Pin<Box<Sleep>>> = None;
        let mut timeout_timer: Option<Pin<Box<Sleep>>> =
            self.max_wait.map(|max_wait| Box::pin(time::sleep(max_wait)));
        let mut signals_open = true;

        let trigger = loop {
            let action = tokio::select! {
                biased;

                maybe_signal = signals.recv(), if signals_open => {
                    match maybe_signal {
                        Some(EngineSignal::LayoutReady) => session.on_layout_ready(),
                        Some(EngineSignal::LoadComplete { success }) => {
                            session.on_load_complete(success)
                        }
                        None => {
                            debug!("engine signal stream closed");
                            signals_open = false;
                            SessionAction::None
                        }
                    }
                }
                _ = async {
                    if let Some(timer) = delay_timer.as_mut() {
                        timer.as_mut().await;
                    }
                }, if delay_timer.is_some() => {
                    delay_timer = None;
                    session.on_delay_elapsed()
                }
                _ = async {
                    if let Some(timer) = timeout_timer.as_mut() {
                        timer.as_mut().await;
                    }
                }, if timeout_timer.is_some() => {
                    timeout_timer = None;
                    session.on_timeout_elapsed()
                }
                else => {
                    debug!(
                        "load abandoned (layout_ready={}, load_complete={})",
                        session.layout_ready(),
                        session.load_complete()
                    );
                    return Err(CaptureError::Abandoned);
                }
            };

            match action {
                SessionAction::None => {}
                SessionAction::ScheduleDelay(delay) => {
                    delay_timer = Some(Box::pin(time::sleep(delay)));
                }
                SessionAction::Fire(trigger) => break trigger,
            }
        };

        drop(delay_timer);
        drop(timeout_timer);

        let report = self.dispatcher.export(page).await?;
        Ok(CaptureOutcome {
            trigger,
            load_succeeded: session.load_succeeded(),
            report,
        })
    }
}
