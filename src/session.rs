//! Capture completion state machine.
//!
//! [`CaptureSession`] decides when a snapshot should be taken. It is purely
//! synchronous: callers feed it readiness signals and timer expirations and
//! act on the returned [`SessionAction`]. Timers themselves live with the
//! caller, see [`crate::orchestrator`].

use std::fmt;
use std::time::Duration;

use log::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Loading,
    BothReady,
    DelayPending,
    Fired,
}

/// What caused the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireTrigger {
    /// Both readiness signals arrived and no delay was configured.
    Ready,
    /// The post-readiness delay elapsed.
    Delay,
    /// The absolute timeout elapsed first.
    Timeout,
}

impl fmt::Display for FireTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FireTrigger::Ready => "ready",
            FireTrigger::Delay => "delay",
            FireTrigger::Timeout => "timeout",
        })
    }
}

/// Instruction returned to the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    None,
    /// Arm the one-shot delay timer.
    ScheduleDelay(Duration),
    /// Export now. Returned at most once per session.
    Fire(FireTrigger),
}

#[derive(Debug, Clone)]
pub struct CaptureSession {
    state: CaptureState,
    layout_ready: bool,
    load_complete: bool,
    load_succeeded: Option<bool>,
    fired: bool,
    delay: Duration,
}

impl CaptureSession {
    pub fn new(delay: Duration) -> Self {
        Self {
            state: CaptureState::Loading,
            layout_ready: false,
            load_complete: false,
            load_succeeded: None,
            fired: false,
            delay,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    pub fn layout_ready(&self) -> bool {
        self.layout_ready
    }

    pub fn load_complete(&self) -> bool {
        self.load_complete
    }

    /// Success flag of the first load completion, if any arrived.
    pub fn load_succeeded(&self) -> Option<bool> {
        self.load_succeeded
    }

    pub fn on_layout_ready(&mut self) -> SessionAction {
        if self.layout_ready {
            debug!("ignoring repeated layout-ready signal");
            return SessionAction::None;
        }
        self.layout_ready = true;
        debug!("layout ready");
        self.check_both_ready()
    }

    pub fn on_load_complete(&mut self, success: bool) -> SessionAction {
        if self.load_complete {
            debug!("ignoring repeated load-complete signal (success={success})");
            return SessionAction::None;
        }
        self.load_complete = true;
        self.load_succeeded = Some(success);
        if success {
            debug!("load complete");
        } else {
            warn!("load reported failure; capturing whatever was rendered");
        }
        self.check_both_ready()
    }

    pub fn on_delay_elapsed(&mut self) -> SessionAction {
        if self.state != CaptureState::DelayPending {
            debug!("delay elapsed in state {:?}; ignoring", self.state);
            return SessionAction::None;
        }
        self.fire(FireTrigger::Delay)
    }

    pub fn on_timeout_elapsed(&mut self) -> SessionAction {
        if !self.fired {
            warn!(
                "timeout elapsed before the page settled (layout_ready={}, load_complete={})",
                self.layout_ready, self.load_complete
            );
        }
        self.fire(FireTrigger::Timeout)
    }

    fn check_both_ready(&mut self) -> SessionAction {
        if self.layout_ready && self.load_complete && self.state == CaptureState::Loading {
            self.state = CaptureState::BothReady;
            debug!("both readiness signals received");
            self.try_advance()
        } else {
            SessionAction::None
        }
    }

    fn try_advance(&mut self) -> SessionAction {
        if self.state != CaptureState::BothReady {
            return SessionAction::None;
        }
        if self.delay.is_zero() {
            return self.fire(FireTrigger::Ready);
        }
        self.state = CaptureState::DelayPending;
        debug!("waiting {:?} before capture", self.delay);
        SessionAction::ScheduleDelay(self.delay)
    }

    fn fire(&mut self, trigger: FireTrigger) -> SessionAction {
        if self.fired {
            return SessionAction::None;
        }
        self.fired = true;
        self.state = CaptureState::Fired;
        info!("capturing page (trigger: {trigger})");
        SessionAction::Fire(trigger)
    }
}
