//! Cooperative main-loop scheduler.
//!
//! Every pass runs the current mode's fast path. Once per slow-poll period
//! the scheduler also checks storage and capture-source presence, notifies
//! the mode of any change and redraws the affected status icons.

use super::tick::TickService;
use crate::board::{Display, Icon, IconSlot, PresenceProbe, Storage};
use crate::config::SLOW_POLL_TICKS;
use crate::diagnostics::{CaptureStats, Diagnostics, Fault};
use crate::logger::{Level, Logger};
use ufmt::uWrite;

/// Hardware presence as of the last slow-poll
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Presence {
    pub storage_ready: bool,
    pub capture_source_ready: bool,
}

/// Which presence flags changed at a slow-poll
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Changes {
    pub storage: bool,
    pub capture_source: bool,
}

impl Changes {
    pub fn any(&self) -> bool {
        self.storage || self.capture_source
    }

    fn between(previous: Option<Presence>, current: Presence) -> Self {
        match previous {
            None => Changes {
                storage: true,
                capture_source: true,
            },
            Some(prev) => Changes {
                storage: prev.storage_ready != current.storage_ready,
                capture_source: prev.capture_source_ready != current.capture_source_ready,
            },
        }
    }
}

/// Collaborators owned by the scheduler
pub struct Devices<S, P, D> {
    pub storage: S,
    pub probe: P,
    pub display: D,
}

/// What a mode gets to work with on each call
pub struct Context<'a, S, D> {
    pub storage: &'a mut S,
    pub display: &'a mut D,
    pub presence: Presence,
    pub ticks: &'a TickService,
}

/// A device mode (menu, viewfinder, recording, playback...).
///
/// `run` is the fast path, called on every loop pass; it must not block.
/// Modes are usually an enum over the device's screens so switching mode
/// is an assignment through [`Scheduler::mode_mut`].
pub trait Mode<S, D> {
    fn run(&mut self, ctx: &mut Context<'_, S, D>);

    /// Called at a slow-poll where storage or capture-source presence changed
    fn presence_changed(&mut self, _ctx: &mut Context<'_, S, D>) {}
}

/// The mode before any view is installed
impl<S, D> Mode<S, D> for () {
    fn run(&mut self, _ctx: &mut Context<'_, S, D>) {}
}

pub struct Scheduler<'t, S, P, D, M, W> {
    ticks: &'t TickService,
    devices: Devices<S, P, D>,
    mode: M,
    logger: Logger<W>,
    capture: Option<&'t dyn CaptureStats>,
    diagnostics: Diagnostics,
    presence: Presence,
    previous: Option<Presence>,
    poll_period: u8,
}

impl<'t, S, P, D, M, W> Scheduler<'t, S, P, D, M, W>
where
    S: Storage,
    P: PresenceProbe,
    D: Display,
    M: Mode<S, D>,
    W: uWrite,
{
    /// The first slow-poll runs on the first pass; nothing has been
    /// observed yet, so it reports every flag as changed.
    pub fn new(ticks: &'t TickService, devices: Devices<S, P, D>, mode: M, logger: Logger<W>) -> Self {
        Self {
            ticks,
            devices,
            mode,
            logger,
            capture: None,
            diagnostics: Diagnostics::new(),
            presence: Presence::default(),
            previous: None,
            poll_period: SLOW_POLL_TICKS,
        }
    }

    /// Report capture overruns and missed frames at each slow-poll
    pub fn with_capture_stats(mut self, capture: &'t dyn CaptureStats) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn with_poll_period(mut self, ticks: u8) -> Self {
        self.poll_period = ticks;
        self
    }

    pub fn presence(&self) -> Presence {
        self.presence
    }

    pub fn mode(&self) -> &M {
        &self.mode
    }

    pub fn mode_mut(&mut self) -> &mut M {
        &mut self.mode
    }

    /// Install a new mode, returning the previous one
    pub fn replace_mode(&mut self, mode: M) -> M {
        core::mem::replace(&mut self.mode, mode)
    }

    pub fn devices(&self) -> &Devices<S, P, D> {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut Devices<S, P, D> {
        &mut self.devices
    }

    pub fn logger(&self) -> &Logger<W> {
        &self.logger
    }

    pub fn logger_mut(&mut self) -> &mut Logger<W> {
        &mut self.logger
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// The main loop. Never returns.
    pub fn run(&mut self) -> ! {
        loop {
            self.run_once();
        }
    }

    /// One loop pass. Returns the presence changes when a slow-poll ran.
    pub fn run_once(&mut self) -> Option<Changes> {
        let mut ctx = Context {
            storage: &mut self.devices.storage,
            display: &mut self.devices.display,
            presence: self.presence,
            ticks: self.ticks,
        };
        self.mode.run(&mut ctx);

        if self.ticks.slow_poll_due() {
            Some(self.slow_poll())
        } else {
            None
        }
    }

    fn slow_poll(&mut self) -> Changes {
        self.ticks.reload_slow_poll(self.poll_period);
        let stamp = self.ticks.elapsed();

        // Mounting is latched: once mounted, storage is not checked again
        if !self.presence.storage_ready {
            match self.devices.storage.try_mount() {
                Ok(()) => self.presence.storage_ready = true,
                Err(_) => {
                    self.diagnostics.record(Fault::MountFailed);
                    let failures = self.diagnostics.count(Fault::MountFailed);
                    crate::log!(self.logger, stamp, Level::Debug, "mount failed ({})", failures);
                }
            }
        }

        self.presence.capture_source_ready = self.devices.probe.probe_presence();

        let current = self.presence;
        let changes = Changes::between(self.previous, current);
        if let Some(prev) = self.previous {
            if prev.storage_ready && !current.storage_ready {
                self.diagnostics.record(Fault::PresenceLost);
            }
            if prev.capture_source_ready && !current.capture_source_ready {
                self.diagnostics.record(Fault::PresenceLost);
            }
        }

        if changes.any() {
            let mut ctx = Context {
                storage: &mut self.devices.storage,
                display: &mut self.devices.display,
                presence: current,
                ticks: self.ticks,
            };
            self.mode.presence_changed(&mut ctx);
        }

        if changes.storage {
            self.redraw(IconSlot::Storage, current.storage_ready, stamp);
        }
        if changes.capture_source {
            self.redraw(IconSlot::CaptureSource, current.capture_source_ready, stamp);
        }
        self.previous = Some(current);

        self.check_capture(stamp);
        changes
    }

    fn redraw(&mut self, slot: IconSlot, ready: bool, stamp: u32) {
        self.devices.display.draw_icon(slot, Icon::for_slot(slot, ready));

        let name = match slot {
            IconSlot::Storage => "storage",
            IconSlot::CaptureSource => "capture source",
        };
        let state = if ready { "ready" } else { "missing" };
        crate::log!(self.logger, stamp, Level::Info, "{} {}", name, state);
    }

    fn check_capture(&mut self, stamp: u32) {
        let Some(capture) = self.capture else {
            return;
        };
        let delta = self.diagnostics.update(capture.stats());
        if delta.is_empty() {
            return;
        }
        let (overruns, missed, stats) = (delta.overruns, delta.missed_frames, self.diagnostics.last());
        crate::log!(
            self.logger,
            stamp,
            Level::Warn,
            "capture loss: overruns +{} missed +{} [{}]",
            overruns,
            missed,
            stats
        );
    }
}
