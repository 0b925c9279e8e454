use crate::capture::{Capture, Captured};
use crate::configurator::{RouteInstaller, RouteRequest};
use crate::decode::decode;
use crate::error::{Error, Result};
use crate::filter::is_locally_significant;
use crate::types::{Disposition, Interface, RouteCandidate, RouteTable};
use slog::{debug, error, info, warn, Logger};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListenerState {
    /// Interface not yet validated
    Idle,
    Listening,
    ShuttingDown,
    Stopped,
}

#[derive(Clone, Debug, Default)]
pub struct ListenerConfig {
    /// Log every advertisement and each decoded option
    pub verbose: bool,
    /// Log candidates dropped by the ULA filter at info instead of debug
    pub log_ignored: bool,
}

/// What became of one route candidate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Ignored(RouteCandidate),
    Unchanged(RouteCandidate),
    Installed(RouteCandidate, Disposition),
    Failed(RouteCandidate, Disposition),
}

/// Pulls captured advertisements one at a time and drives each through
/// decode, filter, route table and installer before pulling the next.
pub struct Listener<C, I> {
    config: ListenerConfig,
    interface: Interface,
    capture: Option<C>,
    installer: I,
    table: RouteTable,
    state: ListenerState,
    history: Vec<ListenerState>,
    log: Logger,
}

impl<C: Capture, I: RouteInstaller> Listener<C, I> {
    pub fn new(
        config: ListenerConfig,
        interface: Interface,
        capture: C,
        installer: I,
        log: Logger,
    ) -> Self {
        Self {
            config,
            interface,
            capture: Some(capture),
            installer,
            table: RouteTable::new(),
            state: ListenerState::Idle,
            history: vec![ListenerState::Idle],
            log,
        }
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    /// Every state entered so far, oldest first.
    pub fn history(&self) -> &[ListenerState] {
        &self.history
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    fn transition(&mut self, next: ListenerState) {
        debug!(self.log, "listener state change";
            "from" => ?self.state, "to" => ?next);
        self.state = next;
        self.history.push(next);
    }

    /// Listen until `shutdown` is set or capture fails. Either way the
    /// capture is released and the listener ends `Stopped`; the route table
    /// stays readable through [`Listener::table`].
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        let Some(mut capture) = self.capture.take() else {
            return Err(Error::CaptureReleased);
        };
        if !self.interface.is_present() {
            error!(self.log, "interface disappeared before listening";
                "interface" => self.interface.name());
            drop(capture);
            self.transition(ListenerState::Stopped);
            return Err(Error::InterfaceNotFound(self.interface.name().to_string()));
        }
        self.transition(ListenerState::Listening);
        info!(self.log, "listening for router advertisements";
            "interface" => %self.interface);

        let result = loop {
            if shutdown.load(Ordering::SeqCst) {
                info!(self.log, "shutdown requested");
                break Ok(());
            }
            match capture.next_message() {
                Ok(Some(msg)) => {
                    self.handle_message(&msg);
                }
                Ok(None) => continue,
                Err(e) => {
                    error!(self.log, "capture failed, stopping"; "error" => %e);
                    break Err(e);
                }
            }
        };

        self.transition(ListenerState::ShuttingDown);
        drop(capture);
        self.transition(ListenerState::Stopped);
        info!(self.log, "listener stopped"; "routes" => self.table.len());
        result
    }

    /// Process every route option of one captured message.
    pub fn handle_message(&mut self, msg: &Captured) -> Vec<Outcome> {
        let decoded = match decode(msg.src, &msg.payload) {
            Ok(d) => d,
            Err(e) => {
                warn!(self.log, "dropping malformed router advertisement";
                    "src" => %msg.src, "error" => %e);
                return Vec::new();
            }
        };

        if self.config.verbose {
            info!(self.log, "router advertisement";
                "src" => %msg.src,
                "routes" => decoded.candidates.len(),
                "skipped_options" => ?decoded.skipped);
        }
        for w in &decoded.warnings {
            warn!(self.log, "skipping malformed option"; "src" => %msg.src, "error" => %w);
        }

        decoded
            .candidates
            .into_iter()
            .map(|candidate| self.handle_candidate(candidate))
            .collect()
    }

    pub fn handle_candidate(&mut self, candidate: RouteCandidate) -> Outcome {
        if self.config.verbose {
            info!(self.log, "sighting"; "prefix" => %candidate.prefix,
                "router" => %candidate.router, "kind" => %candidate.kind);
        }

        if !is_locally_significant(&candidate.prefix) {
            if self.config.log_ignored {
                info!(self.log, "ignored"; "prefix" => %candidate.prefix,
                    "router" => %candidate.router, "reason" => "not a ULA prefix");
            } else {
                debug!(self.log, "ignored"; "prefix" => %candidate.prefix,
                    "router" => %candidate.router, "reason" => "not a ULA prefix");
            }
            return Outcome::Ignored(candidate);
        }

        let disposition = self.table.evaluate(candidate.key(), candidate.router);
        if !disposition.needs_action() {
            info!(self.log, "unchanged"; "prefix" => %candidate.prefix,
                "router" => %candidate.router);
            return Outcome::Unchanged(candidate);
        }

        info!(self.log, "{disposition}"; "prefix" => %candidate.prefix,
            "router" => %candidate.router, "kind" => %candidate.kind);
        let req = RouteRequest::new(&candidate, self.interface.name()).keep_tracked(&self.table);
        match self.installer.apply(&req) {
            Ok(output) => {
                info!(self.log, "route configured"; "prefix" => %req.prefix,
                    "router" => %req.router, "output" => output.stdout.trim_end());
                Outcome::Installed(candidate, disposition)
            }
            Err(e) => {
                // the table keeps the new owner; only a different router triggers another attempt
                error!(self.log, "route configuration failed"; "prefix" => %req.prefix,
                    "router" => %req.router, "error" => %e);
                Outcome::Failed(candidate, disposition)
            }
        }
    }
}
