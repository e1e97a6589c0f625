//! Experiment lifecycle.
//!
//! `Init → ServiceStarting → BatchRunning → AwaitingSignal → ShuttingDown →
//! Terminated`. The harness owns the outstanding counter and the shutdown
//! handle and passes them to the driver and the stub server when it builds
//! them; nothing here is process-global.

use anyhow::{Context, Result};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use strum::Display;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, error, info, warn};

use crate::accounting::OutstandingCounter;
use crate::api::{self, StubSettings};
use crate::clock::{ExperimentClock, ExperimentRecord};
use crate::config::{Config, IdentifierStrategy};
use crate::driver::{self, BatchOutcome, LoadDriver};
use crate::server::{ServerError, StubServer};
use crate::signals::{TerminationSignal, TerminationSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Phase {
    Init,
    ServiceStarting,
    BatchRunning,
    AwaitingSignal,
    ShuttingDown,
    Terminated,
}

/// Deliberate-shutdown flag plus the token that stops the stub server.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    closing: Arc<AtomicBool>,
    token: CancellationToken,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that the close about to happen is intentional.
    pub fn mark_closing(&self) {
        self.closing.store(true, Ordering::SeqCst);
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }
}

/// How closing the stub server went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Clean,
    /// Listener reported closed during a deliberate shutdown.
    ListenerClosed,
    Unexpected(String),
}

pub fn classify_close(result: Result<(), ServerError>, closing: bool) -> ShutdownOutcome {
    match result {
        Ok(()) => ShutdownOutcome::Clean,
        Err(e) if e.is_closed() && closing => ShutdownOutcome::ListenerClosed,
        Err(e) => ShutdownOutcome::Unexpected(e.to_string()),
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub record: ExperimentRecord,
    pub outcome: BatchOutcome,
    pub signal: TerminationSignal,
    pub shutdown: ShutdownOutcome,
}

pub struct Harness {
    cfg: Config,
    counter: Arc<OutstandingCounter>,
    shutdown: ShutdownHandle,
    phase: Phase,
}

impl Harness {
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            counter: Arc::new(OutstandingCounter::new()),
            shutdown: ShutdownHandle::new(),
            phase: Phase::Init,
        }
    }

    pub fn counter(&self) -> Arc<OutstandingCounter> {
        Arc::clone(&self.counter)
    }

    fn advance(&mut self, next: Phase) {
        debug!(from = %self.phase, to = %next, "lifecycle transition");
        self.phase = next;
    }

    /// Runs one experiment end to end and returns once the stub server has
    /// been closed in response to a termination signal.
    pub async fn run<S: TerminationSource>(mut self, mut signals: S) -> Result<RunReport> {
        let sends_counter = self.cfg.batch.identifier != IdentifierStrategy::None;
        if self.cfg.stub.require_counter && !sends_counter {
            warn!("stub requires a counter but the driver sends none; every request is rejected");
        }

        self.advance(Phase::ServiceStarting);
        let addr = self.cfg.server.socket_addr()?;
        let app = api::router(StubSettings::from(&self.cfg.stub));
        let server = StubServer::bind(addr, app, self.shutdown.clone())
            .await
            .context("starting target service")?;

        self.advance(Phase::BatchRunning);
        let target = self
            .cfg
            .batch
            .target_url
            .clone()
            .unwrap_or_else(|| driver::target_url_for(server.local_addr()));
        let driver = match LoadDriver::from_config(target, &self.cfg.batch, self.counter()) {
            Ok(driver) => driver,
            Err(e) => {
                self.close(server).await;
                return Err(e);
            }
        };

        let clock = ExperimentClock::start(driver.concurrency());
        let outcome = driver.run().await;
        let record = clock.stop(self.counter.value());
        record.log();
        outcome.log();

        self.advance(Phase::AwaitingSignal);
        let signal = match signals.recv().await {
            Ok(signal) => signal,
            Err(e) => {
                self.close(server).await;
                return Err(e.context("waiting for termination signal"));
            }
        };
        info!(%signal, "closing server on OS signal");

        self.advance(Phase::ShuttingDown);
        let shutdown = self.close(server).await;

        self.advance(Phase::Terminated);
        Ok(RunReport {
            record,
            outcome,
            signal,
            shutdown,
        })
    }

    async fn close(&self, server: StubServer) -> ShutdownOutcome {
        self.shutdown.mark_closing();
        let outcome = classify_close(server.close().await, self.shutdown.is_closing());
        match &outcome {
            ShutdownOutcome::Clean => debug!("target service stopped"),
            ShutdownOutcome::ListenerClosed => debug!("listener closed during shutdown"),
            ShutdownOutcome::Unexpected(e) => error!(error = %e, "unexpected server error"),
        }
        outcome
    }
}
