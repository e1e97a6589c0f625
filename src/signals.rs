use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use strum::Display;
use tokio::sync::mpsc;
use tracing::info;

/// Process-termination events that end an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TerminationSignal {
    #[strum(serialize = "SIGINT")]
    Interrupt,
    #[strum(serialize = "SIGQUIT")]
    Quit,
    #[strum(serialize = "SIGTERM")]
    Terminate,
}

/// A source of termination events, consumed with a single blocking receive.
#[async_trait]
pub trait TerminationSource: Send {
    async fn recv(&mut self) -> Result<TerminationSignal>;
}

/// Subscribes to SIGINT, SIGQUIT and SIGTERM when `recv` is called.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSignals;

#[cfg(unix)]
#[async_trait]
impl TerminationSource for OsSignals {
    async fn recv(&mut self) -> Result<TerminationSignal> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut interrupt = signal(SignalKind::interrupt()).context("SIGINT handler")?;
        let mut quit = signal(SignalKind::quit()).context("SIGQUIT handler")?;
        let mut terminate = signal(SignalKind::terminate()).context("SIGTERM handler")?;
        info!("awaiting SIGINT, SIGQUIT or SIGTERM");

        let received = tokio::select! {
            _ = interrupt.recv() => TerminationSignal::Interrupt,
            _ = quit.recv() => TerminationSignal::Quit,
            _ = terminate.recv() => TerminationSignal::Terminate,
        };
        Ok(received)
    }
}

#[cfg(not(unix))]
#[async_trait]
impl TerminationSource for OsSignals {
    async fn recv(&mut self) -> Result<TerminationSignal> {
        let ctrl_c = tokio::signal::ctrl_c();
        info!("awaiting Ctrl+C");
        ctrl_c.await.context("Ctrl+C handler")?;
        Ok(TerminationSignal::Interrupt)
    }
}

/// Injected signals, for embedding the harness or driving it from tests.
#[async_trait]
impl TerminationSource for mpsc::Receiver<TerminationSignal> {
    async fn recv(&mut self) -> Result<TerminationSignal> {
        mpsc::Receiver::recv(self)
            .await
            .ok_or_else(|| anyhow!("termination channel closed"))
    }
}
