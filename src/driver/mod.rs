//! Batch load driver.
//!
//! Fires a fixed number of request units at the target all at once, with no
//! throttling, and waits for every one of them before returning. Each unit
//! reports into the shared [`OutstandingCounter`]; failures stay local to the
//! unit and are never retried.

pub mod ids;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::Arc,
};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::accounting::OutstandingCounter;
use crate::api::COUNTER_FIELD;
use crate::config::{BatchConfig, RequestMethod};
pub use ids::{IdentifierSource, NoIdentifier, RandomIds, SequentialIds};

/// How a single request unit terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Sent, fully read, success status. The only case that decrements.
    Confirmed,
    /// Fully read but the stub answered with a non-success status.
    Rejected { status: StatusCode },
    SendFailed,
    ReadFailed,
}

/// Per-outcome tallies for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub confirmed: usize,
    pub rejected: usize,
    pub send_failed: usize,
    pub read_failed: usize,
    /// Units whose task panicked or was cancelled before reporting.
    pub aborted: usize,
}

impl BatchOutcome {
    fn record(&mut self, unit: UnitOutcome) {
        match unit {
            UnitOutcome::Confirmed => self.confirmed += 1,
            UnitOutcome::Rejected { .. } => self.rejected += 1,
            UnitOutcome::SendFailed => self.send_failed += 1,
            UnitOutcome::ReadFailed => self.read_failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.confirmed + self.rejected + self.send_failed + self.read_failed + self.aborted
    }

    pub fn unconfirmed(&self) -> usize {
        self.total() - self.confirmed
    }

    pub fn log(&self) {
        info!(
            confirmed = self.confirmed,
            rejected = self.rejected,
            send_failed = self.send_failed,
            read_failed = self.read_failed,
            aborted = self.aborted,
            "batch outcome"
        );
    }
}

pub struct LoadDriver {
    client: reqwest::Client,
    target: Arc<str>,
    concurrency: usize,
    method: RequestMethod,
    counter: Arc<OutstandingCounter>,
    ids: Arc<dyn IdentifierSource>,
}

impl LoadDriver {
    /// Driver for `batch` against `target`, with the identifier source the
    /// batch configuration names.
    pub fn from_config(
        target: impl Into<String>,
        batch: &BatchConfig,
        counter: Arc<OutstandingCounter>,
    ) -> Result<Self> {
        Ok(Self::new(
            http_client()?,
            target,
            batch.concurrency,
            batch.method,
            counter,
            ids::from_strategy(batch.identifier),
        ))
    }

    pub fn new(
        client: reqwest::Client,
        target: impl Into<String>,
        concurrency: usize,
        method: RequestMethod,
        counter: Arc<OutstandingCounter>,
        ids: Arc<dyn IdentifierSource>,
    ) -> Self {
        Self {
            client,
            target: Arc::from(target.into()),
            concurrency,
            method,
            counter,
            ids,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Launches every unit, then joins all of them. Returns only once each unit
    /// has terminated, so the counter is stable when this resolves.
    pub async fn run(&self) -> BatchOutcome {
        let mut units = JoinSet::new();
        for _ in 0..self.concurrency {
            let unit = RequestUnit {
                client: self.client.clone(),
                target: Arc::clone(&self.target),
                method: self.method,
                counter: Arc::clone(&self.counter),
                ids: Arc::clone(&self.ids),
            };
            units.spawn(unit.fire());
        }
        debug!(units = self.concurrency, target = %self.target, "batch launched");

        let mut outcome = BatchOutcome::default();
        while let Some(joined) = units.join_next().await {
            match joined {
                Ok(unit) => outcome.record(unit),
                Err(e) => {
                    warn!(error = %e, "request unit aborted");
                    outcome.aborted += 1;
                }
            }
        }
        outcome
    }
}

struct RequestUnit {
    client: reqwest::Client,
    target: Arc<str>,
    method: RequestMethod,
    counter: Arc<OutstandingCounter>,
    ids: Arc<dyn IdentifierSource>,
}

impl RequestUnit {
    async fn fire(self) -> UnitOutcome {
        let id = self.ids.next_id();
        self.counter.increment();

        let request = match self.method {
            RequestMethod::Get => {
                let request = self.client.get(&*self.target);
                match &id {
                    Some(id) => request.query(&[(COUNTER_FIELD, id)]),
                    None => request,
                }
            }
            RequestMethod::Post => {
                let form: Vec<(&str, &str)> =
                    id.iter().map(|id| (COUNTER_FIELD, id.as_str())).collect();
                self.client.post(&*self.target).form(&form)
            }
        };
        let counter = id.as_deref().unwrap_or("-");

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(counter, error = %e, "error sending request");
                return UnitOutcome::SendFailed;
            }
        };

        let status = response.status();
        if let Err(e) = response.bytes().await {
            warn!(counter, %status, error = %e, "error reading response");
            return UnitOutcome::ReadFailed;
        }

        if !status.is_success() {
            debug!(counter, %status, "request rejected");
            return UnitOutcome::Rejected { status };
        }

        self.counter.decrement();
        UnitOutcome::Confirmed
    }
}

/// Client with no request deadline: a unit waits as long as the stub holds it.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("stress-harness/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("building HTTP client")
}

/// URL for a stub bound at `addr`; wildcard addresses are reached via loopback.
pub fn target_url_for(addr: SocketAddr) -> String {
    let ip = match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    format!("http://{}/", SocketAddr::new(ip, addr.port()))
}
