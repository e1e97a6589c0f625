use anyhow::Result;
use stress_harness::{config, lifecycle, signals, telemetry};
use config::Config;
use lifecycle::Harness;
use signals::OsSignals;
use telemetry::init_tracing;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::load()?;
    init_tracing(&cfg.logging);

    if cfg.server.host == "0.0.0.0" {
        warn!(
            "target service binding to 0.0.0.0 - the deliberately slow endpoint \
            will be reachable from the network"
        );
    }

    info!(
        concurrency = cfg.batch.concurrency,
        delay_ms = cfg.stub.delay_ms,
        require_counter = cfg.stub.require_counter,
        "starting stress harness"
    );

    let report = Harness::new(cfg).run(OsSignals).await?;

    warn!(signal = %report.signal, confirmed = report.record.confirmed(), "shutdown complete");
    Ok(())
}
