//! Runs the selected probes in order and aggregates the verdict.

use std::fmt;
use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{info, warn};

use crate::assertion::evaluate;
use crate::client::ChainClient;
use crate::config::CheckConfig;
use crate::error::SetupError;
use crate::probe::build_probes;
use crate::prober::{ProbeSettings, Prober};
use crate::signer::Signer;
use crate::types::{CheckResult, ForkContext};

/// Stand-in deadline for timeouts past the clock's range (about 30 years).
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Aggregated outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub context: ForkContext,
    pub results: Vec<CheckResult>,
}

impl Report {
    /// True only when every check passed.
    pub fn passed(&self) -> bool {
        self.results.iter().all(|r| r.pass)
    }

    pub fn exit_code(&self) -> i32 {
        if self.passed() { 0 } else { 1 }
    }

    pub fn verdict_line(&self) -> String {
        format!(
            "EVM upgrade check: {}",
            if self.passed() { "PASS" } else { "FAIL" }
        )
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Current block: {}", self.context.current_block)?;
        writeln!(f, "Fork block: {}", self.context.fork_block)?;
        writeln!(f, "Pre-fork: {}", self.context.pre_fork)?;
        for result in &self.results {
            writeln!(f, "{result}")?;
        }
        write!(f, "{}", self.verdict_line())
    }
}

/// Runs every selected probe and returns the collected report.
pub async fn run_checks<C>(
    client: &C,
    signer: &Signer,
    config: &CheckConfig,
) -> Result<Report, SetupError>
where
    C: ChainClient + ?Sized,
{
    run_checks_with(client, signer, config, |_| {}, |_| {}).await
}

/// Like [`run_checks`], but reports the fork context once it is known and
/// each result as soon as its probe finishes.
pub async fn run_checks_with<C, FC, FR>(
    client: &C,
    signer: &Signer,
    config: &CheckConfig,
    mut on_context: FC,
    mut on_result: FR,
) -> Result<Report, SetupError>
where
    C: ChainClient + ?Sized,
    FC: FnMut(&ForkContext),
    FR: FnMut(&CheckResult),
{
    let deadline = deadline_after(config.timeout);

    let header = client
        .latest_header()
        .await
        .map_err(SetupError::LatestHeader)?;
    let context = ForkContext::new(header.number, config.fork_block);
    info!(
        current_block = context.current_block,
        fork_block = context.fork_block,
        pre_fork = context.pre_fork,
        "fork context"
    );
    on_context(&context);

    match time::timeout_at(deadline, client.chain_id()).await {
        Ok(Ok(reported)) if reported != config.chain_id => warn!(
            configured = config.chain_id,
            reported, "node reports a different chain id; signing with the configured one"
        ),
        Ok(Ok(_)) => {}
        Ok(Err(err)) => warn!(error = %err, "could not read chain id from node"),
        Err(_) => warn!("chain id lookup ran past the deadline"),
    }

    let probes = build_probes(&config.probes, config.chain_id, signer.address())?;
    let prober = Prober::new(
        client,
        signer,
        config.chain_id,
        ProbeSettings::from(config),
        deadline,
    );

    let mut results = Vec::with_capacity(probes.len());
    for probe in &probes {
        let outcome = prober.run(probe).await;
        let result = evaluate(probe, &context, &outcome);
        if result.pass {
            info!(probe = probe.name(), "check passed");
        } else {
            warn!(probe = probe.name(), reason = %result.message, "check failed");
        }
        on_result(&result);
        results.push(result);
    }

    Ok(Report { context, results })
}

/// Absolute deadline `timeout` from now. Timeouts too large to represent
/// saturate at [`FAR_FUTURE`].
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}
