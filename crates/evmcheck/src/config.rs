use std::time::Duration;

use crate::probe::ProbeId;

pub const DEFAULT_FORK_BLOCK: u64 = 60_000;
pub const DEFAULT_DEPLOY_GAS_LIMIT: u64 = 300_000;
pub const DEFAULT_CALL_GAS_LIMIT: u64 = 300_000;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Smallest poll interval accepted; `tokio::time::interval` rejects zero.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Parameters of one conformance run.
#[derive(Debug, Clone)]
pub struct CheckConfig {
    /// Chain id used for EIP-155 signing and as the CHAINID expectation.
    pub chain_id: u64,
    pub fork_block: u64,
    pub deploy_gas_limit: u64,
    pub call_gas_limit: u64,
    /// Overall deadline for all probes together.
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub probes: Vec<ProbeId>,
}

impl CheckConfig {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            fork_block: DEFAULT_FORK_BLOCK,
            deploy_gas_limit: DEFAULT_DEPLOY_GAS_LIMIT,
            call_gas_limit: DEFAULT_CALL_GAS_LIMIT,
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            probes: ProbeId::ALL.to_vec(),
        }
    }

    pub fn with_fork_block(mut self, fork_block: u64) -> Self {
        self.fork_block = fork_block;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
        self
    }

    pub fn with_probes(mut self, probes: Vec<ProbeId>) -> Self {
        self.probes = probes;
        self
    }
}
