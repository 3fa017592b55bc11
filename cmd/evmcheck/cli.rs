use std::{fmt::Display, str::FromStr, time::Duration};

use clap::Parser as ClapParser;
use evmcheck::{CheckConfig, ProbeId, config::DEFAULT_FORK_BLOCK};
use hex::FromHexError;
use secp256k1::SecretKey;
use tracing::Level;
use url::Url;

#[derive(ClapParser, Debug)]
#[command(
    name = "evmcheck",
    author,
    version,
    about = "Checks that a node has activated an EVM upgrade by deploying probe contracts",
    override_usage = "evmcheck --rpc http://HOST:8545 --pk 0xHEX --chainid 77777 [--forkblock 60000]"
)]
pub struct Options {
    #[arg(
        long = "rpc",
        value_name = "URL",
        help = "JSON-RPC endpoint of the node under test.",
        help_heading = "Node options",
        env = "EVMCHECK_RPC"
    )]
    pub rpc: Url,
    #[arg(
        long = "pk",
        value_name = "PRIVATE_KEY",
        value_parser = parse_private_key,
        help = "Private key of a funded account, hex encoded (0x prefix optional).",
        help_heading = "Node options",
        env = "EVMCHECK_PK",
        hide_env_values = true
    )]
    pub private_key: SecretKey,
    #[arg(
        long = "chainid",
        value_name = "CHAIN_ID",
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Chain id used for transaction signing and expected from CHAINID.",
        help_heading = "Node options",
        env = "EVMCHECK_CHAIN_ID"
    )]
    pub chain_id: u64,
    #[arg(
        long = "forkblock",
        default_value_t = DEFAULT_FORK_BLOCK,
        value_name = "BLOCK",
        help = "Block height at which the upgrade activates.",
        help_heading = "Check options",
        env = "EVMCHECK_FORK_BLOCK"
    )]
    pub fork_block: u64,
    #[arg(
        long = "timeout",
        default_value_t = 180,
        value_name = "SECONDS",
        help = "Deadline for the whole run, in seconds.",
        help_heading = "Check options",
        env = "EVMCHECK_TIMEOUT"
    )]
    pub timeout_secs: u64,
    #[arg(
        long = "poll-interval",
        default_value_t = 1000,
        value_name = "MILLISECONDS",
        help = "How often to poll for new blocks and receipts.",
        help_heading = "Check options",
        env = "EVMCHECK_POLL_INTERVAL"
    )]
    pub poll_interval_ms: u64,
    #[arg(
        long = "probes",
        value_name = "PROBE_LIST",
        value_delimiter = ',',
        num_args = 1..,
        help = "Comma separated subset of probes to run. Defaults to all.",
        long_help = "Possible values: chainid, create2, push0, mcopy, tstore, selfdestruct. Probes always run in that order.",
        help_heading = "Check options",
        env = "EVMCHECK_PROBES"
    )]
    pub probes: Vec<ProbeId>,
    #[arg(
        long = "log.level",
        default_value_t = Level::INFO,
        value_name = "LOG_LEVEL",
        env = "EVMCHECK_LOG_LEVEL",
        help = "The verbosity level used for logs.",
        long_help = "Possible values: info, debug, trace, warn, error",
        help_heading = "Log options"
    )]
    pub log_level: Level,
    #[arg(
        long = "log.color",
        default_value_t = LogColor::Auto,
        help = "Output logs with ANSI color codes.",
        long_help = "Possible values: auto, always, never",
        help_heading = "Log options",
        env = "EVMCHECK_LOG_COLOR"
    )]
    pub log_color: LogColor,
}

impl Options {
    pub fn check_config(&self) -> CheckConfig {
        let probes = if self.probes.is_empty() {
            ProbeId::ALL.to_vec()
        } else {
            self.probes.clone()
        };
        CheckConfig::new(self.chain_id)
            .with_fork_block(self.fork_block)
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_probes(probes)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogColor {
    #[default]
    Auto,
    Always,
    Never,
}

impl Display for LogColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogColor::Auto => write!(f, "auto"),
            LogColor::Always => write!(f, "always"),
            LogColor::Never => write!(f, "never"),
        }
    }
}

impl FromStr for LogColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(LogColor::Auto),
            "always" => Ok(LogColor::Always),
            "never" => Ok(LogColor::Never),
            _ => Err(format!(
                "Invalid log color '{s}'. Expected: auto, always, or never"
            )),
        }
    }
}

pub fn parse_private_key(s: &str) -> eyre::Result<SecretKey> {
    Ok(SecretKey::from_slice(&parse_hex(s)?)?)
}

pub fn parse_hex(s: &str) -> eyre::Result<Vec<u8>, FromHexError> {
    match s.trim().strip_prefix("0x") {
        Some(s) => hex::decode(s),
        None => hex::decode(s.trim()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    const KEY: &str = "0x4646464646464646464646464646464646464646464646464646464646464646";

    fn parse(args: &[&str]) -> Result<Options, clap::Error> {
        Options::try_parse_from(std::iter::once("evmcheck").chain(args.iter().copied()))
    }

    #[test]
    fn parses_required_flags_with_defaults() {
        let opts = parse(&["--rpc", "http://127.0.0.1:8545", "--pk", KEY, "--chainid", "77777"])
            .unwrap();
        assert_eq!(opts.rpc.as_str(), "http://127.0.0.1:8545/");
        assert_eq!(opts.chain_id, 77777);
        assert_eq!(opts.fork_block, 60_000);

        let config = opts.check_config();
        assert_eq!(config.timeout, Duration::from_secs(180));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.probes, ProbeId::ALL.to_vec());
    }

    #[test]
    fn missing_private_key_is_an_error() {
        let err = parse(&["--rpc", "http://127.0.0.1:8545", "--chainid", "1"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn zero_chain_id_is_rejected() {
        assert!(parse(&["--rpc", "http://localhost:8545", "--pk", KEY, "--chainid", "0"]).is_err());
    }

    #[test]
    fn probe_subset_is_parsed() {
        let opts = parse(&[
            "--rpc",
            "http://localhost:8545",
            "--pk",
            KEY,
            "--chainid",
            "1",
            "--probes",
            "push0,tstore",
            "--forkblock",
            "0",
        ])
        .unwrap();
        assert_eq!(opts.probes, vec![ProbeId::Push0, ProbeId::TransientStorage]);
        assert_eq!(opts.fork_block, 0);
    }

    #[test]
    fn private_key_accepts_optional_prefix() {
        let with_prefix = parse_private_key(KEY).unwrap();
        let without = parse_private_key(KEY.trim_start_matches("0x")).unwrap();
        assert_eq!(with_prefix, without);
        assert!(parse_private_key("0x1234").is_err());
        assert!(parse_private_key("not hex").is_err());
    }

    #[test]
    fn log_color_parses_case_insensitively() {
        assert_eq!("ALWAYS".parse::<LogColor>(), Ok(LogColor::Always));
        assert!("sometimes".parse::<LogColor>().is_err());
    }
}
