//! EVM upgrade conformance checker
//!
//! Deploys tiny probe contracts to a live node and checks that the opcodes
//! and semantics introduced by a protocol upgrade (CHAINID, CREATE2, PUSH0,
//! MCOPY, TSTORE/TLOAD, EIP-6780 SELFDESTRUCT) behave as an upgraded node
//! should, relative to a configured fork height.

pub mod assertion;
pub mod bytecode;
pub mod client;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod probe;
pub mod prober;
pub mod rpc_client;
pub mod signer;
pub mod types;

pub use client::ChainClient;
pub use config::CheckConfig;
pub use orchestrator::{Report, run_checks, run_checks_with};
pub use probe::ProbeId;
pub use rpc_client::EthRpcClient;
pub use signer::Signer;
pub use types::{CheckResult, ForkContext};
