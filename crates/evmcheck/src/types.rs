//! Data passed between the prober, the assertion engine and the caller.

use std::fmt;

use bytes::Bytes;
use ethereum_types::Address;

use crate::client::ReceiptStatus;

/// Where the chain is relative to the fork height. Computed once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForkContext {
    pub current_block: u64,
    pub fork_block: u64,
    pub pre_fork: bool,
}

impl ForkContext {
    pub fn new(current_block: u64, fork_block: u64) -> Self {
        Self {
            current_block,
            fork_block,
            pre_fork: current_block < fork_block,
        }
    }
}

/// Coarse classification of a node error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    InvalidOpcode,
    RevertOrOutOfGas,
    Other,
}

impl ErrorClass {
    /// Whether this is how a node without the feature is expected to fail.
    pub fn is_feature_unavailable(self) -> bool {
        matches!(self, ErrorClass::InvalidOpcode | ErrorClass::RevertOrOutOfGas)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::InvalidOpcode => write!(f, "invalid opcode"),
            ErrorClass::RevertOrOutOfGas => write!(f, "execution reverted or out of gas"),
            ErrorClass::Other => write!(f, "unclassified error"),
        }
    }
}

/// A node or transport error together with its classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub class: ErrorClass,
    pub message: String,
}

impl ClassifiedError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Step of the probe protocol at which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Deploy,
    Invoke,
    Commit,
    Inspect,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Deploy => write!(f, "deploy"),
            Stage::Invoke => write!(f, "invoke"),
            Stage::Commit => write!(f, "commit"),
            Stage::Inspect => write!(f, "inspect"),
        }
    }
}

/// The probe could not run to the point where its outcome can be judged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeFailure {
    pub stage: Stage,
    pub error: ClassifiedError,
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.stage, self.error)
    }
}

/// Extra observations made after the main call, per probe kind.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FollowUp {
    #[default]
    None,
    SelfDestruct {
        tx_status: ReceiptStatus,
        code_after: Bytes,
    },
    Create2 {
        predicted: Address,
        commit_status: ReceiptStatus,
        child_code: Bytes,
    },
}

/// Raw observations for one probe, before any pass/fail judgement.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TxOutcome {
    pub contract_address: Option<Address>,
    /// Status of the deployment transaction.
    pub receipt_status: ReceiptStatus,
    pub call_output: Bytes,
    pub call_error: Option<ClassifiedError>,
    pub follow_up: FollowUp,
}

pub type ProbeResult = Result<TxOutcome, ProbeFailure>;

/// Final verdict for one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub label: String,
    pub pass: bool,
    /// Empty when the check passed without remarks.
    pub message: String,
}

impl CheckResult {
    pub fn pass(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            pass: true,
            message: String::new(),
        }
    }

    pub fn fail(label: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            pass: false,
            message: message.into(),
        }
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.pass, self.message.is_empty()) {
            (true, _) => write!(f, "{}: PASS", self.label),
            (false, true) => write!(f, "{}: FAIL", self.label),
            (false, false) => write!(f, "{}: FAIL ({})", self.label, self.message),
        }
    }
}
