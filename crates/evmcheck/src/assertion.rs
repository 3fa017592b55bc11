//! Pass/fail policy.
//!
//! Post-fork a check passes only when the node behaved exactly like an
//! upgraded node. Pre-fork a check never passes: the message tells apart the
//! failure a not-yet-upgraded node should produce from anything else.

use std::fmt::Display;

use crate::bytecode::address_word;
use crate::probe::{Probe, ProbeKind};
use crate::types::{
    CheckResult, ClassifiedError, ErrorClass, FollowUp, ForkContext, ProbeFailure, ProbeResult,
    TxOutcome,
};

const INVALID_OPCODE_MARKERS: [&str; 4] = [
    "invalid opcode",
    "bad instruction",
    "undefined instruction",
    "0xf5",
];

const REVERT_OR_OOG_MARKERS: [&str; 3] = [
    "execution reverted",
    "out of gas",
    "intrinsic gas too low",
];

/// Case-insensitive substring classification of a node error message.
pub fn classify(message: &str) -> ErrorClass {
    let lower = message.to_lowercase();
    if INVALID_OPCODE_MARKERS.iter().any(|m| lower.contains(m)) {
        ErrorClass::InvalidOpcode
    } else if REVERT_OR_OOG_MARKERS.iter().any(|m| lower.contains(m)) {
        ErrorClass::RevertOrOutOfGas
    } else {
        ErrorClass::Other
    }
}

/// Classifies `message` and keeps it for diagnostics.
pub fn classified(message: impl Into<String>) -> ClassifiedError {
    let message = message.into();
    ClassifiedError::new(classify(&message), message)
}

/// A failed receipt means the EVM aborted the transaction.
pub fn status_failure(what: &str) -> ClassifiedError {
    ClassifiedError::new(ErrorClass::RevertOrOutOfGas, format!("{what} tx status 0"))
}

pub fn evaluate(probe: &Probe, ctx: &ForkContext, result: &ProbeResult) -> CheckResult {
    let verdict = match result {
        Err(failure) => judge_failure(probe, ctx, failure),
        Ok(outcome) => match &probe.kind {
            ProbeKind::SimpleCall => judge_simple_call(probe, ctx, outcome),
            ProbeKind::SelfDestruct => judge_selfdestruct(probe, ctx, outcome),
            ProbeKind::Create2 { child_runtime, .. } => {
                judge_create2(probe, ctx, outcome, child_runtime)
            }
        },
    };
    match verdict {
        Ok(()) => CheckResult::pass(probe.label()),
        Err(message) => CheckResult::fail(probe.label(), message),
    }
}

/// Pre-fork message for an error. `context` is what gets reported when the
/// error does not look like a missing feature.
fn pre_fork_error(probe: &Probe, error: &ClassifiedError, context: impl Display) -> String {
    // SELFDESTRUCT exists on both sides of the fork; only code deletion tells
    // them apart, so no error is an anticipated pre-fork signature.
    if error.class.is_feature_unavailable() && !matches!(probe.kind, ProbeKind::SelfDestruct) {
        format!("expected pre-fork failure: {} ({})", error.class, probe.name())
    } else {
        format!("unexpected pre-fork failure: {context}")
    }
}

fn judge_failure(probe: &Probe, ctx: &ForkContext, failure: &ProbeFailure) -> Result<(), String> {
    if ctx.pre_fork {
        Err(pre_fork_error(probe, &failure.error, failure))
    } else {
        Err(failure.to_string())
    }
}

/// Shared handling of a failed deployment receipt.
fn judge_deploy_status(probe: &Probe, ctx: &ForkContext, outcome: &TxOutcome) -> Result<(), String> {
    if !outcome.receipt_status.is_failed() {
        return Ok(());
    }
    let error = status_failure("deploy");
    if ctx.pre_fork {
        Err(pre_fork_error(probe, &error, &error))
    } else {
        Err(error.message)
    }
}

fn compare_output(expected: &[u8], got: &[u8]) -> Result<(), String> {
    if got.len() != expected.len() {
        return Err(format!(
            "unexpected output length {} (want {})",
            got.len(),
            expected.len()
        ));
    }
    if got != expected {
        return Err(format!("output mismatch got 0x{}", hex::encode(got)));
    }
    Ok(())
}

fn judge_simple_call(probe: &Probe, ctx: &ForkContext, outcome: &TxOutcome) -> Result<(), String> {
    judge_deploy_status(probe, ctx, outcome)?;

    if let Some(error) = &outcome.call_error {
        let context = format!("call error: {error}");
        return Err(if ctx.pre_fork {
            pre_fork_error(probe, error, context)
        } else {
            context
        });
    }

    if ctx.pre_fork {
        return Err(format!(
            "unexpected pre-fork success: output 0x{}",
            hex::encode(&outcome.call_output)
        ));
    }

    let expected = probe
        .expected_output
        .as_ref()
        .ok_or_else(|| format!("no expected output defined for {}", probe.name()))?;
    compare_output(expected, &outcome.call_output)
}

fn judge_selfdestruct(probe: &Probe, ctx: &ForkContext, outcome: &TxOutcome) -> Result<(), String> {
    judge_deploy_status(probe, ctx, outcome)?;

    let FollowUp::SelfDestruct {
        tx_status,
        code_after,
    } = &outcome.follow_up
    else {
        return Err("missing selfdestruct observation".to_string());
    };

    if tx_status.is_failed() {
        let error = status_failure("selfdestruct");
        return Err(if ctx.pre_fork {
            pre_fork_error(probe, &error, &error)
        } else {
            error.message
        });
    }

    match (ctx.pre_fork, code_after.is_empty()) {
        (true, true) => Err("expected pre-fork behavior: code deleted".to_string()),
        (true, false) => Err("unexpected pre-fork behavior: code preserved".to_string()),
        (false, true) => Err("code deleted (EIP-6780 not active)".to_string()),
        (false, false) => Ok(()),
    }
}

fn judge_create2(
    probe: &Probe,
    ctx: &ForkContext,
    outcome: &TxOutcome,
    child_runtime: &[u8],
) -> Result<(), String> {
    judge_deploy_status(probe, ctx, outcome)?;

    let FollowUp::Create2 {
        predicted,
        commit_status,
        child_code,
    } = &outcome.follow_up
    else {
        return Err("missing CREATE2 observation".to_string());
    };

    if ctx.pre_fork {
        if !commit_status.is_failed() && !child_code.is_empty() {
            return Err(format!(
                "unexpected pre-fork success: CREATE2 deployed child at 0x{predicted:x}"
            ));
        }
        return Err(match &outcome.call_error {
            Some(error) => pre_fork_error(probe, error, format!("call error: {error}")),
            // Some nodes only surface the missing opcode as a failed transaction.
            None if commit_status.is_failed() => {
                let error = status_failure("create2");
                pre_fork_error(probe, &error, &error)
            }
            None => format!(
                "unexpected pre-fork success: output 0x{}",
                hex::encode(&outcome.call_output)
            ),
        });
    }

    if let Some(error) = &outcome.call_error {
        return Err(format!("call error: {error}"));
    }
    compare_output(&address_word(*predicted), &outcome.call_output)?;
    if commit_status.is_failed() {
        return Err("create2 tx status 0".to_string());
    }
    if child_code.is_empty() {
        return Err("child code is empty".to_string());
    }
    if child_code[..] != *child_runtime {
        return Err(format!(
            "child code mismatch got 0x{}",
            hex::encode(child_code)
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ReceiptStatus;
    use crate::probe::ProbeId;
    use crate::types::Stage;
    use bytes::Bytes;
    use ethereum_types::Address;

    const PRE: ForkContext = ForkContext {
        current_block: 59_999,
        fork_block: 60_000,
        pre_fork: true,
    };
    const POST: ForkContext = ForkContext {
        current_block: 60_000,
        fork_block: 60_000,
        pre_fork: false,
    };

    fn probe(id: ProbeId) -> Probe {
        Probe::build(id, 77777, Address::repeat_byte(0x11)).unwrap()
    }

    fn called(output: &[u8]) -> TxOutcome {
        TxOutcome {
            contract_address: Some(Address::repeat_byte(0x42)),
            receipt_status: ReceiptStatus::Success,
            call_output: Bytes::copy_from_slice(output),
            ..Default::default()
        }
    }

    #[test]
    fn classify_known_messages() {
        assert_eq!(classify("execution reverted: foo"), ErrorClass::RevertOrOutOfGas);
        assert_eq!(classify("invalid opcode: CREATE2"), ErrorClass::InvalidOpcode);
        assert_eq!(classify("connection refused"), ErrorClass::Other);
        assert_eq!(classify("Bad Instruction"), ErrorClass::InvalidOpcode);
        assert_eq!(
            classify("invalid opcode: opcode 0xf5 not defined"),
            ErrorClass::InvalidOpcode
        );
        assert_eq!(classify("undefined instruction 0x5f"), ErrorClass::InvalidOpcode);
        assert_eq!(classify("OUT OF GAS"), ErrorClass::RevertOrOutOfGas);
        assert_eq!(classify("intrinsic gas too low"), ErrorClass::RevertOrOutOfGas);
        assert_eq!(classify(""), ErrorClass::Other);
    }

    #[test]
    fn pre_fork_deploy_invalid_opcode_is_expected_failure() {
        let failure = ProbeFailure {
            stage: Stage::Deploy,
            error: classified("invalid opcode: PUSH0"),
        };
        let result = evaluate(&probe(ProbeId::Push0), &PRE, &Err(failure));
        assert!(!result.pass);
        assert_eq!(result.message, "expected pre-fork failure: invalid opcode (PUSH0)");
    }

    #[test]
    fn pre_fork_call_transport_error_is_unexpected_failure() {
        let failure = ProbeFailure {
            stage: Stage::Invoke,
            error: classified("eth_call timed out after 30000ms"),
        };
        let result = evaluate(&probe(ProbeId::Mcopy), &PRE, &Err(failure));
        assert!(!result.pass);
        assert_eq!(
            result.message,
            "unexpected pre-fork failure: invoke error: eth_call timed out after 30000ms"
        );
    }

    #[test]
    fn pre_fork_network_error_is_unexpected_failure() {
        let failure = ProbeFailure {
            stage: Stage::Deploy,
            error: classified("connection refused"),
        };
        let result = evaluate(&probe(ProbeId::Push0), &PRE, &Err(failure));
        assert!(!result.pass);
        assert_eq!(
            result.message,
            "unexpected pre-fork failure: deploy error: connection refused"
        );
    }

    #[test]
    fn pre_fork_success_never_passes() {
        let result = evaluate(&probe(ProbeId::Push0), &PRE, &Ok(called(&[0u8; 32])));
        assert!(!result.pass);
        assert!(result.message.starts_with("unexpected pre-fork success: output 0x00"));
    }

    #[test]
    fn pre_fork_call_revert_is_expected() {
        let outcome = TxOutcome {
            call_error: Some(classified("execution reverted")),
            ..called(&[])
        };
        let result = evaluate(&probe(ProbeId::Mcopy), &PRE, &Ok(outcome));
        assert_eq!(
            result.message,
            "expected pre-fork failure: execution reverted or out of gas (MCOPY)"
        );
    }

    #[test]
    fn post_fork_matching_output_passes() {
        let result = evaluate(&probe(ProbeId::Push0), &POST, &Ok(called(&[0u8; 32])));
        assert!(result.pass);
        assert!(result.message.is_empty());
        assert_eq!(result.label, "PUSH0 opcode");
    }

    #[test]
    fn post_fork_short_output_fails_without_panicking() {
        let result = evaluate(&probe(ProbeId::TransientStorage), &POST, &Ok(called(&[0x2a])));
        assert!(!result.pass);
        assert_eq!(result.message, "unexpected output length 1 (want 32)");
    }

    #[test]
    fn post_fork_wrong_bytes_fail() {
        let result = evaluate(&probe(ProbeId::TransientStorage), &POST, &Ok(called(&[0u8; 32])));
        assert!(!result.pass);
        assert!(result.message.starts_with("output mismatch got 0x0000"));
    }

    #[test]
    fn post_fork_deploy_status_failure() {
        let outcome = TxOutcome {
            receipt_status: ReceiptStatus::Failed,
            ..Default::default()
        };
        let result = evaluate(&probe(ProbeId::ChainId), &POST, &Ok(outcome.clone()));
        assert_eq!(result.message, "deploy tx status 0");

        let result = evaluate(&probe(ProbeId::ChainId), &PRE, &Ok(outcome));
        assert_eq!(
            result.message,
            "expected pre-fork failure: execution reverted or out of gas (CHAINID)"
        );
    }

    #[test]
    fn post_fork_call_error_is_reported() {
        let outcome = TxOutcome {
            call_error: Some(classified("invalid opcode: MCOPY")),
            ..called(&[])
        };
        let result = evaluate(&probe(ProbeId::Mcopy), &POST, &Ok(outcome));
        assert_eq!(result.message, "call error: invalid opcode: MCOPY");
    }

    fn selfdestructed(code_after: &[u8]) -> TxOutcome {
        TxOutcome {
            follow_up: FollowUp::SelfDestruct {
                tx_status: ReceiptStatus::Success,
                code_after: Bytes::copy_from_slice(code_after),
            },
            ..called(&[])
        }
    }

    #[test]
    fn selfdestruct_post_fork_code_preserved_passes() {
        let result = evaluate(&probe(ProbeId::SelfDestruct), &POST, &Ok(selfdestructed(&[0x73])));
        assert!(result.pass);
    }

    #[test]
    fn selfdestruct_post_fork_code_deleted_fails() {
        let result = evaluate(&probe(ProbeId::SelfDestruct), &POST, &Ok(selfdestructed(&[])));
        assert!(!result.pass);
        assert_eq!(result.message, "code deleted (EIP-6780 not active)");
    }

    #[test]
    fn selfdestruct_pre_fork_messages() {
        let deleted = evaluate(&probe(ProbeId::SelfDestruct), &PRE, &Ok(selfdestructed(&[])));
        assert_eq!(deleted.message, "expected pre-fork behavior: code deleted");
        let kept = evaluate(&probe(ProbeId::SelfDestruct), &PRE, &Ok(selfdestructed(&[0x73])));
        assert_eq!(kept.message, "unexpected pre-fork behavior: code preserved");
    }

    #[test]
    fn selfdestruct_pre_fork_revert_is_unexpected() {
        let failure = ProbeFailure {
            stage: Stage::Invoke,
            error: classified("out of gas"),
        };
        let result = evaluate(&probe(ProbeId::SelfDestruct), &PRE, &Err(failure));
        assert_eq!(
            result.message,
            "unexpected pre-fork failure: invoke error: out of gas"
        );
    }

    fn create2_outcome(
        call: Result<Vec<u8>, &str>,
        commit_status: ReceiptStatus,
        child_code: &[u8],
    ) -> TxOutcome {
        let predicted = Address::repeat_byte(0xc2);
        let (call_output, call_error) = match call {
            Ok(output) => (Bytes::from(output), None),
            Err(message) => (Bytes::new(), Some(classified(message))),
        };
        TxOutcome {
            contract_address: Some(Address::repeat_byte(0x42)),
            receipt_status: ReceiptStatus::Success,
            call_output,
            call_error,
            follow_up: FollowUp::Create2 {
                predicted,
                commit_status,
                child_code: Bytes::copy_from_slice(child_code),
            },
        }
    }

    fn predicted_word() -> Vec<u8> {
        address_word(Address::repeat_byte(0xc2)).to_vec()
    }

    #[test]
    fn create2_post_fork_pass() {
        let outcome = create2_outcome(
            Ok(predicted_word()),
            ReceiptStatus::Success,
            &crate::bytecode::CREATE2_CHILD_RUNTIME,
        );
        assert!(evaluate(&probe(ProbeId::Create2), &POST, &Ok(outcome)).pass);
    }

    #[test]
    fn create2_post_fork_unknown_status_is_not_failure() {
        let outcome = create2_outcome(
            Ok(predicted_word()),
            ReceiptStatus::Unknown,
            &crate::bytecode::CREATE2_CHILD_RUNTIME,
        );
        assert!(evaluate(&probe(ProbeId::Create2), &POST, &Ok(outcome)).pass);
    }

    #[test]
    fn create2_post_fork_missing_child() {
        let outcome = create2_outcome(Ok(predicted_word()), ReceiptStatus::Success, &[]);
        let result = evaluate(&probe(ProbeId::Create2), &POST, &Ok(outcome));
        assert_eq!(result.message, "child code is empty");
    }

    #[test]
    fn create2_post_fork_wrong_address() {
        let outcome = create2_outcome(
            Ok(vec![0u8; 32]),
            ReceiptStatus::Success,
            &crate::bytecode::CREATE2_CHILD_RUNTIME,
        );
        let result = evaluate(&probe(ProbeId::Create2), &POST, &Ok(outcome));
        assert!(result.message.starts_with("output mismatch"));
    }

    #[test]
    fn create2_pre_fork_trap_is_expected() {
        let outcome = create2_outcome(
            Err("invalid opcode: opcode 0xf5 not defined"),
            ReceiptStatus::Failed,
            &[],
        );
        let result = evaluate(&probe(ProbeId::Create2), &PRE, &Ok(outcome));
        assert_eq!(result.message, "expected pre-fork failure: invalid opcode (CREATE2)");
    }

    #[test]
    fn create2_pre_fork_failed_commit_is_expected() {
        let outcome = create2_outcome(Ok(vec![0u8; 32]), ReceiptStatus::Failed, &[]);
        let result = evaluate(&probe(ProbeId::Create2), &PRE, &Ok(outcome));
        assert_eq!(
            result.message,
            "expected pre-fork failure: execution reverted or out of gas (CREATE2)"
        );
    }

    #[test]
    fn create2_pre_fork_deployed_child_is_unexpected() {
        let outcome = create2_outcome(
            Ok(predicted_word()),
            ReceiptStatus::Success,
            &crate::bytecode::CREATE2_CHILD_RUNTIME,
        );
        let result = evaluate(&probe(ProbeId::Create2), &PRE, &Ok(outcome));
        assert!(!result.pass);
        assert!(result
            .message
            .starts_with("unexpected pre-fork success: CREATE2 deployed child at 0xc2c2"));
    }

    #[test]
    fn create2_pre_fork_empty_child_after_clean_run_is_unexpected() {
        let outcome = create2_outcome(Ok(predicted_word()), ReceiptStatus::Success, &[]);
        let result = evaluate(&probe(ProbeId::Create2), &PRE, &Ok(outcome));
        assert!(!result.pass);
        assert_eq!(
            result.message,
            format!("unexpected pre-fork success: output 0x{}", hex::encode(predicted_word()))
        );
    }
}
