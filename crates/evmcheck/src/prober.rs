//! Drives one probe on chain: deploy, invoke, and observe.
//!
//! The prober collects raw observations into a [`TxOutcome`]; judging them is
//! left to [`crate::assertion`]. Every node interaction is bounded by the run
//! deadline, so a stalled chain surfaces as a [`ProbeFailure`] instead of a
//! hang.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use ethereum_types::{Address, H256, U256};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::assertion::classified;
use crate::bytecode::{create2_address, keccak};
use crate::client::{CallRequest, ChainClient, Receipt};
use crate::config::{CheckConfig, MIN_POLL_INTERVAL};
use crate::error::ClientError;
use crate::probe::{Probe, ProbeKind};
use crate::signer::{LegacyTransaction, Signer, TxKind};
use crate::types::{ClassifiedError, ErrorClass, FollowUp, ProbeFailure, ProbeResult, Stage, TxOutcome};

#[derive(Debug, Clone, Copy)]
pub struct ProbeSettings {
    pub deploy_gas_limit: u64,
    pub call_gas_limit: u64,
    pub poll_interval: Duration,
}

impl From<&CheckConfig> for ProbeSettings {
    fn from(config: &CheckConfig) -> Self {
        Self {
            deploy_gas_limit: config.deploy_gas_limit,
            call_gas_limit: config.call_gas_limit,
            poll_interval: config.poll_interval.max(MIN_POLL_INTERVAL),
        }
    }
}

pub struct Prober<'a, C: ChainClient + ?Sized> {
    client: &'a C,
    signer: &'a Signer,
    chain_id: u64,
    settings: ProbeSettings,
    deadline: Instant,
}

fn failure_at(stage: Stage) -> impl Fn(ClientError) -> ProbeFailure {
    move |err| ProbeFailure {
        stage,
        error: classified(err.node_message()),
    }
}

impl<'a, C: ChainClient + ?Sized> Prober<'a, C> {
    pub fn new(
        client: &'a C,
        signer: &'a Signer,
        chain_id: u64,
        settings: ProbeSettings,
        deadline: Instant,
    ) -> Self {
        Self {
            client,
            signer,
            chain_id,
            settings,
            deadline,
        }
    }

    /// Runs `probe` to completion or until the deadline.
    pub async fn run(&self, probe: &Probe) -> ProbeResult {
        info!(probe = probe.name(), "running probe");

        let deploy = self
            .submit(
                Stage::Deploy,
                TxKind::Create,
                probe.init_code.clone(),
                self.settings.deploy_gas_limit,
            )
            .await?;

        let mut outcome = TxOutcome {
            contract_address: deploy.contract_address,
            receipt_status: deploy.status,
            ..Default::default()
        };
        if deploy.status.is_failed() {
            warn!(probe = probe.name(), tx = %deploy.transaction_hash, "deployment reverted");
            return Ok(outcome);
        }
        let contract = deploy.contract_address.ok_or_else(|| ProbeFailure {
            stage: Stage::Deploy,
            error: ClassifiedError::new(ErrorClass::Other, "receipt has no contract address"),
        })?;
        debug!(probe = probe.name(), %contract, block = ?deploy.block_number, "contract deployed");

        match &probe.kind {
            ProbeKind::SimpleCall => self.dry_run(contract, &mut outcome).await?,
            ProbeKind::SelfDestruct => self.self_destruct(contract, &mut outcome).await?,
            ProbeKind::Create2 {
                child_init, salt, ..
            } => self.create2(contract, child_init, *salt, &mut outcome).await?,
        }
        Ok(outcome)
    }

    async fn bounded<T, F>(&self, operation: &str, fut: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        match time::timeout_at(self.deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::DeadlineExceeded {
                operation: operation.to_owned(),
            }),
        }
    }

    /// Signs and sends a transaction, then waits for a new block and its receipt.
    async fn submit(
        &self,
        stage: Stage,
        to: TxKind,
        data: Bytes,
        gas: u64,
    ) -> Result<Receipt, ProbeFailure> {
        let fail = failure_at(stage);
        let from = self.signer.address();
        let poll = self.settings.poll_interval;

        let nonce = self
            .bounded("nonce lookup", self.client.pending_nonce(from))
            .await
            .map_err(&fail)?;
        let gas_price = self
            .bounded("gas price lookup", self.client.suggest_gas_price())
            .await
            .map_err(&fail)?;

        let tx = LegacyTransaction {
            nonce,
            gas_price,
            gas,
            to,
            value: U256::zero(),
            data,
        };
        let signed = self
            .signer
            .sign_legacy(&tx, self.chain_id)
            .map_err(|err| ProbeFailure {
                stage,
                error: ClassifiedError::new(ErrorClass::Other, err.to_string()),
            })?;

        let started_at = self
            .bounded("transaction submission", self.client.send_signed_tx(&signed))
            .await
            .map_err(&fail)?;
        debug!(%stage, tx = %signed.hash, nonce, started_at, "transaction sent");

        self.bounded(
            "waiting for next block",
            self.client.wait_for_next_block(started_at, poll),
        )
        .await
        .map_err(&fail)?;
        let receipt = self
            .bounded("waiting for receipt", self.client.wait_mined(signed.hash, poll))
            .await
            .map_err(&fail)?;
        debug!(
            %stage,
            tx = %signed.hash,
            status = receipt.status.code(),
            block = ?receipt.block_number,
            "transaction mined"
        );
        Ok(receipt)
    }

    /// `eth_call` with empty calldata. Execution errors reported by the node
    /// are recorded in the outcome; transport errors abort the probe.
    async fn dry_run(&self, contract: Address, outcome: &mut TxOutcome) -> Result<(), ProbeFailure> {
        let request = CallRequest {
            from: self.signer.address(),
            to: contract,
            gas: self.settings.call_gas_limit,
            data: Bytes::new(),
        };
        match self.bounded("eth_call", self.client.call(&request)).await {
            Ok(output) => {
                debug!(%contract, output = %hex::encode(&output), "call returned");
                outcome.call_output = output;
            }
            Err(err @ ClientError::JsonRpcError { .. }) => {
                debug!(%contract, error = %err, "call failed");
                outcome.call_error = Some(classified(err.node_message()));
            }
            Err(err) => return Err(failure_at(Stage::Invoke)(err)),
        }
        Ok(())
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, ProbeFailure> {
        self.bounded("eth_getCode", self.client.code_at(address))
            .await
            .map_err(failure_at(Stage::Inspect))
    }

    async fn self_destruct(
        &self,
        contract: Address,
        outcome: &mut TxOutcome,
    ) -> Result<(), ProbeFailure> {
        let code_before = self.code_at(contract).await?;
        if code_before.is_empty() {
            return Err(ProbeFailure {
                stage: Stage::Inspect,
                error: ClassifiedError::new(ErrorClass::Other, "deployed code is empty"),
            });
        }

        let kill = self
            .submit(
                Stage::Invoke,
                TxKind::Call(contract),
                Bytes::new(),
                self.settings.call_gas_limit,
            )
            .await?;
        let code_after = self.code_at(contract).await?;
        debug!(
            %contract,
            before = code_before.len(),
            after = code_after.len(),
            "code inspected after selfdestruct"
        );

        outcome.follow_up = FollowUp::SelfDestruct {
            tx_status: kill.status,
            code_after,
        };
        Ok(())
    }

    async fn create2(
        &self,
        deployer: Address,
        child_init: &Bytes,
        salt: H256,
        outcome: &mut TxOutcome,
    ) -> Result<(), ProbeFailure> {
        let predicted = create2_address(deployer, salt, keccak(child_init));
        debug!(%deployer, %predicted, "predicted CREATE2 child address");

        self.dry_run(deployer, outcome).await?;

        let commit = self
            .submit(
                Stage::Commit,
                TxKind::Call(deployer),
                Bytes::new(),
                self.settings.deploy_gas_limit,
            )
            .await?;
        let child_code = self.code_at(predicted).await?;

        outcome.follow_up = FollowUp::Create2 {
            predicted,
            commit_status: commit.status,
            child_code,
        };
        Ok(())
    }
}
