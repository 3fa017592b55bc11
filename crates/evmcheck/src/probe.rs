//! Probe fixtures: one deployable contract per opcode family under test.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use ethereum_types::{Address, H256, U256};

use crate::bytecode::{
    CHAINID_RUNTIME, CREATE2_CHILD_RUNTIME, MCOPY_PATTERN, PUSH0_RUNTIME, TSTORE_RUNTIME,
    build_create2_runtime, build_init_code, build_selfdestruct_runtime, mcopy_runtime,
};
use crate::error::BytecodeError;

/// Salt used by the CREATE2 probe.
pub const CREATE2_SALT: u64 = 1;

/// The checks in the order they always run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProbeId {
    ChainId,
    Create2,
    Push0,
    Mcopy,
    TransientStorage,
    SelfDestruct,
}

impl ProbeId {
    pub const ALL: [ProbeId; 6] = [
        ProbeId::ChainId,
        ProbeId::Create2,
        ProbeId::Push0,
        ProbeId::Mcopy,
        ProbeId::TransientStorage,
        ProbeId::SelfDestruct,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ProbeId::ChainId => "CHAINID",
            ProbeId::Create2 => "CREATE2",
            ProbeId::Push0 => "PUSH0",
            ProbeId::Mcopy => "MCOPY",
            ProbeId::TransientStorage => "TSTORE/TLOAD",
            ProbeId::SelfDestruct => "SELFDESTRUCT",
        }
    }

    /// Label used on the result line.
    pub fn label(self) -> &'static str {
        match self {
            ProbeId::ChainId => "CHAINID opcode",
            ProbeId::Create2 => "CREATE2 opcode",
            ProbeId::Push0 => "PUSH0 opcode",
            ProbeId::Mcopy => "MCOPY opcode",
            ProbeId::TransientStorage => "TSTORE/TLOAD opcodes",
            ProbeId::SelfDestruct => "SELFDESTRUCT (EIP-6780)",
        }
    }
}

impl fmt::Display for ProbeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProbeId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chainid" => Ok(ProbeId::ChainId),
            "create2" => Ok(ProbeId::Create2),
            "push0" => Ok(ProbeId::Push0),
            "mcopy" => Ok(ProbeId::Mcopy),
            "tstore" | "tload" | "tstore/tload" => Ok(ProbeId::TransientStorage),
            "selfdestruct" => Ok(ProbeId::SelfDestruct),
            _ => Err(format!(
                "Invalid probe '{s}'. Expected: chainid, create2, push0, mcopy, tstore or selfdestruct"
            )),
        }
    }
}

/// How a probe is driven on chain and judged afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeKind {
    /// Deploy, then `eth_call` and compare the returned bytes.
    SimpleCall,
    /// Deploy, send a transaction into the contract, then inspect its code.
    SelfDestruct,
    /// Deploy a factory, dry-run it, commit it, then inspect the child.
    Create2 {
        child_init: Bytes,
        child_runtime: Bytes,
        salt: H256,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub id: ProbeId,
    pub init_code: Bytes,
    /// `None` when the expectation is only known after deployment.
    pub expected_output: Option<Bytes>,
    pub kind: ProbeKind,
}

impl Probe {
    pub fn name(&self) -> &'static str {
        self.id.name()
    }

    pub fn label(&self) -> &'static str {
        self.id.label()
    }

    fn simple_call(id: ProbeId, runtime: &[u8], expected: Vec<u8>) -> Result<Self, BytecodeError> {
        Ok(Self {
            id,
            init_code: build_init_code(runtime)?.into(),
            expected_output: Some(expected.into()),
            kind: ProbeKind::SimpleCall,
        })
    }

    /// Builds the fixture for `id`.
    ///
    /// `chain_id` feeds the CHAINID expectation and `beneficiary` receives the
    /// SELFDESTRUCT balance; neither affects the other probes.
    pub fn build(id: ProbeId, chain_id: u64, beneficiary: Address) -> Result<Self, BytecodeError> {
        match id {
            ProbeId::ChainId => Self::simple_call(
                id,
                &CHAINID_RUNTIME,
                U256::from(chain_id).to_big_endian().to_vec(),
            ),
            ProbeId::Push0 => Self::simple_call(id, &PUSH0_RUNTIME, vec![0u8; 32]),
            ProbeId::Mcopy => Self::simple_call(id, &mcopy_runtime(), MCOPY_PATTERN.to_vec()),
            ProbeId::TransientStorage => {
                let mut expected = vec![0u8; 32];
                expected[31] = 0x2a;
                Self::simple_call(id, &TSTORE_RUNTIME, expected)
            }
            ProbeId::SelfDestruct => Ok(Self {
                id,
                init_code: build_init_code(&build_selfdestruct_runtime(beneficiary))?.into(),
                expected_output: None,
                kind: ProbeKind::SelfDestruct,
            }),
            ProbeId::Create2 => {
                let child_init = build_init_code(&CREATE2_CHILD_RUNTIME)?;
                let salt = H256::from_low_u64_be(CREATE2_SALT);
                let runtime = build_create2_runtime(&child_init, salt, U256::zero())?;
                Ok(Self {
                    id,
                    init_code: build_init_code(&runtime)?.into(),
                    expected_output: None,
                    kind: ProbeKind::Create2 {
                        child_init: child_init.into(),
                        child_runtime: Bytes::from_static(&CREATE2_CHILD_RUNTIME),
                        salt,
                    },
                })
            }
        }
    }
}

/// Builds the selected probes in canonical order, dropping duplicates.
pub fn build_probes(
    selection: &[ProbeId],
    chain_id: u64,
    beneficiary: Address,
) -> Result<Vec<Probe>, BytecodeError> {
    ProbeId::ALL
        .into_iter()
        .filter(|id| selection.contains(id))
        .map(|id| Probe::build(id, chain_id, beneficiary))
        .collect()
}
