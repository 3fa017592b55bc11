//! Raw EVM bytecode assembly for the probes.
//!
//! Everything here is pure: the same inputs always produce the same bytes.
//! Offsets and lengths are encoded as single-byte `PUSH1` immediates, which
//! caps every runtime (and the CREATE2 child init code) at 255 bytes.

use ethereum_types::{Address, H256, U256};
use sha3::{Digest, Keccak256};

use crate::error::BytecodeError;

// Opcode constants
pub const OP_CODECOPY: u8 = 0x39;
pub const OP_MSTORE: u8 = 0x52;
pub const OP_PUSH1: u8 = 0x60;
pub const OP_PUSH20: u8 = 0x73;
pub const OP_CREATE2: u8 = 0xF5;
pub const OP_RETURN: u8 = 0xF3;
pub const OP_SELFDESTRUCT: u8 = 0xFF;

/// Length of the init-code prefix emitted by [`build_init_code`].
pub const INIT_CODE_PREFIX_LEN: u8 = 0x0c;

/// Largest runtime addressable with one-byte offsets.
pub const MAX_RUNTIME_LEN: usize = 0xff;

/// `CHAINID PUSH1 0 MSTORE PUSH1 32 PUSH1 0 RETURN`
pub const CHAINID_RUNTIME: [u8; 9] = [0x46, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0xf3];

/// `PUSH0 PUSH0 MSTORE PUSH1 32 PUSH0 RETURN`
pub const PUSH0_RUNTIME: [u8; 7] = [0x5f, 0x5f, 0x52, 0x60, 0x20, 0x5f, 0xf3];

/// The 32-byte pattern MCOPY moves from word 0 to word 1.
pub const MCOPY_PATTERN: [u8; 32] = [
    0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0x00, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff,
    0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff,
];

/// `PUSH32 pattern PUSH0 MSTORE PUSH1 32 PUSH0 PUSH1 32 MCOPY PUSH1 32 PUSH1 32 RETURN`
pub fn mcopy_runtime() -> Vec<u8> {
    let mut runtime = Vec::with_capacity(46);
    runtime.push(0x7f);
    runtime.extend_from_slice(&MCOPY_PATTERN);
    runtime.extend_from_slice(&[
        0x5f, 0x52, 0x60, 0x20, 0x5f, 0x60, 0x20, 0x5e, 0x60, 0x20, 0x60, 0x20, 0xf3,
    ]);
    runtime
}

/// `PUSH1 42 PUSH0 TSTORE PUSH0 TLOAD PUSH0 MSTORE PUSH1 32 PUSH0 RETURN`
pub const TSTORE_RUNTIME: [u8; 12] = [
    0x60, 0x2a, 0x5f, 0x5d, 0x5f, 0x5c, 0x5f, 0x52, 0x60, 0x20, 0x5f, 0xf3,
];

/// Runtime of the contract the CREATE2 probe deploys: returns 42 as a word.
pub const CREATE2_CHILD_RUNTIME: [u8; 10] =
    [0x60, 0x2a, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0xf3];

/// Wraps `runtime` into init code that returns it as the contract code:
///
/// `PUSH1 len PUSH1 0x0c PUSH1 0 CODECOPY PUSH1 len PUSH1 0 RETURN <runtime>`
pub fn build_init_code(runtime: &[u8]) -> Result<Vec<u8>, BytecodeError> {
    let length = u8::try_from(runtime.len())
        .map_err(|_| BytecodeError::RuntimeTooLong(runtime.len()))?;
    let mut init = Vec::with_capacity(usize::from(INIT_CODE_PREFIX_LEN) + runtime.len());
    init.extend_from_slice(&[
        OP_PUSH1,
        length,
        OP_PUSH1,
        INIT_CODE_PREFIX_LEN,
        OP_PUSH1,
        0x00,
        OP_CODECOPY,
        OP_PUSH1,
        length,
        OP_PUSH1,
        0x00,
        OP_RETURN,
    ]);
    init.extend_from_slice(runtime);
    Ok(init)
}

/// `PUSH20 beneficiary SELFDESTRUCT`
pub fn build_selfdestruct_runtime(beneficiary: Address) -> Vec<u8> {
    let mut runtime = Vec::with_capacity(22);
    runtime.push(OP_PUSH20);
    runtime.extend_from_slice(beneficiary.as_bytes());
    runtime.push(OP_SELFDESTRUCT);
    runtime
}

/// Runtime that CREATE2-deploys `child_init` and returns the new address as
/// a 32-byte word:
///
/// ```text
/// PUSH1 len PUSH1 off PUSH1 0 CODECOPY
/// PUSHn salt PUSH1 len PUSH1 0 PUSHn value CREATE2
/// PUSH1 0 MSTORE PUSH1 32 PUSH1 0 RETURN
/// <child_init>
/// ```
///
/// Salt and value use the narrowest push that holds them; PUSH0 is avoided
/// so the probe only depends on CREATE2 itself.
pub fn build_create2_runtime(
    child_init: &[u8],
    salt: H256,
    value: U256,
) -> Result<Vec<u8>, BytecodeError> {
    if child_init.is_empty() {
        return Err(BytecodeError::EmptyChildInit);
    }
    let child_len = u8::try_from(child_init.len())
        .map_err(|_| BytecodeError::ChildInitTooLong(child_init.len()))?;

    let mut body = Vec::with_capacity(64);
    push_word(&mut body, &salt.0);
    body.extend_from_slice(&[OP_PUSH1, child_len, OP_PUSH1, 0x00]);
    push_word(&mut body, &value.to_big_endian());
    body.push(OP_CREATE2);
    body.extend_from_slice(&[
        OP_PUSH1, 0x00, OP_MSTORE, OP_PUSH1, 0x20, OP_PUSH1, 0x00, OP_RETURN,
    ]);

    // copy header (7 bytes) + body
    let offset = 7 + body.len();
    let offset_byte =
        u8::try_from(offset).map_err(|_| BytecodeError::ChildOffsetTooLarge(offset))?;

    let mut runtime = Vec::with_capacity(offset + child_init.len());
    runtime.extend_from_slice(&[
        OP_PUSH1,
        child_len,
        OP_PUSH1,
        offset_byte,
        OP_PUSH1,
        0x00,
        OP_CODECOPY,
    ]);
    runtime.extend_from_slice(&body);
    runtime.extend_from_slice(child_init);
    Ok(runtime)
}

/// Appends the shortest `PUSHn` (n >= 1) for a big-endian word.
fn push_word(code: &mut Vec<u8>, word: &[u8; 32]) {
    let first = word.iter().position(|b| *b != 0).unwrap_or(31);
    let significant = &word[first..];
    // 1..=32 significant bytes map onto PUSH1..PUSH32
    code.push(OP_PUSH1 + (significant.len() as u8 - 1));
    code.extend_from_slice(significant);
}

pub fn keccak(data: impl AsRef<[u8]>) -> H256 {
    H256::from_slice(&Keccak256::digest(data.as_ref()))
}

/// `keccak256(0xff ++ deployer ++ salt ++ keccak256(init_code))[12..]`
pub fn create2_address(deployer: Address, salt: H256, init_code_hash: H256) -> Address {
    let mut preimage = [0u8; 85];
    preimage[0] = 0xff;
    preimage[1..21].copy_from_slice(deployer.as_bytes());
    preimage[21..53].copy_from_slice(salt.as_bytes());
    preimage[53..85].copy_from_slice(init_code_hash.as_bytes());
    Address::from_slice(&keccak(preimage)[12..])
}

/// Left-pads an address to the 32-byte word MSTORE writes.
pub fn address_word(address: Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    word
}
