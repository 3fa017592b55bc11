//! Legacy transaction construction and EIP-155 signing.

use bytes::Bytes;
use ethereum_types::{Address, H256, U256};
use rlp::{Encodable, RlpStream};
use secp256k1::{Message, PublicKey, SecretKey};

use crate::bytecode::keccak;
use crate::error::SignerError;

/// Recipient of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxKind {
    Call(Address),
    #[default]
    Create,
}

impl Encodable for TxKind {
    fn rlp_append(&self, s: &mut RlpStream) {
        match self {
            TxKind::Call(address) => {
                s.append(address);
            }
            TxKind::Create => {
                s.append_empty_data();
            }
        }
    }
}

/// Unsigned type-0 transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: U256,
    pub gas: u64,
    /// The recipient of the transaction.
    /// Create transactions contain a null value in this field.
    pub to: TxKind,
    pub value: U256,
    pub data: Bytes,
}

impl LegacyTransaction {
    /// `keccak256(rlp([nonce, gasPrice, gas, to, value, data, chainId, 0, 0]))`
    pub fn signing_hash(&self, chain_id: u64) -> H256 {
        let mut stream = RlpStream::new_list(9);
        self.append_payload(&mut stream);
        stream.append(&chain_id).append(&0u64).append(&0u64);
        keccak(stream.out())
    }

    /// The six fields shared by the signing payload and the signed encoding.
    fn append_payload(&self, s: &mut RlpStream) {
        s.append(&self.nonce)
            .append(&self.gas_price)
            .append(&self.gas)
            .append(&self.to)
            .append(&self.value)
            .append(&self.data.to_vec());
    }
}

/// A transaction ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub raw: Bytes,
    pub hash: H256,
    pub nonce: u64,
}

/// Holds the operator key and the address derived from it.
#[derive(Clone)]
pub struct Signer {
    secret_key: SecretKey,
    address: Address,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl Signer {
    pub fn new(secret_key: SecretKey) -> Self {
        let public = PublicKey::from_secret_key_global(&secret_key);
        let hash = keccak(&public.serialize_uncompressed()[1..]);
        Self {
            secret_key,
            address: Address::from_slice(&hash[12..]),
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, SignerError> {
        Ok(Self::new(SecretKey::from_slice(bytes)?))
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Signs `tx` with EIP-155 replay protection for `chain_id`.
    pub fn sign_legacy(
        &self,
        tx: &LegacyTransaction,
        chain_id: u64,
    ) -> Result<SignedTransaction, SignerError> {
        let hash = tx.signing_hash(chain_id);
        let (recovery_id, signature) = secp256k1::SECP256K1
            .sign_ecdsa_recoverable(&Message::from_digest(hash.0), &self.secret_key)
            .serialize_compact();
        let recovery_id = Into::<i32>::into(recovery_id);
        let parity = u64::try_from(recovery_id).map_err(|_| SignerError::RecoveryId(recovery_id))?;

        let v = U256::from(parity) + U256::from(chain_id) * U256::from(2u64) + U256::from(35u64);
        let r = U256::from_big_endian(&signature[..32]);
        let s = U256::from_big_endian(&signature[32..64]);

        let mut stream = RlpStream::new_list(9);
        tx.append_payload(&mut stream);
        stream.append(&v).append(&r).append(&s);
        let raw = stream.out().freeze();

        Ok(SignedTransaction {
            hash: keccak(&raw),
            raw,
            nonce: tx.nonce,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    // Example transaction from EIP-155.
    fn eip155_tx() -> LegacyTransaction {
        LegacyTransaction {
            nonce: 9,
            gas_price: U256::from(20_000_000_000u64),
            gas: 21000,
            to: TxKind::Call(Address::repeat_byte(0x35)),
            value: U256::from(1_000_000_000_000_000_000u64),
            data: Bytes::new(),
        }
    }

    #[test]
    fn eip155_signing_hash() {
        assert_eq!(
            eip155_tx().signing_hash(1),
            H256::from(hex!(
                "daf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
            ))
        );
    }

    #[test]
    fn eip155_signed_transaction() {
        let signer = Signer::from_slice(&[0x46; 32]).unwrap();
        let signed = signer.sign_legacy(&eip155_tx(), 1).unwrap();
        assert_eq!(
            signed.raw.as_ref(),
            hex!(
                "f86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83"
            )
            .as_slice()
        );
        assert_eq!(signed.hash, keccak(&signed.raw));
        assert_eq!(signed.nonce, 9);
    }

    #[test]
    fn address_derivation() {
        let signer = Signer::from_slice(&[0x46; 32]).unwrap();
        assert_eq!(
            signer.address(),
            Address::from(hex!("9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f"))
        );
    }

    #[test]
    fn rejects_zero_key() {
        assert!(Signer::from_slice(&[0u8; 32]).is_err());
    }

    #[test]
    fn tx_kind_encoding() {
        assert_eq!(rlp::encode(&TxKind::Create).to_vec(), vec![0x80]);
        let call = rlp::encode(&TxKind::Call(Address::repeat_byte(0x35)));
        assert_eq!(call[0], 0x94);
        assert_eq!(&call[1..], &[0x35; 20]);
    }

    #[test]
    fn create_transaction_has_empty_recipient() {
        let signer = Signer::from_slice(&[0x46; 32]).unwrap();
        let tx = LegacyTransaction {
            nonce: 0,
            gas_price: U256::from(1),
            gas: 300_000,
            to: TxKind::Create,
            value: U256::zero(),
            data: Bytes::from_static(&[0x00]),
        };
        let signed = signer.sign_legacy(&tx, 77777).unwrap();
        // list header, nonce 0x80, gasPrice 0x01, gas 0x83 04 93 e0, to 0x80
        assert_eq!(&signed.raw[2..9], &[0x80, 0x01, 0x83, 0x04, 0x93, 0xe0, 0x80]);
    }
}
