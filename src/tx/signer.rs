//! Local key signing.

use alloy::{
    primitives::{Address, Signature, B256},
    signers::{local::PrivateKeySigner, SignerSync},
};

use super::{
    signed::SignedTransaction,
    transaction::{check_legacy_chain_id, UnsignedTransaction},
};
use crate::error::{AppError, Result};

/// A secp256k1 private key able to sign transactions.
#[derive(Clone)]
pub struct Wallet {
    signer: PrivateKeySigner,
    address: Address,
}

impl Wallet {
    /// Create a wallet from a hex private key, with or without `0x`.
    pub fn from_private_key(private_key: &str) -> Result<Self> {
        let key = private_key.trim();
        let key = key.strip_prefix("0x").unwrap_or(key);

        let signer: PrivateKeySigner =
            key.parse().map_err(|e: alloy::signers::local::LocalSignerError| {
                AppError::Signing(format!("Invalid private key: {e}"))
            })?;
        let address = signer.address();

        tracing::debug!(address = %address, "Wallet loaded");

        Ok(Self { signer, address })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Deterministic (RFC 6979), low-s signature over a 32-byte digest.
    pub fn sign_hash(&self, hash: &B256) -> Result<Signature> {
        self.signer
            .sign_hash_sync(hash)
            .map_err(|e| AppError::Signing(format!("Failed to sign digest: {e}")))
    }

    /// Sign `tx` and check that the signature recovers to this wallet.
    pub fn sign_transaction(&self, tx: UnsignedTransaction) -> Result<SignedTransaction> {
        if let UnsignedTransaction::Legacy(legacy) = &tx {
            check_legacy_chain_id(legacy.chain_id)?;
        }
        let signature = self.sign_hash(&tx.signing_hash())?;
        let signed = SignedTransaction::new(tx, signature);

        let recovered = signed.recover_sender()?;
        if recovered != self.address {
            return Err(AppError::Signing(format!(
                "Signature recovers to {recovered}, expected {}",
                self.address
            )));
        }

        tracing::debug!(
            tx_hash = %signed.hash(),
            tx_type = ?signed.tx_type(),
            nonce = signed.transaction().nonce(),
            "Transaction signed"
        );
        Ok(signed)
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet").field("address", &self.address).finish()
    }
}

/// Sign `tx` with `private_key`.
pub fn sign(tx: UnsignedTransaction, private_key: &str) -> Result<SignedTransaction> {
    Wallet::from_private_key(private_key)?.sign_transaction(tx)
}

/// Address controlled by `private_key`, or `None` when the key is malformed.
pub fn private_to_address(private_key: &str) -> Option<Address> {
    Wallet::from_private_key(private_key).ok().map(|wallet| wallet.address())
}

pub fn is_private_key(private_key: &str) -> bool {
    private_to_address(private_key).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::{TransactionFields, TxType};
    use alloy::primitives::{address, U256};

    // Well-known Hardhat/Foundry development key.
    const TEST_PRIVATE_KEY: &str =
        "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const TEST_ADDRESS: Address = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");

    fn eip155_example() -> UnsignedTransaction {
        TransactionFields::new(TxType::Legacy)
            .chain_id(1)
            .nonce(9)
            .gas_price(20_000_000_000)
            .gas_limit(21_000)
            .to(address!("3535353535353535353535353535353535353535"))
            .value(U256::from(1_000_000_000_000_000_000u64))
            .build()
            .unwrap()
    }

    fn dynamic_fee_tx() -> UnsignedTransaction {
        TransactionFields::new(TxType::DynamicFee)
            .chain_id(31337)
            .nonce(0)
            .to(address!("70997970c51812dc3a010c7d01b50e0d17dc79c8"))
            .value(U256::from(10u64).pow(U256::from(17u64)))
            .gas_limit(21_000)
            .max_fee_per_gas(2_000_000_000)
            .max_priority_fee_per_gas(1_000_000_000)
            .build()
            .unwrap()
    }

    #[test]
    fn test_wallet_from_private_key_with_and_without_prefix() {
        let with_prefix = Wallet::from_private_key(TEST_PRIVATE_KEY).unwrap();
        let without_prefix = Wallet::from_private_key(&TEST_PRIVATE_KEY[2..]).unwrap();
        assert_eq!(with_prefix.address(), TEST_ADDRESS);
        assert_eq!(without_prefix.address(), TEST_ADDRESS);
    }

    #[test]
    fn test_wallet_invalid_private_key() {
        for key in ["0x1234", "0xZZZZ", "", "invalid_key"] {
            match Wallet::from_private_key(key) {
                Err(AppError::Signing(msg)) => assert!(!msg.is_empty()),
                other => panic!("expected signing error for {key:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_wallet_debug_hides_key() {
        let wallet = Wallet::from_private_key(TEST_PRIVATE_KEY).unwrap();
        let debug_str = format!("{wallet:?}");
        assert!(debug_str.contains("Wallet"));
        assert!(!debug_str.contains(&TEST_PRIVATE_KEY[2..]));
    }

    #[test]
    fn test_sign_matches_eip155_example() {
        let key = format!("0x{}", "46".repeat(32));
        let signed = sign(eip155_example(), &key).unwrap();

        assert_eq!(
            signed.encode_hex(),
            "0xf86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83"
        );
    }

    #[test]
    fn test_signing_is_deterministic() {
        let first = sign(dynamic_fee_tx(), TEST_PRIVATE_KEY).unwrap();
        let second = sign(dynamic_fee_tx(), TEST_PRIVATE_KEY).unwrap();
        assert_eq!(first.encode(), second.encode());
        assert_eq!(first.hash(), second.hash());
    }

    #[test]
    fn test_signed_dynamic_fee_round_trip() {
        let signed = sign(dynamic_fee_tx(), TEST_PRIVATE_KEY).unwrap();
        let raw = signed.encode();
        assert_eq!(raw[0], 0x02);
        assert!(signed.v() <= 1);

        let decoded = crate::tx::decode_raw(&raw).unwrap();
        assert_eq!(decoded, signed);
        assert_eq!(decoded.recover_sender().unwrap(), TEST_ADDRESS);
        assert_eq!(decoded.chain_id(), Some(31337));
    }

    #[test]
    fn test_pre_eip155_legacy_uses_27_or_28() {
        let mut tx = eip155_example();
        if let UnsignedTransaction::Legacy(legacy) = &mut tx {
            legacy.chain_id = None;
        }
        let signed = sign(tx, TEST_PRIVATE_KEY).unwrap();
        assert!(matches!(signed.v(), 27 | 28));

        let decoded = crate::tx::decode_raw(&signed.encode()).unwrap();
        assert_eq!(decoded.chain_id(), None);
        assert_eq!(decoded.recover_sender().unwrap(), TEST_ADDRESS);
    }

    #[test]
    fn test_oversized_legacy_chain_id_is_rejected_not_signed() {
        let tx = UnsignedTransaction::Legacy(crate::tx::LegacyTx {
            chain_id: Some(u64::MAX),
            nonce: 0,
            gas_price: 1,
            gas_limit: 21_000,
            to: None,
            value: U256::ZERO,
            input: Default::default(),
        });
        let err = sign(tx, TEST_PRIVATE_KEY).unwrap_err();
        assert!(matches!(err, AppError::InvalidTransactionFields(_)));
    }

    #[test]
    fn test_signature_is_low_s() {
        let half_order = U256::from_str_radix(
            "7fffffffffffffffffffffffffffffff5d576e7357a4501ddfe92f46681b20a0",
            16,
        )
        .unwrap();
        for nonce in 0..8 {
            let tx = dynamic_fee_tx().with_chain_id(1).unwrap();
            let tx = match tx {
                UnsignedTransaction::DynamicFee(mut inner) => {
                    inner.nonce = nonce;
                    UnsignedTransaction::DynamicFee(inner)
                }
                other => other,
            };
            let signed = sign(tx, TEST_PRIVATE_KEY).unwrap();
            assert!(signed.signature().s() <= half_order);
        }
    }

    #[test]
    fn test_account_helpers() {
        assert_eq!(private_to_address(TEST_PRIVATE_KEY), Some(TEST_ADDRESS));
        assert!(is_private_key(TEST_PRIVATE_KEY));
        assert!(!is_private_key("0x00"));
        assert!(!is_private_key(&format!("0x{}", "00".repeat(32))));
    }
}
