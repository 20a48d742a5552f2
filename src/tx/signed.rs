//! Signed transactions: wire encoding, hashing and raw decoding.

use alloy::primitives::{keccak256, Address, Signature, B256, U256};

use super::transaction::{
    access_list_from_rlp, AccessListTx, DynamicFeeTx, LegacyTx, TxType, UnsignedTransaction,
};
use crate::{
    error::{AppError, Result},
    rlp::{self, RlpItem},
};

/// An unsigned transaction together with its secp256k1 signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    tx: UnsignedTransaction,
    signature: Signature,
    hash: B256,
}

impl SignedTransaction {
    /// Attach `signature` to `tx`. The signature is not checked here; see [`Self::recover_sender`].
    pub fn new(tx: UnsignedTransaction, signature: Signature) -> Self {
        let mut signed = Self { tx, signature, hash: B256::ZERO };
        signed.hash = keccak256(signed.encode());
        signed
    }

    pub fn transaction(&self) -> &UnsignedTransaction {
        &self.tx
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// keccak256 of the wire encoding.
    pub fn hash(&self) -> B256 {
        self.hash
    }

    pub fn tx_type(&self) -> TxType {
        self.tx.tx_type()
    }

    pub fn chain_id(&self) -> Option<u64> {
        self.tx.chain_id()
    }

    /// Signature `v` as it appears on the wire.
    pub fn v(&self) -> u64 {
        let parity = self.signature.v() as u64;
        match &self.tx {
            UnsignedTransaction::Legacy(LegacyTx { chain_id: Some(chain_id), .. }) => {
                // Bounded by MAX_LEGACY_CHAIN_ID at build and sign time.
                chain_id.saturating_mul(2).saturating_add(35 + parity)
            }
            UnsignedTransaction::Legacy(_) => 27 + parity,
            _ => parity,
        }
    }

    /// Canonical bytes for `eth_sendRawTransaction`.
    pub fn encode(&self) -> Vec<u8> {
        let mut fields = self.tx.body_fields();
        fields.extend([
            RlpItem::u64(self.v()),
            RlpItem::uint(self.signature.r()),
            RlpItem::uint(self.signature.s()),
        ]);

        let mut out = Vec::new();
        if let Some(type_byte) = self.tx.tx_type().type_byte() {
            out.push(type_byte);
        }
        RlpItem::list(fields).encode_into(&mut out);
        out
    }

    /// `0x`-prefixed hex of [`Self::encode`].
    pub fn encode_hex(&self) -> String {
        format!("0x{}", alloy::hex::encode(self.encode()))
    }

    /// Address that produced the signature.
    pub fn recover_sender(&self) -> Result<Address> {
        self.signature
            .recover_address_from_prehash(&self.tx.signing_hash())
            .map_err(|e| AppError::Signing(format!("Failed to recover sender: {e}")))
    }

    /// Parse a raw transaction in legacy, EIP-2930 or EIP-1559 form.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        let first = *raw
            .first()
            .ok_or_else(|| AppError::MalformedEncoding("empty transaction".into()))?;

        let signed = match first {
            0xc0..=0xff => decode_legacy(&rlp::decode(raw)?)?,
            0x01 => decode_access_list(&rlp::decode(&raw[1..])?)?,
            0x02 => decode_dynamic_fee(&rlp::decode(&raw[1..])?)?,
            other => {
                return Err(AppError::MalformedEncoding(format!(
                    "unsupported transaction type 0x{other:02x}"
                )))
            }
        };

        // Re-encoding must reproduce the input exactly.
        if signed.encode() != raw {
            return Err(AppError::MalformedEncoding("non-canonical transaction encoding".into()));
        }
        Ok(signed)
    }
}

/// Wire bytes of `signed`.
pub fn encode(signed: &SignedTransaction) -> Vec<u8> {
    signed.encode()
}

/// Decode raw transaction bytes.
pub fn decode_raw(raw: &[u8]) -> Result<SignedTransaction> {
    SignedTransaction::decode(raw)
}

fn fields<const N: usize>(item: &RlpItem, kind: &str) -> Result<[RlpItem; N]> {
    let list = item.as_list()?;
    <[RlpItem; N]>::try_from(list.to_vec()).map_err(|items| {
        AppError::MalformedEncoding(format!(
            "{kind} transaction must have {N} fields, got {}",
            items.len()
        ))
    })
}

fn signature_from(y_parity: u64, r: &RlpItem, s: &RlpItem) -> Result<Signature> {
    let y_parity = match y_parity {
        0 => false,
        1 => true,
        other => {
            return Err(AppError::MalformedEncoding(format!("invalid signature parity {other}")))
        }
    };
    let r: U256 = r.as_uint()?;
    let s: U256 = s.as_uint()?;
    Ok(Signature::new(r, s, y_parity))
}

fn decode_legacy(item: &RlpItem) -> Result<SignedTransaction> {
    let [nonce, gas_price, gas_limit, to, value, input, v, r, s] = fields::<9>(item, "legacy")?;
    let v = v.as_u64()?;

    let (chain_id, parity) = match v {
        27 | 28 => (None, v - 27),
        v if v >= 35 => (Some((v - 35) / 2), (v - 35) % 2),
        other => {
            return Err(AppError::MalformedEncoding(format!("invalid legacy signature v {other}")))
        }
    };

    let tx = UnsignedTransaction::Legacy(LegacyTx {
        chain_id,
        nonce: nonce.as_u64()?,
        gas_price: gas_price.as_u128()?,
        gas_limit: gas_limit.as_u64()?,
        to: to.as_address()?,
        value: value.as_uint()?,
        input: input.as_bytes()?.to_vec().into(),
    });
    Ok(SignedTransaction::new(tx, signature_from(parity, &r, &s)?))
}

fn decode_access_list(item: &RlpItem) -> Result<SignedTransaction> {
    let [chain_id, nonce, gas_price, gas_limit, to, value, input, access_list, y, r, s] =
        fields::<11>(item, "access-list")?;

    let tx = UnsignedTransaction::AccessList(AccessListTx {
        chain_id: chain_id.as_u64()?,
        nonce: nonce.as_u64()?,
        gas_price: gas_price.as_u128()?,
        gas_limit: gas_limit.as_u64()?,
        to: to.as_address()?,
        value: value.as_uint()?,
        input: input.as_bytes()?.to_vec().into(),
        access_list: access_list_from_rlp(&access_list)?,
    });
    Ok(SignedTransaction::new(tx, signature_from(y.as_u64()?, &r, &s)?))
}

fn decode_dynamic_fee(item: &RlpItem) -> Result<SignedTransaction> {
    let [chain_id, nonce, priority_fee, max_fee, gas_limit, to, value, input, access_list, y, r, s] =
        fields::<12>(item, "dynamic-fee")?;

    let tx = UnsignedTransaction::DynamicFee(DynamicFeeTx {
        chain_id: chain_id.as_u64()?,
        nonce: nonce.as_u64()?,
        max_priority_fee_per_gas: priority_fee.as_u128()?,
        max_fee_per_gas: max_fee.as_u128()?,
        gas_limit: gas_limit.as_u64()?,
        to: to.as_address()?,
        value: value.as_uint()?,
        input: input.as_bytes()?.to_vec().into(),
        access_list: access_list_from_rlp(&access_list)?,
    });
    Ok(SignedTransaction::new(tx, signature_from(y.as_u64()?, &r, &s)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Signed example transaction from EIP-155.
    const EIP155_RAW: &str = "f86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83";

    #[test]
    fn test_decode_eip155_reference() {
        let raw = alloy::hex::decode(EIP155_RAW).unwrap();
        let signed = decode_raw(&raw).unwrap();

        assert_eq!(signed.tx_type(), TxType::Legacy);
        assert_eq!(signed.chain_id(), Some(1));
        assert_eq!(signed.v(), 37);
        assert_eq!(signed.transaction().nonce(), 9);
        assert_eq!(encode(&signed), raw);
        assert_eq!(signed.hash(), keccak256(&raw));
        assert_eq!(
            signed.recover_sender().unwrap(),
            "0x9d8A62f656a8d1615C1294fd71e9CFb3E4855A4F".parse::<Address>().unwrap()
        );
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        assert!(matches!(decode_raw(&[0x05, 0xc0]), Err(AppError::MalformedEncoding(_))));
        assert!(matches!(decode_raw(&[]), Err(AppError::MalformedEncoding(_))));
    }

    #[test]
    fn test_decode_rejects_wrong_field_count() {
        let item = RlpItem::list(vec![RlpItem::u64(1); 8]);
        assert!(matches!(decode_raw(&item.encode()), Err(AppError::MalformedEncoding(_))));

        let mut typed = vec![0x02];
        typed.extend(RlpItem::list(vec![RlpItem::u64(1); 9]).encode());
        assert!(matches!(decode_raw(&typed), Err(AppError::MalformedEncoding(_))));
    }

    #[test]
    fn test_decode_rejects_invalid_v() {
        let mut raw = alloy::hex::decode(EIP155_RAW).unwrap();
        // v sits right before the r header (0xa0).
        let v_index = raw.len() - 67;
        assert_eq!(raw[v_index], 0x25);
        raw[v_index] = 0x1d;
        assert!(matches!(decode_raw(&raw), Err(AppError::MalformedEncoding(_))));
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut raw = alloy::hex::decode(EIP155_RAW).unwrap();
        raw.push(0x00);
        assert!(decode_raw(&raw).is_err());
    }
}
