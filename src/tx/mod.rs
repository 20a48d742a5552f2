//! Transaction construction, signing and raw encoding.

pub mod signed;
pub mod signer;
pub mod transaction;

pub use signed::{decode_raw, encode, SignedTransaction};
pub use signer::{is_private_key, private_to_address, sign, Wallet};
pub use transaction::{
    build, signing_hash, AccessListItem, AccessListTx, DynamicFeeTx, LegacyTx, TransactionFields,
    TxType, UnsignedTransaction,
};
