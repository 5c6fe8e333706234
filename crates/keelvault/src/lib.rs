//! Cryptographic core of a single-wallet, non-custodial EVM wallet.
//!
//! The pipeline runs mnemonic → HD key tree → address on the canonical
//! Ethereum path, keeps the seed phrase at rest only inside a
//! password-encrypted vault, and signs EIP-155 legacy transactions
//! offline. Nothing in this crate performs network I/O, and no private
//! key or mnemonic is ever retained outside the call stack of a single
//! operation; [`session::VaultSession`] is the one gateway through which
//! decrypted material flows.
//!
//! The crate is synchronous by contract. Hosts on an event loop should
//! run the CPU-bound pieces (PBKDF2, EC math) off their main thread and
//! wrap the calls in their own async primitive.

pub mod address;
pub mod config;
pub mod doctor;
pub mod errors;
pub mod fsutil;
pub mod hd;
pub mod mnemonic;
pub mod paths;
pub mod session;
pub mod signer;
pub mod store;
pub mod vault;
pub mod wallet;

pub use errors::{Result, VaultError};
