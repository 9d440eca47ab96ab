//! Value encryption for string and blob entries.
//!
//! A single [`ValueCipher`] is active per manager. Entries do not remember which key
//! sealed them: reads always use the key that is active at read time, so rotating the
//! key leaves older ciphertext undecryptable until the caller rewrites those entries.

pub mod cipher;
mod nonce;

pub use cipher::{CipherAlgorithm, SEAL_OVERHEAD, TAG_LEN, ValueCipher};
