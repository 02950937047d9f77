//! Collection helpers shared by the batch crates.

pub mod identity_hash;
