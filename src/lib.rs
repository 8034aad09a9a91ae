//! Core of a witness-signed blockchain node: candidate blocks are chained
//! in memory, promoted to indelible by a confirmation-signature rule, and
//! durably committed through external storage and commitment-tree
//! collaborators.
//!
//! The `types` module holds the block object and its aux side-car, `chain`
//! the [`chain::BlockChain`] context driving confirmations, indelible
//! commits, and serial-number conflict checks, and `genesis` the bootstrap
//! and restart paths. Fork-choice arithmetic lives in `score`; everything
//! the core consumes from the rest of the node is declared in `interfaces`.
//!
//! Applications construct a [`chain::BlockChain`] with their codec and
//! checkpoint handles, call [`chain::BlockChain::init`] with a store and
//! commitment tree, and feed validated blocks through
//! [`chain::BlockChain::attach_block`] and
//! [`chain::BlockChain::do_confirmations`].

pub mod arena;
pub mod chain;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod genesis;
pub mod interfaces;
pub mod score;
pub mod testing;
pub mod types;

pub use chain::{BlockChain, SerialnumStatus};
pub use config::ChainConfig;
pub use errors::{ChainError, ChainResult};
