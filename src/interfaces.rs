use serde::{Deserialize, Serialize};

use crate::errors::ChainResult;
use crate::types::{Commitment, ObjKind, Oid, Serialnum};

/// Keys of the persistent parameter table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamKey {
    /// 64-slot ring of block aux records, keyed by `level mod 64`.
    BlockAux,
}

/// Entry of the temp-by-serialnum index: either the block that introduced
/// the serial number, or a probe sentinel left by a validation pass of the
/// given object class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TempMark {
    Probe(ObjKind),
    Block(Oid),
}

/// One transaction output as the core needs it for indexing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub address: [u8; 32],
    pub value_enc: u64,
    pub commitment: Commitment,
}

/// Block-carried witness-set change command, staged into the committing
/// block's aux.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamChange {
    pub next_nwitnesses: Option<u16>,
    pub next_maxmal: Option<u16>,
}

/// Decoded view of one transaction record, produced by the external codec.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedTx {
    pub param_level: u64,
    pub serialnums: Vec<Serialnum>,
    pub outputs: Vec<TxOut>,
    pub param_change: Option<ParamChange>,
}

/// External transaction codec. `record` is a full payload record including
/// its `u32` length prefix.
pub trait TxCodec: Send + Sync {
    fn tx_from_wire(&self, record: &[u8]) -> ChainResult<ParsedTx>;
}

/// Persistent store connection. One implementation wraps the node's WAL
/// database; the core only sees this surface.
pub trait ChainStore: Send {
    /// Highest indelible level present, or `None` on a fresh store.
    fn blockchain_select_max(&mut self) -> ChainResult<Option<u64>>;
    fn blockchain_select(&mut self, level: u64) -> ChainResult<Option<Vec<u8>>>;
    fn blockchain_insert(&mut self, level: u64, block_bytes: &[u8]) -> ChainResult<()>;

    fn parameter_select(&mut self, key: ParamKey, slot: u8) -> ChainResult<Option<Vec<u8>>>;
    fn parameter_insert(&mut self, key: ParamKey, slot: u8, value: &[u8]) -> ChainResult<()>;

    /// Inserts into the persistent serial-number set; a duplicate is an error.
    fn serialnum_insert(&mut self, serial: &Serialnum) -> ChainResult<()>;
    fn serialnum_check(&mut self, serial: &Serialnum) -> ChainResult<bool>;

    /// Pages through the temp-by-serialnum index. Returns the marks recorded
    /// for `serial` after `last` (exclusive), at most `limit` of them, and
    /// whether another page remains.
    fn temp_serialnum_select(
        &mut self,
        serial: &Serialnum,
        last: Option<&TempMark>,
        limit: usize,
    ) -> ChainResult<(Vec<TempMark>, bool)>;

    fn tx_outputs_insert(
        &mut self,
        output: &TxOut,
        param_level: u64,
        commitnum: u64,
    ) -> ChainResult<()>;

    fn valid_objs_insert(&mut self, oid: &Oid) -> ChainResult<()>;
    fn valid_objs_delete(&mut self, oid: &Oid) -> ChainResult<()>;

    fn process_q_enqueue_validate(
        &mut self,
        kind: ObjKind,
        oid: &Oid,
        prior_oid: &Oid,
        level: u64,
    ) -> ChainResult<()>;

    /// Opens the WAL write transaction; waits out any active checkpoint.
    fn begin_write(&mut self) -> ChainResult<()>;
    fn end_write(&mut self, commit: bool) -> ChainResult<()>;
    /// Releases the store-side write mutex; must happen before a checkpoint
    /// is requested.
    fn release_mutex(&mut self);
}

/// Commitment Merkle tree maintained by an external component.
pub trait CommitmentTree: Send {
    fn init(&mut self, store: &mut dyn ChainStore) -> ChainResult<()>;
    /// Next commitment index; `reserve` consumes it.
    fn next_commitnum(&mut self, reserve: bool) -> ChainResult<u64>;
    fn add_commitment(
        &mut self,
        store: &mut dyn ChainStore,
        commitnum: u64,
        commitment: &Commitment,
    ) -> ChainResult<()>;
    /// Recomputes the tree root through the given block timestamp.
    fn update_commit_tree(&mut self, store: &mut dyn ChainStore, timestamp: u64)
        -> ChainResult<()>;
}

/// Checkpoint lifecycle of the persistent store.
pub trait CheckpointControl: Send + Sync {
    fn start_checkpointing(&self) -> ChainResult<()>;
    fn start_checkpoint(&self, full: bool);
    fn stop_checkpointing(&self);
    fn wait_for_full_checkpoint(&self);
}
