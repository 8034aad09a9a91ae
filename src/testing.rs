//! In-memory collaborator doubles backing the test suite. They implement
//! the external interfaces with plain collections and record enough of
//! what happened to assert on.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::errors::{ChainError, ChainResult};
use crate::interfaces::{
    ChainStore, CheckpointControl, CommitmentTree, ParamKey, ParsedTx, TempMark, TxCodec, TxOut,
};
use crate::types::{Commitment, ObjKind, Oid, Serialnum};

/// In-memory [`ChainStore`]. The temp serial-number index is populated by
/// tests through [`MemStore::stage_temp_serialnum`], standing in for the
/// block-processing pipeline.
#[derive(Default)]
pub struct MemStore {
    pub blocks: BTreeMap<u64, Vec<u8>>,
    pub params: HashMap<(ParamKey, u8), Vec<u8>>,
    pub serialnums: HashSet<Serialnum>,
    pub temp_serialnums: HashMap<Serialnum, Vec<TempMark>>,
    pub tx_outputs: Vec<(TxOut, u64, u64)>,
    pub valid_objs: HashSet<Oid>,
    pub validate_queue: Vec<(ObjKind, Oid, Oid, u64)>,
    pub write_open: bool,
    pub commits: usize,
    pub rollbacks: usize,
    pub released: usize,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a temp-index mark for `serial`, as the ingest pipeline would
    /// when linking a candidate block or probing a transaction.
    pub fn stage_temp_serialnum(&mut self, serial: Serialnum, mark: TempMark) {
        self.temp_serialnums.entry(serial).or_default().push(mark);
    }

    /// Drops the temp-index marks a pruned block left behind.
    pub fn unstage_block_serialnums(&mut self, block: &Oid) {
        for marks in self.temp_serialnums.values_mut() {
            marks.retain(|mark| !matches!(mark, TempMark::Block(oid) if oid == block));
        }
    }
}

impl ChainStore for MemStore {
    fn blockchain_select_max(&mut self) -> ChainResult<Option<u64>> {
        Ok(self.blocks.keys().next_back().copied())
    }

    fn blockchain_select(&mut self, level: u64) -> ChainResult<Option<Vec<u8>>> {
        Ok(self.blocks.get(&level).cloned())
    }

    fn blockchain_insert(&mut self, level: u64, block_bytes: &[u8]) -> ChainResult<()> {
        self.blocks.insert(level, block_bytes.to_vec());
        Ok(())
    }

    fn parameter_select(&mut self, key: ParamKey, slot: u8) -> ChainResult<Option<Vec<u8>>> {
        Ok(self.params.get(&(key, slot)).cloned())
    }

    fn parameter_insert(&mut self, key: ParamKey, slot: u8, value: &[u8]) -> ChainResult<()> {
        self.params.insert((key, slot), value.to_vec());
        Ok(())
    }

    fn serialnum_insert(&mut self, serial: &Serialnum) -> ChainResult<()> {
        if !self.serialnums.insert(*serial) {
            return Err(ChainError::Storage("duplicate serialnum".into()));
        }
        Ok(())
    }

    fn serialnum_check(&mut self, serial: &Serialnum) -> ChainResult<bool> {
        Ok(self.serialnums.contains(serial))
    }

    fn temp_serialnum_select(
        &mut self,
        serial: &Serialnum,
        last: Option<&TempMark>,
        limit: usize,
    ) -> ChainResult<(Vec<TempMark>, bool)> {
        let marks = match self.temp_serialnums.get(serial) {
            Some(marks) => marks.as_slice(),
            None => return Ok((Vec::new(), false)),
        };
        let start = match last {
            Some(last) => marks
                .iter()
                .position(|mark| mark == last)
                .map(|pos| pos + 1)
                .unwrap_or(marks.len()),
            None => 0,
        };
        let end = (start + limit).min(marks.len());
        Ok((marks[start..end].to_vec(), end < marks.len()))
    }

    fn tx_outputs_insert(
        &mut self,
        output: &TxOut,
        param_level: u64,
        commitnum: u64,
    ) -> ChainResult<()> {
        self.tx_outputs.push((output.clone(), param_level, commitnum));
        Ok(())
    }

    fn valid_objs_insert(&mut self, oid: &Oid) -> ChainResult<()> {
        self.valid_objs.insert(*oid);
        Ok(())
    }

    fn valid_objs_delete(&mut self, oid: &Oid) -> ChainResult<()> {
        self.valid_objs.remove(oid);
        Ok(())
    }

    fn process_q_enqueue_validate(
        &mut self,
        kind: ObjKind,
        oid: &Oid,
        prior_oid: &Oid,
        level: u64,
    ) -> ChainResult<()> {
        self.validate_queue.push((kind, *oid, *prior_oid, level));
        Ok(())
    }

    fn begin_write(&mut self) -> ChainResult<()> {
        self.write_open = true;
        Ok(())
    }

    fn end_write(&mut self, commit: bool) -> ChainResult<()> {
        if self.write_open {
            if commit {
                self.commits += 1;
            } else {
                self.rollbacks += 1;
            }
            self.write_open = false;
        }
        Ok(())
    }

    fn release_mutex(&mut self) {
        self.released += 1;
    }
}

/// In-memory [`CommitmentTree`] recording commitments and root updates.
#[derive(Default)]
pub struct MemCommitments {
    pub next_commitnum: u64,
    pub commitments: Vec<(u64, Commitment)>,
    pub tree_updates: Vec<u64>,
    pub initialized: bool,
}

impl MemCommitments {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CommitmentTree for MemCommitments {
    fn init(&mut self, _store: &mut dyn ChainStore) -> ChainResult<()> {
        self.initialized = true;
        Ok(())
    }

    fn next_commitnum(&mut self, reserve: bool) -> ChainResult<u64> {
        let commitnum = self.next_commitnum;
        if reserve {
            self.next_commitnum += 1;
        }
        Ok(commitnum)
    }

    fn add_commitment(
        &mut self,
        _store: &mut dyn ChainStore,
        commitnum: u64,
        commitment: &Commitment,
    ) -> ChainResult<()> {
        self.commitments.push((commitnum, *commitment));
        Ok(())
    }

    fn update_commit_tree(
        &mut self,
        _store: &mut dyn ChainStore,
        timestamp: u64,
    ) -> ChainResult<()> {
        self.tree_updates.push(timestamp);
        Ok(())
    }
}

/// [`CheckpointControl`] double recording every request.
#[derive(Default)]
pub struct RecordingCheckpoints {
    active: AtomicBool,
    pub requests: Mutex<Vec<bool>>,
}

impl RecordingCheckpoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl CheckpointControl for RecordingCheckpoints {
    fn start_checkpointing(&self) -> ChainResult<()> {
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn start_checkpoint(&self, full: bool) {
        self.requests.lock().push(full);
    }

    fn stop_checkpointing(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    fn wait_for_full_checkpoint(&self) {}
}

/// Test codec: a record is its `u32` length prefix followed by a bincode
/// [`ParsedTx`].
pub struct FrameCodec;

impl TxCodec for FrameCodec {
    fn tx_from_wire(&self, record: &[u8]) -> ChainResult<ParsedTx> {
        if record.len() < 4 {
            return Err(ChainError::Wire("record shorter than length prefix".into()));
        }
        let mut word = [0u8; 4];
        word.copy_from_slice(&record[..4]);
        if u32::from_le_bytes(word) as usize != record.len() {
            return Err(ChainError::Wire("record length prefix mismatch".into()));
        }
        bincode::deserialize(&record[4..]).map_err(ChainError::Serialization)
    }
}

/// Encodes one transaction in the [`FrameCodec`] framing.
pub fn encode_tx_record(tx: &ParsedTx) -> Vec<u8> {
    let body = bincode::serialize(tx).expect("serializing test tx");
    let mut out = ((body.len() + 4) as u32).to_le_bytes().to_vec();
    out.extend_from_slice(&body);
    out
}

/// Concatenates transactions into a block payload.
pub fn encode_payload(txs: &[ParsedTx]) -> Vec<u8> {
    let mut out = Vec::new();
    for tx in txs {
        out.extend_from_slice(&encode_tx_record(tx));
    }
    out
}
