use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{error, info, trace, warn};

use crate::arena::{BlockArena, ChainedBlock};
use crate::crypto;
use crate::errors::{ChainError, ChainResult};
use crate::interfaces::{
    ChainStore, CheckpointControl, CommitmentTree, ParamChange, ParamKey, ParsedTx, TempMark,
    TxCodec, TxOut,
};
use crate::score::{self, compute_skip, SkipScore};
use crate::types::{
    Block, BlockAux, ObjKind, Oid, PayloadTxs, Serialnum, WitnessParams, MAX_NCONFSIGS,
};

/// Slot count of the persistent aux ring; correct only while no
/// confirmation threshold can exceed it.
pub const AUX_RING_SLOTS: u64 = 64;
const _: () = assert!(MAX_NCONFSIGS as u64 <= AUX_RING_SLOTS);

/// Page size for temp serial-number index scans.
const TEMP_SERIALNUM_PAGE: usize = 100;

/// Outcome of a serial-number probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SerialnumStatus {
    /// Not found anywhere reachable.
    Clear,
    /// Found under the caller's own probe sentinel.
    ProbeConflict,
    /// Found in a delible block on the candidate chain.
    ChainConflict,
    /// Found in the persistent (indelible) set.
    IndelibleConflict,
}

impl SerialnumStatus {
    /// Stable small-integer code (0, 2, 3, 4).
    pub fn code(self) -> u8 {
        match self {
            SerialnumStatus::Clear => 0,
            SerialnumStatus::ProbeConflict => 2,
            SerialnumStatus::ChainConflict => 3,
            SerialnumStatus::IndelibleConflict => 4,
        }
    }
}

enum ConfirmStep {
    Promoted,
    NoChange,
}

/// The blockchain core context. Owns the in-memory DAG, the exclusive
/// write lock, the published indelible tip, and the process-wide fatal
/// latch; everything else is reached through the collaborator interfaces.
///
/// Two threads (block processing and witnessing) may drive confirmations
/// concurrently; all indelible-state mutation happens under `write_mutex`.
pub struct BlockChain {
    pub(crate) arena: RwLock<BlockArena>,
    pub(crate) write_mutex: Mutex<()>,
    pub(crate) last_indelible: RwLock<Option<Oid>>,
    /// Published after `last_indelible` and may momentarily lag it; readers
    /// needing the level for correctness derive it from the block instead.
    pub(crate) last_indelible_level: AtomicU64,
    /// Block promoted within the open write transaction, assigned to
    /// `last_indelible` on commit. Only touched under `write_mutex`.
    pub(crate) new_indelible: Mutex<Option<Oid>>,
    pub(crate) have_fatal_error: AtomicBool,
    pub(crate) startup_prune_level: AtomicU64,
    pub(crate) codec: Arc<dyn TxCodec>,
    pub(crate) checkpoints: Arc<dyn CheckpointControl>,
    pub(crate) witness_index: Option<u16>,
}

impl BlockChain {
    pub fn new(
        witness_index: Option<u16>,
        codec: Arc<dyn TxCodec>,
        checkpoints: Arc<dyn CheckpointControl>,
    ) -> Self {
        Self {
            arena: RwLock::new(BlockArena::new()),
            write_mutex: Mutex::new(()),
            last_indelible: RwLock::new(None),
            last_indelible_level: AtomicU64::new(0),
            new_indelible: Mutex::new(None),
            have_fatal_error: AtomicBool::new(false),
            startup_prune_level: AtomicU64::new(0),
            codec,
            checkpoints,
            witness_index,
        }
    }

    pub fn is_witness(&self) -> bool {
        self.witness_index.is_some()
    }

    pub fn have_fatal_error(&self) -> bool {
        self.have_fatal_error.load(Ordering::SeqCst)
    }

    /// Latches the process-wide fatal flag; every subsequent entry point
    /// refuses work. The process keeps running for inspection.
    pub fn set_fatal_error(&self, msg: &str) {
        self.have_fatal_error.store(true, Ordering::SeqCst);
        error!("FATAL ERROR {msg}");
    }

    pub(crate) fn fatal_err<T>(&self, msg: impl Into<String>) -> ChainResult<T> {
        let msg = msg.into();
        self.set_fatal_error(&msg);
        Err(ChainError::Fatal(msg))
    }

    pub fn last_indelible_oid(&self) -> Option<Oid> {
        *self.last_indelible.read()
    }

    /// Level of the published indelible tip. May momentarily lag
    /// [`Self::last_indelible_oid`]; derive the level from the block for
    /// any decision that depends on identity.
    pub fn last_indelible_level(&self) -> Option<u64> {
        self.last_indelible_oid()
            .map(|_| self.last_indelible_level.load(Ordering::SeqCst))
    }

    fn floor_level(&self) -> Option<u64> {
        let last = self.last_indelible_oid()?;
        self.arena
            .read()
            .get(&last)
            .map(|entry| entry.block.header().level)
    }

    pub fn startup_prune_level(&self) -> u64 {
        self.startup_prune_level.load(Ordering::SeqCst)
    }

    /// Runs `f` against one retained block, if present.
    pub fn with_block<R>(&self, oid: &Oid, f: impl FnOnce(&ChainedBlock) -> R) -> Option<R> {
        self.arena.read().get(oid).map(f)
    }

    /// Links a validated incoming block to its prior: derives the aux state
    /// (parameter carry-forward, skip, oid) and verifies the witness
    /// signature before the block may enter the chain.
    pub fn attach_block(&self, block: Block, announce_time: u64) -> ChainResult<Oid> {
        if self.have_fatal_error() {
            return Err(ChainError::Fatal("prior fatal error".into()));
        }
        let mut arena = self.arena.write();
        let prior_oid = block.header().prior_oid;
        let prior = arena
            .get(&prior_oid)
            .ok_or_else(|| ChainError::Transaction("prior block not in memory".into()))?;
        let prior_level = prior.block.header().level;
        if block.header().level != prior_level + 1 {
            return Err(ChainError::Wire(format!(
                "block level {} does not follow prior level {}",
                block.header().level,
                prior_level
            )));
        }

        let mut aux = BlockAux::new();
        block.set_or_verify_oid(&mut aux, true)?;
        aux.announce_time = announce_time;
        aux.chain_params = prior.aux.chain_params.child_params();
        aux.skip = compute_skip(
            prior.block.header().witness as u16,
            block.header().witness as u16,
            aux.chain_params.nwitnesses,
        );
        aux.witness_params = prior
            .aux
            .witness_params
            .as_ref()
            .map(|params| WitnessParams::with_keys(params.signing_keys.clone()));

        let prior_hash = prior.aux.block_hash;
        block.verify_signature(&aux, &prior_hash)?;

        trace!(
            level = block.header().level,
            witness = block.header().witness,
            skip = aux.skip,
            oid = %aux.oid,
            "attached block"
        );
        Ok(arena.insert(block, aux, Some(prior_oid)))
    }

    /// Skip score of building `top_witness`'s block on `tip`; see the score
    /// module for the encoding and tie-break rules.
    pub fn calc_skip_score(
        &self,
        tip: &Oid,
        top_witness: u16,
        genstamp: u16,
        maltest: bool,
    ) -> ChainResult<SkipScore> {
        let floor = self.floor_level();
        score::calc_skip_score(
            &mut self.arena.write(),
            tip,
            top_witness,
            floor,
            genstamp,
            maltest,
        )
    }

    /// Whether signing `top_witness` atop `tip` would repeat a witness
    /// within the sig-order bound. A guilty witness may not be signed atop.
    pub fn check_bad_sig_order(&self, tip: &Oid, top_witness: u16) -> bool {
        score::check_bad_sig_order(&self.arena.read(), tip, top_witness)
    }

    /// Promotes every ancestor of `newtip` that has collected enough
    /// confirmation signatures, committing them durably. Returns whether a
    /// new indelible block was published.
    pub fn do_confirmations(
        &self,
        store: &mut dyn ChainStore,
        commitments: &mut dyn CommitmentTree,
        newtip: &Oid,
    ) -> ChainResult<bool> {
        if self.have_fatal_error() {
            error!("do_confirmations unable to proceed due to prior fatal error");
            return Err(ChainError::Fatal("prior fatal error".into()));
        }
        trace!(tip = %newtip, "do_confirmations");

        let write_guard = self.write_mutex.lock();
        let result = self.do_confirmation_loop(store, commitments, newtip);
        if !matches!(result, Ok(true)) {
            // roll back any write transaction still open; a no-op otherwise
            let _ = store.end_write(false);
        }
        drop(write_guard);
        result
    }

    fn do_confirmation_loop(
        &self,
        store: &mut dyn ChainStore,
        commitments: &mut dyn CommitmentTree,
        newtip: &Oid,
    ) -> ChainResult<bool> {
        // a full checkpoint unless this witness node is confirming another
        // witness's block
        let fullcheckpoint = match self.witness_index {
            Some(local) => self
                .arena
                .read()
                .get(newtip)
                .map(|entry| entry.block.header().witness as u16 == local)
                .unwrap_or(true),
            None => true,
        };

        let mut have_new = false;
        loop {
            match self.do_confirm_one(store, commitments, newtip)? {
                ConfirmStep::Promoted => have_new = true,
                ConfirmStep::NoChange => break,
            }
        }
        if !have_new {
            return Ok(false);
        }

        let Some(new_oid) = self.new_indelible.lock().take() else {
            return self.fatal_err("confirmation loop finished without a pending indelible block");
        };
        if let Err(err) = store.end_write(true) {
            return self.fatal_err(format!("error committing db write: {err}"));
        }

        let level = self
            .arena
            .read()
            .get(&new_oid)
            .map(|entry| entry.block.header().level)
            .unwrap_or_default();
        *self.last_indelible.write() = Some(new_oid);
        self.last_indelible_level.store(level, Ordering::SeqCst);

        // must release the store mutex before starting the checkpoint
        store.release_mutex();
        self.checkpoints.start_checkpoint(fullcheckpoint);
        Ok(true)
    }

    fn do_confirm_one(
        &self,
        store: &mut dyn ChainStore,
        commitments: &mut dyn CommitmentTree,
        newtip: &Oid,
    ) -> ChainResult<ConfirmStep> {
        let (candidate, nconfsigs, nseqconfsigs, nskipconfsigs, seg_skip) = {
            let arena = self.arena.read();
            let tip = arena
                .get(newtip)
                .ok_or_else(|| ChainError::Transaction("tip block missing from arena".into()))?;
            if tip.aux.marked_for_indelible {
                // happens when a single witness confirms its own block
                return Ok(ConfirmStep::NoChange);
            }
            let nseqconfsigs = tip.aux.chain_params.nseqconfsigs;
            let nskipconfsigs = tip.aux.chain_params.nskipconfsigs;
            trace!(
                level = tip.block.header().level,
                witness = tip.block.header().witness,
                skip = tip.aux.skip,
                nseqconfsigs,
                nskipconfsigs,
                oid = %tip.aux.oid,
                "confirmation scan"
            );

            let mut nconfsigs: u16 = 1;
            let mut seg_skip = tip.aux.skip;
            let mut candidate = *newtip;
            let mut cursor = tip;
            loop {
                let Some(prior_oid) = cursor.prior else { break };
                let Some(prior) = arena.get(&prior_oid) else {
                    break;
                };
                let expected = cursor.block.header().level - 1;
                if prior.block.header().level != expected {
                    let msg = format!(
                        "block level sequence error; level {} expected {}",
                        prior.block.header().level,
                        expected
                    );
                    return self.fatal_err(msg);
                }
                if prior.aux.marked_for_indelible {
                    trace!(
                        level = prior.block.header().level,
                        oid = %prior.aux.oid,
                        "stopping at block already marked for indelible"
                    );
                    break;
                }
                candidate = prior_oid;
                nconfsigs += 1;
                seg_skip = seg_skip.max(prior.aux.skip);
                cursor = prior;
                trace!(
                    nconfsigs,
                    level = cursor.block.header().level,
                    witness = cursor.block.header().witness,
                    "confirmation scan step"
                );
            }
            (candidate, nconfsigs, nseqconfsigs, nskipconfsigs, seg_skip)
        };

        let have_indelible = self.last_indelible.read().is_some();
        if have_indelible
            && (nconfsigs < nseqconfsigs || (seg_skip > 0 && nconfsigs < nskipconfsigs))
        {
            trace!(nconfsigs, seg_skip, "no new indelible block");
            return Ok(ConfirmStep::NoChange);
        }

        self.set_newly_indelible_block(store, commitments, &candidate)
    }

    fn set_newly_indelible_block(
        &self,
        store: &mut dyn ChainStore,
        commitments: &mut dyn CommitmentTree,
        oid: &Oid,
    ) -> ChainResult<ConfirmStep> {
        if let Err(err) = store.begin_write() {
            return self.fatal_err(format!("error starting db write: {err}"));
        }

        let (level, timestamp, prior_oid, witness, announce_time, block_bytes, payload) = {
            let mut arena = self.arena.write();
            let Some(entry) = arena.get_mut(oid) else {
                return self.fatal_err("block missing from arena during commit");
            };
            if entry.aux.marked_for_indelible {
                // another thread promoted this block before we took the
                // write transaction
                trace!(oid = %oid, "block already indelible");
                return Ok(ConfirmStep::NoChange);
            }
            entry.aux.marked_for_indelible = true;
            let header = entry.block.header();
            (
                header.level,
                header.timestamp,
                header.prior_oid,
                header.witness,
                entry.aux.announce_time,
                entry.block.to_bytes(),
                entry.block.payload().to_vec(),
            )
        };
        info!(
            announce_time,
            level,
            witness,
            size = block_bytes.len(),
            oid = %oid,
            prior = %prior_oid,
            "new indelible block"
        );

        let pending = *self.new_indelible.lock();
        let last = pending.or_else(|| self.last_indelible_oid());
        match last {
            None => {
                if level != 0 {
                    return self
                        .fatal_err("blockchain sequence error; first indelible block not at level 0");
                }
            }
            Some(last_oid) => {
                let Some((last_level, last_aux_oid)) = self
                    .arena
                    .read()
                    .get(&last_oid)
                    .map(|entry| (entry.block.header().level, entry.aux.oid))
                else {
                    return self.fatal_err("last indelible block missing from arena");
                };
                let expected = last_level + 1;
                if level != expected || prior_oid != last_aux_oid {
                    let msg = if level <= expected {
                        "two indelible blocks at same level"
                    } else {
                        "blockchain sequence error"
                    };
                    error!(
                        level,
                        expected,
                        prior = %prior_oid,
                        expected_prior = %last_aux_oid,
                        "{msg}"
                    );
                    return self.fatal_err(msg);
                }
            }
        }

        let staged = self.index_txs(store, commitments, &payload, level)?;

        if let Err(err) = commitments.update_commit_tree(store, timestamp) {
            return self.fatal_err(format!("error updating commit tree: {err}"));
        }
        if let Err(err) = store.blockchain_insert(level, &block_bytes) {
            return self.fatal_err(format!("error in blockchain insert: {err}"));
        }

        let record = {
            let mut arena = self.arena.write();
            let Some(entry) = arena.get_mut(oid) else {
                return self.fatal_err("block missing from arena during commit");
            };
            if let Some(change) = staged {
                // witness-set changes take effect for blocks chained onto
                // this one after it commits
                if let Some(nwitnesses) = change.next_nwitnesses {
                    entry.aux.chain_params.next_nwitnesses = nwitnesses;
                }
                if let Some(maxmal) = change.next_maxmal {
                    entry.aux.chain_params.next_maxmal = maxmal;
                }
            }
            entry.aux.record()
        };
        let encoded = match bincode::serialize(&record) {
            Ok(bytes) => bytes,
            Err(err) => return self.fatal_err(format!("error encoding block aux: {err}")),
        };
        if let Err(err) = store.parameter_insert(
            ParamKey::BlockAux,
            (level % AUX_RING_SLOTS) as u8,
            &encoded,
        ) {
            return self.fatal_err(format!("error in parameter insert block aux: {err}"));
        }

        *self.new_indelible.lock() = Some(*oid);
        Ok(ConfirmStep::Promoted)
    }

    fn index_txs(
        &self,
        store: &mut dyn ChainStore,
        commitments: &mut dyn CommitmentTree,
        payload: &[u8],
        level: u64,
    ) -> ChainResult<Option<ParamChange>> {
        trace!(level, "indexing block transactions");
        let mut staged: Option<ParamChange> = None;
        for record in PayloadTxs::new(payload) {
            let record = match record {
                Ok(record) => record,
                Err(err) => {
                    return self
                        .fatal_err(format!("error parsing indelible block transaction: {err}"))
                }
            };
            let mut tx = match self.codec.tx_from_wire(record) {
                Ok(tx) => tx,
                Err(err) => {
                    return self
                        .fatal_err(format!("error parsing indelible block transaction: {err}"))
                }
            };
            check_create_pseudo_serialnum(&mut tx, record);

            for serial in &tx.serialnums {
                if let Err(err) = store.serialnum_insert(serial) {
                    return self.fatal_err(format!("error in serialnum insert: {err}"));
                }
            }
            for output in &tx.outputs {
                self.index_tx_outputs(store, commitments, output, tx.param_level)?;
            }
            if let Some(change) = tx.param_change {
                let entry = staged.get_or_insert_with(ParamChange::default);
                if change.next_nwitnesses.is_some() {
                    entry.next_nwitnesses = change.next_nwitnesses;
                }
                if change.next_maxmal.is_some() {
                    entry.next_maxmal = change.next_maxmal;
                }
            }
        }
        Ok(staged)
    }

    fn index_tx_outputs(
        &self,
        store: &mut dyn ChainStore,
        commitments: &mut dyn CommitmentTree,
        output: &TxOut,
        param_level: u64,
    ) -> ChainResult<()> {
        trace!(param_level, "indexing tx output");
        let commitnum = match commitments.next_commitnum(true) {
            Ok(commitnum) => commitnum,
            Err(err) => return self.fatal_err(format!("error reserving commitnum: {err}")),
        };
        if let Err(err) = commitments.add_commitment(store, commitnum, &output.commitment) {
            return self.fatal_err(format!("error adding commitment: {err}"));
        }
        if let Err(err) = store.tx_outputs_insert(output, param_level, commitnum) {
            // a half-written address index inside a committed transaction is
            // committed-state divergence
            return self.fatal_err(format!("error in tx outputs insert: {err}"));
        }
        Ok(())
    }

    /// Parses a transaction record and probes every input serial number
    /// (synthesizing the pseudo-serialnum when there are none). Returns the
    /// first non-clear status found.
    pub fn check_serialnums(
        &self,
        store: &mut dyn ChainStore,
        topblock: Option<&Oid>,
        kind: ObjKind,
        txobj: Option<&Oid>,
        record: &[u8],
    ) -> ChainResult<SerialnumStatus> {
        let mut tx = match self.codec.tx_from_wire(record) {
            Ok(tx) => tx,
            Err(err) => {
                warn!(?err, "error parsing tx for serialnum check");
                return Err(ChainError::Transaction(format!("error parsing tx: {err}")));
            }
        };
        check_create_pseudo_serialnum(&mut tx, record);
        for serial in &tx.serialnums {
            let status = self.check_serialnum(store, topblock, kind, txobj, serial)?;
            if status != SerialnumStatus::Clear {
                return Ok(status);
            }
        }
        Ok(SerialnumStatus::Clear)
    }

    /// Two-tier serial-number conflict check: the persistent set, then the
    /// temp-by-block index against the candidate subchain. The published
    /// indelible tip is snapshotted before any lookup so the persistent
    /// reads cannot get ahead of the in-memory scan.
    pub fn check_serialnum(
        &self,
        store: &mut dyn ChainStore,
        topblock: Option<&Oid>,
        kind: ObjKind,
        txobj: Option<&Oid>,
        serial: &Serialnum,
    ) -> ChainResult<SerialnumStatus> {
        trace!(serialnum = %hex::encode(serial), ?kind, "check serialnum");

        let last_indelible = self.last_indelible_oid();
        let floor_level = last_indelible.and_then(|oid| {
            self.arena
                .read()
                .get(&oid)
                .map(|entry| entry.block.header().level)
        });

        if store.serialnum_check(serial)? {
            trace!("serialnum found in persistent set");
            if let Some(obj) = txobj {
                if let Err(err) = store.valid_objs_delete(obj) {
                    warn!(oid = %obj, ?err, "failed deleting conflicting tx from valid objs");
                }
            }
            return Ok(SerialnumStatus::IndelibleConflict);
        }

        // serial numbers stay in the temp index until their block is pruned,
        // well past promotion; checking persistent first is therefore safe
        let mut last_mark: Option<TempMark> = None;
        loop {
            let (page, have_more) =
                store.temp_serialnum_select(serial, last_mark.as_ref(), TEMP_SERIALNUM_PAGE)?;
            for mark in &page {
                match mark {
                    TempMark::Probe(probe) if *probe == kind => {
                        return Ok(SerialnumStatus::ProbeConflict);
                    }
                    TempMark::Block(block_oid) => {
                        if let Some(top) = topblock {
                            if self
                                .arena
                                .read()
                                .block_in_chain(block_oid, top, floor_level)
                            {
                                return Ok(SerialnumStatus::ChainConflict);
                            }
                        }
                    }
                    _ => {}
                }
            }
            match (have_more, page.last()) {
                (true, Some(mark)) => last_mark = Some(*mark),
                _ => break,
            }
        }

        trace!("serialnum not found");
        Ok(SerialnumStatus::Clear)
    }

    /// True when any block above `last_indelible_level` on the chain ending
    /// at `tip` carries transactions. Decides whether an empty witness
    /// block is worth issuing.
    pub fn chain_has_delible_txs(&self, tip: &Oid, last_indelible_level: u64) -> bool {
        let arena = self.arena.read();
        let mut cursor = Some(*tip);
        while let Some(oid) = cursor {
            let Some(entry) = arena.get(&oid) else { break };
            if entry.block.header().level <= last_indelible_level {
                break;
            }
            if entry.block.has_tx() {
                trace!(level = entry.block.header().level, "chain has delible txs");
                return true;
            }
            cursor = entry.prior;
        }
        false
    }

    /// Retention floor: `trailing_rounds` full witness rotations below the
    /// indelible tip, never below the startup prune level.
    pub fn compute_prune_level(&self, min_level: u64, trailing_rounds: u64) -> u64 {
        let Some(last_oid) = self.last_indelible_oid() else {
            return min_level;
        };
        let arena = self.arena.read();
        let Some(entry) = arena.get(&last_oid) else {
            return min_level;
        };
        let trailing_levels = trailing_rounds * entry.aux.chain_params.nwitnesses as u64;
        let level = entry.block.header().level;
        let mut prune_level = min_level;
        if level > trailing_levels {
            prune_level = level - trailing_levels;
        }
        prune_level.max(self.startup_prune_level())
    }

    /// Releases every retained block below `prune_level`.
    pub fn prune(&self, prune_level: u64) -> usize {
        let removed = self.arena.write().prune_below(prune_level);
        if removed > 0 {
            trace!(prune_level, removed, "pruned blocks below retention horizon");
        }
        removed
    }
}

/// Synthesizes the pseudo-serialnum for a transaction with no inputs, so
/// uniqueness is still enforced for coinbase-like transactions.
fn check_create_pseudo_serialnum(tx: &mut ParsedTx, record: &[u8]) {
    if !tx.serialnums.is_empty() {
        return;
    }
    let body = record.get(4..).unwrap_or(record);
    let serial = crypto::hash_to_serialnum(body);
    trace!(serialnum = %hex::encode(serial), "created pseudo-serialnum");
    tx.serialnums.push(serial);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialnum_status_codes_are_stable() {
        assert_eq!(SerialnumStatus::Clear.code(), 0);
        assert_eq!(SerialnumStatus::ProbeConflict.code(), 2);
        assert_eq!(SerialnumStatus::ChainConflict.code(), 3);
        assert_eq!(SerialnumStatus::IndelibleConflict.code(), 4);
    }

    #[test]
    fn pseudo_serialnum_only_fills_empty_inputs() {
        let record = [8u8, 0, 0, 0, 1, 2, 3, 4];
        let mut without_inputs = ParsedTx::default();
        check_create_pseudo_serialnum(&mut without_inputs, &record);
        assert_eq!(without_inputs.serialnums.len(), 1);
        assert_eq!(
            without_inputs.serialnums[0],
            crypto::hash_to_serialnum(&record[4..])
        );

        let mut with_inputs = ParsedTx {
            serialnums: vec![[9u8; 32]],
            ..ParsedTx::default()
        };
        check_create_pseudo_serialnum(&mut with_inputs, &record);
        assert_eq!(with_inputs.serialnums, vec![[9u8; 32]]);
    }
}
