use std::sync::Arc;

use attest_chain::chain::BlockChain;
use attest_chain::config::ChainConfig;
use attest_chain::crypto;
use attest_chain::genesis::create_genesis_data_files;
use attest_chain::interfaces::{ParsedTx, TempMark, TxOut};
use attest_chain::testing::{
    encode_payload, encode_tx_record, FrameCodec, MemCommitments, MemStore, RecordingCheckpoints,
};
use attest_chain::types::{
    Block, BlockAux, BlockWireHeader, ObjKind, Oid, Serialnum, WitnessParams,
};
use attest_chain::{ChainError, SerialnumStatus};
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    config: ChainConfig,
    chain: BlockChain,
    store: MemStore,
    commitments: MemCommitments,
    checkpoints: Arc<RecordingCheckpoints>,
    seeds: Vec<[u8; 32]>,
}

fn harness(nwitnesses: u16, maxmal: u16, witness_index: Option<u16>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ChainConfig::default();
    config.genesis_data_file = dir.path().join("genesis.dat");
    config.key_dir = dir.path().join("keys");
    config.genesis_nwitnesses = nwitnesses;
    config.genesis_maxmal = maxmal;
    config.witness_index = witness_index;
    create_genesis_data_files(&config).unwrap();

    let seeds = (0..nwitnesses)
        .map(|i| {
            crypto::load_signing_key(
                &config
                    .key_dir
                    .join(format!("private_signing_key_witness_{i}.dat")),
            )
            .unwrap()
        })
        .collect();

    let checkpoints = Arc::new(RecordingCheckpoints::new());
    let chain = BlockChain::new(witness_index, Arc::new(FrameCodec), checkpoints.clone());
    let mut store = MemStore::new();
    let mut commitments = MemCommitments::new();
    chain.init(&mut store, &mut commitments, &config).unwrap();

    Harness {
        _dir: dir,
        config,
        chain,
        store,
        commitments,
        checkpoints,
        seeds,
    }
}

/// Builds and signs the next block on `prior`, the way the witness
/// subsystem would.
fn build_block(
    chain: &BlockChain,
    seeds: &[[u8; 32]],
    prior: &Oid,
    witness: u16,
    payload: Vec<u8>,
) -> Block {
    let (prior_level, prior_hash, child_params) = chain
        .with_block(prior, |entry| {
            (
                entry.block.header().level,
                entry.aux.block_hash,
                entry.aux.chain_params.child_params(),
            )
        })
        .unwrap();
    let header = BlockWireHeader {
        signature: [0u8; 64],
        prior_oid: *prior,
        level: prior_level + 1,
        timestamp: 1_000 + prior_level + 1,
        witness: witness as u8,
    };
    let mut block = Block::new(header, payload);
    let mut aux = BlockAux::new();
    block.set_or_verify_oid(&mut aux, true).unwrap();
    aux.chain_params = child_params;
    aux.witness_params = Some(WitnessParams::with_keys(vec![seeds[witness as usize]]));
    block.sign(&aux, &prior_hash).unwrap();
    block
}

impl Harness {
    fn genesis_oid(&self) -> Oid {
        self.chain.last_indelible_oid().unwrap()
    }

    fn make_block(&self, prior: &Oid, witness: u16, payload: Vec<u8>) -> Block {
        build_block(&self.chain, &self.seeds, prior, witness, payload)
    }

    fn attach(&self, prior: &Oid, witness: u16, payload: Vec<u8>) -> Oid {
        let block = self.make_block(prior, witness, payload);
        self.chain.attach_block(block, 7).unwrap()
    }

    fn confirm(&mut self, tip: &Oid) -> bool {
        self.chain
            .do_confirmations(&mut self.store, &mut self.commitments, tip)
            .unwrap()
    }

    fn marked(&self, oid: &Oid) -> bool {
        self.chain
            .with_block(oid, |entry| entry.aux.marked_for_indelible)
            .unwrap()
    }
}

fn spend_tx(serial: Serialnum) -> ParsedTx {
    ParsedTx {
        param_level: 0,
        serialnums: vec![serial],
        outputs: vec![TxOut {
            address: [3u8; 32],
            value_enc: 17,
            commitment: [4u8; 32],
        }],
        param_change: None,
    }
}

// E1: with no prior state, inserting genesis promotes it unconditionally.
#[test]
fn genesis_promotes_to_level_zero() {
    let h = harness(3, 0, None);
    assert_eq!(h.chain.last_indelible_level(), Some(0));
    assert!(h.marked(&h.genesis_oid()));
    assert!(h.store.blocks.contains_key(&0));
    assert_eq!(h.store.commits, 1);
    assert_eq!(h.store.released, 1);
    assert_eq!(h.checkpoints.requests.lock().as_slice(), &[true]);
    assert!(h.checkpoints.is_active());
}

// E2: two sequential signatures promote the first block; the tip stays a
// candidate.
#[test]
fn two_block_sequential_promotion() {
    let mut h = harness(3, 0, None);
    let genesis = h.genesis_oid();

    let b1 = h.attach(&genesis, 0, Vec::new());
    assert!(!h.confirm(&b1));
    assert_eq!(h.chain.last_indelible_level(), Some(0));

    let b2 = h.attach(&b1, 1, Vec::new());
    assert!(h.confirm(&b2));
    assert_eq!(h.chain.last_indelible_level(), Some(1));
    assert_eq!(h.chain.last_indelible_oid(), Some(b1));
    assert!(h.marked(&b1));
    assert!(!h.marked(&b2));
    assert!(h.store.blocks.contains_key(&1));
}

// E3: a skip on the confirmation path raises the needed count to
// nskipconfsigs.
#[test]
fn skip_delays_promotion() {
    let mut h = harness(3, 0, None);
    let genesis = h.genesis_oid();

    let b1 = h.attach(&genesis, 0, Vec::new());
    let b2 = h.attach(&b1, 2, Vec::new());
    assert_eq!(
        h.chain.with_block(&b2, |entry| entry.aux.skip).unwrap(),
        1
    );
    assert!(!h.confirm(&b2));
    assert_eq!(h.chain.last_indelible_level(), Some(0));

    // witness 0 may sign again at distance 2
    assert!(!h.chain.check_bad_sig_order(&b2, 0));
    let b3 = h.attach(&b2, 0, Vec::new());
    assert!(h.confirm(&b3));
    assert_eq!(h.chain.last_indelible_oid(), Some(b1));
    assert!(h.marked(&b1));
    assert!(!h.marked(&b2));
}

// Property 5: with all skips zero a block goes indelible exactly when
// nseqconfsigs consecutive unmarked descendants exist.
#[test]
fn promotion_advances_level_by_level() {
    let mut h = harness(3, 0, None);
    let mut tip = h.genesis_oid();
    let mut blocks = vec![tip];

    for level in 1..=5u64 {
        let witness = ((level - 1) % 3) as u16;
        tip = h.attach(&tip, witness, Vec::new());
        blocks.push(tip);
        let promoted = h.confirm(&tip);
        if level == 1 {
            assert!(!promoted);
        } else {
            // exactly one block becomes indelible per new tip
            assert!(promoted);
            assert_eq!(h.chain.last_indelible_oid(), Some(blocks[level as usize - 1]));
            assert_eq!(h.chain.last_indelible_level(), Some(level - 1));
        }
    }
}

// E4: a serial number reused inside the same candidate chain conflicts
// with status 3.
#[test]
fn duplicate_serial_in_candidate_chain() {
    let mut h = harness(3, 0, None);
    let genesis = h.genesis_oid();
    let serial = [0x51u8; 32];

    let b1 = h.attach(&genesis, 0, Vec::new());
    let b2 = h.attach(&b1, 1, encode_payload(&[spend_tx(serial)]));
    h.store
        .stage_temp_serialnum(serial, TempMark::Block(b2));

    let status = h
        .chain
        .check_serialnum(&mut h.store, Some(&b2), ObjKind::Tx, None, &serial)
        .unwrap();
    assert_eq!(status, SerialnumStatus::ChainConflict);
    assert_eq!(status.code(), 3);

    // a serial only on a different branch does not conflict
    let other = h.attach(&b1, 2, Vec::new());
    let status = h
        .chain
        .check_serialnum(&mut h.store, Some(&other), ObjKind::Tx, None, &serial)
        .unwrap();
    assert_eq!(status, SerialnumStatus::Clear);
}

// E5: a serial committed in an indelible block conflicts with status 4 and
// evicts the offending staged transaction.
#[test]
fn indelible_serial_conflict_evicts_staged_tx() {
    let mut h = harness(3, 0, None);
    let genesis = h.genesis_oid();
    let serial = [0x52u8; 32];

    let b1 = h.attach(&genesis, 0, encode_payload(&[spend_tx(serial)]));
    let b2 = h.attach(&b1, 1, Vec::new());
    assert!(h.confirm(&b2));
    assert!(h.store.serialnums.contains(&serial));

    let tx_oid = Oid::from_bytes([0xeeu8; 32]);
    h.store.valid_objs.insert(tx_oid);
    let status = h
        .chain
        .check_serialnum(&mut h.store, Some(&b2), ObjKind::Tx, Some(&tx_oid), &serial)
        .unwrap();
    assert_eq!(status, SerialnumStatus::IndelibleConflict);
    assert_eq!(status.code(), 4);
    assert!(!h.store.valid_objs.contains(&tx_oid));
}

// Probe sentinels only conflict with the caller's own object class.
#[test]
fn probe_sentinel_matches_caller_kind() {
    let mut h = harness(3, 0, None);
    let serial = [0x53u8; 32];
    h.store
        .stage_temp_serialnum(serial, TempMark::Probe(ObjKind::Tx));

    let same = h
        .chain
        .check_serialnum(&mut h.store, None, ObjKind::Tx, None, &serial)
        .unwrap();
    assert_eq!(same, SerialnumStatus::ProbeConflict);

    let other = h
        .chain
        .check_serialnum(&mut h.store, None, ObjKind::Block, None, &serial)
        .unwrap();
    assert_eq!(other, SerialnumStatus::Clear);
}

// Property 8, deterministic rendition: through attach, promotion, and
// pruning there is no step at which the serial number is reachable from
// neither index.
#[test]
fn serialnum_never_unreachable_across_promotion() {
    let mut h = harness(3, 0, None);
    let genesis = h.genesis_oid();
    let serial = [0x54u8; 32];

    let b1 = h.attach(&genesis, 0, encode_payload(&[spend_tx(serial)]));
    h.store
        .stage_temp_serialnum(serial, TempMark::Block(b1));

    // before promotion: in-chain conflict
    let status = h
        .chain
        .check_serialnum(&mut h.store, Some(&b1), ObjKind::Tx, None, &serial)
        .unwrap();
    assert_eq!(status, SerialnumStatus::ChainConflict);

    // promote b1; temp entries are deliberately retained
    let b2 = h.attach(&b1, 1, Vec::new());
    assert!(h.confirm(&b2));
    let status = h
        .chain
        .check_serialnum(&mut h.store, Some(&b2), ObjKind::Tx, None, &serial)
        .unwrap();
    assert_eq!(status, SerialnumStatus::IndelibleConflict);

    // only pruning removes the temp entry, and the persistent set still has it
    h.store.unstage_block_serialnums(&b1);
    let status = h
        .chain
        .check_serialnum(&mut h.store, Some(&b2), ObjKind::Tx, None, &serial)
        .unwrap();
    assert_eq!(status, SerialnumStatus::IndelibleConflict);
}

// check_serialnums parses the record, synthesizes the pseudo-serialnum for
// input-less transactions, and probes every input.
#[test]
fn pseudo_serialnum_enforces_coinbase_uniqueness() {
    let mut h = harness(3, 0, None);
    let genesis = h.genesis_oid();

    let coinbase = ParsedTx {
        param_level: 1,
        serialnums: Vec::new(),
        outputs: vec![TxOut {
            address: [8u8; 32],
            value_enc: 50,
            commitment: [9u8; 32],
        }],
        param_change: None,
    };
    let record = encode_tx_record(&coinbase);

    let b1 = h.attach(&genesis, 0, encode_payload(&[coinbase.clone()]));
    let b2 = h.attach(&b1, 1, Vec::new());
    assert!(h.confirm(&b2));

    // resubmitting the identical record now conflicts with persistent state
    let status = h
        .chain
        .check_serialnums(&mut h.store, Some(&b2), ObjKind::Tx, None, &record)
        .unwrap();
    assert_eq!(status, SerialnumStatus::IndelibleConflict);

    // a record differing in one byte gets a different pseudo-serialnum
    let mut variant = coinbase;
    variant.outputs[0].value_enc = 51;
    let status = h
        .chain
        .check_serialnums(
            &mut h.store,
            Some(&b2),
            ObjKind::Tx,
            None,
            &encode_tx_record(&variant),
        )
        .unwrap();
    assert_eq!(status, SerialnumStatus::Clear);
}

// E6: promoting a competing block at an already-indelible level is fatal,
// and the core refuses further work.
#[test]
fn competing_indelible_level_is_fatal() {
    let mut h = harness(3, 0, None);
    let genesis = h.genesis_oid();

    let a1 = h.attach(&genesis, 0, Vec::new());
    let a2 = h.attach(&a1, 1, Vec::new());
    assert!(h.confirm(&a2));
    assert_eq!(h.chain.last_indelible_oid(), Some(a1));

    // competing branch from genesis gathers enough confirmations
    let b1 = h.attach(&genesis, 1, Vec::new());
    let b2 = h.attach(&b1, 2, Vec::new());
    let b3 = h.attach(&b2, 0, Vec::new());
    let err = h
        .chain
        .do_confirmations(&mut h.store, &mut h.commitments, &b3)
        .unwrap_err();
    assert!(matches!(err, ChainError::Fatal(_)));
    assert!(h.chain.have_fatal_error());

    // every subsequent entry point short-circuits
    let err = h
        .chain
        .do_confirmations(&mut h.store, &mut h.commitments, &b3)
        .unwrap_err();
    assert!(matches!(err, ChainError::Fatal(_)));
    assert!(matches!(
        h.chain.attach_block(h.make_block(&a2, 2, Vec::new()), 7),
        Err(ChainError::Fatal(_))
    ));
}

// Commit side effects: transactions of a promoted block land in every
// persistent index, and outputs get sequential commitnums.
#[test]
fn indelible_commit_indexes_transactions() {
    let mut h = harness(3, 0, None);
    let genesis = h.genesis_oid();
    let serial_a = [0x61u8; 32];
    let serial_b = [0x62u8; 32];

    let payload = encode_payload(&[spend_tx(serial_a), spend_tx(serial_b)]);
    let b1 = h.attach(&genesis, 0, payload);
    let b2 = h.attach(&b1, 1, Vec::new());
    assert!(h.confirm(&b2));

    assert!(h.store.serialnums.contains(&serial_a));
    assert!(h.store.serialnums.contains(&serial_b));
    assert_eq!(h.commitments.commitments.len(), 2);
    assert_eq!(h.commitments.commitments[0].0, 0);
    assert_eq!(h.commitments.commitments[1].0, 1);
    assert_eq!(h.store.tx_outputs.len(), 2);
    // tree root updated through the block timestamp, once per commit batch
    assert_eq!(h.commitments.tree_updates.last(), Some(&1_001));
}

// A block-carried witness-set change lands in the committing block's aux
// and takes effect for children linked afterwards.
#[test]
fn param_change_stages_on_committed_block() {
    let mut h = harness(3, 0, None);
    let genesis = h.genesis_oid();

    let change = ParsedTx {
        param_level: 1,
        serialnums: vec![[0x63u8; 32]],
        outputs: Vec::new(),
        param_change: Some(attest_chain::interfaces::ParamChange {
            next_nwitnesses: Some(2),
            next_maxmal: None,
        }),
    };
    let b1 = h.attach(&genesis, 0, encode_payload(&[change]));
    let b2 = h.attach(&b1, 1, Vec::new());
    // b2 linked before the command committed keeps the old parameters
    assert_eq!(
        h.chain
            .with_block(&b2, |entry| entry.aux.chain_params.nwitnesses)
            .unwrap(),
        3
    );
    assert!(h.confirm(&b2));
    assert_eq!(
        h.chain
            .with_block(&b1, |entry| entry.aux.chain_params.next_nwitnesses)
            .unwrap(),
        2
    );
    // already-linked descendants are never retroactively mutated
    assert_eq!(
        h.chain
            .with_block(&b2, |entry| entry.aux.chain_params.nwitnesses)
            .unwrap(),
        3
    );
    // a child linked to b1 after the commit inherits the change
    let c2 = h.attach(&b1, 0, Vec::new());
    assert_eq!(
        h.chain
            .with_block(&c2, |entry| entry.aux.chain_params.nwitnesses)
            .unwrap(),
        2
    );
}

// Witness nodes request a full checkpoint only for their own blocks.
#[test]
fn checkpoint_fullness_follows_signing_witness() {
    let mut h = harness(3, 0, Some(1));
    let genesis = h.genesis_oid();

    let b1 = h.attach(&genesis, 0, Vec::new());
    let b2 = h.attach(&b1, 1, Vec::new());
    assert!(h.confirm(&b2)); // tip signed by the local witness
    let b3 = h.attach(&b2, 2, Vec::new());
    assert!(h.confirm(&b3)); // tip signed by another witness

    let requests = h.checkpoints.requests.lock().clone();
    let n = requests.len();
    assert_eq!(&requests[n - 2..], &[true, false]);
}

// Delible-payload scan stops at the indelible floor.
#[test]
fn chain_has_delible_txs_scans_above_floor() {
    let mut h = harness(3, 0, None);
    let genesis = h.genesis_oid();
    let serial = [0x64u8; 32];

    let b1 = h.attach(&genesis, 0, encode_payload(&[spend_tx(serial)]));
    let b2 = h.attach(&b1, 1, Vec::new());
    assert!(h.chain.chain_has_delible_txs(&b2, 0));
    assert!(h.confirm(&b2));
    // the only payload now sits at the indelible level itself
    assert!(!h.chain.chain_has_delible_txs(&b2, 1));
}

// Property 10: after a restart the restored aux state matches the
// pre-restart state field for field, and ingest resumes seamlessly.
#[test]
fn restore_matches_steady_state() {
    let mut h = harness(3, 0, Some(0));
    let genesis = h.genesis_oid();

    let b1 = h.attach(&genesis, 0, encode_payload(&[spend_tx([0x71u8; 32])]));
    let b2 = h.attach(&b1, 1, Vec::new());
    assert!(h.confirm(&b2));
    let b3 = h.attach(&b2, 2, Vec::new());
    assert!(h.confirm(&b3));
    assert_eq!(h.chain.last_indelible_level(), Some(2));

    let aux_b1 = h.chain.with_block(&b1, |entry| entry.aux.record()).unwrap();
    let aux_b2 = h.chain.with_block(&b2, |entry| entry.aux.record()).unwrap();
    let aux_b3 = h.chain.with_block(&b3, |entry| entry.aux.record()).unwrap();

    // restart: a fresh context over the same persistent store
    let checkpoints = Arc::new(RecordingCheckpoints::new());
    let chain2 = BlockChain::new(Some(0), Arc::new(FrameCodec), checkpoints.clone());
    let mut commitments2 = MemCommitments::new();
    chain2
        .init(&mut h.store, &mut commitments2, &h.config)
        .unwrap();

    assert_eq!(chain2.last_indelible_oid(), Some(b2));
    assert_eq!(chain2.last_indelible_level(), Some(2));
    assert_eq!(chain2.startup_prune_level(), 2);
    assert!(commitments2.initialized);
    assert!(checkpoints.is_active());

    // the signature-order tail (2 blocks for nwitnesses=3) is back in
    // memory with identical aux state
    assert_eq!(
        chain2.with_block(&b2, |entry| entry.aux.record()).unwrap(),
        aux_b2
    );
    assert_eq!(
        chain2.with_block(&b1, |entry| entry.aux.record()).unwrap(),
        aux_b1
    );
    assert_eq!(chain2.with_block(&b2, |entry| entry.prior), Some(Some(b1)));

    // a witness node re-enqueues the restored tip for validation
    assert!(h
        .store
        .validate_queue
        .iter()
        .any(|(kind, oid, prior, level)| {
            *kind == ObjKind::Block && *oid == b2 && *prior == b1 && *level == 2
        }));

    // re-ingesting the delible tip reproduces its pre-restart aux exactly
    let b3_again = build_block(&chain2, &h.seeds, &b2, 2, Vec::new());
    let b3_oid = chain2.attach_block(b3_again, 7).unwrap();
    assert_eq!(b3_oid, b3);
    assert_eq!(
        chain2.with_block(&b3, |entry| entry.aux.record()).unwrap(),
        aux_b3
    );

    // and confirmation picks up where it left off
    let b4 = build_block(&chain2, &h.seeds, &b3, 0, Vec::new());
    let b4_oid = chain2.attach_block(b4, 7).unwrap();
    assert!(chain2
        .do_confirmations(&mut h.store, &mut commitments2, &b4_oid)
        .unwrap());
    assert_eq!(chain2.last_indelible_oid(), Some(b3));
}

// A non-witness restore loads no signing keys and enqueues nothing.
#[test]
fn restore_without_witness_role() {
    let mut h = harness(3, 0, None);
    let genesis = h.genesis_oid();
    let b1 = h.attach(&genesis, 0, Vec::new());
    let b2 = h.attach(&b1, 1, Vec::new());
    assert!(h.confirm(&b2));

    let chain2 = BlockChain::new(
        None,
        Arc::new(FrameCodec),
        Arc::new(RecordingCheckpoints::new()),
    );
    let mut commitments2 = MemCommitments::new();
    chain2
        .init(&mut h.store, &mut commitments2, &h.config)
        .unwrap();

    assert_eq!(chain2.last_indelible_oid(), Some(b1));
    assert!(h.store.validate_queue.is_empty());
    assert_eq!(
        chain2.with_block(&b1, |entry| entry.aux.witness_params.clone()),
        Some(None)
    );
}

// Prune level combines the trailing-rounds window with the startup floor,
// and pruning releases arena entries.
#[test]
fn prune_level_and_arena_release() {
    let mut h = harness(3, 0, None);
    let mut tip = h.genesis_oid();
    for level in 1..=8u64 {
        tip = h.attach(&tip, ((level - 1) % 3) as u16, Vec::new());
        h.confirm(&tip);
    }
    assert_eq!(h.chain.last_indelible_level(), Some(7));

    // 7 - 2 rounds * 3 witnesses = 1
    assert_eq!(h.chain.compute_prune_level(0, 2), 1);
    assert_eq!(h.chain.compute_prune_level(0, 3), 0);

    let removed = h.chain.prune(h.chain.compute_prune_level(0, 2));
    assert_eq!(removed, 1); // genesis only; everything else is within the window
    assert!(h.chain.with_block(&tip, |_| ()).is_some());
}
