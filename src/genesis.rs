use std::fs;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use tracing::{info, trace};

use crate::chain::{BlockChain, AUX_RING_SLOTS};
use crate::config::ChainConfig;
use crate::crypto;
use crate::errors::{ChainError, ChainResult};
use crate::interfaces::{ChainStore, CommitmentTree, ParamKey};
use crate::types::{
    Block, BlockAux, BlockAuxRecord, BlockWireHeader, ObjKind, Oid, SigningPrivateKey,
    SigningPublicKey, WitnessParams, MAX_NWITNESSES,
};

/// Magic tag leading the genesis data file, little-endian on disk.
pub const GENESIS_FILE_TAG: u32 = 0x0047_4343;

const PRIVATE_KEY_FILE_PREFIX: &str = "private_signing_key_witness_";

/// Contents of the public genesis data file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenesisData {
    pub nwitnesses: u16,
    pub maxmal: u16,
    pub signing_keys: Vec<SigningPublicKey>,
}

fn private_key_path(config: &ChainConfig, witness: u16) -> PathBuf {
    config
        .key_dir
        .join(format!("{PRIVATE_KEY_FILE_PREFIX}{witness}.dat"))
}

/// Generates the witness keys and writes the public genesis data file plus
/// one raw seed file per witness.
pub fn create_genesis_data_files(config: &ChainConfig) -> ChainResult<()> {
    let nwitnesses = config.genesis_nwitnesses;
    let maxmal = config.genesis_maxmal;
    if nwitnesses == 0 || nwitnesses > MAX_NWITNESSES {
        return Err(ChainError::Config(format!(
            "nwitnesses {nwitnesses} out of range 1..={MAX_NWITNESSES}"
        )));
    }
    if maxmal >= nwitnesses {
        return Err(ChainError::Config(format!(
            "maxmal {maxmal} must be less than nwitnesses {nwitnesses}"
        )));
    }
    config.ensure_directories()?;

    let mut file = fs::File::create(&config.genesis_data_file)?;
    file.write_all(&GENESIS_FILE_TAG.to_le_bytes())?;
    file.write_all(&(nwitnesses as u32).to_le_bytes())?;
    file.write_all(&(maxmal as u32).to_le_bytes())?;
    for witness in 0..nwitnesses {
        let (seed, public) = crypto::generate_signing_keypair();
        file.write_all(&public)?;
        crypto::save_signing_key(&private_key_path(config, witness), &seed)?;
    }
    info!(
        nwitnesses,
        maxmal,
        file = %config.genesis_data_file.display(),
        "genesis data files created"
    );
    Ok(())
}

/// Loads and validates the public genesis data file.
pub fn load_genesis_data(config: &ChainConfig) -> ChainResult<GenesisData> {
    let bytes = fs::read(&config.genesis_data_file).map_err(|err| {
        ChainError::Config(format!(
            "error opening genesis data file {}: {err}",
            config.genesis_data_file.display()
        ))
    })?;
    if bytes.len() < 12 {
        return Err(ChainError::Config("genesis data file truncated".into()));
    }
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[..4]);
    if u32::from_le_bytes(word) != GENESIS_FILE_TAG {
        return Err(ChainError::Config("invalid genesis data file tag".into()));
    }
    word.copy_from_slice(&bytes[4..8]);
    let nwitnesses = u32::from_le_bytes(word);
    word.copy_from_slice(&bytes[8..12]);
    let maxmal = u32::from_le_bytes(word);
    if nwitnesses == 0 || nwitnesses > MAX_NWITNESSES as u32 || maxmal >= nwitnesses {
        return Err(ChainError::Config(format!(
            "genesis parameters out of range: nwitnesses {nwitnesses} maxmal {maxmal}"
        )));
    }
    let expected = 12 + nwitnesses as usize * 32;
    if bytes.len() < expected {
        return Err(ChainError::Config("genesis data file truncated".into()));
    }
    let mut signing_keys = Vec::with_capacity(nwitnesses as usize);
    for i in 0..nwitnesses as usize {
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes[12 + i * 32..12 + (i + 1) * 32]);
        signing_keys.push(key);
    }
    Ok(GenesisData {
        nwitnesses: nwitnesses as u16,
        maxmal: maxmal as u16,
        signing_keys,
    })
}

/// Loads the local witness's private seed, if this node witnesses.
fn load_witness_params(config: &ChainConfig) -> ChainResult<Option<WitnessParams>> {
    let Some(witness) = config.witness_index else {
        return Ok(None);
    };
    let seed: SigningPrivateKey = crypto::load_signing_key(&private_key_path(config, witness))?;
    Ok(Some(WitnessParams::with_keys(vec![seed])))
}

impl BlockChain {
    /// Startup entry point: creates and promotes the genesis block on a
    /// fresh store, otherwise restores the tail of indelible blocks, then
    /// starts checkpointing.
    pub fn init(
        &self,
        store: &mut dyn ChainStore,
        commitments: &mut dyn CommitmentTree,
        config: &ChainConfig,
    ) -> ChainResult<()> {
        trace!("blockchain init");
        let last_level = match store.blockchain_select_max() {
            Ok(level) => level,
            Err(err) => {
                return self
                    .fatal_err(format!("error retrieving last indelible level: {err}"));
            }
        };
        match last_level {
            None => {
                let oid = self.setup_genesis_block(config)?;
                store.valid_objs_insert(&oid)?;
                self.do_confirmations(store, commitments, &oid)?;
            }
            Some(level) => {
                info!(level, "last indelible level");
                self.startup_prune_level.store(level, Ordering::SeqCst);
                self.restore_last_blocks(store, config, level)?;
                commitments.init(store)?;
            }
        }
        self.checkpoints.start_checkpointing()?;
        Ok(())
    }

    /// Stops checkpointing on shutdown.
    pub fn deinit(&self) {
        trace!("blockchain deinit");
        self.checkpoints.stop_checkpointing();
    }

    /// Builds the genesis block (header only, no payload) from the on-disk
    /// witness-set data and inserts it into the arena unpromoted. The
    /// genesis witness field is `nwitnesses - 1` so that witness 0 is the
    /// direct successor at level 1.
    fn setup_genesis_block(&self, config: &ChainConfig) -> ChainResult<Oid> {
        trace!("setup genesis block");
        let genesis = load_genesis_data(config)?;
        let header = BlockWireHeader {
            signature: [0u8; 64],
            prior_oid: Oid::ZERO,
            level: 0,
            timestamp: 0,
            witness: (genesis.nwitnesses - 1) as u8,
        };
        let block = Block::new(header, Vec::new());

        let mut aux = BlockAux::new();
        block.set_or_verify_oid(&mut aux, true)?;
        aux.chain_params.nwitnesses = genesis.nwitnesses;
        aux.chain_params.next_nwitnesses = genesis.nwitnesses;
        aux.chain_params.maxmal = genesis.maxmal;
        aux.chain_params.next_maxmal = genesis.maxmal;
        aux.chain_params.signing_keys = genesis.signing_keys;
        aux.chain_params.set_conf_sigs();
        aux.witness_params = load_witness_params(config)?;

        info!(
            nwitnesses = aux.chain_params.nwitnesses,
            maxmal = aux.chain_params.maxmal,
            nseqconfsigs = aux.chain_params.nseqconfsigs,
            nskipconfsigs = aux.chain_params.nskipconfsigs,
            "genesis parameters"
        );
        Ok(self.arena.write().insert(block, aux, None))
    }

    /// Reloads the block at `last_level` and enough of its ancestors to
    /// resume signature-order checking, relinking them in memory and
    /// restoring each one's persisted aux record.
    fn restore_last_blocks(
        &self,
        store: &mut dyn ChainStore,
        config: &ChainConfig,
        last_level: u64,
    ) -> ChainResult<()> {
        let mut nblocks: u64 = 1;
        let mut newer: Option<Oid> = None;
        let mut index: u64 = 0;
        while index < nblocks && index <= last_level {
            let level = last_level - index;
            let Some(bytes) = store.blockchain_select(level)? else {
                return self.fatal_err(format!("error retrieving block at level {level}"));
            };
            let block = match Block::from_bytes(&bytes) {
                Ok(block) => block,
                Err(err) => {
                    return self.fatal_err(format!("error decoding stored block: {err}"));
                }
            };

            let mut aux = BlockAux::new();
            block.set_or_verify_oid(&mut aux, true)?;
            aux.witness_params = load_witness_params(config)?;

            let slot = (level % AUX_RING_SLOTS) as u8;
            let Some(raw) = store.parameter_select(ParamKey::BlockAux, slot)? else {
                return self.fatal_err(format!("error in parameter select block aux slot {slot}"));
            };
            let record: BlockAuxRecord = match bincode::deserialize(&raw) {
                Ok(record) => record,
                Err(err) => {
                    return self.fatal_err(format!("error decoding block aux record: {err}"));
                }
            };
            aux.apply_record(record);

            let prior_oid = block.header().prior_oid;
            let oid = self.arena.write().insert(block, aux, None);
            if let Some(newer_oid) = newer {
                self.arena.write().set_prior(&newer_oid, Some(oid));
            }

            if index == 0 {
                *self.last_indelible.write() = Some(oid);
                self.last_indelible_level.store(last_level, Ordering::SeqCst);

                // read enough blocks to run the signature-order check
                let (next_nwitnesses, next_maxmal) = self
                    .with_block(&oid, |entry| {
                        (
                            entry.aux.chain_params.next_nwitnesses,
                            entry.aux.chain_params.next_maxmal,
                        )
                    })
                    .unwrap_or((1, 0));
                nblocks = ((next_nwitnesses - next_maxmal) / 2 + next_maxmal + 1) as u64;

                if let Err(err) = store.valid_objs_insert(&oid) {
                    return self.fatal_err(format!("error in valid objs insert: {err}"));
                }
                if self.is_witness() {
                    if let Err(err) =
                        store.process_q_enqueue_validate(ObjKind::Block, &oid, &prior_oid, level)
                    {
                        return self
                            .fatal_err(format!("error enqueueing tip for validation: {err}"));
                    }
                }
                trace!(level, oid = %oid, "restored indelible tip");
            }

            newer = Some(oid);
            index += 1;
        }
        Ok(())
    }
}
