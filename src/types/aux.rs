use serde::{Deserialize, Serialize};

use super::{hexser, BlockHash, Oid, SigningPrivateKey, SigningPublicKey, BLOCK_HASH_BYTES};

/// Consensus parameters in force for one block. Copied forward from the
/// prior block at link time, with the scheduled `next_*` values taking
/// effect at that point.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    pub nwitnesses: u16,
    pub maxmal: u16,
    pub nconfsigs: u16,
    pub nseqconfsigs: u16,
    pub nskipconfsigs: u16,

    pub next_nwitnesses: u16,
    pub next_maxmal: u16,

    /// Public signing-key table in force for signing this block, indexed by
    /// witness number.
    pub signing_keys: Vec<SigningPublicKey>,
}

impl ChainParams {
    pub fn new() -> Self {
        Self {
            nwitnesses: 0,
            maxmal: 0,
            nconfsigs: 0,
            nseqconfsigs: 0,
            nskipconfsigs: 0,
            next_nwitnesses: 0,
            next_maxmal: 0,
            signing_keys: Vec::new(),
        }
    }

    /// Recomputes the confirmation thresholds from `(nwitnesses, maxmal)`.
    ///
    /// Frozen formula:
    ///   nconfsigs     = (nwitnesses - maxmal)/2 + maxmal + 1
    ///   nseqconfsigs  = nconfsigs
    ///   nskipconfsigs = nconfsigs + (nwitnesses - maxmal)/2
    pub fn set_conf_sigs(&mut self) {
        let half = (self.nwitnesses - self.maxmal) / 2;
        self.nconfsigs = half + self.maxmal + 1;
        self.nseqconfsigs = self.nconfsigs;
        self.nskipconfsigs = self.nconfsigs + half;
    }

    /// Minimum distance two blocks from the same witness must keep; closer
    /// repeats are a double-sign pattern.
    pub fn sig_order_bound(&self) -> u16 {
        (self.nwitnesses - self.maxmal) / 2 + self.maxmal
    }

    /// Parameters a child block inherits: the scheduled witness-set changes
    /// take effect and the thresholds are recomputed.
    pub fn child_params(&self) -> ChainParams {
        let mut params = self.clone();
        params.nwitnesses = params.next_nwitnesses;
        params.maxmal = params.next_maxmal;
        params.set_conf_sigs();
        params
    }
}

impl Default for ChainParams {
    fn default() -> Self {
        Self::new()
    }
}

/// Witness-side state, present only on nodes that witness. The score fields
/// cache the skip score of the subchain ending at this block; `score_genstamp`
/// tags the fork-choice round the cache belongs to (0 = never computed).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WitnessParams {
    pub score: u64,
    pub score_bits: u16,
    pub score_genstamp: u16,
    pub signing_keys: Vec<SigningPrivateKey>,
}

impl WitnessParams {
    pub fn new() -> Self {
        Self::with_keys(Vec::new())
    }

    pub fn with_keys(signing_keys: Vec<SigningPrivateKey>) -> Self {
        Self {
            score: 0,
            score_bits: 0,
            score_genstamp: 0,
            signing_keys,
        }
    }

    /// Private key for a witness slot. A single-key table signs for every
    /// slot (the normal case); a longer table is indexed per witness, which
    /// only happens when one node simulates several witnesses.
    pub fn signing_key(&self, witness: u8) -> Option<&SigningPrivateKey> {
        if self.signing_keys.len() == 1 {
            self.signing_keys.first()
        } else {
            self.signing_keys.get(witness as usize)
        }
    }
}

impl Default for WitnessParams {
    fn default() -> Self {
        Self::new()
    }
}

/// Mutable side-car state attached to an in-memory block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockAux {
    pub oid: Oid,
    pub block_hash: BlockHash,
    pub announce_time: u64,
    pub skip: u16,
    pub marked_for_indelible: bool,
    pub chain_params: ChainParams,
    pub witness_params: Option<WitnessParams>,
}

impl BlockAux {
    pub fn new() -> Self {
        Self {
            oid: Oid::ZERO,
            block_hash: [0u8; BLOCK_HASH_BYTES],
            announce_time: 0,
            skip: 0,
            marked_for_indelible: false,
            chain_params: ChainParams::new(),
            witness_params: None,
        }
    }

    /// The persisted slice of the aux state: everything through the chain
    /// parameters. Witness-side state never reaches storage.
    pub fn record(&self) -> BlockAuxRecord {
        BlockAuxRecord {
            oid: self.oid,
            block_hash: self.block_hash,
            announce_time: self.announce_time,
            skip: self.skip,
            marked_for_indelible: self.marked_for_indelible,
            chain_params: self.chain_params.clone(),
        }
    }

    pub fn apply_record(&mut self, record: BlockAuxRecord) {
        self.oid = record.oid;
        self.block_hash = record.block_hash;
        self.announce_time = record.announce_time;
        self.skip = record.skip;
        self.marked_for_indelible = record.marked_for_indelible;
        self.chain_params = record.chain_params;
    }
}

impl Default for BlockAux {
    fn default() -> Self {
        Self::new()
    }
}

/// Aux state as persisted in the parameter ring, keyed by `level mod 64`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockAuxRecord {
    pub oid: Oid,
    #[serde(with = "hexser")]
    pub block_hash: BlockHash,
    pub announce_time: u64,
    pub skip: u16,
    pub marked_for_indelible: bool,
    pub chain_params: ChainParams,
}
