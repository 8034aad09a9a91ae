use crate::crypto;
use crate::errors::{ChainError, ChainResult};

use super::aux::BlockAux;
use super::{BlockHash, BlockSignature, Oid, OBJ_TAG_BLOCK, OID_BYTES, SIGNATURE_BYTES};

/// Packed wire header preceding the transaction payload. All integers are
/// little-endian; the layout is bit-exact and must not change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockWireHeader {
    pub signature: BlockSignature,
    pub prior_oid: Oid,
    pub level: u64,
    pub timestamp: u64,
    pub witness: u8,
}

pub const WIRE_HEADER_BYTES: usize = SIGNATURE_BYTES + OID_BYTES + 8 + 8 + 1;

impl BlockWireHeader {
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.signature);
        out.extend_from_slice(self.prior_oid.as_bytes());
        out.extend_from_slice(&self.level.to_le_bytes());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.push(self.witness);
    }

    pub fn read_from(bytes: &[u8]) -> ChainResult<Self> {
        if bytes.len() < WIRE_HEADER_BYTES {
            return Err(ChainError::Wire("truncated block header".into()));
        }
        let mut signature = [0u8; SIGNATURE_BYTES];
        signature.copy_from_slice(&bytes[..SIGNATURE_BYTES]);
        let mut oid = [0u8; OID_BYTES];
        oid.copy_from_slice(&bytes[SIGNATURE_BYTES..SIGNATURE_BYTES + OID_BYTES]);
        let rest = &bytes[SIGNATURE_BYTES + OID_BYTES..];
        let mut word = [0u8; 8];
        word.copy_from_slice(&rest[..8]);
        let level = u64::from_le_bytes(word);
        word.copy_from_slice(&rest[8..16]);
        let timestamp = u64::from_le_bytes(word);
        let witness = rest[16];
        Ok(Self {
            signature,
            prior_oid: Oid::from_bytes(oid),
            level,
            timestamp,
            witness,
        })
    }
}

/// Preimage signed by the producing witness. Never stored on the wire; the
/// double hash binding (prior hash and own hash) pins the block to its
/// entire ancestry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockSignedData {
    pub prior_block_hash: BlockHash,
    pub block_hash: BlockHash,
    pub block_size: u32,
    pub witness: u8,
}

impl BlockSignedData {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 + 64 + 4 + 1);
        out.extend_from_slice(&self.prior_block_hash);
        out.extend_from_slice(&self.block_hash);
        out.extend_from_slice(&self.block_size.to_le_bytes());
        out.push(self.witness);
        out
    }
}

/// Immutable block object: wire header plus transaction payload. Mutable
/// state lives in the side-car [`BlockAux`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    header: BlockWireHeader,
    payload: Vec<u8>,
}

impl Block {
    pub fn new(header: BlockWireHeader, payload: Vec<u8>) -> Self {
        Self { header, payload }
    }

    pub fn from_bytes(bytes: &[u8]) -> ChainResult<Self> {
        let header = BlockWireHeader::read_from(bytes)?;
        Ok(Self {
            header,
            payload: bytes[WIRE_HEADER_BYTES..].to_vec(),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.obj_size());
        self.header.write_to(&mut out);
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn header(&self) -> &BlockWireHeader {
        &self.header
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn obj_size(&self) -> usize {
        WIRE_HEADER_BYTES + self.payload.len()
    }

    pub fn obj_tag(&self) -> u32 {
        OBJ_TAG_BLOCK
    }

    pub fn has_tx(&self) -> bool {
        !self.payload.is_empty()
    }

    pub fn txs(&self) -> PayloadTxs<'_> {
        PayloadTxs::new(&self.payload)
    }

    /// Block hash over everything after the signature field, so a block can
    /// be hashed first and signed afterward without invalidating the hash.
    pub fn calc_hash(&self) -> BlockHash {
        let bytes = self.to_bytes();
        crypto::block_hash(&bytes[SIGNATURE_BYTES..])
    }

    pub fn calc_oid(hash: &BlockHash) -> Oid {
        crypto::oid_from_hash(hash)
    }

    /// With `bset`, computes the hash and oid into `aux`; otherwise
    /// recomputes both and fails on any mismatch with what `aux` holds.
    pub fn set_or_verify_oid(&self, aux: &mut BlockAux, bset: bool) -> ChainResult<()> {
        let hash = self.calc_hash();
        let oid = Self::calc_oid(&hash);
        if bset {
            aux.block_hash = hash;
            aux.oid = oid;
            Ok(())
        } else if aux.block_hash != hash || aux.oid != oid {
            Err(ChainError::Wire("block hash or oid mismatch".into()))
        } else {
            Ok(())
        }
    }

    pub fn signed_data(&self, aux: &BlockAux, prior_hash: &BlockHash) -> BlockSignedData {
        BlockSignedData {
            prior_block_hash: *prior_hash,
            block_hash: aux.block_hash,
            block_size: self.obj_size() as u32,
            witness: self.header.witness,
        }
    }

    /// Signs the block with the witness's private key of record, placing the
    /// signature in the header. Only the witness subsystem may call this;
    /// `aux` must already carry the block hash (see [`Self::set_or_verify_oid`]).
    pub fn sign(&mut self, aux: &BlockAux, prior_hash: &BlockHash) -> ChainResult<()> {
        let witness_params = aux
            .witness_params
            .as_ref()
            .ok_or_else(|| ChainError::Crypto("no witness signing keys present".into()))?;
        let key = witness_params
            .signing_key(self.header.witness)
            .ok_or_else(|| ChainError::Crypto("no signing key for witness slot".into()))?;
        let data = self.signed_data(aux, prior_hash).to_bytes();
        self.header.signature = crypto::sign(key, &data)?;
        Ok(())
    }

    /// Verifies the header signature against the signing-key table in force
    /// for this block. Required for every ingested block before it may enter
    /// the chain.
    pub fn verify_signature(&self, aux: &BlockAux, prior_hash: &BlockHash) -> ChainResult<()> {
        let witness = self.header.witness as u16;
        if witness >= aux.chain_params.nwitnesses {
            return Err(ChainError::Crypto("witness index out of range".into()));
        }
        let key = aux
            .chain_params
            .signing_keys
            .get(witness as usize)
            .ok_or_else(|| ChainError::Crypto("signing-key table too short".into()))?;
        let data = self.signed_data(aux, prior_hash).to_bytes();
        crypto::verify(key, &data, &self.header.signature)
    }
}

/// Iterator over the length-prefixed transaction records of a payload.
/// Yields each full record including its `u32` length field; the length
/// counts the whole record.
pub struct PayloadTxs<'a> {
    rest: &'a [u8],
}

impl<'a> PayloadTxs<'a> {
    pub fn new(payload: &'a [u8]) -> Self {
        Self { rest: payload }
    }
}

impl<'a> Iterator for PayloadTxs<'a> {
    type Item = ChainResult<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        if self.rest.len() < 4 {
            self.rest = &[];
            return Some(Err(ChainError::Wire("truncated transaction record".into())));
        }
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.rest[..4]);
        let txsize = u32::from_le_bytes(word) as usize;
        if txsize < 4 || txsize > self.rest.len() {
            self.rest = &[];
            return Some(Err(ChainError::Wire(
                "transaction record size out of bounds".into(),
            )));
        }
        let (record, rest) = self.rest.split_at(txsize);
        self.rest = rest;
        Some(Ok(record))
    }
}
