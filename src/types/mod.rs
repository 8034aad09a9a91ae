mod aux;
mod block;

pub use aux::{BlockAux, BlockAuxRecord, ChainParams, WitnessParams};
pub use block::{Block, BlockSignedData, BlockWireHeader, PayloadTxs, WIRE_HEADER_BYTES};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Hard cap on the witness table; the signing-key table and the persisted
/// aux ring are sized against it.
pub const MAX_NWITNESSES: u16 = 21;

/// Upper bound on any confirmation threshold. The aux ring in persistent
/// storage has 64 slots, so this must never exceed 64.
pub const MAX_NCONFSIGS: u16 = 64;

pub const SIGNING_KEY_BYTES: usize = 32;
pub const SIGNATURE_BYTES: usize = 64;
pub const BLOCK_HASH_BYTES: usize = 64;
pub const OID_BYTES: usize = 32;
pub const SERIALNUM_BYTES: usize = 32;
pub const COMMITMENT_BYTES: usize = 32;

pub type SigningPublicKey = [u8; SIGNING_KEY_BYTES];
pub type SigningPrivateKey = [u8; SIGNING_KEY_BYTES];
pub type BlockSignature = [u8; SIGNATURE_BYTES];
pub type BlockHash = [u8; BLOCK_HASH_BYTES];
pub type Serialnum = [u8; SERIALNUM_BYTES];
pub type Commitment = [u8; COMMITMENT_BYTES];

/// Object-framework tag carried by block objects.
pub const OBJ_TAG_BLOCK: u32 = 0x0042_4c4b;
/// Object-framework tag carried by wire transaction objects.
pub const OBJ_TAG_TX: u32 = 0x0058_5754;

/// Object classes that participate in serial-number probing and the
/// validation queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjKind {
    Block,
    Tx,
}

/// Canonical object identifier, derived from the block hash.
///
/// Equality and hashing are defined over the full value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Oid([u8; OID_BYTES]);

impl Oid {
    pub const ZERO: Oid = Oid([0u8; OID_BYTES]);

    pub fn from_bytes(bytes: [u8; OID_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; OID_BYTES] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; OID_BYTES]
    }

    /// Abbreviated form for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..3])
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", hex::encode(self.0))
    }
}

/// Serde adapter storing fixed-width byte arrays as hex strings, used for
/// the widths serde cannot derive natively.
pub mod hexser {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, const N: usize>(value: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let bytes = hex::decode(&raw).map_err(serde::de::Error::custom)?;
        if bytes.len() != N {
            return Err(serde::de::Error::custom(format!(
                "expected {} bytes, got {}",
                N,
                bytes.len()
            )));
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&bytes);
        Ok(out)
    }
}
