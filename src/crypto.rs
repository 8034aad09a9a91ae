use std::fs;
use std::path::Path;

use blake2::{Blake2b512, Digest};
use ed25519_dalek::{ExpandedSecretKey, Keypair, PublicKey, SecretKey, Signature, Verifier};
use rand::rngs::OsRng;

use crate::errors::{ChainError, ChainResult};
use crate::types::{
    BlockHash, Oid, Serialnum, SigningPrivateKey, SigningPublicKey, BLOCK_HASH_BYTES, OID_BYTES,
    SERIALNUM_BYTES,
};

/// BLAKE2b-512 over `data` with an empty key. Used for block hashes.
pub fn block_hash(data: &[u8]) -> BlockHash {
    let digest = Blake2b512::digest(data);
    let mut out = [0u8; BLOCK_HASH_BYTES];
    out.copy_from_slice(&digest);
    out
}

/// Derives an object id from a block hash: rehash, then truncate.
pub fn oid_from_hash(hash: &BlockHash) -> Oid {
    let digest = Blake2b512::digest(hash);
    let mut out = [0u8; OID_BYTES];
    out.copy_from_slice(&digest[..OID_BYTES]);
    Oid::from_bytes(out)
}

/// Uniqueness token for a transaction that carries no input serial numbers.
pub fn hash_to_serialnum(data: &[u8]) -> Serialnum {
    let digest = Blake2b512::digest(data);
    let mut out = [0u8; SERIALNUM_BYTES];
    out.copy_from_slice(&digest[..SERIALNUM_BYTES]);
    out
}

/// Ed25519 signature over `message` with the given secret seed. Nonce
/// derivation is the RFC 8032 deterministic construction; no signing-time
/// randomness exists.
pub fn sign(seed: &SigningPrivateKey, message: &[u8]) -> ChainResult<[u8; 64]> {
    let secret = SecretKey::from_bytes(seed)
        .map_err(|err| ChainError::Crypto(format!("invalid signing key: {err}")))?;
    let public = PublicKey::from(&secret);
    let expanded = ExpandedSecretKey::from(&secret);
    Ok(expanded.sign(message, &public).to_bytes())
}

pub fn verify(
    public_key: &SigningPublicKey,
    message: &[u8],
    signature: &[u8; 64],
) -> ChainResult<()> {
    let public = PublicKey::from_bytes(public_key)
        .map_err(|err| ChainError::Crypto(format!("invalid public key bytes: {err}")))?;
    let signature = Signature::from_bytes(signature)
        .map_err(|err| ChainError::Crypto(format!("invalid signature bytes: {err}")))?;
    public
        .verify(message, &signature)
        .map_err(|err| ChainError::Crypto(format!("signature verification failed: {err}")))
}

pub fn generate_signing_keypair() -> (SigningPrivateKey, SigningPublicKey) {
    let keypair = Keypair::generate(&mut OsRng);
    (keypair.secret.to_bytes(), keypair.public.to_bytes())
}

pub fn public_from_seed(seed: &SigningPrivateKey) -> ChainResult<SigningPublicKey> {
    let secret = SecretKey::from_bytes(seed)
        .map_err(|err| ChainError::Crypto(format!("invalid signing key: {err}")))?;
    Ok(PublicKey::from(&secret).to_bytes())
}

/// Writes a raw 32-byte signing seed. The key files carry no framing.
pub fn save_signing_key(path: &Path, seed: &SigningPrivateKey) -> ChainResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, seed)?;
    Ok(())
}

pub fn load_signing_key(path: &Path) -> ChainResult<SigningPrivateKey> {
    let bytes = fs::read(path)?;
    if bytes.len() != 32 {
        return Err(ChainError::Config(format!(
            "signing key file {} has {} bytes, expected 32",
            path.display(),
            bytes.len()
        )));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn block_hash_is_deterministic() {
        assert_eq!(block_hash(b"abc"), block_hash(b"abc"));
        assert_ne!(block_hash(b"abc"), block_hash(b"abd"));
    }

    #[test]
    fn oid_is_a_function_of_the_hash_alone() {
        let hash = block_hash(b"block body");
        assert_eq!(oid_from_hash(&hash), oid_from_hash(&hash));
        let other = block_hash(b"other body");
        assert_ne!(oid_from_hash(&hash), oid_from_hash(&other));
    }

    #[test]
    fn pseudo_serialnums_differ_per_payload_byte() {
        assert_eq!(hash_to_serialnum(b"tx"), hash_to_serialnum(b"tx"));
        assert_ne!(hash_to_serialnum(b"tx"), hash_to_serialnum(b"tY"));
    }

    #[test]
    fn sign_verify_roundtrip() {
        let (seed, public) = generate_signing_keypair();
        let signature = sign(&seed, b"message").unwrap();
        verify(&public, b"message", &signature).unwrap();
        assert!(verify(&public, b"messagf", &signature).is_err());

        let mut bad = signature;
        bad[0] ^= 1;
        assert!(verify(&public, b"message", &bad).is_err());
    }

    #[test]
    fn signing_is_deterministic() {
        let (seed, _) = generate_signing_keypair();
        assert_eq!(sign(&seed, b"same").unwrap(), sign(&seed, b"same").unwrap());
    }

    #[test]
    fn key_files_roundtrip_raw_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keys").join("witness_0.dat");
        let (seed, public) = generate_signing_keypair();
        save_signing_key(&path, &seed).unwrap();
        let loaded = load_signing_key(&path).unwrap();
        assert_eq!(loaded, seed);
        assert_eq!(public_from_seed(&loaded).unwrap(), public);

        fs::write(dir.path().join("short.dat"), [0u8; 5]).unwrap();
        assert!(load_signing_key(&dir.path().join("short.dat")).is_err());
    }
}
