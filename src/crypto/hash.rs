use sha2::{Digest, Sha256};

pub type Hash32 = [u8; 32];

pub fn sha256(bytes: &[u8]) -> Hash32 {
    let mut h = Sha256::new();
    h.update(bytes);
    h.finalize().into()
}

/// First 8 bytes of the digest, reversed, read as u64. Used for ids and addresses.
pub fn digest_to_u64(digest: &Hash32) -> u64 {
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    head.reverse();
    u64::from_be_bytes(head)
}
