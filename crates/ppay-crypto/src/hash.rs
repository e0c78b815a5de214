use sha2::{Digest, Sha256, Sha512};

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(data);
    let out = h.finalize();
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&out);
    arr
}

/// Seed derivation for signature-derived identities: the first 32 bytes of SHA-512(input).
pub fn seed_from_bytes(data: &[u8]) -> [u8; 32] {
    let mut h = Sha512::new();
    h.update(data);
    let out = h.finalize();
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&out[..32]);
    seed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_seed_is_sha512_prefix() {
        // SHA-512("abc") starts with ddaf35a193617aba...
        let seed = seed_from_bytes(b"abc");
        assert_eq!(hex::encode(&seed[..8]), "ddaf35a193617aba");
    }
}
