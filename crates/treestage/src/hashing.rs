//! Deterministic content hashes used for definition fingerprints and
//! snapshot integrity checks.

const FNV1A_OFFSET: u64 = 0xcbf29ce484222325;
const FNV1A_PRIME: u64 = 0x100000001b3;

pub fn fnv1a_init() -> u64 {
    FNV1A_OFFSET
}

pub fn fnv1a_bytes(mut hash: u64, bytes: &[u8]) -> u64 {
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV1A_PRIME);
    }
    hash
}

pub fn fnv1a_hash(bytes: &[u8]) -> u64 {
    fnv1a_bytes(fnv1a_init(), bytes)
}

/// Derives a stable 128-bit identifier from a byte string. Unlike
/// [`fnv1a_hash`] this goes through BLAKE3, so it is safe to treat the result
/// as collision-free for identity purposes.
pub fn stable_id(bytes: &[u8]) -> u128 {
    let hash = blake3::hash(bytes);
    let raw: [u8; 16] = hash.as_bytes()[0..16]
        .try_into()
        .expect("blake3 hash prefix length mismatch");
    u128::from_le_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_empty_input_is_offset_basis() {
        assert_eq!(fnv1a_hash(b""), 0xcbf29ce484222325);
    }

    #[test]
    fn fnv1a_matches_known_vector() {
        assert_eq!(fnv1a_hash(b"a"), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn fnv1a_streaming_matches_one_shot() {
        let streamed = fnv1a_bytes(fnv1a_bytes(fnv1a_init(), b"split"), b"merge");
        assert_eq!(streamed, fnv1a_hash(b"splitmerge"));
    }

    #[test]
    fn stable_id_distinguishes_inputs() {
        assert_eq!(stable_id(b"graph"), stable_id(b"graph"));
        assert_ne!(stable_id(b"graph"), stable_id(b"graphs"));
    }
}
