//! Random value generation backed by the OS-seeded thread RNG

use rand::RngCore;

/// Hex-encode `len` random bytes
pub fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
