//! Keyed pseudonyms for hardware addresses.
//!
//! Reports never carry a raw MAC address. Each sighting is identified by a
//! short one-way digest of the address and a shared secret, so the receiving
//! endpoint can correlate sightings of one device within a key's lifetime
//! without learning the hardware identifier.

use crate::mac_address::MacAddress;
use sha2::{Digest, Sha256};

/// Length of the emitted pseudonym in hex characters.
///
/// 12 hex chars (48 bits) keeps tokens short while making collisions between
/// the handful of devices visible to one scanner vanishingly unlikely.
pub const PSEUDONYM_LEN: usize = 12;

/// Derive the pseudonym for a hardware address under the given secret.
///
/// The address is canonicalized (lowercase hex, no separators) before
/// hashing, so textual representation differences between discovery backends
/// cannot split one physical device into two pseudonyms. Deterministic:
/// equal (address, secret) pairs always produce equal tokens.
pub fn pseudonymize(mac: MacAddress, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(mac.to_hex().as_bytes());
    hasher.update(secret.as_bytes());
    let digest = hasher.finalize();

    use std::fmt::Write;
    let mut hex = String::with_capacity(PSEUDONYM_LEN);
    for byte in digest.iter().take(PSEUDONYM_LEN.div_ceil(2)) {
        let _ = write!(hex, "{:02x}", byte);
    }
    hex.truncate(PSEUDONYM_LEN);
    hex
}
