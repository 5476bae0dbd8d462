//! Salted, memory-hard passphrase hashing and verification.
//!
//! scrypt with fixed work parameters (N = 2^14, r = 8, p = 1, 32-byte key),
//! 16-byte random salts, hex-encoded at rest. Verification re-derives with the
//! stored salt and compares in constant time; malformed stored material is a
//! plain `false`, never an error the caller could distinguish.

use anyhow::Result;
use rand::RngCore;
use scrypt::Params;
use subtle::ConstantTimeEq;

use super::normalize::normalize_passphrase;

const SCRYPT_LOG_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;
const KEY_LEN: usize = 32;
const SALT_LEN: usize = 16;

fn derive(passphrase: &str, salt: &[u8]) -> Result<[u8; KEY_LEN]> {
    let params = Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, KEY_LEN)
        .map_err(|e| anyhow::anyhow!("invalid scrypt params: {e}"))?;
    let norm = normalize_passphrase(passphrase);
    let mut out = [0u8; KEY_LEN];
    scrypt::scrypt(norm.as_bytes(), salt, &params, &mut out)
        .map_err(|e| anyhow::anyhow!("scrypt derivation failed: {e}"))?;
    Ok(out)
}

/// Hash a passphrase, generating a random salt when none is supplied.
/// Returns `(salt_hex, hash_hex)`.
pub fn hash_passphrase(passphrase: &str, salt: Option<[u8; SALT_LEN]>) -> Result<(String, String)> {
    let salt = salt.unwrap_or_else(|| {
        let mut s = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut s);
        s
    });
    let key = derive(passphrase, &salt)?;
    Ok((hex::encode(salt), hex::encode(key)))
}

/// Verify an attempt against a stored salt + digest.
///
/// The digest comparison is constant-time. Every failure mode — bad hex,
/// wrong digest length, derivation error — resolves to `false`.
pub fn verify_passphrase(salt_hex: &str, hash_hex: &str, attempt: &str) -> bool {
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    let Ok(expected) = hex::decode(hash_hex) else {
        return false;
    };
    if expected.len() != KEY_LEN {
        return false;
    }
    let Ok(calc) = derive(attempt, &salt) else {
        return false;
    };
    calc.ct_eq(expected.as_slice()).into()
}
