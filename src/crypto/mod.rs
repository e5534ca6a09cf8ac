//! Token-derived key material.
//!
//! Every call derives `key = MD5(token)` and `iv = MD5(key || token)` from the
//! device token. Keys are never cached between calls.

use std::fmt;

use md5::{Digest, Md5};

pub mod cipher;

/// Pre-shared 16-byte device secret.
pub type Token = [u8; 16];

pub const KEY_LEN: usize = 16;

/// AES-128 key and CBC initialization vector derived from a device token.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceKeys {
    key: [u8; KEY_LEN],
    iv: [u8; KEY_LEN],
}

impl DeviceKeys {
    pub fn from_token(token: &Token) -> Self {
        let key = md5_digest(&[&token[..]]);
        let iv = md5_digest(&[&key[..], &token[..]]);
        Self { key, iv }
    }

    pub fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    pub fn iv(&self) -> &[u8; KEY_LEN] {
        &self.iv
    }
}

impl fmt::Debug for DeviceKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceKeys")
            .field("key", &"<redacted>")
            .field("iv", &"<redacted>")
            .finish()
    }
}

/// MD5 over the concatenation of `chunks`.
pub(crate) fn md5_digest(chunks: &[&[u8]]) -> [u8; 16] {
    let mut hasher = Md5::new();
    for chunk in chunks {
        hasher.update(chunk);
    }
    let mut out = [0u8; 16];
    out.copy_from_slice(&hasher.finalize());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    fn sequential_token() -> Token {
        let mut token = [0u8; 16];
        for (i, b) in token.iter_mut().enumerate() {
            *b = i as u8;
        }
        token
    }

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    #[test]
    fn golden_key_and_iv() {
        let keys = DeviceKeys::from_token(&sequential_token());
        assert_eq!(hex(keys.key()), "1ac1ef01e96caf1be0d329331a4fc2a8");
        assert_eq!(hex(keys.iv()), "9ae5383e3c6e0606c15da7847fcd1d42");
    }

    #[test]
    fn derivation_is_deterministic() {
        let mut rng = rand::thread_rng();
        for _ in 0..16 {
            let mut token = [0u8; 16];
            rng.fill_bytes(&mut token);
            assert_eq!(DeviceKeys::from_token(&token), DeviceKeys::from_token(&token));
        }
    }

    #[test]
    fn distinct_tokens_give_distinct_keys() {
        let a = DeviceKeys::from_token(&[0u8; 16]);
        let b = DeviceKeys::from_token(&[1u8; 16]);
        assert_ne!(a.key(), b.key());
        assert_ne!(a.iv(), b.iv());
    }

    #[test]
    fn iv_chains_key_and_token() {
        let token = sequential_token();
        let keys = DeviceKeys::from_token(&token);
        assert_eq!(keys.iv(), &md5_digest(&[&keys.key()[..], &token[..]]));
    }

    #[test]
    fn debug_redacts_material() {
        let keys = DeviceKeys::from_token(&sequential_token());
        let rendered = format!("{:?}", keys);
        assert!(rendered.contains("redacted"));
        assert!(!rendered.contains("1ac1"));
    }
}
