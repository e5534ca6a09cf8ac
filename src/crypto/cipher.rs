//! AES-128-CBC payload codec.
//!
//! Outgoing payloads always receive PKCS#7 padding (a full extra block when the
//! plaintext is already aligned). Incoming payloads are decrypted as-is and
//! keep their padding; callers that want the bare JSON use [`strip_padding`].

use cbc::cipher::block_padding::{NoPadding, Pkcs7};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use super::DeviceKeys;
use crate::error::FrameError;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

pub const BLOCK_SIZE: usize = 16;

/// Length of the ciphertext produced for a plaintext of `len` bytes.
pub fn padded_len(len: usize) -> usize {
    len + (BLOCK_SIZE - len % BLOCK_SIZE)
}

pub fn encrypt(keys: &DeviceKeys, plaintext: &[u8]) -> Vec<u8> {
    Aes128CbcEnc::new(&(*keys.key()).into(), &(*keys.iv()).into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// Decrypts `ciphertext`, leaving any padding bytes in place.
pub fn decrypt(keys: &DeviceKeys, ciphertext: &[u8]) -> Result<Vec<u8>, FrameError> {
    if ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(FrameError::UnalignedCiphertext(ciphertext.len()));
    }
    Aes128CbcDec::new(&(*keys.key()).into(), &(*keys.iv()).into())
        .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
        .map_err(|_| FrameError::UnalignedCiphertext(ciphertext.len()))
}

/// Removes a well-formed PKCS#7 tail. Input without valid padding is returned unchanged.
pub fn strip_padding(buf: &[u8]) -> &[u8] {
    let Some(&last) = buf.last() else {
        return buf;
    };
    let pad = last as usize;
    if pad == 0 || pad > BLOCK_SIZE || pad > buf.len() {
        return buf;
    }
    let (body, tail) = buf.split_at(buf.len() - pad);
    if tail.iter().all(|&b| b == last) {
        body
    } else {
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Token;

    const GET_POWER: &[u8] = br#"{"id":1,"method":"get_prop","params":["power"]}"#;

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
    fn golden_ciphertext_for_get_prop() {
        let keys = DeviceKeys::from_token(&sequential_token());
        let ciphertext = encrypt(&keys, GET_POWER);
        assert_eq!(
            hex(&ciphertext),
            "2c9dfc761522a115e1c2ce9e6e74852274df7a6b344a386f88bb545cdccad007\
             7d1fba5a136c6c9428804423e8ec547c"
        );
    }

    #[test]
    fn aligned_plaintext_gains_full_block() {
        let keys = DeviceKeys::from_token(&sequential_token());
        for len in [0usize, 16, 32, 64] {
            let plaintext = vec![0x41u8; len];
            let ciphertext = encrypt(&keys, &plaintext);
            assert_eq!(ciphertext.len(), len + BLOCK_SIZE);
            assert_eq!(padded_len(len), len + BLOCK_SIZE);
        }
    }

    #[test]
    fn decrypt_keeps_padding() {
        let keys = DeviceKeys::from_token(&sequential_token());
        let decrypted = decrypt(&keys, &encrypt(&keys, GET_POWER)).unwrap();
        // 47 bytes of JSON, one padding byte of value 0x01
        assert_eq!(decrypted.len(), 48);
        assert_eq!(&decrypted[..GET_POWER.len()], GET_POWER);
        assert_eq!(decrypted[47], 0x01);

        let aligned = [0x7bu8; 32];
        let decrypted = decrypt(&keys, &encrypt(&keys, &aligned)).unwrap();
        assert_eq!(&decrypted[..32], &aligned);
        assert_eq!(&decrypted[32..], &[16u8; 16]);
    }

    #[test]
    fn round_trip_appends_padding_for_every_length() {
        let keys = DeviceKeys::from_token(&sequential_token());
        for len in 0..=48usize {
            let plaintext: Vec<u8> = (0..len).map(|i| (i * 7) as u8).collect();
            let pad = BLOCK_SIZE - len % BLOCK_SIZE;
            let mut expected = plaintext.clone();
            expected.extend(std::iter::repeat(pad as u8).take(pad));

            let decrypted = decrypt(&keys, &encrypt(&keys, &plaintext)).unwrap();
            assert_eq!(decrypted, expected, "plaintext length {}", len);
        }
    }

    #[test]
    fn unaligned_ciphertext_is_rejected() {
        let keys = DeviceKeys::from_token(&sequential_token());
        let err = decrypt(&keys, &[0u8; 17]).unwrap_err();
        assert!(matches!(err, FrameError::UnalignedCiphertext(17)));
    }

    #[test]
    fn strip_padding_handles_valid_and_invalid_tails() {
        assert_eq!(strip_padding(b"abc\x03\x03\x03"), b"abc");
        assert_eq!(strip_padding(&[16u8; 16]), b"");
        assert_eq!(strip_padding(b"abc\x02\x03"), b"abc\x02\x03");
        assert_eq!(strip_padding(b"abc\x00"), b"abc\x00");
        assert_eq!(strip_padding(b""), b"");
    }
}
