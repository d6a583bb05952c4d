//! Streaming AES-256-CBC codec.
//!
//! Ciphertext is the raw CBC output with PKCS#7 padding, no header, using the
//! fixed key and IV from [`CipherKey`]. Both directions stream in
//! `CIPHER_CHUNK_SIZE` pieces; decryption holds back the last block until the
//! end of input so the padding can be checked.

use crate::constants::{
    CIPHER_BLOCK_SIZE, CIPHER_CHUNK_SIZE, DEFAULT_CIPHER_IV, DEFAULT_CIPHER_KEY,
    REDACTED_PLACEHOLDER, TEXT_EXTENSIONS,
};
use crate::crypto::text;
use crate::errors::{AppError, AppResult, CryptoError};
use aes::Aes256;
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, warn};
use zeroize::Zeroizing;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Key material for the codec: a 256-bit key and a fixed 128-bit IV.
///
/// The key bytes are zeroized on drop. `Default` yields the deployment
/// constants shared with the encrypting counterpart.
#[derive(Clone)]
pub struct CipherKey {
    key: Zeroizing<[u8; 32]>,
    iv: [u8; 16],
}

impl CipherKey {
    /// Creates key material from raw bytes.
    pub fn new(key: [u8; 32], iv: [u8; 16]) -> Self {
        Self {
            key: Zeroizing::new(key),
            iv,
        }
    }
}

impl Default for CipherKey {
    fn default() -> Self {
        Self::new(*DEFAULT_CIPHER_KEY, *DEFAULT_CIPHER_IV)
    }
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherKey")
            .field("key", &REDACTED_PLACEHOLDER)
            .field("iv", &REDACTED_PLACEHOLDER)
            .finish()
    }
}

/// How decrypted bytes are written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// Bytes are written exactly as decrypted.
    Binary,
    /// Bytes are passed through [`text::normalize`] first.
    Text,
}

impl PayloadKind {
    /// Picks the payload kind from the destination's extension.
    ///
    /// # Example
    ///
    /// ```
    /// use encedit::crypto::PayloadKind;
    /// use std::path::Path;
    ///
    /// assert_eq!(PayloadKind::for_path(Path::new("notes.TXT")), PayloadKind::Text);
    /// assert_eq!(PayloadKind::for_path(Path::new("report.pdf")), PayloadKind::Binary);
    /// ```
    pub fn for_path(path: &Path) -> Self {
        let is_text = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                TEXT_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            });

        if is_text {
            PayloadKind::Text
        } else {
            PayloadKind::Binary
        }
    }
}

/// What [`CipherCodec::decrypt`] actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptOutcome {
    /// The input was valid ciphertext and was decrypted.
    Decrypted,
    /// The input did not look like ciphertext and was copied unchanged.
    ///
    /// This keeps already-plaintext artifacts openable. It also hides real
    /// corruption, so callers record it as a warning.
    CopiedVerbatim,
}

/// Streaming encrypt/decrypt transform bound to one [`CipherKey`].
#[derive(Debug, Clone, Default)]
pub struct CipherCodec {
    key: CipherKey,
}

impl CipherCodec {
    /// Creates a codec using the given key material.
    pub fn new(key: CipherKey) -> Self {
        Self { key }
    }

    fn encryptor(&self) -> Aes256CbcEnc {
        Aes256CbcEnc::new(&(*self.key.key).into(), &self.key.iv.into())
    }

    fn decryptor(&self) -> Aes256CbcDec {
        Aes256CbcDec::new(&(*self.key.key).into(), &self.key.iv.into())
    }

    /// Encrypts everything readable from `src` into `dst` and flushes `dst`.
    ///
    /// Returns the number of ciphertext bytes written.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Io` if either stream fails. There is no fallback.
    pub fn encrypt<R: Read, W: Write>(&self, mut src: R, mut dst: W) -> Result<u64, CryptoError> {
        let mut cipher = self.encryptor();
        let mut buf = vec![0u8; CIPHER_CHUNK_SIZE];
        let mut pending: Vec<u8> = Vec::with_capacity(CIPHER_CHUNK_SIZE + CIPHER_BLOCK_SIZE);
        let mut written = 0u64;

        loop {
            let n = read_some(&mut src, &mut buf)?;
            if n == 0 {
                break;
            }
            pending.extend_from_slice(&buf[..n]);

            let full = pending.len() - pending.len() % CIPHER_BLOCK_SIZE;
            if full > 0 {
                for block in pending[..full].chunks_exact_mut(CIPHER_BLOCK_SIZE) {
                    cipher.encrypt_block_mut(GenericArray::from_mut_slice(block));
                }
                dst.write_all(&pending[..full])?;
                written += full as u64;
                pending.drain(..full);
            }
        }

        // PKCS#7: always at least one byte of padding.
        let pad = CIPHER_BLOCK_SIZE - pending.len();
        pending.resize(CIPHER_BLOCK_SIZE, pad as u8);
        cipher.encrypt_block_mut(GenericArray::from_mut_slice(&mut pending));
        dst.write_all(&pending)?;
        dst.flush()?;
        written += CIPHER_BLOCK_SIZE as u64;

        debug!(bytes = written, "Encrypted stream");
        Ok(written)
    }

    /// Decrypts `src` into `dst`, falling back to a verbatim copy when `src`
    /// is not valid ciphertext.
    ///
    /// Both streams are rewound to where they started before the fallback
    /// copy. Everything written by a failed decryption is shorter than the
    /// source, so the copy always overwrites it completely.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Io` when a stream fails. Format errors never
    /// escape this function.
    pub fn decrypt<R, W>(
        &self,
        mut src: R,
        mut dst: W,
        kind: PayloadKind,
    ) -> Result<DecryptOutcome, CryptoError>
    where
        R: Read + Seek,
        W: Write + Seek,
    {
        let src_start = src.stream_position()?;
        let dst_start = dst.stream_position()?;

        match self.decrypt_strict(&mut src, &mut dst, kind) {
            Ok(()) => Ok(DecryptOutcome::Decrypted),
            Err(e) if e.is_format_error() => {
                warn!(error = %e, "Input is not valid ciphertext, copying it unchanged");
                src.seek(SeekFrom::Start(src_start))?;
                dst.seek(SeekFrom::Start(dst_start))?;
                io::copy(&mut src, &mut dst)?;
                dst.flush()?;
                Ok(DecryptOutcome::CopiedVerbatim)
            }
            Err(e) => Err(e),
        }
    }

    /// Decrypts `src` into `dst` with no fallback.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidLength` or `CryptoError::InvalidPadding`
    /// for input that is not ciphertext under this key, and `CryptoError::Io`
    /// when a stream fails.
    pub fn decrypt_strict<R: Read, W: Write>(
        &self,
        src: R,
        mut dst: W,
        kind: PayloadKind,
    ) -> Result<(), CryptoError> {
        match kind {
            PayloadKind::Binary => {
                self.decrypt_blocks(src, &mut dst)?;
            }
            PayloadKind::Text => {
                let mut plain = Vec::new();
                self.decrypt_blocks(src, &mut plain)?;
                dst.write_all(&text::normalize(&plain))?;
            }
        }
        dst.flush()?;
        Ok(())
    }

    fn decrypt_blocks<R: Read, W: Write>(&self, mut src: R, dst: &mut W) -> Result<u64, CryptoError> {
        let mut cipher = self.decryptor();
        let mut buf = vec![0u8; CIPHER_CHUNK_SIZE];
        let mut pending: Vec<u8> = Vec::with_capacity(CIPHER_CHUNK_SIZE + CIPHER_BLOCK_SIZE);
        let mut total = 0u64;
        let mut written = 0u64;

        loop {
            let n = read_some(&mut src, &mut buf)?;
            if n == 0 {
                break;
            }
            total += n as u64;
            pending.extend_from_slice(&buf[..n]);

            // The last complete block may be the padded one; keep it back.
            let full = pending.len() - pending.len() % CIPHER_BLOCK_SIZE;
            let ready = if full == pending.len() {
                full.saturating_sub(CIPHER_BLOCK_SIZE)
            } else {
                full
            };
            if ready > 0 {
                for block in pending[..ready].chunks_exact_mut(CIPHER_BLOCK_SIZE) {
                    cipher.decrypt_block_mut(GenericArray::from_mut_slice(block));
                }
                dst.write_all(&pending[..ready])?;
                written += ready as u64;
                pending.drain(..ready);
            }
        }

        if total == 0 || total % CIPHER_BLOCK_SIZE as u64 != 0 {
            return Err(CryptoError::InvalidLength { len: total });
        }

        cipher.decrypt_block_mut(GenericArray::from_mut_slice(&mut pending));
        let pad = usize::from(pending[CIPHER_BLOCK_SIZE - 1]);
        if pad == 0
            || pad > CIPHER_BLOCK_SIZE
            || pending[CIPHER_BLOCK_SIZE - pad..]
                .iter()
                .any(|&b| usize::from(b) != pad)
        {
            return Err(CryptoError::InvalidPadding);
        }

        let tail = CIPHER_BLOCK_SIZE - pad;
        dst.write_all(&pending[..tail])?;
        written += tail as u64;

        debug!(bytes = written, "Decrypted stream");
        Ok(written)
    }

    /// Encrypts the file at `src` into `dst`, creating or truncating `dst`.
    ///
    /// The destination is synced to disk before returning.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` when a file cannot be opened or synced, and
    /// `AppError::Crypto` when streaming fails.
    pub fn encrypt_file(&self, src: &Path, dst: &Path) -> AppResult<u64> {
        let input = BufReader::new(File::open(src)?);
        let mut output = BufWriter::new(File::create(dst)?);

        let written = self.encrypt(input, &mut output)?;
        let file = output.into_inner().map_err(|e| AppError::Io(e.into_error()))?;
        file.sync_all()?;
        Ok(written)
    }

    /// Decrypts the file at `src` into a new file at `dst`.
    ///
    /// The payload kind is picked from `dst`'s extension, and the copy
    /// fallback applies.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` when a file cannot be opened, created or synced,
    /// and `AppError::Crypto` when streaming fails.
    pub fn decrypt_file(&self, src: &Path, dst: &Path) -> AppResult<DecryptOutcome> {
        let kind = PayloadKind::for_path(dst);
        let input = BufReader::new(File::open(src)?);
        let mut output = BufWriter::new(File::create(dst)?);

        let outcome = self.decrypt(input, &mut output, kind)?;
        let file = output.into_inner().map_err(|e| AppError::Io(e.into_error()))?;
        file.sync_all()?;
        debug!(?kind, ?outcome, "Decrypted {:?} into {:?}", src, dst);
        Ok(outcome)
    }
}

fn read_some<R: Read>(src: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match src.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encrypt_bytes(codec: &CipherCodec, plain: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        codec.encrypt(plain, &mut out).unwrap();
        out
    }

    fn decrypt_bytes(codec: &CipherCodec, cipher: Vec<u8>, kind: PayloadKind) -> (Vec<u8>, DecryptOutcome) {
        let mut out = Cursor::new(Vec::new());
        let outcome = codec.decrypt(Cursor::new(cipher), &mut out, kind).unwrap();
        (out.into_inner(), outcome)
    }

    #[test]
    fn test_ciphertext_length_is_padded_to_block() {
        let codec = CipherCodec::default();
        assert_eq!(encrypt_bytes(&codec, b"").len(), 16);
        assert_eq!(encrypt_bytes(&codec, &[7u8; 15]).len(), 16);
        assert_eq!(encrypt_bytes(&codec, &[7u8; 16]).len(), 32);
        assert_eq!(encrypt_bytes(&codec, &[7u8; 33]).len(), 48);
    }

    #[test]
    fn test_binary_roundtrip_across_chunk_boundaries() {
        let codec = CipherCodec::default();
        let plain: Vec<u8> = (0..(CIPHER_CHUNK_SIZE * 2 + 5))
            .map(|i| (i % 251) as u8)
            .collect();

        let cipher = encrypt_bytes(&codec, &plain);
        let (decrypted, outcome) = decrypt_bytes(&codec, cipher, PayloadKind::Binary);

        assert_eq!(outcome, DecryptOutcome::Decrypted);
        assert_eq!(decrypted, plain);
    }

    #[test]
    fn test_empty_plaintext_roundtrip() {
        let codec = CipherCodec::default();
        let cipher = encrypt_bytes(&codec, b"");
        let (decrypted, outcome) = decrypt_bytes(&codec, cipher, PayloadKind::Binary);
        assert_eq!(outcome, DecryptOutcome::Decrypted);
        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_fixed_iv_is_deterministic() {
        let codec = CipherCodec::default();
        let first = encrypt_bytes(&codec, b"hello");
        assert_eq!(encrypt_bytes(&codec, b"hello"), first);

        let (plain, _) = decrypt_bytes(&codec, first, PayloadKind::Binary);
        assert_eq!(plain, b"hello");
    }

    #[test]
    fn test_strict_decrypt_rejects_short_input() {
        let codec = CipherCodec::default();
        let err = codec
            .decrypt_strict(&b"not a block"[..], Vec::new(), PayloadKind::Binary)
            .unwrap_err();
        assert!(matches!(err, CryptoError::InvalidLength { len: 11 }));
    }

    #[test]
    fn test_strict_decrypt_rejects_empty_input() {
        let codec = CipherCodec::default();
        let err = codec
            .decrypt_strict(&b""[..], Vec::new(), PayloadKind::Binary)
            .unwrap_err();
        assert!(matches!(err, CryptoError::InvalidLength { len: 0 }));
    }

    #[test]
    fn test_wrong_key_never_yields_plaintext() {
        let writer = CipherCodec::new(CipherKey::new([1u8; 32], [2u8; 16]));
        let reader = CipherCodec::new(CipherKey::new([3u8; 32], [2u8; 16]));

        let cipher = encrypt_bytes(&writer, b"payload under another key");
        let (out, outcome) = decrypt_bytes(&reader, cipher.clone(), PayloadKind::Binary);

        assert_ne!(out, b"payload under another key");
        if outcome == DecryptOutcome::CopiedVerbatim {
            assert_eq!(out, cipher);
        }
    }

    #[test]
    fn test_plaintext_input_is_copied_verbatim() {
        let codec = CipherCodec::default();
        let plain = b"already plaintext, 37 bytes of it...".to_vec();
        assert_ne!(plain.len() % CIPHER_BLOCK_SIZE, 0);

        let (out, outcome) = decrypt_bytes(&codec, plain.clone(), PayloadKind::Binary);
        assert_eq!(outcome, DecryptOutcome::CopiedVerbatim);
        assert_eq!(out, plain);
    }

    #[test]
    fn test_text_payload_is_normalized() {
        let codec = CipherCodec::default();
        let cipher = encrypt_bytes(&codec, b"line\r\nnext");
        let (out, outcome) = decrypt_bytes(&codec, cipher, PayloadKind::Text);

        assert_eq!(outcome, DecryptOutcome::Decrypted);
        assert_eq!(&out[..3], text::UTF8_BOM);
        assert_eq!(&out[3..], b"line\r\nnext");
    }

    #[test]
    fn test_payload_kind_for_path() {
        assert_eq!(PayloadKind::for_path(Path::new("a.txt")), PayloadKind::Text);
        assert_eq!(PayloadKind::for_path(Path::new("a.Txt")), PayloadKind::Text);
        assert_eq!(PayloadKind::for_path(Path::new("a.docx")), PayloadKind::Binary);
        assert_eq!(PayloadKind::for_path(Path::new("noext")), PayloadKind::Binary);
    }

    #[test]
    fn test_cipher_key_debug_is_redacted() {
        let rendered = format!("{:?}", CipherKey::default());
        assert!(rendered.contains(REDACTED_PLACEHOLDER));
        assert!(!rendered.contains("0123456789abcdef"));
    }
}
