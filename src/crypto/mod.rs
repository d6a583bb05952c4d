//! Cipher operations for encrypted artifacts.
//!
//! This module provides the streaming AES-256-CBC codec used to turn an
//! artifact into its working plaintext and back. The key and IV are a fixed
//! deployment secret shared with whatever produced the artifact; they are
//! injected as a [`CipherKey`] rather than read from globals.
//!
//! # Module Structure
//!
//! - `codec`: Streaming encrypt/decrypt with the copy fallback for non-ciphertext input
//! - `text`: UTF-8 normalization applied to text payloads on decrypt
//!
//! # Example
//!
//! ```
//! use encedit::crypto::{CipherCodec, CipherKey, DecryptOutcome, PayloadKind};
//! use std::io::Cursor;
//!
//! let codec = CipherCodec::new(CipherKey::default());
//!
//! let mut ciphertext = Vec::new();
//! codec.encrypt(&b"quarterly numbers"[..], &mut ciphertext)?;
//!
//! let mut plaintext = Cursor::new(Vec::new());
//! let outcome = codec.decrypt(Cursor::new(ciphertext), &mut plaintext, PayloadKind::Binary)?;
//! assert_eq!(outcome, DecryptOutcome::Decrypted);
//! assert_eq!(plaintext.into_inner(), b"quarterly numbers");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod codec;
pub mod text;

// Re-export commonly used types
pub use self::codec::{CipherCodec, CipherKey, DecryptOutcome, PayloadKind};
