//! Application signing key with redacted formatting.

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
use rand::Rng;
// self
use crate::{_prelude::*, error::KeyError};

/// MAC key owned by an application; never leaves it and never appears in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey(Vec<u8>);
impl SigningKey {
	/// Minimum accepted key length in bytes.
	pub const MIN_LEN: usize = 32;

	/// Generates a fresh random key of the minimum length.
	pub fn generate() -> Self {
		Self(rand::rng().random::<[u8; Self::MIN_LEN]>().to_vec())
	}

	/// Wraps caller-provided key material after a length check.
	pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self, KeyError> {
		let bytes = bytes.into();

		if bytes.len() < Self::MIN_LEN {
			return Err(KeyError::TooShort { min: Self::MIN_LEN, got: bytes.len() });
		}

		Ok(Self(bytes))
	}

	/// Decodes standard-base64 key material, as carried by the `SIGNING_KEY` environment variable.
	pub fn from_base64(view: &str) -> Result<Self, KeyError> {
		let bytes = STANDARD.decode(view).map_err(|_| KeyError::Base64)?;

		Self::from_bytes(bytes)
	}

	/// Returns the raw key material. Callers must avoid logging this slice.
	pub(crate) fn expose(&self) -> &[u8] {
		&self.0
	}
}
impl Debug for SigningKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("SigningKey").field(&"<redacted>").finish()
	}
}
impl Display for SigningKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn short_keys_are_rejected() {
		let error = SigningKey::from_bytes(vec![0; 16]).expect_err("A 16-byte key must fail.");

		assert_eq!(error, KeyError::TooShort { min: 32, got: 16 });
		assert!(SigningKey::from_bytes(vec![0; 32]).is_ok());
	}

	#[test]
	fn base64_round_trip() {
		let key = SigningKey::generate();
		let encoded = STANDARD.encode(key.expose());
		let decoded = SigningKey::from_base64(&encoded).expect("Encoded key should decode.");

		assert_eq!(decoded, key);
		assert!(SigningKey::from_base64("not-base64!").is_err());
	}

	#[test]
	fn formatters_redact() {
		let key = SigningKey::generate();

		assert_eq!(format!("{key:?}"), "SigningKey(\"<redacted>\")");
		assert_eq!(format!("{key}"), "<redacted>");
	}
}
