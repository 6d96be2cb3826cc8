//! Strongly typed 128-bit identifiers for applications and pages.

// std
use std::fmt::Write;
// crates.io
use rand::Rng;
// self
use crate::_prelude::*;

macro_rules! def_id {
	($name:ident, $doc:literal, $kind:literal) => {
		#[doc = $doc]
		#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name([u8; 16]);
		impl $name {
			/// Generates a fresh random identifier.
			pub fn random() -> Self {
				Self(rand::rng().random())
			}

			/// Returns the raw 16-byte value.
			pub const fn as_bytes(&self) -> &[u8; 16] {
				&self.0
			}

			/// Reconstructs an identifier from its raw 16-byte value.
			pub const fn from_bytes(bytes: [u8; 16]) -> Self {
				Self(bytes)
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.to_string()
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				value.parse()
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&encode_hex(&self.0))
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				decode_hex($kind, s).map(Self)
			}
		}
	};
}

/// Error returned when an identifier's wire form cannot be parsed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier is not exactly 32 lowercase hex characters.
	#[error("{kind} identifier must be 32 lowercase hex characters.")]
	Malformed {
		/// Kind of identifier (application, page).
		kind: &'static str,
	},
}

def_id! { ApplicationId, "Unique identifier for an application registry.", "Application" }
def_id! { PageId, "Unique identifier for a live page.", "Page" }

fn encode_hex(bytes: &[u8; 16]) -> String {
	bytes.iter().fold(String::with_capacity(32), |mut buf, byte| {
		let _ = write!(buf, "{byte:02x}");

		buf
	})
}

fn decode_hex(kind: &'static str, view: &str) -> Result<[u8; 16], IdentifierError> {
	let malformed = IdentifierError::Malformed { kind };

	if view.len() != 32 || !view.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
		return Err(malformed);
	}

	let mut bytes = [0; 16];

	for (idx, chunk) in view.as_bytes().chunks_exact(2).enumerate() {
		let pair = std::str::from_utf8(chunk).map_err(|_| malformed)?;

		bytes[idx] = u8::from_str_radix(pair, 16).map_err(|_| malformed)?;
	}

	Ok(bytes)
}
