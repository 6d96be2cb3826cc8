//! Opaque, authenticated page tokens scoped to a single application.
//!
//! A token carries `application ‖ page ‖ issued_at ‖ expires_at ‖ nonce` as fixed-width
//! big-endian binary followed by an HMAC-SHA256 tag, encoded with unpadded URL-safe base64.
//! The wire form is URL- and cookie-safe and stays stable across renders of the same page.

// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
// self
use crate::{
	_prelude::*,
	auth::{ApplicationId, PageId, SigningKey},
	error::TokenError,
};

const NONCE_LEN: usize = 12;
const PAYLOAD_LEN: usize = 16 + 16 + 8 + 8 + NONCE_LEN;
const TAG_LEN: usize = 32;

type HmacSha256 = Hmac<Sha256>;

/// Claims conveyed by a verified token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenClaims {
	/// Application that minted the token.
	pub application: ApplicationId,
	/// Page the token names.
	pub page: PageId,
	/// Minting instant.
	pub issued_at: OffsetDateTime,
	/// Instant at which the token stops verifying.
	pub expires_at: OffsetDateTime,
	/// Random per-token nonce; two mints for the same page differ on the wire.
	pub nonce: [u8; NONCE_LEN],
}

/// Mints and verifies page tokens with an application-held signing key.
#[derive(Clone)]
pub struct TokenService {
	key: SigningKey,
	lifetime: Duration,
}
impl TokenService {
	/// Creates a service around the provided key and token lifetime.
	pub fn new(key: SigningKey, lifetime: Duration) -> Self {
		Self { key, lifetime }
	}

	/// Returns the configured token lifetime.
	pub fn lifetime(&self) -> Duration {
		self.lifetime
	}

	/// Mints a token naming the provided page, valid from `now` for the configured lifetime.
	pub fn mint(&self, application: ApplicationId, page: PageId, now: OffsetDateTime) -> String {
		let claims = TokenClaims {
			application,
			page,
			issued_at: now,
			expires_at: now + self.lifetime,
			nonce: rand::rng().random(),
		};
		let mut buf = Vec::with_capacity(PAYLOAD_LEN + TAG_LEN);

		buf.extend_from_slice(claims.application.as_bytes());
		buf.extend_from_slice(claims.page.as_bytes());
		buf.extend_from_slice(&claims.issued_at.unix_timestamp().to_be_bytes());
		buf.extend_from_slice(&claims.expires_at.unix_timestamp().to_be_bytes());
		buf.extend_from_slice(&claims.nonce);

		let tag = self.mac(&buf).finalize().into_bytes();

		buf.extend_from_slice(&tag);

		URL_SAFE_NO_PAD.encode(buf)
	}

	/// Verifies a token against this service's key and the expected application.
	///
	/// Checks run in a fixed order: malformation, MAC (constant-time), application scope,
	/// expiry. A token whose expiry equals `now` is already expired.
	pub fn verify(
		&self,
		token: &str,
		application: ApplicationId,
		now: OffsetDateTime,
	) -> Result<TokenClaims, TokenError> {
		let bytes = URL_SAFE_NO_PAD.decode(token).map_err(|_| TokenError::Invalid)?;

		if bytes.len() != PAYLOAD_LEN + TAG_LEN {
			return Err(TokenError::Invalid);
		}

		let (payload, tag) = bytes.split_at(PAYLOAD_LEN);

		self.mac(payload).verify_slice(tag).map_err(|_| TokenError::Invalid)?;

		let claims = decode_claims(payload)?;

		if claims.application != application {
			return Err(TokenError::WrongApplication);
		}
		if now >= claims.expires_at {
			return Err(TokenError::Expired);
		}

		Ok(claims)
	}

	fn mac(&self, payload: &[u8]) -> HmacSha256 {
		let mut mac = HmacSha256::new_from_slice(self.key.expose())
			.expect("HMAC accepts keys of any length.");

		mac.update(payload);

		mac
	}
}
impl Debug for TokenService {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenService")
			.field("key", &"<redacted>")
			.field("lifetime", &self.lifetime)
			.finish()
	}
}

fn decode_claims(payload: &[u8]) -> Result<TokenClaims, TokenError> {
	let read_16 = |at: usize| {
		let mut bytes = [0; 16];

		bytes.copy_from_slice(&payload[at..at + 16]);

		bytes
	};
	let read_ts = |at: usize| {
		let mut bytes = [0; 8];

		bytes.copy_from_slice(&payload[at..at + 8]);

		OffsetDateTime::from_unix_timestamp(i64::from_be_bytes(bytes))
			.map_err(|_| TokenError::Invalid)
	};
	let mut nonce = [0; NONCE_LEN];

	nonce.copy_from_slice(&payload[48..48 + NONCE_LEN]);

	Ok(TokenClaims {
		application: ApplicationId::from_bytes(read_16(0)),
		page: PageId::from_bytes(read_16(16)),
		issued_at: read_ts(32)?,
		expires_at: read_ts(40)?,
		nonce,
	})
}
