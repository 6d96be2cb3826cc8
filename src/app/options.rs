//! Application construction options and their environment-variable defaults.

// std
use std::env;
// self
use crate::{_prelude::*, auth::SigningKey, error::KeyError};

/// Environment variable overriding the page TTL, in whole seconds.
pub const ENV_PAGE_TTL: &str = "PAGE_TTL";
/// Environment variable overriding the page capacity.
pub const ENV_MAX_PAGES: &str = "MAX_PAGES";
/// Environment variable carrying a standard-base64 signing key.
pub const ENV_SIGNING_KEY: &str = "SIGNING_KEY";

/// Options consumed by [`Application::new`](crate::app::Application::new).
#[derive(Clone, Debug)]
pub struct ApplicationOptions {
	page_ttl: Duration,
	max_pages: usize,
	cleanup_interval: Duration,
	signing_key: Option<SigningKey>,
	token_lifetime: Option<Duration>,
	outbound_capacity: usize,
	send_timeout: Duration,
	action_deadline: Duration,
}
impl ApplicationOptions {
	/// Creates options with the documented defaults.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates options from the process environment.
	///
	/// Consults `PAGE_TTL` (seconds), `MAX_PAGES`, and `SIGNING_KEY` (standard base64).
	/// Unparsable numeric variables are ignored; a malformed signing key is an error.
	pub fn from_env() -> Result<Self, KeyError> {
		let mut options = Self::default();

		if let Some(ttl) = env::var(ENV_PAGE_TTL).ok().and_then(|v| v.parse::<i64>().ok()) {
			options.page_ttl = Duration::seconds(ttl);
		}
		if let Some(max) = env::var(ENV_MAX_PAGES).ok().and_then(|v| v.parse::<usize>().ok()) {
			options.max_pages = max;
		}
		if let Ok(encoded) = env::var(ENV_SIGNING_KEY) {
			options.signing_key = Some(SigningKey::from_base64(&encoded)?);
		}

		Ok(options)
	}

	/// Overrides how long an untouched page survives (default 24 hours).
	pub fn with_page_ttl(mut self, ttl: Duration) -> Self {
		self.page_ttl = ttl;

		self
	}

	/// Overrides the soft page capacity (default 10 000).
	pub fn with_max_pages(mut self, max_pages: usize) -> Self {
		self.max_pages = max_pages;

		self
	}

	/// Overrides the cleanup task's wake interval (default 5 minutes).
	pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
		self.cleanup_interval = interval;

		self
	}

	/// Supplies the token signing key; a fresh key is generated when absent.
	pub fn with_signing_key(mut self, key: SigningKey) -> Self {
		self.signing_key = Some(key);

		self
	}

	/// Overrides the token lifetime (defaults to the page TTL).
	pub fn with_token_lifetime(mut self, lifetime: Duration) -> Self {
		self.token_lifetime = Some(lifetime);

		self
	}

	/// Overrides the outbound frame channel capacity (default 64).
	pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
		self.outbound_capacity = capacity.max(1);

		self
	}

	/// Overrides how long a blocked outbound send may stall (default 10 seconds).
	pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
		self.send_timeout = timeout;

		self
	}

	/// Overrides the per-action handler deadline (default 30 seconds).
	pub fn with_action_deadline(mut self, deadline: Duration) -> Self {
		self.action_deadline = deadline;

		self
	}

	/// How long an untouched page survives.
	pub fn page_ttl(&self) -> Duration {
		self.page_ttl
	}

	/// Soft page capacity.
	pub fn max_pages(&self) -> usize {
		self.max_pages
	}

	/// Cleanup task wake interval.
	pub fn cleanup_interval(&self) -> Duration {
		self.cleanup_interval
	}

	/// Token lifetime; defaults to the page TTL.
	pub fn token_lifetime(&self) -> Duration {
		self.token_lifetime.unwrap_or(self.page_ttl)
	}

	/// Outbound frame channel capacity.
	pub fn outbound_capacity(&self) -> usize {
		self.outbound_capacity
	}

	/// Blocked-send timeout for the dispatcher.
	pub fn send_timeout(&self) -> Duration {
		self.send_timeout
	}

	/// Per-action handler deadline.
	pub fn action_deadline(&self) -> Duration {
		self.action_deadline
	}

	pub(crate) fn take_signing_key(&mut self) -> SigningKey {
		self.signing_key.take().unwrap_or_else(SigningKey::generate)
	}
}
impl Default for ApplicationOptions {
	fn default() -> Self {
		Self {
			page_ttl: Duration::hours(24),
			max_pages: 10_000,
			cleanup_interval: Duration::minutes(5),
			signing_key: None,
			token_lifetime: None,
			outbound_capacity: 64,
			send_timeout: Duration::seconds(10),
			action_deadline: Duration::seconds(30),
		}
	}
}

/// Converts a non-negative [`time::Duration`] into a [`std::time::Duration`] for Tokio.
pub(crate) fn to_std(duration: Duration) -> std::time::Duration {
	std::time::Duration::try_from(duration).unwrap_or(std::time::Duration::ZERO)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn defaults_match_the_documented_values() {
		let options = ApplicationOptions::default();

		assert_eq!(options.page_ttl(), Duration::hours(24));
		assert_eq!(options.max_pages(), 10_000);
		assert_eq!(options.cleanup_interval(), Duration::minutes(5));
		assert_eq!(options.token_lifetime(), options.page_ttl());
		assert_eq!(options.outbound_capacity(), 64);
		assert_eq!(options.send_timeout(), Duration::seconds(10));
		assert_eq!(options.action_deadline(), Duration::seconds(30));
	}

	#[test]
	fn token_lifetime_follows_the_ttl_unless_set() {
		let options = ApplicationOptions::new().with_page_ttl(Duration::minutes(10));

		assert_eq!(options.token_lifetime(), Duration::minutes(10));

		let options = options.with_token_lifetime(Duration::minutes(2));

		assert_eq!(options.token_lifetime(), Duration::minutes(2));
	}

	#[test]
	fn negative_durations_convert_to_zero() {
		assert_eq!(to_std(Duration::seconds(-5)), std::time::Duration::ZERO);
		assert_eq!(to_std(Duration::seconds(2)), std::time::Duration::from_secs(2));
	}
}
