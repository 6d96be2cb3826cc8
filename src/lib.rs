//! Rust's turnkey live-HTML runtime—multi-tenant page registries, minimal fragment diffs, and
//! action dispatch over any bidirectional transport.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod app;
pub mod auth;
pub mod diff;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod obs;
pub mod page;
pub mod template;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and fixture helpers for integration tests; enabled via `cfg(test)`
	//! or the `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::app::{Application, ApplicationOptions};

	/// Options tuned for tests: generated signing key, small capacity, fast cleanup.
	pub fn test_options() -> ApplicationOptions {
		ApplicationOptions::new()
			.with_page_ttl(Duration::minutes(5))
			.with_max_pages(32)
			.with_cleanup_interval(Duration::milliseconds(50))
	}

	/// Builds an application and registers the provided named template sources.
	pub fn build_test_application(templates: &[(&str, &str)]) -> Application {
		let application = Application::new(test_options());

		for (name, source) in templates {
			application
				.parse_str(name, source)
				.expect("Test template source should parse successfully.");
		}

		application
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap, HashSet},
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	pub use serde::{Deserialize, Serialize};
	pub use serde_json::Value;
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};

	pub use crate::error::{Error, Result};
}

#[cfg(test)] use color_eyre as _;
