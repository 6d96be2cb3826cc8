//! Runtime-level error types shared across the registry, pages, templates, and dispatch.

// self
use crate::_prelude::*;

/// Runtime-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical runtime error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Template analysis failure.
	#[error(transparent)]
	Template(#[from] TemplateError),
	/// Token minting or verification failure.
	#[error(transparent)]
	Token(#[from] TokenError),
	/// Signing-key construction failure.
	#[error(transparent)]
	Key(#[from] KeyError),
	/// Application registry failure.
	#[error(transparent)]
	Registry(#[from] RegistryError),
	/// Page lifecycle or registration failure.
	#[error(transparent)]
	Page(#[from] PageError),
	/// Action decoding or routing failure.
	#[error(transparent)]
	Action(#[from] ActionError),
	/// Connection loop failure.
	#[error(transparent)]
	Dispatch(#[from] DispatchError),
}
impl Error {
	/// Maps the error to the HTTP status an initial-load handler should answer with.
	pub fn http_status(&self) -> u16 {
		match self {
			Self::Template(_) => 500,
			Self::Token(_) => 401,
			Self::Key(_) => 500,
			Self::Registry(e) => e.http_status(),
			Self::Page(e) => e.http_status(),
			Self::Action(e) => e.http_status(),
			Self::Dispatch(e) => e.http_status(),
		}
	}
}

/// Template analysis failures raised while registering template sources.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum TemplateError {
	/// The source contains a syntactically invalid tag or expression.
	#[error("Template parse error at line {line}, column {column}: {message}.")]
	Parse {
		/// 1-based source line of the offending tag.
		line: u32,
		/// 1-based source column of the offending tag.
		column: u32,
		/// Human-readable description of the failure.
		message: String,
	},
	/// A block construct is missing its `end` or closes a block that was never opened.
	#[error("Unbalanced `{construct}` at line {line}, column {column}.")]
	Unbalanced {
		/// The construct that failed to balance (`if`, `range`, `with`, `else`, `end`).
		construct: &'static str,
		/// 1-based source line of the offending tag.
		line: u32,
		/// 1-based source column of the offending tag.
		column: u32,
	},
	/// An expression invokes a helper that was never registered.
	#[error("Unknown helper `{name}` at line {line}, column {column}.")]
	UnknownHelper {
		/// The unregistered helper name.
		name: String,
		/// 1-based source line of the invocation.
		line: u32,
		/// 1-based source column of the invocation.
		column: u32,
	},
}

/// Token verification failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ThisError)]
pub enum TokenError {
	/// The token is malformed, truncated, or fails MAC verification.
	#[error("Token is invalid.")]
	Invalid,
	/// The token's expiry instant has passed.
	#[error("Token has expired.")]
	Expired,
	/// The token was minted by a different application.
	#[error("Token belongs to a different application.")]
	WrongApplication,
}

/// Signing-key construction failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ThisError)]
pub enum KeyError {
	/// The provided key material is below the minimum length.
	#[error("Signing key must be at least {min} bytes, got {got}.")]
	TooShort {
		/// Minimum permitted byte count.
		min: usize,
		/// Byte count that was provided.
		got: usize,
	},
	/// The provided key material is not valid base64.
	#[error("Signing key is not valid base64.")]
	Base64,
}

/// Application registry failures.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum RegistryError {
	/// `new_page` referenced a template name that was never registered.
	#[error("Template `{name}` is not registered.")]
	TemplateNotFound {
		/// The requested template name.
		name: String,
	},
	/// A template file could not be read from disk.
	#[error("Template file `{path}` could not be read: {message}.")]
	TemplateRead {
		/// Path as passed to `parse_files`.
		path: String,
		/// Underlying IO failure text.
		message: String,
	},
	/// The application is at capacity and no page could be evicted.
	#[error("Application holds the maximum of {max} pages.")]
	CapacityExceeded {
		/// Configured page limit.
		max: usize,
	},
	/// The token is valid but its page has been evicted or closed.
	#[error("Page no longer exists.")]
	PageNotFound,
	/// The application has been closed.
	#[error("Application is closed.")]
	ApplicationClosed,
}
impl RegistryError {
	fn http_status(&self) -> u16 {
		match self {
			Self::TemplateNotFound { .. } | Self::TemplateRead { .. } => 500,
			Self::CapacityExceeded { .. } => 503,
			Self::PageNotFound => 410,
			Self::ApplicationClosed => 503,
		}
	}
}

/// Page lifecycle and registration failures.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum PageError {
	/// An operation was attempted after [`close`](crate::page::Page::close).
	#[error("Page is closed.")]
	Closed,
	/// A data model registration overlaps an already-registered action name.
	#[error("Action `{action}` is already registered.")]
	AlreadyRegistered {
		/// The conflicting action name.
		action: String,
	},
}
impl PageError {
	fn http_status(&self) -> u16 {
		match self {
			Self::Closed => 410,
			Self::AlreadyRegistered { .. } => 500,
		}
	}
}

/// Action decoding and routing failures.
#[derive(Debug, ThisError)]
pub enum ActionError {
	/// The inbound frame is not valid JSON for the action wire shape.
	#[error("Action frame could not be decoded.")]
	Decode {
		/// Structured parsing failure naming the offending path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// No handler is registered under the action name.
	#[error("Unknown action `{name}`.")]
	Unknown {
		/// The unresolved action name.
		name: String,
	},
	/// A dotted action name referenced a data model that was never registered.
	#[error("Unknown data model `{name}`.")]
	UnknownModel {
		/// The unresolved model prefix.
		name: String,
	},
	/// The handler exceeded the per-action deadline.
	#[error("Action `{action}` exceeded its {seconds}s deadline.")]
	Deadline {
		/// The action that timed out.
		action: String,
		/// Deadline in whole seconds.
		seconds: i64,
	},
}
impl ActionError {
	fn http_status(&self) -> u16 {
		match self {
			Self::Decode { .. } | Self::Unknown { .. } | Self::UnknownModel { .. } => 400,
			Self::Deadline { .. } => 504,
		}
	}
}

/// Connection-loop failures surfaced by the dispatcher.
#[derive(Debug, ThisError)]
pub enum DispatchError {
	/// The inbound frame's token does not resolve to the connected page.
	#[error(transparent)]
	Token(#[from] TokenError),
	/// The token resolved to a page other than the connected one.
	#[error("Token does not name the connected page.")]
	ForeignPage,
	/// The outbound channel stayed full past the configured send timeout.
	#[error("Outbound send timed out after {seconds}s.")]
	SendTimeout {
		/// Send timeout in whole seconds.
		seconds: i64,
	},
	/// The page was closed while the connection was live.
	#[error("Page closed while the connection was live.")]
	PageClosed,
}
impl DispatchError {
	fn http_status(&self) -> u16 {
		match self {
			Self::Token(_) | Self::ForeignPage => 401,
			Self::SendTimeout { .. } => 500,
			Self::PageClosed => 410,
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn statuses_follow_the_error_policy() {
		assert_eq!(Error::from(TokenError::Expired).http_status(), 401);
		assert_eq!(
			Error::from(RegistryError::TemplateNotFound { name: "missing".into() }).http_status(),
			500
		);
		assert_eq!(Error::from(RegistryError::CapacityExceeded { max: 1 }).http_status(), 503);
		assert_eq!(Error::from(RegistryError::PageNotFound).http_status(), 410);
		assert_eq!(Error::from(PageError::Closed).http_status(), 410);
	}

	#[test]
	fn messages_name_the_offending_input() {
		let error = TemplateError::UnknownHelper { name: "shout".into(), line: 3, column: 7 };

		assert_eq!(error.to_string(), "Unknown helper `shout` at line 3, column 7.");

		let error = RegistryError::TemplateNotFound { name: "index".into() };

		assert!(error.to_string().contains("index"));
	}
}
