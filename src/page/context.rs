//! Typed access to action arguments plus binding, validation, and the working data snapshot.

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::_prelude::*;

/// One field-level validation failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
	/// The offending field name; empty for whole-action failures.
	pub field: String,
	/// Human-readable message shown through the template.
	pub message: String,
}

/// Accumulated field-level failures from binding or validation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiError {
	/// Individual failures in the order they were recorded.
	pub errors: Vec<FieldError>,
}
impl MultiError {
	/// Creates an empty collection.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a collection holding a single failure.
	pub fn of(field: impl Into<String>, message: impl Into<String>) -> Self {
		let mut multi = Self::new();

		multi.push(field, message);

		multi
	}

	/// Records a failure.
	pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
		self.errors.push(FieldError { field: field.into(), message: message.into() });
	}

	/// Returns `true` when no failure was recorded.
	pub fn is_empty(&self) -> bool {
		self.errors.is_empty()
	}
}
impl Display for MultiError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "validation failed")?;

		for (idx, error) in self.errors.iter().enumerate() {
			let sep = if idx == 0 { ": " } else { "; " };

			if error.field.is_empty() {
				write!(f, "{sep}{}", error.message)?;
			} else {
				write!(f, "{sep}{}: {}", error.field, error.message)?;
			}
		}

		Ok(())
	}
}
impl std::error::Error for MultiError {}

/// Per-invocation view handed to action handlers.
///
/// The context owns a working copy of the page data; the page adopts it only when the
/// handler returns success, so the previously transmitted state stays intact for diffing.
#[derive(Clone, Debug)]
pub struct ActionContext {
	action: String,
	args: serde_json::Map<String, Value>,
	data: Value,
}
impl ActionContext {
	pub(crate) fn new(action: String, args: serde_json::Map<String, Value>, data: Value) -> Self {
		Self { action, args, data }
	}

	/// The full (possibly dotted) action name that selected this handler.
	pub fn action(&self) -> &str {
		&self.action
	}

	/// Raw view over the frame's named arguments, for handlers that opt out of binding.
	pub fn args(&self) -> &serde_json::Map<String, Value> {
		&self.args
	}

	/// Returns `true` when the named argument is present.
	pub fn has(&self, key: &str) -> bool {
		self.args.contains_key(key)
	}

	/// Returns the named argument as a string slice.
	pub fn get_str(&self, key: &str) -> Option<&str> {
		self.args.get(key).and_then(Value::as_str)
	}

	/// Returns the named argument as a signed integer.
	pub fn get_i64(&self, key: &str) -> Option<i64> {
		self.args.get(key).and_then(Value::as_i64)
	}

	/// Returns the named argument as a float.
	pub fn get_f64(&self, key: &str) -> Option<f64> {
		self.args.get(key).and_then(Value::as_f64)
	}

	/// Returns the named argument as a boolean.
	pub fn get_bool(&self, key: &str) -> Option<bool> {
		self.args.get(key).and_then(Value::as_bool)
	}

	/// Deserializes the frame arguments into `T`, reporting the offending path on mismatch.
	pub fn bind<T>(&self) -> Result<T, MultiError>
	where
		T: DeserializeOwned,
	{
		let value = Value::Object(self.args.clone());

		serde_path_to_error::deserialize(value)
			.map_err(|e| MultiError::of(e.path().to_string(), e.inner().to_string()))
	}

	/// Binds the arguments into `T` and runs field-level validation over the result.
	///
	/// The validator returns the failures it found; an empty [`MultiError`] means the
	/// target is acceptable.
	pub fn bind_and_validate<T, F>(&self, validator: F) -> Result<T, MultiError>
	where
		T: DeserializeOwned,
		F: FnOnce(&T) -> MultiError,
	{
		let target = self.bind::<T>()?;
		let errors = validator(&target);

		if errors.is_empty() { Ok(target) } else { Err(errors) }
	}

	/// The working data snapshot.
	pub fn data(&self) -> &Value {
		&self.data
	}

	/// Mutable access to the working data snapshot.
	pub fn data_mut(&mut self) -> &mut Value {
		&mut self.data
	}

	/// Replaces the working data snapshot for this action.
	pub fn set_data(&mut self, data: Value) {
		self.data = data;
	}

	pub(crate) fn into_data(self) -> Value {
		self.data
	}
}
