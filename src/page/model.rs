//! Explicit action-handler registration.
//!
//! Data models publish their handlers through an [`ActionTable`] builder; the resulting
//! dispatch table is frozen once registered on a page. Action names are lower-cased at
//! registration so wire names match regardless of the model's own naming convention.

// self
use crate::{_prelude::*, page::context::{ActionContext, MultiError}};

/// Boxed handler future, following the crate's boxed-future alias convention.
pub type HandlerFuture =
	Pin<Box<dyn Future<Output = Result<ActionContext, HandlerError>> + Send>>;

/// Type-erased action handler stored in a dispatch table.
pub type ActionHandler = Arc<dyn Fn(ActionContext) -> HandlerFuture + Send + Sync>;

/// Failure returned by an action handler.
///
/// Neither variant aborts the page: the pre-action data is retained, the failure is
/// surfaced to the template as error metadata, and the diff still runs.
#[derive(Debug, ThisError)]
pub enum HandlerError {
	/// Field-level validation failures from [`ActionContext::bind_and_validate`].
	#[error(transparent)]
	Validation(#[from] MultiError),
	/// Any other handler failure, surfaced as a single whole-action message.
	#[error("{0}")]
	Message(String),
}
impl HandlerError {
	/// Creates a whole-action failure with the provided message.
	pub fn msg(message: impl Into<String>) -> Self {
		Self::Message(message.into())
	}
}

/// Dispatch table mapping action names to handlers.
#[derive(Clone, Default)]
pub struct ActionTable(HashMap<String, ActionHandler>);
impl ActionTable {
	/// Creates an empty table.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a handler under `name` (lower-cased), replacing any previous handler.
	pub fn on<F, Fut>(mut self, name: impl AsRef<str>, handler: F) -> Self
	where
		F: Fn(ActionContext) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<ActionContext, HandlerError>> + Send + 'static,
	{
		self.0.insert(
			name.as_ref().to_lowercase(),
			Arc::new(move |ctx| Box::pin(handler(ctx))),
		);

		self
	}

	/// Returns the registered action names.
	pub fn names(&self) -> Vec<&str> {
		self.0.keys().map(String::as_str).collect()
	}

	/// Returns `true` when no handler is registered.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub(crate) fn get(&self, name: &str) -> Option<&ActionHandler> {
		self.0.get(name)
	}
}
impl Debug for ActionTable {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ActionTable").field("actions", &self.names()).finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	#[tokio::test]
	async fn handlers_receive_and_return_the_context() {
		let table = ActionTable::new().on("Increment", |mut ctx: ActionContext| async move {
			let n = ctx.data()["N"].as_i64().unwrap_or_default();

			ctx.data_mut()["N"] = json!(n + 1);

			Ok(ctx)
		});
		let handler =
			table.get("increment").expect("Registration should lower-case the action name.");
		let ctx = ActionContext::new("increment".into(), Default::default(), json!({ "N": 1 }));
		let ctx = handler(ctx).await.expect("Handler should succeed.");

		assert_eq!(ctx.data()["N"], json!(2));
		assert!(table.get("Increment").is_none());
	}

	#[tokio::test]
	async fn handler_errors_carry_validation_detail() {
		let table = ActionTable::new().on("save", |_ctx: ActionContext| async move {
			Err(HandlerError::from(MultiError::of("text", "must be at least 3 chars")))
		});
		let handler = table.get("save").expect("Handler should be registered.");
		let error = handler(ActionContext::new("save".into(), Default::default(), Value::Null))
			.await
			.expect_err("Handler fixture should fail.");
		let HandlerError::Validation(multi) = error else {
			panic!("Expected a validation error.");
		};

		assert_eq!(multi.errors[0].field, "text");
	}
}
