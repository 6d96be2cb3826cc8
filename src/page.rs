//! A live page: one bound (template, data, models) triple driving render and diff.

pub mod context;
pub mod model;

pub use context::*;
pub use model::*;

// std
use std::sync::atomic::{AtomicBool, Ordering};
// self
use crate::{
	_prelude::*,
	app::{ApplicationOptions, to_std},
	auth::{ApplicationId, PageId},
	diff::{self, ClientView, RegionCache},
	error::{ActionError, PageError},
	frame::{ActionFrame, FragmentFrame},
	obs::{self, FrameStats},
	template::{RenderWarning, Template, eval},
};

/// Cookie under which the session token travels.
pub const COOKIE_NAME: &str = "lvt_session";

/// Fully rendered initial response for a page load.
#[derive(Clone, Debug)]
pub struct InitialPage {
	/// Rendered HTML with region ids and the embedded token meta element.
	pub body: String,
	/// The page's stable session token.
	pub token: String,
	/// Token lifetime, carried into the cookie's `Max-Age`.
	pub max_age: Duration,
}
impl InitialPage {
	/// Content type the initial response should be served with.
	pub fn content_type(&self) -> &'static str {
		"text/html; charset=utf-8"
	}

	/// Builds the `Set-Cookie` header value for the session cookie.
	pub fn set_cookie_header(&self) -> String {
		format!(
			"{COOKIE_NAME}={}; Path=/; Max-Age={}; HttpOnly; Secure; SameSite=Strict",
			self.token,
			self.max_age.whole_seconds()
		)
	}
}

/// One live page owned by an application.
pub struct Page {
	id: PageId,
	application: ApplicationId,
	template: Arc<Template>,
	token: String,
	created_at: OffsetDateTime,
	last_touch: Mutex<OffsetDateTime>,
	closed: AtomicBool,
	action_deadline: Duration,
	token_lifetime: Duration,
	models: RwLock<Models>,
	state: AsyncMutex<PageState>,
	warnings: Mutex<Vec<RenderWarning>>,
}

#[derive(Default)]
struct Models {
	tables: HashMap<String, ActionTable>,
	default: Option<ActionTable>,
}

struct PageState {
	data: Value,
	cache: RegionCache,
	error_meta: Option<MultiError>,
}

impl Page {
	pub(crate) fn new(
		id: PageId,
		application: ApplicationId,
		template: Arc<Template>,
		token: String,
		data: Value,
		options: &ApplicationOptions,
		now: OffsetDateTime,
	) -> Self {
		Self {
			id,
			application,
			template,
			token,
			created_at: now,
			last_touch: Mutex::new(now),
			closed: AtomicBool::new(false),
			action_deadline: options.action_deadline(),
			token_lifetime: options.token_lifetime(),
			models: RwLock::new(Models::default()),
			state: AsyncMutex::new(PageState {
				data,
				cache: RegionCache::default(),
				error_meta: None,
			}),
			warnings: Mutex::new(Vec::new()),
		}
	}

	/// The page's identifier within its application.
	pub fn id(&self) -> PageId {
		self.id
	}

	/// The owning application's identifier.
	pub fn application(&self) -> ApplicationId {
		self.application
	}

	/// The stable session token naming this page.
	pub fn token(&self) -> &str {
		&self.token
	}

	/// Creation instant.
	pub fn created_at(&self) -> OffsetDateTime {
		self.created_at
	}

	/// Instant of the most recent action or render.
	pub fn last_touch(&self) -> OffsetDateTime {
		*self.last_touch.lock()
	}

	/// Returns `true` when the page has outlived `ttl` relative to its last touch.
	pub fn is_expired_at(&self, now: OffsetDateTime, ttl: Duration) -> bool {
		self.last_touch() + ttl < now
	}

	/// Returns `true` once the page has been closed.
	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire)
	}

	/// Closes the page. Idempotent; subsequent operations fail with [`PageError::Closed`].
	pub fn close(&self) {
		self.closed.store(true, Ordering::Release);
	}

	pub(crate) fn touch(&self, now: OffsetDateTime) {
		*self.last_touch.lock() = now;
	}

	/// Registers a named data model; its actions are addressed as `name.action`.
	pub fn register_model(
		&self,
		name: impl Into<String>,
		table: ActionTable,
	) -> Result<(), PageError> {
		if self.is_closed() {
			return Err(PageError::Closed);
		}

		let name = name.into();
		let mut models = self.models.write();

		match models.tables.entry(name) {
			std::collections::hash_map::Entry::Occupied(entry) =>
				Err(PageError::AlreadyRegistered { action: entry.key().clone() }),
			std::collections::hash_map::Entry::Vacant(entry) => {
				entry.insert(table);

				Ok(())
			},
		}
	}

	/// Registers the data model used for undotted action names.
	pub fn register_default_model(&self, table: ActionTable) -> Result<(), PageError> {
		if self.is_closed() {
			return Err(PageError::Closed);
		}

		let mut models = self.models.write();

		if models.default.is_some() {
			return Err(PageError::AlreadyRegistered { action: "default".into() });
		}

		models.default = Some(table);

		Ok(())
	}

	/// Renders the full HTML for an initial load.
	///
	/// When `data` is supplied it replaces the page's current data. The returned body
	/// carries every region's id and a `<meta name="lvt-token">` element; the caller adds
	/// the session cookie from [`InitialPage::set_cookie_header`].
	pub async fn render_initial(&self, data: Option<Value>) -> Result<InitialPage> {
		if self.is_closed() {
			return Err(PageError::Closed.into());
		}

		self.touch(OffsetDateTime::now_utc());

		let mut state = self.state.lock().await;

		if let Some(data) = data {
			state.data = data;
			state.error_meta = None;
		}

		let render_data = with_lvt_meta(&state.data, state.error_meta.as_ref());
		let (tree, mut warnings) = eval::evaluate(self.template.as_ref(), &render_data);

		// Refresh the page-level cache to the served state; the throwaway view keeps
		// per-connection statics bookkeeping untouched.
		let _ = diff::diff_frame(&tree, &mut state.cache, &mut ClientView::new());

		let mut body = tree.root_html;

		embed_token(&mut body, &self.token);
		obs::page_rendered(self.id, warnings.len());
		self.warnings.lock().append(&mut warnings);

		Ok(InitialPage {
			body,
			token: self.token.clone(),
			max_age: self.token_lifetime,
		})
	}

	/// Handles one inbound action frame and returns the resulting fragment frame.
	///
	/// The handler and the diff run under the page's writer lock; the pre-action data
	/// snapshot is only replaced when the handler succeeds, and error metadata is injected
	/// into the render context either way, so the diff always runs.
	pub async fn handle_action(
		&self,
		view: &mut ClientView,
		frame: &ActionFrame,
	) -> Result<FragmentFrame> {
		if self.is_closed() {
			return Err(PageError::Closed.into());
		}

		self.touch(OffsetDateTime::now_utc());
		obs::action_dispatched(self.id, &frame.action);

		let handler = self
			.resolve_handler(&frame.action)
			.inspect_err(|_| obs::action_failed(self.id, &frame.action, "no handler"))?;
		let mut state = self.state.lock().await;
		let ctx = ActionContext::new(frame.action.clone(), frame.data.clone(), state.data.clone());
		let outcome = tokio::time::timeout(to_std(self.action_deadline), handler(ctx)).await;
		let (new_data, error_meta) = match outcome {
			Err(_) => {
				obs::action_failed(self.id, &frame.action, "deadline exceeded");

				return Err(ActionError::Deadline {
					action: frame.action.clone(),
					seconds: self.action_deadline.whole_seconds(),
				}
				.into());
			},
			Ok(Ok(ctx)) => (ctx.into_data(), None),
			Ok(Err(HandlerError::Validation(multi))) => (state.data.clone(), Some(multi)),
			Ok(Err(HandlerError::Message(message))) =>
				(state.data.clone(), Some(MultiError::of("", message))),
		};

		state.error_meta = error_meta;

		let render_data = with_lvt_meta(&new_data, state.error_meta.as_ref());
		let (tree, mut warnings) = eval::evaluate(self.template.as_ref(), &render_data);
		let fragment = diff::diff_frame(&tree, &mut state.cache, view);

		state.data = new_data;

		let stats = FrameStats::of(&fragment);

		obs::action_completed(self.id, &frame.action, &stats, warnings.len());
		self.warnings.lock().append(&mut warnings);

		Ok(fragment)
	}

	/// Emits a full refresh frame for a (re)connecting client view.
	pub async fn render_frame(&self, view: &mut ClientView) -> Result<FragmentFrame> {
		if self.is_closed() {
			return Err(PageError::Closed.into());
		}

		self.touch(OffsetDateTime::now_utc());

		let mut state = self.state.lock().await;
		let render_data = with_lvt_meta(&state.data, state.error_meta.as_ref());
		let (tree, mut warnings) = eval::evaluate(self.template.as_ref(), &render_data);
		let fragment = diff::diff_frame(&tree, &mut state.cache, view);

		self.warnings.lock().append(&mut warnings);

		Ok(fragment)
	}

	/// Returns and clears the render warnings trapped since the last call.
	pub fn take_warnings(&self) -> Vec<RenderWarning> {
		std::mem::take(&mut *self.warnings.lock())
	}

	fn resolve_handler(&self, action: &str) -> Result<ActionHandler> {
		let models = self.models.read();
		let (table, name) = match action.split_once('.') {
			Some((model, name)) => (
				models
					.tables
					.get(model)
					.ok_or_else(|| ActionError::UnknownModel { name: model.into() })?,
				name,
			),
			None => {
				let table = models
					.default
					.as_ref()
					.or_else(|| {
						(models.tables.len() == 1).then(|| models.tables.values().next()).flatten()
					})
					.ok_or_else(|| ActionError::UnknownModel { name: action.into() })?;

				(table, action)
			},
		};

		table
			.get(&name.to_lowercase())
			.cloned()
			.ok_or_else(|| ActionError::Unknown { name: action.into() }.into())
	}
}
impl Debug for Page {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Page")
			.field("id", &self.id)
			.field("application", &self.application)
			.field("template", &self.template.name())
			.field("closed", &self.is_closed())
			.finish()
	}
}

/// Merges the reserved `lvt` error-metadata object into the render context.
fn with_lvt_meta(data: &Value, meta: Option<&MultiError>) -> Value {
	let errors = meta.map(|multi| multi.errors.clone()).unwrap_or_default();
	let by_field: serde_json::Map<String, Value> = errors
		.iter()
		.map(|error| (error.field.clone(), Value::String(error.message.clone())))
		.collect();
	let lvt = serde_json::json!({
		"HasError": !errors.is_empty(),
		"Errors": errors,
		"Error": by_field,
	});
	let mut merged = data.clone();

	match &mut merged {
		Value::Object(map) => {
			map.insert("lvt".into(), lvt);
		},
		Value::Null => merged = serde_json::json!({ "lvt": lvt }),
		_ => {},
	}

	merged
}

/// Inserts the token meta element right after `<head>`, or at the front of fragments.
fn embed_token(body: &mut String, token: &str) {
	let meta = format!("<meta name=\"lvt-token\" content=\"{token}\">");

	match body.find("<head>") {
		Some(at) => body.insert_str(at + "<head>".len(), &meta),
		None => body.insert_str(0, &meta),
	}
}
