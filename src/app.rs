//! Multi-tenant page registry: templates, helpers, tokens, and TTL-driven cleanup.

pub mod options;

pub use options::*;

// std
use std::{
	fs,
	path::Path,
	sync::atomic::{AtomicBool, Ordering},
};
// crates.io
use tokio::task::JoinHandle;
// self
use crate::{
	_prelude::*,
	auth::{ApplicationId, PageId, TokenClaims, TokenService},
	error::{RegistryError, TokenError},
	obs,
	page::{COOKIE_NAME, Page},
	template::{HelperError, Helpers, Template},
};

/// Query parameter consulted when no session cookie is present.
pub const TOKEN_QUERY_PARAM: &str = "token";
/// Header consulted when neither cookie nor query parameter carry a token.
pub const TOKEN_HEADER: &str = "X-Page-Token";

/// Token-bearing parts of an incoming request, in extraction order.
#[derive(Clone, Debug, Default)]
pub struct TokenRequest {
	cookie_header: Option<String>,
	query: Option<String>,
	header: Option<String>,
}
impl TokenRequest {
	/// Creates an empty request view.
	pub fn new() -> Self {
		Self::default()
	}

	/// Supplies the raw `Cookie` header value.
	pub fn with_cookie_header(mut self, value: impl Into<String>) -> Self {
		self.cookie_header = Some(value.into());

		self
	}

	/// Supplies the raw request query string.
	pub fn with_query(mut self, query: impl Into<String>) -> Self {
		self.query = Some(query.into());

		self
	}

	/// Supplies the `X-Page-Token` header value.
	pub fn with_header(mut self, value: impl Into<String>) -> Self {
		self.header = Some(value.into());

		self
	}

	/// Extracts the token: session cookie first, then query parameter, then header.
	pub fn token(&self) -> Option<String> {
		if let Some(cookies) = &self.cookie_header {
			let found = cookies.split(';').find_map(|pair| {
				let (name, value) = pair.trim().split_once('=')?;

				(name == COOKIE_NAME).then(|| value.to_owned())
			});

			if found.is_some() {
				return found;
			}
		}
		if let Some(query) = &self.query {
			let found = url::form_urlencoded::parse(query.as_bytes())
				.find(|(key, _)| key == TOKEN_QUERY_PARAM)
				.map(|(_, value)| value.into_owned());

			if found.is_some() {
				return found;
			}
		}

		self.header.clone()
	}
}

/// The isolation boundary: a per-tenant registry of pages with its own signing key.
///
/// Cloning is cheap and shares the registry. Construction spawns a background cleanup
/// task when a Tokio runtime is available; without one, expired pages are still evicted
/// lazily on lookup and creation.
#[derive(Clone)]
pub struct Application(Arc<ApplicationInner>);
struct ApplicationInner {
	id: ApplicationId,
	options: ApplicationOptions,
	tokens: TokenService,
	helpers: RwLock<Helpers>,
	templates: RwLock<HashMap<String, Arc<Template>>>,
	pages: Mutex<HashMap<PageId, Arc<Page>>>,
	closed: AtomicBool,
	cleanup: Mutex<Option<JoinHandle<()>>>,
}
impl Application {
	/// Creates an application from the provided options.
	pub fn new(mut options: ApplicationOptions) -> Self {
		let key = options.take_signing_key();
		let tokens = TokenService::new(key, options.token_lifetime());
		let inner = Arc::new(ApplicationInner {
			id: ApplicationId::random(),
			tokens,
			helpers: RwLock::new(Helpers::default()),
			templates: RwLock::new(HashMap::new()),
			pages: Mutex::new(HashMap::new()),
			closed: AtomicBool::new(false),
			cleanup: Mutex::new(None),
			options,
		});
		let application = Self(inner);

		application.spawn_cleanup();

		application
	}

	/// Creates an application from the process environment (see [`ApplicationOptions::from_env`]).
	pub fn from_env() -> Result<Self> {
		Ok(Self::new(ApplicationOptions::from_env()?))
	}

	/// The application's identifier.
	pub fn id(&self) -> ApplicationId {
		self.0.id
	}

	/// The options this application was built with.
	pub fn options(&self) -> &ApplicationOptions {
		&self.0.options
	}

	/// Number of live pages.
	pub fn page_count(&self) -> usize {
		self.0.pages.lock().len()
	}

	/// Registers a template helper; must precede parsing of templates that use it.
	pub fn register_helper(
		&self,
		name: impl Into<String>,
		helper: impl Fn(&[Value]) -> Result<Value, HelperError> + Send + Sync + 'static,
	) {
		self.0.helpers.write().register(name, helper);
	}

	/// Reads and registers template files; each is named by its file stem.
	pub fn parse_files<I, P>(&self, paths: I) -> Result<()>
	where
		I: IntoIterator<Item = P>,
		P: AsRef<Path>,
	{
		for path in paths {
			let path = path.as_ref();
			let read_error = |message: String| RegistryError::TemplateRead {
				path: path.display().to_string(),
				message,
			};
			let source = fs::read_to_string(path).map_err(|e| read_error(e.to_string()))?;
			let name = path
				.file_stem()
				.and_then(|stem| stem.to_str())
				.ok_or_else(|| read_error("path has no file stem".into()))?;

			self.parse_str(name, &source)?;
		}

		Ok(())
	}

	/// Parses and registers a template source under `name`, replacing any previous
	/// registration for future pages.
	pub fn parse_str(&self, name: &str, source: &str) -> Result<()> {
		if self.is_closed() {
			return Err(RegistryError::ApplicationClosed.into());
		}

		let template = {
			let helpers = self.0.helpers.read();

			Template::parse_str(name, source, &helpers)?
		};

		self.0.templates.write().insert(name.to_owned(), Arc::new(template));

		Ok(())
	}

	/// Creates a page bound to a registered template and initial data.
	///
	/// At capacity the least-recently-touched page is evicted first;
	/// [`RegistryError::CapacityExceeded`] is returned only when nothing can be evicted.
	pub fn new_page(&self, template_name: &str, data: Value) -> Result<Arc<Page>> {
		if self.is_closed() {
			return Err(RegistryError::ApplicationClosed.into());
		}

		let template = self
			.0
			.templates
			.read()
			.get(template_name)
			.cloned()
			.ok_or_else(|| RegistryError::TemplateNotFound { name: template_name.into() })?;
		let now = OffsetDateTime::now_utc();
		let mut pages = self.0.pages.lock();

		self.evict_expired_locked(&mut pages, now);

		if pages.len() >= self.0.options.max_pages() {
			let lru = pages
				.values()
				.min_by_key(|page| page.last_touch())
				.map(|page| page.id())
				.ok_or(RegistryError::CapacityExceeded { max: self.0.options.max_pages() })?;

			if let Some(page) = pages.remove(&lru) {
				page.close();
			}
		}

		let id = PageId::random();
		let token = self.0.tokens.mint(self.0.id, id, now);
		let page =
			Arc::new(Page::new(id, self.0.id, template, token, data, &self.0.options, now));

		pages.insert(id, page.clone());

		Ok(page)
	}

	/// Resolves the page named by the request's token (cookie, then query, then header).
	pub fn get_page(&self, request: &TokenRequest) -> Result<Arc<Page>> {
		let token = request.token().ok_or(TokenError::Invalid)?;

		self.get_page_by_token(&token)
	}

	/// Resolves the page named by a raw token string.
	pub fn get_page_by_token(&self, token: &str) -> Result<Arc<Page>> {
		if self.is_closed() {
			return Err(RegistryError::ApplicationClosed.into());
		}

		let now = OffsetDateTime::now_utc();
		let claims = self.verify_token(token, now)?;
		let mut pages = self.0.pages.lock();
		let page = pages.get(&claims.page).cloned().ok_or(RegistryError::PageNotFound)?;

		if page.is_closed() || page.is_expired_at(now, self.0.options.page_ttl()) {
			page.close();
			pages.remove(&claims.page);

			return Err(RegistryError::PageNotFound.into());
		}

		page.touch(now);

		Ok(page)
	}

	/// Returns `true` once the application has been closed.
	pub fn is_closed(&self) -> bool {
		self.0.closed.load(Ordering::Acquire)
	}

	/// Releases every page and stops the cleanup task. Idempotent.
	pub fn close(&self) {
		self.0.closed.store(true, Ordering::Release);

		if let Some(handle) = self.0.cleanup.lock().take() {
			handle.abort();
		}

		for (_, page) in self.0.pages.lock().drain() {
			page.close();
		}
	}

	pub(crate) fn verify_token(
		&self,
		token: &str,
		now: OffsetDateTime,
	) -> Result<TokenClaims, TokenError> {
		self.0.tokens.verify(token, self.0.id, now)
	}

	fn spawn_cleanup(&self) {
		let Ok(handle) = tokio::runtime::Handle::try_current() else {
			return;
		};
		let weak = Arc::downgrade(&self.0);
		let period = to_std(self.0.options.cleanup_interval())
			.max(std::time::Duration::from_millis(1));
		let task = handle.spawn(async move {
			let mut ticker = tokio::time::interval(period);

			// The first tick completes immediately.
			ticker.tick().await;

			loop {
				ticker.tick().await;

				let Some(inner) = weak.upgrade() else {
					break;
				};

				if inner.closed.load(Ordering::Acquire) {
					break;
				}

				Application(inner).sweep(OffsetDateTime::now_utc());
			}
		});

		*self.0.cleanup.lock() = Some(task);
	}

	fn sweep(&self, now: OffsetDateTime) {
		let mut pages = self.0.pages.lock();
		let evicted = self.evict_expired_locked(&mut pages, now);

		obs::pages_swept(evicted, pages.len());
	}

	fn evict_expired_locked(
		&self,
		pages: &mut HashMap<PageId, Arc<Page>>,
		now: OffsetDateTime,
	) -> usize {
		let ttl = self.0.options.page_ttl();
		let expired: Vec<PageId> = pages
			.values()
			.filter(|page| page.is_expired_at(now, ttl) || page.is_closed())
			.map(|page| page.id())
			.collect();
		let mut evicted = 0;

		for id in expired {
			if let Some(page) = pages.remove(&id) {
				page.close();

				evicted += 1;
			}
		}

		evicted
	}
}
impl Debug for Application {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Application")
			.field("id", &self.0.id)
			.field("pages", &self.page_count())
			.field("closed", &self.is_closed())
			.finish()
	}
}
