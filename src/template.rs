//! Template parsing, region analysis, and evaluation.
//!
//! Templates use a four-construct interpolation language (`{{ expr }}`, `{{if}}`, `{{range}}`,
//! `{{with}}`) plus registered helper calls. Analysis produces an immutable region arena that
//! any number of pages can share.

pub mod analyze;
pub mod ast;
pub mod eval;
pub mod parse;

pub use analyze::{Anchor, ID_ATTRIBUTE, Region, RegionKind, Slot};
pub use eval::RenderWarning;

// self
use crate::{_prelude::*, error::TemplateError};

/// Helper function signature: positional evaluated arguments in, scalar value out.
pub type HelperFn = Arc<dyn Fn(&[Value]) -> Result<Value, HelperError> + Send + Sync>;

/// Failure reported by a helper; trapped per slot and recorded as a render warning.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("{0}")]
pub struct HelperError(String);
impl HelperError {
	/// Creates a helper error with the provided message.
	pub fn new(message: impl Into<String>) -> Self {
		Self(message.into())
	}
}

/// Registry of custom helper functions, captured by each template at parse time.
#[derive(Clone, Default)]
pub struct Helpers(HashMap<String, HelperFn>);
impl Helpers {
	/// Registers a helper under `name`, replacing any previous registration.
	pub fn register(
		&mut self,
		name: impl Into<String>,
		helper: impl Fn(&[Value]) -> Result<Value, HelperError> + Send + Sync + 'static,
	) {
		self.0.insert(name.into(), Arc::new(helper));
	}

	/// Returns the registered helper names, as consulted by the parser.
	pub fn names(&self) -> HashSet<String> {
		self.0.keys().cloned().collect()
	}

	pub(crate) fn get(&self, name: &str) -> Option<&HelperFn> {
		self.0.get(name)
	}
}
impl Debug for Helpers {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Helpers").field("names", &self.0.keys().collect::<Vec<_>>()).finish()
	}
}

/// An analyzed template: an immutable region arena shareable across pages.
#[derive(Clone)]
pub struct Template {
	name: String,
	regions: Vec<Region>,
	helpers: Helpers,
}
impl Template {
	/// Parses and analyzes template source.
	///
	/// Helper names are validated against `helpers` at parse time; the registry is captured
	/// so evaluation sees the same helpers analysis did.
	pub fn parse_str(
		name: impl Into<String>,
		source: &str,
		helpers: &Helpers,
	) -> Result<Self, TemplateError> {
		let nodes = parse::parse(source, &helpers.names())?;
		let regions = analyze::analyze(&nodes)?;

		Ok(Self { name: name.into(), regions, helpers: helpers.clone() })
	}

	/// Returns the template's registered name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Returns the stable region ids in pre-order.
	pub fn region_ids(&self) -> Vec<&str> {
		self.regions.iter().map(|region| region.id.as_str()).collect()
	}

	/// Renders the full document against `data`, returning trapped evaluator faults.
	pub fn render(&self, data: &Value) -> (String, Vec<RenderWarning>) {
		let (tree, warnings) = eval::evaluate(self, data);

		(tree.root_html, warnings)
	}

	pub(crate) fn regions(&self) -> &[Region] {
		&self.regions
	}

	pub(crate) fn helpers(&self) -> &Helpers {
		&self.helpers
	}
}
impl Debug for Template {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Template")
			.field("name", &self.name)
			.field("regions", &self.regions.len())
			.finish()
	}
}
