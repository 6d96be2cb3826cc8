//! Region analysis: flattening the node tree into an arena of statics + dynamic slots and
//! injecting stable `lvt-id` targeting attributes.
//!
//! Region ids are assigned in pre-order (`a0` for the document, then each block construct in
//! source order), so two analyses of the same source always agree. Regions reference their
//! children by arena index, never by pointer.

// std
use std::mem;
// self
use crate::{
	_prelude::*,
	error::TemplateError,
	template::ast::{Expr, Node},
};

/// Attribute injected on each region's targeting element.
pub const ID_ATTRIBUTE: &str = "lvt-id";

const NEUTRAL_OPEN: &str = "<span style=\"display: contents\" ";
const VOID_ELEMENTS: &[&str] = &[
	"area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
	"wbr",
];

/// One analyzed span of the template, identified by a stable id.
#[derive(Clone, Debug, PartialEq)]
pub struct Region {
	/// Stable pre-order id (`a0`, `a1`, …).
	pub id: String,
	/// Arena index of the enclosing region, absent for the document region.
	pub parent: Option<usize>,
	/// Literal segments; always one longer than `slots`.
	pub statics: Vec<String>,
	/// Dynamic slots interleaved between the statics.
	pub slots: Vec<Slot>,
	/// Splice point for the instance id in loop-body statics.
	pub anchor: Option<Anchor>,
	/// Role of the region within its parent.
	pub kind: RegionKind,
}

/// Role a region plays within its parent construct.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegionKind {
	/// The enclosing document.
	Root,
	/// An `if` or `else` branch body.
	Branch,
	/// A `range` per-element body; instantiated once per element.
	LoopBody,
	/// A `range … else` body shown when the collection is empty.
	LoopEmpty,
	/// A `with` body.
	Scope,
}

/// A dynamic position between two statics of a region.
#[derive(Clone, Debug, PartialEq)]
pub enum Slot {
	/// Scalar insertion in text context; HTML-escaped.
	Text {
		/// The inserted expression.
		expr: Expr,
	},
	/// Scalar insertion inside an attribute value; attribute-escaped.
	Attribute {
		/// The inserted expression.
		expr: Expr,
	},
	/// An `if` block; the slot's value is the active branch's evaluation.
	Branch {
		/// The branch predicate.
		cond: Expr,
		/// Region evaluated when the predicate is truthy, absent for an empty branch.
		then: Option<usize>,
		/// Region evaluated when the predicate is falsy, absent without an `else`.
		otherwise: Option<usize>,
	},
	/// A `range` block; the slot's value is the concatenation of per-element evaluations.
	Loop {
		/// The iterated collection expression.
		over: Expr,
		/// Per-element body region.
		body: usize,
		/// Region shown when the collection is empty, absent without an `else`.
		empty: Option<usize>,
	},
	/// A `with` block rebinding the context for its body region.
	Scope {
		/// The bound expression.
		bind: Expr,
		/// Body region.
		body: usize,
	},
}

/// Byte position inside a region's statics where the instance id is spliced at render time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Anchor {
	/// Index into [`Region::statics`].
	pub static_index: usize,
	/// Byte offset inside that static.
	pub offset: usize,
}

/// Flattens a parsed node tree into the region arena.
pub fn analyze(nodes: &[Node]) -> Result<Vec<Region>, TemplateError> {
	let mut analyzer = Analyzer { regions: Vec::new() };
	let root = analyzer.alloc();

	analyzer.build(root, None, RegionKind::Root, nodes)?;

	Ok(analyzer.regions.into_iter().flatten().collect())
}

struct Analyzer {
	regions: Vec<Option<Region>>,
}
impl Analyzer {
	fn alloc(&mut self) -> usize {
		self.regions.push(None);

		self.regions.len() - 1
	}

	fn build(
		&mut self,
		idx: usize,
		parent: Option<usize>,
		kind: RegionKind,
		nodes: &[Node],
	) -> Result<(), TemplateError> {
		let mut statics = Vec::new();
		let mut current = String::new();
		let mut slots = Vec::new();
		let mut html = HtmlContext::default();

		for node in nodes {
			match node {
				Node::Text(text) => {
					current.push_str(text);
					html.feed(text);
				},
				Node::Interp { expr, .. } => {
					statics.push(mem::take(&mut current));
					slots.push(if html.in_attribute() {
						Slot::Attribute { expr: expr.clone() }
					} else {
						Slot::Text { expr: expr.clone() }
					});
				},
				Node::If { cond, then, otherwise, .. } => {
					let then_idx = self.child(idx, RegionKind::Branch, then)?;
					let otherwise_idx = self.child(idx, RegionKind::Branch, otherwise)?;

					statics.push(mem::take(&mut current));
					slots.push(Slot::Branch {
						cond: cond.clone(),
						then: then_idx,
						otherwise: otherwise_idx,
					});
				},
				Node::Range { over, body, empty, .. } => {
					let body_idx = self.alloc();

					self.build(body_idx, Some(idx), RegionKind::LoopBody, body)?;

					let empty_idx = self.child(idx, RegionKind::LoopEmpty, empty)?;

					statics.push(mem::take(&mut current));
					slots.push(Slot::Loop { over: over.clone(), body: body_idx, empty: empty_idx });
				},
				Node::With { bind, body, .. } => {
					let body_idx = self.alloc();

					self.build(body_idx, Some(idx), RegionKind::Scope, body)?;

					statics.push(mem::take(&mut current));
					slots.push(Slot::Scope { bind: bind.clone(), body: body_idx });
				},
			}
		}

		statics.push(current);

		let id = format!("a{idx}");
		let deferred = matches!(kind, RegionKind::LoopBody);
		let (statics, anchor) = inject_region_id(statics, &id, deferred);

		self.regions[idx] = Some(Region { id, parent, statics, slots, anchor, kind });

		Ok(())
	}

	fn child(
		&mut self,
		parent: usize,
		kind: RegionKind,
		nodes: &[Node],
	) -> Result<Option<usize>, TemplateError> {
		if nodes.is_empty() {
			return Ok(None);
		}

		let idx = self.alloc();

		self.build(idx, Some(parent), kind, nodes)?;

		Ok(Some(idx))
	}
}

/// Minimal HTML context scanner deciding whether a slot sits inside an attribute value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum HtmlContext {
	#[default]
	Text,
	Tag,
	AttributeDouble,
	AttributeSingle,
	Comment,
}
impl HtmlContext {
	fn feed(&mut self, text: &str) {
		let mut rest = text;

		loop {
			match *self {
				Self::Text => match rest.find('<') {
					None => return,
					Some(at) if rest[at..].starts_with("<!--") => {
						*self = Self::Comment;
						rest = &rest[at + 4..];
					},
					Some(at) => {
						*self = Self::Tag;
						rest = &rest[at + 1..];
					},
				},
				Self::Comment => match rest.find("-->") {
					None => return,
					Some(at) => {
						*self = Self::Text;
						rest = &rest[at + 3..];
					},
				},
				Self::Tag => match rest.find(['"', '\'', '>']) {
					None => return,
					Some(at) => {
						*self = match rest.as_bytes()[at] {
							b'"' => Self::AttributeDouble,
							b'\'' => Self::AttributeSingle,
							_ => Self::Text,
						};
						rest = &rest[at + 1..];
					},
				},
				Self::AttributeDouble => match rest.find('"') {
					None => return,
					Some(at) => {
						*self = Self::Tag;
						rest = &rest[at + 1..];
					},
				},
				Self::AttributeSingle => match rest.find('\'') {
					None => return,
					Some(at) => {
						*self = Self::Tag;
						rest = &rest[at + 1..];
					},
				},
			}
		}
	}

	fn in_attribute(self) -> bool {
		matches!(self, Self::Tag | Self::AttributeDouble | Self::AttributeSingle)
	}
}

/// Injects the region's targeting attribute.
///
/// When the region's flattened content is exactly one HTML element, the attribute lands on
/// that element's open tag; otherwise the content is wrapped in a zero-layout container.
/// Injection is idempotent: an open tag already carrying the attribute is left untouched.
/// Loop bodies get an empty attribute plus an [`Anchor`] so each instance can splice its id.
fn inject_region_id(
	mut statics: Vec<String>,
	id: &str,
	deferred: bool,
) -> (Vec<String>, Option<Anchor>) {
	if has_authored_open_id(&statics) {
		return (statics, None);
	}
	if let Some(open) = wrapping_element(&statics) {
		if open.has_id_attribute {
			return (statics, None);
		}

		let insert_at = open.name_end;
		let value = if deferred { "" } else { id };
		let attribute = format!(" {ID_ATTRIBUTE}=\"{value}\"");

		statics[0].insert_str(insert_at, &attribute);

		let anchor = deferred.then_some(Anchor {
			static_index: 0,
			offset: insert_at + attribute.len() - 1,
		});

		return (statics, anchor);
	}

	let value = if deferred { "" } else { id };
	let prefix = format!("{NEUTRAL_OPEN}{ID_ATTRIBUTE}=\"{value}\">");
	let anchor = deferred.then_some(Anchor { static_index: 0, offset: prefix.len() - 2 });

	statics[0].insert_str(0, &prefix);

	if let Some(last) = statics.last_mut() {
		last.push_str("</span>");
	}

	(statics, anchor)
}

/// Detects an authored id attribute fed by a slot, as in `<li lvt-id="{{id}}">`: the first
/// static ends inside the attribute's quotes, so the authored slot supplies the id and no
/// injection happens at all.
fn has_authored_open_id(statics: &[String]) -> bool {
	statics
		.first()
		.is_some_and(|first| first.ends_with(&format!("{ID_ATTRIBUTE}=\"")))
}

struct OpenTag {
	name_end: usize,
	has_id_attribute: bool,
}

/// Returns the open tag of the single element wrapping the region's whole content, if any.
fn wrapping_element(statics: &[String]) -> Option<OpenTag> {
	let first = statics.first()?;
	let start = skip_preamble(first);
	let rest = &first[start..];

	if !rest.starts_with('<') {
		return None;
	}

	let name_len = rest[1..].chars().take_while(|c| c.is_ascii_alphanumeric() || *c == '-').count();

	if name_len == 0 {
		return None;
	}

	let name = rest[1..1 + name_len].to_ascii_lowercase();

	if VOID_ELEMENTS.contains(&name.as_str()) {
		return None;
	}

	let open_end = find_tag_end(rest)?;

	if rest[..open_end].ends_with("/>") {
		return None;
	}

	let close = format!("</{name}>");
	let last = statics.last()?;
	let trimmed = last.trim_end();

	if !trimmed.to_ascii_lowercase().ends_with(&close) {
		return None;
	}

	// The element must stay open until the final close: count same-name opens and closes
	// across everything between the open tag and the trailing close tag.
	let open = format!("<{name}");
	let last_idx = statics.len() - 1;
	let mut depth = 1_i32;

	for (idx, segment) in statics.iter().enumerate() {
		let begin = if idx == 0 { start + open_end } else { 0 };
		let end = if idx == last_idx { trimmed.len() - close.len() } else { segment.len() };

		if begin >= end {
			continue;
		}

		let lower = segment[begin..end].to_ascii_lowercase();
		let mut at = 0;

		while let Some(found) = lower[at..].find('<') {
			let view = &lower[at + found..];

			if view.starts_with(&close) {
				depth -= 1;

				if depth == 0 {
					return None;
				}
			} else if view.starts_with(&open)
				&& view[open.len()..]
					.chars()
					.next()
					.is_some_and(|c| c.is_whitespace() || c == '>' || c == '/')
			{
				depth += 1;
			}

			at += found + 1;
		}
	}

	let open_tag = &rest[..open_end];

	Some(OpenTag {
		name_end: start + 1 + name_len,
		has_id_attribute: open_tag.contains(ID_ATTRIBUTE),
	})
}

/// Skips whitespace, a doctype, and comments before the first element.
fn skip_preamble(view: &str) -> usize {
	let mut at = 0;

	loop {
		let rest = &view[at..];
		let trimmed = rest.trim_start();

		at += rest.len() - trimmed.len();

		if trimmed.to_ascii_lowercase().starts_with("<!doctype") {
			match trimmed.find('>') {
				Some(end) => at += end + 1,
				None => return at,
			}
		} else if trimmed.starts_with("<!--") {
			match trimmed.find("-->") {
				Some(end) => at += end + 3,
				None => return at,
			}
		} else {
			return at;
		}
	}
}

/// Finds the end (exclusive) of the open tag starting at `view[0] == '<'`, honoring quotes.
fn find_tag_end(view: &str) -> Option<usize> {
	let mut quote = None;

	for (at, c) in view.char_indices() {
		match (quote, c) {
			(None, '"') => quote = Some('"'),
			(None, '\'') => quote = Some('\''),
			(None, '>') => return Some(at + 1),
			(Some(q), c) if c == q => quote = None,
			_ => {},
		}
	}

	None
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::template::parse;

	fn analyze_source(source: &str) -> Vec<Region> {
		let nodes =
			parse::parse(source, &HashSet::new()).expect("Source fixture should parse.");

		analyze(&nodes).expect("Analysis should succeed.")
	}

	#[test]
	fn wrapping_element_receives_the_region_id() {
		let regions = analyze_source("<p>Count: {{.N}}</p>");

		assert_eq!(regions.len(), 1);
		assert_eq!(regions[0].statics, vec!["<p lvt-id=\"a0\">Count: ", "</p>"]);
		assert!(matches!(regions[0].slots[0], Slot::Text { .. }));
	}

	#[test]
	fn bare_content_is_wrapped_in_a_neutral_container() {
		let regions = analyze_source("Count: {{.N}}");

		assert_eq!(
			regions[0].statics,
			vec!["<span style=\"display: contents\" lvt-id=\"a0\">Count: ", "</span>"]
		);
	}

	#[test]
	fn injection_is_idempotent() {
		let regions = analyze_source("<p lvt-id=\"hero\">{{.N}}</p>");

		assert_eq!(regions[0].statics, vec!["<p lvt-id=\"hero\">", "</p>"]);
	}

	#[test]
	fn region_ids_are_assigned_in_pre_order() {
		let source = "<div>{{if .A}}<p>{{.X}}</p>{{else}}<p>{{.Y}}</p>{{end}}\
			{{with .U}}{{.}}{{end}}</div>";
		let first = analyze_source(source);
		let second = analyze_source(source);
		let ids = |regions: &[Region]| {
			regions.iter().map(|region| region.id.clone()).collect::<Vec<_>>()
		};

		assert_eq!(ids(&first), ["a0", "a1", "a2", "a3"]);
		assert_eq!(ids(&first), ids(&second));
		assert_eq!(first[1].kind, RegionKind::Branch);
		assert_eq!(first[3].kind, RegionKind::Scope);
		assert_eq!(first[1].parent, Some(0));
	}

	#[test]
	fn loop_bodies_defer_their_instance_id() {
		let regions = analyze_source("<ul>{{range .Items}}<li>{{.Text}}</li>{{end}}</ul>");
		let body = &regions[1];

		assert_eq!(body.kind, RegionKind::LoopBody);
		assert_eq!(body.statics[0], "<li lvt-id=\"\">");

		let anchor = body.anchor.expect("Loop bodies should carry an anchor.");

		assert_eq!(anchor.static_index, 0);
		assert_eq!(&body.statics[0][..anchor.offset], "<li lvt-id=\"");
	}

	#[test]
	fn authored_dynamic_id_wins_over_injection() {
		let regions =
			analyze_source("<ul>{{range .Items}}<li lvt-id=\"{{id}}\">{{.Text}}</li>{{end}}</ul>");
		let body = &regions[1];

		assert_eq!(body.statics[0], "<li lvt-id=\"");
		assert!(matches!(body.slots[0], Slot::Attribute { .. }));
	}

	#[test]
	fn attribute_slots_are_classified_by_context() {
		let regions = analyze_source("<a href=\"{{.Url}}\" title='{{.Title}}'>{{.Label}}</a>");

		assert!(matches!(regions[0].slots[0], Slot::Attribute { .. }));
		assert!(matches!(regions[0].slots[1], Slot::Attribute { .. }));
		assert!(matches!(regions[0].slots[2], Slot::Text { .. }));
	}

	#[test]
	fn statics_are_always_one_longer_than_slots() {
		let regions = analyze_source(
			"<div>{{.A}}{{if .B}}x{{end}}{{range .C}}y{{end}}tail</div>",
		);

		for region in &regions {
			assert_eq!(region.statics.len(), region.slots.len() + 1);
		}
	}

	#[test]
	fn sibling_elements_fall_back_to_the_wrapper() {
		let regions = analyze_source("<p>a</p><p>b{{.X}}</p>");

		assert!(regions[0].statics[0].starts_with(NEUTRAL_OPEN));
	}

	#[test]
	fn early_closing_elements_do_not_capture_the_region() {
		// The leading <div> closes before the trailing text, so it cannot be the target.
		let regions = analyze_source("<div>{{.A}}</div> trailing");

		assert!(regions[0].statics[0].starts_with(NEUTRAL_OPEN));
	}

	#[test]
	fn doctype_preamble_is_skipped() {
		let regions = analyze_source("<!DOCTYPE html>\n<html><body>{{.X}}</body></html>");

		assert!(regions[0].statics[0].contains("<html lvt-id=\"a0\">"));
	}
}
