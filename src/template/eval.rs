//! Region-tree evaluation against a data snapshot.
//!
//! A single pass renders every live region instance to its instantiated statics plus, per
//! slot, an *identity* string (what the diff engine compares) and an *html* string (what
//! goes on the wire). Evaluator faults never abort the pass: the slot renders empty and a
//! [`RenderWarning`] is recorded.

// crates.io
use html_escape::{encode_double_quoted_attribute, encode_safe};
// self
use crate::{
	_prelude::*,
	template::{Template, analyze::Slot, ast::Expr, parse::ID_HELPER},
};

/// A trapped evaluator fault recorded during rendering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderWarning {
	/// Region instance the fault occurred in.
	pub region: String,
	/// Slot index within the region.
	pub slot: usize,
	/// Human-readable description of the fault.
	pub detail: String,
}
impl Display for RenderWarning {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "region {} slot {}: {}", self.region, self.slot, self.detail)
	}
}

/// One rendered slot: the compared identity and the transmitted html.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct SlotEval {
	/// Change-detection value: the rendered string for scalars, the active child
	/// instance id(s) for block slots.
	pub identity: String,
	/// Wire value: the rendered string for scalars, the serialized child html for blocks.
	pub html: String,
}

/// One live region instance produced by an evaluation pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct InstanceEval {
	/// Instance id (`a1`, or `a1-0` for loop rows).
	pub id: String,
	/// Arena index of the region this instance evaluates.
	pub region: usize,
	/// Suffix under which this instance's id was formed: the loop-site suffix for rows,
	/// the instance's own suffix otherwise. Pairs with [`EvalTree::evaluated_loops`].
	pub parent_suffix: String,
	/// Whether this instance is a loop row.
	pub is_row: bool,
	/// Nearest enclosing loop-row instance id, if any.
	pub owner_row: Option<String>,
	/// Instantiated statics (anchors spliced).
	pub statics: Vec<String>,
	/// Rendered slots, one per region slot.
	pub slots: Vec<SlotEval>,
}

/// All instances produced by one evaluation pass, in pre-order.
#[derive(Clone, Debug, Default)]
pub(crate) struct EvalTree {
	/// Instance ids in pre-order (document order).
	pub order: Vec<String>,
	/// Instance data by id.
	pub instances: HashMap<String, InstanceEval>,
	/// `(body region, enclosing suffix)` pairs whose loops were evaluated this pass; rows
	/// missing from the cache under an evaluated loop have truly vanished.
	pub evaluated_loops: HashSet<(usize, String)>,
	/// Full document render of the root instance.
	pub root_html: String,
}
impl EvalTree {
	pub fn get(&self, id: &str) -> Option<&InstanceEval> {
		self.instances.get(id)
	}
}

/// Evaluates the template against `data`, returning the instance tree and trapped faults.
pub(crate) fn evaluate(template: &Template, data: &Value) -> (EvalTree, Vec<RenderWarning>) {
	let mut evaluator = Evaluator { template, tree: EvalTree::default(), warnings: Vec::new() };
	let root_id = template.regions()[0].id.clone();
	let root_html = evaluator.eval_region(0, root_id, data, "", "", None, None, false);

	evaluator.tree.root_html = root_html;

	(evaluator.tree, evaluator.warnings)
}

struct Evaluator<'t> {
	template: &'t Template,
	tree: EvalTree,
	warnings: Vec<RenderWarning>,
}
impl Evaluator<'_> {
	#[allow(clippy::too_many_arguments)]
	fn eval_region(
		&mut self,
		region_idx: usize,
		id: String,
		current: &Value,
		suffix: &str,
		parent_suffix: &str,
		row: Option<&str>,
		owner_row: Option<String>,
		is_row: bool,
	) -> String {
		let template = self.template;
		let region = &template.regions()[region_idx];
		let mut statics = region.statics.clone();

		if let Some(anchor) = region.anchor {
			statics[anchor.static_index].insert_str(anchor.offset, &id);
		}

		self.tree.order.push(id.clone());

		let mut slots = Vec::with_capacity(region.slots.len());

		for (slot_idx, slot) in region.slots.iter().enumerate() {
			let eval = self.eval_slot(&id, slot_idx, slot, current, suffix, row);

			slots.push(eval);
		}

		let mut html = String::with_capacity(statics.iter().map(String::len).sum());

		for (idx, segment) in statics.iter().enumerate() {
			html.push_str(segment);

			if let Some(slot) = slots.get(idx) {
				html.push_str(&slot.html);
			}
		}

		self.tree.instances.insert(id.clone(), InstanceEval {
			id,
			region: region_idx,
			parent_suffix: parent_suffix.to_owned(),
			is_row,
			owner_row,
			statics,
			slots,
		});

		html
	}

	fn eval_slot(
		&mut self,
		instance: &str,
		slot_idx: usize,
		slot: &Slot,
		current: &Value,
		suffix: &str,
		row: Option<&str>,
	) -> SlotEval {
		// Children evaluated from here nest under the nearest enclosing row, which is
		// `row` itself when this instance is one.
		let child_owner = row.map(str::to_owned);

		match slot {
			Slot::Text { expr } => self.eval_scalar(instance, slot_idx, expr, current, row, false),
			Slot::Attribute { expr } =>
				self.eval_scalar(instance, slot_idx, expr, current, row, true),
			Slot::Branch { cond, then, otherwise } => {
				let truthy = match self.eval_expr(cond, current, row) {
					Ok(value) => is_truthy(&value),
					Err(detail) => {
						self.warn(instance, slot_idx, detail);

						false
					},
				};
				let active = if truthy { *then } else { *otherwise };

				match active {
					Some(child) =>
						self.eval_child(child, current, suffix, row, child_owner),
					None => SlotEval { identity: String::new(), html: String::new() },
				}
			},
			Slot::Scope { bind, body } => match self.eval_expr(bind, current, row) {
				Ok(value) if is_truthy(&value) =>
					self.eval_child(*body, &value, suffix, row, child_owner),
				Ok(_) => SlotEval { identity: String::new(), html: String::new() },
				Err(detail) => {
					self.warn(instance, slot_idx, detail);

					SlotEval { identity: String::new(), html: String::new() }
				},
			},
			Slot::Loop { over, body, empty } => {
				let value = match self.eval_expr(over, current, row) {
					Ok(value) => value,
					Err(detail) => {
						self.warn(instance, slot_idx, detail);

						Value::Null
					},
				};
				let elements = collect_elements(&value);

				self.tree.evaluated_loops.insert((*body, suffix.to_owned()));

				match elements {
					Elements::Rows(rows) if !rows.is_empty() => {
						let body_id = self.template.regions()[*body].id.clone();
						let mut ids = Vec::with_capacity(rows.len());
						let mut html = String::new();

						for (key, element) in rows {
							let row_id = format!("{body_id}{suffix}-{key}");
							let row_suffix = format!("{suffix}-{key}");

							html.push_str(&self.eval_region(
								*body,
								row_id.clone(),
								element,
								&row_suffix,
								suffix,
								Some(&row_id),
								child_owner.clone(),
								true,
							));
							ids.push(row_id);
						}

						SlotEval { identity: ids.join(" "), html }
					},
					Elements::Rows(_) => match empty {
						Some(child) =>
							self.eval_child(*child, current, suffix, row, child_owner),
						None => SlotEval { identity: String::new(), html: String::new() },
					},
					Elements::NotACollection => {
						self.warn(instance, slot_idx, "range over a non-collection value".into());

						SlotEval { identity: String::new(), html: String::new() }
					},
				}
			},
		}
	}

	fn eval_child(
		&mut self,
		region_idx: usize,
		current: &Value,
		suffix: &str,
		row: Option<&str>,
		owner_row: Option<String>,
	) -> SlotEval {
		let child_id = format!("{}{suffix}", self.template.regions()[region_idx].id);
		let html = self.eval_region(
			region_idx,
			child_id.clone(),
			current,
			suffix,
			suffix,
			row,
			owner_row,
			false,
		);

		SlotEval { identity: child_id, html }
	}

	fn eval_scalar(
		&mut self,
		instance: &str,
		slot_idx: usize,
		expr: &Expr,
		current: &Value,
		row: Option<&str>,
		attribute: bool,
	) -> SlotEval {
		let rendered = match self.eval_expr(expr, current, row) {
			Ok(value) => {
				let plain = scalar_to_string(&value);

				if attribute {
					encode_double_quoted_attribute(&plain).into_owned()
				} else {
					encode_safe(&plain).into_owned()
				}
			},
			Err(detail) => {
				self.warn(instance, slot_idx, detail);

				String::new()
			},
		};

		SlotEval { identity: rendered.clone(), html: rendered }
	}

	fn eval_expr(&self, expr: &Expr, current: &Value, row: Option<&str>) -> Result<Value, String> {
		match expr {
			Expr::Current => Ok(current.clone()),
			Expr::Path(segments) => {
				let mut value = current;

				for segment in segments {
					match value {
						Value::Object(map) => match map.get(segment) {
							Some(child) => value = child,
							None => return Err(format!("missing field `{segment}`")),
						},
						_ => return Err(format!("cannot access `{segment}` on a scalar value")),
					}
				}

				Ok(value.clone())
			},
			Expr::Str(s) => Ok(Value::String(s.clone())),
			Expr::Int(i) => Ok(Value::from(*i)),
			Expr::Float(f) => Ok(Value::from(*f)),
			Expr::Bool(b) => Ok(Value::Bool(*b)),
			Expr::Helper { name, args } if name == ID_HELPER => {
				if !args.is_empty() {
					return Err("the id helper takes no arguments".into());
				}

				row.map(|row| Value::String(row.to_owned()))
					.ok_or_else(|| "the id helper is only valid inside a range body".into())
			},
			Expr::Helper { name, args } => {
				let helper = self
					.template
					.helpers()
					.get(name)
					.ok_or_else(|| format!("helper `{name}` is not registered"))?;
				let args = args
					.iter()
					.map(|arg| self.eval_expr(arg, current, row))
					.collect::<Result<Vec<_>, _>>()?;

				helper(&args).map_err(|e| e.to_string())
			},
		}
	}

	fn warn(&mut self, instance: &str, slot: usize, detail: String) {
		self.warnings.push(RenderWarning { region: instance.to_owned(), slot, detail });
	}
}

enum Elements<'v> {
	Rows(Vec<(String, &'v Value)>),
	NotACollection,
}

fn collect_elements(value: &Value) -> Elements<'_> {
	match value {
		Value::Array(items) => Elements::Rows(
			items.iter().enumerate().map(|(idx, item)| (element_key(idx, item), item)).collect(),
		),
		Value::Object(map) =>
			Elements::Rows(map.iter().map(|(key, item)| (sanitize_key(key), item)).collect()),
		Value::Null | Value::Bool(false) => Elements::Rows(Vec::new()),
		_ => Elements::NotACollection,
	}
}

/// Iteration key: the element's explicit `Key` field when present, else the zero-based index.
fn element_key(idx: usize, element: &Value) -> String {
	match element.get("Key") {
		Some(Value::String(key)) => sanitize_key(key),
		Some(Value::Number(key)) => sanitize_key(&key.to_string()),
		_ => idx.to_string(),
	}
}

fn sanitize_key(key: &str) -> String {
	key.chars()
		.map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
		.collect()
}

fn scalar_to_string(value: &Value) -> String {
	match value {
		Value::Null => String::new(),
		Value::String(s) => s.clone(),
		Value::Bool(_) | Value::Number(_) => value.to_string(),
		Value::Array(_) | Value::Object(_) =>
			serde_json::to_string(value).unwrap_or_default(),
	}
}

fn is_truthy(value: &Value) -> bool {
	match value {
		Value::Null => false,
		Value::Bool(b) => *b,
		Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
		Value::String(s) => !s.is_empty(),
		Value::Array(a) => !a.is_empty(),
		Value::Object(o) => !o.is_empty(),
	}
}
