//! Fragment diff engine: turns an evaluation pass into the minimal wire update.
//!
//! The page-level [`RegionCache`] remembers the identity of every slot as last transmitted;
//! the per-connection [`ClientView`] remembers which region instances have already received
//! their statics. A region instance enters the frame only when it is new to the connection
//! or one of its slot identities changed, so repeating an action that leaves the data
//! untouched yields an empty frame.

// self
use crate::{
	_prelude::*,
	frame::{FragmentFrame, RegionPatch},
	template::eval::EvalTree,
};

/// Last-transmitted slot identities per region instance, owned by the page.
#[derive(Clone, Debug, Default)]
pub struct RegionCache {
	entries: HashMap<String, CacheEntry>,
}
impl RegionCache {
	/// Drops every cached identity, forcing the next diff to re-emit changed regions.
	pub fn clear(&mut self) {
		self.entries.clear();
	}

	#[cfg(test)]
	pub(crate) fn contains(&self, id: &str) -> bool {
		self.entries.contains_key(id)
	}
}

#[derive(Clone, Debug)]
struct CacheEntry {
	region: usize,
	parent_suffix: String,
	identities: Vec<String>,
	is_row: bool,
	owner_row: Option<String>,
}

/// Per-connection record of which region instances have received their statics.
///
/// A reconnect starts from a fresh view, so the first frame to the new client carries the
/// statics of every region again.
#[derive(Clone, Debug, Default)]
pub struct ClientView {
	statics_sent: HashSet<String>,
}
impl ClientView {
	/// Creates a view that has seen nothing yet.
	pub fn new() -> Self {
		Self::default()
	}
}

/// Computes the fragment frame for one evaluation pass and updates cache + view.
pub(crate) fn diff_frame(
	tree: &EvalTree,
	cache: &mut RegionCache,
	view: &mut ClientView,
) -> FragmentFrame {
	let mut frame = FragmentFrame::default();
	let visited: HashSet<&str> = tree.order.iter().map(String::as_str).collect();

	for id in &tree.order {
		let Some(instance) = tree.get(id) else {
			continue;
		};
		let first = view.statics_sent.insert(id.clone());
		let patch = if first {
			Some(RegionPatch::full(
				instance.statics.iter().cloned(),
				instance.slots.iter().enumerate().map(|(idx, slot)| (idx, slot.html.clone())),
			))
		} else {
			let previous = cache.entries.get(id).map(|entry| entry.identities.as_slice());
			let changed: BTreeMap<usize, String> = instance
				.slots
				.iter()
				.enumerate()
				.filter(|(idx, slot)| {
					previous.and_then(|identities| identities.get(*idx))
						!= Some(&slot.identity)
				})
				.map(|(idx, slot)| (idx, slot.html.clone()))
				.collect();

			(!changed.is_empty()).then_some(RegionPatch::slots(changed))
		};

		if let Some(patch) = patch {
			frame.insert(id.clone(), patch);
		}

		cache.entries.insert(id.clone(), CacheEntry {
			region: instance.region,
			parent_suffix: instance.parent_suffix.clone(),
			identities: instance.slots.iter().map(|slot| slot.identity.clone()).collect(),
			is_row: instance.is_row,
			owner_row: instance.owner_row.clone(),
		});
	}

	// Rows cached under a loop that was evaluated this pass but no longer produced them
	// have vanished: emit a removal sentinel and drop their state. Hidden branches, by
	// contrast, are simply not visited and keep their state.
	let removed_rows: Vec<String> = cache
		.entries
		.iter()
		.filter(|(id, entry)| {
			entry.is_row
				&& !visited.contains(id.as_str())
				&& tree.evaluated_loops.contains(&(entry.region, entry.parent_suffix.clone()))
		})
		.map(|(id, _)| id.clone())
		.collect();
	let mut dropped: HashSet<String> = removed_rows.iter().cloned().collect();

	loop {
		let descendants: Vec<String> = cache
			.entries
			.iter()
			.filter(|(id, entry)| {
				!dropped.contains(id.as_str())
					&& entry.owner_row.as_ref().is_some_and(|owner| dropped.contains(owner))
			})
			.map(|(id, _)| id.clone())
			.collect();

		if descendants.is_empty() {
			break;
		}

		dropped.extend(descendants);
	}

	for id in &dropped {
		cache.entries.remove(id);
		view.statics_sent.remove(id);
	}
	for id in removed_rows {
		frame.insert(id, RegionPatch::Removed);
	}

	frame
}
