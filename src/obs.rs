//! Optional observability hooks for the page runtime.
//!
//! Pages and the registry report domain events — an action dispatched, a fragment frame
//! emitted, a sweep finished — and this module translates them into structured `tracing`
//! events and `metrics` counters. Without the features every hook compiles to a no-op, so
//! call sites stay unconditional.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit events carrying the page id, action name, and frame shape.
//! - Enable `metrics` to maintain the `livepage_actions_total` counter (labeled by
//!   `outcome`, plus `reason` on failures) and the `livepage_frame_regions_total`,
//!   `livepage_frame_removals_total`, `livepage_render_warnings_total`,
//!   `livepage_renders_total`, and `livepage_pages_evicted_total` counters.

// self
use crate::{
	auth::PageId,
	frame::{FragmentFrame, RegionPatch},
};

/// Shape of one emitted fragment frame, as reported to logs and counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
	/// Region instances updated by the frame.
	pub regions: usize,
	/// Range rows removed by the frame.
	pub removals: usize,
}
impl FrameStats {
	/// Tallies a frame before it goes on the wire.
	pub fn of(frame: &FragmentFrame) -> Self {
		frame.0.values().fold(Self::default(), |mut stats, patch| {
			match patch {
				RegionPatch::Update { .. } => stats.regions += 1,
				RegionPatch::Removed => stats.removals += 1,
			}

			stats
		})
	}

	/// Returns `true` when the frame carried no updates at all.
	pub fn is_empty(&self) -> bool {
		self.regions == 0 && self.removals == 0
	}
}

/// Reports an inbound action about to run on a page.
pub fn action_dispatched(page: PageId, action: &str) {
	#[cfg(feature = "tracing")]
	tracing::debug!(page = %page, action, "action dispatched");
	#[cfg(feature = "metrics")]
	metrics::counter!("livepage_actions_total", "outcome" => "dispatched").increment(1);
	#[cfg(not(feature = "tracing"))]
	let _ = (page, action);
}

/// Reports an action that ran to completion, with the shape of the frame it produced.
pub fn action_completed(page: PageId, action: &str, stats: &FrameStats, warnings: usize) {
	#[cfg(feature = "tracing")]
	tracing::info!(
		page = %page,
		action,
		regions = stats.regions,
		removals = stats.removals,
		warnings,
		"action completed",
	);
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("livepage_actions_total", "outcome" => "completed").increment(1);
		metrics::counter!("livepage_frame_regions_total").increment(stats.regions as u64);
		metrics::counter!("livepage_frame_removals_total").increment(stats.removals as u64);
		metrics::counter!("livepage_render_warnings_total").increment(warnings as u64);
	}
	#[cfg(not(feature = "tracing"))]
	let _ = (page, action);
	#[cfg(not(any(feature = "tracing", feature = "metrics")))]
	let _ = (stats, warnings);
}

/// Reports an action that never produced a frame.
pub fn action_failed(page: PageId, action: &str, reason: &'static str) {
	#[cfg(feature = "tracing")]
	tracing::warn!(page = %page, action, reason, "action failed");
	#[cfg(feature = "metrics")]
	metrics::counter!("livepage_actions_total", "outcome" => "failed", "reason" => reason)
		.increment(1);
	#[cfg(not(feature = "tracing"))]
	let _ = (page, action);
	#[cfg(not(any(feature = "tracing", feature = "metrics")))]
	let _ = reason;
}

/// Reports a full-document render for an initial load.
pub fn page_rendered(page: PageId, warnings: usize) {
	#[cfg(feature = "tracing")]
	tracing::info!(page = %page, warnings, "page rendered");
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("livepage_renders_total").increment(1);
		metrics::counter!("livepage_render_warnings_total").increment(warnings as u64);
	}
	#[cfg(not(feature = "tracing"))]
	let _ = page;
	#[cfg(not(any(feature = "tracing", feature = "metrics")))]
	let _ = warnings;
}

/// Reports one pass of the background cleanup task.
pub fn pages_swept(evicted: usize, remaining: usize) {
	#[cfg(feature = "tracing")]
	tracing::debug!(evicted, remaining, "page sweep finished");
	#[cfg(feature = "metrics")]
	metrics::counter!("livepage_pages_evicted_total").increment(evicted as u64);
	#[cfg(not(feature = "tracing"))]
	let _ = remaining;
	#[cfg(not(any(feature = "tracing", feature = "metrics")))]
	let _ = evicted;
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn frame_stats_tally_updates_and_removals() {
		let mut frame = FragmentFrame::default();

		frame.insert("a0", RegionPatch::slots([(0, "x".to_owned())]));
		frame.insert("a1-0", RegionPatch::Removed);
		frame.insert(
			"a1-1",
			RegionPatch::full(["<li>".to_owned(), "</li>".to_owned()], [(0, "y".to_owned())]),
		);

		let stats = FrameStats::of(&frame);

		assert_eq!(stats, FrameStats { regions: 2, removals: 1 });
		assert!(!stats.is_empty());
		assert!(FrameStats::of(&FragmentFrame::default()).is_empty());
	}

	#[test]
	fn hooks_are_noops_without_features() {
		let page = PageId::from_bytes([7; 16]);

		action_dispatched(page, "increment");
		action_failed(page, "increment", "no handler");
		action_completed(page, "increment", &FrameStats::default(), 0);
		page_rendered(page, 0);
		pages_swept(0, 0);
	}
}
