//! JSON wire frames exchanged with the browser client.
//!
//! Inbound frames carry an action name, named arguments, and the page token. Outbound
//! frames map region instance ids to patches: the first transmission of a region to a
//! client includes `"s"` (the static segments) and every slot; later transmissions carry
//! only the slot indices whose values changed. A `null` patch removes a range row.

// crates.io
use serde::{Deserializer, Serializer, de::Error as DeError, ser::SerializeMap};
// self
use crate::{_prelude::*, error::ActionError};

/// Well-known region id the client reserves for runtime error output.
pub const ERROR_REGION_ID: &str = "lvt-error";

/// Inbound action frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionFrame {
	/// Dotted action name; an optional prefix selects the data model.
	pub action: String,
	/// Named arguments for the handler.
	#[serde(default)]
	pub data: serde_json::Map<String, Value>,
	/// Page token presented by the client.
	pub token: String,
}
impl ActionFrame {
	/// Decodes an inbound frame, reporting the offending path on malformed JSON.
	pub fn decode(bytes: &[u8]) -> Result<Self, ActionError> {
		let mut deserializer = serde_json::Deserializer::from_slice(bytes);

		serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| ActionError::Decode { source })
	}
}

/// Update for one region instance within a fragment frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegionPatch {
	/// New statics and/or changed slot values.
	Update {
		/// Static segments; present only on the first transmission to a client.
		statics: Option<Vec<String>>,
		/// Changed slot values keyed by slot index.
		slots: BTreeMap<usize, String>,
	},
	/// Removal sentinel for a vanished range row.
	Removed,
}
impl RegionPatch {
	/// Patch carrying only changed slots.
	pub fn slots<I>(slots: I) -> Self
	where
		I: IntoIterator<Item = (usize, String)>,
	{
		Self::Update { statics: None, slots: slots.into_iter().collect() }
	}

	/// First-transmission patch carrying statics and every slot.
	pub fn full<S, I>(statics: S, slots: I) -> Self
	where
		S: IntoIterator<Item = String>,
		I: IntoIterator<Item = (usize, String)>,
	{
		Self::Update {
			statics: Some(statics.into_iter().collect()),
			slots: slots.into_iter().collect(),
		}
	}
}
impl Serialize for RegionPatch {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		match self {
			Self::Removed => serializer.serialize_unit(),
			Self::Update { statics, slots } => {
				let len = usize::from(statics.is_some()) + slots.len();
				let mut map = serializer.serialize_map(Some(len))?;

				if let Some(statics) = statics {
					map.serialize_entry("s", statics)?;
				}

				for (index, value) in slots {
					map.serialize_entry(&index.to_string(), value)?;
				}

				map.end()
			},
		}
	}
}
impl<'de> Deserialize<'de> for RegionPatch {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = Value::deserialize(deserializer)?;

		match value {
			Value::Null => Ok(Self::Removed),
			Value::Object(map) => {
				let mut statics = None;
				let mut slots = BTreeMap::new();

				for (key, value) in map {
					if key == "s" {
						let segments = value
							.as_array()
							.ok_or_else(|| D::Error::custom("`s` must be an array"))?
							.iter()
							.map(|segment| {
								segment
									.as_str()
									.map(str::to_owned)
									.ok_or_else(|| D::Error::custom("statics must be strings"))
							})
							.collect::<Result<Vec<_>, _>>()?;

						statics = Some(segments);
					} else {
						let index = key
							.parse::<usize>()
							.map_err(|_| D::Error::custom("slot keys must be indices"))?;
						let value = value
							.as_str()
							.map(str::to_owned)
							.ok_or_else(|| D::Error::custom("slot values must be strings"))?;

						slots.insert(index, value);
					}
				}

				Ok(Self::Update { statics, slots })
			},
			_ => Err(D::Error::custom("a region patch must be an object or null")),
		}
	}
}

/// Outbound fragment frame: region instance id to patch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentFrame(pub BTreeMap<String, RegionPatch>);
impl FragmentFrame {
	/// Returns `true` when the frame carries no updates.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Adds or replaces a region patch.
	pub fn insert(&mut self, id: impl Into<String>, patch: RegionPatch) {
		self.0.insert(id.into(), patch);
	}

	/// Encodes the frame as compact JSON.
	pub fn encode(&self) -> Result<String, serde_json::Error> {
		serde_json::to_string(self)
	}

	/// Builds a frame addressing the reserved error region with an escaped message.
	pub fn error(message: &str) -> Self {
		let escaped = html_escape::encode_safe(message).into_owned();
		let mut frame = Self::default();

		frame.insert(ERROR_REGION_ID, RegionPatch::slots([(0, escaped)]));

		frame
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	#[test]
	fn first_transmission_shape_matches_the_wire_contract() {
		let mut frame = FragmentFrame::default();

		frame.insert(
			"a0",
			RegionPatch::full(
				["<p lvt-id=\"a0\">Count: ".to_owned(), "</p>".to_owned()],
				[(0, "0".to_owned())],
			),
		);

		let encoded = frame.encode().expect("Frame should encode.");
		let value: Value = serde_json::from_str(&encoded).expect("Encoded frame should parse.");

		assert_eq!(
			value,
			json!({ "a0": { "s": ["<p lvt-id=\"a0\">Count: ", "</p>"], "0": "0" } })
		);
	}

	#[test]
	fn removal_sentinel_encodes_as_null() {
		let mut frame = FragmentFrame::default();

		frame.insert("a1-0", RegionPatch::Removed);

		assert_eq!(frame.encode().expect("Frame should encode."), "{\"a1-0\":null}");
	}

	#[test]
	fn patches_round_trip_through_json() {
		let mut frame = FragmentFrame::default();

		frame.insert("a0", RegionPatch::slots([(1, "x".to_owned())]));
		frame.insert("a1-2", RegionPatch::Removed);

		let encoded = frame.encode().expect("Frame should encode.");
		let decoded: FragmentFrame =
			serde_json::from_str(&encoded).expect("Encoded frame should decode.");

		assert_eq!(decoded, frame);
	}

	#[test]
	fn action_frames_decode_with_defaulted_data() {
		let frame = ActionFrame::decode(br#"{ "action": "increment", "token": "t" }"#)
			.expect("Minimal frame should decode.");

		assert_eq!(frame.action, "increment");
		assert!(frame.data.is_empty());
	}

	#[test]
	fn malformed_action_frames_name_the_offending_path() {
		let error = ActionFrame::decode(br#"{ "action": 7, "token": "t" }"#)
			.expect_err("A numeric action must fail.");
		let ActionError::Decode { source } = error else {
			panic!("Expected a decode error.");
		};

		assert_eq!(source.path().to_string(), "action");
	}

	#[test]
	fn error_frames_escape_the_message() {
		let frame = FragmentFrame::error("<script>boom</script>");
		let encoded = frame.encode().expect("Frame should encode.");

		assert!(encoded.contains("lvt-error"));
		assert!(!encoded.contains("<script>"));
	}
}
