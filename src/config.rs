//! Option structs for the reading, writing and diffing sessions.
//!
//! These are plain data and can be deserialized with serde so embedding
//! applications can carry them in their own configuration files.
//! Behavior that cannot be serialized — inclusion predicates and
//! rejection sinks — is attached to a reader with its builder methods
//! instead.

use serde::{Deserialize, Serialize};

use crate::schema::SchemaPolicy;

/// Options for a decoding session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
	/// What to do when a decoded entry does not conform to schema.
	pub schema_policy: SchemaPolicy,
	/// Whether a change record without a `changetype:` line defaults to
	/// `add` rather than failing.
	pub default_add: bool,
	/// Whether objectclass values are kept at all.
	pub include_object_classes: bool,
}

impl Default for ReadOptions {
	fn default() -> Self {
		ReadOptions {
			schema_policy: SchemaPolicy::default(),
			default_add: true,
			include_object_classes: true,
		}
	}
}

/// Options for a serializing session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
	/// Column at which logical lines are folded; `0` disables folding.
	/// The first segment takes the full width, every continuation is
	/// prefixed with one space and takes one column less.
	pub wrap_column: usize,
	/// Whether to emit a `version: 1` header before the first record.
	pub version_header: bool,
}

impl Default for WriteOptions {
	fn default() -> Self {
		WriteOptions { wrap_column: 76, version_header: false }
	}
}

/// Options for the diff engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffOptions {
	/// Attribute type names excluded from comparison and from generated
	/// add records. This is the explicit home for operational attributes
	/// such as entry metadata; nothing is inferred from naming.
	pub ignore_attributes: Vec<String>,
}

impl DiffOptions {
	/// Whether the named attribute is excluded from the diff.
	#[must_use]
	pub fn ignores(&self, name: &str) -> bool {
		self.ignore_attributes.iter().any(|a| a.eq_ignore_ascii_case(name))
	}
}
