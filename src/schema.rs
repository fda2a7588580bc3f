//! Attribute-type lookup and schema-validation policy.
//!
//! The decoders consume schema through the small [`Schema`] trait: a
//! case-insensitive attribute-type lookup with an unknown-type fallback,
//! an objectclass known/unknown test and an entry conformance check that
//! returns diagnostic messages. [`AttributeRegistry`] is the in-crate
//! implementation, built from explicitly declared types; a freshly
//! constructed registry knows nothing and treats every name as unknown.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::entry::Entry;

/// What to do when a decoded entry does not conform to schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaPolicy {
	/// Reject the record: it is reported, counted and not returned.
	Reject,
	/// Log a warning and return the record unchanged.
	Warn,
	/// Return the record without checking at all.
	#[default]
	Ignore,
}

/// The resolved definition of one attribute type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeType {
	/// Canonical name of the type (the declared spelling for known types,
	/// the queried spelling for unknown ones).
	pub name: String,
	/// Whether the type may hold at most one value.
	pub single_value: bool,
	/// Whether the type is maintained by the server rather than the user.
	pub operational: bool,
	/// Whether the type was found in the schema, as opposed to being the
	/// default fallback for an unknown name.
	pub known: bool,
}

impl AttributeType {
	/// The fallback definition used for names the schema does not know:
	/// multi-valued, non-operational, flagged unknown.
	#[must_use]
	pub fn unknown(name: &str) -> Self {
		AttributeType {
			name: name.to_owned(),
			single_value: false,
			operational: false,
			known: false,
		}
	}
}

/// Schema services consumed by the decoders.
pub trait Schema {
	/// Looks up an attribute type by name, case-insensitively. Unknown
	/// names resolve to [`AttributeType::unknown`] rather than failing.
	fn attribute_type(&self, name: &str) -> AttributeType;

	/// Whether an objectclass with this name is defined.
	fn is_known_object_class(&self, name: &str) -> bool;

	/// Checks an assembled entry against the schema. An empty vector
	/// means the entry conforms; otherwise each string is one diagnostic.
	fn check_entry(&self, entry: &Entry) -> Vec<String>;
}

/// A declared set of attribute types and objectclasses.
#[derive(Debug, Clone, Default)]
pub struct AttributeRegistry {
	/// Declared attribute types keyed by lowercased name.
	attributes: HashMap<String, AttributeType>,
	/// Lowercased names of declared objectclasses.
	object_classes: HashSet<String>,
}

impl AttributeRegistry {
	/// Creates an empty registry.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Declares an attribute type.
	#[must_use]
	pub fn with_attribute(mut self, name: &str, single_value: bool, operational: bool) -> Self {
		self.attributes.insert(
			name.to_lowercase(),
			AttributeType { name: name.to_owned(), single_value, operational, known: true },
		);
		self
	}

	/// Declares an objectclass.
	#[must_use]
	pub fn with_object_class(mut self, name: &str) -> Self {
		self.object_classes.insert(name.to_lowercase());
		self
	}
}

impl Schema for AttributeRegistry {
	fn attribute_type(&self, name: &str) -> AttributeType {
		self.attributes
			.get(&name.to_lowercase())
			.cloned()
			.unwrap_or_else(|| AttributeType::unknown(name))
	}

	fn is_known_object_class(&self, name: &str) -> bool {
		self.object_classes.contains(&name.to_lowercase())
	}

	fn check_entry(&self, entry: &Entry) -> Vec<String> {
		let mut diagnostics = Vec::new();
		for class in entry.object_classes() {
			if !self.is_known_object_class(class) {
				diagnostics.push(format!("objectclass {class} is not defined in the schema"));
			}
		}
		for attribute in entry.attributes() {
			let name = attribute.description().name();
			if !self.attribute_type(name).known {
				diagnostics.push(format!("attribute type {name} is not defined in the schema"));
			}
		}
		diagnostics
	}
}
