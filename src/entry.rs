//! The entry model shared by the file readers, the writer, the diff and
//! patch engines and the search-result reader.
//!
//! An [`Entry`] is a DN plus an insertion-ordered objectclass set and an
//! insertion-ordered list of attributes; each [`Attribute`] keeps its
//! values ordered and unique. The model is byte-oriented: values are raw
//! octet strings and only become text where the grammar demands it.

use ldap3::SearchEntry;
use tracing::warn;

use crate::{
	name::{Dn, NameError},
	schema::AttributeType,
};

/// Errors raised while adding a value to an entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
	/// The same value was provided twice for one attribute description.
	#[error("duplicate value for attribute {0}")]
	Duplicate(String),
	/// A second value was provided for a single-valued attribute type.
	#[error("multiple values for single-valued attribute {0}")]
	SingleValue(String),
}

/// An attribute description: a type name plus zero or more `;option`
/// suffixes in written order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDescription {
	/// The attribute type name as written.
	name: String,
	/// Options in written order, each non-empty.
	options: Vec<String>,
}

impl AttributeDescription {
	/// A description with no options.
	#[must_use]
	pub fn new(name: &str) -> Self {
		AttributeDescription { name: name.to_owned(), options: Vec::new() }
	}

	/// Decodes `name[;option]*`. Empty options are dropped.
	#[must_use]
	pub fn parse(description: &str) -> Self {
		let mut parts = description.split(';');
		let name = parts.next().unwrap_or_default().to_owned();
		let options =
			parts.filter(|option| !option.is_empty()).map(str::to_owned).collect();
		AttributeDescription { name, options }
	}

	/// The attribute type name as written.
	#[must_use]
	pub fn name(&self) -> &str {
		&self.name
	}

	/// The options in written order.
	#[must_use]
	pub fn options(&self) -> &[String] {
		&self.options
	}

	/// Whether two descriptions denote the same (type, options) identity.
	/// Names compare case-insensitively; option sets compare without
	/// regard to order or case.
	#[must_use]
	pub fn matches(&self, other: &AttributeDescription) -> bool {
		if !self.name.eq_ignore_ascii_case(&other.name)
			|| self.options.len() != other.options.len()
		{
			return false;
		}
		let mut mine: Vec<String> =
			self.options.iter().map(|o| o.to_lowercase()).collect();
		let mut theirs: Vec<String> =
			other.options.iter().map(|o| o.to_lowercase()).collect();
		mine.sort();
		theirs.sort();
		mine == theirs
	}

	/// Renders the description for an LDIF attribute line.
	#[must_use]
	pub fn to_wire(&self) -> String {
		if self.options.is_empty() {
			self.name.clone()
		} else {
			format!("{};{}", self.name, self.options.join(";"))
		}
	}
}

/// One attribute: a description plus its ordered, duplicate-free values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
	/// The (type, options) identity of the attribute.
	description: AttributeDescription,
	/// Values in insertion order, each unique.
	values: Vec<Vec<u8>>,
}

impl Attribute {
	/// An attribute with no values yet.
	#[must_use]
	pub fn new(description: AttributeDescription) -> Self {
		Attribute { description, values: Vec::new() }
	}

	/// An attribute carrying the given values, deduplicated.
	#[must_use]
	pub fn with_values(description: AttributeDescription, values: Vec<Vec<u8>>) -> Self {
		let mut attribute = Attribute::new(description);
		for value in values {
			attribute.push_value(value);
		}
		attribute
	}

	/// The description of this attribute.
	#[must_use]
	pub fn description(&self) -> &AttributeDescription {
		&self.description
	}

	/// The values in insertion order.
	#[must_use]
	pub fn values(&self) -> &[Vec<u8>] {
		&self.values
	}

	/// Whether the given value is present.
	#[must_use]
	pub fn contains(&self, value: &[u8]) -> bool {
		self.values.iter().any(|v| v == value)
	}

	/// Appends a value, keeping the set unique. Returns `false` when the
	/// value was already present.
	pub fn push_value(&mut self, value: Vec<u8>) -> bool {
		if self.contains(&value) {
			return false;
		}
		self.values.push(value);
		true
	}

	/// Removes a value. Returns `false` when it was not present.
	pub fn remove_value(&mut self, value: &[u8]) -> bool {
		let before = self.values.len();
		self.values.retain(|v| v != value);
		self.values.len() != before
	}

	/// Replaces the whole value set.
	pub fn replace_values(&mut self, values: Vec<Vec<u8>>) {
		self.values.clear();
		for value in values {
			self.push_value(value);
		}
	}

	/// Whether the attribute currently has no values.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}
}

/// A directory entry: a DN, an objectclass set and a list of attributes,
/// both in insertion order.
///
/// Insertion order is presentation, not identity: equality compares the
/// objectclass set, the attribute set and each value set without regard
/// to order, so an entry rebuilt by replaying modifications compares
/// equal to the original however the modifications were sequenced.
#[derive(Debug, Clone)]
pub struct Entry {
	/// The distinguished name of the entry.
	dn: Dn,
	/// Objectclasses as (lowercased identity, declared name) pairs in
	/// first-seen order.
	object_classes: Vec<(String, String)>,
	/// Attributes in first-seen order of their description.
	attributes: Vec<Attribute>,
}

impl Entry {
	/// An entry with the given name and nothing else.
	#[must_use]
	pub fn new(dn: Dn) -> Self {
		Entry { dn, object_classes: Vec::new(), attributes: Vec::new() }
	}

	/// The distinguished name of the entry.
	#[must_use]
	pub fn dn(&self) -> &Dn {
		&self.dn
	}

	/// Replaces the distinguished name (used by rename handling).
	pub fn set_dn(&mut self, dn: Dn) {
		self.dn = dn;
	}

	/// Adds an objectclass, preserving first-seen order. A duplicate is
	/// logged and dropped; returns whether the class was added.
	pub fn add_object_class(&mut self, name: &str) -> bool {
		let key = name.to_lowercase();
		if self.object_classes.iter().any(|(existing, _)| *existing == key) {
			warn!(entry = %self.dn, objectclass = name, "duplicate objectclass ignored");
			return false;
		}
		self.object_classes.push((key, name.to_owned()));
		true
	}

	/// Removes an objectclass by name. Returns whether it was present.
	pub fn remove_object_class(&mut self, name: &str) -> bool {
		let key = name.to_lowercase();
		let before = self.object_classes.len();
		self.object_classes.retain(|(existing, _)| *existing != key);
		self.object_classes.len() != before
	}

	/// Drops all objectclasses.
	pub fn clear_object_classes(&mut self) {
		self.object_classes.clear();
	}

	/// The declared objectclass names in first-seen order.
	pub fn object_classes(&self) -> impl Iterator<Item = &str> {
		self.object_classes.iter().map(|(_, name)| name.as_str())
	}

	/// Whether the entry carries the named objectclass.
	#[must_use]
	pub fn has_object_class(&self, name: &str) -> bool {
		let key = name.to_lowercase();
		self.object_classes.iter().any(|(existing, _)| *existing == key)
	}

	/// The attributes in first-seen order.
	#[must_use]
	pub fn attributes(&self) -> &[Attribute] {
		&self.attributes
	}

	/// Finds the attribute with a matching description.
	#[must_use]
	pub fn attribute(&self, description: &AttributeDescription) -> Option<&Attribute> {
		self.attributes.iter().find(|a| a.description().matches(description))
	}

	/// Finds the attribute with a matching description, mutably.
	pub fn attribute_mut(
		&mut self,
		description: &AttributeDescription,
	) -> Option<&mut Attribute> {
		self.attributes.iter_mut().find(|a| a.description().matches(description))
	}

	/// Finds or creates the attribute with the given description.
	pub fn attribute_or_insert(
		&mut self,
		description: AttributeDescription,
	) -> &mut Attribute {
		if let Some(idx) =
			self.attributes.iter().position(|a| a.description().matches(&description))
		{
			&mut self.attributes[idx]
		} else {
			self.attributes.push(Attribute::new(description));
			// Just pushed, so the list is non-empty.
			let last = self.attributes.len() - 1;
			&mut self.attributes[last]
		}
	}

	/// Removes the attribute with a matching description. Returns whether
	/// it was present.
	pub fn remove_attribute(&mut self, description: &AttributeDescription) -> bool {
		let before = self.attributes.len();
		self.attributes.retain(|a| !a.description().matches(description));
		self.attributes.len() != before
	}

	/// Keeps only the attributes passing the predicate.
	pub fn retain_attributes(&mut self, mut keep: impl FnMut(&Attribute) -> bool) {
		self.attributes.retain(|attribute| keep(attribute));
	}

	/// Adds one value under the given description, enforcing the
	/// duplicate-value and single-value invariants.
	pub fn put_value(
		&mut self,
		attribute_type: &AttributeType,
		description: AttributeDescription,
		value: Vec<u8>,
	) -> Result<(), ValueError> {
		let name = description.to_wire();
		let attribute = self.attribute_or_insert(description);
		if attribute.contains(&value) {
			return Err(ValueError::Duplicate(name));
		}
		if attribute_type.single_value && !attribute.is_empty() {
			return Err(ValueError::SingleValue(name));
		}
		attribute.push_value(value);
		Ok(())
	}

	/// Adds one value without invariant checks, silently dropping
	/// duplicates. Used where the source already guarantees validity.
	pub fn append_value(&mut self, description: AttributeDescription, value: Vec<u8>) {
		self.attribute_or_insert(description).push_value(value);
	}

	/// The number of distinct attribute descriptions on the entry, the
	/// objectclass set counting as one when non-empty.
	#[must_use]
	pub fn attribute_count(&self) -> usize {
		self.attributes.len() + usize::from(!self.object_classes.is_empty())
	}

	/// Converts an [`ldap3::SearchEntry`] into this model, so search
	/// results and file-based readers share one vocabulary.
	pub fn from_search(entry: SearchEntry) -> Result<Self, NameError> {
		let mut result = Entry::new(Dn::parse(&entry.dn)?);
		for (name, values) in entry.attrs {
			let description = AttributeDescription::parse(&name);
			if description.name().eq_ignore_ascii_case("objectclass") {
				for value in values {
					result.add_object_class(&value);
				}
			} else {
				for value in values {
					result.append_value(description.clone(), value.into_bytes());
				}
			}
		}
		for (name, values) in entry.bin_attrs {
			let description = AttributeDescription::parse(&name);
			for value in values {
				result.append_value(description.clone(), value);
			}
		}
		Ok(result)
	}
}

impl PartialEq for Entry {
	fn eq(&self, other: &Self) -> bool {
		// Descriptions are unique within an entry and values within an
		// attribute, so length plus containment is a bijection.
		self.dn == other.dn
			&& self.object_classes.len() == other.object_classes.len()
			&& self
				.object_classes
				.iter()
				.all(|(key, _)| other.object_classes.iter().any(|(theirs, _)| theirs == key))
			&& self.attributes.len() == other.attributes.len()
			&& self.attributes.iter().all(|attribute| {
				other.attribute(attribute.description()).is_some_and(|theirs| {
					attribute.values().len() == theirs.values().len()
						&& attribute.values().iter().all(|value| theirs.contains(value))
				})
			})
	}
}

impl Eq for Entry {}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used)]

	use std::collections::HashMap;

	use ldap3::SearchEntry;

	use super::{AttributeDescription, Entry, ValueError};
	use crate::{name::Dn, schema::AttributeType};

	#[test]
	fn duplicate_and_single_value_invariants() {
		let mut entry = Entry::new(Dn::parse("dc=example,dc=com").unwrap());
		let multi = AttributeType::unknown("description");
		let single = AttributeType {
			name: "uidNumber".to_owned(),
			single_value: true,
			operational: false,
			known: true,
		};

		let descr = AttributeDescription::new("description");
		entry.put_value(&multi, descr.clone(), b"one".to_vec()).unwrap();
		entry.put_value(&multi, descr.clone(), b"two".to_vec()).unwrap();
		assert_eq!(
			entry.put_value(&multi, descr, b"one".to_vec()),
			Err(ValueError::Duplicate("description".to_owned()))
		);

		let descr = AttributeDescription::new("uidNumber");
		entry.put_value(&single, descr.clone(), b"1000".to_vec()).unwrap();
		assert_eq!(
			entry.put_value(&single, descr, b"1001".to_vec()),
			Err(ValueError::SingleValue("uidNumber".to_owned()))
		);
	}

	#[test]
	fn options_are_part_of_attribute_identity() {
		let mut entry = Entry::new(Dn::parse("dc=example,dc=com").unwrap());
		let ty = AttributeType::unknown("userCertificate");

		entry
			.put_value(
				&ty,
				AttributeDescription::parse("userCertificate;binary"),
				b"cert".to_vec(),
			)
			.unwrap();
		// Same value under a different option set is not a duplicate.
		entry
			.put_value(&ty, AttributeDescription::new("userCertificate"), b"cert".to_vec())
			.unwrap();
		assert_eq!(entry.attributes().len(), 2);
	}

	#[test]
	fn equality_ignores_attribute_and_value_order() {
		let dn = Dn::parse("uid=1,dc=example,dc=com").unwrap();
		let mut a = Entry::new(dn.clone());
		a.add_object_class("top");
		a.add_object_class("person");
		a.append_value(AttributeDescription::new("cn"), b"Someone".to_vec());
		a.append_value(AttributeDescription::new("mail"), b"one@example.com".to_vec());
		a.append_value(AttributeDescription::new("mail"), b"two@example.com".to_vec());

		let mut b = Entry::new(dn);
		b.add_object_class("person");
		b.add_object_class("top");
		b.append_value(AttributeDescription::new("mail"), b"two@example.com".to_vec());
		b.append_value(AttributeDescription::new("mail"), b"one@example.com".to_vec());
		b.append_value(AttributeDescription::new("cn"), b"Someone".to_vec());

		assert_eq!(a, b);

		b.append_value(AttributeDescription::new("mail"), b"three@example.com".to_vec());
		assert_ne!(a, b);
	}

	#[test]
	fn duplicate_objectclass_is_dropped_not_fatal() {
		let mut entry = Entry::new(Dn::parse("dc=example,dc=com").unwrap());
		assert!(entry.add_object_class("top"));
		assert!(!entry.add_object_class("TOP"));
		assert_eq!(entry.object_classes().collect::<Vec<_>>(), vec!["top"]);
	}

	#[test]
	fn from_search_builds_the_shared_model() {
		let entry = SearchEntry {
			dn: "uid=jdoe,ou=people,dc=example,dc=com".to_owned(),
			attrs: HashMap::from([
				("objectClass".to_owned(), vec!["top".to_owned(), "person".to_owned()]),
				("cn".to_owned(), vec!["John Doe".to_owned()]),
			]),
			bin_attrs: HashMap::from([(
				"jpegPhoto".to_owned(),
				vec![vec![0xff, 0xd8, 0xff]],
			)]),
		};

		let entry = Entry::from_search(entry).unwrap();
		assert_eq!(entry.dn(), &Dn::parse("uid=jdoe,ou=people,dc=example,dc=com").unwrap());
		assert!(entry.has_object_class("person"));
		assert_eq!(
			entry.attribute(&AttributeDescription::new("cn")).unwrap().values(),
			&[b"John Doe".to_vec()]
		);
		assert!(entry.attribute(&AttributeDescription::new("jpegPhoto")).is_some());
	}
}
