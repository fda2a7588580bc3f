//! Distinguished names and their naming components.
//!
//! The engines in this crate treat a DN as an opaque comparable key; the
//! small object model here covers exactly what they consume: decoding a
//! string into components, normalized comparison so the plain and
//! base64-encoded spellings of one name compare equal, and the rename
//! arithmetic needed for `modrdn`/`moddn` handling.

use std::{
	cmp::Ordering,
	fmt,
	hash::{Hash, Hasher},
};

/// Errors raised while decoding a distinguished name or one of its
/// components.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
	/// A name contained an empty component, e.g. `dc=a,,dc=b`.
	#[error("empty name component")]
	EmptyComponent,
	/// A component lacked the `attribute=value` separator.
	#[error("name component {0:?} has no '=' separator")]
	MissingSeparator(String),
	/// A component had an empty attribute name, e.g. `=foo`.
	#[error("empty attribute name in component {0:?}")]
	EmptyAttribute(String),
}

/// One attribute-value assertion inside an RDN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ava {
	/// The attribute name as written.
	pub attribute: String,
	/// The asserted value as written.
	pub value: String,
}

/// One naming component of a DN: one or more `attribute=value` pairs
/// joined by `+`.
#[derive(Debug, Clone)]
pub struct Rdn {
	/// The assertions in written order.
	avas: Vec<Ava>,
	/// Lowercased, order-normalized form used for comparison.
	normalized: String,
}

impl Rdn {
	/// Decodes a single RDN such as `uid=jdoe` or `cn=a+sn=b`.
	pub fn parse(component: &str) -> Result<Self, NameError> {
		let component = component.trim();
		if component.is_empty() {
			return Err(NameError::EmptyComponent);
		}
		let mut avas = Vec::new();
		for part in split_unescaped(component, '+') {
			let part = part.trim();
			if part.is_empty() {
				return Err(NameError::EmptyComponent);
			}
			let eq = find_unescaped(part, '=')
				.ok_or_else(|| NameError::MissingSeparator(part.to_owned()))?;
			let attribute = part[..eq].trim();
			let value = part[eq + 1..].trim();
			if attribute.is_empty() {
				return Err(NameError::EmptyAttribute(part.to_owned()));
			}
			avas.push(Ava { attribute: attribute.to_owned(), value: value.to_owned() });
		}
		Ok(Self::from_avas(avas))
	}

	/// Builds an RDN from already-decoded assertions.
	fn from_avas(avas: Vec<Ava>) -> Self {
		let mut keys: Vec<String> = avas
			.iter()
			.map(|ava| format!("{}={}", ava.attribute.to_lowercase(), ava.value.to_lowercase()))
			.collect();
		keys.sort();
		Rdn { avas, normalized: keys.join("+") }
	}

	/// The attribute-value assertions of this RDN in written order.
	#[must_use]
	pub fn avas(&self) -> &[Ava] {
		&self.avas
	}

	/// The normalized comparison form of this RDN.
	#[must_use]
	pub fn normalized(&self) -> &str {
		&self.normalized
	}
}

impl fmt::Display for Rdn {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut first = true;
		for ava in &self.avas {
			if !first {
				f.write_str("+")?;
			}
			write!(f, "{}={}", ava.attribute, ava.value)?;
			first = false;
		}
		Ok(())
	}
}

impl PartialEq for Rdn {
	fn eq(&self, other: &Self) -> bool {
		self.normalized == other.normalized
	}
}

impl Eq for Rdn {}

/// A distinguished name: an ordered sequence of RDNs, most specific
/// first. Comparison, ordering and hashing all use the normalized form.
#[derive(Debug, Clone)]
pub struct Dn {
	/// Naming components, leaf first.
	rdns: Vec<Rdn>,
	/// Lowercased canonical form used as the comparison key.
	normalized: String,
}

impl Dn {
	/// Decodes a DN from its string form. The empty string decodes to the
	/// root DN.
	pub fn parse(name: &str) -> Result<Self, NameError> {
		let name = name.trim();
		if name.is_empty() {
			return Ok(Self::root());
		}
		let rdns = split_unescaped(name, ',')
			.iter()
			.map(|component| Rdn::parse(component))
			.collect::<Result<Vec<_>, _>>()?;
		Ok(Self::from_rdns(rdns))
	}

	/// The root (zero-component) DN.
	#[must_use]
	pub fn root() -> Self {
		Dn { rdns: Vec::new(), normalized: String::new() }
	}

	/// Builds a DN from already-decoded components, leaf first.
	#[must_use]
	pub fn from_rdns(rdns: Vec<Rdn>) -> Self {
		let normalized =
			rdns.iter().map(Rdn::normalized).collect::<Vec<_>>().join(",");
		Dn { rdns, normalized }
	}

	/// Whether this is the root DN.
	#[must_use]
	pub fn is_root(&self) -> bool {
		self.rdns.is_empty()
	}

	/// The naming components of this DN, leaf first.
	#[must_use]
	pub fn rdns(&self) -> &[Rdn] {
		&self.rdns
	}

	/// The leaf RDN, if this is not the root DN.
	#[must_use]
	pub fn rdn(&self) -> Option<&Rdn> {
		self.rdns.first()
	}

	/// The parent of this DN, or `None` for the root DN.
	#[must_use]
	pub fn parent(&self) -> Option<Dn> {
		if self.rdns.is_empty() {
			return None;
		}
		Some(Self::from_rdns(self.rdns[1..].to_vec()))
	}

	/// The normalized comparison key for this DN.
	#[must_use]
	pub fn normalized(&self) -> &str {
		&self.normalized
	}

	/// Applies a rename: the leaf RDN is replaced with `new_rdn` and,
	/// when a new superior is given, the remainder of the name is
	/// replaced with it.
	#[must_use]
	pub fn rename(&self, new_rdn: &Rdn, new_superior: Option<&Dn>) -> Dn {
		let mut rdns = vec![new_rdn.clone()];
		match new_superior {
			Some(superior) => rdns.extend(superior.rdns.iter().cloned()),
			None => {
				if !self.rdns.is_empty() {
					rdns.extend(self.rdns[1..].iter().cloned());
				}
			}
		}
		Self::from_rdns(rdns)
	}
}

impl fmt::Display for Dn {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut first = true;
		for rdn in &self.rdns {
			if !first {
				f.write_str(",")?;
			}
			write!(f, "{rdn}")?;
			first = false;
		}
		Ok(())
	}
}

impl PartialEq for Dn {
	fn eq(&self, other: &Self) -> bool {
		self.normalized == other.normalized
	}
}

impl Eq for Dn {}

impl PartialOrd for Dn {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Dn {
	fn cmp(&self, other: &Self) -> Ordering {
		self.normalized.cmp(&other.normalized)
	}
}

impl Hash for Dn {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.normalized.hash(state);
	}
}

/// Splits `input` on every `separator` not preceded by a backslash.
fn split_unescaped(input: &str, separator: char) -> Vec<String> {
	let mut parts = Vec::new();
	let mut current = String::new();
	let mut escaped = false;
	for c in input.chars() {
		if escaped {
			current.push(c);
			escaped = false;
		} else if c == '\\' {
			current.push(c);
			escaped = true;
		} else if c == separator {
			parts.push(std::mem::take(&mut current));
		} else {
			current.push(c);
		}
	}
	parts.push(current);
	parts
}

/// Position of the first `separator` not preceded by a backslash.
fn find_unescaped(input: &str, separator: char) -> Option<usize> {
	let mut escaped = false;
	for (idx, c) in input.char_indices() {
		if escaped {
			escaped = false;
		} else if c == '\\' {
			escaped = true;
		} else if c == separator {
			return Some(idx);
		}
	}
	None
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used)]

	use super::{Dn, NameError, Rdn};

	#[test]
	fn equal_regardless_of_case_and_spacing() {
		let a = Dn::parse("uid=1,ou=People, dc=Example,dc=COM").unwrap();
		let b = Dn::parse("UID=1,OU=people,DC=example,DC=com").unwrap();
		assert_eq!(a, b);
		assert_eq!(a.normalized(), "uid=1,ou=people,dc=example,dc=com");
	}

	#[test]
	fn malformed_components_fail() {
		assert_eq!(Dn::parse("dc=a,,dc=b"), Err(NameError::EmptyComponent));
		assert!(matches!(Dn::parse("dc=a,nodn"), Err(NameError::MissingSeparator(_))));
		assert!(matches!(Dn::parse("=x,dc=b"), Err(NameError::EmptyAttribute(_))));
	}

	#[test]
	fn root_dn_round_trip() {
		let root = Dn::parse("").unwrap();
		assert!(root.is_root());
		assert_eq!(root.to_string(), "");
		assert!(root.parent().is_none());
	}

	#[test]
	fn rename_replaces_leaf_and_superior() {
		let dn = Dn::parse("uid=old,ou=people,dc=example,dc=com").unwrap();
		let rdn = Rdn::parse("uid=new").unwrap();

		let renamed = dn.rename(&rdn, None);
		assert_eq!(renamed, Dn::parse("uid=new,ou=people,dc=example,dc=com").unwrap());

		let superior = Dn::parse("ou=gone,dc=example,dc=com").unwrap();
		let moved = dn.rename(&rdn, Some(&superior));
		assert_eq!(moved, Dn::parse("uid=new,ou=gone,dc=example,dc=com").unwrap());
	}

	#[test]
	fn multivalued_rdn_order_insensitive() {
		let a = Rdn::parse("cn=a+sn=b").unwrap();
		let b = Rdn::parse("SN=B+CN=A").unwrap();
		assert_eq!(a, b);
	}
}
