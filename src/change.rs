//! Change records: the four directory modification requests expressible
//! in LDIF, and the typed edits inside a modify record.

use crate::{
	entry::{Attribute, Entry},
	name::{Dn, Rdn},
};

/// The kind of one edit inside a modify record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModificationKind {
	/// Append the listed values to the attribute.
	Add,
	/// Remove the listed values, or the whole attribute if none listed.
	Delete,
	/// Replace the attribute's value set with the listed values.
	Replace,
	/// Add the single numeric operand to the attribute's single value.
	Increment,
}

impl ModificationKind {
	/// The LDIF keyword for this kind.
	#[must_use]
	pub fn keyword(self) -> &'static str {
		match self {
			ModificationKind::Add => "add",
			ModificationKind::Delete => "delete",
			ModificationKind::Replace => "replace",
			ModificationKind::Increment => "increment",
		}
	}
}

/// One typed edit to one attribute. The value set may be empty, e.g. a
/// delete of every value of the attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
	/// What to do with the values.
	pub kind: ModificationKind,
	/// The attribute the edit applies to, carrying the edit's values.
	pub attribute: Attribute,
}

/// A single directory modification request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeRecord {
	/// Create the entry with the given attributes.
	Add(Entry),
	/// Remove the entry with the given name.
	Delete(Dn),
	/// Apply a sequence of edits to the entry. The order of the edits is
	/// significant and preserved exactly as read or diffed.
	Modify {
		/// The entry being modified.
		dn: Dn,
		/// The edits in order.
		modifications: Vec<Modification>,
	},
	/// Rename the entry and optionally move it under a new superior.
	ModifyDn {
		/// The entry being renamed.
		dn: Dn,
		/// The new leaf RDN.
		new_rdn: Rdn,
		/// Whether the old RDN's values are removed from the entry.
		delete_old_rdn: bool,
		/// The new parent, when the entry also relocates.
		new_superior: Option<Dn>,
	},
}

impl ChangeRecord {
	/// The name of the entry the record applies to.
	#[must_use]
	pub fn dn(&self) -> &Dn {
		match self {
			ChangeRecord::Add(entry) => entry.dn(),
			ChangeRecord::Delete(dn)
			| ChangeRecord::Modify { dn, .. }
			| ChangeRecord::ModifyDn { dn, .. } => dn,
		}
	}
}
