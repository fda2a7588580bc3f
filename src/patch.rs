//! Replays change records against an in-memory set of entries.
//!
//! The base set is keyed by normalized DN. Records apply in order and
//! the first failure aborts the replay; the returned set keeps the base
//! order with added entries appended. `patch(source, diff(source,
//! target))` reproduces `target` up to ordering.

use std::collections::HashMap;

use crate::{
	change::{ChangeRecord, Modification, ModificationKind},
	entry::{AttributeDescription, Entry},
	name::Dn,
};

/// Errors raised while replaying change records.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
	/// An add named an entry that already exists.
	#[error("cannot add entry {0}: it already exists")]
	EntryExists(String),
	/// A delete, modify or rename named an entry that does not exist.
	#[error("cannot {operation} entry {dn}: no such entry")]
	NoSuchEntry {
		/// The missing entry's name.
		dn: String,
		/// The operation that failed.
		operation: &'static str,
	},
	/// An increment targeted an attribute without exactly one numeric
	/// value.
	#[error("cannot increment {attribute} of {dn}: the attribute needs exactly one numeric value")]
	IncrementTarget {
		/// The entry being modified.
		dn: String,
		/// The attribute being incremented.
		attribute: String,
	},
	/// An increment carried an operand that is not one number.
	#[error("cannot increment {attribute} of {dn}: the operand must be one number")]
	IncrementOperand {
		/// The entry being modified.
		dn: String,
		/// The attribute being incremented.
		attribute: String,
	},
}

/// Replays the change records against the base set.
pub fn patch_entries(
	base: Vec<Entry>,
	changes: Vec<ChangeRecord>,
) -> Result<Vec<Entry>, PatchError> {
	// Deleted slots stay in place so later indices remain valid.
	let mut entries: Vec<Option<Entry>> = base.into_iter().map(Some).collect();
	let mut index: HashMap<String, usize> = entries
		.iter()
		.enumerate()
		.filter_map(|(position, slot)| {
			slot.as_ref().map(|entry| (entry.dn().normalized().to_owned(), position))
		})
		.collect();

	for change in changes {
		match change {
			ChangeRecord::Add(entry) => {
				let key = entry.dn().normalized().to_owned();
				if index.contains_key(&key) {
					return Err(PatchError::EntryExists(entry.dn().to_string()));
				}
				entries.push(Some(entry));
				index.insert(key, entries.len() - 1);
			}
			ChangeRecord::Delete(dn) => {
				let position = lookup(&index, &dn, "delete")?;
				entries[position] = None;
				index.remove(dn.normalized());
			}
			ChangeRecord::Modify { dn, modifications } => {
				let position = lookup(&index, &dn, "modify")?;
				let Some(entry) = entries[position].as_mut() else {
					return Err(PatchError::NoSuchEntry {
						dn: dn.to_string(),
						operation: "modify",
					});
				};
				for modification in modifications {
					apply_modification(entry, modification)?;
				}
			}
			ChangeRecord::ModifyDn { dn, new_rdn, delete_old_rdn, new_superior } => {
				let position = lookup(&index, &dn, "rename")?;
				let Some(entry) = entries[position].as_mut() else {
					return Err(PatchError::NoSuchEntry {
						dn: dn.to_string(),
						operation: "rename",
					});
				};
				let new_dn = entry.dn().rename(&new_rdn, new_superior.as_ref());
				// A rename onto another live entry is a collision; renaming
				// onto itself (a case change, say) is fine.
				if new_dn.normalized() != dn.normalized()
					&& index.contains_key(new_dn.normalized())
				{
					return Err(PatchError::EntryExists(new_dn.to_string()));
				}

				if delete_old_rdn {
					let old_avas =
						entry.dn().rdn().map(|rdn| rdn.avas().to_vec()).unwrap_or_default();
					for ava in old_avas {
						let description = AttributeDescription::new(&ava.attribute);
						if let Some(attribute) = entry.attribute_mut(&description) {
							attribute.remove_value(ava.value.as_bytes());
							if attribute.is_empty() {
								entry.remove_attribute(&description);
							}
						}
					}
				}
				for ava in new_rdn.avas() {
					entry.append_value(
						AttributeDescription::new(&ava.attribute),
						ava.value.clone().into_bytes(),
					);
				}

				index.remove(dn.normalized());
				index.insert(new_dn.normalized().to_owned(), position);
				entry.set_dn(new_dn);
			}
		}
	}

	Ok(entries.into_iter().flatten().collect())
}

/// Resolves a DN to its slot, or the no-such-entry error.
fn lookup(
	index: &HashMap<String, usize>,
	dn: &Dn,
	operation: &'static str,
) -> Result<usize, PatchError> {
	index.get(dn.normalized()).copied().ok_or_else(|| PatchError::NoSuchEntry {
		dn: dn.to_string(),
		operation,
	})
}

/// Applies one edit to one entry. Edits naming `objectClass` operate on
/// the entry's objectclass set.
fn apply_modification(
	entry: &mut Entry,
	modification: Modification,
) -> Result<(), PatchError> {
	let Modification { kind, attribute } = modification;
	let description = attribute.description().clone();
	let is_object_class = description.name().eq_ignore_ascii_case("objectclass");

	match kind {
		ModificationKind::Add => {
			if is_object_class {
				for value in attribute.values() {
					entry.add_object_class(&String::from_utf8_lossy(value));
				}
			} else {
				for value in attribute.values() {
					entry.append_value(description.clone(), value.clone());
				}
			}
		}
		ModificationKind::Delete => {
			if is_object_class {
				if attribute.is_empty() {
					entry.clear_object_classes();
				} else {
					for value in attribute.values() {
						entry.remove_object_class(&String::from_utf8_lossy(value));
					}
				}
			} else if attribute.is_empty() {
				entry.remove_attribute(&description);
			} else if let Some(existing) = entry.attribute_mut(&description) {
				for value in attribute.values() {
					existing.remove_value(value);
				}
				// Removing the last value removes the attribute.
				if existing.is_empty() {
					entry.remove_attribute(&description);
				}
			}
		}
		ModificationKind::Replace => {
			if is_object_class {
				entry.clear_object_classes();
				for value in attribute.values() {
					entry.add_object_class(&String::from_utf8_lossy(value));
				}
			} else {
				entry.remove_attribute(&description);
				for value in attribute.values() {
					entry.append_value(description.clone(), value.clone());
				}
			}
		}
		ModificationKind::Increment => {
			let dn = entry.dn().to_string();
			let operand = single_number(attribute.values()).ok_or_else(|| {
				PatchError::IncrementOperand {
					dn: dn.clone(),
					attribute: description.to_wire(),
				}
			})?;
			let target_error = PatchError::IncrementTarget {
				dn,
				attribute: description.to_wire(),
			};
			let Some(existing) = entry.attribute_mut(&description) else {
				return Err(target_error);
			};
			let Some(current) = single_number(existing.values()) else {
				return Err(target_error);
			};
			existing.replace_values(vec![(current + operand).to_string().into_bytes()]);
		}
	}
	Ok(())
}

/// The single numeric value of a value set, when it has exactly one
/// value and that value parses as an integer.
fn single_number(values: &[Vec<u8>]) -> Option<i64> {
	let [value] = values else {
		return None;
	};
	std::str::from_utf8(value).ok()?.trim().parse().ok()
}
