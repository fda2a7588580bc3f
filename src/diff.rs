//! Computes the change records that turn one set of entries into
//! another.
//!
//! Both sides are keyed and ordered by normalized DN, then walked with a
//! merge join: names only in the source become deletes, names only in
//! the target become adds, names in both become a modify whose edits are
//! the value-level difference. An identical pair still yields a modify
//! with no edits, so callers can tell "compared equal" from "never
//! compared".

use crate::{
	change::{ChangeRecord, Modification, ModificationKind},
	config::DiffOptions,
	entry::{Attribute, AttributeDescription, Entry},
	error::Error,
};

/// Diffs two streams of decoded entries, for example two readers. The
/// first decoding failure on either side aborts the diff.
pub fn diff<I, J>(
	source: I,
	target: J,
	options: &DiffOptions,
) -> Result<Vec<ChangeRecord>, Error>
where
	I: IntoIterator<Item = Result<Entry, Error>>,
	J: IntoIterator<Item = Result<Entry, Error>>,
{
	let source: Vec<Entry> = source.into_iter().collect::<Result<_, _>>()?;
	let target: Vec<Entry> = target.into_iter().collect::<Result<_, _>>()?;
	Ok(diff_entries(&source, &target, options))
}

/// Diffs two sets of entries. Input order does not matter; the output is
/// ordered by normalized DN.
#[must_use]
pub fn diff_entries(
	source: &[Entry],
	target: &[Entry],
	options: &DiffOptions,
) -> Vec<ChangeRecord> {
	let mut source: Vec<&Entry> = source.iter().collect();
	let mut target: Vec<&Entry> = target.iter().collect();
	source.sort_by(|a, b| a.dn().cmp(b.dn()));
	target.sort_by(|a, b| a.dn().cmp(b.dn()));

	let mut records = Vec::new();
	let (mut i, mut j) = (0, 0);
	while i < source.len() && j < target.len() {
		match source[i].dn().cmp(target[j].dn()) {
			std::cmp::Ordering::Less => {
				records.push(ChangeRecord::Delete(source[i].dn().clone()));
				i += 1;
			}
			std::cmp::Ordering::Greater => {
				records.push(add_record(target[j], options));
				j += 1;
			}
			std::cmp::Ordering::Equal => {
				records.push(ChangeRecord::Modify {
					dn: target[j].dn().clone(),
					modifications: entry_modifications(source[i], target[j], options),
				});
				i += 1;
				j += 1;
			}
		}
	}
	for entry in &source[i..] {
		records.push(ChangeRecord::Delete(entry.dn().clone()));
	}
	for entry in &target[j..] {
		records.push(add_record(entry, options));
	}
	records
}

/// An add record for a target-only entry, minus the ignored attributes.
fn add_record(entry: &Entry, options: &DiffOptions) -> ChangeRecord {
	let mut entry = entry.clone();
	entry.retain_attributes(|attribute| !options.ignores(attribute.description().name()));
	ChangeRecord::Add(entry)
}

/// The edits turning `source` into `target`: every value addition first,
/// in the target's attribute order, then every value removal in the
/// source's attribute order. One edit covers all affected values of one
/// attribute.
fn entry_modifications(
	source: &Entry,
	target: &Entry,
	options: &DiffOptions,
) -> Vec<Modification> {
	let mut modifications = Vec::new();

	let added_classes: Vec<Vec<u8>> = target
		.object_classes()
		.filter(|class| !source.has_object_class(class))
		.map(|class| class.as_bytes().to_vec())
		.collect();
	if !added_classes.is_empty() {
		modifications.push(Modification {
			kind: ModificationKind::Add,
			attribute: Attribute::with_values(
				AttributeDescription::new("objectClass"),
				added_classes,
			),
		});
	}

	for attribute in target.attributes() {
		if options.ignores(attribute.description().name()) {
			continue;
		}
		let missing: Vec<Vec<u8>> = match source.attribute(attribute.description()) {
			Some(existing) => attribute
				.values()
				.iter()
				.filter(|value| !existing.contains(value))
				.cloned()
				.collect(),
			None => attribute.values().to_vec(),
		};
		if !missing.is_empty() {
			modifications.push(Modification {
				kind: ModificationKind::Add,
				attribute: Attribute::with_values(attribute.description().clone(), missing),
			});
		}
	}

	let removed_classes: Vec<Vec<u8>> = source
		.object_classes()
		.filter(|class| !target.has_object_class(class))
		.map(|class| class.as_bytes().to_vec())
		.collect();
	if !removed_classes.is_empty() {
		modifications.push(Modification {
			kind: ModificationKind::Delete,
			attribute: Attribute::with_values(
				AttributeDescription::new("objectClass"),
				removed_classes,
			),
		});
	}

	for attribute in source.attributes() {
		if options.ignores(attribute.description().name()) {
			continue;
		}
		let gone: Vec<Vec<u8>> = match target.attribute(attribute.description()) {
			Some(remaining) => attribute
				.values()
				.iter()
				.filter(|value| !remaining.contains(value))
				.cloned()
				.collect(),
			None => attribute.values().to_vec(),
		};
		if !gone.is_empty() {
			modifications.push(Modification {
				kind: ModificationKind::Delete,
				attribute: Attribute::with_values(attribute.description().clone(), gone),
			});
		}
	}

	modifications
}
