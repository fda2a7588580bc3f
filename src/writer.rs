//! Serializer for entries and change records.
//!
//! [`LdifWriter`] emits text that [`crate::reader::LdifReader`] decodes
//! back to an equal value: base64 encoding is chosen exactly when a value
//! cannot survive the plain form, and folding splits on character
//! boundaries so multi-byte text never tears.

use std::io::{self, Write};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::{
	change::{ChangeRecord, Modification},
	config::WriteOptions,
	entry::Entry,
};

/// A serializing session over one output stream.
#[derive(Debug)]
pub struct LdifWriter<W: Write> {
	/// The underlying output.
	out: W,
	/// Immutable session options.
	options: WriteOptions,
	/// Whether the version header decision has been made.
	started: bool,
}

impl<W: Write> LdifWriter<W> {
	/// Creates a writer over the given output.
	pub fn new(out: W, options: WriteOptions) -> Self {
		LdifWriter { out, options, started: false }
	}

	/// Serializes one entry followed by a blank separator line. The DN
	/// comes first, then the objectclasses, then the attributes with
	/// their values, everything in the entry's own order.
	pub fn write_entry(&mut self, entry: &Entry) -> io::Result<()> {
		self.start()?;
		self.value_line("dn", entry.dn().to_string().as_bytes())?;
		for class in entry.object_classes() {
			self.value_line("objectClass", class.as_bytes())?;
		}
		for attribute in entry.attributes() {
			let name = attribute.description().to_wire();
			for value in attribute.values() {
				self.value_line(&name, value)?;
			}
		}
		writeln!(self.out)
	}

	/// Serializes one change record followed by a blank separator line.
	pub fn write_change_record(&mut self, record: &ChangeRecord) -> io::Result<()> {
		self.start()?;
		match record {
			ChangeRecord::Add(entry) => {
				self.value_line("dn", entry.dn().to_string().as_bytes())?;
				self.fold_line("changetype: add")?;
				for class in entry.object_classes() {
					self.value_line("objectClass", class.as_bytes())?;
				}
				for attribute in entry.attributes() {
					let name = attribute.description().to_wire();
					for value in attribute.values() {
						self.value_line(&name, value)?;
					}
				}
			}
			ChangeRecord::Delete(dn) => {
				self.value_line("dn", dn.to_string().as_bytes())?;
				self.fold_line("changetype: delete")?;
			}
			ChangeRecord::Modify { dn, modifications } => {
				self.value_line("dn", dn.to_string().as_bytes())?;
				self.fold_line("changetype: modify")?;
				for (index, modification) in modifications.iter().enumerate() {
					self.write_modification(modification)?;
					if index + 1 < modifications.len() {
						self.fold_line("-")?;
					}
				}
			}
			ChangeRecord::ModifyDn { dn, new_rdn, delete_old_rdn, new_superior } => {
				self.value_line("dn", dn.to_string().as_bytes())?;
				// modrdn and moddn decode identically; the longer keyword
				// signals that the entry relocates.
				if new_superior.is_some() {
					self.fold_line("changetype: moddn")?;
				} else {
					self.fold_line("changetype: modrdn")?;
				}
				self.value_line("newrdn", new_rdn.to_string().as_bytes())?;
				let flag = if *delete_old_rdn { b"1".as_slice() } else { b"0".as_slice() };
				self.value_line("deleteoldrdn", flag)?;
				if let Some(superior) = new_superior {
					self.value_line("newsuperior", superior.to_string().as_bytes())?;
				}
			}
		}
		writeln!(self.out)
	}

	/// Flushes the underlying output.
	pub fn flush(&mut self) -> io::Result<()> {
		self.out.flush()
	}

	/// Unwraps the underlying output.
	pub fn into_inner(self) -> W {
		self.out
	}

	/// Emits the version header before the first record when requested.
	fn start(&mut self) -> io::Result<()> {
		if !self.started {
			self.started = true;
			if self.options.version_header {
				self.fold_line("version: 1")?;
			}
		}
		Ok(())
	}

	/// Emits one modification: the mod-type line naming the attribute,
	/// then one line per value.
	fn write_modification(&mut self, modification: &Modification) -> io::Result<()> {
		let name = modification.attribute.description().to_wire();
		self.value_line(modification.kind.keyword(), name.as_bytes())?;
		for value in modification.attribute.values() {
			self.value_line(&name, value)?;
		}
		Ok(())
	}

	/// Emits one `name: value` line, picking the base64 form when the
	/// plain form would not decode back to the same bytes.
	fn value_line(&mut self, name: &str, value: &[u8]) -> io::Result<()> {
		let line = if value.is_empty() {
			format!("{name}: ")
		} else if needs_base64(value) {
			format!("{name}:: {}", BASE64.encode(value))
		} else {
			// needs_base64 verified the bytes are valid UTF-8.
			format!("{name}: {}", String::from_utf8_lossy(value))
		};
		self.fold_line(&line)
	}

	/// Emits one logical line, folded at the configured column. The first
	/// segment fills the whole width; every continuation carries the
	/// leading space and one character less. Splits are on character
	/// boundaries.
	fn fold_line(&mut self, line: &str) -> io::Result<()> {
		let wrap = self.options.wrap_column;
		if wrap < 2 || line.chars().count() <= wrap {
			return writeln!(self.out, "{line}");
		}
		let chars: Vec<char> = line.chars().collect();
		let first: String = chars[..wrap].iter().collect();
		writeln!(self.out, "{first}")?;
		let mut position = wrap;
		while position < chars.len() {
			let end = (position + wrap - 1).min(chars.len());
			let segment: String = chars[position..end].iter().collect();
			writeln!(self.out, " {segment}")?;
			position = end;
		}
		Ok(())
	}
}

/// Whether a value must be base64-encoded to survive the plain form:
/// an unsafe first character (space, colon, less-than), a trailing
/// space, a control or delete byte, or bytes that are not UTF-8.
fn needs_base64(value: &[u8]) -> bool {
	match value.first() {
		Some(b' ' | b':' | b'<') => return true,
		Some(_) => {}
		None => return false,
	}
	if value.last() == Some(&b' ') {
		return true;
	}
	if value.iter().any(|&b| b < 0x20 || b == 0x7f) {
		return true;
	}
	std::str::from_utf8(value).is_err()
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used)]

	use super::{needs_base64, LdifWriter};
	use crate::{
		change::{ChangeRecord, Modification, ModificationKind},
		config::{ReadOptions, WriteOptions},
		entry::{Attribute, AttributeDescription, Entry},
		name::{Dn, Rdn},
		reader::LdifReader,
		schema::AttributeRegistry,
	};

	/// Serializes with the given options and returns the text.
	fn render(options: WriteOptions, write: impl FnOnce(&mut LdifWriter<Vec<u8>>)) -> String {
		let mut writer = LdifWriter::new(Vec::new(), options);
		write(&mut writer);
		String::from_utf8(writer.into_inner()).unwrap()
	}

	/// A small entry used across the tests.
	fn sample_entry() -> Entry {
		let mut entry = Entry::new(Dn::parse("uid=jdoe,dc=example,dc=com").unwrap());
		entry.add_object_class("top");
		entry.add_object_class("person");
		entry.append_value(AttributeDescription::new("uid"), b"jdoe".to_vec());
		entry.append_value(AttributeDescription::new("cn"), b"John Doe".to_vec());
		entry
	}

	#[test]
	fn base64_selection_rules() {
		assert!(!needs_base64(b""));
		assert!(!needs_base64(b"plain value"));
		assert!(!needs_base64("Ergänzung".as_bytes()));
		assert!(needs_base64(b" leading space"));
		assert!(needs_base64(b":colon"));
		assert!(needs_base64(b"<less-than"));
		assert!(needs_base64(b"trailing "));
		assert!(needs_base64(b"line\nbreak"));
		assert!(needs_base64(&[0xff, 0xfe]));
	}

	#[test]
	fn entry_layout_and_order() {
		let output = render(WriteOptions::default(), |writer| {
			writer.write_entry(&sample_entry()).unwrap();
		});
		assert_eq!(
			output,
			"dn: uid=jdoe,dc=example,dc=com\n\
			 objectClass: top\n\
			 objectClass: person\n\
			 uid: jdoe\n\
			 cn: John Doe\n\n"
		);
	}

	#[test]
	fn version_header_once() {
		let options = WriteOptions { version_header: true, ..WriteOptions::default() };
		let output = render(options, |writer| {
			writer.write_entry(&sample_entry()).unwrap();
			writer.write_entry(&sample_entry()).unwrap();
		});
		assert!(output.starts_with("version: 1\ndn: "));
		assert_eq!(output.matches("version: 1").count(), 1);
	}

	#[test]
	fn folding_respects_the_wrap_column() {
		let options = WriteOptions { wrap_column: 10, ..WriteOptions::default() };
		let mut entry = Entry::new(Dn::root());
		entry.append_value(
			AttributeDescription::new("description"),
			b"abcdefghijklmnopqrstuvwxyz".to_vec(),
		);
		let output = render(options, |writer| {
			writer.write_entry(&entry).unwrap();
		});

		for line in output.lines() {
			assert!(line.chars().count() <= 10, "line too long: {line:?}");
		}
		// Logical reassembly drops the leading space of each continuation.
		let folded: String = output
			.lines()
			.take_while(|line| !line.is_empty())
			.skip(1)
			.map(|line| line.strip_prefix(' ').unwrap_or(line))
			.collect();
		assert_eq!(folded, "description: abcdefghijklmnopqrstuvwxyz");
	}

	#[test]
	fn folding_never_tears_multibyte_text() {
		let options = WriteOptions { wrap_column: 5, ..WriteOptions::default() };
		let mut entry = Entry::new(Dn::root());
		entry.append_value(AttributeDescription::new("cn"), "äöüßäöüß".as_bytes().to_vec());
		// Rendering panics on a torn boundary, so finishing is the assertion.
		let output = render(options, |writer| {
			writer.write_entry(&entry).unwrap();
		});
		assert!(!output.is_empty());
	}

	#[test]
	fn round_trips_through_the_reader() {
		let mut source = sample_entry();
		source.append_value(
			AttributeDescription::new("description"),
			b"value that is long enough to be folded across several physical lines by the writer"
				.to_vec(),
		);
		source.append_value(AttributeDescription::new("seeAlso"), Vec::new());
		source.append_value(AttributeDescription::new("note"), b": tricky".to_vec());

		let text = render(WriteOptions::default(), |writer| {
			writer.write_entry(&source).unwrap();
		});
		let mut reader = LdifReader::new(
			text.as_bytes(),
			AttributeRegistry::new(),
			ReadOptions::default(),
		);
		let decoded = reader.read_entry().unwrap().unwrap();
		assert_eq!(decoded, source);
	}

	#[test]
	fn modify_record_grammar() {
		let record = ChangeRecord::Modify {
			dn: Dn::parse("dc=example,dc=com").unwrap(),
			modifications: vec![
				Modification {
					kind: ModificationKind::Add,
					attribute: Attribute::with_values(
						AttributeDescription::new("description"),
						vec![b"new".to_vec()],
					),
				},
				Modification {
					kind: ModificationKind::Delete,
					attribute: Attribute::new(AttributeDescription::new("seeAlso")),
				},
			],
		};
		let output = render(WriteOptions::default(), |writer| {
			writer.write_change_record(&record).unwrap();
		});
		assert_eq!(
			output,
			"dn: dc=example,dc=com\n\
			 changetype: modify\n\
			 add: description\n\
			 description: new\n\
			 -\n\
			 delete: seeAlso\n\n"
		);
	}

	#[test]
	fn modify_dn_uses_moddn_only_when_relocating() {
		let rename = ChangeRecord::ModifyDn {
			dn: Dn::parse("uid=old,dc=example,dc=com").unwrap(),
			new_rdn: Rdn::parse("uid=new").unwrap(),
			delete_old_rdn: true,
			new_superior: None,
		};
		let output = render(WriteOptions::default(), |writer| {
			writer.write_change_record(&rename).unwrap();
		});
		assert_eq!(
			output,
			"dn: uid=old,dc=example,dc=com\n\
			 changetype: modrdn\n\
			 newrdn: uid=new\n\
			 deleteoldrdn: 1\n\n"
		);

		let relocate = ChangeRecord::ModifyDn {
			dn: Dn::parse("uid=old,dc=example,dc=com").unwrap(),
			new_rdn: Rdn::parse("uid=new").unwrap(),
			delete_old_rdn: false,
			new_superior: Some(Dn::parse("ou=staff,dc=example,dc=com").unwrap()),
		};
		let output = render(WriteOptions::default(), |writer| {
			writer.write_change_record(&relocate).unwrap();
		});
		assert_eq!(
			output,
			"dn: uid=old,dc=example,dc=com\n\
			 changetype: moddn\n\
			 newrdn: uid=new\n\
			 deleteoldrdn: 0\n\
			 newsuperior: ou=staff,dc=example,dc=com\n\n"
		);
	}

	#[test]
	fn change_record_round_trip() {
		let records = vec![
			ChangeRecord::Add(sample_entry()),
			ChangeRecord::Delete(Dn::parse("dc=gone,dc=com").unwrap()),
			ChangeRecord::Modify {
				dn: Dn::parse("dc=example,dc=com").unwrap(),
				modifications: vec![Modification {
					kind: ModificationKind::Replace,
					attribute: Attribute::with_values(
						AttributeDescription::new("description"),
						vec![b"one".to_vec(), b"two".to_vec()],
					),
				}],
			},
		];
		let text = render(WriteOptions::default(), |writer| {
			for record in &records {
				writer.write_change_record(record).unwrap();
			}
		});

		let mut reader = LdifReader::new(
			text.as_bytes(),
			AttributeRegistry::new(),
			ReadOptions::default(),
		);
		let mut decoded = Vec::new();
		while let Some(record) = reader.read_change_record().unwrap() {
			decoded.push(record);
		}
		assert_eq!(decoded, records);
	}
}
