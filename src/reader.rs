//! Streaming reader for LDIF entries and change records.
//!
//! [`LdifReader`] wraps any buffered source and decodes it record by
//! record. Structural problems are reported through the configured
//! [`RejectSink`] and surface as [`Error::Parse`] values whose severity
//! tells the caller whether the stream can resume: record-level errors
//! leave the cursor at the next record, fatal ones (a continuation line
//! with no predecessor, an unknown changetype, I/O failures) end the
//! session.
//!
//! The reader owns the counters of a decoding session: how many records
//! were read, how many were ignored because a filter excluded them and
//! how many were rejected as invalid.

use std::{collections::VecDeque, fs, io::BufRead};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tracing::{debug, warn};
use url::Url;

use crate::{
	change::{ChangeRecord, Modification, ModificationKind},
	config::ReadOptions,
	entry::{Attribute, AttributeDescription, Entry},
	error::Error,
	name::{Dn, Rdn},
	reject::RejectSink,
	schema::{Schema, SchemaPolicy},
};

/// Caller-supplied predicate over DNs.
type DnFilter = Box<dyn FnMut(&Dn) -> bool>;
/// Caller-supplied predicate over fully-built entries.
type EntryFilter = Box<dyn FnMut(&Entry) -> bool>;
/// Caller-supplied predicate over attribute descriptions.
type AttributeFilter = Box<dyn FnMut(&AttributeDescription) -> bool>;

/// A decoding session over one LDIF source.
pub struct LdifReader<R: BufRead, S: Schema> {
	/// The underlying line source.
	source: R,
	/// Schema services for type lookup and validation.
	schema: S,
	/// Immutable session options.
	options: ReadOptions,
	/// Where rejected and skipped records are reported.
	reject: Option<Box<dyn RejectSink>>,
	/// Entries whose DN fails this predicate are counted as ignored.
	dn_filter: Option<DnFilter>,
	/// Entries failing this predicate after assembly are ignored.
	entry_filter: Option<EntryFilter>,
	/// Attributes failing this predicate are dropped from entries.
	attribute_filter: Option<AttributeFilter>,
	/// Number of the last line read from the source, 1-based.
	line_number: u64,
	/// Starting line number of the most recent record.
	record_line: u64,
	/// Raw source lines of the most recent record, for reject reports.
	record_raw: Vec<String>,
	/// Records read, including ignored and rejected ones.
	records_read: u64,
	/// Records excluded by filters.
	records_ignored: u64,
	/// Records rejected as invalid.
	records_rejected: u64,
}

impl<R: BufRead, S: Schema> std::fmt::Debug for LdifReader<R, S> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LdifReader")
			.field("line_number", &self.line_number)
			.field("records_read", &self.records_read)
			.field("records_ignored", &self.records_ignored)
			.field("records_rejected", &self.records_rejected)
			.finish_non_exhaustive()
	}
}

impl<R: BufRead, S: Schema> LdifReader<R, S> {
	/// Creates a reader over the given source.
	pub fn new(source: R, schema: S, options: ReadOptions) -> Self {
		LdifReader {
			source,
			schema,
			options,
			reject: None,
			dn_filter: None,
			entry_filter: None,
			attribute_filter: None,
			line_number: 0,
			record_line: 0,
			record_raw: Vec::new(),
			records_read: 0,
			records_ignored: 0,
			records_rejected: 0,
		}
	}

	/// Attaches a sink that receives every non-fatal anomaly with the
	/// record's line number and raw lines.
	#[must_use]
	pub fn with_reject_sink(mut self, sink: impl RejectSink + 'static) -> Self {
		self.reject = Some(Box::new(sink));
		self
	}

	/// Only entries whose DN passes the predicate are returned; others
	/// count as ignored.
	#[must_use]
	pub fn with_dn_filter(mut self, filter: impl FnMut(&Dn) -> bool + 'static) -> Self {
		self.dn_filter = Some(Box::new(filter));
		self
	}

	/// Only assembled entries passing the predicate are returned; others
	/// count as ignored.
	#[must_use]
	pub fn with_entry_filter(mut self, filter: impl FnMut(&Entry) -> bool + 'static) -> Self {
		self.entry_filter = Some(Box::new(filter));
		self
	}

	/// Attributes failing the predicate are dropped while decoding.
	#[must_use]
	pub fn with_attribute_filter(
		mut self,
		filter: impl FnMut(&AttributeDescription) -> bool + 'static,
	) -> Self {
		self.attribute_filter = Some(Box::new(filter));
		self
	}

	/// Records read so far, including ignored and rejected ones.
	#[must_use]
	pub fn records_read(&self) -> u64 {
		self.records_read
	}

	/// Records excluded by filters so far. Not errors.
	#[must_use]
	pub fn records_ignored(&self) -> u64 {
		self.records_ignored
	}

	/// Records rejected as invalid so far.
	#[must_use]
	pub fn records_rejected(&self) -> u64 {
		self.records_rejected
	}

	/// Starting line number of the most recently read record.
	#[must_use]
	pub fn last_record_line(&self) -> u64 {
		self.record_line
	}

	/// Rejects the most recently returned record. Intended for callers
	/// that perform their own validation: the record looked fine to the
	/// reader but failed an external check. The buffered raw lines are
	/// reported through the sink together with the reason.
	pub fn reject_last_record(&mut self, message: &str) {
		self.records_rejected += 1;
		if let Some(sink) = self.reject.as_mut() {
			sink.malformed(self.record_line, &self.record_raw, message);
		}
	}

	/// Reads the next entry, or `None` at end of input.
	///
	/// Filtered-out entries are skipped internally and never returned;
	/// record-level errors leave the reader usable for the next call.
	pub fn read_entry(&mut self) -> Result<Option<Entry>, Error> {
		loop {
			let Some(raw) = self.next_record_lines()? else {
				return Ok(None);
			};
			self.record_raw = raw.clone();
			let mut lines: VecDeque<String> = raw.into();

			let Some(dn) = self.read_dn(&mut lines)? else {
				// A record consisting solely of the version line.
				continue;
			};

			let mut excluded = false;
			if let Some(filter) = self.dn_filter.as_mut() {
				excluded = !filter(&dn);
			}
			if excluded {
				debug!(entry = %dn, "skipping entry, DN excluded by filter");
				self.records_read += 1;
				self.records_ignored += 1;
				if let Some(sink) = self.reject.as_mut() {
					sink.skipped(
						self.record_line,
						&self.record_raw,
						"entry excluded by DN filter",
					);
				}
				continue;
			}
			self.records_read += 1;

			let mut entry = Entry::new(dn);
			while let Some(line) = lines.pop_front() {
				self.read_attribute(&mut entry, &line)?;
			}

			let mut excluded = false;
			if let Some(filter) = self.entry_filter.as_mut() {
				excluded = !filter(&entry);
			}
			if excluded {
				debug!(entry = %entry.dn(), "skipping entry, excluded by entry filter");
				self.records_ignored += 1;
				if let Some(sink) = self.reject.as_mut() {
					sink.skipped(
						self.record_line,
						&self.record_raw,
						"entry excluded by entry filter",
					);
				}
				continue;
			}

			match self.options.schema_policy {
				SchemaPolicy::Ignore => {}
				SchemaPolicy::Warn => {
					let diagnostics = self.schema.check_entry(&entry);
					if !diagnostics.is_empty() {
						warn!(
							"entry {} does not conform to schema: {}",
							entry.dn(),
							diagnostics.join("; ")
						);
						if let Some(sink) = self.reject.as_mut() {
							sink.schema_warning(
								self.record_line,
								&self.record_raw,
								&diagnostics,
							);
						}
					}
				}
				SchemaPolicy::Reject => {
					let diagnostics = self.schema.check_entry(&entry);
					if !diagnostics.is_empty() {
						self.records_rejected += 1;
						if let Some(sink) = self.reject.as_mut() {
							sink.schema_failure(
								self.record_line,
								&self.record_raw,
								&diagnostics,
							);
						}
						return Err(Error::record(
							self.record_line,
							format!(
								"entry {} violates schema: {}",
								entry.dn(),
								diagnostics.join("; ")
							),
						));
					}
				}
			}

			return Ok(Some(entry));
		}
	}

	/// Reads the next change record, or `None` at end of input.
	///
	/// A record without a `changetype:` line defaults to an add when the
	/// options say so, and is otherwise a fatal error; an unrecognized
	/// changetype is always fatal.
	pub fn read_change_record(&mut self) -> Result<Option<ChangeRecord>, Error> {
		loop {
			let Some(raw) = self.next_record_lines()? else {
				return Ok(None);
			};
			self.record_raw = raw.clone();
			let mut lines: VecDeque<String> = raw.into();

			let Some(dn) = self.read_dn(&mut lines)? else {
				continue;
			};
			self.records_read += 1;

			let changetype = self.read_changetype(&mut lines)?;
			let record = match changetype.as_deref() {
				Some("add") => self.parse_add(dn, &mut lines)?,
				Some("delete") => {
					if !lines.is_empty() {
						return Err(self.record_error(
							"delete change record must not have further attributes",
						));
					}
					ChangeRecord::Delete(dn)
				}
				Some("modify") => self.parse_modify(dn, &mut lines)?,
				Some("modrdn" | "moddn") => self.parse_modify_dn(dn, &mut lines)?,
				Some(other) => {
					return Err(Error::fatal(
						self.record_line,
						format!(
							"invalid changetype {other:?}, expected one of \
							 add, delete, modify, moddn, modrdn"
						),
					));
				}
				None if self.options.default_add => self.parse_add(dn, &mut lines)?,
				None => {
					return Err(Error::fatal(
						self.record_line,
						"change record has no changetype, expected one of \
						 add, delete, modify, moddn, modrdn",
					));
				}
			};
			return Ok(Some(record));
		}
	}

	/// Collects the logical lines of the next record: folds
	/// continuations, drops comments, stops at a blank line or end of
	/// input. Returns `None` once the source is exhausted.
	fn next_record_lines(&mut self) -> Result<Option<Vec<String>>, Error> {
		let mut lines: Vec<String> = Vec::new();
		loop {
			let mut raw = String::new();
			let read = self.source.read_line(&mut raw)?;
			if read == 0 {
				if lines.is_empty() {
					return Ok(None);
				}
				break;
			}
			self.line_number += 1;
			let line = raw.trim_end_matches(&['\n', '\r'][..]);

			if line.is_empty() {
				if lines.is_empty() {
					continue;
				}
				break;
			}
			if line.starts_with('#') {
				continue;
			}
			// A leading space marks a continuation of the previous line.
			// Tabs are tolerated as well for interoperability.
			if line.starts_with(' ') || line.starts_with('\t') {
				if let Some(last) = lines.last_mut() {
					last.push_str(&line[1..]);
				} else {
					let message =
						format!("continuation line with no previous line: {line:?}");
					if let Some(sink) = self.reject.as_mut() {
						sink.malformed(self.line_number, &lines, &message);
					}
					return Err(Error::fatal(self.line_number, message));
				}
			} else {
				if lines.is_empty() {
					self.record_line = self.line_number;
				}
				lines.push(line.to_owned());
			}
		}
		Ok(Some(lines))
	}

	/// Reads the DN from the front of a record. The first line must be
	/// `dn:`/`dn::`, except that a `version:` line before it is skipped.
	/// Returns `None` for a record that contained only the version line.
	fn read_dn(&mut self, lines: &mut VecDeque<String>) -> Result<Option<Dn>, Error> {
		loop {
			let Some(line) = lines.pop_front() else {
				return Ok(None);
			};
			let colon = self.colon_position(&line)?;
			let name = line[..colon].to_lowercase();
			if name == "version" {
				continue;
			}
			if name != "dn" {
				return Err(
					self.record_error(format!("record does not start with a DN: {line:?}"))
				);
			}

			let rest = &line[colon + 1..];
			let dn_string = if rest.is_empty() {
				String::new()
			} else if let Some(encoded) = rest.strip_prefix(':') {
				let decoded = BASE64.decode(encoded.trim_start_matches(' ')).map_err(
					|err| self.record_error(format!("the DN could not be base64-decoded: {err}")),
				)?;
				String::from_utf8(decoded).map_err(|err| {
					self.record_error(format!("the base64-encoded DN is not valid UTF-8: {err}"))
				})?
			} else {
				rest.trim_start_matches(' ').to_owned()
			};

			return match Dn::parse(&dn_string) {
				Ok(dn) => Ok(Some(dn)),
				Err(err) => {
					Err(self.record_error(format!("invalid DN {dn_string:?}: {err}")))
				}
			};
		}
	}

	/// Reads an optional `changetype:` line from the front of a record.
	/// Leaves the record untouched when the next line is something else.
	fn read_changetype(
		&mut self,
		lines: &mut VecDeque<String>,
	) -> Result<Option<String>, Error> {
		let Some(line) = lines.front().cloned() else {
			return Ok(None);
		};
		let colon = self.colon_position(&line)?;
		if !line[..colon].eq_ignore_ascii_case("changetype") {
			return Ok(None);
		}
		lines.pop_front();

		let rest = &line[colon + 1..];
		if rest.is_empty() {
			return Err(Error::fatal(
				self.record_line,
				"changetype line has no value, expected one of \
				 add, delete, modify, moddn, modrdn",
			));
		}
		if let Some(encoded) = rest.strip_prefix(':') {
			let decoded = BASE64.decode(encoded.trim_start_matches(' ')).map_err(|err| {
				self.record_error(format!("the changetype could not be base64-decoded: {err}"))
			})?;
			let value = String::from_utf8(decoded).map_err(|err| {
				self.record_error(format!("the changetype is not valid UTF-8: {err}"))
			})?;
			Ok(Some(value))
		} else {
			Ok(Some(rest.trim_start_matches(' ').to_owned()))
		}
	}

	/// Decodes one attribute line into the entry being assembled,
	/// applying the objectclass/attribute split, inclusion filters and
	/// the duplicate and single-value invariants.
	fn read_attribute(&mut self, entry: &mut Entry, line: &str) -> Result<(), Error> {
		let colon = self.colon_position(line)?;
		let description = AttributeDescription::parse(&line[..colon]);
		let value = self.parse_value(line, colon, description.name())?;

		if description.name().eq_ignore_ascii_case("objectclass") {
			if !self.options.include_object_classes {
				debug!(entry = %entry.dn(), "skipping objectclass value per options");
				return Ok(());
			}
			let class = String::from_utf8_lossy(&value).into_owned();
			entry.add_object_class(&class);
			return Ok(());
		}

		let mut excluded = false;
		if let Some(filter) = self.attribute_filter.as_mut() {
			excluded = !filter(&description);
		}
		if excluded {
			debug!(
				entry = %entry.dn(),
				attribute = description.name(),
				"skipping attribute, excluded by filter"
			);
			return Ok(());
		}

		let attribute_type = self.schema.attribute_type(description.name());
		entry
			.put_value(&attribute_type, description, value)
			.map_err(|err| self.record_error(err.to_string()))
	}

	/// Decodes the value production of one line: empty, raw, base64 or a
	/// URL dereference. Failures are record-level.
	fn parse_value(
		&mut self,
		line: &str,
		colon: usize,
		attr_name: &str,
	) -> Result<Vec<u8>, Error> {
		let rest = &line[colon + 1..];
		if rest.is_empty() {
			return Ok(Vec::new());
		}
		if let Some(encoded) = rest.strip_prefix(':') {
			return BASE64.decode(encoded.trim_start_matches(' ')).map_err(|err| {
				self.record_error(format!(
					"value of {attr_name} could not be base64-decoded: {err}"
				))
			});
		}
		if let Some(target) = rest.strip_prefix('<') {
			let target = target.trim_start_matches(' ');
			let parsed = Url::parse(target).map_err(|err| {
				self.record_error(format!("invalid URL value for {attr_name}: {err}"))
			})?;
			if parsed.scheme() != "file" {
				return Err(self.record_error(format!(
					"URL value for {attr_name} uses unsupported scheme {:?}",
					parsed.scheme()
				)));
			}
			let path = parsed.to_file_path().map_err(|()| {
				self.record_error(format!("URL value for {attr_name} is not a local file path"))
			})?;
			return fs::read(&path).map_err(|err| {
				self.record_error(format!(
					"could not read URL value for {attr_name} from {}: {err}",
					path.display()
				))
			});
		}
		Ok(rest.trim_start_matches(' ').as_bytes().to_vec())
	}

	/// Parses the attributes of an add change record. Invariants are
	/// enforced, but schema conformance is the replayer's business.
	fn parse_add(
		&mut self,
		dn: Dn,
		lines: &mut VecDeque<String>,
	) -> Result<ChangeRecord, Error> {
		let mut entry = Entry::new(dn);
		while let Some(line) = lines.pop_front() {
			self.read_attribute(&mut entry, &line)?;
		}
		Ok(ChangeRecord::Add(entry))
	}

	/// Parses the block grammar of a modify change record: a mod-type
	/// line, zero or more value lines for the same attribute, then `-`
	/// or end of record. Block order is preserved.
	fn parse_modify(
		&mut self,
		dn: Dn,
		lines: &mut VecDeque<String>,
	) -> Result<ChangeRecord, Error> {
		let mut modifications = Vec::new();
		while let Some(line) = lines.pop_front() {
			let colon = self.colon_position(&line)?;
			let keyword = line[..colon].trim().to_lowercase();
			let kind = match keyword.as_str() {
				"add" => ModificationKind::Add,
				"delete" => ModificationKind::Delete,
				"replace" => ModificationKind::Replace,
				"increment" => ModificationKind::Increment,
				other => {
					return Err(self.record_error(format!(
						"invalid modification type {other:?}, expected one of \
						 add, delete, replace, increment"
					)));
				}
			};
			let value = self.parse_value(&line, colon, &keyword)?;
			let target = String::from_utf8(value).map_err(|_| {
				self.record_error("modification attribute name is not valid UTF-8")
			})?;
			let description = AttributeDescription::parse(target.trim());

			let mut attribute = Attribute::new(description.clone());
			while let Some(line) = lines.pop_front() {
				if line == "-" {
					break;
				}
				let colon = self.colon_position(&line)?;
				let given = AttributeDescription::parse(&line[..colon]);
				if !given.matches(&description) {
					return Err(Error::fatal(
						self.record_line,
						format!(
							"modification value names attribute {:?} where {:?} was expected",
							given.to_wire(),
							description.to_wire()
						),
					));
				}
				let value = self.parse_value(&line, colon, given.name())?;
				attribute.push_value(value);
			}
			modifications.push(Modification { kind, attribute });
		}
		Ok(ChangeRecord::Modify { dn, modifications })
	}

	/// Parses a modrdn/moddn change record: mandatory `newrdn:` and
	/// `deleteoldrdn:`, optional `newsuperior:`.
	fn parse_modify_dn(
		&mut self,
		dn: Dn,
		lines: &mut VecDeque<String>,
	) -> Result<ChangeRecord, Error> {
		let new_rdn_string = self.named_value(lines, "newrdn")?;
		let new_rdn = Rdn::parse(&new_rdn_string).map_err(|err| {
			self.record_error(format!("invalid newrdn {new_rdn_string:?}: {err}"))
		})?;

		let delete_string = self.named_value(lines, "deleteoldrdn")?;
		let delete_old_rdn = match delete_string.to_lowercase().as_str() {
			"true" | "yes" | "1" => true,
			"false" | "no" | "0" => false,
			other => {
				return Err(
					self.record_error(format!("invalid deleteoldrdn value {other:?}"))
				);
			}
		};

		let new_superior = if lines.is_empty() {
			None
		} else {
			let superior = self.named_value(lines, "newsuperior")?;
			Some(Dn::parse(&superior).map_err(|err| {
				self.record_error(format!("invalid newsuperior {superior:?}: {err}"))
			})?)
		};

		Ok(ChangeRecord::ModifyDn { dn, new_rdn, delete_old_rdn, new_superior })
	}

	/// Pops the next line, which must carry the expected attribute name,
	/// and returns its decoded value as text.
	fn named_value(
		&mut self,
		lines: &mut VecDeque<String>,
		expected: &str,
	) -> Result<String, Error> {
		let Some(line) = lines.pop_front() else {
			return Err(
				self.record_error(format!("change record is missing the {expected}: line"))
			);
		};
		let colon = self.colon_position(&line)?;
		if !line[..colon].eq_ignore_ascii_case(expected) {
			return Err(Error::fatal(
				self.record_line,
				format!("expected a {expected}: line, found {:?}", &line[..colon]),
			));
		}
		let value = self.parse_value(&line, colon, expected)?;
		String::from_utf8(value)
			.map_err(|_| self.record_error(format!("value of {expected} is not valid UTF-8")))
	}

	/// Position of the separator colon; a line without one, or starting
	/// with one, has no attribute name.
	fn colon_position(&mut self, line: &str) -> Result<usize, Error> {
		match line.find(':') {
			Some(position) if position > 0 => Ok(position),
			_ => Err(self.record_error(format!("line has no attribute name: {line:?}"))),
		}
	}

	/// Reports a record-level problem to the sink, counts the rejection
	/// and builds the error for the caller.
	fn record_error(&mut self, message: impl Into<String>) -> Error {
		let message = message.into();
		self.records_rejected += 1;
		if let Some(sink) = self.reject.as_mut() {
			sink.malformed(self.record_line, &self.record_raw, &message);
		}
		Error::record(self.record_line, message)
	}
}
