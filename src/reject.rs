//! Rejection reporting for records that fail to decode, fail schema
//! checks or are skipped by caller-supplied filters.
//!
//! Callers that want diagnostics hand the reader a [`RejectSink`]; the
//! reader then reports every non-fatal anomaly with full context (record
//! starting line, raw source lines, reason). Callers without a sink lose
//! the diagnostics but get identical skip/abort behavior.

use std::io::{self, Write};

use tracing::warn;

/// Classification of one reported rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
	/// The record was structurally invalid.
	Malformed,
	/// The record was excluded by a caller-supplied filter.
	Skipped,
	/// The record failed schema validation under the reject policy.
	SchemaReject,
	/// The record failed schema validation under the warn policy.
	SchemaWarn,
}

/// One captured rejection: where it happened, the raw record and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectionEvent {
	/// Starting line number of the record.
	pub line: u64,
	/// The raw source lines of the record.
	pub lines: Vec<String>,
	/// Human-readable reason.
	pub message: String,
	/// What kind of anomaly this was.
	pub kind: RejectionKind,
}

/// Receives reports about records that could not be used.
pub trait RejectSink {
	/// A record was structurally invalid.
	fn malformed(&mut self, line: u64, lines: &[String], message: &str);

	/// A record was excluded by a filter; not an error.
	fn skipped(&mut self, line: u64, lines: &[String], message: &str);

	/// A record failed schema validation and was rejected.
	fn schema_failure(&mut self, line: u64, lines: &[String], messages: &[String]);

	/// A record failed schema validation but is still returned.
	fn schema_warning(&mut self, line: u64, lines: &[String], messages: &[String]);
}

/// Collects rejections in memory; handy for tests and for callers that
/// post-process rejected records.
impl RejectSink for Vec<RejectionEvent> {
	fn malformed(&mut self, line: u64, lines: &[String], message: &str) {
		self.push(RejectionEvent {
			line,
			lines: lines.to_vec(),
			message: message.to_owned(),
			kind: RejectionKind::Malformed,
		});
	}

	fn skipped(&mut self, line: u64, lines: &[String], message: &str) {
		self.push(RejectionEvent {
			line,
			lines: lines.to_vec(),
			message: message.to_owned(),
			kind: RejectionKind::Skipped,
		});
	}

	fn schema_failure(&mut self, line: u64, lines: &[String], messages: &[String]) {
		self.push(RejectionEvent {
			line,
			lines: lines.to_vec(),
			message: messages.join("; "),
			kind: RejectionKind::SchemaReject,
		});
	}

	fn schema_warning(&mut self, line: u64, lines: &[String], messages: &[String]) {
		self.push(RejectionEvent {
			line,
			lines: lines.to_vec(),
			message: messages.join("; "),
			kind: RejectionKind::SchemaWarn,
		});
	}
}

/// Forwards to a shared sink. Lets a caller keep hold of the sink while
/// the reader owns a handle to it.
impl<T: RejectSink> RejectSink for std::rc::Rc<std::cell::RefCell<T>> {
	fn malformed(&mut self, line: u64, lines: &[String], message: &str) {
		self.borrow_mut().malformed(line, lines, message);
	}

	fn skipped(&mut self, line: u64, lines: &[String], message: &str) {
		self.borrow_mut().skipped(line, lines, message);
	}

	fn schema_failure(&mut self, line: u64, lines: &[String], messages: &[String]) {
		self.borrow_mut().schema_failure(line, lines, messages);
	}

	fn schema_warning(&mut self, line: u64, lines: &[String], messages: &[String]) {
		self.borrow_mut().schema_warning(line, lines, messages);
	}
}

/// Writes rejected records to a reject file: a `# reason` comment, the
/// raw record lines, then a blank separator, so the file is itself
/// valid, re-importable LDIF.
#[derive(Debug)]
pub struct RejectWriter<W: Write> {
	/// The underlying sink.
	inner: W,
}

impl<W: Write> RejectWriter<W> {
	/// Wraps the given writer.
	pub fn new(inner: W) -> Self {
		RejectWriter { inner }
	}

	/// Unwraps the underlying writer.
	pub fn into_inner(self) -> W {
		self.inner
	}

	/// Writes one rejected record. Write failures are logged, never
	/// propagated: a broken reject file must not abort the import.
	fn write_record(&mut self, lines: &[String], message: &str) {
		if let Err(err) = self.try_write(lines, message) {
			warn!("writing to the reject file failed: {err}");
		}
	}

	/// The fallible part of [`Self::write_record`].
	fn try_write(&mut self, lines: &[String], message: &str) -> io::Result<()> {
		if !message.is_empty() {
			writeln!(self.inner, "# {message}")?;
		}
		for line in lines {
			writeln!(self.inner, "{line}")?;
		}
		writeln!(self.inner)
	}
}

impl<W: Write> RejectSink for RejectWriter<W> {
	fn malformed(&mut self, _line: u64, lines: &[String], message: &str) {
		self.write_record(lines, message);
	}

	fn skipped(&mut self, _line: u64, lines: &[String], message: &str) {
		self.write_record(lines, message);
	}

	fn schema_failure(&mut self, _line: u64, lines: &[String], messages: &[String]) {
		self.write_record(lines, &messages.join("; "));
	}

	fn schema_warning(&mut self, _line: u64, lines: &[String], messages: &[String]) {
		self.write_record(lines, &messages.join("; "));
	}
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used)]

	use super::{RejectSink, RejectWriter};

	#[test]
	fn reject_file_format() {
		let mut writer = RejectWriter::new(Vec::new());
		writer.malformed(
			4,
			&["dn: dc=example,dc=com".to_owned(), "dc: example".to_owned()],
			"missing objectclass",
		);

		let output = String::from_utf8(writer.into_inner()).unwrap();
		assert_eq!(
			output,
			"# missing objectclass\ndn: dc=example,dc=com\ndc: example\n\n"
		);
	}
}
