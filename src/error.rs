//! Error codes shared by the text-grammar engines.

use std::io;

/// How far an error reaches into the stream being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
	/// The stream is unusable past this point and reading must stop.
	Fatal,
	/// Only the current record is affected; reading may resume with the
	/// next record.
	RecordLevel,
}

/// Errors raised while decoding, comparing or serializing LDIF data.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// An I/O failure in the underlying source or sink. Always fatal.
	#[error(transparent)]
	Io(#[from] io::Error),
	/// The input could not be decoded. Carries the 1-based source line
	/// number of the record that failed and a severity tag telling the
	/// caller whether the stream can resume at the next record.
	#[error("line {line}: {message}")]
	Parse {
		/// Starting line number of the offending record.
		line: u64,
		/// Human-readable description of the problem.
		message: String,
		/// Whether reading may continue past this record.
		severity: Severity,
	},
}

impl Error {
	/// Builds a record-level parse error; the stream remains usable.
	pub fn record(line: u64, message: impl Into<String>) -> Self {
		Error::Parse { line, message: message.into(), severity: Severity::RecordLevel }
	}

	/// Builds a fatal parse error; the stream must not be read further.
	pub fn fatal(line: u64, message: impl Into<String>) -> Self {
		Error::Parse { line, message: message.into(), severity: Severity::Fatal }
	}

	/// Returns the severity of this error.
	#[must_use]
	pub fn severity(&self) -> Severity {
		match self {
			Error::Io(_) => Severity::Fatal,
			Error::Parse { severity, .. } => *severity,
		}
	}

	/// Whether the stream that produced this error is beyond recovery.
	#[must_use]
	pub fn is_fatal(&self) -> bool {
		self.severity() == Severity::Fatal
	}
}
