//! Bridges an asynchronous search to a blocking consumer.
//!
//! An LDAP search produced on a tokio runtime arrives as a stream of
//! entries, references and one terminal result. [`SearchReader`] lets a
//! plain blocking thread walk that stream with an iterator-shaped API:
//! the producer side never blocks, the consumer blocks only when nothing
//! is buffered, and any thread holding a [`SearchCloser`] can abort a
//! consumer stuck in a read.
//!
//! [`SearchReader::spawn`] wires the reader to an [`ldap3::Ldap`] handle
//! and drives the search on a background task; [`search_channel`] gives
//! the bare pair for feeding results from any other producer.

use std::sync::{
	atomic::{AtomicBool, Ordering},
	Arc,
};

use ldap3::{
	adapters::{Adapter, EntriesOnly},
	Ldap, LdapError, Scope, SearchEntry,
};
use tokio::{sync::mpsc, task::AbortHandle};

use crate::{entry::Entry, name::NameError};

/// Errors surfaced to the blocking consumer.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
	/// The reader was closed while or before a read.
	#[error("the search reader is closed")]
	Closed,
	/// `read_entry` found a reference at the cursor. The reference is
	/// still there for `read_reference`.
	#[error("the next search result is a reference, not an entry")]
	UnexpectedReference,
	/// The search terminated with a non-success result code.
	#[error("the search failed with result code {rc}: {text}")]
	Failed {
		/// The LDAP result code.
		rc: u32,
		/// The diagnostic message of the result.
		text: String,
	},
	/// The producer went away without delivering a terminal result.
	#[error("the search ended without a terminal result")]
	Interrupted,
	/// The producer reported a protocol or transport failure.
	#[error("the search was aborted: {0}")]
	Aborted(String),
	/// A failure on the producer side of the bridge.
	#[error(transparent)]
	Ldap(#[from] LdapError),
	/// A received DN could not be decoded.
	#[error(transparent)]
	Name(#[from] NameError),
}

/// The terminal result of a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOutcome {
	/// The LDAP result code, `0` for success.
	pub rc: u32,
	/// The diagnostic message of the result.
	pub text: String,
}

impl SearchOutcome {
	/// Whether the search completed successfully.
	#[must_use]
	pub fn is_success(&self) -> bool {
		self.rc == 0
	}
}

/// A search continuation reference: the URIs to chase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference(pub Vec<String>);

/// One message crossing the bridge.
#[derive(Debug)]
enum SearchItem {
	/// A decoded entry.
	Entry(Entry),
	/// A continuation reference.
	Reference(Reference),
	/// The terminal result; nothing follows it.
	Done(SearchOutcome),
	/// A producer-side failure; nothing follows it.
	Error(SearchError),
	/// The reader was closed; wakes a blocked consumer.
	Closed,
}

/// A result buffered at the consumer's cursor.
#[derive(Debug)]
enum Buffered {
	/// An entry waiting to be read.
	Entry(Entry),
	/// A reference waiting to be read.
	Reference(Reference),
}

/// How the stream ended, kept so repeated reads answer consistently.
#[derive(Debug)]
enum Terminal {
	/// A successful terminal result.
	Success(SearchOutcome),
	/// A failed terminal result.
	Failure(SearchOutcome),
	/// A producer-side failure.
	Aborted(String),
	/// The producer vanished without a terminal result.
	Interrupted,
}

/// The producer half of the bridge. Cloneable; every method is
/// non-blocking and infallible, sends to a closed reader are dropped.
#[derive(Debug, Clone)]
pub struct SearchProducer {
	/// The sending half of the channel.
	sender: mpsc::UnboundedSender<SearchItem>,
}

impl SearchProducer {
	/// Delivers one entry.
	pub fn entry(&self, entry: Entry) {
		let _ = self.sender.send(SearchItem::Entry(entry));
	}

	/// Delivers one continuation reference.
	pub fn reference(&self, reference: Reference) {
		let _ = self.sender.send(SearchItem::Reference(reference));
	}

	/// Delivers the terminal result. Nothing may follow.
	pub fn done(&self, outcome: SearchOutcome) {
		let _ = self.sender.send(SearchItem::Done(outcome));
	}

	/// Delivers a producer-side failure. Nothing may follow.
	pub fn error(&self, error: impl Into<SearchError>) {
		let _ = self.sender.send(SearchItem::Error(error.into()));
	}
}

/// Closes a [`SearchReader`] from another thread. Cloneable; closing is
/// idempotent.
#[derive(Debug, Clone)]
pub struct SearchCloser {
	/// Set once the reader is closed.
	closed: Arc<AtomicBool>,
	/// Used to wake a consumer blocked in a read.
	sender: mpsc::UnboundedSender<SearchItem>,
	/// Aborts the producing task, when one was spawned.
	abort: Option<AbortHandle>,
}

impl SearchCloser {
	/// Closes the reader: a consumer blocked in a read wakes with
	/// [`SearchError::Closed`], later reads fail the same way, and a
	/// spawned producer task is aborted.
	pub fn close(&self) {
		if self.closed.swap(true, Ordering::AcqRel) {
			return;
		}
		if let Some(abort) = &self.abort {
			abort.abort();
		}
		let _ = self.sender.send(SearchItem::Closed);
	}
}

/// The blocking consumer half of the bridge.
#[derive(Debug)]
pub struct SearchReader {
	/// The receiving half of the channel.
	receiver: mpsc::UnboundedReceiver<SearchItem>,
	/// Kept so closers can wake a blocked `blocking_recv`.
	sender: mpsc::UnboundedSender<SearchItem>,
	/// Set once the reader is closed.
	closed: Arc<AtomicBool>,
	/// The result at the cursor, not yet consumed.
	buffered: Option<Buffered>,
	/// Set once the stream ended.
	terminal: Option<Terminal>,
	/// Aborts the producing task, when one was spawned.
	abort: Option<AbortHandle>,
}

/// Creates an unconnected bridge: feed the producer from any task,
/// consume from any blocking thread.
#[must_use]
pub fn search_channel() -> (SearchProducer, SearchReader) {
	let (sender, receiver) = mpsc::unbounded_channel();
	let reader = SearchReader {
		receiver,
		sender: sender.clone(),
		closed: Arc::new(AtomicBool::new(false)),
		buffered: None,
		terminal: None,
		abort: None,
	};
	(SearchProducer { sender }, reader)
}

/// Parameters for a spawned search.
#[derive(Debug, Clone)]
pub struct SearchRequest {
	/// The base DN of the search.
	pub base: String,
	/// The scope of the search.
	pub scope: Scope,
	/// The LDAP filter.
	pub filter: String,
	/// The attributes to request.
	pub attributes: Vec<String>,
}

impl SearchReader {
	/// Runs the search on a background task and returns the blocking
	/// reader over its results. Must be called on a tokio runtime; the
	/// reads themselves belong on a blocking thread.
	///
	/// The stream is filtered to entries, so a reader spawned this way
	/// never yields a [`Reference`]; continuation references only reach
	/// a reader fed through [`search_channel`].
	#[must_use]
	pub fn spawn(ldap: Ldap, request: SearchRequest) -> SearchReader {
		let (producer, mut reader) = search_channel();
		let task = tokio::spawn(async move {
			match run_search(ldap, request, &producer).await {
				Ok(outcome) => producer.done(outcome),
				Err(err) => producer.error(err),
			}
		});
		reader.abort = Some(task.abort_handle());
		reader
	}

	/// Whether another result (entry or reference) is available, blocking
	/// until that is known. A failed search surfaces here.
	pub fn has_next(&mut self) -> Result<bool, SearchError> {
		self.fill()?;
		if self.buffered.is_some() {
			return Ok(true);
		}
		match self.ended() {
			Ok(()) => Ok(false),
			Err(err) => Err(err),
		}
	}

	/// Reads the next entry, or `None` once the search completed
	/// successfully. A reference at the cursor is an error and stays
	/// available for [`Self::read_reference`].
	pub fn read_entry(&mut self) -> Result<Option<Entry>, SearchError> {
		self.fill()?;
		match self.buffered.take() {
			Some(Buffered::Entry(entry)) => Ok(Some(entry)),
			Some(reference @ Buffered::Reference(_)) => {
				self.buffered = Some(reference);
				Err(SearchError::UnexpectedReference)
			}
			None => self.ended().map(|()| None),
		}
	}

	/// Reads the next reference. An entry at the cursor is not an error:
	/// it stays buffered and `None` is returned, so callers probing for
	/// references never disturb the entry stream.
	pub fn read_reference(&mut self) -> Result<Option<Reference>, SearchError> {
		self.fill()?;
		match self.buffered.take() {
			Some(Buffered::Reference(reference)) => Ok(Some(reference)),
			Some(entry @ Buffered::Entry(_)) => {
				self.buffered = Some(entry);
				Ok(None)
			}
			None => self.ended().map(|()| None),
		}
	}

	/// Closes the reader. Equivalent to [`SearchCloser::close`].
	pub fn close(&mut self) {
		self.closer().close();
	}

	/// A handle that closes this reader from any thread.
	#[must_use]
	pub fn closer(&self) -> SearchCloser {
		SearchCloser {
			closed: Arc::clone(&self.closed),
			sender: self.sender.clone(),
			abort: self.abort.clone(),
		}
	}

	/// Blocks until the cursor holds a result or the stream is known to
	/// have ended. Fails fast once closed.
	fn fill(&mut self) -> Result<(), SearchError> {
		loop {
			if self.closed.load(Ordering::Acquire) {
				return Err(SearchError::Closed);
			}
			if self.buffered.is_some() || self.terminal.is_some() {
				return Ok(());
			}
			match self.receiver.blocking_recv() {
				Some(SearchItem::Entry(entry)) => {
					self.buffered = Some(Buffered::Entry(entry));
				}
				Some(SearchItem::Reference(reference)) => {
					self.buffered = Some(Buffered::Reference(reference));
				}
				Some(SearchItem::Done(outcome)) => {
					self.terminal = Some(if outcome.is_success() {
						Terminal::Success(outcome)
					} else {
						Terminal::Failure(outcome)
					});
				}
				Some(SearchItem::Error(err)) => {
					self.terminal = Some(Terminal::Aborted(err.to_string()));
				}
				Some(SearchItem::Closed) => return Err(SearchError::Closed),
				None => self.terminal = Some(Terminal::Interrupted),
			}
		}
	}

	/// How the ended stream answers reads: success reads as exhaustion,
	/// everything else as the corresponding error.
	fn ended(&self) -> Result<(), SearchError> {
		match &self.terminal {
			Some(Terminal::Success(_)) => Ok(()),
			Some(Terminal::Failure(outcome)) => Err(SearchError::Failed {
				rc: outcome.rc,
				text: outcome.text.clone(),
			}),
			Some(Terminal::Aborted(message)) => Err(SearchError::Aborted(message.clone())),
			Some(Terminal::Interrupted) | None => Err(SearchError::Interrupted),
		}
	}
}

/// Streams one search into the producer and returns the terminal result.
async fn run_search(
	mut ldap: Ldap,
	request: SearchRequest,
	producer: &SearchProducer,
) -> Result<SearchOutcome, SearchError> {
	let adapters: Vec<Box<dyn Adapter<_, _>>> = vec![Box::new(EntriesOnly::new())];
	let mut search = ldap
		.streaming_search_with(
			adapters,
			&request.base,
			request.scope,
			&request.filter,
			request.attributes.clone(),
		)
		.await?;

	while let Some(entry) = search.next().await? {
		let entry = SearchEntry::construct(entry);
		producer.entry(Entry::from_search(entry)?);
	}
	let result = search.finish().await;
	Ok(SearchOutcome { rc: result.rc, text: result.text })
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used)]

	use std::{thread, time::Duration};

	use super::{search_channel, Reference, SearchError, SearchOutcome};
	use crate::{entry::Entry, name::Dn};

	/// A trivial entry with the given DN.
	fn entry(dn: &str) -> Entry {
		Entry::new(Dn::parse(dn).unwrap())
	}

	#[test]
	fn entries_then_successful_end() {
		let (producer, mut reader) = search_channel();
		producer.entry(entry("uid=1,dc=example,dc=com"));
		producer.entry(entry("uid=2,dc=example,dc=com"));
		producer.done(SearchOutcome { rc: 0, text: String::new() });

		assert!(reader.has_next().unwrap());
		assert_eq!(
			reader.read_entry().unwrap().unwrap().dn(),
			&Dn::parse("uid=1,dc=example,dc=com").unwrap()
		);
		assert_eq!(
			reader.read_entry().unwrap().unwrap().dn(),
			&Dn::parse("uid=2,dc=example,dc=com").unwrap()
		);
		assert!(reader.read_entry().unwrap().is_none());
		// The exhausted reader keeps answering.
		assert!(!reader.has_next().unwrap());
		assert!(reader.read_entry().unwrap().is_none());
	}

	#[test]
	fn failed_search_surfaces_the_result_code() {
		let (producer, mut reader) = search_channel();
		producer.entry(entry("uid=1,dc=example,dc=com"));
		producer.done(SearchOutcome { rc: 32, text: "no such object".to_owned() });

		assert!(reader.read_entry().unwrap().is_some());
		let err = reader.read_entry().unwrap_err();
		assert!(matches!(err, SearchError::Failed { rc: 32, .. }));
		// And keeps failing the same way.
		assert!(matches!(reader.has_next(), Err(SearchError::Failed { rc: 32, .. })));
	}

	#[test]
	fn references_are_strict_for_entries_and_lenient_the_other_way() {
		let (producer, mut reader) = search_channel();
		producer.reference(Reference(vec!["ldap://other/dc=example,dc=com".to_owned()]));
		producer.entry(entry("uid=1,dc=example,dc=com"));
		producer.done(SearchOutcome { rc: 0, text: String::new() });

		assert!(reader.has_next().unwrap());
		// An entry read trips over the reference without consuming it.
		assert!(matches!(reader.read_entry(), Err(SearchError::UnexpectedReference)));
		let reference = reader.read_reference().unwrap().unwrap();
		assert_eq!(reference.0, vec!["ldap://other/dc=example,dc=com".to_owned()]);

		// A reference read at an entry steps aside without consuming it.
		assert!(reader.read_reference().unwrap().is_none());
		assert!(reader.read_entry().unwrap().is_some());
		assert!(reader.read_reference().unwrap().is_none());
	}

	#[test]
	fn vanished_producer_reads_as_interrupted() {
		let (producer, mut reader) = search_channel();
		producer.entry(entry("uid=1,dc=example,dc=com"));
		drop(producer);

		assert!(reader.read_entry().unwrap().is_some());
		assert!(matches!(reader.read_entry(), Err(SearchError::Interrupted)));
	}

	#[test]
	fn close_wakes_a_blocked_reader() {
		let (_producer, mut reader) = search_channel();
		let closer = reader.closer();

		let consumer = thread::spawn(move || reader.read_entry());
		thread::sleep(Duration::from_millis(50));
		closer.close();
		// Closing twice is fine.
		closer.close();

		let result = consumer.join().unwrap();
		assert!(matches!(result, Err(SearchError::Closed)));
	}

	#[test]
	fn closed_reader_fails_fast() {
		let (producer, mut reader) = search_channel();
		producer.entry(entry("uid=1,dc=example,dc=com"));
		reader.close();
		assert!(matches!(reader.read_entry(), Err(SearchError::Closed)));
	}
}
