//! Read, write, compare and replay LDAP directory data in LDIF form.
//!
//! The library decodes the entry and change-record grammars of
//! [RFC 2849] into a shared model: [`Entry`] for directory entries,
//! [`ChangeRecord`] for the add/delete/modify/moddn requests. On top of
//! that model it provides a serializer producing text the reader decodes
//! back unchanged, a diff engine computing the change records that turn
//! one entry set into another, a patch engine replaying change records
//! against an entry set, and a bridge that hands results of an async
//! [`ldap3`] search to a blocking consumer.
//!
//! Reading is streaming and fault-tolerant: a malformed record is
//! reported to an optional [`RejectSink`], counted and skipped, and the
//! reader carries on with the next record. Only framing damage, an
//! unrecognized changetype or I/O failure ends the session; the
//! [`Severity`] on every error says which case occurred.
//!
//! For a general primer on LDAP itself, the [introduction] in the
//! `ldap3` crate is an excellent resource.
//!
//! [RFC 2849]: https://www.rfc-editor.org/rfc/rfc2849
//! [introduction]: https://github.com/inejge/ldap3/blob/master/LDAP-primer.md
//!
//! # Getting started
//! Decode a file, tweak it, and write it back out:
//! ```
//! # fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use ldif_engine::{
//!     AttributeRegistry, LdifReader, LdifWriter, ReadOptions, WriteOptions,
//! };
//!
//! let input = "\
//! dn: uid=jdoe,ou=people,dc=example,dc=com
//! objectClass: top
//! objectClass: inetOrgPerson
//! uid: jdoe
//! cn: Jane Doe
//! ";
//!
//! let mut reader = LdifReader::new(
//!     input.as_bytes(),
//!     AttributeRegistry::new(),
//!     ReadOptions::default(),
//! );
//! let mut writer = LdifWriter::new(Vec::new(), WriteOptions::default());
//!
//! while let Some(mut entry) = reader.read_entry()? {
//!     entry.add_object_class("organizationalPerson");
//!     writer.write_entry(&entry)?;
//! }
//!
//! let output = String::from_utf8(writer.into_inner())?;
//! assert!(output.contains("objectClass: organizationalPerson"));
//! # Ok(())
//! # }
//! # run().unwrap();
//! ```
//!
//! Computing and replaying a difference:
//! ```
//! # fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use ldif_engine::{diff_entries, patch_entries, DiffOptions, Dn, Entry};
//!
//! let source = vec![Entry::new(Dn::parse("dc=example,dc=com")?)];
//! let mut changed = source.clone();
//! changed[0].add_object_class("domain");
//!
//! let records = diff_entries(&source, &changed, &DiffOptions::default());
//! let patched = patch_entries(source, records)?;
//! assert_eq!(patched, changed);
//! # Ok(())
//! # }
//! # run().unwrap();
//! ```
//!
//! # Limitations
//! * DN handling is intentionally small: names are compared on a
//!   lowercased canonical form, without full RFC 4514 attribute-syntax
//!   awareness.
//! * The diff engine materializes both entry sets in memory; it is meant
//!   for exports that fit in RAM, not for billion-entry directories.
//! * Schema knowledge is limited to what callers declare on an
//!   [`AttributeRegistry`]; there is no schema discovery from a server.

pub mod change;
pub mod config;
pub mod diff;
pub mod entry;
pub mod error;
pub mod name;
pub mod patch;
pub mod reader;
pub mod reject;
pub mod schema;
pub mod search;
pub mod writer;

pub use ldap3::{self, Scope, SearchEntry};

pub use crate::{
	change::{ChangeRecord, Modification, ModificationKind},
	config::{DiffOptions, ReadOptions, WriteOptions},
	diff::{diff, diff_entries},
	entry::{Attribute, AttributeDescription, Entry},
	error::{Error, Severity},
	name::{Ava, Dn, NameError, Rdn},
	patch::{patch_entries, PatchError},
	reader::LdifReader,
	reject::{RejectionEvent, RejectionKind, RejectSink, RejectWriter},
	schema::{AttributeRegistry, AttributeType, Schema, SchemaPolicy},
	search::{
		search_channel, Reference, SearchCloser, SearchError, SearchOutcome,
		SearchProducer, SearchReader, SearchRequest,
	},
	writer::LdifWriter,
};
