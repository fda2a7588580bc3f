#![allow(
	clippy::dbg_macro,
	clippy::expect_used,
	clippy::missing_docs_in_private_items,
	clippy::print_stderr,
	clippy::print_stdout,
	clippy::unwrap_used
)]
use std::{cell::RefCell, error::Error, rc::Rc};

use ldif_engine::{
	diff_entries, patch_entries, AttributeRegistry, ChangeRecord, DiffOptions, Dn, Entry,
	LdifReader, LdifWriter, ReadOptions, RejectWriter, Scope, SearchError, SearchReader,
	SearchRequest, WriteOptions,
};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

mod common;

use common::{
	ldap_add_organizational_unit, ldap_add_user, ldap_connect,
	ldap_delete_organizational_unit, ldap_delete_user,
};

fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::builder().with_default_directive(LevelFilter::INFO.into()).from_env_lossy(),
		)
		.try_init();
}

fn read_entries(text: &str) -> Vec<Entry> {
	let mut reader =
		LdifReader::new(text.as_bytes(), AttributeRegistry::new(), ReadOptions::default());
	let mut entries = Vec::new();
	while let Some(entry) = reader.read_entry().unwrap() {
		entries.push(entry);
	}
	entries
}

fn read_change_records(text: &str) -> Vec<ChangeRecord> {
	let mut reader =
		LdifReader::new(text.as_bytes(), AttributeRegistry::new(), ReadOptions::default());
	let mut records = Vec::new();
	while let Some(record) = reader.read_change_record().unwrap() {
		records.push(record);
	}
	records
}

fn write_entries(entries: &[Entry]) -> String {
	let mut writer = LdifWriter::new(Vec::new(), WriteOptions::default());
	for entry in entries {
		writer.write_entry(entry).unwrap();
	}
	String::from_utf8(writer.into_inner()).unwrap()
}

const PEOPLE: &str = "\
dn: ou=people,dc=example,dc=org
objectClass: top
objectClass: organizationalUnit
ou: people

dn: cn=Jane Doe,ou=people,dc=example,dc=org
objectClass: inetOrgPerson
cn: Jane Doe
sn: Doe
mail: jane@example.org
mail: jane.doe@example.org

dn: cn=John Smith,ou=people,dc=example,dc=org
objectClass: inetOrgPerson
cn: John Smith
sn: Smith
description: a value long enough that the writer will have to fold it across mu
 ltiple physical lines when it serializes this entry again
";

#[test]
fn decode_encode_decode_is_stable() {
	init_tracing();
	let entries = read_entries(PEOPLE);
	assert_eq!(entries.len(), 3);

	let text = write_entries(&entries);
	let again = read_entries(&text);
	assert_eq!(again, entries);
}

#[test]
fn diff_then_patch_reproduces_the_target() {
	init_tracing();
	let source = read_entries(PEOPLE);
	let target = read_entries(
		"\
dn: ou=people,dc=example,dc=org
objectClass: top
objectClass: organizationalUnit
ou: people

dn: cn=Jane Doe,ou=people,dc=example,dc=org
objectClass: inetOrgPerson
objectClass: posixAccount
cn: Jane Doe
sn: Doe
mail: jane@example.org

dn: cn=New Person,ou=people,dc=example,dc=org
objectClass: inetOrgPerson
cn: New Person
sn: Person
",
	);

	let records = diff_entries(&source, &target, &DiffOptions::default());

	// The records survive a trip through their text form.
	let mut writer = LdifWriter::new(Vec::new(), WriteOptions::default());
	for record in &records {
		writer.write_change_record(record).unwrap();
	}
	let text = String::from_utf8(writer.into_inner()).unwrap();
	let records = read_change_records(&text);

	let mut patched = patch_entries(source, records).unwrap();
	let mut expected = target;
	patched.sort_by(|a, b| a.dn().cmp(b.dn()));
	expected.sort_by(|a, b| a.dn().cmp(b.dn()));
	assert_eq!(patched, expected);
}

#[test]
fn patch_of_a_diff_handles_attributes_added_anywhere() {
	let source = read_entries(
		"\
dn: uid=1,ou=people,dc=example,dc=org
cn: Someone
mail: one@example.org
mail: two@example.org
",
	);
	// The new attribute comes first and the surviving values are
	// reordered; replaying the diff can only append.
	let target = read_entries(
		"\
dn: uid=1,ou=people,dc=example,dc=org
description: added ahead of the existing attributes
mail: two@example.org
mail: one@example.org
cn: Someone
",
	);

	let records = diff_entries(&source, &target, &DiffOptions::default());
	let patched = patch_entries(source, records).unwrap();
	assert_eq!(patched, target);
}

#[test]
fn diffing_a_set_against_itself_is_all_empty_modifies() {
	let entries = read_entries(PEOPLE);
	let records = diff_entries(&entries, &entries, &DiffOptions::default());

	assert_eq!(records.len(), entries.len());
	for record in records {
		let ChangeRecord::Modify { modifications, .. } = record else {
			panic!("expected a modify record");
		};
		assert!(modifications.is_empty());
	}
}

#[test]
fn rejected_records_land_in_a_reimportable_reject_file() {
	init_tracing();
	let input = "\
dn: cn=broken,dc=example,dc=org
cn: same
cn: same

dn: cn=fine,dc=example,dc=org
cn: fine
";
	let sink = Rc::new(RefCell::new(RejectWriter::new(Vec::new())));
	let mut reader = LdifReader::new(
		input.as_bytes(),
		AttributeRegistry::new(),
		ReadOptions::default(),
	)
	.with_reject_sink(Rc::clone(&sink));

	assert!(reader.read_entry().is_err());
	let entry = reader.read_entry().unwrap().unwrap();
	assert_eq!(entry.dn(), &Dn::parse("cn=fine,dc=example,dc=org").unwrap());
	assert!(reader.read_entry().unwrap().is_none());
	assert_eq!(reader.records_rejected(), 1);
	drop(reader);

	let sink = Rc::try_unwrap(sink).expect("reader dropped its sink handle");
	let reject_file = String::from_utf8(sink.into_inner().into_inner()).unwrap();
	assert!(reject_file.starts_with('#'));
	assert!(reject_file.contains("dn: cn=broken,dc=example,dc=org"));

	// The reject file is itself valid LDIF describing the bad record.
	let mut reader = LdifReader::new(
		reject_file.as_bytes(),
		AttributeRegistry::new(),
		ReadOptions::default(),
	);
	assert!(reader.read_entry().is_err());
	assert!(reader.read_entry().unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn search_bridge_hands_results_to_a_blocking_thread() {
	init_tracing();
	let (producer, mut reader) = ldif_engine::search_channel();

	tokio::spawn(async move {
		for uid in 1..=3 {
			let dn = Dn::parse(&format!("uid={uid},dc=example,dc=org")).unwrap();
			producer.entry(Entry::new(dn));
		}
		producer.done(ldif_engine::SearchOutcome { rc: 0, text: String::new() });
	});

	let entries = tokio::task::spawn_blocking(move || {
		let mut entries = Vec::new();
		while let Some(entry) = reader.read_entry().unwrap() {
			entries.push(entry);
		}
		entries
	})
	.await
	.unwrap();

	assert_eq!(entries.len(), 3);
	assert_eq!(entries[0].dn(), &Dn::parse("uid=1,dc=example,dc=org").unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn search_bridge_close_aborts_a_blocked_consumer() {
	let (_producer, reader) = ldif_engine::search_channel();
	let closer = reader.closer();

	let consumer = tokio::task::spawn_blocking(move || {
		let mut reader = reader;
		reader.read_entry()
	});
	tokio::time::sleep(std::time::Duration::from_millis(50)).await;
	closer.close();

	let result = consumer.await.unwrap();
	assert!(matches!(result, Err(SearchError::Closed)));
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "docker"]
async fn live_search_feeds_the_blocking_reader() -> Result<(), Box<dyn Error>> {
	init_tracing();
	let mut ldap = ldap_connect().await?;
	ldap_add_organizational_unit(&mut ldap, "ldifusers").await?;
	ldap_add_user(&mut ldap, "ldifusers", "ada", "Lovelace").await?;
	ldap_add_user(&mut ldap, "ldifusers", "grace", "Hopper").await?;

	let reader = SearchReader::spawn(
		ldap.clone(),
		SearchRequest {
			base: "ou=ldifusers,dc=example,dc=org".to_owned(),
			scope: Scope::Subtree,
			filter: "(objectClass=inetOrgPerson)".to_owned(),
			attributes: vec!["cn".to_owned(), "sn".to_owned(), "objectClass".to_owned()],
		},
	);

	let entries = tokio::task::spawn_blocking(move || {
		let mut reader = reader;
		let mut entries = Vec::new();
		while let Some(entry) = reader.read_entry()? {
			entries.push(entry);
		}
		Ok::<_, SearchError>(entries)
	})
	.await??;

	assert_eq!(entries.len(), 2);
	assert!(entries.iter().all(|entry| entry.has_object_class("inetOrgPerson")));

	// The live results drop into the same pipeline as file-based entries.
	let text = write_entries(&entries);
	assert_eq!(read_entries(&text), entries);

	ldap_delete_user(&mut ldap, "ldifusers", "ada").await?;
	ldap_delete_user(&mut ldap, "ldifusers", "grace").await?;
	ldap_delete_organizational_unit(&mut ldap, "ldifusers").await?;
	Ok(())
}
