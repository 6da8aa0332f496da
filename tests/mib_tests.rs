use netdisco_rs::mib::{MibIndex, MibMetadata, MibTree};

const SYSTEM_MIB: &str = r#"
SNMPv2-MIB DEFINITIONS ::= BEGIN

IMPORTS
    MODULE-IDENTITY, OBJECT-TYPE, mib-2
        FROM SNMPv2-SMI;

-- the System group
system       OBJECT IDENTIFIER ::= { mib-2 1 }

sysDescr OBJECT-TYPE
    SYNTAX      DisplayString (SIZE (0..255))
    MAX-ACCESS  read-only
    STATUS      current
    DESCRIPTION
            "A textual description of the entity.  This value should
            include the full name and version identification."
    ::= { system 1 }

sysObjectID OBJECT-TYPE
    SYNTAX      OBJECT IDENTIFIER
    MAX-ACCESS  read-only
    STATUS      current
    DESCRIPTION
            "The vendor's authoritative identification."
    ::= { system 2 }

sysName OBJECT-TYPE
    SYNTAX      DisplayString (SIZE (0..255))
    ACCESS      read-write
    STATUS      mandatory
    DESCRIPTION "An administratively-assigned name."
    ::= { system 5 }

END
"#;

const VENDOR_MIB: &str = r#"
acme OBJECT IDENTIFIER ::= { enterprises 9999 }
acmeProducts OBJECT IDENTIFIER ::= { acme 1 }
acmeRouter OBJECT-IDENTITY
    STATUS  current
    DESCRIPTION "Acme edge router."
    ::= { acmeProducts 7 }
widgetTable OBJECT-TYPE
    SYNTAX SEQUENCE OF WidgetEntry
    MAX-ACCESS not-accessible
    STATUS current
    DESCRIPTION "Widgets."
    ::= { systemExtras 3 }
"#;

fn loaded() -> MibIndex {
    let mut index = MibIndex::new();
    let report = index.load("SNMPv2-MIB", SYSTEM_MIB);
    assert_eq!(report.nodes, 4);
    assert!(report.unresolved.is_empty());
    index
}

#[test]
fn declarations_are_indexed_with_metadata() {
    let index = loaded();
    let descr = index.get_node("1.3.6.1.2.1.1.1").unwrap();
    assert_eq!(descr.name, "sysDescr");
    assert_eq!(descr.oid, "1.3.6.1.2.1.1.1");
    assert_eq!(descr.access, "read-only");
    assert_eq!(descr.status, "current");
    assert_eq!(descr.syntax, "DisplayString (SIZE (0..255))");
    assert_eq!(
        descr.description,
        "A textual description of the entity. This value should include the full name and version identification."
    );

    let name = index.get_node("1.3.6.1.2.1.1.5").unwrap();
    assert_eq!(name.access, "read-write");
    assert_eq!(name.description, "An administratively-assigned name.");
    assert_eq!(index.get_node("1.3.6.1.2.1.1.2").unwrap().syntax, "OBJECT IDENTIFIER");
}

#[test]
fn placeholders_carry_their_path() {
    let index = loaded();
    let mgmt = index.get_node("1.3.6.1.2").unwrap();
    assert_eq!(mgmt.name, "");
    assert_eq!(mgmt.oid, "1.3.6.1.2");
    assert!(index.get_node("1.3.6.1.2.1.1.9").is_none());
}

#[test]
fn next_oid_walks_in_numeric_order() {
    let index = loaded();
    assert_eq!(index.get_next_oid("1.3.6.1.2").as_deref(), Some("1.3.6.1.2.1"));
    assert_eq!(index.get_next_oid("1.3.6.1.2.1.1").as_deref(), Some("1.3.6.1.2.1.1.1"));
    assert_eq!(index.get_next_oid("1.3.6.1.2.1.1.1").as_deref(), Some("1.3.6.1.2.1.1.2"));
    assert_eq!(index.get_next_oid("1.3.6.1.2.1.1.3").as_deref(), Some("1.3.6.1.2.1.1.5"));
    assert_eq!(index.get_next_oid("1.3.6.1.2.1.1.5"), None);
}

#[test]
fn translate_substitutes_known_prefixes() {
    let index = loaded();
    assert_eq!(index.translate("1.3.6.1.2.1.1.5.0"), "1.3.6.1.2.1.system.sysName.0");
    assert_eq!(index.translate("1.3.6.1.4.1"), "1.3.6.1.4.1");
    assert_eq!(index.display_name("1.3.6.1.2.1.1.1"), "sysDescr");
}

#[test]
fn parents_resolve_across_sets_and_well_known_roots() {
    let mut index = loaded();
    let report = index.load("ACME-MIB", VENDOR_MIB);
    assert_eq!(report.unresolved, vec!["systemExtras".to_string()]);

    let router = index.get_node("1.3.6.1.4.1.9999.1.7").unwrap();
    assert_eq!(router.name, "acmeRouter");
    assert_eq!(router.description, "Acme edge router.");
    // Unresolved parent: attached directly under the root.
    assert_eq!(index.get_node("3").unwrap().name, "widgetTable");
    assert_eq!(index.resolve_name("sysName").as_deref(), Some("1.3.6.1.2.1.1.5"));
}

#[test]
fn next_oid_spans_sets() {
    let mut index = loaded();
    index.load("ACME-MIB", VENDOR_MIB);
    assert_eq!(index.get_next_oid("1.3.6.1.2.1.1.5").as_deref(), Some("1.3.6.1.4"));
}

#[test]
fn reloading_a_set_replaces_it() {
    let mut index = loaded();
    index.load("SNMPv2-MIB", "system OBJECT IDENTIFIER ::= { mib-2 1 }\n");
    assert!(index.get_node("1.3.6.1.2.1.1.5").is_none());
    assert_eq!(index.set_names().collect::<Vec<_>>(), vec!["SNMPv2-MIB"]);
}

#[test]
fn records_export_named_nodes_in_order() {
    let index = loaded();
    let records = index.records("SNMPv2-MIB");
    let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["system", "sysDescr", "sysObjectID", "sysName"]);
    assert!(index.records("missing").is_empty());
}

#[test]
fn tree_metadata_merges() {
    let mut tree = MibTree::new();
    tree.add_node("1.3.6.1.4.1.9", MibMetadata::named("cisco")).unwrap();
    tree.add_node(
        "1.3.6.1.4.1.9",
        MibMetadata {
            status: "current".into(),
            ..MibMetadata::default()
        },
    )
    .unwrap();
    let node = tree.get_node("1.3.6.1.4.1.9").unwrap();
    assert_eq!(node.name, "cisco");
    assert_eq!(node.status, "current");
    assert_eq!(tree.find_by_name("cisco"), Some("1.3.6.1.4.1.9"));
}
