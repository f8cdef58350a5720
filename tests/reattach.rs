//! Detach / re-attach round trips and versioning-data integrity.

use vson::{Error, Value, create, plain};

#[test]
fn detach_preserve_and_reattach_is_lossless() {
    let doc = create(plain!({ "prop": 41 })).unwrap();
    doc.set("x", 42).unwrap();
    doc.set("y", 43).unwrap();

    let wire = doc.detach_preserve_version_data();
    let restored = create(wire).unwrap();

    assert_eq!(restored.detach(), doc.detach());
    assert_eq!(
        restored.version_count().unwrap(),
        doc.version_count().unwrap()
    );
    // History survives the trip, not just the tip.
    for version in 0..doc.version_count().unwrap() {
        assert_eq!(
            restored.restore_version(version).unwrap(),
            doc.restore_version(version).unwrap()
        );
    }
}

#[test]
fn a_reattached_document_keeps_versioning() {
    let doc = create(plain!({ "n": 0 })).unwrap();
    doc.set("n", 1).unwrap();

    let restored = create(doc.detach_preserve_version_data()).unwrap();
    restored.set("n", 2).unwrap();

    assert_eq!(restored.version_count().unwrap(), 3);
    assert_eq!(restored.restore_version(1).unwrap(), plain!({ "n": 1 }));
    // The source document is unaffected.
    assert_eq!(doc.version_count().unwrap(), 2);
}

#[test]
fn reattach_covers_sequence_history() {
    let doc = create(plain!({ "items": [] })).unwrap();
    let items = doc.node("items").unwrap();
    items.push("a").unwrap();
    items.push("b").unwrap();
    items.pop().unwrap();
    items.unshift("z").unwrap();

    let restored = create(doc.detach_preserve_version_data()).unwrap();
    assert_eq!(restored.detach(), plain!({ "items": ["z", "a"] }));
    assert_eq!(
        restored.version_count().unwrap(),
        doc.version_count().unwrap()
    );
}

#[test]
fn plain_detach_forgets_history() {
    let doc = create(plain!({ "n": 0 })).unwrap();
    doc.set("n", 1).unwrap();

    let fresh = create(doc.detach()).unwrap();
    assert_eq!(fresh.version_count().unwrap(), 1);
    assert_eq!(fresh.restore_version(0).unwrap(), plain!({ "n": 1 }));
}

#[test]
fn tampered_version_data_is_rejected() {
    let doc = create(plain!({ "balance": 100 })).unwrap();
    doc.set("balance", 90).unwrap();
    let wire = doc.detach_preserve_version_data();

    // Tamper with the live tree.
    let mut edited_tree = wire.clone();
    if let Some(map) = edited_tree.as_map() {
        let mut map = map.clone();
        map.insert("balance".to_owned(), Value::U64(1_000_000));
        edited_tree = Value::Map(map);
    }
    assert!(matches!(
        create(edited_tree),
        Err(Error::InvalidVersioningData(_))
    ));

    // Tamper with the log instead: rewrite entry 1's value.
    let mut edited_log = wire.clone();
    if let Some(map) = edited_log.as_map() {
        let mut map = map.clone();
        let mut block = map.get("__versioning__").unwrap().as_map().unwrap().clone();
        let mut log = block.get("log").unwrap().as_array().unwrap().clone();
        log[1] = plain!({ "op": "set", "path": ["balance"], "value": 1000000 });
        block.insert("log".to_owned(), Value::Array(log));
        map.insert("__versioning__".to_owned(), Value::Map(block));
        edited_log = Value::Map(map);
    }
    assert!(matches!(
        create(edited_log),
        Err(Error::InvalidVersioningData(_))
    ));

    // The untouched form still re-attaches.
    assert!(create(wire).is_ok());
}

#[test]
fn malformed_log_shapes_are_rejected() {
    for bad in [
        plain!({ "__versioning__": null }),
        plain!({ "__versioning__": [] }),
        plain!({ "__versioning__": { "log": {} } }),
        plain!({ "__versioning__": { "log": [] } }),
        plain!({ "__versioning__": { "log": [{ "op": "set", "path": ["k"], "value": 1 }] } }),
        plain!({ "__versioning__": { "log": [{ "op": "set", "path": [], "value": {} }, { "op": "grow", "path": [], "value": 1 }] } }),
        plain!({ "__versioning__": { "lsn": 3 } }),
    ] {
        assert!(matches!(
            create(bad),
            Err(Error::InvalidVersioningData(_))
        ));
    }
}

#[test]
fn reattach_accepts_foreign_but_consistent_logs() {
    // A versioning block assembled by hand, not by this library, is fine
    // as long as replay reproduces the tree around it.
    let foreign = plain!({
        "greeting": "hello",
        "__versioning__": { "log": [
            { "op": "set", "path": [], "value": {} },
            { "op": "set", "path": ["greeting"], "value": "hi" },
            { "op": "set", "path": ["greeting"], "value": "hello" },
            { "op": "set", "path": ["stale"], "value": 1 },
            { "op": "delete", "path": ["stale"], "value": null }
        ] }
    });
    let doc = create(foreign).unwrap();
    assert_eq!(doc.version_count().unwrap(), 5);
    assert_eq!(
        doc.restore_version(3).unwrap(),
        plain!({ "greeting": "hello", "stale": 1 })
    );
}
