use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Mutex;
use vault_kv_cp_core::{
    Endpoint, Error, KvStore, Listing, ListingShapeError, MemoryStore, RelPath, Secret,
    SecretData, StoreError, StoreResult, WalkSummary, WriteReceipt, migrate, walk,
};

fn fields(value: Value) -> SecretData {
    value.as_object().cloned().expect("object literal")
}

/// Wraps a [`MemoryStore`], records every call and lets a test replace the
/// answer for individual paths.
#[derive(Default)]
struct ScriptedStore {
    inner: MemoryStore,
    calls: Mutex<Vec<String>>,
    listings: HashMap<String, StoreResult<Option<Listing>>>,
    reads: HashMap<String, StoreResult<Option<Secret>>>,
    writes: HashMap<String, StoreResult<Option<WriteReceipt>>>,
}

impl ScriptedStore {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, op: &str, path: &RelPath) {
        self.calls.lock().unwrap().push(format!("{op} {path}"));
    }
}

impl KvStore for ScriptedStore {
    fn list(&self, mount: &str, path: &RelPath) -> StoreResult<Option<Listing>> {
        self.record("list", path);
        match self.listings.get(path.as_str()) {
            Some(answer) => answer.clone(),
            None => self.inner.list(mount, path),
        }
    }

    fn get_latest(&self, mount: &str, path: &RelPath) -> StoreResult<Option<Secret>> {
        self.record("get", path);
        match self.reads.get(path.as_str()) {
            Some(answer) => answer.clone(),
            None => self.inner.get_latest(mount, path),
        }
    }

    fn put(
        &self,
        mount: &str,
        path: &RelPath,
        data: &SecretData,
    ) -> StoreResult<Option<WriteReceipt>> {
        self.record("put", path);
        match self.writes.get(path.as_str()) {
            Some(answer) => answer.clone(),
            None => self.inner.put(mount, path, data),
        }
    }
}

fn app_source() -> MemoryStore {
    let store = MemoryStore::new();
    store.insert("app", "db/password", fields(json!({"value": "x"})));
    store.insert("app", "api/key", fields(json!({"value": "y"})));
    store
}

#[test]
fn copies_app_scenario_leaves_only() {
    let source = ScriptedStore {
        listings: HashMap::from([(
            String::new(),
            Ok(Some(Listing::from_keys(["db/", "api/"]))),
        )]),
        inner: app_source(),
        ..Default::default()
    };
    let destination = MemoryStore::new();

    let summary = migrate(
        Endpoint::new(&source, "app"),
        Endpoint::new(&destination, "app-copy"),
    )
    .unwrap();

    assert_eq!(
        summary,
        WalkSummary {
            directories: 3,
            secrets: 2
        }
    );
    assert_eq!(
        destination.paths("app-copy"),
        vec![RelPath::new("api/key"), RelPath::new("db/password")]
    );
    assert_eq!(
        destination.latest("app-copy", "db/password"),
        Some(fields(json!({"value": "x"})))
    );
    assert_eq!(
        destination.latest("app-copy", "api/key"),
        Some(fields(json!({"value": "y"})))
    );
    // Store order is kept and each subtree finishes before the next sibling.
    assert_eq!(
        source.calls(),
        vec![
            "list /",
            "list db",
            "list db/password",
            "get db/password",
            "list api",
            "list api/key",
            "get api/key",
        ]
    );
}

#[test]
fn absent_listing_copies_exactly_once_without_recursing() {
    let source = ScriptedStore {
        inner: app_source(),
        ..Default::default()
    };
    let destination = MemoryStore::new();

    walk(
        Endpoint::new(&source, "app"),
        RelPath::new("db/password"),
        Endpoint::new(&destination, "dst"),
        RelPath::new("moved/password"),
    )
    .unwrap();

    assert_eq!(source.calls(), vec!["list db/password", "get db/password"]);
    assert_eq!(destination.paths("dst"), vec![RelPath::new("moved/password")]);
}

#[test]
fn second_run_leaves_destination_identical() {
    let source = MemoryStore::new();
    source.insert("kv", "team/a/one", fields(json!({"user": "u", "pass": "p"})));
    source.insert("kv", "team/b", fields(json!({"n": 1, "nested": {"deep": [1, 2]}})));
    source.insert("kv", "root-secret", fields(json!({})));
    let destination = MemoryStore::new();

    migrate(Endpoint::new(&source, "kv"), Endpoint::new(&destination, "kv2")).unwrap();
    let first = destination.snapshot("kv2");
    migrate(Endpoint::new(&source, "kv"), Endpoint::new(&destination, "kv2")).unwrap();

    assert_eq!(destination.snapshot("kv2"), first);
    assert_eq!(first, source.snapshot("kv"));
}

#[test]
fn existing_destination_content_is_overwritten_not_merged() {
    let source = app_source();
    let destination = MemoryStore::new();
    destination.insert(
        "app",
        "db/password",
        fields(json!({"value": "stale", "extra": "field"})),
    );

    migrate(Endpoint::new(&source, "app"), Endpoint::new(&destination, "app")).unwrap();

    assert_eq!(
        destination.latest("app", "db/password"),
        Some(fields(json!({"value": "x"})))
    );
    assert_eq!(destination.version_count("app", "db/password"), 2);
}

#[test]
fn listing_error_stops_subtree_and_later_siblings() {
    let inner = MemoryStore::new();
    inner.insert("kv", "a/one", fields(json!({"v": 1})));
    inner.insert("kv", "b/two", fields(json!({"v": 2})));
    inner.insert("kv", "c/three", fields(json!({"v": 3})));
    let failure = StoreError::Status {
        status: 500,
        body: "internal error".into(),
    };
    let source = ScriptedStore {
        inner,
        listings: HashMap::from([("b".to_string(), Err(failure.clone()))]),
        ..Default::default()
    };
    let destination = MemoryStore::new();

    let err = migrate(Endpoint::new(&source, "kv"), Endpoint::new(&destination, "kv")).unwrap_err();

    assert_eq!(
        err,
        Error::List {
            path: RelPath::new("b"),
            source: failure
        }
    );
    assert_eq!(destination.paths("kv"), vec![RelPath::new("a/one")]);
    assert!(!source.calls().iter().any(|call| call.starts_with("list c")));
}

#[test]
fn malformed_listing_is_fatal() {
    let inner = app_source();
    let source = ScriptedStore {
        inner,
        listings: HashMap::from([(
            "db".to_string(),
            Ok(Some(Listing::new(json!({"keys": ["password", {"name": "x"}]})))),
        )]),
        ..Default::default()
    };
    let destination = MemoryStore::new();

    let err = migrate(Endpoint::new(&source, "app"), Endpoint::new(&destination, "app")).unwrap_err();

    assert!(matches!(
        err,
        Error::MalformedListing {
            ref path,
            reason: ListingShapeError::NonStringKey { index: 1, .. },
        } if path.as_str() == "db"
    ));
    // "api" sorts first and was copied before "db" was listed.
    assert_eq!(destination.paths("app"), vec![RelPath::new("api/key")]);
}

#[test]
fn listing_without_keys_is_fatal() {
    let source = ScriptedStore {
        listings: HashMap::from([(String::new(), Ok(Some(Listing::new(Value::Null))))]),
        ..Default::default()
    };
    let destination = MemoryStore::new();

    let err = migrate(Endpoint::new(&source, "app"), Endpoint::new(&destination, "app")).unwrap_err();

    assert_eq!(
        err,
        Error::MalformedListing {
            path: RelPath::root(),
            reason: ListingShapeError::MissingData
        }
    );
}

#[test]
fn empty_key_list_copies_nothing() {
    let source = ScriptedStore {
        listings: HashMap::from([(String::new(), Ok(Some(Listing::from_keys(Vec::<String>::new()))))]),
        ..Default::default()
    };
    let destination = MemoryStore::new();

    let summary =
        migrate(Endpoint::new(&source, "app"), Endpoint::new(&destination, "app")).unwrap();

    assert_eq!(
        summary,
        WalkSummary {
            directories: 1,
            secrets: 0
        }
    );
    assert_eq!(source.calls(), vec!["list /"]);
}

#[test]
fn read_failures_abort_the_run() {
    let failure = StoreError::Transport("connection reset".into());
    let source = ScriptedStore {
        inner: app_source(),
        reads: HashMap::from([("api/key".to_string(), Err(failure.clone()))]),
        ..Default::default()
    };
    let destination = MemoryStore::new();

    let err = migrate(Endpoint::new(&source, "app"), Endpoint::new(&destination, "app")).unwrap_err();

    assert_eq!(
        err,
        Error::Read {
            path: RelPath::new("api/key"),
            source: failure
        }
    );
    assert!(destination.paths("app").is_empty());
}

#[test]
fn unreadable_leaf_is_fatal() {
    let source = ScriptedStore {
        inner: app_source(),
        reads: HashMap::from([("api/key".to_string(), Ok(None))]),
        ..Default::default()
    };
    let destination = MemoryStore::new();

    let err = migrate(Endpoint::new(&source, "app"), Endpoint::new(&destination, "app")).unwrap_err();

    assert_eq!(err.path().as_str(), "api/key");
    assert!(matches!(err, Error::MissingSecret { .. }));
}

#[test]
fn write_failures_and_missing_confirmation_abort_the_run() {
    let failure = StoreError::Status {
        status: 403,
        body: "permission denied".into(),
    };
    let destination = ScriptedStore {
        writes: HashMap::from([("api/key".to_string(), Err(failure.clone()))]),
        ..Default::default()
    };
    let err = migrate(Endpoint::new(&app_source(), "app"), Endpoint::new(&destination, "app"))
        .unwrap_err();
    assert_eq!(
        err,
        Error::Write {
            path: RelPath::new("api/key"),
            source: failure
        }
    );

    let destination = ScriptedStore {
        writes: HashMap::from([("api/key".to_string(), Ok(None))]),
        ..Default::default()
    };
    let err = migrate(Endpoint::new(&app_source(), "app"), Endpoint::new(&destination, "app"))
        .unwrap_err();
    assert_eq!(
        err,
        Error::Unconfirmed {
            path: RelPath::new("api/key")
        }
    );
    // "api" sorts before "db", so nothing else was attempted.
    assert_eq!(destination.calls(), vec!["put api/key"]);
}

#[test]
fn deep_trees_do_not_exhaust_the_stack() {
    let source = MemoryStore::new();
    let deep = (0..2_000).map(|i| format!("d{i}")).collect::<Vec<_>>().join("/");
    source.insert("kv", format!("{deep}/leaf").as_str(), fields(json!({"v": true})));
    let destination = MemoryStore::new();

    let summary = migrate(Endpoint::new(&source, "kv"), Endpoint::new(&destination, "kv")).unwrap();

    assert_eq!(summary.secrets, 1);
    assert_eq!(summary.directories, 2_001);
    assert_eq!(
        destination.latest("kv", format!("{deep}/leaf").as_str()),
        Some(fields(json!({"v": true})))
    );
}
