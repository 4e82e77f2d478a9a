//! End-to-end sync runs against real and scripted collaborators.

use mapsync_codec::{Record, Value};
use mapsync_store::StoreConfig;
use mapsync_sync_engine::{
    CursorMode, CursorValue, DocumentStoreConnector, Fault, FetcherConfig, HttpClient,
    HttpPageFetcher, ManualClock, MemorySyncStore, Page, PageFetcher, ScriptedFetcher, SortToken,
    StoreConnector, SyncConfig, SyncDriver, SyncError, SyncResult, SyncState, SyncStore,
    TransportErrorKind, UpsertPolicy,
};
use mapsync_testkit::prelude::*;
use parking_lot::Mutex;
use proptest::prelude::*;
use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::Arc;

/// Answers requests with queued JSON bodies, then with an empty page.
struct QueuedHttp {
    bodies: Mutex<VecDeque<String>>,
    empty: String,
    posted: Arc<Mutex<Vec<String>>>,
}

impl QueuedHttp {
    fn new(bodies: impl IntoIterator<Item = String>, empty: String) -> Self {
        Self {
            bodies: Mutex::new(bodies.into_iter().collect()),
            empty,
            posted: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Request bodies POSTed so far, shared with the test.
    fn posted(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.posted)
    }

    fn next(&self) -> Vec<u8> {
        self.bodies
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.empty.clone())
            .into_bytes()
    }
}

impl HttpClient for QueuedHttp {
    fn get(&self, _url: &str) -> SyncResult<Vec<u8>> {
        Ok(self.next())
    }

    fn post_json(&self, _url: &str, body: Vec<u8>) -> SyncResult<Vec<u8>> {
        self.posted.lock().push(String::from_utf8_lossy(&body).into_owned());
        Ok(self.next())
    }
}

fn memory_driver(
    config: SyncConfig,
    pages: Vec<Page>,
) -> (SyncDriver<ScriptedFetcher, MemorySyncStore>, MemorySyncStore) {
    let store = MemorySyncStore::new();
    let driver = SyncDriver::new(config, ScriptedFetcher::with_pages(pages), store.clone())
        .with_clock(Arc::new(ManualClock::new(10_000)));
    (driver, store)
}

fn stored_name(store: &MemorySyncStore, url: &str) -> Option<Value> {
    store
        .records()
        .into_iter()
        .find(|r| r.get(PROFILE_URL) == Some(&Value::from(url)))
        .and_then(|r| r.get("name").cloned())
}

#[test]
fn first_sort_token_run_over_http_into_file_store() {
    with_store_dir(|path| {
        let http = QueuedHttp::new(
            [responses::export_page(
                &[profile("a"), profile("b")],
                Some(Value::from("T1")),
            )],
            responses::export_page(&[], None),
        );
        let fetcher = HttpPageFetcher::new(FetcherConfig::new("https://index.example"), http);
        let connector = DocumentStoreConnector::open_path(path, StoreConfig::default());
        let driver = SyncDriver::new(SyncConfig::new(CursorMode::SortToken), fetcher, connector);

        let report = driver.run().unwrap();
        assert_eq!(report.fetches, 2);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.cursor, CursorValue::SortToken("T1".into()));

        // The store lock is released after the run.
        let store = mapsync_store::DocumentStore::open(path, StoreConfig::default()).unwrap();
        assert_eq!(store.count("profiles").unwrap(), 2);
        let settings = store.documents("settings").unwrap();
        assert_eq!(settings.len(), 1);
        assert_eq!(settings[0].record.get("name"), Some(&Value::from("current")));
        assert_eq!(settings[0].record.get("sort"), Some(&Value::from(r#""T1""#)));
    });
}

#[test]
fn sort_token_bytes_survive_store_and_resend() {
    const TOKEN: &str = r#"[18446744073709551615, 1.7e9, "x"]"#;

    with_store_dir(|path| {
        let run = |bodies: Vec<String>| {
            let http = QueuedHttp::new(bodies, responses::export_page(&[], None));
            let posted = http.posted();
            let fetcher = HttpPageFetcher::new(FetcherConfig::new("https://index.example"), http);
            let connector = DocumentStoreConnector::open_path(path, StoreConfig::default());
            let report = SyncDriver::new(SyncConfig::new(CursorMode::SortToken), fetcher, connector)
                .run()
                .unwrap();
            let posted = posted.lock().clone();
            (report, posted)
        };

        let (first, posted) = run(vec![responses::export_page_with_raw_sort(
            &[profile("a")],
            TOKEN,
        )]);
        assert_eq!(first.cursor, CursorValue::SortToken(SortToken::from_json(TOKEN).unwrap()));
        assert_eq!(posted[1], format!(r#"{{"search_after":{TOKEN}}}"#));

        // A fresh run reads the token back from disk and sends the same bytes.
        let (second, posted) = run(vec![]);
        assert_eq!(second.fetches, 1);
        assert_eq!(posted, vec![format!(r#"{{"search_after":{TOKEN}}}"#)]);
        assert_eq!(second.cursor, first.cursor);
    });
}

#[test]
fn timestamp_skip_rerun_has_no_duplicates() {
    let store = MemorySyncStore::new();
    store.set_cursor("current", &CursorValue::Timestamp(1000)).unwrap();
    let clock = Arc::new(ManualClock::new(2000));
    let body = responses::nodes_page(&[named_profile("a", "first")], None);

    let run = |body: String| {
        let http = QueuedHttp::new([body], responses::nodes_page(&[], None));
        let fetcher = HttpPageFetcher::new(FetcherConfig::new("https://index.example"), http);
        SyncDriver::new(SyncConfig::new(CursorMode::Timestamp), fetcher, store.clone())
            .with_clock(clock.clone())
            .run()
            .unwrap()
    };

    let first = run(body);
    assert_eq!(first.inserted, 1);
    assert_eq!(first.cursor, CursorValue::Timestamp(2000));

    clock.set(3000);
    let second = run(responses::nodes_page(&[named_profile("a", "second")], None));
    assert_eq!(second.inserted, 0);
    assert_eq!(second.skipped, 1);
    assert_eq!(second.cursor, CursorValue::Timestamp(3000));

    assert_eq!(store.records().len(), 1);
    assert_eq!(stored_name(&store, "a"), Some(Value::from("first")));
    assert_eq!(
        store.cursor("current", CursorMode::Timestamp),
        Some(CursorValue::Timestamp(3000))
    );
}

#[test]
fn upsert_failure_on_page_three_keeps_cursor() {
    let pages: Vec<Page> = (0..5)
        .map(|i| {
            Page::new(vec![profile(&format!("p{i}-a")), profile(&format!("p{i}-b"))])
                .with_sort(format!("T{i}"))
        })
        .collect();
    let (driver, store) = memory_driver(SyncConfig::new(CursorMode::SortToken), pages);
    store.set_cursor("current", &CursorValue::SortToken("T-start".into())).unwrap();
    // Fifth upsert is the first record of page three.
    store.inject(Fault::Upsert(4));

    let err = driver.run().unwrap_err();
    assert!(matches!(err, SyncError::Store(_)));
    assert_eq!(driver.state(), SyncState::Failed);
    assert_eq!(store.records().len(), 4);
    assert_eq!(store.cursor_writes(), 0);
    assert_eq!(
        store.cursor("current", CursorMode::SortToken),
        Some(CursorValue::SortToken("T-start".into()))
    );
}

#[test]
fn sort_token_transport_failure_mid_drain_keeps_cursor() {
    let (driver, store) = memory_driver(
        SyncConfig::new(CursorMode::SortToken),
        vec![
            Page::new(vec![profile("a"), profile("b")]).with_sort("T1"),
            Page::new(vec![profile("c")]).with_sort("T2"),
        ],
    );
    driver
        .fetcher()
        .push_error(SyncError::transport(TransportErrorKind::Timeout, "export timed out"));
    store
        .set_cursor("current", &CursorValue::SortToken("T-start".into()))
        .unwrap();

    let err = driver.run().unwrap_err();
    assert_eq!(err.transport_kind(), Some(TransportErrorKind::Timeout));
    assert_eq!(driver.state(), SyncState::Failed);
    assert_eq!(store.records().len(), 3);
    assert_eq!(store.cursor_writes(), 0);
    assert_eq!(
        store.cursor("current", CursorMode::SortToken),
        Some(CursorValue::SortToken("T-start".into()))
    );

    let calls = driver.fetcher().calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].cursor, CursorValue::SortToken("T-start".into()));
    assert_eq!(calls[2].cursor, CursorValue::SortToken("T2".into()));
}

#[test]
fn timestamp_transport_failure_on_continuation_keeps_cursor() {
    let (driver, store) = memory_driver(
        SyncConfig::new(CursorMode::Timestamp),
        vec![
            Page::new(vec![profile("a"), profile("b")])
                .with_next("https://index.example/nodes?page=2&last_updated=1000"),
            Page::new(vec![profile("c")])
                .with_next("https://index.example/nodes?page=3&last_updated=1000"),
        ],
    );
    driver
        .fetcher()
        .push_error(SyncError::transport(TransportErrorKind::Timeout, "nodes timed out"));
    store.set_cursor("current", &CursorValue::Timestamp(1000)).unwrap();

    let err = driver.run().unwrap_err();
    assert_eq!(err.transport_kind(), Some(TransportErrorKind::Timeout));
    assert_eq!(driver.state(), SyncState::Failed);
    assert_eq!(store.records().len(), 3);
    assert_eq!(store.cursor_writes(), 0);
    assert_eq!(
        store.cursor("current", CursorMode::Timestamp),
        Some(CursorValue::Timestamp(1000))
    );

    let calls = driver.fetcher().calls();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|c| c.cursor == CursorValue::Timestamp(1000)));
    assert_eq!(calls[0].continuation, None);
    assert_eq!(
        calls[2].continuation.as_deref(),
        Some("https://index.example/nodes?page=3&last_updated=1000")
    );
}

#[test]
fn retry_after_failure_resumes_from_old_cursor() {
    let (driver, store) = memory_driver(
        SyncConfig::new(CursorMode::SortToken),
        vec![Page::new(vec![profile("a"), profile("b")]).with_sort("T1")],
    );
    store.inject(Fault::Upsert(1));
    driver.run().unwrap_err();
    assert_eq!(store.cursor("current", CursorMode::SortToken), None);

    store.clear_faults();
    driver
        .fetcher()
        .push_page(Page::new(vec![profile("a"), profile("b")]).with_sort("T1"));
    let report = driver.run().unwrap();

    assert_eq!(report.previous_cursor, None);
    assert_eq!(report.inserted, 1);
    assert_eq!(report.updated, 1);
    assert_eq!(store.records().len(), 2);
    assert_eq!(driver.state(), SyncState::Done);
}

#[test]
fn rerun_without_new_data_is_a_no_op() {
    for mode in [CursorMode::SortToken, CursorMode::Timestamp] {
        let (driver, store) = memory_driver(
            SyncConfig::new(mode),
            vec![Page::new(vec![profile("a"), profile("b")]).with_sort("T1")],
        );

        let first = driver.run().unwrap();
        let second = driver.run().unwrap();

        assert_eq!(store.records().len(), 2);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.previous_cursor.as_ref(), Some(&first.cursor));
        match (&first.cursor, &second.cursor) {
            (CursorValue::Timestamp(a), CursorValue::Timestamp(b)) => assert!(b >= a),
            (a, b) => assert_eq!(a, b),
        }
    }
}

#[test]
fn overwrite_policy_can_be_forced_in_timestamp_mode() {
    let (driver, store) = memory_driver(
        SyncConfig::new(CursorMode::Timestamp).with_policy(UpsertPolicy::Overwrite),
        vec![Page::new(vec![
            named_profile("a", "old"),
            named_profile("a", "new"),
        ])],
    );

    let report = driver.run().unwrap();
    assert_eq!((report.inserted, report.updated), (1, 1));
    assert_eq!(stored_name(&store, "a"), Some(Value::from("new")));
}

#[test]
fn records_without_identity_pass_through() {
    let anonymous = Record::new().with("name", "same");
    let (driver, store) = memory_driver(
        SyncConfig::new(CursorMode::SortToken),
        vec![Page::new(vec![anonymous.clone(), anonymous]).with_sort("T1")],
    );

    driver.run().unwrap();
    driver.fetcher().push_page(Page::new(vec![Record::new().with("name", "same")]).with_sort("T2"));
    driver.run().unwrap();

    assert_eq!(store.records().len(), 3);
}

/// Blocks inside `fetch` until released.
struct GatedFetcher {
    entered: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl PageFetcher for GatedFetcher {
    fn fetch(&self, _cursor: &CursorValue, _continuation: Option<&str>) -> SyncResult<Page> {
        let _ = self.entered.lock().send(());
        let _ = self.release.lock().recv();
        Ok(Page::default())
    }
}

#[test]
fn overlapping_runs_are_rejected() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let fetcher = GatedFetcher {
        entered: Mutex::new(entered_tx),
        release: Mutex::new(release_rx),
    };
    let store = MemorySyncStore::new();
    let driver = SyncDriver::new(SyncConfig::default(), fetcher, store.clone());

    std::thread::scope(|s| {
        let first = s.spawn(|| driver.run());
        entered_rx.recv().unwrap();
        assert_eq!(driver.state(), SyncState::Draining);

        let err = driver.run().unwrap_err();
        assert!(matches!(err, SyncError::InvalidStateTransition { .. }));

        release_tx.send(()).unwrap();
        first.join().unwrap().unwrap();
    });

    assert_eq!(store.connects(), 1);
    assert_eq!(driver.state(), SyncState::Done);
}

#[test]
fn file_store_is_exclusive_across_connectors() {
    with_store_dir(|path| {
        let held = mapsync_store::DocumentStore::open(path, StoreConfig::default()).unwrap();
        let connector = DocumentStoreConnector::open_path(path, StoreConfig::default());
        let driver = SyncDriver::new(
            SyncConfig::default(),
            ScriptedFetcher::new(),
            connector,
        );

        let err = driver.run().unwrap_err();
        assert!(matches!(
            err,
            SyncError::Store(mapsync_store::StoreError::Locked)
        ));
        assert_eq!(driver.fetcher().call_count(), 0);

        held.close().unwrap();
        drop(held);
        driver.run().unwrap();
    });
}

#[test]
fn shared_connector_keeps_store_open() {
    let test_store = TestStore::memory();
    let store = Arc::new(test_store.store);
    let connector = DocumentStoreConnector::shared(Arc::clone(&store));
    let session = connector.connect().unwrap();
    session.close().unwrap();
    assert!(!store.is_closed());

    let driver = SyncDriver::new(
        SyncConfig::default(),
        ScriptedFetcher::with_pages([Page::new(vec![profile("a")]).with_sort("T1")]),
        connector,
    );
    driver.run().unwrap();
    assert_eq!(store.count("profiles").unwrap(), 1);
    assert!(!store.is_closed());
}

proptest! {
    #[test]
    fn sort_token_drain_issues_n_plus_one_fetches(
        pages in prop::collection::vec(
            (prop::collection::vec(profile_strategy(), 1..4), sort_token_strategy()),
            0..6,
        )
    ) {
        let n = pages.len();
        let last = pages.last().map(|(_, token)| token.clone());
        let pages = pages
            .into_iter()
            .map(|(records, token)| Page::new(records).with_sort(token))
            .collect();
        let (driver, _) = memory_driver(SyncConfig::new(CursorMode::SortToken), pages);

        let report = driver.run().unwrap();
        prop_assert_eq!(report.fetches, n as u64 + 1);
        prop_assert_eq!(report.cursor, CursorValue::SortToken(last.map(SortToken::from).unwrap_or_default()));
    }

    #[test]
    fn timestamp_drain_stops_on_null_link(n in 1usize..6) {
        let pages = (0..n)
            .map(|i| {
                let page = Page::new(vec![profile(&format!("p{i}"))]);
                if i + 1 < n {
                    page.with_next(format!("https://index.example/nodes?page={}", i + 2))
                } else {
                    page
                }
            })
            .collect();
        let (driver, store) = memory_driver(SyncConfig::new(CursorMode::Timestamp), pages);

        let report = driver.run().unwrap();
        prop_assert_eq!(report.fetches, n as u64);
        prop_assert_eq!(store.records().len(), n);
    }

    #[test]
    fn overwrite_reruns_keep_one_copy(records in prop::collection::vec(profile_strategy(), 1..8)) {
        let (driver, store) = memory_driver(
            SyncConfig::new(CursorMode::SortToken),
            vec![Page::new(records.clone()).with_sort("T1")],
        );
        driver.run().unwrap();
        driver.fetcher().push_page(Page::new(records.clone()).with_sort("T2"));
        driver.run().unwrap();

        let distinct: std::collections::BTreeSet<_> = records
            .iter()
            .filter_map(|r| r.get(PROFILE_URL).and_then(Value::as_text).map(str::to_string))
            .collect();
        prop_assert_eq!(store.records().len(), distinct.len());
    }
}
