use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dir_ingest::config::{CallPolicy, Credentials, IngestConfig, NewCollection};
use dir_ingest::contract::{
    Collection, CreatedDocument, ExtractionResult, MockIngestObserver, MockStoreClient,
    SearchResult, Session,
};
use dir_ingest::error::{IngestError, SetupError, StoreError};
use dir_ingest::ingest::{ingest, ingest_with, FailureStage, IngestionOutcome};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn fast_policy() -> CallPolicy {
    CallPolicy {
        timeout: Duration::from_secs(5),
        max_retries: 0,
        base_backoff: Duration::from_millis(1),
    }
}

fn files(names: &[&str]) -> Vec<PathBuf> {
    names.iter().map(|n| PathBuf::from(format!("/data/{n}"))).collect()
}

fn no_matches() -> SearchResult {
    SearchResult::default()
}

fn one_match() -> SearchResult {
    SearchResult {
        chunk_search_results: vec![serde_json::json!({"text": "existing"})],
    }
}

fn created() -> Result<CreatedDocument, StoreError> {
    Ok(CreatedDocument {
        document_id: Uuid::new_v4(),
    })
}

fn config_with_collection(id: Uuid) -> IngestConfig {
    IngestConfig {
        collection_ids: vec![id],
        ..Default::default()
    }
}

#[tokio::test]
async fn test_ingests_every_file_in_input_order() {
    let mut client = MockStoreClient::new();
    client.expect_search().times(3).returning(|_| Ok(no_matches()));
    client.expect_create_document().times(3).returning(|_| created());
    client.expect_extract_document().never();

    let input = files(&["a.pdf", "b.pdf", "c.pdf"]);
    let report = ingest(&client, &input, &config_with_collection(Uuid::new_v4()), &fast_policy())
        .await
        .expect("ingestion should not fail");

    assert_eq!(report.outcomes.len(), 3);
    for (outcome, path) in report.outcomes.iter().zip(&input) {
        assert_eq!(&outcome.path, path);
        assert!(matches!(outcome.outcome, IngestionOutcome::Ingested { .. }));
    }
    assert!(!report.cancelled);
    assert_eq!(report.summary().ingested, 3);
}

#[tokio::test]
async fn test_existing_document_is_skipped_without_create() {
    let mut client = MockStoreClient::new();
    client.expect_search().returning(|q| {
        if q.query == "b.pdf" {
            Ok(one_match())
        } else {
            Ok(no_matches())
        }
    });
    client
        .expect_create_document()
        .withf(|doc| !doc.file_path.ends_with("b.pdf"))
        .times(2)
        .returning(|_| created());

    let report = ingest(
        &client,
        &files(&["a.pdf", "b.pdf", "c.pdf"]),
        &config_with_collection(Uuid::new_v4()),
        &fast_policy(),
    )
    .await
    .unwrap();

    assert_eq!(report.outcomes[1].outcome, IngestionOutcome::SkippedDuplicate);
    assert_eq!(report.summary().skipped, 1);
    assert_eq!(report.summary().ingested, 2);
}

#[tokio::test]
async fn test_search_is_fulltext_on_file_name_scoped_to_collection() {
    let collection = Uuid::new_v4();
    let mut client = MockStoreClient::new();
    client
        .expect_search()
        .withf(move |q| q.query == "report.pdf" && q.collection_ids == vec![collection])
        .times(1)
        .returning(|_| Ok(no_matches()));
    client
        .expect_create_document()
        .withf(move |doc| {
            doc.collection_ids == vec![collection]
                && doc.metadata.get("file_path")
                    == Some(&serde_json::json!("/data/nested/report.pdf"))
                && doc.metadata.get("source") == Some(&serde_json::json!("local"))
        })
        .times(1)
        .returning(|_| created());

    let mut config = config_with_collection(collection);
    config.metadata.insert("source".into(), "local".into());

    let report = ingest(&client, &files(&["nested/report.pdf"]), &config, &fast_policy())
        .await
        .unwrap();
    assert_eq!(report.summary().ingested, 1);
    assert!(
        !config.metadata.contains_key("file_path"),
        "caller metadata must not be mutated"
    );
}

#[tokio::test]
async fn test_create_failure_does_not_stop_later_files() {
    let mut client = MockStoreClient::new();
    client.expect_search().returning(|_| Ok(no_matches()));
    client.expect_create_document().returning(|doc| {
        if doc.file_path.ends_with("b.pdf") {
            Err(StoreError::Status {
                status: 500,
                body: "internal error".into(),
            })
        } else {
            created()
        }
    });

    let report = ingest(
        &client,
        &files(&["a.pdf", "b.pdf", "c.pdf", "d.pdf"]),
        &IngestConfig::default(),
        &fast_policy(),
    )
    .await
    .unwrap();

    assert_eq!(report.outcomes.len(), 4);
    match &report.outcomes[1].outcome {
        IngestionOutcome::Failed { stage, reason } => {
            assert_eq!(*stage, FailureStage::Create);
            assert!(reason.contains("500"), "reason should carry the cause: {reason}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(matches!(report.outcomes[2].outcome, IngestionOutcome::Ingested { .. }));
    assert!(matches!(report.outcomes[3].outcome, IngestionOutcome::Ingested { .. }));

    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].0.ends_with("b.pdf"));
}

#[tokio::test]
async fn test_dedup_check_failure_never_creates() {
    let mut client = MockStoreClient::new();
    client.expect_search().returning(|q| {
        if q.query == "flaky.pdf" {
            Err(StoreError::Status {
                status: 503,
                body: "search down".into(),
            })
        } else {
            Ok(no_matches())
        }
    });
    client
        .expect_create_document()
        .withf(|doc| !doc.file_path.ends_with("flaky.pdf"))
        .times(1)
        .returning(|_| created());

    let report = ingest(
        &client,
        &files(&["flaky.pdf", "ok.pdf"]),
        &IngestConfig::default(),
        &fast_policy(),
    )
    .await
    .unwrap();

    assert!(matches!(
        report.outcomes[0].outcome,
        IngestionOutcome::Failed {
            stage: FailureStage::DedupCheck,
            ..
        }
    ));
    assert!(matches!(report.outcomes[1].outcome, IngestionOutcome::Ingested { .. }));
}

#[tokio::test]
async fn test_extraction_failure_keeps_ingested_document() {
    let document_id = Uuid::new_v4();
    let mut client = MockStoreClient::new();
    client.expect_search().returning(|_| Ok(no_matches()));
    client
        .expect_create_document()
        .returning(move |_| Ok(CreatedDocument { document_id }));
    client
        .expect_extract_document()
        .withf(move |id| *id == document_id)
        .times(1)
        .returning(|_| Err(StoreError::Other("extraction queue full".into())));

    let config = IngestConfig {
        extract: true,
        ..Default::default()
    };
    let report = ingest(&client, &files(&["a.pdf"]), &config, &fast_policy())
        .await
        .unwrap();

    assert_eq!(
        report.outcomes[0].outcome,
        IngestionOutcome::IngestedExtractionFailed {
            document_id,
            reason: "extraction queue full".into(),
        }
    );
    assert_eq!(report.summary().extraction_failed, 1);
}

#[tokio::test]
async fn test_extraction_success_reports_ingested() {
    let mut client = MockStoreClient::new();
    client.expect_search().returning(|_| Ok(no_matches()));
    client.expect_create_document().returning(|_| created());
    client
        .expect_extract_document()
        .times(1)
        .returning(|_| Ok(ExtractionResult::default()));

    let config = IngestConfig {
        extract: true,
        ..Default::default()
    };
    let report = ingest(&client, &files(&["a.pdf"]), &config, &fast_policy())
        .await
        .unwrap();
    assert!(matches!(report.outcomes[0].outcome, IngestionOutcome::Ingested { .. }));
}

#[tokio::test]
async fn test_login_failure_aborts_before_any_file() {
    let mut client = MockStoreClient::new();
    client
        .expect_login()
        .withf(|email, password| email == "admin@example.com" && password == "wrong")
        .times(1)
        .returning(|_, _| {
            Err(StoreError::Status {
                status: 401,
                body: "bad credentials".into(),
            })
        });
    client.expect_search().never();
    client.expect_create_document().never();

    let config = IngestConfig {
        credentials: Some(Credentials {
            email: "admin@example.com".into(),
            password: "wrong".into(),
        }),
        ..Default::default()
    };
    let err = ingest(&client, &files(&["a.pdf"]), &config, &fast_policy())
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Setup(SetupError::Login { .. })));
}

#[tokio::test]
async fn test_login_skipped_without_password() {
    let mut client = MockStoreClient::new();
    client.expect_login().never();
    client.expect_search().returning(|_| Ok(no_matches()));
    client.expect_create_document().returning(|_| created());

    let config = IngestConfig {
        credentials: Some(Credentials {
            email: "admin@example.com".into(),
            password: String::new(),
        }),
        ..Default::default()
    };
    let report = ingest(&client, &files(&["a.pdf"]), &config, &fast_policy())
        .await
        .unwrap();
    assert_eq!(report.summary().ingested, 1);
}

#[tokio::test]
async fn test_login_then_ingest() {
    let mut client = MockStoreClient::new();
    client.expect_login().times(1).returning(|_, _| {
        Ok(Session {
            access_token: "token".into(),
            refresh_token: None,
        })
    });
    client.expect_search().returning(|_| Ok(no_matches()));
    client.expect_create_document().times(2).returning(|_| created());

    let config = IngestConfig {
        credentials: Some(Credentials {
            email: "admin@example.com".into(),
            password: "change_me_immediately".into(),
        }),
        ..Default::default()
    };
    let report = ingest(&client, &files(&["a.pdf", "b.pdf"]), &config, &fast_policy())
        .await
        .unwrap();
    assert_eq!(report.summary().ingested, 2);
}

#[tokio::test]
async fn test_created_collection_replaces_supplied_ids() {
    let supplied = Uuid::new_v4();
    let created_id = Uuid::new_v4();
    let mut client = MockStoreClient::new();
    client
        .expect_create_collection()
        .withf(|name, description| name == "papers" && description == "research papers")
        .times(1)
        .returning(move |name, _| {
            Ok(Collection {
                id: created_id,
                name: name.to_string(),
                description: None,
            })
        });
    client
        .expect_search()
        .withf(move |q| q.collection_ids == vec![created_id])
        .returning(|_| Ok(no_matches()));
    client
        .expect_create_document()
        .withf(move |doc| doc.collection_ids == vec![created_id])
        .times(1)
        .returning(|_| created());

    let config = IngestConfig {
        collection_ids: vec![supplied],
        create_collection: Some(NewCollection {
            name: "papers".into(),
            description: "research papers".into(),
        }),
        ..Default::default()
    };
    let report = ingest(&client, &files(&["a.pdf"]), &config, &fast_policy())
        .await
        .unwrap();
    assert_eq!(report.collection_ids, vec![created_id]);
}

#[tokio::test]
async fn test_collection_creation_failure_aborts_run() {
    let mut client = MockStoreClient::new();
    client
        .expect_create_collection()
        .returning(|_, _| Err(StoreError::Other("name taken".into())));
    client.expect_search().never();
    client.expect_create_document().never();

    let config = IngestConfig {
        create_collection: Some(NewCollection {
            name: "papers".into(),
            description: String::new(),
        }),
        ..Default::default()
    };
    let err = ingest(&client, &files(&["a.pdf"]), &config, &fast_policy())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IngestError::Setup(SetupError::CreateCollection { .. })
    ));
}

#[tokio::test]
async fn test_missing_collection_warns_observer() {
    let mut client = MockStoreClient::new();
    client.expect_search().returning(|_| Ok(no_matches()));
    client.expect_create_document().returning(|_| created());

    let mut observer = MockIngestObserver::new();
    observer
        .expect_on_warning()
        .withf(|msg| msg.contains("default collection"))
        .times(1)
        .return_const(());
    observer.expect_on_outcome().times(2).return_const(());

    let report = ingest_with(
        &client,
        &files(&["a.pdf", "b.pdf"]),
        &IngestConfig::default(),
        &fast_policy(),
        &observer,
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    assert!(report.collection_ids.is_empty());
}

#[tokio::test]
async fn test_no_warning_when_collection_supplied() {
    let mut client = MockStoreClient::new();
    client.expect_search().returning(|_| Ok(no_matches()));
    client.expect_create_document().returning(|_| created());

    let mut observer = MockIngestObserver::new();
    observer.expect_on_warning().never();
    observer.expect_on_outcome().times(1).return_const(());

    ingest_with(
        &client,
        &files(&["a.pdf"]),
        &config_with_collection(Uuid::new_v4()),
        &fast_policy(),
        &observer,
        &CancellationToken::new(),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_unavailable_store_is_retried_then_recorded() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let seen = attempts.clone();
    let mut client = MockStoreClient::new();
    client.expect_search().returning(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("connection refused".into()))
    });
    client.expect_create_document().never();

    let policy = CallPolicy {
        max_retries: 2,
        ..fast_policy()
    };
    let report = ingest(&client, &files(&["a.pdf"]), &IngestConfig::default(), &policy)
        .await
        .unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert!(matches!(
        report.outcomes[0].outcome,
        IngestionOutcome::Failed {
            stage: FailureStage::DedupCheck,
            ..
        }
    ));
}

#[tokio::test]
async fn test_cancelled_before_start_attempts_nothing() {
    let mut client = MockStoreClient::new();
    client.expect_search().never();
    client.expect_create_document().never();

    let mut observer = MockIngestObserver::new();
    observer.expect_on_warning().return_const(());
    observer.expect_on_outcome().never();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = ingest_with(
        &client,
        &files(&["a.pdf", "b.pdf"]),
        &IngestConfig::default(),
        &fast_policy(),
        &observer,
        &cancel,
    )
    .await
    .unwrap();

    assert!(report.cancelled);
    assert!(report.outcomes.is_empty());
}

/// Cancels the run as soon as the first outcome is reported.
struct CancelAfterFirst {
    token: CancellationToken,
    seen: Mutex<Vec<PathBuf>>,
}

impl dir_ingest::contract::IngestObserver for CancelAfterFirst {
    fn on_warning(&self, _message: &str) {}

    fn on_outcome(&self, outcome: &dir_ingest::FileOutcome) {
        self.seen.lock().unwrap().push(outcome.path.clone());
        self.token.cancel();
    }
}

#[tokio::test]
async fn test_cancellation_keeps_completed_outcomes() {
    let mut client = MockStoreClient::new();
    client.expect_search().times(1).returning(|_| Ok(no_matches()));
    client.expect_create_document().times(1).returning(|_| created());

    let observer = CancelAfterFirst {
        token: CancellationToken::new(),
        seen: Mutex::new(Vec::new()),
    };
    let report = ingest_with(
        &client,
        &files(&["a.pdf", "b.pdf", "c.pdf"]),
        &IngestConfig::default(),
        &fast_policy(),
        &observer,
        &observer.token,
    )
    .await
    .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.outcomes.len(), 1);
    assert!(report.outcomes[0].path.ends_with("a.pdf"));
    assert_eq!(observer.seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancellation_stops_file_waiting_on_name_lock() {
    let cancel = CancellationToken::new();

    let mut client = MockStoreClient::new();
    client.expect_search().times(1).returning(|_| Ok(no_matches()));
    let token = cancel.clone();
    client.expect_create_document().times(1).returning(move |_| {
        token.cancel();
        created()
    });

    let mut observer = MockIngestObserver::new();
    observer.expect_on_warning().return_const(());
    observer.expect_on_outcome().times(1).return_const(());

    let config = IngestConfig {
        concurrency: 4,
        ..Default::default()
    };
    let input = vec![PathBuf::from("/x/doc1.txt"), PathBuf::from("/y/doc1.txt")];
    let report = ingest_with(&client, &input, &config, &fast_policy(), &observer, &cancel)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].path, input[0]);
}
