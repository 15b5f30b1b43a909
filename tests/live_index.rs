//! End-to-end run against a live index server.
//!
//! Skipped unless `INDEXNER_TEST_URL` points at a server, e.g.
//! `INDEXNER_TEST_URL=http://localhost:9200 cargo test --test live_index`.
//! The server needs the `mapper-annotated-text` plugin.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use indexner::annotation::{
    AnnotationManager, DocumentAnnotator, FilterCategoryMap, RunOptions,
};
use indexner::context::CancelFlag;
use indexner::index::{HttpIndexClient, RetryPolicy};
use indexner::recognizer::PatternRecognizer;

const TEXTS: [&str; 5] = [
    "Wally was last seen in the Bermuda Triangle.",
    "Mortimer Smith is from London.",
    "The United Nations met in Paris.",
    "Nothing to see here.",
    "Dr. Watson lives in London.",
];

fn test_url() -> Option<String> {
    std::env::var("INDEXNER_TEST_URL").ok()
}

async fn seed(http: &reqwest::Client, base: &str, index: &str) {
    http.put(format!("{}/{}", base, index))
        .send()
        .await
        .unwrap()
        .error_for_status()
        .unwrap();

    for (i, text) in TEXTS.iter().enumerate() {
        http.put(format!("{}/{}/_doc/{}?refresh=true", base, index, i))
            .json(&json!({ "text": text }))
            .send()
            .await
            .unwrap()
            .error_for_status()
            .unwrap();
    }
}

async fn source(http: &reqwest::Client, base: &str, index: &str, id: &str) -> Value {
    let doc: Value = http
        .get(format!("{}/{}/_doc/{}", base, index, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    doc["_source"].clone()
}

#[tokio::test]
async fn test_annotates_live_index() {
    let Some(base) = test_url() else {
        eprintln!("INDEXNER_TEST_URL not set; skipping");
        return;
    };
    let base = base.trim_end_matches('/').to_string();
    let index = format!("indexner-test-{}", chrono::Utc::now().timestamp_millis());

    let http = reqwest::Client::new();
    seed(&http, &base, &index).await;

    let client = Arc::new(
        HttpIndexClient::new(
            &base,
            None,
            None,
            Duration::from_secs(30),
            RetryPolicy::new(2, Duration::from_secs(30)),
        )
        .unwrap(),
    );
    let manager = AnnotationManager::new(client);
    let annotator =
        DocumentAnnotator::new(Arc::new(PatternRecognizer::new()), FilterCategoryMap::default());

    let mut options = RunOptions::new(&index, "text");
    options.page_size = 2;
    options.lease = Duration::from_secs(60);

    let first = manager
        .prepare_schema(&options, annotator.categories())
        .await
        .unwrap();
    assert_eq!(first.declared.len(), 5);
    let second = manager
        .prepare_schema(&options, annotator.categories())
        .await
        .unwrap();
    assert!(second.is_noop());

    let (tx, mut rx) = mpsc::channel(256);
    let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });
    let summary = manager
        .run(&annotator, &options, &CancelFlag::new(), tx)
        .await
        .unwrap();
    drain.await.unwrap();

    assert_eq!(summary.succeeded, TEXTS.len());
    assert!(summary.traversal_complete);

    let wally = source(&http, &base, &index, "0").await;
    assert_eq!(
        wally["text_ner"],
        json!("Wally was last seen in the [Bermuda Triangle](LOC).")
    );
    assert_eq!(wally["text"], json!(TEXTS[0]));
    assert_eq!(wally["ner:location"], json!(["BermudaTriangle"]));

    let un = source(&http, &base, &index, "2").await;
    assert_eq!(un["ner:organization"], json!(["UnitedNations"]));

    http.delete(format!("{}/{}", base, index))
        .send()
        .await
        .unwrap();
}
