//! Reference store tests under concurrent use

use std::collections::HashSet;
use std::sync::Arc;
use stormer::store::{Candidate, InsertOutcome};
use stormer::ReferenceStore;

fn candidate(url: &str, body: &str) -> Candidate {
    Candidate {
        url: url.to_string(),
        title: format!("Page at {}", url),
        body: body.to_string(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_tasks_insert_each_document_once() {
    let store = Arc::new(ReferenceStore::new());
    let mut tasks = tokio::task::JoinSet::new();

    // 5 conversations x 5 rounds, every round offering the same 4 documents
    // under URL variants plus one document of its own.
    for conversation in 0..5 {
        for round in 0..5 {
            let store = store.clone();
            tasks.spawn(async move {
                let mut ids = Vec::new();
                for doc in 0..4 {
                    let url = match (conversation + round) % 3 {
                        0 => format!("https://example.org/doc/{}", doc),
                        1 => format!("https://www.example.org/doc/{}/", doc),
                        _ => format!("https://example.org/doc/{}?utm_campaign=x#top", doc),
                    };
                    ids.push(store.insert(candidate(&url, &format!("Shared document {}", doc))).unwrap());
                }
                let own = format!("https://example.net/{}/{}", conversation, round);
                ids.push(store.insert(candidate(&own, &format!("Notes {} {}", conversation, round))).unwrap());
                ids
            });
        }
    }

    let mut shared_ids = HashSet::new();
    while let Some(joined) = tasks.join_next().await {
        let ids = joined.unwrap();
        shared_ids.extend(ids[..4].iter().cloned());
    }

    assert_eq!(shared_ids.len(), 4);
    assert_eq!(store.len(), 4 + 25);

    let all = store.all();
    let unique: HashSet<_> = all.iter().map(|r| r.id.clone()).collect();
    assert_eq!(unique.len(), all.len());
    let seqs: HashSet<_> = all.iter().map(|r| r.seq).collect();
    assert_eq!(seqs.len(), all.len());
}

#[test]
fn test_repeated_insert_is_idempotent() {
    let store = ReferenceStore::new();
    let doc = candidate("https://example.org/venues", "The venues were spread over three zones.");

    let (first, outcome) = store.insert_with_outcome(doc.clone()).unwrap();
    assert_eq!(outcome, InsertOutcome::Inserted);
    let stored = store.get(&first).unwrap();

    for _ in 0..3 {
        let (again, outcome) = store.insert_with_outcome(doc.clone()).unwrap();
        assert_eq!(again, first);
        assert_eq!(outcome, InsertOutcome::Duplicate);
    }

    assert_eq!(store.len(), 1);
    let after = store.get(&first).unwrap();
    assert_eq!(after.retrieved_at, stored.retrieved_at);
    assert_eq!(after.body_excerpt, stored.body_excerpt);
}

#[test]
fn test_lexical_search_returns_only_matching_references() {
    let store = ReferenceStore::new();
    store
        .insert(candidate("https://example.org/snow", "Artificial snow covered every alpine course."))
        .unwrap();
    store
        .insert(candidate("https://example.org/medals", "Norway topped the medal table."))
        .unwrap();
    store
        .insert(candidate("https://example.org/snow-making", "Snow making used reservoir water for the snow."))
        .unwrap();

    let hits = store.search("artificial snow", 5);
    assert_eq!(hits.len(), 2);
    assert!(hits[0].url.ends_with("/snow"));
    assert!(hits.iter().all(|r| !r.url.ends_with("/medals")));
}
