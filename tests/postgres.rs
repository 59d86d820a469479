//! Run with a pgvector-enabled PostgreSQL reachable at `DATABASE_URL`:
//! `cargo test --test postgres -- --ignored`

#![cfg(feature = "persistence")]

use std::sync::Arc;

use agent_course::{
    connect_pool, DatabaseConfig, Document, Embedder, HashingEmbedder, Knowledge, Message,
    PgVector, PostgresDb, RunRecord, SessionStore, UserMemory, UserMemoryStore, VectorStore,
};
use serde_json::json;
use uuid::Uuid;

fn database() -> DatabaseConfig {
    DatabaseConfig {
        url: std::env::var("DATABASE_URL").unwrap_or_else(|_| DatabaseConfig::default().url),
        ..DatabaseConfig::default()
    }
}

fn unique(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn sessions_round_trip_in_order() {
    let db = PostgresDb::connect(&database()).await.unwrap();
    let session = unique("session");
    let user = unique("user");

    for (input, reply) in [("first", "one"), ("second", "two"), ("third", "three")] {
        let run = RunRecord::new(
            session.clone(),
            Some(user.clone()),
            vec![Message::user(input), Message::assistant(reply)],
        );
        db.save_run(&run).await.unwrap();
    }

    let runs = db.load_runs(&session, None).await.unwrap();
    let inputs: Vec<&str> = runs.iter().filter_map(|run| run.input()).collect();
    assert_eq!(inputs, ["first", "second", "third"]);

    let recent = db.load_runs(&session, Some(2)).await.unwrap();
    assert_eq!(recent[0].input(), Some("second"));

    assert_eq!(db.list_sessions(&user).await.unwrap(), [session.clone()]);
    db.delete_session(&session).await.unwrap();
    assert!(db.load_runs(&session, None).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn duplicate_user_memories_are_stored_once() {
    let db = PostgresDb::connect(&database()).await.unwrap();
    let user = unique("user");

    assert!(db
        .add_memory(&UserMemory::new(user.as_str(), "The user drives a Tesla Model 3."))
        .await
        .unwrap());
    assert!(!db
        .add_memory(&UserMemory::new(user.as_str(), "  the user drives a Tesla Model 3. "))
        .await
        .unwrap());
    assert_eq!(db.user_memories(&user).await.unwrap().len(), 1);

    db.clear_memories(&user).await.unwrap();
    assert!(db.user_memories(&user).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires PostgreSQL with pgvector"]
async fn pgvector_upserts_by_content_and_ranks_by_similarity() {
    let pool = connect_pool(&database()).await.unwrap();
    let embedder = HashingEmbedder::new(64);
    let store = PgVector::from_pool(pool, &unique("test_chunks"), 64).await.unwrap();

    let vacation = Document::new("handbook", "Employees receive 20 days of paid vacation.", json!({}));
    let laptops = Document::new("handbook", "Laptops are refreshed every three years.", json!({}));
    for doc in [&vacation, &laptops] {
        let embedding = embedder.embed(&doc.content).await.unwrap();
        assert!(store.upsert(doc.clone(), embedding).await.unwrap());
    }
    let again = embedder.embed(&vacation.content).await.unwrap();
    assert!(!store.upsert(vacation.clone(), again).await.unwrap());
    assert_eq!(store.count().await.unwrap(), 2);

    let query = embedder.embed("how many days of paid vacation").await.unwrap();
    let hits = store.search(&query, 2).await.unwrap();
    assert_eq!(hits[0].document.id, vacation.id);
    assert!(hits[0].score >= hits[1].score);

    store.clear().await.unwrap();
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires PostgreSQL with pgvector"]
async fn reloading_a_document_adds_no_rows() {
    let pool = connect_pool(&database()).await.unwrap();
    let store = PgVector::from_pool(pool, &unique("test_handbook"), 384).await.unwrap();
    let knowledge = Knowledge::new("handbook", Arc::new(HashingEmbedder::default()), Arc::new(store));

    let text = "Standard working hours are 9:00 AM to 5:30 PM, Monday through Friday.";
    assert_eq!(knowledge.add_text("handbook", text, json!({})).await.unwrap(), 1);
    assert_eq!(knowledge.add_text("handbook", text, json!({})).await.unwrap(), 0);
    assert_eq!(knowledge.len().await.unwrap(), 1);
}
