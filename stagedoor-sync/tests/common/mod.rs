#![allow(dead_code)]

use serde_json::json;
use stagedoor_sync::{
    ApplyIncomingEventsInput, IncomingEvent, NewTicket, Scope, SyncDatabase, SyncDbConfig,
};
use tempfile::TempDir;

/// A database in a temporary directory, removed on drop
pub struct TestDb {
    pub db: SyncDatabase,
    _dir: TempDir,
}

pub async fn create_test_db() -> TestDb {
    let dir = TempDir::new().unwrap();
    let config = SyncDbConfig {
        database_url: format!("sqlite://{}", dir.path().join("sync.db").display()),
        ..SyncDbConfig::default()
    };
    let db = SyncDatabase::connect(&config).await.unwrap();
    TestDb { db, _dir: dir }
}

pub fn adjustment(item_id: &str, delta: i64, quantity: i64) -> IncomingEvent {
    IncomingEvent {
        id: None,
        dedupe_key: None,
        event_type: "inventory.adjustment".to_string(),
        payload: json!({
            "itemId": item_id,
            "delta": delta,
            "quantity": quantity,
            "adjustedAt": "2025-01-01T00:00:00Z",
            "source": "pos"
        }),
        occurred_at: "2025-01-01T00:00:00Z".to_string(),
    }
}

pub fn batch(
    client_mutation_id: &str,
    last_known_server_seq: i64,
    events: Vec<IncomingEvent>,
) -> ApplyIncomingEventsInput {
    ApplyIncomingEventsInput {
        scope: Scope::Inventory,
        client_id: "pos-1".to_string(),
        client_mutation_id: client_mutation_id.to_string(),
        events,
        last_known_server_seq,
    }
}

pub fn ticket(id: &str, code: &str) -> NewTicket {
    NewTicket {
        id: id.to_string(),
        code: code.to_string(),
        event_id: "premiere".to_string(),
        holder_name: Some("A. Patron".to_string()),
    }
}
