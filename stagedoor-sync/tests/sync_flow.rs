//! End-to-end behaviour of batch ingestion and delta/baseline retrieval

mod common;

use common::{adjustment, batch, create_test_db};
use serde_json::json;
use stagedoor_sync::{
    apply_incoming_events, select_baseline, select_deltas, ApplyIncomingEventsResult,
    BaselineOptions, BaselineResult, DeltaOptions, IncomingEvent, InventoryItem, Scope,
    SkipReason, SyncError,
};

#[tokio::test]
async fn test_applied_then_duplicate_on_resubmit() {
    let t = create_test_db().await;
    let input = batch("m1", 0, vec![adjustment("sku-1", -2, 8)]);

    let first = apply_incoming_events(&t.db, input.clone()).await.unwrap();
    let ApplyIncomingEventsResult::Applied {
        server_seq,
        events,
        skipped,
        mutation,
    } = first
    else {
        panic!("expected applied");
    };
    assert_eq!(server_seq, 1);
    assert_eq!(events.len(), 1);
    assert!(skipped.is_empty());
    assert_eq!(mutation.event_count, 1);

    let second = apply_incoming_events(&t.db, input).await.unwrap();
    let ApplyIncomingEventsResult::Duplicate {
        server_seq: dup_seq,
        events: dup_events,
        mutation: dup_mutation,
    } = second
    else {
        panic!("expected duplicate");
    };
    assert_eq!(dup_seq, 1);
    assert_eq!(dup_events, events);
    assert_eq!(dup_mutation, mutation);

    assert_eq!(t.db.current_server_seq(Scope::Inventory).await.unwrap(), 1);
}

#[tokio::test]
async fn test_dedupe_key_within_and_across_batches() {
    let t = create_test_db().await;

    let mut a = adjustment("sku-1", 1, 1);
    a.dedupe_key = Some("scan-1".to_string());
    let mut b = adjustment("sku-1", 1, 2);
    b.dedupe_key = Some("scan-1".to_string());

    let result = apply_incoming_events(&t.db, batch("m1", 0, vec![a.clone(), b]))
        .await
        .unwrap();
    let ApplyIncomingEventsResult::Applied { events, skipped, .. } = result else {
        panic!("expected applied");
    };
    assert_eq!(events.len(), 1);
    assert_eq!(skipped.len(), 1);
    let skip = skipped.first().unwrap();
    assert_eq!(skip.index, 1);
    assert_eq!(skip.reason, SkipReason::DuplicateDedupeKey);

    let result = apply_incoming_events(&t.db, batch("m2", 1, vec![a])).await.unwrap();
    let ApplyIncomingEventsResult::Applied {
        events,
        skipped,
        server_seq,
        ..
    } = result
    else {
        panic!("expected applied");
    };
    assert!(events.is_empty());
    assert_eq!(server_seq, 1);
    assert_eq!(skipped.first().unwrap().reason, SkipReason::DuplicateDedupeKey);

    let deltas = select_deltas(&t.db, Scope::Inventory, 0, DeltaOptions::default())
        .await
        .unwrap();
    assert_eq!(deltas.events.len(), 1);
}

#[tokio::test]
async fn test_duplicate_event_id_skipped() {
    let t = create_test_db().await;
    let mut a = adjustment("sku-1", 1, 1);
    a.id = Some("evt-1".to_string());

    apply_incoming_events(&t.db, batch("m1", 0, vec![a.clone()]))
        .await
        .unwrap();
    let result = apply_incoming_events(&t.db, batch("m2", 1, vec![a, adjustment("sku-2", 1, 1)]))
        .await
        .unwrap();

    let ApplyIncomingEventsResult::Applied { events, skipped, .. } = result else {
        panic!("expected applied");
    };
    assert_eq!(skipped.first().unwrap().reason, SkipReason::DuplicateId);
    assert_eq!(events.first().unwrap().server_seq, 2);
}

#[tokio::test]
async fn test_stale_batch_writes_nothing() {
    let t = create_test_db().await;
    apply_incoming_events(&t.db, batch("m1", 0, vec![adjustment("sku-1", 1, 1)]))
        .await
        .unwrap();

    // A second device still believes the head is 0
    let result = apply_incoming_events(&t.db, batch("m2", 0, vec![adjustment("sku-2", 1, 1)]))
        .await
        .unwrap();
    assert_eq!(result, ApplyIncomingEventsResult::Stale { server_seq: 1 });

    let deltas = select_deltas(&t.db, Scope::Inventory, 0, DeltaOptions::default())
        .await
        .unwrap();
    assert_eq!(deltas.events.len(), 1);

    // The refused mutation id is still free
    let retry = apply_incoming_events(&t.db, batch("m2", 1, vec![adjustment("sku-2", 1, 1)]))
        .await
        .unwrap();
    assert!(matches!(retry, ApplyIncomingEventsResult::Applied { server_seq: 2, .. }));
}

#[tokio::test]
async fn test_server_seq_is_monotonic_and_deltas_respect_since() {
    let t = create_test_db().await;
    let mut head = 0;
    let mut seen = Vec::new();
    for round in 0..4 {
        let events = (0..3)
            .map(|i| adjustment(&format!("sku-{round}-{i}"), 1, 1))
            .collect();
        let result = apply_incoming_events(&t.db, batch(&format!("m{round}"), head, events))
            .await
            .unwrap();
        let ApplyIncomingEventsResult::Applied { events, server_seq, .. } = result else {
            panic!("expected applied");
        };
        seen.extend(events.iter().map(|e| e.server_seq));
        head = server_seq;
    }
    assert_eq!(seen, (1..=12).collect::<Vec<i64>>());

    for since in [0, 5, 11, 12, 20] {
        let deltas = select_deltas(&t.db, Scope::Inventory, since, DeltaOptions::default())
            .await
            .unwrap();
        assert!(deltas.events.iter().all(|e| e.server_seq > since));
        assert_eq!(deltas.server_seq, 12);
    }
}

#[tokio::test]
async fn test_delta_pagination() {
    let t = create_test_db().await;
    let events = (0..5).map(|i| adjustment(&format!("sku-{i}"), 1, 1)).collect();
    apply_incoming_events(&t.db, batch("m1", 0, events)).await.unwrap();

    let page = select_deltas(&t.db, Scope::Inventory, 0, DeltaOptions { limit: Some(2) })
        .await
        .unwrap();
    assert!(page.has_more);
    assert_eq!(page.next_cursor, Some(2));

    let page = select_deltas(&t.db, Scope::Inventory, 4, DeltaOptions { limit: Some(2) })
        .await
        .unwrap();
    assert!(!page.has_more);
    assert_eq!(page.next_cursor, None);
    assert_eq!(page.events.len(), 1);
}

#[tokio::test]
async fn test_applied_event_round_trips_through_deltas() {
    let t = create_test_db().await;
    let mut event = adjustment("sku-1", -2, 8);
    event.id = Some("evt-rt".to_string());
    event.occurred_at = "2025-02-03T04:05:06.789Z".to_string();
    let payload = event.payload.clone();

    apply_incoming_events(&t.db, batch("m1", 0, vec![event])).await.unwrap();

    let deltas = select_deltas(&t.db, Scope::Inventory, 0, DeltaOptions::default())
        .await
        .unwrap();
    let stored = deltas.events.first().unwrap();
    let wire = serde_json::to_value(stored).unwrap();
    assert_eq!(wire["id"], "evt-rt");
    assert_eq!(wire["type"], "inventory.adjustment");
    assert_eq!(wire["payload"], payload);
    assert_eq!(wire["occurredAt"], "2025-02-03T04:05:06.789Z");
    assert_eq!(wire["clientId"], "pos-1");
}

#[tokio::test]
async fn test_invalid_batch_rejected_as_a_whole() {
    let t = create_test_db().await;
    let mut bad = adjustment("sku-2", 1, 1);
    bad.payload["unexpected"] = json!(true);
    let wrong_type = IncomingEvent {
        event_type: "ticket.checkin".to_string(),
        ..adjustment("sku-3", 1, 1)
    };

    let err = apply_incoming_events(
        &t.db,
        batch("m1", 0, vec![adjustment("sku-1", 1, 1), bad, wrong_type]),
    )
    .await
    .unwrap_err();
    let SyncError::Validation(err) = err else {
        panic!("expected a validation error");
    };
    let indexes: Vec<Option<usize>> = err.issues.iter().map(|i| i.event_index).collect();
    assert_eq!(indexes, vec![Some(1), Some(2)]);

    assert_eq!(t.db.current_server_seq(Scope::Inventory).await.unwrap(), 0);
}

#[tokio::test]
async fn test_adjustments_project_into_baseline() {
    let t = create_test_db().await;
    let mut named = adjustment("prop-crown", 3, 3);
    named.payload["name"] = json!("Crown");
    apply_incoming_events(
        &t.db,
        batch("m1", 0, vec![named, adjustment("prop-crown", -1, 2)]),
    )
    .await
    .unwrap();

    let baseline = select_baseline(&t.db, Scope::Inventory, BaselineOptions::default())
        .await
        .unwrap();
    assert_eq!(baseline.server_seq(), 2);
    let BaselineResult::Inventory(page) = baseline else {
        panic!("expected an inventory page");
    };
    let item: &InventoryItem = page.records.first().unwrap();
    assert_eq!(item.id, "prop-crown");
    assert_eq!(item.name, "Crown");
    assert_eq!(item.quantity, 2);
}

#[tokio::test]
async fn test_baseline_pagination_is_exhaustive() {
    let t = create_test_db().await;
    let events = (0..7)
        .map(|i| adjustment(&format!("item-{i:02}"), 1, i))
        .collect();
    apply_incoming_events(&t.db, batch("m1", 0, events)).await.unwrap();

    let mut ids = Vec::new();
    let mut cursor = None;
    loop {
        let page = select_baseline(
            &t.db,
            Scope::Inventory,
            BaselineOptions {
                cursor: cursor.take(),
                limit: Some(3),
            },
        )
        .await
        .unwrap();
        let BaselineResult::Inventory(page) = page else {
            panic!("expected an inventory page");
        };
        ids.extend(page.records.into_iter().map(|r| r.id));
        if !page.has_more {
            break;
        }
        cursor = page.next_cursor;
    }

    let expected: Vec<String> = (0..7).map(|i| format!("item-{i:02}")).collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn test_scopes_have_independent_sequences() {
    let t = create_test_db().await;
    apply_incoming_events(&t.db, batch("m1", 0, vec![adjustment("sku-1", 1, 1)]))
        .await
        .unwrap();

    let tickets = select_deltas(&t.db, Scope::Tickets, 0, DeltaOptions::default())
        .await
        .unwrap();
    assert_eq!(tickets.server_seq, 0);
    assert!(tickets.events.is_empty());
}

#[tokio::test]
async fn test_concurrent_batches_on_same_head() {
    let t = create_test_db().await;
    let (a, b) = tokio::join!(
        apply_incoming_events(&t.db, batch("ma", 0, vec![adjustment("sku-a", 1, 1)])),
        apply_incoming_events(&t.db, batch("mb", 0, vec![adjustment("sku-b", 1, 1)])),
    );
    let outcomes = [a.unwrap(), b.unwrap()];

    let applied = outcomes
        .iter()
        .filter(|r| matches!(r, ApplyIncomingEventsResult::Applied { .. }))
        .count();
    let stale = outcomes
        .iter()
        .filter(|r| matches!(r, ApplyIncomingEventsResult::Stale { server_seq: 1 }))
        .count();
    assert_eq!((applied, stale), (1, 1));
    assert_eq!(t.db.current_server_seq(Scope::Inventory).await.unwrap(), 1);
}

#[tokio::test]
async fn test_empty_batch_is_recorded_without_moving_head() {
    let t = create_test_db().await;

    let result = apply_incoming_events(&t.db, batch("m-empty", 0, vec![]))
        .await
        .unwrap();
    let ApplyIncomingEventsResult::Applied {
        server_seq,
        events,
        mutation,
        ..
    } = result
    else {
        panic!("expected applied");
    };
    assert_eq!(server_seq, 0);
    assert!(events.is_empty());
    assert_eq!(mutation.event_count, 0);
    assert_eq!(mutation.first_server_seq, None);
    assert_eq!(t.db.current_server_seq(Scope::Inventory).await.unwrap(), 0);

    let replay = apply_incoming_events(&t.db, batch("m-empty", 0, vec![]))
        .await
        .unwrap();
    assert!(matches!(replay, ApplyIncomingEventsResult::Duplicate { server_seq: 0, .. }));
}

#[tokio::test]
async fn test_nanosecond_timestamps_replay_identically() {
    let t = create_test_db().await;
    let mut event = adjustment("sku-1", -1, 4);
    event.occurred_at = "2025-01-01T00:00:00.123456789Z".to_string();
    let input = batch("m-precise", 0, vec![event]);

    let ApplyIncomingEventsResult::Applied {
        events: applied,
        mutation: applied_mutation,
        ..
    } = apply_incoming_events(&t.db, input.clone()).await.unwrap()
    else {
        panic!("expected applied");
    };
    let ApplyIncomingEventsResult::Duplicate {
        events: replayed,
        mutation: replayed_mutation,
        ..
    } = apply_incoming_events(&t.db, input).await.unwrap()
    else {
        panic!("expected duplicate");
    };
    assert_eq!(applied, replayed);
    assert_eq!(applied_mutation, replayed_mutation);

    let deltas = select_deltas(&t.db, Scope::Inventory, 0, DeltaOptions::default())
        .await
        .unwrap();
    assert_eq!(deltas.events, applied);
    assert_eq!(
        serde_json::to_value(&applied[0]).unwrap()["occurredAt"],
        json!("2025-01-01T00:00:00.123456Z")
    );
}
