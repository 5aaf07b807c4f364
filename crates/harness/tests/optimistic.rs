use todosync_core::{BackendError, Priority, TodoBackend, TodoPatch};
use todosync_engine::{BatchKind, BatchOutcome, EngineError, RequestStatus};
use todosync_harness::{NetworkConfig, TestClient};

// ============================================================================
// Optimistic edits
// ============================================================================

#[test]
fn edit_is_visible_before_the_server_sees_it() -> Result<(), Box<dyn std::error::Error>> {
    let mut client = TestClient::new()?;
    let todo = client.create("Buy milk", Priority::Low)?;

    client.edit(todo.id, TodoPatch::completed(true))?;

    let view = client.view(todo.id).ok_or("todo missing from view")?;
    assert!(view.is_pending);
    assert!(view.todo.completed);
    // Store and server still hold the confirmed record
    assert!(!client.engine.store().get(todo.id).ok_or("missing")?.completed);
    assert!(!client.server_todo(todo.id)?.ok_or("missing on server")?.completed);

    Ok(())
}

#[test]
fn successive_edits_merge_into_one_batch_entry() -> Result<(), Box<dyn std::error::Error>> {
    let mut client = TestClient::new()?;
    let todo = client.create("Buy milk", Priority::Low)?;

    client.edit(todo.id, TodoPatch::completed(true))?;
    client.advance(200)?;
    client.edit(todo.id, TodoPatch::priority(Priority::High))?;
    client.settle()?;

    let sent = client.network.sent_of(BatchKind::Update);
    assert_eq!(sent.len(), 1);
    let entries = sent[0].request.entries()?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, todo.id);
    assert_eq!(
        entries[0].1,
        &TodoPatch::completed(true).with_priority(Priority::High)
    );

    let server = client.server_todo(todo.id)?.ok_or("missing on server")?;
    assert!(server.completed);
    assert_eq!(server.priority, Priority::High);
    assert_eq!(client.engine.store().get(todo.id), Some(&server));
    assert!(client.engine.pending_change(todo.id).is_none());
    assert_eq!(client.engine.update_status(), RequestStatus::Idle);

    Ok(())
}

#[test]
fn later_edit_to_same_field_wins() -> Result<(), Box<dyn std::error::Error>> {
    let mut client = TestClient::new()?;
    let todo = client.create("Draft", Priority::Low)?;

    client.edit(todo.id, TodoPatch::title("First"))?;
    client.edit(todo.id, TodoPatch::title("Second"))?;
    client.edit(todo.id, TodoPatch::completed(true))?;

    let pending = client.engine.pending_change(todo.id).ok_or("no pending change")?;
    assert_eq!(
        pending.fields,
        TodoPatch::title("Second").with_completed(true)
    );

    client.settle()?;
    assert_eq!(client.server_todo(todo.id)?.ok_or("missing")?.title, "Second");

    Ok(())
}

#[test]
fn edits_are_validated_before_recording() -> Result<(), Box<dyn std::error::Error>> {
    let mut client = TestClient::new()?;
    let todo = client.create("Buy milk", Priority::Low)?;

    let err = client
        .edit(todo.id, TodoPatch::title("   "))
        .expect_err("blank title must be rejected");
    assert!(err.is_validation());
    let err = client
        .edit(todo.id, TodoPatch::title("x".repeat(101)))
        .expect_err("long title must be rejected");
    assert!(err.is_validation());

    // Titles are trimmed before they are recorded
    client.edit(todo.id, TodoPatch::title("  Buy oat milk  "))?;
    let view = client.view(todo.id).ok_or("missing")?;
    assert_eq!(view.todo.title, "Buy oat milk");

    Ok(())
}

// ============================================================================
// Debounce window
// ============================================================================

#[test]
fn window_restarts_on_every_edit() -> Result<(), Box<dyn std::error::Error>> {
    let mut client = TestClient::new()?;
    let todo = client.create("Buy milk", Priority::Low)?;
    let start = client.now();

    client.edit(todo.id, TodoPatch::completed(true))?;
    client.advance(600)?;
    client.edit(todo.id, TodoPatch::title("Buy bread"))?;
    client.advance(600)?;
    assert!(client.network.sent().is_empty());

    client.advance(400)?;
    let sent = client.network.sent_of(BatchKind::Update);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].sent_at, start + 1_600);

    Ok(())
}

#[test]
fn edits_to_many_todos_share_one_batch() -> Result<(), Box<dyn std::error::Error>> {
    let mut client = TestClient::new()?;
    let a = client.create("a", Priority::Low)?;
    let b = client.create("b", Priority::Low)?;
    let c = client.create("c", Priority::Low)?;

    for todo in [&a, &b, &c] {
        client.edit(todo.id, TodoPatch::completed(true))?;
    }
    client.settle()?;

    let sent = client.network.sent_of(BatchKind::Update);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].request.ids.len(), 3);
    for todo in [&a, &b, &c] {
        assert!(client.server_todo(todo.id)?.ok_or("missing")?.completed);
        assert!(!client.view(todo.id).ok_or("missing")?.is_pending);
    }

    Ok(())
}

// ============================================================================
// Reconciliation while a batch is in flight
// ============================================================================

#[test]
fn edit_during_flight_survives_stale_response() -> Result<(), Box<dyn std::error::Error>> {
    let mut client = TestClient::new()?;
    let a = client.create("A", Priority::Low)?;
    let b = client.create("B", Priority::Low)?;

    client.edit(a.id, TodoPatch::completed(true))?;
    client.edit(b.id, TodoPatch::completed(true))?;
    client.advance(1_000)?;
    assert_eq!(client.network.in_flight_count(), 1);

    client.advance(100)?;
    client.edit(a.id, TodoPatch::title("A2"))?;
    client.advance(200)?;

    // B was confirmed from the response
    assert!(client.engine.pending_change(b.id).is_none());
    assert!(client.engine.store().get(b.id).ok_or("missing")?.completed);

    // A was de-flighted: its stored record is untouched and both edits remain
    assert!(!client.engine.store().get(a.id).ok_or("missing")?.completed);
    let pending = client.engine.pending_change(a.id).ok_or("A lost its edit")?;
    assert_eq!(pending.fields, TodoPatch::completed(true).with_title("A2"));
    let view = client.view(a.id).ok_or("missing")?;
    assert!(view.is_pending);
    assert_eq!(view.todo.title, "A2");
    assert!(view.todo.completed);

    client.settle()?;
    let sent = client.network.sent_of(BatchKind::Update);
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].request.ids, vec![a.id]);
    let server_a = client.server_todo(a.id)?.ok_or("missing")?;
    assert_eq!(server_a.title, "A2");
    assert!(server_a.completed);
    assert_eq!(client.engine.store().get(a.id), Some(&server_a));

    Ok(())
}

#[test]
fn timer_firing_mid_flight_rearms_after_response() -> Result<(), Box<dyn std::error::Error>> {
    let net = NetworkConfig {
        latency_ms: 2_000,
        ..NetworkConfig::default()
    };
    let mut client = TestClient::with_config(Default::default(), net)?;
    let a = client.create("A", Priority::Low)?;
    let b = client.create("B", Priority::Low)?;
    let start = client.now();

    client.edit(a.id, TodoPatch::completed(true))?;
    client.advance(1_100)?;
    client.edit(b.id, TodoPatch::completed(true))?;

    // B's window closes while A's batch is still out
    client.advance(1_000)?;
    assert_eq!(client.network.sent().len(), 1);
    assert_eq!(client.engine.next_deadline(), None);

    client.settle()?;
    let sent = client.network.sent_of(BatchKind::Update);
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].sent_at, start + 1_000);
    assert_eq!(sent[1].sent_at, start + 4_000);
    assert_eq!(sent[1].request.ids, vec![b.id]);
    assert!(client.engine.overlay().changes().next().is_none());

    Ok(())
}

#[test]
fn failed_flight_waits_for_retry_despite_deferred_firing() -> Result<(), Box<dyn std::error::Error>> {
    let net = NetworkConfig {
        latency_ms: 2_000,
        ..NetworkConfig::default()
    };
    let mut client = TestClient::with_config(Default::default(), net)?;
    let a = client.create("A", Priority::Low)?;
    let b = client.create("B", Priority::Low)?;
    client.fail_next(BackendError::Network("connection reset".into()));

    client.edit(a.id, TodoPatch::completed(true))?;
    client.advance(1_100)?;
    client.edit(b.id, TodoPatch::completed(true))?;
    client.advance(1_000)?;
    assert_eq!(client.engine.next_deadline(), None);

    client.settle()?;
    assert_eq!(client.engine.update_status(), RequestStatus::Failed);
    assert_eq!(client.network.sent_of(BatchKind::Update).len(), 1);
    assert!(client.engine.pending_change(a.id).is_some());
    assert!(client.engine.pending_change(b.id).is_some());

    assert_eq!(client.retry()?, 1);
    client.settle()?;
    let sent = client.network.sent_of(BatchKind::Update);
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].request.ids.len(), 2);
    assert_eq!(client.engine.update_status(), RequestStatus::Idle);

    Ok(())
}

#[test]
fn reconciled_batches_report_their_outcome() -> Result<(), Box<dyn std::error::Error>> {
    let mut client = TestClient::new()?;
    let kept = client.create("Buy milk", Priority::Low)?;
    let gone = client.create("Walk dog", Priority::Low)?;

    client.edit(kept.id, TodoPatch::completed(true))?;
    client.delete(gone.id)?;
    client.settle()?;

    assert_eq!(client.outcomes.len(), 2);
    assert!(client.outcomes.iter().any(|outcome| matches!(
        outcome,
        BatchOutcome::Updated(update) if update.applied == vec![kept.id]
    )));
    assert!(client
        .outcomes
        .contains(&BatchOutcome::Deleted(vec![gone.id])));

    Ok(())
}

#[test]
fn duplicate_response_changes_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let mut client = TestClient::new()?;
    let todo = client.create("Buy milk", Priority::Low)?;
    client.edit(todo.id, TodoPatch::priority(Priority::High))?;

    client.advance(1_000)?;
    let request = client.network.sent()[0].request.clone();
    client.settle()?;
    let settled = client.engine.store().get(todo.id).cloned();

    // The server answers the same request a second time
    let replay = client.network.backend_mut().batch_update(&request)?;

    assert!(client.engine.complete_update_batch(Ok(replay)).is_none());
    assert_eq!(client.engine.store().get(todo.id).cloned(), settled);
    assert_eq!(client.engine.update_status(), RequestStatus::Idle);

    Ok(())
}

// ============================================================================
// Deletion
// ============================================================================

#[test]
fn delete_hides_todo_and_discards_its_edit() -> Result<(), Box<dyn std::error::Error>> {
    let mut client = TestClient::new()?;
    let todo = client.create("Buy milk", Priority::Low)?;
    let other = client.create("Walk dog", Priority::Low)?;

    client.edit(todo.id, TodoPatch::completed(true))?;
    client.delete(todo.id)?;

    assert!(client.view(todo.id).is_none());
    assert!(client.engine.pending_change(todo.id).is_none());
    assert!(client.engine.is_pending_deletion(todo.id));
    assert_eq!(client.engine.views().len(), 1);
    assert_eq!(client.engine.views()[0].todo.id, other.id);

    client.settle()?;
    assert!(client.network.sent_of(BatchKind::Update).is_empty());
    let deletes = client.network.sent_of(BatchKind::Delete);
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].request.ids, vec![todo.id]);
    assert!(client.server_todo(todo.id)?.is_none());
    assert!(!client.engine.is_pending_deletion(todo.id));

    Ok(())
}

#[test]
fn edit_after_delete_is_dropped() -> Result<(), Box<dyn std::error::Error>> {
    let mut client = TestClient::new()?;
    let todo = client.create("Buy milk", Priority::Low)?;
    client.delete(todo.id)?;

    let err = client
        .edit(todo.id, TodoPatch::completed(true))
        .expect_err("edit of deleted todo must fail");
    assert!(matches!(err, EngineError::PendingDeletion(id) if id == todo.id));
    assert!(client.engine.pending_change(todo.id).is_none());

    client.settle()?;
    assert!(client.network.sent_of(BatchKind::Update).is_empty());

    Ok(())
}

#[test]
fn delete_during_update_flight_wins() -> Result<(), Box<dyn std::error::Error>> {
    let mut client = TestClient::new()?;
    let todo = client.create("Buy milk", Priority::Low)?;

    client.edit(todo.id, TodoPatch::completed(true))?;
    client.advance(1_000)?;
    client.advance(100)?;
    client.delete(todo.id)?;
    client.advance(200)?;

    // The update response must not resurrect the deleted record
    assert!(client.view(todo.id).is_none());
    assert!(!client.engine.store().contains(todo.id));

    client.settle()?;
    assert!(client.server_todo(todo.id)?.is_none());
    assert!(client.engine.views().is_empty());

    Ok(())
}

#[test]
fn deletions_are_batched_together() -> Result<(), Box<dyn std::error::Error>> {
    let mut client = TestClient::new()?;
    let a = client.create("a", Priority::Low)?;
    let b = client.create("b", Priority::Low)?;

    client.delete(a.id)?;
    client.advance(500)?;
    client.delete(b.id)?;
    client.settle()?;

    let deletes = client.network.sent_of(BatchKind::Delete);
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].request.ids.len(), 2);
    assert_eq!(client.server().count()?, 0);

    Ok(())
}

// ============================================================================
// Failure and retry
// ============================================================================

#[test]
fn failed_update_keeps_edits_until_retry() -> Result<(), Box<dyn std::error::Error>> {
    let mut client = TestClient::new()?;
    let todo = client.create("Buy milk", Priority::Low)?;
    client.fail_next(BackendError::Network("connection reset".into()));

    client.edit(todo.id, TodoPatch::completed(true))?;
    client.settle()?;

    assert_eq!(client.engine.update_status(), RequestStatus::Failed);
    assert_eq!(
        client.engine.pending_change(todo.id).ok_or("edit lost")?.fields,
        TodoPatch::completed(true)
    );
    assert!(client.view(todo.id).ok_or("missing")?.is_pending);
    assert!(!client.server_todo(todo.id)?.ok_or("missing")?.completed);

    // No automatic retry
    client.advance(10_000)?;
    assert_eq!(client.network.sent().len(), 1);

    assert_eq!(client.retry()?, 1);
    assert_eq!(client.engine.update_status(), RequestStatus::Loading);
    client.settle()?;

    assert_eq!(client.engine.update_status(), RequestStatus::Idle);
    assert!(client.engine.pending_change(todo.id).is_none());
    assert!(client.server_todo(todo.id)?.ok_or("missing")?.completed);

    Ok(())
}

#[test]
fn failed_delete_keeps_todo_hidden() -> Result<(), Box<dyn std::error::Error>> {
    let mut client = TestClient::new()?;
    let todo = client.create("Buy milk", Priority::Low)?;
    client.fail_next(BackendError::Network("offline".into()));

    client.delete(todo.id)?;
    client.settle()?;

    assert_eq!(client.engine.delete_status(), RequestStatus::Failed);
    assert!(client.engine.is_pending_deletion(todo.id));
    assert!(client.view(todo.id).is_none());
    assert!(client.server_todo(todo.id)?.is_some());

    assert_eq!(client.retry()?, 1);
    client.settle()?;
    assert_eq!(client.engine.delete_status(), RequestStatus::Idle);
    assert!(client.server_todo(todo.id)?.is_none());

    Ok(())
}

#[test]
fn stale_id_fails_batch_and_is_recoverable() -> Result<(), Box<dyn std::error::Error>> {
    let mut client = TestClient::new()?;
    let gone = client.create("Removed elsewhere", Priority::Low)?;
    let kept = client.create("Still here", Priority::Low)?;
    client.network.backend_mut().delete_todo(gone.id)?;

    client.edit(gone.id, TodoPatch::completed(true))?;
    client.edit(kept.id, TodoPatch::completed(true))?;
    client.settle()?;

    // The returned record is confirmed; the stale one keeps its edit
    assert!(client.engine.pending_change(kept.id).is_none());
    assert!(client.server_todo(kept.id)?.ok_or("missing")?.completed);
    assert!(client.engine.pending_change(gone.id).is_some());
    assert_eq!(client.engine.update_status(), RequestStatus::Failed);
    assert!(client.engine.last_error().is_some());

    // Retry re-sends the stale edit and fails the same way
    assert_eq!(client.retry()?, 1);
    client.settle()?;
    assert_eq!(client.engine.update_status(), RequestStatus::Failed);

    // Deleting it leaves nothing to retry
    client.delete(gone.id)?;
    assert_eq!(client.retry()?, 0);
    assert_eq!(client.engine.update_status(), RequestStatus::Idle);
    client.settle()?;

    assert_eq!(client.engine.delete_status(), RequestStatus::Idle);
    assert!(client.engine.overlay().changes().next().is_none());
    assert!(!client.engine.is_pending_deletion(gone.id));

    Ok(())
}
