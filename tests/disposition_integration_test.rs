/*!
 * Integration tests for end-to-end disposition of one unit of work
 *
 * Each test drives `ProcessingSupervisor::execute` against scripted
 * collaborators and checks the observable effects: the outcome message,
 * the artifact at the output location and the lifecycle event trail.
 */

use std::sync::Arc;
use std::time::Duration;

use cdr_observability::{EventKind, EventPayload, FailingSink};
use cdr_worker::core::{
    Disposition, EscalationVerdict, HeaderSet, PolicyAction, ProcessingSupervisor,
    CONTENT_TYPE_HEADER,
};
use cdr_worker::testing::{work_item, Harness, ScriptedAuthority, ScriptedEngine};
use cdr_worker::WorkItem;

fn replace_verdict(bytes: &[u8], mime: &str) -> EscalationVerdict {
    EscalationVerdict::Replace {
        payload: bytes.to_vec(),
        mime_type: Some(mime.to_string()),
    }
}

/// Run one item and return the single outcome message's fields
async fn execute(harness: &Harness, item: &WorkItem) -> (Disposition, HeaderSet) {
    harness.supervisor().execute(item.clone()).await;
    let outcomes = harness.channel.outcomes();
    assert_eq!(outcomes.len(), 1, "exactly one outcome message expected");
    assert_eq!(outcomes[0].file_id, item.file_id);
    assert_eq!(outcomes[0].reply_to, item.reply_to);
    (outcomes[0].outcome, outcomes[0].headers.clone())
}

#[tokio::test(start_paused = true)]
async fn test_exactly_one_terminal_call_on_every_path() {
    let scenarios: Vec<(&str, ScriptedEngine, bool)> = vec![
        ("rebuilt", ScriptedEngine::new(), true),
        ("refused", ScriptedEngine::new().refuses(), true),
        ("unknown", ScriptedEngine::new().file_type("Unknown"), true),
        ("archive", ScriptedEngine::new().file_type("Zip"), true),
        ("missing input", ScriptedEngine::new(), false),
        ("detect error", ScriptedEngine::new().detect_error("boom"), true),
        (
            "deadline",
            ScriptedEngine::new().rebuild_delay(Duration::from_secs(600)),
            true,
        ),
        ("panic", ScriptedEngine::new().panic_on_rebuild(), true),
    ];

    for (name, engine, with_input) in scenarios {
        let harness = Harness::with_engine(engine);
        let mut item = work_item("F1");
        item.deadline = Duration::from_secs(10);
        if with_input {
            harness.storage.add_file(&item.input_path, b"original");
        }

        harness.supervisor().execute(item).await;

        assert_eq!(
            harness.channel.terminal_calls(),
            1,
            "scenario '{}' must end in exactly one terminal call",
            name
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_deadline_leaves_no_output_without_report() {
    let harness =
        Harness::with_engine(ScriptedEngine::new().rebuild_delay(Duration::from_secs(600)));
    let mut item = work_item("F1");
    item.deadline = Duration::from_secs(5);
    harness.storage.add_file(&item.input_path, b"original");

    let (disposition, headers) = execute(&harness, &item).await;

    assert_eq!(disposition, Disposition::Failed);
    assert!(headers.is_empty());
    assert_eq!(harness.storage.get_data(&item.output_path), None);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_writes_report_when_requested() {
    let harness =
        Harness::with_engine(ScriptedEngine::new().rebuild_delay(Duration::from_secs(600)));
    let mut item = work_item("F1");
    item.deadline = Duration::from_secs(5);
    item.generate_report = true;
    harness.storage.add_file(&item.input_path, b"original");

    let (disposition, _) = execute(&harness, &item).await;

    assert_eq!(disposition, Disposition::Failed);
    assert_eq!(
        harness.storage.get_data(&item.output_path),
        Some(harness.report_bytes())
    );
}

#[tokio::test(start_paused = true)]
async fn test_late_pipeline_write_cannot_outlive_cleanup() {
    // The rebuilt artifact is still being written when the deadline fires,
    // and lands within the sealing grace
    let harness = Harness::with_engine(ScriptedEngine::new().rebuilds_to(b"rebuilt"));
    harness.storage.set_write_delay(Duration::from_millis(5500));
    let mut item = work_item("F1");
    item.deadline = Duration::from_secs(5);
    harness.storage.add_file(&item.input_path, b"original");

    let (disposition, _) = execute(&harness, &item).await;

    assert_eq!(disposition, Disposition::Failed);
    assert_eq!(harness.storage.get_data(&item.output_path), None);
    assert_eq!(harness.storage.writes(), vec![item.output_path.clone()]);
    assert_eq!(harness.storage.removals(), vec![item.output_path.clone()]);

    // Nothing lands after the outcome, even once the clock runs on
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(harness.storage.get_data(&item.output_path), None);
    assert_eq!(harness.storage.writes().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stuck_output_write_does_not_hold_back_outcome() {
    let harness = Harness::with_engine(ScriptedEngine::new().rebuilds_to(b"rebuilt"));
    harness.storage.set_write_delay(Duration::from_secs(3600));
    let mut item = work_item("F1");
    item.deadline = Duration::from_secs(5);
    harness.storage.add_file(&item.input_path, b"original");

    let started = tokio::time::Instant::now();
    harness.supervisor().execute(item.clone()).await;
    let elapsed = started.elapsed();

    // Deadline plus abort and sealing grace
    assert!(
        elapsed <= Duration::from_secs(8),
        "outcome published {:?} after start",
        elapsed
    );
    let outcomes = harness.channel.outcomes();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].outcome, Disposition::Failed);
    assert_eq!(harness.channel.terminal_calls(), 1);
}

#[tokio::test]
async fn test_unknown_with_block_fails_without_authority() {
    let harness = Harness::with_engine(ScriptedEngine::new().file_type("Unknown"));
    let mut item = work_item("F1");
    item.escalation.unmanaged = PolicyAction::Block;
    harness.storage.add_file(&item.input_path, b"\x00\x01\x02");

    let (disposition, _) = execute(&harness, &item).await;

    assert_eq!(disposition, Disposition::Failed);
    assert_eq!(harness.authority.calls(), 0);
    assert_eq!(
        harness.events.kinds(),
        vec![
            EventKind::NewDocument,
            EventKind::FileTypeDetected,
            EventKind::UnmanagedAction,
        ]
    );
}

#[tokio::test]
async fn test_unknown_with_refer_and_relay_verdict_is_unmodified() {
    let harness = Harness::from_parts(
        ScriptedEngine::new().file_type("Unknown"),
        ScriptedAuthority::verdict(EscalationVerdict::Relay),
    );
    let mut item = work_item("F1");
    item.escalation.unmanaged = PolicyAction::Refer;
    harness.storage.add_file(&item.input_path, b"\x00\x01\x02");

    let (disposition, headers) = execute(&harness, &item).await;

    assert_eq!(disposition, Disposition::Unmodified);
    assert!(headers.is_empty());
    assert_eq!(harness.authority.calls(), 1);
    assert_eq!(harness.events.events_of(EventKind::EscalationStarted).len(), 1);
    assert_eq!(
        harness.events.events_of(EventKind::EscalationCompleted).len(),
        1
    );
    assert_eq!(
        harness.events.events_of(EventKind::UnmanagedAction)[0].payload,
        EventPayload::UnmanagedAction {
            action: "unmodified".to_string()
        }
    );
    assert_eq!(harness.storage.get_data(&item.output_path), None);
}

#[tokio::test]
async fn test_refused_rebuild_with_refer_and_replace_verdict() {
    for engine in [
        ScriptedEngine::new().refuses(),
        ScriptedEngine::new().rebuilds_to(b""),
    ] {
        let harness = Harness::from_parts(
            engine,
            ScriptedAuthority::verdict(replace_verdict(b"authority bytes", "application/pdf")),
        );
        let mut item = work_item("F1");
        item.escalation.blocked = PolicyAction::Refer;
        harness.storage.add_file(&item.input_path, b"original");

        let (disposition, headers) = execute(&harness, &item).await;

        assert_eq!(disposition, Disposition::Replaced);
        assert_eq!(
            harness.storage.get_data(&item.output_path),
            Some(b"authority bytes".to_vec())
        );
        assert_eq!(headers.get(CONTENT_TYPE_HEADER), Some("application/pdf"));
        assert_eq!(headers.len(), 1);
    }
}

#[tokio::test]
async fn test_identical_inputs_give_identical_results() {
    let run = || async {
        let harness = Harness::from_parts(
            ScriptedEngine::new().refuses(),
            ScriptedAuthority::verdict(replace_verdict(b"substitute", "text/plain")),
        );
        let mut item = work_item("F1");
        item.escalation.blocked = PolicyAction::Refer;
        harness.storage.add_file(&item.input_path, b"original");

        let (disposition, headers) = execute(&harness, &item).await;
        (disposition, headers, harness.events.kinds())
    };

    let first = run().await;
    let second = run().await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_blocked_document_replaced_by_report() {
    let harness = Harness::with_engine(
        ScriptedEngine::new()
            .file_type("Doc")
            .analysis("report-A")
            .rebuilds_to(b""),
    );
    let mut item = work_item("F1");
    item.escalation.blocked = PolicyAction::Block;
    item.generate_report = true;
    harness.storage.add_file(&item.input_path, b"original");

    let (disposition, _) = execute(&harness, &item).await;

    assert_eq!(disposition, Disposition::Replaced);
    assert_eq!(
        harness.events.kinds(),
        vec![
            EventKind::NewDocument,
            EventKind::FileTypeDetected,
            EventKind::AnalysisCompleted,
            EventKind::RebuildStarted,
            EventKind::BlockedAction,
            EventKind::RebuildCompleted,
        ]
    );
    assert_eq!(
        harness.events.events_of(EventKind::AnalysisCompleted)[0].payload,
        EventPayload::AnalysisCompleted {
            report: "report-A".to_string()
        }
    );
    assert_eq!(
        harness.storage.get_data(&item.output_path),
        Some(harness.report_bytes())
    );
    harness.events.assert_sequence_monotonic();
}

#[tokio::test]
async fn test_block_asymmetry_between_modes() {
    // Unknown file, static block: Failed
    let unmanaged = Harness::with_engine(ScriptedEngine::new().file_type("Unknown"));
    let mut item = work_item("F1");
    item.generate_report = true;
    unmanaged.storage.add_file(&item.input_path, b"???");
    let (disposition, _) = execute(&unmanaged, &item).await;
    assert_eq!(disposition, Disposition::Failed);

    // Refused rebuild, static block: Replaced by the report
    let blocked = Harness::with_engine(ScriptedEngine::new().refuses());
    blocked.storage.add_file(&item.input_path, b"doc");
    let (disposition, _) = execute(&blocked, &item).await;
    assert_eq!(disposition, Disposition::Replaced);
}

#[tokio::test]
async fn test_archive_is_delegated() {
    let harness = Harness::with_engine(ScriptedEngine::new().file_type("Zip"));
    let item = work_item("F1");
    harness.storage.add_file(&item.input_path, b"PK\x03\x04");

    harness.supervisor().execute(item.clone()).await;

    assert!(harness.channel.outcomes().is_empty());
    let requests = harness.channel.archive_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].file_id, "F1");
    assert_eq!(requests[0].file_type, "Zip");
    assert_eq!(requests[0].source_location, item.input_path);
    assert_eq!(requests[0].rebuilt_location, item.output_path);

    assert_eq!(
        harness.events.kinds(),
        vec![
            EventKind::NewDocument,
            EventKind::FileTypeDetected,
            EventKind::ArchiveDetected,
        ]
    );
    assert!(!harness.engine.calls().contains(&"analyse"));
    assert!(!harness.engine.calls().contains(&"rebuild"));
}

#[tokio::test]
async fn test_event_sink_failure_does_not_change_outcome() {
    let harness = Harness::new();
    let item = work_item("F1");
    harness.storage.add_file(&item.input_path, b"original");

    let mut collaborators = harness.collaborators.clone();
    collaborators.events = Arc::new(FailingSink);
    ProcessingSupervisor::new(collaborators)
        .execute(item.clone())
        .await;

    let outcomes = harness.channel.outcomes();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].outcome, Disposition::Replaced);
    assert_eq!(
        harness.storage.get_data(&item.output_path),
        Some(b"rebuilt".to_vec())
    );
}

#[tokio::test]
async fn test_missing_authority_blocks() {
    let harness = Harness::with_engine(ScriptedEngine::new().file_type("Unknown"));
    let mut item = work_item("F1");
    item.escalation.unmanaged = PolicyAction::Refer;
    harness.storage.add_file(&item.input_path, b"???");

    let mut collaborators = harness.collaborators.clone();
    collaborators.authority = None;
    ProcessingSupervisor::new(collaborators)
        .execute(item.clone())
        .await;

    assert_eq!(harness.channel.outcomes()[0].outcome, Disposition::Failed);
    assert_eq!(
        harness.events.events_of(EventKind::EscalationCompleted)[0].payload,
        EventPayload::EscalationCompleted {
            decision: "block".to_string()
        }
    );
}
