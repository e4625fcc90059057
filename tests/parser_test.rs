//! Parser acceptance tests - exact fixtures from operational output

use fleet_monitor::{classify_activity, parse_inbox, parse_merge_queue, parse_status};

#[test]
fn merge_queue_row_fixture() {
    let items = parse_merge_queue("e5-pmc7   1202.8 P2  (none)  crew/Emma5   ready   2h");

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, "e5-pmc7");
    assert_eq!(items[0].branch.as_deref(), Some("crew/Emma5"));
    assert_eq!(items[0].title.as_deref(), Some("ready"));
}

#[test]
fn tool_invocation_argument_truncation() {
    let args: String = "a".repeat(90);
    let result = classify_activity(&format!("⏺ Search({})", args));

    let rendered = result.activity.strip_prefix("Search: ").unwrap();
    // Exactly 50 characters of argument plus the 3-character ellipsis
    assert_eq!(rendered.len(), 53);
    assert!(rendered.ends_with("..."));
    assert_eq!(&rendered[..50], "a".repeat(50));
    assert_eq!(result.tool.as_deref(), Some("Search"));
}

#[test]
fn empty_scrollback_is_no_output() {
    let result = classify_activity("");
    assert_eq!(result.activity, "No output");
    assert!(result.duration.is_none());
    assert!(result.tool.is_none());
}

#[test]
fn prompt_with_trailing_content_is_waiting() {
    let buffer = "Done.\nAll tests pass.\nReady for next task.\n❯ ";
    assert_eq!(
        classify_activity(buffer).activity,
        "Waiting: Done. All tests pass. Ready for next task."
    );
}

#[test]
fn unread_and_table_mail_lines() {
    let mailbox = parse_inbox("[unread] mayor: Budget review", "overseer");
    assert_eq!(mailbox.messages.len(), 1);
    assert_eq!(mailbox.messages[0].from, "mayor");
    assert!(!mailbox.messages[0].read);
    assert_eq!(mailbox.unread_count, 1);

    let mailbox = parse_inbox("abc123 | deacon | Status update | 2025-01-01", "overseer");
    assert_eq!(mailbox.messages.len(), 1);
    assert!(mailbox.messages[0].read);
    assert_eq!(mailbox.unread_count, 0);
}

#[test]
fn both_status_shapes_are_accepted_transparently() {
    let flat = parse_status(r#"{"name": "fleet-a", "agents": [{"name": "coordinator"}]}"#);
    let nested = parse_status(
        r#"{"name": "fleet-a", "rigs": [{"name": "rig-1", "agents": [{"name": "coordinator"}]}]}"#,
    );

    assert_eq!(flat.agents.len(), 1);
    assert_eq!(nested.agents.len(), 1);
    assert_eq!(flat.agents[0], nested.agents[0]);
    assert_eq!(nested.rigs, vec!["rig-1"]);
}
