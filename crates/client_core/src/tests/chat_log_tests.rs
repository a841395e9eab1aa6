use super::*;

fn headers(log: &ChatLog) -> Vec<bool> {
    log.iter().map(|entry| entry.show_sender_header).collect()
}

#[test]
fn length_tracks_every_append_including_duplicates() {
    let mut log = ChatLog::new();
    assert!(log.is_empty());
    for _ in 0..5 {
        log.append("bob", "same text", true);
    }
    log.append("alice", "same text", false);
    assert_eq!(log.len(), 6);
    assert!(log.iter().all(|entry| entry.content == "same text"));
}

#[test]
fn local_entries_always_show_header() {
    let mut log = ChatLog::new();
    log.append("alice", "one", false);
    log.append("alice", "two", false);
    log.append("alice", "three", false);
    assert_eq!(headers(&log), vec![true, true, true]);
    assert!(log.iter().all(|entry| entry.origin == Origin::Local));
}

#[test]
fn consecutive_remote_entries_from_same_sender_are_grouped() {
    let mut log = ChatLog::new();
    let first = log.append("bob", "hello", true).clone();
    assert!(first.show_sender_header);
    assert_eq!(first.origin, Origin::Remote);

    assert!(!log.append("bob", "again", true).show_sender_header);
    assert!(log.append("carol", "hey", true).show_sender_header);
    assert!(!log.append("carol", "hey again", true).show_sender_header);
}

#[test]
fn remote_comparison_looks_at_most_recent_entry_of_any_origin() {
    let mut log = ChatLog::new();
    log.append("User A", "Hello world", true);
    log.append("User B", "This is my first app", false);
    log.append("User A", "No worries!", true);
    log.append("User A", "Talk to you later", true);
    log.append("User B", "L8", false);
    assert_eq!(headers(&log), vec![true, true, true, false, true]);
}

#[test]
fn remote_after_local_from_same_name_hides_header() {
    let mut log = ChatLog::new();
    log.append("alice", "local", false);
    assert!(!log.append("alice", "remote twin", true).show_sender_header);
}

#[test]
fn past_entries_are_not_touched_by_later_appends() {
    let mut log = ChatLog::new();
    log.append("bob", "first", true);
    let before = log.entries()[0].clone();
    log.append("bob", "second", true);
    log.append("alice", "third", false);
    assert_eq!(log.entries()[0], before);
    assert_eq!(log.last().map(|entry| entry.content.as_str()), Some("third"));
}

#[test]
fn preserves_receipt_order() {
    let mut log = ChatLog::new();
    for content in ["c", "a", "b"] {
        log.append("bob", content, true);
    }
    let contents: Vec<&str> = (&log).into_iter().map(|e| e.content.as_str()).collect();
    assert_eq!(contents, vec!["c", "a", "b"]);
}

#[test]
fn clones_share_entries_until_the_next_append() {
    let mut log = ChatLog::new();
    log.append("bob", "first", true);
    let snapshot = log.clone();
    assert!(std::ptr::eq(
        log.entries().as_ptr(),
        snapshot.entries().as_ptr()
    ));

    log.append("bob", "second", true);
    assert_eq!(snapshot.len(), 1);
    assert_eq!(log.len(), 2);
    assert_eq!(log.entries()[0], snapshot.entries()[0]);
}
