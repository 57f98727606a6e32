use super::*;

use crate::net::types::UserRef;

fn message(id: MessageId, ts: i64, content: &str) -> Message {
    Message {
        id,
        room_id: 1,
        author: UserRef { id: 1, username: "ann".to_owned(), avatar: None },
        content: content.to_owned(),
        ts,
        reply_to: None,
        attachments: Vec::new(),
        edited: false,
    }
}

fn ids(window: &[Message]) -> Vec<MessageId> {
    window.iter().map(|m| m.id).collect()
}

#[test]
fn upsert_appends_new_and_replaces_existing() {
    let mut window = vec![message(1, 10, "a")];
    upsert(&mut window, message(2, 20, "b"));
    upsert(&mut window, message(1, 10, "a2"));
    assert_eq!(ids(&window), vec![1, 2]);
    assert_eq!(window[0].content, "a2");
}

#[test]
fn merge_keeps_live_copy_over_fetched_duplicate() {
    let mut window = vec![message(3, 30, "live")];
    merge_history(&mut window, vec![message(2, 20, "old"), message(3, 30, "fetched")], &BTreeSet::new());
    assert_eq!(ids(&window), vec![2, 3]);
    assert_eq!(window[1].content, "live");
}

#[test]
fn merge_skips_tombstoned_ids() {
    let mut window = Vec::new();
    let tombstones = BTreeSet::from([2]);
    merge_history(&mut window, vec![message(1, 10, "a"), message(2, 20, "b")], &tombstones);
    assert_eq!(ids(&window), vec![1]);
}

#[test]
fn merge_orders_by_timestamp_then_id() {
    let mut window = vec![message(9, 50, "live")];
    merge_history(&mut window, vec![message(5, 40, "x"), message(4, 40, "y"), message(1, 10, "z")], &BTreeSet::new());
    assert_eq!(ids(&window), vec![1, 4, 5, 9]);
}

#[test]
fn merge_converges_regardless_of_arrival_order() {
    let page = vec![message(1, 10, "a"), message(2, 20, "b")];
    let live = message(3, 30, "c");

    let mut page_first = Vec::new();
    merge_history(&mut page_first, page.clone(), &BTreeSet::new());
    upsert(&mut page_first, live.clone());

    let mut live_first = vec![live];
    merge_history(&mut live_first, page, &BTreeSet::new());

    assert_eq!(page_first, live_first);
}

#[test]
fn merge_drops_duplicates_within_a_page() {
    let mut window = Vec::new();
    merge_history(&mut window, vec![message(1, 10, "a"), message(1, 10, "a")], &BTreeSet::new());
    assert_eq!(ids(&window), vec![1]);
}

#[test]
fn replace_reports_missing_message() {
    let mut window = vec![message(1, 10, "a")];
    assert!(replace(&mut window, message(1, 10, "edited")));
    assert!(!replace(&mut window, message(7, 70, "ghost")));
    assert_eq!(window[0].content, "edited");
    assert_eq!(window.len(), 1);
}
