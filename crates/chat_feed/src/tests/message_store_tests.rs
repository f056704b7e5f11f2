use std::collections::BTreeSet;

use proptest::prelude::*;
use shared::domain::ProfileId;

use super::*;
use crate::test_support::{at, ids, message, me, other};

#[test]
fn append_older_page_extends_tail_in_descending_order() {
    let mut store = MessageStore::new();
    assert_eq!(
        store.append_older_page(vec![message(10, me()), message(9, other())]),
        2
    );
    assert_eq!(
        store.append_older_page(vec![message(8, me()), message(7, other())]),
        2
    );
    assert_eq!(ids(store.messages()), vec![10, 9, 8, 7]);
    assert_eq!(store.newest().map(|m| m.id), Some(MessageId(10)));
    assert_eq!(store.oldest().map(|m| m.id), Some(MessageId(7)));
}

#[test]
fn append_older_page_drops_ids_already_present() {
    let mut store = MessageStore::new();
    store.append_older_page(vec![message(10, me()), message(9, other())]);

    let inserted = store.append_older_page(vec![
        message(9, other()),
        message(8, me()),
        message(8, me()),
    ]);

    assert_eq!(inserted, 1);
    assert_eq!(ids(store.messages()), vec![10, 9, 8]);
}

#[test]
fn overlapping_page_is_inserted_positionally() {
    let mut store = MessageStore::new();
    store.append_older_page(vec![message(10, me()), message(6, other())]);

    store.append_older_page(vec![message(8, me()), message(5, other())]);

    assert_eq!(ids(store.messages()), vec![10, 8, 6, 5]);
}

#[test]
fn live_messages_are_deduplicated_and_placed_by_id() {
    let mut store = MessageStore::new();
    store.append_older_page(vec![message(10, me()), message(8, other())]);

    assert!(store.merge_live_message(message(12, other())));
    assert!(store.merge_live_message(message(9, other())));
    assert!(!store.merge_live_message(message(12, other())));

    assert_eq!(ids(store.messages()), vec![12, 10, 9, 8]);
}

#[test]
fn live_and_page_merges_commute() {
    let mut live_first = MessageStore::new();
    live_first.merge_live_message(message(20, other()));
    live_first.append_older_page(vec![message(20, other()), message(19, me())]);

    let mut page_first = MessageStore::new();
    page_first.append_older_page(vec![message(20, other()), message(19, me())]);
    page_first.merge_live_message(message(20, other()));

    assert_eq!(ids(live_first.messages()), ids(page_first.messages()));
    assert_eq!(ids(live_first.messages()), vec![20, 19]);
}

#[test]
fn mark_read_sets_read_at_once() {
    let mut store = MessageStore::new();
    store.append_older_page(vec![message(3, other())]);

    assert!(store.mark_read(MessageId(3), at(100)));
    assert!(!store.mark_read(MessageId(3), at(200)));

    assert_eq!(
        store.get(MessageId(3)).and_then(|m| m.read_at),
        Some(at(100))
    );
}

#[test]
fn mark_read_of_unknown_message_is_a_no_op() {
    let mut store = MessageStore::new();
    store.append_older_page(vec![message(3, other())]);

    assert!(!store.mark_read(MessageId(4), at(100)));
    assert!(!store.contains(MessageId(4)));
    assert!(store.get(MessageId(3)).is_some_and(|m| m.read_at.is_none()));
}

#[derive(Debug, Clone)]
enum StoreOp {
    OlderPage(Vec<i64>),
    Live(i64),
}

fn sender_for(id: i64) -> ProfileId {
    if id % 3 == 0 {
        me()
    } else {
        other()
    }
}

fn store_op() -> impl Strategy<Value = StoreOp> {
    prop_oneof![
        prop::collection::vec(1i64..60, 0..8).prop_map(|mut page| {
            page.sort_unstable_by(|a, b| b.cmp(a));
            StoreOp::OlderPage(page)
        }),
        (1i64..60).prop_map(StoreOp::Live),
    ]
}

fn apply(ops: &[StoreOp]) -> MessageStore {
    let mut store = MessageStore::new();
    for op in ops {
        match op {
            StoreOp::OlderPage(page) => {
                store.append_older_page(
                    page.iter().map(|&id| message(id, sender_for(id))).collect(),
                );
            }
            StoreOp::Live(id) => {
                store.merge_live_message(message(*id, sender_for(*id)));
            }
        }
    }
    store
}

proptest! {
    #[test]
    fn any_merge_sequence_stays_unique_and_descending(
        ops in prop::collection::vec(store_op(), 0..16)
    ) {
        let store = apply(&ops);
        let stored = ids(store.messages());

        prop_assert!(stored.windows(2).all(|pair| pair[0] > pair[1]));

        let expected: BTreeSet<i64> = ops
            .iter()
            .flat_map(|op| match op {
                StoreOp::OlderPage(page) => page.clone(),
                StoreOp::Live(id) => vec![*id],
            })
            .collect();
        prop_assert_eq!(stored, expected.into_iter().rev().collect::<Vec<_>>());
    }

    #[test]
    fn merge_result_does_not_depend_on_arrival_order(
        (ops, shuffled) in prop::collection::vec(store_op(), 0..16)
            .prop_flat_map(|ops| (Just(ops.clone()), Just(ops).prop_shuffle()))
    ) {
        prop_assert_eq!(ids(apply(&ops).messages()), ids(apply(&shuffled).messages()));
    }
}
