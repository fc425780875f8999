//! Universal invariants checked across longer mutation sequences.

use std::sync::{Arc, Mutex};

use telltale::collection::KeyedList;
use telltale::stream::{StreamError, Subject, first_value_or_cancel};
use telltale::{Error, ObservableList, path};
use tokio::sync::oneshot;

use crate::helpers::person;

#[test]
fn writes_back_to_baseline_leave_no_residue() {
    let p = person("M", 36);
    p.set("name", "X").unwrap();
    p.set("age", 99i64).unwrap();
    p.set("name", "M").unwrap();
    p.set("age", 36i64).unwrap();

    assert!(!p.is_changed());
    assert!(p.get_changes().unwrap().is_empty());
    assert!(p.original_equals(&p).unwrap());
}

#[test]
fn accept_then_reject_is_a_no_op() {
    let p = person("M", 36);
    p.set("age", 40i64).unwrap();
    p.accept_changes().unwrap();
    p.reject_changes().unwrap();

    assert!(!p.is_changed());
    assert_eq!(p.get_int("age").unwrap(), 40);
    assert_eq!(p.get_original("age").unwrap(), telltale::Value::Int(40));
}

#[test]
fn map_view_equals_mapped_source_after_any_mutation_sequence() {
    let source: ObservableList<i64> = ObservableList::from_items([5, 1, 4]);
    let view = source.map_view(|x| x * 3);

    source.add(9);
    source.insert(1, 2).unwrap();
    source.remove_at(0).unwrap();
    source.set(2, 8).unwrap();
    source.move_item(0, 3).unwrap();
    source.sort_by(|a, b| a.cmp(b), false);
    source.remove_all(|x| x % 2 == 0);
    source.reset([3, 1, 2]);
    source.add(0);

    let expected: Vec<i64> = source.items().iter().map(|x| x * 3).collect();
    assert_eq!(view.items(), expected);
}

#[test]
fn keyed_index_is_exact_in_every_reachable_state() {
    let list: KeyedList<i64, i64> = KeyedList::new(|x| *x);

    let check = |list: &KeyedList<i64, i64>| {
        let items = list.items();
        for (position, item) in items.iter().enumerate() {
            assert_eq!(list.index_of_key(&list.key_of(item)), Some(position));
        }
        let mut keys = list.keys();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), items.len(), "keys must stay unique");
    };

    list.add(3).unwrap();
    check(&list);
    list.add(1).unwrap();
    check(&list);
    list.insert(1, 2).unwrap();
    check(&list);
    list.remove_key(&3);
    check(&list);
    list.add_or_update(1).unwrap();
    check(&list);
    list.sort_by(|a, b| b.cmp(a), false);
    check(&list);
    list.reset([9, 8, 7]).unwrap();
    check(&list);
    list.clear();
    check(&list);
}

#[test]
fn path_observer_emissions_match_evaluation_at_emission_time() {
    let p = person("M", 36);
    let observer = path::observe(&p, "name").unwrap();

    let consistent = Arc::new(Mutex::new(true));
    let p_clone = p.clone();
    let consistent_clone = consistent.clone();
    let _sub = observer.subscribe(move |value| {
        let now = p_clone.get("name").unwrap();
        if *value != now {
            *consistent_clone.lock().unwrap() = false;
        }
    });

    p.set("name", "A").unwrap();
    p.set("name", "B").unwrap();
    p.set("name", "B").unwrap();
    p.set("name", "C").unwrap();

    assert!(*consistent.lock().unwrap());
}

#[tokio::test]
async fn first_value_cancellation_wins_when_no_value_arrived() {
    let subject: Subject<i64> = Subject::new();
    let stream = subject.subscribe();
    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();

    let waiter = tokio::spawn(first_value_or_cancel(stream, cancel_rx));
    cancel_tx.send(()).unwrap();

    let result = waiter.await.unwrap();
    assert!(matches!(
        result,
        Err(Error::Stream(StreamError::Cancelled))
    ));
}
