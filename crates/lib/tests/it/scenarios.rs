//! End-to-end scenarios exercising the notification graph, tracking, collections,
//! path observation, and the stream algebra together.

use std::sync::{Arc, Mutex};

use futures::StreamExt;
use telltale::collection::TrackedKeyedList;
use telltale::constants::IS_CHANGED;
use telltale::model::Value;
use telltale::stream::{BehaviorSubject, combine_latest};
use telltale::{Model, ObservableList, create_observable, path};

use crate::helpers::{Person, person, record, record_raises};

// S1 — writing a property raises `is_changed`, the property, then its dependents;
// rejecting restores and raises the same shape.
#[test]
fn dependency_fanout_orders_is_changed_first() {
    let p = person("M", 36);
    let q = person("Q", 19);
    let (seen, _sub) = record_raises(&p);

    p.set("mother", q).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![IS_CHANGED, "mother", "mother_age"]);

    seen.lock().unwrap().clear();
    p.reject_changes().unwrap();
    let seen = seen.lock().unwrap();
    assert_eq!(seen.first().map(String::as_str), Some(IS_CHANGED));
    assert!(seen.ends_with(&["mother".to_string(), "mother_age".to_string()]));
    assert_eq!(p.get("mother").unwrap(), Value::Null);
}

// S2 — a deferral scope delivers nothing inside and exactly one coalesced
// notification on exit.
#[test]
fn deferred_batch_delivers_once() {
    let p = create_observable::<Person>().unwrap();
    let counter = Arc::new(Mutex::new(0usize));
    let counter_clone = counter.clone();
    let _sub = p.on_property_changed(move |_| {
        *counter_clone.lock().unwrap() += 1;
    });

    {
        let _scope = p.defer_property_changes().unwrap();
        p.set("name", "A").unwrap();
        p.set("name", "B").unwrap();
        p.set("name", "C").unwrap();
        assert_eq!(*counter.lock().unwrap(), 0);
    }
    assert_eq!(*counter.lock().unwrap(), 1);
}

// S3 — nested accept/reject composition through a tracked child.
#[test]
fn nested_tracking_composes_through_children() {
    let p = person("M", 36);

    p.set("age", 37i64).unwrap();
    assert!(p.is_changed());
    assert_eq!(p.get_original("age").unwrap(), Value::Int(36));

    p.reject_changes().unwrap();
    assert!(!p.is_changed());
    assert_eq!(p.get_int("age").unwrap(), 36);

    let mother = person("N", 58);
    p.set("mother", mother.clone()).unwrap();
    p.accept_changes().unwrap();
    assert!(!p.is_changed());
    assert!(!mother.is_changed());

    mother.set("age", 60i64).unwrap();
    assert!(p.is_changed());
    assert!(mother.is_changed());

    mother.set_original_value("age", 60i64).unwrap();
    assert!(!p.is_changed());
}

// S4 — persisted sort over a thousand adds stays sorted and stable.
#[test]
fn persisted_sort_is_stable_across_a_thousand_adds() {
    let list: ObservableList<i64> = ObservableList::new();
    list.sort_by_key(|x| x % 2 == 0, true);

    for age in 0..1000 {
        list.add(age);
    }

    let mut expected: Vec<i64> = (0..1000).filter(|x| x % 2 == 1).collect();
    expected.extend((0..1000).filter(|x| x % 2 == 0));
    assert_eq!(list.items(), expected);
}

// S5 — the keyed tracked collection's change summary across item edits, removals,
// re-additions, and a write back to the baseline value.
#[test]
fn keyed_tracked_change_summary() {
    let list: TrackedKeyedList<i64, Model> =
        TrackedKeyedList::new(|item: &Model| item.get_int("key").unwrap_or_default());

    list.begin_init();
    list.add(record(1, Some("a"))).unwrap();
    list.add(record(2, None)).unwrap();
    list.end_init().unwrap();
    assert!(!list.is_changed());

    let item1 = list.try_get(&1).unwrap();
    item1.set("value", "b").unwrap();
    assert!(list.is_changed());
    assert!(list.is_value_changed(&1));

    list.remove_key(&1);
    assert!(list.is_changed());

    list.add(record(1, Some("c"))).unwrap();
    assert!(list.is_changed());

    let replacement = list.try_get(&1).unwrap();
    replacement.set("value", "a").unwrap();
    assert!(!list.is_changed());
}

// S6 — path observation dedupes equal values, and a subscriber added inside an
// emission does not observe the in-flight value.
#[test]
fn path_observation_dedupes_and_isolates_late_subscribers() {
    let dog = person("Rex", 3);
    let observer = path::observe(&dog, "name").unwrap();

    let emissions = Arc::new(Mutex::new(Vec::new()));
    let late_emissions: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));

    let observer_clone = observer.clone();
    let emissions_clone = emissions.clone();
    let late_clone = late_emissions.clone();
    let _sub = observer.subscribe(move |value| {
        emissions_clone.lock().unwrap().push(value.clone());
        let late_inner = late_clone.clone();
        observer_clone
            .subscribe(move |value| {
                late_inner.lock().unwrap().push(value.clone());
            })
            .detach();
    });

    dog.set("name", "Bello").unwrap();
    dog.set("name", "Bello").unwrap();

    assert_eq!(emissions.lock().unwrap().len(), 1);
    assert!(late_emissions.lock().unwrap().is_empty());

    dog.set("name", "Luna").unwrap();
    assert_eq!(emissions.lock().unwrap().len(), 2);
    // Every subscriber registered during the first emission sees the later write.
    assert!(late_emissions
        .lock()
        .unwrap()
        .iter()
        .all(|value| *value == "Luna"));
    assert!(!late_emissions.lock().unwrap().is_empty());
}

// S7 — combine-latest over behavior subjects delivers the combined current values
// immediately, then tracks both sides.
#[tokio::test]
async fn combine_latest_starts_from_current_values() {
    let s1 = BehaviorSubject::new(1);
    let s2 = BehaviorSubject::new(2);
    let mut sums = Box::pin(combine_latest(s1.subscribe(), s2.subscribe(), |a, b| a + b));

    assert_eq!(sums.next().await, Some(3));
    s1.on_next(2);
    assert_eq!(sums.next().await, Some(4));
    s2.on_next(4);
    assert_eq!(sums.next().await, Some(6));
}
