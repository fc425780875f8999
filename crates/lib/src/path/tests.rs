use std::sync::{Arc, Mutex};

use super::*;
use crate::model::{ModelType, SchemaBuilder, Value};
use crate::{create_observable, create_trackable};

struct Dog;

impl ModelType for Dog {
    const NAME: &'static str = "path_tests::Dog";

    fn declare(schema: &mut SchemaBuilder) {
        schema.property("name").trackable().default_value("");
        schema.property("owner").trackable();
    }
}

struct Owner;

impl ModelType for Owner {
    const NAME: &'static str = "path_tests::Owner";

    fn declare(schema: &mut SchemaBuilder) {
        schema.property("name").trackable().default_value("");
        schema.property("home").trackable();
    }
}

struct Home;

impl ModelType for Home {
    const NAME: &'static str = "path_tests::Home";

    fn declare(schema: &mut SchemaBuilder) {
        schema.property("city").trackable().default_value("");
    }
}

fn collect_values(observer: &PathObserver) -> (Arc<Mutex<Vec<Value>>>, crate::Subscription) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    let sub = observer.subscribe(move |value| {
        seen_clone.lock().unwrap().push(value.clone());
    });
    (seen, sub)
}

#[test]
fn paths_validate_their_shape() {
    assert!(PathBuf::parse("a.b.c").is_ok());
    assert_eq!(PathBuf::parse("").unwrap_err(), PathError::EmptyPath);
    assert_eq!(PathBuf::parse(".a").unwrap_err(), PathError::LeadingDot);
    assert_eq!(PathBuf::parse("a.").unwrap_err(), PathError::TrailingDot);
    assert_eq!(
        PathBuf::parse("a..b").unwrap_err(),
        PathError::EmptyComponent { position: 1 }
    );

    let path = PathBuf::parse("a.b").unwrap().push("c").unwrap();
    assert_eq!(path.as_str(), "a.b.c");
    assert_eq!(path.components().collect::<Vec<_>>(), vec!["a", "b", "c"]);
}

#[test]
fn cached_parses_are_shared() {
    let first = parse_cached("owner.home.city").unwrap();
    let second = parse_cached("owner.home.city").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn single_component_path_emits_deduplicated_values() {
    let dog = create_trackable::<Dog>().unwrap();
    let observer = observe(&dog, "name").unwrap();
    let (seen, _sub) = collect_values(&observer);

    dog.set("name", "Rex").unwrap();
    dog.set("name", "Rex").unwrap();
    dog.set("name", "Bello").unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], "Rex");
    assert_eq!(seen[1], "Bello");
}

#[test]
fn chain_rewires_when_an_intermediate_is_replaced() {
    let dog = create_observable::<Dog>().unwrap();
    let owner_a = create_observable::<Owner>().unwrap();
    let home_a = create_observable::<Home>().unwrap();
    home_a.set("city", "Berlin").unwrap();
    owner_a.set("home", home_a.clone()).unwrap();
    dog.set("owner", owner_a).unwrap();

    let observer = observe(&dog, "owner.home.city").unwrap();
    let (seen, _sub) = collect_values(&observer);
    assert_eq!(observer.value().unwrap(), "Berlin");

    // Change at the leaf.
    home_a.set("city", "Paris").unwrap();
    // Change at an intermediate node: the whole downstream chain rewires.
    let owner_b = create_observable::<Owner>().unwrap();
    let home_b = create_observable::<Home>().unwrap();
    home_b.set("city", "Rome").unwrap();
    owner_b.set("home", home_b.clone()).unwrap();
    dog.set("owner", owner_b).unwrap();

    // The old chain is detached: writes through it no longer emit.
    home_a.set("city", "Madrid").unwrap();
    // The new chain is live.
    home_b.set("city", "Oslo").unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.as_slice(), &[
        Value::Text("Paris".into()),
        Value::Text("Rome".into()),
        Value::Text("Oslo".into()),
    ]);
}

#[test]
fn null_intermediate_reads_as_null() {
    let dog = create_observable::<Dog>().unwrap();
    let observer = observe(&dog, "owner.home.city").unwrap();
    assert_eq!(observer.value().unwrap(), Value::Null);

    let (seen, _sub) = collect_values(&observer);
    let owner = create_observable::<Owner>().unwrap();
    let home = create_observable::<Home>().unwrap();
    home.set("city", "Berlin").unwrap();
    owner.set("home", home).unwrap();
    dog.set("owner", owner.clone()).unwrap();
    assert_eq!(seen.lock().unwrap().as_slice(), &[Value::Text(
        "Berlin".into()
    )]);

    // Tearing the intermediate down emits the null terminal once.
    dog.set("owner", Value::Null).unwrap();
    assert_eq!(seen.lock().unwrap().last(), Some(&Value::Null));
}

#[test]
fn unknown_steps_are_rejected_eagerly() {
    let dog = create_observable::<Dog>().unwrap();
    let err = observe(&dog, "pedigree").unwrap_err();
    assert!(err.is_not_found());

    let err = observe(&dog, "owner.kennel").unwrap_err();
    assert!(matches!(
        err,
        crate::Error::Path(PathError::MissingProperty { .. })
    ));
}

#[test]
fn chain_deactivates_with_the_last_subscriber() {
    let dog = create_observable::<Dog>().unwrap();
    let observer = observe(&dog, "name").unwrap();

    let (_seen, sub) = collect_values(&observer);
    assert_eq!(observer.subscriber_count(), 1);
    sub.unsubscribe();
    assert_eq!(observer.subscriber_count(), 0);

    // Re-activation works after a full teardown.
    let (seen, _sub) = collect_values(&observer);
    dog.set("name", "Rex").unwrap();
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn subscribing_during_emission_misses_the_inflight_value() {
    let dog = create_observable::<Dog>().unwrap();
    let observer = observe(&dog, "name").unwrap();

    let late_values: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let observer_clone = observer.clone();
    let late_values_clone = late_values.clone();
    let _sub = observer.subscribe(move |_| {
        let late_values_inner = late_values_clone.clone();
        observer_clone
            .subscribe(move |value| {
                late_values_inner.lock().unwrap().push(value.clone());
            })
            .detach();
    });

    dog.set("name", "Rex").unwrap();
    assert!(late_values.lock().unwrap().is_empty());

    dog.set("name", "Bello").unwrap();
    assert_eq!(late_values.lock().unwrap().len(), 1);
}

#[test]
fn reassigning_an_intermediate_to_itself_does_not_loop() {
    let dog = create_observable::<Dog>().unwrap();
    let owner = create_observable::<Owner>().unwrap();
    dog.set("owner", owner.clone()).unwrap();

    let observer = observe(&dog, "owner.name").unwrap();
    let writes = Arc::new(Mutex::new(0usize));

    let dog_clone = dog.clone();
    let owner_clone = owner.clone();
    let writes_clone = writes.clone();
    let _sub = observer.subscribe(move |_| {
        let mut writes = writes_clone.lock().unwrap();
        *writes += 1;
        assert!(*writes < 10, "path observer re-entered unboundedly");
        // A handler that puts the same intermediate back must not loop.
        dog_clone.set("owner", owner_clone.clone()).unwrap();
    });

    owner.set("name", "Ada").unwrap();
    assert_eq!(*writes.lock().unwrap(), 1);
}
