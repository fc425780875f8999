use std::sync::{Arc, Mutex};

use super::*;
use crate::constants::IS_CHANGED;
use crate::{create_observable, create_trackable};

struct Person;

impl ModelType for Person {
    const NAME: &'static str = "tests::Person";

    fn declare(schema: &mut SchemaBuilder) {
        schema.property("name").trackable().default_value("");
        schema.property("age").trackable().default_value(0i64);
        schema.property("mother").trackable();
        schema.property("mother_age").depends_on(&["mother"]);
        schema.property("nickname");
    }
}

struct Account;

impl ModelType for Account {
    const NAME: &'static str = "tests::Account";

    fn declare(schema: &mut SchemaBuilder) {
        schema.property("owner").trackable().reference_only();
        schema.property("balance").trackable().default_value(0i64);
        schema.property("ledger").trackable().read_only();
    }
}

struct SelfLoop;

impl ModelType for SelfLoop {
    const NAME: &'static str = "tests::SelfLoop";

    fn declare(schema: &mut SchemaBuilder) {
        schema.property("a").depends_on(&["b"]);
        schema.property("b").depends_on(&["a"]);
    }
}

/// A declaration block shared between types, the way interface-declared
/// properties (and their dependencies) compose into a concrete schema.
fn with_display_name(schema: &mut SchemaBuilder) {
    schema.property("display_name").depends_on(&["name"]);
}

struct Employee;

impl ModelType for Employee {
    const NAME: &'static str = "tests::Employee";

    fn declare(schema: &mut SchemaBuilder) {
        schema.property("name").trackable().default_value("");
        schema.extend(with_display_name);
        schema.property("salary").trackable().default_value(0i64);
    }
}

struct Reserved;

impl ModelType for Reserved {
    const NAME: &'static str = "tests::Reserved";

    fn declare(schema: &mut SchemaBuilder) {
        schema.property("is_changed");
    }
}

fn collect_raises(model: &Model) -> (Arc<Mutex<Vec<String>>>, crate::Subscription) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    let sub = model.on_property_changed(move |event| {
        seen_clone.lock().unwrap().push(event.property.clone());
    });
    (seen, sub)
}

#[test]
fn set_and_get_roundtrip() {
    let person = create_observable::<Person>().unwrap();
    person.set("name", "Ada").unwrap();
    person.set("age", 36i64).unwrap();

    assert_eq!(person.get_text("name").unwrap(), "Ada");
    assert_eq!(person.get_int("age").unwrap(), 36);
    assert!(person.get("missing").unwrap_err().is_not_found());
}

#[test]
fn equal_write_on_observable_instance_is_silent() {
    let person = create_observable::<Person>().unwrap();
    person.set("name", "Ada").unwrap();

    let (seen, _sub) = collect_raises(&person);
    person.set("name", "Ada").unwrap();
    assert!(seen.lock().unwrap().is_empty());

    person.set("name", "Grace").unwrap();
    assert_eq!(*seen.lock().unwrap(), vec!["name"]);
}

#[test]
fn dependents_raise_after_their_source() {
    let person = create_observable::<Person>().unwrap();
    let (seen, _sub) = collect_raises(&person);

    let mother = create_observable::<Person>().unwrap();
    person.set("mother", mother).unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["mother", "mother_age"]);
}

#[test]
fn self_referential_dependency_is_dropped_from_fanout() {
    let model = create_observable::<SelfLoop>().unwrap();
    let (seen, _sub) = collect_raises(&model);

    model.set("a", 1i64).unwrap();
    // `a` itself is raised once; the a -> b -> a cycle contributes only `b`.
    assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
}

#[test]
fn extended_declaration_blocks_compose_dependencies() {
    let employee = create_observable::<Employee>().unwrap();
    let (seen, _sub) = collect_raises(&employee);

    employee.set("name", "Ada").unwrap();
    assert_eq!(*seen.lock().unwrap(), vec!["name", "display_name"]);

    // Properties declared after the extension keep their declaration order.
    let names: Vec<_> = employee
        .schema()
        .properties()
        .map(|p| p.name().to_string())
        .collect();
    assert_eq!(names, vec!["name", "display_name", "salary"]);
}

#[test]
fn deferral_coalesces_to_first_observed_order() {
    let person = create_observable::<Person>().unwrap();
    let (seen, _sub) = collect_raises(&person);

    {
        let _guard = person.defer_property_changes().unwrap();
        person.set("age", 1i64).unwrap();
        person.set("name", "A").unwrap();
        person.set("name", "B").unwrap();
        person.set("age", 2i64).unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }

    assert_eq!(*seen.lock().unwrap(), vec!["age", "name"]);
}

#[test]
fn deferring_twice_is_refused() {
    let person = create_observable::<Person>().unwrap();
    let _guard = person.defer_property_changes().unwrap();
    let err = person.defer_property_changes().unwrap_err();
    assert!(err.is_invalid_operation());
}

#[test]
fn tracked_write_updates_changed_set_and_raises_is_changed_first() {
    let person = create_trackable::<Person>().unwrap();
    let (seen, _sub) = collect_raises(&person);

    person.set("age", 37i64).unwrap();
    assert!(person.is_changed());
    assert_eq!(person.get_original("age").unwrap(), Value::Int(0));
    assert_eq!(*seen.lock().unwrap(), vec![IS_CHANGED, "age"]);
}

#[test]
fn writes_back_to_original_clear_the_changed_set() {
    let person = create_trackable::<Person>().unwrap();
    person.set("age", 37i64).unwrap();
    person.set("name", "Ada").unwrap();
    person.set("age", 0i64).unwrap();
    person.set("name", "").unwrap();

    assert!(!person.is_changed());
    assert!(person.get_changes().unwrap().is_empty());
}

#[test]
fn reject_restores_originals_and_accept_commits() {
    let person = create_trackable::<Person>().unwrap();
    person.set("age", 37i64).unwrap();
    person.reject_changes().unwrap();
    assert!(!person.is_changed());
    assert_eq!(person.get_int("age").unwrap(), 0);

    person.set("age", 41i64).unwrap();
    person.accept_changes().unwrap();
    assert!(!person.is_changed());
    assert_eq!(person.get_int("age").unwrap(), 41);
    assert_eq!(person.get_original("age").unwrap(), Value::Int(41));

    // accept-then-reject is a no-op
    person.accept_changes().unwrap();
    person.reject_changes().unwrap();
    assert_eq!(person.get_int("age").unwrap(), 41);
}

#[test]
fn single_properties_accept_and_reject_independently() {
    let person = create_trackable::<Person>().unwrap();
    person.set("name", "Ada").unwrap();
    person.set("age", 36i64).unwrap();

    person.accept_property("name").unwrap();
    assert!(person.is_changed());
    assert_eq!(person.get_original("name").unwrap(), "Ada");

    person.reject_property("age").unwrap();
    assert!(!person.is_changed());
    assert_eq!(person.get_int("age").unwrap(), 0);
    assert_eq!(person.get_text("name").unwrap(), "Ada");

    // Accepting an unchanged property is a no-op.
    person.accept_property("age").unwrap();
    assert!(!person.is_changed());
}

#[test]
fn init_scope_seeds_the_baseline() {
    let person = create_trackable::<Person>().unwrap();
    person.begin_init().unwrap();
    person.set("age", 36i64).unwrap();
    person.set("name", "Ada").unwrap();
    person.end_init().unwrap();

    assert!(!person.is_changed());
    assert_eq!(person.get_original("age").unwrap(), Value::Int(36));
}

#[test]
fn init_misuse_is_refused() {
    let person = create_trackable::<Person>().unwrap();
    person.set("age", 1i64).unwrap();
    assert!(person.begin_init().unwrap_err().is_invalid_operation());

    person.reject_changes().unwrap();
    assert!(person.end_init().unwrap_err().is_invalid_operation());

    person.begin_init().unwrap();
    assert!(person.accept_changes().unwrap_err().is_invalid_operation());
    assert!(person.reject_changes().unwrap_err().is_invalid_operation());
    person.end_init().unwrap();
}

#[test]
fn tracking_operations_require_the_tracking_factory() {
    let person = create_observable::<Person>().unwrap();
    assert!(!person.is_tracked());
    assert!(person.accept_changes().unwrap_err().is_not_tracked());
    assert!(person.get_original("age").unwrap_err().is_not_tracked());
    assert!(!person.is_changed());
}

#[test]
fn nested_child_changes_propagate_to_the_owner() {
    let person = create_trackable::<Person>().unwrap();
    let mother = create_trackable::<Person>().unwrap();
    person.set("mother", mother.clone()).unwrap();
    person.accept_changes().unwrap();
    assert!(!person.is_changed());

    mother.set("age", 60i64).unwrap();
    assert!(mother.is_changed());
    assert!(person.is_changed());

    mother.set_original_value("age", 60i64).unwrap();
    assert!(!mother.is_changed());
    assert!(!person.is_changed());
}

#[test]
fn set_original_value_follows_current_when_unchanged() {
    let person = create_trackable::<Person>().unwrap();
    person.set_original_value("age", 50i64).unwrap();
    assert_eq!(person.get_int("age").unwrap(), 50);
    assert!(!person.is_changed());
}

#[test]
fn reset_value_writes_both_slots() {
    let person = create_trackable::<Person>().unwrap();
    person.set("age", 37i64).unwrap();
    person.reset_value("age", 40i64).unwrap();

    assert!(!person.is_changed());
    assert_eq!(person.get_int("age").unwrap(), 40);
    assert_eq!(person.get_original("age").unwrap(), Value::Int(40));
}

#[test]
fn get_changes_reports_original_and_current() {
    let person = create_trackable::<Person>().unwrap();
    person.set("name", "Ada").unwrap();
    person.set("age", 36i64).unwrap();

    let changes = person.get_changes().unwrap();
    assert_eq!(changes.len(), 2);
    // Declaration order: name before age.
    assert_eq!(changes[0].property, "name");
    assert_eq!(changes[0].original, Value::Text(String::new()));
    assert_eq!(changes[0].current, Value::Text("Ada".into()));
    assert_eq!(changes[1].property, "age");
}

#[test]
fn original_equals_self_means_no_pending_changes() {
    let person = create_trackable::<Person>().unwrap();
    assert!(person.original_equals(&person).unwrap());
    person.set("age", 1i64).unwrap();
    assert!(!person.original_equals(&person).unwrap());
}

#[test]
fn reference_only_properties_compare_by_identity() {
    let account = create_trackable::<Account>().unwrap();
    let owner_a = create_trackable::<Person>().unwrap();
    let owner_b = create_trackable::<Person>().unwrap();
    // owner_a and owner_b are structurally equal but distinct handles.
    assert!(owner_a.structural_eq(&owner_b));

    account.set("owner", owner_a.clone()).unwrap();
    account.accept_changes().unwrap();
    account.set("owner", owner_b).unwrap();
    assert!(account.is_changed());

    account.set("owner", owner_a).unwrap();
    assert!(!account.is_changed());
}

#[test]
fn read_only_properties_refuse_writes() {
    let account = create_trackable::<Account>().unwrap();
    let err = account.set("ledger", 1i64).unwrap_err();
    assert!(matches!(
        err,
        crate::Error::Model(ModelError::ReadOnlyProperty { .. })
    ));
}

#[test]
fn reserved_property_names_fail_compilation_every_time() {
    let first = create_observable::<Reserved>().unwrap_err();
    let second = create_observable::<Reserved>().unwrap_err();
    assert!(matches!(
        first,
        crate::Error::Schema(SchemaError::ReservedProperty { .. })
    ));
    assert!(matches!(
        second,
        crate::Error::Schema(SchemaError::ReservedProperty { .. })
    ));
}

#[test]
fn typed_accessors_report_mismatches() {
    let person = create_observable::<Person>().unwrap();
    person.set("name", "Ada").unwrap();
    let err = person.get_int("name").unwrap_err();
    assert!(matches!(
        err,
        crate::Error::Model(ModelError::TypeMismatch { .. })
    ));
}

#[test]
fn snapshot_serializes_current_values() {
    let person = create_observable::<Person>().unwrap();
    person.set("name", "Ada").unwrap();
    person.set("age", 36i64).unwrap();

    let json = serde_json::to_value(Value::Model(person)).unwrap();
    assert_eq!(json["name"], "Ada");
    assert_eq!(json["age"], 36);
    assert_eq!(json["mother"], serde_json::Value::Null);
}
