use std::sync::{Arc, Mutex};

use telltale::model::{Model, ModelType, SchemaBuilder};
use telltale::{Subscription, create_trackable_with};

/// A person with a derived property: `mother_age` is a function of `mother`.
pub struct Person;

impl ModelType for Person {
    const NAME: &'static str = "it::Person";

    fn declare(schema: &mut SchemaBuilder) {
        schema.property("name").trackable().default_value("");
        schema.property("age").trackable().default_value(0i64);
        schema.property("mother").trackable();
        schema.property("mother_age").depends_on(&["mother"]);
    }
}

/// The keyed record used by the change-set scenarios.
pub struct Record;

impl ModelType for Record {
    const NAME: &'static str = "it::Record";

    fn declare(schema: &mut SchemaBuilder) {
        schema.property("key").trackable().default_value(0i64);
        schema.property("value").trackable();
    }
}

/// Creates a tracked person whose built values are the baseline.
pub fn person(name: &str, age: i64) -> Model {
    create_trackable_with::<Person>(|model| {
        model.set("name", name)?;
        model.set("age", age)?;
        Ok(())
    })
    .expect("failed to build test person")
}

/// Creates a tracked keyed record whose built values are the baseline.
pub fn record(key: i64, value: Option<&str>) -> Model {
    create_trackable_with::<Record>(|model| {
        model.set("key", key)?;
        model.set("value", value)?;
        Ok(())
    })
    .expect("failed to build test record")
}

/// Records every property name raised by a model, in order.
pub fn record_raises(model: &Model) -> (Arc<Mutex<Vec<String>>>, Subscription) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    let sub = model.on_property_changed(move |event| {
        seen_clone.lock().unwrap().push(event.property.clone());
    });
    (seen, sub)
}
