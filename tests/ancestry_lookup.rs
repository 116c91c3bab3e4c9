use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use entrywise::behavior::{BehaviorRegistry, BehaviorUnit};
use entrywise::config::KernelConfig;
use entrywise::dispatch::{Action, Signature};
use entrywise::kernel::Kernel;
use entrywise::persist::MemoryStorage;
use entrywise::{EntryError, Map, Value};
use serde_json::json;

fn setup() -> (Arc<Kernel>, Arc<MemoryStorage>, Arc<BehaviorRegistry>) {
    let storage = Arc::new(MemoryStorage::new());
    storage.insert("/c/work_collection/child/data.json", json!({"_parent_entries": ["dad", "mum"], "nickname": "kid"})).unwrap();
    storage.insert("/c/work_collection/dad/data.json", json!({"_parent_entries": ["granddad"], "eyes": "brown", "hobby": {"sport": "golf"}})).unwrap();
    storage.insert("/c/work_collection/mum/data.json", json!({"eyes": "green", "hair": "red"})).unwrap();
    storage.insert("/c/work_collection/granddad/data.json", json!({"surname": "Smith", "pets": ["cat", "dog"]})).unwrap();
    let registry = Arc::new(BehaviorRegistry::new());
    registry
        .register(
            "/c/work_collection/granddad",
            "code",
            BehaviorUnit::new("granddad").action(Action::new(
                "subtract_one",
                Signature::new().required("x"),
                |_, args| Ok(Value::Int(args[0].as_i64().unwrap_or_default() - 1)),
            )),
        )
        .unwrap();
    registry
        .register(
            "/c/work_collection/mum",
            "code",
            BehaviorUnit::new("mum").action(Action::new("describe", Signature::new(), |inv, _| {
                Ok(Value::Text(format!("{} has {} eyes", inv.entry().name(), inv.entry().get_strict("eyes")?)))
            })),
        )
        .unwrap();
    let kernel = Kernel::new(KernelConfig::rooted("/c"), storage.clone(), registry.clone());
    (kernel, storage, registry)
}

#[test]
fn first_parent_wins() {
    let (kernel, _, _) = setup();
    let child = kernel.bypath("/c/work_collection/child").unwrap();
    assert_eq!(child.get("eyes").unwrap(), Some(Value::from("brown")));
    // only mum has it
    assert_eq!(child.get("hair").unwrap(), Some(Value::from("red")));
    // depth-first: granddad (via dad) is consulted before mum
    assert_eq!(child.get("surname").unwrap(), Some(Value::from("Smith")));
    assert_eq!(child.parent_names().unwrap(), vec!["dad".to_string(), "mum".to_string()]);
}

#[test]
fn own_attributes_shadow_parents() {
    let (kernel, _, _) = setup();
    let child = kernel.bypath("/c/work_collection/child").unwrap();
    child.set("eyes", "blue").unwrap();
    assert_eq!(child.get("eyes").unwrap(), Some(Value::from("blue")));
    let dad = kernel.bypath("/c/work_collection/dad").unwrap();
    assert_eq!(dad.get("eyes").unwrap(), Some(Value::from("brown")));
}

#[test]
fn missing_keys() {
    let (kernel, _, _) = setup();
    let child = kernel.bypath("/c/work_collection/child").unwrap();
    assert_eq!(child.get("nothing").unwrap(), None);
    assert_eq!(child.get_or("nothing", Value::Int(7)).unwrap(), Value::Int(7));
    assert!(matches!(child.get_strict("nothing"), Err(EntryError::KeyNotFound { .. })));
}

#[test]
fn dig_descends_through_inherited_structures() {
    let (kernel, _, _) = setup();
    let child = kernel.bypath("/c/work_collection/child").unwrap();
    assert_eq!(child.dig("hobby.sport").unwrap(), Value::from("golf"));
    assert_eq!(child.dig("pets.1").unwrap(), Value::from("dog"));
    assert_eq!(child.dig_safe("hobby.sport.league").unwrap(), None);
    assert!(matches!(child.dig("hobby.chess"), Err(EntryError::PathNotFound { .. })));
}

#[test]
fn plant_and_pluck_touch_only_own_attributes() {
    let (kernel, _, _) = setup();
    let child = kernel.bypath("/c/work_collection/child").unwrap();
    child.plant("hobby.music", "drums").unwrap();
    assert_eq!(child.dig("hobby.music").unwrap(), Value::from("drums"));
    // the own `hobby` now shadows dad's
    assert_eq!(child.dig_safe("hobby.sport").unwrap(), None);
    let dad = kernel.bypath("/c/work_collection/dad").unwrap();
    assert_eq!(dad.dig("hobby.sport").unwrap(), Value::from("golf"));

    assert_eq!(child.pluck("hobby.music").unwrap(), Some(Value::from("drums")));
    assert_eq!(child.pluck("hobby.music").unwrap(), None);
}

#[test]
fn inherited_action_with_inherited_argument() {
    let (kernel, _, _) = setup();
    let child = kernel.bypath("/c/work_collection/child").unwrap();
    let dad = kernel.bypath("/c/work_collection/dad").unwrap();
    let mut overrides = Map::new();
    overrides.insert("x".to_string(), Value::Int(100));
    dad.merge(overrides).unwrap();
    assert_eq!(child.call("subtract_one", vec![], None).unwrap(), Value::Int(99));
    // a positional argument takes precedence
    assert_eq!(child.call("subtract_one", vec![Value::Int(10)], None).unwrap(), Value::Int(9));
}

#[test]
fn actions_see_the_acting_entry() {
    let (kernel, _, _) = setup();
    let child = kernel.bypath("/c/work_collection/child").unwrap();
    // reached on mum, but acting on child: child inherits dad's eyes first
    assert_eq!(child.call("describe", vec![], None).unwrap(), Value::from("child has brown eyes"));
    let (_, path) = child.reach_action("describe").unwrap();
    assert_eq!(path, vec!["child".to_string(), "mum".to_string()]);
}

#[test]
fn unknown_actions_report_the_search() {
    let (kernel, _, _) = setup();
    let child = kernel.bypath("/c/work_collection/child").unwrap();
    assert!(!child.can("fly").unwrap());
    match child.call("fly", vec![], None) {
        Err(EntryError::ActionNotFound { action, .. }) => assert_eq!(action, "fly"),
        other => panic!("expected ActionNotFound, got {other:?}"),
    }
    // built-ins are always there
    assert!(child.can("get_name").unwrap());
    assert_eq!(child.call("get_name", vec![], None).unwrap(), Value::from("child"));
}

#[test]
fn references_are_resolved_on_lookup() {
    let (kernel, storage, _) = setup();
    storage
        .insert(
            "/c/work_collection/cousin/data.json",
            json!({
                "relative": ["^", "bypath", "/c/work_collection/mum"],
                "own_eyes": ["^^", "get", "eyes"],
                "eyes": "grey",
                "raw": ["AS^IS", "^", "bypath"]
            }),
        )
        .unwrap();
    let cousin = kernel.bypath("/c/work_collection/cousin").unwrap();
    let mum = kernel.bypath("/c/work_collection/mum").unwrap();
    match cousin.get("relative").unwrap() {
        Some(Value::Entry(entry)) => assert!(Arc::ptr_eq(&entry, &mum)),
        other => panic!("expected an entry, got {other:?}"),
    }
    assert_eq!(cousin.get("own_eyes").unwrap(), Some(Value::from("grey")));
    assert_eq!(cousin.dig("relative.hair").unwrap(), Value::from("red"));
    assert_eq!(
        cousin.get("raw").unwrap(),
        Some(Value::List(vec![Value::from("^"), Value::from("bypath")]))
    );
}

#[test]
fn parents_declared_by_reference() {
    let (kernel, storage, _) = setup();
    storage
        .insert(
            "/c/elsewhere/adoptee/data.json",
            json!({"_parent_entries": [["^", "bypath", "/c/work_collection/mum"]]}),
        )
        .unwrap();
    let adoptee = kernel.bypath("/c/elsewhere/adoptee").unwrap();
    assert_eq!(adoptee.get("hair").unwrap(), Some(Value::from("red")));
}

#[test]
fn parents_are_resolved_once_per_entry() {
    let (kernel, storage, registry) = setup();
    storage
        .insert("/c/work_collection/foundling/data.json", json!({"_parent_entries": [["^^", "pick_parent"]]}))
        .unwrap();
    let picks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&picks);
    registry
        .register(
            "/c/work_collection/foundling",
            "code",
            BehaviorUnit::new("foundling").action(Action::new("pick_parent", Signature::new(), move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Value::from("dad"))
            })),
        )
        .unwrap();
    let foundling = kernel.bypath("/c/work_collection/foundling").unwrap();
    assert_eq!(foundling.get("eyes").unwrap(), Some(Value::from("brown")));
    assert_eq!(foundling.get("surname").unwrap(), Some(Value::from("Smith")));
    assert_eq!(foundling.dig("hobby.sport").unwrap(), Value::from("golf"));
    assert_eq!(foundling.parent_names().unwrap(), vec!["dad".to_string()]);
    assert_eq!(picks.load(Ordering::SeqCst), 1);

    // a changed declaration is not picked up by the same object
    foundling.set("_parent_entries", Value::List(vec![Value::from("mum")])).unwrap();
    assert_eq!(foundling.get("eyes").unwrap(), Some(Value::from("brown")));
    assert_eq!(foundling.parent_names().unwrap(), vec!["dad".to_string()]);
    assert_eq!(picks.load(Ordering::SeqCst), 1);

    // until the resolved parents are explicitly forgotten
    foundling.reset_parents().unwrap();
    assert_eq!(foundling.get("eyes").unwrap(), Some(Value::from("green")));
    assert_eq!(picks.load(Ordering::SeqCst), 1);
}
