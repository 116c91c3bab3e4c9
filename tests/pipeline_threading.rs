use std::sync::Arc;

use entrywise::behavior::{BehaviorRegistry, BehaviorUnit};
use entrywise::cli;
use entrywise::config::KernelConfig;
use entrywise::dispatch::{Action, Signature};
use entrywise::kernel::Kernel;
use entrywise::persist::MemoryStorage;
use entrywise::pipeline::{CallRef, Pipeline, Step, Target};
use entrywise::{EntryError, Value};
use serde_json::json;

fn setup() -> (Arc<Kernel>, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    storage
        .insert(
            "/c/work_collection/data.json",
            json!({
                "_parent_entries": ["core_collection"],
                "contained_entries": {"numpy": "numpy", "pandas": "pandas"}
            }),
        )
        .unwrap();
    storage.insert("/c/work_collection/numpy/data.json", json!({"package_name": "numpy"})).unwrap();
    storage
        .insert("/c/work_collection/pandas/data.json", json!({"_parent_entries": ["numpy"], "package_name": "pandas"}))
        .unwrap();
    storage.insert("/c/things/box/data.json", json!({"greeting": "hi"})).unwrap();
    let registry = Arc::new(BehaviorRegistry::new());
    registry
        .register(
            "/c/work_collection/pandas",
            "code",
            BehaviorUnit::new("pandas").action(Action::new("depends_on", Signature::new().required("pkg"), |inv, args| {
                let pkg = args[0].as_entry().map(|e| e.name()).unwrap_or_default();
                Ok(Value::Text(format!("{} depends on {pkg}", inv.entry().name())))
            })),
        )
        .unwrap();
    let kernel = Kernel::new(KernelConfig::rooted("/c"), storage.clone(), registry);
    (kernel, storage)
}

#[test]
fn results_thread_into_the_next_step() {
    let (kernel, _) = setup();
    let pipeline = Pipeline::new().step(Step::new("bypath").arg("/c/things/box")).step(Step::new("get").arg("greeting"));
    assert_eq!(kernel.execute(&pipeline).unwrap(), Value::from("hi"));
}

#[test]
fn plain_results_fall_back_to_the_kernel() {
    let (kernel, _) = setup();
    // `byname` is a kernel action; the box itself has no such thing
    let pipeline = Pipeline::new()
        .step(Step::new("bypath").arg("/c/things/box"))
        .step(Step::new("get").arg("greeting"))
        .step(Step::new("byname").arg("pandas"));
    match kernel.execute(&pipeline).unwrap() {
        Value::Entry(found) => assert_eq!(found.name(), "pandas"),
        other => panic!("expected the pandas entry, got {other:?}"),
    }
}

#[test]
fn empty_pipeline_yields_null() {
    let (kernel, _) = setup();
    assert_eq!(kernel.execute(&Pipeline::new()).unwrap(), Value::Null);
}

#[test]
fn labeled_results_are_visible_to_later_steps() {
    let (kernel, _) = setup();
    let pipeline = Pipeline::new()
        .step(Step::new("byname").arg("numpy"))
        .step(Step::new("get").arg("package_name").labeled("name"))
        .step(Step::new("byname").arg("pandas"))
        .step(Step::new("plant").arg("friends").arg(vec![Value::from("^get:name"), Value::from("scipy")]))
        .step(Step::new("get").arg("friends"));
    assert_eq!(
        kernel.execute(&pipeline).unwrap(),
        Value::List(vec![Value::from("numpy"), Value::from("scipy")])
    );
    // the scratch entry is gone once the pipeline is over
    let pandas = kernel.byname("pandas").unwrap().expect("pandas");
    assert_eq!(pandas.get("name").unwrap(), None);
}

#[test]
fn labels_feed_argument_binding() {
    let (kernel, _) = setup();
    let pipeline = Pipeline::new()
        .step(Step::new("byname").arg("numpy").labeled("pkg"))
        .step(Step::new("get").arg("package_name"))
        .step(Step::new("byname").arg("pandas"))
        .step(Step::new("depends_on"));
    assert_eq!(kernel.execute(&pipeline).unwrap(), Value::from("pandas depends on numpy"));
    let pandas = kernel.byname("pandas").unwrap().expect("pandas");
    assert!(matches!(pandas.call("depends_on", vec![], None), Err(EntryError::MissingRequiredArgument { .. })));
}

#[test]
fn overrides_are_merged_before_the_call() {
    let (kernel, _) = setup();
    let pipeline = Pipeline::new()
        .step(Step::new("bypath").arg("/c/things/box"))
        .step(Step::new("get").arg("greeting").with_override("greeting", "hello"));
    assert_eq!(kernel.execute(&pipeline).unwrap(), Value::from("hello"));
    let stored = kernel.bypath("/c/things/box").unwrap();
    assert_eq!(stored.get("greeting").unwrap(), Some(Value::from("hello")));
}

#[test]
fn kernel_references_inside_steps() {
    let (kernel, _) = setup();
    let pipeline = Pipeline::new()
        .step(Step::new("byname").arg("pandas"))
        .step(Step::new("plant").arg("built_by").arg(vec![Value::from("^^version")]))
        .step(Step::new("dig").arg("built_by.0"));
    assert_eq!(kernel.execute(&pipeline).unwrap(), Value::from(kernel.version()));
}

#[test]
fn override_values_are_templates_only_when_nested() {
    let (kernel, _) = setup();
    let pipeline = Pipeline::new()
        .step(Step::new("bypath").arg("/c/things/box"))
        .step(
            Step::new("get")
                .arg("motto")
                .with_override("motto", "^keep_as_is")
                .with_override("stamp", Value::Map([("by".to_string(), Value::from("^^version"))].into_iter().collect())),
        );
    assert_eq!(kernel.execute(&pipeline).unwrap(), Value::from("^keep_as_is"));
    let boxed = kernel.bypath("/c/things/box").unwrap();
    assert_eq!(boxed.dig("stamp.by").unwrap(), Value::from(kernel.version()));
}

#[test]
fn negated_tag_queries_are_not_call_references() {
    let (kernel, storage) = setup();
    storage
        .insert(
            "/c/work_collection/data.json",
            json!({
                "_parent_entries": ["core_collection"],
                "contained_entries": {"old": "old", "numpy": "numpy"}
            }),
        )
        .unwrap();
    storage
        .insert("/c/work_collection/old/data.json", json!({"tags": ["python_package", "old"], "package_name": "old"}))
        .unwrap();
    storage
        .insert("/c/work_collection/numpy/data.json", json!({"tags": ["python_package"], "package_name": "numpy"}))
        .unwrap();
    const QUERY: &str = "^old,python_package";
    let direct = kernel.byquery(QUERY, None).unwrap();
    assert_eq!(direct.and_then(Value::into_entry).map(|e| e.name()), Some("numpy".to_string()));

    let pipeline = Pipeline::new().step(Step::new("byquery").arg(QUERY)).step(Step::new("get_name"));
    assert_eq!(kernel.execute(&pipeline).unwrap(), Value::from("numpy"));

    let parsed = cli::parse_pipeline(&["byquery", QUERY, ",", "get_name"], ",").unwrap();
    assert_eq!(kernel.execute(&parsed).unwrap(), Value::from("numpy"));
}

#[test]
fn unknown_actions_stop_the_pipeline() {
    let (kernel, _) = setup();
    let pipeline = Pipeline::new()
        .step(Step::new("bypath").arg("/c/things/box").labeled("box"))
        .step(Step::new("fly"))
        .step(Step::new("get").arg("greeting"));
    match kernel.execute(&pipeline) {
        Err(EntryError::ActionNotFound { action, .. }) => assert_eq!(action, "fly"),
        other => panic!("expected ActionNotFound, got {other:?}"),
    }
    let boxed = kernel.bypath("/c/things/box").unwrap();
    assert_eq!(boxed.get("box").unwrap(), None);
}

#[test]
fn call_references() {
    let call = CallRef::parse("^get:x").expect("call reference");
    assert_eq!(call.target, Target::Acting);
    assert_eq!(call.action, "get");
    assert_eq!(call.arguments, vec![Value::from("x")]);

    let call = CallRef::parse("^^byname,numpy").expect("call reference");
    assert_eq!(call.target, Target::Kernel);
    assert_eq!(call.arguments, vec![Value::from("numpy")]);

    let call = CallRef::parse("^add:1:2.5").expect("call reference");
    assert_eq!(call.arguments, vec![Value::Int(1), Value::Float(2.5)]);
    assert_eq!(call.to_string(), "^add:1:2.5");

    assert_eq!(CallRef::parse("^version").map(|c| c.arguments.len()), Some(0));
    assert_eq!(CallRef::parse("plain"), None);
    assert_eq!(CallRef::parse("^"), None);
    assert_eq!(CallRef::parse("^^^x"), None);
}

#[test]
fn pipelines_from_data() {
    let pipeline = Pipeline::from_value(&Value::from(json!([
        ["byname", ["numpy"], null, "pkg"],
        ["get", "package_name", {"package_name": "override"}]
    ])))
    .unwrap();
    assert_eq!(pipeline.len(), 2);
    assert_eq!(pipeline.steps()[0], Step::new("byname").arg("numpy").labeled("pkg"));
    assert_eq!(
        pipeline.steps()[1],
        Step::new("get").arg("package_name").with_override("package_name", "override")
    );

    let single = Pipeline::from_value(&Value::from(json!(["byname", ["pandas"]]))).unwrap();
    assert_eq!(single.steps(), [Step::new("byname").arg("pandas")]);
    assert!(Pipeline::from_value(&Value::Int(3)).is_err());
}
