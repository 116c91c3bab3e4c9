use std::fs;
use std::sync::Arc;

use entrywise::config::KernelConfig;
use entrywise::kernel::Kernel;
use entrywise::persist::PersistenceMode;
use entrywise::Value;

#[test]
fn file_mode_bootstraps_the_work_collection_on_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (kernel, _) = Kernel::from_config(KernelConfig::rooted(dir.path()));
    kernel.work_collection().expect("work collection");
    let written = fs::read_to_string(dir.path().join("work_collection").join("data.json")).expect("bootstrap file");
    let json: serde_json::Value = serde_json::from_str(&written).expect("valid json");
    assert_eq!(json["contained_entries"], serde_json::json!({}));
    assert_eq!(json["_parent_entries"].as_array().map(Vec::len), Some(1));
}

#[test]
fn file_mode_survives_a_fresh_kernel() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let (kernel, _) = Kernel::from_config(KernelConfig::rooted(dir.path()));
        let work = kernel.work_collection().unwrap();
        let created = work.call("new", vec![Value::from("notebook")], None).unwrap();
        let created = created.into_entry().expect("entry");
        created.plant("pages.count", 96).unwrap();
        created.save().unwrap();
    }
    let (kernel, _) = Kernel::from_config(KernelConfig::rooted(dir.path()));
    let notebook = kernel.byname("notebook").unwrap().expect("notebook after restart");
    assert_eq!(notebook.dig("pages.count").unwrap(), Value::Int(96));
}

fn stored(path: &std::path::Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).expect("stored document")).expect("valid json")
}

#[test]
fn save_merges_an_update_before_writing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (kernel, _) = Kernel::from_config(KernelConfig::rooted(dir.path()));
    let work = kernel.work_collection().unwrap();
    let created = work.call("new", vec![Value::from("notebook")], None).unwrap().into_entry().expect("entry");
    let update = Value::from(serde_json::json!({"pages": 96, "cover": "red"}));
    let saved = created.call("save", vec![update], None).unwrap().into_entry().expect("entry");
    assert!(Arc::ptr_eq(&saved, &created));
    let document = stored(&dir.path().join("work_collection").join("notebook").join("data.json"));
    assert_eq!(document, serde_json::json!({"pages": 96, "cover": "red"}));
    assert!(created.call("save", vec![Value::from("not a mapping")], None).is_err());
}

#[test]
fn save_to_a_new_path_creates_directories() {
    let dir = tempfile::tempdir().expect("tempdir");
    let copy_location = dir.path().join("copies").join("deep").join("notebook_copy");
    {
        let (kernel, _) = Kernel::from_config(KernelConfig::rooted(dir.path()));
        let work = kernel.work_collection().unwrap();
        let created = work.call("new", vec![Value::from("notebook")], None).unwrap().into_entry().expect("entry");
        created.set("pages", 96).unwrap();
        let new_path = Value::from(copy_location.to_str().expect("utf-8 path"));
        let update = Value::from(serde_json::json!({"cover": "red"}));
        let copy = created.call("save", vec![update, new_path], None).unwrap().into_entry().expect("entry");
        assert_eq!(copy.location(), Some(copy_location.as_path()));
        assert_eq!(copy.name(), "notebook_copy");
        assert!(Arc::ptr_eq(&copy, &kernel.bypath(&copy_location).unwrap()));
        // the original keeps its place and its stored document
        assert_eq!(created.location(), Some(dir.path().join("work_collection").join("notebook").as_path()));
        let original = stored(&dir.path().join("work_collection").join("notebook").join("data.json"));
        assert_eq!(original, serde_json::json!({}));
    }
    assert_eq!(stored(&copy_location.join("data.json")), serde_json::json!({"pages": 96, "cover": "red"}));
    let (kernel, _) = Kernel::from_config(KernelConfig::rooted(dir.path()));
    let copy = kernel.bypath(&copy_location).unwrap();
    assert_eq!(copy.get("cover").unwrap(), Some(Value::from("red")));
}

#[test]
fn save_to_its_own_location_is_a_plain_save() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (kernel, _) = Kernel::from_config(KernelConfig::rooted(dir.path()));
    let work = kernel.work_collection().unwrap();
    let created = entrywise::collection::new_entry(&work, "scrap").unwrap();
    let location = created.location().expect("location").to_path_buf();
    let saved = created.save_with(None, Some(&location)).unwrap();
    assert!(Arc::ptr_eq(&saved, &created));
    assert!(Arc::ptr_eq(&kernel.bypath(&location).unwrap(), &created));
}

#[test]
fn file_mode_remove_deletes_the_document() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (kernel, _) = Kernel::from_config(KernelConfig::rooted(dir.path()));
    let work = kernel.work_collection().unwrap();
    let created = entrywise::collection::new_entry(&work, "scrap").unwrap();
    let document = dir.path().join("work_collection").join("scrap").join("data.json");
    assert!(document.exists());
    assert!(created.remove().unwrap());
    assert!(!document.exists());
    // nothing left to remove the second time
    assert!(!created.remove().unwrap());
    assert!(kernel.cached(dir.path().join("work_collection").join("scrap")).unwrap().is_none());
}

#[test]
fn in_memory_mode_never_touches_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = KernelConfig { persistence: PersistenceMode::InMemory, ..KernelConfig::rooted(dir.path()) };
    let (kernel, _) = Kernel::from_config(config);
    let work = kernel.work_collection().unwrap();
    work.call("new", vec![Value::from("ghost")], None).unwrap();
    assert!(kernel.byname("ghost").unwrap().is_some());
    assert!(!dir.path().join("work_collection").exists());
}

#[test]
fn unreadable_documents_are_errors() {
    let dir = tempfile::tempdir().expect("tempdir");
    let broken = dir.path().join("broken");
    fs::create_dir_all(&broken).unwrap();
    fs::write(broken.join("data.json"), "{ not json").unwrap();
    let (kernel, _) = Kernel::from_config(KernelConfig::rooted(dir.path()));
    let entry = kernel.bypath(&broken).unwrap();
    assert!(entry.get("anything").is_err());
}
