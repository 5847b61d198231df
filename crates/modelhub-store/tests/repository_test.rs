// Integration tests for the model repository over real backing stores

use std::sync::Arc;
use std::time::Duration;

use modelhub_core::codecs::{JsonCodec, YamlCodec};
use modelhub_core::metamodel::coffee;
use modelhub_core::{Codec, CodecRegistry, Command, ExErrorKind, PackageRegistry, Value};
use modelhub_store::{
    FsModelStore, MemoryModelStore, ModelRepository, ModelStore, RepositoryOptions,
    SqliteModelStore, SubscriptionIndex,
};
use tempfile::TempDir;

fn repository(store: Arc<dyn ModelStore>) -> ModelRepository {
    ModelRepository::new(
        store,
        Arc::new(CodecRegistry::with_defaults()),
        Arc::new(PackageRegistry::with_samples()),
        RepositoryOptions {
            lock_timeout: Duration::from_millis(200),
            ..RepositoryOptions::default()
        },
    )
}

struct Subscribed(usize);

impl SubscriptionIndex for Subscribed {
    fn subscriber_count(&self, _model_id: &str) -> usize {
        self.0
    }
}

fn intel() -> Command {
    Command::set("cpu", "vendor", Value::Str("Intel".to_string()))
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fs_edit_save_reload() {
    // GIVEN a workspace holding the sample model as YAML
    let dir = TempDir::new().unwrap();
    let fs = FsModelStore::new(dir.path());
    let bytes = YamlCodec
        .encode_model(&coffee::sample_model("machines/coffee.yaml"))
        .unwrap();
    fs.store("machines/coffee.yaml", &bytes).unwrap();
    let repo = repository(Arc::new(fs.clone()));

    // WHEN a command is executed and the model saved
    let handle = repo.get("machines/coffee.yaml").await.unwrap();
    {
        let mut slot = handle.lock().await.unwrap();
        let slot = &mut *slot;
        slot.stack
            .execute(&mut slot.model, &slot.package, intel())
            .unwrap();
    }
    repo.mark_dirty("machines/coffee.yaml").unwrap();
    assert!(repo.is_dirty("machines/coffee.yaml").unwrap());
    repo.save("machines/coffee.yaml").await.unwrap();

    // THEN the model is clean and a fresh repository sees the edit
    assert!(!repo.is_dirty("machines/coffee.yaml").unwrap());
    let fresh = repository(Arc::new(fs));
    let reloaded = fresh.get("machines/coffee.yaml").await.unwrap();
    let slot = reloaded.lock().await.unwrap();
    assert_eq!(
        slot.model.object("cpu").unwrap().get("vendor"),
        Some(&modelhub_core::FeatureValue::Single(Value::Str(
            "Intel".to_string()
        )))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_corrupt_model_is_reported_and_not_cached() {
    // GIVEN a stored document whose root is missing
    let mut model = coffee::sample_model("broken.json");
    model.root = "nowhere".to_string();
    let store = MemoryModelStore::new().with_model("broken.json", JsonCodec.encode_model(&model).unwrap());
    let repo = repository(Arc::new(store));

    // WHEN it is requested
    let err = repo.get("broken.json").await.unwrap_err();

    // THEN loading fails as corrupt and nothing stays live
    assert_eq!(err.kind(), ExErrorKind::CorruptModel);
    assert!(!repo.is_loaded("broken.json"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_first_access_loads_once() {
    // GIVEN a stored model that nobody has opened
    let store = Arc::new(MemoryModelStore::new().with_model(
        "coffee.json",
        JsonCodec.encode_model(&coffee::sample_model("coffee.json")).unwrap(),
    ));
    let repo = Arc::new(repository(store));

    // WHEN many tasks request it at once
    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let repo = repo.clone();
            tokio::spawn(async move { repo.get("coffee.json").await.unwrap() })
        })
        .collect();
    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.unwrap());
    }

    // THEN they all share one instance
    assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_save_keeps_model_dirty() {
    // GIVEN a new in-memory model and a store that rejects writes
    let store = Arc::new(MemoryModelStore::new());
    let repo = repository(store.clone());
    repo.create(coffee::sample_model("new.json")).await.unwrap();
    store.set_fail_writes(true);

    // WHEN it is saved
    let err = repo.save("new.json").await.unwrap_err();

    // THEN the failure is a persistence error carrying the storage cause
    assert_eq!(err.kind(), ExErrorKind::Persistence);
    assert_eq!(
        err.source_error().map(|e| e.kind()),
        Some(ExErrorKind::Io)
    );
    // AND the model stays dirty until a retry succeeds
    assert!(repo.is_dirty("new.json").unwrap());
    store.set_fail_writes(false);
    repo.save("new.json").await.unwrap();
    assert!(!repo.is_dirty("new.json").unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_edit_during_save_stays_dirty() {
    // GIVEN a snapshot taken before a later edit
    let store: Arc<dyn ModelStore> = Arc::new(SqliteModelStore::open_in_memory().unwrap());
    let repo = repository(store);
    let handle = repo.create(coffee::sample_model("m.json")).await.unwrap();
    let snapshot = {
        let slot = handle.lock().await.unwrap();
        repo.snapshot(&handle, &slot).unwrap()
    };
    handle.mark_dirty();

    // WHEN the older snapshot is persisted
    repo.persist(&handle, snapshot).await.unwrap();

    // THEN the later edit is still unsaved
    assert!(handle.is_dirty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_close_with_subscribers_is_busy() {
    // GIVEN a live model with one subscriber
    let repo = repository(Arc::new(MemoryModelStore::new()));
    repo.create(coffee::sample_model("m.json")).await.unwrap();

    // WHEN it is closed
    let err = repo.close("m.json", &Subscribed(1)).await.unwrap_err();

    // THEN it is busy and stays live
    assert_eq!(err.kind(), ExErrorKind::ModelBusy);
    assert!(repo.is_loaded("m.json"));

    // AND closes once nobody subscribes
    repo.close("m.json", &Subscribed(0)).await.unwrap();
    assert!(!repo.is_loaded("m.json"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_save_all_reports_each_model() {
    // GIVEN two dirty models and one clean one
    let store = Arc::new(MemoryModelStore::new().with_model(
        "clean.json",
        JsonCodec.encode_model(&coffee::sample_model("clean.json")).unwrap(),
    ));
    let repo = repository(store.clone());
    repo.get("clean.json").await.unwrap();
    repo.create(coffee::sample_model("a.json")).await.unwrap();
    repo.create(coffee::sample_model("b.json")).await.unwrap();

    // WHEN everything is saved
    let results = repo.save_all().await;

    // THEN only the dirty models were written
    let saved: Vec<_> = results.iter().map(|(id, r)| (id.as_str(), r.is_ok())).collect();
    assert_eq!(saved, vec![("a.json", true), ("b.json", true)]);
    assert_eq!(store.write_count(), 2);
}
