use std::sync::Arc;
use std::time::Duration;

use modelhub_core::codecs::JsonCodec;
use modelhub_core::metamodel::coffee;
use modelhub_core::{
    Codec, CodecRegistry, Command, FeatureValue, ModelValidator, NewObject, PackageRegistry, Value,
};
use modelhub_engine::{ControllerPolicy, ModelController, SessionController};
use modelhub_engine::{OverflowPolicy, ServerConfig};
use modelhub_store::{MemoryModelStore, ModelRepository, ModelStore, RepositoryOptions};

pub const MODEL: &str = "coffee.json";

#[allow(dead_code)]
pub fn seeded_store() -> Arc<MemoryModelStore> {
    let bytes = JsonCodec.encode_model(&coffee::sample_model(MODEL)).unwrap();
    let other = JsonCodec
        .encode_model(&coffee::sample_model("other.json"))
        .unwrap();
    Arc::new(
        MemoryModelStore::new()
            .with_model(MODEL, bytes)
            .with_model("other.json", other),
    )
}

#[allow(dead_code)]
pub fn controller_with(
    store: Arc<dyn ModelStore>,
    policy: ControllerPolicy,
    lock_timeout: Duration,
    overflow: OverflowPolicy,
) -> ModelController {
    let packages = Arc::new(PackageRegistry::with_samples());
    let repository = ModelRepository::new(
        store,
        Arc::new(CodecRegistry::with_defaults()),
        packages.clone(),
        RepositoryOptions {
            lock_timeout,
            ..RepositoryOptions::default()
        },
    );
    ModelController::new(
        Arc::new(repository),
        Arc::new(SessionController::new(overflow)),
        ModelValidator::new(packages).with_check(coffee::TaskDurationCheck),
        policy,
    )
}

#[allow(dead_code)]
pub fn controller(policy: ControllerPolicy) -> (ModelController, Arc<MemoryModelStore>) {
    let store = seeded_store();
    let controller = controller_with(
        store.clone(),
        policy,
        Duration::from_secs(5),
        OverflowPolicy::Drop,
    );
    (controller, store)
}

#[allow(dead_code)]
pub fn default_policy() -> ControllerPolicy {
    ControllerPolicy::from(&ServerConfig::default())
}

#[allow(dead_code)]
pub fn json(cmd: &Command) -> Vec<u8> {
    JsonCodec.encode_command(cmd).unwrap()
}

#[allow(dead_code)]
pub fn set_vendor(vendor: &str) -> Command {
    Command::set("cpu", "vendor", Value::Str(vendor.to_string()))
}

/// Append a named automatic task to the sample workflow
#[allow(dead_code)]
pub fn add_task(id: &str) -> Command {
    Command::create_child(
        "wf",
        "nodes",
        NewObject::new(id, "AutomaticTask")
            .with("name", FeatureValue::Single(Value::Str(id.to_string()))),
    )
}
