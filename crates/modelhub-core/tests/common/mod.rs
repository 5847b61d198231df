use modelhub_core::metamodel::coffee;
use modelhub_core::{Command, Model, Package, Value};

/// Fresh copy of the sample coffee model
#[allow(dead_code)]
pub fn sample_model() -> Model {
    coffee::sample_model("coffee.json")
}

#[allow(dead_code)]
pub fn coffee_package() -> Package {
    coffee::package()
}

/// Set the processor vendor, a command that always succeeds on the sample
#[allow(dead_code)]
pub fn set_vendor(vendor: &str) -> Command {
    Command::set("cpu", "vendor", Value::Str(vendor.to_string()))
}
