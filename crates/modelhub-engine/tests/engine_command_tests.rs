// Dispatch of transport-neutral engine commands onto the controller.

mod common;

use common::*;
use modelhub_core::metamodel::coffee;
use modelhub_core::{Codec, ExErrorKind, PackageRegistry};
use modelhub_engine::{
    apply_engine_command, EngineCommand, EngineCommandResult, ModelController, ServerConfig,
    StorageBackend,
};
use modelhub_core::ModelValidator;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_execute_save_and_reload_through_config() {
    // GIVEN a filesystem workspace with the sample model and a config
    let dir = TempDir::new().unwrap();
    let bytes = modelhub_core::codecs::JsonCodec
        .encode_model(&coffee::sample_model(MODEL))
        .unwrap();
    std::fs::write(dir.path().join(MODEL), bytes).unwrap();
    let config = ServerConfig {
        workspace_root: dir.path().to_path_buf(),
        storage_backend: StorageBackend::Fs,
        ..ServerConfig::default()
    };
    let packages = Arc::new(PackageRegistry::with_samples());
    let controller = ModelController::from_config(
        &config,
        packages.clone(),
        ModelValidator::new(packages.clone()),
    )
    .unwrap();

    // WHEN a command is executed and the model saved
    let executed = apply_engine_command(
        EngineCommand::Execute {
            model_id: MODEL.to_string(),
            payload: json(&set_vendor("Intel")),
            format: None,
        },
        &controller,
    )
    .await
    .unwrap();
    assert!(matches!(executed, EngineCommandResult::Mutated(_)));
    let saved = apply_engine_command(
        EngineCommand::Save {
            model_id: MODEL.to_string(),
        },
        &controller,
    )
    .await
    .unwrap();
    assert!(matches!(saved, EngineCommandResult::Saved));

    // THEN a fresh controller over the same workspace sees the edit
    let fresh =
        ModelController::from_config(&config, packages.clone(), ModelValidator::new(packages))
            .unwrap();
    let snapshot = apply_engine_command(
        EngineCommand::Snapshot {
            model_id: MODEL.to_string(),
            format: Some("yaml".to_string()),
        },
        &fresh,
    )
    .await
    .unwrap();
    match snapshot {
        EngineCommandResult::Snapshot(bytes) => {
            assert!(String::from_utf8(bytes).unwrap().contains("Intel"))
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_subscribe_requires_existing_model() {
    let (controller, _) = controller(default_policy());
    let (session, _rx) = controller.sessions().connect(4);

    let err = apply_engine_command(
        EngineCommand::Subscribe {
            session_id: session.clone(),
            model_id: "nope.json".to_string(),
        },
        &controller,
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::ModelNotFound);
    assert!(controller.sessions().subscriptions_of(&session).is_empty());
}

#[tokio::test]
async fn test_validate_reports_diagnostics() {
    let (controller, _) = controller(default_policy());

    let result = apply_engine_command(
        EngineCommand::Validate {
            model_id: MODEL.to_string(),
        },
        &controller,
    )
    .await
    .unwrap();

    match result {
        EngineCommandResult::Diagnostics(diags) => assert!(diags.is_empty()),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_default_format_rejected_by_config() {
    let config = ServerConfig {
        default_format: "xmi".to_string(),
        storage_backend: StorageBackend::Memory,
        ..ServerConfig::default()
    };
    let packages = Arc::new(PackageRegistry::with_samples());

    let err = ModelController::from_config(&config, packages.clone(), ModelValidator::new(packages))
        .unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::UnknownFormat);
}
