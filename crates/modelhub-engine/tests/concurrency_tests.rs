// Concurrency scenarios: per-model ordering, cross-model independence,
// unsubscribe races, lock timeouts, subscriber backpressure and races
// against close.

mod common;

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use modelhub_core::{Command, ExErrorKind, FeatureValue, Value};
use modelhub_engine::{
    apply_engine_command, AutosavePolicy, ControllerPolicy, EngineCommand, ModelController,
    Notification, OverflowPolicy,
};
use modelhub_store::{MemoryModelStore, ModelStore};

/// Memory store whose writes each wait for one release
struct GatedStore {
    inner: Arc<MemoryModelStore>,
    gate: parking_lot::Mutex<mpsc::Receiver<()>>,
}

impl GatedStore {
    fn new(inner: Arc<MemoryModelStore>) -> (Self, mpsc::Sender<()>) {
        let (open, gate) = mpsc::channel();
        let store = Self {
            inner,
            gate: parking_lot::Mutex::new(gate),
        };
        (store, open)
    }
}

impl ModelStore for GatedStore {
    fn load(&self, model_id: &str) -> modelhub_store::Result<Option<Vec<u8>>> {
        self.inner.load(model_id)
    }

    fn store(&self, model_id: &str, bytes: &[u8]) -> modelhub_store::Result<()> {
        let _ = self.gate.lock().recv();
        self.inner.store(model_id, bytes)
    }

    fn list(&self) -> modelhub_store::Result<Vec<String>> {
        self.inner.list()
    }
}

async fn vendor_of(controller: &ModelController) -> Option<FeatureValue> {
    let (_, slot) = controller.repository().lock(MODEL).await.unwrap();
    slot.model.object("cpu").unwrap().get("vendor").cloned()
}

fn node_ids(notifications: &[Notification]) -> Vec<String> {
    notifications
        .iter()
        .filter_map(|n| match n {
            Notification::Command(p) => {
                let cmd: Command = serde_json::from_slice(&p.command).unwrap();
                match cmd {
                    Command::CreateChild { child, .. } => Some(child.id),
                    _ => None,
                }
            }
            _ => None,
        })
        .collect()
}

async fn workflow_nodes(controller: &ModelController, model_id: &str) -> Vec<String> {
    let handle = controller.repository().get(model_id).await.unwrap();
    let slot = handle.lock().await.unwrap();
    slot.model
        .object("wf")
        .unwrap()
        .get("nodes")
        .unwrap()
        .values()
        .iter()
        .filter_map(|v| v.as_ref_id().map(str::to_string))
        .collect()
}

fn drain(rx: &mut tokio::sync::mpsc::Receiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(n) = rx.try_recv() {
        out.push(n);
    }
    out
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_model_commands_apply_in_notification_order() {
    // GIVEN two subscribers on one model
    let (controller, _) = controller(default_policy());
    let controller = Arc::new(controller);
    let (a, mut rx_a) = controller.sessions().connect(256);
    let (b, mut rx_b) = controller.sessions().connect(256);
    controller.sessions().subscribe(&a, MODEL).unwrap();
    controller.sessions().subscribe(&b, MODEL).unwrap();

    // WHEN many tasks append nodes concurrently
    let tasks: Vec<_> = (0..64)
        .map(|i| {
            let controller = controller.clone();
            tokio::spawn(async move {
                controller
                    .handle(MODEL, &json(&add_task(&format!("n-{i}"))), None)
                    .await
                    .unwrap()
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    // THEN both subscribers saw the same gap-free sequence
    let seen_a = drain(&mut rx_a);
    let seen_b = drain(&mut rx_b);
    assert_eq!(seen_a, seen_b);
    let sequences: Vec<u64> = seen_a
        .iter()
        .filter_map(|n| match n {
            Notification::Command(p) => Some(p.sequence),
            _ => None,
        })
        .collect();
    assert_eq!(sequences, (1..=64).collect::<Vec<_>>());

    // AND the model applied the commands in that same order
    let mut expected = vec!["t-grind".to_string(), "t-brew".to_string()];
    expected.extend(node_ids(&seen_a));
    assert_eq!(workflow_nodes(&controller, MODEL).await, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_models_progress_independently() {
    // GIVEN one model held busy by another request
    let (controller, _) = controller(default_policy());
    let controller = Arc::new(controller);
    let busy = controller.repository().get(MODEL).await.unwrap();
    let _held = busy.lock().await.unwrap();

    // WHEN commands target a different model
    for i in 0..10 {
        controller
            .handle("other.json", &json(&add_task(&format!("o-{i}"))), None)
            .await
            .unwrap();
    }

    // THEN they complete without waiting on the busy one
    assert_eq!(workflow_nodes(&controller, "other.json").await.len(), 12);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_busy_model_times_out_without_effect() {
    // GIVEN a short lock timeout and a held model
    let controller = controller_with(
        seeded_store(),
        default_policy(),
        Duration::from_millis(50),
        OverflowPolicy::Drop,
    );
    let handle = controller.repository().get(MODEL).await.unwrap();
    let held = handle.lock().await.unwrap();

    // WHEN a command waits for its turn
    let err = controller
        .handle(MODEL, &json(&set_vendor("Intel")), None)
        .await
        .unwrap_err();

    // THEN it fails with Timeout and nothing was applied
    assert_eq!(err.kind(), ExErrorKind::Timeout);
    drop(held);
    assert!(!controller.repository().is_dirty(MODEL).unwrap());
    assert_eq!(
        controller.undo(MODEL, None).await.unwrap_err().kind(),
        ExErrorKind::NothingToUndo
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unsubscribed_session_receives_nothing_afterwards() {
    // GIVEN a subscriber and a writer running concurrently
    let (controller, _) = controller(default_policy());
    let controller = Arc::new(controller);
    let (session, mut rx) = controller.sessions().connect(1024);
    controller.sessions().subscribe(&session, MODEL).unwrap();

    let writer = {
        let controller = controller.clone();
        tokio::spawn(async move {
            for i in 0..100 {
                controller
                    .handle(MODEL, &json(&add_task(&format!("w-{i}"))), None)
                    .await
                    .unwrap();
            }
        })
    };

    // WHEN the session unsubscribes mid-stream
    tokio::time::sleep(Duration::from_millis(2)).await;
    controller.sessions().unsubscribe(&session, MODEL);
    let marker = controller
        .handle(MODEL, &json(&add_task("after-unsubscribe")), None)
        .await
        .unwrap();
    writer.await.unwrap();

    // THEN it saw a gap-free prefix that ends before the marker
    let seen: Vec<u64> = drain(&mut rx)
        .into_iter()
        .filter_map(|n| match n {
            Notification::Command(p) => Some(p.sequence),
            _ => None,
        })
        .collect();
    assert_eq!(seen, (1..=seen.len() as u64).collect::<Vec<_>>());
    assert!(seen.iter().all(|s| *s < marker.payload.sequence));
}

#[tokio::test]
async fn test_slow_subscriber_does_not_stall_commands() {
    // GIVEN a subscriber that never reads from a one-slot queue
    let controller = controller_with(
        seeded_store(),
        default_policy(),
        Duration::from_secs(5),
        OverflowPolicy::Disconnect,
    );
    let (slow, _slow_rx) = controller.sessions().connect(1);
    let (fast, mut fast_rx) = controller.sessions().connect(64);
    controller.sessions().subscribe(&slow, MODEL).unwrap();
    controller.sessions().subscribe(&fast, MODEL).unwrap();

    // WHEN several commands are handled
    for vendor in ["A", "B", "C"] {
        controller
            .handle(
                MODEL,
                &json(&Command::set("cpu", "vendor", Value::Str(vendor.to_string()))),
                None,
            )
            .await
            .unwrap();
    }

    // THEN the slow session was disconnected and the fast one got everything
    assert!(!controller.sessions().is_connected(&slow));
    assert_eq!(drain(&mut fast_rx).len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_command_queued_behind_close_lands_on_reloaded_model() {
    // GIVEN a model held busy, a close waiting on it, then a command
    let (controller, _) = controller(default_policy());
    let controller = Arc::new(controller);
    let (first, held) = controller.repository().lock(MODEL).await.unwrap();

    let close = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.close(MODEL).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let command = {
        let controller = controller.clone();
        tokio::spawn(async move {
            controller
                .handle(MODEL, &json(&set_vendor("Kept")), None)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // WHEN the model is released
    drop(held);
    close.await.unwrap().unwrap();
    command.await.unwrap().unwrap();

    // THEN the close evicted the old instance and the edit is live
    assert!(first.is_evicted());
    let live = controller.repository().loaded(MODEL).unwrap();
    assert!(!Arc::ptr_eq(&first, &live));
    assert!(live.is_dirty());
    assert_eq!(
        vendor_of(&controller).await,
        Some(FeatureValue::Single(Value::Str("Kept".to_string())))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_close_refuses_subscriber_that_arrived_while_waiting() {
    // GIVEN a model held busy, a subscribe waiting on it, then a close
    let (controller, _) = controller(default_policy());
    let controller = Arc::new(controller);
    let (session, _rx) = controller.sessions().connect(8);
    let (_, held) = controller.repository().lock(MODEL).await.unwrap();

    let subscribe = {
        let controller = controller.clone();
        let session = session.clone();
        tokio::spawn(async move {
            apply_engine_command(
                EngineCommand::Subscribe {
                    session_id: session,
                    model_id: MODEL.to_string(),
                },
                &controller,
            )
            .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let close = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.close(MODEL).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // WHEN the model is released
    drop(held);
    subscribe.await.unwrap().unwrap();
    let closed = close.await.unwrap();

    // THEN the close saw the new subscriber and the model stays live
    assert_eq!(closed.unwrap_err().kind(), ExErrorKind::ModelBusy);
    assert_eq!(controller.sessions().subscribers(MODEL), vec![session]);
    assert!(controller.repository().loaded(MODEL).is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_autosave_dirty_state_waits_for_model_lock() {
    // GIVEN autosave outside the lock on a store that writes on demand
    let seeded = seeded_store();
    let (store, open) = GatedStore::new(seeded.clone());
    let controller = Arc::new(controller_with(
        Arc::new(store),
        ControllerPolicy {
            autosave: AutosavePolicy::AfterCommand,
            persist_inside_lock: false,
            ..default_policy()
        },
        Duration::from_secs(5),
        OverflowPolicy::Drop,
    ));
    let (session, mut rx) = controller.sessions().connect(8);
    controller.subscribe(&session, MODEL).await.unwrap();

    // WHEN a command commits and its write is pending
    let command = {
        let controller = controller.clone();
        tokio::spawn(async move {
            controller
                .handle(MODEL, &json(&set_vendor("Intel")), None)
                .await
        })
    };
    let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(first, Notification::Command(_)));

    // AND another request holds the model while the write completes
    let (handle, held) = controller.repository().lock(MODEL).await.unwrap();
    open.send(()).unwrap();
    for _ in 0..250 {
        if seeded.write_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert_eq!(seeded.write_count(), 1);
    tokio::time::sleep(Duration::from_millis(20)).await;

    // THEN the clean state is not announced until the model is released
    assert!(!handle.is_dirty());
    assert!(rx.try_recv().is_err());
    drop(held);
    command.await.unwrap().unwrap();
    assert_eq!(
        rx.try_recv().unwrap(),
        Notification::DirtyState {
            model_id: MODEL.to_string(),
            dirty: false,
        }
    );
}
