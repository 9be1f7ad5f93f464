//! Container sync worker integration tests against a fake engine.

mod common;

use std::sync::Arc;

use common::{exited, local_image, running, shared_with, target, FakeEngine};
use deviced_core::config::{LifecycleExecHook, LifecycleHook, NetworkDefinition};
use deviced_core::containersync::ContainerSyncWorker;
use deviced_core::reflection::Reflection;
use deviced_core::wake::wake_channel;
use deviced_core::DevicedConfig;
use tokio_util::sync::CancellationToken;

fn worker(
    shared: Arc<deviced_core::SharedState>,
    reflection: Option<Reflection>,
) -> ContainerSyncWorker {
    let (_wake_tx, wake_rx) = wake_channel();
    ContainerSyncWorker::new(shared, wake_rx, reflection, CancellationToken::new())
}

#[tokio::test]
async fn test_creates_and_starts_missing_target() {
    let engine = FakeEngine::new();
    engine.state.lock().unwrap().images = vec![local_image(&["app/web:v2"])];

    let config = DevicedConfig {
        containers: vec![target("web", "app/web", &["v2", "v1"])],
        ..Default::default()
    };
    let shared = shared_with(Arc::clone(&engine), config);
    worker(shared, None).process_once().await;

    let state = engine.state.lock().unwrap();
    assert_eq!(state.created.len(), 1);
    let created = &state.created[0];
    assert!(created.name.starts_with("devd_web_"));
    assert_eq!(created.config.image.as_deref(), Some("app/web:v2"));
    assert_eq!(
        created.config.labels.as_ref().unwrap()["deviced.id"],
        "web"
    );
    assert_eq!(state.started, vec!["created-1".to_string()]);
    assert!(state.stopped.is_empty());
    assert!(state.removed.is_empty());
}

#[tokio::test]
async fn test_no_downgrade_from_best_version() {
    let engine = FakeEngine::new();
    {
        let mut state = engine.state.lock().unwrap();
        state.containers = vec![running("ctr-web", "web", "app/web:v2")];
        state.images = vec![local_image(&["app/web:v2", "app/web:v1"])];
    }

    let config = DevicedConfig {
        containers: vec![target("web", "app/web", &["v2", "v1"])],
        ..Default::default()
    };
    let shared = shared_with(Arc::clone(&engine), config);
    worker(shared, None).process_once().await;

    let state = engine.state.lock().unwrap();
    assert!(state.created.is_empty());
    assert!(state.stopped.is_empty());
    assert!(state.removed.is_empty());
}

#[tokio::test]
async fn test_upgrades_when_better_image_lands() {
    let engine = FakeEngine::new();
    {
        let mut state = engine.state.lock().unwrap();
        state.containers = vec![running("ctr-old", "web", "app/web:v1")];
        state.images = vec![local_image(&["app/web:v1", "app/web:v2"])];
    }

    let mut web = target("web", "app/web", &["v2", "v1"]);
    web.lifecycle_hooks.on_stop = vec![LifecycleHook {
        exec: Some(LifecycleExecHook {
            command: vec!["/bin/drain".to_string()],
            timeout: "1s".to_string(),
        }),
    }];
    let config = DevicedConfig {
        containers: vec![web],
        ..Default::default()
    };
    let shared = shared_with(Arc::clone(&engine), config);
    worker(shared, None).process_once().await;

    let state = engine.state.lock().unwrap();
    // The on-stop hook ran inside the old container before stop + remove.
    assert_eq!(
        state.execs,
        vec![("ctr-old".to_string(), vec!["/bin/drain".to_string()])]
    );
    assert_eq!(state.stopped, vec!["ctr-old".to_string()]);
    assert_eq!(state.removed, vec!["ctr-old".to_string()]);
    assert_eq!(state.created.len(), 1);
    assert_eq!(state.created[0].config.image.as_deref(), Some("app/web:v2"));
    assert_eq!(state.started, vec!["created-1".to_string()]);
}

#[tokio::test]
async fn test_removes_unmatched_container() {
    let engine = FakeEngine::new();
    engine.state.lock().unwrap().containers = vec![running("ctr-ghost", "ghost", "app/old:v9")];

    let shared = shared_with(Arc::clone(&engine), DevicedConfig::default());
    worker(shared, None).process_once().await;

    let state = engine.state.lock().unwrap();
    // No hooks: the target is gone, nothing to consult.
    assert!(state.execs.is_empty());
    assert_eq!(state.stopped, vec!["ctr-ghost".to_string()]);
    assert_eq!(state.removed, vec!["ctr-ghost".to_string()]);
}

#[tokio::test]
async fn test_self_protection_suppresses_delete() {
    let engine = FakeEngine::new();
    engine.state.lock().unwrap().containers = vec![running("ctr-self", "ghost", "app/self:v1")];

    let reflection = Reflection {
        container_id: "ctr-self".to_string(),
    };
    let shared = shared_with(Arc::clone(&engine), DevicedConfig::default());
    worker(shared, Some(reflection)).process_once().await;

    let state = engine.state.lock().unwrap();
    assert!(state.stopped.is_empty());
    assert!(state.removed.is_empty());
}

#[tokio::test]
async fn test_self_delete_allowed_when_configured() {
    let engine = FakeEngine::new();
    engine.state.lock().unwrap().containers = vec![running("ctr-self", "ghost", "app/self:v1")];

    let reflection = Reflection {
        container_id: "ctr-self".to_string(),
    };
    let mut config = DevicedConfig::default();
    config.container_config.allow_self_delete = true;
    let shared = shared_with(Arc::clone(&engine), config);
    worker(shared, Some(reflection)).process_once().await;

    let state = engine.state.lock().unwrap();
    assert_eq!(state.removed, vec!["ctr-self".to_string()]);
}

#[tokio::test]
async fn test_network_gating_skips_creation() {
    let engine = FakeEngine::new();
    engine.state.lock().unwrap().images = vec![local_image(&["app/web:v2"])];

    let mut web = target("web", "app/web", &["v2"]);
    web.docker_host_config.network_mode = Some("custom".to_string());
    let config = DevicedConfig {
        containers: vec![web],
        ..Default::default()
    };
    let shared = shared_with(Arc::clone(&engine), config);
    worker(shared, None).process_once().await;

    let state = engine.state.lock().unwrap();
    assert!(state.created.is_empty());
    assert!(state.started.is_empty());
}

#[tokio::test]
async fn test_declared_network_is_created_and_ungates() {
    let engine = FakeEngine::new();
    engine.state.lock().unwrap().images = vec![local_image(&["app/web:v2"])];

    let mut web = target("web", "app/web", &["v2"]);
    web.docker_host_config.network_mode = Some("custom".to_string());
    let config = DevicedConfig {
        containers: vec![web],
        networks: vec![NetworkDefinition {
            name: "custom".to_string(),
            ..Default::default()
        }],
        ..Default::default()
    };
    let shared = shared_with(Arc::clone(&engine), config);
    worker(shared, None).process_once().await;

    let state = engine.state.lock().unwrap();
    assert_eq!(state.created_networks, vec!["custom".to_string()]);
    assert_eq!(state.created.len(), 1);
    assert_eq!(state.started, vec!["created-1".to_string()]);
}

#[tokio::test]
async fn test_duplicate_targets_resolved_by_score() {
    let engine = FakeEngine::new();
    {
        let mut state = engine.state.lock().unwrap();
        state.containers = vec![
            running("ctr-v1", "web", "app/web:v1"),
            running("ctr-v2", "web", "app/web:v2"),
        ];
        state.images = vec![local_image(&["app/web:v1", "app/web:v2"])];
    }

    let mut web = target("web", "app/web", &["v2", "v1"]);
    web.lifecycle_hooks.on_stop = vec![LifecycleHook {
        exec: Some(LifecycleExecHook {
            command: vec!["/bin/drain".to_string()],
            timeout: String::new(),
        }),
    }];
    let config = DevicedConfig {
        containers: vec![web],
        ..Default::default()
    };
    let shared = shared_with(Arc::clone(&engine), config);
    worker(shared, None).process_once().await;

    let state = engine.state.lock().unwrap();
    // The worse-scored duplicate is gone, with its hook run; the winner is
    // (idempotently) started and nothing new is created.
    assert_eq!(state.removed, vec!["ctr-v1".to_string()]);
    assert_eq!(
        state.execs,
        vec![("ctr-v1".to_string(), vec!["/bin/drain".to_string()])]
    );
    assert_eq!(state.started, vec!["ctr-v2".to_string()]);
    assert!(state.created.is_empty());
}

#[tokio::test]
async fn test_exited_container_removed_without_restart_exited() {
    let engine = FakeEngine::new();
    engine.state.lock().unwrap().containers = vec![exited("ctr-web", "web", "app/web:v2")];

    let config = DevicedConfig {
        containers: vec![target("web", "app/web", &["v2"])],
        ..Default::default()
    };
    let shared = shared_with(Arc::clone(&engine), config);
    worker(shared, None).process_once().await;

    let state = engine.state.lock().unwrap();
    assert_eq!(state.removed, vec!["ctr-web".to_string()]);
}

#[tokio::test]
async fn test_exited_container_kept_with_restart_exited() {
    let engine = FakeEngine::new();
    engine.state.lock().unwrap().containers = vec![exited("ctr-web", "web", "app/web:v2")];

    let mut web = target("web", "app/web", &["v2"]);
    web.restart_exited = true;
    let config = DevicedConfig {
        containers: vec![web],
        ..Default::default()
    };
    let shared = shared_with(Arc::clone(&engine), config);
    worker(shared, None).process_once().await;

    let state = engine.state.lock().unwrap();
    assert!(state.removed.is_empty());
    assert!(state.created.is_empty());
}

#[tokio::test]
async fn test_case_insensitive_label_match() {
    let engine = FakeEngine::new();
    engine.state.lock().unwrap().containers = vec![running("ctr-web", "WEB", "app/web:v2")];

    let config = DevicedConfig {
        containers: vec![target("web", "app/web", &["v2"])],
        ..Default::default()
    };
    let shared = shared_with(Arc::clone(&engine), config);
    worker(shared, None).process_once().await;

    let state = engine.state.lock().unwrap();
    assert!(state.removed.is_empty());
    assert!(state.created.is_empty());
}

#[tokio::test]
async fn test_any_version_accepts_unlisted_tag() {
    let engine = FakeEngine::new();
    engine.state.lock().unwrap().images = vec![local_image(&["app/web:nightly"])];

    let mut web = target("web", "app/web", &[]);
    web.use_any_version = true;
    let config = DevicedConfig {
        containers: vec![web],
        ..Default::default()
    };
    let shared = shared_with(Arc::clone(&engine), config);
    worker(shared, None).process_once().await;

    let state = engine.state.lock().unwrap();
    assert_eq!(state.created.len(), 1);
    assert_eq!(
        state.created[0].config.image.as_deref(),
        Some("app/web:nightly")
    );
}

#[tokio::test]
async fn test_inert_target_does_nothing() {
    let engine = FakeEngine::new();
    engine.state.lock().unwrap().images = vec![local_image(&["app/web:v2"])];

    // No versions, no any-version fallback: nothing may be created.
    let config = DevicedConfig {
        containers: vec![target("web", "app/web", &[])],
        ..Default::default()
    };
    let shared = shared_with(Arc::clone(&engine), config);
    worker(shared, None).process_once().await;

    let state = engine.state.lock().unwrap();
    assert!(state.created.is_empty());
    assert!(state.started.is_empty());
}
