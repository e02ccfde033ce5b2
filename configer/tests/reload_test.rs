use configer::{
    ConfigError, Configurable, FileChangedStrategy, FileConfigManager, ManualStrategy, WatchOptions,
};
use serde_json::json;
use std::fs::File;
use std::time::{Duration, SystemTime};
use testing::{JsonCodec, ScriptedStrategy, StrategyCall, config_dir, write_config};

fn fast_watch() -> WatchOptions {
    WatchOptions {
        poll_interval: Duration::from_millis(50),
        fs_events: false,
    }
}

async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

fn bump_mtime(path: &std::path::Path) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(60))
        .unwrap();
}

#[tokio::test]
async fn test_strategy_is_bound_and_initialized() {
    let (strategy, probe) = ScriptedStrategy::new();
    let manager = FileConfigManager::builder(JsonCodec::new())
        .strategy(strategy)
        .build()
        .await
        .unwrap();

    assert!(manager.has_reload_strategy().await);
    assert_eq!(
        probe.calls(),
        vec![StrategyCall::SetConfiguration, StrategyCall::Init]
    );

    let dir = config_dir();
    let path = write_config(dir.path(), "app.json", &json!({"a": 1}));
    manager.load(&[&path]).await.unwrap();
    assert_eq!(probe.sources().unwrap().loaded_paths(), vec![path]);
}

#[tokio::test]
async fn test_reload_not_due_does_nothing() {
    let dir = config_dir();
    let path = write_config(dir.path(), "app.json", &json!({"port": 80}));
    let (strategy, probe) = ScriptedStrategy::new();
    probe.answer(&[false]);

    let manager = FileConfigManager::builder(JsonCodec::new())
        .strategy(strategy)
        .build()
        .await
        .unwrap();
    manager.load(&[&path]).await.unwrap();
    write_config(dir.path(), "app.json", &json!({"port": 9000}));

    assert!(!manager.reload().await.unwrap());
    assert_eq!(manager.get_int("port").unwrap(), 80);
    assert_eq!(probe.count(StrategyCall::ReloadingPerformed), 0);
}

#[tokio::test]
async fn test_reload_due_replaces_store_and_acknowledges() {
    let dir = config_dir();
    let path = write_config(dir.path(), "app.json", &json!({"port": 80, "old": true}));
    let (strategy, probe) = ScriptedStrategy::new();
    probe.answer(&[true]);

    let manager = FileConfigManager::builder(JsonCodec::new())
        .strategy(strategy)
        .build()
        .await
        .unwrap();
    manager.load(&[&path]).await.unwrap();
    write_config(dir.path(), "app.json", &json!({"port": 9000}));

    assert!(manager.reload().await.unwrap());
    assert_eq!(manager.get_int("port").unwrap(), 9000);
    assert!(!manager.contains_key("old"));
    assert_eq!(probe.count(StrategyCall::ReloadingPerformed), 1);
}

#[tokio::test]
async fn test_failed_reload_is_not_acknowledged() {
    let dir = config_dir();
    let path = write_config(dir.path(), "app.json", &json!({"port": 80}));
    let (strategy, probe) = ScriptedStrategy::new();
    probe.answer(&[true]);

    let manager = FileConfigManager::builder(JsonCodec::new())
        .strategy(strategy)
        .build()
        .await
        .unwrap();
    manager.load(&[&path]).await.unwrap();
    std::fs::remove_file(&path).unwrap();

    let err = manager.reload().await.unwrap_err();
    assert!(err.is_io());
    assert_eq!(manager.get_int("port").unwrap(), 80);
    assert_eq!(probe.count(StrategyCall::ReloadingPerformed), 0);
}

#[tokio::test]
async fn test_strategy_error_propagates() {
    let (strategy, probe) = ScriptedStrategy::new();
    probe.fail_next();
    let manager = FileConfigManager::builder(JsonCodec::new())
        .strategy(strategy)
        .build()
        .await
        .unwrap();

    let err = manager.reload().await.unwrap_err();
    assert!(matches!(err, ConfigError::StrategyError { .. }));
}

#[tokio::test]
async fn test_reload_without_strategy_always_reloads() {
    let dir = config_dir();
    let path = write_config(dir.path(), "app.json", &json!({"port": 80}));
    let manager = FileConfigManager::new(JsonCodec::new()).await.unwrap();

    assert!(!manager.reload().await.unwrap(), "nothing loaded yet");

    manager.load(&[&path]).await.unwrap();
    manager.set("port", 1_i64).unwrap();
    manager.set("unsynced", true).unwrap();
    write_config(dir.path(), "app.json", &json!({"port": 9000}));

    assert!(manager.reload().await.unwrap());
    assert_eq!(manager.get_int("port").unwrap(), 9000);
    assert!(manager.get_bool("unsynced").unwrap());
    assert!(manager.store().is_dirty());
}

#[tokio::test]
async fn test_reload_keeps_every_loaded_file() {
    let dir = config_dir();
    let a = write_config(dir.path(), "a.json", &json!({"from_a": 1, "shared": "a"}));
    let b = write_config(dir.path(), "b.json", &json!({"from_b": 2, "shared": "b"}));
    let manager = FileConfigManager::new(JsonCodec::new()).await.unwrap();

    manager.load(&[&a]).await.unwrap();
    manager.load(&[&b]).await.unwrap();
    write_config(dir.path(), "a.json", &json!({"from_a": 10, "shared": "a"}));

    assert!(manager.reload().await.unwrap());
    assert_eq!(manager.get_int("from_a").unwrap(), 10);
    assert_eq!(manager.get_int("from_b").unwrap(), 2);
    assert_eq!(manager.get_string("shared").unwrap(), "b");
    assert_eq!(manager.sources().loaded_paths(), vec![a, b]);
}

#[tokio::test]
async fn test_reload_keeps_stream_and_merged_overlays() {
    let dir = config_dir();
    let path = write_config(dir.path(), "app.json", &json!({"port": 80, "gone": true}));
    let manager = FileConfigManager::new(JsonCodec::new()).await.unwrap();
    manager.load(&[&path]).await.unwrap();
    manager
        .load_stream(&br#"{"stream_key": true}"#[..])
        .await
        .unwrap();

    let other = FileConfigManager::new(JsonCodec::new()).await.unwrap();
    other.set("merged_key", "m").unwrap();
    manager.merge(&other).await.unwrap();

    write_config(dir.path(), "app.json", &json!({"port": 9000}));
    assert!(manager.reload().await.unwrap());

    assert_eq!(manager.get_int("port").unwrap(), 9000);
    assert!(!manager.contains_key("gone"));
    assert!(manager.get_bool("stream_key").unwrap());
    assert_eq!(manager.get_string("merged_key").unwrap(), "m");
}

#[tokio::test]
async fn test_file_changed_tracks_files_from_every_load() {
    let dir = config_dir();
    let a = write_config(dir.path(), "a.json", &json!({"from_a": 1}));
    let b = write_config(dir.path(), "b.json", &json!({"from_b": 2}));
    let manager = FileConfigManager::builder(JsonCodec::new())
        .strategy(FileChangedStrategy::new(Duration::ZERO))
        .build()
        .await
        .unwrap();

    manager.load(&[&a]).await.unwrap();
    manager.load(&[&b]).await.unwrap();
    // first check starts tracking both files
    assert!(!manager.reload().await.unwrap());

    write_config(dir.path(), "a.json", &json!({"from_a": 10}));
    bump_mtime(&a);
    assert!(manager.reload().await.unwrap());
    assert_eq!(manager.get_int("from_a").unwrap(), 10);
    assert_eq!(manager.get_int("from_b").unwrap(), 2);
}

#[tokio::test]
async fn test_manual_strategy_trigger() {
    let dir = config_dir();
    let path = write_config(dir.path(), "app.json", &json!({"port": 80}));
    let strategy = ManualStrategy::new();
    let trigger = strategy.trigger_handle();

    let manager = FileConfigManager::builder(JsonCodec::new())
        .strategy(strategy)
        .build()
        .await
        .unwrap();
    manager.load(&[&path]).await.unwrap();
    write_config(dir.path(), "app.json", &json!({"port": 9000}));

    assert!(!manager.reload().await.unwrap());
    trigger.trigger();
    assert!(manager.reload().await.unwrap());
    assert_eq!(manager.get_int("port").unwrap(), 9000);
    assert!(!manager.reload().await.unwrap());
}

#[tokio::test]
async fn test_watch_without_strategy_is_a_no_op() {
    let dir = config_dir();
    let path = write_config(dir.path(), "app.json", &json!({"port": 80}));
    let manager = FileConfigManager::new(JsonCodec::new()).await.unwrap();

    manager.watch(&[&path]).await.unwrap();
    assert!(!manager.is_watching().await);
}

#[tokio::test]
async fn test_watch_reloads_until_unwatched() {
    let dir = config_dir();
    let path = write_config(dir.path(), "app.json", &json!({"port": 80}));
    let (strategy, probe) = ScriptedStrategy::new();
    probe.set_fallback(true);

    let manager = FileConfigManager::builder(JsonCodec::new())
        .strategy(strategy)
        .watch_options(fast_watch())
        .build()
        .await
        .unwrap();
    manager.load(&[&path]).await.unwrap();
    manager.watch(&[&path]).await.unwrap();
    assert!(manager.is_watching().await);

    write_config(dir.path(), "app.json", &json!({"port": 9000}));
    assert!(eventually(|| manager.get_int("port").ok() == Some(9000)).await);

    manager.unwatch().await;
    assert!(!manager.is_watching().await);
    let checks = probe.count(StrategyCall::NeedReloading);

    write_config(dir.path(), "app.json", &json!({"port": 1}));
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(probe.count(StrategyCall::NeedReloading), checks);
    assert_eq!(manager.get_int("port").unwrap(), 9000);
}

#[tokio::test]
async fn test_overlapping_watch_calls_leave_one_task() {
    let dir = config_dir();
    let path = write_config(dir.path(), "app.json", &json!({"port": 80}));
    let (strategy, probe) = ScriptedStrategy::new();
    probe.set_fallback(true);

    let manager = FileConfigManager::builder(JsonCodec::new())
        .strategy(strategy)
        .watch_options(fast_watch())
        .build()
        .await
        .unwrap();
    manager.load(&[&path]).await.unwrap();

    let paths = [&path];
    let (first, second) = tokio::join!(manager.watch(&paths), manager.watch(&paths));
    first.unwrap();
    second.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    manager.unwatch().await;
    let checks = probe.count(StrategyCall::NeedReloading);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(probe.count(StrategyCall::NeedReloading), checks);
}

#[tokio::test]
async fn test_watch_keeps_running_after_failed_reload() {
    let dir = config_dir();
    let path = write_config(dir.path(), "app.json", &json!({"port": 80}));
    let (strategy, probe) = ScriptedStrategy::new();
    probe.set_fallback(true);

    let manager = FileConfigManager::builder(JsonCodec::new())
        .strategy(strategy)
        .watch_options(fast_watch())
        .build()
        .await
        .unwrap();
    manager.load(&[&path]).await.unwrap();
    manager.watch(&[&path]).await.unwrap();

    std::fs::write(&path, b"{ broken").unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(manager.is_watching().await);
    assert_eq!(manager.get_int("port").unwrap(), 80);

    write_config(dir.path(), "app.json", &json!({"port": 7}));
    assert!(eventually(|| manager.get_int("port").ok() == Some(7)).await);
    manager.unwatch().await;
}

#[tokio::test]
async fn test_file_changed_strategy_end_to_end() {
    let dir = config_dir();
    let path = write_config(dir.path(), "app.json", &json!({"port": 80}));

    let manager = FileConfigManager::builder(JsonCodec::new())
        .strategy(FileChangedStrategy::new(Duration::ZERO))
        .watch_options(fast_watch())
        .build()
        .await
        .unwrap();
    manager.load(&[&path]).await.unwrap();
    manager.watch(&[&path]).await.unwrap();

    // first poll records the newly loaded file without reloading
    tokio::time::sleep(Duration::from_millis(150)).await;
    write_config(dir.path(), "app.json", &json!({"port": 9000}));
    bump_mtime(&path);

    assert!(eventually(|| manager.get_int("port").ok() == Some(9000)).await);
    manager.unwatch().await;
}

#[tokio::test]
async fn test_dropping_manager_ends_watch() {
    let dir = config_dir();
    let path = write_config(dir.path(), "app.json", &json!({"port": 80}));
    let (strategy, probe) = ScriptedStrategy::new();
    probe.set_fallback(false);

    let manager = FileConfigManager::builder(JsonCodec::new())
        .strategy(strategy)
        .watch_options(fast_watch())
        .build()
        .await
        .unwrap();
    manager.watch(&[&path]).await.unwrap();
    drop(manager);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let checks = probe.count(StrategyCall::NeedReloading);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(probe.count(StrategyCall::NeedReloading), checks);
}
