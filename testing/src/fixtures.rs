use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

pub fn unique_id(prefix: &str) -> String {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}", prefix, id)
}

/// Fresh temp directory; removed when dropped.
pub fn config_dir() -> TempDir {
    tempfile::Builder::new()
        .prefix(&unique_id("configer"))
        .tempdir()
        .expect("Failed to create temp config dir")
}

/// Write `value` as pretty JSON to `dir/name` and return the path.
pub fn write_config(dir: &Path, name: &str, value: &serde_json::Value) -> PathBuf {
    let path = dir.join(name);
    let body = serde_json::to_vec_pretty(value).expect("Failed to serialize fixture");
    std::fs::write(&path, body).expect("Failed to write fixture");
    path
}

/// Write raw bytes to `dir/name` and return the path.
pub fn write_raw(dir: &Path, name: &str, body: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).expect("Failed to write fixture");
    path
}

/// Read a JSON file back for assertions.
pub fn read_json(path: &Path) -> serde_json::Value {
    let body = std::fs::read(path).expect("Failed to read fixture");
    serde_json::from_slice(&body).expect("Fixture is not valid JSON")
}
