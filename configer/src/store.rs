//! # Configuration Store
//!
//! In-memory key → [`Field`] mapping behind the [`Configurable`] contract.
//!
//! ## Concurrency
//! The backing section sits behind a `parking_lot::RwLock`: any number of
//! readers, one writer. A getter observes a field either before or after a
//! concurrent `set`, never half-written.
//!
//! ## Key Resolution
//! Keys are looked up literally first. When no literal entry exists and a
//! delimiter is configured (default `.`), the key is split at the first
//! delimiter and the remainder is resolved inside the nested section, so
//! `set("a.b", 3)` followed by `get_section("a")?.get_int("b")` yields `3`.
//! With the delimiter disabled keys are fully opaque.

use crate::field::{Field, Kind, Value};
use crate::merge::MergePolicy;
use crate::section::Section;
use chrono::{DateTime, Utc};
use errors::{ConfigError, Result};
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Default nested-key delimiter.
pub const DEFAULT_DELIMITER: char = '.';

/// Read/write access to typed configuration values.
///
/// Implementors provide the untyped primitives; typed getters are derived
/// from [`Configurable::get`].
pub trait Configurable: Send + Sync {
    fn contains_key(&self, key: &str) -> bool;

    fn get(&self, key: &str) -> Result<Field>;

    /// Classifies and stores `value`, overwriting any existing field.
    fn set_value(&self, key: &str, value: Value) -> Result<()>;

    /// Scoped view over the nested section at `key`.
    fn get_section(&self, key: &str) -> Result<ConfigStore>;

    /// Keys at this level, in insertion order.
    fn keys(&self) -> Vec<String>;

    fn set<V: Into<Value>>(&self, key: &str, value: V) -> Result<()>
    where
        Self: Sized,
    {
        self.set_value(key, value.into())
    }

    fn get_string(&self, key: &str) -> Result<String> {
        match self.get(key)? {
            Field::String(s) => Ok(s),
            other => Err(mismatch(key, "string", &other)),
        }
    }

    fn get_string_list(&self, key: &str) -> Result<Vec<String>> {
        match self.get(key)? {
            Field::StringList(v) => Ok(v),
            other if other.is_empty_list() => Ok(Vec::new()),
            other => Err(mismatch(key, "string list", &other)),
        }
    }

    fn get_int(&self, key: &str) -> Result<i64> {
        integer(key, &self.get(key)?, "int64")
    }

    fn get_i32(&self, key: &str) -> Result<i32> {
        integer(key, &self.get(key)?, "int32")
    }

    fn get_uint(&self, key: &str) -> Result<u64> {
        integer(key, &self.get(key)?, "uint64")
    }

    fn get_u32(&self, key: &str) -> Result<u32> {
        integer(key, &self.get(key)?, "uint32")
    }

    fn get_int_list(&self, key: &str) -> Result<Vec<i64>> {
        match self.get(key)? {
            Field::IntList(v) => Ok(v),
            Field::UintList(v) => v
                .iter()
                .map(|&x| i64::try_from(x).map_err(|_| out_of_range(key, "int list", x)))
                .collect(),
            other if other.is_empty_list() => Ok(Vec::new()),
            other => Err(mismatch(key, "int list", &other)),
        }
    }

    fn get_uint_list(&self, key: &str) -> Result<Vec<u64>> {
        match self.get(key)? {
            Field::UintList(v) => Ok(v),
            Field::IntList(v) => v
                .iter()
                .map(|&x| u64::try_from(x).map_err(|_| out_of_range(key, "uint list", x)))
                .collect(),
            other if other.is_empty_list() => Ok(Vec::new()),
            other => Err(mismatch(key, "uint list", &other)),
        }
    }

    fn get_i32_list(&self, key: &str) -> Result<Vec<i32>> {
        integer_list(key, self.get(key)?, "int32 list")
    }

    fn get_u32_list(&self, key: &str) -> Result<Vec<u32>> {
        integer_list(key, self.get(key)?, "uint32 list")
    }

    fn get_bool(&self, key: &str) -> Result<bool> {
        match self.get(key)? {
            Field::Bool(b) => Ok(b),
            other => Err(mismatch(key, "bool", &other)),
        }
    }

    fn get_bool_list(&self, key: &str) -> Result<Vec<bool>> {
        match self.get(key)? {
            Field::BoolList(v) => Ok(v),
            other if other.is_empty_list() => Ok(Vec::new()),
            other => Err(mismatch(key, "bool list", &other)),
        }
    }

    fn get_float(&self, key: &str) -> Result<f64> {
        let field = self.get(key)?;
        field.number().ok_or_else(|| mismatch(key, "float64", &field))
    }

    fn get_f32(&self, key: &str) -> Result<f32> {
        let field = self.get(key)?;
        let value = field.number().ok_or_else(|| mismatch(key, "float32", &field))?;
        narrow_f32(key, "float32", value)
    }

    fn get_float_list(&self, key: &str) -> Result<Vec<f64>> {
        match self.get(key)? {
            Field::FloatList(v) => Ok(v),
            Field::IntList(v) => Ok(v.into_iter().map(|x| x as f64).collect()),
            Field::UintList(v) => Ok(v.into_iter().map(|x| x as f64).collect()),
            other if other.is_empty_list() => Ok(Vec::new()),
            other => Err(mismatch(key, "float list", &other)),
        }
    }

    fn get_f32_list(&self, key: &str) -> Result<Vec<f32>> {
        self.get_float_list(key)?
            .into_iter()
            .map(|v| narrow_f32(key, "float32 list", v))
            .collect()
    }

    fn get_duration(&self, key: &str) -> Result<Duration> {
        match self.get(key)? {
            Field::Duration(d) => Ok(d),
            other => Err(mismatch(key, "duration", &other)),
        }
    }

    fn get_time(&self, key: &str) -> Result<DateTime<Utc>> {
        match self.get(key)? {
            Field::Time(t) => Ok(t),
            other => Err(mismatch(key, "time", &other)),
        }
    }
}

fn mismatch(key: &str, expected: &str, found: &Field) -> ConfigError {
    ConfigError::type_mismatch(key, expected, found.kind())
}

fn out_of_range(key: &str, expected: &str, value: impl std::fmt::Display) -> ConfigError {
    ConfigError::type_mismatch(key, expected, format!("out-of-range value {}", value))
}

fn integer<T: TryFrom<i128>>(key: &str, field: &Field, expected: &str) -> Result<T> {
    let value = field.integer().ok_or_else(|| mismatch(key, expected, field))?;
    T::try_from(value).map_err(|_| out_of_range(key, expected, value))
}

fn integer_list<T: TryFrom<i128>>(key: &str, field: Field, expected: &str) -> Result<Vec<T>> {
    let wide: Vec<i128> = match field {
        Field::IntList(v) => v.into_iter().map(i128::from).collect(),
        Field::UintList(v) => v.into_iter().map(i128::from).collect(),
        other if other.is_empty_list() => Vec::new(),
        other => return Err(mismatch(key, expected, &other)),
    };
    wide.into_iter()
        .map(|v| T::try_from(v).map_err(|_| out_of_range(key, expected, v)))
        .collect()
}

fn narrow_f32(key: &str, expected: &str, value: f64) -> Result<f32> {
    if value.is_finite() && value.abs() > f64::from(f32::MAX) {
        return Err(out_of_range(key, expected, value));
    }
    Ok(value as f32)
}

/// Shared, lock-protected configuration tree.
///
/// Cloning is cheap and yields another handle to the same tree. A store
/// returned by [`Configurable::get_section`] is the same tree seen through a
/// path prefix; writes through it are visible from the parent.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    root: Arc<RwLock<Section>>,
    prefix: Vec<String>,
    delimiter: Option<char>,
    dirty: Arc<AtomicBool>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::with_delimiter(Some(DEFAULT_DELIMITER))
    }

    /// `None` makes keys fully opaque.
    pub fn with_delimiter(delimiter: Option<char>) -> Self {
        Self {
            root: Arc::new(RwLock::new(Section::new())),
            prefix: Vec::new(),
            delimiter,
            dirty: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_section(section: Section) -> Self {
        let store = Self::new();
        *store.root.write() = section;
        store
    }

    pub fn delimiter(&self) -> Option<char> {
        self.delimiter
    }

    /// Path segments of this view below the root; empty for the root store.
    pub fn prefix(&self) -> &[String] {
        &self.prefix
    }

    /// Copy of the section this store addresses.
    pub fn snapshot(&self) -> Section {
        let root = self.root.read();
        scoped(&root, &self.prefix).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        let root = self.root.read();
        scoped(&root, &self.prefix).map_or(0, Section::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the addressed section wholesale.
    pub fn replace(&self, section: Section) -> Result<()> {
        let mut root = self.root.write();
        *scoped_mut(&mut root, &self.prefix, self.delimiter)? = section;
        Ok(())
    }

    /// Deep-merge `overlay` into the addressed section under one write lock.
    pub fn merge(&self, overlay: Section, policy: MergePolicy) -> Result<Vec<String>> {
        let mut root = self.root.write();
        let section = scoped_mut(&mut root, &self.prefix, self.delimiter)?;
        Ok(policy.merge(section, overlay))
    }

    /// Remove a key, returning the previous field.
    pub fn remove(&self, key: &str) -> Result<Option<Field>> {
        let mut root = self.root.write();
        let Some(section) = existing_scope_mut(&mut root, &self.prefix, self.delimiter)? else {
            return Ok(None);
        };
        let removed = remove_key(section, key, self.delimiter);
        if removed.is_some() {
            self.dirty.store(true, Ordering::SeqCst);
        }
        Ok(removed)
    }

    /// True when `set`/`remove` happened since the last [`take_dirty`](Self::take_dirty).
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Clears and returns the dirty flag.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    fn lookup(&self, key: &str) -> Option<Field> {
        let root = self.root.read();
        let section = scoped(&root, &self.prefix)?;
        resolve(section, key, self.delimiter).cloned()
    }
}

impl Configurable for ConfigStore {
    fn contains_key(&self, key: &str) -> bool {
        let root = self.root.read();
        scoped(&root, &self.prefix).is_some_and(|s| resolve(s, key, self.delimiter).is_some())
    }

    fn get(&self, key: &str) -> Result<Field> {
        self.lookup(key)
            .ok_or_else(|| ConfigError::key_not_found(self.full_key(key)))
    }

    fn set_value(&self, key: &str, value: Value) -> Result<()> {
        let field = Field::classify(value);
        {
            let mut root = self.root.write();
            let section = scoped_mut(&mut root, &self.prefix, self.delimiter)?;
            insert_key(section, key, field, self.delimiter);
        }
        self.mark_dirty();
        Ok(())
    }

    fn get_section(&self, key: &str) -> Result<ConfigStore> {
        let root = self.root.read();
        let section = scoped(&root, &self.prefix)
            .ok_or_else(|| ConfigError::key_not_found(self.full_key(key)))?;
        let segments = resolve_segments(section, key, self.delimiter)
            .ok_or_else(|| ConfigError::key_not_found(self.full_key(key)))?;

        let field = segments
            .iter()
            .try_fold(None::<&Field>, |current, segment| {
                let parent = match current {
                    None => section,
                    Some(field) => field.as_section()?,
                };
                parent.get(segment).map(Some)
            })
            .flatten();
        match field {
            Some(Field::Section(_)) => {}
            Some(other) => {
                return Err(ConfigError::type_mismatch(
                    self.full_key(key),
                    Kind::Section,
                    other.kind(),
                ));
            }
            None => return Err(ConfigError::key_not_found(self.full_key(key))),
        }

        let mut prefix = self.prefix.clone();
        prefix.extend(segments);
        Ok(ConfigStore {
            root: Arc::clone(&self.root),
            prefix,
            delimiter: self.delimiter,
            dirty: Arc::clone(&self.dirty),
        })
    }

    fn keys(&self) -> Vec<String> {
        let root = self.root.read();
        scoped(&root, &self.prefix)
            .map(|s| s.keys().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

impl ConfigStore {
    fn full_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            return key.to_string();
        }
        let separator = self.delimiter.unwrap_or(DEFAULT_DELIMITER).to_string();
        let mut full = self.prefix.join(separator.as_str());
        full.push_str(&separator);
        full.push_str(key);
        full
    }
}

fn scoped<'a>(root: &'a Section, prefix: &[String]) -> Option<&'a Section> {
    prefix
        .iter()
        .try_fold(root, |section, segment| section.get(segment)?.as_section())
}

/// Walks a view prefix for writing. Missing sections are recreated; a
/// prefix segment that now holds a non-section field is a mismatch.
fn scoped_mut<'a>(root: &'a mut Section, prefix: &[String], delimiter: Option<char>) -> Result<&'a mut Section> {
    let mut section = root;
    for (depth, segment) in prefix.iter().enumerate() {
        if let Some(field) = section.get(segment) {
            if !field.is_section() {
                return Err(stale_view(prefix, depth, delimiter, field));
            }
        }
        section = section.section_mut(segment);
    }
    Ok(section)
}

/// Like [`scoped_mut`] but never creates sections.
fn existing_scope_mut<'a>(
    root: &'a mut Section,
    prefix: &[String],
    delimiter: Option<char>,
) -> Result<Option<&'a mut Section>> {
    let mut section = root;
    for (depth, segment) in prefix.iter().enumerate() {
        section = match section.get_mut(segment) {
            Some(Field::Section(nested)) => nested,
            Some(other) => return Err(stale_view(prefix, depth, delimiter, other)),
            None => return Ok(None),
        };
    }
    Ok(Some(section))
}

fn stale_view(prefix: &[String], depth: usize, delimiter: Option<char>, found: &Field) -> ConfigError {
    let separator = delimiter.unwrap_or(DEFAULT_DELIMITER).to_string();
    ConfigError::type_mismatch(prefix[..=depth].join(separator.as_str()), Kind::Section, found.kind())
}

fn resolve<'a>(section: &'a Section, key: &str, delimiter: Option<char>) -> Option<&'a Field> {
    if let Some(field) = section.get(key) {
        return Some(field);
    }
    let (head, rest) = key.split_once(delimiter?)?;
    resolve(section.get(head)?.as_section()?, rest, delimiter)
}

/// Same walk as [`resolve`], returning the concrete segments taken.
fn resolve_segments(section: &Section, key: &str, delimiter: Option<char>) -> Option<Vec<String>> {
    if section.contains_key(key) {
        return Some(vec![key.to_string()]);
    }
    let (head, rest) = key.split_once(delimiter?)?;
    let mut tail = resolve_segments(section.get(head)?.as_section()?, rest, delimiter)?;
    tail.insert(0, head.to_string());
    Some(tail)
}

fn insert_key(section: &mut Section, key: &str, field: Field, delimiter: Option<char>) {
    if section.contains_key(key) {
        section.insert(key, field);
        return;
    }
    match delimiter.and_then(|d| key.split_once(d)) {
        Some((head, rest)) => insert_key(section.section_mut(head), rest, field, delimiter),
        None => {
            section.insert(key, field);
        }
    }
}

fn remove_key(section: &mut Section, key: &str, delimiter: Option<char>) -> Option<Field> {
    if section.contains_key(key) {
        return section.remove(key);
    }
    let (head, rest) = key.split_once(delimiter?)?;
    match section.get_mut(head)? {
        Field::Section(nested) => remove_key(nested, rest, delimiter),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{IntWidth, classify};
    use std::thread;

    #[test]
    fn test_missing_key_vs_mismatch() {
        let store = ConfigStore::new();
        store.set("name", "svc").unwrap();

        let err = store.get_int("name").unwrap_err();
        assert!(err.is_type_mismatch(), "{err}");

        let err = store.get_int("absent").unwrap_err();
        assert!(err.is_not_found(), "{err}");
    }

    #[test]
    fn test_dotted_set_then_section_get() {
        let store = ConfigStore::new();
        store.set("a.b", 3).unwrap();

        let a = store.get_section("a").unwrap();
        assert_eq!(a.get_int("b").unwrap(), 3);
        assert_eq!(store.get_int("a.b").unwrap(), 3);
        assert!(store.contains_key("a"));
        assert!(store.contains_key("a.b"));
    }

    #[test]
    fn test_literal_key_wins_over_path() {
        let store = ConfigStore::new();
        let mut section = Section::new();
        section.insert("a.b", classify("literal"));
        section.section_mut("a").insert("b", classify("nested"));
        store.replace(section).unwrap();

        assert_eq!(store.get_string("a.b").unwrap(), "literal");
        store.set("a.b", "updated").unwrap();
        assert_eq!(store.get_string("a.b").unwrap(), "updated");
        assert_eq!(
            store.get_section("a").unwrap().get_string("b").unwrap(),
            "nested"
        );
    }

    #[test]
    fn test_opaque_keys() {
        let store = ConfigStore::with_delimiter(None);
        store.set("a.b", 3).unwrap();
        assert_eq!(store.keys(), vec!["a.b".to_string()]);
        assert!(store.get_section("a").unwrap_err().is_not_found());
    }

    #[test]
    fn test_get_section_on_scalar_is_mismatch() {
        let store = ConfigStore::new();
        store.set("port", 80).unwrap();
        let err = store.get_section("port").unwrap_err();
        assert!(err.is_type_mismatch());
    }

    #[test]
    fn test_section_view_writes_through() {
        let store = ConfigStore::new();
        store.set("db.host", "localhost").unwrap();
        let db = store.get_section("db").unwrap();
        db.set("port", 5432u16).unwrap();
        assert_eq!(store.get_u32("db.port").unwrap(), 5432);
        assert_eq!(db.keys(), vec!["host".to_string(), "port".to_string()]);
    }

    #[test]
    fn test_section_view_key_not_found_reports_full_key() {
        let store = ConfigStore::new();
        store.set("db.host", "localhost").unwrap();
        let db = store.get_section("db").unwrap();
        match db.get("user").unwrap_err() {
            ConfigError::KeyNotFound { key } => assert_eq!(key, "db.user"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_numeric_widening_and_narrowing() {
        let store = ConfigStore::new();
        store.set("small", 7u8).unwrap();
        store.set("big", i64::MAX).unwrap();
        store.set("neg", -1i32).unwrap();
        store.set("ratio", 0.25f32).unwrap();

        assert_eq!(store.get_int("small").unwrap(), 7);
        assert_eq!(store.get_i32("small").unwrap(), 7);
        assert_eq!(store.get_float("small").unwrap(), 7.0);
        assert!(store.get_i32("big").unwrap_err().is_type_mismatch());
        assert!(store.get_uint("neg").unwrap_err().is_type_mismatch());
        assert_eq!(store.get_f32("ratio").unwrap(), 0.25);
        assert!(store.get_int("ratio").unwrap_err().is_type_mismatch());
    }

    #[test]
    fn test_cross_family_getters_fail() {
        let store = ConfigStore::new();
        store.set("flag", "true").unwrap();
        store.set("count", 3).unwrap();
        assert!(store.get_bool("flag").unwrap_err().is_type_mismatch());
        assert!(store.get_string("count").unwrap_err().is_type_mismatch());
        assert!(store.get_duration("count").unwrap_err().is_type_mismatch());
    }

    #[test]
    fn test_list_getters() {
        let store = ConfigStore::new();
        store.set("hosts", vec!["a", "b"]).unwrap();
        store.set("ports", vec![80u16, 443]).unwrap();
        store.set("empty", Vec::<String>::new()).unwrap();

        assert_eq!(store.get_string_list("hosts").unwrap(), vec!["a", "b"]);
        assert_eq!(store.get_int_list("ports").unwrap(), vec![80, 443]);
        assert_eq!(store.get_float_list("ports").unwrap(), vec![80.0, 443.0]);
        assert!(store.get_int_list("empty").unwrap().is_empty());
        assert!(store.get_bool_list("hosts").unwrap_err().is_type_mismatch());
    }

    #[test]
    fn test_narrow_list_getters() {
        let store = ConfigStore::new();
        store.set("ports", vec![80u16, 443]).unwrap();
        store.set("offsets", vec![-1i64, 2]).unwrap();
        store.set("huge", vec![i64::from(i32::MAX) + 1]).unwrap();
        store.set("ratios", vec![0.5f64, 1.0]).unwrap();
        store.set("overflow", vec![f64::MAX]).unwrap();
        store.set("empty", Vec::<bool>::new()).unwrap();

        assert_eq!(store.get_i32_list("ports").unwrap(), vec![80, 443]);
        assert_eq!(store.get_u32_list("ports").unwrap(), vec![80, 443]);
        assert_eq!(store.get_i32_list("offsets").unwrap(), vec![-1, 2]);
        assert!(store.get_u32_list("offsets").unwrap_err().is_type_mismatch());
        assert!(store.get_i32_list("huge").unwrap_err().is_type_mismatch());
        assert_eq!(store.get_f32_list("ratios").unwrap(), vec![0.5f32, 1.0]);
        assert_eq!(store.get_f32_list("ports").unwrap(), vec![80.0f32, 443.0]);
        assert!(store.get_f32_list("overflow").unwrap_err().is_type_mismatch());
        assert!(store.get_i32_list("empty").unwrap().is_empty());
        assert!(store.get_u32_list("ratios").unwrap_err().is_type_mismatch());
    }

    #[test]
    fn test_stale_section_view_does_not_clobber_parent() {
        let store = ConfigStore::new();
        store.set("db.host", "localhost").unwrap();
        let db = store.get_section("db").unwrap();

        store.set("db", 5).unwrap();
        let err = db.set("port", 5432).unwrap_err();
        match err {
            ConfigError::TypeMismatch { key, .. } => assert_eq!(key, "db"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(db.remove("host").unwrap_err().is_type_mismatch());
        assert!(db.replace(Section::new()).unwrap_err().is_type_mismatch());
        assert_eq!(store.get_int("db").unwrap(), 5);
    }

    #[test]
    fn test_view_of_removed_section_recreates_on_write() {
        let store = ConfigStore::new();
        store.set("db.host", "localhost").unwrap();
        let db = store.get_section("db").unwrap();

        assert!(store.remove("db").unwrap().is_some());
        assert!(db.remove("host").unwrap().is_none());
        db.set("port", 5432).unwrap();
        assert_eq!(store.get_int("db.port").unwrap(), 5432);
    }

    #[test]
    fn test_duration_and_time_getters() {
        let store = ConfigStore::new();
        let now = Utc::now();
        store.set("timeout", Duration::from_secs(5)).unwrap();
        store.set("started", now).unwrap();
        assert_eq!(store.get_duration("timeout").unwrap(), Duration::from_secs(5));
        assert_eq!(store.get_time("started").unwrap(), now);
    }

    #[test]
    fn test_set_overwrites_and_preserves_width() {
        let store = ConfigStore::new();
        store.set("n", 1i16).unwrap();
        assert_eq!(
            store.get("n").unwrap(),
            Field::Int {
                width: IntWidth::W16,
                value: 1
            }
        );
        store.set("n", "now a string").unwrap();
        assert_eq!(store.get("n").unwrap().kind(), Kind::String);
    }

    #[test]
    fn test_unknown_is_storable() {
        let store = ConfigStore::new();
        store.set("nothing", None::<i32>).unwrap();
        assert_eq!(store.get("nothing").unwrap().kind(), Kind::Unknown);
    }

    #[test]
    fn test_dirty_tracking() {
        let store = ConfigStore::new();
        assert!(!store.is_dirty());
        store.set("a", 1).unwrap();
        assert!(store.take_dirty());
        assert!(!store.is_dirty());
        assert!(store.remove("a").unwrap().is_some());
        assert!(store.is_dirty());
    }

    #[test]
    fn test_concurrent_disjoint_sets_are_not_lost() {
        let store = ConfigStore::new();
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                thread::spawn(move || {
                    for j in 0..50 {
                        store.set(&format!("k{}_{}", i, j), j).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 16 * 50);
        assert_eq!(store.get_int("k15_49").unwrap(), 49);
    }

    #[test]
    fn test_concurrent_reader_sees_old_or_new() {
        let store = ConfigStore::new();
        store.set("list", vec![0i64; 64]).unwrap();

        let writer = {
            let store = store.clone();
            thread::spawn(move || {
                for round in 1..200i64 {
                    store.set("list", vec![round; 64]).unwrap();
                }
            })
        };
        for _ in 0..200 {
            let values = store.get_int_list("list").unwrap();
            assert_eq!(values.len(), 64);
            assert!(values.iter().all(|&v| v == values[0]));
        }
        writer.join().unwrap();
    }
}
