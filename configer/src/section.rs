//! Insertion-ordered string → [`Field`] map.
//!
//! Lookup goes through a hash index; iteration follows insertion order so
//! encoders produce the same bytes for the same sequence of writes.

use crate::field::Field;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct Section {
    entries: Vec<(String, Field)>,
    index: HashMap<String, usize>,
}

impl Section {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Field> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Field> {
        match self.index.get(key) {
            Some(&i) => Some(&mut self.entries[i].1),
            None => None,
        }
    }

    /// Inserts or overwrites. An overwritten key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, field: Field) -> Option<Field> {
        let key = key.into();
        if let Some(&i) = self.index.get(&key) {
            return Some(std::mem::replace(&mut self.entries[i].1, field));
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, field));
        None
    }

    pub fn remove(&mut self, key: &str) -> Option<Field> {
        let i = self.index.remove(key)?;
        let (_, field) = self.entries.remove(i);
        for slot in self.index.values_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        Some(field)
    }

    /// Returns the nested section at `key`, creating it (or replacing a
    /// non-section value) when needed.
    pub fn section_mut(&mut self, key: &str) -> &mut Section {
        let needs_section = !matches!(self.get(key), Some(Field::Section(_)));
        if needs_section {
            self.insert(key, Field::Section(Section::new()));
        }
        let i = self.index[key];
        match &mut self.entries[i].1 {
            Field::Section(section) => section,
            _ => unreachable!("entry was just replaced with a section"),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}

/// Key order is irrelevant to equality.
impl PartialEq for Section {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, field)| other.get(key).is_some_and(|f| f == field))
    }
}

impl FromIterator<(String, Field)> for Section {
    fn from_iter<I: IntoIterator<Item = (String, Field)>>(iter: I) -> Self {
        let mut section = Section::new();
        section.extend(iter);
        section
    }
}

impl Extend<(String, Field)> for Section {
    fn extend<I: IntoIterator<Item = (String, Field)>>(&mut self, iter: I) {
        for (key, field) in iter {
            self.insert(key, field);
        }
    }
}

impl IntoIterator for Section {
    type Item = (String, Field);
    type IntoIter = std::vec::IntoIter<(String, Field)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
