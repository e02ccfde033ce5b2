//! # Section Merging
//!
//! Deep merge of one [`Section`] into another.
//!
//! Nested sections merge key-by-key; every other kind is replaced wholesale.
//! Which side wins a conflict is the [`MergePolicy`]; the default lets the
//! later source override the earlier one, matching multi-path load order.

use crate::field::Field;
use crate::section::Section;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergePolicy {
    /// The overlay (later source) replaces conflicting values.
    #[default]
    LaterOverrides,
    /// The base (earlier source) keeps conflicting values; the overlay only
    /// fills keys that are missing.
    EarlierWins,
}

impl MergePolicy {
    /// Merge `overlay` into `base`. Returns the dotted paths that changed.
    pub fn merge(self, base: &mut Section, overlay: Section) -> Vec<String> {
        let mut changes = Vec::new();
        self.merge_into(base, overlay, "", &mut changes);
        changes
    }

    fn merge_into(self, base: &mut Section, overlay: Section, prefix: &str, changes: &mut Vec<String>) {
        for (key, incoming) in overlay {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", prefix, key)
            };

            match (base.get_mut(&key), incoming) {
                (Some(Field::Section(existing)), Field::Section(incoming)) => {
                    self.merge_into(existing, incoming, &path, changes);
                }
                (Some(existing), incoming) => {
                    if self == MergePolicy::LaterOverrides && *existing != incoming {
                        *existing = incoming;
                        changes.push(path);
                    }
                }
                (None, incoming) => {
                    base.insert(key, incoming);
                    changes.push(path);
                }
            }
        }
    }
}

/// Folds `sources` left to right under `policy`.
pub fn merge_all(policy: MergePolicy, sources: impl IntoIterator<Item = Section>) -> Section {
    let mut merged = Section::new();
    for source in sources {
        policy.merge(&mut merged, source);
    }
    merged
}
