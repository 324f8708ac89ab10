//! Stable column indices shared across format layers.
//!
//! A base layer registers its columns first; a derived layer extends the
//! base registry and appends its own. Indices handed out by the base stay
//! valid in every registry built on top of it, so a base layer can read its
//! tokens from a row assembled for the derived layer.

use std::collections::HashMap;
use std::sync::Arc;

use bitvec::prelude::*;

use crate::errors::{CsvError, Result};

/// Joins a scope prefix and a column name, as in `stats.min`.
pub const SCOPE_SEPARATOR: char = '.';

/// Prefix `name` with `scope`, if there is one.
pub fn scope(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}{SCOPE_SEPARATOR}{name}"),
        None => name.to_string(),
    }
}

/// The part of `name` after `prefix` and the scope separator.
pub fn unscope<'n>(prefix: Option<&str>, name: &'n str) -> Option<&'n str> {
    match prefix {
        Some(prefix) => name
            .strip_prefix(prefix)?
            .strip_prefix(SCOPE_SEPARATOR)
            .filter(|rest| !rest.is_empty()),
        None => Some(name),
    }
}

/// Append-only mapping from column names to zero-based indices.
///
/// Build it with [`register`](Self::register), then share it behind an
/// [`Arc`]. Derived registries keep that `Arc` and only own the names they
/// add themselves.
#[derive(Debug, Default)]
pub struct ColumnRegistry {
    base: Option<Arc<ColumnRegistry>>,
    offset: usize,
    names: Vec<String>,
    lookup: HashMap<String, usize>,
    optional: BitVec,
}

impl ColumnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry whose first indices are exactly those of `base`.
    pub fn extend(base: Arc<ColumnRegistry>) -> Self {
        Self {
            offset: base.len(),
            base: Some(base),
            ..Self::default()
        }
    }

    /// A base registry holding `names` as required columns, in order.
    pub fn with_columns<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut registry = Self::new();
        for name in names {
            registry.register(name.as_ref())?;
        }
        Ok(registry)
    }

    /// Register a column every header must contain.
    ///
    /// Registering a known name returns its existing index.
    pub fn register(&mut self, name: &str) -> Result<usize> {
        self.insert(name, false)
    }

    /// Register a column a header may leave out. Rows of such a file read
    /// the column as empty.
    pub fn register_optional(&mut self, name: &str) -> Result<usize> {
        self.insert(name, true)
    }

    fn insert(&mut self, name: &str, optional: bool) -> Result<usize> {
        if name.is_empty() || name.trim() != name || name.contains(['\n', '\r']) {
            return Err(CsvError::column(format!("invalid column name {name:?}")));
        }
        if let Some(index) = self.get(name) {
            if self.is_optional(index) != optional {
                return Err(CsvError::column(format!(
                    "column {name:?} is already registered at {index} as {}",
                    if optional { "required" } else { "optional" }
                )));
            }
            return Ok(index);
        }
        let index = self.len();
        self.names.push(name.to_string());
        self.lookup.insert(name.to_string(), index);
        self.optional.push(optional);
        Ok(index)
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        match self.lookup.get(name) {
            Some(index) => Some(*index),
            None => self.base.as_ref()?.get(name),
        }
    }

    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.get(name)
            .ok_or_else(|| CsvError::column(format!("unknown column {name:?}")))
    }

    pub fn name_of(&self, index: usize) -> Option<&str> {
        if index < self.offset {
            self.base.as_ref()?.name_of(index)
        } else {
            self.names.get(index - self.offset).map(String::as_str)
        }
    }

    pub fn is_optional(&self, index: usize) -> bool {
        if index < self.offset {
            self.base
                .as_ref()
                .map_or(false, |base| base.is_optional(index))
        } else {
            self.optional
                .get(index - self.offset)
                .map_or(false, |bit| *bit)
        }
    }

    pub fn len(&self) -> usize {
        self.offset + self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn base(&self) -> Option<&Arc<ColumnRegistry>> {
        self.base.as_ref()
    }

    /// All `(index, name)` pairs, base columns first.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> + '_ {
        (0..self.len()).filter_map(move |index| Some((index, self.name_of(index)?)))
    }

    pub fn required(&self) -> impl Iterator<Item = (usize, &str)> + '_ {
        self.iter().filter(move |(index, _)| !self.is_optional(*index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent() {
        let mut registry = ColumnRegistry::new();
        assert_eq!(registry.register("a"), Ok(0));
        assert_eq!(registry.register("b"), Ok(1));
        assert_eq!(registry.register("a"), Ok(0));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.index_of("b"), Ok(1));
        assert_eq!(registry.name_of(1), Some("b"));
        assert_eq!(registry.name_of(2), None);
    }

    #[test]
    fn test_unknown_column() {
        let registry = ColumnRegistry::with_columns(["a"]).unwrap();
        assert_eq!(
            registry.index_of("z"),
            Err(CsvError::Column("unknown column \"z\"".to_string()))
        );
    }

    #[test]
    fn test_extend_keeps_base_indices() {
        let base = Arc::new(ColumnRegistry::with_columns(["a", "b"]).unwrap());
        let mut derived = ColumnRegistry::extend(Arc::clone(&base));
        assert_eq!(derived.register("c"), Ok(2));
        assert_eq!(derived.register("d"), Ok(3));
        assert_eq!(derived.register("a"), Ok(0));
        assert_eq!(derived.index_of("b"), Ok(1));
        assert_eq!(
            derived.iter().collect::<Vec<_>>(),
            vec![(0, "a"), (1, "b"), (2, "c"), (3, "d")]
        );
        // The base is untouched.
        assert_eq!(base.len(), 2);
        assert_eq!(base.get("c"), None);
    }

    #[test]
    fn test_two_derivations_share_a_base() {
        let base = Arc::new(ColumnRegistry::with_columns(["n"]).unwrap());
        let mut left = ColumnRegistry::extend(Arc::clone(&base));
        let mut right = ColumnRegistry::extend(Arc::clone(&base));
        assert_eq!(left.register("x"), Ok(1));
        assert_eq!(right.register("y"), Ok(1));
        assert_eq!(left.get("y"), None);
        assert_eq!(right.index_of("n"), Ok(0));
    }

    #[test]
    fn test_optional_columns() {
        let mut registry = ColumnRegistry::new();
        registry.register("a").unwrap();
        assert_eq!(registry.register_optional("b"), Ok(1));
        assert!(!registry.is_optional(0));
        assert!(registry.is_optional(1));
        assert_eq!(registry.required().collect::<Vec<_>>(), vec![(0, "a")]);

        let mut derived = ColumnRegistry::extend(Arc::new(registry));
        assert!(derived.is_optional(1));
        assert!(derived.register_optional("a").is_err());
        assert!(derived.register("b").is_err());
        assert_eq!(derived.register_optional("b"), Ok(1));
    }

    #[test]
    fn test_invalid_names() {
        let mut registry = ColumnRegistry::new();
        assert!(registry.register("").is_err());
        assert!(registry.register(" a").is_err());
        assert!(registry.register("a\nb").is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_scope() {
        assert_eq!(scope(Some("stats"), "min"), "stats.min");
        assert_eq!(scope(None, "min"), "min");
        assert_eq!(unscope(Some("stats"), "stats.min"), Some("min"));
        assert_eq!(unscope(Some("stats"), "statsmin"), None);
        assert_eq!(unscope(Some("stats"), "stats."), None);
        assert_eq!(unscope(None, "min"), Some("min"));
    }
}
