//! The time-indexed tree of legislative constants.

use super::{ParameterError, ParameterValue};
use crate::math::BracketScale;
use chrono::NaiveDate;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Breakpoint {
    pub effective_from: NaiveDate,
    pub value: ParameterValue,
}

/// A leaf parameter: breakpoints kept strictly ascending by date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameter {
    breakpoints: Vec<Breakpoint>,
}

impl Parameter {
    pub fn breakpoints(&self) -> &[Breakpoint] { &self.breakpoints }

    /// The latest breakpoint with `effective_from <= date`; the lower bound is inclusive.
    pub fn value_at(&self, date: NaiveDate) -> Option<&ParameterValue> {
        let idx = self.breakpoints.partition_point(|b| b.effective_from <= date);
        idx.checked_sub(1).map(|i| &self.breakpoints[i].value)
    }

    /// Returns the clashing date when a breakpoint already exists there.
    fn insert(&mut self, effective_from: NaiveDate, value: ParameterValue) -> Result<(), NaiveDate> {
        let idx = self.breakpoints.partition_point(|b| b.effective_from < effective_from);
        if self.breakpoints.get(idx).is_some_and(|b| b.effective_from == effective_from) {
            return Err(effective_from);
        }
        self.breakpoints.insert(idx, Breakpoint { effective_from, value });
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParameterNode {
    Leaf(Parameter),
    Group(BTreeMap<String, ParameterNode>),
}

/// Read-only after load; share it by reference across sessions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterStore {
    root: BTreeMap<String, ParameterNode>,
    leaf_count: usize,
}

impl ParameterStore {
    pub fn new() -> Self { Self::default() }
    pub fn leaf_count(&self) -> usize { self.leaf_count }

    pub fn resolve(&self, path: &str, date: NaiveDate) -> Result<&ParameterValue, ParameterError> {
        resolve_in(&self.root, "", path, date)
    }

    pub fn number(&self, path: &str, date: NaiveDate) -> Result<f64, ParameterError> {
        self.at(date).number(path)
    }

    pub fn flag(&self, path: &str, date: NaiveDate) -> Result<bool, ParameterError> {
        self.at(date).flag(path)
    }

    pub fn scale(&self, path: &str, date: NaiveDate) -> Result<&BracketScale, ParameterError> {
        self.at(date).scale(path)
    }

    /// A view of the whole tree as of `date`.
    pub fn at(&self, date: NaiveDate) -> ParameterView<'_> {
        ParameterView { group: &self.root, prefix: String::new(), date }
    }

    pub fn node(&self, path: &str) -> Result<&ParameterNode, ParameterError> {
        walk(&self.root, "", path)
    }

    /// Dot-separated paths of every leaf, in lexical order.
    pub fn leaf_paths(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.leaf_count);
        collect_leaves(&self.root, "", &mut out);
        out
    }

    pub(crate) fn insert(&mut self, path: &str, effective_from: NaiveDate, value: ParameterValue) -> Result<(), ParameterError> {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(ParameterError::EmptyPath(path.to_string()));
        }
        let conflict = || ParameterError::PathConflict { path: path.to_string() };

        let (leaf_name, parents) = segments.split_last().ok_or_else(|| ParameterError::EmptyPath(path.to_string()))?;
        let mut group = &mut self.root;
        for segment in parents {
            let entry = group
                .entry((*segment).to_string())
                .or_insert_with(|| ParameterNode::Group(BTreeMap::new()));
            group = match entry {
                ParameterNode::Group(children) => children,
                ParameterNode::Leaf(_) => return Err(conflict()),
            };
        }

        let entry = group.entry((*leaf_name).to_string()).or_insert_with(|| {
            self.leaf_count += 1;
            ParameterNode::Leaf(Parameter::default())
        });
        match entry {
            ParameterNode::Leaf(param) => param.insert(effective_from, value).map_err(|date| {
                ParameterError::DuplicateBreakpoint { path: path.to_string(), date }
            }),
            ParameterNode::Group(_) => Err(conflict()),
        }
    }
}

/// A dated window onto a parameter group, for relative lookups such as
/// `view.child("taxes.tax_credits")?.number("max")`.
#[derive(Debug, Clone)]
pub struct ParameterView<'a> {
    group: &'a BTreeMap<String, ParameterNode>,
    prefix: String,
    date: NaiveDate,
}

impl<'a> ParameterView<'a> {
    pub fn date(&self) -> NaiveDate { self.date }

    pub fn child(&self, path: &str) -> Result<ParameterView<'a>, ParameterError> {
        let full = join(&self.prefix, path);
        match walk(self.group, &self.prefix, path)? {
            ParameterNode::Group(children) => Ok(ParameterView { group: children, prefix: full, date: self.date }),
            ParameterNode::Leaf(_) => Err(ParameterError::TypeMismatch { path: full, expected: "group", found: "leaf" }),
        }
    }

    pub fn get(&self, path: &str) -> Result<&'a ParameterValue, ParameterError> {
        resolve_in(self.group, &self.prefix, path, self.date)
    }

    pub fn number(&self, path: &str) -> Result<f64, ParameterError> {
        let value = self.get(path)?;
        value.as_number().ok_or_else(|| self.mismatch(path, "number", value))
    }

    pub fn flag(&self, path: &str) -> Result<bool, ParameterError> {
        let value = self.get(path)?;
        value.as_bool().ok_or_else(|| self.mismatch(path, "bool", value))
    }

    pub fn scale(&self, path: &str) -> Result<&'a BracketScale, ParameterError> {
        let value = self.get(path)?;
        value.as_scale().ok_or_else(|| self.mismatch(path, "scale", value))
    }

    fn mismatch(&self, path: &str, expected: &'static str, found: &ParameterValue) -> ParameterError {
        ParameterError::TypeMismatch { path: join(&self.prefix, path), expected, found: found.kind() }
    }
}

fn join(prefix: &str, path: &str) -> String {
    if prefix.is_empty() { path.to_string() } else { format!("{prefix}.{path}") }
}

/// Descends one segment at a time; the first missing segment fails the lookup.
fn walk<'a>(
    root: &'a BTreeMap<String, ParameterNode>,
    prefix: &str,
    path: &str,
) -> Result<&'a ParameterNode, ParameterError> {
    let unknown = || ParameterError::UnknownParameter { path: join(prefix, path) };
    let mut segments = path.split('.');
    let first = segments.next().ok_or_else(unknown)?;
    let mut node = root.get(first).ok_or_else(unknown)?;
    for segment in segments {
        node = match node {
            ParameterNode::Group(children) => children.get(segment).ok_or_else(unknown)?,
            ParameterNode::Leaf(_) => return Err(unknown()),
        };
    }
    Ok(node)
}

fn resolve_in<'a>(
    root: &'a BTreeMap<String, ParameterNode>,
    prefix: &str,
    path: &str,
    date: NaiveDate,
) -> Result<&'a ParameterValue, ParameterError> {
    match walk(root, prefix, path)? {
        ParameterNode::Leaf(param) => param
            .value_at(date)
            .ok_or_else(|| ParameterError::ParameterNotFound { path: join(prefix, path), date }),
        ParameterNode::Group(_) => Err(ParameterError::GroupPath { path: join(prefix, path) }),
    }
}

fn collect_leaves(group: &BTreeMap<String, ParameterNode>, prefix: &str, out: &mut Vec<String>) {
    for (name, node) in group {
        let path = join(prefix, name);
        match node {
            ParameterNode::Leaf(_) => out.push(path),
            ParameterNode::Group(children) => collect_leaves(children, &path, out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn store() -> ParameterStore {
        let mut s = ParameterStore::new();
        s.insert("taxes.rate", date(2022, 1, 1), 0.20.into()).unwrap();
        s.insert("taxes.rate", date(2024, 1, 1), 0.25.into()).unwrap();
        s.insert("taxes.rate", date(2023, 7, 1), 0.22.into()).unwrap();
        s.insert("taxes.credits.max", date(2024, 1, 1), 3_000.0.into()).unwrap();
        s.insert("general.indexed", date(2020, 1, 1), true.into()).unwrap();
        s
    }

    #[test]
    fn test_latest_breakpoint_applies() {
        let s = store();
        assert_eq!(s.number("taxes.rate", date(2022, 6, 1)).unwrap(), 0.20);
        assert_eq!(s.number("taxes.rate", date(2023, 12, 31)).unwrap(), 0.22);
        assert_eq!(s.number("taxes.rate", date(2030, 1, 1)).unwrap(), 0.25);
    }

    #[test]
    fn test_breakpoint_date_is_inclusive() {
        let s = store();
        assert_eq!(s.number("taxes.rate", date(2023, 7, 1)).unwrap(), 0.22);
        assert_eq!(s.number("taxes.rate", date(2023, 6, 30)).unwrap(), 0.20);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let s = store();
        let first = s.resolve("taxes.rate", date(2024, 3, 1)).unwrap().clone();
        let second = s.resolve("taxes.rate", date(2024, 3, 1)).unwrap();
        assert_eq!(&first, second);
    }

    #[test]
    fn test_query_before_first_breakpoint_fails() {
        let err = store().resolve("taxes.rate", date(2021, 12, 31)).unwrap_err();
        assert!(matches!(err, ParameterError::ParameterNotFound { ref path, .. } if path == "taxes.rate"));
    }

    #[test]
    fn test_unknown_and_group_paths() {
        let s = store();
        assert!(matches!(s.resolve("taxes.nope", date(2024, 1, 1)), Err(ParameterError::UnknownParameter { .. })));
        assert!(matches!(s.resolve("taxes.rate.deeper", date(2024, 1, 1)), Err(ParameterError::UnknownParameter { .. })));
        assert!(matches!(s.resolve("taxes.credits", date(2024, 1, 1)), Err(ParameterError::GroupPath { .. })));
    }

    #[test]
    fn test_nested_view_resolves_relative_paths() {
        let s = store();
        let view = s.at(date(2024, 5, 1));
        let credits = view.child("taxes").unwrap().child("credits").unwrap();
        assert_eq!(credits.number("max").unwrap(), 3_000.0);
        let err = credits.number("min").unwrap_err();
        assert_eq!(err, ParameterError::UnknownParameter { path: "taxes.credits.min".into() });
        assert!(view.flag("general.indexed").unwrap());
        assert!(matches!(view.number("general.indexed"), Err(ParameterError::TypeMismatch { .. })));
    }

    #[test]
    fn test_insert_rejects_conflicts() {
        let mut s = store();
        assert!(matches!(
            s.insert("taxes.rate", date(2024, 1, 1), 0.3.into()),
            Err(ParameterError::DuplicateBreakpoint { .. })
        ));
        assert!(matches!(s.insert("taxes.rate.sub", date(2024, 1, 1), 0.3.into()), Err(ParameterError::PathConflict { .. })));
        assert!(matches!(s.insert("taxes", date(2024, 1, 1), 0.3.into()), Err(ParameterError::PathConflict { .. })));
        assert!(matches!(s.insert("taxes..x", date(2024, 1, 1), 0.3.into()), Err(ParameterError::EmptyPath(_))));
    }

    #[test]
    fn test_leaf_paths() {
        let s = store();
        assert_eq!(s.leaf_count(), 3);
        assert_eq!(s.leaf_paths(), vec!["general.indexed", "taxes.credits.max", "taxes.rate"]);
    }
}
