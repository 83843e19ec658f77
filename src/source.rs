//! Source enumerator.
//!
//! A launch drains a fixed list of (work item, alias) pairs, supplied
//! directly or derived from an external grouped-record collection's
//! (key, record) dump. Order is preserved: submissions happen in the order
//! items appear here.

use std::collections::{HashSet, VecDeque};

use crate::error::{Error, Result};
use crate::model::{Alias, WorkItem};

/// An ordered batch of work to launch.
#[derive(Debug)]
pub struct Source {
    pairs: VecDeque<(WorkItem, Alias)>,
}

impl Source {
    /// Build from explicit (item, alias) pairs.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (WorkItem, Alias)>) -> Self {
        Self {
            pairs: pairs.into_iter().collect(),
        }
    }

    /// Build from a grouped-record collection's (key, record) entries.
    pub fn from_records(
        records: impl IntoIterator<Item = (Alias, serde_json::Value)>,
    ) -> Self {
        Self {
            pairs: records
                .into_iter()
                .map(|(alias, payload)| (WorkItem::new(payload), alias))
                .collect(),
        }
    }

    /// Reject duplicate aliases up front. A batch with duplicates makes zero
    /// submissions.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for (_, alias) in &self.pairs {
            if !seen.insert(alias.clone()) {
                return Err(Error::DuplicateAlias(alias.clone()));
            }
        }
        Ok(())
    }

    /// Aliases in source order.
    pub fn aliases(&self) -> impl Iterator<Item = &Alias> {
        self.pairs.iter().map(|(_, alias)| alias)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub(crate) fn pop(&mut self) -> Option<(WorkItem, Alias)> {
        self.pairs.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pairs_keep_source_order() {
        let mut source = Source::from_pairs([
            (WorkItem::new(json!(1)), Alias::from("a")),
            (WorkItem::new(json!(2)), Alias::from("b")),
        ]);
        assert_eq!(source.len(), 2);
        assert_eq!(source.pop().unwrap().1, Alias::from("a"));
        assert_eq!(source.pop().unwrap().1, Alias::from("b"));
        assert!(source.pop().is_none());
    }

    #[test]
    fn duplicate_alias_is_rejected() {
        let source = Source::from_records([
            (Alias::from("a"), json!({})),
            (Alias::from("b"), json!({})),
            (Alias::from("a"), json!({})),
        ]);
        match source.validate() {
            Err(Error::DuplicateAlias(alias)) => assert_eq!(alias, Alias::from("a")),
            other => panic!("expected DuplicateAlias, got {other:?}"),
        }
    }

    #[test]
    fn records_become_work_items() {
        let mut source = Source::from_records([(Alias::from("calc/1"), json!({"x": 7}))]);
        let (item, alias) = source.pop().unwrap();
        assert_eq!(alias.as_str(), "calc/1");
        assert_eq!(item.payload, json!({"x": 7}));
    }
}
