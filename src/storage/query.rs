//! Collection queries
//!
//! A `Query` selects documents from one collection by a conjunction of field
//! filters, then orders and limits the result.
//!
//! Matching rules:
//! - a document missing a filtered field never matches
//! - comparisons between different value kinds never match
//! - when ordering by a field, documents missing that field are excluded
//! - ties (and unordered queries) fall back to document id order

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::storage::types::{Document, Value};

/// Comparison operator of a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
    /// String prefix match
    StartsWith,
}

/// A single field filter
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Check whether a document satisfies this filter
    pub fn matches(&self, doc: &Document) -> bool {
        let Some(actual) = doc.get(&self.field) else {
            return false;
        };

        if self.op == FilterOp::StartsWith {
            return match (actual.as_str(), self.value.as_str()) {
                (Some(s), Some(prefix)) => s.starts_with(prefix),
                _ => false,
            };
        }

        match actual.compare(&self.value) {
            Some(ordering) => match self.op {
                FilterOp::Eq => ordering == Ordering::Equal,
                FilterOp::Lt => ordering == Ordering::Less,
                FilterOp::Lte => ordering != Ordering::Greater,
                FilterOp::Gt => ordering == Ordering::Greater,
                FilterOp::Gte => ordering != Ordering::Less,
                FilterOp::StartsWith => false,
            },
            None => false,
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

/// Ordering clause
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// A query over a single collection
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    /// Start a query over a collection (matches every document)
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    /// Builder method: add an arbitrary filter
    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::new(field, op, value));
        self
    }

    /// Builder method: field equals value
    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Eq, value)
    }

    /// Builder method: string field starts with prefix
    pub fn where_prefix(self, field: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.filter(field, FilterOp::StartsWith, Value::String(prefix.into()))
    }

    /// Builder method: order results
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    /// Builder method: cap the number of results
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check whether a document matches every filter (and has the order field)
    pub fn matches(&self, doc: &Document) -> bool {
        if let Some(order) = &self.order_by {
            if doc.get(&order.field).is_none() {
                return false;
            }
        }
        self.filters.iter().all(|f| f.matches(doc))
    }

    /// Run the query over an iterator of candidate documents
    pub fn apply<'a>(&self, docs: impl Iterator<Item = &'a Document>) -> Vec<Document> {
        let mut results: Vec<Document> = docs.filter(|d| self.matches(d)).cloned().collect();

        match &self.order_by {
            Some(order) => {
                results.sort_by(|a, b| {
                    // Both fields are present: `matches` excludes documents without them
                    let ordering = match (a.get(&order.field), b.get(&order.field)) {
                        (Some(x), Some(y)) => x.total_cmp(y),
                        _ => Ordering::Equal,
                    };
                    let ordering = match order.direction {
                        Direction::Asc => ordering,
                        Direction::Desc => ordering.reverse(),
                    };
                    ordering.then_with(|| a.id.cmp(&b.id))
                });
            }
            None => results.sort_by(|a, b| a.id.cmp(&b.id)),
        }

        if let Some(limit) = self.limit {
            results.truncate(limit);
        }

        results
    }
}
