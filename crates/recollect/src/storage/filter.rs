//! Filter types for memory search and bulk operations
//!
//! A filter is a conjunction of typed predicates over declared fields of a
//! memory: its categories, its importance, or a top-level metadata key.
//! Predicates come in three kinds (equals, in-set, range) and are evaluated
//! directly against the record.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::memory::types::Memory;

/// Field of a memory a predicate applies to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterField {
    /// Matches if any category satisfies the condition
    Category,
    /// The memory's importance (1-10)
    Importance,
    /// A top-level metadata key
    Metadata(String),
}

/// Condition a field value must satisfy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    Equals { value: Value },
    In { values: Vec<Value> },
    /// Inclusive numeric range; an absent bound is unbounded
    Range {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
}

/// A single field predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub field: FilterField,
    #[serde(flatten)]
    pub condition: Condition,
}

impl Predicate {
    pub fn matches(&self, memory: &Memory) -> bool {
        match &self.field {
            FilterField::Category => memory
                .categories
                .iter()
                .any(|c| self.condition.accepts(&Value::String(c.clone()))),
            FilterField::Importance => self
                .condition
                .accepts(&Value::from(memory.importance)),
            FilterField::Metadata(key) => memory
                .metadata
                .get(key)
                .is_some_and(|v| self.condition.accepts(v)),
        }
    }
}

impl Condition {
    fn accepts(&self, candidate: &Value) -> bool {
        match self {
            Condition::Equals { value } => values_equal(candidate, value),
            Condition::In { values } => values.iter().any(|v| values_equal(candidate, v)),
            Condition::Range { min, max } => match candidate.as_f64() {
                Some(n) => min.is_none_or(|lo| n >= lo) && max.is_none_or(|hi| n <= hi),
                None => false,
            },
        }
    }
}

/// Numbers compare by value so that `3` matches `3.0`
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Filter criteria for memory search and bulk operations.
///
/// All predicates are combined with AND logic. An empty filter matches
/// everything, which is why bulk delete refuses it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryFilter {
    predicates: Vec<Predicate>,
}

impl MemoryFilter {
    /// Create a new empty filter (no filtering applied)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Require the memory to carry this category
    pub fn with_category(self, category: impl Into<String>) -> Self {
        self.with_predicate(Predicate {
            field: FilterField::Category,
            condition: Condition::Equals {
                value: Value::String(category.into()),
            },
        })
    }

    /// Require the memory to carry at least one of these categories
    pub fn with_any_category<I, S>(self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_predicate(Predicate {
            field: FilterField::Category,
            condition: Condition::In {
                values: categories
                    .into_iter()
                    .map(|c| Value::String(c.into()))
                    .collect(),
            },
        })
    }

    /// Require a metadata key to equal a value
    pub fn with_metadata(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_predicate(Predicate {
            field: FilterField::Metadata(key.into()),
            condition: Condition::Equals {
                value: value.into(),
            },
        })
    }

    /// Require a metadata key to hold one of the given values
    pub fn with_metadata_in(self, key: impl Into<String>, values: Vec<Value>) -> Self {
        self.with_predicate(Predicate {
            field: FilterField::Metadata(key.into()),
            condition: Condition::In { values },
        })
    }

    /// Require a numeric metadata key to fall within a range
    pub fn with_metadata_range(
        self,
        key: impl Into<String>,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Self {
        self.with_predicate(Predicate {
            field: FilterField::Metadata(key.into()),
            condition: Condition::Range { min, max },
        })
    }

    /// Require importance within an inclusive range
    pub fn with_importance_range(self, min: Option<u8>, max: Option<u8>) -> Self {
        self.with_predicate(Predicate {
            field: FilterField::Importance,
            condition: Condition::Range {
                min: min.map(f64::from),
                max: max.map(f64::from),
            },
        })
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Check whether a memory satisfies every predicate
    pub fn matches(&self, memory: &Memory) -> bool {
        self.predicates.iter().all(|p| p.matches(memory))
    }

    /// Check if this filter is empty (no conditions set)
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn memory_with(importance: u8, categories: &[&str], metadata: Value) -> Memory {
        let mut memory = Memory::new("test".to_string(), vec![1.0]);
        memory.importance = importance;
        memory.categories = categories.iter().map(|c| c.to_string()).collect();
        memory.metadata = metadata.as_object().cloned().unwrap_or_default();
        memory
    }

    #[test]
    fn test_empty_filter() {
        let filter = MemoryFilter::new();
        assert!(filter.is_empty());
        assert!(filter.matches(&memory_with(1, &[], json!({}))));
    }

    #[test]
    fn test_category_filter() {
        let filter = MemoryFilter::new().with_category("diet");

        assert!(filter.matches(&memory_with(1, &["diet", "health"], json!({}))));
        assert!(!filter.matches(&memory_with(1, &["work"], json!({}))));
        assert!(!filter.matches(&memory_with(1, &[], json!({}))));
    }

    #[test]
    fn test_any_category_filter() {
        let filter = MemoryFilter::new().with_any_category(["diet", "allergy"]);

        assert!(filter.matches(&memory_with(1, &["allergy"], json!({}))));
        assert!(!filter.matches(&memory_with(1, &["work"], json!({}))));
    }

    #[test]
    fn test_metadata_equals() {
        let filter = MemoryFilter::new().with_metadata("source", "chat");

        assert!(filter.matches(&memory_with(1, &[], json!({"source": "chat"}))));
        assert!(!filter.matches(&memory_with(1, &[], json!({"source": "import"}))));
        assert!(!filter.matches(&memory_with(1, &[], json!({}))));
    }

    #[test]
    fn test_metadata_numbers_compare_by_value() {
        let filter = MemoryFilter::new().with_metadata("session", 3);
        assert!(filter.matches(&memory_with(1, &[], json!({"session": 3.0}))));
    }

    #[test]
    fn test_metadata_in_set() {
        let filter =
            MemoryFilter::new().with_metadata_in("agent", vec![json!("planner"), json!("coach")]);

        assert!(filter.matches(&memory_with(1, &[], json!({"agent": "coach"}))));
        assert!(!filter.matches(&memory_with(1, &[], json!({"agent": "critic"}))));
    }

    #[test]
    fn test_metadata_range() {
        let filter = MemoryFilter::new().with_metadata_range("glucose", Some(70.0), Some(180.0));

        assert!(filter.matches(&memory_with(1, &[], json!({"glucose": 120}))));
        assert!(filter.matches(&memory_with(1, &[], json!({"glucose": 180}))));
        assert!(!filter.matches(&memory_with(1, &[], json!({"glucose": 200}))));
        assert!(!filter.matches(&memory_with(1, &[], json!({"glucose": "high"}))));
    }

    #[test]
    fn test_importance_range_open_ended() {
        let filter = MemoryFilter::new().with_importance_range(Some(5), None);

        assert!(filter.matches(&memory_with(5, &[], json!({}))));
        assert!(filter.matches(&memory_with(10, &[], json!({}))));
        assert!(!filter.matches(&memory_with(4, &[], json!({}))));
    }

    #[test]
    fn test_combined_filters_use_and() {
        let filter = MemoryFilter::new()
            .with_category("diet")
            .with_importance_range(Some(3), None);

        assert!(filter.matches(&memory_with(4, &["diet"], json!({}))));
        assert!(!filter.matches(&memory_with(2, &["diet"], json!({}))));
        assert!(!filter.matches(&memory_with(4, &["work"], json!({}))));
    }

    #[test]
    fn test_filter_json_shape() {
        let json = r#"[
            {"field": "category", "op": "equals", "value": "diet"},
            {"field": {"metadata": "source"}, "op": "in", "values": ["chat", "import"]},
            {"field": "importance", "op": "range", "min": 2}
        ]"#;

        let filter: MemoryFilter = serde_json::from_str(json).expect("Failed to parse filter");
        assert_eq!(filter.predicates().len(), 3);
        assert_eq!(
            filter.predicates()[1].field,
            FilterField::Metadata("source".to_string())
        );
        assert!(filter.matches(&memory_with(3, &["diet"], json!({"source": "chat"}))));
    }
}
