use chrono::{DateTime, Utc};
use serde_json::Value;

/// Inclusive timestamp bounds; either side may be open
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DateRange {
    pub gte: Option<DateTime<Utc>>,
    pub lte: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn contains(&self, value: DateTime<Utc>) -> bool {
        self.gte.map_or(true, |gte| value >= gte) && self.lte.map_or(true, |lte| value <= lte)
    }
}

/// A single predicate over a document field. Field names are the API-level
/// names of the serialized document (`name`, `schema`, `createdAt`, ...).
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq {
        field: &'static str,
        value: Value,
    },
    EqIgnoreCase {
        field: &'static str,
        value: String,
    },
    /// Case-insensitive literal substring match on any of the fields
    Search {
        fields: Vec<&'static str>,
        term: String,
    },
    Between {
        field: &'static str,
        range: DateRange,
    },
}

/// Conjunction of conditions; an empty filter matches everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq {
            field,
            value: value.into(),
        });
        self
    }

    /// Add an exact-match condition only when a value was supplied
    pub fn eq_opt<T: Into<Value>>(self, field: &'static str, value: Option<T>) -> Self {
        match value {
            Some(value) => self.eq(field, value),
            None => self,
        }
    }

    pub fn eq_ignore_case(mut self, field: &'static str, value: impl Into<String>) -> Self {
        self.conditions.push(Condition::EqIgnoreCase {
            field,
            value: value.into(),
        });
        self
    }

    pub fn between(mut self, field: &'static str, range: DateRange) -> Self {
        self.conditions.push(Condition::Between { field, range });
        self
    }

    pub fn push(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    /// Evaluate the filter against a serialized document
    pub fn matches(&self, doc: &Value) -> bool {
        self.conditions.iter().all(|condition| condition.matches(doc))
    }
}

impl Condition {
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Condition::Eq { field, value } => doc.get(*field) == Some(value),
            Condition::EqIgnoreCase { field, value } => doc
                .get(*field)
                .and_then(Value::as_str)
                .map_or(false, |actual| actual.to_lowercase() == value.to_lowercase()),
            Condition::Search { fields, term } => {
                let needle = term.to_lowercase();
                fields.iter().any(|field| {
                    doc.get(*field)
                        .and_then(Value::as_str)
                        .map_or(false, |haystack| haystack.to_lowercase().contains(&needle))
                })
            }
            Condition::Between { field, range } => doc
                .get(*field)
                .and_then(Value::as_str)
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map_or(false, |ts| range.contains(ts.with_timezone(&Utc))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_eq_and_search_conditions() {
        let doc = json!({"name": "Battery Pack", "description": "12V lead", "created_by": "u1"});

        assert!(Filter::new().matches(&doc));
        assert!(Filter::new().eq("created_by", "u1").matches(&doc));
        assert!(!Filter::new().eq("created_by", "u2").matches(&doc));

        let mut filter = Filter::new().eq("created_by", "u1");
        filter.push(Condition::Search {
            fields: vec!["name", "description"],
            term: "LEAD".to_string(),
        });
        assert!(filter.matches(&doc));
    }

    #[test]
    fn test_missing_field_never_matches() {
        let doc = json!({"name": "x"});
        assert!(!Filter::new().eq("description", "x").matches(&doc));
        assert!(!Filter::new().eq_ignore_case("ref_type", "schema").matches(&doc));
    }

    #[test]
    fn test_between_on_timestamps() {
        let doc = json!({"createdAt": "2025-01-15T10:00:00Z"});
        let inside = DateRange {
            gte: Some(Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap()),
            lte: Some(Utc.with_ymd_and_hms(2025, 1, 15, 23, 59, 59).unwrap()),
        };
        let after = DateRange {
            gte: Some(Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap()),
            lte: None,
        };
        assert!(Filter::new().between("createdAt", inside).matches(&doc));
        assert!(!Filter::new().between("createdAt", after).matches(&doc));
    }
}
