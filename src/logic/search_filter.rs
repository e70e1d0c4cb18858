use crate::model::{Condition, Filter};

pub const SCHEMA_SEARCH_FIELDS: &[&str] = &["name", "description"];
pub const INSTANCE_SEARCH_FIELDS: &[&str] = &["name"];
pub const RELATION_SEARCH_FIELDS: &[&str] =
    &["type", "description", "source_cardinality", "target_cardinality"];
pub const CHANGE_LOG_SEARCH_FIELDS: &[&str] = &["description", "ref_type", "action"];

/// Merge a free-text term into `base` as a case-insensitive any-field match.
/// A blank or missing term leaves the base filter untouched.
pub fn build_search_filter(
    mut base: Filter,
    term: Option<&str>,
    fields: &[&'static str],
) -> Filter {
    let Some(term) = term.map(str::trim).filter(|t| !t.is_empty()) else {
        return base;
    };
    if fields.is_empty() {
        return base;
    }

    base.push(Condition::Search {
        fields: fields.to_vec(),
        term: term.to_string(),
    });
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_blank_term_keeps_base() {
        let base = Filter::new().eq("created_by", "u1");
        assert_eq!(build_search_filter(base.clone(), None, SCHEMA_SEARCH_FIELDS), base);
        assert_eq!(build_search_filter(base.clone(), Some("   "), SCHEMA_SEARCH_FIELDS), base);
    }

    #[test]
    fn test_term_is_merged_with_exact_fields() {
        let filter = build_search_filter(
            Filter::new().eq("created_by", "u1"),
            Some(" motor "),
            SCHEMA_SEARCH_FIELDS,
        );
        assert_eq!(filter.conditions.len(), 2);

        let hit = json!({"name": "Electric Motor", "created_by": "u1"});
        let other_owner = json!({"name": "Electric Motor", "created_by": "u2"});
        let desc_hit = json!({"name": "x", "description": "a MOTOR part", "created_by": "u1"});

        assert!(filter.matches(&hit));
        assert!(!filter.matches(&other_owner));
        assert!(filter.matches(&desc_hit));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let filter = build_search_filter(Filter::new(), Some("a.b"), INSTANCE_SEARCH_FIELDS);
        assert!(filter.matches(&json!({"name": "xa.by"})));
        assert!(!filter.matches(&json!({"name": "axb"})));
    }
}
