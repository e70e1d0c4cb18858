//! Rules for linking two instances through a relation.
//!
//! These checks are a best-effort pre-check. The unique key on
//! `(source, target, relation)` in the store is what actually rejects a
//! concurrent duplicate.

use crate::error::ApiError;
use crate::model::{Instance, InstanceRelation, Relation};

/// Source and target instances must belong to the schemas the relation declares
pub fn check_compatibility(
    relation: &Relation,
    source: &Instance,
    target: &Instance,
) -> Result<(), ApiError> {
    if source.schema != relation.source {
        return Err(ApiError::bad_request(format!(
            "Source instance's schema ({}) does not match relation's defined source schema ({})",
            source.schema, relation.source
        )));
    }

    if target.schema != relation.target {
        return Err(ApiError::bad_request(format!(
            "Target instance's schema ({}) does not match relation's defined target schema ({})",
            target.schema, relation.target
        )));
    }

    Ok(())
}

/// Duplicate and cardinality checks against the edges already stored under
/// `relation`. `existing` must hold exactly that relation's edges.
pub fn check_cardinality(
    relation: &Relation,
    source_id: &str,
    target_id: &str,
    existing: &[InstanceRelation],
) -> Result<(), ApiError> {
    if existing.iter().any(|ir| ir.links(source_id, target_id)) {
        return Err(ApiError::bad_request(
            "This exact relation between these instances already exists.",
        ));
    }

    // A single-valued source side means each target has at most one source.
    if let Some(cardinality) = relation.source_cardinality.filter(|c| c.is_single_valued()) {
        if existing.iter().any(|ir| ir.target == target_id) {
            return Err(ApiError::bad_request(format!(
                "Cannot create this instance relation: violates source cardinality ({}).",
                cardinality
            )));
        }
    }

    if let Some(cardinality) = relation.target_cardinality.filter(|c| c.is_single_valued()) {
        if existing.iter().any(|ir| ir.source == source_id) {
            return Err(ApiError::bad_request(format!(
                "Cannot create this instance relation: violates target cardinality ({}).",
                cardinality
            )));
        }
    }

    Ok(())
}

/// Full rule chain for a candidate edge
pub fn check_candidate(
    relation: &Relation,
    source: &Instance,
    target: &Instance,
    existing: &[InstanceRelation],
) -> Result<(), ApiError> {
    check_compatibility(relation, source, target)?;
    check_cardinality(relation, &source.id, &target.id, existing)
}
