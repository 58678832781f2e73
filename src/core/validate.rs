//! Integrity validation for proposed mutations.
//!
//! `check` is a pure function of a graph snapshot and a proposed node. It
//! never touches storage; the engine loads the snapshot inside the mutation
//! transaction and commits only when the check accepts. Checks run in a
//! fixed order and short-circuit on the first failure, so a given bad input
//! always reports the same violation:
//!
//! 1. required fields
//! 2. parent existence and type compatibility
//! 3. `depends_on` target existence
//! 4. `depends_on` acyclicity (reachability, self-reference included)
//! 5. `adheres_to` target existence and type applicability
//! 6. id / human-id uniqueness (create or rename only)
//!
//! Status transitions are not an integrity concern; they go through the
//! `StatusPolicy` hook so the surrounding workflow layer can constrain them
//! without this module encoding workflow order.

use crate::core::error::Violation;
use crate::core::graph::GraphSnapshot;
use crate::core::model::{NodeType, Status};
use uuid::Uuid;

/// A proposed node state, before or after mutation. References stay raw
/// (UUID string or human id); the validator resolves them against the
/// snapshot so that a missing target is reported as the violation the check
/// order prescribes.
#[derive(Debug, Clone)]
pub struct NodeDraft {
    pub id: Uuid,
    /// Set on create (after allocation); `None` on edits that keep the id.
    pub human_id: Option<String>,
    pub node_type: NodeType,
    pub title: String,
    pub parent_ref: Option<String>,
    pub depends_on_refs: Vec<String>,
    pub adheres_to_refs: Vec<String>,
    pub is_create: bool,
}

/// References resolved during validation, ready for the engine to write.
#[derive(Debug, Clone, Default)]
pub struct ResolvedRefs {
    pub parent_id: Option<Uuid>,
    pub depends_on: Vec<Uuid>,
    pub adheres_to: Vec<Uuid>,
}

/// Hook for workflow-level status transition rules. Integrity accepts any
/// declared status; ordering is collaborator policy.
pub trait StatusPolicy {
    fn allow_transition(&self, from: Status, to: Status) -> bool;
}

/// Default policy: every transition between declared statuses is allowed.
pub struct Permissive;

impl StatusPolicy for Permissive {
    fn allow_transition(&self, _from: Status, _to: Status) -> bool {
        true
    }
}

/// Validate a proposed node against the current graph. Accepts with the
/// resolved reference set, or rejects with the first violation in check
/// order.
pub fn check(snapshot: &GraphSnapshot, draft: &NodeDraft) -> Result<ResolvedRefs, Violation> {
    let mut resolved = ResolvedRefs::default();

    // (1) required fields
    if draft.title.trim().is_empty() {
        return Err(Violation::MissingField {
            field: "title".to_string(),
        });
    }

    // (2) parent existence and type compatibility
    if let Some(parent_ref) = &draft.parent_ref {
        if draft.node_type == NodeType::Epic {
            return Err(Violation::InvalidParent {
                parent: parent_ref.clone(),
                reason: "an epic cannot have a parent".to_string(),
            });
        }
        let parent = match snapshot.resolve_node_ref(parent_ref) {
            Some(id) => snapshot.node(&id).cloned(),
            None => None,
        };
        let parent = parent.ok_or_else(|| Violation::InvalidParent {
            parent: parent_ref.clone(),
            reason: "parent does not exist".to_string(),
        })?;
        if parent.id == draft.id {
            return Err(Violation::InvalidParent {
                parent: parent_ref.clone(),
                reason: "a node cannot be its own parent".to_string(),
            });
        }
        let allowed = draft.node_type.allowed_parents();
        if !allowed.contains(&parent.node_type) {
            return Err(Violation::InvalidParent {
                parent: parent_ref.clone(),
                reason: format!(
                    "a {} cannot be the parent of a {}",
                    parent.node_type, draft.node_type
                ),
            });
        }
        resolved.parent_id = Some(parent.id);
    }

    // (3) depends_on target existence
    let mut dep_refs: Vec<String> = Vec::new();
    for dep_ref in &draft.depends_on_refs {
        let target = snapshot
            .resolve_node_ref(dep_ref)
            .ok_or_else(|| Violation::DanglingReference {
                field: "depends_on".to_string(),
                reference: dep_ref.clone(),
            })?;
        if !resolved.depends_on.contains(&target) {
            resolved.depends_on.push(target);
            dep_refs.push(dep_ref.clone());
        }
    }

    // (4) acyclicity, self-reference included
    for (i, target) in resolved.depends_on.iter().enumerate() {
        let closes_cycle = *target == draft.id
            || snapshot
                .reachable_from(target, Some((&draft.id, &resolved.depends_on)))
                .contains(&draft.id);
        if closes_cycle {
            return Err(Violation::CycleDetected {
                through: dep_refs[i].clone(),
            });
        }
    }

    // (5) adheres_to existence and applicability
    for guard_ref in &draft.adheres_to_refs {
        let guard = snapshot.resolve_guardrail_ref(guard_ref).ok_or_else(|| {
            Violation::DanglingReference {
                field: "adheres_to".to_string(),
                reference: guard_ref.clone(),
            }
        })?;
        if !guard.applies_to.contains(&draft.node_type) {
            return Err(Violation::GuardrailNotApplicable {
                guardrail: guard.human_id.clone(),
                node_type: draft.node_type.to_string(),
            });
        }
        if !resolved.adheres_to.contains(&guard.id) {
            resolved.adheres_to.push(guard.id);
        }
    }

    // (6) uniqueness, only meaningful on create or rename
    if draft.is_create && snapshot.id_taken(&draft.id) {
        return Err(Violation::DuplicateIdentifier {
            identifier: draft.id.to_string(),
        });
    }
    if let Some(human_id) = &draft.human_id {
        let taken_by_other = snapshot
            .node_by_human_id(human_id)
            .map(|n| n.id != draft.id)
            .unwrap_or_else(|| snapshot.human_id_taken(human_id));
        if taken_by_other {
            return Err(Violation::DuplicateIdentifier {
                identifier: human_id.clone(),
            });
        }
    }

    Ok(resolved)
}
