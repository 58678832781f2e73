//! Canonical document skeletons, embedded at compile time.
//!
//! Given a type and a field set, the renderer produces the canonical
//! document for that type: fixed header key order, fixed body section order,
//! placeholder prompts. Same type and fields always yield byte-identical
//! output; `create` uses this when no body is supplied.

use crate::core::codec::{self, GuardrailDocument, GuardrailHeader, NodeDocument, NodeHeader};
use crate::core::model::{EnforcementLevel, GuardrailCategory, NodeType, Status};

const EPIC_BODY: &str = include_str!("../../templates/epic.md");
const COMPONENT_BODY: &str = include_str!("../../templates/component.md");
const FEATURE_BODY: &str = include_str!("../../templates/feature.md");
const REQUIREMENT_BODY: &str = include_str!("../../templates/requirement.md");
const GUARDRAIL_BODY: &str = include_str!("../../templates/guardrail.md");

/// Body skeleton for a node type.
pub fn body_skeleton(node_type: NodeType) -> &'static str {
    match node_type {
        NodeType::Epic => EPIC_BODY,
        NodeType::Component => COMPONENT_BODY,
        NodeType::Feature => FEATURE_BODY,
        NodeType::Requirement => REQUIREMENT_BODY,
    }
}

/// Caller-settable fields for a scaffolded node document.
#[derive(Debug, Clone, Default)]
pub struct TemplateFields {
    pub title: String,
    pub parent_id: Option<String>,
    pub priority: Option<u32>,
    pub tags: Vec<String>,
    pub depends_on: Vec<String>,
    pub adheres_to: Vec<String>,
}

/// Render the canonical node document skeleton.
pub fn render_node_template(node_type: NodeType, fields: &TemplateFields) -> String {
    let doc = NodeDocument {
        header: NodeHeader {
            node_type,
            title: fields.title.clone(),
            parent_id: fields.parent_id.clone(),
            status: Status::Draft,
            priority: fields.priority,
            tags: fields.tags.clone(),
            depends_on: fields.depends_on.clone(),
            adheres_to: fields.adheres_to.clone(),
            extra: Vec::new(),
        },
        body: body_skeleton(node_type).to_string(),
    };
    codec::render_node_document(&doc)
}

/// Render the canonical guardrail document skeleton.
pub fn render_guardrail_template(
    title: &str,
    category: GuardrailCategory,
    enforcement_level: EnforcementLevel,
    applies_to: &[NodeType],
) -> String {
    let applies = if applies_to.is_empty() {
        NodeType::ALL.to_vec()
    } else {
        applies_to.to_vec()
    };
    let doc = GuardrailDocument {
        header: GuardrailHeader {
            title: title.to_string(),
            category,
            enforcement_level,
            applies_to: applies,
            status: "draft".to_string(),
            extra: Vec::new(),
        },
        body: GUARDRAIL_BODY.to_string(),
    };
    codec::render_guardrail_document(&doc)
}
