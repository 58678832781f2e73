//! Core records for the requirement hierarchy.
//!
//! A `Node` is one hierarchy document (epic, component, feature, or
//! requirement). A `Guardrail` is a cross-cutting policy record that nodes
//! may declare adherence to. Both carry an immutable system `id` (UUID) and
//! a sequential display `human_id` (e.g. `RAAS-FEAT-001`).

use crate::core::error::RaasError;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Epic,
    Component,
    Feature,
    Requirement,
}

impl NodeType {
    pub const ALL: [NodeType; 4] = [
        NodeType::Epic,
        NodeType::Component,
        NodeType::Feature,
        NodeType::Requirement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Epic => "epic",
            NodeType::Component => "component",
            NodeType::Feature => "feature",
            NodeType::Requirement => "requirement",
        }
    }

    /// Segment used in human-readable identifiers.
    pub fn code(&self) -> &'static str {
        match self {
            NodeType::Epic => "EPIC",
            NodeType::Component => "COMP",
            NodeType::Feature => "FEAT",
            NodeType::Requirement => "REQ",
        }
    }

    pub fn parse(s: &str) -> Result<Self, RaasError> {
        match s {
            "epic" => Ok(NodeType::Epic),
            "component" => Ok(NodeType::Component),
            "feature" => Ok(NodeType::Feature),
            "requirement" => Ok(NodeType::Requirement),
            other => Err(RaasError::MalformedDocument(format!(
                "unknown node type '{}' (expected epic|component|feature|requirement)",
                other
            ))),
        }
    }

    /// Parent types the tree-shape rules allow for this type. An empty slice
    /// means the type must be a root. Non-epic types may also stand alone
    /// (no parent at all); that is the engine's call, not encoded here.
    pub fn allowed_parents(&self) -> &'static [NodeType] {
        match self {
            NodeType::Epic => &[],
            NodeType::Component => &[NodeType::Epic],
            NodeType::Feature => &[NodeType::Component, NodeType::Epic],
            NodeType::Requirement => &[NodeType::Feature, NodeType::Component],
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status. The engine only relies on `Draft` as the creation
/// default; the ordering here exists for transition policies layered on top.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[clap(rename_all = "snake_case")]
pub enum Status {
    Draft,
    Ready,
    InProgress,
    Done,
    Archived,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Draft => "draft",
            Status::Ready => "ready",
            Status::InProgress => "in_progress",
            Status::Done => "done",
            Status::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Result<Self, RaasError> {
        match s {
            "draft" => Ok(Status::Draft),
            "ready" => Ok(Status::Ready),
            "in_progress" => Ok(Status::InProgress),
            "done" => Ok(Status::Done),
            "archived" => Ok(Status::Archived),
            other => Err(RaasError::MalformedDocument(format!(
                "unknown status '{}' (expected draft|ready|in_progress|done|archived)",
                other
            ))),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementLevel {
    Advisory,
    Recommended,
    Mandatory,
}

impl EnforcementLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnforcementLevel::Advisory => "advisory",
            EnforcementLevel::Recommended => "recommended",
            EnforcementLevel::Mandatory => "mandatory",
        }
    }

    pub fn parse(s: &str) -> Result<Self, RaasError> {
        match s {
            "advisory" => Ok(EnforcementLevel::Advisory),
            "recommended" => Ok(EnforcementLevel::Recommended),
            "mandatory" => Ok(EnforcementLevel::Mandatory),
            other => Err(RaasError::MalformedDocument(format!(
                "unknown enforcement level '{}' (expected advisory|recommended|mandatory)",
                other
            ))),
        }
    }
}

impl fmt::Display for EnforcementLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailCategory {
    Security,
    Architecture,
    Business,
}

impl GuardrailCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardrailCategory::Security => "security",
            GuardrailCategory::Architecture => "architecture",
            GuardrailCategory::Business => "business",
        }
    }

    pub fn parse(s: &str) -> Result<Self, RaasError> {
        match s {
            "security" => Ok(GuardrailCategory::Security),
            "architecture" => Ok(GuardrailCategory::Architecture),
            "business" => Ok(GuardrailCategory::Business),
            other => Err(RaasError::MalformedDocument(format!(
                "unknown guardrail category '{}' (expected security|architecture|business)",
                other
            ))),
        }
    }
}

impl fmt::Display for GuardrailCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One hierarchy document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: Uuid,
    pub human_id: String,
    pub node_type: NodeType,
    pub title: String,
    pub status: Status,
    pub priority: Option<u32>,
    pub tags: Vec<String>,
    pub parent_id: Option<Uuid>,
    pub depends_on: Vec<Uuid>,
    /// Guardrail references, stored as human ids (e.g. `RAAS-GUARD-001`).
    pub adheres_to: Vec<String>,
    /// Auto-extracted from the body; never caller-supplied.
    pub description: String,
    /// Raw markdown body, opaque to the engine.
    pub body: String,
    /// Unknown frontmatter keys, preserved verbatim across parse/render.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<(String, serde_yaml::Value)>,
    pub created_at: String,
    pub updated_at: String,
}

/// A named policy record nodes may declare adherence to. Referenced but
/// never owned by nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Guardrail {
    pub id: Uuid,
    pub human_id: String,
    pub title: String,
    pub category: GuardrailCategory,
    pub enforcement_level: EnforcementLevel,
    pub applies_to: Vec<NodeType>,
    pub status: String,
    pub description: String,
    pub body: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Human-readable id segment for guardrails (nodes use `NodeType::code`).
pub const GUARDRAIL_CODE: &str = "GUARD";

/// Format a display identifier: `<PREFIX>-<CODE>-<NNN>`, zero-padded.
pub fn format_human_id(prefix: &str, code: &str, number: u32) -> String {
    format!("{}-{}-{:03}", prefix, code, number)
}

/// Loose shape check for display identifiers. Used to route lookups that
/// accept either a UUID or a human id.
pub fn looks_like_human_id(s: &str) -> bool {
    let mut parts = s.split('-');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(prefix), Some(code), Some(num), None) => {
            !prefix.is_empty()
                && code.chars().all(|c| c.is_ascii_uppercase())
                && !code.is_empty()
                && num.chars().all(|c| c.is_ascii_digit())
                && !num.is_empty()
        }
        _ => false,
    }
}

pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
