//! Document codec: bidirectional transform between markdown documents and
//! in-memory records.
//!
//! A document is YAML frontmatter between `---` markers followed by a
//! markdown body. The codec owns the canonical key order on render and the
//! defaulting rules on parse. System-managed fields (`id`, `human_id`,
//! timestamps) are never read from caller-supplied frontmatter; they are
//! injected from database state on render. Unknown keys are preserved
//! verbatim, never validated. The body is opaque except for section
//! extraction.

use crate::core::error::RaasError;
use crate::core::model::{
    EnforcementLevel, Guardrail, GuardrailCategory, Node, NodeType, Status,
};
use regex::Regex;
use serde_yaml::{Mapping, Value};
use std::sync::OnceLock;

/// Frontmatter keys the engine assigns; any caller-supplied value is ignored.
const SYSTEM_KEYS: &[&str] = &[
    "id",
    "human_id",
    "human_readable_id",
    "description",
    "created_at",
    "updated_at",
];

/// Node header keys in canonical render order.
const NODE_KEYS: &[&str] = &[
    "type",
    "title",
    "parent_id",
    "status",
    "priority",
    "tags",
    "depends_on",
    "adheres_to",
];

/// Guardrail header keys in canonical render order.
const GUARDRAIL_KEYS: &[&str] = &[
    "type",
    "title",
    "category",
    "enforcement_level",
    "applies_to",
    "status",
];

/// Body section headings whose text feeds the auto-extracted description.
const NARRATIVE_SECTIONS: &[&str] = &["Vision", "Purpose", "User Story", "Description"];

const DESCRIPTION_MAX: usize = 500;

/// Parsed node header. References (`parent_id`, `depends_on`, `adheres_to`)
/// stay raw strings here; the engine resolves UUIDs vs human ids.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeHeader {
    pub node_type: NodeType,
    pub title: String,
    pub parent_id: Option<String>,
    pub status: Status,
    pub priority: Option<u32>,
    pub tags: Vec<String>,
    pub depends_on: Vec<String>,
    pub adheres_to: Vec<String>,
    /// Unknown keys, in first-seen order.
    pub extra: Vec<(String, Value)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeDocument {
    pub header: NodeHeader,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GuardrailHeader {
    pub title: String,
    pub category: GuardrailCategory,
    pub enforcement_level: EnforcementLevel,
    pub applies_to: Vec<NodeType>,
    pub status: String,
    pub extra: Vec<(String, Value)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GuardrailDocument {
    pub header: GuardrailHeader,
    pub body: String,
}

fn frontmatter_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)\A---\s*\n(.*?)\n---\s*\n?(.*)\z").expect("frontmatter regex")
    })
}

fn section_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^##\s+(.+?)\s*$").expect("section regex"))
}

/// Split a document into its frontmatter mapping and raw body.
pub fn split_frontmatter(content: &str) -> Result<(Mapping, String), RaasError> {
    let caps = frontmatter_re().captures(content).ok_or_else(|| {
        RaasError::MalformedDocument(
            "missing YAML frontmatter; document must start with '---'".to_string(),
        )
    })?;
    let raw_header = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    let body = caps.get(2).map(|m| m.as_str()).unwrap_or_default();

    let value: Value = serde_yaml::from_str(raw_header)
        .map_err(|e| RaasError::MalformedDocument(format!("invalid YAML frontmatter: {}", e)))?;
    let mapping = match value {
        Value::Mapping(m) => m,
        _ => {
            return Err(RaasError::MalformedDocument(
                "frontmatter must be a YAML mapping".to_string(),
            ));
        }
    };
    Ok((mapping, body.to_string()))
}

fn take_str(mapping: &Mapping, key: &str) -> Result<Option<String>, RaasError> {
    match mapping.get(Value::String(key.to_string())) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(RaasError::MalformedDocument(format!(
            "'{}' must be a scalar",
            key
        ))),
    }
}

fn take_str_list(mapping: &Mapping, key: &str) -> Result<Vec<String>, RaasError> {
    match mapping.get(Value::String(key.to_string())) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Sequence(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(n.to_string()),
                _ => Err(RaasError::MalformedDocument(format!(
                    "'{}' entries must be strings",
                    key
                ))),
            })
            .collect(),
        Some(_) => Err(RaasError::MalformedDocument(format!(
            "'{}' must be a list",
            key
        ))),
    }
}

fn take_u32(mapping: &Mapping, key: &str) -> Result<Option<u32>, RaasError> {
    match mapping.get(Value::String(key.to_string())) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| {
                RaasError::MalformedDocument(format!("'{}' must be a small non-negative integer", key))
            }),
        Some(_) => Err(RaasError::MalformedDocument(format!(
            "'{}' must be an integer",
            key
        ))),
    }
}

/// Keys that are neither schema keys nor system-managed, in document order.
fn collect_extra(mapping: &Mapping, known: &[&str]) -> Vec<(String, Value)> {
    mapping
        .iter()
        .filter_map(|(k, v)| match k {
            Value::String(name)
                if !known.contains(&name.as_str()) && !SYSTEM_KEYS.contains(&name.as_str()) =>
            {
                Some((name.clone(), v.clone()))
            }
            _ => None,
        })
        .collect()
}

/// Parse a node document. Missing optional keys take type-independent
/// defaults: `status` -> draft, list keys -> empty.
pub fn parse_node(content: &str) -> Result<NodeDocument, RaasError> {
    let (mapping, body) = split_frontmatter(content)?;

    let type_str = take_str(&mapping, "type")?.ok_or_else(|| {
        RaasError::MalformedDocument("missing required frontmatter key 'type'".to_string())
    })?;
    let node_type = NodeType::parse(&type_str)?;

    let title = take_str(&mapping, "title")?.unwrap_or_default();

    let status = match take_str(&mapping, "status")? {
        Some(s) => Status::parse(&s)?,
        None => Status::Draft,
    };

    let parent_id = take_str(&mapping, "parent_id")?.filter(|s| s != "null" && !s.is_empty());

    let header = NodeHeader {
        node_type,
        title,
        parent_id,
        status,
        priority: take_u32(&mapping, "priority")?,
        tags: take_str_list(&mapping, "tags")?,
        depends_on: take_str_list(&mapping, "depends_on")?,
        adheres_to: take_str_list(&mapping, "adheres_to")?,
        extra: collect_extra(&mapping, NODE_KEYS),
    };

    Ok(NodeDocument { header, body })
}

/// Parse a guardrail document. The frontmatter `type` must be `guardrail`.
pub fn parse_guardrail(content: &str) -> Result<GuardrailDocument, RaasError> {
    let (mapping, body) = split_frontmatter(content)?;

    match take_str(&mapping, "type")?.as_deref() {
        Some("guardrail") => {}
        Some(other) => {
            return Err(RaasError::MalformedDocument(format!(
                "expected type 'guardrail', got '{}'",
                other
            )));
        }
        None => {
            return Err(RaasError::MalformedDocument(
                "missing required frontmatter key 'type'".to_string(),
            ));
        }
    }

    let title = take_str(&mapping, "title")?.unwrap_or_default();
    let category = match take_str(&mapping, "category")? {
        Some(c) => GuardrailCategory::parse(&c)?,
        None => {
            return Err(RaasError::MalformedDocument(
                "missing required frontmatter key 'category'".to_string(),
            ));
        }
    };
    let enforcement_level = match take_str(&mapping, "enforcement_level")? {
        Some(l) => EnforcementLevel::parse(&l)?,
        None => {
            return Err(RaasError::MalformedDocument(
                "missing required frontmatter key 'enforcement_level'".to_string(),
            ));
        }
    };

    let applies_to = take_str_list(&mapping, "applies_to")?
        .iter()
        .map(|s| NodeType::parse(s))
        .collect::<Result<Vec<_>, _>>()?;

    let header = GuardrailHeader {
        title,
        category,
        enforcement_level,
        applies_to,
        status: take_str(&mapping, "status")?.unwrap_or_else(|| "draft".to_string()),
        extra: collect_extra(&mapping, GUARDRAIL_KEYS),
    };

    Ok(GuardrailDocument { header, body })
}

fn emit(mapping: Mapping, body: &str) -> String {
    // serde_yaml emits keys in insertion order, which is the canonical order.
    let yaml = serde_yaml::to_string(&Value::Mapping(mapping)).unwrap_or_default();
    format!("---\n{}---\n\n{}", yaml, body.trim_start_matches('\n'))
}

fn push_extra(mapping: &mut Mapping, extra: &[(String, Value)]) {
    for (k, v) in extra {
        mapping.insert(Value::String(k.clone()), v.clone());
    }
}

/// Render a node document in canonical form (authored fields only, no
/// system-managed state). Deterministic and byte-stable under re-parse.
pub fn render_node_document(doc: &NodeDocument) -> String {
    let h = &doc.header;
    let mut m = Mapping::new();
    m.insert("type".into(), Value::String(h.node_type.as_str().to_string()));
    m.insert("title".into(), Value::String(h.title.clone()));
    if let Some(parent) = &h.parent_id {
        m.insert("parent_id".into(), Value::String(parent.clone()));
    }
    m.insert("status".into(), Value::String(h.status.as_str().to_string()));
    if let Some(p) = h.priority {
        m.insert("priority".into(), Value::Number(p.into()));
    }
    m.insert("tags".into(), str_seq(&h.tags));
    m.insert("depends_on".into(), str_seq(&h.depends_on));
    m.insert("adheres_to".into(), str_seq(&h.adheres_to));
    push_extra(&mut m, &h.extra);
    emit(m, &doc.body)
}

/// Render a stored node as its external document representation, injecting
/// current database state (`human_id`) so callers always see the
/// authoritative values rather than whatever they authored.
pub fn render_node(node: &Node) -> String {
    let mut m = Mapping::new();
    m.insert("type".into(), Value::String(node.node_type.as_str().to_string()));
    m.insert("title".into(), Value::String(node.title.clone()));
    m.insert("human_id".into(), Value::String(node.human_id.clone()));
    if let Some(parent) = node.parent_id {
        m.insert("parent_id".into(), Value::String(parent.to_string()));
    }
    m.insert("status".into(), Value::String(node.status.as_str().to_string()));
    if let Some(p) = node.priority {
        m.insert("priority".into(), Value::Number(p.into()));
    }
    m.insert("tags".into(), str_seq(&node.tags));
    m.insert(
        "depends_on".into(),
        Value::Sequence(
            node.depends_on
                .iter()
                .map(|id| Value::String(id.to_string()))
                .collect(),
        ),
    );
    m.insert("adheres_to".into(), str_seq(&node.adheres_to));
    push_extra(&mut m, &node.extra);
    emit(m, &node.body)
}

/// Render a guardrail document in canonical form.
pub fn render_guardrail_document(doc: &GuardrailDocument) -> String {
    let h = &doc.header;
    let mut m = Mapping::new();
    m.insert("type".into(), Value::String("guardrail".to_string()));
    m.insert("title".into(), Value::String(h.title.clone()));
    m.insert("category".into(), Value::String(h.category.as_str().to_string()));
    m.insert(
        "enforcement_level".into(),
        Value::String(h.enforcement_level.as_str().to_string()),
    );
    m.insert(
        "applies_to".into(),
        Value::Sequence(
            h.applies_to
                .iter()
                .map(|t| Value::String(t.as_str().to_string()))
                .collect(),
        ),
    );
    m.insert("status".into(), Value::String(h.status.clone()));
    push_extra(&mut m, &h.extra);
    emit(m, &doc.body)
}

/// Render a stored guardrail with its `human_id` injected.
pub fn render_guardrail(g: &Guardrail) -> String {
    let mut m = Mapping::new();
    m.insert("type".into(), Value::String("guardrail".to_string()));
    m.insert("title".into(), Value::String(g.title.clone()));
    m.insert("human_id".into(), Value::String(g.human_id.clone()));
    m.insert("category".into(), Value::String(g.category.as_str().to_string()));
    m.insert(
        "enforcement_level".into(),
        Value::String(g.enforcement_level.as_str().to_string()),
    );
    m.insert(
        "applies_to".into(),
        Value::Sequence(
            g.applies_to
                .iter()
                .map(|t| Value::String(t.as_str().to_string()))
                .collect(),
        ),
    );
    m.insert("status".into(), Value::String(g.status.clone()));
    emit(m, &g.body)
}

fn str_seq(items: &[String]) -> Value {
    Value::Sequence(items.iter().map(|s| Value::String(s.clone())).collect())
}

/// Extract `## `-level sections as (heading, raw text) pairs, in document
/// order. Text before the first heading is not returned here; callers that
/// need full fidelity keep the body verbatim.
pub fn extract_sections(body: &str) -> Vec<(String, String)> {
    let mut sections = Vec::new();
    let mut headings: Vec<(usize, usize, String)> = Vec::new();
    for caps in section_re().captures_iter(body) {
        let whole = caps.get(0).expect("match");
        let name = caps.get(1).expect("group").as_str().to_string();
        headings.push((whole.start(), whole.end(), name));
    }
    for (i, (_, content_start, name)) in headings.iter().enumerate() {
        let end = headings
            .get(i + 1)
            .map(|(next_start, _, _)| *next_start)
            .unwrap_or(body.len());
        let text = body[*content_start..end].trim().to_string();
        sections.push((name.clone(), text));
    }
    sections
}

/// Auto-extract a short description from a body: the first recognized
/// narrative section, or the leading prose, whitespace-normalized and
/// truncated at a word boundary.
pub fn extract_description(body: &str) -> String {
    let sections = extract_sections(body);
    let raw = sections
        .iter()
        .find(|(name, _)| NARRATIVE_SECTIONS.contains(&name.as_str()))
        .map(|(_, text)| text.clone())
        .unwrap_or_else(|| leading_prose(body));
    truncate_words(&raw, DESCRIPTION_MAX)
}

fn leading_prose(body: &str) -> String {
    body.lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .unwrap_or_default()
        .to_string()
}

fn truncate_words(text: &str, max_len: usize) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.chars().count() <= max_len {
        return normalized;
    }
    let clipped: String = normalized.chars().take(max_len).collect();
    match clipped.rfind(' ') {
        Some(idx) => format!("{}...", &clipped[..idx]),
        None => format!("{}...", clipped),
    }
}
