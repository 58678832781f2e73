//! Mutation engine: the only write path into the corpus.
//!
//! Every operation validates against the hypothetical post-mutation graph
//! inside one broker-serialized transaction; if validation fails the
//! transaction rolls back and the store is unchanged. Violations surface to
//! the caller exactly as the validator produced them, never downgraded or
//! auto-corrected.

use crate::core::broker::DbBroker;
use crate::core::codec::{self, NodeDocument};
use crate::core::config::Config;
use crate::core::db;
use crate::core::error::RaasError;
use crate::core::graph::{self, GraphSnapshot, NodeFilter};
use crate::core::model::{
    now_iso, EnforcementLevel, Guardrail, GuardrailCategory, Node, NodeType, Status,
    GUARDRAIL_CODE,
};
use crate::core::store::{find_project_root, Store};
use crate::core::template::{self, TemplateFields};
use crate::core::validate::{self, NodeDraft, Permissive, StatusPolicy};
use rustc_hash::FxHashSet;
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

/// Partial field update. Absent fields keep their current value.
/// `priority: Some(None)` clears the priority.
#[derive(Debug, Clone, Default)]
pub struct NodePatch {
    pub title: Option<String>,
    pub status: Option<Status>,
    pub priority: Option<Option<u32>>,
    pub tags: Option<Vec<String>>,
    pub depends_on: Option<Vec<String>>,
    pub adheres_to: Option<Vec<String>>,
    pub body: Option<String>,
}

impl NodePatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.tags.is_none()
            && self.depends_on.is_none()
            && self.adheres_to.is_none()
            && self.body.is_none()
    }
}

/// Outcome of a delete, naming what was removed.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteReport {
    pub deleted: Vec<String>,
    pub detached_dependency_edges: usize,
}

pub struct Engine {
    store: Store,
    config: Config,
    broker: DbBroker,
    status_policy: Box<dyn StatusPolicy + Send + Sync>,
    actor: String,
}

impl Engine {
    /// Open the engine for the project containing `start_dir`.
    pub fn open(start_dir: &Path) -> Result<Self, RaasError> {
        let project_root = find_project_root(start_dir).ok_or_else(|| {
            RaasError::NotFound(format!(
                "no .raas project found at or above {} (run `raas init`)",
                start_dir.display()
            ))
        })?;
        let config = Config::load(&project_root.join(".raas"))?;
        let store = Store::for_project(&project_root);
        db::initialize_corpus_db(&store.root)?;
        Ok(Self::with_store(store, config))
    }

    /// Open directly on a store root. Used by tests and the adapter.
    pub fn with_store(store: Store, config: Config) -> Self {
        let broker = DbBroker::new(&store.root, config.lock_wait_ms);
        Self {
            store,
            config,
            broker,
            status_policy: Box::new(Permissive),
            actor: "raas".to_string(),
        }
    }

    /// Initialize a new project: `.raas/config.toml` plus an empty corpus.
    pub fn init(project_dir: &Path, prefix: Option<String>) -> Result<Self, RaasError> {
        let raas_dir = project_dir.join(".raas");
        let config = Config {
            prefix: prefix.unwrap_or_else(|| crate::core::config::DEFAULT_PREFIX.to_string()),
            ..Config::default()
        };
        if config.prefix.is_empty() || !config.prefix.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(RaasError::ConfigError(format!(
                "prefix '{}' must be non-empty uppercase ASCII",
                config.prefix
            )));
        }
        config.save(&raas_dir)?;
        let store = Store::for_project(project_dir);
        db::initialize_corpus_db(&store.root)?;
        Ok(Self::with_store(store, config))
    }

    /// Swap the status transition policy supplied by the workflow layer.
    pub fn set_status_policy(&mut self, policy: Box<dyn StatusPolicy + Send + Sync>) {
        self.status_policy = policy;
    }

    pub fn set_actor(&mut self, actor: &str) {
        self.actor = actor.to_string();
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn prefix(&self) -> &str {
        &self.config.prefix
    }

    // ---- Node operations ----

    /// Create a node from a full markdown document. `id`, `human_id` and
    /// timestamps are system-assigned; status is forced to draft regardless
    /// of what the document claims.
    pub fn create_node_from_document(&self, content: &str) -> Result<Node, RaasError> {
        let doc = codec::parse_node(content)?;
        self.commit_create(doc)
    }

    /// Create a node from fields, scaffolding the canonical body when none
    /// is supplied.
    pub fn create_node(
        &self,
        node_type: NodeType,
        fields: TemplateFields,
        body: Option<String>,
    ) -> Result<Node, RaasError> {
        let rendered = template::render_node_template(node_type, &fields);
        let mut doc = codec::parse_node(&rendered)?;
        if let Some(body) = body {
            doc.body = body;
        }
        self.commit_create(doc)
    }

    fn commit_create(&self, doc: NodeDocument) -> Result<Node, RaasError> {
        let prefix = self.config.prefix.clone();
        self.broker.with_txn(&self.actor, "node.create", move |txn| {
            let snapshot = GraphSnapshot::load(txn)?;

            let id = Uuid::new_v4();
            let human_id = graph::allocate_human_id(txn, &prefix, doc.header.node_type.code())?;

            let draft = NodeDraft {
                id,
                human_id: Some(human_id.clone()),
                node_type: doc.header.node_type,
                title: doc.header.title.clone(),
                parent_ref: doc.header.parent_id.clone(),
                depends_on_refs: doc.header.depends_on.clone(),
                adheres_to_refs: doc.header.adheres_to.clone(),
                is_create: true,
            };
            let resolved = validate::check(&snapshot, &draft).map_err(RaasError::Validation)?;

            let now = now_iso();
            let node = Node {
                id,
                human_id,
                node_type: doc.header.node_type,
                title: doc.header.title.clone(),
                status: Status::Draft,
                priority: doc.header.priority,
                tags: doc.header.tags.clone(),
                parent_id: resolved.parent_id,
                depends_on: resolved.depends_on.clone(),
                adheres_to: Vec::new(), // filled by the read below
                description: codec::extract_description(&doc.body),
                body: doc.body.clone(),
                extra: doc.header.extra.clone(),
                created_at: now.clone(),
                updated_at: now,
            };
            graph::insert_node(txn, &node)?;
            graph::set_dependencies(txn, &node.id, &resolved.depends_on)?;
            graph::set_adherences(txn, &node.id, &resolved.adheres_to)?;

            graph::get_node_by_uuid(txn, &node.id)?
                .ok_or_else(|| RaasError::NotFound(node.id.to_string()))
        })
    }

    pub fn get_node(&self, reference: &str) -> Result<Node, RaasError> {
        self.broker.with_read(|conn| {
            graph::get_node(conn, reference)?
                .ok_or_else(|| RaasError::NotFound(reference.to_string()))
        })
    }

    /// Render a stored node as its external document representation.
    pub fn get_node_document(&self, reference: &str) -> Result<String, RaasError> {
        Ok(codec::render_node(&self.get_node(reference)?))
    }

    pub fn list_nodes(&self, filter: &NodeFilter) -> Result<Vec<Node>, RaasError> {
        self.broker.with_read(|conn| graph::list_nodes(conn, filter))
    }

    pub fn children_of(&self, reference: &str) -> Result<Vec<Node>, RaasError> {
        let node = self.get_node(reference)?;
        self.broker.with_read(|conn| graph::children_of(conn, &node.id))
    }

    /// Apply a partial field update, re-running every invariant against the
    /// hypothetical post-state.
    pub fn update_node(&self, reference: &str, patch: NodePatch) -> Result<Node, RaasError> {
        let reference = reference.to_string();
        let policy = &self.status_policy;
        self.broker.with_txn(&self.actor, "node.update", move |txn| {
            let mut node = graph::get_node(txn, &reference)?
                .ok_or_else(|| RaasError::NotFound(reference.clone()))?;
            let snapshot = GraphSnapshot::load(txn)?;

            if let Some(new_status) = patch.status {
                if new_status != node.status
                    && !policy.allow_transition(node.status, new_status)
                {
                    return Err(RaasError::Conflict(format!(
                        "status transition {} -> {} rejected by workflow policy",
                        node.status, new_status
                    )));
                }
                node.status = new_status;
            }
            if let Some(title) = &patch.title {
                node.title = title.clone();
            }
            if let Some(priority) = patch.priority {
                node.priority = priority;
            }
            if let Some(tags) = &patch.tags {
                node.tags = tags.clone();
            }
            if let Some(body) = &patch.body {
                node.body = body.clone();
                node.description = codec::extract_description(body);
            }

            let depends_on_refs = match &patch.depends_on {
                Some(refs) => refs.clone(),
                None => node.depends_on.iter().map(|id| id.to_string()).collect(),
            };
            let adheres_to_refs = match &patch.adheres_to {
                Some(refs) => refs.clone(),
                None => node.adheres_to.clone(),
            };

            let draft = NodeDraft {
                id: node.id,
                human_id: None,
                node_type: node.node_type,
                title: node.title.clone(),
                parent_ref: node.parent_id.map(|p| p.to_string()),
                depends_on_refs,
                adheres_to_refs,
                is_create: false,
            };
            let resolved = validate::check(&snapshot, &draft).map_err(RaasError::Validation)?;

            node.updated_at = now_iso();
            graph::update_node_row(txn, &node)?;
            graph::set_dependencies(txn, &node.id, &resolved.depends_on)?;
            graph::set_adherences(txn, &node.id, &resolved.adheres_to)?;

            graph::get_node_by_uuid(txn, &node.id)?
                .ok_or_else(|| RaasError::NotFound(node.id.to_string()))
        })
    }

    /// Re-parent a node. Tree-shape rules are re-validated for the new
    /// parent; dependency edges are independent of tree position and stay
    /// untouched.
    pub fn move_node(
        &self,
        reference: &str,
        new_parent: Option<String>,
    ) -> Result<Node, RaasError> {
        let reference = reference.to_string();
        self.broker.with_txn(&self.actor, "node.move", move |txn| {
            let mut node = graph::get_node(txn, &reference)?
                .ok_or_else(|| RaasError::NotFound(reference.clone()))?;
            let snapshot = GraphSnapshot::load(txn)?;

            let draft = NodeDraft {
                id: node.id,
                human_id: None,
                node_type: node.node_type,
                title: node.title.clone(),
                parent_ref: new_parent.clone(),
                depends_on_refs: node.depends_on.iter().map(|id| id.to_string()).collect(),
                adheres_to_refs: node.adheres_to.clone(),
                is_create: false,
            };
            let resolved = validate::check(&snapshot, &draft).map_err(RaasError::Validation)?;

            node.parent_id = resolved.parent_id;
            node.updated_at = now_iso();
            graph::update_node_row(txn, &node)?;

            graph::get_node_by_uuid(txn, &node.id)?
                .ok_or_else(|| RaasError::NotFound(node.id.to_string()))
        })
    }

    /// Delete a node. Without `cascade` the operation fails with `Conflict`
    /// while children or incoming dependency references exist. With
    /// `cascade` the subtree is removed and dangling references from
    /// surviving nodes are detached, all in one commit.
    pub fn delete_node(&self, reference: &str, cascade: bool) -> Result<DeleteReport, RaasError> {
        let reference = reference.to_string();
        self.broker.with_txn(&self.actor, "node.delete", move |txn| {
            let node = graph::get_node(txn, &reference)?
                .ok_or_else(|| RaasError::NotFound(reference.clone()))?;

            let children = graph::children_of(txn, &node.id)?;
            let dependents = graph::dependents_of(txn, &node.id)?;

            if !cascade {
                if !children.is_empty() {
                    let names: Vec<&str> =
                        children.iter().map(|c| c.human_id.as_str()).collect();
                    return Err(RaasError::Conflict(format!(
                        "cannot delete {}: it has children: {}",
                        node.human_id,
                        names.join(", ")
                    )));
                }
                if !dependents.is_empty() {
                    return Err(RaasError::Conflict(format!(
                        "cannot delete {}: other nodes depend on it: {}",
                        node.human_id,
                        dependents.join(", ")
                    )));
                }
            }

            // Depth-first over the subtree, children removed before parents.
            let mut deleted = Vec::new();
            let mut detached = 0usize;
            let mut stack = vec![node.clone()];
            let mut ordered = Vec::new();
            while let Some(current) = stack.pop() {
                let kids = graph::children_of(txn, &current.id)?;
                stack.extend(kids);
                ordered.push(current);
            }
            // Edges between subtree members vanish with their owners; only
            // references held by survivors count as detached.
            let subtree: FxHashSet<&str> =
                ordered.iter().map(|n| n.human_id.as_str()).collect();
            for current in ordered.iter().rev() {
                detached += graph::dependents_of(txn, &current.id)?
                    .iter()
                    .filter(|h| !subtree.contains(h.as_str()))
                    .count();
                graph::delete_node_row(txn, &current.id)?;
                deleted.push(current.human_id.clone());
            }

            Ok(DeleteReport {
                deleted,
                detached_dependency_edges: detached,
            })
        })
    }

    // ---- Guardrail operations ----

    pub fn create_guardrail_from_document(&self, content: &str) -> Result<Guardrail, RaasError> {
        let doc = codec::parse_guardrail(content)?;
        if doc.header.title.trim().is_empty() {
            return Err(RaasError::Validation(
                crate::core::error::Violation::MissingField {
                    field: "title".to_string(),
                },
            ));
        }
        if doc.header.applies_to.is_empty() {
            return Err(RaasError::Validation(
                crate::core::error::Violation::MissingField {
                    field: "applies_to".to_string(),
                },
            ));
        }
        let prefix = self.config.prefix.clone();
        self.broker
            .with_txn(&self.actor, "guardrail.create", move |txn| {
                let human_id = graph::allocate_human_id(txn, &prefix, GUARDRAIL_CODE)?;
                let now = now_iso();
                let g = Guardrail {
                    id: Uuid::new_v4(),
                    human_id,
                    title: doc.header.title.clone(),
                    category: doc.header.category,
                    enforcement_level: doc.header.enforcement_level,
                    applies_to: doc.header.applies_to.clone(),
                    status: doc.header.status.clone(),
                    description: codec::extract_description(&doc.body),
                    body: doc.body.clone(),
                    created_at: now.clone(),
                    updated_at: now,
                };
                graph::insert_guardrail(txn, &g)?;
                Ok(g)
            })
    }

    pub fn create_guardrail(
        &self,
        title: &str,
        category: GuardrailCategory,
        enforcement_level: EnforcementLevel,
        applies_to: &[NodeType],
        body: Option<String>,
    ) -> Result<Guardrail, RaasError> {
        let rendered =
            template::render_guardrail_template(title, category, enforcement_level, applies_to);
        let mut doc = codec::parse_guardrail(&rendered)?;
        if let Some(body) = body {
            doc.body = body;
        }
        self.create_guardrail_from_document(&codec::render_guardrail_document(&doc))
    }

    pub fn get_guardrail(&self, reference: &str) -> Result<Guardrail, RaasError> {
        self.broker.with_read(|conn| {
            graph::get_guardrail(conn, reference)?
                .ok_or_else(|| RaasError::NotFound(reference.to_string()))
        })
    }

    pub fn list_guardrails(
        &self,
        applies_to: Option<NodeType>,
    ) -> Result<Vec<Guardrail>, RaasError> {
        self.broker
            .with_read(|conn| graph::list_guardrails(conn, applies_to))
    }

    /// Delete a guardrail. Blocked with `Conflict` while any node adheres to
    /// it; deleting would otherwise dangle those references.
    pub fn delete_guardrail(&self, reference: &str) -> Result<(), RaasError> {
        let reference = reference.to_string();
        self.broker
            .with_txn(&self.actor, "guardrail.delete", move |txn| {
                let g = graph::get_guardrail(txn, &reference)?
                    .ok_or_else(|| RaasError::NotFound(reference.clone()))?;
                let adherents = graph::adherents_of(txn, &g.id)?;
                if !adherents.is_empty() {
                    return Err(RaasError::Conflict(format!(
                        "cannot delete {}: nodes adhere to it: {}",
                        g.human_id,
                        adherents.join(", ")
                    )));
                }
                graph::delete_guardrail_row(txn, &g.id)
            })
    }
}
