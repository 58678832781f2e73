//! Graph store: the index over nodes, guardrails, and their edges.
//!
//! Reads operate on any connection. Writes are only called by the mutation
//! engine inside a broker transaction, which is the atomic
//! apply-all-or-nothing commit primitive. `GraphSnapshot` is the in-memory
//! image handed to the integrity validator; it is loaded inside the same
//! transaction that will commit the mutation, so the validator and the write
//! observe one consistent pre-state.

use crate::core::error::RaasError;
use crate::core::model::{
    format_human_id, looks_like_human_id, now_iso, EnforcementLevel, Guardrail, GuardrailCategory,
    Node, NodeType, Status,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rustc_hash::{FxHashMap, FxHashSet};
use ulid::Ulid;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    pub node_type: Option<NodeType>,
    pub status: Option<Status>,
    pub tag: Option<String>,
}

// ---- Snapshot ----

#[derive(Debug, Clone)]
pub struct SnapshotNode {
    pub id: Uuid,
    pub human_id: String,
    pub node_type: NodeType,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct SnapshotGuardrail {
    pub id: Uuid,
    pub human_id: String,
    pub applies_to: Vec<NodeType>,
}

/// Structural image of the graph: identity, tree shape, dependency edges,
/// and guardrail applicability. Everything the validator needs, nothing it
/// does not.
#[derive(Debug, Clone, Default)]
pub struct GraphSnapshot {
    nodes: FxHashMap<Uuid, SnapshotNode>,
    node_human_ids: FxHashMap<String, Uuid>,
    depends_on: FxHashMap<Uuid, Vec<Uuid>>,
    guardrails: FxHashMap<Uuid, SnapshotGuardrail>,
    guardrail_human_ids: FxHashMap<String, Uuid>,
}

impl GraphSnapshot {
    pub fn load(conn: &Connection) -> Result<Self, RaasError> {
        let mut snap = GraphSnapshot::default();

        let mut stmt =
            conn.prepare("SELECT id, human_id, node_type, parent_id FROM nodes")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;
        for row in rows {
            let (id, human_id, node_type, parent_id) = row?;
            let id = parse_uuid(&id)?;
            let node = SnapshotNode {
                id,
                human_id: human_id.clone(),
                node_type: NodeType::parse(&node_type)?,
                parent_id: parent_id.as_deref().map(parse_uuid).transpose()?,
            };
            snap.node_human_ids.insert(human_id, id);
            snap.nodes.insert(id, node);
        }

        let mut stmt = conn.prepare("SELECT node_id, depends_on_id FROM node_dependencies")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (from, to) = row?;
            snap.depends_on
                .entry(parse_uuid(&from)?)
                .or_default()
                .push(parse_uuid(&to)?);
        }

        let mut stmt = conn.prepare("SELECT id, human_id, applies_to FROM guardrails")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        for row in rows {
            let (id, human_id, applies_to) = row?;
            let id = parse_uuid(&id)?;
            let applies_to: Vec<String> = serde_json::from_str(&applies_to)
                .map_err(|e| RaasError::MalformedDocument(format!("applies_to column: {}", e)))?;
            let applies_to = applies_to
                .iter()
                .map(|s| NodeType::parse(s))
                .collect::<Result<Vec<_>, _>>()?;
            snap.guardrail_human_ids.insert(human_id.clone(), id);
            snap.guardrails.insert(
                id,
                SnapshotGuardrail {
                    id,
                    human_id,
                    applies_to,
                },
            );
        }

        Ok(snap)
    }

    pub fn node(&self, id: &Uuid) -> Option<&SnapshotNode> {
        self.nodes.get(id)
    }

    pub fn node_by_human_id(&self, human_id: &str) -> Option<&SnapshotNode> {
        self.node_human_ids
            .get(human_id)
            .and_then(|id| self.nodes.get(id))
    }

    /// Resolve a raw reference (UUID string or human id) to a node id.
    pub fn resolve_node_ref(&self, reference: &str) -> Option<Uuid> {
        if let Ok(id) = Uuid::parse_str(reference) {
            return self.nodes.contains_key(&id).then_some(id);
        }
        self.node_human_ids.get(reference).copied()
    }

    pub fn guardrail(&self, id: &Uuid) -> Option<&SnapshotGuardrail> {
        self.guardrails.get(id)
    }

    pub fn resolve_guardrail_ref(&self, reference: &str) -> Option<&SnapshotGuardrail> {
        if let Ok(id) = Uuid::parse_str(reference) {
            return self.guardrails.get(&id);
        }
        self.guardrail_human_ids
            .get(reference)
            .and_then(|id| self.guardrails.get(id))
    }

    pub fn human_id_taken(&self, human_id: &str) -> bool {
        self.node_human_ids.contains_key(human_id)
            || self.guardrail_human_ids.contains_key(human_id)
    }

    pub fn id_taken(&self, id: &Uuid) -> bool {
        self.nodes.contains_key(id) || self.guardrails.contains_key(id)
    }

    pub fn children_of(&self, id: &Uuid) -> Vec<&SnapshotNode> {
        self.nodes
            .values()
            .filter(|n| n.parent_id.as_ref() == Some(id))
            .collect()
    }

    pub fn direct_dependencies(&self, id: &Uuid) -> &[Uuid] {
        self.depends_on.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All node ids transitively reachable from `start` along `depends_on`
    /// edges, with `overlay` substituting the edge set of one node (the
    /// hypothetical post-mutation state).
    pub fn reachable_from(&self, start: &Uuid, overlay: Option<(&Uuid, &[Uuid])>) -> FxHashSet<Uuid> {
        let mut seen: FxHashSet<Uuid> = FxHashSet::default();
        let mut stack = vec![*start];
        while let Some(current) = stack.pop() {
            let targets: &[Uuid] = match overlay {
                Some((id, edges)) if *id == current => edges,
                _ => self.direct_dependencies(&current),
            };
            for next in targets {
                if seen.insert(*next) {
                    stack.push(*next);
                }
            }
        }
        seen
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, RaasError> {
    Uuid::parse_str(s)
        .map_err(|e| RaasError::MalformedDocument(format!("invalid UUID '{}': {}", s, e)))
}

// ---- Row mapping ----

fn node_from_row(row: &Row<'_>) -> rusqlite::Result<(Node, Option<String>)> {
    let id: String = row.get(0)?;
    let tags: String = row.get(6)?;
    let parent: Option<String> = row.get(7)?;
    let extra: String = row.get(10)?;
    let node = Node {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        human_id: row.get(1)?,
        node_type: NodeType::parse(&row.get::<_, String>(2)?).map_err(|_| {
            rusqlite::Error::InvalidColumnType(2, "node_type".into(), rusqlite::types::Type::Text)
        })?,
        title: row.get(3)?,
        status: Status::parse(&row.get::<_, String>(4)?).map_err(|_| {
            rusqlite::Error::InvalidColumnType(4, "status".into(), rusqlite::types::Type::Text)
        })?,
        priority: row.get::<_, Option<i64>>(5)?.map(|v| v as u32),
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        parent_id: None, // filled from `parent` below
        depends_on: Vec::new(),
        adheres_to: Vec::new(),
        description: row.get(8)?,
        body: row.get(9)?,
        extra: serde_json::from_str(&extra).unwrap_or_default(),
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    };
    Ok((node, parent))
}

const NODE_COLUMNS: &str = "id, human_id, node_type, title, status, priority, tags, parent_id, \
                            description, body, extra, created_at, updated_at";

fn finish_node(
    conn: &Connection,
    (mut node, parent): (Node, Option<String>),
) -> Result<Node, RaasError> {
    node.parent_id = parent.as_deref().map(parse_uuid).transpose()?;
    node.depends_on = {
        let mut stmt = conn.prepare(
            "SELECT depends_on_id FROM node_dependencies WHERE node_id = ?1 ORDER BY created_at, depends_on_id",
        )?;
        let rows = stmt.query_map([node.id.to_string()], |row| row.get::<_, String>(0))?;
        rows.collect::<Result<Vec<_>, _>>()?
            .iter()
            .map(|s| parse_uuid(s))
            .collect::<Result<Vec<_>, _>>()?
    };
    node.adheres_to = {
        let mut stmt = conn.prepare(
            "SELECT g.human_id FROM node_adherences a JOIN guardrails g ON g.id = a.guardrail_id
             WHERE a.node_id = ?1 ORDER BY a.created_at, g.human_id",
        )?;
        let rows = stmt.query_map([node.id.to_string()], |row| row.get::<_, String>(0))?;
        rows.collect::<Result<Vec<_>, _>>()?
    };
    Ok(node)
}

// ---- Node reads ----

pub fn get_node_by_uuid(conn: &Connection, id: &Uuid) -> Result<Option<Node>, RaasError> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM nodes WHERE id = ?1", NODE_COLUMNS),
            [id.to_string()],
            node_from_row,
        )
        .optional()?;
    row.map(|r| finish_node(conn, r)).transpose()
}

/// Point lookup accepting either a UUID or a human id.
pub fn get_node(conn: &Connection, reference: &str) -> Result<Option<Node>, RaasError> {
    if let Ok(id) = Uuid::parse_str(reference) {
        return get_node_by_uuid(conn, &id);
    }
    if !looks_like_human_id(reference) {
        return Ok(None);
    }
    let row = conn
        .query_row(
            &format!("SELECT {} FROM nodes WHERE human_id = ?1", NODE_COLUMNS),
            [reference],
            node_from_row,
        )
        .optional()?;
    row.map(|r| finish_node(conn, r)).transpose()
}

pub fn list_nodes(conn: &Connection, filter: &NodeFilter) -> Result<Vec<Node>, RaasError> {
    let mut sql = format!("SELECT {} FROM nodes WHERE 1=1", NODE_COLUMNS);
    let mut args: Vec<String> = Vec::new();
    if let Some(t) = filter.node_type {
        args.push(t.as_str().to_string());
        sql.push_str(&format!(" AND node_type = ?{}", args.len()));
    }
    if let Some(s) = filter.status {
        args.push(s.as_str().to_string());
        sql.push_str(&format!(" AND status = ?{}", args.len()));
    }
    sql.push_str(" ORDER BY human_id");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), node_from_row)?;
    let mut nodes = Vec::new();
    for row in rows {
        let node = finish_node(conn, row?)?;
        if let Some(tag) = &filter.tag {
            if !node.tags.iter().any(|t| t == tag) {
                continue;
            }
        }
        nodes.push(node);
    }
    Ok(nodes)
}

pub fn children_of(conn: &Connection, id: &Uuid) -> Result<Vec<Node>, RaasError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM nodes WHERE parent_id = ?1 ORDER BY human_id",
        NODE_COLUMNS
    ))?;
    let rows = stmt.query_map([id.to_string()], node_from_row)?;
    let mut nodes = Vec::new();
    for row in rows {
        nodes.push(finish_node(conn, row?)?);
    }
    Ok(nodes)
}

/// Human ids of nodes whose `depends_on` targets `id`.
pub fn dependents_of(conn: &Connection, id: &Uuid) -> Result<Vec<String>, RaasError> {
    let mut stmt = conn.prepare(
        "SELECT n.human_id FROM node_dependencies d JOIN nodes n ON n.id = d.node_id
         WHERE d.depends_on_id = ?1 ORDER BY n.human_id",
    )?;
    let rows = stmt.query_map([id.to_string()], |row| row.get::<_, String>(0))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Human ids of nodes adhering to a guardrail. Consulted before guardrail
/// deletion.
pub fn adherents_of(conn: &Connection, guardrail_id: &Uuid) -> Result<Vec<String>, RaasError> {
    let mut stmt = conn.prepare(
        "SELECT n.human_id FROM node_adherences a JOIN nodes n ON n.id = a.node_id
         WHERE a.guardrail_id = ?1 ORDER BY n.human_id",
    )?;
    let rows = stmt.query_map([guardrail_id.to_string()], |row| row.get::<_, String>(0))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

// ---- Guardrail reads ----

fn guardrail_from_row(row: &Row<'_>) -> rusqlite::Result<Guardrail> {
    let id: String = row.get(0)?;
    let applies_to: String = row.get(5)?;
    let applies_to: Vec<String> = serde_json::from_str(&applies_to).unwrap_or_default();
    Ok(Guardrail {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        human_id: row.get(1)?,
        title: row.get(2)?,
        category: GuardrailCategory::parse(&row.get::<_, String>(3)?).map_err(|_| {
            rusqlite::Error::InvalidColumnType(3, "category".into(), rusqlite::types::Type::Text)
        })?,
        enforcement_level: EnforcementLevel::parse(&row.get::<_, String>(4)?).map_err(|_| {
            rusqlite::Error::InvalidColumnType(
                4,
                "enforcement_level".into(),
                rusqlite::types::Type::Text,
            )
        })?,
        applies_to: applies_to
            .iter()
            .filter_map(|s| NodeType::parse(s).ok())
            .collect(),
        status: row.get(6)?,
        description: row.get(7)?,
        body: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

const GUARDRAIL_COLUMNS: &str = "id, human_id, title, category, enforcement_level, applies_to, \
                                 status, description, body, created_at, updated_at";

pub fn get_guardrail(conn: &Connection, reference: &str) -> Result<Option<Guardrail>, RaasError> {
    let (clause, key) = if Uuid::parse_str(reference).is_ok() {
        ("id", reference)
    } else {
        ("human_id", reference)
    };
    Ok(conn
        .query_row(
            &format!(
                "SELECT {} FROM guardrails WHERE {} = ?1",
                GUARDRAIL_COLUMNS, clause
            ),
            [key],
            guardrail_from_row,
        )
        .optional()?)
}

pub fn list_guardrails(
    conn: &Connection,
    applies_to: Option<NodeType>,
) -> Result<Vec<Guardrail>, RaasError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM guardrails ORDER BY human_id",
        GUARDRAIL_COLUMNS
    ))?;
    let rows = stmt.query_map([], guardrail_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        let g = row?;
        if let Some(t) = applies_to {
            if !g.applies_to.contains(&t) {
                continue;
            }
        }
        out.push(g);
    }
    Ok(out)
}

// ---- Sequence allocation ----

/// Allocate the next sequence number for `(prefix, kind)`. Runs inside the
/// mutation transaction, so concurrent creates serialize and numbers are
/// gapless and never reused.
pub fn next_sequence(conn: &Connection, prefix: &str, kind: &str) -> Result<u32, RaasError> {
    conn.execute(
        "INSERT INTO id_sequences(prefix, kind, next_number, updated_at)
         VALUES(?1, ?2, 2, ?3)
         ON CONFLICT(prefix, kind) DO UPDATE SET
             next_number = next_number + 1,
             updated_at = excluded.updated_at",
        params![prefix, kind, now_iso()],
    )?;
    let next: i64 = conn.query_row(
        "SELECT next_number FROM id_sequences WHERE prefix = ?1 AND kind = ?2",
        params![prefix, kind],
        |row| row.get(0),
    )?;
    // next_number is the number the *next* allocation will take.
    Ok((next - 1) as u32)
}

pub fn allocate_human_id(
    conn: &Connection,
    prefix: &str,
    code: &str,
) -> Result<String, RaasError> {
    let n = next_sequence(conn, prefix, code)?;
    Ok(format_human_id(prefix, code, n))
}

// ---- Writes (engine-only, inside broker transactions) ----

pub fn insert_node(conn: &Connection, node: &Node) -> Result<(), RaasError> {
    conn.execute(
        "INSERT INTO nodes (id, human_id, node_type, title, status, priority, tags, parent_id,
                            description, body, extra, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            node.id.to_string(),
            node.human_id,
            node.node_type.as_str(),
            node.title,
            node.status.as_str(),
            node.priority.map(|p| p as i64),
            serde_json::to_string(&node.tags).unwrap_or_else(|_| "[]".into()),
            node.parent_id.map(|p| p.to_string()),
            node.description,
            node.body,
            serde_json::to_string(&node.extra).unwrap_or_else(|_| "[]".into()),
            node.created_at,
            node.updated_at,
        ],
    )?;
    Ok(())
}

pub fn update_node_row(conn: &Connection, node: &Node) -> Result<(), RaasError> {
    conn.execute(
        "UPDATE nodes SET title = ?2, status = ?3, priority = ?4, tags = ?5, parent_id = ?6,
                          description = ?7, body = ?8, extra = ?9, updated_at = ?10
         WHERE id = ?1",
        params![
            node.id.to_string(),
            node.title,
            node.status.as_str(),
            node.priority.map(|p| p as i64),
            serde_json::to_string(&node.tags).unwrap_or_else(|_| "[]".into()),
            node.parent_id.map(|p| p.to_string()),
            node.description,
            node.body,
            serde_json::to_string(&node.extra).unwrap_or_else(|_| "[]".into()),
            node.updated_at,
        ],
    )?;
    Ok(())
}

/// Replace the outgoing dependency edge set of a node.
pub fn set_dependencies(
    conn: &Connection,
    node_id: &Uuid,
    depends_on: &[Uuid],
) -> Result<(), RaasError> {
    conn.execute(
        "DELETE FROM node_dependencies WHERE node_id = ?1",
        [node_id.to_string()],
    )?;
    for target in depends_on {
        conn.execute(
            "INSERT INTO node_dependencies (edge_id, node_id, depends_on_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                Ulid::new().to_string(),
                node_id.to_string(),
                target.to_string(),
                now_iso()
            ],
        )?;
    }
    Ok(())
}

/// Replace the adherence edge set of a node. Targets are guardrail UUIDs.
pub fn set_adherences(
    conn: &Connection,
    node_id: &Uuid,
    guardrail_ids: &[Uuid],
) -> Result<(), RaasError> {
    conn.execute(
        "DELETE FROM node_adherences WHERE node_id = ?1",
        [node_id.to_string()],
    )?;
    for target in guardrail_ids {
        conn.execute(
            "INSERT INTO node_adherences (edge_id, node_id, guardrail_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                Ulid::new().to_string(),
                node_id.to_string(),
                target.to_string(),
                now_iso()
            ],
        )?;
    }
    Ok(())
}

pub fn delete_node_row(conn: &Connection, id: &Uuid) -> Result<(), RaasError> {
    // Incoming edges from surviving nodes are the engine's responsibility;
    // outgoing edges cascade with the row.
    conn.execute(
        "DELETE FROM node_dependencies WHERE depends_on_id = ?1",
        [id.to_string()],
    )?;
    conn.execute("DELETE FROM nodes WHERE id = ?1", [id.to_string()])?;
    Ok(())
}

pub fn insert_guardrail(conn: &Connection, g: &Guardrail) -> Result<(), RaasError> {
    let applies: Vec<&str> = g.applies_to.iter().map(|t| t.as_str()).collect();
    conn.execute(
        "INSERT INTO guardrails (id, human_id, title, category, enforcement_level, applies_to,
                                 status, description, body, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            g.id.to_string(),
            g.human_id,
            g.title,
            g.category.as_str(),
            g.enforcement_level.as_str(),
            serde_json::to_string(&applies).unwrap_or_else(|_| "[]".into()),
            g.status,
            g.description,
            g.body,
            g.created_at,
            g.updated_at,
        ],
    )?;
    Ok(())
}

pub fn delete_guardrail_row(conn: &Connection, id: &Uuid) -> Result<(), RaasError> {
    conn.execute("DELETE FROM guardrails WHERE id = ?1", [id.to_string()])?;
    Ok(())
}
