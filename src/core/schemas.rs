//! Database schema definitions for the corpus store.
//!
//! The engine keeps one SQLite database (`raas.db`) holding the node tree,
//! the dependency and adherence edges, guardrails, and the per-(prefix, type)
//! id sequences.

pub const CORPUS_DB_NAME: &str = "raas.db";
pub const BROKER_EVENTS_NAME: &str = "broker.events.jsonl";
pub const CORPUS_SCHEMA_VERSION: u32 = 1;

pub const CORPUS_DB_SCHEMA_META: &str = "
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
";

pub const CORPUS_DB_SCHEMA_NODES: &str = "
    CREATE TABLE IF NOT EXISTS nodes (
        id TEXT PRIMARY KEY,
        human_id TEXT NOT NULL UNIQUE,
        node_type TEXT NOT NULL,
        title TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'draft',
        priority INTEGER,
        tags TEXT NOT NULL DEFAULT '[]', -- JSON array of strings
        parent_id TEXT REFERENCES nodes(id),
        description TEXT NOT NULL DEFAULT '',
        body TEXT NOT NULL DEFAULT '',
        extra TEXT NOT NULL DEFAULT '[]', -- preserved unknown frontmatter keys
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
";
pub const CORPUS_DB_SCHEMA_INDEX_NODES_PARENT: &str =
    "CREATE INDEX IF NOT EXISTS idx_nodes_parent ON nodes(parent_id)";
pub const CORPUS_DB_SCHEMA_INDEX_NODES_TYPE: &str =
    "CREATE INDEX IF NOT EXISTS idx_nodes_type ON nodes(node_type)";
pub const CORPUS_DB_SCHEMA_INDEX_NODES_STATUS: &str =
    "CREATE INDEX IF NOT EXISTS idx_nodes_status ON nodes(status)";

pub const CORPUS_DB_SCHEMA_DEPENDENCIES: &str = "
    CREATE TABLE IF NOT EXISTS node_dependencies (
        edge_id TEXT PRIMARY KEY,
        node_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
        depends_on_id TEXT NOT NULL REFERENCES nodes(id),
        created_at TEXT NOT NULL,
        UNIQUE(node_id, depends_on_id),
        CHECK(node_id != depends_on_id)
    )
";
pub const CORPUS_DB_SCHEMA_INDEX_DEPS_FROM: &str =
    "CREATE INDEX IF NOT EXISTS idx_deps_from ON node_dependencies(node_id)";
pub const CORPUS_DB_SCHEMA_INDEX_DEPS_TO: &str =
    "CREATE INDEX IF NOT EXISTS idx_deps_to ON node_dependencies(depends_on_id)";

pub const CORPUS_DB_SCHEMA_GUARDRAILS: &str = "
    CREATE TABLE IF NOT EXISTS guardrails (
        id TEXT PRIMARY KEY,
        human_id TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        category TEXT NOT NULL,
        enforcement_level TEXT NOT NULL,
        applies_to TEXT NOT NULL, -- JSON array of node types
        status TEXT NOT NULL DEFAULT 'draft',
        description TEXT NOT NULL DEFAULT '',
        body TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
";

pub const CORPUS_DB_SCHEMA_ADHERENCES: &str = "
    CREATE TABLE IF NOT EXISTS node_adherences (
        edge_id TEXT PRIMARY KEY,
        node_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
        guardrail_id TEXT NOT NULL REFERENCES guardrails(id),
        created_at TEXT NOT NULL,
        UNIQUE(node_id, guardrail_id)
    )
";
pub const CORPUS_DB_SCHEMA_INDEX_ADHERENCES_GUARDRAIL: &str =
    "CREATE INDEX IF NOT EXISTS idx_adherences_guardrail ON node_adherences(guardrail_id)";

// Sequence numbers are monotonic per (prefix, kind) and never reused, even
// after deletion. Allocation happens inside the mutation transaction.
pub const CORPUS_DB_SCHEMA_ID_SEQUENCES: &str = "
    CREATE TABLE IF NOT EXISTS id_sequences (
        prefix TEXT NOT NULL,
        kind TEXT NOT NULL,
        next_number INTEGER NOT NULL DEFAULT 1,
        updated_at TEXT NOT NULL,
        PRIMARY KEY(prefix, kind),
        CHECK(next_number > 0)
    )
";

pub const CORPUS_DB_SCHEMA_ALL: &[&str] = &[
    CORPUS_DB_SCHEMA_META,
    CORPUS_DB_SCHEMA_NODES,
    CORPUS_DB_SCHEMA_INDEX_NODES_PARENT,
    CORPUS_DB_SCHEMA_INDEX_NODES_TYPE,
    CORPUS_DB_SCHEMA_INDEX_NODES_STATUS,
    CORPUS_DB_SCHEMA_DEPENDENCIES,
    CORPUS_DB_SCHEMA_INDEX_DEPS_FROM,
    CORPUS_DB_SCHEMA_INDEX_DEPS_TO,
    CORPUS_DB_SCHEMA_GUARDRAILS,
    CORPUS_DB_SCHEMA_ADHERENCES,
    CORPUS_DB_SCHEMA_INDEX_ADHERENCES_GUARDRAIL,
    CORPUS_DB_SCHEMA_ID_SEQUENCES,
];
