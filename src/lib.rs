//! RAAS: Requirements-as-a-Service.
//!
//! A hierarchy-and-dependency integrity engine for requirement documents
//! that are simultaneously human-editable markdown and structured records
//! consumed by automated agents.
//!
//! # Architecture
//!
//! - **Document codec**: YAML-frontmatter markdown <-> canonical records,
//!   round-trip safe, unknown keys preserved.
//! - **Graph store**: SQLite-backed index over nodes, guardrails, and their
//!   dependency/adherence edges.
//! - **Integrity validator**: pure pre-commit check with a fixed,
//!   short-circuiting order (tree shape, reference resolution, acyclicity,
//!   guardrail applicability, uniqueness).
//! - **Mutation engine**: the only write path; validates the hypothetical
//!   post-state inside one serialized transaction per mutation.
//! - **Template renderer**: deterministic canonical skeletons per type.
//! - **Tool adapter**: line-oriented JSON envelope for agent tool calls.
//!
//! The hierarchy is Epic > Component > Feature > Requirement, with
//! cross-cutting Guardrails that nodes declare adherence to. Every record
//! carries an immutable UUID and a sequential display id like
//! `RAAS-FEAT-001`.

pub mod adapter;
pub mod core;

use core::engine::{Engine, NodePatch};
use core::error::RaasError;
use core::graph::NodeFilter;
use core::model::{EnforcementLevel, GuardrailCategory, Node, NodeType, Status};
use core::output;
use core::template::TemplateFields;

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::PathBuf;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[clap(
    name = "raas",
    version = env!("CARGO_PKG_VERSION"),
    about = "Requirements-as-a-Service: hierarchy and dependency integrity for requirement documents"
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize a RAAS project in a directory.
    Init {
        /// Directory to initialize (defaults to current working directory).
        #[clap(short, long)]
        dir: Option<PathBuf>,
        /// Identifier prefix for human-readable ids (uppercase ASCII).
        #[clap(long)]
        prefix: Option<String>,
    },
    /// Manage hierarchy nodes (epics, components, features, requirements).
    Node(NodeCli),
    /// Manage guardrails.
    Guardrail(GuardrailCli),
    /// Render canonical document templates.
    Template(TemplateCli),
    /// Serve the JSON tool adapter over stdin/stdout.
    Tool,
    /// Print the binary version.
    Version,
}

#[derive(clap::Args, Debug)]
struct NodeCli {
    /// Output format for this command group.
    #[clap(long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,
    #[clap(subcommand)]
    command: NodeCommand,
}

#[derive(Subcommand, Debug)]
enum NodeCommand {
    /// Create a node.
    Add {
        /// Node type.
        #[clap(long, value_enum)]
        r#type: Option<NodeType>,
        /// Title (required unless --file supplies a document).
        #[clap(long, default_value = "")]
        title: String,
        /// Parent node (UUID or human id).
        #[clap(long)]
        parent: Option<String>,
        #[clap(long)]
        priority: Option<u32>,
        /// Comma-separated tags.
        #[clap(long, default_value = "")]
        tags: String,
        /// Comma-separated dependency references (UUID or human id).
        #[clap(long, default_value = "")]
        depends_on: String,
        /// Comma-separated guardrail references.
        #[clap(long, default_value = "")]
        adheres_to: String,
        /// Read a complete markdown document instead of composing one.
        #[clap(long)]
        file: Option<PathBuf>,
    },
    /// Get a node by UUID or human id.
    Get {
        #[clap(long)]
        id: String,
        /// Print the full markdown document instead of a summary.
        #[clap(long)]
        doc: bool,
    },
    /// List nodes.
    List {
        #[clap(long, value_enum)]
        r#type: Option<NodeType>,
        #[clap(long, value_enum)]
        status: Option<Status>,
        #[clap(long)]
        tag: Option<String>,
    },
    /// List the children of a node.
    Children {
        #[clap(long)]
        id: String,
    },
    /// Edit a node's fields.
    Edit {
        #[clap(long)]
        id: String,
        #[clap(long)]
        title: Option<String>,
        #[clap(long, value_enum)]
        status: Option<Status>,
        #[clap(long)]
        priority: Option<u32>,
        /// Drop the priority entirely.
        #[clap(long)]
        clear_priority: bool,
        /// Replace tags (comma-separated).
        #[clap(long)]
        tags: Option<String>,
        /// Replace dependency references (comma-separated).
        #[clap(long)]
        depends_on: Option<String>,
        /// Replace guardrail references (comma-separated).
        #[clap(long)]
        adheres_to: Option<String>,
        /// Replace the body with the contents of a file.
        #[clap(long)]
        body_file: Option<PathBuf>,
    },
    /// Re-parent a node. Dependency edges are untouched.
    Move {
        #[clap(long)]
        id: String,
        /// New parent (UUID or human id); omit to detach.
        #[clap(long)]
        parent: Option<String>,
    },
    /// Delete a node.
    Delete {
        #[clap(long)]
        id: String,
        /// Also delete the subtree and detach dangling references.
        #[clap(long)]
        cascade: bool,
    },
}

#[derive(clap::Args, Debug)]
struct GuardrailCli {
    /// Output format for this command group.
    #[clap(long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,
    #[clap(subcommand)]
    command: GuardrailCommand,
}

#[derive(Subcommand, Debug)]
enum GuardrailCommand {
    /// Create a guardrail.
    Add {
        #[clap(long, default_value = "")]
        title: String,
        #[clap(long, value_enum)]
        category: Option<GuardrailCategory>,
        #[clap(long, value_enum)]
        enforcement: Option<EnforcementLevel>,
        /// Node types this guardrail applies to (comma-separated; defaults
        /// to all).
        #[clap(long, default_value = "")]
        applies_to: String,
        /// Read a complete markdown document instead of composing one.
        #[clap(long)]
        file: Option<PathBuf>,
    },
    /// Get a guardrail by UUID or human id.
    Get {
        #[clap(long)]
        id: String,
    },
    /// List guardrails.
    List {
        /// Filter by applicability to a node type.
        #[clap(long, value_enum)]
        applies_to: Option<NodeType>,
    },
    /// Delete a guardrail (blocked while nodes adhere to it).
    Delete {
        #[clap(long)]
        id: String,
    },
}

#[derive(clap::Args, Debug)]
struct TemplateCli {
    #[clap(subcommand)]
    command: TemplateCommand,
}

#[derive(Subcommand, Debug)]
enum TemplateCommand {
    /// Print the canonical document skeleton for a type.
    Show {
        #[clap(long, value_enum)]
        r#type: NodeType,
        #[clap(long, default_value = "")]
        title: String,
    },
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn print_node_line(node: &Node) {
    println!(
        "{}  {:<12} [{}] {}",
        node.human_id,
        node.node_type.as_str(),
        output::colored_status(node.status),
        output::compact_line(&node.title, 80)
    );
}

fn open_engine() -> Result<Engine, RaasError> {
    Engine::open(&std::env::current_dir()?)
}

fn run_node(cli: NodeCli) -> Result<(), RaasError> {
    let engine = open_engine()?;
    match cli.command {
        NodeCommand::Add {
            r#type,
            title,
            parent,
            priority,
            tags,
            depends_on,
            adheres_to,
            file,
        } => {
            let node = if let Some(path) = file {
                let content = fs::read_to_string(&path).map_err(RaasError::IoError)?;
                engine.create_node_from_document(&content)?
            } else {
                let node_type = r#type.ok_or_else(|| {
                    RaasError::MalformedDocument("--type is required without --file".to_string())
                })?;
                let fields = TemplateFields {
                    title,
                    parent_id: parent,
                    priority,
                    tags: split_csv(&tags),
                    depends_on: split_csv(&depends_on),
                    adheres_to: split_csv(&adheres_to),
                };
                engine.create_node(node_type, fields, None)?
            };
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&node).unwrap()),
                OutputFormat::Text => {
                    println!("Created {} ({})", node.human_id, node.id);
                }
            }
        }
        NodeCommand::Get { id, doc } => {
            if doc {
                print!("{}", engine.get_node_document(&id)?);
            } else {
                let node = engine.get_node(&id)?;
                match cli.format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&node).unwrap())
                    }
                    OutputFormat::Text => {
                        print_node_line(&node);
                        if !node.description.is_empty() {
                            println!("  {}", output::compact_line(&node.description, 120));
                        }
                        if let Some(parent) = node.parent_id {
                            println!("  parent: {}", parent);
                        }
                        if !node.depends_on.is_empty() {
                            let deps: Vec<String> =
                                node.depends_on.iter().map(|d| d.to_string()).collect();
                            println!("  depends_on: {}", deps.join(", "));
                        }
                        if !node.adheres_to.is_empty() {
                            println!("  adheres_to: {}", node.adheres_to.join(", "));
                        }
                    }
                }
            }
        }
        NodeCommand::List {
            r#type,
            status,
            tag,
        } => {
            let filter = NodeFilter {
                node_type: r#type,
                status,
                tag,
            };
            let nodes = engine.list_nodes(&filter)?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&nodes).unwrap()),
                OutputFormat::Text => {
                    for node in &nodes {
                        print_node_line(node);
                    }
                    println!("{} node(s)", nodes.len());
                }
            }
        }
        NodeCommand::Children { id } => {
            let children = engine.children_of(&id)?;
            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&children).unwrap())
                }
                OutputFormat::Text => {
                    for node in &children {
                        print_node_line(node);
                    }
                    println!("{} child(ren)", children.len());
                }
            }
        }
        NodeCommand::Edit {
            id,
            title,
            status,
            priority,
            clear_priority,
            tags,
            depends_on,
            adheres_to,
            body_file,
        } => {
            let body = body_file
                .map(|p| fs::read_to_string(&p).map_err(RaasError::IoError))
                .transpose()?;
            let patch = NodePatch {
                title,
                status,
                priority: if clear_priority {
                    Some(None)
                } else {
                    priority.map(Some)
                },
                tags: tags.as_deref().map(split_csv),
                depends_on: depends_on.as_deref().map(split_csv),
                adheres_to: adheres_to.as_deref().map(split_csv),
                body,
            };
            let node = engine.update_node(&id, patch)?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&node).unwrap()),
                OutputFormat::Text => println!("Updated {}", node.human_id),
            }
        }
        NodeCommand::Move { id, parent } => {
            let node = engine.move_node(&id, parent)?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&node).unwrap()),
                OutputFormat::Text => match node.parent_id {
                    Some(p) => println!("Moved {} under {}", node.human_id, p),
                    None => println!("Detached {} (no parent)", node.human_id),
                },
            }
        }
        NodeCommand::Delete { id, cascade } => {
            let report = engine.delete_node(&id, cascade)?;
            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&report).unwrap())
                }
                OutputFormat::Text => {
                    println!("Deleted {}", report.deleted.join(", "));
                    if report.detached_dependency_edges > 0 {
                        println!(
                            "Detached {} dependency edge(s)",
                            report.detached_dependency_edges
                        );
                    }
                }
            }
        }
    }
    Ok(())
}

fn run_guardrail(cli: GuardrailCli) -> Result<(), RaasError> {
    let engine = open_engine()?;
    match cli.command {
        GuardrailCommand::Add {
            title,
            category,
            enforcement,
            applies_to,
            file,
        } => {
            let guardrail = if let Some(path) = file {
                let content = fs::read_to_string(&path).map_err(RaasError::IoError)?;
                engine.create_guardrail_from_document(&content)?
            } else {
                let category = category.ok_or_else(|| {
                    RaasError::MalformedDocument("--category is required without --file".into())
                })?;
                let enforcement = enforcement.ok_or_else(|| {
                    RaasError::MalformedDocument("--enforcement is required without --file".into())
                })?;
                let applies_to = split_csv(&applies_to)
                    .iter()
                    .map(|s| NodeType::parse(s))
                    .collect::<Result<Vec<_>, _>>()?;
                engine.create_guardrail(&title, category, enforcement, &applies_to, None)?
            };
            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&guardrail).unwrap())
                }
                OutputFormat::Text => {
                    println!("Created {} ({})", guardrail.human_id, guardrail.id)
                }
            }
        }
        GuardrailCommand::Get { id } => {
            let g = engine.get_guardrail(&id)?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&g).unwrap()),
                OutputFormat::Text => {
                    let applies: Vec<&str> = g.applies_to.iter().map(|t| t.as_str()).collect();
                    println!(
                        "{}  {} [{}] applies to: {}",
                        g.human_id,
                        output::compact_line(&g.title, 80),
                        g.enforcement_level,
                        applies.join(", ")
                    );
                }
            }
        }
        GuardrailCommand::List { applies_to } => {
            let guardrails = engine.list_guardrails(applies_to)?;
            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&guardrails).unwrap())
                }
                OutputFormat::Text => {
                    for g in &guardrails {
                        println!(
                            "{}  {:<12} [{}] {}",
                            g.human_id,
                            g.category.as_str(),
                            g.enforcement_level,
                            output::compact_line(&g.title, 80)
                        );
                    }
                    println!("{} guardrail(s)", guardrails.len());
                }
            }
        }
        GuardrailCommand::Delete { id } => {
            engine.delete_guardrail(&id)?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::json!({ "deleted": true })),
                OutputFormat::Text => println!("Deleted {}", id),
            }
        }
    }
    Ok(())
}

pub fn run() -> Result<(), RaasError> {
    let cli = Cli::parse();

    match cli.command {
        Command::Version => {
            println!("v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Init { dir, prefix } => {
            let target = match dir {
                Some(d) => d,
                None => std::env::current_dir()?,
            };
            let engine = Engine::init(&target, prefix)?;
            println!(
                "Initialized RAAS project in {} (prefix {})",
                target.display(),
                engine.prefix()
            );
            Ok(())
        }
        Command::Node(node_cli) => run_node(node_cli),
        Command::Guardrail(guardrail_cli) => run_guardrail(guardrail_cli),
        Command::Template(template_cli) => {
            match template_cli.command {
                TemplateCommand::Show { r#type, title } => {
                    let fields = TemplateFields {
                        title,
                        ..Default::default()
                    };
                    print!("{}", core::template::render_node_template(r#type, &fields));
                }
            }
            Ok(())
        }
        Command::Tool => {
            let engine = open_engine()?;
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            adapter::serve(&engine, stdin.lock(), stdout.lock())
        }
    }
}
