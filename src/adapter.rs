//! Tool adapter: the boundary between agent tool calls and the engine.
//!
//! Requests arrive as one JSON object per line on stdin; responses leave as
//! one JSON object per line on stdout. The envelope carries a receipt with
//! content hashes so callers can correlate and audit operations. Mapping to
//! any richer transport protocol is the caller's concern; this module only
//! translates structured requests into engine operations and structured
//! results back.

use crate::core::engine::{Engine, NodePatch};
use crate::core::error::RaasError;
use crate::core::graph::NodeFilter;
use crate::core::model::{now_iso, EnforcementLevel, GuardrailCategory, NodeType, Status};
use crate::core::template::{self, TemplateFields};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::io::{BufRead, Write};

#[derive(Debug, Clone, Deserialize)]
pub struct ToolRequest {
    pub op: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default = "default_request_id")]
    pub id: String,
}

pub fn default_request_id() -> String {
    ulid::Ulid::new().to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolResponse {
    pub id: String,
    pub success: bool,
    pub receipt: Receipt,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

/// Receipt documenting what happened.
#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    pub op: String,
    pub timestamp: String,
    pub inputs_hash: String,
    pub outputs_hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolError {
    pub kind: String,
    pub message: String,
    /// Only contention errors should be retried without modification.
    pub retryable: bool,
}

fn content_hash(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

fn param_str(params: &Value, key: &str) -> Result<String, RaasError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RaasError::MalformedDocument(format!("missing string param '{}'", key)))
}

fn param_str_opt(params: &Value, key: &str) -> Option<String> {
    params.get(key).and_then(Value::as_str).map(str::to_string)
}

fn param_str_list(params: &Value, key: &str) -> Vec<String> {
    params
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_node_type(s: &str) -> Result<NodeType, RaasError> {
    NodeType::parse(s)
}

fn fields_from_params(params: &Value) -> TemplateFields {
    let fields = params.get("fields").cloned().unwrap_or(Value::Null);
    TemplateFields {
        title: param_str_opt(&fields, "title").unwrap_or_default(),
        parent_id: param_str_opt(&fields, "parent_id"),
        priority: fields
            .get("priority")
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok()),
        tags: param_str_list(&fields, "tags"),
        depends_on: param_str_list(&fields, "depends_on"),
        adheres_to: param_str_list(&fields, "adheres_to"),
    }
}

fn patch_from_params(params: &Value) -> Result<NodePatch, RaasError> {
    let patch = params
        .get("patch")
        .cloned()
        .ok_or_else(|| RaasError::MalformedDocument("missing 'patch' object".to_string()))?;
    let obj = patch
        .as_object()
        .ok_or_else(|| RaasError::MalformedDocument("'patch' must be an object".to_string()))?;

    let mut out = NodePatch::default();
    out.title = param_str_opt(&patch, "title");
    if let Some(s) = param_str_opt(&patch, "status") {
        out.status = Some(Status::parse(&s)?);
    }
    // Explicit null clears priority; absence leaves it alone.
    if let Some(v) = obj.get("priority") {
        out.priority = Some(match v {
            Value::Null => None,
            other => Some(other.as_u64().and_then(|n| u32::try_from(n).ok()).ok_or_else(
                || RaasError::MalformedDocument("'priority' must be an integer or null".into()),
            )?),
        });
    }
    if obj.contains_key("tags") {
        out.tags = Some(param_str_list(&patch, "tags"));
    }
    if obj.contains_key("depends_on") {
        out.depends_on = Some(param_str_list(&patch, "depends_on"));
    }
    if obj.contains_key("adheres_to") {
        out.adheres_to = Some(param_str_list(&patch, "adheres_to"));
    }
    out.body = param_str_opt(&patch, "body");
    Ok(out)
}

fn execute(engine: &Engine, op: &str, params: &Value) -> Result<Value, RaasError> {
    match op {
        "create_node" => {
            let node = if let Some(document) = param_str_opt(params, "document") {
                engine.create_node_from_document(&document)?
            } else {
                let node_type = parse_node_type(&param_str(params, "type")?)?;
                let body = param_str_opt(params, "body");
                engine.create_node(node_type, fields_from_params(params), body)?
            };
            Ok(serde_json::to_value(&node).unwrap_or(Value::Null))
        }
        "get_node" => {
            let node = engine.get_node(&param_str(params, "id")?)?;
            Ok(serde_json::to_value(&node).unwrap_or(Value::Null))
        }
        "get_node_document" => {
            let doc = engine.get_node_document(&param_str(params, "id")?)?;
            Ok(json!({ "document": doc }))
        }
        "update_node" => {
            let node = engine.update_node(&param_str(params, "id")?, patch_from_params(params)?)?;
            Ok(serde_json::to_value(&node).unwrap_or(Value::Null))
        }
        "move_node" => {
            let node = engine.move_node(
                &param_str(params, "id")?,
                param_str_opt(params, "new_parent_id"),
            )?;
            Ok(serde_json::to_value(&node).unwrap_or(Value::Null))
        }
        "delete_node" => {
            let cascade = params
                .get("cascade")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let report = engine.delete_node(&param_str(params, "id")?, cascade)?;
            Ok(serde_json::to_value(&report).unwrap_or(Value::Null))
        }
        "list_nodes" => {
            let filter = NodeFilter {
                node_type: param_str_opt(params, "type")
                    .map(|s| parse_node_type(&s))
                    .transpose()?,
                status: param_str_opt(params, "status")
                    .map(|s| Status::parse(&s))
                    .transpose()?,
                tag: param_str_opt(params, "tag"),
            };
            let nodes = engine.list_nodes(&filter)?;
            Ok(serde_json::to_value(&nodes).unwrap_or(Value::Null))
        }
        "create_guardrail" => {
            let g = if let Some(document) = param_str_opt(params, "document") {
                engine.create_guardrail_from_document(&document)?
            } else {
                let category = GuardrailCategory::parse(&param_str(params, "category")?)?;
                let level = EnforcementLevel::parse(&param_str(params, "enforcement_level")?)?;
                let applies_to = param_str_list(params, "applies_to")
                    .iter()
                    .map(|s| NodeType::parse(s))
                    .collect::<Result<Vec<_>, _>>()?;
                engine.create_guardrail(
                    &param_str(params, "title")?,
                    category,
                    level,
                    &applies_to,
                    param_str_opt(params, "body"),
                )?
            };
            Ok(serde_json::to_value(&g).unwrap_or(Value::Null))
        }
        "get_guardrail" => {
            let g = engine.get_guardrail(&param_str(params, "id")?)?;
            Ok(serde_json::to_value(&g).unwrap_or(Value::Null))
        }
        "list_guardrails" => {
            let applies_to = param_str_opt(params, "applies_to")
                .map(|s| parse_node_type(&s))
                .transpose()?;
            let guardrails = engine.list_guardrails(applies_to)?;
            Ok(serde_json::to_value(&guardrails).unwrap_or(Value::Null))
        }
        "delete_guardrail" => {
            engine.delete_guardrail(&param_str(params, "id")?)?;
            Ok(json!({ "deleted": true }))
        }
        "get_template" => {
            let node_type = parse_node_type(&param_str(params, "type")?)?;
            let rendered = template::render_node_template(node_type, &fields_from_params(params));
            Ok(json!({ "document": rendered }))
        }
        other => Err(RaasError::NotFound(format!("unknown op '{}'", other))),
    }
}

/// Dispatch one request into the engine and wrap the outcome in the
/// response envelope.
pub fn dispatch(engine: &Engine, request: &ToolRequest) -> ToolResponse {
    let inputs_hash = content_hash(&request.params);
    let outcome = execute(engine, &request.op, &request.params);

    match outcome {
        Ok(result) => ToolResponse {
            id: request.id.clone(),
            success: true,
            receipt: Receipt {
                op: request.op.clone(),
                timestamp: now_iso(),
                inputs_hash,
                outputs_hash: content_hash(&result),
            },
            result: Some(result),
            error: None,
        },
        Err(e) => ToolResponse {
            id: request.id.clone(),
            success: false,
            receipt: Receipt {
                op: request.op.clone(),
                timestamp: now_iso(),
                inputs_hash,
                outputs_hash: content_hash(&Value::Null),
            },
            result: None,
            error: Some(ToolError {
                kind: e.kind().to_string(),
                message: e.to_string(),
                retryable: e.is_retryable(),
            }),
        },
    }
}

/// Serve requests line by line until EOF. Parse failures produce an error
/// envelope rather than terminating the loop.
pub fn serve<R: BufRead, W: Write>(
    engine: &Engine,
    reader: R,
    mut writer: W,
) -> Result<(), RaasError> {
    for line in reader.lines() {
        let line = line.map_err(RaasError::IoError)?;
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<ToolRequest>(&line) {
            Ok(request) => dispatch(engine, &request),
            Err(e) => ToolResponse {
                id: default_request_id(),
                success: false,
                receipt: Receipt {
                    op: "unknown".to_string(),
                    timestamp: now_iso(),
                    inputs_hash: content_hash(&Value::Null),
                    outputs_hash: content_hash(&Value::Null),
                },
                result: None,
                error: Some(ToolError {
                    kind: "malformed_document".to_string(),
                    message: format!("invalid request: {}", e),
                    retryable: false,
                }),
            },
        };
        let encoded = serde_json::to_string(&response)
            .map_err(|e| RaasError::ConfigError(format!("response serialization: {}", e)))?;
        writeln!(writer, "{}", encoded).map_err(RaasError::IoError)?;
    }
    Ok(())
}
