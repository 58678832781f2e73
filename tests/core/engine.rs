use raas::core::engine::{Engine, NodePatch};
use raas::core::error::RaasError;
use raas::core::graph::NodeFilter;
use raas::core::model::{EnforcementLevel, GuardrailCategory, NodeType, Status};
use raas::core::template::TemplateFields;
use raas::core::validate::StatusPolicy;
use tempfile::tempdir;

fn test_engine() -> (tempfile::TempDir, Engine) {
    let tmp = tempdir().unwrap();
    let engine = Engine::init(tmp.path(), Some("RAAS".to_string())).unwrap();
    (tmp, engine)
}

fn fields(title: &str) -> TemplateFields {
    TemplateFields {
        title: title.to_string(),
        ..Default::default()
    }
}

#[test]
fn test_node_lifecycle() {
    let (_tmp, engine) = test_engine();

    // 1. Create an epic: first of its type, status forced to draft
    let epic = engine
        .create_node(NodeType::Epic, fields("Auth Platform"), None)
        .unwrap();
    assert_eq!(epic.human_id, "RAAS-EPIC-001");
    assert_eq!(epic.status, Status::Draft);
    assert!(epic.parent_id.is_none());

    // 2. Sequences are per-type
    let mut f = fields("Identity service");
    f.parent_id = Some(epic.human_id.clone());
    let comp = engine.create_node(NodeType::Component, f, None).unwrap();
    assert_eq!(comp.human_id, "RAAS-COMP-001");
    assert_eq!(comp.parent_id, Some(epic.id));

    let mut f = fields("Login flow");
    f.parent_id = Some(comp.human_id.clone());
    let feat = engine.create_node(NodeType::Feature, f, None).unwrap();
    assert_eq!(feat.human_id, "RAAS-FEAT-001");

    // 3. Lookup by human id and by UUID resolve to the same record
    let by_human = engine.get_node("RAAS-FEAT-001").unwrap();
    let by_uuid = engine.get_node(&feat.id.to_string()).unwrap();
    assert_eq!(by_human.id, by_uuid.id);

    // 4. Filtered listing
    let features = engine
        .list_nodes(&NodeFilter {
            node_type: Some(NodeType::Feature),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(features.len(), 1);
    assert_eq!(features[0].human_id, "RAAS-FEAT-001");

    let children = engine.children_of(&epic.human_id).unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].human_id, comp.human_id);

    // 5. Update: status, title, priority
    let patch = NodePatch {
        title: Some("Login and session flow".to_string()),
        status: Some(Status::Ready),
        priority: Some(Some(1)),
        ..Default::default()
    };
    let updated = engine.update_node(&feat.human_id, patch).unwrap();
    assert_eq!(updated.title, "Login and session flow");
    assert_eq!(updated.status, Status::Ready);
    assert_eq!(updated.priority, Some(1));
    assert!(updated.updated_at >= updated.created_at);

    // 6. Clearing priority is distinct from leaving it alone
    let cleared = engine
        .update_node(
            &feat.human_id,
            NodePatch {
                priority: Some(None),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(cleared.priority, None);
    assert_eq!(cleared.status, Status::Ready);
}

#[test]
fn test_create_from_document_ignores_system_fields() {
    let (_tmp, engine) = test_engine();
    let content = "---\n\
type: epic\n\
title: Auth Platform\n\
id: 00000000-0000-0000-0000-000000000000\n\
human_id: RAAS-EPIC-999\n\
status: done\n\
owner_team: payments\n\
---\n\
\n\
## Vision\n\
\n\
One account per human, everywhere.\n";

    let node = engine.create_node_from_document(content).unwrap();
    // system fields are assigned, never taken from the document
    assert_ne!(node.id.to_string(), "00000000-0000-0000-0000-000000000000");
    assert_eq!(node.human_id, "RAAS-EPIC-001");
    // status is always draft on create
    assert_eq!(node.status, Status::Draft);
    // the description is extracted from the narrative section
    assert_eq!(node.description, "One account per human, everywhere.");
    // unknown keys survive into the stored record and the rendered document
    assert_eq!(node.extra.len(), 1);
    let doc = engine.get_node_document(&node.human_id).unwrap();
    assert!(doc.contains("human_id: RAAS-EPIC-001"));
    assert!(doc.contains("owner_team: payments"));
}

#[test]
fn test_body_update_refreshes_description() {
    let (_tmp, engine) = test_engine();
    let node = engine
        .create_node(NodeType::Feature, fields("Login flow"), None)
        .unwrap();

    let patch = NodePatch {
        body: Some("## User Story\n\nAs a user, I stay signed in for 30 days.\n".to_string()),
        ..Default::default()
    };
    let updated = engine.update_node(&node.human_id, patch).unwrap();
    assert_eq!(
        updated.description,
        "As a user, I stay signed in for 30 days."
    );
}

#[test]
fn test_move_revalidates_only_tree_shape() {
    let (_tmp, engine) = test_engine();
    let epic = engine
        .create_node(NodeType::Epic, fields("Auth Platform"), None)
        .unwrap();
    let mut f = fields("Identity service");
    f.parent_id = Some(epic.human_id.clone());
    let comp = engine.create_node(NodeType::Component, f, None).unwrap();

    let other = engine
        .create_node(NodeType::Feature, fields("Standalone feature"), None)
        .unwrap();
    let mut f = fields("Login flow");
    f.parent_id = Some(comp.human_id.clone());
    f.depends_on = vec![other.human_id.clone()];
    let feat = engine.create_node(NodeType::Feature, f, None).unwrap();

    // move under the epic directly: allowed, dependencies untouched
    let moved = engine
        .move_node(&feat.human_id, Some(epic.human_id.clone()))
        .unwrap();
    assert_eq!(moved.parent_id, Some(epic.id));
    assert_eq!(moved.depends_on, vec![other.id]);

    // detach entirely
    let detached = engine.move_node(&feat.human_id, None).unwrap();
    assert_eq!(detached.parent_id, None);

    // a requirement cannot move under an epic
    let req = engine
        .create_node(NodeType::Requirement, fields("Hash passwords"), None)
        .unwrap();
    let err = engine
        .move_node(&req.human_id, Some(epic.human_id.clone()))
        .unwrap_err();
    assert!(matches!(err, RaasError::Validation(_)));
    // and the failed move changed nothing
    assert!(engine.get_node(&req.human_id).unwrap().parent_id.is_none());
}

#[test]
fn test_delete_is_blocked_without_cascade() {
    let (_tmp, engine) = test_engine();
    let epic = engine
        .create_node(NodeType::Epic, fields("Auth Platform"), None)
        .unwrap();
    let mut f = fields("Identity service");
    f.parent_id = Some(epic.human_id.clone());
    let comp = engine.create_node(NodeType::Component, f, None).unwrap();

    // blocked by children
    let err = engine.delete_node(&epic.human_id, false).unwrap_err();
    match err {
        RaasError::Conflict(msg) => assert!(msg.contains(&comp.human_id)),
        other => panic!("expected Conflict, got {:?}", other),
    }

    // blocked by incoming dependency references
    let mut f = fields("Another feature");
    f.depends_on = vec![comp.human_id.clone()];
    let dependent = engine.create_node(NodeType::Feature, f, None).unwrap();
    let err = engine.delete_node(&comp.human_id, false).unwrap_err();
    match err {
        RaasError::Conflict(msg) => assert!(msg.contains(&dependent.human_id)),
        other => panic!("expected Conflict, got {:?}", other),
    }

    // a leaf with no dependents deletes cleanly
    let report = engine.delete_node(&dependent.human_id, false).unwrap();
    assert_eq!(report.deleted, vec![dependent.human_id.clone()]);
    assert_eq!(report.detached_dependency_edges, 0);
    assert!(matches!(
        engine.get_node(&dependent.human_id).unwrap_err(),
        RaasError::NotFound(_)
    ));
}

#[test]
fn test_cascade_delete_removes_subtree_and_detaches_references() {
    let (_tmp, engine) = test_engine();
    let epic = engine
        .create_node(NodeType::Epic, fields("Auth Platform"), None)
        .unwrap();
    let mut f = fields("Identity service");
    f.parent_id = Some(epic.human_id.clone());
    let comp = engine.create_node(NodeType::Component, f, None).unwrap();
    let mut f = fields("Login flow");
    f.parent_id = Some(comp.human_id.clone());
    let feat = engine.create_node(NodeType::Feature, f, None).unwrap();

    // a survivor outside the subtree depends on a node inside it
    let mut f = fields("Billing flow");
    f.depends_on = vec![feat.human_id.clone()];
    let survivor = engine.create_node(NodeType::Feature, f, None).unwrap();

    let report = engine.delete_node(&epic.human_id, true).unwrap();
    assert_eq!(report.deleted.len(), 3);
    // children are removed before parents
    assert_eq!(report.deleted.last(), Some(&epic.human_id));
    assert_eq!(report.detached_dependency_edges, 1);

    // the survivor remains, with its dangling reference detached
    let survivor_after = engine.get_node(&survivor.human_id).unwrap();
    assert!(survivor_after.depends_on.is_empty());
    let remaining = engine.list_nodes(&Default::default()).unwrap();
    assert_eq!(remaining.len(), 1);
}

#[test]
fn test_cascade_delete_ignores_edges_internal_to_the_subtree() {
    let (_tmp, engine) = test_engine();
    let epic = engine
        .create_node(NodeType::Epic, fields("Auth Platform"), None)
        .unwrap();
    let mut f = fields("Login flow");
    f.parent_id = Some(epic.human_id.clone());
    let feat = engine.create_node(NodeType::Feature, f, None).unwrap();

    // a dependency on the node's own descendant is permitted
    engine
        .update_node(
            &epic.human_id,
            NodePatch {
                depends_on: Some(vec![feat.human_id.clone()]),
                ..Default::default()
            },
        )
        .unwrap();

    let report = engine.delete_node(&epic.human_id, true).unwrap();
    assert_eq!(report.deleted.len(), 2);
    // the epic -> feature edge died with its owner; no survivor lost anything
    assert_eq!(report.detached_dependency_edges, 0);
    assert!(engine.list_nodes(&Default::default()).unwrap().is_empty());
}

#[test]
fn test_guardrail_lifecycle() {
    let (_tmp, engine) = test_engine();

    // 1. Create: guardrails draw from their own sequence
    let guard = engine
        .create_guardrail(
            "No plaintext secrets",
            GuardrailCategory::Security,
            EnforcementLevel::Mandatory,
            &[NodeType::Feature, NodeType::Requirement],
            None,
        )
        .unwrap();
    assert_eq!(guard.human_id, "RAAS-GUARD-001");

    // 2. List with applicability filter
    let for_features = engine.list_guardrails(Some(NodeType::Feature)).unwrap();
    assert_eq!(for_features.len(), 1);
    let for_epics = engine.list_guardrails(Some(NodeType::Epic)).unwrap();
    assert!(for_epics.is_empty());

    // 3. Delete is blocked while a node adheres to it
    let mut f = fields("Login flow");
    f.adheres_to = vec![guard.human_id.clone()];
    let feat = engine.create_node(NodeType::Feature, f, None).unwrap();
    let err = engine.delete_guardrail(&guard.human_id).unwrap_err();
    match err {
        RaasError::Conflict(msg) => assert!(msg.contains(&feat.human_id)),
        other => panic!("expected Conflict, got {:?}", other),
    }

    // 4. After the adherence is retracted, delete succeeds
    engine
        .update_node(
            &feat.human_id,
            NodePatch {
                adheres_to: Some(Vec::new()),
                ..Default::default()
            },
        )
        .unwrap();
    engine.delete_guardrail(&guard.human_id).unwrap();
    assert!(matches!(
        engine.get_guardrail(&guard.human_id).unwrap_err(),
        RaasError::NotFound(_)
    ));
}

struct ForwardOnly;

impl StatusPolicy for ForwardOnly {
    fn allow_transition(&self, from: Status, to: Status) -> bool {
        to >= from
    }
}

#[test]
fn test_status_policy_gates_transitions() {
    let (_tmp, mut engine) = test_engine();
    engine.set_status_policy(Box::new(ForwardOnly));

    let node = engine
        .create_node(NodeType::Feature, fields("Login flow"), None)
        .unwrap();

    // forward is allowed
    let node = engine
        .update_node(
            &node.human_id,
            NodePatch {
                status: Some(Status::Done),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(node.status, Status::Done);

    // backward is a conflict, not a validation failure
    let err = engine
        .update_node(
            &node.human_id,
            NodePatch {
                status: Some(Status::Draft),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, RaasError::Conflict(_)));
    assert_eq!(engine.get_node(&node.human_id).unwrap().status, Status::Done);
}

#[test]
fn test_open_resolves_project_root_from_subdirectory() {
    let tmp = tempdir().unwrap();
    Engine::init(tmp.path(), Some("RAAS".to_string())).unwrap();

    let nested = tmp.path().join("docs").join("auth");
    std::fs::create_dir_all(&nested).unwrap();
    let engine = Engine::open(&nested).unwrap();
    assert_eq!(engine.prefix(), "RAAS");

    let err = Engine::open(std::env::temp_dir().join("no-project-here").as_path());
    assert!(err.is_err());
}

#[test]
fn test_init_rejects_bad_prefix() {
    let tmp = tempdir().unwrap();
    assert!(matches!(
        Engine::init(tmp.path(), Some("raas".to_string())),
        Err(RaasError::ConfigError(_))
    ));
}
