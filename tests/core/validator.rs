use raas::core::engine::{Engine, NodePatch};
use raas::core::error::{RaasError, Violation};
use raas::core::model::{EnforcementLevel, GuardrailCategory, Node, NodeType};
use raas::core::template::TemplateFields;
use std::collections::{HashMap, HashSet};
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

fn violation(err: RaasError) -> Violation {
    match err {
        RaasError::Validation(v) => v,
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[test]
fn test_title_is_required() {
    let (_tmp, engine) = test_engine();
    let err = engine
        .create_node(NodeType::Epic, fields("   "), None)
        .unwrap_err();
    match violation(err) {
        Violation::MissingField { field } => assert_eq!(field, "title"),
        other => panic!("expected MissingField, got {:?}", other),
    }
}

#[test]
fn test_epic_cannot_have_a_parent() {
    let (_tmp, engine) = test_engine();
    let root = engine
        .create_node(NodeType::Epic, fields("Auth Platform"), None)
        .unwrap();

    let mut f = fields("Another epic");
    f.parent_id = Some(root.human_id.clone());
    let err = engine.create_node(NodeType::Epic, f, None).unwrap_err();
    assert!(matches!(violation(err), Violation::InvalidParent { .. }));
}

#[test]
fn test_parent_must_exist() {
    let (_tmp, engine) = test_engine();
    let mut f = fields("Login flow");
    f.parent_id = Some("RAAS-COMP-999".to_string());
    let err = engine.create_node(NodeType::Feature, f, None).unwrap_err();
    match violation(err) {
        Violation::InvalidParent { parent, .. } => assert_eq!(parent, "RAAS-COMP-999"),
        other => panic!("expected InvalidParent, got {:?}", other),
    }
}

#[test]
fn test_parent_type_compatibility() {
    let (_tmp, engine) = test_engine();
    let epic = engine
        .create_node(NodeType::Epic, fields("Auth Platform"), None)
        .unwrap();

    // a requirement cannot hang directly off an epic
    let mut f = fields("Passwords are hashed");
    f.parent_id = Some(epic.human_id.clone());
    let err = engine
        .create_node(NodeType::Requirement, f, None)
        .unwrap_err();
    match violation(err) {
        Violation::InvalidParent { reason, .. } => assert!(reason.contains("epic")),
        other => panic!("expected InvalidParent, got {:?}", other),
    }

    // a feature under an epic is fine (skip-level allowed)
    let mut f = fields("Login flow");
    f.parent_id = Some(epic.human_id.clone());
    engine.create_node(NodeType::Feature, f, None).unwrap();
}

#[test]
fn test_dangling_dependency_is_rejected() {
    let (_tmp, engine) = test_engine();
    let mut f = fields("Login flow");
    f.depends_on = vec!["RAAS-FEAT-042".to_string()];
    let err = engine.create_node(NodeType::Feature, f, None).unwrap_err();
    match violation(err) {
        Violation::DanglingReference { field, reference } => {
            assert_eq!(field, "depends_on");
            assert_eq!(reference, "RAAS-FEAT-042");
        }
        other => panic!("expected DanglingReference, got {:?}", other),
    }
}

#[test]
fn test_self_dependency_is_a_cycle() {
    let (_tmp, engine) = test_engine();
    let node = engine
        .create_node(NodeType::Feature, fields("Login flow"), None)
        .unwrap();

    let patch = NodePatch {
        depends_on: Some(vec![node.human_id.clone()]),
        ..Default::default()
    };
    let err = engine.update_node(&node.human_id, patch).unwrap_err();
    assert!(matches!(violation(err), Violation::CycleDetected { .. }));
}

#[test]
fn test_two_node_cycle_is_rejected() {
    let (_tmp, engine) = test_engine();
    let a = engine
        .create_node(NodeType::Feature, fields("A"), None)
        .unwrap();

    let mut f = fields("B");
    f.depends_on = vec![a.human_id.clone()];
    let b = engine.create_node(NodeType::Feature, f, None).unwrap();

    let patch = NodePatch {
        depends_on: Some(vec![b.human_id.clone()]),
        ..Default::default()
    };
    let err = engine.update_node(&a.human_id, patch).unwrap_err();
    match violation(err) {
        Violation::CycleDetected { through } => assert_eq!(through, b.human_id),
        other => panic!("expected CycleDetected, got {:?}", other),
    }

    // the rejected edge must not have been written
    let a_after = engine.get_node(&a.human_id).unwrap();
    assert!(a_after.depends_on.is_empty());
}

#[test]
fn test_longer_cycle_is_rejected() {
    let (_tmp, engine) = test_engine();
    let a = engine
        .create_node(NodeType::Feature, fields("A"), None)
        .unwrap();
    let mut f = fields("B");
    f.depends_on = vec![a.human_id.clone()];
    let b = engine.create_node(NodeType::Feature, f, None).unwrap();
    let mut f = fields("C");
    f.depends_on = vec![b.human_id.clone()];
    let c = engine.create_node(NodeType::Feature, f, None).unwrap();

    // a -> c would close a -> c -> b -> a
    let patch = NodePatch {
        depends_on: Some(vec![c.human_id.clone()]),
        ..Default::default()
    };
    let err = engine.update_node(&a.human_id, patch).unwrap_err();
    assert!(matches!(violation(err), Violation::CycleDetected { .. }));
}

#[test]
fn test_dangling_adherence_is_rejected() {
    let (_tmp, engine) = test_engine();
    let mut f = fields("Login flow");
    f.adheres_to = vec!["RAAS-GUARD-007".to_string()];
    let err = engine.create_node(NodeType::Feature, f, None).unwrap_err();
    match violation(err) {
        Violation::DanglingReference { field, .. } => assert_eq!(field, "adheres_to"),
        other => panic!("expected DanglingReference, got {:?}", other),
    }
}

#[test]
fn test_guardrail_applicability_is_enforced() {
    let (_tmp, engine) = test_engine();
    let guard = engine
        .create_guardrail(
            "Requirements only",
            GuardrailCategory::Architecture,
            EnforcementLevel::Mandatory,
            &[NodeType::Requirement],
            None,
        )
        .unwrap();

    let mut f = fields("Login flow");
    f.adheres_to = vec![guard.human_id.clone()];
    let err = engine.create_node(NodeType::Feature, f, None).unwrap_err();
    match violation(err) {
        Violation::GuardrailNotApplicable {
            guardrail,
            node_type,
        } => {
            assert_eq!(guardrail, guard.human_id);
            assert_eq!(node_type, "feature");
        }
        other => panic!("expected GuardrailNotApplicable, got {:?}", other),
    }

    // the same guardrail on a requirement is accepted
    let mut f = fields("Passwords are hashed");
    f.adheres_to = vec![guard.human_id.clone()];
    let req = engine
        .create_node(NodeType::Requirement, f, None)
        .unwrap();
    assert_eq!(req.adheres_to, vec![guard.human_id]);
}

#[test]
fn test_first_violation_in_check_order_wins() {
    let (_tmp, engine) = test_engine();

    // empty title and a bad parent: the missing field is reported first
    let mut f = fields("");
    f.parent_id = Some("RAAS-COMP-999".to_string());
    f.depends_on = vec!["RAAS-FEAT-042".to_string()];
    let err = engine.create_node(NodeType::Feature, f, None).unwrap_err();
    assert!(matches!(violation(err), Violation::MissingField { .. }));

    // bad parent and a dangling dependency: the parent is reported first
    let mut f = fields("Login flow");
    f.parent_id = Some("RAAS-COMP-999".to_string());
    f.depends_on = vec!["RAAS-FEAT-042".to_string()];
    let err = engine.create_node(NodeType::Feature, f, None).unwrap_err();
    assert!(matches!(violation(err), Violation::InvalidParent { .. }));
}

// splitmix64, deterministic per seed
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9e3779b97f4a7c15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
        z ^ (z >> 31)
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next() % n as u64) as usize
    }
}

fn assert_acyclic(nodes: &[Node]) {
    let edges: HashMap<_, _> = nodes
        .iter()
        .map(|n| (n.id, n.depends_on.clone()))
        .collect();
    for node in nodes {
        let mut seen = HashSet::new();
        let mut stack = node.depends_on.clone();
        while let Some(current) = stack.pop() {
            assert_ne!(
                current, node.id,
                "{} reaches itself through depends_on",
                node.human_id
            );
            if seen.insert(current) {
                if let Some(next) = edges.get(&current) {
                    stack.extend(next.iter().copied());
                }
            }
        }
    }
}

#[test]
fn test_randomized_edge_additions_keep_the_graph_acyclic() {
    for seed in [1u64, 42, 2026] {
        let (_tmp, engine) = test_engine();
        let mut rng = Rng(seed);

        let nodes: Vec<Node> = (0..12)
            .map(|i| {
                engine
                    .create_node(NodeType::Feature, fields(&format!("Feature {}", i)), None)
                    .unwrap()
            })
            .collect();

        // a shuffled series of edge additions; each either commits or is
        // rejected as a cycle, never anything else
        for _ in 0..120 {
            let from = &nodes[rng.below(nodes.len())];
            let to = &nodes[rng.below(nodes.len())];

            let mut deps: Vec<String> = engine
                .get_node(&from.human_id)
                .unwrap()
                .depends_on
                .iter()
                .map(|id| id.to_string())
                .collect();
            deps.push(to.human_id.clone());

            let patch = NodePatch {
                depends_on: Some(deps),
                ..Default::default()
            };
            match engine.update_node(&from.human_id, patch) {
                Ok(_) => {}
                Err(RaasError::Validation(Violation::CycleDetected { .. })) => {}
                Err(other) => panic!("unexpected rejection: {:?}", other),
            }
        }

        let committed = engine.list_nodes(&Default::default()).unwrap();
        assert_eq!(committed.len(), nodes.len());
        assert_acyclic(&committed);
    }
}

#[test]
fn test_rejected_create_leaves_store_unchanged() {
    let (_tmp, engine) = test_engine();
    let mut f = fields("Login flow");
    f.depends_on = vec!["RAAS-FEAT-042".to_string()];
    engine
        .create_node(NodeType::Feature, f, None)
        .unwrap_err();

    let nodes = engine.list_nodes(&Default::default()).unwrap();
    assert!(nodes.is_empty());

    // the failed attempt did not burn a sequence number
    let node = engine
        .create_node(NodeType::Feature, fields("Login flow"), None)
        .unwrap();
    assert_eq!(node.human_id, "RAAS-FEAT-001");
}
