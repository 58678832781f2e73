use raas::core::codec::{
    parse_guardrail, parse_node, render_guardrail_document, render_node_document,
};
use raas::core::error::RaasError;
use raas::core::model::{EnforcementLevel, GuardrailCategory, NodeType, Status};
use raas::core::template::{render_node_template, TemplateFields};

#[test]
fn test_hand_edited_node_parses_to_stable_fields() {
    let content = "---\n\
type: feature\n\
title: Login flow\n\
parent_id: RAAS-COMP-001\n\
status: ready\n\
priority: 2\n\
tags:\n  - auth\n  - mvp\n\
depends_on:\n  - RAAS-FEAT-002\n\
adheres_to:\n  - RAAS-GUARD-001\n\
---\n\
\n\
## User Story\n\
\n\
As a user, I can log in with my email.\n";

    let doc = parse_node(content).unwrap();
    assert_eq!(doc.header.node_type, NodeType::Feature);
    assert_eq!(doc.header.title, "Login flow");
    assert_eq!(doc.header.parent_id.as_deref(), Some("RAAS-COMP-001"));
    assert_eq!(doc.header.status, Status::Ready);
    assert_eq!(doc.header.priority, Some(2));
    assert_eq!(doc.header.tags, vec!["auth", "mvp"]);
    assert_eq!(doc.header.depends_on, vec!["RAAS-FEAT-002"]);
    assert_eq!(doc.header.adheres_to, vec!["RAAS-GUARD-001"]);

    // render -> parse yields the same structured fields
    let again = parse_node(&render_node_document(&doc)).unwrap();
    assert_eq!(again.header, doc.header);
    assert!(again.body.contains("As a user, I can log in with my email."));
}

#[test]
fn test_canonical_documents_render_byte_identically() {
    let doc = parse_node(
        "---\ntype: requirement\ntitle: Passwords are hashed\ntags: [security]\n---\n\n## Description\n\nUse argon2id.\n",
    )
    .unwrap();
    let first = render_node_document(&doc);
    let second = render_node_document(&parse_node(&first).unwrap());
    assert_eq!(first, second);
}

#[test]
fn test_node_document_requires_type_key() {
    let err = parse_node("---\ntitle: No type here\n---\n\nbody\n").unwrap_err();
    match err {
        RaasError::MalformedDocument(msg) => assert!(msg.contains("type")),
        other => panic!("expected MalformedDocument, got {:?}", other),
    }
}

#[test]
fn test_frontmatter_must_be_a_mapping() {
    let err = parse_node("---\n- just\n- a\n- list\n---\n\nbody\n").unwrap_err();
    assert!(matches!(err, RaasError::MalformedDocument(_)));
}

#[test]
fn test_guardrail_document_round_trip() {
    let content = "---\n\
type: guardrail\n\
title: No plaintext secrets\n\
category: security\n\
enforcement_level: mandatory\n\
applies_to:\n  - feature\n  - requirement\n\
---\n\
\n\
## Policy\n\
\n\
Secrets never appear in requirement bodies.\n";

    let doc = parse_guardrail(content).unwrap();
    assert_eq!(doc.header.category, GuardrailCategory::Security);
    assert_eq!(doc.header.enforcement_level, EnforcementLevel::Mandatory);
    assert_eq!(
        doc.header.applies_to,
        vec![NodeType::Feature, NodeType::Requirement]
    );
    assert_eq!(doc.header.status, "draft");

    let again = parse_guardrail(&render_guardrail_document(&doc)).unwrap();
    assert_eq!(again.header, doc.header);
}

#[test]
fn test_guardrail_requires_category_and_enforcement() {
    let missing_category =
        parse_guardrail("---\ntype: guardrail\ntitle: T\nenforcement_level: advisory\n---\n\n")
            .unwrap_err();
    assert!(matches!(missing_category, RaasError::MalformedDocument(_)));

    let missing_level =
        parse_guardrail("---\ntype: guardrail\ntitle: T\ncategory: security\n---\n\n").unwrap_err();
    assert!(matches!(missing_level, RaasError::MalformedDocument(_)));
}

#[test]
fn test_guardrail_rejects_node_type_key() {
    let err = parse_guardrail(
        "---\ntype: epic\ntitle: T\ncategory: security\nenforcement_level: advisory\n---\n\n",
    )
    .unwrap_err();
    match err {
        RaasError::MalformedDocument(msg) => assert!(msg.contains("guardrail")),
        other => panic!("expected MalformedDocument, got {:?}", other),
    }
}

#[test]
fn test_templates_parse_clean_for_every_type() {
    for node_type in NodeType::ALL {
        let fields = TemplateFields {
            title: "Some title".to_string(),
            ..Default::default()
        };
        let rendered = render_node_template(node_type, &fields);
        let doc = parse_node(&rendered).unwrap();
        assert_eq!(doc.header.node_type, node_type);
        assert_eq!(doc.header.title, "Some title");
        assert_eq!(doc.header.status, Status::Draft);
        assert!(doc.body.contains("## "), "template body has sections");
    }
}
