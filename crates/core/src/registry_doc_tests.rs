// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn sample_doc() -> RegistryDoc {
    let mut doc = RegistryDoc::new("demo");
    let mut f = FunctionEntry::new("app.py:main");
    f.templates.insert(TplId(1), TemplateEntry::new("x=%s"));
    f.templates.insert(TplId(4), TemplateEntry::new("y=%s"));
    doc.functions.insert(FuncId(1), f);
    doc.functions
        .insert(FuncId(3), FunctionEntry::new("app.py:helper"));
    doc
}

#[test]
fn max_ids_over_sparse_assignment() {
    let doc = sample_doc();
    assert_eq!(doc.max_ids(), (FuncId(3), TplId(4)));
}

#[test]
fn max_ids_of_empty_doc_are_zero() {
    let doc = RegistryDoc::new("empty");
    assert_eq!(doc.max_ids(), (FuncId(0), TplId(0)));
}

#[test]
fn serde_roundtrip_preserves_structure() {
    let doc = sample_doc();
    let json = serde_json::to_string_pretty(&doc).unwrap();
    let back: RegistryDoc = serde_json::from_str(&json).unwrap();
    assert_eq!(back, doc);
}

#[test]
fn muted_by_is_omitted_when_absent() {
    let doc = sample_doc();
    let json = serde_json::to_string(&doc).unwrap();
    assert!(!json.contains("muted_by"));
}

#[test]
fn muted_by_serializes_lowercase() {
    let mut doc = sample_doc();
    if let Some(f) = doc.functions.get_mut(&FuncId(1)) {
        f.enabled = false;
        f.muted_by = Some(MutedBy::Balancer);
    }
    let json = serde_json::to_string(&doc).unwrap();
    assert!(json.contains(r#""muted_by":"balancer""#));
}

#[test]
fn deserializes_doc_written_by_another_agent_instance() {
    // String keys, missing muted_by, missing templates.
    let json = r#"{
        "app_name": "other",
        "functions": {
            "2": { "name": "lib.py:f", "enabled": false },
            "5": { "name": "lib.py:g", "enabled": true,
                   "templates": { "9": { "content": "n=%s", "enabled": true } } }
        }
    }"#;
    let doc: RegistryDoc = serde_json::from_str(json).unwrap();
    assert_eq!(doc.functions.len(), 2);
    assert!(!doc.functions[&FuncId(2)].enabled);
    assert_eq!(
        doc.template(FuncId(5), TplId(9)).map(|t| t.content.as_str()),
        Some("n=%s")
    );
    assert_eq!(doc.max_ids(), (FuncId(5), TplId(9)));
}
