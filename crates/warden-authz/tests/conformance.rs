use casbin::{CoreApi, DefaultModel, MemoryAdapter, MgmtApi};
use std::fs;
use std::sync::Arc;
use warden_authz::{
    AccessRequest, DEFAULT_MODEL, Enforcer, Model, PolicyRule, RuleSection,
};

struct Vector {
    name: String,
    model: String,
    rules: Vec<PolicyRule>,
    checks: Vec<(Vec<String>, bool)>,
}

fn load_vectors() -> Vec<Vector> {
    let dir = "tests/vectors";
    let mut vectors = Vec::new();
    for entry in fs::read_dir(dir).expect("read vectors dir") {
        let path = entry.expect("entry").path();
        if path.extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        let contents = fs::read_to_string(&path).expect("read vector");
        let value: serde_json::Value = serde_json::from_str(&contents).expect("json");
        let model = match value["model"].as_str().expect("model") {
            "default" => DEFAULT_MODEL.to_string(),
            text => text.to_string(),
        };
        let rules: Vec<PolicyRule> =
            serde_json::from_value(value["rules"].clone()).expect("rules");
        let checks = value["checks"]
            .as_array()
            .expect("checks")
            .iter()
            .map(|check| {
                let request: Vec<String> =
                    serde_json::from_value(check["request"].clone()).expect("request");
                (request, check["expect"].as_bool().expect("expect"))
            })
            .collect();
        vectors.push(Vector {
            name: path.display().to_string(),
            model,
            rules,
            checks,
        });
    }
    assert!(!vectors.is_empty(), "no vectors found");
    vectors
}

#[test]
fn vectors_match_expected_decisions() {
    for vector in load_vectors() {
        let model = Model::parse(&vector.model).expect("model");
        for rule in &vector.rules {
            model.validate_rule(rule).expect("vector rule must validate");
        }
        let enforcer = Enforcer::new(Arc::new(model));
        for (request, expected) in &vector.checks {
            let decision = enforcer
                .enforce(&vector.rules, &AccessRequest::from_values(request.clone()))
                .expect("enforce");
            assert_eq!(
                decision, *expected,
                "decision mismatch for {request:?} in {}",
                vector.name
            );
        }
    }
}

#[tokio::test]
async fn vectors_agree_with_casbin() {
    for vector in load_vectors() {
        let model = DefaultModel::from_str(&vector.model)
            .await
            .expect("casbin model");
        let mut casbin = casbin::Enforcer::new(model, MemoryAdapter::default())
            .await
            .expect("casbin enforcer");
        for rule in &vector.rules {
            let values: Vec<String> = rule
                .rule
                .values()
                .expect("values")
                .into_iter()
                .map(str::to_string)
                .collect();
            match rule.rule_section {
                RuleSection::Policy => {
                    casbin
                        .add_named_policy(&rule.policy_type, values)
                        .await
                        .expect("add policy");
                }
                RuleSection::Grouping => {
                    casbin
                        .add_named_grouping_policy(&rule.policy_type, values)
                        .await
                        .expect("add grouping");
                }
            }
        }
        casbin.build_role_links().expect("role links");

        for (request, expected) in &vector.checks {
            let decision = casbin.enforce(request.clone()).expect("casbin enforce");
            assert_eq!(
                decision, *expected,
                "casbin disagrees for {request:?} in {}",
                vector.name
            );
        }
    }
}
