use crate::Model;

const MODEL: &str = r#"
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[role_definition]
g = _, _
g2 = _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = g(r.sub, p.sub) && g2(r.obj, p.obj) && r.act == p.act
"#;

/// Text of the built-in model: subject roles via `g`, object groups via `g2`,
/// exact action match.
pub const DEFAULT_MODEL: &str = MODEL;

pub fn default_model() -> Model {
    Model::parse(MODEL).expect("default model must be valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_string_contains_matcher() {
        assert!(DEFAULT_MODEL.contains("g2(r.obj, p.obj)"));
        assert!(DEFAULT_MODEL.contains("request_definition"));
    }

    #[test]
    fn model_builds() {
        let model = default_model();
        assert_eq!(model.request().arity(), 3);
        assert_eq!(model.rule_arity("g"), Some(2));
        assert_eq!(model.rule_arity("g2"), Some(2));
    }
}
