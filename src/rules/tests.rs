//! 规则模块测试

use super::*;
use crate::error::ConfigError;
use crate::config::RuleSpec;
use serde_json::json;
use std::sync::Arc;

fn request(value: serde_json::Value) -> ChatRequest {
    ChatRequest::from_value(value).unwrap()
}

fn config() -> RouterConfig {
    RouterConfig::default()
}

#[cfg(test)]
mod model_rule_tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        let rule = MatchModelRule::new("claude-3-5-haiku-20241022");

        assert!(rule
            .evaluate(&request(json!({"model": "claude-3-5-haiku-20241022"})), &config())
            .unwrap());
        assert!(!rule
            .evaluate(&request(json!({"model": "claude-3-5-haiku"})), &config())
            .unwrap());
        assert!(!rule
            .evaluate(
                &request(json!({"model": "anthropic/claude-3-5-haiku-20241022"})),
                &config()
            )
            .unwrap());
    }

    #[test]
    fn test_case_sensitive() {
        let rule = MatchModelRule::new("claude-3-5-haiku-20241022");
        assert!(!rule
            .evaluate(&request(json!({"model": "Claude-3-5-Haiku-20241022"})), &config())
            .unwrap());
    }

    #[test]
    fn test_missing_or_non_string_model() {
        let rule = MatchModelRule::new("m");
        assert!(!rule.evaluate(&request(json!({})), &config()).unwrap());
        assert!(!rule.evaluate(&request(json!({"model": 42})), &config()).unwrap());
    }
}

#[cfg(test)]
mod thinking_rule_tests {
    use super::*;

    #[test]
    fn test_enabled_flag() {
        let rule = ThinkingRule;
        assert!(rule
            .evaluate(
                &request(json!({"model": "m", "thinking": {"enabled": true, "budget": 1024}})),
                &config()
            )
            .unwrap());
        assert!(!rule
            .evaluate(
                &request(json!({"model": "m", "thinking": {"enabled": false}})),
                &config()
            )
            .unwrap());
    }

    #[test]
    fn test_anthropic_type_enabled() {
        let rule = ThinkingRule;
        assert!(rule
            .evaluate(
                &request(json!({"thinking": {"type": "enabled", "budget_tokens": 4096}})),
                &config()
            )
            .unwrap());
        assert!(!rule
            .evaluate(&request(json!({"thinking": {"type": "disabled"}})), &config())
            .unwrap());
    }

    #[test]
    fn test_absent_or_null() {
        let rule = ThinkingRule;
        assert!(!rule.evaluate(&request(json!({"model": "m"})), &config()).unwrap());
        assert!(!rule
            .evaluate(&request(json!({"model": "m", "thinking": null})), &config())
            .unwrap());
    }

    #[test]
    fn test_malformed_thinking_is_error() {
        let rule = ThinkingRule;
        let result = rule.evaluate(&request(json!({"thinking": "yes"})), &config());
        assert!(matches!(result, Err(RuleError::InvalidField { .. })));
    }
}

#[cfg(test)]
mod tool_rule_tests {
    use super::*;

    #[test]
    fn test_anthropic_tool_name() {
        let rule = MatchToolRule::new("WebSearch");
        assert!(rule
            .evaluate(
                &request(json!({"tools": [{"name": "Read"}, {"name": "WebSearch"}]})),
                &config()
            )
            .unwrap());
        assert!(!rule
            .evaluate(&request(json!({"tools": [{"name": "Read"}]})), &config())
            .unwrap());
    }

    #[test]
    fn test_openai_function_name() {
        let rule = MatchToolRule::new("WebSearch");
        assert!(rule
            .evaluate(
                &request(json!({"tools": [{"type": "function", "function": {"name": "WebSearch"}}]})),
                &config()
            )
            .unwrap());
    }

    #[test]
    fn test_exact_name_only() {
        let rule = MatchToolRule::new("WebSearch");
        assert!(!rule
            .evaluate(&request(json!({"tools": [{"name": "websearch"}]})), &config())
            .unwrap());
        assert!(!rule
            .evaluate(&request(json!({"tools": [{"name": "WebSearchV2"}]})), &config())
            .unwrap());
    }

    #[test]
    fn test_no_tools() {
        let rule = MatchToolRule::new("WebSearch");
        assert!(!rule.evaluate(&request(json!({})), &config()).unwrap());
        assert!(!rule.evaluate(&request(json!({"tools": []})), &config()).unwrap());
        assert!(!rule.evaluate(&request(json!({"tools": null})), &config()).unwrap());
    }

    #[test]
    fn test_malformed_tools_is_error() {
        let rule = MatchToolRule::new("WebSearch");
        let result = rule.evaluate(&request(json!({"tools": {"name": "WebSearch"}})), &config());
        assert!(result.is_err());
    }
}

#[cfg(test)]
mod token_rule_tests {
    use super::*;

    struct FailingEstimator;

    impl LengthEstimator for FailingEstimator {
        fn count(&self, _text: &str, _model: Option<&str>) -> Result<usize, RuleError> {
            Err(RuleError::Evaluation("tokenizer crashed".to_string()))
        }
    }

    fn long_request() -> ChatRequest {
        let mut req = ChatRequest::new("claude-sonnet-4-5");
        req.push_message("user", "Please summarise the following design document for me.");
        req.push_message(
            "assistant",
            json!([{"type": "text", "text": "Sure, send it over."}, {"type": "image"}]),
        );
        req
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let req = long_request();
        let estimated = TokenCountRule::new(0).estimate(&req);
        assert!(estimated > 0);

        assert!(TokenCountRule::new(estimated).evaluate(&req, &config()).unwrap());
        assert!(!TokenCountRule::new(estimated + 1)
            .evaluate(&req, &config())
            .unwrap());
    }

    #[test]
    fn test_fallback_when_tokenizer_unavailable() {
        let mut req = ChatRequest::new("m");
        req.push_message("user", "a".repeat(30));

        let rule = TokenCountRule::with_estimator(10, None);
        assert_eq!(rule.estimate(&req), 10);
        assert!(rule.evaluate(&req, &config()).unwrap());
        assert!(!TokenCountRule::with_estimator(11, None)
            .evaluate(&req, &config())
            .unwrap());
    }

    #[test]
    fn test_fallback_when_tokenizer_errors() {
        let mut req = ChatRequest::new("m");
        req.push_message("user", "b".repeat(31));

        let rule = TokenCountRule::with_estimator(10, Some(Arc::new(FailingEstimator)));
        assert_eq!(rule.estimate(&req), 10);
    }

    #[test]
    fn test_system_and_tools_are_counted() {
        let bare = request(json!({"model": "m", "messages": [{"role": "user", "content": "hi"}]}));
        let rich = request(json!({
            "model": "m",
            "system": "You are a meticulous assistant.",
            "messages": [{"role": "user", "content": "hi"}],
            "tools": [{"name": "WebSearch", "description": "Search the web for results"}]
        }));

        let rule = TokenCountRule::with_estimator(0, None);
        assert!(rule.estimate(&rich) > rule.estimate(&bare));
    }

    #[test]
    fn test_explicit_count_fields() {
        let req = request(json!({"model": "m", "messages": [], "input_tokens": 70000}));
        let rule = TokenCountRule::new(60000);
        assert_eq!(rule.estimate(&req), 70000);
        assert!(rule.evaluate(&req, &config()).unwrap());
    }

    #[test]
    fn test_empty_messages() {
        let req = ChatRequest::new("m");
        assert_eq!(TokenCountRule::new(1).estimate(&req), 0);
        assert!(!TokenCountRule::new(1).evaluate(&req, &config()).unwrap());
        assert!(TokenCountRule::new(0).evaluate(&req, &config()).unwrap());
    }
}

#[cfg(test)]
mod registry_tests {
    use super::*;

    struct AlwaysRule;

    impl ClassificationRule for AlwaysRule {
        fn evaluate(&self, _r: &ChatRequest, _c: &RouterConfig) -> Result<bool, RuleError> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "AlwaysRule"
        }
    }

    #[test]
    fn test_builtins_registered() {
        let registry = RuleRegistry::with_builtins();
        for name in [
            "DefaultRule",
            "ThinkingRule",
            "MatchModelRule",
            "MatchToolRule",
            "TokenCountRule",
        ] {
            assert!(registry.contains(name), "{} should resolve", name);
            assert!(registry.contains(&format!("proxycast.rules.{}", name)));
        }
    }

    #[test]
    fn test_load_preserves_order() {
        let registry = RuleRegistry::with_builtins();
        let specs = vec![
            RuleSpec::new("token_count", "TokenCountRule", vec![json!({"threshold": 60000})]),
            RuleSpec::new(
                "background",
                "proxycast.rules.MatchModelRule",
                vec![json!("claude-3-5-haiku-20241022")],
            ),
            RuleSpec::new("think", "ThinkingRule", vec![]),
        ];

        let rules = registry.load(&specs).unwrap();
        let names: Vec<_> = rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["token_count", "background", "think"]);
        assert_eq!(rules[1].identifier, "proxycast.rules.MatchModelRule");
        assert_eq!(rules[1].rule.name(), "MatchModelRule");
    }

    #[test]
    fn test_unknown_identifier_is_fatal() {
        let registry = RuleRegistry::with_builtins();
        let result = registry.load(&[RuleSpec::new("x", "my_plugin.rules.Missing", vec![])]);
        assert!(matches!(
            result,
            Err(ConfigError::UnknownIdentifier { .. })
        ));
    }

    #[test]
    fn test_dotted_identifier_does_not_fall_back_to_builtins() {
        let registry = RuleRegistry::with_builtins();
        assert!(!registry.contains("other.MatchModelRule"));
    }

    #[test]
    fn test_missing_required_param_is_fatal() {
        let registry = RuleRegistry::with_builtins();
        let result = registry.load(&[RuleSpec::new("background", "MatchModelRule", vec![])]);
        match result {
            Err(ConfigError::InvalidParams { rule, message }) => {
                assert_eq!(rule, "background");
                assert!(message.contains("model_name"));
            }
            other => panic!("unexpected: {:?}", other.map(|r| r.len())),
        }
    }

    #[test]
    fn test_bad_param_shape_is_fatal() {
        let registry = RuleRegistry::with_builtins();
        let result = registry.load(&[RuleSpec::new(
            "token_count",
            "TokenCountRule",
            vec![json!({"threshold": "lots"})],
        )]);
        assert!(matches!(result, Err(ConfigError::InvalidParams { .. })));
    }

    #[test]
    fn test_duplicate_rule_names_rejected() {
        let registry = RuleRegistry::with_builtins();
        let result = registry.load(&[
            RuleSpec::new("think", "ThinkingRule", vec![]),
            RuleSpec::new("think", "DefaultRule", vec![]),
        ]);
        assert!(matches!(result, Err(ConfigError::DuplicateRule(name)) if name == "think"));
    }

    #[test]
    fn test_custom_rule_registration() {
        let mut registry = RuleRegistry::with_builtins();
        registry.register(
            "my_plugin.rules.AlwaysRule",
            RuleFactory::new(&[], |_| Ok(Arc::new(AlwaysRule))),
        );

        let rules = registry
            .load(&[RuleSpec::new("custom", "my_plugin.rules.AlwaysRule", vec![])])
            .unwrap();
        assert!(rules[0]
            .rule
            .evaluate(&ChatRequest::new("m"), &config())
            .unwrap());
        assert_eq!(
            registry.identifiers().last().copied(),
            Some("my_plugin.rules.AlwaysRule")
        );
    }

    #[test]
    fn test_default_rule_accepts_passthrough() {
        let registry = RuleRegistry::with_builtins();
        let rules = registry
            .load(&[RuleSpec::new(
                "default",
                "DefaultRule",
                vec![json!({"passthrough": true})],
            )])
            .unwrap();
        assert!(rules[0]
            .rule
            .evaluate(&ChatRequest::new("anything"), &config())
            .unwrap());
    }
}
