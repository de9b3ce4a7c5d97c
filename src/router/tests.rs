//! 路由模块测试
//!
//! 单元测试 + proptest 属性测试

use super::*;
use crate::classifier::DEFAULT_LABEL;
use crate::error::RoutingError;
use crate::request::{keys, ChatRequest};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn standard_list() -> Vec<Value> {
    vec![
        json!({
            "model_name": "default",
            "litellm_params": {"model": "claude-sonnet-4-5", "api_base": "https://api.anthropic.com"}
        }),
        json!({
            "model_name": "background",
            "litellm_params": {"model": "claude-3-5-haiku-20241022"}
        }),
        json!({
            "model_name": "think",
            "litellm_params": {"model": "claude-opus-4-1"},
            "model_info": {"api_key": "sk-hidden", "tier": "premium"}
        }),
    ]
}

fn router_with(entries: Vec<Value>) -> (ModelRouter, Arc<StaticModelList>) {
    let source = Arc::new(StaticModelList::new(entries));
    (ModelRouter::new(source.clone()), source)
}

/// 统计读取次数的来源
struct CountingSource {
    inner: StaticModelList,
    loads: AtomicUsize,
}

impl ModelListSource for CountingSource {
    fn model_list(&self) -> anyhow::Result<Vec<Value>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.model_list()
    }
}

struct FailingSource;

impl ModelListSource for FailingSource {
    fn model_list(&self) -> anyhow::Result<Vec<Value>> {
        anyhow::bail!("proxy config not available")
    }
}

#[test]
fn test_label_resolves_to_its_deployment() {
    let (router, _) = router_with(standard_list());
    let deployment = router.route("background").unwrap();
    assert_eq!(deployment.resolved_model(), "claude-3-5-haiku-20241022");
}

#[test]
fn test_unmapped_label_falls_back_to_default() {
    let (router, _) = router_with(standard_list());
    let deployment = router.route("web_search").unwrap();
    assert_eq!(deployment.model_name, DEFAULT_LABEL);
    assert_eq!(deployment.resolved_model(), "claude-sonnet-4-5");
}

#[test]
fn test_missing_label_and_default_is_routing_error() {
    let (router, _) = router_with(vec![json!({
        "model_name": "background",
        "litellm_params": {"model": "claude-3-5-haiku-20241022"}
    })]);

    let err = router.route("think").unwrap_err();
    assert_eq!(err, RoutingError::new("think"));
}

#[test]
fn test_empty_model_list_is_routing_error() {
    let (router, _) = router_with(vec![]);
    assert!(router.route(DEFAULT_LABEL).is_err());
}

#[test]
fn test_unavailable_source_is_routing_error() {
    let router = ModelRouter::new(Arc::new(FailingSource));
    assert!(router.route(DEFAULT_LABEL).is_err());
    assert!(router.available_models().is_empty());
}

#[test]
fn test_model_list_loaded_lazily_once() {
    let source = Arc::new(CountingSource {
        inner: StaticModelList::new(standard_list()),
        loads: AtomicUsize::new(0),
    });
    let router = ModelRouter::new(source.clone());
    assert_eq!(source.loads.load(Ordering::SeqCst), 0);

    for label in ["background", "think", "default", "unknown"] {
        router.route(label).unwrap();
    }
    assert_eq!(source.loads.load(Ordering::SeqCst), 1);

    router.reload_models();
    assert_eq!(source.loads.load(Ordering::SeqCst), 2);
}

#[test]
fn test_miss_triggers_single_reload_and_retry() {
    let (router, source) = router_with(vec![json!({
        "model_name": "background",
        "litellm_params": {"model": "claude-3-5-haiku-20241022"}
    })]);
    assert!(!router.is_model_available(DEFAULT_LABEL));

    // 宿主更新了模型列表，但路由器还持有旧表
    source.replace(standard_list());

    let deployment = router.route("think").unwrap();
    assert_eq!(deployment.resolved_model(), "claude-opus-4-1");
    assert!(router.is_model_available(DEFAULT_LABEL));
}

#[test]
fn test_repeated_misses_reload_once_per_interval() {
    let source = Arc::new(CountingSource {
        inner: StaticModelList::new(vec![]),
        loads: AtomicUsize::new(0),
    });
    let router = ModelRouter::new(source.clone());

    for _ in 0..10 {
        assert!(router.route("think").is_err());
    }
    // 首次加载 + 一次未命中重载
    assert_eq!(source.loads.load(Ordering::SeqCst), 2);

    // 显式重载不受限流影响
    router.reload_models();
    assert_eq!(source.loads.load(Ordering::SeqCst), 3);
}

#[test]
fn test_miss_reloads_again_after_interval() {
    let source = Arc::new(CountingSource {
        inner: StaticModelList::new(vec![]),
        loads: AtomicUsize::new(0),
    });
    let router = ModelRouter::new(source.clone()).with_retry_interval(Duration::ZERO);

    for _ in 0..3 {
        assert!(router.route("think").is_err());
    }
    assert_eq!(source.loads.load(Ordering::SeqCst), 4);
}

#[test]
fn test_entries_without_model_name_are_skipped() {
    let (router, _) = router_with(vec![
        json!({"litellm_params": {"model": "orphan"}}),
        json!({"model_name": "default", "litellm_params": {"model": "claude-sonnet-4-5"}}),
    ]);
    assert_eq!(router.available_models(), vec![DEFAULT_LABEL.to_string()]);
    assert_eq!(router.model_list().len(), 1);
}

#[test]
fn test_duplicate_model_name_last_wins() {
    let (router, _) = router_with(vec![
        json!({"model_name": "default", "litellm_params": {"model": "first"}}),
        json!({"model_name": "default", "litellm_params": {"model": "second"}}),
    ]);
    assert_eq!(router.route(DEFAULT_LABEL).unwrap().resolved_model(), "second");
    assert_eq!(router.model_list().len(), 2);
}

#[test]
fn test_model_group_alias() {
    let (router, _) = router_with(vec![
        json!({"model_name": "default", "litellm_params": {"model": "claude-sonnet-4-5"}}),
        json!({"model_name": "web_search", "litellm_params": {"model": "claude-sonnet-4-5"}}),
        json!({"model_name": "background", "litellm_params": {"model": "claude-3-5-haiku-20241022"}}),
    ]);
    let aliases = router.model_group_alias();

    assert_eq!(
        aliases["claude-sonnet-4-5"],
        vec!["default".to_string(), "web_search".to_string()]
    );
    assert_eq!(aliases["claude-3-5-haiku-20241022"], vec!["background".to_string()]);
}

#[test]
fn test_available_models_sorted() {
    let (router, _) = router_with(standard_list());
    assert_eq!(
        router.available_models(),
        vec!["background".to_string(), "default".to_string(), "think".to_string()]
    );
}

#[test]
fn test_route_request_writes_metadata() {
    let (router, _) = router_with(standard_list());
    let mut request = ChatRequest::new("claude-3-5-haiku-20241022");

    let decision = router
        .route_request("background", &mut request, false)
        .unwrap();

    assert_eq!(decision.kind, DecisionKind::NoChange);
    assert_eq!(request.model(), Some("claude-3-5-haiku-20241022"));
    assert_eq!(request.metadata_str(keys::MODEL_NAME), Some("background"));
    assert_eq!(
        request.metadata_str(keys::ALIAS_MODEL),
        Some("claude-3-5-haiku-20241022")
    );
    assert_eq!(
        request.metadata_str(keys::LITELLM_MODEL),
        Some("claude-3-5-haiku-20241022")
    );
    assert_eq!(request.metadata_value(keys::IS_PASSTHROUGH), Some(&json!(false)));
    assert_eq!(
        request.metadata_value(keys::MODEL_CONFIG).unwrap()["model_name"],
        "background"
    );
    assert!(request.metadata_str(keys::ROUTED_AT).is_some());
}

#[test]
fn test_mistyped_param_keeps_resolved_model_and_full_entry() {
    let entry = json!({
        "model_name": "default",
        "litellm_params": {"model": "claude-sonnet-4-5", "api_base": 5},
        "tpm": 1000,
        "rpm": 60
    });
    let (router, _) = router_with(vec![entry.clone()]);
    let mut request = ChatRequest::new("gpt-4o");

    let decision = router
        .route_request(DEFAULT_LABEL, &mut request, false)
        .unwrap();

    assert_eq!(decision.resolved_model, "claude-sonnet-4-5");
    assert_eq!(request.model(), Some("claude-sonnet-4-5"));
    assert_eq!(
        request.metadata_str(keys::LITELLM_MODEL),
        Some("claude-sonnet-4-5")
    );
    assert_eq!(request.metadata_value(keys::MODEL_CONFIG), Some(&entry));
}

#[test]
fn test_route_request_retargets_model() {
    let (router, _) = router_with(standard_list());
    let mut request = ChatRequest::new("claude-sonnet-4-5");

    let decision = router.route_request("think", &mut request, false).unwrap();

    assert_eq!(decision.kind, DecisionKind::Routed);
    assert_eq!(decision.original_model.as_deref(), Some("claude-sonnet-4-5"));
    assert_eq!(request.model(), Some("claude-opus-4-1"));
    assert_eq!(request.metadata_str(keys::ALIAS_MODEL), Some("claude-sonnet-4-5"));
}

#[test]
fn test_alias_model_kept_from_earlier_stage() {
    let (router, _) = router_with(standard_list());
    let mut request = ChatRequest::new("already-rewritten");
    request.set_metadata(keys::ALIAS_MODEL, json!("claude-sonnet-4-5"));

    let decision = router.route_request("think", &mut request, false).unwrap();
    assert_eq!(decision.original_model.as_deref(), Some("claude-sonnet-4-5"));
}

#[test]
fn test_passthrough_keeps_original_model() {
    let (router, _) = router_with(standard_list());
    let mut request = ChatRequest::new("claude-opus-4-1");

    let decision = router
        .route_request(DEFAULT_LABEL, &mut request, true)
        .unwrap();

    assert_eq!(decision.kind, DecisionKind::Passthrough);
    assert!(decision.deployment.is_none());
    assert_eq!(request.model(), Some("claude-opus-4-1"));
    assert_eq!(request.metadata_value(keys::IS_PASSTHROUGH), Some(&json!(true)));
    assert_eq!(request.metadata_value(keys::MODEL_CONFIG), Some(&Value::Null));
    assert_eq!(request.metadata_str(keys::LITELLM_MODEL), Some("claude-opus-4-1"));
}

#[test]
fn test_passthrough_only_applies_to_default_label() {
    let (router, _) = router_with(standard_list());
    let mut request = ChatRequest::new("claude-sonnet-4-5");

    let decision = router.route_request("think", &mut request, true).unwrap();
    assert_eq!(decision.kind, DecisionKind::Routed);
    assert_eq!(request.model(), Some("claude-opus-4-1"));
}

#[test]
fn test_passthrough_does_not_need_default_deployment() {
    let (router, _) = router_with(vec![]);
    let mut request = ChatRequest::new("claude-sonnet-4-5");
    assert!(router
        .route_request(DEFAULT_LABEL, &mut request, true)
        .is_ok());
}

#[test]
fn test_deployment_without_underlying_model_uses_alias() {
    let (router, _) = router_with(vec![json!({"model_name": "default"})]);
    let mut request = ChatRequest::new("claude-sonnet-4-5");

    router
        .route_request(DEFAULT_LABEL, &mut request, false)
        .unwrap();
    assert_eq!(request.model(), Some("default"));
}

proptest! {
    #[test]
    fn prop_unmapped_labels_resolve_to_default(label in "[a-z_]{1,16}") {
        let (router, _) = router_with(standard_list());
        let deployment = router.route(&label).unwrap();

        if router.is_model_available(&label) {
            prop_assert_eq!(&deployment.model_name, &label);
        } else {
            prop_assert_eq!(deployment.model_name.as_str(), DEFAULT_LABEL);
        }
    }

    #[test]
    fn prop_routing_without_default_errors_for_unknown_labels(label in "[a-z_]{1,16}") {
        let (router, _) = router_with(vec![json!({
            "model_name": "background",
            "litellm_params": {"model": "claude-3-5-haiku-20241022"}
        })]);

        let result = router.route(&label);
        if label == "background" {
            prop_assert!(result.is_ok());
        } else {
            prop_assert_eq!(result.unwrap_err().label, label);
        }
    }
}
