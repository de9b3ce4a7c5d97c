//! 内置管道阶段

mod forward_oauth;
mod model_router;
mod rule_evaluator;

pub use forward_oauth::ForwardOAuthStage;
pub use model_router::ModelRouterStage;
pub use rule_evaluator::RuleEvaluatorStage;
