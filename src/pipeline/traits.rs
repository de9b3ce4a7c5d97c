//! 管道阶段 trait 定义
//!
//! 定义所有管道阶段必须实现的接口

use super::EngineHandle;
use crate::error::StageError;
use crate::request::{ChatRequest, UserContext};

/// 管道阶段 trait
///
/// 阶段接收请求的只读快照并返回新的请求。失败时管道丢弃该阶段的输出，
/// 把阶段执行前的快照交给下一个阶段。
pub trait PipelineStage: Send + Sync {
    /// 执行阶段
    ///
    /// # Arguments
    /// * `request` - 阶段执行前的请求快照
    /// * `user` - 调用方上下文
    /// * `engine` - 分类器、路由器和配置的只读句柄
    ///
    /// # Returns
    /// 成功返回变换后的请求，失败返回 `Err(StageError)`
    fn apply(
        &self,
        request: &ChatRequest,
        user: &UserContext,
        engine: &EngineHandle,
    ) -> Result<ChatRequest, StageError>;

    /// 获取阶段名称
    fn name(&self) -> &str;

    /// 检查阶段是否启用
    fn is_enabled(&self) -> bool {
        true
    }
}
