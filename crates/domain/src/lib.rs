//! 聊天中继核心领域模型
//!
//! 包含用户、会话、消息、拉黑关系等核心实体，以及相关的业务规则。

pub mod business_rules;
pub mod entities;
pub mod errors;
pub mod value_objects;

// 重新导出常用类型
pub use business_rules::*;
pub use entities::*;
pub use errors::*;
pub use value_objects::*;
