//! Lumen 工具集
//!
//! 提供日志初始化、代际容器等通用工具。
//!
//! # GenerationalArena
//! 带代际校验的资源容器，handle 一旦失效就无法再访问旧槽位。
//!
//! # FramePool
//! 按照 frames-in-flight 延迟复用对象的池子。

pub mod arena;
pub mod frame_pool;
pub mod init_log;
