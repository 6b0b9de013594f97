//! Lumen 的 Vulkan 封装层
//!
//! 所有封装类型都不持有全局状态：`Gfx` 由应用显式创建，
//! 并以引用的方式传递给需要它的组件。
//! 资源类型需要手动 destroy，Drop 仅在 debug 下校验是否遗漏。

pub mod commands;
pub mod foundation;
pub mod gfx;
pub mod resources;
