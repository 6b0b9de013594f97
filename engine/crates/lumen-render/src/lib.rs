//! 渲染核心层
//!
//! 在 lumen-gfx 的薄封装之上提供：
//! - handle 化的资源记录与 [`resource_manager::ResourceManager`]（创建、上传、屏障聚合）
//! - [`draw_stream::DrawStream`]：紧凑的绘制记录流与状态去重解码器
//! - [`frame_context::FrameContext`]：frames-in-flight 的命令与延迟销毁调度
//! - 基于持久映射 buffer 的快速分配器
//!
//! 所有类型都通过 `&Gfx` 显式访问设备，不依赖任何全局状态。

pub mod allocators;
pub mod draw_stream;
pub mod frame_context;
pub mod resource_manager;
pub mod resources;
