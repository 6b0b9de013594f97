//! Draw stream：紧凑的绘制记录与状态去重
//!
//! 录制端把每次 `draw_indexed` 时的完整绑定状态快照成一条定长的
//! [`DrawCall`]，回放端用 [`DrawStreamDecoder`] 对相邻记录做差分，
//! 只对真正变化的字段发出绑定命令。录制因此可以无脑重复绑定，
//! 排序/合批只需要对 `Vec<DrawCall>` 排序。

use ash::vk;
use lumen_crate_tools::arena::Handle;
use lumen_gfx::{commands::command_buffer::GfxCommandBuffer, gfx::Gfx};

use crate::resource_manager::ResourceManager;
use crate::resources::{limits, Buffer, DescriptorSet, Pipeline};

/// draw stream 可绑定的 descriptor set 数量；set 0 预留给全局 set，
/// 由调用方在回放前自行绑定
pub const DRAW_STREAM_DESCRIPTOR_SET_COUNT: usize = limits::MAX_DESCRIPTOR_SET_COUNT - 1;

/// 一次 indexed 绘制的完整状态快照
///
/// 所有字段都是 handle 或纯数据，可以按值比较与复制；
/// null 表示这条记录不使用对应的绑定。
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct DrawCall {
    /// sets 1..=3，下标 i 对应 set_index i + 1
    pub descriptor_sets: [Handle<DescriptorSet>; DRAW_STREAM_DESCRIPTOR_SET_COUNT],
    pub pipeline: Handle<Pipeline>,
    pub index_buffer: Handle<Buffer>,
    pub index_buffer_offset: vk::DeviceSize,
    pub vertex_buffers: [Handle<Buffer>; limits::MAX_VERTEX_BUFFER_COUNT],
    pub vertex_buffer_offsets: [vk::DeviceSize; limits::MAX_VERTEX_BUFFER_COUNT],
    pub index_offset: u32,
    pub index_count: u32,
}

impl DrawCall {
    /// 全 null 的哨兵，既是录制累积器的初值也是解码器的初始影子状态
    pub const fn null() -> Self {
        Self {
            descriptor_sets: [Handle::null(); DRAW_STREAM_DESCRIPTOR_SET_COUNT],
            pipeline: Handle::null(),
            index_buffer: Handle::null(),
            index_buffer_offset: 0,
            vertex_buffers: [Handle::null(); limits::MAX_VERTEX_BUFFER_COUNT],
            vertex_buffer_offsets: [0; limits::MAX_VERTEX_BUFFER_COUNT],
            index_offset: 0,
            index_count: 0,
        }
    }
}

impl Default for DrawCall {
    fn default() -> Self {
        Self::null()
    }
}

/// 绘制记录流
///
/// `bind_*` 只修改累积器，`draw_indexed` 把累积器快照进流里而不清空，
/// 下一条记录自然继承未变的绑定。
#[derive(Default)]
pub struct DrawStream {
    calls: Vec<DrawCall>,
    current: DrawCall,
}

// 录制
impl DrawStream {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn bind_pipeline(&mut self, pipeline: Handle<Pipeline>) {
        self.current.pipeline = pipeline;
    }

    /// set 0 是全局 set，不归 draw stream 管
    #[inline]
    pub fn bind_descriptor_set(&mut self, set: Handle<DescriptorSet>, set_index: u32) {
        debug_assert!(
            set_index >= 1 && (set_index as usize) < limits::MAX_DESCRIPTOR_SET_COUNT,
            "draw stream binds sets 1..={DRAW_STREAM_DESCRIPTOR_SET_COUNT}, got {set_index}"
        );
        self.current.descriptor_sets[set_index as usize - 1] = set;
    }

    #[inline]
    pub fn bind_index_buffer(&mut self, buffer: Handle<Buffer>, offset: vk::DeviceSize) {
        self.current.index_buffer = buffer;
        self.current.index_buffer_offset = offset;
    }

    #[inline]
    pub fn bind_vertex_buffer(&mut self, slot: usize, buffer: Handle<Buffer>, offset: vk::DeviceSize) {
        debug_assert!(slot < limits::MAX_VERTEX_BUFFER_COUNT);
        self.current.vertex_buffers[slot] = buffer;
        self.current.vertex_buffer_offsets[slot] = offset;
    }

    /// 追加一条绘制记录，累积器保持不变
    #[inline]
    pub fn draw_indexed(&mut self, index_count: u32, index_offset: u32) {
        self.current.index_count = index_count;
        self.current.index_offset = index_offset;
        self.calls.push(self.current);
    }

    /// 把累积器清回全 null，已经快照的记录不受影响
    #[inline]
    pub fn clear_state(&mut self) {
        self.current = DrawCall::null();
    }

    /// 清空整个流，准备复用
    #[inline]
    pub fn reset(&mut self) {
        self.calls.clear();
        self.current = DrawCall::null();
    }
}

// getters
impl DrawStream {
    #[inline]
    pub fn calls(&self) -> &[DrawCall] {
        &self.calls
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

/// 解码出的单条命令
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum DrawCommand {
    BindPipeline(Handle<Pipeline>),
    BindDescriptorSet {
        set_index: u32,
        set: Handle<DescriptorSet>,
    },
    BindIndexBuffer {
        buffer: Handle<Buffer>,
        offset: vk::DeviceSize,
    },
    BindVertexBuffer {
        slot: u32,
        buffer: Handle<Buffer>,
        offset: vk::DeviceSize,
    },
    DrawIndexed {
        index_count: u32,
        index_offset: u32,
    },
}

/// 影子状态差分解码器
///
/// 每个变化的字段恰好产生一条绑定命令，每条记录恰好产生一条
/// `DrawIndexed`；null 字段永远不会被绑定。纯逻辑，不触碰设备。
#[derive(Default)]
pub struct DrawStreamDecoder {
    state: DrawCall,
}

impl DrawStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.state = DrawCall::null();
    }

    /// 解码一条记录，把需要执行的命令追加到 out
    pub fn decode(&mut self, call: &DrawCall, out: &mut Vec<DrawCommand>) {
        if !call.pipeline.is_null() && call.pipeline != self.state.pipeline {
            self.state.pipeline = call.pipeline;
            out.push(DrawCommand::BindPipeline(call.pipeline));
        }

        for i in 0..DRAW_STREAM_DESCRIPTOR_SET_COUNT {
            let set = call.descriptor_sets[i];
            if !set.is_null() && set != self.state.descriptor_sets[i] {
                self.state.descriptor_sets[i] = set;
                out.push(DrawCommand::BindDescriptorSet {
                    set_index: i as u32 + 1,
                    set,
                });
            }
        }

        if !call.index_buffer.is_null()
            && (call.index_buffer != self.state.index_buffer
                || call.index_buffer_offset != self.state.index_buffer_offset)
        {
            self.state.index_buffer = call.index_buffer;
            self.state.index_buffer_offset = call.index_buffer_offset;
            out.push(DrawCommand::BindIndexBuffer {
                buffer: call.index_buffer,
                offset: call.index_buffer_offset,
            });
        }

        for slot in 0..limits::MAX_VERTEX_BUFFER_COUNT {
            let buffer = call.vertex_buffers[slot];
            let offset = call.vertex_buffer_offsets[slot];
            if !buffer.is_null()
                && (buffer != self.state.vertex_buffers[slot] || offset != self.state.vertex_buffer_offsets[slot])
            {
                self.state.vertex_buffers[slot] = buffer;
                self.state.vertex_buffer_offsets[slot] = offset;
                out.push(DrawCommand::BindVertexBuffer {
                    slot: slot as u32,
                    buffer,
                    offset,
                });
            }
        }

        out.push(DrawCommand::DrawIndexed {
            index_count: call.index_count,
            index_offset: call.index_offset,
        });
    }
}

/// 解码整个流并在命令缓冲上回放
///
/// descriptor set 按自己记录的 pipeline layout 与 set index 绑定；
/// index buffer 固定为 u32 索引。
pub fn execute(gfx: &Gfx, rm: &ResourceManager, cmd: &GfxCommandBuffer, stream: &DrawStream) {
    let mut decoder = DrawStreamDecoder::new();
    let mut commands = Vec::new();
    for call in stream.calls() {
        commands.clear();
        decoder.decode(call, &mut commands);
        for command in &commands {
            match *command {
                DrawCommand::BindPipeline(pipeline) => {
                    cmd.cmd_bind_pipeline(gfx, vk::PipelineBindPoint::GRAPHICS, rm.get_pipeline(pipeline).pipeline);
                }
                DrawCommand::BindDescriptorSet { set_index, set } => {
                    let record = rm.get_descriptor_set(set);
                    debug_assert_eq!(record.set_index, set_index);
                    let layout = rm.get_pipeline_layout(record.pipeline_layout).layout;
                    cmd.cmd_bind_descriptor_sets(
                        gfx,
                        vk::PipelineBindPoint::GRAPHICS,
                        layout,
                        set_index,
                        &[record.set],
                        &[],
                    );
                }
                DrawCommand::BindIndexBuffer { buffer, offset } => {
                    cmd.cmd_bind_index_buffer(
                        gfx,
                        rm.get_buffer(buffer).gfx_buffer.vk_buffer(),
                        offset,
                        vk::IndexType::UINT32,
                    );
                }
                DrawCommand::BindVertexBuffer { slot, buffer, offset } => {
                    cmd.cmd_bind_vertex_buffers(
                        gfx,
                        slot,
                        &[rm.get_buffer(buffer).gfx_buffer.vk_buffer()],
                        &[offset],
                    );
                }
                DrawCommand::DrawIndexed { index_count, index_offset } => {
                    cmd.cmd_draw_indexed(gfx, index_count, 1, index_offset, 0, 0);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline(i: u32) -> Handle<Pipeline> {
        Handle::from_raw(i, 0)
    }
    fn set(i: u32) -> Handle<DescriptorSet> {
        Handle::from_raw(i, 0)
    }
    fn buffer(i: u32) -> Handle<Buffer> {
        Handle::from_raw(i, 0)
    }

    fn decode_all(stream: &DrawStream) -> Vec<DrawCommand> {
        let mut decoder = DrawStreamDecoder::new();
        let mut out = Vec::new();
        for call in stream.calls() {
            decoder.decode(call, &mut out);
        }
        out
    }

    #[test]
    fn empty_stream_decodes_to_nothing() {
        let stream = DrawStream::new();
        assert!(stream.is_empty());
        assert!(decode_all(&stream).is_empty());
    }

    #[test]
    fn first_call_binds_everything_once() {
        let mut stream = DrawStream::new();
        stream.bind_pipeline(pipeline(0));
        stream.bind_descriptor_set(set(0), 1);
        stream.bind_index_buffer(buffer(0), 0);
        stream.bind_vertex_buffer(0, buffer(1), 64);
        stream.draw_indexed(36, 0);

        let commands = decode_all(&stream);
        assert_eq!(
            commands,
            vec![
                DrawCommand::BindPipeline(pipeline(0)),
                DrawCommand::BindDescriptorSet { set_index: 1, set: set(0) },
                DrawCommand::BindIndexBuffer { buffer: buffer(0), offset: 0 },
                DrawCommand::BindVertexBuffer { slot: 0, buffer: buffer(1), offset: 64 },
                DrawCommand::DrawIndexed { index_count: 36, index_offset: 0 },
            ]
        );
    }

    #[test]
    fn unchanged_state_is_not_rebound() {
        let mut stream = DrawStream::new();
        stream.bind_pipeline(pipeline(0));
        stream.bind_index_buffer(buffer(0), 0);
        stream.draw_indexed(3, 0);
        // 第二条记录完全继承绑定
        stream.draw_indexed(3, 3);

        let commands = decode_all(&stream);
        assert_eq!(commands.len(), 4);
        assert_eq!(commands[3], DrawCommand::DrawIndexed { index_count: 3, index_offset: 3 });
    }

    #[test]
    fn changed_field_emits_exactly_one_bind() {
        let mut stream = DrawStream::new();
        stream.bind_pipeline(pipeline(0));
        stream.bind_descriptor_set(set(0), 2);
        stream.draw_indexed(3, 0);
        stream.bind_descriptor_set(set(1), 2);
        stream.draw_indexed(3, 0);

        let commands = decode_all(&stream);
        // 第二条记录只重绑 set 2
        assert_eq!(
            &commands[3..],
            &[
                DrawCommand::BindDescriptorSet { set_index: 2, set: set(1) },
                DrawCommand::DrawIndexed { index_count: 3, index_offset: 0 },
            ]
        );
    }

    #[test]
    fn offset_change_rebinds_same_buffer() {
        let mut stream = DrawStream::new();
        stream.bind_vertex_buffer(1, buffer(0), 0);
        stream.draw_indexed(3, 0);
        stream.bind_vertex_buffer(1, buffer(0), 256);
        stream.draw_indexed(3, 0);

        let commands = decode_all(&stream);
        assert_eq!(
            &commands[2..],
            &[
                DrawCommand::BindVertexBuffer { slot: 1, buffer: buffer(0), offset: 256 },
                DrawCommand::DrawIndexed { index_count: 3, index_offset: 0 },
            ]
        );
    }

    #[test]
    fn null_fields_are_never_bound() {
        let mut stream = DrawStream::new();
        stream.bind_pipeline(pipeline(0));
        stream.draw_indexed(3, 0);
        // clear_state 之后快照的是全 null 记录
        stream.clear_state();
        stream.draw_indexed(6, 0);

        let commands = decode_all(&stream);
        assert_eq!(
            commands,
            vec![
                DrawCommand::BindPipeline(pipeline(0)),
                DrawCommand::DrawIndexed { index_count: 3, index_offset: 0 },
                DrawCommand::DrawIndexed { index_count: 6, index_offset: 0 },
            ]
        );
    }

    #[test]
    fn snapshot_survives_later_binds() {
        let mut stream = DrawStream::new();
        stream.bind_pipeline(pipeline(0));
        stream.draw_indexed(3, 0);
        stream.bind_pipeline(pipeline(1));
        stream.draw_indexed(3, 0);

        assert_eq!(stream.calls()[0].pipeline, pipeline(0));
        assert_eq!(stream.calls()[1].pipeline, pipeline(1));
    }

    #[test]
    fn reset_empties_stream_and_state() {
        let mut stream = DrawStream::new();
        stream.bind_pipeline(pipeline(0));
        stream.draw_indexed(3, 0);
        stream.reset();

        assert!(stream.is_empty());
        stream.draw_indexed(3, 0);
        assert_eq!(stream.calls()[0].pipeline, Handle::null());
    }

    #[test]
    fn decoder_reset_forgets_bindings() {
        let mut stream = DrawStream::new();
        stream.bind_pipeline(pipeline(0));
        stream.draw_indexed(3, 0);

        let mut decoder = DrawStreamDecoder::new();
        let mut out = Vec::new();
        decoder.decode(&stream.calls()[0], &mut out);
        decoder.reset();
        decoder.decode(&stream.calls()[0], &mut out);

        // reset 之后 pipeline 需要重新绑定
        let binds = out.iter().filter(|c| matches!(c, DrawCommand::BindPipeline(_))).count();
        assert_eq!(binds, 2);
    }
}
