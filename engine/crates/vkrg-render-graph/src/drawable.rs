//! 录制到 operation 中的绘制命令

use ash::vk;
use vkrg_gfx::commands::command_buffer::GfxCommandBuffer;

/// 可以录制到 render pass 中的对象
pub trait RgDrawable {
    fn record(&self, cmd: &GfxCommandBuffer);
}

/// 一次绘制：绑定 vertex / index buffer，然后 draw 或者 draw indexed
///
/// 每个 vertex buffer 对应一个 binding，与顶点输入的推导规则一致
#[derive(Clone, Debug)]
pub struct RgDrawableInfo {
    pub vertex_buffers: Vec<vk::Buffer>,
    /// 有 index buffer 时使用 draw indexed
    pub index_buffer: Option<vk::Buffer>,
    pub index_type: vk::IndexType,
    pub vertex_count: u32,
    pub index_count: u32,
    pub instance_count: u32,
}

impl Default for RgDrawableInfo {
    fn default() -> Self {
        Self {
            vertex_buffers: vec![],
            index_buffer: None,
            index_type: vk::IndexType::UINT16,
            vertex_count: 0,
            index_count: 0,
            instance_count: 1,
        }
    }
}

impl RgDrawableInfo {
    /// 没有顶点 buffer 的绘制，例如全屏三角形
    pub fn vertices(vertex_count: u32) -> Self {
        Self {
            vertex_count,
            ..Default::default()
        }
    }

    pub fn indexed(vertex_buffers: Vec<vk::Buffer>, index_buffer: vk::Buffer, index_count: u32) -> Self {
        Self {
            vertex_buffers,
            index_buffer: Some(index_buffer),
            index_count,
            ..Default::default()
        }
    }
}

impl RgDrawable for RgDrawableInfo {
    fn record(&self, cmd: &GfxCommandBuffer) {
        if !self.vertex_buffers.is_empty() {
            let offsets: Vec<vk::DeviceSize> = vec![0; self.vertex_buffers.len()];
            cmd.cmd_bind_vertex_buffers(0, &self.vertex_buffers, &offsets);
        }

        match self.index_buffer {
            Some(index_buffer) => {
                cmd.cmd_bind_index_buffer(index_buffer, 0, self.index_type);
                cmd.cmd_draw_indexed(self.index_count, self.instance_count, 0, 0, 0);
            }
            None => cmd.cmd_draw(self.vertex_count, self.instance_count, 0, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;
    use vkrg_gfx::backend::headless::{GfxHeadlessCmd, GfxHeadlessViolation};

    use super::*;
    use crate::test_utils::headless_device;

    fn record_in_render_pass(drawable: &dyn RgDrawable) -> (Vec<GfxHeadlessCmd>, Vec<GfxHeadlessViolation>) {
        let (headless, device) = headless_device();
        let cmd = GfxCommandBuffer::new(device, "drawable");
        cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        cmd.cmd_begin_render_pass(vk::RenderPass::null(), vk::Framebuffer::null(), vk::Extent2D::default(), &[]);
        drawable.record(&cmd);
        cmd.cmd_end_render_pass();
        cmd.end();
        (headless.recorded_commands(cmd.vk_handle()), headless.violations())
    }

    #[test]
    fn test_indexed_drawable_binds_buffers() {
        let positions = vk::Buffer::from_raw(100);
        let normals = vk::Buffer::from_raw(101);
        let indices = vk::Buffer::from_raw(102);
        let mut drawable = RgDrawableInfo::indexed(vec![positions, normals], indices, 36);
        drawable.instance_count = 4;

        let (cmds, violations) = record_in_render_pass(&drawable);
        assert_eq!(
            &cmds[1..cmds.len() - 1],
            &[
                GfxHeadlessCmd::BindVertexBuffers {
                    first_binding: 0,
                    buffers: vec![positions, normals]
                },
                GfxHeadlessCmd::BindIndexBuffer {
                    buffer: indices,
                    index_type: vk::IndexType::UINT16
                },
                GfxHeadlessCmd::DrawIndexed {
                    index_count: 36,
                    instance_count: 4
                },
            ]
        );
        assert!(violations.is_empty(), "{:?}", violations);
    }

    #[test]
    fn test_drawable_without_buffers_draws_vertices() {
        let (cmds, violations) = record_in_render_pass(&RgDrawableInfo::vertices(3));
        assert_eq!(
            &cmds[1..cmds.len() - 1],
            &[GfxHeadlessCmd::Draw {
                vertex_count: 3,
                instance_count: 1
            }]
        );
        assert!(violations.is_empty());
    }
}
