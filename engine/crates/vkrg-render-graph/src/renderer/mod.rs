//! 帧调度器：把编译好的 graph 按帧提交到交换链
//!
//! 每帧的流程：等待 fence -> acquire -> 录制前的回调 -> 提交 -> present。
//! 交换链失效时在内部重建交换链并重新编译 graph，不会作为错误返回。
//!
//! - [`SynchronizedSwapchainGraphRenderer`]：多帧并行
//! - [`BlockingGraphRenderer`]：每帧等待设备空闲，作为正确性的基准

pub mod blocking;
pub mod observer;
pub mod recreatable;
pub mod synchronized;

pub use blocking::BlockingGraphRenderer;
pub use observer::{RgFrameDisplayObserver, RgNoopFrameDisplayObserver};
pub use recreatable::{RgPreSubmitListener, RgRecreatableSwapchain};
pub use synchronized::SynchronizedSwapchainGraphRenderer;

use crate::graph::RenderGraph;

pub trait RgGraphRenderer {
    /// 最近一次提交使用的 resource index，还没有渲染过任何一帧时为 None
    ///
    /// 下一帧的 resource index 由 acquire 决定，无法提前得知；
    /// 需要在提交前更新资源时使用 [`RgGraphRenderer::add_pre_submit_listener`]
    fn last_render_resource_index(&self) -> Option<u32>;

    /// 渲染一帧，返回本帧使用的 resource index；交换链被重建而跳过这一帧时返回 None
    fn render_next_frame(&mut self, graph: &mut RenderGraph, observer: &mut dyn RgFrameDisplayObserver) -> Option<u32>;

    /// 等待设备空闲，重建交换链，重新编译 graph
    fn recreate(&mut self, graph: &mut RenderGraph);

    fn frames_in_flight(&self) -> u32;

    fn add_pre_submit_listener(&mut self, listener: RgPreSubmitListener);

    /// 持续渲染，直到 `should_stop` 返回 true，返回渲染的帧数
    fn render_until(
        &mut self,
        graph: &mut RenderGraph,
        observer: &mut dyn RgFrameDisplayObserver,
        should_stop: &mut dyn FnMut() -> bool,
    ) -> u64 {
        let mut rendered = 0;
        while !should_stop() {
            if self.render_next_frame(graph, observer).is_some() {
                rendered += 1;
            }
        }
        rendered
    }
}
