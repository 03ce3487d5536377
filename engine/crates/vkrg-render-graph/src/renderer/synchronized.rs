use ash::vk;
use itertools::Itertools;
use vkrg_gfx::{
    commands::{fence::GfxFence, semaphore::GfxSemaphore},
    device::GfxDeviceRef,
    swapchain::GfxSwapchain,
};

use crate::{
    graph::RenderGraph,
    renderer::{RgFrameDisplayObserver, RgGraphRenderer, RgPreSubmitListener, RgRecreatableSwapchain},
    settings::{RgGraphSettings, RgRendererSettings},
};

/// 一个 frame slot 的同步对象
struct FrameSync {
    /// acquire signal，submit wait
    image_available: GfxSemaphore,
    /// submit signal，present wait
    render_finished: GfxSemaphore,
    /// submit signal，下一次使用这个 slot 之前 wait
    in_flight: GfxFence,
}

impl FrameSync {
    fn new(device: &GfxDeviceRef, slot: u32) -> Self {
        Self {
            image_available: GfxSemaphore::new(device.clone(), &format!("image-available-{}", slot)),
            render_finished: GfxSemaphore::new(device.clone(), &format!("render-finished-{}", slot)),
            // 第一次使用前不需要等待
            in_flight: GfxFence::new(device.clone(), true, &format!("in-flight-{}", slot)),
        }
    }
}

/// 多帧并行的调度器
///
/// 同时最多有 `frames_in_flight` 帧在 GPU 上执行，每一帧按轮转使用一个 frame slot 的同步对象；
/// resource index 即交换链 image 的下标。
/// 同一个 image 被两个 slot 先后使用时，会先等待上一个 slot 的 fence，
/// 因此同一个 resource index 的 command buffer 和资源不会被两帧同时使用。
pub struct SynchronizedSwapchainGraphRenderer {
    target: RgRecreatableSwapchain,
    settings: RgRendererSettings,

    frames_in_flight: u32,
    image_count: u32,
    /// 当前使用的 frame slot，[0, frames_in_flight)
    current_frame: u32,

    /// 数量为 frames_in_flight
    frames: Vec<FrameSync>,
    /// acquire 时由 presentation engine signal
    presentation_engine_fence: Option<GfxFence>,

    /// 数量为交换链 image 的数量，记录每个 image 最近一次被哪个 frame slot 使用
    image_to_frame: Vec<Option<u32>>,
    /// 最近一次提交的 resource index
    last_resource_index: Option<u32>,
}

// new & init
impl SynchronizedSwapchainGraphRenderer {
    pub fn new(device: GfxDeviceRef, swapchain: GfxSwapchain, settings: RgRendererSettings) -> Self {
        let image_count = swapchain.image_count();
        let frames_in_flight = settings.clamped_frames_in_flight(image_count);

        let frames = (0..frames_in_flight).map(|slot| FrameSync::new(&device, slot)).collect_vec();
        let presentation_engine_fence = settings
            .wait_presentation_engine
            .then(|| GfxFence::new(device.clone(), false, "presentation-engine"));

        log::info!("synchronized renderer: {} frames in flight, {} swapchain images", frames_in_flight, image_count);

        Self {
            target: RgRecreatableSwapchain::new(device, swapchain),
            settings,
            frames_in_flight,
            image_count,
            current_frame: 0,
            frames,
            presentation_engine_fence,
            image_to_frame: vec![None; image_count as usize],
            last_resource_index: None,
        }
    }
}
impl Drop for SynchronizedSwapchainGraphRenderer {
    fn drop(&mut self) {
        self.wait();
    }
}

// getters
impl SynchronizedSwapchainGraphRenderer {
    #[inline]
    pub fn swapchain(&self) -> &GfxSwapchain {
        self.target.swapchain()
    }

    #[inline]
    pub fn graph_settings(&self) -> RgGraphSettings {
        self.target.graph_settings()
    }

    #[inline]
    pub fn current_frame(&self) -> u32 {
        self.current_frame
    }

    #[inline]
    pub fn image_to_frame_mapping(&self) -> &[Option<u32>] {
        &self.image_to_frame
    }

    #[inline]
    pub fn in_flight_fence(&self, frame_slot: u32) -> Option<&GfxFence> {
        self.frames.get(frame_slot as usize).map(|f| &f.in_flight)
    }
}

// update
impl SynchronizedSwapchainGraphRenderer {
    /// 等待所有 frame slot 的 fence
    pub fn wait(&self) {
        for frame in &self.frames {
            frame.in_flight.wait();
        }
    }

    fn reset_image_mapping(&mut self) {
        self.image_count = self.target.swapchain().image_count();
        self.image_to_frame = vec![None; self.image_count as usize];
    }

    /// 交换链 image 数量变化后重新限制 frame slot 的数量
    fn resize_frames(&mut self) {
        let frames_in_flight = self.settings.clamped_frames_in_flight(self.image_count);
        if frames_in_flight == self.frames_in_flight {
            return;
        }
        log::warn!(
            "swapchain now has {} images, frames in flight {} -> {}",
            self.image_count,
            self.frames_in_flight,
            frames_in_flight
        );

        if frames_in_flight < self.frames_in_flight {
            self.wait();
            self.frames.truncate(frames_in_flight as usize);
        } else {
            let device = self.target.device().clone();
            let new_frames =
                (self.frames_in_flight..frames_in_flight).map(|slot| FrameSync::new(&device, slot)).collect_vec();
            self.frames.extend(new_frames);
        }
        self.frames_in_flight = frames_in_flight;
        if self.current_frame >= frames_in_flight {
            self.current_frame = 0;
        }
    }
}

impl RgGraphRenderer for SynchronizedSwapchainGraphRenderer {
    #[inline]
    fn last_render_resource_index(&self) -> Option<u32> {
        self.last_resource_index
    }

    fn render_next_frame(&mut self, graph: &mut RenderGraph, observer: &mut dyn RgFrameDisplayObserver) -> Option<u32> {
        let _span = vkrg_crate_tools::profile_span!("SynchronizedSwapchainGraphRenderer::render_next_frame");
        let slot = self.current_frame;
        let frame_name = self.target.frame_name(slot);

        // 等待这个 slot 上一次的提交完成
        observer.on_image_fence_wait_started(slot);
        self.frames[slot as usize].in_flight.wait();
        observer.on_image_fence_wait_ended(slot);

        observer.on_image_acquisition_started();
        let acquired = self.target.acquire(
            &self.frames[slot as usize].image_available,
            self.presentation_engine_fence.as_ref(),
            self.settings.acquire_timeout_ns,
        );
        let Some((image_index, acquire_suboptimal)) = acquired else {
            log::warn!("{} swapchain out of date on acquire, skip frame", frame_name);
            self.recreate(graph);
            return None;
        };
        observer.on_image_acquisition_returned(image_index);

        if let Some(fence) = &self.presentation_engine_fence {
            fence.wait();
            fence.reset();
            observer.on_image_acquisition_fence_signaled(image_index);
        }

        // 这个 image 还在被另一个 slot 使用
        if let Some(previous) = self.image_to_frame[image_index as usize]
            && previous != slot
        {
            log::trace!("{} image {} is still used by frame slot {}", frame_name, image_index, previous);
            observer.on_image_fence_wait_started(previous);
            self.frames[previous as usize].in_flight.wait();
            observer.on_image_fence_wait_ended(previous);
        }
        self.image_to_frame[image_index as usize] = Some(slot);
        observer.on_image_acquisition_ended(image_index);

        vkrg_crate_tools::rg_assert!(
            graph.resource_count() == self.image_count,
            "graph is compiled with {} resources but the swapchain has {} images",
            graph.resource_count(),
            self.image_count
        );

        let resource_index = image_index;
        observer.on_render_started(resource_index);
        self.target.notify_pre_submit(graph, resource_index);

        let frame = &self.frames[slot as usize];
        frame.in_flight.reset();
        graph.submit(
            resource_index,
            &[(&frame.image_available, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)],
            &[&frame.render_finished],
            Some(&frame.in_flight),
        );

        self.last_resource_index = Some(resource_index);

        observer.on_present_started(resource_index);
        let present_suboptimal = self.target.present(image_index, &frame.render_finished);

        self.current_frame = (self.current_frame + 1) % self.frames_in_flight;

        if acquire_suboptimal || present_suboptimal {
            log::warn!("{} swapchain needs recreation after present", frame_name);
            self.recreate(graph);
        }
        Some(resource_index)
    }

    fn recreate(&mut self, graph: &mut RenderGraph) {
        self.target.recreate(graph);
        self.reset_image_mapping();
        self.resize_frames();
    }

    #[inline]
    fn frames_in_flight(&self) -> u32 {
        self.frames_in_flight
    }

    #[inline]
    fn add_pre_submit_listener(&mut self, listener: RgPreSubmitListener) {
        self.target.add_pre_submit_listener(listener);
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use ash::vk;
    use vkrg_gfx::{
        backend::headless::{GfxHeadlessAcquire, GfxHeadlessCall, GfxHeadlessDevice},
        swapchain::GfxSwapchain,
    };

    use super::*;
    use crate::{
        renderer::RgNoopFrameDisplayObserver, resource::RgSwapchainImageResource, test_utils::headless_device,
    };

    fn setup(
        image_count: u32,
        frames_in_flight: u32,
    ) -> (Rc<GfxHeadlessDevice>, SynchronizedSwapchainGraphRenderer, RenderGraph) {
        let (headless, device) = headless_device();
        let extent = vk::Extent2D {
            width: 64,
            height: 64,
        };
        let swapchain = GfxSwapchain::new(device.clone(), headless.create_swapchain(image_count, extent));
        let settings = RgRendererSettings {
            frames_in_flight,
            ..Default::default()
        };
        let renderer = SynchronizedSwapchainGraphRenderer::new(device, swapchain, settings);

        let mut graph = RenderGraph::new();
        graph.add_resource("present", RgSwapchainImageResource::new());
        graph.compile(renderer.graph_settings());
        (headless, renderer, graph)
    }

    /// 同一个 fence 的两次提交之间必须有一次 wait
    fn assert_fences_waited_before_reuse(calls: &[GfxHeadlessCall]) {
        let mut submitted_unwaited = std::collections::HashSet::new();
        for call in calls {
            match call {
                GfxHeadlessCall::WaitFence(fence) => {
                    submitted_unwaited.remove(fence);
                }
                GfxHeadlessCall::Submit { fence: Some(fence), .. } => {
                    assert!(submitted_unwaited.insert(*fence), "fence {:?} reused without a wait", fence);
                }
                _ => {}
            }
        }
    }

    #[test]
    fn test_frames_in_flight_overlap() {
        let (headless, mut renderer, mut graph) = setup(3, 2);
        headless.clear_calls();
        assert_eq!(renderer.frames_in_flight(), 2);

        let mut observer = RgNoopFrameDisplayObserver;
        let indices = (0..5).map(|_| renderer.render_next_frame(&mut graph, &mut observer)).collect_vec();
        assert_eq!(indices, vec![Some(0), Some(1), Some(2), Some(0), Some(1)]);

        for mapping in renderer.image_to_frame_mapping() {
            assert!(mapping.is_some_and(|slot| slot < 2));
        }

        let calls = headless.calls();
        assert_fences_waited_before_reuse(&calls);
        for slot in 0..2 {
            let fence = renderer.in_flight_fence(slot).unwrap().handle();
            let waits = calls.iter().filter(|c| **c == GfxHeadlessCall::WaitFence(fence)).count();
            assert!(waits >= 2, "slot {} fence waited {} times", slot, waits);
        }

        // 每一帧 submit 等待的正是本帧 acquire signal 的 semaphore
        let acquired = calls
            .iter()
            .filter_map(|c| match c {
                GfxHeadlessCall::Acquire { semaphore, .. } => *semaphore,
                _ => None,
            })
            .collect_vec();
        let waited = calls
            .iter()
            .filter_map(|c| match c {
                GfxHeadlessCall::Submit { wait_semaphores, .. } => wait_semaphores.first().copied(),
                _ => None,
            })
            .collect_vec();
        assert_eq!(acquired, waited);
        assert_ne!(acquired[0], acquired[1]);
        assert_eq!(acquired[0], acquired[2]);
        assert!(headless.violations().is_empty(), "{:?}", headless.violations());
    }

    #[test]
    fn test_out_of_date_recreates_swapchain_and_graph() {
        let (headless, mut renderer, mut graph) = setup(3, 2);
        headless.script_acquire([GfxHeadlessAcquire::OutOfDate]);
        let old_swapchain = renderer.swapchain().handle();

        let mut observer = RgNoopFrameDisplayObserver;
        assert_eq!(renderer.render_next_frame(&mut graph, &mut observer), None);
        assert_ne!(renderer.swapchain().handle(), old_swapchain);
        assert!(graph.is_compiled());
        assert!(renderer.image_to_frame_mapping().iter().all(|m| m.is_none()));
        assert!(headless.calls().contains(&GfxHeadlessCall::RecreateSwapchain));

        // present 时失效：这一帧照常完成，之后重建
        headless.clear_calls();
        headless.script_present([Err(vk::Result::ERROR_OUT_OF_DATE_KHR)]);
        assert_eq!(renderer.render_next_frame(&mut graph, &mut observer), Some(0));
        let calls = headless.calls();
        let present = calls.iter().position(|c| matches!(c, GfxHeadlessCall::PresentOutOfDate { .. })).unwrap();
        let recreate = calls.iter().position(|c| *c == GfxHeadlessCall::RecreateSwapchain).unwrap();
        assert!(present < recreate);

        assert_eq!(renderer.render_next_frame(&mut graph, &mut observer), Some(0));
        renderer.wait();
        assert!(headless.violations().is_empty(), "{:?}", headless.violations());
    }

    #[test]
    fn test_pre_submit_listeners_and_observer() {
        #[derive(Default)]
        struct Recorder(Vec<String>);
        impl RgFrameDisplayObserver for Recorder {
            fn on_image_fence_wait_started(&mut self, frame_slot: u32) {
                self.0.push(format!("wait {}", frame_slot));
            }
            fn on_image_acquisition_returned(&mut self, image_index: u32) {
                self.0.push(format!("acquire {}", image_index));
            }
            fn on_render_started(&mut self, resource_index: u32) {
                self.0.push(format!("render {}", resource_index));
            }
            fn on_present_started(&mut self, resource_index: u32) {
                self.0.push(format!("present {}", resource_index));
            }
        }

        let (headless, mut renderer, mut graph) = setup(2, 2);
        let seen = Rc::new(RefCell::new(vec![]));
        let seen_in_listener = seen.clone();
        renderer.add_pre_submit_listener(Box::new(move |graph, resource_index, _| {
            assert!(graph.is_compiled());
            seen_in_listener.borrow_mut().push(resource_index);
        }));

        let mut recorder = Recorder::default();
        let mut frames = 0;
        let rendered = renderer.render_until(&mut graph, &mut recorder, &mut || {
            frames += 1;
            frames > 3
        });
        assert_eq!(rendered, 3);
        assert_eq!(*seen.borrow(), vec![0, 1, 0]);
        assert_eq!(&recorder.0[..4], &["wait 0", "acquire 0", "render 0", "present 0"]);
        assert!(headless.violations().is_empty());
    }

    #[test]
    fn test_last_render_resource_index_matches_rendered_frame() {
        let (headless, mut renderer, mut graph) = setup(3, 2);
        let used = Rc::new(RefCell::new(vec![]));
        let used_in_listener = used.clone();
        renderer.add_pre_submit_listener(Box::new(move |_, resource_index, _| {
            used_in_listener.borrow_mut().push(resource_index);
        }));
        assert_eq!(renderer.last_render_resource_index(), None);

        let mut observer = RgNoopFrameDisplayObserver;
        for frame in 0..4 {
            let rendered = renderer.render_next_frame(&mut graph, &mut observer);
            assert_eq!(rendered, renderer.last_render_resource_index());
            assert_eq!(renderer.last_render_resource_index(), used.borrow().last().copied());
            assert_eq!(used.borrow().len(), frame + 1);
        }
        assert_eq!(*used.borrow(), vec![0, 1, 2, 0]);
        assert!(headless.violations().is_empty(), "{:?}", headless.violations());
    }

    #[test]
    fn test_recreate_reclamps_frames_in_flight() {
        let (headless, mut renderer, mut graph) = setup(3, 3);
        assert_eq!(renderer.frames_in_flight(), 3);
        let mut observer = RgNoopFrameDisplayObserver;
        for _ in 0..3 {
            renderer.render_next_frame(&mut graph, &mut observer);
        }
        assert_eq!(renderer.current_frame(), 0);
        renderer.render_next_frame(&mut graph, &mut observer);
        renderer.render_next_frame(&mut graph, &mut observer);
        assert_eq!(renderer.current_frame(), 2);

        // 重建后的交换链只有 2 个 image
        headless.create_swapchain(2, vk::Extent2D { width: 64, height: 64 });
        headless.script_acquire([GfxHeadlessAcquire::OutOfDate]);
        assert_eq!(renderer.render_next_frame(&mut graph, &mut observer), None);

        assert_eq!(renderer.swapchain().image_count(), 2);
        assert_eq!(graph.resource_count(), 2);
        assert_eq!(renderer.frames_in_flight(), 2);
        assert!(renderer.in_flight_fence(2).is_none());
        assert_eq!(renderer.current_frame(), 0);

        for _ in 0..4 {
            assert!(renderer.render_next_frame(&mut graph, &mut observer).is_some_and(|ri| ri < 2));
        }
        renderer.wait();
        assert!(headless.violations().is_empty(), "{:?}", headless.violations());

        // image 数量恢复后 frame slot 也恢复到设置的数量
        headless.create_swapchain(3, vk::Extent2D { width: 64, height: 64 });
        headless.script_acquire([GfxHeadlessAcquire::OutOfDate]);
        assert_eq!(renderer.render_next_frame(&mut graph, &mut observer), None);
        assert_eq!(renderer.frames_in_flight(), 3);
        assert!(renderer.in_flight_fence(2).is_some());
    }

    #[test]
    fn test_frames_in_flight_clamped_to_image_count() {
        let (_headless, renderer, _graph) = setup(2, 4);
        assert_eq!(renderer.frames_in_flight(), 2);
        assert!(renderer.in_flight_fence(2).is_none());
    }
}
