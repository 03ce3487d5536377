use std::cell::Cell;

use ash::vk;
use itertools::Itertools;
use vkrg_gfx::{
    commands::{command_buffer::GfxCommandBuffer, event::GfxEvent},
    device::{GfxDeviceRef, GfxImageDesc},
    resources::{
        image::{GfxImage, GfxImageView},
        sampler::{GfxSampler, GfxSamplerDesc},
    },
};

use crate::{
    resource::{RgImageResource, RgResourceHooks, slot_at},
    settings::RgGraphSettings,
};

/// 可写 image 的用途：作为 attachment 写入，之后作为纹理或者 input attachment 读取
const WRITABLE_IMAGE_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw()
        | vk::ImageUsageFlags::SAMPLED.as_raw()
        | vk::ImageUsageFlags::INPUT_ATTACHMENT.as_raw()
        | vk::ImageUsageFlags::TRANSFER_SRC.as_raw(),
);

/// 可写 image 在 operation 之间的 layout
const WRITABLE_IMAGE_LAYOUT: vk::ImageLayout = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;

/// 一个 image 以及它每一层的 view
struct WritableImageSlot {
    image: GfxImage,
    layer_views: Vec<GfxImageView>,
}

impl WritableImageSlot {
    fn new(device: &GfxDeviceRef, desc: GfxImageDesc, name: &str) -> Self {
        let image = GfxImage::new(device.clone(), desc, name);
        let layer_views = (0..desc.array_layers)
            .map(|layer| {
                GfxImageView::new_2d_layer(
                    device.clone(),
                    image.handle(),
                    desc.format,
                    layer,
                    format!("{}-layer-{}", name, layer),
                )
            })
            .collect_vec();
        image.transition_all_layers(WRITABLE_IMAGE_LAYOUT);
        Self { image, layer_views }
    }

    fn view(&self, layer: u32, name: &str) -> vk::ImageView {
        slot_at(&self.layer_views, layer, name).map_or(vk::ImageView::null(), |v| v.handle())
    }
}

fn writable_image_desc(width: u32, height: u32, layer_count: u32, format: vk::Format) -> GfxImageDesc {
    GfxImageDesc::new_2d(width.max(1), height.max(1), layer_count.max(1), format, WRITABLE_IMAGE_USAGE)
}

/// 可写的 image，每个 resource index 一份
///
/// 不同帧的 image 互不干扰，因此多帧并行时不需要额外同步
pub struct RgWritableImageResource {
    filter: vk::Filter,
    width: u32,
    height: u32,
    layer_count: u32,
    format: vk::Format,

    name: String,
    slots: Vec<WritableImageSlot>,
    sampler: Option<GfxSampler>,
}

// new & init
impl RgWritableImageResource {
    pub fn new(filter: vk::Filter, width: u32, height: u32, layer_count: u32, format: vk::Format) -> Self {
        Self {
            filter,
            width,
            height,
            layer_count: layer_count.max(1),
            format,
            name: String::new(),
            slots: vec![],
            sampler: None,
        }
    }
}

// getters
impl RgWritableImageResource {
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }
}

impl RgResourceHooks for RgWritableImageResource {
    fn compile(&mut self, settings: &RgGraphSettings, name: &str) {
        // 先释放之前的 image，再创建新的
        self.slots.clear();
        self.sampler = None;
        self.name = name.to_string();

        let desc = writable_image_desc(self.width, self.height, self.layer_count, self.format);
        self.slots = (0..settings.resource_count)
            .map(|ri| WritableImageSlot::new(&settings.device, desc, &format!("{}-{}", name, ri)))
            .collect();
        self.sampler = Some(GfxSampler::new(
            settings.device.clone(),
            &GfxSamplerDesc::with_filter(self.filter),
            format!("{}-sampler", name),
        ));
    }

    #[inline]
    fn is_compiled(&self) -> bool {
        !self.slots.is_empty()
    }
}

impl RgImageResource for RgWritableImageResource {
    fn images(&self) -> Vec<vk::Image> {
        self.slots.iter().map(|s| s.image.handle()).collect()
    }

    fn images_for(&self, resource_index: u32) -> Vec<vk::Image> {
        slot_at(&self.slots, resource_index, &self.name).map(|s| s.image.handle()).into_iter().collect()
    }

    fn image_view(&self, resource_index: u32, layer: u32) -> vk::ImageView {
        slot_at(&self.slots, resource_index, &self.name).map_or(vk::ImageView::null(), |s| s.view(layer, &self.name))
    }

    fn sampler(&self) -> vk::Sampler {
        self.sampler.as_ref().map_or(vk::Sampler::null(), |s| s.handle())
    }

    #[inline]
    fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    fn initial_layout(&self) -> vk::ImageLayout {
        WRITABLE_IMAGE_LAYOUT
    }

    #[inline]
    fn final_layout(&self) -> vk::ImageLayout {
        WRITABLE_IMAGE_LAYOUT
    }

    #[inline]
    fn layer_count(&self) -> u32 {
        self.layer_count
    }
}

/// 所有 resource index 共享的可写 image
///
/// 用 event 保证同一个 command buffer 中先写后读：
/// - 写之前 reset，写之后 set
/// - 读之前，如果本次执行中已经写过，等待 event
///
/// 本次执行中还没有写过就读时不等待，读到的是上一次执行写入的内容。
pub struct RgSingleWritableImageResource {
    filter: vk::Filter,
    width: u32,
    height: u32,
    layer_count: u32,
    format: vk::Format,

    name: String,
    slot: Option<WritableImageSlot>,
    sampler: Option<GfxSampler>,
    event: Option<GfxEvent>,
    /// 录制时的状态：本次执行中是否已经写过
    written: Cell<bool>,
}

// new & init
impl RgSingleWritableImageResource {
    pub fn new(filter: vk::Filter, width: u32, height: u32, layer_count: u32, format: vk::Format) -> Self {
        Self {
            filter,
            width,
            height,
            layer_count: layer_count.max(1),
            format,
            name: String::new(),
            slot: None,
            sampler: None,
            event: None,
            written: Cell::new(false),
        }
    }
}

// getters
impl RgSingleWritableImageResource {
    #[inline]
    pub fn event(&self) -> Option<&GfxEvent> {
        self.event.as_ref()
    }
}

impl RgResourceHooks for RgSingleWritableImageResource {
    fn compile(&mut self, settings: &RgGraphSettings, name: &str) {
        self.slot = None;
        self.sampler = None;
        self.event = None;
        self.name = name.to_string();

        let desc = writable_image_desc(self.width, self.height, self.layer_count, self.format);
        self.slot = Some(WritableImageSlot::new(&settings.device, desc, name));
        self.sampler = Some(GfxSampler::new(
            settings.device.clone(),
            &GfxSamplerDesc::with_filter(self.filter),
            format!("{}-sampler", name),
        ));
        self.event = Some(GfxEvent::new(settings.device.clone(), &format!("{}-written", name)));
    }

    #[inline]
    fn is_compiled(&self) -> bool {
        self.slot.is_some()
    }

    fn on_graph_execution_started(&self, _resource_index: u32, _cmd: &GfxCommandBuffer) {
        self.written.set(false);
    }

    fn on_pre_read(&self, _resource_index: u32, cmd: &GfxCommandBuffer) {
        if !self.written.get() {
            return;
        }
        if let Some(event) = self.event.as_ref() {
            event.cmd_wait(
                cmd,
                vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                vk::PipelineStageFlags2::FRAGMENT_SHADER,
            );
        }
    }

    fn on_pre_write(&self, _resource_index: u32, cmd: &GfxCommandBuffer) {
        if let Some(event) = self.event.as_ref() {
            event.cmd_reset(cmd, vk::PipelineStageFlags2::FRAGMENT_SHADER);
        }
    }

    fn on_post_write(&self, _resource_index: u32, cmd: &GfxCommandBuffer) {
        if let Some(event) = self.event.as_ref() {
            event.cmd_set(cmd, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        }
        self.written.set(true);
    }
}

impl RgImageResource for RgSingleWritableImageResource {
    fn images(&self) -> Vec<vk::Image> {
        self.slot.iter().map(|s| s.image.handle()).collect()
    }

    fn images_for(&self, _resource_index: u32) -> Vec<vk::Image> {
        self.images()
    }

    fn image_view(&self, _resource_index: u32, layer: u32) -> vk::ImageView {
        self.slot.as_ref().map_or(vk::ImageView::null(), |s| s.view(layer, &self.name))
    }

    fn sampler(&self) -> vk::Sampler {
        self.sampler.as_ref().map_or(vk::Sampler::null(), |s| s.handle())
    }

    #[inline]
    fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    fn initial_layout(&self) -> vk::ImageLayout {
        WRITABLE_IMAGE_LAYOUT
    }

    #[inline]
    fn final_layout(&self) -> vk::ImageLayout {
        WRITABLE_IMAGE_LAYOUT
    }

    #[inline]
    fn layer_count(&self) -> u32 {
        self.layer_count
    }
}

#[cfg(test)]
mod tests {
    use vkrg_gfx::{
        backend::headless::{GfxHeadlessCmd, GfxHeadlessObjectType},
        commands::{fence::GfxFence, submit_info::GfxSubmitInfo},
    };

    use super::*;
    use crate::test_utils::{graph_settings, headless_device};

    #[test]
    fn test_recompile_releases_previous_images() {
        let (headless, device) = headless_device();
        let mut image = RgWritableImageResource::new(vk::Filter::LINEAR, 64, 64, 2, vk::Format::R16G16B16A16_SFLOAT);

        image.compile(&graph_settings(&device, 3), "gbuffer");
        assert_eq!(headless.live_count(GfxHeadlessObjectType::Image), 3);
        assert_eq!(headless.live_count(GfxHeadlessObjectType::ImageView), 6);

        image.compile(&graph_settings(&device, 2), "gbuffer");
        assert_eq!(headless.live_count(GfxHeadlessObjectType::Image), 2);
        assert_eq!(headless.live_count(GfxHeadlessObjectType::ImageView), 4);
        assert_eq!(headless.live_count(GfxHeadlessObjectType::Sampler), 1);

        assert_ne!(image.image_view(0, 1), image.image_view(1, 1));
        assert_ne!(image.image_view(0, 0), image.image_view(0, 1));
        assert_eq!(image.images_for(1), vec![image.images()[1]]);
    }

    #[test]
    #[should_panic(expected = "Assertion Failed")]
    fn test_view_out_of_range_is_reported() {
        let (_headless, device) = headless_device();
        let mut image = RgWritableImageResource::new(vk::Filter::LINEAR, 4, 4, 1, vk::Format::R8G8B8A8_UNORM);
        image.compile(&graph_settings(&device, 2), "color");
        image.image_view(2, 0);
    }

    fn record_and_submit(
        device: &GfxDeviceRef,
        image: &RgSingleWritableImageResource,
        accesses: &[bool],
    ) -> GfxCommandBuffer {
        let cmd = GfxCommandBuffer::new(device.clone(), "frame");
        cmd.begin(vk::CommandBufferUsageFlags::empty());
        image.on_graph_execution_started(0, &cmd);
        for &write in accesses {
            if write {
                image.on_pre_write(0, &cmd);
                image.on_post_write(0, &cmd);
            } else {
                image.on_pre_read(0, &cmd);
            }
        }
        image.on_graph_execution_ended(0, &cmd);
        cmd.end();

        let fence = GfxFence::new(device.clone(), false, "frame");
        device.queue_submit(&[GfxSubmitInfo::new(&[&cmd])], Some(fence.handle()));
        fence.wait();
        cmd
    }

    #[test]
    fn test_single_writable_write_then_read_waits_event() {
        let (headless, device) = headless_device();
        let mut image = RgSingleWritableImageResource::new(vk::Filter::LINEAR, 4, 4, 1, vk::Format::R8G8B8A8_UNORM);
        image.compile(&graph_settings(&device, 3), "history");
        let event = image.event().map(|e| e.handle()).unwrap();

        let cmd = record_and_submit(&device, &image, &[true, false]);
        assert_eq!(
            headless.recorded_commands(cmd.vk_handle()),
            vec![
                GfxHeadlessCmd::ResetEvent(event),
                GfxHeadlessCmd::SetEvent(event),
                GfxHeadlessCmd::WaitEvent(event)
            ]
        );
        assert!(headless.violations().is_empty());
    }

    #[test]
    fn test_single_writable_read_before_write_does_not_wait() {
        let (headless, device) = headless_device();
        let mut image = RgSingleWritableImageResource::new(vk::Filter::LINEAR, 4, 4, 1, vk::Format::R8G8B8A8_UNORM);
        image.compile(&graph_settings(&device, 2), "history");

        // 每次执行开始时重置状态，第二次执行中先读也不等待
        for _ in 0..2 {
            let cmd = record_and_submit(&device, &image, &[false, true]);
            let cmds = headless.recorded_commands(cmd.vk_handle());
            assert!(!cmds.iter().any(|c| matches!(c, GfxHeadlessCmd::WaitEvent(_))));
        }
        assert!(headless.violations().is_empty());
        assert_eq!(headless.live_count(GfxHeadlessObjectType::Image), 1);
    }
}
