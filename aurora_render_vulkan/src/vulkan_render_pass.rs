/// Render passes - one attachment layout per (color, depth) format pair
///
/// Every pipeline is built against the `Offscreen` pass of its signature.
/// The window passes differ only in load ops and layouts, and all kinds
/// share the same subpass and dependencies, so they stay compatible with
/// pipelines built for the offscreen pass.

use ash::vk;
use rustc_hash::FxHashMap;
use aurora_render::aurora::Result;
use aurora_render::{engine_debug, engine_err};

/// Attachment formats a pipeline is compatible with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassSignature {
    pub color: vk::Format,
    pub depth: Option<vk::Format>,
}

/// How a pass treats its attachments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    /// Framebuffer attachments: loaded and stored, color left shader-readable
    Offscreen,
    /// First window pass of a frame: clears a freshly acquired image
    WindowFirst,
    /// Later window passes in the same frame: load what is there
    WindowResume,
}

fn has_stencil(format: vk::Format) -> bool {
    matches!(format, vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D16_UNORM_S8_UINT)
}

/// Create a single-subpass render pass for `signature`
pub fn create_render_pass(device: &ash::Device, signature: PassSignature, kind: PassKind) -> Result<vk::RenderPass> {
    let (color_load, color_initial, color_final) = match kind {
        PassKind::Offscreen => (
            vk::AttachmentLoadOp::LOAD,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ),
        PassKind::WindowFirst => (
            vk::AttachmentLoadOp::CLEAR,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::PRESENT_SRC_KHR,
        ),
        PassKind::WindowResume => (
            vk::AttachmentLoadOp::LOAD,
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::ImageLayout::PRESENT_SRC_KHR,
        ),
    };
    let (depth_load, depth_initial) = match kind {
        PassKind::WindowFirst => (vk::AttachmentLoadOp::CLEAR, vk::ImageLayout::UNDEFINED),
        _ => (vk::AttachmentLoadOp::LOAD, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
    };

    let mut attachments = vec![vk::AttachmentDescription::default()
        .format(signature.color)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(color_load)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(color_initial)
        .final_layout(color_final)];

    let color_ref = vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    let depth_ref = vk::AttachmentReference::default()
        .attachment(1)
        .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    if let Some(depth) = signature.depth {
        let (stencil_load, stencil_store) = if has_stencil(depth) {
            (depth_load, vk::AttachmentStoreOp::STORE)
        } else {
            (vk::AttachmentLoadOp::DONT_CARE, vk::AttachmentStoreOp::DONT_CARE)
        };
        attachments.push(vk::AttachmentDescription::default()
            .format(depth)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(depth_load)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(stencil_load)
            .stencil_store_op(stencil_store)
            .initial_layout(depth_initial)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL));
    }

    let mut subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(std::slice::from_ref(&color_ref));
    if signature.depth.is_some() {
        subpass = subpass.depth_stencil_attachment(&depth_ref);
    }

    let attachment_stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
        | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
    let attachment_writes = vk::AccessFlags::COLOR_ATTACHMENT_WRITE
        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
    let attachment_access = attachment_writes
        | vk::AccessFlags::COLOR_ATTACHMENT_READ
        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ;

    // Earlier passes (or sampling) finish before this one touches the
    // attachments; this pass finishes before its color is sampled.
    let dependencies = [
        vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(attachment_stages | vk::PipelineStageFlags::FRAGMENT_SHADER)
            .src_access_mask(attachment_writes)
            .dst_stage_mask(attachment_stages)
            .dst_access_mask(attachment_access),
        vk::SubpassDependency::default()
            .src_subpass(0)
            .dst_subpass(vk::SUBPASS_EXTERNAL)
            .src_stage_mask(attachment_stages)
            .src_access_mask(attachment_writes)
            .dst_stage_mask(attachment_stages | vk::PipelineStageFlags::FRAGMENT_SHADER)
            .dst_access_mask(attachment_access | vk::AccessFlags::SHADER_READ),
    ];

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(std::slice::from_ref(&subpass))
        .dependencies(&dependencies);

    unsafe {
        device
            .create_render_pass(&create_info, None)
            .map_err(|e| engine_err!("aurora::vulkan::RenderPass",
                "Failed to create {:?} render pass for {:?}: {:?}", kind, signature, e))
    }
}

/// Offscreen passes by signature, created on first use
#[derive(Default)]
pub struct RenderPassCache {
    passes: FxHashMap<PassSignature, vk::RenderPass>,
}

impl RenderPassCache {
    pub fn get_or_create(&mut self, device: &ash::Device, signature: PassSignature) -> Result<vk::RenderPass> {
        if let Some(&render_pass) = self.passes.get(&signature) {
            return Ok(render_pass);
        }
        let render_pass = create_render_pass(device, signature, PassKind::Offscreen)?;
        engine_debug!("aurora::vulkan::RenderPass", "Created render pass for {:?}", signature);
        self.passes.insert(signature, render_pass);
        Ok(render_pass)
    }

    /// Destroy every cached pass; the device must be idle
    pub fn destroy(&mut self, device: &ash::Device) {
        for (_, render_pass) in self.passes.drain() {
            unsafe { device.destroy_render_pass(render_pass, None) };
        }
    }
}
