/// Vulkan offscreen framebuffer
///
/// A color image (sampled after rendering), an optional depth image and the
/// vk::Framebuffer tying them to the offscreen render pass of their formats.
/// Between passes the color image sits in SHADER_READ_ONLY_OPTIMAL, so it
/// can be sampled by later draws without extra barriers.

use ash::vk;
use std::any::Any;
use std::sync::Arc;
use aurora_render::aurora::Result;
use aurora_render::aurora::render::{FramebufferSpec, FramebufferTarget, TextureFormat};
use aurora_render::{engine_debug, engine_err};
use crate::vulkan_context::{Garbage, GpuContext};
use crate::vulkan_recorder::{with_recorder, OffscreenTarget, WeakRecorder};
use crate::vulkan_render_pass::PassSignature;
use crate::vulkan_texture::{GpuImage, GpuSampler};

const SOURCE: &str = "aurora::vulkan::Framebuffer";

struct Attachments {
    color: GpuImage,
    depth: Option<GpuImage>,
    framebuffer: vk::Framebuffer,
    extent: vk::Extent2D,
}

pub struct VulkanFramebufferTarget {
    gpu: Arc<GpuContext>,
    recorder: WeakRecorder,
    color_format: TextureFormat,
    depth_format: Option<TextureFormat>,
    signature: PassSignature,
    render_pass: vk::RenderPass,
    sampler: GpuSampler,
    attachments: Option<Attachments>,
    clear_color: [f32; 4],
    bound: bool,
}

impl VulkanFramebufferTarget {
    pub fn new(gpu: &Arc<GpuContext>, recorder: WeakRecorder, spec: &FramebufferSpec) -> Result<Self> {
        let signature = PassSignature {
            color: gpu.image_format(spec.color_format),
            depth: spec.depth_format.map(|format| gpu.image_format(format)),
        };
        let render_pass = gpu.render_pass(signature)?;
        let mut target = Self {
            gpu: gpu.clone(),
            recorder,
            color_format: spec.color_format,
            depth_format: spec.depth_format,
            signature,
            render_pass,
            sampler: GpuSampler::new(gpu, vk::SamplerAddressMode::CLAMP_TO_EDGE)?,
            attachments: None,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            bound: false,
        };
        target.attachments = Some(target.create_attachments(spec.width, spec.height)?);
        Ok(target)
    }

    fn create_attachments(&self, width: u32, height: u32) -> Result<Attachments> {
        let color = GpuImage::new(
            &self.gpu,
            width,
            height,
            self.color_format,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            "framebuffer color",
        )?;
        let depth = match self.depth_format {
            Some(format) => Some(GpuImage::new(
                &self.gpu,
                width,
                height,
                format,
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
                "framebuffer depth",
            )?),
            None => None,
        };

        self.initialize_contents(&color, depth.as_ref())?;

        let mut views = vec![color.view()];
        if let Some(depth) = &depth {
            views.push(depth.view());
        }
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(self.render_pass)
            .attachments(&views)
            .width(width)
            .height(height)
            .layers(1);
        let framebuffer = unsafe {
            self.gpu.device
                .create_framebuffer(&create_info, None)
                .map_err(|e| engine_err!(SOURCE, "Failed to create framebuffer {}x{}: {:?}", width, height, e))?
        };

        engine_debug!(SOURCE, "Created {}x{} attachments ({:?}, {:?})",
            width, height, self.color_format, self.depth_format);
        Ok(Attachments {
            color,
            depth,
            framebuffer,
            extent: vk::Extent2D { width, height },
        })
    }

    /// Clear fresh attachments and move them to their resting layouts
    fn initialize_contents(&self, color: &GpuImage, depth: Option<&GpuImage>) -> Result<()> {
        let device = &self.gpu.device;
        self.gpu.one_time_submit(|command_buffer| {
            let top = (vk::PipelineStageFlags::TOP_OF_PIPE, vk::AccessFlags::empty());
            let transfer = (vk::PipelineStageFlags::TRANSFER, vk::AccessFlags::TRANSFER_WRITE);

            color.transition(command_buffer, vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL, top, transfer);
            let clear = vk::ClearColorValue { float32: [0.0, 0.0, 0.0, 1.0] };
            let color_range = vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            };
            unsafe {
                device.cmd_clear_color_image(
                    command_buffer,
                    color.image(),
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &clear,
                    &[color_range],
                );
            }
            color.transition(
                command_buffer,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                transfer,
                (vk::PipelineStageFlags::FRAGMENT_SHADER, vk::AccessFlags::SHADER_READ),
            );

            if let Some(depth) = depth {
                depth.transition(command_buffer, vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL, top, transfer);
                let mut aspect_mask = vk::ImageAspectFlags::DEPTH;
                if depth.format() == TextureFormat::Depth24Stencil8 {
                    aspect_mask |= vk::ImageAspectFlags::STENCIL;
                }
                let depth_range = vk::ImageSubresourceRange { aspect_mask, ..color_range };
                unsafe {
                    device.cmd_clear_depth_stencil_image(
                        command_buffer,
                        depth.image(),
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
                        &[depth_range],
                    );
                }
                depth.transition(
                    command_buffer,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                    transfer,
                    (
                        vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                        vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                    ),
                );
            }
        })
    }

    fn native_target(&self) -> Option<OffscreenTarget> {
        self.attachments.as_ref().map(|attachments| OffscreenTarget {
            framebuffer: attachments.framebuffer,
            render_pass: self.render_pass,
            extent: attachments.extent,
            signature: self.signature,
        })
    }

    fn release_attachments(&mut self) {
        if let Some(attachments) = self.attachments.take() {
            let framebuffer = attachments.framebuffer;
            let _ = with_recorder(&self.recorder, |recorder| {
                recorder.forget_offscreen(framebuffer);
                recorder.release_view(attachments.color.view());
                Ok(())
            });
            self.gpu.retire(Garbage::Framebuffer(framebuffer));
            // Images retire as they drop: color first, then depth
            drop(attachments.color);
            drop(attachments.depth);
        }
    }

    pub fn signature(&self) -> PassSignature {
        self.signature
    }
}

impl FramebufferTarget for VulkanFramebufferTarget {
    fn bind(&mut self) -> Result<()> {
        let Some(target) = self.native_target() else {
            return Err(engine_err!(SOURCE, "Framebuffer has been released"));
        };
        with_recorder(&self.recorder, |recorder| {
            recorder.bind_offscreen(target);
            Ok(())
        })?;
        self.bound = true;
        Ok(())
    }

    fn unbind(&mut self) -> Result<()> {
        self.bound = false;
        with_recorder(&self.recorder, |recorder| {
            recorder.bind_window();
            Ok(())
        })
    }

    fn set_clear_color(&mut self, color: [f32; 4]) -> Result<()> {
        self.clear_color = color;
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        let color = self.clear_color;
        with_recorder(&self.recorder, |recorder| recorder.clear(color))
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let attachments = self.create_attachments(width, height)?;
        self.release_attachments();
        self.attachments = Some(attachments);

        if self.bound {
            if let Some(target) = self.native_target() {
                with_recorder(&self.recorder, |recorder| {
                    recorder.bind_offscreen(target);
                    Ok(())
                })?;
            }
        }
        Ok(())
    }

    fn bind_color_attachment(&self, slot: u32) -> Result<()> {
        let Some(attachments) = &self.attachments else {
            return Err(engine_err!(SOURCE, "Framebuffer has been released"));
        };
        let (view, sampler) = (attachments.color.view(), self.sampler.handle());
        with_recorder(&self.recorder, |recorder| {
            recorder.bind_texture(slot, view, sampler);
            Ok(())
        })
    }

    fn has_depth_attachment(&self) -> bool {
        self.attachments.as_ref().is_some_and(|a| a.depth.is_some())
    }

    fn release(&mut self) {
        self.release_attachments();
        self.bound = false;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanFramebufferTarget {
    fn drop(&mut self) {
        self.release_attachments();
    }
}
