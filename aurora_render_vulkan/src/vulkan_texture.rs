/// Vulkan images: attachment/sampled images and the Texture resource
///
/// Sampled textures are uploaded once through a staging buffer and then
/// live in SHADER_READ_ONLY_OPTIMAL. Binding a texture only records it in
/// the recorder's slot table; the descriptor is written at draw time.

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use std::any::Any;
use std::sync::Arc;
use aurora_render::aurora::Result;
use aurora_render::aurora::render::{
    PixelBuffer, ResourceGuard, ResourceKey, ResourceKind, SharedContext, Texture, TextureFormat,
};
use aurora_render::{engine_bail_warn, engine_err};
use crate::vulkan_buffer::GpuBuffer;
use crate::vulkan_context::{Garbage, GpuContext};
use crate::vulkan_format::{aspect_mask, expand_rgb_to_rgba};
use crate::vulkan_recorder::{with_recorder, WeakRecorder};

const SOURCE: &str = "aurora::vulkan::Texture";

fn full_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

// ===== GPU IMAGE =====

/// A 2D image, its memory and a full view; retired on drop
pub struct GpuImage {
    context: Arc<GpuContext>,
    image: vk::Image,
    allocation: Option<Allocation>,
    view: vk::ImageView,
    format: TextureFormat,
    vk_format: vk::Format,
    width: u32,
    height: u32,
}

impl GpuImage {
    pub fn new(
        context: &Arc<GpuContext>,
        width: u32,
        height: u32,
        format: TextureFormat,
        usage: vk::ImageUsageFlags,
        name: &str,
    ) -> Result<Self> {
        let vk_format = context.image_format(format);
        unsafe {
            let create_info = vk::ImageCreateInfo::default()
                .image_type(vk::ImageType::TYPE_2D)
                .format(vk_format)
                .extent(vk::Extent3D { width, height, depth: 1 })
                .mip_levels(1)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);
            let image = context.device
                .create_image(&create_info, None)
                .map_err(|e| engine_err!(SOURCE, "Failed to create image '{}': {:?}", name, e))?;

            let allocation = match context.allocate_image_memory(image, name) {
                Ok(allocation) => allocation,
                Err(e) => {
                    context.device.destroy_image(image, None);
                    return Err(e);
                }
            };

            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(vk_format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(full_range(aspect_mask(format)));
            let view = match context.device.create_image_view(&view_info, None) {
                Ok(view) => view,
                Err(e) => {
                    context.retire(Garbage::Image(image, Some(allocation)));
                    return Err(engine_err!(SOURCE, "Failed to create view of '{}': {:?}", name, e));
                }
            };
            context.set_object_name(image, name);

            Ok(Self {
                context: context.clone(),
                image,
                allocation: Some(allocation),
                view,
                format,
                vk_format,
                width,
                height,
            })
        }
    }

    pub fn image(&self) -> vk::Image {
        self.image
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn vk_format(&self) -> vk::Format {
        self.vk_format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Record a whole-image layout transition
    pub fn transition(
        &self,
        command_buffer: vk::CommandBuffer,
        from: vk::ImageLayout,
        to: vk::ImageLayout,
        src: (vk::PipelineStageFlags, vk::AccessFlags),
        dst: (vk::PipelineStageFlags, vk::AccessFlags),
    ) {
        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(from)
            .new_layout(to)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(full_range(aspect_mask(self.format)))
            .src_access_mask(src.1)
            .dst_access_mask(dst.1);
        unsafe {
            self.context.device.cmd_pipeline_barrier(
                command_buffer,
                src.0,
                dst.0,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    }

    /// Upload tightly packed pixels and leave the image shader-readable
    pub fn upload(&self, data: &[u8]) -> Result<()> {
        let staging = GpuBuffer::mapped_with_data(
            &self.context,
            data,
            data.len() as u64,
            vk::BufferUsageFlags::TRANSFER_SRC,
            "texture staging",
        )?;
        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D { width: self.width, height: self.height, depth: 1 });

        self.context.one_time_submit(|command_buffer| {
            self.transition(
                command_buffer,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                (vk::PipelineStageFlags::TOP_OF_PIPE, vk::AccessFlags::empty()),
                (vk::PipelineStageFlags::TRANSFER, vk::AccessFlags::TRANSFER_WRITE),
            );
            unsafe {
                self.context.device.cmd_copy_buffer_to_image(
                    command_buffer,
                    staging.handle(),
                    self.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
            }
            self.transition(
                command_buffer,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                (vk::PipelineStageFlags::TRANSFER, vk::AccessFlags::TRANSFER_WRITE),
                (vk::PipelineStageFlags::FRAGMENT_SHADER, vk::AccessFlags::SHADER_READ),
            );
        })
    }
}

impl Drop for GpuImage {
    fn drop(&mut self) {
        self.context.retire(Garbage::ImageView(self.view));
        self.context.retire(Garbage::Image(self.image, self.allocation.take()));
    }
}

// ===== SAMPLER =====

/// Linear, repeat-addressed sampler; retired on drop
pub struct GpuSampler {
    context: Arc<GpuContext>,
    sampler: vk::Sampler,
}

impl GpuSampler {
    pub fn new(context: &Arc<GpuContext>, address_mode: vk::SamplerAddressMode) -> Result<Self> {
        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(address_mode)
            .address_mode_v(address_mode)
            .address_mode_w(address_mode)
            .max_lod(vk::LOD_CLAMP_NONE)
            .border_color(vk::BorderColor::FLOAT_OPAQUE_BLACK);
        let sampler = unsafe {
            context.device
                .create_sampler(&create_info, None)
                .map_err(|e| engine_err!(SOURCE, "Failed to create sampler: {:?}", e))?
        };
        Ok(Self { context: context.clone(), sampler })
    }

    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for GpuSampler {
    fn drop(&mut self) {
        self.context.retire(Garbage::Sampler(self.sampler));
    }
}

/// Sampled image ready for descriptor writes
pub struct SampledImage {
    pub image: GpuImage,
    pub sampler: GpuSampler,
}

impl SampledImage {
    /// Upload `pixels` into a new shader-readable image
    pub fn from_pixels(context: &Arc<GpuContext>, pixels: &PixelBuffer, name: &str) -> Result<Self> {
        check_pixels(pixels)?;
        let image = GpuImage::new(
            context,
            pixels.width,
            pixels.height,
            pixels.format,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            name,
        )?;
        match pixels.format {
            TextureFormat::Rgb8 => image.upload(&expand_rgb_to_rgba(&pixels.data))?,
            _ => image.upload(&pixels.data)?,
        }
        let sampler = GpuSampler::new(context, vk::SamplerAddressMode::REPEAT)?;
        Ok(Self { image, sampler })
    }
}

/// Reject pixel buffers whose fields disagree (they are public)
fn check_pixels(pixels: &PixelBuffer) -> Result<()> {
    if pixels.width == 0 || pixels.height == 0 {
        engine_bail_warn!(SOURCE, "Texture has zero size ({}x{})", pixels.width, pixels.height);
    }
    if pixels.format.is_depth() {
        engine_bail_warn!(SOURCE, "Cannot upload depth format {:?}", pixels.format);
    }
    let expected = pixels.width as u64 * pixels.height as u64 * pixels.format.bytes_per_pixel() as u64;
    if pixels.data.len() as u64 != expected {
        engine_bail_warn!(SOURCE, "Texture data holds {} bytes, expected {}", pixels.data.len(), expected);
    }
    Ok(())
}

// ===== TEXTURE =====

pub struct VulkanTexture {
    sampled: SampledImage,
    recorder: WeakRecorder,
    guard: ResourceGuard,
}

impl VulkanTexture {
    pub fn new(gpu: &Arc<GpuContext>, recorder: WeakRecorder, context: &SharedContext, pixels: &PixelBuffer) -> Result<Self> {
        Ok(Self {
            sampled: SampledImage::from_pixels(gpu, pixels, "texture")?,
            recorder,
            guard: ResourceGuard::register(context, ResourceKind::Texture, "texture")?,
        })
    }

    pub fn view(&self) -> vk::ImageView {
        self.sampled.image.view()
    }
}

impl Texture for VulkanTexture {
    fn width(&self) -> u32 {
        self.sampled.image.width()
    }

    fn height(&self) -> u32 {
        self.sampled.image.height()
    }

    fn format(&self) -> TextureFormat {
        self.sampled.image.format()
    }

    fn bind(&self, slot: u32) -> Result<()> {
        self.guard.ensure_current()?;
        let (view, sampler) = (self.sampled.image.view(), self.sampled.sampler.handle());
        with_recorder(&self.recorder, |recorder| {
            recorder.bind_texture(slot, view, sampler);
            Ok(())
        })
    }

    fn resource_key(&self) -> ResourceKey {
        self.guard.key()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanTexture {
    fn drop(&mut self) {
        let view = self.sampled.image.view();
        let _ = with_recorder(&self.recorder, |recorder| {
            recorder.release_view(view);
            Ok(())
        });
    }
}
