// SPDX-License-Identifier: CEPL-1.0
//! The textured quad.
//!
//! Geometry, texture, sampler, camera buffer and descriptor set layout are
//! created once and live until [`QuadPipeline::release`]. The descriptor
//! pool, pipeline layout and pipeline are rebuilt for every swapchain
//! generation through [`PipelineProvider`].

use std::io::Cursor;
use std::mem::{offset_of, size_of};
use std::path::Path;

use anyhow::anyhow;
use ash::util::read_spv;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use image::{Rgba, RgbaImage};
use neowater_render::{
    upload_image, Aspect, Device, DrawBindings, DrawCall, Extent, ImageResource, PipelineProvider,
    RenderResult, RenderTarget, SubresourceRange,
};
use tracing::{debug, info, warn};

use crate::convert;
use crate::device::VkDevice;
use crate::memory::{self, BufferAlloc, STAGING_PROPS};

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub color: [f32; 3],
    pub uv: [f32; 2],
}

pub const QUAD_VERTS: [Vertex; 4] = [
    Vertex {
        pos: [-0.5, -0.5, 0.0],
        color: [1.0, 0.0, 0.0],
        uv: [0.0, 0.0],
    },
    Vertex {
        pos: [0.5, -0.5, 0.0],
        color: [0.0, 1.0, 0.0],
        uv: [1.0, 0.0],
    },
    Vertex {
        pos: [0.5, 0.5, 0.0],
        color: [0.0, 0.0, 1.0],
        uv: [1.0, 1.0],
    },
    Vertex {
        pos: [-0.5, 0.5, 0.0],
        color: [1.0, 1.0, 1.0],
        uv: [0.0, 1.0],
    },
];
pub const QUAD_IDXS: [u32; 6] = [0, 1, 2, 2, 3, 0];

const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct CameraUbo {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
}

impl CameraUbo {
    /// Orthographic camera three units back, with the vertical range
    /// following the surface aspect so the quad stays square.
    pub fn for_extent(extent: Extent) -> Self {
        let aspect = extent.height as f32 / extent.width.max(1) as f32;
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO, Vec3::Y);
        let proj = Mat4::orthographic_rh(-1.0, 1.0, -aspect, aspect, 0.1, 100.0);
        Self {
            model: Mat4::IDENTITY.to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            proj: proj.to_cols_array_2d(),
        }
    }
}

pub fn checkerboard(size: u32, cell: u32) -> RgbaImage {
    let cell = cell.max(1);
    RgbaImage::from_fn(size, size, |x, y| {
        if ((x / cell) + (y / cell)) % 2 == 0 {
            Rgba([255, 255, 255, 255])
        } else {
            Rgba([64, 64, 64, 255])
        }
    })
}

/// Decodes `path`, or falls back to a checkerboard when there is none or it
/// cannot be read.
pub fn load_texture(path: Option<&Path>) -> RgbaImage {
    match path.map(|p| (p, image::open(p))) {
        Some((_, Ok(img))) => img.to_rgba8(),
        Some((p, Err(e))) => {
            warn!(path = %p.display(), error = %e, "texture unreadable; using checkerboard");
            checkerboard(64, 8)
        }
        None => checkerboard(64, 8),
    }
}

struct Texture {
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    sampler: vk::Sampler,
}

pub struct QuadPipeline {
    vertices: BufferAlloc,
    indices: BufferAlloc,
    camera: BufferAlloc,
    texture: Texture,
    set_layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
}

impl QuadPipeline {
    pub fn new(device: &mut VkDevice, texture: Option<&Path>) -> RenderResult<Self> {
        let mut scene = Self {
            vertices: BufferAlloc::null(),
            indices: BufferAlloc::null(),
            camera: BufferAlloc::null(),
            texture: Texture {
                image: vk::Image::null(),
                memory: vk::DeviceMemory::null(),
                view: vk::ImageView::null(),
                sampler: vk::Sampler::null(),
            },
            set_layout: vk::DescriptorSetLayout::null(),
            pool: vk::DescriptorPool::null(),
        };
        // Destroying null handles is a no-op, so a half-built scene can go
        // through the normal release path.
        if let Err(e) = unsafe { scene.init(device, texture) } {
            scene.release(device);
            return Err(e);
        }
        Ok(scene)
    }

    unsafe fn init(&mut self, device: &mut VkDevice, texture: Option<&Path>) -> RenderResult<()> {
        self.vertices = device.create_device_local_buffer(
            vk::BufferUsageFlags::VERTEX_BUFFER,
            bytemuck::cast_slice(&QUAD_VERTS),
        )?;
        self.indices = device.create_device_local_buffer(
            vk::BufferUsageFlags::INDEX_BUFFER,
            bytemuck::cast_slice(&QUAD_IDXS),
        )?;
        self.camera = device.create_buffer(
            size_of::<CameraUbo>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            STAGING_PROPS,
        )?;
        self.create_texture(device, texture)?;
        self.set_layout = create_set_layout(device.raw())?;
        Ok(())
    }

    unsafe fn create_texture(
        &mut self,
        device: &mut VkDevice,
        path: Option<&Path>,
    ) -> RenderResult<()> {
        let pixels = load_texture(path);
        let extent = Extent::new(pixels.width(), pixels.height());

        let (image, mem) = memory::create_image_and_memory(
            device.instance(),
            device.raw(),
            device.phys(),
            TEXTURE_FORMAT,
            convert::extent(extent),
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        )?;
        self.texture.image = image;
        self.texture.memory = mem;

        let staging = device.create_staging(pixels.as_raw())?;
        let mut resource =
            ImageResource::new(image, SubresourceRange::single(Aspect::COLOR), extent);
        let uploaded = upload_image(device, &mut resource, staging.buffer);
        staging.destroy(device.raw());
        uploaded?;

        self.texture.view = device.create_image_view(image, TEXTURE_FORMAT, Aspect::COLOR)?;

        let sci = vk::SamplerCreateInfo {
            s_type: vk::StructureType::SAMPLER_CREATE_INFO,
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
            address_mode_u: vk::SamplerAddressMode::REPEAT,
            address_mode_v: vk::SamplerAddressMode::REPEAT,
            address_mode_w: vk::SamplerAddressMode::REPEAT,
            max_lod: 0.0,
            border_color: vk::BorderColor::INT_OPAQUE_BLACK,
            ..Default::default()
        };
        self.texture.sampler = device
            .raw()
            .create_sampler(&sci, None)
            .map_err(|e| anyhow!("create_sampler: {e}"))?;
        info!(
            width = extent.width,
            height = extent.height,
            layout = ?resource.layout(),
            "texture uploaded"
        );
        Ok(())
    }

    unsafe fn write_descriptors(&self, device: &ash::Device, set: vk::DescriptorSet) {
        let image_info = vk::DescriptorImageInfo {
            sampler: self.texture.sampler,
            image_view: self.texture.view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };
        let buffer_info = vk::DescriptorBufferInfo {
            buffer: self.camera.buffer,
            offset: 0,
            range: size_of::<CameraUbo>() as vk::DeviceSize,
        };
        let writes = [
            vk::WriteDescriptorSet {
                s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                dst_set: set,
                dst_binding: 0,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                p_image_info: &image_info,
                ..Default::default()
            },
            vk::WriteDescriptorSet {
                s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                dst_set: set,
                dst_binding: 1,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                p_buffer_info: &buffer_info,
                ..Default::default()
            },
        ];
        device.update_descriptor_sets(&writes, &[]);
    }

    /// One set per swapchain image, all pointing at the same texture and
    /// camera buffer.
    unsafe fn create_pool_and_sets(
        &self,
        device: &ash::Device,
        count: usize,
    ) -> RenderResult<(vk::DescriptorPool, Vec<vk::DescriptorSet>)> {
        let count = count as u32;
        let sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: count,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: count,
            },
        ];
        let pci = vk::DescriptorPoolCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
            max_sets: count,
            pool_size_count: sizes.len() as u32,
            p_pool_sizes: sizes.as_ptr(),
            ..Default::default()
        };
        let pool = device
            .create_descriptor_pool(&pci, None)
            .map_err(|e| anyhow!("create_descriptor_pool: {e}"))?;

        let layouts = vec![self.set_layout; count as usize];
        let ai = vk::DescriptorSetAllocateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
            descriptor_pool: pool,
            descriptor_set_count: count,
            p_set_layouts: layouts.as_ptr(),
            ..Default::default()
        };
        match device.allocate_descriptor_sets(&ai) {
            Ok(sets) => Ok((pool, sets)),
            Err(e) => {
                device.destroy_descriptor_pool(pool, None);
                Err(anyhow!("allocate_descriptor_sets: {e}").into())
            }
        }
    }
}

impl PipelineProvider<VkDevice> for QuadPipeline {
    fn build(
        &mut self,
        device: &mut VkDevice,
        target: &RenderTarget<VkDevice>,
    ) -> RenderResult<DrawBindings<VkDevice>> {
        let raw = device.raw();
        unsafe {
            // Safe to overwrite: the device is idle during a rebuild.
            let camera = CameraUbo::for_extent(target.extent);
            memory::write_mapped(raw, self.camera.memory, bytemuck::bytes_of(&camera))?;

            let (pool, sets) = self.create_pool_and_sets(raw, target.image_count)?;
            for &set in &sets {
                self.write_descriptors(raw, set);
            }

            let (layout, pipeline) = match create_pipeline(raw, self.set_layout, target) {
                Ok(p) => p,
                Err(e) => {
                    raw.destroy_descriptor_pool(pool, None);
                    return Err(e);
                }
            };
            self.pool = pool;
            debug!(
                generation = target.generation,
                sets = target.image_count,
                "quad pipeline built"
            );

            Ok(DrawBindings {
                pipeline,
                layout,
                descriptor_sets: sets,
                vertex_buffer: Some(self.vertices.buffer),
                index_buffer: Some(self.indices.buffer),
                draw: DrawCall::Indexed {
                    index_count: QUAD_IDXS.len() as u32,
                    instance_count: 1,
                },
            })
        }
    }

    fn destroy(&mut self, device: &mut VkDevice, bindings: DrawBindings<VkDevice>) {
        let raw = device.raw();
        unsafe {
            raw.destroy_pipeline(bindings.pipeline, None);
            raw.destroy_pipeline_layout(bindings.layout, None);
            raw.destroy_descriptor_pool(self.pool, None);
        }
        self.pool = vk::DescriptorPool::null();
    }

    /// Frees everything created in [`new`](Self::new). Every generation's
    /// bindings must already be destroyed.
    fn release(&mut self, device: &mut VkDevice) {
        let raw = device.raw();
        unsafe {
            raw.destroy_descriptor_set_layout(self.set_layout, None);
            raw.destroy_sampler(self.texture.sampler, None);
            raw.destroy_image_view(self.texture.view, None);
            raw.destroy_image(self.texture.image, None);
            raw.free_memory(self.texture.memory, None);
            self.camera.destroy(raw);
            self.indices.destroy(raw);
            self.vertices.destroy(raw);
        }
        self.set_layout = vk::DescriptorSetLayout::null();
        self.texture.sampler = vk::Sampler::null();
        self.texture.view = vk::ImageView::null();
        self.texture.image = vk::Image::null();
        self.texture.memory = vk::DeviceMemory::null();
        self.camera = BufferAlloc::null();
        self.indices = BufferAlloc::null();
        self.vertices = BufferAlloc::null();
    }
}

unsafe fn create_set_layout(device: &ash::Device) -> RenderResult<vk::DescriptorSetLayout> {
    let bindings = [
        vk::DescriptorSetLayoutBinding {
            binding: 0,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            ..Default::default()
        },
        vk::DescriptorSetLayoutBinding {
            binding: 1,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::VERTEX,
            ..Default::default()
        },
    ];
    let ci = vk::DescriptorSetLayoutCreateInfo {
        s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
        binding_count: bindings.len() as u32,
        p_bindings: bindings.as_ptr(),
        ..Default::default()
    };
    device
        .create_descriptor_set_layout(&ci, None)
        .map_err(|e| anyhow!("create_descriptor_set_layout: {e}").into())
}

pub fn vertex_attributes() -> [vk::VertexInputAttributeDescription; 3] {
    [
        vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: offset_of!(Vertex, pos) as u32,
        },
        vk::VertexInputAttributeDescription {
            location: 1,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: offset_of!(Vertex, color) as u32,
        },
        vk::VertexInputAttributeDescription {
            location: 2,
            binding: 0,
            format: vk::Format::R32G32_SFLOAT,
            offset: offset_of!(Vertex, uv) as u32,
        },
    ]
}

unsafe fn create_shader_module(device: &ash::Device, bytes: &[u8]) -> RenderResult<vk::ShaderModule> {
    let code = read_spv(&mut Cursor::new(bytes)).map_err(|e| anyhow!("read_spv: {e}"))?;
    let ci = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        p_code: code.as_ptr(),
        code_size: code.len() * 4,
        ..Default::default()
    };
    device
        .create_shader_module(&ci, None)
        .map_err(|e| anyhow!("create_shader_module: {e}").into())
}

// STRICT: the pipeline is bound to the generation's render pass and extent;
// it is never reused across generations.
unsafe fn create_pipeline(
    device: &ash::Device,
    set_layout: vk::DescriptorSetLayout,
    target: &RenderTarget<VkDevice>,
) -> RenderResult<(vk::PipelineLayout, vk::Pipeline)> {
    let vs_bytes = include_bytes!(concat!(env!("OUT_DIR"), "/quad.vert.spv"));
    let fs_bytes = include_bytes!(concat!(env!("OUT_DIR"), "/quad.frag.spv"));
    let vs = create_shader_module(device, &vs_bytes[..])?;
    let fs = match create_shader_module(device, &fs_bytes[..]) {
        Ok(m) => m,
        Err(e) => {
            device.destroy_shader_module(vs, None);
            return Err(e);
        }
    };

    let entry = c"main";
    let stages = [
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::VERTEX,
            module: vs,
            p_name: entry.as_ptr(),
            ..Default::default()
        },
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::FRAGMENT,
            module: fs,
            p_name: entry.as_ptr(),
            ..Default::default()
        },
    ];

    let vb = vk::VertexInputBindingDescription {
        binding: 0,
        stride: size_of::<Vertex>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    };
    let va = vertex_attributes();
    let vertex_input = vk::PipelineVertexInputStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
        vertex_binding_description_count: 1,
        p_vertex_binding_descriptions: &vb,
        vertex_attribute_description_count: va.len() as u32,
        p_vertex_attribute_descriptions: va.as_ptr(),
        ..Default::default()
    };
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        ..Default::default()
    };

    // Static viewport: the command buffers are recorded once per generation.
    let extent = convert::extent(target.extent);
    let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    };
    let scissor = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    };
    let viewport_state = vk::PipelineViewportStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
        viewport_count: 1,
        p_viewports: &viewport,
        scissor_count: 1,
        p_scissors: &scissor,
        ..Default::default()
    };
    let raster = vk::PipelineRasterizationStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::BACK,
        front_face: vk::FrontFace::CLOCKWISE,
        line_width: 1.0,
        ..Default::default()
    };
    let multisample = vk::PipelineMultisampleStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
        rasterization_samples: vk::SampleCountFlags::TYPE_1,
        ..Default::default()
    };
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DEPTH_STENCIL_STATE_CREATE_INFO,
        depth_test_enable: vk::TRUE,
        depth_write_enable: vk::TRUE,
        depth_compare_op: vk::CompareOp::LESS,
        ..Default::default()
    };
    let color_blend_att = vk::PipelineColorBlendAttachmentState {
        color_write_mask: vk::ColorComponentFlags::R
            | vk::ColorComponentFlags::G
            | vk::ColorComponentFlags::B
            | vk::ColorComponentFlags::A,
        blend_enable: vk::FALSE,
        ..Default::default()
    };
    let color_blend = vk::PipelineColorBlendStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &color_blend_att,
        ..Default::default()
    };

    let layout_info = vk::PipelineLayoutCreateInfo {
        s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
        set_layout_count: 1,
        p_set_layouts: &set_layout,
        ..Default::default()
    };
    let layout = match device.create_pipeline_layout(&layout_info, None) {
        Ok(l) => l,
        Err(e) => {
            device.destroy_shader_module(vs, None);
            device.destroy_shader_module(fs, None);
            return Err(anyhow!("create_pipeline_layout: {e}").into());
        }
    };

    let pipeline_info = vk::GraphicsPipelineCreateInfo {
        s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
        stage_count: stages.len() as u32,
        p_stages: stages.as_ptr(),
        p_vertex_input_state: &vertex_input,
        p_input_assembly_state: &input_assembly,
        p_viewport_state: &viewport_state,
        p_rasterization_state: &raster,
        p_multisample_state: &multisample,
        p_depth_stencil_state: &depth_stencil,
        p_color_blend_state: &color_blend,
        layout,
        render_pass: target.render_pass,
        subpass: 0,
        ..Default::default()
    };
    let created = device.create_graphics_pipelines(
        vk::PipelineCache::null(),
        std::slice::from_ref(&pipeline_info),
        None,
    );
    device.destroy_shader_module(vs, None);
    device.destroy_shader_module(fs, None);

    match created {
        Ok(p) => Ok((layout, p[0])),
        Err((_, err)) => {
            device.destroy_pipeline_layout(layout, None);
            Err(anyhow!("create_graphics_pipelines failed: {err:?}").into())
        }
    }
}
