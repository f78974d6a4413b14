//! Render pass and graphics pipeline creation.

use std::sync::Arc;

use ash::vk;

use crate::command::PipelineBinding;
use crate::error::{GpuError, Result};
use crate::vulkan::VulkanDevice;

/// SPIR-V for the two programmable stages.
#[derive(Debug, Clone, Copy)]
pub struct ShaderStages<'a> {
    pub vertex: &'a [u32],
    pub fragment: &'a [u32],
}

/// A single-subpass render pass plus a graphics pipeline compatible with it.
///
/// The render pass clears the swapchain image and leaves it ready for
/// presentation. Viewport and scissor are dynamic, and the pipeline has no
/// vertex input, so vertices come from the shader alone.
pub struct PipelineBundle {
    device: Arc<VulkanDevice>,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
}

impl PipelineBundle {
    /// Create the render pass and pipeline for images of `format`.
    pub fn new(device: &Arc<VulkanDevice>, format: vk::Format, shaders: ShaderStages<'_>) -> Result<Self> {
        let raw = device.device();

        let render_pass = unsafe { create_render_pass(raw, format) }?;

        let layout_info = vk::PipelineLayoutCreateInfo::default();
        let layout = match unsafe { raw.create_pipeline_layout(&layout_info, None) } {
            Ok(layout) => layout,
            Err(e) => {
                unsafe { raw.destroy_render_pass(render_pass, None) };
                return Err(GpuError::PipelineCreation(e.to_string()));
            }
        };

        let pipeline = match unsafe { create_pipeline(raw, render_pass, layout, shaders) } {
            Ok(pipeline) => pipeline,
            Err(e) => {
                unsafe {
                    raw.destroy_pipeline_layout(layout, None);
                    raw.destroy_render_pass(render_pass, None);
                }
                return Err(e);
            }
        };

        tracing::debug!("Pipeline created for {:?}", format);

        Ok(Self {
            device: Arc::clone(device),
            render_pass,
            layout,
            pipeline,
        })
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Handles the presenter records with.
    pub fn binding(&self) -> PipelineBinding {
        PipelineBinding {
            pipeline: self.pipeline,
            render_pass: self.render_pass,
        }
    }
}

impl Drop for PipelineBundle {
    fn drop(&mut self) {
        let raw = self.device.device();
        unsafe {
            let _ = raw.device_wait_idle();
            raw.destroy_pipeline(self.pipeline, None);
            raw.destroy_pipeline_layout(self.layout, None);
            raw.destroy_render_pass(self.render_pass, None);
        }
    }
}

/// Clear on load, store for presentation, one external dependency so the
/// layout transition waits for the acquire semaphore.
///
/// # Safety
/// The device must be valid.
unsafe fn create_render_pass(device: &ash::Device, format: vk::Format) -> Result<vk::RenderPass> {
    let attachments = [vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)];

    let color_refs = [vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];

    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)];

    let dependencies = [vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)];

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    unsafe { device.create_render_pass(&create_info, None) }
        .map_err(|e| GpuError::PipelineCreation(format!("Render pass: {e}")))
}

/// # Safety
/// The device must be valid and shader code must be valid SPIR-V.
unsafe fn create_pipeline(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
    shaders: ShaderStages<'_>,
) -> Result<vk::Pipeline> {
    let vert_shader_info = vk::ShaderModuleCreateInfo::default().code(shaders.vertex);
    let vert_module = unsafe { device.create_shader_module(&vert_shader_info, None) }
        .map_err(|e| GpuError::ShaderCompilation(format!("Vertex: {e}")))?;

    let frag_shader_info = vk::ShaderModuleCreateInfo::default().code(shaders.fragment);
    let frag_module = match unsafe { device.create_shader_module(&frag_shader_info, None) } {
        Ok(module) => module,
        Err(e) => {
            unsafe { device.destroy_shader_module(vert_module, None) };
            return Err(GpuError::ShaderCompilation(format!("Fragment: {e}")));
        }
    };

    let shader_stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vert_module)
            .name(c"main"),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(frag_module)
            .name(c"main"),
    ];

    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    // Viewport (dynamic)
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .cull_mode(vk::CullModeFlags::NONE)
        .front_face(vk::FrontFace::CLOCKWISE)
        .depth_bias_enable(false)
        .line_width(1.0);

    let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(vk::SampleCountFlags::TYPE_1)
        .sample_shading_enable(false);

    let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(false)
        .color_write_mask(vk::ColorComponentFlags::RGBA)];

    let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .attachments(&color_blend_attachments);

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state =
        vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization)
        .multisample_state(&multisampling)
        .color_blend_state(&color_blending)
        .dynamic_state(&dynamic_state)
        .layout(layout)
        .render_pass(render_pass)
        .subpass(0);

    let pipelines = unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    };

    // Shader modules are not needed once the pipeline exists
    unsafe {
        device.destroy_shader_module(vert_module, None);
        device.destroy_shader_module(frag_module, None);
    }

    let pipelines = pipelines.map_err(|(_pipelines, e)| GpuError::PipelineCreation(e.to_string()))?;
    pipelines
        .into_iter()
        .next()
        .ok_or_else(|| GpuError::PipelineCreation("driver returned no pipeline".to_string()))
}
