// Graphics pipeline creation and management
//
// The graphics pipeline defines how vertices are processed and rasterized.
// Viewport, scissor and line width are dynamic so the pipeline survives
// window resizes; only the render pass it was built against must outlive it.

use ash::vk;

use super::command_buffer::CommandBuffer;
use super::error::{BackendError, BackendResult};
use super::utils;

/// Everything that varies between pipelines built by this backend.
pub struct PipelineDesc<'a> {
    pub render_pass: vk::RenderPass,
    pub vertex_stride: u32,
    pub attributes: &'a [vk::VertexInputAttributeDescription],
    pub descriptor_set_layouts: &'a [vk::DescriptorSetLayout],
    pub stages: &'a [vk::PipelineShaderStageCreateInfo],
    /// Initial viewport and scissor; both are overridden per frame.
    pub viewport: vk::Viewport,
    pub scissor: vk::Rect2D,
    pub wireframe: bool,
}

pub const DYNAMIC_STATES: [vk::DynamicState; 3] = [
    vk::DynamicState::VIEWPORT,
    vk::DynamicState::SCISSOR,
    vk::DynamicState::LINE_WIDTH,
];

/// Vertex attributes packed tightly in declaration order at binding 0.
pub fn packed_attributes(formats: &[(vk::Format, u32)]) -> Vec<vk::VertexInputAttributeDescription> {
    let mut offset = 0;
    formats
        .iter()
        .enumerate()
        .map(|(location, &(format, size))| {
            let attribute = vk::VertexInputAttributeDescription::builder()
                .binding(0)
                .location(location as u32)
                .format(format)
                .offset(offset)
                .build();
            offset += size;
            attribute
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct Pipeline {
    pub handle: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

impl Pipeline {
    pub fn create(device: &ash::Device, desc: &PipelineDesc) -> BackendResult<Self> {
        let viewports = &[desc.viewport];
        let scissors = &[desc.scissor];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(viewports)
            .scissors(scissors);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(if desc.wireframe {
                vk::PolygonMode::LINE
            } else {
                vk::PolygonMode::FILL
            })
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false)
            .depth_bias_constant_factor(0.0)
            .depth_bias_clamp(0.0)
            .depth_bias_slope_factor(0.0);

        // Multisampling (disabled)
        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .min_sample_shading(1.0)
            .alpha_to_coverage_enable(false)
            .alpha_to_one_enable(false);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        // Alpha blending
        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .alpha_blend_op(vk::BlendOp::ADD)
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .build();

        let color_blend_attachments = &[color_blend_attachment];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(color_blend_attachments);

        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&DYNAMIC_STATES);

        let binding = vk::VertexInputBindingDescription::builder()
            .binding(0)
            .stride(desc.vertex_stride)
            .input_rate(vk::VertexInputRate::VERTEX)
            .build();
        let bindings = &[binding];
        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(bindings)
            .vertex_attribute_descriptions(desc.attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(desc.descriptor_set_layouts);
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None) }
            .map_err(|e| utils::log_failure("Failed to create pipeline layout", e))?;

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(desc.stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(desc.render_pass)
            .subpass(0)
            .base_pipeline_index(-1)
            .build();

        let pipelines = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };

        match pipelines {
            Ok(pipelines) => match pipelines.first() {
                Some(&handle) => {
                    log::debug!("Graphics pipeline created");
                    Ok(Self { handle, layout })
                }
                None => {
                    unsafe { device.destroy_pipeline_layout(layout, None) };
                    Err(BackendError::Pipeline("driver returned no pipeline".into()))
                }
            },
            Err((partial, e)) => {
                unsafe {
                    for pipeline in partial {
                        if pipeline != vk::Pipeline::null() {
                            device.destroy_pipeline(pipeline, None);
                        }
                    }
                    device.destroy_pipeline_layout(layout, None);
                }
                Err(utils::log_failure("Failed to create graphics pipeline", e).into())
            }
        }
    }

    pub fn bind(&self, device: &ash::Device, command_buffer: &CommandBuffer, bind_point: vk::PipelineBindPoint) {
        if command_buffer.handle == vk::CommandBuffer::null() {
            return;
        }
        unsafe { device.cmd_bind_pipeline(command_buffer.handle, bind_point, self.handle) };
    }

    pub fn destroy(&mut self, device: &ash::Device) {
        unsafe {
            if self.handle != vk::Pipeline::null() {
                device.destroy_pipeline(self.handle, None);
                self.handle = vk::Pipeline::null();
            }
            if self.layout != vk::PipelineLayout::null() {
                device.destroy_pipeline_layout(self.layout, None);
                self.layout = vk::PipelineLayout::null();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_attribute_offsets() {
        let attributes = packed_attributes(&[
            (vk::Format::R32G32B32_SFLOAT, 12),
            (vk::Format::R32G32_SFLOAT, 8),
            (vk::Format::R32G32B32A32_SFLOAT, 16),
        ]);
        let offsets: Vec<u32> = attributes.iter().map(|a| a.offset).collect();
        let locations: Vec<u32> = attributes.iter().map(|a| a.location).collect();
        assert_eq!(offsets, vec![0, 12, 20]);
        assert_eq!(locations, vec![0, 1, 2]);
        assert!(attributes.iter().all(|a| a.binding == 0));
    }

    #[test]
    fn test_dynamic_states_cover_resize() {
        assert!(DYNAMIC_STATES.contains(&vk::DynamicState::VIEWPORT));
        assert!(DYNAMIC_STATES.contains(&vk::DynamicState::SCISSOR));
        assert!(DYNAMIC_STATES.contains(&vk::DynamicState::LINE_WIDTH));
    }
}
