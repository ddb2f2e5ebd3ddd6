//! GPU rendering backend.
//!
//! A single compute pass evaluates the transfer function per pixel and
//! writes packed RGBA words, which are read back through a staging buffer.

use albis_core::transfer::{MASK_DEAD_RGBA, MASK_GAP_RGBA};
use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::error::{RenderError, Result};
use crate::upload::{flip_values, pack_mask_codes, pack_palette, pack_rgba, unpack_rgba};
use crate::{image_size, ContrastParams, FrameView, Renderer, RendererKind, RgbaImage};

const WORKGROUP_SIZE: u32 = 16;

/// Shader parameters; layout matches `Params` in `colormap.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ShaderParams {
    width: u32,
    height: u32,
    lut_size: u32,
    transfer: u32,
    min_value: f32,
    max_value: f32,
    invert: u32,
    has_mask: u32,
    gap_color: u32,
    dead_color: u32,
    _pad0: u32,
    _pad1: u32,
}

/// Compute-shader renderer.
#[derive(Debug)]
pub struct GpuRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    max_dimension: u32,
    max_binding_size: u64,
    adapter_name: String,
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl GpuRenderer {
    /// Acquire an adapter, create a device and build the pipeline.
    ///
    /// # Errors
    ///
    /// [`RenderError::GpuUnavailable`] when no adapter or device can be
    /// created, [`RenderError::Shader`] when the pipeline fails validation.
    pub fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| RenderError::GpuUnavailable(format!("no suitable adapter: {e}")))?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("albis_render_device"),
            required_limits: adapter.limits(),
            ..Default::default()
        }))
        .map_err(|e| RenderError::GpuUnavailable(format!("failed to create device: {e}")))?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("colormap_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("colormap.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("colormap_bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, true),
                storage_entry(4, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("colormap_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            ..Default::default()
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("colormap_pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(RenderError::Shader(err.to_string()));
        }

        let limits = device.limits();
        let adapter_name = adapter.get_info().name;
        log::info!("GPU renderer ready on {adapter_name}");

        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            max_dimension: limits.max_texture_dimension_2d,
            max_binding_size: u64::from(limits.max_storage_buffer_binding_size),
            adapter_name,
        })
    }

    /// Name of the adapter in use.
    #[must_use]
    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Largest frame edge this device accepts.
    #[must_use]
    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    fn check_size(&self, width: u32, height: u32) -> Result<()> {
        let bytes = u64::from(width) * u64::from(height) * 4;
        if width > self.max_dimension || height > self.max_dimension || bytes > self.max_binding_size
        {
            return Err(RenderError::TextureTooLarge {
                max: self.max_dimension,
            });
        }
        Ok(())
    }

    fn storage(&self, label: &str, words: &[u8]) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: words,
                usage: wgpu::BufferUsages::STORAGE,
            })
    }

    fn wait(&self) -> Result<()> {
        self.device
            .poll(wgpu::PollType::Wait)
            .map(|_| ())
            .map_err(|e| RenderError::Readback(e.to_string()))
    }
}

impl Renderer for GpuRenderer {
    fn kind(&self) -> RendererKind {
        RendererKind::Gpu
    }

    #[allow(clippy::too_many_lines)]
    fn render(&mut self, view: FrameView<'_>, params: ContrastParams<'_>) -> Result<RgbaImage> {
        let palette = params.palette;
        if palette.is_empty() {
            return Err(RenderError::EmptyPalette);
        }
        let frame = view.frame;
        let (width, height) = image_size(frame);
        self.check_size(width, height)?;
        if frame.is_empty() {
            return RgbaImage::from_raw(width, height, Vec::new())
                .ok_or(RenderError::Readback("image buffer size mismatch".into()));
        }

        let mask = view.aligned_mask();
        let [min_value, max_value, invert, transfer] = params.window.shader_params();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let shader_params = ShaderParams {
            width,
            height,
            lut_size: palette.len() as u32,
            transfer: transfer as u32,
            min_value,
            max_value,
            invert: u32::from(invert != 0.0),
            has_mask: u32::from(mask.is_some()),
            gap_color: pack_rgba(MASK_GAP_RGBA),
            dead_color: pack_rgba(MASK_DEAD_RGBA),
            _pad0: 0,
            _pad1: 0,
        };

        let values = flip_values(frame);
        let mask_words = mask.map_or_else(|| vec![0u32], pack_mask_codes);
        let lut = pack_palette(palette);

        let params_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("colormap_params_buffer"),
                contents: bytemuck::bytes_of(&shader_params),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let values_buffer = self.storage("colormap_values_buffer", bytemuck::cast_slice(&values));
        let mask_buffer = self.storage("colormap_mask_buffer", bytemuck::cast_slice(&mask_words));
        let lut_buffer = self.storage("colormap_lut_buffer", bytemuck::cast_slice(&lut));

        let output_size = u64::from(width) * u64::from(height) * 4;
        let output_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("colormap_output_buffer"),
            size: output_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("colormap_staging_buffer"),
            size: output_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("colormap_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: values_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: mask_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: lut_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: output_buffer.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("colormap_encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("colormap_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(
                width.div_ceil(WORKGROUP_SIZE),
                height.div_ceil(WORKGROUP_SIZE),
                1,
            );
        }
        encoder.copy_buffer_to_buffer(&output_buffer, 0, &staging_buffer, 0, output_size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging_buffer.slice(..);
        slice.map_async(wgpu::MapMode::Read, |_| {});
        self.wait()?;

        let data = slice.get_mapped_range();
        let words: Vec<u32> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        staging_buffer.unmap();

        RgbaImage::from_raw(width, height, unpack_rgba(&words))
            .ok_or(RenderError::Readback("image buffer size mismatch".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CpuRenderer;
    use albis_core::{Colormap, ContrastWindow, Frame, Mask, Palette};

    fn gpu() -> Option<GpuRenderer> {
        match GpuRenderer::new() {
            Ok(r) => Some(r),
            Err(e) => {
                eprintln!("GPU renderer unavailable (expected on headless systems): {e}");
                None
            }
        }
    }

    #[test]
    fn test_gpu_matches_cpu() {
        let Some(mut gpu) = gpu() else {
            return;
        };
        let data: Vec<u16> = (0..37 * 23).map(|i| (i * 13 % 4000) as u16).collect();
        let frame = Frame::new(37, 23, data).unwrap();
        let mut bits = vec![0u32; 37 * 23];
        bits[5] = 1;
        bits[100] = 0x08;
        let mask = Mask::new(37, 23, bits).unwrap();
        for colormap in [Colormap::Gray, Colormap::Viridis, Colormap::AlbulaHdr] {
            let palette = Palette::build(colormap);
            let params = ContrastParams {
                window: ContrastWindow::new(100.0, 3000.0).with_colormap(colormap),
                palette: &palette,
            };
            let view = FrameView::new(&frame).with_mask(Some(&mask));
            let cpu_img = CpuRenderer::new().render(view, params).unwrap();
            let gpu_img = gpu.render(view, params).unwrap();
            let mismatched = cpu_img
                .pixels()
                .zip(gpu_img.pixels())
                .filter(|(a, b)| a != b)
                .count();
            // Single-precision rounding may move a handful of pixels by one slot.
            assert!(mismatched <= 8, "{colormap}: {mismatched} pixels differ");
            assert_eq!(gpu_img.get_pixel(5, 0).0, [0, 0, 0, 255]);
        }
    }

    #[test]
    fn test_gpu_degenerate_hdr_window() {
        let Some(mut gpu) = gpu() else {
            return;
        };
        let frame = Frame::new(4, 1, vec![3u16, 7, 8, 65535]).unwrap();
        let palette = Palette::build(Colormap::AlbulaHdr);
        let params = ContrastParams {
            window: ContrastWindow::new(7.0, 7.0).with_colormap(Colormap::AlbulaHdr),
            palette: &palette,
        };
        let view = FrameView::new(&frame);
        let cpu_img = CpuRenderer::new().render(view, params).unwrap();
        let gpu_img = gpu.render(view, params).unwrap();
        assert_eq!(cpu_img.as_raw(), gpu_img.as_raw());
        assert_eq!(gpu_img.get_pixel(2, 0).0, gpu_img.get_pixel(0, 0).0);
    }

    #[test]
    fn test_too_large_frame_rejected() {
        let Some(gpu) = gpu() else {
            return;
        };
        let max = gpu.max_dimension();
        let err = gpu.check_size(max + 1, 1).unwrap_err();
        assert_eq!(err.to_string(), format!("Frame exceeds max texture size {max}px"));
    }
}
