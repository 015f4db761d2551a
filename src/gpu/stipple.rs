// gpu/stipple.rs — GPU stipple backend.
//
// BUFFERS (resident for the backend's lifetime)
// ─────────────────────────────────────────────
//   binding  resource       type                      size
//   0        weights        texture_2d<u32> (R8Uint)  W×H
//   1        color          texture_2d<f32> (RGBA8)   W×H
//   2        positions      array<vec2<f32>>          N × 8 B
//   3        accum          array<atomic<u32>>        N × 24 B
//   4        avg_weight     array<f32>                N × 4 B
//   5        global_max     atomic<u32> (f32 bits)    4 B
//   6        index_map      array<u32>                W×H × 4 B
//   7        output         array<u32> (RGBA8)        W×H × 4 B
//   8        params         uniform Params            48 B
//
// All three kernels share one bind group layout; each shader declares only
// the bindings it touches. Two bind groups differ only in the params buffer:
// one with `accumulate = 1` for the assign pass and one with `accumulate = 0`
// for the index-map refresh.
//
// BARRIERS
// ────────
// Every stage is its own queue submission. wgpu executes submissions in
// order and makes each one's writes visible to the next, so the clear is
// complete before assign starts, assign before reduce, reduce before render.
// Readbacks (reduce summary, render output, snapshots) block on
// `device.poll(Wait)`.

use image::RgbaImage;
use tracing::{debug, info};
use wgpu::util::DeviceExt;

use crate::backend::{check_frame_size, ReduceSummary, StageBackend};
use crate::config::{RenderMode, StippleConfig};
use crate::error::{BackendError, StageError};
use crate::frame::Frame;
use crate::gpu::device::{GpuDevice, GpuError, WorkgroupSize, LINEAR_WORKGROUP_SIZE};
use crate::gpu::frame::GpuFrameTextures;
use crate::image::Image;
use crate::rng;
use crate::sites::SiteSnapshot;

/// Words per site in the accumulator buffer: x_lo, x_hi, y_lo, y_hi, weight, count.
const WORDS_PER_SITE: usize = 6;

// ---------------------------------------------------------------------------
// Uniform params (must match WGSL struct Params exactly)
// ---------------------------------------------------------------------------

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Params {
    width:       u32,
    height:      u32,
    site_count:  u32,
    precision:   f32,
    falloff:     f32,
    render_mode: u32,
    accumulate:  u32,
    _pad0:       u32,
    tint:        [f32; 4],
}

impl Params {
    fn new(config: &StippleConfig, accumulate: bool) -> Self {
        let [r, g, b] = config.render_mode.tint();
        Params {
            width:       config.width,
            height:      config.height,
            site_count:  config.site_count,
            precision:   config.fixed_point_precision as f32,
            falloff:     config.falloff,
            render_mode: config.render_mode.code(),
            accumulate:  accumulate as u32,
            _pad0:       0,
            tint:        [r, g, b, 1.0],
        }
    }
}

struct StippleBuffers {
    positions:  wgpu::Buffer,
    accum:      wgpu::Buffer,
    avg_weight: wgpu::Buffer,
    global_max: wgpu::Buffer,
    index_map:  wgpu::Buffer,
    output:     wgpu::Buffer,
}

/// wgpu implementation of [`StageBackend`].
pub struct GpuStippleBackend {
    config:       StippleConfig,
    textures:     GpuFrameTextures,
    buffers:      StippleBuffers,
    assign_pipe:  wgpu::ComputePipeline,
    reduce_pipe:  wgpu::ComputePipeline,
    render_pipe:  wgpu::ComputePipeline,
    accumulate_bg: wgpu::BindGroup,
    refresh_bg:   wgpu::BindGroup,
    // Declared last: the device must outlive every resource above.
    gpu:          GpuDevice,
}

impl GpuStippleBackend {
    /// Validate `config`, seed the sites and allocate every GPU resource.
    pub fn new(gpu: GpuDevice, config: &StippleConfig) -> Result<Self, BackendError> {
        config.validate()?;
        let positions = rng::seed_positions(
            &config.initial_seed,
            config.site_count as usize,
            config.width,
            config.height,
        );
        Self::build(gpu, config.clone(), &positions)
    }

    /// Start from explicit site positions instead of the seeded layout.
    /// `config.site_count` is replaced by `positions.len()`.
    pub fn with_positions(
        gpu: GpuDevice,
        config: &StippleConfig,
        positions: &[[f32; 2]],
    ) -> Result<Self, BackendError> {
        let config = config.with_site_count(positions.len())?;
        Self::build(gpu, config, positions)
    }

    fn build(gpu: GpuDevice, config: StippleConfig, positions: &[[f32; 2]]) -> Result<Self, BackendError> {
        let n = config.site_count as u64;
        let pixels = config.pixel_count() as u64;
        gpu.check_storage_size("index map", pixels * 4)?;
        gpu.check_storage_size("render output", pixels * 4)?;
        gpu.check_storage_size("accumulators", n * WORDS_PER_SITE as u64 * 4)?;

        let textures = GpuFrameTextures::new(&gpu, config.width, config.height)?;
        let buffers = create_buffers(&gpu, positions, pixels);
        let bgl = create_bind_group_layout(&gpu);

        let pipeline_layout = gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label:                Some("stipple pipeline layout"),
            bind_group_layouts:   &[&bgl],
            push_constant_ranges: &[],
        });
        let assign_pipe = create_pipeline(&gpu, &pipeline_layout, include_str!("../shaders/assign.wgsl"), "assign_sites");
        let reduce_pipe = create_pipeline(&gpu, &pipeline_layout, include_str!("../shaders/reduce.wgsl"), "reduce_sites");
        let render_pipe = create_pipeline(&gpu, &pipeline_layout, include_str!("../shaders/render.wgsl"), "render_stipple");

        let accumulate_params = Params::new(&config, true);
        let refresh_params = Params::new(&config, false);
        let accumulate_bg = create_bind_group(&gpu, &bgl, &textures, &buffers, &accumulate_params, "accumulate");
        let refresh_bg = create_bind_group(&gpu, &bgl, &textures, &buffers, &refresh_params, "refresh");

        info!(
            sites = config.site_count,
            width = config.width,
            height = config.height,
            device = %gpu,
            "gpu backend ready"
        );

        Ok(GpuStippleBackend {
            config,
            textures,
            buffers,
            assign_pipe,
            reduce_pipe,
            render_pipe,
            accumulate_bg,
            refresh_bg,
            gpu,
        })
    }

    pub fn device(&self) -> &GpuDevice {
        &self.gpu
    }

    /// Encode one compute pass and submit it.
    fn dispatch(&self, label: &str, pipeline: &wgpu::ComputePipeline, bind_group: &wgpu::BindGroup, groups: (u32, u32)) {
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label:            Some(label),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(groups.0, groups.1, 1);
        }
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
    }

    fn pixel_groups(&self) -> (u32, u32) {
        self.gpu.dispatch_size(self.config.width, self.config.height)
    }

    fn read_f32s(&self, buffer: &wgpu::Buffer, count: usize) -> Result<Vec<f32>, GpuError> {
        let bytes = self.gpu.read_buffer(buffer, (count * 4) as u64)?;
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }

    fn read_u32s(&self, buffer: &wgpu::Buffer, count: usize) -> Result<Vec<u32>, GpuError> {
        let bytes = self.gpu.read_buffer(buffer, (count * 4) as u64)?;
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }

    fn read_global_max(&self) -> Result<f32, GpuError> {
        let bits = self.read_u32s(&self.buffers.global_max, 1)?;
        Ok(bits.first().map_or(0.0, |&b| f32::from_bits(b)))
    }
}

impl StageBackend for GpuStippleBackend {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn config(&self) -> &StippleConfig {
        &self.config
    }

    fn clear_accumulators(&mut self) -> Result<(), StageError> {
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("clear accumulators") });
        encoder.clear_buffer(&self.buffers.accum, 0, None);
        encoder.clear_buffer(&self.buffers.global_max, 0, None);
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn assign(&mut self, frame: &Frame) -> Result<(), StageError> {
        check_frame_size(&self.config, frame)?;
        let weights = frame.weight_map(self.config.weight_mode);
        self.textures.upload_weights(&self.gpu, &weights);
        self.dispatch("assign_sites", &self.assign_pipe, &self.accumulate_bg, self.pixel_groups());
        Ok(())
    }

    fn reduce(&mut self) -> Result<ReduceSummary, StageError> {
        let groups = self.gpu.dispatch_linear(self.config.site_count);
        self.dispatch("reduce_sites", &self.reduce_pipe, &self.accumulate_bg, (groups, 1));

        let avg = self.read_f32s(&self.buffers.avg_weight, self.config.site_count as usize)?;
        let summary = ReduceSummary {
            active_sites: avg.iter().filter(|&&a| a > 0.0).count(),
            global_max: self.read_global_max()?,
        };
        debug!(active = summary.active_sites, global_max = summary.global_max, "gpu reduce");
        Ok(summary)
    }

    fn refresh_index_map(&mut self) -> Result<(), StageError> {
        self.dispatch("refresh_index_map", &self.assign_pipe, &self.refresh_bg, self.pixel_groups());
        Ok(())
    }

    fn render(&mut self, frame: &Frame) -> Result<RgbaImage, StageError> {
        check_frame_size(&self.config, frame)?;
        if self.config.render_mode == RenderMode::Passthrough {
            self.textures.upload_color(&self.gpu, &frame.to_rgba8());
        }
        self.dispatch("render_stipple", &self.render_pipe, &self.accumulate_bg, self.pixel_groups());

        let expected = self.config.pixel_count() * 4;
        let bytes = self.gpu.read_buffer(&self.buffers.output, expected as u64)?;
        let actual = bytes.len();
        // pack4x8unorm puts r in the low byte, so little-endian words are RGBA.
        RgbaImage::from_raw(self.config.width, self.config.height, bytes)
            .ok_or(StageError::OutputSize { expected, actual })
    }

    fn snapshot(&self) -> Result<SiteSnapshot, StageError> {
        let n = self.config.site_count as usize;
        let flat = self.read_f32s(&self.buffers.positions, n * 2)?;
        let accum = self.read_u32s(&self.buffers.accum, n * WORDS_PER_SITE)?;
        Ok(SiteSnapshot {
            positions: flat.chunks_exact(2).map(|c| [c[0], c[1]]).collect(),
            avg_weights: self.read_f32s(&self.buffers.avg_weight, n)?,
            global_max: self.read_global_max()?,
            accum_weights: accum.chunks_exact(WORDS_PER_SITE).map(|s| s[4]).collect(),
            accum_counts: accum.chunks_exact(WORDS_PER_SITE).map(|s| s[5]).collect(),
        })
    }

    fn index_map(&self) -> Result<Image<u32>, StageError> {
        let data = self.read_u32s(&self.buffers.index_map, self.config.pixel_count())?;
        Ok(Image::from_vec(self.config.width as usize, self.config.height as usize, data))
    }
}

// ---------------------------------------------------------------------------
// Resource construction
// ---------------------------------------------------------------------------

fn create_buffers(gpu: &GpuDevice, positions: &[[f32; 2]], pixels: u64) -> StippleBuffers {
    let n = positions.len() as u64;
    let storage = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST;
    let zeroed = |label: &str, size: u64| {
        gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label:              Some(label),
            size,
            usage:              storage,
            mapped_at_creation: false,
        })
    };
    StippleBuffers {
        positions: gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label:    Some("site positions"),
            contents: bytemuck::cast_slice(positions),
            usage:    storage,
        }),
        accum:      zeroed("site accumulators", n * WORDS_PER_SITE as u64 * 4),
        avg_weight: zeroed("site avg weight", n * 4),
        global_max: zeroed("global max", 4),
        index_map:  zeroed("index map", pixels * 4),
        output:     zeroed("render output", pixels * 4),
    }
}

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty:                 wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size:   None,
        },
        count: None,
    }
}

fn texture_entry(binding: u32, sample_type: wgpu::TextureSampleType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            multisampled:   false,
            view_dimension: wgpu::TextureViewDimension::D2,
            sample_type,
        },
        count: None,
    }
}

fn create_bind_group_layout(gpu: &GpuDevice) -> wgpu::BindGroupLayout {
    gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("stipple BGL"),
        entries: &[
            texture_entry(0, wgpu::TextureSampleType::Uint),
            texture_entry(1, wgpu::TextureSampleType::Float { filterable: false }),
            storage_entry(2),
            storage_entry(3),
            storage_entry(4),
            storage_entry(5),
            storage_entry(6),
            storage_entry(7),
            wgpu::BindGroupLayoutEntry {
                binding: 8,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty:                 wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size:   None,
                },
                count: None,
            },
        ],
    })
}

/// Fill the workgroup placeholders of a WGSL template.
fn shader_source(template: &str, ws: WorkgroupSize) -> String {
    template
        .replace("{{WG_X}}", &ws.x.to_string())
        .replace("{{WG_Y}}", &ws.y.to_string())
        .replace("{{WG_LINEAR}}", &LINEAR_WORKGROUP_SIZE.to_string())
}

fn create_pipeline(
    gpu: &GpuDevice,
    layout: &wgpu::PipelineLayout,
    template: &str,
    entry_point: &str,
) -> wgpu::ComputePipeline {
    let source = shader_source(template, gpu.workgroup_size());
    let module = gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label:  Some(entry_point),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    gpu.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label:               Some(entry_point),
        layout:              Some(layout),
        module:              &module,
        entry_point,
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache:               None,
    })
}

fn create_bind_group(
    gpu: &GpuDevice,
    bgl: &wgpu::BindGroupLayout,
    textures: &GpuFrameTextures,
    buffers: &StippleBuffers,
    params: &Params,
    label: &str,
) -> wgpu::BindGroup {
    let params_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label:    Some(label),
        contents: bytemuck::bytes_of(params),
        usage:    wgpu::BufferUsages::UNIFORM,
    });
    gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label:  Some(label),
        layout: bgl,
        entries: &[
            wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&textures.weights.view) },
            wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(&textures.color.view) },
            wgpu::BindGroupEntry { binding: 2, resource: buffers.positions.as_entire_binding() },
            wgpu::BindGroupEntry { binding: 3, resource: buffers.accum.as_entire_binding() },
            wgpu::BindGroupEntry { binding: 4, resource: buffers.avg_weight.as_entire_binding() },
            wgpu::BindGroupEntry { binding: 5, resource: buffers.global_max.as_entire_binding() },
            wgpu::BindGroupEntry { binding: 6, resource: buffers.index_map.as_entire_binding() },
            wgpu::BindGroupEntry { binding: 7, resource: buffers.output.as_entire_binding() },
            wgpu::BindGroupEntry { binding: 8, resource: params_buf.as_entire_binding() },
        ],
    })
}

// ---------------------------------------------------------------------------
// Tests — GPU kernels validated against the CPU backend
// ---------------------------------------------------------------------------
