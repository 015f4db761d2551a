// gpu/frame.rs — Per-frame input textures and their CPU→GPU upload.
//
// Two textures are bound to the stipple kernels, both created once at
// backend construction and rewritten every frame:
//
//   weights  R8Uint      quantized weight code per pixel (assign)
//   color    Rgba8Unorm  the input frame itself (passthrough render)
//
// The weight map is uploaded as integer codes, not as a normalized format,
// so the kernel reads back exactly the code the CPU backend accumulates.
//
//
// ROW ALIGNMENT
// ─────────────
// `copy_buffer_to_texture` requires the source rows to start at multiples
// of `COPY_BYTES_PER_ROW_ALIGNMENT` (256). Rows are compacted into a padded
// staging buffer first:
//
//   CPU  (stride=5, width=4):  [p p p p _][p p p p _]...
//   staging (aligned=256):     [p p p p 0 ... 0][p p p p 0 ... 0]...
//                               |-- 256 bytes --|

use wgpu::util::DeviceExt;

use crate::gpu::device::{GpuDevice, GpuError};
use crate::image::Image;

/// wgpu requires that the number of bytes per row in a buffer↔texture copy
/// is a multiple of this value.
const COPY_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

/// One 2D texture plus its default view.
pub struct FrameTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    bytes_per_pixel: u32,
}

/// The input textures of one stipple backend.
pub struct GpuFrameTextures {
    pub weights: FrameTexture,
    pub color: FrameTexture,
    pub width: u32,
    pub height: u32,
}

impl GpuFrameTextures {
    /// Allocate both textures for `width × height` frames.
    pub fn new(gpu: &GpuDevice, width: u32, height: u32) -> Result<Self, GpuError> {
        let limit = gpu.limits.max_texture_dimension_2d;
        if width > limit || height > limit {
            return Err(GpuError::TextureTooLarge { width, height, limit });
        }
        Ok(GpuFrameTextures {
            weights: FrameTexture::new(gpu, "stipple weights", width, height, wgpu::TextureFormat::R8Uint, 1),
            color: FrameTexture::new(gpu, "stipple color", width, height, wgpu::TextureFormat::Rgba8Unorm, 4),
            width,
            height,
        })
    }

    /// Upload a weight map. Kernels submitted afterwards on the same queue
    /// see the new contents.
    ///
    /// # Panics
    /// Panics if the map does not match the texture size.
    pub fn upload_weights(&self, gpu: &GpuDevice, weights: &Image<u8>) {
        assert!(
            weights.width() == self.width as usize && weights.height() == self.height as usize,
            "weight map {}×{} does not match textures {}×{}",
            weights.width(),
            weights.height(),
            self.width,
            self.height,
        );
        self.weights.upload(gpu, weights.as_slice(), weights.stride());
    }

    /// Upload packed RGBA8 color.
    ///
    /// # Panics
    /// Panics if `rgba` is not `width * height * 4` bytes.
    pub fn upload_color(&self, gpu: &GpuDevice, rgba: &[u8]) {
        assert_eq!(rgba.len(), (self.width * self.height * 4) as usize, "rgba length");
        self.color.upload(gpu, rgba, self.width as usize * 4);
    }
}

impl FrameTexture {
    fn new(
        gpu: &GpuDevice,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        bytes_per_pixel: u32,
    ) -> Self {
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        FrameTexture {
            texture,
            view,
            bytes_per_pixel,
        }
    }

    /// Copy `src` (rows `src_stride` bytes apart) into the texture through
    /// a padded staging buffer, and submit.
    fn upload(&self, gpu: &GpuDevice, src: &[u8], src_stride: usize) {
        let size = self.texture.size();
        let row_bytes = size.width * self.bytes_per_pixel;
        let aligned = align_to(row_bytes, COPY_ALIGNMENT);
        let staging = compact_rows(src, src_stride, row_bytes as usize, size.height as usize, aligned as usize);

        let staging_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("frame upload staging"),
            contents: &staging,
            usage: wgpu::BufferUsages::COPY_SRC,
        });
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("frame upload") });
        encoder.copy_buffer_to_texture(
            wgpu::ImageCopyBuffer {
                buffer: &staging_buf,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(aligned),
                    rows_per_image: Some(size.height),
                },
            },
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            size,
        );
        gpu.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Read the texture back, rows packed. Expensive; tests and debugging.
    pub fn readback(&self, gpu: &GpuDevice) -> Result<Vec<u8>, GpuError> {
        let size = self.texture.size();
        let row_bytes = size.width * self.bytes_per_pixel;
        let aligned = align_to(row_bytes, COPY_ALIGNMENT);

        let buf = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("texture readback"),
            size: (aligned * size.height) as u64,
            usage: wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("texture readback") });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &buf,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(aligned),
                    rows_per_image: Some(size.height),
                },
            },
            size,
        );
        gpu.queue.submit(std::iter::once(encoder.finish()));

        let padded = gpu.read_buffer(&buf, (aligned * size.height) as u64)?;
        Ok(compact_rows(&padded, aligned as usize, row_bytes as usize, size.height as usize, row_bytes as usize))
    }
}

/// Copy `height` rows of `row_bytes` each from `src` (rows `src_stride`
/// apart) into a zeroed buffer with rows `dst_stride` apart.
fn compact_rows(src: &[u8], src_stride: usize, row_bytes: usize, height: usize, dst_stride: usize) -> Vec<u8> {
    let mut out = vec![0u8; dst_stride * height];
    for y in 0..height {
        let s = y * src_stride;
        let d = y * dst_stride;
        out[d..d + row_bytes].copy_from_slice(&src[s..s + row_bytes]);
    }
    out
}

/// Round `value` up to the next multiple of `alignment`.
///
///   align_to(100, 256) = 256
///   align_to(256, 256) = 256
///   align_to(640, 256) = 768
#[inline]
pub(crate) fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}
