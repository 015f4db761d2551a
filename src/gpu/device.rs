// gpu/device.rs — wgpu device abstraction.
//
// Responsibilities:
//   - Enumerate adapters and prefer real hardware over software renderers.
//   - Expose a `DeviceProfile` for simulating a smaller target's limits on a
//     development machine (workgroup invocations, buffer sizes).
//   - Provide `WorkgroupSize` for the per-pixel kernels and a linear size
//     for the per-site kernel, validated against the active profile.
//   - Blocking buffer readback shared by every kernel.
//
// ADAPTER SELECTION:
// wgpu's default `request_adapter` uses power preference heuristics that
// may grab llvmpipe/softpipe (the software renderer appears as a valid
// device). We enumerate explicitly and take a software adapter only when
// nothing else exists.
//
// DEVICE LIMITS:
// Under a non-Native profile we request *lower* limits than the hardware
// supports. wgpu validates every dispatch and binding against the requested
// limits, so a frame size that would not fit the target fails here, at
// backend construction, instead of on the device.

use std::fmt;

use tracing::{info, warn};

/// Hardware profile controlling device limits and default workgroup sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceProfile {
    /// Use the adapter's actual hardware limits. No artificial caps.
    Native,
    /// Small embedded GPUs (VideoCore-class): 256 invocations per workgroup,
    /// 4096² textures, 128 MiB storage bindings.
    Embedded,
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceProfile::Native => write!(f, "Native"),
            DeviceProfile::Embedded => write!(f, "Embedded (simulated limits)"),
        }
    }
}

/// A workgroup size configuration for 2D per-pixel dispatches.
///
/// The product of both dimensions must not exceed the profile's
/// `max_compute_invocations_per_workgroup` limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkgroupSize {
    pub x: u32,
    pub y: u32,
}

impl WorkgroupSize {
    /// Total invocations per workgroup (x * y).
    pub fn total(&self) -> u32 {
        self.x * self.y
    }

    /// Validated default for the given hardware target.
    ///
    /// - `Native`: 16×8 = 128 invocations (4 warps of 32, 2 waves of 64).
    /// - `Embedded`: 8×8 = 64 invocations, well inside a 256 limit.
    pub(crate) fn for_profile(profile: DeviceProfile) -> Self {
        match profile {
            DeviceProfile::Native => WorkgroupSize { x: 16, y: 8 },
            DeviceProfile::Embedded => WorkgroupSize { x: 8, y: 8 },
        }
    }
}

impl fmt::Display for WorkgroupSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}×{} ({} invocations)", self.x, self.y, self.total())
    }
}

/// Invocations per workgroup for 1D per-site dispatches.
pub const LINEAR_WORKGROUP_SIZE: u32 = 64;

/// Cached adapter information for logging and debugging.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub vendor: u32,
    pub device: u32,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {:?})", self.name, self.backend, self.device_type)
    }
}

/// The core GPU context: adapter, device, queue, and active profile.
///
/// Hold one `GpuDevice` for the lifetime of the application; it is
/// expensive to create.
///
/// # Field drop order
/// Rust drops struct fields in declaration order. `_instance` is declared
/// last so the `wgpu::Instance` outlives `device` and `queue`; some Vulkan
/// layers crash when the instance goes first.
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub profile: DeviceProfile,
    pub adapter_info: AdapterInfo,
    /// Fixed at creation: kernels bake it in when their pipelines are built.
    workgroup_size: WorkgroupSize,
    /// Limits actually granted by `request_device`.
    pub limits: wgpu::Limits,
    _instance: wgpu::Instance,
}

impl GpuDevice {
    /// Create a `GpuDevice` on the best available adapter with
    /// `DeviceProfile::Native` limits.
    ///
    /// # Errors
    /// Returns `Err` if no adapter is found or the device request fails.
    pub fn new() -> Result<Self, GpuError> {
        Self::new_with_profile(DeviceProfile::Native)
    }

    /// Create a `GpuDevice` with an explicit hardware profile.
    pub fn new_with_profile(profile: DeviceProfile) -> Result<Self, GpuError> {
        pollster::block_on(Self::init_async(profile))
    }

    async fn init_async(profile: DeviceProfile) -> Result<Self, GpuError> {
        // Non-conformant adapters (dzn on WSL2) are still usable for
        // storage buffers and compute dispatches.
        let flags = if cfg!(debug_assertions) {
            wgpu::InstanceFlags::VALIDATION
                | wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        } else {
            wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        };

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags,
            ..Default::default()
        });

        let mut adapters = instance.enumerate_adapters(wgpu::Backends::PRIMARY);
        if adapters.is_empty() {
            return Err(GpuError::NoSuitableAdapter);
        }
        for a in &adapters {
            let info = a.get_info();
            info!(name = %info.name, backend = ?info.backend, device_type = ?info.device_type, "adapter found");
        }

        // Hardware first; a software rasterizer only as a last resort.
        let pos = adapters
            .iter()
            .position(|a| a.get_info().device_type != wgpu::DeviceType::Cpu)
            .unwrap_or(0);
        let adapter = adapters.swap_remove(pos);

        let raw_info = adapter.get_info();
        if raw_info.device_type == wgpu::DeviceType::Cpu {
            warn!(name = %raw_info.name, "only a software adapter is available");
        }
        let adapter_info = AdapterInfo {
            name: raw_info.name.clone(),
            vendor: raw_info.vendor,
            device: raw_info.device,
            device_type: raw_info.device_type,
            backend: raw_info.backend,
        };

        // V3D (Raspberry Pi) adapters always get the embedded profile.
        let profile = match profile {
            DeviceProfile::Native if raw_info.name.to_ascii_lowercase().contains("v3d") => {
                info!("V3D adapter detected, using Embedded profile");
                DeviceProfile::Embedded
            }
            other => other,
        };

        let limits = limits_for_profile(profile, &adapter.limits());

        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("stippler"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits.clone(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(GpuError::DeviceRequest)?;

        let workgroup_size = WorkgroupSize::for_profile(profile);
        info!(adapter = %adapter_info, %profile, workgroup = %workgroup_size, "gpu device ready");

        Ok(GpuDevice {
            device,
            queue,
            profile,
            adapter_info,
            workgroup_size,
            limits,
            _instance: instance,
        })
    }

    /// 2D workgroup size of the per-pixel kernels.
    pub fn workgroup_size(&self) -> WorkgroupSize {
        self.workgroup_size
    }

    /// Workgroups needed to cover a `img_w × img_h` grid. The shader must
    /// guard `gid.x >= width || gid.y >= height`.
    pub fn dispatch_size(&self, img_w: u32, img_h: u32) -> (u32, u32) {
        dispatch_2d(self.workgroup_size, img_w, img_h)
    }

    /// Workgroups needed to cover `n` items with [`LINEAR_WORKGROUP_SIZE`].
    pub fn dispatch_linear(&self, n: u32) -> u32 {
        n.div_ceil(LINEAR_WORKGROUP_SIZE)
    }

    /// Fail if a storage binding of `size` bytes exceeds the device limit.
    pub fn check_storage_size(&self, what: &'static str, size: u64) -> Result<(), GpuError> {
        let limit = self.limits.max_storage_buffer_binding_size as u64;
        if size > limit {
            return Err(GpuError::BufferTooLarge { what, size, limit });
        }
        Ok(())
    }

    /// Copy `size` bytes of `src` into a fresh staging buffer and block until
    /// they are readable on the CPU.
    ///
    /// This stalls until all previously submitted work has completed.
    pub fn read_buffer(&self, src: &wgpu::Buffer, size: u64) -> Result<Vec<u8>, GpuError> {
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("readback") });
        encoder.copy_buffer_to_buffer(src, 0, &staging, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |r| {
            // The receiver only disappears if this function already returned.
            let _ = tx.send(r);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv().map_err(|_| GpuError::ReadbackLost)??;

        let bytes = slice.get_mapped_range().to_vec();
        staging.unmap();
        Ok(bytes)
    }
}

impl fmt::Display for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GpuDevice {{ adapter: {}, profile: {}, workgroup: {} }}",
            self.adapter_info, self.profile, self.workgroup_size
        )
    }
}

fn dispatch_2d(ws: WorkgroupSize, img_w: u32, img_h: u32) -> (u32, u32) {
    (img_w.div_ceil(ws.x), img_h.div_ceil(ws.y))
}

// ============================================================
// Limits helpers
// ============================================================

/// Build wgpu limits for the given profile.
///
/// `Native` asks for the adapter's own storage binding size, since an index
/// map of a large frame outgrows the 128 MiB default.
fn limits_for_profile(profile: DeviceProfile, adapter: &wgpu::Limits) -> wgpu::Limits {
    match profile {
        DeviceProfile::Native => wgpu::Limits {
            max_storage_buffer_binding_size: adapter.max_storage_buffer_binding_size,
            max_buffer_size: adapter.max_buffer_size,
            ..wgpu::Limits::default()
        },
        DeviceProfile::Embedded => wgpu::Limits {
            max_compute_invocations_per_workgroup: 256,
            max_compute_workgroup_size_x: 256,
            max_compute_workgroup_size_y: 256,
            max_compute_workgroup_size_z: 64,
            max_texture_dimension_2d: 4096,
            max_storage_buffer_binding_size: 128 << 20,
            ..wgpu::Limits::default()
        },
    }
}

// ============================================================
// Error type
// ============================================================

/// Errors from GPU device initialization, configuration and readback.
#[derive(thiserror::Error, Debug)]
pub enum GpuError {
    #[error("no GPU adapter found (check that a Vulkan, Metal or DX12 driver is installed)")]
    NoSuitableAdapter,

    #[error("device request failed: {0}")]
    DeviceRequest(#[source] wgpu::RequestDeviceError),

    #[error("{what} needs {size} bytes, device storage binding limit is {limit}")]
    BufferTooLarge {
        what: &'static str,
        size: u64,
        limit: u64,
    },

    #[error("frame {width}×{height} exceeds device texture limit {limit}")]
    TextureTooLarge { width: u32, height: u32, limit: u32 },

    #[error("buffer readback failed: {0}")]
    Readback(#[from] wgpu::BufferAsyncError),

    #[error("buffer readback callback never fired")]
    ReadbackLost,
}

// ============================================================
// Tests
// ============================================================
