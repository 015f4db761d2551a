// gpu/mod.rs — wgpu compute backend.
//
// The same three stages as the CPU backend, one compute kernel each:
//
//   clear   → clear_buffer on accumulators and the global max
//   assign  → assign.wgsl   one invocation per pixel
//   reduce  → reduce.wgsl   one invocation per site
//   render  → render.wgsl   one invocation per pixel
//
// Site state stays resident on the device between frames. The host only
// uploads the frame (weight codes, plus color for passthrough rendering) and
// reads back the rendered image. The CPU backend is the reference: the GPU
// kernels use the same fixed-point contributions and the same rounding, so
// the partition and the integer accumulators match it exactly.

pub mod device;
pub mod frame;
pub mod stipple;

pub use device::{DeviceProfile, GpuDevice, GpuError};
pub use stipple::GpuStippleBackend;
