// benches/stipple_benchmarks.rs -- Per-stage and full-run benchmarks.
//
//   cargo bench --bench stipple_benchmarks
//
// CPU stages always run. The GPU group runs when an adapter is available;
// its timings include submit and the blocking readbacks that the controller
// pays every frame (reduce summary, render output).

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;

use stippler::assign;
use stippler::gpu::{GpuDevice, GpuStippleBackend};
use stippler::reference;
use stippler::{
    CpuBackend, Frame, LatestFrame, RenderMode, StageBackend, StaticFrame, StippleConfig, StipplePipeline,
    WeightMode,
};

// ============================================================
// Helpers
// ============================================================

/// Radial gradient with a few dark bars: enough structure that sites spread
/// unevenly, as they do on real footage.
fn make_scene(w: u32, h: u32) -> Frame {
    Frame::from_fn(w, h, |x, y| {
        let dx = x as f32 / w as f32 - 0.5;
        let dy = y as f32 / h as f32 - 0.5;
        let mut v = (dx * dx + dy * dy).sqrt() * 1.4;
        if (x / 40) % 3 == 0 && y > h / 4 && y < 3 * h / 4 {
            v *= 0.3;
        }
        [v.min(1.0), v.min(1.0), v.min(1.0)]
    })
}

fn run_stages(b: &mut dyn StageBackend, frame: &Frame) {
    b.clear_accumulators().unwrap();
    b.assign(frame).unwrap();
    b.reduce().unwrap();
    b.render(frame).unwrap();
}

// ============================================================
// CPU per-stage
// ============================================================

fn bench_cpu_stages(c: &mut Criterion) {
    let frame = make_scene(640, 480);
    let config = StippleConfig::for_frame(640, 480);

    let mut group = c.benchmark_group("cpu_stages");
    group.bench_function("weight_map_640x480", |b| {
        b.iter(|| frame.weight_map(WeightMode::Darkness))
    });

    let mut backend = CpuBackend::new(&config).unwrap();
    group.bench_function("assign_640x480_2000", |b| {
        b.iter(|| {
            backend.clear_accumulators().unwrap();
            backend.assign(&frame).unwrap();
        })
    });
    group.bench_function("reduce_2000", |b| b.iter(|| backend.reduce().unwrap()));
    group.bench_function("render_640x480_2000", |b| b.iter(|| backend.render(&frame).unwrap()));

    let positions = backend.snapshot().unwrap().positions;
    group.bench_function("nearest_site_linear_2000", |b| {
        b.iter(|| assign::nearest_site(&positions, 320.0, 240.0))
    });
    group.finish();
}

// ============================================================
// Full run vs site count
// ============================================================

fn bench_site_count(c: &mut Criterion) {
    let frame = make_scene(320, 240);

    let mut group = c.benchmark_group("cpu_run_320x240");
    for sites in [250u32, 1000, 4000] {
        let config = StippleConfig {
            site_count: sites,
            ..StippleConfig::for_frame(320, 240)
        };
        let mut backend = CpuBackend::new(&config).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(sites), &frame, |b, f| {
            b.iter(|| run_stages(&mut backend, f))
        });
    }
    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let frame = make_scene(640, 480);
    let config = StippleConfig {
        render_mode: RenderMode::Passthrough,
        ..StippleConfig::for_frame(640, 480)
    };
    let backend = CpuBackend::new(&config).unwrap();
    let mut pipeline = StipplePipeline::new(backend, StaticFrame::new(frame), LatestFrame::new());
    let trigger = pipeline.trigger_handle();

    c.bench_function("pipeline_cpu_640x480_passthrough", |b| {
        b.iter(|| {
            trigger.force_frame();
            pipeline.run_pending().unwrap()
        })
    });
}

fn bench_reference(c: &mut Criterion) {
    let weights = make_scene(160, 120).weight_map(WeightMode::Darkness);
    let initial = stippler::rng::seed_positions("42", 200, 160, 120);
    let initial: Vec<[f64; 2]> = initial.iter().map(|p| [p[0] as f64, p[1] as f64]).collect();

    c.bench_function("reference_lloyd_step_160x120_200", |b| {
        b.iter(|| reference::lloyd_step(&weights, &initial))
    });
}

// ============================================================
// CPU vs GPU
// ============================================================

fn bench_gpu(c: &mut Criterion) {
    let Ok(gpu) = GpuDevice::new() else {
        eprintln!("no GPU adapter, skipping gpu benchmarks");
        return;
    };
    let frame = make_scene(640, 480);
    let config = StippleConfig::for_frame(640, 480);
    let mut gpu_backend = GpuStippleBackend::new(gpu, &config).unwrap();
    let mut cpu_backend = CpuBackend::new(&config).unwrap();

    let mut group = c.benchmark_group("run_640x480_2000");
    group.warm_up_time(Duration::from_secs(2));
    group.bench_function("cpu", |b| b.iter(|| run_stages(&mut cpu_backend, &frame)));
    group.bench_function("gpu", |b| b.iter(|| run_stages(&mut gpu_backend, &frame)));
    group.finish();
}

// ============================================================
// Register
// ============================================================

criterion_group!(
    benches,
    bench_cpu_stages,
    bench_site_count,
    bench_pipeline,
    bench_reference,
    bench_gpu,
);
criterion_main!(benches);
