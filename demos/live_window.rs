// demos/live_window.rs
//
// Live stippling of a synthetic animation in a minifb window. Every window
// refresh delivers a frame-ready trigger; with `DropWhileBusy`
// backpressure a slow backend simply skips refreshes.
//
// Usage:
//   cargo run --example live_window --release
//   cargo run --example live_window --release -- gpu 4000
//   cargo run --example live_window --release -- cpu 2000 refresh
//
// Controls:
//   P      — pause/resume automatic frame-ready triggers
//   Space  — force one frame (works while paused)
//   Q/Esc  — quit

use std::env;
use std::io::Write;
use std::time::{Duration, Instant};

use minifb::{Key, KeyRepeat, Window, WindowOptions};
use tracing_subscriber::EnvFilter;

use stippler::{
    create_backend, BackendKind, Backpressure, FnSource, Frame, IndexMapPolicy, LatestFrame, RunOutcome,
    StippleConfig, StipplePipeline,
};

const WIDTH: u32 = 480;
const HEIGHT: u32 = 360;

/// Two dark blobs orbiting on a light background.
fn blobs_frame(t: f32) -> Frame {
    let (w, h) = (WIDTH as f32, HEIGHT as f32);
    let centers = [
        (w * (0.5 + 0.25 * t.cos()), h * (0.5 + 0.25 * t.sin()), 70.0),
        (w * (0.5 - 0.3 * (0.7 * t).cos()), h * (0.5 + 0.2 * (1.3 * t).sin()), 45.0),
    ];
    Frame::from_fn(WIDTH, HEIGHT, |x, y| {
        let mut dark = 0.0f32;
        for &(cx, cy, r) in &centers {
            let d2 = (x as f32 - cx).powi(2) + (y as f32 - cy).powi(2);
            dark += (-d2 / (2.0 * r * r)).exp();
        }
        let v = 1.0 - dark.min(1.0) * 0.9;
        [v, v, v * 0.95]
    })
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    let kind = match args.get(1).map(String::as_str) {
        Some("gpu") => BackendKind::Gpu,
        _ => BackendKind::Cpu,
    };
    let sites: u32 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(2000);

    let index_map_policy = match args.get(3).map(String::as_str) {
        Some("refresh") => IndexMapPolicy::Refreshed,
        _ => IndexMapPolicy::Lagged,
    };

    let config = StippleConfig {
        site_count: sites,
        backpressure: Backpressure::DropWhileBusy,
        index_map_policy,
        ..StippleConfig::for_frame(WIDTH, HEIGHT)
    };
    let backend = create_backend(kind, &config)?;
    println!("Backend: {} ({} sites, {}×{})", backend.name(), sites, WIDTH, HEIGHT);

    let start = Instant::now();
    let source = FnSource::new(move || Ok(blobs_frame(start.elapsed().as_secs_f32() * 0.6)));
    let mut pipeline = StipplePipeline::new(backend, source, LatestFrame::new());
    let trigger = pipeline.trigger_handle();

    let mut window = Window::new(
        "stippler — live",
        WIDTH as usize,
        HEIGHT as usize,
        WindowOptions::default(),
    )?;
    window.set_target_fps(60);

    let mut fb = vec![0u32; (WIDTH * HEIGHT) as usize];
    let mut paused = false;
    let mut last_report = Instant::now();
    let mut runs = 0u32;

    println!("\nControls: P=pause, Space=force frame, Q/Esc=quit\n");

    while window.is_open() && !window.is_key_down(Key::Escape) && !window.is_key_down(Key::Q) {
        if window.is_key_pressed(Key::P, KeyRepeat::No) {
            paused = !paused;
            println!("{}", if paused { "Paused" } else { "Resumed" });
        }
        if window.is_key_pressed(Key::Space, KeyRepeat::No) {
            trigger.force_frame();
        }
        if !paused {
            trigger.frame_ready();
        }

        match pipeline.wait_and_run(Duration::from_millis(1))? {
            RunOutcome::Completed(_) => runs += 1,
            RunOutcome::Halted => break,
            RunOutcome::Skipped { .. } | RunOutcome::NoTrigger => {}
        }

        if let Some(img) = pipeline.surface().latest() {
            for (dst, px) in fb.iter_mut().zip(img.pixels()) {
                let [r, g, b, _] = px.0;
                *dst = (r as u32) << 16 | (g as u32) << 8 | b as u32;
            }
        }
        window.update_with_buffer(&fb, WIDTH as usize, HEIGHT as usize)?;

        if last_report.elapsed() >= Duration::from_secs(1) {
            let stats = pipeline.stats();
            print!(
                "\r{:3} runs/s | total {:6} | dropped {:6}  ",
                runs, stats.runs_completed, stats.triggers_dropped
            );
            std::io::stdout().flush().ok();
            runs = 0;
            last_report = Instant::now();
        }
    }
    println!();
    Ok(())
}
