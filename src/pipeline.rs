// pipeline.rs — Frame pipeline controller.
//
// STATE MACHINE
// ─────────────
//
//            trigger + frame acquired
//   ┌──────┐ ────────────────────────▶ ┌───────────┐ clear+assign ┌──────────┐
//   │ Idle │                           │ Assigning │ ───────────▶ │ Reducing │
//   └──────┘ ◀──────────────┐          └───────────┘              └──────────┘
//       ▲    frame error    │                                          │ reduce
//       │   (skip, stay)    │          ┌───────────┐                   │ committed
//       └───────────────────┴───────── │ Rendering │ ◀─────────────────┘
//            presented (or present     └───────────┘
//            failure, counted)
//
// A stage error is fatal: it is returned once, the controller moves to
// `Faulted`, and every later call returns `RunOutcome::Halted`.
//
// TRIGGERS
// ────────
// Triggers arrive from any thread through a cloneable `TriggerHandle` and
// wait in a small inbox (a `Mutex<VecDeque>` + `Condvar`). The controller
// itself runs on one thread and pulls at most one trigger per run. The
// inbox lock is never held while a stage runs.
//
//   Backpressure::Queue          up to `queue_depth` pending, overflow drops
//                                the oldest pending trigger
//   Backpressure::DropWhileBusy  triggers arriving during a run (or while
//                                one is already pending) are dropped

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info_span, trace, warn};

use crate::backend::StageBackend;
use crate::config::{Backpressure, IndexMapPolicy};
use crate::error::{FrameError, StageError};
use crate::frame::Frame;
use crate::source::FrameSource;
use crate::surface::Surface;

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Idle,
    Assigning,
    Reducing,
    Rendering,
    /// A stage failed. No further runs.
    Faulted,
}

/// Where a trigger came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    /// The frame source signalled a new frame.
    FrameReady,
    /// `force_frame()`.
    Manual,
}

/// What happened to a trigger when it was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The next run will serve this trigger.
    Accepted,
    /// Waiting behind a run in flight or other pending triggers.
    Queued,
    /// Queued, and the oldest pending trigger was discarded to make room.
    Superseded,
    /// Discarded without being queued.
    Dropped,
}

#[derive(Debug, Clone, Copy)]
struct Trigger {
    kind: TriggerKind,
    seq: u64,
}

struct Inbox {
    pending: Mutex<VecDeque<Trigger>>,
    ready: Condvar,
    busy: AtomicBool,
    halted: AtomicBool,
    next_seq: AtomicU64,
    dropped: AtomicU64,
    superseded: AtomicU64,
    backpressure: Backpressure,
    depth: usize,
}

impl Inbox {
    fn new(backpressure: Backpressure, depth: usize) -> Self {
        Inbox {
            pending: Mutex::new(VecDeque::with_capacity(depth)),
            ready: Condvar::new(),
            busy: AtomicBool::new(false),
            halted: AtomicBool::new(false),
            next_seq: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            superseded: AtomicU64::new(0),
            backpressure,
            depth: depth.max(1),
        }
    }

    fn deliver(&self, kind: TriggerKind) -> TriggerOutcome {
        // `halt` clears the queue under this lock, so check the flag while holding it.
        let mut pending = self.pending.lock();
        if self.halted.load(Ordering::Acquire) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return TriggerOutcome::Dropped;
        }
        let busy = self.busy.load(Ordering::Acquire);
        let outcome = match self.backpressure {
            Backpressure::DropWhileBusy if busy || !pending.is_empty() => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return TriggerOutcome::Dropped;
            }
            Backpressure::DropWhileBusy => TriggerOutcome::Accepted,
            Backpressure::Queue if pending.len() >= self.depth => {
                pending.pop_front();
                self.superseded.fetch_add(1, Ordering::Relaxed);
                TriggerOutcome::Superseded
            }
            Backpressure::Queue if busy || !pending.is_empty() => TriggerOutcome::Queued,
            Backpressure::Queue => TriggerOutcome::Accepted,
        };
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        pending.push_back(Trigger { kind, seq });
        drop(pending);
        self.ready.notify_one();
        outcome
    }

    /// Take the oldest pending trigger and mark the controller busy.
    fn take(&self) -> Option<Trigger> {
        let mut pending = self.pending.lock();
        let t = pending.pop_front();
        if t.is_some() {
            self.busy.store(true, Ordering::Release);
        }
        t
    }

    fn take_timeout(&self, timeout: Duration) -> Option<Trigger> {
        let mut pending = self.pending.lock();
        self.ready.wait_while_for(&mut pending, |q| q.is_empty(), timeout);
        let t = pending.pop_front();
        if t.is_some() {
            self.busy.store(true, Ordering::Release);
        }
        t
    }

    fn finish(&self) {
        self.busy.store(false, Ordering::Release);
    }

    fn halt(&self) {
        let mut pending = self.pending.lock();
        self.halted.store(true, Ordering::Release);
        self.dropped.fetch_add(pending.len() as u64, Ordering::Relaxed);
        pending.clear();
    }

    fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }
}

/// Cloneable, thread-safe trigger sender for one pipeline.
#[derive(Clone)]
pub struct TriggerHandle {
    inbox: Arc<Inbox>,
}

impl TriggerHandle {
    /// The frame source has a new frame.
    pub fn frame_ready(&self) -> TriggerOutcome {
        self.inbox.deliver(TriggerKind::FrameReady)
    }

    /// Request a run regardless of the source's cadence.
    pub fn force_frame(&self) -> TriggerOutcome {
        self.inbox.deliver(TriggerKind::Manual)
    }

    /// Whether a run is in flight right now.
    pub fn is_busy(&self) -> bool {
        self.inbox.busy.load(Ordering::Acquire)
    }

    pub fn pending(&self) -> usize {
        self.inbox.pending_len()
    }
}

/// Wall time spent in each stage of one run.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StageTimings {
    pub acquire: Duration,
    pub clear: Duration,
    pub assign: Duration,
    pub reduce: Duration,
    /// Only with `IndexMapPolicy::Refreshed`.
    pub refresh: Option<Duration>,
    pub render: Duration,
    pub present: Duration,
}

impl StageTimings {
    pub fn total(&self) -> Duration {
        self.acquire
            + self.clear
            + self.assign
            + self.reduce
            + self.refresh.unwrap_or_default()
            + self.render
            + self.present
    }
}

/// Summary of one completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub seq: u64,
    pub trigger: TriggerKind,
    pub timings: StageTimings,
    pub active_sites: usize,
    pub global_max: f32,
    /// `false` when the surface rejected the image.
    pub presented: bool,
}

/// Result of one call to `run_pending` / `wait_and_run`.
#[derive(Debug)]
pub enum RunOutcome {
    /// All stages ran and the output went to the surface.
    Completed(FrameReport),
    /// The source had no usable frame; no stage ran.
    Skipped {
        seq: u64,
        trigger: TriggerKind,
        error: FrameError,
    },
    /// Nothing was pending.
    NoTrigger,
    /// The controller faulted earlier and no longer runs.
    Halted,
}

/// Lifetime counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineStats {
    pub runs_completed: u64,
    pub frames_skipped: u64,
    pub present_failures: u64,
    pub triggers_dropped: u64,
    pub triggers_superseded: u64,
}

type StateObserver = Box<dyn FnMut(PipelineState, PipelineState) + Send>;

/// Sequences the stages of a backend once per trigger.
pub struct StipplePipeline<B, S, O> {
    backend: B,
    source: S,
    surface: O,
    inbox: Arc<Inbox>,
    policy: IndexMapPolicy,
    state: PipelineState,
    stats: PipelineStats,
    observer: Option<StateObserver>,
}

impl<B, S, O> StipplePipeline<B, S, O>
where
    B: StageBackend,
    S: FrameSource,
    O: Surface,
{
    /// Wire a backend to a source and a surface. Backpressure, queue depth
    /// and the index-map policy come from the backend's config.
    pub fn new(backend: B, source: S, surface: O) -> Self {
        let cfg = backend.config();
        let inbox = Arc::new(Inbox::new(cfg.backpressure, cfg.queue_depth));
        let policy = cfg.index_map_policy;
        StipplePipeline {
            backend,
            source,
            surface,
            inbox,
            policy,
            state: PipelineState::Idle,
            stats: PipelineStats::default(),
            observer: None,
        }
    }

    pub fn trigger_handle(&self) -> TriggerHandle {
        TriggerHandle {
            inbox: Arc::clone(&self.inbox),
        }
    }

    /// Called with `(from, to)` on every state change.
    pub fn set_state_observer(&mut self, f: impl FnMut(PipelineState, PipelineState) + Send + 'static) {
        self.observer = Some(Box::new(f));
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn is_halted(&self) -> bool {
        self.state == PipelineState::Faulted
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            triggers_dropped: self.inbox.dropped.load(Ordering::Relaxed),
            triggers_superseded: self.inbox.superseded.load(Ordering::Relaxed),
            ..self.stats
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn surface(&self) -> &O {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut O {
        &mut self.surface
    }

    /// Serve one pending trigger, if any.
    pub fn run_pending(&mut self) -> Result<RunOutcome, StageError> {
        if self.is_halted() {
            return Ok(RunOutcome::Halted);
        }
        match self.inbox.take() {
            Some(t) => self.execute(t),
            None => Ok(RunOutcome::NoTrigger),
        }
    }

    /// Block up to `timeout` for a trigger, then serve it.
    pub fn wait_and_run(&mut self, timeout: Duration) -> Result<RunOutcome, StageError> {
        if self.is_halted() {
            return Ok(RunOutcome::Halted);
        }
        match self.inbox.take_timeout(timeout) {
            Some(t) => self.execute(t),
            None => Ok(RunOutcome::NoTrigger),
        }
    }

    fn transition(&mut self, to: PipelineState) {
        let from = self.state;
        if from == to {
            return;
        }
        trace!(?from, ?to, "pipeline state");
        self.state = to;
        if let Some(f) = self.observer.as_mut() {
            f(from, to);
        }
    }

    fn execute(&mut self, trigger: Trigger) -> Result<RunOutcome, StageError> {
        let span = info_span!("stipple_run", seq = trigger.seq, trigger = ?trigger.kind, backend = self.backend.name());
        let _enter = span.enter();

        let t0 = Instant::now();
        let frame = match self.acquire() {
            Ok(frame) => frame,
            Err(error) => {
                warn!(%error, "frame skipped");
                self.stats.frames_skipped += 1;
                self.inbox.finish();
                return Ok(RunOutcome::Skipped {
                    seq: trigger.seq,
                    trigger: trigger.kind,
                    error,
                });
            }
        };
        let acquire = t0.elapsed();

        match self.run_stages(&frame) {
            Ok((mut timings, active_sites, global_max, image)) => {
                timings.acquire = acquire;
                let t = Instant::now();
                let presented = match self.surface.present(&image) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(error = %e, "present failed");
                        self.stats.present_failures += 1;
                        false
                    }
                };
                timings.present = t.elapsed();
                self.transition(PipelineState::Idle);
                self.stats.runs_completed += 1;
                self.inbox.finish();
                debug!(
                    total_ms = timings.total().as_secs_f64() * 1e3,
                    assign_ms = timings.assign.as_secs_f64() * 1e3,
                    render_ms = timings.render.as_secs_f64() * 1e3,
                    active_sites,
                    global_max,
                    "run complete"
                );
                Ok(RunOutcome::Completed(FrameReport {
                    seq: trigger.seq,
                    trigger: trigger.kind,
                    timings,
                    active_sites,
                    global_max,
                    presented,
                }))
            }
            Err(e) => {
                error!(error = %e, state = ?self.state, "stage failed, pipeline halted");
                self.transition(PipelineState::Faulted);
                self.inbox.halt();
                self.inbox.finish();
                Err(e)
            }
        }
    }

    fn acquire(&mut self) -> Result<Frame, FrameError> {
        let frame = self.source.acquire()?;
        let cfg = self.backend.config();
        frame.check_dimensions(cfg.width, cfg.height)?;
        Ok(frame)
    }

    fn run_stages(
        &mut self,
        frame: &Frame,
    ) -> Result<(StageTimings, usize, f32, image::RgbaImage), StageError> {
        let mut timings = StageTimings::default();

        self.transition(PipelineState::Assigning);
        let t = Instant::now();
        self.backend.clear_accumulators()?;
        timings.clear = t.elapsed();
        let t = Instant::now();
        self.backend.assign(frame)?;
        timings.assign = t.elapsed();

        self.transition(PipelineState::Reducing);
        let t = Instant::now();
        let summary = self.backend.reduce()?;
        timings.reduce = t.elapsed();
        if self.policy == IndexMapPolicy::Refreshed {
            let t = Instant::now();
            self.backend.refresh_index_map()?;
            timings.refresh = Some(t.elapsed());
        }

        self.transition(PipelineState::Rendering);
        let t = Instant::now();
        let image = self.backend.render(frame)?;
        timings.render = t.elapsed();

        Ok((timings, summary.active_sites, summary.global_max, image))
    }
}
