//! Reconcile demo: a control thread editing a running engine.
//!
//! Run with: RUST_LOG=debug cargo run -p segue-core --example reconcile_demo

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use segue_core::{
    EngineState, EngineTarget, InstrumentChange, ParamKind, ParamSlot, PerformanceChange,
    ReconcilerConfig, Submission, initialize,
};
use tracing_subscriber::EnvFilter;

/// Stand-in engine that tracks what it was told to do.
#[derive(Default)]
struct ToyEngine {
    performance: String,
    pitch: f32,
    frames: usize,
}

impl EngineTarget for ToyEngine {
    fn prepare(&mut self, sample_rate: f64, max_block_size: usize) {
        println!("prepare: {sample_rate} Hz, blocks up to {max_block_size} frames");
    }

    fn swap_instrument(&mut self, _change: &InstrumentChange) {}

    fn apply_performance(&mut self, change: &PerformanceChange) {
        self.performance.clone_from(&change.new_performance_id);
    }

    fn set_parameter(&mut self, _slot: ParamSlot, value: f32) {
        self.pitch = value;
    }

    fn render(&mut self, frames: usize) {
        self.frames += frames;
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ReconcilerConfig::new(48000.0).with_queue_capacity(4);
    let (mut control, mut audio) = match initialize(ToyEngine::default(), config) {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("failed to initialize: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = control.register_parameter("osc1.pitch", ParamKind::Frequency) {
        eprintln!("failed to register parameter: {e}");
        std::process::exit(1);
    }
    control.rebase(
        EngineState::new()
            .with_performance("piano")
            .with_parameter("osc1.pitch", 220.0, 0.05),
    );

    // --- Audio thread: 256-frame blocks at roughly real-time pace ---
    let running = Arc::new(AtomicBool::new(true));
    let audio_thread = {
        let running = Arc::clone(&running);
        thread::spawn(move || {
            while running.load(Ordering::Acquire) {
                audio.process(256);
                thread::sleep(Duration::from_micros(5333));
            }
            audio
        })
    };

    // --- Control thread: a burst of edits ---
    let edits = [
        ("piano", 330.0),
        ("techno", 440.0),
        ("techno", 550.0),
        ("ambient", 660.0),
        ("ambient", 880.0),
    ];
    for (performance, pitch) in edits {
        let state = EngineState::new()
            .with_performance(performance)
            .with_parameter("osc1.pitch", pitch, 0.05);
        match control.submit_state(state) {
            Ok(Submission::Applied(n)) => {
                println!("{performance} @ {pitch} Hz: {n} change(s) sent")
            }
            Ok(Submission::NoChange) => println!("{performance} @ {pitch} Hz: nothing to send"),
            Ok(Submission::Deferred) => println!("{performance} @ {pitch} Hz: deferred"),
            Err(e) => eprintln!("rejected: {e}"),
        }
    }

    while control.has_deferred() || control.has_pending_changes() {
        if let Err(e) = control.flush() {
            eprintln!("flush failed: {e}");
            break;
        }
        thread::sleep(Duration::from_millis(1));
    }

    // Let the last ramp finish.
    thread::sleep(Duration::from_millis(100));
    running.store(false, Ordering::Release);
    let Ok(audio) = audio_thread.join() else {
        eprintln!("audio thread panicked");
        std::process::exit(1);
    };

    let engine = audio.target();
    println!(
        "\nengine: performance '{}', pitch {:.1} Hz after {} frames",
        engine.performance, engine.pitch, engine.frames
    );
    println!("{:#?}", control.stats());
    println!("{:?}", control.pool());
}
