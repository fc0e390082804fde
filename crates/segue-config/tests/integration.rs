//! Integration tests for segue-config.
//!
//! Settings files on disk driving a live reconciler.

use segue_config::{ConfigError, EngineSettings, ValidationError, find_settings};
use segue_core::{
    EngineState, EngineTarget, InstrumentChange, ParamKind, ParamSlot, PerformanceChange,
    initialize,
};
use tempfile::TempDir;

#[derive(Default)]
struct Probe {
    prepared: Option<(f64, usize)>,
    values: Vec<(ParamSlot, f32)>,
}

impl EngineTarget for Probe {
    fn prepare(&mut self, sample_rate: f64, max_block_size: usize) {
        self.prepared = Some((sample_rate, max_block_size));
    }
    fn swap_instrument(&mut self, _change: &InstrumentChange) {}
    fn apply_performance(&mut self, _change: &PerformanceChange) {}
    fn set_parameter(&mut self, slot: ParamSlot, value: f32) {
        self.values.push((slot, value));
    }
    fn render(&mut self, _frames: usize) {}
}

#[test]
fn test_settings_save_load_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("engine.toml");

    let settings = EngineSettings::new()
        .with_sample_rate(44100)
        .with_parameter("filter.cutoff", ParamKind::Frequency)
        .with_parameter("master.gain", ParamKind::Gain);
    settings.save(&path).unwrap();

    let loaded = EngineSettings::load(&path).unwrap();
    assert_eq!(loaded, settings);
}

#[test]
fn test_load_or_default_without_file() {
    let dir = TempDir::new().unwrap();
    let settings = EngineSettings::load_or_default(dir.path().join("missing.toml")).unwrap();
    assert_eq!(settings, EngineSettings::default());
}

#[test]
fn test_load_reports_path_on_missing_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing.toml");
    let err = EngineSettings::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::ReadFile { .. }));
    assert!(err.to_string().contains("missing.toml"));
}

#[test]
fn test_find_settings_in_search_paths() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("studio.toml");
    EngineSettings::default().save(&path).unwrap();

    assert_eq!(find_settings(path.to_str().unwrap()), Some(path.clone()));
    let absent = dir.path().join("absent.toml");
    assert_eq!(find_settings(absent.to_str().unwrap()), None);
}

#[test]
fn test_invalid_file_is_rejected_before_engine_start() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("engine.toml");
    std::fs::write(&path, "sample_rate = 1000\nmax_block_size = 0\n").unwrap();

    let settings = EngineSettings::load(&path).unwrap();
    match settings.to_config() {
        Err(ConfigError::Validation(ValidationError::Multiple(errors))) => {
            assert_eq!(errors.len(), 2);
        }
        other => panic!("expected validation errors, got {other:?}"),
    }
}

#[test]
fn test_settings_file_drives_reconciler() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("engine.toml");
    std::fs::write(
        &path,
        r#"
        sample_rate = 48000
        max_block_size = 256

        [queue]
        capacity = 4

        [[parameter]]
        path = "osc1.pitch"
        kind = "frequency"
        "#,
    )
    .unwrap();

    let settings = EngineSettings::load(&path).unwrap();
    let (mut control, mut audio) =
        initialize(Probe::default(), settings.to_config().unwrap()).unwrap();
    assert_eq!(settings.register_parameters(control.registry_mut()).unwrap(), 1);
    assert_eq!(audio.target().prepared, Some((48000.0, 256)));

    let slot = control.registry().slot("osc1.pitch").unwrap();
    assert_eq!(control.registry().kind(slot), Some(ParamKind::Frequency));

    // 10 ms at 48 kHz is 480 samples.
    let before = EngineState::new().with_parameter("osc1.pitch", 100.0, 0.01);
    let after = EngineState::new().with_parameter("osc1.pitch", 400.0, 0.01);
    assert!(control.apply_diff(&control.compute_diff(&before, &after)).unwrap());

    audio.process(240);
    let midway = audio.current_value(slot).unwrap();
    assert!(midway > 100.0 && midway < 250.0, "exponential ramp should lag linear: {midway}");

    audio.process(240);
    audio.process(1);
    assert_eq!(audio.committed_value(slot), Some(400.0));
    assert!(!audio.is_ramping(slot));
}

#[test]
fn test_queue_capacity_from_settings_limits_submissions() {
    let mut settings = EngineSettings::default();
    settings.queue.capacity = 1;
    let (mut control, _audio) =
        initialize(Probe::default(), settings.to_config().unwrap()).unwrap();

    let a = EngineState::new().with_performance("a");
    let b = EngineState::new().with_performance("b");
    let c = EngineState::new().with_performance("c");
    assert!(control.apply_diff(&control.compute_diff(&a, &b)).unwrap());
    assert!(!control.apply_diff(&control.compute_diff(&b, &c)).unwrap());
}
