use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use mixref::{Engine, EngineError, LoopRegion, SlotStatus, TrackSlot, TransportPhase};

fn make_temp_dir(tag: &str) -> PathBuf {
    static NEXT_ID: AtomicU64 = AtomicU64::new(1);
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let mut dir = std::env::temp_dir();
    dir.push(format!(
        "mixref_transport_{tag}_{}_{}_{}",
        std::process::id(),
        now_ms,
        seq
    ));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn sine_wav_bytes(tag: &str, secs: f32, sample_rate: u32) -> Vec<u8> {
    let dir = make_temp_dir(tag);
    let path = dir.join("fixture.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).expect("create wav");
    let frames = (secs * sample_rate as f32).round() as usize;
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let v = (0.5 * (2.0 * std::f32::consts::PI * 220.0 * t).sin() * i16::MAX as f32) as i16;
        writer.write_sample(v).expect("write sample");
    }
    writer.finalize().expect("finalize wav");
    std::fs::read(&path).expect("read wav bytes")
}

fn wait_for_slot(engine: &mut Engine, slot: TrackSlot) -> SlotStatus {
    let start = Instant::now();
    loop {
        engine.tick(0.0);
        match engine.slot_status(slot) {
            SlotStatus::Ready => return SlotStatus::Ready,
            SlotStatus::Failed(e) => return SlotStatus::Failed(e.clone()),
            _ => {}
        }
        if start.elapsed() > Duration::from_secs(10) {
            panic!("decode timeout for {slot:?}");
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn engine_with_both(secs_master: f32, secs_reference: f32, sample_rate: u32) -> Engine {
    let mut engine = Engine::headless(sample_rate);
    engine
        .upload_file(
            TrackSlot::Master,
            sine_wav_bytes("master", secs_master, sample_rate),
            "audio/wav",
        )
        .expect("upload master");
    engine
        .upload_file(
            TrackSlot::Reference,
            sine_wav_bytes("reference", secs_reference, sample_rate),
            "audio/wav",
        )
        .expect("upload reference");
    assert_eq!(wait_for_slot(&mut engine, TrackSlot::Master), SlotStatus::Ready);
    assert_eq!(
        wait_for_slot(&mut engine, TrackSlot::Reference),
        SlotStatus::Ready
    );
    engine
}

#[test]
fn png_upload_is_rejected_before_decode() {
    let mut engine = Engine::headless(8_000);
    let err = engine
        .upload_file(TrackSlot::Master, vec![0x89, 0x50, 0x4E, 0x47], "image/png")
        .unwrap_err();
    assert!(matches!(err, EngineError::UnsupportedFormat(_)));
    assert_eq!(*engine.slot_status(TrackSlot::Master), SlotStatus::Empty);
}

#[test]
fn malformed_payload_fails_only_its_slot() {
    let mut engine = Engine::headless(8_000);
    engine
        .upload_file(
            TrackSlot::Master,
            sine_wav_bytes("good", 1.0, 8_000),
            "audio/wav",
        )
        .expect("upload master");
    let junk: Vec<u8> = (0..2048).map(|i| (i * 17 % 253) as u8).collect();
    engine
        .upload_file(TrackSlot::Reference, junk, "audio/mpeg")
        .expect("declared type is fine; the payload is not");
    assert_eq!(wait_for_slot(&mut engine, TrackSlot::Master), SlotStatus::Ready);
    assert!(matches!(
        wait_for_slot(&mut engine, TrackSlot::Reference),
        SlotStatus::Failed(_)
    ));
    // The healthy slot still serves analysis.
    assert!(engine.waveform(TrackSlot::Master, 64).is_ok());
    assert_eq!(engine.phase(), TransportPhase::Idle);
}

#[test]
fn failed_replacement_of_the_active_slot_pauses_the_transport() {
    let mut engine = engine_with_both(4.0, 4.0, 8_000);
    engine.play();
    engine.tick(0.05);
    assert!(engine.transport().playing);
    let junk: Vec<u8> = (0..2048).map(|i| (i * 17 % 253) as u8).collect();
    engine
        .upload_file(TrackSlot::Master, junk, "audio/wav")
        .expect("declared type is fine; the payload is not");
    // Replacement is atomic-on-completion: the old track stays audible while
    // the decode runs.
    assert!(engine.transport().playing);
    assert!(matches!(
        wait_for_slot(&mut engine, TrackSlot::Master),
        SlotStatus::Failed(_)
    ));
    let t = engine.transport();
    assert!(!t.playing, "a slot without a track cannot be playing");
    assert_eq!(t.position, 0.0);
    assert_eq!(engine.phase(), TransportPhase::Idle);
    assert!(matches!(
        engine.waveform(TrackSlot::Master, 64),
        Err(EngineError::AnalysisUnavailable(TrackSlot::Master))
    ));
    // The clock must not creep once the audible track is gone.
    let report = engine.tick(0.05);
    assert!(!report.playing);
    assert_eq!(report.position, 0.0);
}

#[test]
fn play_is_a_no_op_until_both_slots_are_ready() {
    let mut engine = Engine::headless(8_000);
    engine
        .upload_file(
            TrackSlot::Master,
            sine_wav_bytes("solo", 1.0, 8_000),
            "audio/wav",
        )
        .expect("upload master");
    wait_for_slot(&mut engine, TrackSlot::Master);
    engine.play();
    assert!(!engine.transport().playing);
    assert_eq!(engine.phase(), TransportPhase::Idle);
}

#[test]
fn scenario_a_duration_warning_cites_two_seconds() {
    let mut engine = engine_with_both(5.0, 7.0, 44_100);
    let warning = engine.duration_warning().expect("expected a warning");
    assert!(warning.contains("2 seconds"), "got: {warning}");
    engine.tick(0.0);
    // Advisory only: playback still works.
    engine.play();
    assert!(engine.transport().playing);
}

#[test]
fn close_durations_produce_no_warning() {
    let engine = engine_with_both(5.0, 5.5, 8_000);
    assert_eq!(engine.duration_warning(), None);
}

#[test]
fn pause_is_idempotent() {
    let mut engine = engine_with_both(2.0, 2.0, 8_000);
    engine.play();
    engine.tick(0.25);
    engine.pause();
    let frozen = engine.transport();
    engine.pause();
    assert_eq!(engine.transport(), frozen);
    engine.tick(0.25);
    assert_eq!(engine.transport(), frozen);
}

#[test]
fn switch_keeps_position_and_phase() {
    let mut engine = engine_with_both(4.0, 4.0, 8_000);
    engine.play();
    for _ in 0..10 {
        engine.tick(0.05);
    }
    let before = engine.transport();
    assert!(before.playing);
    assert_eq!(before.active, TrackSlot::Master);
    engine.switch_active();
    let after = engine.transport();
    assert_eq!(after.active, TrackSlot::Reference);
    assert!(after.playing);
    assert!((after.position - before.position).abs() <= 0.05 + 1e-4);
    // Switching back is symmetric.
    engine.switch_active();
    assert_eq!(engine.transport().active, TrackSlot::Master);
    assert!(engine.transport().playing);
}

#[test]
fn seek_clamps_to_the_active_track() {
    let mut engine = engine_with_both(2.0, 5.0, 8_000);
    engine.seek(999.0);
    assert!((engine.transport().position - 2.0).abs() < 1e-3);
    engine.seek(-3.0);
    assert_eq!(engine.transport().position, 0.0);
    engine.switch_active();
    engine.seek(999.0);
    assert!((engine.transport().position - 5.0).abs() < 1e-3);
}

#[test]
fn scenario_b_loop_confines_playback() {
    let mut engine = engine_with_both(10.0, 10.0, 8_000);
    engine.set_loop_region(LoopRegion::new(1.0, 2.0));
    engine.seek(0.0);
    engine.play();
    let dt = 0.05;
    let mut saw_wrap = false;
    let mut entered = false;
    for _ in 0..300 {
        let report = engine.tick(dt);
        assert!(report.playing, "loop wrap must not pause playback");
        assert!(
            report.position <= 2.0 + dt + 1e-4,
            "position overshot the loop end: {}",
            report.position
        );
        if report.looped {
            saw_wrap = true;
            assert!((report.position - 1.0).abs() < 1e-4);
        }
        if report.position >= 1.0 {
            entered = true;
        }
        if entered {
            assert!(report.position >= 1.0 - 1e-4);
        }
    }
    assert!(saw_wrap, "playback never wrapped");
    assert!(engine.transport().playing);
}

#[test]
fn seek_outside_the_loop_leaves_it_armed() {
    let mut engine = engine_with_both(10.0, 10.0, 8_000);
    engine.set_loop_region(LoopRegion::new(1.0, 2.0));
    engine.play();
    engine.tick(0.05);
    // Seeking past the loop does not clear it; the region dangles until the
    // next boundary crossing.
    engine.seek(5.0);
    assert_eq!(engine.loop_region(), Some(LoopRegion { start: 1.0, end: 2.0 }));
    let report = engine.tick(0.05);
    assert!(report.looped, "tick past the loop end must wrap");
    assert!((report.position - 1.0).abs() < 1e-4);
    assert!(report.playing);
}

#[test]
fn loop_region_is_clamped_and_clearable() {
    let mut engine = engine_with_both(2.0, 2.0, 8_000);
    engine.set_loop_region(LoopRegion::new(1.0, 50.0));
    let r = engine.loop_region().expect("region set");
    assert!((r.end - 2.0).abs() < 1e-4);
    engine.set_loop_region(None);
    assert_eq!(engine.loop_region(), None);
}

#[test]
fn upload_clears_the_loop_region() {
    let mut engine = engine_with_both(2.0, 2.0, 8_000);
    engine.set_loop_region(LoopRegion::new(0.5, 1.5));
    assert!(engine.loop_region().is_some());
    engine
        .upload_file(
            TrackSlot::Reference,
            sine_wav_bytes("replacement", 3.0, 8_000),
            "audio/wav",
        )
        .expect("upload replacement");
    assert_eq!(engine.loop_region(), None);
    wait_for_slot(&mut engine, TrackSlot::Reference);
    assert_eq!(engine.loop_region(), None);
    let track = engine.track(TrackSlot::Reference).expect("replaced track");
    assert!((track.duration_secs - 3.0).abs() < 0.01);
}

#[test]
fn waveform_is_unavailable_while_loading_then_served() {
    let mut engine = Engine::headless(8_000);
    assert!(matches!(
        engine.waveform(TrackSlot::Master, 128),
        Err(EngineError::AnalysisUnavailable(TrackSlot::Master))
    ));
    engine
        .upload_file(
            TrackSlot::Master,
            sine_wav_bytes("wave", 1.0, 8_000),
            "audio/wav",
        )
        .expect("upload master");
    assert!(matches!(
        engine.waveform(TrackSlot::Master, 128),
        Err(EngineError::AnalysisUnavailable(TrackSlot::Master))
    ));
    wait_for_slot(&mut engine, TrackSlot::Master);
    let pairs = engine.waveform(TrackSlot::Master, 128).expect("waveform");
    assert_eq!(pairs.len(), 128);
    // Sine content: every bin spans zero.
    assert!(pairs.iter().all(|(mn, mx)| mn <= mx));
}

#[test]
fn end_of_track_pauses_without_a_loop() {
    let mut engine = engine_with_both(1.0, 1.0, 8_000);
    engine.play();
    for _ in 0..30 {
        engine.tick(0.05);
    }
    let t = engine.transport();
    assert!(!t.playing);
    assert!((t.position - 1.0).abs() < 1e-3);
    // Play again restarts from the top.
    engine.play();
    assert!(engine.transport().playing);
    assert_eq!(engine.transport().position, 0.0);
}

#[test]
fn meter_runs_only_while_playing_and_releases_gently() {
    let mut engine = engine_with_both(4.0, 4.0, 8_000);
    let idle_level = engine.tick(0.05).level_db;
    assert_eq!(idle_level, -60.0);
    engine.play();
    let mut last = f32::NEG_INFINITY;
    for _ in 0..20 {
        last = engine.tick(0.05).level_db;
    }
    // Half-scale sine should sit far above the floor.
    assert!(last > -20.0, "meter level {last}");
    engine.pause();
    let held = engine.tick(0.05).level_db;
    let held_again = engine.tick(0.05).level_db;
    assert_eq!(held, held_again, "meter must not update while paused");
}
