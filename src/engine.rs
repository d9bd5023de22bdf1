use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;

use arc_swap::ArcSwap;

use crate::audio::{resample_linear, AudioOutput, PlayerShared};
use crate::audio_io::{self, DecodedAudio, DeclaredFormat};
use crate::error::EngineError;
use crate::loops::{LoopEngine, LoopRegion};
use crate::meter::{AnalysisHandle, LoudnessMeter};
use crate::track::{SlotStatus, Track, TrackId, TrackSlot};
use crate::validate::check_track_durations;
use crate::waveform::WaveformCache;

/// Single source of truth for playback. Both players' clocks follow
/// `position`; only the active player's own clock advance feeds back into it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransportState {
    pub active: TrackSlot,
    pub position: f32,
    pub playing: bool,
}

/// Top-level phase. `Idle` until both slots are ready; switching the active
/// track never changes the phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportPhase {
    Idle,
    Paused,
    Playing,
}

/// Snapshot handed to the presentation layer after each tick, in repaint
/// order: the loop wrap (if any) is already applied to `position`.
#[derive(Clone, Copy, Debug)]
pub struct TickReport {
    pub active: TrackSlot,
    pub position: f32,
    pub playing: bool,
    pub level_db: f32,
    pub looped: bool,
}

struct DecodeJob {
    generation: u64,
    rx: Receiver<Result<DecodedAudio, EngineError>>,
}

struct Slot {
    track: Option<Track>,
    status: SlotStatus,
    generation: u64,
    job: Option<DecodeJob>,
    player: Arc<PlayerShared>,
    analysis: Option<AnalysisHandle>,
}

impl Slot {
    fn new() -> Self {
        Self {
            track: None,
            status: SlotStatus::Empty,
            generation: 0,
            job: None,
            player: Arc::new(PlayerShared::new()),
            analysis: None,
        }
    }
}

/// The transport controller: owns both slots, the authoritative position, the
/// loop engine, the meter and the per-slot analysis registry, and drives them
/// from a periodic `tick`.
pub struct Engine {
    slots: [Slot; 2],
    transport: TransportState,
    loops: LoopEngine,
    meter: LoudnessMeter,
    waveforms: WaveformCache,
    active_player: Arc<ArcSwap<PlayerShared>>,
    output: Option<AudioOutput>,
    out_sample_rate: u32,
    next_track_id: TrackId,
}

impl Engine {
    /// Engine with a live output device; the audio callback renders the
    /// active player and advances its clock.
    pub fn new() -> anyhow::Result<Self> {
        let mut engine = Self::headless(0);
        let output = AudioOutput::new(engine.active_player.clone())?;
        engine.out_sample_rate = output.out_sample_rate.max(1);
        engine.output = Some(output);
        Ok(engine)
    }

    /// Engine without an output stream. The tick's `dt` advances the clock;
    /// used by tests and by hosts that render audio themselves.
    pub fn headless(out_sample_rate: u32) -> Self {
        let slots = [Slot::new(), Slot::new()];
        let active_player = Arc::new(ArcSwap::new(slots[0].player.clone()));
        Self {
            slots,
            transport: TransportState {
                active: TrackSlot::Master,
                position: 0.0,
                playing: false,
            },
            loops: LoopEngine::new(),
            meter: LoudnessMeter::new(),
            waveforms: WaveformCache::new(),
            active_player,
            output: None,
            out_sample_rate: if out_sample_rate == 0 { 44_100 } else { out_sample_rate },
            next_track_id: 1,
        }
    }

    // ---- uploads ----

    /// Gate the declared type, then hand the payload to a decode worker. The
    /// result is applied atomically on a later tick; bumping the slot
    /// generation makes any in-flight decode for this slot stale.
    pub fn upload_file(
        &mut self,
        slot: TrackSlot,
        bytes: Vec<u8>,
        declared_type: &str,
    ) -> Result<(), EngineError> {
        let format = DeclaredFormat::parse(declared_type)
            .ok_or_else(|| EngineError::UnsupportedFormat(declared_type.to_string()))?;
        let s = &mut self.slots[slot.index()];
        s.generation += 1;
        let generation = s.generation;
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let res = audio_io::decode_bytes_mono(bytes, format)
                .map_err(|e| EngineError::Decode(format!("{e:#}")));
            let _ = tx.send(res);
        });
        s.job = Some(DecodeJob { generation, rx });
        s.status = SlotStatus::Loading;
        // Loop coordinates are meaningless against the incoming duration.
        self.loops.clear();
        audio_io::io_trace("upload", &format!("slot={slot:?} container={}", format.extension()));
        Ok(())
    }

    fn poll_decodes(&mut self) {
        for slot in TrackSlot::ALL {
            let idx = slot.index();
            let outcome = match &self.slots[idx].job {
                Some(job) => match job.rx.try_recv() {
                    Ok(res) => Some((job.generation, Some(res))),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => Some((job.generation, None)),
                },
                None => None,
            };
            let Some((generation, res)) = outcome else {
                continue;
            };
            self.slots[idx].job = None;
            if generation != self.slots[idx].generation {
                // A newer upload replaced this decode while it ran.
                continue;
            }
            match res {
                Some(Ok(decoded)) => self.install_track(slot, decoded),
                Some(Err(err)) => self.fail_slot(slot, err.to_string()),
                None => self.fail_slot(slot, "decode worker vanished".to_string()),
            }
        }
    }

    fn install_track(&mut self, slot: TrackSlot, decoded: DecodedAudio) {
        let id = self.next_track_id;
        self.next_track_id += 1;
        let track = Track {
            id,
            pcm: Arc::new(decoded.mono),
            sample_rate: decoded.sample_rate,
            channel_count: decoded.channel_count,
            duration_secs: decoded.duration_secs,
            bit_rate_bps: decoded.bit_rate_bps,
            loudness_db: decoded.loudness_db,
        };
        let device_pcm = resample_linear(&track.pcm, track.sample_rate, self.out_sample_rate);
        let s = &mut self.slots[slot.index()];
        s.player.set_samples(Arc::new(device_pcm));
        s.analysis = Some(AnalysisHandle::new(&track));
        s.track = Some(track);
        s.status = SlotStatus::Ready;
        // Replacing audio invalidates position, loop and cached waveforms.
        self.loops.clear();
        self.transport.playing = false;
        self.transport.position = 0.0;
        self.stop_players();
        self.write_positions();
        self.meter.reset();
        let live: Vec<TrackId> = self
            .slots
            .iter()
            .filter_map(|s| s.track.as_ref().map(|t| t.id))
            .collect();
        self.waveforms.retain_tracks(&live);
        audio_io::io_trace("install", &format!("slot={slot:?} id={id}"));
    }

    fn fail_slot(&mut self, slot: TrackSlot, message: String) {
        let s = &mut self.slots[slot.index()];
        s.track = None;
        s.analysis = None;
        s.player.clear();
        s.status = SlotStatus::Failed(message.clone());
        // A slot without a track drops the transport out of Playing; position
        // zero is the only coordinate valid against an empty slot.
        self.transport.playing = false;
        self.transport.position = 0.0;
        self.stop_players();
        self.write_positions();
        self.meter.reset();
        let live: Vec<TrackId> = self
            .slots
            .iter()
            .filter_map(|s| s.track.as_ref().map(|t| t.id))
            .collect();
        self.waveforms.retain_tracks(&live);
        audio_io::io_trace("decode_failed", &format!("slot={slot:?} err={message}"));
    }

    // ---- transport operations ----

    /// No-op unless both slots are ready. Not an error: the presentation
    /// layer disables the affordance instead of handling one.
    pub fn play(&mut self) {
        if self.transport.playing || self.phase() == TransportPhase::Idle {
            return;
        }
        if let Some(r) = self.loops.region() {
            if self.transport.position >= r.end {
                self.transport.position = r.start;
            }
        }
        if let Some(d) = self.active_duration() {
            if self.transport.position >= d {
                self.transport.position = 0.0;
            }
        }
        self.write_positions();
        self.active_slot().player.playing.store(true, std::sync::atomic::Ordering::Relaxed);
        self.transport.playing = true;
    }

    /// Idempotent: a second pause leaves the transport untouched.
    pub fn pause(&mut self) {
        self.stop_players();
        self.transport.playing = false;
    }

    /// Clamp to the active track and mirror onto both players. An active loop
    /// region is left in place; the next tick's wrap check reasserts it.
    pub fn seek(&mut self, secs: f32) {
        let max = self.active_duration().unwrap_or(0.0);
        let secs = if secs.is_finite() { secs } else { 0.0 };
        self.transport.position = secs.clamp(0.0, max);
        self.write_positions();
    }

    /// Swap which track is audible at the exact shared position. The phase is
    /// untouched: if we were playing we keep playing on the other engine.
    pub fn switch_active(&mut self) {
        let from = self.transport.active;
        let to = from.other();
        self.slots[from.index()]
            .player
            .playing
            .store(false, std::sync::atomic::Ordering::Relaxed);
        self.slots[to.index()]
            .player
            .set_position_secs(self.transport.position, self.out_sample_rate);
        if self.transport.playing {
            self.slots[to.index()]
                .player
                .playing
                .store(true, std::sync::atomic::Ordering::Relaxed);
        }
        self.active_player.store(self.slots[to.index()].player.clone());
        self.transport.active = to;
    }

    /// Replace the loop region wholesale, clamped to the active track.
    /// `None` clears it.
    pub fn set_loop_region(&mut self, region: Option<LoopRegion>) {
        let clamped = match (region, self.active_duration()) {
            (Some(r), Some(d)) => r.clamped_to(d),
            (Some(r), None) => Some(r),
            (None, _) => None,
        };
        self.loops.set_region(clamped);
    }

    // ---- the periodic tick ----

    /// One iteration of the analysis/render loop, called at the display
    /// refresh rate. Fixed order: decode results land, the clock advances,
    /// the loop wrap check runs, the meter samples, and the returned snapshot
    /// reflects all of it so a wrap is visible in the same frame.
    pub fn tick(&mut self, dt: f32) -> TickReport {
        self.poll_decodes();
        let mut looped = false;
        if self.transport.playing {
            self.advance_clock(dt);
        }
        if self.transport.playing {
            if let Some(start) = self.loops.wrap(self.transport.position) {
                self.transport.position = start;
                self.write_positions();
                // If the wrap point was the end of the buffer the callback
                // already stopped the player; the wrap must stay inaudible as
                // a stop/start, so rearm it.
                self.active_slot()
                    .player
                    .playing
                    .store(true, std::sync::atomic::Ordering::Relaxed);
                looped = true;
            } else if let Some(d) = self.active_duration() {
                if self.transport.position >= d {
                    // Ran off the end without a loop: freeze at the end.
                    self.transport.position = d;
                    self.stop_players();
                    self.transport.playing = false;
                }
            }
            if self.transport.playing && !looped {
                self.mirror_inactive();
            }
        }
        let level_db = if self.transport.playing {
            let active = &self.slots[self.transport.active.index()];
            match &active.analysis {
                Some(handle) => {
                    let window = handle.window_at(self.transport.position);
                    self.meter.feed(window)
                }
                None => self.meter.level_db(),
            }
        } else {
            self.meter.level_db()
        };
        TickReport {
            active: self.transport.active,
            position: self.transport.position,
            playing: self.transport.playing,
            level_db,
            looped,
        }
    }

    fn advance_clock(&mut self, dt: f32) {
        if self.output.is_some() {
            let player = &self.slots[self.transport.active.index()].player;
            if player.playing.load(std::sync::atomic::Ordering::Relaxed) {
                self.transport.position = player.position_secs(self.out_sample_rate);
            } else {
                // The callback hit the end of the buffer.
                self.transport.position = self.active_duration().unwrap_or(0.0);
            }
        } else {
            self.transport.position += dt.max(0.0);
        }
    }

    /// Write-only mirroring: the inactive follower gets the authority
    /// position every tick and is never read back. Headless mode also moves
    /// the active player, which has no callback to advance it.
    fn mirror_inactive(&mut self) {
        let inactive = self.transport.active.other();
        self.slots[inactive.index()]
            .player
            .set_position_secs(self.transport.position, self.out_sample_rate);
        if self.output.is_none() {
            self.slots[self.transport.active.index()]
                .player
                .set_position_secs(self.transport.position, self.out_sample_rate);
        }
    }

    fn write_positions(&mut self) {
        for s in &self.slots {
            s.player
                .set_position_secs(self.transport.position, self.out_sample_rate);
        }
    }

    fn stop_players(&mut self) {
        for s in &self.slots {
            s.player
                .playing
                .store(false, std::sync::atomic::Ordering::Relaxed);
        }
    }

    // ---- queries ----

    pub fn transport(&self) -> TransportState {
        self.transport
    }

    pub fn phase(&self) -> TransportPhase {
        let both_ready = TrackSlot::ALL
            .iter()
            .all(|s| self.slots[s.index()].status == SlotStatus::Ready);
        if !both_ready {
            TransportPhase::Idle
        } else if self.transport.playing {
            TransportPhase::Playing
        } else {
            TransportPhase::Paused
        }
    }

    pub fn slot_status(&self, slot: TrackSlot) -> &SlotStatus {
        &self.slots[slot.index()].status
    }

    pub fn track(&self, slot: TrackSlot) -> Option<&Track> {
        self.slots[slot.index()].track.as_ref()
    }

    pub fn loop_region(&self) -> Option<LoopRegion> {
        self.loops.region()
    }

    pub fn meter_db(&self) -> f32 {
        self.meter.level_db()
    }

    pub fn out_sample_rate(&self) -> u32 {
        self.out_sample_rate
    }

    /// Derived on demand from whatever durations are currently known.
    pub fn duration_warning(&self) -> Option<String> {
        check_track_durations(
            self.track(TrackSlot::Master).map(|t| t.duration_secs),
            self.track(TrackSlot::Reference).map(|t| t.duration_secs),
        )
    }

    /// Reduced waveform for display, cached by `(track id, width)`. While the
    /// slot is still decoding this is the transient `AnalysisUnavailable`.
    pub fn waveform(
        &mut self,
        slot: TrackSlot,
        width: usize,
    ) -> Result<Arc<Vec<(f32, f32)>>, EngineError> {
        match &self.slots[slot.index()].track {
            Some(track) => Ok(self.waveforms.fetch(track, width)),
            None => Err(EngineError::AnalysisUnavailable(slot)),
        }
    }

    fn active_slot(&self) -> &Slot {
        &self.slots[self.transport.active.index()]
    }

    fn active_duration(&self) -> Option<f32> {
        self.active_slot().track.as_ref().map(|t| t.duration_secs)
    }
}
