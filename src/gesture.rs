use std::time::{Duration, Instant};

use crate::loops::LoopRegion;

/// Two downs within this window count as a double-click.
pub const DOUBLE_CLICK_WINDOW: Duration = Duration::from_millis(300);
/// Pointer travel beyond this many pixels turns a press into a drag.
pub const DRAG_THRESHOLD_PX: f32 = 5.0;
/// A press released within this span, without dragging, is a click (seek).
pub const CLICK_MAX_DURATION: Duration = Duration::from_millis(200);

/// What a pointer gesture over the waveform asks the transport to do.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GestureEvent {
    Seek(f32),
    SetLoop(LoopRegion),
    ClearLoop,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Idle,
    PossibleClick,
    Dragging,
}

/// Pointer state machine for one waveform view. Disambiguates click (seek),
/// drag (loop selection, emitted live while the pointer moves) and
/// double-click (clear loop).
pub struct WaveformGesture {
    state: State,
    width: f32,
    duration: f32,
    down_at: Option<Instant>,
    last_down_at: Option<Instant>,
    down_x: f32,
    down_y: f32,
}

impl WaveformGesture {
    pub fn new(width: f32, duration: f32) -> Self {
        Self {
            state: State::Idle,
            width,
            duration,
            down_at: None,
            last_down_at: None,
            down_x: 0.0,
            down_y: 0.0,
        }
    }

    /// Called when the view resizes or its track is replaced.
    pub fn set_view(&mut self, width: f32, duration: f32) {
        self.width = width;
        self.duration = duration;
        self.state = State::Idle;
        self.down_at = None;
    }

    pub fn pointer_down(&mut self, x: f32, y: f32, now: Instant) -> Option<GestureEvent> {
        let double = self
            .last_down_at
            .map(|prev| now.duration_since(prev) < DOUBLE_CLICK_WINDOW)
            .unwrap_or(false);
        self.last_down_at = Some(now);
        if double {
            self.state = State::Idle;
            self.down_at = None;
            return Some(GestureEvent::ClearLoop);
        }
        self.state = State::PossibleClick;
        self.down_at = Some(now);
        self.down_x = x;
        self.down_y = y;
        None
    }

    pub fn pointer_move(&mut self, x: f32, y: f32, _now: Instant) -> Option<GestureEvent> {
        match self.state {
            State::Idle => None,
            State::PossibleClick => {
                let moved = (x - self.down_x).abs() > DRAG_THRESHOLD_PX
                    || (y - self.down_y).abs() > DRAG_THRESHOLD_PX;
                if !moved {
                    return None;
                }
                self.state = State::Dragging;
                self.live_region(x)
            }
            State::Dragging => self.live_region(x),
        }
    }

    pub fn pointer_up(&mut self, x: f32, _y: f32, now: Instant) -> Option<GestureEvent> {
        let was = self.state;
        let pressed_for = self.down_at.map(|t| now.duration_since(t));
        self.state = State::Idle;
        self.down_at = None;
        match was {
            State::PossibleClick => match pressed_for {
                Some(d) if d < CLICK_MAX_DURATION => Some(GestureEvent::Seek(self.time_at(x))),
                _ => None,
            },
            // The final region was already emitted on the last move.
            _ => None,
        }
    }

    fn live_region(&self, x: f32) -> Option<GestureEvent> {
        LoopRegion::from_drag(self.down_x, x, self.width, self.duration).map(GestureEvent::SetLoop)
    }

    fn time_at(&self, x: f32) -> f32 {
        if self.width <= 0.0 || self.duration <= 0.0 {
            return 0.0;
        }
        (x / self.width).clamp(0.0, 1.0) * self.duration
    }
}
