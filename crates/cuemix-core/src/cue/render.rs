//! Per-cue render loop
//!
//! For every playing instance and every output frame: advance the volume and
//! pan ramps, read the (interpolated) source frame, accumulate it scaled by the
//! volume curve and pan law, advance the speed ramp, move the cursor, and
//! handle the end of the cue.
//!
//! Control calls may land while a tick is running, including from a listener
//! invoked by this loop. Each frame first reconciles with the cursor's epochs.

use super::cursor::{Cursor, Epochs};
use super::ramp::Ramp;
use super::CueShared;
use crate::events::InstanceEventKind;
use crate::types::{StereoSample, CHANNELS};

/// Read the frame at a possibly fractional position
///
/// Integer positions read the frame directly; otherwise the two neighbours
/// are blended by the fractional part.
#[inline]
pub(crate) fn read_frame(frames: &[StereoSample], position: f64) -> StereoSample {
    let floor = position.floor();
    let index = floor as usize;
    if position == floor {
        return frames[index];
    }
    let next = (index + 1).min(frames.len() - 1);
    frames[index].lerp(&frames[next], position - floor)
}

impl CueShared {
    /// Overwrite `out` with the mix of every playing instance
    pub(crate) fn fill_buffer(&self, out: &mut [f32]) {
        out.fill(0.0);
        let _render = self.render_lock.lock();

        for cursor in self.cursors.iter() {
            if cursor.is_playing() {
                self.render_cursor(cursor, out);
            }
        }
    }

    fn render_cursor(&self, cursor: &Cursor, out: &mut [f32]) {
        let curve = self.volume_curve();
        let law = self.pan_law();
        let frames = self.pcm.frames();
        let last_frame = (frames.len() - 1) as f64;

        let mut epochs = cursor.epochs();
        let mut state = TickState::load(cursor);
        let mut vol_factor = curve.factor(state.volume.value());
        let (mut gain_l, mut gain_r) = law.gains(state.pan.value());

        for frame in out.chunks_exact_mut(CHANNELS) {
            // Pick up control-plane writes made since the last frame
            let now = cursor.epochs();
            if now != epochs {
                if now.position != epochs.position {
                    state.position = cursor.position();
                }
                if now.params != epochs.params {
                    state.reload_params(cursor);
                    vol_factor = curve.factor(state.volume.value());
                    (gain_l, gain_r) = law.gains(state.pan.value());
                }
                epochs = now;
            }
            if !cursor.is_playing() {
                state.store(cursor, epochs);
                return;
            }

            if let Some(target) = cursor.volume.take_pending() {
                state.volume.retarget(target);
            }
            if state.volume.step() {
                vol_factor = curve.factor(state.volume.value());
            }

            if let Some(target) = cursor.pan.take_pending() {
                state.pan.retarget(target);
            }
            if state.pan.step() {
                (gain_l, gain_r) = law.gains(state.pan.value());
            }

            let sample = read_frame(frames, state.position);
            frame[0] += (sample.left as f64 * vol_factor * gain_l) as f32;
            frame[1] += (sample.right as f64 * vol_factor * gain_r) as f32;

            if let Some(target) = cursor.speed.take_pending() {
                state.speed.retarget(target);
            }
            state.speed.step();
            state.position += state.speed.value();

            if state.position <= last_frame {
                continue;
            }

            let loops = cursor.loops();
            if loops == -1 || loops > 0 {
                if loops > 0 {
                    cursor.set_loops(loops - 1);
                }
                state.position = 0.0;
                self.emit(InstanceEventKind::Loop, cursor.id, state.position);
                continue;
            }

            if !state.finish(cursor, epochs) {
                // Restarted or moved while this frame rendered; follow the control plane
                state.position = cursor.position();
                continue;
            }
            self.emit(InstanceEventKind::Stop, cursor.id, state.position);
            if cursor.recycle_when_done() {
                self.recycle(cursor);
            }
            // Rest of the buffer stays silent for this instance
            return;
        }

        state.store(cursor, epochs);
    }
}

/// Render-owned copy of a cursor for the duration of one tick
struct TickState {
    position: f64,
    volume: Ramp,
    pan: Ramp,
    speed: Ramp,
}

impl TickState {
    fn load(cursor: &Cursor) -> Self {
        Self {
            position: cursor.position(),
            volume: cursor.volume.load_ramp(),
            pan: cursor.pan.load_ramp(),
            speed: cursor.speed.load_ramp(),
        }
    }

    fn reload_params(&mut self, cursor: &Cursor) {
        self.volume = cursor.volume.load_ramp();
        self.pan = cursor.pan.load_ramp();
        self.speed = cursor.speed.load_ramp();
    }

    /// Write back whatever the control plane has not replaced since `seen`
    fn store(&self, cursor: &Cursor, seen: Epochs) {
        let _sync = cursor.lock();
        self.store_locked(cursor, seen, cursor.epochs());
    }

    fn store_locked(&self, cursor: &Cursor, seen: Epochs, now: Epochs) {
        if now.position == seen.position {
            cursor.set_position(self.position);
        }
        if now.params == seen.params {
            cursor.volume.store_ramp(&self.volume);
            cursor.pan.store_ramp(&self.pan);
            cursor.speed.store_ramp(&self.speed);
        }
    }

    /// Stop at the end of the cue, unless the control plane got there first
    fn finish(&self, cursor: &Cursor, seen: Epochs) -> bool {
        let _sync = cursor.lock();
        let now = cursor.epochs();
        if now != seen {
            return false;
        }
        cursor.set_playing(false);
        self.store_locked(cursor, seen, now);
        true
    }
}
