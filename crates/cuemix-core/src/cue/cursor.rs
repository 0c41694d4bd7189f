//! Playback instance state shared between control and render threads
//!
//! The control plane only writes requested targets, the loop count, the
//! recycle flag, and (while an instance is stopped) its position and settled
//! parameter values. Ramp progress belongs to the render thread: it loads a
//! [`Ramp`] from a [`ParamCell`] at the start of a tick and stores it back at
//! the end.
//!
//! Control writes that replace render-owned state (reposition, start, reset)
//! bump an [`Epochs`] counter under the cursor's sync lock. The render thread
//! compares epochs every frame and reloads what changed, and its store-back
//! takes the same lock and skips any field whose epoch moved.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};

use super::ramp::Ramp;
use crate::types::{PAN_STEPS, SPEED_STEPS, VOLUME_STEPS};

/// f64 stored as raw bits in an `AtomicU64`
#[derive(Debug)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    #[inline]
    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn swap(&self, value: f64) -> f64 {
        f64::from_bits(self.0.swap(value.to_bits(), Ordering::AcqRel))
    }
}

impl Default for AtomicF64 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// One rampable parameter of an instance
#[derive(Debug)]
pub(crate) struct ParamCell {
    /// Last value accepted through the API
    requested: AtomicF64,
    /// Target waiting to be picked up by the render thread, NaN when none
    pending: AtomicF64,
    current: AtomicF64,
    target: AtomicF64,
    increment: AtomicF64,
    remaining: AtomicU32,
    steps: u32,
}

impl ParamCell {
    fn new(value: f64, steps: u32) -> Self {
        Self {
            requested: AtomicF64::new(value),
            pending: AtomicF64::new(f64::NAN),
            current: AtomicF64::new(value),
            target: AtomicF64::new(value),
            increment: AtomicF64::new(0.0),
            remaining: AtomicU32::new(0),
            steps,
        }
    }

    /// Record a new target; a playing instance ramps toward it
    pub fn request(&self, value: f64) {
        self.requested.store(value);
        self.pending.swap(value);
    }

    pub fn requested(&self) -> f64 {
        self.requested.load()
    }

    pub fn current(&self) -> f64 {
        self.current.load()
    }

    /// Apply the requested value with no ramp
    pub fn commit(&self) {
        let value = self.requested.load();
        self.pending.swap(f64::NAN);
        self.current.store(value);
        self.target.store(value);
        self.increment.store(0.0);
        self.remaining.store(0, Ordering::Relaxed);
    }

    pub fn reset(&self, value: f64) {
        self.requested.store(value);
        self.commit();
    }

    /// Take the waiting target, if any
    #[inline]
    pub fn take_pending(&self) -> Option<f64> {
        if self.pending.load().is_nan() {
            return None;
        }
        let value = self.pending.swap(f64::NAN);
        (!value.is_nan()).then_some(value)
    }

    pub fn load_ramp(&self) -> Ramp {
        Ramp::from_parts(
            self.current.load(),
            self.target.load(),
            self.increment.load(),
            self.remaining.load(Ordering::Relaxed),
            self.steps,
        )
    }

    pub fn store_ramp(&self, ramp: &Ramp) {
        self.current.store(ramp.value());
        self.target.store(ramp.target());
        self.increment.store(ramp.increment());
        self.remaining.store(ramp.remaining(), Ordering::Relaxed);
    }
}

/// Change counters for render-owned cursor state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Epochs {
    pub position: u32,
    pub params: u32,
}

/// State of one playback instance
#[derive(Debug)]
pub(crate) struct Cursor {
    pub id: usize,
    active: AtomicBool,
    playing: AtomicBool,
    position: AtomicF64,
    pub volume: ParamCell,
    pub pan: ParamCell,
    pub speed: ParamCell,
    loops: AtomicI32,
    recycle_when_done: AtomicBool,
    position_epoch: AtomicU32,
    params_epoch: AtomicU32,
    sync: Mutex<()>,
}

impl Cursor {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            active: AtomicBool::new(false),
            playing: AtomicBool::new(false),
            position: AtomicF64::new(0.0),
            volume: ParamCell::new(0.0, VOLUME_STEPS),
            pan: ParamCell::new(0.0, PAN_STEPS),
            speed: ParamCell::new(1.0, SPEED_STEPS),
            loops: AtomicI32::new(0),
            recycle_when_done: AtomicBool::new(false),
            position_epoch: AtomicU32::new(0),
            params_epoch: AtomicU32::new(0),
            sync: Mutex::new(()),
        }
    }

    #[inline]
    pub fn epochs(&self) -> Epochs {
        Epochs {
            position: self.position_epoch.load(Ordering::Acquire),
            params: self.params_epoch.load(Ordering::Acquire),
        }
    }

    /// Held while render-owned state is replaced or stored back
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.sync.lock()
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    /// Clear `active`, returning whether it was set
    ///
    /// Only the caller that wins this swap may return the id to the pool.
    pub fn deactivate(&self) -> bool {
        self.active.swap(false, Ordering::AcqRel)
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }

    #[inline]
    pub fn position(&self) -> f64 {
        self.position.load()
    }

    /// Plain store; the render thread calls this with the sync lock held
    pub fn set_position(&self, frame: f64) {
        self.position.store(frame);
    }

    /// Move the instance from the control plane
    pub fn reposition(&self, frame: f64) {
        let _sync = self.sync.lock();
        self.position.store(frame);
        self.position_epoch.fetch_add(1, Ordering::AcqRel);
    }

    pub fn loops(&self) -> i32 {
        self.loops.load(Ordering::Relaxed)
    }

    pub fn set_loops(&self, loops: i32) {
        self.loops.store(loops, Ordering::Relaxed);
    }

    pub fn recycle_when_done(&self) -> bool {
        self.recycle_when_done.load(Ordering::Relaxed)
    }

    pub fn set_recycle_when_done(&self, recycle: bool) {
        self.recycle_when_done.store(recycle, Ordering::Relaxed);
    }

    /// Settle every parameter at its requested value and start playing
    pub fn start_playing(&self) {
        let _sync = self.sync.lock();
        self.volume.commit();
        self.pan.commit();
        self.speed.commit();
        self.params_epoch.fetch_add(1, Ordering::AcqRel);
        self.set_playing(true);
    }

    /// Back to the freshly constructed state (does not touch `active`)
    pub fn reset(&self) {
        let _sync = self.sync.lock();
        self.position_epoch.fetch_add(1, Ordering::AcqRel);
        self.params_epoch.fetch_add(1, Ordering::AcqRel);
        self.set_playing(false);
        self.position.store(0.0);
        self.volume.reset(0.0);
        self.pan.reset(0.0);
        self.speed.reset(1.0);
        self.set_loops(0);
        self.set_recycle_when_done(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_f64_roundtrip() {
        let a = AtomicF64::new(1.25);
        assert_eq!(a.load(), 1.25);
        a.store(-3.5);
        assert_eq!(a.swap(0.0), -3.5);
        assert_eq!(a.load(), 0.0);
    }

    #[test]
    fn test_pending_is_read_then_cleared() {
        let cell = ParamCell::new(0.0, 1024);
        assert_eq!(cell.take_pending(), None);
        cell.request(0.7);
        cell.request(0.4);
        assert_eq!(cell.take_pending(), Some(0.4));
        assert_eq!(cell.take_pending(), None);
        assert_eq!(cell.requested(), 0.4);
    }

    #[test]
    fn test_commit_settles_and_clears_pending() {
        let cell = ParamCell::new(0.0, 1024);
        cell.request(0.9);
        cell.commit();
        assert_eq!(cell.current(), 0.9);
        assert_eq!(cell.take_pending(), None);
        assert!(!cell.load_ramp().is_ramping());
    }

    #[test]
    fn test_ramp_store_load() {
        let cell = ParamCell::new(0.0, 1024);
        let mut ramp = cell.load_ramp();
        ramp.retarget(1.0);
        ramp.step();
        cell.store_ramp(&ramp);
        assert_eq!(cell.load_ramp(), ramp);
        assert_eq!(cell.current(), 1.0 / 1024.0);
    }

    #[test]
    fn test_reset_defaults() {
        let cursor = Cursor::new(3);
        cursor.set_active(true);
        cursor.set_playing(true);
        cursor.set_position(12.5);
        cursor.volume.request(1.0);
        cursor.speed.request(2.0);
        cursor.set_loops(-1);
        cursor.set_recycle_when_done(true);

        let epochs = cursor.epochs();
        cursor.reset();
        let after = cursor.epochs();
        assert_ne!(after.position, epochs.position);
        assert_ne!(after.params, epochs.params);
        assert!(cursor.is_active());
        assert!(!cursor.is_playing());
        assert_eq!(cursor.position(), 0.0);
        assert_eq!(cursor.volume.requested(), 0.0);
        assert_eq!(cursor.speed.current(), 1.0);
        assert_eq!(cursor.loops(), 0);
        assert!(!cursor.recycle_when_done());

        assert!(cursor.deactivate());
        assert!(!cursor.deactivate());
    }

    #[test]
    fn test_control_writes_bump_their_epoch() {
        let cursor = Cursor::new(0);
        let start = cursor.epochs();

        cursor.reposition(40.0);
        let moved = cursor.epochs();
        assert_eq!(cursor.position(), 40.0);
        assert_ne!(moved.position, start.position);
        assert_eq!(moved.params, start.params);

        cursor.volume.request(0.5);
        assert_eq!(cursor.epochs(), moved, "requests alone leave epochs alone");

        cursor.start_playing();
        let started = cursor.epochs();
        assert!(cursor.is_playing());
        assert_eq!(cursor.volume.current(), 0.5);
        assert_eq!(started.position, moved.position);
        assert_ne!(started.params, moved.params);
    }
}
