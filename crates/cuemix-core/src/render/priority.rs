//! Render thread scheduling priority
//!
//! Priorities run from 1 (lowest) to 10. [`ThreadPriority::MAX`] asks the OS
//! for real-time scheduling:
//!
//! - **Linux**: SCHED_FIFO, then SCHED_RR, then pthread_setschedparam
//!   (needs CAP_SYS_NICE or an rtprio limit)
//! - **macOS**: pthread QoS class USER_INTERACTIVE
//!
//! Lower priorities map to a nice value on Linux and are left alone elsewhere.
//! Failure is never fatal; the thread keeps running at its default priority.

use serde::{Deserialize, Serialize};

use crate::error::{CueError, CueResult};

/// Scheduling priority of a render thread, 1..=10
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ThreadPriority(u8);

impl ThreadPriority {
    pub const MIN: ThreadPriority = ThreadPriority(1);
    pub const NORM: ThreadPriority = ThreadPriority(5);
    pub const MAX: ThreadPriority = ThreadPriority(10);

    pub fn new(value: u8) -> CueResult<Self> {
        if (Self::MIN.0..=Self::MAX.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(CueError::InvalidArgument(format!(
                "thread priority must be within {}..={}, got {}",
                Self::MIN.0,
                Self::MAX.0,
                value
            )))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn is_realtime(self) -> bool {
        self == Self::MAX
    }
}

impl Default for ThreadPriority {
    fn default() -> Self {
        Self::MAX
    }
}

impl TryFrom<u8> for ThreadPriority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).map_err(|e| e.to_string())
    }
}

impl From<ThreadPriority> for u8 {
    fn from(priority: ThreadPriority) -> Self {
        priority.0
    }
}

impl std::fmt::Display for ThreadPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of applying a priority to the current thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityResult {
    /// Real-time scheduling granted
    Realtime,
    /// Non-real-time priority applied
    Adjusted,
    /// Nothing to do for this priority on this platform
    Default,
    /// The OS refused (non-fatal)
    Failed,
    Unsupported,
}

/// Apply `priority` to the calling thread
pub fn apply_thread_priority(priority: ThreadPriority) -> PriorityResult {
    let result = if priority.is_realtime() {
        platform_set_realtime()
    } else {
        platform_set_nice(priority)
    };

    match result {
        PriorityResult::Realtime => log::info!("Render thread elevated to real-time priority"),
        PriorityResult::Failed => log::warn!(
            "Failed to apply thread priority {} (non-fatal, running at default)",
            priority
        ),
        PriorityResult::Unsupported => {
            log::debug!("Thread priority {} not supported on this platform", priority)
        }
        PriorityResult::Adjusted | PriorityResult::Default => {}
    }
    result
}

#[cfg(target_os = "linux")]
fn platform_set_realtime() -> PriorityResult {
    use libc::{
        pthread_self, pthread_setschedparam, sched_param, sched_setscheduler, SCHED_FIFO, SCHED_RR,
    };

    // pid 0 is the calling thread
    let mut param = sched_param { sched_priority: 80 };
    if unsafe { sched_setscheduler(0, SCHED_FIFO, &param) } == 0 {
        return PriorityResult::Realtime;
    }

    log::debug!("SCHED_FIFO failed (need CAP_SYS_NICE), trying SCHED_RR");
    param.sched_priority = 70;
    if unsafe { sched_setscheduler(0, SCHED_RR, &param) } == 0 {
        return PriorityResult::Realtime;
    }

    log::debug!("SCHED_RR failed, trying pthread_setschedparam");
    param.sched_priority = 50;
    let result = unsafe { pthread_setschedparam(pthread_self(), SCHED_FIFO, &param) };
    if result == 0 {
        PriorityResult::Realtime
    } else {
        log::debug!("All Linux RT scheduling methods failed (errno: {})", result);
        PriorityResult::Failed
    }
}

#[cfg(target_os = "macos")]
fn platform_set_realtime() -> PriorityResult {
    const QOS_CLASS_USER_INTERACTIVE: u32 = 0x21;

    unsafe extern "C" {
        fn pthread_set_qos_class_self_np(qos_class: u32, relative_priority: i32) -> i32;
    }

    let result = unsafe { pthread_set_qos_class_self_np(QOS_CLASS_USER_INTERACTIVE, 0) };
    if result == 0 {
        PriorityResult::Realtime
    } else {
        log::debug!("pthread_set_qos_class_self_np failed: {}", result);
        PriorityResult::Failed
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn platform_set_realtime() -> PriorityResult {
    PriorityResult::Unsupported
}

/// Priority 5 is the default nice of 0; each step away is two nice levels
#[cfg(target_os = "linux")]
fn platform_set_nice(priority: ThreadPriority) -> PriorityResult {
    let nice = (ThreadPriority::NORM.get() as i32 - priority.get() as i32) * 2;
    if nice == 0 {
        return PriorityResult::Default;
    }
    // On Linux, PRIO_PROCESS with who = 0 targets the calling thread
    let result = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, nice) };
    if result == 0 {
        PriorityResult::Adjusted
    } else {
        PriorityResult::Failed
    }
}

#[cfg(not(target_os = "linux"))]
fn platform_set_nice(_priority: ThreadPriority) -> PriorityResult {
    PriorityResult::Default
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_range() {
        assert!(ThreadPriority::new(0).is_err());
        assert!(ThreadPriority::new(11).is_err());
        assert_eq!(ThreadPriority::new(10).unwrap(), ThreadPriority::MAX);
        assert_eq!(ThreadPriority::new(1).unwrap(), ThreadPriority::MIN);
        assert_eq!(ThreadPriority::default(), ThreadPriority::MAX);
    }

    #[test]
    fn test_priority_serde_validates() {
        let p: ThreadPriority = serde_yaml::from_str("7").unwrap();
        assert_eq!(p.get(), 7);
        assert!(serde_yaml::from_str::<ThreadPriority>("42").is_err());
        assert_eq!(serde_yaml::to_string(&p).unwrap().trim(), "7");
    }

    #[test]
    fn test_apply_on_scratch_thread() {
        // Privileges vary between machines; any outcome but a panic is fine
        let result = std::thread::spawn(|| apply_thread_priority(ThreadPriority::MAX))
            .join()
            .unwrap();
        assert_ne!(result, PriorityResult::Adjusted);

        let result = std::thread::spawn(|| apply_thread_priority(ThreadPriority::NORM))
            .join()
            .unwrap();
        assert_eq!(result, PriorityResult::Default);
    }
}
