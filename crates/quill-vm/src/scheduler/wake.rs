//! Wake/wait protocol
//!
//! Subsystems report completed actions as `(reason, object)`. Every thread
//! waiting on exactly that pair is woken; leaving the object out broadcasts
//! to every thread waiting on the reason.

use super::ScriptEngine;
use crate::thread::{ObjectId, ScriptThread, WaitReason};
use tracing::debug;

impl ScriptEngine {
    /// Wake threads waiting on `reason` (and `object`, if given)
    ///
    /// Returns how many threads were woken.
    pub fn wake_threads(&mut self, reason: WaitReason, object: Option<ObjectId>) -> usize {
        let mut woken = 0;
        self.threads.for_each_mut(|thread| {
            if waits_on(thread, reason, object) {
                thread.wake();
                woken += 1;
            }
        });
        if woken > 0 {
            debug!(%reason, ?object, woken, "threads woken");
        }
        woken
    }

    /// Move threads waiting on `reason` onto a `msec` delay instead of waking
    /// them
    ///
    /// Returns how many threads were re-armed.
    pub fn wake_threads_delayed(&mut self, reason: WaitReason, msec: u32) -> usize {
        let mut rearmed = 0;
        self.threads.for_each_mut(|thread| {
            if waits_on(thread, reason, None) {
                thread.wait_delay(msec);
                rearmed += 1;
            }
        });
        if rearmed > 0 {
            debug!(%reason, msec, rearmed, "threads delayed");
        }
        rearmed
    }
}

fn waits_on(thread: &ScriptThread, reason: WaitReason, object: Option<ObjectId>) -> bool {
    thread.is_waiting()
        && thread.wait_type() == Some(reason)
        && object.map_or(true, |object| thread.wait_object() == Some(object))
}
