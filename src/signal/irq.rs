//! IRQ signaling and notification.

use std::sync::atomic::{AtomicBool, AtomicIsize, Ordering};
use std::sync::Arc;

/// Create a new IRQ line. Updates `notify` when the sender asserts the IRQ.
pub fn new(notify: Pending, debug_label: &'static str) -> (Sender, Reciever) {
    let level = Arc::new(AtomicIsize::new(0));

    let sender = Sender {
        own_signal: false,
        level: Arc::clone(&level),
        notify,
        debug_label,
    };
    let reciever = Reciever { level };

    (sender, reciever)
}

/// Tracks IRQ assertions across one-or-more IRQ lines.
///
/// The latch is set on any rising edge and stays set until [Pending::clear]
/// is called.
#[derive(Debug, Clone)]
pub struct Pending {
    latch: Arc<AtomicBool>,
}

impl Default for Pending {
    fn default() -> Pending {
        Pending::new()
    }
}

impl Pending {
    pub fn new() -> Pending {
        Pending {
            latch: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Checks if any connected IRQs have been fired.
    #[inline]
    pub fn check(&self) -> bool {
        self.latch.load(Ordering::SeqCst)
    }

    /// Retrieves and un-sets the latch.
    #[inline]
    pub fn clear(&self) -> bool {
        self.latch.swap(false, Ordering::SeqCst)
    }
}

/// The receiving side of an IRQ line. Able to query the signal level, but not
/// change it.
#[derive(Debug, Clone)]
pub struct Reciever {
    level: Arc<AtomicIsize>,
}

impl Reciever {
    /// Checks if the IRQ is currently high.
    #[inline]
    pub fn asserted(&self) -> bool {
        self.level.load(Ordering::SeqCst) != 0
    }
}

/// The sending side of an IRQ line. Senders can be cloned, whereupon each
/// Sender will share the signal line. The signal is asserted if ANY Sender
/// asserts, and cleared only if ALL Senders have called clear.
#[derive(Debug, Clone)]
pub struct Sender {
    own_signal: bool,
    level: Arc<AtomicIsize>,
    notify: Pending,
    debug_label: &'static str,
}

impl Sender {
    /// Signal an IRQ.
    pub fn assert(&mut self) {
        if self.own_signal {
            return;
        }

        trace!(target: "IRQ", "asserted {}", self.debug_label);

        self.own_signal = true;
        let old_level = self.level.fetch_add(1, Ordering::SeqCst);
        assert!(old_level >= 0);
        if old_level == 0 {
            self.notify.latch.store(true, Ordering::SeqCst);
        }
    }

    /// Clears an IRQ.
    pub fn clear(&mut self) {
        if !self.own_signal {
            return;
        }

        trace!(target: "IRQ", "cleared {}", self.debug_label);

        self.own_signal = false;
        let old_level = self.level.fetch_sub(1, Ordering::SeqCst);
        assert!(old_level > 0);
    }

    /// Check if this sender is setting the signal high.
    #[inline]
    pub fn is_asserting(&self) -> bool {
        self.own_signal
    }
}
