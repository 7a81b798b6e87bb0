//! Per-manager diagnostic slot (`spec.md` §7: "an error string is stored
//! in a per-manager diagnostic slot that the next caller can
//! retrieve-and-clear").

use yanet_lib::SpinLock;

pub struct Diagnostics {
    slot: SpinLock<Option<String>>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics {
    pub fn new() -> Self {
        Self { slot: SpinLock::new(None) }
    }

    pub fn report(&self, message: impl Into<String>) {
        *self.slot.lock() = Some(message.into());
    }

    /// Retrieve and clear in one step, so a second caller never sees a
    /// stale message left by the first.
    pub fn take(&self) -> Option<String> {
        self.slot.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_clears_the_slot() {
        let d = Diagnostics::new();
        d.report("boom");
        assert_eq!(d.take().as_deref(), Some("boom"));
        assert_eq!(d.take(), None);
    }
}
