//! Session and error signals shared between the REST layer and risk logic
//!
//! The REST collaborator raises these flags; the feed path and the exposure
//! engine read them. One instance is shared by `Arc` across both sides.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct SessionFlags {
    need_session_token: AtomicBool,
    too_much_data: AtomicBool,
    deny_betting: AtomicBool,
}

impl SessionFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// The session token expired or was rejected and must be renewed.
    pub fn need_session_token(&self) -> bool {
        self.need_session_token.load(Ordering::Acquire)
    }

    pub fn set_need_session_token(&self, value: bool) {
        self.need_session_token.store(value, Ordering::Release);
    }

    /// A request asked for more data than the exchange allows.
    pub fn too_much_data(&self) -> bool {
        self.too_much_data.load(Ordering::Acquire)
    }

    pub fn set_too_much_data(&self, value: bool) {
        self.too_much_data.store(value, Ordering::Release);
    }

    /// New placements must not be issued; cancellations still are.
    pub fn deny_betting(&self) -> bool {
        self.deny_betting.load(Ordering::Acquire)
    }

    pub fn set_deny_betting(&self, value: bool) {
        self.deny_betting.store(value, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_flags_default_clear() {
        let flags = SessionFlags::new();
        assert!(!flags.need_session_token());
        assert!(!flags.too_much_data());
        assert!(!flags.deny_betting());
    }

    #[test]
    fn test_flags_visible_across_threads() {
        let flags = Arc::new(SessionFlags::new());
        let writer = Arc::clone(&flags);
        thread::spawn(move || {
            writer.set_deny_betting(true);
            writer.set_need_session_token(true);
        })
        .join()
        .unwrap();

        assert!(flags.deny_betting());
        assert!(flags.need_session_token());
        assert!(!flags.too_much_data());
    }
}
