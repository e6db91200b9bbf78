//! Readiness bits reported by `poll_query`.

use bitflags::bitflags;

bitflags! {
    /// Poll readiness mask, in the spirit of `POLLIN`/`POLLOUT`/`POLLHUP`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PollEvents: u32 {
        /// An unread event exists and notifications are enabled.
        const READABLE = 1 << 0;
        /// The device accepts another write.
        const WRITABLE = 1 << 2;
        /// The device has been torn down.
        const HANGUP = 1 << 4;
    }
}

impl PollEvents {
    /// Whether any bit of `interest` is set, always counting a hangup.
    #[inline]
    pub fn satisfies(self, interest: PollEvents) -> bool {
        self.intersects(interest | PollEvents::HANGUP)
    }
}
