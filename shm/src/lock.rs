use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use crate::segment::Segment;

/// How long a guard waits for the content lock before proceeding anyway.
pub const CONTENT_LOCK_TIMEOUT: Duration = Duration::from_millis(200);

/// Token for the segment content lock.
///
/// The lock is advisory: acquisition waits up to the timeout and then
/// proceeds without ownership, matching the semantics the virtualization
/// layer has always had. [`ContentLockToken::owned`] reports whether the
/// token really holds the lock so callers can log the degraded case.
pub struct ContentLockToken<'a> {
    word: &'a AtomicU32,
    owned: bool,
}

impl ContentLockToken<'_> {
    pub fn owned(&self) -> bool {
        self.owned
    }
}

impl Drop for ContentLockToken<'_> {
    fn drop(&mut self) {
        if self.owned {
            self.word.store(0, Ordering::Release);
        }
    }
}

impl Segment {
    /// Acquire the advisory content lock, waiting at most `timeout`.
    pub fn lock_content(&self, timeout: Duration) -> ContentLockToken<'_> {
        let word = &self.header().content_lock;
        let deadline = Instant::now() + timeout;
        loop {
            if word
                .compare_exchange(0, 1, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return ContentLockToken { word, owned: true };
            }
            if Instant::now() >= deadline {
                return ContentLockToken { word, owned: false };
            }
            std::hint::spin_loop();
            std::thread::sleep(Duration::from_micros(250));
        }
    }
}
