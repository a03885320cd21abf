//! RAII hold on a session's byte-range lock.

use super::session::LockSession;
use crate::error::Result;
use crate::fs::SharedFile;
use std::ops::{Deref, DerefMut};

/// Holds the byte-range lock for as long as it lives.
///
/// Operations called through the guard nest inside the hold, so a sequence
/// like "list the locks, then set ours" is atomic with respect to other
/// sessions. When dropped, the matching `release` happens automatically.
pub struct SessionHold<'a, F: SharedFile> {
    session: &'a mut LockSession<F>,
}

impl<F: SharedFile> LockSession<F> {
    /// Acquire and return a guard that releases on drop.
    pub fn hold(&mut self) -> Result<SessionHold<'_, F>> {
        self.acquire()?;
        Ok(SessionHold { session: self })
    }
}

impl<F: SharedFile> SessionHold<'_, F> {
    /// Release now instead of at the end of the scope.
    pub fn release(self) {
        drop(self);
    }
}

impl<F: SharedFile> Deref for SessionHold<'_, F> {
    type Target = LockSession<F>;

    fn deref(&self) -> &Self::Target {
        self.session
    }
}

impl<F: SharedFile> DerefMut for SessionHold<'_, F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session
    }
}

impl<F: SharedFile> Drop for SessionHold<'_, F> {
    fn drop(&mut self) {
        // A close inside the hold already dropped the byte range.
        if self.session.depth > 0 {
            self.session.release_inner();
        }
    }
}
