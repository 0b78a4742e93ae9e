// src/cancel.rs
//! Stopping blocking scans whose requester has given up.
//!
//! Work handed to the blocking pool keeps running after the future awaiting it is dropped, so long
//! scans poll a shared [`Cancel`] flag between units of work instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::{Error, Result};

/// A cancellation flag shared between a requester and the scan it started.
#[derive(Clone, Debug, Default)]
pub struct Cancel(Arc<AtomicBool>);

impl Cancel {
    /// A flag that isn't set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the scan to stop at its next check.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether [`cancel`](Self::cancel) was called on this flag or any clone of it.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail with [`Error::Cancelled`] once the flag is set.
    ///
    /// # Errors
    ///
    /// [`Error::Cancelled`] after [`cancel`](Self::cancel).
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::Error;

    use super::Cancel;

    #[test]
    fn clones_share_the_flag() {
        let cancel = Cancel::new();
        let scan = cancel.clone();
        assert!(scan.check().is_ok());

        cancel.cancel();
        assert!(scan.is_cancelled());
        assert!(matches!(scan.check(), Err(Error::Cancelled)));
    }
}
