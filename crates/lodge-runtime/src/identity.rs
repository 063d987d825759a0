use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::platform::{CallingIdentity, PlatformRuntime};

/// Serializes every clear-and-restore identity sequence in the process.
static IDENTITY_LOCK: Mutex<()> = Mutex::new(());

/// Elevated context for one platform call.
///
/// Entering clears the ambient calling identity; dropping restores it,
/// on every exit path. Only one scope can be open at a time process-wide,
/// so scopes must never nest.
pub struct IdentityScope<'a> {
    platform: &'a dyn PlatformRuntime,
    saved: Option<CallingIdentity>,
    _exclusive: MutexGuard<'static, ()>,
}

impl<'a> IdentityScope<'a> {
    pub fn enter(platform: &'a dyn PlatformRuntime) -> Self {
        // A panic inside another scope leaves nothing to repair: identity
        // restoration already ran in that scope's drop.
        let exclusive = IDENTITY_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let saved = platform.clear_calling_identity();
        Self {
            platform,
            saved: Some(saved),
            _exclusive: exclusive,
        }
    }
}

impl Drop for IdentityScope<'_> {
    fn drop(&mut self) {
        if let Some(identity) = self.saved.take() {
            self.platform.restore_calling_identity(identity);
        }
    }
}
