//! Signal handling and teardown hooks.
//!
//! Signal handlers only set a flag on the global [`TeardownRegistry`]. The
//! engine notices the flag at its checkpoints and while polling a running
//! task, kills the task, and then drains the registered hooks on the main
//! thread. Hooks therefore run synchronously and may block on git.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::error::{StageError, StageResult};

pub type Hook = Box<dyn FnMut() + Send>;

/// Hooks to run when a run is torn down, plus the interrupt flag that
/// triggers it.
pub struct TeardownRegistry {
    interrupted: AtomicBool,
    next_id: AtomicU64,
    hooks: Mutex<Vec<(u64, Hook)>>,
}

static GLOBAL: TeardownRegistry = TeardownRegistry::new();

/// Registry the signal handlers report to.
pub fn global() -> &'static TeardownRegistry {
    &GLOBAL
}

impl TeardownRegistry {
    pub const fn new() -> Self {
        Self {
            interrupted: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
            hooks: Mutex::new(Vec::new()),
        }
    }

    /// Add `hook`; it stays registered until the returned guard is dropped.
    pub fn register(&self, hook: Hook) -> HookGuard<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push((id, hook));
        debug!(id, "registered teardown hook");
        HookGuard { registry: self, id }
    }

    /// Remove every registered hook and run each once. Returns how many ran.
    pub fn run_hooks(&self) -> usize {
        let hooks = std::mem::take(&mut *self.lock());
        let count = hooks.len();
        for (id, mut hook) in hooks {
            debug!(id, "running teardown hook");
            hook();
        }
        count
    }

    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Fail with [`StageError::Interrupted`] once a signal has arrived.
    pub fn checkpoint(&self) -> StageResult<()> {
        if self.interrupted() {
            warn!("interrupt received, stopping");
            return Err(StageError::Interrupted);
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(u64, Hook)>> {
        self.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TeardownRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Deregisters its hook on drop.
#[must_use = "dropping the guard deregisters the hook"]
pub struct HookGuard<'a> {
    registry: &'a TeardownRegistry,
    id: u64,
}

impl Drop for HookGuard<'_> {
    fn drop(&mut self) {
        self.registry.lock().retain(|(id, _)| *id != self.id);
    }
}

#[cfg(unix)]
extern "C" fn handle_signal(_sig: i32) {
    GLOBAL.interrupted.store(true, Ordering::SeqCst);
}

/// Route SIGINT, SIGTERM and SIGHUP to the global interrupt flag.
#[cfg(unix)]
#[allow(unsafe_code)]
pub fn install_signal_handlers() {
    use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

    let action = SigAction::new(
        SigHandler::Handler(handle_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    for sig in [Signal::SIGINT, Signal::SIGTERM, Signal::SIGHUP] {
        // SAFETY: the handler only stores to an atomic.
        if let Err(err) = unsafe { signal::sigaction(sig, &action) } {
            warn!(signal = ?sig, err = %err, "failed to install signal handler");
        }
    }
}

#[cfg(not(unix))]
pub fn install_signal_handlers() {}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counting_hook(counter: &Arc<AtomicUsize>) -> Hook {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn hooks_run_once_and_drain() {
        let registry = TeardownRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let _a = registry.register(counting_hook(&counter));
        let _b = registry.register(counting_hook(&counter));

        assert_eq!(registry.run_hooks(), 2);
        assert_eq!(registry.run_hooks(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dropped_guard_deregisters_hook() {
        let registry = TeardownRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let guard = registry.register(counting_hook(&counter));
        drop(guard);

        assert_eq!(registry.run_hooks(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn checkpoint_fails_after_interrupt() {
        let registry = TeardownRegistry::new();
        assert!(registry.checkpoint().is_ok());
        registry.interrupt();
        assert!(matches!(registry.checkpoint(), Err(StageError::Interrupted)));
    }
}
