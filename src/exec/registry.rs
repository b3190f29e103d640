// src/exec/registry.rs

//! Process-wide handle to the active [`ProcessRunner`].
//!
//! The composition root calls [`install`] once. Code deep in the call graph
//! that has no runner passed to it can fall back to [`active`]. Tests use
//! [`override_runner`] to swap in a fake.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::errors::{PhpmonError, Result};

use super::real::RealShell;
use super::runner::ProcessRunner;

static ACTIVE: RwLock<Option<Arc<dyn ProcessRunner>>> = RwLock::new(None);

/// Install the runner for this process. Fails if one is already installed.
pub fn install(runner: Arc<dyn ProcessRunner>) -> Result<()> {
    let mut slot = ACTIVE.write().unwrap_or_else(PoisonError::into_inner);
    if slot.is_some() {
        return Err(PhpmonError::AlreadyInstalled("process runner"));
    }
    *slot = Some(runner);
    debug!("process runner installed");
    Ok(())
}

/// Replace the installed runner unconditionally.
///
/// Intended for test setup; production code should use [`install`].
pub fn override_runner(runner: Arc<dyn ProcessRunner>) {
    *ACTIVE.write().unwrap_or_else(PoisonError::into_inner) = Some(runner);
    debug!("process runner overridden");
}

/// The installed runner, or a default [`RealShell`] if none was installed.
pub fn active() -> Arc<dyn ProcessRunner> {
    if let Some(runner) = ACTIVE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
    {
        return Arc::clone(runner);
    }

    let mut slot = ACTIVE.write().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(slot.get_or_insert_with(|| Arc::new(RealShell::default())))
}
