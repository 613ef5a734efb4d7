use std::io;
use std::thread;

use tracing::{debug, warn};

use crate::ProcessorId;
use crate::pal::{Platform, PlatformFacade};

/// Pins the current thread to one processor for as long as the guard lives, then restores the
/// affinity the thread had before.
///
/// Pinning is best effort. If it fails, the thread keeps running unpinned.
#[derive(Debug)]
pub(crate) struct PinGuard<'a> {
    platform: &'a PlatformFacade,
    previous: Option<Vec<ProcessorId>>,
}

impl<'a> PinGuard<'a> {
    pub(crate) fn pin_current_thread(platform: &'a PlatformFacade, processor_id: ProcessorId) -> Self {
        let previous = match platform.current_thread_processors() {
            Ok(previous) => Some(previous),
            Err(error) => {
                debug!(processor_id, %error, "cannot inspect thread affinity");
                None
            }
        };

        if let Err(error) = platform.pin_current_thread_to(&[processor_id]) {
            if error.kind() == io::ErrorKind::Unsupported {
                debug!(processor_id, %error, "thread pinning not available; running unpinned");
            } else {
                warn!(processor_id, %error, "failed to pin worker thread; running unpinned");
            }

            return Self {
                platform,
                previous: None,
            };
        }

        Self { platform, previous }
    }

    #[cfg(test)]
    pub(crate) fn is_pinned(&self) -> bool {
        self.previous.is_some()
    }
}

impl Drop for PinGuard<'_> {
    fn drop(&mut self) {
        let Some(previous) = self.previous.take() else {
            return;
        };

        if let Err(error) = self.platform.pin_current_thread_to(&previous) {
            debug!(%error, "failed to restore thread affinity");
        }
    }
}

/// The processors the current thread may run on, which become the default worker set.
pub(crate) fn detect_processors(platform: &PlatformFacade) -> Vec<ProcessorId> {
    match platform.current_thread_processors() {
        Ok(processors) if !processors.is_empty() => processors,
        Ok(_) => fallback_processors(),
        Err(error) => {
            debug!(%error, "cannot inspect thread affinity; using all processors");
            fallback_processors()
        }
    }
}

fn fallback_processors() -> Vec<ProcessorId> {
    let count = thread::available_parallelism()
        .ok()
        .and_then(|count| ProcessorId::try_from(count.get()).ok())
        .unwrap_or(1);

    (0..count).collect()
}
