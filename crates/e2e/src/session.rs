//! Scoped ownership of one page for one test
//!
//! Opening a session launches a fresh target and attaches the observation
//! sidecar before handing it out, so no navigation can happen ahead of the
//! listeners. Dropping a session without `close` schedules the close on the
//! current tokio runtime, so drivers still holding the target see
//! `TargetClosed` rather than a live page.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::driver::PageDriver;
use crate::error::E2eResult;
use crate::events::DialogPolicy;
use crate::sidecar::ObservationSidecar;
use crate::target::Target;

/// Produces a fresh, isolated page per call
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self) -> E2eResult<Arc<dyn Target>>;
}

pub struct Session {
    target: Arc<dyn Target>,
    sidecar: ObservationSidecar,
    closed: bool,
}

impl Session {
    /// Launch a page, apply the dialog policy and attach the sidecar
    pub async fn open(launcher: &dyn Launcher, dialog_policy: DialogPolicy) -> E2eResult<Self> {
        let target = launcher.launch().await?;
        target.set_dialog_policy(dialog_policy).await?;
        let sidecar = ObservationSidecar::attach(target.as_ref());
        debug!("Session opened");

        Ok(Self {
            target,
            sidecar,
            closed: false,
        })
    }

    pub fn target(&self) -> Arc<dyn Target> {
        Arc::clone(&self.target)
    }

    pub fn sidecar(&self) -> &ObservationSidecar {
        &self.sidecar
    }

    /// A driver for `url` on this session's page
    pub fn driver(&self, url: impl Into<String>) -> PageDriver {
        PageDriver::new(self.target(), url)
    }

    /// Close the page. Dropping the session without calling this still
    /// closes it in a spawned task, without waiting for the result.
    pub async fn close(mut self) -> E2eResult<()> {
        self.closed = true;
        self.target.close().await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                warn!("Session dropped without close; closing page in background");
                let target = Arc::clone(&self.target);
                runtime.spawn(async move {
                    if let Err(e) = target.close().await {
                        warn!("Failed to close dropped session: {}", e);
                    }
                });
            }
            Err(_) => warn!(
                "Session dropped without close outside a runtime; page released with its last handle"
            ),
        }
    }
}
