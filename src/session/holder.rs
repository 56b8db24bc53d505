use crate::cli::globals::GlobalArgs;
use crate::session::{acquire_session, captcha::ChallengeProvider, otp::OtpSource, SessionToken};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{interval, Duration};
use tracing::{error, info, instrument, warn};

/// Process-wide slot holding the current session credential.
///
/// `refresh` runs the full login sequence. At most one run is in flight at
/// a time, and a failed run never clears a previously held credential.
pub struct SessionHolder {
    globals: GlobalArgs,
    captcha: ChallengeProvider,
    otp: Box<dyn OtpSource>,
    current: RwLock<Option<SessionToken>>,
    refreshing: Mutex<()>,
}

impl SessionHolder {
    #[must_use]
    pub fn new(globals: GlobalArgs, captcha: ChallengeProvider, otp: Box<dyn OtpSource>) -> Self {
        Self {
            globals,
            captcha,
            otp,
            current: RwLock::new(None),
            refreshing: Mutex::new(()),
        }
    }

    /// Last published session credential, if any.
    pub async fn current(&self) -> Option<SessionToken> {
        self.current.read().await.clone()
    }

    /// Run one login sequence and publish the credential it produces.
    ///
    /// A refresh triggered while another is already in flight is skipped;
    /// two parallel runs would burn challenge tokens and race on the shared
    /// inbox.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<()> {
        let Ok(_guard) = self.refreshing.try_lock() else {
            warn!("login already in flight; skipping refresh");
            return Ok(());
        };

        let token = acquire_session(&self.globals, &self.captcha, self.otp.as_ref()).await?;

        *self.current.write().await = Some(token);
        info!("session refreshed");

        Ok(())
    }

    /// Refresh once now, then on a fixed schedule.
    pub fn spawn_refresh_loop(self: &Arc<Self>) {
        let holder = Arc::clone(self);

        tokio::spawn(async move {
            let mut refresh_interval =
                interval(Duration::from_secs(holder.globals.refresh_interval));

            loop {
                // first tick fires immediately
                refresh_interval.tick().await;

                if let Err(e) = holder.refresh().await {
                    error!("session refresh failed: {e:#}");
                }
            }
        });
    }
}
