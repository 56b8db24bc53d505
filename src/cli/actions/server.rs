use crate::cli::{actions::Action, globals::GlobalArgs};
use crate::custode::new;
use crate::session::{
    captcha::ChallengeProvider, holder::SessionHolder, otp::RelayOtpSource,
};
use anyhow::Result;
use std::sync::Arc;

/// Handle the server action
pub async fn handle(action: Action, globals: GlobalArgs) -> Result<()> {
    match action {
        Action::Server { port } => {
            let captcha = ChallengeProvider::new(&globals)?;
            let otp = RelayOtpSource::new(&globals)?;

            let holder = Arc::new(SessionHolder::new(
                globals.clone(),
                captcha,
                Box::new(otp),
            ));
            holder.spawn_refresh_loop();

            new(port, &globals, holder).await?;
        }
    }

    Ok(())
}
