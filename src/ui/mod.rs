//! Ratatui shell over the session controller.

mod app;

use crate::aws::SdkClientFactory;
use crate::error::Result;
use crate::session::SessionController;
use crate::store::Store;
use app::App;
use std::sync::Arc;

pub async fn run(region_override: Option<String>, profile_override: Option<String>) -> Result<()> {
    let store = Store::new()?;
    let (mut controller, events_rx) =
        SessionController::new(store, Arc::new(SdkClientFactory), true);
    controller.set_region_override(region_override);
    controller.set_credential_profile_override(profile_override);
    controller.load_profiles();

    let app = App::new(controller, events_rx);
    let controller = app.run().await?;

    // Back on the normal screen: clear an abandoned login and echo the
    // session details for the scrollback.
    controller.clear_token_on_abandon();
    if let Some(session) = controller.active_session() {
        println!();
        println!("  SSO Profile: {}", session.profile_name);
        println!(
            "  Account:     {} ({})",
            session.account_name, session.account_id
        );
        println!("  Role:        {}", session.role_name);
        println!("  Region:      {}", session.region);
        println!();
    }

    Ok(())
}
