//! Fire-and-forget browser launching. Failures are never fatal; callers
//! keep the URL on screen so the user can open it by hand.

use crate::error::{Result, SeshError};

pub fn open(url: &str) -> Result<()> {
    webbrowser::open(url).map_err(|e| SeshError::BrowserLaunchFailed(e.to_string()))
}
