//! Device-authorization login flow.
//!
//! `IDLE -> AWAITING_USER -> AUTHED | FAILED`, driven as one spawned task
//! per login attempt. The token cache short-circuits the handshake
//! entirely; otherwise the flow registers an OIDC client, starts device
//! authorization, opens the browser fire-and-forget, and polls the token
//! endpoint until the user approves or the device code expires.

use crate::aws::SsoApi;
use crate::error::SeshError;
use crate::models::{DeviceAuthorization, RequestId};
use crate::session::Event;
use crate::store::Store;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{sleep, Instant};

/// The OIDC token exchange carries no expiry in this design; stored tokens
/// are stamped with a fixed validity instead. There is no refresh path.
pub const TOKEN_VALIDITY_HOURS: i64 = 8;

pub struct AuthOrchestrator {
    client: Arc<dyn SsoApi>,
    store: Store,
    events: UnboundedSender<Event>,
    launch_browser: bool,
}

impl AuthOrchestrator {
    pub fn new(
        client: Arc<dyn SsoApi>,
        store: Store,
        events: UnboundedSender<Event>,
        launch_browser: bool,
    ) -> Self {
        Self {
            client,
            store,
            events,
            launch_browser,
        }
    }

    /// Begin a login for `start_url`. Returns immediately; progress and the
    /// terminal outcome arrive as events tagged with `request_id`.
    pub fn begin_login(&self, start_url: String, request_id: RequestId) {
        let client = self.client.clone();
        let store = self.store.clone();
        let events = self.events.clone();
        let launch_browser = self.launch_browser;

        tokio::spawn(async move {
            run_login(client, store, events, start_url, request_id, launch_browser).await;
        });
    }
}

async fn run_login(
    client: Arc<dyn SsoApi>,
    store: Store,
    events: UnboundedSender<Event>,
    start_url: String,
    request_id: RequestId,
    launch_browser: bool,
) {
    // Token cache hit skips the handshake entirely.
    match store.load_token(&start_url) {
        Ok(Some(token)) => {
            let _ = events.send(Event::AuthSucceeded {
                request_id,
                access_token: token.access_token,
            });
            return;
        }
        Ok(None) => {}
        Err(error) => {
            let _ = events.send(Event::AuthFailed { request_id, error });
            return;
        }
    }

    let (client_id, client_secret) = match client.register_client().await {
        Ok(pair) => pair,
        Err(error) => {
            let _ = events.send(Event::AuthFailed { request_id, error });
            return;
        }
    };

    let auth = match client
        .start_device_authorization(&client_id, &client_secret, &start_url)
        .await
    {
        Ok(auth) => auth,
        Err(error) => {
            let _ = events.send(Event::AuthFailed { request_id, error });
            return;
        }
    };

    let _ = events.send(Event::DeviceAuthStarted {
        request_id: request_id.clone(),
        verification_uri: auth.verification_uri.clone(),
        verification_uri_complete: auth.verification_uri_complete.clone(),
        user_code: auth.user_code.clone(),
        expires_at: auth.expires_at,
    });

    if launch_browser {
        let url = auth.verification_uri_complete.clone();
        tokio::spawn(async move {
            if let Err(e) = crate::browser::open(&url) {
                tracing::warn!("failed to open browser: {e}");
            }
        });
    }

    poll_for_token(client, store, events, auth, request_id).await;
}

async fn poll_for_token(
    client: Arc<dyn SsoApi>,
    store: Store,
    events: UnboundedSender<Event>,
    auth: DeviceAuthorization,
    request_id: RequestId,
) {
    // Deadline on the monotonic clock so pacing and expiry share a
    // timebase.
    let deadline = Instant::now()
        + (auth.expires_at - Utc::now())
            .to_std()
            .unwrap_or_default();
    let mut wait = std::time::Duration::from_secs(auth.interval_secs.max(1));

    loop {
        match client.create_token(&auth).await {
            Ok(token) => {
                let expires_at = Utc::now() + Duration::hours(TOKEN_VALIDITY_HOURS);
                if let Err(e) = store.save_token(&auth.start_url, &token, expires_at) {
                    tracing::warn!("failed to save token to cache: {e}");
                }
                let _ = events.send(Event::AuthSucceeded {
                    request_id,
                    access_token: token,
                });
                return;
            }
            Err(SeshError::AuthorizationPending) => {
                // Keep the current effective interval.
            }
            Err(SeshError::SlowDown) => {
                wait *= 2;
            }
            Err(SeshError::AuthorizationExpired) => {
                let _ = events.send(Event::AuthFailed {
                    request_id,
                    error: SeshError::AuthorizationExpired,
                });
                return;
            }
            Err(error) => {
                let _ = events.send(Event::AuthFailed { request_id, error });
                return;
            }
        }

        if Instant::now() >= deadline {
            let _ = events.send(Event::AuthFailed {
                request_id,
                error: SeshError::AuthenticationTimedOut,
            });
            return;
        }

        let _ = events.send(Event::AuthPollTick {
            request_id: request_id.clone(),
            remaining_secs: (auth.expires_at - Utc::now()).num_seconds().max(0),
        });
        sleep(wait).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::mock::{MockSsoApi, TokenStep};
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    const START_URL: &str = "https://acme.awsapps.com/start";

    fn setup(
        mock: MockSsoApi,
    ) -> (
        Arc<MockSsoApi>,
        Store,
        AuthOrchestrator,
        mpsc::UnboundedReceiver<Event>,
        TempDir,
    ) {
        let dir = TempDir::new().unwrap();
        let store = Store::at_dir(dir.path());
        let client = Arc::new(mock);
        let (tx, rx) = mpsc::unbounded_channel();
        let orchestrator =
            AuthOrchestrator::new(client.clone() as Arc<dyn SsoApi>, store.clone(), tx, false);
        (client, store, orchestrator, rx, dir)
    }

    #[tokio::test(start_paused = true)]
    async fn first_time_login_polls_until_token_and_persists() {
        let mock = MockSsoApi::new().with_token_script(vec![
            TokenStep::Pending,
            TokenStep::Ok("tok-xyz".to_string()),
        ]);
        let (client, store, orchestrator, mut rx, _dir) = setup(mock);

        let login_time = Utc::now();
        let request_id = RequestId::new("acme");
        orchestrator.begin_login(START_URL.to_string(), request_id.clone());

        match rx.recv().await.unwrap() {
            Event::DeviceAuthStarted {
                verification_uri,
                user_code,
                ..
            } => {
                assert_eq!(verification_uri, "https://device.sso.eu-north-1.amazonaws.com/");
                assert_eq!(user_code, "ABCD-1234");
            }
            other => panic!("expected DeviceAuthStarted, got {other:?}"),
        }

        assert!(matches!(
            rx.recv().await.unwrap(),
            Event::AuthPollTick { .. }
        ));

        match rx.recv().await.unwrap() {
            Event::AuthSucceeded {
                request_id: id,
                access_token,
            } => {
                assert_eq!(id, request_id);
                assert_eq!(access_token, "tok-xyz");
            }
            other => panic!("expected AuthSucceeded, got {other:?}"),
        }

        let token = store.load_token(START_URL).unwrap().unwrap();
        assert_eq!(token.access_token, "tok-xyz");
        let validity = token.expires_at - login_time;
        assert!(validity >= Duration::hours(8) - Duration::minutes(1));
        assert!(validity <= Duration::hours(8));

        assert_eq!(client.register_calls(), 1);
        assert_eq!(client.create_token_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cached_token_short_circuits_the_handshake() {
        let (client, store, orchestrator, mut rx, _dir) = setup(MockSsoApi::new());

        store
            .save_token(START_URL, "tok-xyz", Utc::now() + Duration::minutes(30))
            .unwrap();

        orchestrator.begin_login(START_URL.to_string(), RequestId::new("acme"));

        match rx.recv().await.unwrap() {
            Event::AuthSucceeded { access_token, .. } => assert_eq!(access_token, "tok-xyz"),
            other => panic!("expected AuthSucceeded, got {other:?}"),
        }

        assert_eq!(client.register_calls(), 0);
        assert_eq!(client.create_token_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_cached_token_triggers_full_handshake() {
        let mock =
            MockSsoApi::new().with_token_script(vec![TokenStep::Ok("tok-new".to_string())]);
        let (client, store, orchestrator, mut rx, _dir) = setup(mock);

        store
            .save_token(START_URL, "tok-old", Utc::now() - Duration::minutes(1))
            .unwrap();

        orchestrator.begin_login(START_URL.to_string(), RequestId::new("acme"));

        assert!(matches!(
            rx.recv().await.unwrap(),
            Event::DeviceAuthStarted { .. }
        ));
        match rx.recv().await.unwrap() {
            Event::AuthSucceeded { access_token, .. } => assert_eq!(access_token, "tok-new"),
            other => panic!("expected AuthSucceeded, got {other:?}"),
        }
        assert_eq!(client.register_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn device_code_expiry_fails_with_timeout_and_writes_nothing() {
        // Empty script: every poll answers AuthorizationPending.
        let mock = MockSsoApi::new().with_device_expires_in(600);
        let (_client, store, orchestrator, mut rx, _dir) = setup(mock);

        orchestrator.begin_login(START_URL.to_string(), RequestId::new("acme"));

        loop {
            match rx.recv().await.unwrap() {
                Event::DeviceAuthStarted { .. } | Event::AuthPollTick { .. } => continue,
                Event::AuthFailed { error, .. } => {
                    assert!(matches!(error, SeshError::AuthenticationTimedOut));
                    break;
                }
                other => panic!("unexpected event {other:?}"),
            }
        }

        assert!(store.load_token(START_URL).unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_device_code_error_is_terminal() {
        let mock = MockSsoApi::new().with_token_script(vec![TokenStep::Expired]);
        let (_client, store, orchestrator, mut rx, _dir) = setup(mock);

        orchestrator.begin_login(START_URL.to_string(), RequestId::new("acme"));

        loop {
            match rx.recv().await.unwrap() {
                Event::DeviceAuthStarted { .. } => continue,
                Event::AuthFailed { error, .. } => {
                    assert!(matches!(error, SeshError::AuthorizationExpired));
                    break;
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert!(store.load_token(START_URL).unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_down_doubles_the_polling_interval() {
        let mock = MockSsoApi::new().with_token_script(vec![
            TokenStep::Pending,
            TokenStep::SlowDown,
            TokenStep::Pending,
            TokenStep::Ok("tok".to_string()),
        ]);
        let (client, _store, orchestrator, mut rx, _dir) = setup(mock);

        orchestrator.begin_login(START_URL.to_string(), RequestId::new("acme"));

        loop {
            match rx.recv().await.unwrap() {
                Event::AuthSucceeded { .. } => break,
                Event::AuthFailed { error, .. } => panic!("login failed: {error}"),
                _ => continue,
            }
        }

        let instants = client.token_call_instants();
        assert_eq!(instants.len(), 4);
        let gaps: Vec<std::time::Duration> =
            instants.windows(2).map(|w| w[1] - w[0]).collect();
        // Pending keeps the server interval; SlowDown doubles it and the
        // doubled interval sticks.
        assert_eq!(gaps[0], std::time::Duration::from_secs(5));
        assert_eq!(gaps[1], std::time::Duration::from_secs(10));
        assert_eq!(gaps[2], std::time::Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn api_error_during_polling_is_terminal() {
        let mock = MockSsoApi::new()
            .with_token_script(vec![TokenStep::Fail("InternalServerException".to_string())]);
        let (_client, _store, orchestrator, mut rx, _dir) = setup(mock);

        orchestrator.begin_login(START_URL.to_string(), RequestId::new("acme"));

        loop {
            match rx.recv().await.unwrap() {
                Event::DeviceAuthStarted { .. } => continue,
                Event::AuthFailed { error, .. } => {
                    assert!(matches!(error, SeshError::AwsSdk(_)));
                    break;
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
    }
}
