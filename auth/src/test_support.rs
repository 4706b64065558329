//! Scriptable provider and profile-store doubles for store tests, plus a
//! minimal HTTP stub for the backend clients.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Notify, Semaphore, watch};
use uuid::Uuid;

use crate::error::ProviderError;
use crate::provider::{EventHub, IdentityProvider, ProfileStore, Subscription};
use crate::store::AuthViewState;
use crate::types::{AuthEvent, AuthResponse, Identity, NewProfile, OAuthRedirect, Profile, Session, unix_now};

pub fn identity(id: Uuid, email: &str) -> Identity {
    Identity {
        id,
        email: Some(email.to_owned()),
        phone: None,
        user_metadata: HashMap::new(),
        app_metadata: HashMap::new(),
    }
}

pub fn session_for(user: Identity) -> Session {
    Session {
        access_token: format!("access-{}", user.id),
        refresh_token: "refresh".into(),
        token_type: "bearer".into(),
        expires_in: 3600,
        expires_at: Some(4_000_000_000),
        user,
    }
}

pub fn profile(id: Uuid, name: &str, is_admin: bool) -> Profile {
    Profile {
        id,
        email: format!("{name}@example.com"),
        name: name.to_owned(),
        phone: None,
        avatar_url: None,
        is_admin,
        created_at: None,
        updated_at: None,
    }
}

pub fn transport() -> ProviderError {
    ProviderError::Transport("connection refused".into())
}

pub fn rejected(message: &str) -> ProviderError {
    ProviderError::Api { status: 400, code: None, message: message.to_owned() }
}

/// Block until `pred` holds for the published state, failing after two seconds.
pub async fn wait_until<F>(rx: &mut watch::Receiver<AuthViewState>, pred: F) -> AuthViewState
where
    F: FnMut(&AuthViewState) -> bool,
{
    let state = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(pred))
        .await
        .expect("timed out waiting for auth state")
        .expect("state channel closed");
    state.clone()
}

/// Optional gate a mock call waits on until the test releases it.
#[derive(Default)]
pub struct Gate {
    permits: Option<Arc<Semaphore>>,
    entered: Arc<Notify>,
}

impl Gate {
    pub fn closed() -> Self {
        Self { permits: Some(Arc::new(Semaphore::new(0))), entered: Arc::new(Notify::new()) }
    }

    pub fn release(&self) {
        if let Some(permits) = &self.permits {
            permits.add_permits(1);
        }
    }

    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    async fn pass(&self) {
        self.entered.notify_one();
        if let Some(permits) = &self.permits {
            permits.acquire().await.expect("gate closed").forget();
        }
    }
}

// =============================================================================
// MockProvider
// =============================================================================

pub struct MockProvider {
    pub hub: EventHub,
    pub probe: Mutex<Result<Option<Session>, ProviderError>>,
    pub probe_gate: Gate,
    pub sign_in: Mutex<Option<Result<Session, ProviderError>>>,
    pub sign_up: Mutex<Option<Result<AuthResponse, ProviderError>>>,
    pub oauth: Mutex<Option<ProviderError>>,
    pub sign_out: Mutex<Option<ProviderError>>,
    pub calls: AtomicUsize,
    pub last_redirect: Mutex<Option<String>>,
}

impl MockProvider {
    pub fn new(probe: Result<Option<Session>, ProviderError>) -> Self {
        Self::gated(probe, Gate::default())
    }

    pub fn gated(probe: Result<Option<Session>, ProviderError>, probe_gate: Gate) -> Self {
        Self {
            hub: EventHub::new(),
            probe: Mutex::new(probe),
            probe_gate,
            sign_in: Mutex::new(None),
            sign_up: Mutex::new(None),
            oauth: Mutex::new(None),
            sign_out: Mutex::new(None),
            calls: AtomicUsize::new(0),
            last_redirect: Mutex::new(None),
        }
    }

    pub fn emit(&self, event: AuthEvent) {
        self.hub.emit(event);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl IdentityProvider for MockProvider {
    async fn get_session(&self) -> Result<Option<Session>, ProviderError> {
        self.probe_gate.pass().await;
        self.probe.lock().unwrap().clone()
    }

    fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    async fn sign_in_with_password(&self, email: &str, _password: &str) -> Result<AuthResponse, ProviderError> {
        self.record();
        let scripted = self.sign_in.lock().unwrap().clone();
        let session = match scripted {
            Some(result) => result?,
            None => session_for(identity(Uuid::new_v4(), email)),
        };
        self.hub.emit(AuthEvent::SignedIn(session.clone()));
        Ok(AuthResponse::from_session(session))
    }

    async fn sign_up(&self, email: &str, _password: &str, _name: &str) -> Result<AuthResponse, ProviderError> {
        self.record();
        let scripted = self.sign_up.lock().unwrap().clone();
        match scripted {
            Some(result) => result,
            None => Ok(AuthResponse::from_session(session_for(identity(Uuid::new_v4(), email)))),
        }
    }

    async fn sign_in_with_oauth(&self, provider: &str, redirect_to: &str) -> Result<OAuthRedirect, ProviderError> {
        self.record();
        *self.last_redirect.lock().unwrap() = Some(redirect_to.to_owned());
        if let Some(err) = self.oauth.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(OAuthRedirect { provider: provider.to_owned(), url: format!("https://idp.example/{provider}") })
    }

    async fn exchange_code(&self, code: &str) -> Result<Session, ProviderError> {
        self.record();
        let session = session_for(identity(Uuid::new_v4(), &format!("{code}@oauth.example")));
        self.hub.emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.record();
        if let Some(err) = self.sign_out.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(())
    }
}

// =============================================================================
// MockProfiles
// =============================================================================

#[derive(Default)]
pub struct MockProfiles {
    pub rows: Mutex<HashMap<Uuid, Profile>>,
    pub fetch_error: Mutex<Option<ProviderError>>,
    pub insert_error: Mutex<Option<ProviderError>>,
    pub inserted: Mutex<Vec<NewProfile>>,
    pub fetch_gate: Gate,
}

impl MockProfiles {
    pub fn with_rows(rows: impl IntoIterator<Item = Profile>) -> Self {
        let profiles = Self::default();
        profiles
            .rows
            .lock()
            .unwrap()
            .extend(rows.into_iter().map(|p| (p.id, p)));
        profiles
    }

    pub fn gated(fetch_gate: Gate) -> Self {
        Self { fetch_gate, ..Self::default() }
    }
}

#[async_trait::async_trait]
impl ProfileStore for MockProfiles {
    async fn fetch_profile(&self, id: Uuid) -> Result<Option<Profile>, ProviderError> {
        self.fetch_gate.pass().await;
        if let Some(err) = self.fetch_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self.rows.lock().unwrap().get(&id).cloned())
    }

    async fn insert_profile(&self, profile: &NewProfile) -> Result<(), ProviderError> {
        self.inserted.lock().unwrap().push(profile.clone());
        if let Some(err) = self.insert_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(())
    }
}

// =============================================================================
// StubServer
// =============================================================================

/// One request as the stub received it. Header names are lowercased.
#[derive(Debug, Clone)]
pub struct StubRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl StubRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("request body is not JSON")
    }
}

#[derive(Debug, Clone)]
pub struct StubReply {
    pub status: u16,
    pub body: String,
    pub delay: Duration,
}

impl StubReply {
    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        Self { status, body: body.to_string(), delay: Duration::ZERO }
    }

    pub fn empty(status: u16) -> Self {
        Self { status, body: String::new(), delay: Duration::ZERO }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

type Route = dyn Fn(&StubRequest) -> StubReply + Send + Sync;

/// HTTP/1.1 server on an ephemeral local port answering from `route`, one
/// thread per connection. Every request is recorded.
pub struct StubServer {
    pub url: String,
    requests: Arc<Mutex<Vec<StubRequest>>>,
}

impl StubServer {
    pub fn start<F>(route: F) -> Self
    where
        F: Fn(&StubRequest) -> StubReply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub server");
        let url = format!("http://{}", listener.local_addr().expect("stub address"));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let route: Arc<Route> = Arc::new(route);
        let recorded = Arc::clone(&requests);
        std::thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let route = Arc::clone(&route);
                let recorded = Arc::clone(&recorded);
                std::thread::spawn(move || serve(stream, &*route, &recorded));
            }
        });
        Self { url, requests }
    }

    pub fn requests(&self) -> Vec<StubRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests whose target starts with `prefix`.
    pub fn hits(&self, prefix: &str) -> Vec<StubRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.target.starts_with(prefix))
            .collect()
    }
}

fn serve(stream: TcpStream, route: &Route, recorded: &Mutex<Vec<StubRequest>>) {
    let mut reader = BufReader::new(stream);
    let Some(request) = read_request(&mut reader) else {
        return;
    };
    recorded.lock().unwrap().push(request.clone());
    let reply = route(&request);
    std::thread::sleep(reply.delay);
    let response = format!(
        "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        reply.status,
        reply.body.len(),
        reply.body
    );
    let _ = reader.get_mut().write_all(response.as_bytes());
}

fn read_request(reader: &mut BufReader<TcpStream>) -> Option<StubRequest> {
    let mut line = String::new();
    reader.read_line(&mut line).ok()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_owned();
    let target = parts.next()?.to_owned();

    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).ok()?;
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        let (name, value) = line.split_once(':')?;
        headers.push((name.trim().to_ascii_lowercase(), value.trim().to_owned()));
    }

    let length = headers
        .iter()
        .find(|(name, _)| name == "content-length")
        .and_then(|(_, value)| value.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0; length];
    reader.read_exact(&mut body).ok()?;
    Some(StubRequest { method, target, headers, body: String::from_utf8_lossy(&body).into_owned() })
}

/// Token endpoint body for `user`, shaped like a real identity API answer.
pub fn token_body(access_token: &str, refresh_token: &str, user: &Identity) -> serde_json::Value {
    serde_json::json!({
        "access_token": access_token,
        "token_type": "bearer",
        "expires_in": 3600,
        "expires_at": unix_now() + 3600,
        "refresh_token": refresh_token,
        "user": {
            "id": user.id,
            "aud": "authenticated",
            "role": "authenticated",
            "email": user.email,
            "app_metadata": { "provider": "email", "providers": ["email"] },
            "user_metadata": { "name": "Ana" },
            "created_at": "2024-01-01T00:00:00Z"
        }
    })
}
