//! In-memory fakes for the auth, navigation and task-store seams, plus a
//! loopback HTTP responder for the wire clients.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use time::OffsetDateTime;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::auth::{AuthClient, AuthError, AuthEvent, AuthEventBus, AuthSubscription, Session, User};
use crate::navigation::{NavigationError, Navigator, Route};
use crate::tasks::{NewTask, Task, TaskError, TaskPatch, TaskRepository};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[must_use]
pub fn sample_user() -> User {
    User { id: Uuid::new_v4(), email: Some("alice@example.com".into()) }
}

#[must_use]
pub fn sample_session(user: User) -> Session {
    Session {
        access_token: "access".into(),
        refresh_token: "refresh".into(),
        token_type: "bearer".into(),
        expires_at: None,
        user,
    }
}

// =============================================================================
// FakeAuth
// =============================================================================

/// Scriptable auth provider. Sign-in/up/out emit the events a real provider
/// would; `emit` injects arbitrary provider events.
pub struct FakeAuth {
    events: AuthEventBus,
    initial: Mutex<Result<Option<Session>, AuthError>>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    next_error: Mutex<Option<AuthError>>,
    sign_in_session: Mutex<Option<Session>>,
    calls: Mutex<Vec<&'static str>>,
}

impl FakeAuth {
    #[must_use]
    pub fn new(initial: Option<Session>) -> Self {
        Self {
            events: AuthEventBus::new(),
            initial: Mutex::new(Ok(initial)),
            gate: Mutex::new(None),
            next_error: Mutex::new(None),
            sign_in_session: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// `get_session` blocks until the returned sender fires (or is dropped).
    #[must_use]
    pub fn gated(initial: Option<Session>) -> (Self, oneshot::Sender<()>) {
        let fake = Self::new(initial);
        let (tx, rx) = oneshot::channel();
        *lock(&fake.gate) = Some(rx);
        (fake, tx)
    }

    pub fn fail_initial(&self, error: AuthError) {
        *lock(&self.initial) = Err(error);
    }

    /// The next credential operation fails with `error`.
    pub fn fail_next(&self, error: AuthError) {
        *lock(&self.next_error) = Some(error);
    }

    /// Session delivered by the next successful sign-in/up.
    pub fn sign_in_as(&self, session: Session) {
        *lock(&self.sign_in_session) = Some(session);
    }

    pub fn emit(&self, event: AuthEvent, session: Option<Session>) {
        self.events.emit(event, session);
    }

    #[must_use]
    pub fn calls(&self) -> Vec<&'static str> {
        lock(&self.calls).clone()
    }

    fn record(&self, call: &'static str) -> Result<(), AuthError> {
        lock(&self.calls).push(call);
        match lock(&self.next_error).take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn signed_in_session(&self) -> Session {
        lock(&self.sign_in_session).clone().unwrap_or_else(|| sample_session(sample_user()))
    }
}

#[async_trait::async_trait]
impl AuthClient for FakeAuth {
    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        lock(&self.calls).push("get_session");
        let gate = lock(&self.gate).take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        lock(&self.initial).clone()
    }

    fn subscribe(&self) -> AuthSubscription {
        self.events.subscribe()
    }

    async fn sign_up(&self, _email: &str, _password: &str) -> Result<(), AuthError> {
        self.record("sign_up")?;
        self.events.emit(AuthEvent::SignedIn, Some(self.signed_in_session()));
        Ok(())
    }

    async fn sign_in_with_password(&self, _email: &str, _password: &str) -> Result<(), AuthError> {
        self.record("sign_in")?;
        self.events.emit(AuthEvent::SignedIn, Some(self.signed_in_session()));
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.record("sign_out")?;
        self.events.emit(AuthEvent::SignedOut, None);
        Ok(())
    }
}

// =============================================================================
// FakeNavigator
// =============================================================================

#[derive(Default)]
pub struct FakeNavigator {
    resets: Mutex<Vec<Route>>,
    pushes: Mutex<Vec<Route>>,
    fail_reset: bool,
    fail_push: bool,
}

impl FakeNavigator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failing_reset() -> Self {
        Self { fail_reset: true, ..Self::default() }
    }

    #[must_use]
    pub fn failing_all() -> Self {
        Self { fail_reset: true, fail_push: true, ..Self::default() }
    }

    #[must_use]
    pub fn resets(&self) -> Vec<Route> {
        lock(&self.resets).clone()
    }

    #[must_use]
    pub fn pushes(&self) -> Vec<Route> {
        lock(&self.pushes).clone()
    }
}

impl Navigator for FakeNavigator {
    fn reset_and_go_to(&self, route: Route) -> Result<(), NavigationError> {
        lock(&self.resets).push(route);
        if self.fail_reset {
            return Err(NavigationError { route, reason: "no navigation stack".into() });
        }
        Ok(())
    }

    fn go_to(&self, route: Route) -> Result<(), NavigationError> {
        lock(&self.pushes).push(route);
        if self.fail_push {
            return Err(NavigationError { route, reason: "navigator unmounted".into() });
        }
        Ok(())
    }
}

// =============================================================================
// MemoryTaskRepo
// =============================================================================

/// Row store keeping every user's tasks, with a deterministic clock that
/// advances one second per write.
pub struct MemoryTaskRepo {
    rows: Mutex<Vec<Task>>,
    clock: Mutex<OffsetDateTime>,
    calls: AtomicUsize,
    next_error: Mutex<Option<TaskError>>,
    hold: Mutex<Option<oneshot::Receiver<()>>>,
}

impl Default for MemoryTaskRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTaskRepo {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            clock: Mutex::new(time::macros::datetime!(2024-05-01 09:00 UTC)),
            calls: AtomicUsize::new(0),
            next_error: Mutex::new(None),
            hold: Mutex::new(None),
        }
    }

    fn tick(&self) -> OffsetDateTime {
        let mut clock = lock(&self.clock);
        *clock += time::Duration::seconds(1);
        *clock
    }

    /// Insert a row directly, bypassing the call counter.
    pub fn seed(&self, user_id: Uuid, title: &str, completed: bool) -> Task {
        let now = self.tick();
        let task = Task {
            id: Uuid::new_v4(),
            title: title.into(),
            description: String::new(),
            completed,
            user_id,
            created_at: now,
            updated_at: now,
        };
        lock(&self.rows).push(task.clone());
        task
    }

    /// The next repository call fails with `error`.
    pub fn fail_next(&self, error: TaskError) {
        *lock(&self.next_error) = Some(error);
    }

    /// The next repository call waits until the returned sender fires.
    #[must_use]
    pub fn hold_next(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *lock(&self.hold) = Some(rx);
        tx
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn rows(&self) -> Vec<Task> {
        lock(&self.rows).clone()
    }

    async fn enter(&self) -> Result<(), TaskError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let hold = lock(&self.hold).take();
        if let Some(hold) = hold {
            let _ = hold.await;
        }
        match lock(&self.next_error).take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl TaskRepository for MemoryTaskRepo {
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Task>, TaskError> {
        self.enter().await?;
        let mut tasks: Vec<Task> = lock(&self.rows).iter().filter(|t| t.user_id == user_id).cloned().collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }

    async fn insert(&self, new_task: NewTask) -> Result<Task, TaskError> {
        self.enter().await?;
        let now = self.tick();
        let task = Task {
            id: Uuid::new_v4(),
            title: new_task.title,
            description: new_task.description,
            completed: false,
            user_id: new_task.user_id,
            created_at: now,
            updated_at: now,
        };
        lock(&self.rows).push(task.clone());
        Ok(task)
    }

    async fn update(&self, id: Uuid, patch: TaskPatch) -> Result<Task, TaskError> {
        self.enter().await?;
        let now = self.tick();
        let mut rows = lock(&self.rows);
        let row = rows.iter_mut().find(|t| t.id == id).ok_or(TaskError::NotFound(id))?;
        patch.apply_to(row);
        row.updated_at = now;
        Ok(row.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), TaskError> {
        self.enter().await?;
        let mut rows = lock(&self.rows);
        let before = rows.len();
        rows.retain(|t| t.id != id);
        if rows.len() == before {
            return Err(TaskError::NotFound(id));
        }
        Ok(())
    }
}

// =============================================================================
// StubServer
// =============================================================================

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Path plus query string, as sent on the request line.
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }
}

/// HTTP/1.1 responder on a loopback port. Answers one connection per scripted
/// `(status, body)` pair, in order, and records what each request carried.
pub struct StubServer {
    pub url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    task: JoinHandle<()>,
}

impl StubServer {
    pub async fn start(responses: Vec<(u16, &str)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let responses: Vec<(u16, String)> = responses.into_iter().map(|(s, b)| (s, b.to_owned())).collect();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&requests);
        let task = tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let Some(request) = read_request(&mut stream).await else {
                    return;
                };
                lock(&recorded).push(request);
                let reply = format!(
                    "HTTP/1.1 {status} Stub\r\n\
                     content-type: application/json\r\n\
                     content-length: {}\r\n\
                     connection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(reply.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        Self { url, requests, task }
    }

    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn read_request(stream: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_len = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_len]).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split(' ');
    let method = request_line.next()?.to_owned();
    let target = request_line.next()?.to_owned();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_owned()))
        .collect();

    let length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < head_len + length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let end = (head_len + length).min(buf.len());
    let body = String::from_utf8_lossy(&buf[head_len..end]).into_owned();

    Some(RecordedRequest { method, target, headers, body })
}
