//! Connection manager: one resilient logical connection per service id
//!
//! Each logical connection runs a driver task owning its session, rotator
//! and retry state. Every failure — failed open, transport error, peer
//! close — takes the identical retry path: advance the endpoint rotation,
//! wait out the backoff, reopen. Consecutive failures are bounded by a
//! retry ceiling; reaching it emits exactly one [`ManagerEvent::GiveUp`]
//! and parks the record until `connect` is called again. Records are
//! removed only by explicit `close`, never implicitly on failure.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::conn::session::{Dialer, Session, SessionEvent};
use crate::error::WardenError;
use crate::resilience::{BackoffPolicy, EndpointRotator};

/// Connection lifecycle states per service id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

/// High-level connectivity events surfaced to application code.
///
/// These are the single source of truth for connectivity state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerEvent {
    Connected { service: String },
    Disconnected { service: String },
    GiveUp { service: String },
}

/// Snapshot of one logical connection's record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStatus {
    pub state: ConnState,
    pub endpoint_index: usize,
    pub retry_count: u32,
}

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Default endpoint set for services that do not pass their own
    pub endpoints: Vec<String>,
    /// Per-attempt open timeout
    pub connect_timeout: Duration,
    /// Backoff between reconnection attempts
    pub backoff: BackoffPolicy,
    /// Consecutive failures before a logical connection gives up
    pub retry_ceiling: u32,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            connect_timeout: Duration::from_secs(5),
            backoff: BackoffPolicy::default(),
            retry_ceiling: 10,
        }
    }
}

enum ServiceCmd {
    Connect,
    Send(Vec<u8>, oneshot::Sender<bool>),
    Close(oneshot::Sender<()>),
    Status(oneshot::Sender<ServiceStatus>),
}

struct ServiceHandle {
    cmd_tx: mpsc::Sender<ServiceCmd>,
    task: JoinHandle<()>,
}

/// Orchestrates rotator + backoff + session per logical service id.
///
/// Explicitly constructed and passed to whoever needs it; there is no
/// process-wide singleton.
pub struct ConnectionManager<D: Dialer + Clone> {
    dialer: D,
    config: ManagerConfig,
    services: HashMap<String, ServiceHandle>,
    event_tx: mpsc::Sender<ManagerEvent>,
}

impl<D: Dialer + Clone> ConnectionManager<D> {
    /// Returns the manager and the stream of its connectivity events.
    pub fn new(dialer: D, config: ManagerConfig) -> (Self, mpsc::Receiver<ManagerEvent>) {
        let (event_tx, event_rx) = mpsc::channel(64);
        (
            Self {
                dialer,
                config,
                services: HashMap::new(),
                event_tx,
            },
            event_rx,
        )
    }

    /// Establish (or re-establish) the named logical connection.
    ///
    /// `endpoints` overrides the manager's default set for this service.
    /// For a service that previously gave up, this restarts the retry
    /// cycle with a fresh retry count. Fails with a configuration error
    /// if the effective endpoint set is empty.
    pub fn connect(
        &mut self,
        service: &str,
        endpoints: Option<Vec<String>>,
    ) -> Result<(), WardenError> {
        if let Some(handle) = self.services.get(service) {
            if !handle.task.is_finished() {
                let _ = handle.cmd_tx.try_send(ServiceCmd::Connect);
                return Ok(());
            }
            self.services.remove(service);
        }

        let endpoints = endpoints.unwrap_or_else(|| self.config.endpoints.clone());
        let rotator = EndpointRotator::new(endpoints)?;

        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let driver = ServiceDriver {
            service: service.to_string(),
            dialer: self.dialer.clone(),
            rotator,
            backoff: self.config.backoff.clone(),
            connect_timeout: self.config.connect_timeout,
            retry_ceiling: self.config.retry_ceiling,
            retry_count: 0,
            state: ConnState::Connecting,
            events: self.event_tx.clone(),
        };
        let task = tokio::spawn(driver.run(cmd_rx));

        self.services
            .insert(service.to_string(), ServiceHandle { cmd_tx, task });
        Ok(())
    }

    /// Deliver a payload over the active session.
    ///
    /// Returns `false` if the service is unknown or not connected. There
    /// is no buffering or store-and-forward.
    pub async fn send(&self, service: &str, payload: Vec<u8>) -> bool {
        let Some(handle) = self.services.get(service) else {
            return false;
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        if handle
            .cmd_tx
            .send(ServiceCmd::Send(payload, reply_tx))
            .await
            .is_err()
        {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }

    /// Close the logical connection and remove its record.
    ///
    /// Cancels a pending reconnect timer if one is running.
    pub async fn close(&mut self, service: &str) {
        if let Some(handle) = self.services.remove(service) {
            let (reply_tx, reply_rx) = oneshot::channel();
            if handle.cmd_tx.send(ServiceCmd::Close(reply_tx)).await.is_ok() {
                let _ = reply_rx.await;
            }
            let _ = handle.task.await;
        }
    }

    /// Snapshot of one service's record, if tracked.
    pub async fn status(&self, service: &str) -> Option<ServiceStatus> {
        let handle = self.services.get(service)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .cmd_tx
            .send(ServiceCmd::Status(reply_tx))
            .await
            .ok()?;
        reply_rx.await.ok()
    }
}

enum DriveOutcome {
    /// Connection dropped; take the retry path.
    Lost,
    /// Service was closed; the driver task exits.
    Closed,
}

struct ServiceDriver<D: Dialer> {
    service: String,
    dialer: D,
    rotator: EndpointRotator,
    backoff: BackoffPolicy,
    connect_timeout: Duration,
    retry_ceiling: u32,
    retry_count: u32,
    state: ConnState,
    events: mpsc::Sender<ManagerEvent>,
}

impl<D: Dialer> ServiceDriver<D> {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<ServiceCmd>) {
        loop {
            if self.retry_count > 0 && !self.backoff_wait(&mut cmd_rx).await {
                return;
            }

            self.state = ConnState::Connecting;
            let endpoint = self.rotator.current().to_string();

            match Session::open(&self.dialer, &endpoint, self.connect_timeout).await {
                Ok((session, events)) => {
                    info!(service = %self.service, endpoint = %endpoint, "connected");
                    self.retry_count = 0;
                    self.state = ConnState::Connected;
                    self.emit(ManagerEvent::Connected {
                        service: self.service.clone(),
                    })
                    .await;

                    match self.drive_connected(session, events, &mut cmd_rx).await {
                        DriveOutcome::Closed => return,
                        DriveOutcome::Lost => {
                            self.state = ConnState::Disconnected;
                            self.emit(ManagerEvent::Disconnected {
                                service: self.service.clone(),
                            })
                            .await;
                            if !self.register_failure().await && !self.park(&mut cmd_rx).await {
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        service = %self.service,
                        endpoint = %endpoint,
                        error = %e,
                        "connect attempt failed"
                    );
                    if !self.register_failure().await && !self.park(&mut cmd_rx).await {
                        return;
                    }
                }
            }
        }
    }

    /// The uniform failure path: advance the rotation exactly once per
    /// failed attempt, bump the retry count, give up at the ceiling.
    ///
    /// Returns `false` once the ceiling is reached (exactly one `GiveUp`
    /// is emitted); the caller then parks the record.
    async fn register_failure(&mut self) -> bool {
        self.rotator.advance();
        self.retry_count += 1;

        if self.retry_count >= self.retry_ceiling {
            warn!(
                service = %self.service,
                retries = self.retry_count,
                "retry ceiling reached, giving up until reconnect is requested"
            );
            self.state = ConnState::Disconnected;
            self.emit(ManagerEvent::GiveUp {
                service: self.service.clone(),
            })
            .await;
            return false;
        }
        true
    }

    /// Wait out the backoff delay, still answering commands.
    ///
    /// Returns `false` if the service was closed (a pending reconnect
    /// timer is cancelled by close).
    async fn backoff_wait(&mut self, cmd_rx: &mut mpsc::Receiver<ServiceCmd>) -> bool {
        let delay = self.backoff.delay(self.retry_count - 1);
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                cmd = cmd_rx.recv() => match cmd {
                    Some(ServiceCmd::Send(_, reply)) => {
                        let _ = reply.send(false);
                    }
                    Some(ServiceCmd::Status(reply)) => {
                        let _ = reply.send(self.status());
                    }
                    Some(ServiceCmd::Connect) => {}
                    Some(ServiceCmd::Close(reply)) => {
                        self.state = ConnState::Disconnected;
                        let _ = reply.send(());
                        return false;
                    }
                    None => return false,
                },
            }
        }
    }

    /// Run the established session until it drops or the service closes.
    async fn drive_connected(
        &mut self,
        mut session: Session<D::Conn>,
        mut events: mpsc::Receiver<SessionEvent>,
        cmd_rx: &mut mpsc::Receiver<ServiceCmd>,
    ) -> DriveOutcome {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(SessionEvent::Opened) => {}
                    Some(SessionEvent::Error(reason)) => {
                        warn!(service = %self.service, %reason, "session error");
                    }
                    Some(SessionEvent::Closed(reason)) => {
                        warn!(service = %self.service, %reason, "connection lost");
                        session.close();
                        return DriveOutcome::Lost;
                    }
                    None => {
                        // Monitor went away without a terminal event
                        session.close();
                        return DriveOutcome::Lost;
                    }
                },
                cmd = cmd_rx.recv() => match cmd {
                    Some(ServiceCmd::Send(payload, reply)) => {
                        let _ = reply.send(session.send(&payload).await);
                    }
                    Some(ServiceCmd::Status(reply)) => {
                        let _ = reply.send(self.status());
                    }
                    Some(ServiceCmd::Connect) => {}
                    Some(ServiceCmd::Close(reply)) => {
                        self.state = ConnState::Closing;
                        session.close();
                        self.emit(ManagerEvent::Disconnected {
                            service: self.service.clone(),
                        })
                        .await;
                        self.state = ConnState::Disconnected;
                        let _ = reply.send(());
                        return DriveOutcome::Closed;
                    }
                    None => {
                        session.close();
                        return DriveOutcome::Closed;
                    }
                },
            }
        }
    }

    /// Parked after give-up: the record survives, nothing is retried
    /// until the caller asks to connect again.
    ///
    /// Returns `false` if the service was closed instead.
    async fn park(&mut self, cmd_rx: &mut mpsc::Receiver<ServiceCmd>) -> bool {
        loop {
            match cmd_rx.recv().await {
                Some(ServiceCmd::Connect) => {
                    self.retry_count = 0;
                    return true;
                }
                Some(ServiceCmd::Send(_, reply)) => {
                    let _ = reply.send(false);
                }
                Some(ServiceCmd::Status(reply)) => {
                    let _ = reply.send(self.status());
                }
                Some(ServiceCmd::Close(reply)) => {
                    let _ = reply.send(());
                    return false;
                }
                None => return false,
            }
        }
    }

    fn status(&self) -> ServiceStatus {
        ServiceStatus {
            state: self.state,
            endpoint_index: self.rotator.index(),
            retry_count: self.retry_count,
        }
    }

    async fn emit(&self, event: ManagerEvent) {
        // The application owning the receiver may have gone away; that
        // only means nobody is listening anymore.
        let _ = self.events.send(event).await;
    }
}
