//! Connection supervision.
//!
//! The [`Supervisor`] owns the single connection/channel pair of the process. It connects with
//! a bounded periodic retry loop, watches the live connection for a close, and reconnects with
//! the same bounded policy when that happens.
//!
//! ```text
//!  start / restart        attempt ok            close event
//! Disconnected ──► Connecting ───────► Connected ─────────► Connecting
//!       ▲              │ deadline
//!       └──────────────┘
//! ```
//!
//! Every successful connect bumps a generation counter. A close watch only acts when its
//! generation is still current, so a stale watch can never start a second retry loop.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use futures::StreamExt;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{BrokerCredentials, ExchangeSpec};
use crate::rabbitmq::errors::ConnectError;
use crate::rabbitmq::transport::{CloseEvent, CloseStream, Transport};

pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(3);

/// The deadline is never shorter than this many heartbeat periods.
pub const MIN_DEADLINE_HEARTBEATS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Disconnected,
    Connecting,
    Connected,
}

/// Timing and target of the connect loop.
#[derive(Debug, Clone)]
pub struct ConnectPolicy {
    pub credentials: BrokerCredentials,
    pub exchange: ExchangeSpec,
    heartbeat: Duration,
    deadline: Duration,
}

impl ConnectPolicy {
    pub fn new(
        credentials: BrokerCredentials,
        exchange: ExchangeSpec,
        heartbeat: Duration,
        deadline: Duration,
    ) -> Self {
        let heartbeat = if heartbeat.is_zero() { DEFAULT_HEARTBEAT } else { heartbeat };
        let floor = heartbeat * MIN_DEADLINE_HEARTBEATS;
        let deadline = if deadline < floor {
            warn!(
                requested_ms = deadline.as_millis() as u64,
                floor_ms = floor.as_millis() as u64,
                "Connect deadline below floor, using floor"
            );
            floor
        } else {
            deadline
        };

        Self { credentials, exchange, heartbeat, deadline }
    }

    pub fn heartbeat(&self) -> Duration {
        self.heartbeat
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }
}

/// A connection together with the channel that declared the exchange on it.
struct Link<T: Transport> {
    connection: T::Connection,
    channel: T::Channel,
}

struct ConnectionState<T: Transport> {
    phase: SupervisorState,
    generation: u64,
    link: Option<Link<T>>,
}

struct Inner<T: Transport> {
    transport: T,
    policy: ConnectPolicy,
    state: RwLock<ConnectionState<T>>,
}

/// Keeps one broker channel alive for the whole process. Cloning shares the same state.
pub struct Supervisor<T: Transport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for Supervisor<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: Transport> Supervisor<T> {
    pub fn new(transport: T, policy: ConnectPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                policy,
                state: RwLock::new(ConnectionState {
                    phase: SupervisorState::Disconnected,
                    generation: 0,
                    link: None,
                }),
            }),
        }
    }

    /// Runs the first bounded connect loop on the caller's task.
    ///
    /// Returns once connected or once the deadline gave up. Does nothing unless the
    /// supervisor is currently disconnected.
    pub async fn start(&self) {
        if self.inner.begin_connecting() {
            Arc::clone(&self.inner).retry_loop().await;
        }
    }

    /// Starts a background connect loop after a give-up. Returns `false` if the supervisor is
    /// already connecting or connected.
    pub fn restart(&self) -> bool {
        if !self.inner.begin_connecting() {
            return false;
        }
        tokio::spawn(Arc::clone(&self.inner).retry_loop());
        true
    }

    /// The live channel, if any. Never blocks on I/O.
    pub fn current_channel(&self) -> Option<T::Channel> {
        self.inner.read_state().link.as_ref().map(|link| link.channel.clone())
    }

    pub fn state(&self) -> SupervisorState {
        self.inner.read_state().phase
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SupervisorState::Connected
    }

    /// Number of successful connects so far.
    pub fn generation(&self) -> u64 {
        self.inner.read_state().generation
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    pub fn policy(&self) -> &ConnectPolicy {
        &self.inner.policy
    }
}

impl<T: Transport> Inner<T> {
    fn read_state(&self) -> RwLockReadGuard<'_, ConnectionState<T>> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ConnectionState<T>> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// `Disconnected -> Connecting`. Only the caller that wins this transition may run a loop.
    fn begin_connecting(&self) -> bool {
        let mut state = self.write_state();
        if state.phase != SupervisorState::Disconnected {
            return false;
        }
        state.phase = SupervisorState::Connecting;
        true
    }

    /// `Connected -> Connecting` for the close watch of `generation`. Hands back the dead link
    /// so it can be closed outside the lock.
    fn begin_reconnect(&self, generation: u64) -> Option<Option<Link<T>>> {
        let mut state = self.write_state();
        if state.generation != generation || state.phase != SupervisorState::Connected {
            return None;
        }
        state.phase = SupervisorState::Connecting;
        Some(state.link.take())
    }

    async fn retry_loop(self: Arc<Self>) {
        let mut heartbeat = interval(self.policy.heartbeat);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let deadline = sleep(self.policy.deadline);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                _ = &mut deadline => {
                    error!(
                        deadline_ms = self.policy.deadline.as_millis() as u64,
                        "failed to connect to AMQP before the deadline, giving up"
                    );
                    self.write_state().phase = SupervisorState::Disconnected;
                    return;
                }
                _ = heartbeat.tick() => {
                    match self.connect_once().await {
                        Ok((link, events)) => {
                            self.install(link, events);
                            return;
                        }
                        Err(err) => error!("connection error={}", err),
                    }
                }
            }
        }
    }

    /// One dial -> open channel -> declare exchange sequence. Closes whatever it opened when a
    /// later step fails.
    async fn connect_once(&self) -> Result<(Link<T>, CloseStream), ConnectError> {
        let connection = self
            .transport
            .dial(&self.policy.credentials)
            .await
            .map_err(ConnectError::Dial)?;

        let channel = match self.transport.open_channel(&connection).await {
            Ok(channel) => channel,
            Err(e) => {
                self.transport.close(connection, None).await;
                return Err(ConnectError::OpenChannel(e));
            }
        };

        if let Err(e) = self.transport.declare_exchange(&channel, &self.policy.exchange).await {
            self.transport.close(connection, Some(channel)).await;
            return Err(ConnectError::DeclareExchange(e));
        }

        let events = self.transport.notify_close(&connection, &channel);
        Ok((Link { connection, channel }, events))
    }

    fn install(self: &Arc<Self>, link: Link<T>, events: CloseStream) {
        let generation = {
            let mut state = self.write_state();
            state.generation += 1;
            state.link = Some(link);
            state.phase = SupervisorState::Connected;
            state.generation
        };
        info!(
            generation,
            host = %self.policy.credentials.host,
            exchange = %self.policy.exchange.name,
            "Connected to RabbitMQ"
        );

        tokio::spawn(Arc::clone(self).watch_close(generation, events));
    }

    async fn watch_close(self: Arc<Self>, generation: u64, mut events: CloseStream) {
        let event = events.next().await.unwrap_or(CloseEvent::Closed);
        drop(events);

        let Some(dead) = self.begin_reconnect(generation) else {
            debug!(generation, ?event, "Ignoring close event for a superseded connection");
            return;
        };
        warn!(generation, ?event, "AMQP connection closed, reconnecting");

        if let Some(link) = dead {
            self.transport.close(link.connection, Some(link.channel)).await;
        }
        self.retry_loop().await;
    }
}
