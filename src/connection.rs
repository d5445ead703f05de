//! Reconnect state machine shared by the live channels.
//!
//! The machine performs no I/O. Each transition returns an [`Action`] that the
//! driver executes, and sleeps go through a [`Scheduler`] so the host decides
//! how time passes.

use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Connecting,
    Open,
    Reconnecting,
    MaxAttemptsReached,
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub grow_factor: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            grow_factor: 1.3,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the attempt following `attempt` failed ones.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let delay = self.min_delay.as_secs_f64() * self.grow_factor.powi(exponent);
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

/// What the driver must do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Connect,
    RetryAfter(Duration),
    /// Degraded: nothing happens until a manual reconnect.
    Wait,
    Stop,
}

#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    policy: ReconnectPolicy,
    attempts: u32,
    connected: bool,
    connecting: bool,
    max_attempts_reached: bool,
}

impl ConnectionMachine {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Closed,
            policy,
            attempts: 0,
            connected: false,
            connecting: false,
            max_attempts_reached: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn connecting(&self) -> bool {
        self.connecting
    }

    pub fn max_attempts_reached(&self) -> bool {
        self.max_attempts_reached
    }

    pub fn start(&mut self) -> Action {
        self.state = ConnectionState::Connecting;
        self.attempts = 1;
        self.connecting = true;
        Action::Connect
    }

    pub fn opened(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.state = ConnectionState::Open;
        self.attempts = 0;
        self.connected = true;
        self.connecting = false;
        self.max_attempts_reached = false;
    }

    /// Socket closed, errored, or a connect attempt failed or timed out.
    pub fn closed(&mut self) -> Action {
        match self.state {
            ConnectionState::Closed => return Action::Stop,
            ConnectionState::MaxAttemptsReached => return Action::Wait,
            _ => {}
        }
        self.connected = false;
        if self.attempts >= self.policy.max_attempts {
            self.state = ConnectionState::MaxAttemptsReached;
            self.connecting = false;
            self.max_attempts_reached = true;
            return Action::Wait;
        }
        self.state = ConnectionState::Reconnecting;
        self.connecting = true;
        Action::RetryAfter(self.policy.delay_for(self.attempts.max(1)))
    }

    pub fn retry_due(&mut self) -> Action {
        match self.state {
            ConnectionState::Reconnecting => {
                self.attempts += 1;
                self.connecting = true;
                Action::Connect
            }
            ConnectionState::Closed => Action::Stop,
            ConnectionState::MaxAttemptsReached => Action::Wait,
            ConnectionState::Connecting | ConnectionState::Open => Action::Wait,
        }
    }

    /// Manual reconnect. From the degraded or closed state this restarts the
    /// attempt counter; otherwise it drops the current socket and dials again.
    pub fn force_reconnect(&mut self) -> Action {
        match self.state {
            ConnectionState::MaxAttemptsReached | ConnectionState::Closed => self.start(),
            ConnectionState::Connecting
            | ConnectionState::Open
            | ConnectionState::Reconnecting => {
                self.state = ConnectionState::Reconnecting;
                self.connected = false;
                self.connecting = true;
                self.attempts += 1;
                Action::Connect
            }
        }
    }

    pub fn close(&mut self) {
        self.state = ConnectionState::Closed;
        self.connected = false;
        self.connecting = false;
    }
}

/// Time source for reconnect delays and connect timeouts.
pub trait Scheduler: Send + Sync {
    fn sleep(&self, delay: Duration) -> BoxFuture<'static, ()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn sleep(&self, delay: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(delay))
    }
}
