//! WebSocket driver for the live channels.
//!
//! A [`ChannelCore`] owns the state; [`drive_channel`] performs the socket I/O
//! and feeds events back in. Callers talk to a running driver through a
//! [`ChannelHandle`].

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::connection::{Action, ConnectionState, Scheduler};
use crate::error::{ClientError, Result};
use crate::status::OutboundMessage;

/// State behind one live channel.
pub trait ChannelCore: Send + 'static {
    fn name(&self) -> &'static str;
    fn state(&self) -> ConnectionState;
    fn start(&mut self) -> Action;
    /// Socket is open; returns frames to send right away.
    fn handle_open(&mut self) -> Vec<String>;
    fn handle_text(&mut self, text: &str);
    fn handle_closed(&mut self) -> Action;
    fn handle_retry_due(&mut self) -> Action;
    fn force_reconnect(&mut self) -> Action;
    fn close(&mut self);
}

#[derive(Debug)]
pub enum ChannelRequest {
    Send(String),
    ForceReconnect,
    Close,
}

#[derive(Debug, Clone)]
pub struct ChannelHandle {
    requests: mpsc::UnboundedSender<ChannelRequest>,
    state: watch::Receiver<ConnectionState>,
}

impl ChannelHandle {
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub async fn wait_for_state(&mut self, target: ConnectionState) -> Result<()> {
        self.state
            .wait_for(|state| *state == target)
            .await
            .map(|_| ())
            .map_err(|_| ClientError::ChannelClosed)
    }

    /// Sends a frame over the open socket. Nothing is queued: if the
    /// channel is not open the call fails with [`ClientError::NotConnected`].
    pub fn send_raw(&self, text: String) -> Result<()> {
        if self.state() != ConnectionState::Open {
            return Err(ClientError::NotConnected);
        }
        self.request(ChannelRequest::Send(text))
    }

    pub fn send_message(&self, message: &OutboundMessage) -> Result<()> {
        self.send_raw(message.encode()?)
    }

    pub fn force_reconnect(&self) -> Result<()> {
        self.request(ChannelRequest::ForceReconnect)
    }

    pub fn close(&self) -> Result<()> {
        self.request(ChannelRequest::Close)
    }

    fn request(&self, request: ChannelRequest) -> Result<()> {
        self.requests
            .send(request)
            .map_err(|_| ClientError::ChannelClosed)
    }
}

/// Runs `core` on the current runtime. The join handle yields the core back
/// once the channel is closed.
pub fn spawn_channel<C, S>(
    core: C,
    url: Url,
    connect_timeout: Duration,
    scheduler: S,
) -> (ChannelHandle, JoinHandle<C>)
where
    C: ChannelCore,
    S: Scheduler + 'static,
{
    let (requests_tx, requests_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(core.state());
    let task = tokio::spawn(drive_channel(
        core,
        url,
        connect_timeout,
        scheduler,
        requests_rx,
        state_tx,
    ));
    let handle = ChannelHandle {
        requests: requests_tx,
        state: state_rx,
    };
    (handle, task)
}

pub async fn drive_channel<C, S>(
    mut core: C,
    url: Url,
    connect_timeout: Duration,
    scheduler: S,
    mut requests: mpsc::UnboundedReceiver<ChannelRequest>,
    state: watch::Sender<ConnectionState>,
) -> C
where
    C: ChannelCore,
    S: Scheduler,
{
    let mut action = core.start();
    loop {
        state.send_replace(core.state());
        action = match action {
            Action::Connect => {
                serve(&mut core, &url, connect_timeout, &scheduler, &mut requests, &state).await
            }
            Action::RetryAfter(delay) => {
                debug!("{} channel: retrying in {delay:?}", core.name());
                let mut sleep = scheduler.sleep(delay);
                loop {
                    tokio::select! {
                        _ = &mut sleep => break core.handle_retry_due(),
                        request = requests.recv() => match request {
                            Some(ChannelRequest::ForceReconnect) => break core.force_reconnect(),
                            Some(ChannelRequest::Close) | None => {
                                core.close();
                                break Action::Stop;
                            }
                            Some(ChannelRequest::Send(_)) => {
                                warn!("{} channel: dropping message, not connected", core.name());
                            }
                        },
                    }
                }
            }
            Action::Wait => {
                warn!("{} channel: waiting for a manual reconnect", core.name());
                match requests.recv().await {
                    Some(ChannelRequest::ForceReconnect) => core.force_reconnect(),
                    Some(ChannelRequest::Close) | None => {
                        core.close();
                        Action::Stop
                    }
                    Some(ChannelRequest::Send(_)) => {
                        warn!("{} channel: dropping message, not connected", core.name());
                        Action::Wait
                    }
                }
            }
            Action::Stop => break,
        };
    }
    state.send_replace(core.state());
    info!("{} channel: stopped", core.name());
    core
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dials `url`, giving up after `connect_timeout` as measured by `scheduler`.
async fn open_socket<S: Scheduler>(
    url: &Url,
    connect_timeout: Duration,
    scheduler: &S,
) -> Result<Socket> {
    tokio::select! {
        result = connect_async(url.as_str()) => Ok(result?.0),
        _ = scheduler.sleep(connect_timeout) => Err(ClientError::ConnectTimeout(connect_timeout)),
    }
}

fn lost<C: ChannelCore>(core: &mut C, err: ClientError) -> Action {
    warn!("{} channel: {err} ({})", core.name(), err.code());
    core.handle_closed()
}

async fn serve<C, S>(
    core: &mut C,
    url: &Url,
    connect_timeout: Duration,
    scheduler: &S,
    requests: &mut mpsc::UnboundedReceiver<ChannelRequest>,
    state: &watch::Sender<ConnectionState>,
) -> Action
where
    C: ChannelCore,
    S: Scheduler,
{
    let connect = open_socket(url, connect_timeout, scheduler);
    tokio::pin!(connect);
    let connected = loop {
        tokio::select! {
            result = &mut connect => break result,
            request = requests.recv() => match request {
                Some(ChannelRequest::Send(_)) => {
                    warn!("{} channel: dropping message, not connected", core.name());
                }
                Some(ChannelRequest::ForceReconnect) => return core.force_reconnect(),
                Some(ChannelRequest::Close) | None => {
                    core.close();
                    return Action::Stop;
                }
            },
        }
    };
    let mut socket = match connected {
        Ok(socket) => socket,
        Err(e) => {
            debug!("{} channel: connect to {url} failed: {e} ({})", core.name(), e.code());
            return core.handle_closed();
        }
    };

    info!("{} channel: connected to {url}", core.name());
    for frame in core.handle_open() {
        if let Err(e) = socket.send(Message::Text(frame)).await {
            return lost(core, e.into());
        }
    }
    state.send_replace(core.state());

    loop {
        tokio::select! {
            incoming = socket.next() => match incoming {
                Some(Ok(Message::Text(text))) => core.handle_text(&text),
                Some(Ok(Message::Close(_))) | None => {
                    info!("{} channel: closed by agent", core.name());
                    return core.handle_closed();
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return lost(core, e.into()),
            },
            request = requests.recv() => match request {
                Some(ChannelRequest::Send(text)) => {
                    if let Err(e) = socket.send(Message::Text(text)).await {
                        return lost(core, e.into());
                    }
                }
                Some(ChannelRequest::ForceReconnect) => {
                    let _ = socket.close(None).await;
                    return core.force_reconnect();
                }
                Some(ChannelRequest::Close) | None => {
                    let _ = socket.close(None).await;
                    core.close();
                    return Action::Stop;
                }
            },
        }
    }
}
