//! Connection lifecycle: connect, read, heartbeat, reconnect, stop.
//!
//! One background task owns the socket. Each successful handshake starts a
//! new epoch; when the epoch ends for any reason other than [`ConnectionManager::stop`]
//! the task backs off and reconnects, forever. Nothing is replayed across
//! epochs: alerts sent while disconnected are lost.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::backoff::Backoff;
use super::command::CommandChannel;
use super::{ConnectionError, ConnectionState, FrameHandler};
use crate::events::{ConnectionEvent, EventEmitter};
use crate::normalizer::is_keepalive;
use crate::protocol_constants::{IDLE_CHECK_INTERVAL_MS, KEEPALIVE_TEXT};
use crate::state::Config;
use crate::utils::now_millis;

type AlertSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type AlertSink = SplitSink<AlertSocket, Message>;
type AlertSource = SplitStream<AlertSocket>;

/// Timing and addressing for the connection task.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub url: String,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub connect_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub idle_timeout: Duration,
    pub command_queue_capacity: usize,
}

impl ConnectionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            url: config.endpoint.url(),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            heartbeat_interval: Duration::from_secs(config.heartbeat_interval_secs),
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
            command_queue_capacity: config.command_queue_capacity,
        }
    }
}

struct Shared {
    settings: ConnectionSettings,
    state_tx: watch::Sender<ConnectionState>,
    commands: Arc<CommandChannel>,
    handler: Arc<dyn FrameHandler>,
    emitter: Arc<dyn EventEmitter>,
    epoch: AtomicU64,
}

struct RunningTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the single duplex connection to the alert source.
///
/// The connection state is published through a `watch` channel; this type
/// is its only writer.
pub struct ConnectionManager {
    shared: Arc<Shared>,
    task: Mutex<Option<RunningTask>>,
}

impl ConnectionManager {
    pub fn new(
        settings: ConnectionSettings,
        handler: Arc<dyn FrameHandler>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                settings,
                state_tx,
                commands: Arc::new(CommandChannel::new(state_rx)),
                handler,
                emitter,
                epoch: AtomicU64::new(0),
            }),
            task: Mutex::new(None),
        }
    }

    /// Spawns the connection task.
    ///
    /// Returns `false` without doing anything if the task is already running.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    pub fn start(&self) -> bool {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            log::debug!("[Connection] start() ignored, already running");
            return false;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(Arc::clone(&self.shared), cancel.clone()));
        *task = Some(RunningTask { cancel, handle });
        true
    }

    /// Closes the connection and stops reconnecting.
    ///
    /// Aborts an in-flight handshake or backoff sleep, then waits for the task
    /// to exit. The state ends at `Disconnected`.
    pub async fn stop(&self) {
        let task = self.task.lock().take();
        let Some(task) = task else {
            return;
        };

        log::info!("[Connection] Stopping");
        self.shared.transition(ConnectionState::Closing);
        task.cancel.cancel();
        if let Err(e) = task.handle.await {
            log::error!("[Connection] Task ended abnormally: {}", e);
        }
        self.shared.commands.detach();
        self.shared.transition(ConnectionState::Disconnected);
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    /// Receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Number of successful handshakes so far; 0 before the first one.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.shared.epoch.load(Ordering::SeqCst)
    }

    pub fn url(&self) -> &str {
        &self.shared.settings.url
    }

    pub fn commands(&self) -> &Arc<CommandChannel> {
        &self.shared.commands
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.cancel.cancel();
        }
    }
}

impl Shared {
    /// The only place the state changes. Illegal moves are logged and ignored.
    fn transition(&self, next: ConnectionState) -> bool {
        let mut rejected_from = None;
        let mut previous = next;
        self.state_tx.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            if state.can_transition_to(next) {
                previous = *state;
                *state = next;
                true
            } else {
                rejected_from = Some(*state);
                false
            }
        });

        if let Some(from) = rejected_from {
            log::warn!(
                "[Connection] Rejected state transition {} -> {}",
                from,
                next
            );
            return false;
        }
        if previous != next {
            log::debug!("[Connection] State {} -> {}", previous, next);
        }
        true
    }

    fn emit_disconnected(&self, epoch: u64, reason: String) {
        self.emitter.emit_connection(ConnectionEvent::Disconnected {
            epoch,
            reason,
            timestamp: now_millis(),
        });
    }

    /// Drives one established connection until it fails or is cancelled.
    ///
    /// `Ok(())` means the task was cancelled. The command queue is detached
    /// before returning: on cancel, commands already accepted are still sent
    /// ahead of the close frame; on failure they are counted as dropped.
    async fn run_epoch(
        &self,
        socket: AlertSocket,
        epoch: u64,
        cancel: &CancellationToken,
    ) -> Result<(), ConnectionError> {
        let settings = &self.settings;
        let (mut sink, mut source) = socket.split();

        sink.send(Message::Text(KEEPALIVE_TEXT.into()))
            .await
            .map_err(|e| ConnectionError::Send(e.to_string()))?;

        let (outbound_tx, mut outbound_rx) =
            mpsc::channel::<String>(settings.command_queue_capacity.max(1));
        self.commands.attach(outbound_tx);

        let outcome = if self.transition(ConnectionState::Connected) {
            log::info!("[Connection] Connected to {} (epoch {})", settings.url, epoch);
            self.emitter.emit_connection(ConnectionEvent::Connected {
                url: settings.url.clone(),
                epoch,
                timestamp: now_millis(),
            });
            self.pump(&mut sink, &mut source, &mut outbound_rx, epoch, cancel)
                .await
        } else {
            Ok(())
        };

        self.commands.detach();
        outbound_rx.close();
        if outcome.is_ok() {
            while let Ok(frame) = outbound_rx.try_recv() {
                if sink.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            let _ = sink.send(Message::Close(None)).await;
        }

        let mut lost = 0;
        while outbound_rx.try_recv().is_ok() {
            lost += 1;
        }
        if lost > 0 {
            self.commands.record_lost(lost);
        }
        outcome
    }

    /// The read/write loop of one epoch.
    async fn pump(
        &self,
        sink: &mut AlertSink,
        source: &mut AlertSource,
        outbound_rx: &mut mpsc::Receiver<String>,
        epoch: u64,
        cancel: &CancellationToken,
    ) -> Result<(), ConnectionError> {
        let settings = &self.settings;
        let mut heartbeat = tokio::time::interval_at(
            Instant::now() + settings.heartbeat_interval,
            settings.heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut idle_check = tokio::time::interval(Duration::from_millis(IDLE_CHECK_INTERVAL_MS));
        idle_check.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_activity = Instant::now();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                msg = source.next() => {
                    last_activity = Instant::now();
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.dispatch(text.as_str(), epoch).await;
                        }
                        Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                            Ok(text) => self.dispatch(text, epoch).await,
                            Err(_) => log::warn!(
                                "[Connection] Ignoring non-UTF-8 binary frame ({} bytes)",
                                data.len()
                            ),
                        },
                        Some(Ok(Message::Close(frame))) => {
                            return Err(ConnectionError::ClosedByPeer(
                                frame.map(|f| f.reason.as_str().to_string()),
                            ));
                        }
                        // Pings are answered by tungstenite; pongs only refresh the idle timer.
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(ConnectionError::Receive(e.to_string())),
                        None => return Err(ConnectionError::StreamEnded),
                    }
                }
                Some(frame) = outbound_rx.recv() => {
                    sink.send(Message::Text(frame.into()))
                        .await
                        .map_err(|e| ConnectionError::Send(e.to_string()))?;
                }
                _ = heartbeat.tick() => {
                    sink.send(Message::Ping(Bytes::new()))
                        .await
                        .map_err(|e| ConnectionError::Send(e.to_string()))?;
                }
                _ = idle_check.tick() => {
                    if last_activity.elapsed() >= settings.idle_timeout {
                        return Err(ConnectionError::IdleTimeout(settings.idle_timeout));
                    }
                }
            }
        }
    }

    async fn dispatch(&self, frame: &str, epoch: u64) {
        if is_keepalive(frame) {
            log::trace!("[Connection] Keepalive frame");
            return;
        }
        self.handler.handle_frame(frame, epoch).await;
    }
}

async fn run(shared: Arc<Shared>, cancel: CancellationToken) {
    let settings = &shared.settings;
    let mut backoff = Backoff::new(settings.initial_backoff, settings.max_backoff);
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            break;
        }
        attempt = attempt.saturating_add(1);
        shared.transition(ConnectionState::Connecting);
        log::info!(
            "[Connection] Connecting to {} (attempt {})",
            settings.url,
            attempt
        );
        shared.emitter.emit_connection(ConnectionEvent::Connecting {
            url: settings.url.clone(),
            attempt,
            timestamp: now_millis(),
        });

        let connect = tokio::time::timeout(
            settings.connect_timeout,
            connect_async(settings.url.as_str()),
        );
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = connect => result,
        };

        match result {
            Ok(Ok((socket, _response))) => {
                backoff.reset();
                attempt = 0;
                let epoch = shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
                let outcome = shared.run_epoch(socket, epoch, &cancel).await;
                match outcome {
                    Ok(()) => {
                        shared.emit_disconnected(epoch, "stopped".to_string());
                        break;
                    }
                    Err(e) => {
                        log::warn!("[Connection] Epoch {} lost: {}", epoch, e);
                        shared.emit_disconnected(epoch, e.to_string());
                    }
                }
            }
            Ok(Err(e)) => {
                let error = ConnectionError::HandshakeFailed(e.to_string());
                log::warn!("[Connection] {}: {}", settings.url, error);
            }
            Err(_) => {
                let error = ConnectionError::HandshakeTimeout(settings.connect_timeout);
                log::warn!("[Connection] {}: {}", settings.url, error);
            }
        }

        if cancel.is_cancelled() {
            break;
        }
        shared.transition(ConnectionState::Connecting);
        let delay = backoff.next_delay();
        log::info!("[Connection] Reconnecting in {}ms", delay.as_millis());
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    log::info!("[Connection] Task stopped");
}
