use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::{sync::mpsc, task::JoinHandle};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Open,
}

/// How hard to try to get the connection back.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// The wait between a connection closing (or failing to open) and the
    /// next attempt. There's no backoff.
    pub interval: Duration,
    /// Give up after this many consecutive failed attempts to open. `None`
    /// means keep trying forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            interval: Duration::from_millis(3000),
            max_attempts: None,
        }
    }
}

/// Notifications from the connection task to whoever owns the connection state.
#[derive(Debug)]
pub enum LinkEvent {
    /// The channel is open; anything sent on this sender goes out on it.
    Opened(mpsc::UnboundedSender<String>),
    Closed,
    /// We ran out of attempts, and there won't be any more events.
    GaveUp,
}

#[async_trait]
pub trait Transport: Send + 'static {
    async fn connect(&mut self, address: &str) -> anyhow::Result<Box<dyn Link>>;
}

/// An open, duplex text channel.
#[async_trait]
pub trait Link: Send {
    /// Writes out every message from `outgoing`, returning once the channel
    /// closes (or `outgoing` is closed).
    async fn pump(&mut self, outgoing: &mut mpsc::UnboundedReceiver<String>)
        -> anyhow::Result<()>;
}

/// Keeps a connection to `address` open for as long as it can.
///
/// A failed attempt to open is treated just like a close: we wait for the
/// retry interval and go again.
pub async fn supervise<T: Transport>(
    mut transport: T,
    address: String,
    policy: RetryPolicy,
    events: mpsc::UnboundedSender<LinkEvent>,
) {
    let mut failures = 0;
    loop {
        debug!("connecting to {address}");
        match transport.connect(&address).await {
            Ok(mut link) => {
                failures = 0;
                info!("connected to {address}");
                let (tx, mut rx) = mpsc::unbounded_channel();
                if events.send(LinkEvent::Opened(tx)).is_err() {
                    return;
                }

                match link.pump(&mut rx).await {
                    Ok(()) => info!("connection to {address} closed"),
                    Err(e) => warn!("lost connection to {address}: {e:#}"),
                }
                if events.send(LinkEvent::Closed).is_err() {
                    return;
                }
            }
            Err(e) => {
                failures += 1;
                warn!("failed to connect to {address} (attempt {failures}): {e:#}");
                if policy.max_attempts.is_some_and(|max| failures >= max) {
                    error!("giving up on {address} after {failures} attempts");
                    let _ = events.send(LinkEvent::GaveUp);
                    return;
                }
            }
        }

        debug!("reconnecting in {:?}", policy.interval);
        tokio::time::sleep(policy.interval).await;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinkCounters {
    pub opened: u64,
    pub sent: u64,
    /// Messages that we didn't send because the connection wasn't open.
    pub dropped: u64,
}

/// Owns the connection state, and sends messages if (and only if) the
/// connection is open. Nothing is ever queued for later.
#[derive(Debug)]
pub struct ConnectionManager {
    state: ConnectionState,
    outgoing: Option<mpsc::UnboundedSender<String>>,
    counters: LinkCounters,
    supervisor: Option<JoinHandle<()>>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        ConnectionManager {
            state: ConnectionState::Disconnected,
            outgoing: None,
            counters: LinkCounters::default(),
            supervisor: None,
        }
    }

    /// Starts connecting in the background. The returned events need to be
    /// fed back into [`ConnectionManager::handle`].
    ///
    /// Must be called from within a tokio runtime.
    pub fn open<T: Transport>(
        &mut self,
        transport: T,
        address: impl Into<String>,
        policy: RetryPolicy,
    ) -> mpsc::UnboundedReceiver<LinkEvent> {
        self.shutdown();
        let (tx, rx) = mpsc::unbounded_channel();
        self.supervisor = Some(tokio::spawn(supervise(
            transport,
            address.into(),
            policy,
            tx,
        )));
        rx
    }

    pub fn handle(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Opened(tx) => {
                self.state = ConnectionState::Open;
                self.outgoing = Some(tx);
                self.counters.opened += 1;
            }
            LinkEvent::Closed => {
                self.state = ConnectionState::Disconnected;
                self.outgoing = None;
            }
            LinkEvent::GaveUp => {
                self.state = ConnectionState::Disconnected;
                self.outgoing = None;
                self.supervisor = None;
            }
        }
    }

    /// Returns `false` if the message was dropped.
    pub fn send(&mut self, message: &str) -> bool {
        let sent = match (&self.state, &self.outgoing) {
            (ConnectionState::Open, Some(tx)) => tx.send(message.to_owned()).is_ok(),
            _ => false,
        };
        if sent {
            self.counters.sent += 1;
        } else {
            debug!("not connected, dropping {message}");
            self.counters.dropped += 1;
        }
        sent
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn counters(&self) -> LinkCounters {
        self.counters
    }

    /// Closes the connection and cancels any pending reconnection.
    pub fn shutdown(&mut self) {
        if let Some(task) = self.supervisor.take() {
            task.abort();
        }
        self.outgoing = None;
        self.state = ConnectionState::Disconnected;
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::anyhow;
    use tokio::{sync::Notify, time::Instant};

    use super::*;

    /// Refuses the first `refusals` attempts and accepts the rest.
    #[derive(Clone, Default)]
    struct FakeTransport {
        refusals: usize,
        attempts: Arc<Mutex<Vec<Instant>>>,
        sent: Arc<Mutex<Vec<String>>>,
        close: Arc<Notify>,
    }

    struct FakeLink {
        sent: Arc<Mutex<Vec<String>>>,
        close: Arc<Notify>,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn connect(&mut self, _address: &str) -> anyhow::Result<Box<dyn Link>> {
            let mut attempts = self.attempts.lock().unwrap();
            attempts.push(Instant::now());
            if attempts.len() <= self.refusals {
                return Err(anyhow!("connection refused"));
            }
            Ok(Box::new(FakeLink {
                sent: self.sent.clone(),
                close: self.close.clone(),
            }))
        }
    }

    #[async_trait]
    impl Link for FakeLink {
        async fn pump(
            &mut self,
            outgoing: &mut mpsc::UnboundedReceiver<String>,
        ) -> anyhow::Result<()> {
            loop {
                tokio::select! {
                    _ = self.close.notified() => return Ok(()),
                    msg = outgoing.recv() => match msg {
                        Some(msg) => self.sent.lock().unwrap().push(msg),
                        None => return Ok(()),
                    },
                }
            }
        }
    }

    fn gaps(attempts: &[Instant]) -> Vec<Duration> {
        attempts.windows(2).map(|w| w[1] - w[0]).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn retries_every_interval_while_refused() {
        let transport = FakeTransport {
            refusals: usize::MAX,
            ..FakeTransport::default()
        };
        let attempts = transport.attempts.clone();
        let (tx, _rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(supervise(
            transport,
            "rover:81".to_owned(),
            RetryPolicy::default(),
            tx,
        ));

        tokio::time::sleep(Duration::from_millis(9_500)).await;
        task.abort();

        let attempts = attempts.lock().unwrap();
        assert_eq!(attempts.len(), 4);
        assert!(gaps(&attempts)
            .iter()
            .all(|gap| *gap == Duration::from_millis(3000)));
    }

    #[tokio::test(start_paused = true)]
    async fn reopens_once_interval_after_close() {
        let transport = FakeTransport::default();
        let attempts = transport.attempts.clone();
        let close = transport.close.clone();
        let (tx, mut events) = mpsc::unbounded_channel();
        let task = tokio::spawn(supervise(
            transport,
            "rover:81".to_owned(),
            RetryPolicy::default(),
            tx,
        ));

        let Some(LinkEvent::Opened(_first)) = events.recv().await else {
            panic!("expected the first connection to open");
        };
        tokio::time::sleep(Duration::from_millis(1000)).await;
        close.notify_one();

        assert!(matches!(events.recv().await, Some(LinkEvent::Closed)));
        let closed_at = Instant::now();

        let Some(LinkEvent::Opened(_second)) = events.recv().await else {
            panic!("expected the connection to reopen");
        };
        task.abort();

        let attempts = attempts.lock().unwrap();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[1] - closed_at, Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let transport = FakeTransport {
            refusals: usize::MAX,
            ..FakeTransport::default()
        };
        let attempts = transport.attempts.clone();
        let (tx, mut events) = mpsc::unbounded_channel();
        let policy = RetryPolicy {
            interval: Duration::from_millis(500),
            max_attempts: Some(3),
        };
        supervise(transport, "rover:81".to_owned(), policy, tx).await;

        assert!(matches!(events.recv().await, Some(LinkEvent::GaveUp)));
        assert_eq!(attempts.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn sends_only_while_open() {
        let transport = FakeTransport {
            refusals: 1,
            ..FakeTransport::default()
        };
        let sent = transport.sent.clone();
        let mut link = ConnectionManager::new();
        let mut events = link.open(transport, "rover:81", RetryPolicy::default());

        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert!(!link.send("forward:180"));

        let ev = events.recv().await.unwrap();
        link.handle(ev);
        assert_eq!(link.state(), ConnectionState::Open);
        assert!(link.send("left:180"));
        assert!(link.send("stop:0"));

        // Give the link a chance to write everything out.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(*sent.lock().unwrap(), vec!["left:180", "stop:0"]);
        assert_eq!(
            link.counters(),
            LinkCounters {
                opened: 1,
                sent: 2,
                dropped: 1,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_pending_retry() {
        let transport = FakeTransport {
            refusals: usize::MAX,
            ..FakeTransport::default()
        };
        let attempts = transport.attempts.clone();
        let mut link = ConnectionManager::new();
        let _events = link.open(transport, "rover:81", RetryPolicy::default());

        tokio::time::sleep(Duration::from_millis(100)).await;
        link.shutdown();
        tokio::time::sleep(Duration::from_millis(10_000)).await;

        assert_eq!(attempts.lock().unwrap().len(), 1);
    }

    #[test]
    fn close_drops_the_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut link = ConnectionManager::new();
        link.handle(LinkEvent::Opened(tx));
        assert!(link.send("forward:1"));
        link.handle(LinkEvent::Closed);
        assert!(!link.send("forward:2"));
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert_eq!(rx.try_recv().unwrap(), "forward:1");
        assert!(rx.try_recv().is_err());
    }
}
