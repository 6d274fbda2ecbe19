use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_web::web::Bytes;
use actix_ws::{AggregatedMessage, AggregatedMessageStream, Session as WsSession};
use futures::StreamExt;
use log::{info, warn};
use tokio::sync::{mpsc, watch};

use crate::models::message::Message;
use crate::services::callback::CallbackClient;
use crate::services::receiver::{ReceivedMessage, Receiver};
use crate::services::session_pool::SessionPool;
use crate::services::stats::Stats;

/// Shared handle of one live session. This is what the pool stores and
/// what dispatch and shutdown interact with; the transport itself is owned
/// by the session's two loops.
pub struct SessionHandle {
    key: String,
    tx: mpsc::Sender<Message>,
    closed: AtomicBool,
    closed_tx: watch::Sender<bool>,
}

impl SessionHandle {
    /// Creates the handle and the receiving half of its send queue. A
    /// queue size of 0 is clamped to 1: the queue then acts as a
    /// rendezvous, making senders wait for the send loop.
    pub fn new(key: String, queue_size: usize) -> (Arc<Self>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        let (closed_tx, _) = watch::channel(false);
        let handle = Arc::new(SessionHandle {
            key,
            tx,
            closed: AtomicBool::new(false),
            closed_tx,
        });
        (handle, rx)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The writable side of the send queue, or `None` once the session has
    /// transitioned to closed. Callers must treat `None` as an immediate
    /// failure and never block on it.
    pub fn sender(&self) -> Option<mpsc::Sender<Message>> {
        if self.is_closed() {
            None
        } else {
            Some(self.tx.clone())
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// A receiver that resolves once the session is closed.
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed_tx.subscribe()
    }

    /// Flips the closed flag. Returns true for the first caller only; the
    /// close signal fires after the flag is visible.
    fn transition_closed(&self) -> bool {
        let first = self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if first {
            self.closed_tx.send_replace(true);
        }
        first
    }
}

/// Per-connection state driving the send and recv loops. Lives on the
/// worker that accepted the connection; the close path runs here too, so
/// the worker-local callback client is always in reach.
pub struct SessionRunner {
    handle: Arc<SessionHandle>,
    ws: WsSession,
    pool: Arc<SessionPool>,
    stats: Arc<Stats>,
    receiver: Rc<dyn Receiver>,
    callback: CallbackClient,
    idle_timeout: Option<Duration>,
    last_activity: Cell<Instant>,
}

impl SessionRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        handle: Arc<SessionHandle>,
        ws: WsSession,
        pool: Arc<SessionPool>,
        stats: Arc<Stats>,
        receiver: Rc<dyn Receiver>,
        callback: CallbackClient,
        idle_timeout: Option<Duration>,
    ) -> Rc<Self> {
        Rc::new(SessionRunner {
            handle,
            ws,
            pool,
            stats,
            receiver,
            callback,
            idle_timeout,
            last_activity: Cell::new(Instant::now()),
        })
    }

    pub fn handle(&self) -> &Arc<SessionHandle> {
        &self.handle
    }

    /// Writes the connect callback's response body as the first frame.
    /// Not counted as a delivered message.
    pub async fn write_hello(&self, body: Bytes, content_type: &str) -> bool {
        if body.is_empty() {
            return true;
        }
        let binary = crate::models::message::is_binary_content_type(content_type);
        self.write_frame(body, binary).await.is_ok()
    }

    /// Spawns the send loop and the recv loop on the current worker.
    pub fn start(self: &Rc<Self>, rx: mpsc::Receiver<Message>, stream: AggregatedMessageStream) {
        let send = Rc::clone(self);
        actix_web::rt::spawn(async move { send.run_send_loop(rx).await });
        let recv = Rc::clone(self);
        actix_web::rt::spawn(async move { recv.run_recv_loop(stream).await });
    }

    fn touch(&self) {
        self.last_activity.set(Instant::now());
    }

    async fn run_send_loop(&self, mut rx: mpsc::Receiver<Message>) {
        let mut closed_rx = self.handle.closed_signal();
        loop {
            tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(msg) => {
                        if !self.write_message(msg).await {
                            break;
                        }
                    }
                    None => break,
                },
                _ = closed_rx.changed() => break,
            }
        }
    }

    /// Delivers one queued message. Returns false when the loop must exit.
    async fn write_message(&self, msg: Message) -> bool {
        self.touch();

        // A bodiless last word is pure teardown; nothing goes on the wire.
        if !(msg.last_word && msg.body.is_empty()) {
            let binary = msg.is_binary();
            if self.write_frame(msg.body.clone(), binary).await.is_err() {
                self.stats.message_error_event();
                self.close().await;
                return false;
            }
            self.stats.message_event();
        }

        if msg.last_word {
            self.close().await;
            return false;
        }
        true
    }

    async fn write_frame(&self, body: Bytes, binary: bool) -> Result<(), actix_ws::Closed> {
        let mut ws = self.ws.clone();
        if binary {
            return ws.binary(body).await;
        }
        // Text frames must carry valid UTF-8; anything else goes out as
        // a binary frame.
        match String::from_utf8(body.to_vec()) {
            Ok(text) => ws.text(text).await,
            Err(_) => ws.binary(body).await,
        }
    }

    async fn run_recv_loop(&self, mut stream: AggregatedMessageStream) {
        let key = self.handle.key().to_string();
        loop {
            let next = match self.idle_timeout {
                Some(idle) => {
                    let remaining = match idle.checked_sub(self.last_activity.get().elapsed()) {
                        Some(remaining) => remaining,
                        None => {
                            info!("session {} closed by idle timeout", key);
                            break;
                        }
                    };
                    match tokio::time::timeout(remaining, stream.next()).await {
                        Ok(next) => next,
                        // The deadline may have moved while we waited;
                        // recompute it from the last activity.
                        Err(_) => continue,
                    }
                }
                None => stream.next().await,
            };

            match next {
                Some(Ok(AggregatedMessage::Text(text))) => {
                    self.touch();
                    self.deliver_upstream(ReceivedMessage::text(
                        key.clone(),
                        text.into_bytes(),
                    ))
                    .await;
                }
                Some(Ok(AggregatedMessage::Binary(body))) => {
                    self.touch();
                    self.deliver_upstream(ReceivedMessage::binary(key.clone(), body))
                        .await;
                }
                Some(Ok(AggregatedMessage::Ping(payload))) => {
                    self.touch();
                    if self.ws.clone().pong(&payload).await.is_err() {
                        break;
                    }
                }
                Some(Ok(AggregatedMessage::Pong(_))) => {
                    self.touch();
                }
                Some(Ok(AggregatedMessage::Close(reason))) => {
                    info!("session {} closed by peer: {:?}", key, reason);
                    break;
                }
                Some(Err(e)) => {
                    warn!("session {} protocol error: {}", key, e);
                    break;
                }
                None => {
                    info!("session {} connection closed", key);
                    break;
                }
            }
        }
        self.close().await;
    }

    async fn deliver_upstream(&self, message: ReceivedMessage) {
        if let Err(e) = self.receiver.receive(message).await {
            warn!(
                "receive callback failed for session {}: {}",
                self.handle.key(),
                e
            );
        }
    }

    /// Tears the session down. Only the first caller acts: the pool entry
    /// is removed before the transport is closed, the close signal fires,
    /// and the close callback (when configured) runs in its own task so
    /// teardown never blocks on the backend.
    pub async fn close(&self) {
        if !self.handle.transition_closed() {
            return;
        }

        self.pool.delete(self.handle.key());
        let _ = self.ws.clone().close(None).await;
        self.stats.disconnect_event();
        info!("disconnect key: {}", self.handle.key());

        if self.callback.close_callback_configured() {
            self.stats.closing_event();
            let callback = self.callback.clone();
            let stats = Arc::clone(&self.stats);
            let key = self.handle.key().to_string();
            actix_web::rt::spawn(async move {
                if let Err(e) = callback.close(&key).await {
                    warn!("close callback failed for session {}: {}", key, e);
                }
                stats.closed_event();
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn test_sender_after_close_transition() {
        let (handle, _rx) = SessionHandle::new("hogehoge".to_string(), 4);
        assert!(handle.sender().is_some());
        assert!(!handle.is_closed());

        assert!(handle.transition_closed());
        assert!(handle.is_closed());
        assert!(handle.sender().is_none());
    }

    #[actix_web::test]
    async fn test_close_transition_is_once() {
        let (handle, _rx) = SessionHandle::new("hogehoge".to_string(), 1);
        assert!(handle.transition_closed());
        assert!(!handle.transition_closed());
        assert!(!handle.transition_closed());
    }

    #[actix_web::test]
    async fn test_closed_signal_fires_after_flag() {
        let (handle, _rx) = SessionHandle::new("hogehoge".to_string(), 1);
        let mut signal = handle.closed_signal();
        assert!(!*signal.borrow());

        handle.transition_closed();
        signal.changed().await.unwrap();
        assert!(*signal.borrow());
        assert!(handle.is_closed());
    }

    #[actix_web::test]
    async fn test_queue_preserves_order() {
        let (handle, mut rx) = SessionHandle::new("hogehoge".to_string(), 8);
        let tx = handle.sender().unwrap();
        for i in 0..5u8 {
            tx.send(Message::new(
                Bytes::copy_from_slice(&[i]),
                "application/octet-stream",
            ))
            .await
            .unwrap();
        }
        for i in 0..5u8 {
            let msg = rx.recv().await.unwrap();
            assert_eq!(msg.body.as_ref(), &[i]);
        }
    }

    #[actix_web::test]
    async fn test_send_fails_fast_when_receiver_dropped() {
        let (handle, rx) = SessionHandle::new("hogehoge".to_string(), 1);
        let tx = handle.sender().unwrap();
        drop(rx);
        assert!(tx.send(Message::last_word()).await.is_err());
    }

    #[actix_web::test]
    async fn test_zero_queue_size_is_clamped() {
        let (handle, mut rx) = SessionHandle::new("hogehoge".to_string(), 0);
        let tx = handle.sender().unwrap();
        tx.send(Message::last_word()).await.unwrap();
        assert!(rx.recv().await.unwrap().last_word);
    }
}
