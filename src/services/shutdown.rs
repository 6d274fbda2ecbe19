use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use log::{info, warn};
use tokio::time::{sleep, timeout};

use crate::constants;
use crate::models::message::Message;
use crate::services::session_pool::SessionPool;
use crate::services::stats::Stats;

/// Quiesces every live session when the process is asked to stop.
///
/// Each session gets a terminal last-word message through its send queue,
/// so in-flight sends drain first. Afterwards the stats are polled until
/// the close-callback queue empties or the deadline expires.
pub struct ShutdownCoordinator {
    pool: Arc<SessionPool>,
    stats: Arc<Stats>,
}

impl ShutdownCoordinator {
    pub fn new(pool: Arc<SessionPool>, stats: Arc<Stats>) -> Self {
        ShutdownCoordinator { pool, stats }
    }

    /// Runs the whole drain under `deadline`. Returns true when every
    /// session was quiesced in time.
    pub async fn shutdown(&self, deadline: Duration) -> bool {
        match timeout(deadline, self.drain()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    "shutdown deadline of {:?} expired with {} sessions left",
                    deadline,
                    self.pool.len()
                );
                false
            }
        }
    }

    async fn drain(&self) {
        let sessions = self.pool.list();
        info!("shutting down, closing {} sessions", sessions.len());

        let enqueues = sessions.iter().map(|session| async move {
            if let Some(tx) = session.sender() {
                // a failed send means the session is tearing itself down
                let _ = tx.send(Message::last_word()).await;
            }
        });
        join_all(enqueues).await;

        loop {
            let connections = self.stats.connections();
            let closing = self.stats.closing_connections();
            if !(connections > 0 && closing > 0) {
                break;
            }
            sleep(Duration::from_millis(constants::SHUTDOWN_POLL_INTERVAL_MS)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::session::SessionHandle;

    #[actix_web::test]
    async fn test_shutdown_enqueues_last_word() {
        let pool = Arc::new(SessionPool::new());
        let stats = Arc::new(Stats::new());

        let (handle, mut rx) = SessionHandle::new("hogehoge".to_string(), 4);
        pool.add(handle);

        let coordinator = ShutdownCoordinator::new(Arc::clone(&pool), stats);
        assert!(coordinator.shutdown(Duration::from_secs(1)).await);

        let msg = rx.recv().await.unwrap();
        assert!(msg.last_word);
    }

    #[actix_web::test]
    async fn test_shutdown_empty_pool_returns_immediately() {
        let pool = Arc::new(SessionPool::new());
        let stats = Arc::new(Stats::new());
        let coordinator = ShutdownCoordinator::new(pool, stats);
        assert!(coordinator.shutdown(Duration::from_millis(100)).await);
    }

    #[actix_web::test]
    async fn test_shutdown_deadline_on_full_queue() {
        let pool = Arc::new(SessionPool::new());
        let stats = Arc::new(Stats::new());

        // capacity 1 with no consumer: the first enqueue fills the queue,
        // a second session's enqueue would block forever
        let (handle, _rx) = SessionHandle::new("slow".to_string(), 1);
        let tx = handle.sender().unwrap();
        tx.send(Message::last_word()).await.unwrap();
        pool.add(handle);

        let coordinator = ShutdownCoordinator::new(pool, stats);
        assert!(!coordinator.shutdown(Duration::from_millis(200)).await);
    }
}
