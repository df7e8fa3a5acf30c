// =============================================================================
// STORE MODULE
// =============================================================================
// The only state the service keeps between requests:
//
// - SNAPSHOTS: the last catalog + ledger each department's source returned.
//   A snapshot is swapped whole after every successful load or mutation and
//   never edited in place, so readers see either the old answer or the new
//   one.
// - SESSIONS: one per open checkout dialog. A session carries an in-flight
//   flag so a second submit while the first is still on the wire is refused
//   instead of queued.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::InventorySnapshot;

/// Sessions nobody closed are dropped after this long
const SESSION_TTL: Duration = Duration::from_secs(12 * 60 * 60);

#[derive(Debug)]
pub struct CheckoutSession {
    department: String,
    opened_at: Instant,
    in_flight: AtomicBool,
}

/// Held for the duration of one submission; clears the in-flight flag when
/// dropped, whether the submission succeeded, failed or was abandoned.
#[derive(Debug)]
pub struct SubmissionGuard {
    session: Arc<CheckoutSession>,
}

impl Drop for SubmissionGuard {
    fn drop(&mut self) {
        self.session.in_flight.store(false, Ordering::Release);
    }
}

#[derive(Debug, Default)]
pub struct Store {
    snapshots: RwLock<HashMap<String, Arc<InventorySnapshot>>>,
    sessions: RwLock<HashMap<Uuid, Arc<CheckoutSession>>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------------
    // SNAPSHOTS
    // -------------------------------------------------------------------------

    pub async fn snapshot(&self, department: &str) -> Option<Arc<InventorySnapshot>> {
        self.snapshots.read().await.get(department).cloned()
    }

    /// Swap in a fresh snapshot for a department.
    pub async fn replace_snapshot(&self, department: &str, snapshot: InventorySnapshot) -> Arc<InventorySnapshot> {
        let snapshot = Arc::new(snapshot);
        self.snapshots
            .write()
            .await
            .insert(department.to_string(), Arc::clone(&snapshot));
        tracing::debug!(
            department = %department,
            lines = snapshot.inventory.len(),
            loans = snapshot.in_use.len(),
            "Inventory snapshot replaced"
        );
        snapshot
    }

    // -------------------------------------------------------------------------
    // SESSIONS
    // -------------------------------------------------------------------------

    pub async fn open_session(&self, department: &str) -> Uuid {
        let id = Uuid::new_v4();
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, s| s.opened_at.elapsed() < SESSION_TTL);
        sessions.insert(
            id,
            Arc::new(CheckoutSession {
                department: department.to_string(),
                opened_at: Instant::now(),
                in_flight: AtomicBool::new(false),
            }),
        );
        id
    }

    async fn session(&self, department: &str, id: Uuid) -> AppResult<Arc<CheckoutSession>> {
        self.sessions
            .read()
            .await
            .get(&id)
            .filter(|s| s.department == department)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Checkout session {id}")))
    }

    pub async fn close_session(&self, department: &str, id: Uuid) -> AppResult<()> {
        self.session(department, id).await?;
        self.sessions.write().await.remove(&id);
        Ok(())
    }

    /// Mark a submission as in flight for the session.
    ///
    /// # Errors
    /// - `NotFound` for an unknown session or one opened for another department
    /// - `SubmissionInFlight` while an earlier submission has not finished
    pub async fn begin_submission(&self, department: &str, id: Uuid) -> AppResult<SubmissionGuard> {
        let session = self.session(department, id).await?;
        session
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| AppError::SubmissionInFlight)?;
        Ok(SubmissionGuard { session })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InventoryLine;

    fn line(item: &str) -> InventoryLine {
        InventoryLine {
            category: "Mics".into(),
            item: item.into(),
            item_type: String::new(),
            location: String::new(),
            total_qty: 1,
        }
    }

    #[tokio::test]
    async fn test_snapshot_is_replaced_whole() {
        let store = Store::new();
        assert!(store.snapshot("audio").await.is_none());

        let first = store
            .replace_snapshot("audio", InventorySnapshot { inventory: vec![line("SM58")], in_use: vec![] })
            .await;
        store
            .replace_snapshot("audio", InventorySnapshot { inventory: vec![line("Beta 52")], in_use: vec![] })
            .await;

        // earlier readers keep the value they were handed
        assert_eq!(first.inventory[0].item, "SM58");
        assert_eq!(store.snapshot("audio").await.unwrap().inventory[0].item, "Beta 52");
    }

    #[tokio::test]
    async fn test_second_submission_is_refused_until_first_finishes() {
        let store = Store::new();
        let id = store.open_session("audio").await;

        let guard = store.begin_submission("audio", id).await.unwrap();
        assert!(matches!(
            store.begin_submission("audio", id).await,
            Err(AppError::SubmissionInFlight)
        ));

        drop(guard);
        assert!(store.begin_submission("audio", id).await.is_ok());
    }

    #[tokio::test]
    async fn test_sessions_are_scoped_to_department() {
        let store = Store::new();
        let id = store.open_session("audio").await;
        assert!(matches!(
            store.begin_submission("video", id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(store.close_session("video", id).await.is_err());

        store.close_session("audio", id).await.unwrap();
        assert!(matches!(
            store.begin_submission("audio", id).await,
            Err(AppError::NotFound(_))
        ));
    }
}
