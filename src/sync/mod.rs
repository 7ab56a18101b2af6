mod debounce;

pub use debounce::DebounceTask;

use crate::calc::GradeComputer;
use crate::config::ScorePolicy;
use crate::error::{StoreError, SyncError};
use crate::model::{Category, RecordKey};
use crate::record::{ClassRecord, StudentGradeRow};
use crate::store::{LoadOutcome, RecordStore, SaveReceipt, SaveRequest};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncState {
    Clean,
    Dirty,
    Saving,
    DirtyWhileSaving,
}

impl SyncState {
    pub fn has_unsaved_changes(self) -> bool {
        self != SyncState::Clean
    }

    fn after_edit(self) -> SyncState {
        match self {
            SyncState::Clean | SyncState::Dirty => SyncState::Dirty,
            SyncState::Saving | SyncState::DirtyWhileSaving => SyncState::DirtyWhileSaving,
        }
    }
}

/// What the presentation layer observes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub state: SyncState,
    pub dirty: bool,
    pub version: i64,
    pub autosave_pending: bool,
    pub saves_started: u64,
    pub saves_succeeded: u64,
    pub saves_failed: u64,
    pub saves_coalesced: u64,
    pub last_error: Option<String>,
    pub last_saved_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub actor_id: String,
    pub debounce: Duration,
    pub computer: GradeComputer,
    pub policy: ScorePolicy,
}

struct Session {
    record: ClassRecord,
    state: SyncState,
    follow_up: bool,
    timer: DebounceTask,
    saves_started: u64,
    saves_succeeded: u64,
    saves_failed: u64,
    saves_coalesced: u64,
    last_error: Option<String>,
    last_saved_at: Option<String>,
}

impl Session {
    fn status(&self) -> SyncStatus {
        SyncStatus {
            state: self.state,
            dirty: self.state.has_unsaved_changes(),
            version: self.record.version,
            autosave_pending: self.timer.is_pending(),
            saves_started: self.saves_started,
            saves_succeeded: self.saves_succeeded,
            saves_failed: self.saves_failed,
            saves_coalesced: self.saves_coalesced,
            last_error: self.last_error.clone(),
            last_saved_at: self.last_saved_at.clone(),
        }
    }
}

struct Inner {
    store: Arc<dyn RecordStore>,
    options: SessionOptions,
    session: Mutex<Session>,
    events: watch::Sender<SyncStatus>,
}

enum Settled {
    Again(SaveRequest),
    Done(Result<SaveReceipt, StoreError>),
}

/// Owns one editing session over one class record: applies commands to the
/// aggregate, tracks the dirty state, and keeps at most one save in flight.
///
/// The session lock is never held across an await.
#[derive(Clone)]
pub struct SyncController {
    inner: Arc<Inner>,
}

impl SyncController {
    pub async fn load(
        store: Arc<dyn RecordStore>,
        key: &RecordKey,
        options: SessionOptions,
    ) -> Result<(Self, bool), SyncError> {
        let LoadOutcome { record, created } = store.load(key).await?;
        let session = Session {
            record,
            state: SyncState::Clean,
            follow_up: false,
            timer: DebounceTask::default(),
            saves_started: 0,
            saves_succeeded: 0,
            saves_failed: 0,
            saves_coalesced: 0,
            last_error: None,
            last_saved_at: None,
        };
        let (events, _) = watch::channel(session.status());
        let controller = Self {
            inner: Arc::new(Inner {
                store,
                options,
                session: Mutex::new(session),
                events,
            }),
        };
        Ok((controller, created))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Session>, SyncError> {
        self.inner
            .session
            .lock()
            .map_err(|_| SyncError::Store(StoreError::LockPoisoned))
    }

    fn publish(&self, session: &Session) {
        self.inner.events.send_replace(session.status());
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.inner.events.subscribe()
    }

    pub fn status(&self) -> Result<SyncStatus, SyncError> {
        Ok(self.lock()?.status())
    }

    pub fn record(&self) -> Result<ClassRecord, SyncError> {
        Ok(self.lock()?.record.clone())
    }

    pub fn apply_score_edit(
        &self,
        student_id: &str,
        category: Category,
        item_index: usize,
        value: f64,
    ) -> Result<StudentGradeRow, SyncError> {
        let mut s = self.lock()?;
        let row = s
            .record
            .apply_score_edit(
                &self.inner.options.computer,
                self.inner.options.policy,
                student_id,
                category,
                item_index,
                value,
            )?
            .clone();
        self.mark_dirty(&mut s);
        Ok(row)
    }

    pub fn apply_weight_change(
        &self,
        ww: i64,
        pt: i64,
        qa: i64,
    ) -> Result<Vec<StudentGradeRow>, SyncError> {
        let mut s = self.lock()?;
        s.record
            .apply_weight_change(&self.inner.options.computer, ww, pt, qa)?;
        self.mark_dirty(&mut s);
        Ok(s.record.rows.clone())
    }

    pub fn apply_hps_change(
        &self,
        category: Category,
        values: &[i64],
    ) -> Result<Vec<StudentGradeRow>, SyncError> {
        let mut s = self.lock()?;
        s.record.apply_hps_change(
            &self.inner.options.computer,
            self.inner.options.policy,
            category,
            values,
        )?;
        self.mark_dirty(&mut s);
        Ok(s.record.rows.clone())
    }

    fn mark_dirty(&self, s: &mut Session) {
        s.state = s.state.after_edit();
        // Edits during a save re-arm the timer once the save settles.
        if s.state == SyncState::Dirty {
            self.arm(s);
        }
        self.publish(s);
    }

    fn arm(&self, s: &mut Session) {
        let weak = Arc::downgrade(&self.inner);
        let delay = self.inner.options.debounce;
        s.timer.schedule(delay, move |generation| async move {
            if let Some(inner) = weak.upgrade() {
                SyncController { inner }.fire(generation).await;
            }
        });
        debug!(
            class_record_id = %s.record.id,
            delay_ms = delay.as_millis() as u64,
            "autosave scheduled"
        );
    }

    async fn fire(self, generation: u64) {
        {
            let Ok(mut s) = self.inner.session.lock() else {
                return;
            };
            if !s.timer.release(generation) {
                return;
            }
        }
        if let Err(e) = self.save().await {
            warn!(error = %e, "autosave failed");
        }
    }

    /// Saves the current snapshot. Returns `Ok(None)` when a save is already
    /// in flight; that request is folded into a follow-up save fired as soon
    /// as the in-flight one settles.
    pub async fn save(&self) -> Result<Option<SaveReceipt>, SyncError> {
        let mut request = {
            let mut s = self.lock()?;
            if s.timer.cancel() {
                debug!(class_record_id = %s.record.id, "autosave cancelled by explicit save");
            }
            if matches!(s.state, SyncState::Saving | SyncState::DirtyWhileSaving) {
                s.follow_up = true;
                s.saves_coalesced += 1;
                debug!(class_record_id = %s.record.id, "save coalesced into follow-up");
                self.publish(&s);
                return Ok(None);
            }
            self.begin_save(&mut s)
        };

        loop {
            let result = self
                .inner
                .store
                .save(&self.inner.options.actor_id, &request)
                .await;
            let settled = {
                let mut s = self.lock()?;
                self.settle(&mut s, result)
            };
            match settled {
                Settled::Again(next) => request = next,
                Settled::Done(Ok(receipt)) => return Ok(Some(receipt)),
                Settled::Done(Err(e)) => return Err(e.into()),
            }
        }
    }

    fn begin_save(&self, s: &mut Session) -> SaveRequest {
        s.state = SyncState::Saving;
        s.saves_started += 1;
        info!(
            class_record_id = %s.record.id,
            version = s.record.version,
            "saving class record"
        );
        self.publish(s);
        SaveRequest::snapshot(&s.record)
    }

    fn settle(&self, s: &mut Session, result: Result<SaveReceipt, StoreError>) -> Settled {
        let follow_up = std::mem::take(&mut s.follow_up);
        match result {
            Ok(receipt) => {
                s.saves_succeeded += 1;
                s.record.version = receipt.version;
                s.last_error = None;
                s.last_saved_at = Some(receipt.saved_at.clone());
                s.state = if s.state == SyncState::DirtyWhileSaving {
                    SyncState::Dirty
                } else {
                    SyncState::Clean
                };
                info!(
                    class_record_id = %s.record.id,
                    version = receipt.version,
                    state = ?s.state,
                    "class record saved"
                );
                if s.state == SyncState::Dirty {
                    if follow_up {
                        return Settled::Again(self.begin_save(s));
                    }
                    self.arm(s);
                }
                self.publish(s);
                Settled::Done(Ok(receipt))
            }
            Err(e) => {
                // Edits stay local and dirty. Edits or save requests that
                // arrived mid-flight get a fresh debounce cycle; otherwise
                // the next explicit save or edit retries.
                let pending = follow_up || s.state == SyncState::DirtyWhileSaving;
                s.saves_failed += 1;
                s.last_error = Some(e.to_string());
                s.state = SyncState::Dirty;
                warn!(class_record_id = %s.record.id, error = %e, pending, "save failed");
                if pending {
                    self.arm(s);
                }
                self.publish(s);
                Settled::Done(Err(e))
            }
        }
    }

    /// Ends the session. Refuses while anything is unsaved unless forced.
    pub fn close(&self, force: bool) -> Result<SyncStatus, SyncError> {
        let mut s = self.lock()?;
        if s.state.has_unsaved_changes() && !force {
            return Err(SyncError::UnsavedChanges);
        }
        s.timer.cancel();
        if s.state.has_unsaved_changes() {
            warn!(class_record_id = %s.record.id, state = ?s.state, "session closed with unsaved changes");
        }
        self.publish(&s);
        Ok(s.status())
    }
}
