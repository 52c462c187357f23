/// Stopwatch sessions with periodic persistence
///
/// A [`TimerSession`] tracks the running seconds of one user's current task. While
/// running, a background ticker adds one second per second and, whenever the count
/// reaches a multiple of the save interval, awaits a write of the value through
/// [`TaskRepository::update_elapsed_time`]. Saves are awaited inside the tick, so
/// ticks never overlap a save.
///
/// Stopping cancels the ticker through a [`CancellationToken`], waits for it to
/// finish (draining any in-flight save) and then writes the final value. Switching
/// the current task goes through the same drain before the new task is selected.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tasktimer_shared::models::task::CreateTask;
/// use tasktimer_shared::storage::local::LocalStore;
/// use tasktimer_shared::timer::TimerSession;
/// use tasktimer_shared::tracker::TaskTracker;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let tracker = TaskTracker::new(Arc::new(LocalStore::in_memory()));
/// let task = tracker.tasks().create_task("u1", CreateTask::titled("Focus")).await?;
///
/// let timer = TimerSession::new(tracker.tasks().clone(), "u1");
/// timer.select_task(&task.id).await?;
/// timer.start().await?;
///
/// tokio::time::sleep(std::time::Duration::from_secs(3)).await;
/// let snapshot = timer.stop().await?;
/// assert!(snapshot.seconds >= 3);
/// # Ok(())
/// # }
/// ```

use crate::error::{TrackerError, TrackerResult};
use crate::models::task::{Task, UpdateTask};
use crate::repository::TaskRepository;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Seconds between periodic saves
pub const DEFAULT_SAVE_INTERVAL_SECS: u64 = 10;

const TICK: Duration = Duration::from_secs(1);

/// Point-in-time view of a timer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    /// Task being timed
    pub task_id: Option<String>,

    /// Elapsed seconds, including the stored value the task started with
    pub seconds: i64,

    /// Whether the ticker is running
    pub running: bool,
}

#[derive(Debug, Default)]
struct Clock {
    task_id: Option<String>,
    seconds: i64,
}

impl Clock {
    fn adopt(&mut self, task: Option<&Task>) {
        self.task_id = task.map(|t| t.id.clone());
        self.seconds = task.map(|t| t.elapsed_time).unwrap_or(0);
    }
}

struct Ticker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Stopwatch for one user's current task
pub struct TimerSession {
    tasks: TaskRepository,
    user_id: String,
    save_interval: u64,
    clock: Arc<Mutex<Clock>>,
    ticker: Mutex<Option<Ticker>>,
}

impl TimerSession {
    /// Creates a stopped session with nothing selected
    pub fn new(tasks: TaskRepository, user_id: impl Into<String>) -> Self {
        Self::with_save_interval(tasks, user_id, DEFAULT_SAVE_INTERVAL_SECS)
    }

    /// Creates a session saving every `save_interval` seconds (minimum 1)
    pub fn with_save_interval(tasks: TaskRepository, user_id: impl Into<String>, save_interval: u64) -> Self {
        Self {
            tasks,
            user_id: user_id.into(),
            save_interval: save_interval.max(1),
            clock: Arc::new(Mutex::new(Clock::default())),
            ticker: Mutex::new(None),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Adopts the stored current task and its elapsed time
    ///
    /// A running ticker is stopped and its value saved first.
    pub async fn load_current(&self) -> TrackerResult<TimerSnapshot> {
        let mut ticker = self.ticker.lock().await;
        self.drain(&mut ticker).await;

        let current = self.tasks.get_current_task(&self.user_id).await?;
        self.clock.lock().await.adopt(current.as_ref().map(|c| &c.task));

        Ok(self.snapshot_with(false).await)
    }

    /// Starts ticking
    ///
    /// Starting a running timer does nothing.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::Validation` if no task is selected.
    pub async fn start(&self) -> TrackerResult<TimerSnapshot> {
        let mut ticker = self.ticker.lock().await;
        if ticker.is_some() {
            return Ok(self.snapshot_with(true).await);
        }

        let task_id = self
            .clock
            .lock()
            .await
            .task_id
            .clone()
            .ok_or_else(|| TrackerError::validation("task_id", "no current task to time"))?;

        *ticker = Some(self.spawn_ticker());

        info!(task_id = %task_id, user_id = %self.user_id, "Timer started");
        Ok(self.snapshot_with(true).await)
    }

    /// Stops ticking and saves the final value
    ///
    /// Stopping a stopped timer does nothing.
    pub async fn stop(&self) -> TrackerResult<TimerSnapshot> {
        let mut ticker = self.ticker.lock().await;
        let Some(running) = ticker.take() else {
            return Ok(self.snapshot_with(false).await);
        };

        halt(running).await;
        self.save().await?;

        let snapshot = self.snapshot_with(false).await;
        info!(
            task_id = ?snapshot.task_id,
            seconds = snapshot.seconds,
            "Timer stopped"
        );
        Ok(snapshot)
    }

    /// Makes `task_id` the current task and adopts its elapsed time
    ///
    /// The previous task's timer is stopped and saved first; a failed save is
    /// logged and does not prevent the switch. The timer is left stopped.
    pub async fn select_task(&self, task_id: &str) -> TrackerResult<TimerSnapshot> {
        let mut ticker = self.ticker.lock().await;
        self.drain(&mut ticker).await;

        let task = self.tasks.set_current_task(task_id, &self.user_id).await?;
        self.clock.lock().await.adopt(Some(&task));

        debug!(task_id = %task_id, seconds = task.elapsed_time, "Timer switched task");
        Ok(self.snapshot_with(false).await)
    }

    /// Stops the timer, completes the current task and clears the selection
    ///
    /// Returns `None` if no task was selected.
    pub async fn complete_current(&self) -> TrackerResult<Option<Task>> {
        let mut ticker = self.ticker.lock().await;
        if let Some(running) = ticker.take() {
            halt(running).await;
            self.save().await?;
        }

        let Some(task_id) = self.clock.lock().await.task_id.clone() else {
            return Ok(None);
        };

        let task = self.tasks.complete_task(&task_id, &self.user_id).await?;
        self.clock.lock().await.adopt(None);

        Ok(Some(task))
    }

    /// Applies a patch to one of the user's tasks
    ///
    /// Patching the timed task pauses a running ticker around the write. Without
    /// an `elapsed_time` in the patch the running value is saved first. The clock
    /// then adopts the stored value and resumes. A patch that completes the task
    /// or clears its current flag drops the selection and leaves the timer stopped.
    pub async fn update_task(&self, task_id: &str, patch: UpdateTask) -> TrackerResult<Task> {
        let mut ticker = self.ticker.lock().await;
        if self.clock.lock().await.task_id.as_deref() != Some(task_id) {
            return self.tasks.update_task(task_id, &self.user_id, patch).await;
        }

        let was_running = ticker.is_some();
        if patch.elapsed_time.is_some() {
            if let Some(running) = ticker.take() {
                halt(running).await;
            }
        } else {
            self.drain(&mut ticker).await;
        }

        let task = match self.tasks.update_task(task_id, &self.user_id, patch).await {
            Ok(task) => task,
            Err(e) => {
                if was_running {
                    *ticker = Some(self.spawn_ticker());
                }
                return Err(e);
            }
        };

        let keep = !task.is_completed() && task.is_current;
        self.clock.lock().await.adopt(keep.then_some(&task));

        if was_running && keep {
            *ticker = Some(self.spawn_ticker());
        }

        debug!(task_id = %task_id, seconds = task.elapsed_time, running = was_running && keep, "Timed task updated");
        Ok(task)
    }

    /// Stores a timer value, rounded to whole seconds
    ///
    /// Storing into the timed task moves the clock to the new value. Negative,
    /// NaN or infinite input is ignored and returns `None`.
    pub async fn update_elapsed_time(&self, task_id: &str, seconds: f64) -> TrackerResult<Option<Task>> {
        if !seconds.is_finite() || seconds < 0.0 {
            return self.tasks.update_elapsed_time(task_id, &self.user_id, seconds).await;
        }

        let patch = UpdateTask {
            elapsed_time: Some(seconds.round() as i64),
            ..Default::default()
        };
        self.update_task(task_id, patch).await.map(Some)
    }

    pub async fn snapshot(&self) -> TimerSnapshot {
        let running = self.ticker.lock().await.is_some();
        self.snapshot_with(running).await
    }

    async fn snapshot_with(&self, running: bool) -> TimerSnapshot {
        let clock = self.clock.lock().await;
        TimerSnapshot {
            task_id: clock.task_id.clone(),
            seconds: clock.seconds,
            running,
        }
    }

    fn spawn_ticker(&self) -> Ticker {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_ticker(
            self.tasks.clone(),
            self.user_id.clone(),
            self.save_interval,
            self.clock.clone(),
            cancel.clone(),
        ));
        Ticker { cancel, handle }
    }

    /// Stops a running ticker and saves, logging a failed save
    async fn drain(&self, ticker: &mut Option<Ticker>) {
        let Some(running) = ticker.take() else {
            return;
        };

        halt(running).await;
        if let Err(e) = self.save().await {
            warn!(user_id = %self.user_id, error = %e, "Failed to save running timer");
        }
    }

    async fn save(&self) -> TrackerResult<()> {
        let (task_id, seconds) = {
            let clock = self.clock.lock().await;
            match &clock.task_id {
                Some(id) => (id.clone(), clock.seconds),
                None => return Ok(()),
            }
        };

        self.tasks
            .update_elapsed_time(&task_id, &self.user_id, seconds as f64)
            .await?;
        Ok(())
    }
}

impl Drop for TimerSession {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.get_mut().take() {
            ticker.cancel.cancel();
        }
    }
}

async fn halt(ticker: Ticker) {
    ticker.cancel.cancel();
    if let Err(e) = ticker.handle.await {
        warn!(error = %e, "Timer ticker ended abnormally");
    }
}

async fn run_ticker(
    tasks: TaskRepository,
    user_id: String,
    save_interval: u64,
    clock: Arc<Mutex<Clock>>,
    cancel: CancellationToken,
) {
    let mut interval = interval_at(Instant::now() + TICK, TICK);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let due = {
            let mut clock = clock.lock().await;
            clock.seconds += 1;

            match &clock.task_id {
                Some(id) if clock.seconds % save_interval as i64 == 0 => Some((id.clone(), clock.seconds)),
                _ => None,
            }
        };

        if let Some((task_id, seconds)) = due {
            match tasks.update_elapsed_time(&task_id, &user_id, seconds as f64).await {
                Ok(_) => debug!(task_id = %task_id, seconds, "Timer saved"),
                Err(e) => warn!(task_id = %task_id, seconds, error = %e, "Periodic timer save failed"),
            }
        }
    }

    debug!(user_id = %user_id, "Timer ticker stopped");
}

/// One timer session per user
pub struct TimerRegistry {
    tasks: TaskRepository,
    save_interval: u64,
    sessions: Mutex<HashMap<String, Arc<TimerSession>>>,
}

impl TimerRegistry {
    pub fn new(tasks: TaskRepository, save_interval: u64) -> Self {
        Self {
            tasks,
            save_interval,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the user's session, creating and loading it on first use
    ///
    /// A failure loading the current task is logged; the session then starts
    /// with nothing selected. Loading happens outside the registry lock; if two
    /// first requests race, the session inserted first wins.
    pub async fn session_for(&self, user_id: &str) -> Arc<TimerSession> {
        if let Some(session) = self.sessions.lock().await.get(user_id) {
            return session.clone();
        }

        let session = Arc::new(TimerSession::with_save_interval(
            self.tasks.clone(),
            user_id,
            self.save_interval,
        ));

        if let Err(e) = session.load_current().await {
            warn!(user_id = %user_id, error = %e, "Failed to load current task for timer");
        }

        self.sessions
            .lock()
            .await
            .entry(user_id.to_string())
            .or_insert(session)
            .clone()
    }

    /// Stops every running timer, saving each value
    pub async fn shutdown(&self) {
        let sessions: Vec<Arc<TimerSession>> = self.sessions.lock().await.values().cloned().collect();

        for session in sessions {
            if let Err(e) = session.stop().await {
                warn!(user_id = %session.user_id(), error = %e, "Failed to save timer on shutdown");
            }
        }

        info!("Timers stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::{CreateTask, TaskStatus};
    use crate::storage::local::LocalStore;
    use crate::storage::testing::FlakyStore;

    fn repository() -> TaskRepository {
        TaskRepository::new(Arc::new(LocalStore::in_memory()))
    }

    #[tokio::test]
    async fn test_start_without_task_is_rejected() {
        let timer = TimerSession::new(repository(), "u1");
        let err = timer.start().await.unwrap_err();
        assert!(err.is_validation());
        assert!(!timer.snapshot().await.running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_save_and_stop() {
        let tasks = repository();
        let task = tasks.create_task("u1", CreateTask::titled("A")).await.unwrap();

        let timer = TimerSession::new(tasks.clone(), "u1");
        timer.select_task(&task.id).await.unwrap();
        timer.start().await.unwrap();
        // Starting twice is a no-op
        assert!(timer.start().await.unwrap().running);

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(tasks.get_task(&task.id, "u1").await.unwrap().elapsed_time, 10);

        tokio::time::sleep(Duration::from_secs(3)).await;
        let snapshot = timer.stop().await.unwrap();
        assert_eq!(snapshot.seconds, 13);
        assert!(!snapshot.running);
        assert_eq!(tasks.get_task(&task.id, "u1").await.unwrap().elapsed_time, 13);
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_task_saves_previous() {
        let tasks = repository();
        let a = tasks.create_task("u1", CreateTask::titled("A")).await.unwrap();
        let b = tasks.create_task("u1", CreateTask::titled("B")).await.unwrap();

        let timer = TimerSession::new(tasks.clone(), "u1");
        timer.select_task(&a.id).await.unwrap();
        timer.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(4_500)).await;

        let snapshot = timer.select_task(&b.id).await.unwrap();
        assert_eq!(snapshot.task_id.as_deref(), Some(b.id.as_str()));
        assert_eq!(snapshot.seconds, 0);
        assert!(!snapshot.running);

        assert_eq!(tasks.get_task(&a.id, "u1").await.unwrap().elapsed_time, 4);
        let current = tasks.get_current_task("u1").await.unwrap().unwrap();
        assert_eq!(current.task.id, b.id);
    }

    #[tokio::test]
    async fn test_complete_current_clears_selection() {
        let tasks = repository();
        let task = tasks.create_task("u1", CreateTask::titled("A")).await.unwrap();

        let timer = TimerSession::new(tasks.clone(), "u1");
        timer.select_task(&task.id).await.unwrap();

        let done = timer.complete_current().await.unwrap().unwrap();
        assert!(done.is_completed());
        assert_eq!(timer.snapshot().await.task_id, None);
        assert!(timer.complete_current().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_registry_loads_current_task() {
        let tasks = repository();
        let task = tasks.create_task("u1", CreateTask::titled("A")).await.unwrap();
        tasks.set_current_task(&task.id, "u1").await.unwrap();
        tasks.update_elapsed_time(&task.id, "u1", 42.0).await.unwrap();

        let registry = TimerRegistry::new(tasks, DEFAULT_SAVE_INTERVAL_SECS);
        let session = registry.session_for("u1").await;
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.task_id.as_deref(), Some(task.id.as_str()));
        assert_eq!(snapshot.seconds, 42);

        assert!(Arc::ptr_eq(&session, &registry.session_for("u1").await));
        assert_eq!(registry.session_for("u2").await.snapshot().await.task_id, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_storing_elapsed_time_moves_running_clock() {
        let tasks = repository();
        let task = tasks.create_task("u1", CreateTask::titled("A")).await.unwrap();

        let timer = TimerSession::new(tasks.clone(), "u1");
        timer.select_task(&task.id).await.unwrap();
        timer.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(4_500)).await;

        let stored = timer.update_elapsed_time(&task.id, 100.4).await.unwrap().unwrap();
        assert_eq!(stored.elapsed_time, 100);

        let snapshot = timer.snapshot().await;
        assert_eq!(snapshot.seconds, 100);
        assert!(snapshot.running);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(timer.stop().await.unwrap().seconds, 102);
        assert_eq!(tasks.get_task(&task.id, "u1").await.unwrap().elapsed_time, 102);

        // Invalid input leaves the clock alone
        assert!(timer.update_elapsed_time(&task.id, -1.0).await.unwrap().is_none());
        assert_eq!(timer.snapshot().await.seconds, 102);
    }

    #[tokio::test(start_paused = true)]
    async fn test_patching_timed_task_keeps_running_value() {
        let tasks = repository();
        let task = tasks.create_task("u1", CreateTask::titled("A")).await.unwrap();

        let timer = TimerSession::new(tasks.clone(), "u1");
        timer.select_task(&task.id).await.unwrap();
        timer.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(3_500)).await;

        let patch = UpdateTask {
            title: Some("Renamed".to_string()),
            ..Default::default()
        };
        let updated = timer.update_task(&task.id, patch).await.unwrap();
        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.elapsed_time, 3);

        let snapshot = timer.snapshot().await;
        assert_eq!(snapshot.seconds, 3);
        assert!(snapshot.running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completing_timed_task_by_patch_stops_timer() {
        let tasks = repository();
        let timed = tasks.create_task("u1", CreateTask::titled("A")).await.unwrap();
        let other = tasks.create_task("u1", CreateTask::titled("B")).await.unwrap();

        let timer = TimerSession::new(tasks.clone(), "u1");
        timer.select_task(&timed.id).await.unwrap();
        timer.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2_500)).await;

        // Patching another task does not touch the clock
        let patch = UpdateTask {
            elapsed_time: Some(50),
            ..Default::default()
        };
        timer.update_task(&other.id, patch).await.unwrap();
        assert_eq!(timer.snapshot().await.seconds, 2);

        let patch = UpdateTask {
            status: Some(TaskStatus::Completed),
            ..Default::default()
        };
        let done = timer.update_task(&timed.id, patch).await.unwrap();
        assert!(done.is_completed());
        assert!(!done.is_current);
        assert_eq!(done.elapsed_time, 2);

        let snapshot = timer.snapshot().await;
        assert_eq!(snapshot.task_id, None);
        assert!(!snapshot.running);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(tasks.get_task(&timed.id, "u1").await.unwrap().elapsed_time, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_first_load_does_not_block_other_users() {
        let store = Arc::new(FlakyStore::new());
        let release = store.stall_queries_for("slow");
        let registry = Arc::new(TimerRegistry::new(
            TaskRepository::new(store.clone()),
            DEFAULT_SAVE_INTERVAL_SECS,
        ));

        let pending = tokio::spawn({
            let registry = registry.clone();
            async move { registry.session_for("slow").await }
        });
        tokio::task::yield_now().await;

        let fast = tokio::time::timeout(Duration::from_secs(1), registry.session_for("fast")).await;
        assert!(fast.is_ok());
        assert!(!pending.is_finished());

        release.notify_one();
        let slow = pending.await.unwrap();
        assert!(Arc::ptr_eq(&slow, &registry.session_for("slow").await));
    }
}
