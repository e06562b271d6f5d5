/*
[INPUT]:  Task creation, start/stop/purge commands, machine notices
[OUTPUT]: Spawned submission machines, task snapshots, badge updates
[POS]:    Coordination layer - root actor owning the task registry
[UPDATE]: When task lifecycle orchestration or restore semantics change
*/

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use fieldsync_api::SyncClient;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::config::TimingConfig;
use crate::model::{NewTask, Task};
use crate::notify::Notifier;
use crate::store::TaskStore;
use crate::submission::{MachineHandle, ManagerNotice, SubmissionEvent, SubmissionMachine, TaskHandle};

/// Host application foreground state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Active,
    Background,
}

/// Commands accepted by the task manager
#[derive(Debug)]
enum ManagerEvent {
    /// Restore persisted tasks and spawn a machine per unfinished task
    Start,
    AddTask(Box<Task>),
    /// Cancel all machines and drop the in-memory registry
    Stop,
    /// Stop, then erase the durable store (logout)
    Purge,
    AppStateChange(AppState),
}

type SharedEventSenders = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<SubmissionEvent>>>>;

/// Cloneable front door to the running manager.
#[derive(Clone)]
pub struct ManagerHandle {
    events: mpsc::UnboundedSender<ManagerEvent>,
    snapshots: broadcast::Sender<Task>,
    machine_events: SharedEventSenders,
    project_id: String,
    client_id: String,
    shutdown: CancellationToken,
}

impl ManagerHandle {
    /// Build a task from collected data and hand it to the manager.
    /// Returns the task id immediately; progress arrives on the snapshot
    /// stream.
    pub fn create_task(&self, input: NewTask) -> String {
        let task = Task::new(&self.project_id, &self.client_id, input);
        let id = task.id.clone();
        let _ = self.events.send(ManagerEvent::AddTask(Box::new(task)));
        id
    }

    /// Address of a running task's submission machine, for manual retries.
    pub fn task_handle(&self, task_id: &str) -> Option<TaskHandle> {
        let senders = self.machine_events.lock().unwrap_or_else(|e| e.into_inner());
        senders
            .get(task_id)
            .map(|events| TaskHandle { events: events.clone() })
    }

    /// Subscribe to task snapshots. Every state or progress change publishes
    /// the full task.
    pub fn subscribe(&self) -> broadcast::Receiver<Task> {
        self.snapshots.subscribe()
    }

    pub fn start(&self) {
        let _ = self.events.send(ManagerEvent::Start);
    }

    pub fn stop(&self) {
        let _ = self.events.send(ManagerEvent::Stop);
    }

    pub fn purge(&self) {
        let _ = self.events.send(ManagerEvent::Purge);
    }

    pub fn app_state_change(&self, state: AppState) {
        let _ = self.events.send(ManagerEvent::AppStateChange(state));
    }

    /// Tear the whole tree down. Unlike stop, this also ends the manager
    /// loop itself.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Root cancellation token, for wiring signal handlers.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

/// Root actor: owns the registry, spawns one submission machine per
/// unfinished task, and folds machine notices back into the registry.
pub struct TaskManager {
    registry: HashMap<String, Task>,
    machines: HashMap<String, MachineHandle>,
    machine_events: SharedEventSenders,
    store: Arc<TaskStore>,
    client: SyncClient,
    timing: TimingConfig,
    notifier: Arc<dyn Notifier>,
    events: mpsc::UnboundedReceiver<ManagerEvent>,
    notices_tx: mpsc::UnboundedSender<ManagerNotice>,
    notices_rx: mpsc::UnboundedReceiver<ManagerNotice>,
    snapshots: broadcast::Sender<Task>,
    shutdown: CancellationToken,
}

impl TaskManager {
    pub fn spawn(
        store: Arc<TaskStore>,
        client: SyncClient,
        timing: TimingConfig,
        notifier: Arc<dyn Notifier>,
        project_id: impl Into<String>,
        client_id: impl Into<String>,
    ) -> ManagerHandle {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        let (snapshots, _) = broadcast::channel(256);
        let machine_events: SharedEventSenders = Arc::new(Mutex::new(HashMap::new()));
        let shutdown = CancellationToken::new();

        let manager = Self {
            registry: HashMap::new(),
            machines: HashMap::new(),
            machine_events: machine_events.clone(),
            store,
            client,
            timing,
            notifier,
            events: events_rx,
            notices_tx,
            notices_rx,
            snapshots: snapshots.clone(),
            shutdown: shutdown.clone(),
        };
        tokio::spawn(manager.run());

        ManagerHandle {
            events: events_tx,
            snapshots,
            machine_events,
            project_id: project_id.into(),
            client_id: client_id.into(),
            shutdown,
        }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    self.stop_machines();
                    tracing::info!("task manager shut down");
                    return;
                }
                event = self.events.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => {
                            self.stop_machines();
                            return;
                        }
                    }
                }
                notice = self.notices_rx.recv() => {
                    // notices_tx lives on self, so this arm never yields None
                    if let Some(notice) = notice {
                        self.handle_notice(notice);
                    }
                }
            }
        }
    }

    async fn handle_event(&mut self, event: ManagerEvent) {
        match event {
            ManagerEvent::Start => {
                let restored = self.store.tasks().await;
                tracing::info!(tasks = restored.len(), "task manager starting");
                for (id, task) in restored {
                    self.registry.entry(id).or_insert(task);
                }
                self.spawn_missing();
            }
            ManagerEvent::AddTask(task) => {
                tracing::info!(
                    task_id = %task.id,
                    attachments = task.attachments.len(),
                    "task added"
                );
                if let Err(err) = self.store.upsert((*task).clone()).await {
                    tracing::warn!(task_id = %task.id, error = %err, "failed to persist task");
                }
                self.publish((*task).clone());
                self.registry.insert(task.id.clone(), *task);
                self.spawn_missing();
            }
            ManagerEvent::Stop => {
                tracing::info!("task manager stopping");
                self.stop_machines();
                self.registry.clear();
            }
            ManagerEvent::Purge => {
                tracing::info!("purging all tasks");
                self.stop_machines();
                self.registry.clear();
                if let Err(err) = self.store.purge().await {
                    tracing::warn!(error = %err, "failed to purge task store");
                }
            }
            ManagerEvent::AppStateChange(state) => self.handle_app_state(state),
        }
    }

    /// Spawn a machine for every registry task without one. Completed tasks
    /// still get a machine; it reports done immediately and exits, which
    /// keeps restore and live paths identical.
    fn spawn_missing(&mut self) {
        for task in self.registry.values() {
            if self.machines.contains_key(&task.id) {
                continue;
            }
            let handle = SubmissionMachine::spawn(
                task.clone(),
                self.client.clone(),
                self.store.clone(),
                self.timing,
                self.notices_tx.clone(),
                self.shutdown.child_token(),
            );
            let mut senders = self
                .machine_events
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            senders.insert(task.id.clone(), handle.events.clone());
            drop(senders);
            self.machines.insert(task.id.clone(), handle);
        }
    }

    fn stop_machines(&mut self) {
        for handle in self.machines.values() {
            handle.shutdown.cancel();
        }
        self.machines.clear();
        let mut senders = self
            .machine_events
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        senders.clear();
    }

    fn handle_notice(&mut self, notice: ManagerNotice) {
        match notice {
            ManagerNotice::TaskStarted(task) | ManagerNotice::TaskProgress(task) => {
                self.publish((*task).clone());
                self.registry.insert(task.id.clone(), *task);
            }
            ManagerNotice::TaskDone(task) => {
                tracing::info!(task_id = %task.id, "task completed");
                // The machine exits after this notice; keep only live
                // handles in the maps.
                self.machines.remove(&task.id);
                let mut senders = self
                    .machine_events
                    .lock()
                    .unwrap_or_else(|e| e.into_inner());
                senders.remove(&task.id);
                drop(senders);
                self.publish((*task).clone());
                self.registry.insert(task.id.clone(), *task);
            }
        }
    }

    fn handle_app_state(&self, state: AppState) {
        match state {
            AppState::Active => {
                self.notifier.clear_notification();
                self.notifier.set_badge_count(0);
            }
            AppState::Background => {
                let pending = self.registry.values().filter(|t| !t.is_done()).count() as u32;
                self.notifier.set_badge_count(pending);
                if pending > 0 {
                    self.notifier.show_notification(&format!(
                        "{pending} task(s) still syncing in the background"
                    ));
                }
            }
        }
    }

    fn publish(&self, task: Task) {
        // no subscribers is fine
        let _ = self.snapshots.send(task);
    }
}
