// src/scheduler.rs - Background save and snapshot scheduler
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, error, info};
use tokio::sync::{mpsc, Mutex};
use tokio::task::{self, JoinHandle};
use tokio::time::{self, Duration, Instant, Interval, MissedTickBehavior};

use crate::{
    now_unix_millis, BackupManager, FileChooser, Note, NotebookError, NotebookService,
    RestoreSummary, Result, UniqueDocument,
};

/// The editor surface the partial save consults.
pub trait EditorSession: Send + Sync {
    /// Whether an editor window is currently open.
    fn is_open(&self) -> bool;

    /// The edited note if it has unsaved changes, clearing the dirty state.
    fn take_unsaved_note(&self) -> Option<Note>;
}

/// Session for hosts without an editor; partial saves never fire.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEditor;

impl EditorSession for NoEditor {
    fn is_open(&self) -> bool {
        false
    }

    fn take_unsaved_note(&self) -> Option<Note> {
        None
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchedulerStatus {
    /// Whether the scheduler is running
    pub is_running: bool,
    /// The time the last full save finished
    pub last_full_save: Option<DateTime<Utc>>,
    /// The directory of the last data snapshot
    pub last_backup_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum SchedulerCommand {
    /// Save the edited note immediately
    SaveNow,
    /// Run a full save immediately
    FullSaveNow,
    /// Snapshot the data directory immediately
    BackupNow,
    /// Change the partial save interval, in milliseconds
    UpdateSaveFrequency(u64),
    /// Change the full save interval, in milliseconds
    UpdateFullSaveFrequency(u64),
    /// Stop the scheduler
    Stop,
}

/// Drives partial saves, full saves and data snapshots from one task.
pub struct NotebookScheduler {
    service: Arc<NotebookService>,

    backups: BackupManager,

    editor: Arc<dyn EditorSession>,

    /// Channel to send commands to the scheduler task
    command_tx: Option<mpsc::Sender<SchedulerCommand>>,

    /// Handle to the scheduler task
    scheduler_task: Option<JoinHandle<()>>,

    status: Arc<Mutex<SchedulerStatus>>,
}

impl NotebookScheduler {
    pub fn new(
        service: Arc<NotebookService>,
        backups: BackupManager,
        editor: Arc<dyn EditorSession>,
    ) -> Self {
        Self {
            service,
            backups,
            editor,
            command_tx: None,
            scheduler_task: None,
            status: Arc::new(Mutex::new(SchedulerStatus::default())),
        }
    }

    /// Starts the scheduler task with the intervals from the configuration.
    pub async fn start(&mut self) -> Result<()> {
        if self.scheduler_task.is_some() {
            return Err(NotebookError::SchedulerError {
                message: "Scheduler is already running".to_string(),
            });
        }

        let config = self.service.context().config().snapshot()?;
        info!(
            "Starting scheduler: save every {} ms, full save every {} ms, backup every {} ms",
            config.save_frequency, config.full_save_frequency, config.backup_frequency
        );

        let (command_tx, mut command_rx) = mpsc::channel(10);
        self.command_tx = Some(command_tx);

        let service = Arc::clone(&self.service);
        let backups = self.backups.clone();
        let editor = Arc::clone(&self.editor);
        let status = Arc::clone(&self.status);

        let task = tokio::spawn(async move {
            let mut save_interval = new_interval(config.save_frequency, false);
            let mut full_save_interval = new_interval(config.full_save_frequency, false);
            // The first backup tick fires at once so a missed day is caught on start.
            let mut backup_interval = new_interval(config.backup_frequency, true);

            loop {
                tokio::select! {
                    _ = save_interval.tick() => {
                        partial_save(&service, &editor).await;
                    }
                    _ = full_save_interval.tick() => {
                        full_save(&service, &status).await;
                    }
                    _ = backup_interval.tick() => {
                        backup(&service, &backups, &status, false).await;
                    }
                    cmd = command_rx.recv() => match cmd {
                        Some(SchedulerCommand::SaveNow) => partial_save(&service, &editor).await,
                        Some(SchedulerCommand::FullSaveNow) => full_save(&service, &status).await,
                        Some(SchedulerCommand::BackupNow) => {
                            backup(&service, &backups, &status, true).await
                        }
                        Some(SchedulerCommand::UpdateSaveFrequency(ms)) => {
                            debug!("Partial save interval set to {} ms", ms);
                            save_interval = new_interval(ms, false);
                        }
                        Some(SchedulerCommand::UpdateFullSaveFrequency(ms)) => {
                            debug!("Full save interval set to {} ms", ms);
                            full_save_interval = new_interval(ms, false);
                        }
                        Some(SchedulerCommand::Stop) | None => {
                            info!("Scheduler stopping...");
                            break;
                        }
                    }
                }
            }
        });

        self.scheduler_task = Some(task);
        self.status.lock().await.is_running = true;

        Ok(())
    }

    /// Stops the scheduler, waiting for any in-flight job to finish.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.scheduler_task.take() {
            if let Some(command_tx) = self.command_tx.take() {
                if let Err(e) = command_tx.send(SchedulerCommand::Stop).await {
                    error!("Failed to send stop command to scheduler: {}", e);
                }
            }

            if let Err(e) = task.await {
                let error_msg = format!("Failed to stop scheduler: {}", e);
                error!("{}", error_msg);
                return Err(NotebookError::SchedulerError { message: error_msg });
            }

            self.status.lock().await.is_running = false;
            info!("Scheduler stopped");
        } else {
            debug!("Scheduler is not running");
        }

        Ok(())
    }

    /// Stops the timers, then forces a final full save.
    pub async fn shutdown(&mut self) -> Result<bool> {
        self.stop().await?;

        let service = Arc::clone(&self.service);
        let saved = task::spawn_blocking(move || service.save_full_notebook())
            .await
            .map_err(|e| NotebookError::SchedulerError {
                message: format!("Final save did not complete: {}", e),
            })??;

        if saved {
            self.status.lock().await.last_full_save = Some(Utc::now());
        }
        info!("Final full save {}", if saved { "completed" } else { "skipped" });
        Ok(saved)
    }

    async fn send(&self, command: SchedulerCommand) -> Result<()> {
        let command_tx = match &self.command_tx {
            Some(tx) if self.scheduler_task.is_some() => tx,
            _ => {
                return Err(NotebookError::SchedulerError {
                    message: "Scheduler is not running".to_string(),
                })
            }
        };

        command_tx
            .send(command)
            .await
            .map_err(|e| NotebookError::SchedulerError {
                message: format!("Failed to send scheduler command: {}", e),
            })
    }

    pub async fn save_now(&self) -> Result<()> {
        self.send(SchedulerCommand::SaveNow).await
    }

    pub async fn full_save_now(&self) -> Result<()> {
        self.send(SchedulerCommand::FullSaveNow).await
    }

    pub async fn backup_now(&self) -> Result<()> {
        self.send(SchedulerCommand::BackupNow).await
    }

    /// Persists and applies a new partial save interval.
    pub async fn update_save_frequency(&self, ms: u64) -> Result<()> {
        let config = self.service.context().config();
        config.update(|c| c.save_frequency = ms)?;
        config.save()?;
        self.send(SchedulerCommand::UpdateSaveFrequency(ms)).await
    }

    /// Persists and applies a new full save interval.
    pub async fn update_full_save_frequency(&self, ms: u64) -> Result<()> {
        let config = self.service.context().config();
        config.update(|c| c.full_save_frequency = ms)?;
        config.save()?;
        self.send(SchedulerCommand::UpdateFullSaveFrequency(ms)).await
    }

    /// Get the current status of the scheduler
    pub async fn get_status(&self) -> SchedulerStatus {
        self.status.lock().await.clone()
    }
}

fn new_interval(ms: u64, immediate: bool) -> Interval {
    // A zero period would panic.
    let period = Duration::from_millis(ms.max(1));
    let start = if immediate {
        Instant::now()
    } else {
        Instant::now() + period
    };
    let mut interval = time::interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Runs blocking work off the scheduler task and waits for it.
async fn run_blocking<R, F>(name: &'static str, job: F) -> Option<R>
where
    F: FnOnce() -> Result<R> + Send + 'static,
    R: Send + 'static,
{
    match task::spawn_blocking(job).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            error!("Scheduled {} failed: {}", name, e);
            None
        }
        Err(e) => {
            error!("Scheduled {} did not complete: {}", name, e);
            None
        }
    }
}

async fn partial_save(service: &Arc<NotebookService>, editor: &Arc<dyn EditorSession>) {
    let service = Arc::clone(service);
    let editor = Arc::clone(editor);
    run_blocking("partial save", move || {
        if !editor.is_open() {
            return Ok(());
        }
        if let Some(note) = editor.take_unsaved_note() {
            service.save_note(&note)?;
            debug!("Saved edited note {}", note.id());
        }
        Ok(())
    })
    .await;
}

async fn full_save(service: &Arc<NotebookService>, status: &Arc<Mutex<SchedulerStatus>>) {
    let service = Arc::clone(service);
    if let Some(true) = run_blocking("full save", move || service.save_full_notebook()).await {
        status.lock().await.last_full_save = Some(Utc::now());
    }
}

async fn backup(
    service: &Arc<NotebookService>,
    backups: &BackupManager,
    status: &Arc<Mutex<SchedulerStatus>>,
    force: bool,
) {
    let service = Arc::clone(service);
    let backups = backups.clone();
    let result = run_blocking("backup", move || run_backup_check(&service, &backups, force)).await;
    if let Some(Some(path)) = result {
        status.lock().await.last_backup_path = Some(path);
    }
}

/// Snapshots the data directory if the backup interval has elapsed since
/// the last snapshot, or unconditionally when `force` is set.
pub fn run_backup_check(
    service: &NotebookService,
    backups: &BackupManager,
    force: bool,
) -> Result<Option<PathBuf>> {
    let config = service.context().config();
    let (last_backup, frequency, retention) =
        config.read(|c| (c.last_backup, c.backup_frequency, c.backup_retention))?;

    let now = now_unix_millis();
    let frequency = i64::try_from(frequency).unwrap_or(i64::MAX);
    if !force && now.saturating_sub(last_backup) < frequency {
        debug!("Backup not due yet");
        return Ok(None);
    }

    let Some(path) = backups.create_backup("") else {
        return Ok(None);
    };
    backups.delete_backups(retention);

    config.update(|c| c.last_backup = now)?;
    config.save()?;
    Ok(Some(path))
}

/// Runs a user-directed JSON export off the calling thread.
pub fn spawn_backup_export(
    service: Arc<NotebookService>,
    chooser: Arc<dyn FileChooser>,
    write_to_configured_path: bool,
) -> JoinHandle<Option<PathBuf>> {
    task::spawn_blocking(move || {
        match service.create_backup(chooser.as_ref(), write_to_configured_path) {
            Ok(path) => path,
            Err(e) => {
                error!("Backup export failed: {}", e);
                None
            }
        }
    })
}

/// Runs a user-directed JSON import off the calling thread.
pub fn spawn_backup_import(
    service: Arc<NotebookService>,
    chooser: Arc<dyn FileChooser>,
) -> JoinHandle<Option<RestoreSummary>> {
    task::spawn_blocking(move || match service.load_backup(chooser.as_ref()) {
        Ok(summary) => summary,
        Err(e) => {
            error!("Backup import failed: {}", e);
            None
        }
    })
}
