use std::sync::{Arc, Mutex};

use notekeeper::{
    run_backup_check, spawn_backup_export, spawn_backup_import, BackupManager, EditorSession,
    FixedPathChooser, NoEditor, Note, NotebookContext, NotebookError, NotebookScheduler,
    NotebookService, UniqueDocument,
};
use tempfile::TempDir;

/// Editor that is always open and hands out one pending note.
#[derive(Default)]
struct PendingEditor {
    pending: Mutex<Option<Note>>,
}

impl EditorSession for PendingEditor {
    fn is_open(&self) -> bool {
        true
    }

    fn take_unsaved_note(&self) -> Option<Note> {
        self.pending.lock().unwrap().take()
    }
}

fn open_notebook() -> (TempDir, NotebookContext, Arc<NotebookService>, BackupManager) {
    let dir = tempfile::tempdir().unwrap();
    let context = NotebookContext::open(dir.path()).unwrap();
    let service = Arc::new(NotebookService::open(&context));
    service.load_documents().unwrap();
    let backups = BackupManager::new(&context);
    (dir, context, service, backups)
}

#[tokio::test]
async fn save_now_persists_the_edited_note() {
    let (_dir, _context, service, backups) = open_notebook();
    let mut note = service.create_note().unwrap();
    note.set_body("typed in the editor");

    let editor = Arc::new(PendingEditor::default());
    *editor.pending.lock().unwrap() = Some(note.clone());

    let mut scheduler = NotebookScheduler::new(Arc::clone(&service), backups, editor.clone());
    scheduler.start().await.unwrap();
    scheduler.save_now().await.unwrap();
    scheduler.stop().await.unwrap();

    assert!(editor.pending.lock().unwrap().is_none());
    let mut stored: Note = service.store().get_by_id(note.id()).unwrap().unwrap();
    stored.decompress_body().unwrap();
    assert_eq!(stored.body(), "typed in the editor");
}

#[tokio::test]
async fn backup_now_snapshots_and_records_the_time() {
    let (_dir, context, service, backups) = open_notebook();
    service.create_note().unwrap();

    let mut scheduler = NotebookScheduler::new(Arc::clone(&service), backups.clone(), Arc::new(NoEditor));
    scheduler.start().await.unwrap();
    assert!(scheduler.get_status().await.is_running);
    scheduler.backup_now().await.unwrap();
    scheduler.stop().await.unwrap();

    let status = scheduler.get_status().await;
    assert!(!status.is_running);
    let snapshot = status.last_backup_path.unwrap();
    assert!(snapshot.is_dir());
    assert!(!backups.list_backups().unwrap().is_empty());
    assert!(context.config().read(|c| c.last_backup).unwrap() > 0);
}

#[tokio::test]
async fn shutdown_forces_a_final_full_save() {
    let (dir, context, service, backups) = open_notebook();
    let mirror = dir.path().join("mirror.json");
    context
        .config()
        .update(|c| c.automatic_export_path = Some(mirror.clone()))
        .unwrap();
    service.create_note().unwrap();

    let mut scheduler = NotebookScheduler::new(Arc::clone(&service), backups, Arc::new(NoEditor));
    scheduler.start().await.unwrap();
    assert!(scheduler.shutdown().await.unwrap());

    assert!(mirror.is_file());
    assert!(context.config().path().is_file());
    assert!(scheduler.get_status().await.last_full_save.is_some());
}

#[tokio::test]
async fn frequency_updates_are_persisted() {
    let (_dir, context, service, backups) = open_notebook();
    let mut scheduler = NotebookScheduler::new(service, backups, Arc::new(NoEditor));
    scheduler.start().await.unwrap();
    scheduler.update_save_frequency(1_234).await.unwrap();
    scheduler.update_full_save_frequency(60_000).await.unwrap();
    scheduler.stop().await.unwrap();

    let reloaded = NotebookContext::open(context.root_dir()).unwrap();
    let config = reloaded.config().snapshot().unwrap();
    assert_eq!(config.save_frequency, 1_234);
    assert_eq!(config.full_save_frequency, 60_000);
}

#[tokio::test]
async fn commands_require_a_running_scheduler() {
    let (_dir, _context, service, backups) = open_notebook();
    let mut scheduler = NotebookScheduler::new(service, backups, Arc::new(NoEditor));

    let error = scheduler.save_now().await.unwrap_err();
    assert!(matches!(error, NotebookError::SchedulerError { .. }));
    scheduler.stop().await.unwrap();

    scheduler.start().await.unwrap();
    assert!(scheduler.start().await.is_err());
    scheduler.stop().await.unwrap();
}

#[test]
fn backup_check_waits_for_the_interval() {
    let (_dir, context, service, backups) = open_notebook();
    assert!(run_backup_check(&service, &backups, false).unwrap().is_some());
    assert!(run_backup_check(&service, &backups, false).unwrap().is_none());

    context.config().update(|c| c.last_backup = 0).unwrap();
    assert!(run_backup_check(&service, &backups, false).unwrap().is_some());
}

#[tokio::test]
async fn dialog_driven_export_and_import_run_off_thread() {
    let (dir, _context, service, _backups) = open_notebook();
    let mut note = service.create_note().unwrap();
    note.set_body("round trip");
    service.save_note(&note).unwrap();

    let path = dir.path().join("export.json");
    let chooser = Arc::new(FixedPathChooser::new(Some(path.clone())));
    let written = spawn_backup_export(Arc::clone(&service), chooser.clone(), false)
        .await
        .unwrap();
    assert_eq!(written, Some(path.clone()));

    service.delete_note(&note).unwrap();
    let summary = spawn_backup_import(Arc::clone(&service), chooser)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary.notes_restored, 1);
    assert_eq!(service.notes().unwrap()[0].body(), "round trip");

    let cancelled = spawn_backup_export(service, Arc::new(FixedPathChooser::default()), false)
        .await
        .unwrap();
    assert!(cancelled.is_none());
}
