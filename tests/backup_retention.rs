use std::fs;

use notekeeper::{BackupManager, NotebookContext};

#[test]
fn pruning_keeps_the_most_recent_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let manager = BackupManager::with_data_dir(dir.path());
    let stamps = [1_700_000_500u64, 1_700_000_100, 1_700_000_400, 1_700_000_200, 1_700_000_300];
    for stamp in stamps {
        fs::create_dir_all(dir.path().join(stamp.to_string())).unwrap();
    }
    fs::create_dir_all(dir.path().join("upgrade").join("v1_1600000000")).unwrap();
    fs::create_dir_all(dir.path().join("v1_1500000000")).unwrap();

    assert_eq!(manager.delete_backups(3), 2);

    let remaining: Vec<u64> = manager
        .list_backups()
        .unwrap()
        .into_iter()
        .map(|(stamp, _)| stamp)
        .collect();
    assert_eq!(remaining, vec![1_700_000_300, 1_700_000_400, 1_700_000_500]);
    assert!(dir.path().join("upgrade").join("v1_1600000000").is_dir());
    assert!(dir.path().join("v1_1500000000").is_dir());
}

#[test]
fn pruning_below_the_limit_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let manager = BackupManager::with_data_dir(dir.path());
    fs::create_dir_all(dir.path().join("1")).unwrap();
    assert_eq!(manager.delete_backups(7), 0);
    assert_eq!(manager.list_backups().unwrap().len(), 1);
}

#[test]
fn snapshot_of_a_live_notebook_contains_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let context = NotebookContext::open(dir.path()).unwrap();
    let service = notekeeper::NotebookService::open(&context);
    service.create_note().unwrap();

    let manager = BackupManager::new(&context);
    let snapshot = manager.create_backup("").unwrap();
    assert!(snapshot.starts_with(context.data_dir()));
    assert!(snapshot.join(notekeeper::STORE_FILE_NAME).is_file());
    assert_eq!(manager.list_backups().unwrap().len(), 1);
}
