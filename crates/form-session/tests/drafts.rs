use std::collections::BTreeMap;

use form_session::{DraftGateway, FileDraftStore};
use form_spec::FormIdentity;

fn identity() -> FormIdentity {
    FormIdentity::new("acme", "pod", "delivery")
}

#[tokio::test]
async fn file_drafts_replace_previous_save() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileDraftStore::new(dir.path());

    let first = BTreeMap::from([("1".to_string(), "ok".to_string())]);
    store.save(&first, &identity()).await.expect("first save");
    let second = BTreeMap::from([
        ("1".to_string(), "refused".to_string()),
        ("3".to_string(), "closed".to_string()),
    ]);
    store.save(&second, &identity()).await.expect("second save");

    let record = store
        .load(&identity())
        .await
        .expect("load")
        .expect("draft present");
    assert_eq!(record.response, second);
    assert_eq!(record.identity, identity());

    let parent = store.path_for(&identity());
    let siblings: Vec<_> = std::fs::read_dir(parent.parent().expect("parent"))
        .expect("read dir")
        .map(|entry| entry.expect("entry").file_name())
        .collect();
    assert_eq!(siblings, vec![std::ffi::OsString::from("pod.json")]);
}

#[tokio::test]
async fn discard_removes_the_draft() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileDraftStore::new(dir.path());
    assert!(store.load(&identity()).await.expect("load").is_none());
    assert!(!store.discard(&identity()).await.expect("discard missing"));

    store
        .save(&BTreeMap::new(), &identity())
        .await
        .expect("save");
    assert!(store.discard(&identity()).await.expect("discard"));
    assert!(store.load(&identity()).await.expect("load").is_none());
}

#[tokio::test]
async fn drafts_are_laid_out_by_customer_and_class() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileDraftStore::new(dir.path());
    assert_eq!(
        store.path_for(&identity()),
        dir.path().join("acme").join("delivery").join("pod.json")
    );
}

#[tokio::test]
async fn failed_save_leaves_no_temp_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileDraftStore::new(dir.path());
    let target = store.path_for(&identity());
    // A non-empty directory where the draft belongs makes the final rename fail.
    std::fs::create_dir_all(target.join("occupied")).expect("block target");

    let err = store
        .save(&BTreeMap::new(), &identity())
        .await
        .expect_err("rename over a directory");
    assert!(err.to_string().contains("failed to move draft"));

    let siblings: Vec<_> = std::fs::read_dir(target.parent().expect("parent"))
        .expect("read dir")
        .map(|entry| entry.expect("entry").file_name())
        .collect();
    assert_eq!(siblings, vec![std::ffi::OsString::from("pod.json")]);
}
