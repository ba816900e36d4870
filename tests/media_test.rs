//! Best-effort media removal on delete and the unreferenced-object sweep.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tempfile::TempDir;

use sign_admin::backend::{Backend, ObjectStore};
use sign_admin::config::Buckets;
use sign_admin::credentials::Credentials;
use sign_admin::db::create_test_database;
use sign_admin::editor::{RecordEditor, SubmitOutcome};
use sign_admin::local::{CredentialsAuthenticator, DirectoryBuckets, SqliteTables};
use sign_admin::media::{delete_with_media, sweep_media};
use sign_admin::relocate::LocalFile;
use sign_admin::repository::Repository;
use sign_admin::resources::{LEARNING, PRACTICE};
use sign_admin::{AdminError, Result};

/// Directory buckets whose removals always fail
struct StuckObjects(DirectoryBuckets);

#[async_trait]
impl ObjectStore for StuckObjects {
    async fn upload(&self, bucket: &str, path: &str, data: Bytes, content_type: &str) -> Result<()> {
        self.0.upload(bucket, path, data, content_type).await
    }

    fn public_url(&self, bucket: &str, path: &str) -> Result<String> {
        self.0.public_url(bucket, path)
    }

    async fn remove(&self, _bucket: &str, _paths: &[String]) -> Result<()> {
        Err(AdminError::Write("permission denied".to_string()))
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        self.0.list(bucket, prefix).await
    }
}

async fn local_backend(stuck: bool) -> (Backend, TempDir, TempDir) {
    let (pool, db_dir) = create_test_database().await.unwrap();
    let storage = tempfile::tempdir().unwrap();
    let buckets = DirectoryBuckets::new(storage.path(), "http://localhost:3000/media").unwrap();
    let objects: Arc<dyn ObjectStore> = if stuck {
        Arc::new(StuckObjects(buckets))
    } else {
        Arc::new(buckets)
    };
    let backend = Backend {
        tables: Arc::new(SqliteTables::new(pool)),
        objects,
        auth: Arc::new(CredentialsAuthenticator::new(Credentials::default())),
        buckets: Buckets::default(),
        media_dir: Some(storage.path().to_path_buf()),
    };
    (backend, db_dir, storage)
}

async fn create_practice(backend: &Backend, with_images: bool) -> serde_json::Map<String, serde_json::Value> {
    let repo = Repository::new(backend.tables.clone(), &PRACTICE);
    let mut editor = RecordEditor::new(&PRACTICE);
    editor.open_new().unwrap();
    editor.set_text("question", "Which one is red?").unwrap();
    editor.set_text("option1", "apple").unwrap();
    editor.set_text("option2", "sky").unwrap();
    editor.set_integer("correct_answer_option", 1).unwrap();
    if with_images {
        editor
            .set_file("question_video_url", LocalFile::new("red.mp4", "video/mp4", Bytes::from_static(b"v")))
            .unwrap();
        editor
            .set_file("option1_image", LocalFile::new("apple.png", "image/png", Bytes::from_static(b"a")))
            .unwrap();
    }
    match editor
        .submit(&repo, backend.objects.as_ref(), &backend.buckets)
        .await
        .unwrap()
    {
        SubmitOutcome::Created(row) => row,
        other => panic!("unexpected outcome {:?}", other),
    }
}

async fn put_object(backend: &Backend, bucket: &str, name: &str) {
    backend
        .objects
        .upload(bucket, &format!("public/{}", name), Bytes::from_static(b"x"), "application/octet-stream")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delete_with_media_removes_referenced_objects() {
    let (backend, _db, _storage) = local_backend(false).await;
    let row = create_practice(&backend, true).await;
    assert_eq!(backend.objects.list("sign_videos", "public").await.unwrap().len(), 1);
    assert_eq!(backend.objects.list("sign_images", "public").await.unwrap().len(), 1);

    let repo = Repository::new(backend.tables.clone(), &PRACTICE);
    let removed = delete_with_media(&repo, backend.objects.as_ref(), &backend.buckets, row["id"].as_i64().unwrap())
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert!(backend.objects.list("sign_videos", "public").await.unwrap().is_empty());
    assert!(backend.objects.list("sign_images", "public").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_media_failure_does_not_block_row_delete() {
    let (backend, _db, _storage) = local_backend(true).await;
    let row = create_practice(&backend, true).await;
    let id = row["id"].as_i64().unwrap();

    let repo = Repository::new(backend.tables.clone(), &PRACTICE);
    let removed = delete_with_media(&repo, backend.objects.as_ref(), &backend.buckets, id)
        .await
        .unwrap();
    assert_eq!(removed, 0);
    assert!(matches!(repo.get(id).await, Err(AdminError::NotFound { .. })));
    assert_eq!(backend.objects.list("sign_images", "public").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_delete_with_media_of_missing_row() {
    let (backend, _db, _storage) = local_backend(false).await;
    let repo = Repository::new(backend.tables.clone(), &PRACTICE);
    let err = delete_with_media(&repo, backend.objects.as_ref(), &backend.buckets, 7)
        .await
        .unwrap_err();
    assert!(matches!(err, AdminError::NotFound { .. }));
}

#[tokio::test]
async fn test_sweep_removes_only_unreferenced_old_objects() {
    let (backend, _db, _storage) = local_backend(false).await;

    // learning delete leaves its media behind
    let learning = Repository::new(backend.tables.clone(), &LEARNING);
    let mut editor = RecordEditor::new(&LEARNING);
    editor.open_new().unwrap();
    editor
        .set_file("video_url", LocalFile::new("bye.mp4", "video/mp4", Bytes::from_static(b"bye")))
        .unwrap();
    editor.set_text("label", "bye").unwrap();
    editor.set_text("category", "greetings").unwrap();
    let deleted = match editor
        .submit(&learning, backend.objects.as_ref(), &backend.buckets)
        .await
        .unwrap()
    {
        SubmitOutcome::Created(row) => row,
        other => panic!("unexpected outcome {:?}", other),
    };
    learning.delete(deleted["id"].as_i64().unwrap()).await.unwrap();

    let kept = create_practice(&backend, true).await;

    put_object(&backend, "sign_images", "old_1000_abcd1234.png").await;
    put_object(&backend, "sign_images", "legacy.png").await;
    let now = chrono::Utc::now().timestamp_millis();
    put_object(&backend, "sign_videos", &format!("inflight_{}_zzzz9999.mp4", now)).await;

    let report = sweep_media(&backend, true).await.unwrap();
    assert!(report.dry_run);
    assert_eq!(report.scanned, 6);
    assert_eq!(report.referenced, 2);
    // the deleted learning video was uploaded just now, so it is still in its grace period
    assert_eq!(report.skipped_recent, 2);
    assert_eq!(
        report.unreferenced,
        vec![
            "sign_images/public/legacy.png".to_string(),
            "sign_images/public/old_1000_abcd1234.png".to_string(),
        ]
    );
    assert_eq!(report.removed, 0);
    assert_eq!(backend.objects.list("sign_images", "public").await.unwrap().len(), 3);

    let report = sweep_media(&backend, false).await.unwrap();
    assert_eq!(report.removed, 2);
    let images = backend.objects.list("sign_images", "public").await.unwrap();
    assert_eq!(images.len(), 1);
    assert!(kept["option1_image"]
        .as_str()
        .unwrap()
        .ends_with(images[0].trim_start_matches("public/")));
    assert_eq!(backend.objects.list("sign_videos", "public").await.unwrap().len(), 3);
}

fn json_row(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_sweep_keeps_objects_with_percent_encoded_urls() {
    let (backend, _db, _storage) = local_backend(false).await;
    put_object(&backend, "sign_videos", "my sign_1000.mp4").await;
    let url = backend.objects.public_url("sign_videos", "public/my sign_1000.mp4").unwrap();
    assert!(url.ends_with("/public/my%20sign_1000.mp4"), "{}", url);

    let learning = Repository::new(backend.tables.clone(), &LEARNING);
    learning
        .insert(json_row(serde_json::json!({
            "label": "MY SIGN",
            "category": "greetings",
            "video_url": url,
        })))
        .await
        .unwrap();

    let report = sweep_media(&backend, false).await.unwrap();
    assert_eq!(report.referenced, 1);
    assert!(report.unreferenced.is_empty(), "{:?}", report.unreferenced);
    assert_eq!(report.removed, 0);
    assert_eq!(
        backend.objects.list("sign_videos", "public").await.unwrap(),
        vec!["public/my sign_1000.mp4".to_string()]
    );
}

#[tokio::test]
async fn test_practice_delete_removes_objects_with_encoded_names() {
    let (backend, _db, _storage) = local_backend(false).await;
    put_object(&backend, "sign_images", "été 1.png").await;
    let url = backend.objects.public_url("sign_images", "public/été 1.png").unwrap();

    let repo = Repository::new(backend.tables.clone(), &PRACTICE);
    let row = repo
        .insert(json_row(serde_json::json!({
            "question": "Which season?",
            "option1": "summer",
            "option1_image": url,
            "option2": "winter",
            "correct_answer_option": 1,
            "created_at": "2024-01-01T00:00:00Z",
        })))
        .await
        .unwrap();

    let removed = delete_with_media(&repo, backend.objects.as_ref(), &backend.buckets, row["id"].as_i64().unwrap())
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert!(backend.objects.list("sign_images", "public").await.unwrap().is_empty());
}
