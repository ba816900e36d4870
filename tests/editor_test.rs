//! Record editor submissions against a temporary SQLite database and a
//! directory-backed bucket store.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use sign_admin::backend::{ObjectStore, Row, TableStore};
use sign_admin::config::Buckets;
use sign_admin::db::create_test_database;
use sign_admin::editor::{EditorMode, EditorState, FieldValue, RecordEditor, SubmitOutcome};
use sign_admin::local::{DirectoryBuckets, SqliteTables};
use sign_admin::model::{CorrectOption, PracticeQuestion};
use sign_admin::relocate::LocalFile;
use sign_admin::repository::{PageRequest, Repository};
use sign_admin::resources::{ResourceSpec, LEARNING, PRACTICE};
use sign_admin::{AdminError, Result};

/// Table store that counts writes before delegating to SQLite
struct CountingTables {
    inner: SqliteTables,
    writes: AtomicUsize,
}

#[async_trait]
impl TableStore for CountingTables {
    async fn select_page(&self, resource: &ResourceSpec, request: &PageRequest) -> Result<(Vec<Row>, u64)> {
        self.inner.select_page(resource, request).await
    }

    async fn select_one(&self, resource: &ResourceSpec, id: i64) -> Result<Option<Row>> {
        self.inner.select_one(resource, id).await
    }

    async fn insert(&self, resource: &ResourceSpec, row: Row) -> Result<Row> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(resource, row).await
    }

    async fn update(&self, resource: &ResourceSpec, id: i64, patch: Row) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.update(resource, id, patch).await
    }

    async fn delete(&self, resource: &ResourceSpec, id: i64) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(resource, id).await
    }
}

/// Object store that counts uploads and can be told to refuse them
struct TestObjects {
    inner: DirectoryBuckets,
    uploads: AtomicUsize,
    fail_uploads: bool,
}

#[async_trait]
impl ObjectStore for TestObjects {
    async fn upload(&self, bucket: &str, path: &str, data: Bytes, content_type: &str) -> Result<()> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.fail_uploads {
            return Err(AdminError::Upload("bucket unavailable".to_string()));
        }
        self.inner.upload(bucket, path, data, content_type).await
    }

    fn public_url(&self, bucket: &str, path: &str) -> Result<String> {
        self.inner.public_url(bucket, path)
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<()> {
        self.inner.remove(bucket, paths).await
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        self.inner.list(bucket, prefix).await
    }
}

struct Fixture {
    tables: Arc<CountingTables>,
    objects: TestObjects,
    buckets: Buckets,
    storage: TempDir,
    _db_dir: TempDir,
}

impl Fixture {
    async fn new(fail_uploads: bool) -> Self {
        let (pool, db_dir) = create_test_database().await.unwrap();
        let storage = tempfile::tempdir().unwrap();
        let objects = TestObjects {
            inner: DirectoryBuckets::new(storage.path(), "http://localhost:3000/media").unwrap(),
            uploads: AtomicUsize::new(0),
            fail_uploads,
        };
        Self {
            tables: Arc::new(CountingTables {
                inner: SqliteTables::new(pool),
                writes: AtomicUsize::new(0),
            }),
            objects,
            buckets: Buckets::default(),
            storage,
            _db_dir: db_dir,
        }
    }

    fn repo(&self, spec: &'static ResourceSpec) -> Repository {
        Repository::new(self.tables.clone(), spec)
    }

    fn writes(&self) -> usize {
        self.tables.writes.load(Ordering::SeqCst)
    }

    fn uploads(&self) -> usize {
        self.objects.uploads.load(Ordering::SeqCst)
    }

    async fn submit(&self, editor: &mut RecordEditor) -> Result<SubmitOutcome> {
        let repo = self.repo(editor.spec());
        editor.submit(&repo, &self.objects, &self.buckets).await
    }
}

fn video(name: &str) -> LocalFile {
    LocalFile::new(name, "video/mp4", Bytes::from_static(b"\x00\x00\x00\x18ftypmp42"))
}

fn image(name: &str) -> LocalFile {
    LocalFile::new(name, "image/png", Bytes::from_static(b"\x89PNG\r\n\x1a\n"))
}

fn created(outcome: SubmitOutcome) -> Row {
    match outcome {
        SubmitOutcome::Created(row) => row,
        other => panic!("expected a created row, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_required_field_makes_no_network_call() {
    let fixture = Fixture::new(false).await;
    let mut editor = RecordEditor::new(&LEARNING);
    editor.open_new().unwrap();
    editor.set_file("video_url", video("hello.mp4")).unwrap();
    editor.set_text("category", "greetings").unwrap();

    let err = fixture.submit(&mut editor).await.unwrap_err();
    assert!(matches!(err, AdminError::Validation(_)), "{:?}", err);
    assert_eq!(fixture.uploads(), 0);
    assert_eq!(fixture.writes(), 0);

    // the draft survives and the error is shown
    match editor.state() {
        EditorState::Open { mode, error } => {
            assert_eq!(*mode, EditorMode::New);
            assert_eq!(error.as_deref(), Some("Label is required"));
        }
        other => panic!("unexpected state {:?}", other),
    }
    assert!(matches!(editor.value("video_url"), Some(FieldValue::File(_))));
}

#[tokio::test]
async fn test_create_uploads_and_uppercases_label() {
    let fixture = Fixture::new(false).await;
    let mut editor = RecordEditor::new(&LEARNING);
    editor.open_new().unwrap();
    editor.set_file("video_url", video("hello.mp4")).unwrap();
    editor.set_file("label_image", image("hello.png")).unwrap();
    editor.set_text("label", "hello").unwrap();
    editor.set_text("category", "greetings").unwrap();

    let row = created(fixture.submit(&mut editor).await.unwrap());
    assert_eq!(editor.state(), &EditorState::Closed);
    assert!(editor.draft().is_empty());
    assert_eq!(row["label"], "HELLO");
    assert_eq!(fixture.uploads(), 2);
    assert_eq!(fixture.writes(), 1);

    let video_url = row["video_url"].as_str().unwrap();
    assert!(
        video_url.starts_with("http://localhost:3000/media/sign_videos/public/hello_"),
        "{}",
        video_url
    );
    let image_url = row["label_image"].as_str().unwrap();
    assert!(image_url.starts_with("http://localhost:3000/media/sign_images/public/hello_"));

    let stored_name = video_url.rsplit('/').next().unwrap();
    let on_disk = fixture
        .storage
        .path()
        .join("sign_videos")
        .join("public")
        .join(stored_name);
    assert!(on_disk.exists(), "{} missing", on_disk.display());
}

#[tokio::test]
async fn test_text_only_update_preserves_media() {
    let fixture = Fixture::new(false).await;
    let mut editor = RecordEditor::new(&LEARNING);
    editor.open_new().unwrap();
    editor.set_file("video_url", video("wave.mp4")).unwrap();
    editor.set_file("label_image", image("wave.png")).unwrap();
    editor.set_text("label", "wave").unwrap();
    editor.set_text("category", "greetings").unwrap();
    let original = created(fixture.submit(&mut editor).await.unwrap());
    let id = original["id"].as_i64().unwrap();
    let uploads_before = fixture.uploads();

    let mut editor = RecordEditor::new(&LEARNING);
    editor.open_existing(&original).unwrap();
    editor.set_text("label", "goodbye").unwrap();
    let outcome = fixture.submit(&mut editor).await.unwrap();
    assert_eq!(outcome, SubmitOutcome::Updated(id));
    assert_eq!(fixture.uploads(), uploads_before);

    let stored = fixture.repo(&LEARNING).get(id).await.unwrap();
    assert_eq!(stored["label"], "GOODBYE");
    assert_eq!(stored["video_url"], original["video_url"]);
    assert_eq!(stored["label_image"], original["label_image"]);
}

#[tokio::test]
async fn test_update_replaces_only_the_new_file() {
    let fixture = Fixture::new(false).await;
    let mut editor = RecordEditor::new(&LEARNING);
    editor.open_new().unwrap();
    editor.set_file("video_url", video("cat.mp4")).unwrap();
    editor.set_text("label", "cat").unwrap();
    editor.set_text("category", "animals").unwrap();
    let original = created(fixture.submit(&mut editor).await.unwrap());
    assert_eq!(original["label_image"], Value::Null);

    let mut editor = RecordEditor::new(&LEARNING);
    editor.open_existing(&original).unwrap();
    editor.set_file("label_image", image("cat.png")).unwrap();
    fixture.submit(&mut editor).await.unwrap();

    let stored = fixture
        .repo(&LEARNING)
        .get(original["id"].as_i64().unwrap())
        .await
        .unwrap();
    assert_eq!(stored["video_url"], original["video_url"]);
    assert!(stored["label_image"].as_str().unwrap().contains("/sign_images/public/cat_"));
}

#[tokio::test]
async fn test_practice_option_two_without_images() {
    let fixture = Fixture::new(false).await;
    let mut editor = RecordEditor::new(&PRACTICE);
    editor.open_new().unwrap();
    editor.set_text("question", "Which sign means thank you?").unwrap();
    editor.set_text("option1", "Wave").unwrap();
    editor.set_text("option2", "Chin tap").unwrap();
    editor.set_text("correct_answer_option", "2").unwrap();

    let row = created(fixture.submit(&mut editor).await.unwrap());
    assert_eq!(fixture.uploads(), 0);

    let question: PracticeQuestion = serde_json::from_value(Value::Object(row.clone())).unwrap();
    assert_eq!(question.correct_answer_option, CorrectOption::Second);
    assert_eq!(row["correct_answer_option"], Value::from(2));
    assert!(question.option1_image.is_none());
    assert!(question.option2_image.is_none());
    assert!(question.question_video_url.is_none());
    assert!(chrono::DateTime::parse_from_rfc3339(&question.created_at).is_ok());
}

#[tokio::test]
async fn test_practice_rejects_third_option() {
    let fixture = Fixture::new(false).await;
    let mut editor = RecordEditor::new(&PRACTICE);
    editor.open_new().unwrap();
    editor.set_text("question", "q").unwrap();
    editor.set_text("option1", "a").unwrap();
    editor.set_text("option2", "b").unwrap();
    editor.set_integer("correct_answer_option", 3).unwrap();
    let err = fixture.submit(&mut editor).await.unwrap_err();
    assert!(matches!(err, AdminError::Validation(_)));
    assert_eq!(fixture.writes(), 0);
}

#[tokio::test]
async fn test_same_file_name_gets_distinct_urls() {
    let fixture = Fixture::new(false).await;
    let mut urls = Vec::new();
    for _ in 0..2 {
        let mut editor = RecordEditor::new(&LEARNING);
        editor.open_new().unwrap();
        editor.set_file("video_url", video("same.mp4")).unwrap();
        editor.set_text("label", "same").unwrap();
        editor.set_text("category", "numbers").unwrap();
        let row = created(fixture.submit(&mut editor).await.unwrap());
        urls.push(row["video_url"].as_str().unwrap().to_string());
    }
    assert_ne!(urls[0], urls[1]);
}

#[tokio::test]
async fn test_upload_failure_aborts_and_keeps_draft() {
    let fixture = Fixture::new(true).await;
    let mut editor = RecordEditor::new(&LEARNING);
    editor.open_new().unwrap();
    editor.set_file("video_url", video("hello.mp4")).unwrap();
    editor.set_text("label", "hello").unwrap();
    editor.set_text("category", "greetings").unwrap();

    let err = fixture.submit(&mut editor).await.unwrap_err();
    assert!(matches!(err, AdminError::Upload(_)), "{:?}", err);
    assert_eq!(fixture.writes(), 0);
    match editor.state() {
        EditorState::Open { error, .. } => {
            assert_eq!(error.as_deref(), Some("Failed to add video: file upload failed."))
        }
        other => panic!("unexpected state {:?}", other),
    }
    assert_eq!(editor.value("label"), Some(&FieldValue::Text("hello".to_string())));
}

#[tokio::test]
async fn test_update_of_deleted_row_reports_not_found() {
    let fixture = Fixture::new(false).await;
    let mut editor = RecordEditor::new(&LEARNING);
    editor.open_new().unwrap();
    editor.set_file("video_url", video("gone.mp4")).unwrap();
    editor.set_text("label", "gone").unwrap();
    editor.set_text("category", "food").unwrap();
    let row = created(fixture.submit(&mut editor).await.unwrap());
    let id = row["id"].as_i64().unwrap();

    let mut editor = RecordEditor::new(&LEARNING);
    editor.open_existing(&row).unwrap();
    fixture.repo(&LEARNING).delete(id).await.unwrap();
    editor.set_text("label", "still here?").unwrap();

    let err = fixture.submit(&mut editor).await.unwrap_err();
    assert!(matches!(err, AdminError::NotFound { .. }), "{:?}", err);
    assert!(matches!(editor.state(), EditorState::Open { mode: EditorMode::Editing(_), .. }));
}

#[tokio::test]
async fn test_closed_editor_cannot_submit() {
    let fixture = Fixture::new(false).await;
    let mut editor = RecordEditor::new(&LEARNING);
    let err = fixture.submit(&mut editor).await.unwrap_err();
    assert!(matches!(err, AdminError::Validation(_)));
}
