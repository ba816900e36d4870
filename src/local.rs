//! Self-hosted backend: SQLite tables, directory buckets and admin passwords
//! from the credentials file.

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info};
use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row as _;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use crate::auth::{Authenticator, Session};
use crate::backend::{ObjectStore, Row, TableStore};
use crate::credentials::Credentials;
use crate::error::{AdminError, Result};
use crate::queries::records;
use crate::repository::PageRequest;
use crate::resources::{ColumnKind, ResourceSpec};

/// Resource tables stored in SQLite
pub struct SqliteTables {
    pool: SqlitePool,
}

impl SqliteTables {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn decode_row(resource: &ResourceSpec, row: &SqliteRow) -> Result<Row> {
    let mut out = Row::new();
    for column in resource.columns {
        let value = match column.kind {
            ColumnKind::Integer => row
                .try_get::<Option<i64>, _>(column.name)
                .map(|v| v.map(Value::from)),
            ColumnKind::Text => row
                .try_get::<Option<String>, _>(column.name)
                .map(|v| v.map(Value::from)),
        }
        .map_err(|e| {
            AdminError::Fetch(format!("{}.{}: {}", resource.table, column.name, e))
        })?;
        out.insert(column.name.to_string(), value.unwrap_or(Value::Null));
    }
    Ok(out)
}

/// Keep only known columns, never the primary key
fn writable_values(resource: &ResourceSpec, row: Row) -> Result<Vec<(String, Value)>> {
    row.into_iter()
        .map(|(key, value)| {
            if key == "id" || resource.column(&key).is_none() {
                return Err(AdminError::Validation(format!(
                    "{} has no writable column '{}'",
                    resource.name, key
                )));
            }
            Ok((key, value))
        })
        .collect()
}

#[async_trait]
impl TableStore for SqliteTables {
    async fn select_page(
        &self,
        resource: &ResourceSpec,
        request: &PageRequest,
    ) -> Result<(Vec<Row>, u64)> {
        let count_sql = records::count(resource.table, request.filter.as_ref(), request.after_id);
        let total: i64 = sqlx::query_scalar(&count_sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AdminError::Fetch(format!("count {}: {}", resource.table, e)))?;

        let sql = records::select_page(
            resource.table,
            &resource.column_names(),
            request.filter.as_ref(),
            request.sort.as_ref(),
            request.after_id,
            request.offset(),
            request.page_size as u64,
        );
        debug!("{}", sql);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AdminError::Fetch(format!("select {}: {}", resource.table, e)))?;

        let items = rows
            .iter()
            .map(|row| decode_row(resource, row))
            .collect::<Result<Vec<_>>>()?;
        Ok((items, total.max(0) as u64))
    }

    async fn select_one(&self, resource: &ResourceSpec, id: i64) -> Result<Option<Row>> {
        let sql = records::select_by_id(resource.table, &resource.column_names(), id);
        let row = sqlx::query(&sql)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AdminError::Fetch(format!("select {} {}: {}", resource.table, id, e)))?;
        row.map(|r| decode_row(resource, &r)).transpose()
    }

    async fn insert(&self, resource: &ResourceSpec, row: Row) -> Result<Row> {
        let values = writable_values(resource, row)?;
        if values.is_empty() {
            return Err(AdminError::Validation(format!(
                "Nothing to insert into {}",
                resource.name
            )));
        }
        let sql = records::insert(resource.table, &values);
        let stored = sqlx::query(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AdminError::Write(format!("insert {}: {}", resource.table, e)))?;
        decode_row(resource, &stored)
    }

    async fn update(&self, resource: &ResourceSpec, id: i64, patch: Row) -> Result<()> {
        let values = writable_values(resource, patch)?;
        let not_found = || AdminError::NotFound {
            table: resource.table.to_string(),
            id,
        };

        if values.is_empty() {
            return match self.select_one(resource, id).await? {
                Some(_) => Ok(()),
                None => Err(not_found()),
            };
        }

        let sql = records::update(resource.table, id, &values);
        let result = sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| AdminError::Write(format!("update {} {}: {}", resource.table, id, e)))?;
        if result.rows_affected() == 0 {
            return Err(not_found());
        }
        Ok(())
    }

    async fn delete(&self, resource: &ResourceSpec, id: i64) -> Result<()> {
        let sql = records::delete(resource.table, id);
        let result = sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| AdminError::Write(format!("delete {} {}: {}", resource.table, id, e)))?;
        if result.rows_affected() == 0 {
            return Err(AdminError::NotFound {
                table: resource.table.to_string(),
                id,
            });
        }
        Ok(())
    }
}

/// Buckets as sub-directories of one storage directory
pub struct DirectoryBuckets {
    root: PathBuf,
    base_url: String,
}

impl DirectoryBuckets {
    /// Create the storage directory if missing. `base_url` is where the
    /// directory is served from.
    pub fn new(root: &Path, base_url: &str) -> Result<Self> {
        url::Url::parse(base_url).map_err(|e| {
            AdminError::Config(format!("invalid public base URL '{}': {}", base_url, e))
        })?;
        std::fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `bucket/path` under the root, rejecting anything that escapes it
    fn resolve(&self, bucket: &str, path: &str) -> Result<PathBuf> {
        let relative = Path::new(bucket).join(path);
        let safe = !bucket.is_empty()
            && !bucket.contains('/')
            && !path.contains('\\')
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(AdminError::Validation(format!(
                "invalid object path '{}/{}'",
                bucket, path
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for DirectoryBuckets {
    async fn upload(&self, bucket: &str, path: &str, data: Bytes, _content_type: &str) -> Result<()> {
        let target = self.resolve(bucket, path)?;
        let display = format!("{}/{}", bucket, path);

        tokio::task::spawn_blocking(move || -> Result<()> {
            let parent = target
                .parent()
                .ok_or_else(|| AdminError::Upload(format!("{}: no parent directory", target.display())))?;
            std::fs::create_dir_all(parent)?;

            // write beside the target, then link it into place without clobbering
            let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
            tmp.write_all(&data)?;
            tmp.as_file().sync_all()?;
            tmp.persist_noclobber(&target).map_err(|e| {
                if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                    AdminError::Upload(format!("{} already exists", target.display()))
                } else {
                    AdminError::Io(e.error)
                }
            })?;
            Ok(())
        })
        .await
        .map_err(|e| AdminError::Upload(format!("upload task failed: {}", e)))?
        .map_err(|e| match e {
            AdminError::Upload(_) => e,
            other => AdminError::Upload(format!("{}: {}", display, other)),
        })?;

        info!("Stored {}", display);
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> Result<String> {
        self.resolve(bucket, path)
            .map_err(|e| AdminError::UrlResolution(e.to_string()))?;
        let encoded: Vec<String> = path
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        Ok(format!(
            "{}/{}/{}",
            self.base_url,
            urlencoding::encode(bucket),
            encoded.join("/")
        ))
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<()> {
        for path in paths {
            let target = self.resolve(bucket, path)?;
            match tokio::fs::remove_file(&target).await {
                Ok(()) => info!("Removed {}/{}", bucket, path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("{}/{} already gone", bucket, path)
                }
                Err(e) => {
                    return Err(AdminError::Write(format!(
                        "remove {}/{}: {}",
                        bucket, path, e
                    )))
                }
            }
        }
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let dir = self.resolve(bucket, prefix)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AdminError::Fetch(format!("list {}/{}: {}", bucket, prefix, e))),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            // skip in-flight temp files
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(".tmp") {
                continue;
            }
            paths.push(format!("{}/{}", prefix.trim_end_matches('/'), name));
        }
        paths.sort();
        Ok(paths)
    }
}

/// Checks passwords against the `[admins]` table of the credentials file
pub struct CredentialsAuthenticator {
    credentials: Credentials,
}

impl CredentialsAuthenticator {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl Authenticator for CredentialsAuthenticator {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        if !self.credentials.verify_admin(email, password) {
            return Err(AdminError::Auth("Invalid login credentials".to_string()));
        }
        let email = email.trim().to_lowercase();
        Ok(Session {
            user_id: email.clone(),
            email,
        })
    }
}
