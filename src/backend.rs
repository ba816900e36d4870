//! Seams between the admin workflow and the backing store.
//!
//! A backend provides three collaborators: row storage for the resource tables,
//! object storage for the media buckets, and password sign-in. The hosted and
//! local backends both implement all three.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;

use crate::auth::{Authenticator, Session};
use crate::config::{AdminConfig, BackendConfig, Buckets};
use crate::credentials::Credentials;
use crate::error::{AdminError, Result};
use crate::repository::PageRequest;
use crate::resources::ResourceSpec;

/// One row as a JSON object keyed by column name
pub type Row = serde_json::Map<String, serde_json::Value>;

#[async_trait]
pub trait TableStore: Send + Sync {
    /// Rows in the requested range plus the size of the whole filtered set
    async fn select_page(&self, resource: &ResourceSpec, request: &PageRequest)
        -> Result<(Vec<Row>, u64)>;

    async fn select_one(&self, resource: &ResourceSpec, id: i64) -> Result<Option<Row>>;

    /// Insert one row and return it as stored
    async fn insert(&self, resource: &ResourceSpec, row: Row) -> Result<Row>;

    /// Overwrite the given columns of one row; NotFound if no row matched
    async fn update(&self, resource: &ResourceSpec, id: i64, patch: Row) -> Result<()>;

    /// Delete one row; NotFound if no row matched
    async fn delete(&self, resource: &ResourceSpec, id: i64) -> Result<()>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store bytes at `path` inside `bucket`; never overwrites an existing object
    async fn upload(&self, bucket: &str, path: &str, data: Bytes, content_type: &str)
        -> Result<()>;

    /// Public URL of an object
    fn public_url(&self, bucket: &str, path: &str) -> Result<String>;

    /// Remove objects; paths that do not exist are ignored
    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<()>;

    /// Full paths of every object directly under `prefix`
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;
}

/// A connected backing store
#[derive(Clone)]
pub struct Backend {
    pub tables: Arc<dyn TableStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub auth: Arc<dyn Authenticator>,
    pub buckets: Buckets,
    /// Directory to serve bucket objects from, for backends without their own CDN
    pub media_dir: Option<PathBuf>,
}

impl Backend {
    /// Connect to the backend described by the config
    pub async fn connect(config: &AdminConfig, credentials: &Option<Credentials>) -> Result<Self> {
        match &config.backend {
            BackendConfig::Hosted(hosted) => {
                let api_key = crate::credentials::get_api_key(credentials, &hosted.credential_profile)
                    .map_err(AdminError::Config)?;
                let client = Arc::new(crate::hosted::HostedClient::new(&hosted.url, &api_key)?);
                Ok(Self {
                    tables: client.clone(),
                    objects: client.clone(),
                    auth: client,
                    buckets: config.buckets.clone(),
                    media_dir: None,
                })
            }
            BackendConfig::Local(local) => {
                let pool = crate::db::open_database(&local.database_path)
                    .await
                    .map_err(|e| AdminError::Config(format!("Failed to open database: {}", e)))?;
                crate::db::check_database_version(&pool)
                    .await
                    .map_err(|e| AdminError::Config(e.to_string()))?;
                let base_url = config.local_public_base_url(local);
                let tables = Arc::new(crate::local::SqliteTables::new(pool));
                let objects = Arc::new(crate::local::DirectoryBuckets::new(
                    &local.storage_dir,
                    &base_url,
                )?);
                let auth = Arc::new(crate::local::CredentialsAuthenticator::new(
                    credentials.clone().unwrap_or_default(),
                ));
                Ok(Self {
                    tables,
                    objects,
                    auth,
                    buckets: config.buckets.clone(),
                    media_dir: Some(local.storage_dir.clone()),
                })
            }
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        self.auth.sign_in(email, password).await
    }
}
