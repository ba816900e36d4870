use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::constants::{
    DEFAULT_IMAGE_BUCKET, DEFAULT_PAGE_SIZE, DEFAULT_SESSION_TTL_MINUTES, DEFAULT_VIDEO_BUCKET,
};
use crate::resources::BucketKind;

fn default_api_port() -> u16 {
    3000
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_session_ttl_minutes() -> u64 {
    DEFAULT_SESSION_TTL_MINUTES
}

fn default_video_bucket() -> String {
    DEFAULT_VIDEO_BUCKET.to_string()
}

fn default_image_bucket() -> String {
    DEFAULT_IMAGE_BUCKET.to_string()
}

/// Bucket names (maps to [buckets] section in TOML)
#[derive(Debug, Clone, Deserialize)]
pub struct Buckets {
    /// Bucket for sign videos (default: sign_videos)
    #[serde(default = "default_video_bucket")]
    pub videos: String,
    /// Bucket for label and option images (default: sign_images)
    #[serde(default = "default_image_bucket")]
    pub images: String,
}

impl Default for Buckets {
    fn default() -> Self {
        Self {
            videos: default_video_bucket(),
            images: default_image_bucket(),
        }
    }
}

impl Buckets {
    pub fn name(&self, kind: BucketKind) -> &str {
        match kind {
            BucketKind::Videos => &self.videos,
            BucketKind::Images => &self.images,
        }
    }
}

/// Hosted backend configuration (REST tables, object storage, password auth)
#[derive(Debug, Clone, Deserialize)]
pub struct HostedConfig {
    /// Project base URL (e.g., https://xyzcompany.supabase.co)
    pub url: String,
    /// Credential profile name to look up the API key from ~/.config/sign_admin/credentials.toml
    pub credential_profile: String,
}

/// Self-hosted backend configuration (SQLite + directory buckets)
#[derive(Debug, Clone, Deserialize)]
pub struct LocalConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,
    /// Directory holding one sub-directory per bucket
    pub storage_dir: PathBuf,
    /// Base URL the stored objects are served from
    /// (default: http://localhost:<port>/media)
    pub public_base_url: Option<String>,
}

/// Backend selection (maps to [backend] section in TOML)
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    Hosted(HostedConfig),
    Local(LocalConfig),
}

/// Admin panel configuration file structure
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// API server port (default: 3000)
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Rows per page (default: 5)
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Minutes before an API session must sign in again (default: 720)
    #[serde(default = "default_session_ttl_minutes")]
    pub session_ttl_minutes: u64,
    /// Bucket names
    #[serde(default)]
    pub buckets: Buckets,
    /// Backing store
    pub backend: BackendConfig,
}

impl AdminConfig {
    /// Read and validate a TOML config file
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;
        let config = Self::parse(&content)
            .map_err(|e| format!("Invalid config file '{}': {}", path.display(), e))?;
        Ok(config)
    }

    /// Parse and validate config text
    pub fn parse(content: &str) -> Result<Self, String> {
        let config: AdminConfig = toml::from_str(content).map_err(|e| e.to_string())?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field values that serde cannot check
    pub fn validate(&self) -> Result<(), String> {
        if self.page_size == 0 {
            return Err("page_size must be at least 1".to_string());
        }

        if self.session_ttl_minutes == 0 {
            return Err("session_ttl_minutes must be at least 1".to_string());
        }

        if self.buckets.videos.trim().is_empty() || self.buckets.images.trim().is_empty() {
            return Err("bucket names must not be empty".to_string());
        }

        match &self.backend {
            BackendConfig::Hosted(hosted) => {
                url::Url::parse(&hosted.url)
                    .map_err(|e| format!("backend.url '{}' is not a valid URL: {}", hosted.url, e))?;
                if hosted.credential_profile.trim().is_empty() {
                    return Err("backend.credential_profile must not be empty".to_string());
                }
            }
            BackendConfig::Local(local) => {
                if let Some(base) = &local.public_base_url {
                    url::Url::parse(base).map_err(|e| {
                        format!("backend.public_base_url '{}' is not a valid URL: {}", base, e)
                    })?;
                }
            }
        }

        Ok(())
    }

    /// Public base URL for local buckets, defaulting to this server's /media route
    pub fn local_public_base_url(&self, local: &LocalConfig) -> String {
        local
            .public_base_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}/media", self.port))
    }
}
