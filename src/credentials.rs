use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Credentials file structure
///
/// Format:
/// ```toml
/// [hosted.profile_name]
/// api_key = "your_service_api_key_here"
///
/// [admins."admin@example.com"]
/// password = "admin_password_for_local_backend"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Credentials {
    #[serde(default)]
    pub hosted: HashMap<String, ApiKeyProfile>,
    #[serde(default)]
    pub admins: HashMap<String, PasswordProfile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyProfile {
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordProfile {
    pub password: String,
}

/// Environment variable overriding the credentials file location
pub const CREDENTIALS_PATH_ENV: &str = "SIGN_ADMIN_CREDENTIALS";

/// Get the credentials file path: $SIGN_ADMIN_CREDENTIALS or ~/.config/sign_admin/credentials.toml
pub fn get_credentials_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CREDENTIALS_PATH_ENV) {
        return Some(PathBuf::from(path));
    }
    let home = std::env::var("HOME").ok()?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("sign_admin")
            .join("credentials.toml"),
    )
}

/// Load credentials from the default location
/// Returns None if the file doesn't exist
pub fn load_credentials() -> Result<Option<Credentials>, Box<dyn std::error::Error + Send + Sync>> {
    let creds_path = match get_credentials_path() {
        Some(path) => path,
        None => return Ok(None),
    };

    if !creds_path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(&creds_path)
        .map_err(|e| format!("Failed to read '{}': {}", creds_path.display(), e))?;
    let credentials: Credentials = toml::from_str(&content)
        .map_err(|e| format!("Failed to parse '{}': {}", creds_path.display(), e))?;

    Ok(Some(credentials))
}

fn missing_file_message() -> String {
    match get_credentials_path() {
        Some(path) => format!("Credentials file not found. Expected at: {}", path.display()),
        None => "Credentials file not found and HOME is not set".to_string(),
    }
}

/// Get the API key for a hosted backend profile
pub fn get_api_key(credentials: &Option<Credentials>, profile: &str) -> Result<String, String> {
    match credentials {
        Some(creds) => creds
            .hosted
            .get(profile)
            .map(|p| p.api_key.clone())
            .ok_or_else(|| {
                format!(
                    "Credential profile '[hosted.{}]' not found in credentials file",
                    profile
                )
            }),
        None => Err(missing_file_message()),
    }
}

impl Credentials {
    /// Check an admin email/password pair for the local backend
    pub fn verify_admin(&self, email: &str, password: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.admins
            .iter()
            .any(|(known, profile)| known.to_lowercase() == email && profile.password == password)
    }
}
