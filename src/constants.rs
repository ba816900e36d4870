use rand::Rng;

/// Expected database schema version
/// Local databases must use this version for compatibility
pub const EXPECTED_DB_VERSION: &str = "1";

/// Rows per page on every admin screen
pub const DEFAULT_PAGE_SIZE: u32 = 5;

/// Minutes a signed-in admin session stays valid
pub const DEFAULT_SESSION_TTL_MINUTES: u64 = 12 * 60;

/// Path prefix shared by every uploaded object in both buckets
pub const PUBLIC_PREFIX: &str = "public";

pub const DEFAULT_VIDEO_BUCKET: &str = "sign_videos";
pub const DEFAULT_IMAGE_BUCKET: &str = "sign_images";

/// Length of the random token appended to uploaded file names
pub const UPLOAD_TOKEN_LEN: usize = 8;

/// Generate a random alphanumeric token for upload names
pub fn generate_upload_token() -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(UPLOAD_TOKEN_LEN)
        .map(char::from)
        .collect::<String>()
}
