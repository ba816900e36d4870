use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use sign_admin::backend::Backend;
use sign_admin::config::{AdminConfig, BackendConfig};
use sign_admin::credentials::{load_credentials, Credentials};
use sign_admin::media::{delete_with_media, sweep_media};
use sign_admin::repository::{PageRequest, Repository};
use sign_admin::resources::Resource;

/// Environment variable holding the password for `login`
const PASSWORD_ENV: &str = "SIGN_ADMIN_PASSWORD";

#[derive(Parser, Debug)]
#[command(author, version, about = "Admin panel backend for the sign language learning app")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the admin JSON API
    Serve {
        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Create the schema of a local backend database
    InitDb {
        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Check an admin email/password (password is read from SIGN_ADMIN_PASSWORD)
    Login {
        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: PathBuf,

        #[arg(long)]
        email: String,
    },
    /// Print one page of a resource
    List {
        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: PathBuf,

        resource: Resource,

        #[arg(long, default_value = "1")]
        page: u32,

        /// Page size (overrides config file)
        #[arg(long)]
        page_size: Option<u32>,

        /// Value for the resource's filter column
        #[arg(long)]
        filter: Option<String>,

        /// Column to sort by
        #[arg(long)]
        sort: Option<String>,

        #[arg(long)]
        descending: bool,
    },
    /// Delete one row by id
    Delete {
        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: PathBuf,

        resource: Resource,

        id: i64,
    },
    /// Remove bucket objects that no row references
    SweepMedia {
        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: PathBuf,

        /// Only report what would be removed
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let rt = tokio::runtime::Runtime::new()?;
    match args.command {
        Command::Serve { config } => {
            let (config, credentials) = load(&config)?;
            rt.block_on(sign_admin::serve::serve(config, credentials))
        }
        Command::InitDb { config } => rt.block_on(init_db(config)),
        Command::Login { config, email } => rt.block_on(login(config, email)),
        Command::List {
            config,
            resource,
            page,
            page_size,
            filter,
            sort,
            descending,
        } => rt.block_on(list(config, resource, page, page_size, filter, sort, descending)),
        Command::Delete {
            config,
            resource,
            id,
        } => rt.block_on(delete(config, resource, id)),
        Command::SweepMedia { config, dry_run } => rt.block_on(sweep(config, dry_run)),
    }
}

fn load(config_path: &Path) -> Result<(AdminConfig, Option<Credentials>), Box<dyn std::error::Error>> {
    let config = AdminConfig::load(config_path)?;
    let credentials = load_credentials().map_err(|e| format!("Failed to load credentials: {}", e))?;
    Ok((config, credentials))
}

async fn connect(config_path: &Path) -> Result<(AdminConfig, Backend), Box<dyn std::error::Error>> {
    let (config, credentials) = load(config_path)?;
    let backend = Backend::connect(&config, &credentials)
        .await
        .map_err(|e| format!("Failed to connect backend: {}", e))?;
    Ok((config, backend))
}

async fn init_db(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = AdminConfig::load(&config_path)?;
    let local = match &config.backend {
        BackendConfig::Local(local) => local,
        BackendConfig::Hosted(_) => {
            return Err("init-db only applies to the local backend; hosted schemas are managed by the host".into())
        }
    };

    let pool = sign_admin::db::open_database(&local.database_path)
        .await
        .map_err(|e| format!("Failed to open '{}': {}", local.database_path.display(), e))?;
    sign_admin::db::init_database_schema(&pool)
        .await
        .map_err(|e| format!("Failed to initialize schema: {}", e))?;
    std::fs::create_dir_all(&local.storage_dir)
        .map_err(|e| format!("Failed to create '{}': {}", local.storage_dir.display(), e))?;

    println!("SQLite database: {}", local.database_path.display());
    println!("Storage directory: {}", local.storage_dir.display());
    Ok(())
}

async fn login(config_path: PathBuf, email: String) -> Result<(), Box<dyn std::error::Error>> {
    let password = std::env::var(PASSWORD_ENV)
        .map_err(|_| format!("Set {} to the admin password", PASSWORD_ENV))?;
    let (_, backend) = connect(&config_path).await?;
    let session = backend.sign_in(&email, &password).await?;
    println!("Signed in as {} (user id {})", session.email, session.user_id);
    Ok(())
}

async fn list(
    config_path: PathBuf,
    resource: Resource,
    page: u32,
    page_size: Option<u32>,
    filter: Option<String>,
    sort: Option<String>,
    descending: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let (config, backend) = connect(&config_path).await?;
    let spec = resource.spec();
    let repo = Repository::new(backend.tables.clone(), spec);

    let mut request = PageRequest::new(page, page_size.unwrap_or(config.page_size));
    if let Some(value) = filter.as_deref() {
        let (column, mode) = spec
            .filter
            .ok_or_else(|| format!("{} cannot be filtered", spec.name))?;
        request = request.with_filter(column, value, mode);
    }
    if let Some(column) = sort.as_deref() {
        request = request.with_sort(column, !descending);
    }

    let page = repo.list(&request).await?;
    for row in &page.items {
        println!("{}", serde_json::to_string(row)?);
    }
    println!(
        "Page {} of {} ({} {} total)",
        page.page,
        page.total_pages.max(1),
        page.total_count,
        spec.name
    );
    Ok(())
}

async fn delete(config_path: PathBuf, resource: Resource, id: i64) -> Result<(), Box<dyn std::error::Error>> {
    let (_, backend) = connect(&config_path).await?;
    let spec = resource.spec();
    let repo = Repository::new(backend.tables.clone(), spec);
    if spec.delete_media {
        let removed = delete_with_media(&repo, backend.objects.as_ref(), &backend.buckets, id).await?;
        println!("Deleted {} {} ({} media object(s) removed)", spec.noun, id, removed);
    } else {
        repo.delete(id).await?;
        println!("Deleted {} {}", spec.noun, id);
    }
    Ok(())
}

async fn sweep(config_path: PathBuf, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    let (_, backend) = connect(&config_path).await?;
    let report = sweep_media(&backend, dry_run).await?;
    for path in &report.unreferenced {
        println!("{} {}", if dry_run { "would remove" } else { "removed" }, path);
    }
    println!(
        "Scanned {} object(s): {} referenced, {} unreferenced, {} recent skipped, {} removed",
        report.scanned,
        report.referenced,
        report.unreferenced.len(),
        report.skipped_recent,
        report.removed
    );
    Ok(())
}
