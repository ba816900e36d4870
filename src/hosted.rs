//! Hosted backend speaking the PostgREST, storage and password-auth HTTP APIs
//! of a Supabase-style project.

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{Authenticator, Session};
use crate::backend::{ObjectStore, Row, TableStore};
use crate::error::{AdminError, Result};
use crate::repository::{FilterMode, PageRequest};
use crate::resources::ResourceSpec;

/// Objects requested per storage list call
const LIST_PAGE_LIMIT: usize = 1000;

pub struct HostedClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HostedClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        url::Url::parse(base_url)
            .map_err(|e| AdminError::Config(format!("invalid backend URL '{}': {}", base_url, e)))?;

        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(api_key)
            .map_err(|_| AdminError::Config("API key contains invalid characters".to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|_| AdminError::Config("API key contains invalid characters".to_string()))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| AdminError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            encode_path(bucket),
            encode_path(path)
        )
    }

    /// Rows of one resource, projected onto its known columns
    async fn rows(resource: &ResourceSpec, response: Response) -> Result<Vec<Row>> {
        let values: Vec<Row> = response
            .json()
            .await
            .map_err(|e| AdminError::Fetch(format!("{}: malformed response: {}", resource.table, e)))?;
        Ok(values.into_iter().map(|row| project(resource, row)).collect())
    }
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn project(resource: &ResourceSpec, mut row: Row) -> Row {
    resource
        .columns
        .iter()
        .map(|c| (c.name.to_string(), row.remove(c.name).unwrap_or(Value::Null)))
        .collect()
}

/// Backslash-escape ILIKE wildcards so the value matches literally
fn escape_ilike(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// PostgREST query string for one page: filter, id cursor and ordering
fn list_query(request: &PageRequest) -> String {
    let mut query = String::from("select=*");
    if let Some(filter) = &request.filter {
        let condition = match filter.mode {
            FilterMode::Contains => format!("ilike.*{}*", escape_ilike(&filter.value)),
            FilterMode::Equals => format!("eq.{}", filter.value),
        };
        query.push_str(&format!("&{}={}", filter.column, urlencoding::encode(&condition)));
    }
    if let Some(id) = request.after_id {
        query.push_str(&format!("&id=gt.{}", id));
    }
    let order = match &request.sort {
        Some(sort) if sort.column != "id" => format!(
            "{}.{},id.asc",
            sort.column,
            if sort.ascending { "asc" } else { "desc" }
        ),
        Some(sort) => format!("id.{}", if sort.ascending { "asc" } else { "desc" }),
        None => "id.asc".to_string(),
    };
    query.push_str(&format!("&order={}", order));
    query
}

/// Total from a `Content-Range` header such as `0-4/12` or `*/12`
fn parse_content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}

/// Best human-readable message from an error body
fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["error_description", "msg", "message", "error"] {
            if let Some(msg) = value.get(key).and_then(Value::as_str) {
                return msg.to_string();
            }
        }
    }
    body.trim().to_string()
}

async fn failure(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    format!("HTTP {}: {}", status, error_message(&body))
}

#[async_trait]
impl TableStore for HostedClient {
    async fn select_page(
        &self,
        resource: &ResourceSpec,
        request: &PageRequest,
    ) -> Result<(Vec<Row>, u64)> {
        let (from, to) = request.range();
        let url = format!("{}?{}", self.table_url(resource.table), list_query(request));
        debug!("GET {} (rows {}-{})", url, from, to);

        let response = self
            .client
            .get(&url)
            .header("Range-Unit", "items")
            .header("Range", format!("{}-{}", from, to))
            .header("Prefer", "count=exact")
            .send()
            .await
            .map_err(|e| AdminError::Fetch(format!("Network error listing {}: {}", resource.table, e)))?;

        let total = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total);

        // a range past the end is not an error, just an empty page
        if response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
            return Ok((Vec::new(), total.unwrap_or(0)));
        }
        if !response.status().is_success() {
            return Err(AdminError::Fetch(failure(response).await));
        }

        let rows = Self::rows(resource, response).await?;
        let total = total.unwrap_or(from + rows.len() as u64);
        Ok((rows, total))
    }

    async fn select_one(&self, resource: &ResourceSpec, id: i64) -> Result<Option<Row>> {
        let url = format!("{}?select=*&id=eq.{}", self.table_url(resource.table), id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AdminError::Fetch(format!("Network error reading {}: {}", resource.table, e)))?;
        if !response.status().is_success() {
            return Err(AdminError::Fetch(failure(response).await));
        }
        Ok(Self::rows(resource, response).await?.into_iter().next())
    }

    async fn insert(&self, resource: &ResourceSpec, row: Row) -> Result<Row> {
        let response = self
            .client
            .post(self.table_url(resource.table))
            .header("Prefer", "return=representation")
            .json(&Value::Object(row))
            .send()
            .await
            .map_err(|e| AdminError::Write(format!("Network error inserting into {}: {}", resource.table, e)))?;
        if !response.status().is_success() {
            return Err(AdminError::Write(failure(response).await));
        }
        Self::rows(resource, response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AdminError::Write(format!("insert into {} returned no row", resource.table)))
    }

    async fn update(&self, resource: &ResourceSpec, id: i64, patch: Row) -> Result<()> {
        if patch.is_empty() {
            return match self.select_one(resource, id).await? {
                Some(_) => Ok(()),
                None => Err(AdminError::NotFound {
                    table: resource.table.to_string(),
                    id,
                }),
            };
        }
        let url = format!("{}?id=eq.{}", self.table_url(resource.table), id);
        let response = self
            .client
            .patch(&url)
            .header("Prefer", "return=representation")
            .json(&Value::Object(patch))
            .send()
            .await
            .map_err(|e| AdminError::Write(format!("Network error updating {}: {}", resource.table, e)))?;
        if !response.status().is_success() {
            return Err(AdminError::Write(failure(response).await));
        }
        if Self::rows(resource, response).await?.is_empty() {
            return Err(AdminError::NotFound {
                table: resource.table.to_string(),
                id,
            });
        }
        Ok(())
    }

    async fn delete(&self, resource: &ResourceSpec, id: i64) -> Result<()> {
        let url = format!("{}?id=eq.{}", self.table_url(resource.table), id);
        let response = self
            .client
            .delete(&url)
            .header("Prefer", "return=representation")
            .send()
            .await
            .map_err(|e| AdminError::Write(format!("Network error deleting from {}: {}", resource.table, e)))?;
        if !response.status().is_success() {
            return Err(AdminError::Write(failure(response).await));
        }
        if Self::rows(resource, response).await?.is_empty() {
            return Err(AdminError::NotFound {
                table: resource.table.to_string(),
                id,
            });
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct ListedObject {
    name: String,
    /// Folders are listed with a null id
    id: Option<String>,
}

#[async_trait]
impl ObjectStore for HostedClient {
    async fn upload(&self, bucket: &str, path: &str, data: Bytes, content_type: &str) -> Result<()> {
        let response = self
            .client
            .post(self.object_url(bucket, path))
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(data)
            .send()
            .await
            .map_err(|e| AdminError::Upload(format!("Network error uploading {}/{}: {}", bucket, path, e)))?;
        if !response.status().is_success() {
            return Err(AdminError::Upload(failure(response).await));
        }
        info!("Uploaded {}/{}", bucket, path);
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> Result<String> {
        let url = format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url,
            encode_path(bucket),
            encode_path(path)
        );
        url::Url::parse(&url)
            .map_err(|e| AdminError::UrlResolution(format!("{}: {}", url, e)))?;
        Ok(url)
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let url = format!("{}/storage/v1/object/{}", self.base_url, encode_path(bucket));
        let response = self
            .client
            .delete(&url)
            .json(&json!({ "prefixes": paths }))
            .send()
            .await
            .map_err(|e| AdminError::Write(format!("Network error removing from {}: {}", bucket, e)))?;
        if !response.status().is_success() {
            return Err(AdminError::Write(failure(response).await));
        }
        info!("Removed {} object(s) from {}", paths.len(), bucket);
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let url = format!("{}/storage/v1/object/list/{}", self.base_url, encode_path(bucket));
        let prefix = prefix.trim_end_matches('/');
        let mut paths = Vec::new();
        let mut offset = 0;

        loop {
            let response = self
                .client
                .post(&url)
                .json(&json!({
                    "prefix": prefix,
                    "limit": LIST_PAGE_LIMIT,
                    "offset": offset,
                    "sortBy": { "column": "name", "order": "asc" },
                }))
                .send()
                .await
                .map_err(|e| AdminError::Fetch(format!("Network error listing {}: {}", bucket, e)))?;
            if !response.status().is_success() {
                return Err(AdminError::Fetch(failure(response).await));
            }
            let objects: Vec<ListedObject> = response
                .json()
                .await
                .map_err(|e| AdminError::Fetch(format!("{}: malformed listing: {}", bucket, e)))?;

            let batch = objects.len();
            paths.extend(
                objects
                    .into_iter()
                    .filter(|o| o.id.is_some())
                    .map(|o| format!("{}/{}", prefix, o.name)),
            );
            if batch < LIST_PAGE_LIMIT {
                break;
            }
            offset += batch;
        }
        Ok(paths)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    user: TokenUser,
}

#[derive(Deserialize)]
struct TokenUser {
    id: String,
    email: Option<String>,
}

#[async_trait]
impl Authenticator for HostedClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let url = format!("{}/auth/v1/token?grant_type=password", self.base_url);
        // sign-in carries only the anon key, never a bearer
        let response = Client::new()
            .post(&url)
            .header("apikey", &self.api_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| AdminError::Fetch(format!("Network error signing in: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = error_message(&body);
            warn!("Sign-in for {} rejected ({})", email, status);
            if status.is_server_error() {
                return Err(AdminError::Fetch(format!("HTTP {}: {}", status, message)));
            }
            return Err(AdminError::Auth(if message.is_empty() {
                "Invalid login credentials".to_string()
            } else {
                message
            }));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AdminError::Fetch(format!("malformed sign-in response: {}", e)))?;
        Ok(Session {
            user_id: token.user.id,
            email: token.user.email.unwrap_or_else(|| email.to_string()),
        })
    }
}
