use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

use crate::backend::{Row, TableStore};
use crate::error::{AdminError, Result};
use crate::resources::ResourceSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Case-insensitive substring match
    Contains,
    /// Exact match
    Equals,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub value: String,
    pub mode: FilterMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub column: String,
    pub ascending: bool,
}

/// One page of a listing, 1-indexed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
    pub filter: Option<Filter>,
    pub sort: Option<Sort>,
    /// Keyset cursor: only rows with a greater id
    pub after_id: Option<i64>,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page,
            page_size,
            filter: None,
            sort: None,
            after_id: None,
        }
    }

    pub fn with_filter(mut self, column: &str, value: &str, mode: FilterMode) -> Self {
        self.filter = Some(Filter {
            column: column.to_string(),
            value: value.to_string(),
            mode,
        });
        self
    }

    pub fn with_sort(mut self, column: &str, ascending: bool) -> Self {
        self.sort = Some(Sort {
            column: column.to_string(),
            ascending,
        });
        self
    }

    /// Restrict the listing to rows after `id`, for scans that must not skip
    /// rows when earlier ones are deleted concurrently
    pub fn starting_after(mut self, id: i64) -> Self {
        self.after_id = Some(id);
        self
    }

    /// Inclusive row range `[(page-1)*size, page*size-1]`
    pub fn range(&self) -> (u64, u64) {
        let size = self.page_size as u64;
        let from = (self.page.max(1) as u64 - 1) * size;
        (from, from + size - 1)
    }

    pub fn offset(&self) -> u64 {
        self.range().0
    }
}

/// `ceil(total_count / page_size)`
pub fn total_pages(total_count: u64, page_size: u32) -> u32 {
    if page_size == 0 {
        return 0;
    }
    total_count.div_ceil(page_size as u64) as u32
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T = Row> {
    pub items: Vec<T>,
    pub total_count: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

/// Paginated listing, lookup and writes against one resource's table
#[derive(Clone)]
pub struct Repository {
    tables: Arc<dyn TableStore>,
    spec: &'static ResourceSpec,
}

impl Repository {
    pub fn new(tables: Arc<dyn TableStore>, spec: &'static ResourceSpec) -> Self {
        Self { tables, spec }
    }

    pub fn spec(&self) -> &'static ResourceSpec {
        self.spec
    }

    /// Reject requests the store should never see
    pub fn validate_request(&self, request: &PageRequest) -> Result<()> {
        if request.page == 0 {
            return Err(AdminError::Validation("page numbers start at 1".to_string()));
        }
        if request.page_size == 0 {
            return Err(AdminError::Validation("page size must be at least 1".to_string()));
        }
        if let Some(filter) = &request.filter {
            if self.spec.column(&filter.column).is_none() {
                return Err(AdminError::Validation(format!(
                    "Cannot filter {} by unknown column '{}'",
                    self.spec.name, filter.column
                )));
            }
        }
        if let (Some(_), Some(sort)) = (request.after_id, &request.sort) {
            if sort.column != "id" || !sort.ascending {
                return Err(AdminError::Validation(
                    "an id cursor only works with ascending id order".to_string(),
                ));
            }
        }
        if let Some(sort) = &request.sort {
            match self.spec.column(&sort.column) {
                Some(column) if column.sortable => {}
                _ => {
                    return Err(AdminError::Validation(format!(
                        "Cannot sort {} by column '{}'",
                        self.spec.name, sort.column
                    )))
                }
            }
        }
        Ok(())
    }

    pub async fn list(&self, request: &PageRequest) -> Result<Page> {
        self.validate_request(request)?;
        let (items, total_count) = self.tables.select_page(self.spec, request).await?;
        debug!(
            "[{}] page {} -> {} rows of {}",
            self.spec.name,
            request.page,
            items.len(),
            total_count
        );
        Ok(Page {
            items,
            total_count,
            page: request.page,
            page_size: request.page_size,
            total_pages: total_pages(total_count, request.page_size),
        })
    }

    /// List and decode rows into a typed record
    pub async fn list_as<T: DeserializeOwned>(&self, request: &PageRequest) -> Result<Page<T>> {
        let page = self.list(request).await?;
        let items = page
            .items
            .into_iter()
            .map(|row| {
                serde_json::from_value(serde_json::Value::Object(row)).map_err(|e| {
                    AdminError::Fetch(format!("Malformed {} row: {}", self.spec.name, e))
                })
            })
            .collect::<Result<Vec<T>>>()?;
        Ok(Page {
            items,
            total_count: page.total_count,
            page: page.page,
            page_size: page.page_size,
            total_pages: page.total_pages,
        })
    }

    pub async fn get(&self, id: i64) -> Result<Row> {
        self.tables
            .select_one(self.spec, id)
            .await?
            .ok_or_else(|| AdminError::NotFound {
                table: self.spec.table.to_string(),
                id,
            })
    }

    pub async fn insert(&self, row: Row) -> Result<Row> {
        self.ensure_writable()?;
        self.tables.insert(self.spec, row).await
    }

    pub async fn update(&self, id: i64, patch: Row) -> Result<()> {
        self.ensure_writable()?;
        self.tables.update(self.spec, id, patch).await
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        self.ensure_writable()?;
        self.tables.delete(self.spec, id).await
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.spec.read_only {
            return Err(AdminError::Validation(format!(
                "{} are read-only",
                self.spec.name
            )));
        }
        Ok(())
    }
}
