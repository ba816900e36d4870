//! Page, filter and sort state of one admin screen.

use log::debug;
use std::sync::Arc;

use crate::backend::{Backend, ObjectStore, Row};
use crate::config::Buckets;
use crate::editor::{RecordEditor, SubmitOutcome};
use crate::error::{AdminError, Result};
use crate::media::delete_with_media;
use crate::repository::{PageRequest, Repository};
use crate::resources::ResourceSpec;

pub struct ListView {
    repo: Repository,
    objects: Arc<dyn ObjectStore>,
    buckets: Buckets,
    page_size: u32,
    current_page: u32,
    filter: Option<String>,
    sort_column: Option<String>,
    ascending: bool,
    total_pages: u32,
    total_count: u64,
    rows: Vec<Row>,
}

impl ListView {
    /// A view on page 1 with no filter or sort; call `refresh` to load it
    pub fn new(backend: &Backend, spec: &'static ResourceSpec, page_size: u32) -> Self {
        Self {
            repo: Repository::new(backend.tables.clone(), spec),
            objects: backend.objects.clone(),
            buckets: backend.buckets.clone(),
            page_size,
            current_page: 1,
            filter: None,
            sort_column: None,
            ascending: true,
            total_pages: 0,
            total_count: 0,
            rows: Vec::new(),
        }
    }

    pub fn spec(&self) -> &'static ResourceSpec {
        self.repo.spec()
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn sort(&self) -> Option<(&str, bool)> {
        self.sort_column.as_deref().map(|c| (c, self.ascending))
    }

    /// Request for the current state
    pub fn request(&self) -> PageRequest {
        let mut request = PageRequest::new(self.current_page, self.page_size);
        if let (Some(value), Some((column, mode))) = (&self.filter, self.spec().filter) {
            request = request.with_filter(column, value, mode);
        }
        if let Some(column) = &self.sort_column {
            request = request.with_sort(column, self.ascending);
        }
        request
    }

    /// Fetch the current page
    pub async fn refresh(&mut self) -> Result<()> {
        let page = self.repo.list(&self.request()).await?;
        self.rows = page.items;
        self.total_count = page.total_count;
        self.total_pages = page.total_pages;
        debug!(
            "[{}] showing page {}/{} ({} rows)",
            self.spec().name,
            self.current_page,
            self.total_pages,
            self.rows.len()
        );
        Ok(())
    }

    /// Set or clear the filter; always returns to page 1
    pub async fn set_filter(&mut self, value: Option<&str>) -> Result<()> {
        if self.spec().filter.is_none() && value.is_some() {
            return Err(AdminError::Validation(format!(
                "{} cannot be filtered",
                self.spec().name
            )));
        }
        self.filter = value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        self.current_page = 1;
        self.refresh().await
    }

    /// Sort by `column` and flip the direction, keeping the page
    pub async fn toggle_sort(&mut self, column: &str) -> Result<()> {
        match self.spec().column(column) {
            Some(c) if c.sortable => {}
            _ => {
                return Err(AdminError::Validation(format!(
                    "Cannot sort {} by column '{}'",
                    self.spec().name,
                    column
                )))
            }
        }
        self.sort_column = Some(column.to_string());
        self.ascending = !self.ascending;
        self.refresh().await
    }

    pub async fn next_page(&mut self) -> Result<()> {
        self.go_to(self.current_page.saturating_add(1)).await
    }

    pub async fn previous_page(&mut self) -> Result<()> {
        self.go_to(self.current_page.saturating_sub(1)).await
    }

    /// Jump to a page, clamped to `[1, total_pages]`
    pub async fn go_to(&mut self, page: u32) -> Result<()> {
        self.current_page = page.clamp(1, self.total_pages.max(1));
        self.refresh().await
    }

    /// Delete a row and re-fetch; steps back a page when this one empties out
    pub async fn delete_row(&mut self, id: i64) -> Result<()> {
        if self.spec().delete_media {
            delete_with_media(&self.repo, self.objects.as_ref(), &self.buckets, id).await?;
        } else {
            self.repo.delete(id).await?;
        }

        self.refresh().await?;
        if self.rows.is_empty() && self.current_page > 1 {
            self.current_page -= 1;
            self.refresh().await?;
        }
        Ok(())
    }

    /// Editor prefilled from a row of the current page, or fetched by id
    pub async fn edit_row(&self, id: i64) -> Result<RecordEditor> {
        let shown = self
            .rows
            .iter()
            .find(|row| row.get("id").and_then(|v| v.as_i64()) == Some(id))
            .cloned();
        let row = match shown {
            Some(row) => row,
            None => self.repo.get(id).await?,
        };
        let mut editor = RecordEditor::new(self.spec());
        editor.open_existing(&row)?;
        Ok(editor)
    }

    pub fn new_record(&self) -> Result<RecordEditor> {
        let mut editor = RecordEditor::new(self.spec());
        editor.open_new()?;
        Ok(editor)
    }

    /// Submit an editor and re-fetch the current page on success
    pub async fn submit(&mut self, editor: &mut RecordEditor) -> Result<SubmitOutcome> {
        let outcome = editor
            .submit(&self.repo, self.objects.as_ref(), &self.buckets)
            .await?;
        self.refresh().await?;
        Ok(outcome)
    }
}
