//! Draft state for creating or editing one record.
//!
//! The editor owns a draft keyed by field name. Submitting validates the whole
//! draft before touching the network, relocates freshly selected files, then
//! writes the record. A failed submission leaves the draft in place.

use futures::future::try_join_all;
use log::{info, warn};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::backend::{ObjectStore, Row};
use crate::config::Buckets;
use crate::error::{AdminError, Result};
use crate::relocate::{relocate, LocalFile};
use crate::repository::Repository;
use crate::resources::{Field, FieldKind, ResourceSpec, Transform};

/// Value held by one draft field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    /// Freshly selected file, uploaded on submit
    File(LocalFile),
    /// URL already stored on the record being edited
    Remote(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorMode {
    New,
    Editing(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorState {
    Closed,
    Open {
        mode: EditorMode,
        /// Message of the last failed submission
        error: Option<String>,
    },
    Submitting {
        mode: EditorMode,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Created(Row),
    Updated(i64),
}

pub struct RecordEditor {
    spec: &'static ResourceSpec,
    state: EditorState,
    draft: BTreeMap<&'static str, FieldValue>,
}

impl RecordEditor {
    pub fn new(spec: &'static ResourceSpec) -> Self {
        Self {
            spec,
            state: EditorState::Closed,
            draft: BTreeMap::new(),
        }
    }

    pub fn spec(&self) -> &'static ResourceSpec {
        self.spec
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn mode(&self) -> Option<EditorMode> {
        match self.state {
            EditorState::Closed => None,
            EditorState::Open { mode, .. } | EditorState::Submitting { mode } => Some(mode),
        }
    }

    pub fn draft(&self) -> &BTreeMap<&'static str, FieldValue> {
        &self.draft
    }

    pub fn value(&self, field: &str) -> Option<&FieldValue> {
        self.draft.get(field)
    }

    fn ensure_editable(&self) -> Result<()> {
        if self.spec.read_only {
            return Err(AdminError::Validation(format!(
                "{} are read-only",
                self.spec.name
            )));
        }
        if matches!(self.state, EditorState::Submitting { .. }) {
            return Err(AdminError::Busy);
        }
        Ok(())
    }

    /// Open an empty draft for a new record
    pub fn open_new(&mut self) -> Result<()> {
        self.ensure_editable()?;
        self.draft.clear();
        self.state = EditorState::Open {
            mode: EditorMode::New,
            error: None,
        };
        Ok(())
    }

    /// Open a draft prefilled from a stored row
    pub fn open_existing(&mut self, row: &Row) -> Result<()> {
        self.ensure_editable()?;
        let id = row
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| AdminError::Validation("row has no id".to_string()))?;

        self.draft.clear();
        for field in self.spec.fields {
            let value = match (row.get(field.name), field.kind) {
                (None, _) | (Some(Value::Null), _) => continue,
                (Some(Value::String(url)), FieldKind::File(_)) => FieldValue::Remote(url.clone()),
                (Some(Value::String(s)), _) => FieldValue::Text(s.clone()),
                (Some(Value::Number(n)), _) => match n.as_i64() {
                    Some(i) => FieldValue::Integer(i),
                    None => FieldValue::Text(n.to_string()),
                },
                (Some(other), _) => FieldValue::Text(other.to_string()),
            };
            self.draft.insert(field.name, value);
        }

        self.state = EditorState::Open {
            mode: EditorMode::Editing(id),
            error: None,
        };
        Ok(())
    }

    fn open_field(&self, name: &str) -> Result<&'static Field> {
        if !matches!(self.state, EditorState::Open { .. }) {
            return Err(AdminError::Validation("editor is not open".to_string()));
        }
        self.spec.fields.iter().find(|f| f.name == name).ok_or_else(|| {
            AdminError::Validation(format!("{} has no field '{}'", self.spec.name, name))
        })
    }

    /// Set a text, choice or integer field
    pub fn set_text(&mut self, name: &str, value: impl Into<String>) -> Result<()> {
        let field = self.open_field(name)?;
        if field.is_file() {
            return Err(AdminError::Validation(format!(
                "{} expects a file",
                field.label
            )));
        }
        self.draft.insert(field.name, FieldValue::Text(value.into()));
        Ok(())
    }

    pub fn set_integer(&mut self, name: &str, value: i64) -> Result<()> {
        let field = self.open_field(name)?;
        if field.is_file() {
            return Err(AdminError::Validation(format!(
                "{} expects a file",
                field.label
            )));
        }
        self.draft.insert(field.name, FieldValue::Integer(value));
        Ok(())
    }

    /// Select a new file for a file field
    pub fn set_file(&mut self, name: &str, file: LocalFile) -> Result<()> {
        let field = self.open_field(name)?;
        if !field.is_file() {
            return Err(AdminError::Validation(format!(
                "{} is not a file field",
                field.label
            )));
        }
        self.draft.insert(field.name, FieldValue::File(file));
        Ok(())
    }

    /// Set a field from a JSON value: strings and numbers map to text and integers
    pub fn set_json(&mut self, name: &str, value: &Value) -> Result<()> {
        match value {
            Value::String(s) => self.set_text(name, s.clone()),
            Value::Number(n) => match n.as_i64() {
                Some(i) => self.set_integer(name, i),
                None => self.set_text(name, n.to_string()),
            },
            Value::Null => self.clear_field(name),
            other => Err(AdminError::Validation(format!(
                "unsupported value for '{}': {}",
                name, other
            ))),
        }
    }

    pub fn clear_field(&mut self, name: &str) -> Result<()> {
        let field = self.open_field(name)?;
        self.draft.remove(field.name);
        Ok(())
    }

    /// Discard the draft and close
    pub fn cancel(&mut self) {
        self.draft.clear();
        self.state = EditorState::Closed;
    }

    /// Check the whole draft and build the non-file part of the payload
    fn validate(&self, mode: EditorMode) -> Result<Row> {
        let creating = mode == EditorMode::New;
        let mut payload = Row::new();

        for field in self.spec.fields {
            let value = self.draft.get(field.name);

            if field.is_file() {
                let present = matches!(value, Some(FieldValue::File(_)) | Some(FieldValue::Remote(_)));
                if creating && field.required && !present {
                    return Err(AdminError::Validation(format!("{} is required", field.label)));
                }
                continue;
            }

            let value = match value {
                Some(v) => v,
                None if creating && field.required => {
                    return Err(AdminError::Validation(format!("{} is required", field.label)));
                }
                None => continue,
            };

            let json = normalize(field, value)?;
            payload.insert(field.name.to_string(), json);
        }

        Ok(payload)
    }

    /// Validate, relocate new files, then create or update the record.
    ///
    /// On success the draft is cleared and the editor closes. On failure the
    /// draft is kept and the editor reopens with the error recorded.
    pub async fn submit(
        &mut self,
        repo: &Repository,
        objects: &dyn ObjectStore,
        buckets: &Buckets,
    ) -> Result<SubmitOutcome> {
        let mode = match &self.state {
            EditorState::Open { mode, .. } => *mode,
            EditorState::Submitting { .. } => return Err(AdminError::Busy),
            EditorState::Closed => {
                return Err(AdminError::Validation("editor is not open".to_string()))
            }
        };
        if !std::ptr::eq(repo.spec(), self.spec) {
            return Err(AdminError::Validation(format!(
                "repository for '{}' cannot store {}",
                repo.spec().name,
                self.spec.name
            )));
        }

        let mut payload = match self.validate(mode) {
            Ok(payload) => payload,
            Err(e) => {
                self.fail(mode, &e);
                return Err(e);
            }
        };

        self.state = EditorState::Submitting { mode };
        let result = self.write(mode, &mut payload, repo, objects, buckets).await;

        match result {
            Ok(outcome) => {
                self.cancel();
                Ok(outcome)
            }
            Err(e) => {
                self.fail(mode, &e);
                Err(e)
            }
        }
    }

    fn fail(&mut self, mode: EditorMode, error: &AdminError) {
        let operation = match mode {
            EditorMode::New => format!("add {}", self.spec.noun),
            EditorMode::Editing(_) => format!("update {}", self.spec.noun),
        };
        warn!("[{}] {} failed: {}", self.spec.name, operation, error);
        self.state = EditorState::Open {
            mode,
            error: Some(error.user_message(&operation)),
        };
    }

    async fn write(
        &self,
        mode: EditorMode,
        payload: &mut Row,
        repo: &Repository,
        objects: &dyn ObjectStore,
        buckets: &Buckets,
    ) -> Result<SubmitOutcome> {
        // independent uploads; the record write waits for all of them
        let uploads = self.spec.file_fields().filter_map(|field| {
            let bucket = match field.kind {
                FieldKind::File(kind) => buckets.name(kind),
                _ => return None,
            };
            match self.draft.get(field.name) {
                Some(FieldValue::File(file)) => Some(async move {
                    relocate(objects, file, bucket)
                        .await
                        .map(|url| (field.name, url))
                }),
                _ => None,
            }
        });
        let relocated = try_join_all(uploads).await?;
        for (name, url) in relocated {
            payload.insert(name.to_string(), Value::String(url));
        }

        match mode {
            EditorMode::New => {
                for field in self.spec.file_fields() {
                    if let Some(FieldValue::Remote(url)) = self.draft.get(field.name) {
                        payload.insert(field.name.to_string(), Value::String(url.clone()));
                    }
                }
                if let Some(column) = self.spec.created_at {
                    payload.insert(
                        column.to_string(),
                        Value::String(chrono::Utc::now().to_rfc3339()),
                    );
                }
                let row = repo.insert(payload.clone()).await?;
                info!("[{}] created {}", self.spec.name, describe(&row));
                Ok(SubmitOutcome::Created(row))
            }
            EditorMode::Editing(id) => {
                repo.update(id, payload.clone()).await?;
                info!("[{}] updated id {}", self.spec.name, id);
                Ok(SubmitOutcome::Updated(id))
            }
        }
    }
}

fn describe(row: &Row) -> String {
    match row.get("id") {
        Some(id) => format!("id {}", id),
        None => "row".to_string(),
    }
}

/// Validate one non-file value and convert it to its stored form
fn normalize(field: &Field, value: &FieldValue) -> Result<Value> {
    match field.kind {
        FieldKind::Text => {
            let text = match value {
                FieldValue::Text(s) => s.clone(),
                FieldValue::Integer(i) => i.to_string(),
                _ => return Err(AdminError::Validation(format!("{} must be text", field.label))),
            };
            if field.required && text.trim().is_empty() {
                return Err(AdminError::Validation(format!("{} is required", field.label)));
            }
            let text = match field.transform {
                Transform::Uppercase => text.to_uppercase(),
                Transform::None => text,
            };
            Ok(Value::String(text))
        }
        FieldKind::Choice(allowed) => {
            let text = match value {
                FieldValue::Text(s) => s.trim().to_lowercase(),
                _ => return Err(AdminError::Validation(format!("{} must be text", field.label))),
            };
            if text.is_empty() {
                return Err(AdminError::Validation(format!("{} is required", field.label)));
            }
            if !allowed.contains(&text.as_str()) {
                return Err(AdminError::Validation(format!(
                    "{} must be one of: {}",
                    field.label,
                    allowed.join(", ")
                )));
            }
            Ok(Value::String(text))
        }
        FieldKind::IntegerChoice(allowed) => {
            let number = match value {
                FieldValue::Integer(i) => Some(*i),
                FieldValue::Text(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            };
            match number {
                Some(n) if allowed.contains(&n) => Ok(Value::from(n)),
                _ => Err(AdminError::Validation(format!(
                    "{} must be one of: {}",
                    field.label,
                    allowed
                        .iter()
                        .map(|n| n.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))),
            }
        }
        FieldKind::File(_) => Err(AdminError::Validation(format!(
            "{} expects a file",
            field.label
        ))),
    }
}
