//! Static definitions of the three admin screens.
//!
//! Each screen is a table, its columns, the editable fields and their rules.
//! The repository, editor and list view are generic over these definitions.

use clap::ValueEnum;
use serde::Deserialize;

use crate::model::Category;
use crate::repository::FilterMode;

/// Storage type of a column, used to decode rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Text,
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub sortable: bool,
}

/// Which configured bucket a file field uploads into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketKind {
    Videos,
    Images,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Free text
    Text,
    /// Text restricted to a closed set of values
    Choice(&'static [&'static str]),
    /// Integer restricted to a closed set of values
    IntegerChoice(&'static [i64]),
    /// Media stored in a bucket, persisted as its public URL
    File(BucketKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    None,
    Uppercase,
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub transform: Transform,
}

impl Field {
    const fn text(name: &'static str, label: &'static str, required: bool) -> Self {
        Self {
            name,
            label,
            kind: FieldKind::Text,
            required,
            transform: Transform::None,
        }
    }

    const fn file(name: &'static str, label: &'static str, bucket: BucketKind, required: bool) -> Self {
        Self {
            name,
            label,
            kind: FieldKind::File(bucket),
            required,
            transform: Transform::None,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, FieldKind::File(_))
    }
}

#[derive(Debug)]
pub struct ResourceSpec {
    /// Name used in routes and messages
    pub name: &'static str,
    /// Singular noun for user-facing messages
    pub noun: &'static str,
    pub table: &'static str,
    pub columns: &'static [Column],
    /// Editable fields; empty for read-only resources
    pub fields: &'static [Field],
    /// Column the list screen filters on, with its match mode
    pub filter: Option<(&'static str, FilterMode)>,
    pub read_only: bool,
    /// Remove referenced media before deleting a row
    pub delete_media: bool,
    /// Column stamped with the creation time on insert
    pub created_at: Option<&'static str>,
}

impl ResourceSpec {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    pub fn file_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.is_file())
    }
}

const fn col(name: &'static str, kind: ColumnKind) -> Column {
    Column {
        name,
        kind,
        sortable: true,
    }
}

const fn unsorted(name: &'static str, kind: ColumnKind) -> Column {
    Column {
        name,
        kind,
        sortable: false,
    }
}

pub static USERS: ResourceSpec = ResourceSpec {
    name: "users",
    noun: "user",
    table: "users",
    columns: &[
        col("id", ColumnKind::Integer),
        col("name", ColumnKind::Text),
        col("email", ColumnKind::Text),
        col("points", ColumnKind::Integer),
        col("streak", ColumnKind::Integer),
        col("sings", ColumnKind::Integer),
        col("practice_score", ColumnKind::Integer),
    ],
    fields: &[],
    filter: Some(("name", FilterMode::Contains)),
    read_only: true,
    delete_media: false,
    created_at: None,
};

pub static LEARNING: ResourceSpec = ResourceSpec {
    name: "learning",
    noun: "video",
    table: "learning",
    columns: &[
        col("id", ColumnKind::Integer),
        col("category", ColumnKind::Text),
        col("label", ColumnKind::Text),
        unsorted("label_image", ColumnKind::Text),
        unsorted("video_url", ColumnKind::Text),
    ],
    fields: &[
        Field::file("video_url", "Video", BucketKind::Videos, true),
        Field {
            name: "label",
            label: "Label",
            kind: FieldKind::Text,
            required: true,
            transform: Transform::Uppercase,
        },
        Field::file("label_image", "Label image", BucketKind::Images, false),
        Field {
            name: "category",
            label: "Category",
            kind: FieldKind::Choice(Category::ALL_NAMES),
            required: true,
            transform: Transform::None,
        },
    ],
    filter: Some(("category", FilterMode::Equals)),
    read_only: false,
    delete_media: false,
    created_at: None,
};

pub static PRACTICE: ResourceSpec = ResourceSpec {
    name: "practice",
    noun: "question",
    table: "practice",
    columns: &[
        col("id", ColumnKind::Integer),
        col("question", ColumnKind::Text),
        unsorted("question_video_url", ColumnKind::Text),
        unsorted("option1", ColumnKind::Text),
        unsorted("option1_image", ColumnKind::Text),
        unsorted("option2", ColumnKind::Text),
        unsorted("option2_image", ColumnKind::Text),
        unsorted("correct_answer_option", ColumnKind::Integer),
        col("created_at", ColumnKind::Text),
    ],
    fields: &[
        Field::text("question", "Question", true),
        Field::file("question_video_url", "Question video", BucketKind::Videos, false),
        Field::text("option1", "Option 1", true),
        Field::file("option1_image", "Option 1 image", BucketKind::Images, false),
        Field::text("option2", "Option 2", true),
        Field::file("option2_image", "Option 2 image", BucketKind::Images, false),
        Field {
            name: "correct_answer_option",
            label: "Correct answer option",
            kind: FieldKind::IntegerChoice(&[1, 2]),
            required: true,
            transform: Transform::None,
        },
    ],
    filter: Some(("question", FilterMode::Contains)),
    read_only: false,
    delete_media: true,
    created_at: Some("created_at"),
};

/// Resource selector for the CLI and config
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    /// App users (read-only)
    Users,
    /// Learning videos
    Learning,
    /// Practice questions
    Practice,
}

impl Resource {
    pub fn spec(self) -> &'static ResourceSpec {
        match self {
            Resource::Users => &USERS,
            Resource::Learning => &LEARNING,
            Resource::Practice => &PRACTICE,
        }
    }
}

/// Resources whose rows reference bucket objects
pub fn media_resources() -> [&'static ResourceSpec; 2] {
    [&LEARNING, &PRACTICE]
}
