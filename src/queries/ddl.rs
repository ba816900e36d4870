use sea_query::{ColumnDef, Index, SqliteQueryBuilder, Table};

use crate::schema::{Learning, Metadata, Practice, Users};

/// CREATE TABLE IF NOT EXISTS metadata (key TEXT PRIMARY KEY, value TEXT NOT NULL)
pub fn create_metadata_table() -> String {
    Table::create()
        .table(Metadata::Table)
        .if_not_exists()
        .col(ColumnDef::new(Metadata::Key).string().primary_key())
        .col(ColumnDef::new(Metadata::Value).string().not_null())
        .to_string(SqliteQueryBuilder)
}

/// CREATE TABLE IF NOT EXISTS users (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     name TEXT NOT NULL,
///     email TEXT NOT NULL,
///     points INTEGER NOT NULL DEFAULT 0,
///     streak INTEGER NOT NULL DEFAULT 0,
///     sings INTEGER NOT NULL DEFAULT 0,
///     practice_score INTEGER NOT NULL DEFAULT 0
/// )
pub fn create_users_table() -> String {
    Table::create()
        .table(Users::Table)
        .if_not_exists()
        .col(
            ColumnDef::new(Users::Id)
                .integer()
                .primary_key()
                .auto_increment(),
        )
        .col(ColumnDef::new(Users::Name).string().not_null())
        .col(ColumnDef::new(Users::Email).string().not_null())
        .col(ColumnDef::new(Users::Points).big_integer().not_null().default(0))
        .col(ColumnDef::new(Users::Streak).big_integer().not_null().default(0))
        .col(ColumnDef::new(Users::Sings).big_integer().not_null().default(0))
        .col(
            ColumnDef::new(Users::PracticeScore)
                .big_integer()
                .not_null()
                .default(0),
        )
        .to_string(SqliteQueryBuilder)
}

/// CREATE TABLE IF NOT EXISTS learning (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     category TEXT NOT NULL,
///     label TEXT NOT NULL,
///     label_image TEXT,
///     video_url TEXT NOT NULL
/// )
pub fn create_learning_table() -> String {
    Table::create()
        .table(Learning::Table)
        .if_not_exists()
        .col(
            ColumnDef::new(Learning::Id)
                .integer()
                .primary_key()
                .auto_increment(),
        )
        .col(ColumnDef::new(Learning::Category).string().not_null())
        .col(ColumnDef::new(Learning::Label).string().not_null())
        .col(ColumnDef::new(Learning::LabelImage).string().null())
        .col(ColumnDef::new(Learning::VideoUrl).string().not_null())
        .to_string(SqliteQueryBuilder)
}

/// CREATE TABLE IF NOT EXISTS practice (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     question TEXT NOT NULL,
///     question_video_url TEXT,
///     option1 TEXT NOT NULL,
///     option1_image TEXT,
///     option2 TEXT NOT NULL,
///     option2_image TEXT,
///     correct_answer_option INTEGER NOT NULL,
///     created_at TEXT NOT NULL
/// )
pub fn create_practice_table() -> String {
    Table::create()
        .table(Practice::Table)
        .if_not_exists()
        .col(
            ColumnDef::new(Practice::Id)
                .integer()
                .primary_key()
                .auto_increment(),
        )
        .col(ColumnDef::new(Practice::Question).string().not_null())
        .col(ColumnDef::new(Practice::QuestionVideoUrl).string().null())
        .col(ColumnDef::new(Practice::Option1).string().not_null())
        .col(ColumnDef::new(Practice::Option1Image).string().null())
        .col(ColumnDef::new(Practice::Option2).string().not_null())
        .col(ColumnDef::new(Practice::Option2Image).string().null())
        .col(
            ColumnDef::new(Practice::CorrectAnswerOption)
                .integer()
                .not_null(),
        )
        .col(ColumnDef::new(Practice::CreatedAt).string().not_null())
        .to_string(SqliteQueryBuilder)
}

/// CREATE INDEX IF NOT EXISTS idx_learning_category ON learning(category)
pub fn create_learning_category_index() -> String {
    Index::create()
        .if_not_exists()
        .name("idx_learning_category")
        .table(Learning::Table)
        .col(Learning::Category)
        .to_string(SqliteQueryBuilder)
}

/// CREATE INDEX IF NOT EXISTS idx_users_name ON users(name)
pub fn create_users_name_index() -> String {
    Index::create()
        .if_not_exists()
        .name("idx_users_name")
        .table(Users::Table)
        .col(Users::Name)
        .to_string(SqliteQueryBuilder)
}

/// All statements needed to bring an empty database up to the current schema
pub fn all_statements() -> Vec<String> {
    vec![
        create_metadata_table(),
        create_users_table(),
        create_learning_table(),
        create_practice_table(),
        create_learning_category_index(),
        create_users_name_index(),
    ]
}
