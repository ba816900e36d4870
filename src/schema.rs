use sea_query::Iden;

/// Metadata table - key-value store for database configuration
#[derive(Iden)]
pub enum Metadata {
    Table,
    Key,
    Value,
}

/// Users table - app users, read-only for admins
#[derive(Iden)]
pub enum Users {
    Table,
    Id,
    Name,
    Email,
    Points,
    Streak,
    Sings,
    PracticeScore,
}

/// Learning table - one sign video per label
#[derive(Iden)]
pub enum Learning {
    Table,
    Id,
    Category,
    Label,
    LabelImage,
    VideoUrl,
}

/// Practice table - two-option quiz questions
#[derive(Iden)]
pub enum Practice {
    Table,
    Id,
    Question,
    QuestionVideoUrl,
    Option1,
    Option1Image,
    Option2,
    Option2Image,
    CorrectAnswerOption,
    CreatedAt,
}
