use serde::{Deserialize, Serialize};

use weave_types::StoredFile;

pub const INVALID_FILE_QUERY_PARAMS: &str = "INVALID_FILE_QUERY_PARAMS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileQueryError {
    pub code: &'static str,
    pub detail: String,
}

impl FileQueryError {
    pub fn invalid(detail: impl Into<String>) -> Self {
        Self {
            code: INVALID_FILE_QUERY_PARAMS,
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for FileQueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.detail)
    }
}

impl std::error::Error for FileQueryError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileSortField {
    CreatedAt,
    Path,
    Size,
    Language,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Sort field and order arrive as free-form strings from the transport and
/// are validated against the allow-list; nothing is interpolated downstream.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilePage {
    pub files: Vec<StoredFile>,
    pub total: usize,
    pub offset: usize,
}

pub(crate) fn parse_sort(query: &FileQuery) -> Result<(FileSortField, SortOrder), FileQueryError> {
    let field = match query.sort.as_deref() {
        None | Some("createdAt") => FileSortField::CreatedAt,
        Some("path") => FileSortField::Path,
        Some("size") => FileSortField::Size,
        Some("language") => FileSortField::Language,
        Some(other) => {
            return Err(FileQueryError::invalid(format!(
                "unsupported sort field `{other}`"
            )))
        }
    };
    let order = match query.order.as_deref() {
        None | Some("asc") => SortOrder::Asc,
        Some("desc") => SortOrder::Desc,
        Some(other) => {
            return Err(FileQueryError::invalid(format!(
                "unsupported sort order `{other}`"
            )))
        }
    };
    Ok((field, order))
}

pub(crate) fn apply_query(
    mut files: Vec<StoredFile>,
    query: &FileQuery,
) -> Result<FilePage, FileQueryError> {
    let (field, order) = parse_sort(query)?;

    if let Some(prefix) = query.prefix.as_deref() {
        files.retain(|f| f.path.starts_with(prefix));
    }
    if let Some(language) = query.language.as_deref() {
        files.retain(|f| f.language.as_deref() == Some(language));
    }

    files.sort_by(|a, b| {
        let ordering = match field {
            FileSortField::CreatedAt => a.created_at.cmp(&b.created_at),
            FileSortField::Path => a.path.cmp(&b.path),
            FileSortField::Size => a.size.cmp(&b.size),
            FileSortField::Language => a.language.cmp(&b.language),
        };
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });

    let total = files.len();
    let offset = query.offset.min(total);
    let files = match query.limit {
        Some(limit) => files.into_iter().skip(offset).take(limit).collect(),
        None => files.into_iter().skip(offset).collect(),
    };

    Ok(FilePage {
        files,
        total,
        offset,
    })
}
