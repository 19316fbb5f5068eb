use serde::Deserialize;
use utoipa::IntoParams;

use crate::{error::StoreError, models::Page};

pub const DEFAULT_LIMIT: u32 = 25;
pub const MAX_LIMIT: u32 = 100;

/// PageParams
///
/// Keyset pagination query parameters shared by every listing endpoint.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct PageParams {
    /// Id of the last item of the previous page.
    pub cursor: Option<String>,
    /// Page size, 1..=100. Defaults to 25.
    pub limit: Option<u32>,
}

/// PageRequest
///
/// A validated `PageParams`, as handed to the stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub cursor: Option<String>,
    pub limit: u32,
}

impl PageRequest {
    pub fn first(limit: u32) -> Self {
        Self {
            cursor: None,
            limit: limit.clamp(1, MAX_LIMIT),
        }
    }

    pub fn after(cursor: impl Into<String>, limit: u32) -> Self {
        Self {
            cursor: Some(cursor.into()),
            limit: limit.clamp(1, MAX_LIMIT),
        }
    }

    /// Rows a store should fetch: one extra to learn whether another page exists.
    pub fn fetch_limit(&self) -> i64 {
        i64::from(self.limit) + 1
    }
}

impl From<PageParams> for PageRequest {
    fn from(params: PageParams) -> Self {
        let cursor = params.cursor.filter(|c| !c.trim().is_empty());
        Self {
            cursor,
            limit: params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        }
    }
}

/// finish_page
///
/// Turns the `limit + 1` rows fetched by a store into a page. When the extra row is
/// present it is dropped and the id of the last kept row becomes `next_cursor`.
pub fn finish_page<T>(mut rows: Vec<T>, limit: u32, id_of: impl Fn(&T) -> String) -> Page<T> {
    let limit = limit as usize;
    if rows.len() > limit {
        rows.truncate(limit);
        let next_cursor = rows.last().map(&id_of);
        Page {
            items: rows,
            next_cursor,
        }
    } else {
        Page {
            items: rows,
            next_cursor: None,
        }
    }
}

/// paginate_sorted
///
/// Keyset pagination over a whole, already ordered in-memory collection: skips everything
/// up to and including the cursor item, then takes one page of items accepted by `keep`.
/// The cursor is located before filtering, like a keyset comparison in SQL.
pub fn paginate_sorted<T>(
    sorted: Vec<T>,
    page: &PageRequest,
    id_of: impl Fn(&T) -> String,
    keep: impl Fn(&T) -> bool,
) -> Result<Page<T>, StoreError> {
    let start = match &page.cursor {
        None => 0,
        Some(cursor) => {
            sorted
                .iter()
                .position(|item| &id_of(item) == cursor)
                .ok_or(StoreError::InvalidCursor)?
                + 1
        }
    };
    let rows: Vec<T> = sorted
        .into_iter()
        .skip(start)
        .filter(|item| keep(item))
        .take(page.limit as usize + 1)
        .collect();
    Ok(finish_page(rows, page.limit, id_of))
}
