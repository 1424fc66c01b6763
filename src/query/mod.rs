//! Windowed Query Engine: consistent event pages over a fast projection
//! table and a slower enriched join, stateless per call.

pub mod config;
pub mod cursor;
pub mod error;
pub mod merge;
pub mod params;
pub mod rows;
pub mod store;
pub mod window;

pub use config::QueryConfig;
pub use cursor::Cursor;
pub use error::QueryError;
pub use merge::merge_by_key;
pub use params::{Direction, EventFilter, PageParams, PageRequest};
pub use rows::{EventRow, ProjectionRow, RowKey};
pub use store::{PageStore, SqlitePageStore};
pub use window::{fetch_page, Page, PageCursors};

/// Validate `request` and serve one page.
pub fn query_events(
    store: &dyn PageStore,
    config: &QueryConfig,
    request: &PageRequest,
    now_ts: u64,
) -> Result<Page, QueryError> {
    let params = PageParams::from_request(request, config)?;
    fetch_page(store, config, &params, now_ts)
}
