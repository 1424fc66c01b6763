//! Rolling-window pagination.
//!
//! Candidates come from the projection table through time slices that start
//! narrow at the anchor and double in width (up to `max_window`) until
//! `limit + 1` rows are found or the absolute bound is reached. Slices never
//! overlap, so no row is read twice.

use crate::query::config::QueryConfig;
use crate::query::cursor::Cursor;
use crate::query::error::QueryError;
use crate::query::merge::merge_by_key;
use crate::query::params::{Direction, PageParams};
use crate::query::rows::{EventRow, ProjectionRow, RowKey};
use crate::query::store::{PageStore, SliceQuery};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PageCursors {
    pub next: Option<String>,
    pub prev: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub data: Vec<EventRow>,
    pub cursor: PageCursors,
    #[serde(skip)]
    pub has_more: bool,
    /// Projection queries issued for this page.
    #[serde(skip)]
    pub slices_scanned: usize,
}

/// Inclusive timestamp range a page may draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bounds {
    lower: u64,
    upper: u64,
}

fn bounds(config: &QueryConfig, params: &PageParams, now_ts: u64) -> Option<Bounds> {
    let lower = match params.after_ts {
        Some(after) => config.genesis_ts.max(after.checked_add(1)?),
        None => config.genesis_ts,
    };
    let upper = match params.before_ts {
        Some(before) => now_ts.min(before.checked_sub(1)?),
        None => now_ts,
    };
    (lower <= upper).then_some(Bounds { lower, upper })
}

/// Up to `params.limit + 1` projection rows beyond the anchor, in direction
/// order, and the number of slices it took.
pub fn collect_candidates(
    store: &dyn PageStore,
    config: &QueryConfig,
    params: &PageParams,
    now_ts: u64,
) -> Result<(Vec<ProjectionRow>, usize), QueryError> {
    let wanted = params.limit + 1;
    let mut rows: Vec<ProjectionRow> = Vec::with_capacity(wanted);
    let mut slices = 0;

    let Some(Bounds { lower, upper }) = bounds(config, params, now_ts) else {
        return Ok((rows, slices));
    };
    let mut width = config.initial_window.max(1);

    match params.direction {
        Direction::Next => {
            let mut hi = match params.anchor {
                Some(anchor) if anchor.ts < lower => return Ok((rows, slices)),
                Some(anchor) => anchor.ts.min(upper),
                None => upper,
            };
            loop {
                let lo = hi.saturating_sub(width - 1).max(lower);
                rows.extend(store.projection_slice(&SliceQuery {
                    from_ts: lo,
                    to_ts: hi,
                    direction: Direction::Next,
                    after: params.anchor,
                    filter: &params.filter,
                    limit: wanted - rows.len(),
                })?);
                slices += 1;
                if rows.len() >= wanted || lo == lower {
                    break;
                }
                hi = lo - 1;
                width = width.saturating_mul(2).min(config.max_window.max(1));
            }
        }
        Direction::Prev => {
            let mut lo = match params.anchor {
                Some(anchor) if anchor.ts > upper => return Ok((rows, slices)),
                Some(anchor) => anchor.ts.max(lower),
                None => lower,
            };
            loop {
                let hi = lo.saturating_add(width - 1).min(upper);
                rows.extend(store.projection_slice(&SliceQuery {
                    from_ts: lo,
                    to_ts: hi,
                    direction: Direction::Prev,
                    after: params.anchor,
                    filter: &params.filter,
                    limit: wanted - rows.len(),
                })?);
                slices += 1;
                if rows.len() >= wanted || hi == upper {
                    break;
                }
                lo = hi + 1;
                width = width.saturating_mul(2).min(config.max_window.max(1));
            }
        }
    }

    Ok((rows, slices))
}

/// Serve one page. `now_ts` (nanoseconds) caps the newest reachable row.
pub fn fetch_page(
    store: &dyn PageStore,
    config: &QueryConfig,
    params: &PageParams,
    now_ts: u64,
) -> Result<Page, QueryError> {
    let (candidates, slices_scanned) = collect_candidates(store, config, params, now_ts)?;
    let has_more = candidates.len() > params.limit;

    let keys: Vec<RowKey> = candidates.iter().map(ProjectionRow::key).collect();
    let base = if keys.is_empty() {
        Vec::new()
    } else {
        store.base_rows(&keys)?
    };
    if base.len() < keys.len() {
        log::debug!(
            "Base table behind projection: {} of {} rows enriched",
            base.len(),
            keys.len()
        );
    }

    let mut data = merge_by_key(candidates, base);
    data.truncate(params.limit);

    let encode = |row: Option<&EventRow>| row.map(|r| r.cursor().encode());
    let cursor = match params.direction {
        Direction::Next => PageCursors {
            next: if has_more { encode(data.last()) } else { None },
            prev: if params.anchor.is_some() { encode(data.first()) } else { None },
        },
        Direction::Prev => {
            data.reverse();
            PageCursors {
                next: encode(data.last()),
                prev: if has_more { encode(data.first()) } else { None },
            }
        }
    };

    Ok(Page {
        data,
        cursor,
        has_more,
        slices_scanned,
    })
}

/// Decode a `next`/`prev` token from a page back into an anchor.
pub fn anchor_of(token: &Option<String>) -> Result<Option<Cursor>, QueryError> {
    token.as_deref().map(Cursor::decode).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::merge::test_rows::{enriched, projection};
    use crate::query::params::EventFilter;
    use std::cell::Cell;
    use std::collections::HashSet;

    const W: u64 = 100;

    /// Projection rows in memory; keys in `lagging` have no base row yet.
    struct MemoryStore {
        rows: Vec<ProjectionRow>,
        lagging: HashSet<RowKey>,
        projection_queries: Cell<usize>,
    }

    impl MemoryStore {
        fn new(rows: Vec<ProjectionRow>) -> Self {
            Self {
                rows,
                lagging: HashSet::new(),
                projection_queries: Cell::new(0),
            }
        }
    }

    impl PageStore for MemoryStore {
        fn projection_slice(&self, slice: &SliceQuery<'_>) -> Result<Vec<ProjectionRow>, QueryError> {
            self.projection_queries.set(self.projection_queries.get() + 1);
            let mut rows: Vec<ProjectionRow> = self
                .rows
                .iter()
                .filter(|r| r.block_timestamp >= slice.from_ts && r.block_timestamp <= slice.to_ts)
                .filter(|r| slice.filter.account.as_ref().map_or(true, |a| &r.affected == a))
                .filter(|r| match (slice.after, slice.direction) {
                    (None, _) => true,
                    (Some(c), Direction::Next) => r.cursor() < c,
                    (Some(c), Direction::Prev) => r.cursor() > c,
                })
                .cloned()
                .collect();
            rows.sort_by_key(|r| r.cursor());
            if slice.direction == Direction::Next {
                rows.reverse();
            }
            rows.truncate(slice.limit);
            Ok(rows)
        }

        fn base_rows(&self, keys: &[RowKey]) -> Result<Vec<EventRow>, QueryError> {
            let wanted: HashSet<&RowKey> = keys.iter().collect();
            Ok(self
                .rows
                .iter()
                .filter(|r| wanted.contains(&r.key()) && !self.lagging.contains(&r.key()))
                .map(enriched)
                .collect())
        }
    }

    fn config() -> QueryConfig {
        QueryConfig {
            default_limit: 25,
            max_limit: 250,
            initial_window: W,
            max_window: 16 * W,
            genesis_ts: 0,
        }
    }

    fn params(limit: usize) -> PageParams {
        PageParams {
            limit,
            direction: Direction::Next,
            anchor: None,
            before_ts: None,
            after_ts: None,
            filter: EventFilter::default(),
        }
    }

    #[test]
    fn test_sparse_head_doubles_window() {
        let now = 10_000;
        // nothing in [now-W+1, now] or the next 2W slice; 30 rows in the 4W slice
        let rows: Vec<ProjectionRow> = (0..30).map(|i| projection(now - 4 * W - i, 0)).collect();
        let store = MemoryStore::new(rows);

        let page = fetch_page(&store, &config(), &params(25), now).unwrap();
        assert_eq!(page.slices_scanned, 3);
        assert_eq!(store.projection_queries.get(), 3);
        assert_eq!(page.data.len(), 25);
        assert!(page.has_more);
        assert_eq!(page.data[0].block_timestamp, now - 4 * W);
        assert!(page.cursor.next.is_some());
        assert!(page.cursor.prev.is_none());
    }

    #[test]
    fn test_dense_head_costs_one_query() {
        let now = 10_000;
        let rows: Vec<ProjectionRow> = (0..40).map(|i| projection(now - i, 0)).collect();
        let store = MemoryStore::new(rows);
        let page = fetch_page(&store, &config(), &params(25), now).unwrap();
        assert_eq!(page.slices_scanned, 1);
        assert_eq!(page.data.len(), 25);
    }

    #[test]
    fn test_lagging_base_keeps_page_full() {
        let now = 10_000;
        let rows: Vec<ProjectionRow> = (0..26).map(|i| projection(now - i, 0)).collect();
        let mut store = MemoryStore::new(rows.clone());
        store.lagging.insert(rows[3].key());
        store.lagging.insert(rows[7].key());

        let page = fetch_page(&store, &config(), &params(25), now).unwrap();
        assert_eq!(page.data.len(), 25);
        assert!(page.has_more);
        let raw: Vec<u64> = page
            .data
            .iter()
            .filter(|r| !r.is_enriched())
            .map(|r| r.block_timestamp)
            .collect();
        assert_eq!(raw, vec![now - 3, now - 7]);
        let unique: HashSet<RowKey> = page.data.iter().map(EventRow::key).collect();
        assert_eq!(unique.len(), 25);
    }

    #[test]
    fn test_empty_store_stops_at_genesis() {
        let store = MemoryStore::new(Vec::new());
        let mut config = config();
        config.genesis_ts = 5_000;
        let page = fetch_page(&store, &config, &params(25), 10_000).unwrap();
        assert!(page.data.is_empty());
        assert!(!page.has_more);
        assert!(page.cursor.next.is_none());
        // widths 100, 200, 400, 800, 1600, 1600, then the last slice stops at genesis
        assert_eq!(page.slices_scanned, 7);
    }

    #[test]
    fn test_walk_forward_and_back() {
        let now = 100_000;
        let rows: Vec<ProjectionRow> = (0..60).map(|i| projection(1_000 + i * 37, 0)).collect();
        let store = MemoryStore::new(rows);
        let config = config();

        let first = fetch_page(&store, &config, &params(25), now).unwrap();
        let mut seen: Vec<u64> = first.data.iter().map(|r| r.block_timestamp).collect();

        let mut second_params = params(25);
        second_params.anchor = anchor_of(&first.cursor.next).unwrap();
        let second = fetch_page(&store, &config, &second_params, now).unwrap();
        assert_eq!(second.data.len(), 25);
        seen.extend(second.data.iter().map(|r| r.block_timestamp));

        let mut third_params = params(25);
        third_params.anchor = anchor_of(&second.cursor.next).unwrap();
        let third = fetch_page(&store, &config, &third_params, now).unwrap();
        assert_eq!(third.data.len(), 10);
        assert!(!third.has_more);
        assert!(third.cursor.next.is_none());
        seen.extend(third.data.iter().map(|r| r.block_timestamp));

        // every row once, newest first
        let mut expected: Vec<u64> = (0..60).map(|i| 1_000 + i * 37).collect();
        expected.reverse();
        assert_eq!(seen, expected);

        // back from the second page lands on the first
        let mut back = params(25);
        back.direction = Direction::Prev;
        back.anchor = anchor_of(&second.cursor.prev).unwrap();
        let again = fetch_page(&store, &config, &back, now).unwrap();
        assert_eq!(again.data, first.data);
        assert!(again.cursor.prev.is_none());
        assert_eq!(again.cursor.next, first.cursor.next);
    }

    #[test]
    fn test_cursor_outside_bounds_is_empty() {
        let store = MemoryStore::new((0..5).map(|i| projection(6_000 + i, 0)).collect());
        let mut config = config();
        config.genesis_ts = 5_000;

        let mut p = params(10);
        p.anchor = Some(Cursor {
            ts: 4_000,
            shard: 0,
            kind: 1,
            pos: 0,
        });
        let page = fetch_page(&store, &config, &p, 10_000).unwrap();
        assert!(page.data.is_empty());
        assert_eq!(store.projection_queries.get(), 0);

        let mut bounded = params(10);
        bounded.after_ts = Some(6_001);
        bounded.before_ts = Some(6_004);
        let page = fetch_page(&store, &config, &bounded, 10_000).unwrap();
        let ts: Vec<u64> = page.data.iter().map(|r| r.block_timestamp).collect();
        assert_eq!(ts, vec![6_003, 6_002]);
    }
}
