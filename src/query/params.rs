//! Caller-facing parameters and their validation.

use crate::decoder::EventCause;
use crate::query::config::QueryConfig;
use crate::query::cursor::Cursor;
use crate::query::error::QueryError;
use serde::Deserialize;

/// Raw request, as an HTTP layer or the CLI would hand it over.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageRequest {
    pub limit: Option<usize>,
    /// Alias of `next`.
    pub cursor: Option<String>,
    pub next: Option<String>,
    pub prev: Option<String>,
    pub before_ts: Option<u64>,
    pub after_ts: Option<u64>,
    pub contract: Option<String>,
    pub account: Option<String>,
    pub cause: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Older rows, newest first.
    Next,
    /// Newer rows than the anchor, walked oldest first.
    Prev,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    pub contract: Option<String>,
    pub account: Option<String>,
    pub cause: Option<EventCause>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageParams {
    pub limit: usize,
    pub direction: Direction,
    pub anchor: Option<Cursor>,
    /// Exclusive upper timestamp bound.
    pub before_ts: Option<u64>,
    /// Exclusive lower timestamp bound.
    pub after_ts: Option<u64>,
    pub filter: EventFilter,
}

impl PageParams {
    pub fn from_request(request: &PageRequest, config: &QueryConfig) -> Result<Self, QueryError> {
        let limit = match request.limit {
            None => config.default_limit,
            Some(0) => return Err(QueryError::InvalidParams("limit must be positive".to_string())),
            Some(limit) => limit.min(config.max_limit),
        };

        let next = request.next.as_ref().or(request.cursor.as_ref());
        if request.next.is_some() && request.cursor.is_some() {
            return Err(QueryError::InvalidParams(
                "cursor and next are the same parameter".to_string(),
            ));
        }
        let (direction, anchor) = match (next, request.prev.as_ref()) {
            (Some(_), Some(_)) => {
                return Err(QueryError::InvalidParams(
                    "next and prev are mutually exclusive".to_string(),
                ))
            }
            (Some(token), None) => (Direction::Next, Some(Cursor::decode(token)?)),
            (None, Some(token)) => (Direction::Prev, Some(Cursor::decode(token)?)),
            (None, None) => (Direction::Next, None),
        };

        if let (Some(before), Some(after)) = (request.before_ts, request.after_ts) {
            if before <= after {
                return Err(QueryError::InvalidParams(format!(
                    "before_ts {} must be greater than after_ts {}",
                    before, after
                )));
            }
        }

        let cause = match request.cause.as_deref() {
            Some(raw) => Some(
                EventCause::from_str(raw)
                    .ok_or_else(|| QueryError::InvalidParams(format!("unknown cause '{}'", raw)))?,
            ),
            None => None,
        };

        Ok(Self {
            limit,
            direction,
            anchor,
            before_ts: request.before_ts,
            after_ts: request.after_ts,
            filter: EventFilter {
                contract: request.contract.clone(),
                account: request.account.clone(),
                cause,
            },
        })
    }
}
