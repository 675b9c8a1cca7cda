//! Turns aggregation replies into rows.
//!
//! Two encodings reach us. RESP3 servers send a map with `attributes`,
//! `results` (each entry holding `extra_attributes` and/or positional
//! `values`) and `cursor`. RESP2 servers send a flat array: a leading row count
//! followed by one `[k, v, k, v, ...]` array per row, with the cursor id found
//! after a `cursor` token. Cursor replies may also arrive wrapped as
//! `[page, cursor_id]`. The shape alone decides which path runs.

use crate::engine::types::{CursorHandle, Row};
use crate::wire::RespValue;

/// First page of a cursor (or the only page of a non-cursor request).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitialPage {
    pub rows: Vec<Row>,
    pub cursor: CursorHandle,
    pub columns: Option<Vec<String>>,
}

/// A continuation page. `cursor` is `None` when the reply carries no cursor id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadPage {
    pub rows: Vec<Row>,
    pub cursor: Option<CursorHandle>,
    pub columns: Option<Vec<String>>,
}

pub fn parse_initial(reply: &RespValue) -> InitialPage {
    let page = parse_page(reply, None);
    InitialPage {
        rows: page.rows,
        cursor: page.cursor.unwrap_or_default(),
        columns: page.columns,
    }
}

pub fn parse_read(reply: &RespValue, cached: Option<&[String]>) -> ReadPage {
    parse_page(reply, cached)
}

/// Rows of a reply that never carries a cursor (top-N and fallback requests).
pub fn parse_rows(reply: &RespValue) -> Vec<Row> {
    parse_page(reply, None).rows
}

fn parse_page(reply: &RespValue, cached: Option<&[String]>) -> ReadPage {
    if let Some((inner, cursor)) = unwrap_cursor_pair(reply) {
        let mut page = parse_page(inner, cached);
        page.cursor = Some(CursorHandle::from_reply(cursor));
        return page;
    }

    match reply {
        RespValue::Map(_) => map_page(reply, cached),
        other => flat_page(other),
    }
}

/// Recognises `[page, cursor_id]`, where `page` is itself a map or an array.
fn unwrap_cursor_pair(reply: &RespValue) -> Option<(&RespValue, &RespValue)> {
    match reply.as_array()? {
        [inner @ (RespValue::Map(_) | RespValue::Array(_)), cursor] if cursor.as_int().is_some() => {
            Some((inner, cursor))
        }
        _ => None,
    }
}

fn map_page(reply: &RespValue, cached: Option<&[String]>) -> ReadPage {
    let observed: Option<Vec<String>> = reply
        .get("attributes")
        .and_then(RespValue::as_array)
        .filter(|attrs| !attrs.is_empty())
        .map(|attrs| attrs.iter().map(column_name).collect());

    let columns = observed.as_deref().or(cached);
    let rows = reply
        .get("results")
        .and_then(RespValue::as_array)
        .unwrap_or_default()
        .iter()
        .map(|entry| map_row(entry, columns))
        .collect();

    ReadPage {
        rows,
        cursor: reply.get("cursor").map(CursorHandle::from_reply),
        columns: observed,
    }
}

fn map_row(entry: &RespValue, columns: Option<&[String]>) -> Row {
    let mut row = Row::new();
    if let Some(extra) = entry.get("extra_attributes").and_then(RespValue::as_map) {
        for (k, v) in extra {
            row.insert(column_name(k), v.clone());
        }
    }
    if let (Some(columns), Some(values)) = (columns, entry.get("values").and_then(RespValue::as_array))
    {
        for (name, v) in columns.iter().zip(values) {
            row.insert(name.clone(), v.clone());
        }
    }
    row
}

fn flat_page(reply: &RespValue) -> ReadPage {
    let Some(items) = reply.as_array() else {
        return ReadPage::default();
    };

    let rows = items
        .iter()
        .skip(1)
        .filter_map(RespValue::as_array)
        .map(|tokens| {
            tokens
                .chunks_exact(2)
                .map(|pair| (column_name(&pair[0]), pair[1].clone()))
                .collect::<Row>()
        })
        .collect();

    ReadPage {
        rows,
        cursor: scan_cursor_token(items),
        columns: None,
    }
}

/// Finds a top-level `cursor` token and reads the id that follows it.
fn scan_cursor_token(items: &[RespValue]) -> Option<CursorHandle> {
    let pos = items.iter().position(|tok| tok.text_eq_ignore_case("cursor"))?;
    Some(
        items
            .get(pos + 1)
            .map_or(CursorHandle::EXHAUSTED, CursorHandle::from_reply),
    )
}

fn column_name(value: &RespValue) -> String {
    let name = value.to_text().unwrap_or_default();
    name.trim_start_matches('@').to_string()
}
