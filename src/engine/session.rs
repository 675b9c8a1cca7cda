use tracing::{debug, trace};

use crate::engine::errors::AggError;
use crate::engine::normalize::{parse_initial, parse_read, parse_rows};
use crate::engine::request;
use crate::engine::types::{AggregationRequest, CursorHandle, FieldResult, FieldSpec, Row, ValueCount};
use crate::wire::{Command, RespValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Active,
    Capped,
    Exhausted,
    Closed,
    Failed,
}

/// Pagination state for one field's cursor.
///
/// The session never performs I/O: drivers ask it for the next command, send
/// it however their strategy sends things, and feed the reply back.
#[derive(Debug)]
pub struct CursorSession<'a> {
    request: &'a AggregationRequest,
    field: &'a FieldSpec,
    handle: CursorHandle,
    columns: Option<Vec<String>>,
    results: FieldResult,
    state: SessionState,
    pages: usize,
    fallback_sent: bool,
    error: Option<AggError>,
}

/// What a field produced once its driver is done with it.
#[derive(Debug)]
pub struct FieldReport {
    pub field: String,
    pub outcome: Result<FieldResult, AggError>,
    pub pages: usize,
}

impl<'a> CursorSession<'a> {
    pub fn new(request: &'a AggregationRequest, field: &'a FieldSpec) -> Self {
        Self {
            request,
            field,
            handle: CursorHandle::EXHAUSTED,
            columns: None,
            results: Vec::new(),
            state: SessionState::Created,
            pages: 0,
            fallback_sent: false,
            error: None,
        }
    }

    pub fn field(&self) -> &FieldSpec {
        self.field
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn handle(&self) -> CursorHandle {
        self.handle
    }

    pub(crate) fn results(&self) -> &[ValueCount] {
        &self.results
    }

    pub(crate) fn pages(&self) -> usize {
        self.pages
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub(crate) fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn initial_command(&self) -> Command {
        request::with_cursor(self.request, self.field)
    }

    pub fn on_initial(&mut self, reply: RespValue) {
        if let Some(err) = server_error(&reply) {
            self.fail(err);
            return;
        }

        let page = parse_initial(&reply);
        self.pages += 1;
        self.columns = page.columns;
        self.handle = page.cursor;

        if self.absorb(&page.rows) {
            self.state = SessionState::Capped;
        } else if page.cursor.is_exhausted() {
            self.state = SessionState::Exhausted;
        } else {
            self.state = SessionState::Active;
        }
        trace!(
            target: "rqe::session",
            field = %self.field,
            cursor = %self.handle,
            rows = page.rows.len(),
            state = ?self.state,
            "Initial page"
        );
    }

    /// The `CURSOR READ` to send next, if the cursor is still live.
    pub fn next_read(&self) -> Option<Command> {
        self.is_active()
            .then(|| request::cursor_read(self.request, self.handle))
    }

    pub fn on_page(&mut self, reply: RespValue) {
        if let Some(err) = server_error(&reply) {
            self.fail(err);
            return;
        }

        let page = parse_read(&reply, self.columns.as_deref());
        if page.columns.is_some() {
            self.columns = page.columns;
        }
        if page.cursor == Some(CursorHandle::EXHAUSTED) {
            // nothing left server-side: the cursor is already gone
            self.handle = CursorHandle::EXHAUSTED;
        }

        if page.rows.is_empty() {
            self.state = SessionState::Exhausted;
        } else {
            self.pages += 1;
            if self.absorb(&page.rows) {
                self.state = SessionState::Capped;
            } else if self.handle.is_exhausted() {
                self.state = SessionState::Exhausted;
            } else if let Some(next) = page.cursor {
                self.handle = next;
            }
        }
        trace!(
            target: "rqe::session",
            field = %self.field,
            cursor = %self.handle,
            rows = page.rows.len(),
            state = ?self.state,
            "Read page"
        );
    }

    /// The `CURSOR DEL` owed for a still-held handle. Moves the session to Closed.
    pub fn close_command(&mut self) -> Option<Command> {
        if self.is_active() {
            return None;
        }
        let handle = std::mem::take(&mut self.handle);
        if self.state != SessionState::Failed {
            self.state = SessionState::Closed;
        }
        (!handle.is_exhausted()).then(|| request::cursor_del(self.request, handle))
    }

    /// Finished cleanly without a single ValueCount.
    ///
    /// The trigger is per field: each empty session retries on its own, even
    /// when other fields of the same call did receive rows.
    pub fn needs_fallback(&self) -> bool {
        !self.fallback_sent
            && self.error.is_none()
            && self.results.is_empty()
            && matches!(
                self.state,
                SessionState::Exhausted | SessionState::Capped | SessionState::Closed
            )
    }

    pub fn fallback_command(&mut self) -> Command {
        self.fallback_sent = true;
        request::fallback(self.request, self.field)
    }

    pub fn on_fallback(&mut self, reply: RespValue) {
        if let Some(err) = server_error(&reply) {
            self.fail(err);
            return;
        }
        let rows = parse_rows(&reply);
        self.results = collect_counts(self.request, self.field, &rows);
        debug!(
            target: "rqe::session",
            field = %self.field,
            groups = self.results.len(),
            "Accepted non-paginated fallback"
        );
    }

    /// Records a failure. A handle still held is kept so it can be DEL'd.
    pub fn fail(&mut self, err: AggError) {
        debug!(target: "rqe::session", field = %self.field, error = %err, "Session failed");
        self.state = SessionState::Failed;
        self.error.get_or_insert(err);
    }

    pub fn into_report(self) -> FieldReport {
        FieldReport {
            field: self.field.plain.clone(),
            outcome: match self.error {
                Some(err) => Err(err),
                None => Ok(self.results),
            },
            pages: self.pages,
        }
    }

    /// Appends ValueCounts from `rows`; true once the cap is hit.
    fn absorb(&mut self, rows: &[Row]) -> bool {
        let plain = &self.field.plain;
        for vc in rows.iter().filter_map(|row| ValueCount::from_row(row, plain)) {
            self.results.push(vc);
            if self.request.cap_reached(self.results.len()) {
                return true;
            }
        }
        false
    }
}

impl FieldReport {
    pub fn failed(field: &FieldSpec, err: AggError) -> Self {
        Self {
            field: field.plain.clone(),
            outcome: Err(err),
            pages: 0,
        }
    }

    /// Report for a top-N reply: its rows, no cursor involved.
    pub fn top_n(request: &AggregationRequest, field: &FieldSpec, reply: RespValue) -> Self {
        let outcome = match server_error(&reply) {
            Some(err) => Err(err),
            None => Ok(collect_counts(request, field, &parse_rows(&reply))),
        };
        Self {
            field: field.plain.clone(),
            outcome,
            pages: 1,
        }
    }
}

fn collect_counts(request: &AggregationRequest, field: &FieldSpec, rows: &[Row]) -> FieldResult {
    let limit = request.max_groups_per_field().unwrap_or(usize::MAX);
    rows.iter()
        .filter_map(|row| ValueCount::from_row(row, &field.plain))
        .take(limit)
        .collect()
}

fn server_error(reply: &RespValue) -> Option<AggError> {
    match reply {
        RespValue::Error(msg) => Some(AggError::Server(msg.clone())),
        _ => None,
    }
}
