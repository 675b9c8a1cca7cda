use crate::engine::types::{AggregationRequest, CursorHandle, FieldSpec};
use crate::wire::Command;

/// `FT.AGGREGATE ... SORTBY 2 @count DESC MAX <n>`: one bounded page.
pub fn top_n(req: &AggregationRequest, field: &FieldSpec, n: usize) -> Command {
    let mut cmd = group_by_count(req, field);
    cmd = cmd.arg("SORTBY").arg(2).arg("@count").arg("DESC").arg("MAX").arg(n);
    finish(req, cmd)
}

/// `FT.AGGREGATE ... WITHCURSOR COUNT <batch> [SORTBY 2 @count DESC]`.
pub fn with_cursor(req: &AggregationRequest, field: &FieldSpec) -> Command {
    let mut cmd = group_by_count(req, field)
        .arg("WITHCURSOR")
        .arg("COUNT")
        .arg(req.batch_size());
    cmd = sort_by_count(req, cmd);
    finish(req, cmd)
}

/// Same as [`with_cursor`] minus `WITHCURSOR`, for servers that refuse to paginate.
pub fn fallback(req: &AggregationRequest, field: &FieldSpec) -> Command {
    let cmd = sort_by_count(req, group_by_count(req, field));
    finish(req, cmd)
}

pub fn cursor_read(req: &AggregationRequest, handle: CursorHandle) -> Command {
    Command::new("FT.CURSOR")
        .arg("READ")
        .arg(req.index())
        .arg(handle)
        .arg("COUNT")
        .arg(req.batch_size())
}

pub fn cursor_del(req: &AggregationRequest, handle: CursorHandle) -> Command {
    Command::new("FT.CURSOR")
        .arg("DEL")
        .arg(req.index())
        .arg(handle)
}

pub fn index_info(index: &str) -> Command {
    Command::new("FT.INFO").arg(index)
}

fn group_by_count(req: &AggregationRequest, field: &FieldSpec) -> Command {
    Command::new("FT.AGGREGATE")
        .arg(req.index())
        .arg(req.query())
        .arg("GROUPBY")
        .arg(1)
        .arg(&field.at)
        .arg("REDUCE")
        .arg("COUNT")
        .arg(0)
        .arg("AS")
        .arg("count")
}

fn sort_by_count(req: &AggregationRequest, cmd: Command) -> Command {
    if req.sort_desc() {
        cmd.arg("SORTBY").arg(2).arg("@count").arg("DESC")
    } else {
        cmd
    }
}

fn finish(req: &AggregationRequest, mut cmd: Command) -> Command {
    if let Some(ms) = req.timeout_ms() {
        cmd = cmd.arg("TIMEOUT").arg(ms);
    }
    cmd.arg("DIALECT").arg(req.dialect())
}
