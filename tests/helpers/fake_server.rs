use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::test_helpers::factories::{ReplyEncoding, ReplyFactory};
use crate::wire::{
    AsyncConnectionFactory, AsyncTransport, Command, ConnectionFactory, RespValue, Transport,
    TransportError,
};

/// One command as the fake server saw it, tagged with the connection it came in on.
#[derive(Debug, Clone)]
pub struct LoggedCommand {
    pub conn: usize,
    pub args: Vec<String>,
}

impl LoggedCommand {
    /// `FT.AGGREGATE`, `FT.CURSOR READ`, `FT.CURSOR DEL`, ...
    pub fn name(&self) -> String {
        match self.args.as_slice() {
            [verb, sub, ..] if verb.eq_ignore_ascii_case("FT.CURSOR") => {
                format!("FT.CURSOR {}", sub.to_ascii_uppercase())
            }
            [verb, ..] => verb.to_ascii_uppercase(),
            [] => String::new(),
        }
    }

    /// The grouped field of an `FT.AGGREGATE`, without `@`.
    pub fn field(&self) -> Option<&str> {
        arg_after(&self.args, "GROUPBY", 2).map(|f| f.trim_start_matches('@'))
    }

    pub fn has(&self, token: &str) -> bool {
        self.args.iter().any(|a| a.eq_ignore_ascii_case(token))
    }
}

#[derive(Debug)]
struct OpenCursor {
    owner: usize,
    field: String,
    remaining: VecDeque<(String, i64)>,
}

#[derive(Debug)]
struct ServerState {
    index: String,
    histograms: IndexMap<String, Vec<(String, i64)>>,
    encoding: ReplyEncoding,
    paginate: bool,
    lingering: bool,
    broken_fields: HashSet<String>,
    broken_reads: HashSet<String>,
    refuse_connections: bool,
    info_replies: VecDeque<RespValue>,
    cursors: HashMap<u64, OpenCursor>,
    next_cursor: u64,
    next_conn: usize,
    open_conns: usize,
    log: Vec<LoggedCommand>,
}

/// In-memory stand-in for a search server holding one index.
///
/// Each field's histogram is given directly as `(value, count)` groups, so the
/// server only has to sort, truncate and paginate them. Cursors belong to the
/// connection that created them.
#[derive(Debug, Clone)]
pub struct FakeSearchServer {
    state: Arc<Mutex<ServerState>>,
}

impl FakeSearchServer {
    pub fn new(index: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState {
                index: index.to_string(),
                histograms: IndexMap::new(),
                encoding: ReplyEncoding::MapExtra,
                paginate: true,
                lingering: false,
                broken_fields: HashSet::new(),
                broken_reads: HashSet::new(),
                refuse_connections: false,
                info_replies: VecDeque::new(),
                cursors: HashMap::new(),
                next_cursor: 1001,
                next_conn: 0,
                open_conns: 0,
                log: Vec::new(),
            })),
        }
    }

    pub fn with_field(self, field: &str, groups: &[(&str, i64)]) -> Self {
        let groups = groups.iter().map(|(v, c)| (v.to_string(), *c)).collect();
        self.with_groups(field, groups)
    }

    pub fn with_groups(self, field: &str, groups: Vec<(String, i64)>) -> Self {
        self.state.lock().histograms.insert(field.to_string(), groups);
        self
    }

    pub fn encoding(self, encoding: ReplyEncoding) -> Self {
        self.state.lock().encoding = encoding;
        self
    }

    /// `WITHCURSOR` requests get an empty page and cursor 0.
    pub fn without_pagination(self) -> Self {
        self.state.lock().paginate = false;
        self
    }

    /// Cursors stay open after their last rows and answer further reads with
    /// empty pages until deleted.
    pub fn lingering_cursors(self) -> Self {
        self.state.lock().lingering = true;
        self
    }

    pub fn failing_field(self, field: &str) -> Self {
        self.state.lock().broken_fields.insert(field.to_string());
        self
    }

    pub fn failing_reads(self, field: &str) -> Self {
        self.state.lock().broken_reads.insert(field.to_string());
        self
    }

    pub fn refusing_connections(self) -> Self {
        self.state.lock().refuse_connections = true;
        self
    }

    /// Queues one `FT.INFO` answer; once the queue is empty the index reports ready.
    pub fn push_info(&self, percent: f64, indexing: i64) {
        let mut state = self.state.lock();
        let reply = state.info_reply(percent, indexing);
        state.info_replies.push_back(reply);
    }

    pub fn histogram(&self, field: &str) -> Vec<(String, i64)> {
        self.state
            .lock()
            .histograms
            .get(field)
            .cloned()
            .unwrap_or_default()
    }

    pub fn commands(&self) -> Vec<LoggedCommand> {
        self.state.lock().log.clone()
    }

    pub fn commands_named(&self, name: &str) -> Vec<LoggedCommand> {
        self.commands()
            .into_iter()
            .filter(|cmd| cmd.name() == name)
            .collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.commands_named(name).len()
    }

    pub fn clear_log(&self) {
        self.state.lock().log.clear();
    }

    pub fn open_cursors(&self) -> usize {
        self.state.lock().cursors.len()
    }

    pub fn connections_opened(&self) -> usize {
        self.state.lock().next_conn
    }

    pub fn open_connections(&self) -> usize {
        self.state.lock().open_conns
    }

    pub fn open(&self) -> Result<FakeConnection, TransportError> {
        let mut state = self.state.lock();
        if state.refuse_connections {
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused).into());
        }
        let id = state.next_conn;
        state.next_conn += 1;
        state.open_conns += 1;
        Ok(FakeConnection {
            state: Arc::clone(&self.state),
            id,
            closed: false,
        })
    }

    /// Serves the same state over TCP on an ephemeral local port. Replies are
    /// RESP2 framed until a client switches to RESP3 with `HELLO 3`.
    pub fn serve_tcp(&self) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake server");
        let addr = listener.local_addr().expect("fake server address");
        let server = self.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else {
                    break;
                };
                let server = server.clone();
                thread::spawn(move || server.serve_stream(stream));
            }
        });
        addr
    }

    fn serve_stream(&self, stream: TcpStream) {
        let Ok(mut conn) = self.open() else {
            return;
        };
        let Ok(write_half) = stream.try_clone() else {
            return;
        };
        let mut reader = BufReader::new(stream);
        let mut writer = BufWriter::new(write_half);
        let mut resp3 = false;

        while let Ok(Some(args)) = read_request(&mut reader) {
            if args.first().is_some_and(|v| v.eq_ignore_ascii_case("HELLO")) {
                resp3 = args.get(1).is_some_and(|p| p == "3");
            }
            let reply = self.state.lock().handle(conn.id, &args);
            let mut out = Vec::new();
            encode_reply(&reply, resp3, &mut out);
            if writer.write_all(&out).is_err() {
                break;
            }
            // replies to a pipeline go out together once its last command is read
            if reader.buffer().is_empty() && writer.flush().is_err() {
                break;
            }
        }
        conn.shutdown();
    }
}

impl ServerState {
    fn handle(&mut self, conn: usize, args: &[String]) -> RespValue {
        self.log.push(LoggedCommand {
            conn,
            args: args.to_vec(),
        });

        let verb = args.first().map(|v| v.to_ascii_uppercase()).unwrap_or_default();
        match verb.as_str() {
            "HELLO" => RespValue::Map(vec![
                (RespValue::bulk("server"), RespValue::bulk("fake")),
                (
                    RespValue::bulk("proto"),
                    RespValue::Int(args.get(1).and_then(|p| p.parse().ok()).unwrap_or(2)),
                ),
            ]),
            "AUTH" | "SELECT" | "CLIENT" => RespValue::simple("OK"),
            "PING" => RespValue::simple("PONG"),
            "FT.INFO" => self.info(args),
            "FT.AGGREGATE" => self.aggregate(conn, args),
            "FT.CURSOR" => match args.get(1).map(|s| s.to_ascii_uppercase()).as_deref() {
                Some("READ") => self.read(conn, args),
                Some("DEL") => self.del(args),
                _ => error("ERR unknown FT.CURSOR subcommand"),
            },
            _ => error(&format!("ERR unknown command '{verb}'")),
        }
    }

    fn aggregate(&mut self, conn: usize, args: &[String]) -> RespValue {
        if args.get(1) != Some(&self.index) {
            return error(&format!("{}: no such index", args.get(1).map_or("", |s| s)));
        }
        let Some(field) = arg_after(args, "GROUPBY", 2).map(|f| f.trim_start_matches('@').to_string())
        else {
            return error("ERR syntax error");
        };
        if self.broken_fields.contains(&field) {
            return error(&format!("Property `{field}` not loaded nor in schema"));
        }

        let mut groups = self.histograms.get(&field).cloned().unwrap_or_default();
        if args.iter().any(|a| a == "SORTBY") {
            groups.sort_by(|a, b| b.1.cmp(&a.1));
        }
        if let Some(max) = arg_after(args, "MAX", 1).and_then(|m| m.parse().ok()) {
            groups.truncate(max);
        }

        let Some(pos) = args.iter().position(|a| a == "WITHCURSOR") else {
            return self.page(&field, &groups).create();
        };
        if !self.paginate {
            return self.page(&field, &[]).cursor(0).create();
        }
        let batch = match (args.get(pos + 1), args.get(pos + 2)) {
            (Some(count), Some(n)) if count == "COUNT" => n.parse().unwrap_or(1000),
            _ => 1000,
        };

        let mut remaining: VecDeque<(String, i64)> = groups.into();
        let rows = take(&mut remaining, batch);
        let id = if remaining.is_empty() && !self.lingering {
            0
        } else {
            let id = self.next_cursor;
            self.next_cursor += 1;
            self.cursors.insert(
                id,
                OpenCursor {
                    owner: conn,
                    field: field.clone(),
                    remaining,
                },
            );
            id
        };
        self.page(&field, &rows).cursor(id).create()
    }

    fn read(&mut self, conn: usize, args: &[String]) -> RespValue {
        let id: u64 = args.get(3).and_then(|id| id.parse().ok()).unwrap_or(0);
        let batch = arg_after(args, "COUNT", 1)
            .and_then(|n| n.parse().ok())
            .unwrap_or(1000);

        let (field, rows, drained) = match self.cursors.get_mut(&id) {
            Some(cursor) if cursor.owner == conn => {
                if self.broken_reads.contains(&cursor.field) {
                    return error("Timeout limit was reached");
                }
                let rows = take(&mut cursor.remaining, batch);
                (cursor.field.clone(), rows, cursor.remaining.is_empty())
            }
            _ => return error("Cursor not found"),
        };

        let next = if drained && !self.lingering {
            self.cursors.remove(&id);
            0
        } else {
            id
        };
        self.page(&field, &rows).without_columns().cursor(next).create()
    }

    fn del(&mut self, args: &[String]) -> RespValue {
        let id: u64 = args.get(3).and_then(|id| id.parse().ok()).unwrap_or(0);
        match self.cursors.remove(&id) {
            Some(_) => RespValue::simple("OK"),
            None => error("Cursor does not exist"),
        }
    }

    fn info(&mut self, args: &[String]) -> RespValue {
        if args.get(1) != Some(&self.index) {
            return error("Unknown index name");
        }
        match self.info_replies.pop_front() {
            Some(reply) => reply,
            None => self.info_reply(1.0, 0),
        }
    }

    fn info_reply(&self, percent: f64, indexing: i64) -> RespValue {
        let docs: i64 = self
            .histograms
            .values()
            .next()
            .map_or(0, |groups| groups.iter().map(|(_, c)| c).sum());
        let entries = vec![
            (RespValue::bulk("index_name"), RespValue::bulk(&self.index)),
            (RespValue::bulk("num_docs"), RespValue::Int(docs)),
            (RespValue::bulk("indexing"), RespValue::Int(indexing)),
            (RespValue::bulk("percent_indexed"), RespValue::Double(percent)),
        ];
        if self.encoding.is_map() {
            return RespValue::Map(entries);
        }
        RespValue::Array(
            entries
                .into_iter()
                .flat_map(|(k, v)| {
                    let v = match v {
                        RespValue::Double(d) => RespValue::bulk(d.to_string()),
                        other => other,
                    };
                    [k, v]
                })
                .collect(),
        )
    }

    fn page(&self, field: &str, rows: &[(String, i64)]) -> ReplyFactory {
        ReplyFactory::new()
            .encoding(self.encoding)
            .field(field)
            .rows(rows)
    }
}

/// A connection handed out by [`FakeSearchServer`]. It is counted as open
/// until closed; dropping it does not close it.
#[derive(Debug)]
pub struct FakeConnection {
    state: Arc<Mutex<ServerState>>,
    id: usize,
    closed: bool,
}

impl FakeConnection {
    pub fn id(&self) -> usize {
        self.id
    }

    fn respond(&mut self, cmd: &Command) -> Result<RespValue, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        Ok(self.state.lock().handle(self.id, cmd.args()))
    }

    fn shutdown(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.lock().open_conns -= 1;
        }
    }
}

impl Transport for FakeConnection {
    fn send(&mut self, cmd: &Command) -> Result<RespValue, TransportError> {
        self.respond(cmd)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.shutdown();
        Ok(())
    }
}

#[async_trait]
impl AsyncTransport for FakeConnection {
    async fn send(&mut self, cmd: &Command) -> Result<RespValue, TransportError> {
        tokio::task::yield_now().await;
        self.respond(cmd)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.shutdown();
        Ok(())
    }
}

impl ConnectionFactory for FakeSearchServer {
    type Conn = FakeConnection;

    fn connect(&self) -> Result<FakeConnection, TransportError> {
        self.open()
    }
}

#[async_trait]
impl AsyncConnectionFactory for FakeSearchServer {
    type Conn = FakeConnection;

    async fn connect(&self) -> Result<FakeConnection, TransportError> {
        tokio::task::yield_now().await;
        self.open()
    }
}

fn error(msg: &str) -> RespValue {
    RespValue::Error(msg.to_string())
}

fn arg_after<'a>(args: &'a [String], token: &str, offset: usize) -> Option<&'a str> {
    let pos = args.iter().position(|a| a.eq_ignore_ascii_case(token))?;
    args.get(pos + offset).map(String::as_str)
}

fn take(queue: &mut VecDeque<(String, i64)>, n: usize) -> Vec<(String, i64)> {
    let n = n.min(queue.len());
    queue.drain(..n).collect()
}

/// Reads one command, sent as an array of bulk strings. `None` at end of stream.
fn read_request(reader: &mut impl BufRead) -> io::Result<Option<Vec<String>>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let count = header(&line, '*')?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_line(&mut line)?;
        let len = header(&line, '$')?;
        let mut payload = vec![0u8; len + 2];
        reader.read_exact(&mut payload)?;
        payload.truncate(len);
        args.push(String::from_utf8_lossy(&payload).into_owned());
    }
    Ok(Some(args))
}

fn header(line: &str, tag: char) -> io::Result<usize> {
    line.trim_end()
        .strip_prefix(tag)
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, format!("bad header {line:?}")))
}

/// RESP3 framing when `resp3`, otherwise the RESP2 rendering of the same value.
fn encode_reply(value: &RespValue, resp3: bool, out: &mut Vec<u8>) {
    match value {
        RespValue::Nil if resp3 => out.extend_from_slice(b"_\r\n"),
        RespValue::Nil => out.extend_from_slice(b"$-1\r\n"),
        RespValue::Simple(s) => out.extend_from_slice(format!("+{s}\r\n").as_bytes()),
        RespValue::Error(s) => out.extend_from_slice(format!("-{s}\r\n").as_bytes()),
        RespValue::Int(i) => out.extend_from_slice(format!(":{i}\r\n").as_bytes()),
        RespValue::Double(d) if resp3 => out.extend_from_slice(format!(",{d}\r\n").as_bytes()),
        RespValue::Bool(b) if resp3 => {
            out.extend_from_slice(if *b { b"#t\r\n" } else { b"#f\r\n" })
        }
        RespValue::Bool(b) => out.extend_from_slice(format!(":{}\r\n", i64::from(*b)).as_bytes()),
        RespValue::BigNumber(s) if resp3 => out.extend_from_slice(format!("({s}\r\n").as_bytes()),
        RespValue::Bulk(bytes) => {
            out.extend_from_slice(format!("${}\r\n", bytes.len()).as_bytes());
            out.extend_from_slice(bytes);
            out.extend_from_slice(b"\r\n");
        }
        RespValue::Verbatim(s) if resp3 => {
            out.extend_from_slice(format!("={}\r\ntxt:{s}\r\n", s.len() + 4).as_bytes());
        }
        RespValue::Double(_) | RespValue::BigNumber(_) | RespValue::Verbatim(_) => {
            let text = value.to_text().unwrap_or_default();
            encode_reply(&RespValue::bulk(text), resp3, out);
        }
        RespValue::Array(items) | RespValue::Set(items) | RespValue::Push(items) => {
            let tag = match value {
                RespValue::Set(_) if resp3 => '~',
                RespValue::Push(_) if resp3 => '>',
                _ => '*',
            };
            out.extend_from_slice(format!("{tag}{}\r\n", items.len()).as_bytes());
            for item in items {
                encode_reply(item, resp3, out);
            }
        }
        RespValue::Map(entries) => {
            if resp3 {
                out.extend_from_slice(format!("%{}\r\n", entries.len()).as_bytes());
            } else {
                out.extend_from_slice(format!("*{}\r\n", entries.len() * 2).as_bytes());
            }
            for (k, v) in entries {
                encode_reply(k, resp3, out);
                encode_reply(v, resp3, out);
            }
        }
    }
}
