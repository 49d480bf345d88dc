use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::core::error::{MonitorError, ParseError};
use crate::core::models::session::{SessionRecord, TokenCounts};
use crate::core::models::window::LookbackWindow;

// ── Session log structs ───────────────────────────────────────────────

#[derive(Deserialize)]
struct LogEntry {
    timestamp: Option<String>,
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
    #[serde(rename = "requestId")]
    request_id: Option<String>,
    message: Option<LogMessage>,
}

#[derive(Deserialize)]
struct LogMessage {
    id: Option<String>,
    model: Option<String>,
    usage: Option<LogUsage>,
    /// Either a plain string or a list of content blocks.
    content: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct LogUsage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
    cache_creation_input_tokens: Option<u64>,
    cache_read_input_tokens: Option<u64>,
}

impl LogUsage {
    fn counts(&self) -> TokenCounts {
        TokenCounts {
            input_tokens: self.input_tokens.unwrap_or(0),
            output_tokens: self.output_tokens.unwrap_or(0),
            cache_creation_tokens: self.cache_creation_input_tokens.unwrap_or(0),
            cache_read_tokens: self.cache_read_input_tokens.unwrap_or(0),
        }
    }
}

// ── Scan result ───────────────────────────────────────────────────────

/// Everything the reader learned from one pass over the sessions directory.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    /// Sorted by session file path.
    pub records: Vec<SessionRecord>,
    /// Session files found in the directory (before any filtering).
    pub files_seen: usize,
    /// Files not opened because they were last modified before the window.
    pub files_outside_window: usize,
    pub parse_errors: Vec<ParseError>,
}

impl ScanOutcome {
    pub fn skipped_files(&self) -> usize {
        self.parse_errors.len()
    }
}

// ── Per-file accumulation ─────────────────────────────────────────────

/// Usage of one assistant message plus the tools and agents it invoked.
struct MessageUsage {
    model: String,
    usage: TokenCounts,
    tools: Vec<String>,
    agents: Vec<String>,
}

/// Folds in-window entries of one session file into a `SessionRecord`.
#[derive(Default)]
struct SessionAccumulator {
    session_id: Option<String>,
    earliest: Option<DateTime<Utc>>,
    saw_entry: bool,
    /// Streaming chunks repeat usage per (message id, request id); last one wins.
    keyed_usage: HashMap<(String, String), MessageUsage>,
    loose_usage: Vec<MessageUsage>,
    tool_calls: BTreeMap<String, u64>,
    agent_invocations: BTreeMap<String, u64>,
}

impl SessionAccumulator {
    fn add(&mut self, entry: LogEntry, window: &LookbackWindow, now: DateTime<Utc>) {
        let timestamp = entry.timestamp.as_deref().and_then(parse_timestamp);
        if let Some(ts) = timestamp {
            if ts < window.cutoff() || ts > now {
                return;
            }
            self.earliest = Some(self.earliest.map_or(ts, |e| e.min(ts)));
        }
        self.saw_entry = true;

        if self.session_id.is_none() {
            self.session_id = entry.session_id.filter(|s| !s.is_empty());
        }

        let message = match entry.message {
            Some(m) => m,
            None => return,
        };

        let (tools, agents) = match &message.content {
            Some(content) => self.count_tool_use(content),
            None => (Vec::new(), Vec::new()),
        };

        let usage = match &message.usage {
            Some(u) => u.counts(),
            None => return,
        };
        let model = message.model.unwrap_or_else(|| "unknown".to_string());

        let msg_id = message.id.unwrap_or_default();
        let req_id = entry.request_id.unwrap_or_default();
        if msg_id.is_empty() && req_id.is_empty() {
            self.loose_usage.push(MessageUsage {
                model,
                usage,
                tools,
                agents,
            });
            return;
        }

        let slot = self
            .keyed_usage
            .entry((msg_id, req_id))
            .or_insert_with(|| MessageUsage {
                model: String::new(),
                usage: TokenCounts::default(),
                tools: Vec::new(),
                agents: Vec::new(),
            });
        slot.model = model;
        slot.usage = usage;
        slot.tools.extend(tools);
        slot.agents.extend(agents);
    }

    /// Count tool_use blocks; returns the tool and agent names seen.
    fn count_tool_use(&mut self, content: &serde_json::Value) -> (Vec<String>, Vec<String>) {
        let mut tools = Vec::new();
        let mut agents = Vec::new();
        let items = match content.as_array() {
            Some(items) => items,
            None => return (tools, agents),
        };
        for item in items {
            if item.get("type").and_then(|t| t.as_str()) != Some("tool_use") {
                continue;
            }
            let name = match item.get("name").and_then(|n| n.as_str()) {
                Some(n) if !n.is_empty() => n,
                _ => continue,
            };
            *self.tool_calls.entry(name.to_string()).or_insert(0) += 1;
            tools.push(name.to_string());

            let input = item.get("input");
            let subagent = input
                .and_then(|i| i.get("subagent_type"))
                .or_else(|| input.and_then(|i| i.get("agent")))
                .and_then(|a| a.as_str());
            if let Some(agent) = subagent.filter(|a| !a.is_empty()) {
                *self.agent_invocations.entry(agent.to_string()).or_insert(0) += 1;
                agents.push(agent.to_string());
            }
        }
        (tools, agents)
    }

    /// Build the record. Token sums that do not fit in a `u64` make the file a parse error.
    fn finish(
        self,
        path: &Path,
        mtime: Option<DateTime<Utc>>,
    ) -> Result<Option<SessionRecord>, ParseError> {
        if !self.saw_entry {
            return Ok(None);
        }
        let timestamp = match self.earliest.or(mtime) {
            Some(ts) => ts,
            None => return Ok(None),
        };
        let session_id = self.session_id.unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default()
        });

        let overflow = || parse_error(path, "token counts overflow");
        let add_into = |map: &mut BTreeMap<String, TokenCounts>, key: String, usage: TokenCounts| {
            let slot = map.entry(key).or_default();
            *slot = slot.checked_add(usage).ok_or_else(overflow)?;
            Ok::<(), ParseError>(())
        };

        let mut totals = TokenCounts::default();
        let mut models: BTreeMap<String, TokenCounts> = BTreeMap::new();
        let mut tool_tokens: BTreeMap<String, TokenCounts> = BTreeMap::new();
        let mut agent_tokens: BTreeMap<String, TokenCounts> = BTreeMap::new();
        for message in self.keyed_usage.into_values().chain(self.loose_usage) {
            totals = totals.checked_add(message.usage).ok_or_else(overflow)?;
            add_into(&mut models, message.model, message.usage)?;
            // A message calling the same tool twice is attributed once.
            let tools: BTreeSet<String> = message.tools.into_iter().collect();
            for tool in tools {
                add_into(&mut tool_tokens, tool, message.usage)?;
            }
            let agents: BTreeSet<String> = message.agents.into_iter().collect();
            for agent in agents {
                add_into(&mut agent_tokens, agent, message.usage)?;
            }
        }
        if totals.checked_billable().is_none() {
            return Err(overflow());
        }

        let mut record = SessionRecord::from_counts(session_id, timestamp, totals);
        record.models = models;
        record.tool_calls = self.tool_calls;
        record.agent_invocations = self.agent_invocations;
        record.tool_tokens = tool_tokens;
        record.agent_tokens = agent_tokens;
        Ok(Some(record))
    }
}

// ── Parsers ───────────────────────────────────────────────────────────

fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn parse_error(path: &Path, reason: impl Into<String>) -> ParseError {
    ParseError {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Parse a line-delimited session file. Individual bad lines are tolerated;
/// a non-empty file without a single valid entry is a parse error.
fn parse_jsonl_file(
    path: &Path,
    window: &LookbackWindow,
    now: DateTime<Utc>,
) -> Result<SessionAccumulator, ParseError> {
    let file = std::fs::File::open(path).map_err(|e| parse_error(path, e.to_string()))?;
    let mut reader = std::io::BufReader::new(file);

    let mut acc = SessionAccumulator::default();
    let mut valid_lines = 0usize;
    let mut invalid_lines = 0usize;
    let mut line_buf = String::new();

    loop {
        line_buf.clear();
        let bytes_read = reader
            .read_line(&mut line_buf)
            .map_err(|e| parse_error(path, e.to_string()))?;
        if bytes_read == 0 {
            break;
        }

        let line = line_buf.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<LogEntry>(line) {
            Ok(entry) => {
                valid_lines += 1;
                acc.add(entry, window, now);
            }
            Err(_) => invalid_lines += 1,
        }
    }

    if valid_lines == 0 && invalid_lines > 0 {
        return Err(parse_error(path, "no valid JSON entries"));
    }
    if invalid_lines > 0 {
        debug!(
            "{}: ignored {} malformed line(s)",
            path.display(),
            invalid_lines
        );
    }
    Ok(acc)
}

/// Parse a whole-document session file: one entry object or an array of them.
fn parse_json_file(
    path: &Path,
    window: &LookbackWindow,
    now: DateTime<Utc>,
) -> Result<SessionAccumulator, ParseError> {
    let content = std::fs::read_to_string(path).map_err(|e| parse_error(path, e.to_string()))?;
    if content.trim().is_empty() {
        return Ok(SessionAccumulator::default());
    }
    let doc: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| parse_error(path, e.to_string()))?;

    let values = match doc {
        serde_json::Value::Array(items) => items,
        other => vec![other],
    };
    let total = values.len();

    let mut acc = SessionAccumulator::default();
    let mut valid = 0usize;
    for value in values {
        if let Ok(entry) = serde_json::from_value::<LogEntry>(value) {
            valid += 1;
            acc.add(entry, window, now);
        }
    }
    if total > 0 && valid == 0 {
        return Err(parse_error(path, "no valid session entries"));
    }
    Ok(acc)
}

/// Parse one session file into a record, or `None` if nothing falls in the window.
pub fn parse_session_file(
    path: &Path,
    window: &LookbackWindow,
    now: DateTime<Utc>,
) -> Result<Option<SessionRecord>, ParseError> {
    let acc = match session_file_kind(path) {
        Some(SessionFileKind::Jsonl) => parse_jsonl_file(path, window, now)?,
        Some(SessionFileKind::Json) => parse_json_file(path, window, now)?,
        None => return Ok(None),
    };
    acc.finish(path, file_mtime(path))
}

// ── Discovery ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionFileKind {
    Jsonl,
    Json,
}

fn session_file_kind(path: &Path) -> Option<SessionFileKind> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("jsonl") => Some(SessionFileKind::Jsonl),
        Some("json") => Some(SessionFileKind::Json),
        _ => None,
    }
}

fn file_mtime(path: &Path) -> Option<DateTime<Utc>> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

/// Session files directly inside `dir`, sorted by path.
fn discover_session_files(dir: &Path) -> Result<Vec<PathBuf>, MonitorError> {
    let entries = std::fs::read_dir(dir).map_err(|source| MonitorError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && session_file_kind(path).is_some())
        .collect();
    files.sort();
    Ok(files)
}

// ── Main read entry point ─────────────────────────────────────────────

/// Read every session record in `dir` that falls inside `window`.
///
/// Files last modified before the window start are skipped without being
/// opened; the rest are parsed and filtered entry by entry. Malformed files
/// are collected into `parse_errors` and do not abort the batch.
pub fn read_sessions(
    dir: &Path,
    window: &LookbackWindow,
    now: DateTime<Utc>,
) -> Result<ScanOutcome, MonitorError> {
    if !dir.is_dir() {
        return Err(MonitorError::NotFound(dir.to_path_buf()));
    }

    let files = discover_session_files(dir)?;
    let cutoff = window.cutoff();

    let mut outcome = ScanOutcome {
        files_seen: files.len(),
        ..Default::default()
    };

    for path in &files {
        if let Some(mtime) = file_mtime(path) {
            if mtime < cutoff {
                outcome.files_outside_window += 1;
                continue;
            }
        }

        match parse_session_file(path, window, now) {
            Ok(Some(record)) => outcome.records.push(record),
            Ok(None) => {}
            Err(err) => {
                debug!("Skipping session file {}", err);
                outcome.parse_errors.push(err);
            }
        }
    }

    debug!(
        "Read {} session record(s) from {} file(s) in {}",
        outcome.records.len(),
        outcome.files_seen,
        dir.display()
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn at(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc)
    }

    /// Window ending at the real "now" so freshly written files pass the mtime pre-filter.
    fn live_window(days: i64) -> (LookbackWindow, DateTime<Utc>) {
        let now = Utc::now();
        (LookbackWindow::new(days, now).unwrap(), now)
    }

    fn ts_days_ago(now: DateTime<Utc>, days: i64) -> String {
        (now - chrono::Duration::days(days)).to_rfc3339()
    }

    fn write_lines(dir: &Path, name: &str, lines: &[String]) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(f, "{}", line).unwrap();
        }
        path
    }

    fn assistant_line(ts: &str, session: &str, msg_id: &str, input: u64, output: u64) -> String {
        format!(
            r#"{{"type":"assistant","sessionId":"{session}","timestamp":"{ts}","requestId":"req_{msg_id}","message":{{"id":"{msg_id}","model":"claude-sonnet-4-5","usage":{{"input_tokens":{input},"output_tokens":{output},"cache_creation_input_tokens":10,"cache_read_input_tokens":500}}}}}}"#
        )
    }

    #[test]
    fn deserialize_log_entry() {
        let json = r#"{
            "type": "assistant",
            "sessionId": "abc",
            "requestId": "req_1",
            "timestamp": "2026-02-24T10:00:00.123Z",
            "message": {
                "id": "msg_1",
                "model": "claude-sonnet-4-5",
                "usage": {"input_tokens": 1000, "output_tokens": 200},
                "content": [{"type": "tool_use", "name": "Read", "input": {}}]
            }
        }"#;
        let entry: LogEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.session_id.as_deref(), Some("abc"));
        let ts = parse_timestamp(entry.timestamp.as_deref().unwrap()).unwrap();
        assert_eq!(ts.date_naive().to_string(), "2026-02-24");
        let usage = entry.message.unwrap().usage.unwrap().counts();
        assert_eq!(usage.input_tokens, 1000);
        assert_eq!(usage.cache_read_tokens, 0);
    }

    #[test]
    fn parse_jsonl_sums_usage_and_counts_tools() {
        let dir = tempfile::tempdir().unwrap();
        let (window, now) = live_window(7);
        let ts = ts_days_ago(now, 1);
        let path = write_lines(
            dir.path(),
            "s1.jsonl",
            &[
                assistant_line(&ts, "sess-1", "msg_1", 100, 10),
                r#"{"type":"user","message":{"content":"hello"}}"#.to_string(),
                format!(
                    r#"{{"type":"assistant","timestamp":"{ts}","message":{{"content":[{{"type":"tool_use","name":"Task","input":{{"subagent_type":"reviewer"}}}},{{"type":"tool_use","name":"Read","input":{{}}}}]}}}}"#
                ),
                assistant_line(&ts, "sess-1", "msg_2", 200, 20),
            ],
        );

        let record = parse_session_file(&path, &window, now).unwrap().unwrap();
        assert_eq!(record.session_id, "sess-1");
        assert_eq!(record.input_tokens, 300);
        assert_eq!(record.output_tokens, 30);
        assert_eq!(record.cache_creation_tokens, 20);
        assert_eq!(record.cache_read_tokens, 1000);
        // 300 + 30 * 3 + 20
        assert_eq!(record.billable_tokens, 410);
        assert_eq!(record.tool_calls.get("Task"), Some(&1));
        assert_eq!(record.tool_calls.get("Read"), Some(&1));
        assert_eq!(record.agent_invocations.get("reviewer"), Some(&1));
        assert_eq!(record.models.get("claude-sonnet-4-5").unwrap().input_tokens, 300);
    }

    #[test]
    fn streaming_chunks_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let (window, now) = live_window(7);
        let ts = ts_days_ago(now, 0);
        let path = write_lines(
            dir.path(),
            "dup.jsonl",
            &[
                assistant_line(&ts, "s", "msg_1", 100, 10),
                assistant_line(&ts, "s", "msg_1", 100, 50),
                assistant_line(&ts, "s", "msg_1", 100, 200),
            ],
        );

        let record = parse_session_file(&path, &window, now).unwrap().unwrap();
        assert_eq!(record.input_tokens, 100);
        assert_eq!(record.output_tokens, 200);
    }

    #[test]
    fn entries_before_window_are_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let (window, now) = live_window(3);
        let old = ts_days_ago(now, 10);
        let recent = ts_days_ago(now, 1);
        let path = write_lines(
            dir.path(),
            "mixed.jsonl",
            &[
                assistant_line(&old, "s", "msg_old", 5_000, 0),
                assistant_line(&recent, "s", "msg_new", 100, 0),
            ],
        );

        let record = parse_session_file(&path, &window, now).unwrap().unwrap();
        assert_eq!(record.input_tokens, 100);
        assert_eq!(record.timestamp, parse_timestamp(&recent).unwrap());
    }

    #[test]
    fn file_with_only_old_entries_yields_no_record() {
        let dir = tempfile::tempdir().unwrap();
        let (window, now) = live_window(3);
        let path = write_lines(
            dir.path(),
            "old.jsonl",
            &[assistant_line(&ts_days_ago(now, 20), "s", "m", 1, 1)],
        );
        assert!(parse_session_file(&path, &window, now).unwrap().is_none());
    }

    #[test]
    fn session_id_falls_back_to_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let (window, now) = live_window(7);
        let ts = ts_days_ago(now, 0);
        let path = write_lines(
            dir.path(),
            "a1b2c3.jsonl",
            &[format!(
                r#"{{"timestamp":"{ts}","message":{{"usage":{{"input_tokens":7}}}}}}"#
            )],
        );
        let record = parse_session_file(&path, &window, now).unwrap().unwrap();
        assert_eq!(record.session_id, "a1b2c3");
        assert_eq!(record.models.get("unknown").unwrap().input_tokens, 7);
    }

    #[test]
    fn entries_without_timestamp_use_file_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let (window, now) = live_window(7);
        let path = write_lines(
            dir.path(),
            "nots.jsonl",
            &[r#"{"message":{"usage":{"input_tokens":5}}}"#.to_string()],
        );
        let record = parse_session_file(&path, &window, now).unwrap().unwrap();
        assert_eq!(record.input_tokens, 5);
        assert_eq!(Some(record.timestamp), file_mtime(&path));
    }

    #[test]
    fn truncated_last_line_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let (window, now) = live_window(7);
        let ts = ts_days_ago(now, 0);
        let path = write_lines(
            dir.path(),
            "live.jsonl",
            &[
                assistant_line(&ts, "s", "m1", 42, 0),
                r#"{"type":"assistant","message":{"usa"#.to_string(),
            ],
        );
        let record = parse_session_file(&path, &window, now).unwrap().unwrap();
        assert_eq!(record.input_tokens, 42);
    }

    #[test]
    fn garbage_jsonl_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let (window, now) = live_window(7);
        let path = write_lines(
            dir.path(),
            "bad.jsonl",
            &["not json".to_string(), "{also not".to_string()],
        );
        let err = parse_session_file(&path, &window, now).unwrap_err();
        assert_eq!(err.path, path);
    }

    #[test]
    fn negative_token_counts_are_invalid_entries() {
        let dir = tempfile::tempdir().unwrap();
        let (window, now) = live_window(7);
        let path = write_lines(
            dir.path(),
            "neg.jsonl",
            &[r#"{"message":{"usage":{"input_tokens":-5}}}"#.to_string()],
        );
        assert!(parse_session_file(&path, &window, now).is_err());
    }

    #[test]
    fn json_document_array_is_supported() {
        let dir = tempfile::tempdir().unwrap();
        let (window, now) = live_window(7);
        let ts = ts_days_ago(now, 2);
        let path = dir.path().join("export.json");
        std::fs::write(
            &path,
            format!(
                r#"[{{"sessionId":"x","timestamp":"{ts}","message":{{"usage":{{"input_tokens":10,"output_tokens":1}}}}}},
                    {{"sessionId":"x","timestamp":"{ts}","message":{{"usage":{{"input_tokens":20}}}}}}]"#
            ),
        )
        .unwrap();
        let record = parse_session_file(&path, &window, now).unwrap().unwrap();
        assert_eq!(record.session_id, "x");
        assert_eq!(record.input_tokens, 30);
        assert_eq!(record.billable_tokens, 33);
    }

    #[test]
    fn invalid_json_document_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let (window, now) = live_window(7);
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{\"sessionId\": ").unwrap();
        assert!(parse_session_file(&path, &window, now).is_err());
    }

    #[test]
    fn read_sessions_missing_dir_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (window, now) = live_window(7);
        let missing = dir.path().join("nope");
        match read_sessions(&missing, &window, now) {
            Err(MonitorError::NotFound(p)) => assert_eq!(p, missing),
            other => panic!("expected NotFound, got {:?}", other.map(|o| o.records.len())),
        }
    }

    #[test]
    fn read_sessions_empty_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (window, now) = live_window(7);
        let outcome = read_sessions(dir.path(), &window, now).unwrap();
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.files_seen, 0);
        assert_eq!(outcome.skipped_files(), 0);
    }

    #[test]
    fn read_sessions_skips_corrupt_file_and_counts_it() {
        let dir = tempfile::tempdir().unwrap();
        let (window, now) = live_window(7);
        let ts = ts_days_ago(now, 1);
        for i in 0..5 {
            write_lines(
                dir.path(),
                &format!("ok-{i}.jsonl"),
                &[assistant_line(&ts, &format!("s{i}"), "m", 10, 0)],
            );
        }
        write_lines(dir.path(), "corrupt.jsonl", &["\u{0}\u{1}garbage".to_string()]);
        std::fs::write(dir.path().join("notes.md"), "ignored").unwrap();

        let outcome = read_sessions(dir.path(), &window, now).unwrap();
        assert_eq!(outcome.files_seen, 6);
        assert_eq!(outcome.records.len(), 5);
        assert_eq!(outcome.skipped_files(), 1);
        assert!(outcome.parse_errors[0].path.ends_with("corrupt.jsonl"));
    }

    #[test]
    fn read_sessions_prefilters_by_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let (window, now) = live_window(2);
        let path = write_lines(
            dir.path(),
            "stale.jsonl",
            &[assistant_line(&ts_days_ago(now, 0), "s", "m", 10, 0)],
        );
        let old = std::time::SystemTime::now() - std::time::Duration::from_secs(10 * 86_400);
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(old)
            .unwrap();

        let outcome = read_sessions(dir.path(), &window, now).unwrap();
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.files_outside_window, 1);
    }

    #[test]
    fn read_sessions_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (window, now) = live_window(7);
        for i in 0..4 {
            write_lines(
                dir.path(),
                &format!("{i}.jsonl"),
                &[assistant_line(&ts_days_ago(now, i), &format!("s{i}"), "m", 10 * i as u64, 1)],
            );
        }
        let first = read_sessions(dir.path(), &window, now).unwrap();
        let second = read_sessions(dir.path(), &window, now).unwrap();
        assert_eq!(first.records, second.records);
    }

    #[test]
    fn fixed_clock_window_bounds_entries() {
        let dir = tempfile::tempdir().unwrap();
        let now = at("2030-01-10T12:00:00Z");
        let window = LookbackWindow::new(1, now).unwrap();
        let path = write_lines(
            dir.path(),
            "future.jsonl",
            &[
                assistant_line("2030-01-10T08:00:00Z", "s", "a", 1, 0),
                assistant_line("2030-01-10T13:00:00Z", "s", "b", 1_000, 0),
            ],
        );
        let record = parse_session_file(&path, &window, now).unwrap().unwrap();
        assert_eq!(record.input_tokens, 1);
    }

    #[test]
    fn overflowing_usage_skips_only_that_file() {
        let dir = tempfile::tempdir().unwrap();
        let (window, now) = live_window(7);
        let ts = ts_days_ago(now, 1);
        write_lines(
            dir.path(),
            "huge.jsonl",
            &[assistant_line(&ts, "huge", "m", 1, 9_223_372_036_854_775_807)],
        );
        write_lines(dir.path(), "ok.jsonl", &[assistant_line(&ts, "ok", "m", 10, 0)]);

        let outcome = read_sessions(dir.path(), &window, now).unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].session_id, "ok");
        assert_eq!(outcome.skipped_files(), 1);
        assert!(outcome.parse_errors[0].path.ends_with("huge.jsonl"));
        assert_eq!(outcome.parse_errors[0].reason, "token counts overflow");
    }

    #[test]
    fn summed_usage_overflow_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let (window, now) = live_window(7);
        let ts = ts_days_ago(now, 1);
        let path = write_lines(
            dir.path(),
            "sum.jsonl",
            &[
                assistant_line(&ts, "s", "a", 18_000_000_000_000_000_000, 0),
                assistant_line(&ts, "s", "b", 18_000_000_000_000_000_000, 0),
            ],
        );
        let err = parse_session_file(&path, &window, now).unwrap_err();
        assert_eq!(err.reason, "token counts overflow");
    }

    #[test]
    fn message_usage_is_attributed_to_its_tools_and_agents() {
        let dir = tempfile::tempdir().unwrap();
        let (window, now) = live_window(7);
        let ts = ts_days_ago(now, 1);
        let usage = r#""usage":{"input_tokens":100,"output_tokens":10,"cache_read_input_tokens":50}"#;
        let path = write_lines(
            dir.path(),
            "tools.jsonl",
            &[
                // Two streamed chunks of one message, each carrying a tool call.
                format!(
                    r#"{{"timestamp":"{ts}","requestId":"r1","message":{{"id":"m1","model":"claude-opus-4-1",{usage},"content":[{{"type":"tool_use","name":"Task","input":{{"subagent_type":"reviewer"}}}}]}}}}"#
                ),
                format!(
                    r#"{{"timestamp":"{ts}","requestId":"r1","message":{{"id":"m1","model":"claude-opus-4-1",{usage},"content":[{{"type":"tool_use","name":"Read","input":{{}}}},{{"type":"tool_use","name":"Read","input":{{}}}}]}}}}"#
                ),
                assistant_line(&ts, "s", "m2", 7, 0),
            ],
        );

        let record = parse_session_file(&path, &window, now).unwrap().unwrap();
        assert_eq!(record.tool_calls.get("Read"), Some(&2));
        let read = record.tool_tokens.get("Read").unwrap();
        assert_eq!(read.input_tokens, 100);
        assert_eq!(read.cache_read_tokens, 50);
        assert_eq!(record.tool_tokens.get("Task").unwrap().output_tokens, 10);
        assert_eq!(record.agent_tokens.get("reviewer").unwrap().billable(), 130);
        assert_eq!(record.input_tokens, 107);
    }
}
