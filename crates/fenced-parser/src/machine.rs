// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Byte-level fence recognition state machine.
//!
//! This is the synchronous core of the parser: it consumes text chunks of
//! arbitrary size (including single bytes) and produces a flat sequence of
//! [`MachineEvent`]s. It holds no async or I/O dependency, which is what
//! makes chunk-invariance (the same logical input producing the same event
//! sequence regardless of how it is split into `feed()` calls) straightforward
//! to test.
//!
//! The sentinel is always three backticks. Because a chunk boundary can land
//! inside the sentinel, the scanner never emits the final one or two
//! backticks of a buffer as prose until either a fourth byte disambiguates
//! them or `flush()` is called at end of stream.

const SENTINEL: &str = "```";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineEvent {
    ProseBegin,
    ProseChunk(String),
    ProseEnd,
    CodeBegin(u64),
    CodeChunk(String),
    CodeEnd,
    DataBegin(u64, String),
    DataChunk(String),
    DataEnd,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    /// Accumulating a run of whitespace-only prose; no segment opened yet.
    PendingProse,
    /// A non-whitespace prose segment is open; bytes forward directly.
    OpenProse,
    /// Saw the opening sentinel, collecting the info-string line.
    Header { prose_was_open: bool, pending_ws: String },
    /// Recognized `tsx agent.run` fence, streaming its body.
    CodeBody { last_non_ws: Option<char> },
    /// Recognized `json agent.data => "id"` fence, streaming its body.
    DataBody,
    /// Unknown fence kind; its header + body + closer fold back into prose
    /// verbatim, without interpretation.
    Passthrough,
}

pub struct FenceMachine {
    buf: String,
    mode: Mode,
    next_block_index: u64,
}

impl Default for FenceMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl FenceMachine {
    pub fn new() -> Self {
        Self {
            buf: String::new(),
            mode: Mode::PendingProse,
            next_block_index: 0,
        }
    }

    pub fn feed(&mut self, chunk: &str) -> Vec<MachineEvent> {
        self.buf.push_str(chunk);
        let mut out = Vec::new();
        self.drain(&mut out, false);
        out
    }

    pub fn flush(&mut self) -> Vec<MachineEvent> {
        let mut out = Vec::new();
        self.drain(&mut out, true);
        out
    }

    fn drain(&mut self, out: &mut Vec<MachineEvent>, eof: bool) {
        loop {
            match self.mode.clone() {
                Mode::PendingProse => {
                    match scan_for_sentinel(&mut self.buf, eof) {
                        Scan::Opens(before) => {
                            if !before.trim().is_empty() {
                                out.push(MachineEvent::ProseBegin);
                                out.push(MachineEvent::ProseChunk(before));
                                self.mode = Mode::Header { prose_was_open: true, pending_ws: String::new() };
                            } else {
                                self.mode = Mode::Header { prose_was_open: false, pending_ws: before };
                            }
                        }
                        Scan::Partial(text) => {
                            if !text.is_empty() && !text.trim().is_empty() {
                                out.push(MachineEvent::ProseBegin);
                                out.push(MachineEvent::ProseChunk(text));
                                if eof {
                                    out.push(MachineEvent::ProseEnd);
                                } else {
                                    self.mode = Mode::OpenProse;
                                }
                            }
                            return;
                        }
                    }
                }
                Mode::OpenProse => match scan_for_sentinel(&mut self.buf, eof) {
                    Scan::Opens(before) => {
                        if !before.is_empty() {
                            out.push(MachineEvent::ProseChunk(before));
                        }
                        out.push(MachineEvent::ProseEnd);
                        self.mode = Mode::Header { prose_was_open: false, pending_ws: String::new() };
                    }
                    Scan::Partial(text) => {
                        if !text.is_empty() {
                            out.push(MachineEvent::ProseChunk(text));
                        }
                        if eof {
                            out.push(MachineEvent::ProseEnd);
                            self.mode = Mode::PendingProse;
                        }
                        return;
                    }
                },
                Mode::Header { prose_was_open, pending_ws } => {
                    match self.buf.find('\n') {
                        Some(idx) => {
                            let mut line: String = self.buf.drain(..=idx).collect();
                            line.pop(); // remove '\n'
                            if line.ends_with('\r') {
                                line.pop();
                            }
                            let trimmed = line.trim();
                            if is_code_header(trimmed) {
                                if prose_was_open {
                                    out.push(MachineEvent::ProseEnd);
                                }
                                let idx = self.next_block_index;
                                self.next_block_index += 1;
                                out.push(MachineEvent::CodeBegin(idx));
                                self.mode = Mode::CodeBody { last_non_ws: None };
                            } else if let Some(target) = parse_data_header(trimmed) {
                                if prose_was_open {
                                    out.push(MachineEvent::ProseEnd);
                                }
                                let idx = self.next_block_index;
                                self.next_block_index += 1;
                                out.push(MachineEvent::DataBegin(idx, target));
                                self.mode = Mode::DataBody;
                            } else {
                                // Unknown fence: fold header back into prose verbatim,
                                // including any whitespace buffered ahead of it.
                                if !prose_was_open {
                                    out.push(MachineEvent::ProseBegin);
                                    if !pending_ws.is_empty() {
                                        out.push(MachineEvent::ProseChunk(pending_ws));
                                    }
                                }
                                out.push(MachineEvent::ProseChunk(format!(
                                    "{SENTINEL}{line}\n"
                                )));
                                self.mode = Mode::Passthrough;
                            }
                        }
                        None => {
                            if eof {
                                // Unterminated header: flush raw as prose.
                                let raw = std::mem::take(&mut self.buf);
                                let literal = format!("{SENTINEL}{raw}");
                                if prose_was_open {
                                    out.push(MachineEvent::ProseChunk(literal));
                                    out.push(MachineEvent::ProseEnd);
                                } else {
                                    let combined = format!("{pending_ws}{literal}");
                                    if !combined.trim().is_empty() {
                                        out.push(MachineEvent::ProseBegin);
                                        out.push(MachineEvent::ProseChunk(combined));
                                        out.push(MachineEvent::ProseEnd);
                                    }
                                }
                                self.mode = Mode::PendingProse;
                            }
                            return;
                        }
                    }
                }
                Mode::Passthrough => match scan_for_sentinel(&mut self.buf, eof) {
                    Scan::Opens(before) => {
                        out.push(MachineEvent::ProseChunk(format!("{before}{SENTINEL}")));
                        self.mode = Mode::OpenProse;
                    }
                    Scan::Partial(text) => {
                        if !text.is_empty() {
                            out.push(MachineEvent::ProseChunk(text));
                        }
                        if eof {
                            out.push(MachineEvent::ProseEnd);
                            self.mode = Mode::PendingProse;
                        }
                        return;
                    }
                },
                Mode::CodeBody { mut last_non_ws } => {
                    match scan_for_sentinel(&mut self.buf, eof) {
                        Scan::Opens(before) => {
                            update_last_non_ws(&mut last_non_ws, &before);
                            if !before.is_empty() {
                                out.push(MachineEvent::CodeChunk(before));
                            }
                            if last_non_ws != Some(';') {
                                out.push(MachineEvent::CodeChunk(";".to_string()));
                            }
                            out.push(MachineEvent::CodeEnd);
                            self.mode = Mode::PendingProse;
                        }
                        Scan::Partial(text) => {
                            update_last_non_ws(&mut last_non_ws, &text);
                            if !text.is_empty() {
                                out.push(MachineEvent::CodeChunk(text));
                            }
                            if eof {
                                if last_non_ws != Some(';') {
                                    out.push(MachineEvent::CodeChunk(";".to_string()));
                                }
                                out.push(MachineEvent::CodeEnd);
                                self.mode = Mode::PendingProse;
                            } else {
                                self.mode = Mode::CodeBody { last_non_ws };
                                return;
                            }
                        }
                    }
                }
                Mode::DataBody => match scan_for_sentinel(&mut self.buf, eof) {
                    Scan::Opens(before) => {
                        if !before.is_empty() {
                            out.push(MachineEvent::DataChunk(before));
                        }
                        out.push(MachineEvent::DataEnd);
                        self.mode = Mode::PendingProse;
                    }
                    Scan::Partial(text) => {
                        if !text.is_empty() {
                            out.push(MachineEvent::DataChunk(text));
                        }
                        if eof {
                            out.push(MachineEvent::DataEnd);
                            self.mode = Mode::PendingProse;
                        }
                        return;
                    }
                },
            }
            if eof && self.buf.is_empty() {
                return;
            }
        }
    }
}

fn update_last_non_ws(slot: &mut Option<char>, text: &str) {
    if let Some(c) = text.chars().rev().find(|c| !c.is_whitespace()) {
        *slot = Some(c);
    }
}

enum Scan {
    /// A full sentinel was found; carries the text preceding it. The sentinel
    /// itself has already been drained from the buffer.
    Opens(String),
    /// No sentinel found yet; carries the safely-emittable prefix. A tail of
    /// up to two trailing backticks is retained in the buffer unless `eof`.
    Partial(String),
}

fn scan_for_sentinel(buf: &mut String, eof: bool) -> Scan {
    if let Some(idx) = buf.find(SENTINEL) {
        let rest = buf.split_off(idx + SENTINEL.len());
        let mut before = std::mem::replace(buf, rest);
        before.truncate(before.len() - SENTINEL.len());
        return Scan::Opens(before);
    }
    if eof {
        return Scan::Partial(std::mem::take(buf));
    }
    let tail_len = trailing_backtick_run(buf).min(2);
    let safe_len = buf.len() - tail_len;
    let rest = buf.split_off(safe_len);
    let emitted = std::mem::replace(buf, rest);
    Scan::Partial(emitted)
}

fn trailing_backtick_run(s: &str) -> usize {
    s.chars().rev().take_while(|&c| c == '`').count()
}

fn strip_ci_prefix<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len() && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes()) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

fn is_code_header(trimmed: &str) -> bool {
    let Some(rest) = strip_ci_prefix(trimmed, "tsx") else {
        return false;
    };
    if !rest.chars().next().map(|c| c.is_whitespace()).unwrap_or(false) {
        return false;
    }
    let rest = rest.trim_start();
    let Some(rest) = strip_ci_prefix(rest, "agent.run") else {
        return false;
    };
    rest.trim().is_empty()
}

fn parse_data_header(trimmed: &str) -> Option<String> {
    let rest = strip_ci_prefix(trimmed, "json")?;
    if !rest.chars().next().map(|c| c.is_whitespace()).unwrap_or(false) {
        return None;
    }
    let rest = rest.trim_start();
    let rest = strip_ci_prefix(rest, "agent.data")?;
    let rest = rest.trim_start();
    let rest = rest.strip_prefix("=>")?;
    let rest = rest.trim_start();
    let quote = rest.chars().next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let rest = &rest[quote.len_utf8()..];
    let end = rest.find(quote)?;
    if end == 0 {
        return None;
    }
    let id = &rest[..end];
    let after = &rest[end + quote.len_utf8()..];
    if !after.trim().is_empty() {
        return None;
    }
    Some(id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_whole(input: &str) -> Vec<MachineEvent> {
        let mut m = FenceMachine::new();
        let mut events = m.feed(input);
        events.extend(m.flush());
        events
    }

    fn run_byte_by_byte(input: &str) -> Vec<MachineEvent> {
        let mut m = FenceMachine::new();
        let mut events = Vec::new();
        for ch in input.chars() {
            let mut tmp = [0u8; 4];
            events.extend(m.feed(ch.encode_utf8(&mut tmp)));
        }
        events.extend(m.flush());
        events
    }

    #[test]
    fn plain_prose_only() {
        let events = run_whole("hello world");
        assert_eq!(
            events,
            vec![
                MachineEvent::ProseBegin,
                MachineEvent::ProseChunk("hello world".into()),
                MachineEvent::ProseEnd,
            ]
        );
    }

    #[test]
    fn whitespace_only_prose_is_suppressed() {
        let input = "```tsx agent.run\n1+1\n```   \n```tsx agent.run\n2+2\n```";
        let events = run_whole(input);
        let prose_begins = events
            .iter()
            .filter(|e| matches!(e, MachineEvent::ProseBegin))
            .count();
        assert_eq!(prose_begins, 0, "whitespace-only gap must not open a prose segment");
    }

    #[test]
    fn code_fence_recognized_and_terminated() {
        let events = run_whole("```tsx agent.run\nlet x = 1\n```");
        assert_eq!(
            events,
            vec![
                MachineEvent::CodeBegin(0),
                MachineEvent::CodeChunk("let x = 1\n".into()),
                MachineEvent::CodeChunk(";".into()),
                MachineEvent::CodeEnd,
            ]
        );
    }

    #[test]
    fn code_fence_with_trailing_semicolon_not_duplicated() {
        let events = run_whole("```tsx agent.run\nlet x = 1;\n```");
        let chunks: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                MachineEvent::CodeChunk(s) => Some(s.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(chunks, vec!["let x = 1;\n".to_string()]);
    }

    #[test]
    fn data_fence_recognized_with_target_id() {
        let events = run_whole("```json agent.data => \"form1\"\n{\"a\":1}\n```");
        assert!(events.contains(&MachineEvent::DataBegin(0, "form1".into())));
        assert!(events.contains(&MachineEvent::DataEnd));
    }

    #[test]
    fn unknown_fence_passes_through_as_prose() {
        let events = run_whole("```python\nprint(1)\n```");
        assert!(events.contains(&MachineEvent::ProseBegin));
        let chunks: String = events
            .iter()
            .filter_map(|e| match e {
                MachineEvent::ProseChunk(s) => Some(s.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(chunks, "```python\nprint(1)\n```");
    }

    #[test]
    fn block_index_monotonic_across_code_and_data() {
        let input = "```tsx agent.run\n1\n```\n```json agent.data => \"x\"\n{}\n```\n```tsx agent.run\n2\n```";
        let events = run_whole(input);
        assert_eq!(events.iter().find_map(|e| match e {
            MachineEvent::CodeBegin(i) => Some(*i),
            _ => None,
        }), Some(0));
        assert_eq!(events.iter().find_map(|e| match e {
            MachineEvent::DataBegin(i, _) => Some(*i),
            _ => None,
        }), Some(1));
        let code_indices: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                MachineEvent::CodeBegin(i) => Some(*i),
                _ => None,
            })
            .collect();
        assert_eq!(code_indices, vec![0, 2]);
    }

    #[test]
    fn chunk_invariance_code_fence() {
        let input = "intro text\n```tsx agent.run\nconsole.log(1)\n```\nmore text";
        assert_eq!(run_whole(input), run_byte_by_byte(input));
    }

    #[test]
    fn chunk_invariance_data_fence() {
        let input = "```json agent.data => \"id1\"\n{\"x\": [1,2,3]}\n```";
        assert_eq!(run_whole(input), run_byte_by_byte(input));
    }

    #[test]
    fn sentinel_split_across_chunks_is_still_recognized() {
        let mut m = FenceMachine::new();
        let mut events = Vec::new();
        events.extend(m.feed("hello ``"));
        events.extend(m.feed("`tsx agent.run\nfoo\n``"));
        events.extend(m.feed("`"));
        events.extend(m.flush());
        assert!(events.contains(&MachineEvent::CodeBegin(0)));
        assert!(events.contains(&MachineEvent::CodeEnd));
        let prose: String = events
            .iter()
            .filter_map(|e| match e {
                MachineEvent::ProseChunk(s) => Some(s.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(prose, "hello ");
    }

    #[test]
    fn unterminated_code_fence_flushed_at_eof() {
        let events = run_whole("```tsx agent.run\nlet x = 1");
        assert_eq!(
            events,
            vec![
                MachineEvent::CodeBegin(0),
                MachineEvent::CodeChunk("let x = 1".into()),
                MachineEvent::CodeChunk(";".into()),
                MachineEvent::CodeEnd,
            ]
        );
    }

    #[test]
    fn unterminated_header_flushed_as_prose() {
        let events = run_whole("plain\n```ts");
        let prose: String = events
            .iter()
            .filter_map(|e| match e {
                MachineEvent::ProseChunk(s) => Some(s.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(prose, "plain\n```ts");
    }

    #[test]
    fn header_whitespace_variants_accepted() {
        assert!(is_code_header("tsx   agent.run"));
        assert!(is_code_header("TSX agent.run"));
        assert!(!is_code_header("tsxagent.run"));
        assert!(parse_data_header("json agent.data => 'abc'").is_some());
        assert!(parse_data_header("JSON  agent.data  =>  \"abc\"").is_some());
        assert!(parse_data_header("json agent.data=>\"abc\"").is_none());
    }
}
