// ai
//! 🔬 `ArrayScanner` — a push-parser that finds element boundaries in a JSON array.
//!
//! Bytes go in through [`ArrayScanner::feed`] in whatever chunk sizes the network felt
//! like that day. Complete elements come out of [`ArrayScanner::next_element`] as
//! `serde_json::Value`s. In between, the scanner remembers just enough to survive a
//! chunk boundary landing in the middle of a number, a string, an escape sequence, or
//! six levels deep in somebody's nested amenities object.
//!
//! 🧠 Knowledge graph:
//! - The scanner never parses values itself. It only tracks depth + string state to find
//!   where an element ends, then hands the exact byte slice to `serde_json::from_slice`.
//! - Consumed bytes are drained on every `feed`, so the buffer holds at most one
//!   in-progress element plus the latest chunk. The whole array never lives here.
//! - String bodies are skipped with `memchr2` looking for `"` or `\`.
//! - Once an error is returned the scanner is poisoned: it yields nothing else.

use memchr::memchr2;
use serde_json::Value;

use crate::error::DecodeError;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const PREVIEW_LEN: usize = 40;

/// 🐘 Default ceiling for a single array element. One hotel listing should not weigh 16 MiB.
pub const DEFAULT_MAX_ELEMENT_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Waiting for the opening `[`.
    ExpectOpen,
    /// Inside the array, waiting for an element (or `]` if `allow_close`).
    ExpectElement { allow_close: bool },
    /// Somewhere inside an element, looking for its end.
    InElement,
    /// An element just ended; waiting for `,` or `]`.
    ExpectCommaOrClose,
    /// Saw the closing `]`. Only whitespace may follow.
    Done,
    /// An error was reported. Nothing more comes out.
    Poisoned,
}

/// 🔬 Incremental element-boundary finder for one top-level JSON array.
///
/// One scanner per document. It holds no state worth reusing once the array is done,
/// so a fresh stream means a fresh scanner.
#[derive(Debug)]
pub struct ArrayScanner {
    buf: Vec<u8>,
    /// Scan position inside `buf`.
    pos: usize,
    /// Absolute stream offset of `buf[0]`.
    base_offset: u64,
    phase: Phase,
    elem_start: usize,
    depth: usize,
    in_string: bool,
    /// A `\` was the last byte we saw inside a string; the next byte is escaped.
    escape_pending: bool,
    max_element_bytes: usize,
    elements_emitted: u64,
}

impl Default for ArrayScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl ArrayScanner {
    pub fn new() -> Self {
        Self::with_max_element_bytes(DEFAULT_MAX_ELEMENT_BYTES)
    }

    pub fn with_max_element_bytes(max_element_bytes: usize) -> Self {
        Self {
            buf: Vec::new(),
            pos: 0,
            base_offset: 0,
            phase: Phase::ExpectOpen,
            elem_start: 0,
            depth: 0,
            in_string: false,
            escape_pending: false,
            max_element_bytes,
            elements_emitted: 0,
        }
    }

    /// 📥 Append the next chunk of the document. Already-consumed bytes are dropped first.
    pub fn feed(&mut self, chunk: &[u8]) {
        if self.phase == Phase::Poisoned {
            return;
        }
        self.compact();
        self.buf.extend_from_slice(chunk);
    }

    /// 📊 Total bytes fed so far.
    pub fn bytes_seen(&self) -> u64 {
        self.base_offset + self.buf.len() as u64
    }

    /// 🔢 How many elements have come out so far.
    pub fn elements_emitted(&self) -> u64 {
        self.elements_emitted
    }

    /// ✅ True once the closing `]` has been consumed.
    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// 🎯 Pull the next complete element out of the buffered bytes.
    ///
    /// `Ok(None)` means "not enough bytes for another element yet" (or the array is done;
    /// check [`is_done`](Self::is_done)). Feed more and ask again.
    pub fn next_element(&mut self) -> Result<Option<Value>, DecodeError> {
        let result = self.scan();
        if result.is_err() {
            self.phase = Phase::Poisoned;
        }
        result
    }

    /// 🏁 The byte stream ended. Anything other than a cleanly closed array is an error.
    pub fn finish(&mut self) -> Result<(), DecodeError> {
        let phase = self.phase;
        match phase {
            Phase::Done | Phase::Poisoned => Ok(()),
            Phase::ExpectOpen if self.bytes_seen() == 0 => {
                self.phase = Phase::Poisoned;
                Err(self.parse_error(0, "empty document"))
            }
            _ => {
                let at = self.buf.len();
                self.phase = Phase::Poisoned;
                Err(self.parse_error(at, "unexpected end of input before the array was closed"))
            }
        }
    }

    fn scan(&mut self) -> Result<Option<Value>, DecodeError> {
        loop {
            match self.phase {
                Phase::Poisoned => return Ok(None),
                Phase::ExpectOpen => {
                    if !self.skip_bom()? {
                        return Ok(None);
                    }
                    let Some(byte) = self.skip_ws_peek() else {
                        return Ok(None);
                    };
                    if byte != b'[' {
                        return Err(self.wrong_top_level(byte));
                    }
                    self.pos += 1;
                    self.phase = Phase::ExpectElement { allow_close: true };
                }
                Phase::ExpectElement { allow_close } => {
                    let Some(byte) = self.skip_ws_peek() else {
                        return Ok(None);
                    };
                    match byte {
                        b']' if allow_close => {
                            self.pos += 1;
                            self.phase = Phase::Done;
                        }
                        b']' => return Err(self.parse_error(self.pos, "trailing comma before ']'")),
                        b',' | b':' | b'}' => {
                            return Err(self.parse_error(self.pos, "expected an array element"));
                        }
                        _ => {
                            self.elem_start = self.pos;
                            self.depth = 0;
                            self.in_string = false;
                            self.escape_pending = false;
                            self.phase = Phase::InElement;
                        }
                    }
                }
                Phase::InElement => match self.find_element_end()? {
                    Some(end) => {
                        let value = self.parse_element(end)?;
                        self.pos = end;
                        self.phase = Phase::ExpectCommaOrClose;
                        self.elements_emitted += 1;
                        return Ok(Some(value));
                    }
                    None => return Ok(None),
                },
                Phase::ExpectCommaOrClose => {
                    let Some(byte) = self.skip_ws_peek() else {
                        return Ok(None);
                    };
                    match byte {
                        b',' => {
                            self.pos += 1;
                            self.phase = Phase::ExpectElement { allow_close: false };
                        }
                        b']' => {
                            self.pos += 1;
                            self.phase = Phase::Done;
                        }
                        _ => return Err(self.parse_error(self.pos, "expected ',' or ']' after element")),
                    }
                }
                Phase::Done => {
                    return match self.skip_ws_peek() {
                        None => Ok(None),
                        Some(_) => Err(self.parse_error(self.pos, "trailing characters after the array")),
                    };
                }
            }
        }
    }

    /// 🔎 Walk forward from `pos` until the current element ends. Returns the exclusive end.
    fn find_element_end(&mut self) -> Result<Option<usize>, DecodeError> {
        let len = self.buf.len();
        while self.pos < len {
            if self.in_string {
                if self.escape_pending {
                    self.escape_pending = false;
                    self.pos += 1;
                    continue;
                }
                match memchr2(b'"', b'\\', &self.buf[self.pos..]) {
                    Some(i) if self.buf[self.pos + i] == b'\\' => {
                        self.pos += i + 1;
                        self.escape_pending = true;
                    }
                    Some(i) => {
                        self.pos += i + 1;
                        self.in_string = false;
                        if self.depth == 0 {
                            return Ok(Some(self.pos));
                        }
                    }
                    None => self.pos = len,
                }
                continue;
            }

            match self.buf[self.pos] {
                b'"' => {
                    self.in_string = true;
                    self.pos += 1;
                }
                b'{' | b'[' => {
                    self.depth += 1;
                    self.pos += 1;
                }
                b'}' | b']' if self.depth == 0 => return Ok(Some(self.pos)),
                b'}' | b']' => {
                    self.depth -= 1;
                    self.pos += 1;
                    if self.depth == 0 {
                        return Ok(Some(self.pos));
                    }
                }
                b',' | b' ' | b'\t' | b'\n' | b'\r' if self.depth == 0 => return Ok(Some(self.pos)),
                _ => self.pos += 1,
            }
        }

        if self.pos - self.elem_start > self.max_element_bytes {
            return Err(DecodeError::ElementTooLarge {
                offset: self.base_offset + self.elem_start as u64,
                limit: self.max_element_bytes,
            });
        }
        Ok(None)
    }

    fn parse_element(&self, end: usize) -> Result<Value, DecodeError> {
        if end - self.elem_start > self.max_element_bytes {
            return Err(DecodeError::ElementTooLarge {
                offset: self.base_offset + self.elem_start as u64,
                limit: self.max_element_bytes,
            });
        }
        let slice = &self.buf[self.elem_start..end];
        serde_json::from_slice(slice).map_err(|err| DecodeError::Parse {
            offset: self.base_offset + self.elem_start as u64,
            message: format!("element #{} is not valid JSON: {err}", self.elements_emitted),
            context: preview(slice),
        })
    }

    /// ⏭️ Skip JSON whitespace and peek the next significant byte, if buffered.
    fn skip_ws_peek(&mut self) -> Option<u8> {
        while let Some(&byte) = self.buf.get(self.pos) {
            if matches!(byte, b' ' | b'\t' | b'\n' | b'\r') {
                self.pos += 1;
            } else {
                return Some(byte);
            }
        }
        None
    }

    /// 🧹 Swallow a UTF-8 BOM at the very start of the stream. `Ok(false)` = need more bytes.
    fn skip_bom(&mut self) -> Result<bool, DecodeError> {
        if self.base_offset + self.pos as u64 != 0 {
            return Ok(true);
        }
        let available = &self.buf[self.pos..];
        if available.first() != Some(&UTF8_BOM[0]) {
            return Ok(true);
        }
        if available.len() < UTF8_BOM.len() {
            return Ok(false);
        }
        if &available[..UTF8_BOM.len()] == UTF8_BOM {
            self.pos += UTF8_BOM.len();
            Ok(true)
        } else {
            Err(self.parse_error(self.pos, "invalid leading bytes"))
        }
    }

    fn wrong_top_level(&self, byte: u8) -> DecodeError {
        let found = match byte {
            b'{' => "an object",
            b'"' => "a string",
            b'-' | b'0'..=b'9' => "a number",
            b't' | b'f' => "a boolean",
            b'n' => "null",
            _ => return self.parse_error(self.pos, "document does not start with a JSON value"),
        };
        DecodeError::Schema {
            found: found.to_string(),
        }
    }

    fn parse_error(&self, at: usize, message: &str) -> DecodeError {
        let at = at.min(self.buf.len());
        DecodeError::Parse {
            offset: self.base_offset + at as u64,
            message: message.to_string(),
            context: preview(&self.buf[at..]),
        }
    }

    /// 🗑️ Drop bytes nobody will look at again.
    fn compact(&mut self) {
        let cut = if self.phase == Phase::InElement {
            self.elem_start
        } else {
            self.pos
        };
        if cut == 0 {
            return;
        }
        self.buf.drain(..cut);
        self.base_offset += cut as u64;
        self.pos -= cut;
        if self.phase == Phase::InElement {
            self.elem_start = 0;
        }
    }
}

fn preview(bytes: &[u8]) -> String {
    let take = bytes.len().min(PREVIEW_LEN);
    let mut text = String::from_utf8_lossy(&bytes[..take]).into_owned();
    if bytes.len() > PREVIEW_LEN {
        text.push_str("...");
    }
    text
}
