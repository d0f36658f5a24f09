// ai
//! 🧩 Incremental Array Decoder — turns a live byte stream into a lazy stream of JSON values.
//!
//! 🎬 *[a 2 GB JSON array begins to download. somewhere, a heap allocator starts sweating.]*
//! *[it need not have worried.]*
//!
//! The contract, in one breath: bytes of a single top-level JSON array go in, one
//! `serde_json::Value` per element comes out, in array order, one element in memory at a time.
//!
//! 🧠 Knowledge graph:
//! - [`scanner::ArrayScanner`] is the synchronous state machine. It knows nothing about async.
//! - [`decode_array`] glues it to any `Stream<Item = Result<Bytes, FetchError>>` with
//!   `futures::stream::unfold`. Pull-driven: no chunk is read until someone asks for a value.
//! - Errors end the stream. A `Parse`/`Schema` error is yielded once, then `None`. No retry.
//! - A transport error mid-stream is wrapped as [`DecodeError::Transport`]; the orchestrator
//!   reports it as a fetch failure for that source.

pub mod scanner;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;

use crate::error::{DecodeError, FetchError};

pub use scanner::{ArrayScanner, DEFAULT_MAX_ELEMENT_BYTES};

/// 🚰 Everything `unfold` carries between polls.
struct DecodeState<S> {
    scanner: ArrayScanner,
    upstream: S,
    finished: bool,
}

/// 🎯 Adapt a byte stream into a lazy, forward-only stream of array elements.
///
/// `max_element_bytes` caps how large a single element may grow before the decoder gives up
/// with [`DecodeError::ElementTooLarge`].
pub fn decode_array<S>(
    bytes: S,
    max_element_bytes: usize,
) -> impl Stream<Item = Result<Value, DecodeError>>
where
    S: Stream<Item = Result<Bytes, FetchError>> + Unpin,
{
    let state = DecodeState {
        scanner: ArrayScanner::with_max_element_bytes(max_element_bytes),
        upstream: bytes,
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }
        loop {
            // -- 🔎 drain what we already have before asking the network for more
            match state.scanner.next_element() {
                Ok(Some(value)) => return Some((Ok(value), state)),
                Ok(None) => {}
                Err(err) => {
                    state.finished = true;
                    return Some((Err(err), state));
                }
            }

            match state.upstream.next().await {
                Some(Ok(chunk)) => state.scanner.feed(&chunk),
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(DecodeError::Transport(err)), state));
                }
                None => {
                    state.finished = true;
                    return match state.scanner.finish() {
                        Ok(()) => None,
                        Err(err) => Some((Err(err), state)),
                    };
                }
            }
        }
    })
}
