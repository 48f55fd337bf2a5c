//! Line-delimited JSON transport over a byte stream.
//!
//! Each input line carries one request object or one batch array; each reply
//! is written as a single line in the order the requests arrived. Lines longer
//! than [`MAX_REQUEST_BYTES`] are discarded and answered with an invalid
//! request error so one oversized payload cannot exhaust memory.

use std::io::{self, BufRead, Read, Write};

use serde_json::Value;
use tracing::{debug, warn};

use crate::protocol::{DispatchError, JsonReply};
use crate::server::RpcServer;

use super::PROCESS_TARGET;
use super::shutdown::ShutdownTrigger;

/// Maximum size of a single request line in bytes.
pub const MAX_REQUEST_BYTES: usize = 1024 * 1024;

enum RequestLine {
    Complete(Vec<u8>),
    TooLarge(usize),
    End,
}

/// Serves requests read from `reader` until end of input or until `trigger`
/// fires, writing one reply line per non-blank request line.
///
/// Returns the number of replies written.
///
/// # Errors
///
/// Returns the underlying IO error when reading or writing fails.
pub fn serve_lines<R, W>(
    server: &RpcServer,
    mut reader: R,
    mut writer: W,
    trigger: &ShutdownTrigger,
) -> io::Result<usize>
where
    R: BufRead,
    W: Write,
{
    let mut replies = 0;
    while !trigger.is_fired() {
        let reply = match read_request_line(&mut reader)? {
            RequestLine::End => {
                debug!(target: PROCESS_TARGET, replies, "request stream closed");
                break;
            }
            RequestLine::TooLarge(size) => {
                warn!(
                    target: PROCESS_TARGET,
                    size,
                    max_size = MAX_REQUEST_BYTES,
                    "discarding oversized request"
                );
                error_reply(DispatchError::request_too_large(size, MAX_REQUEST_BYTES))
            }
            RequestLine::Complete(bytes) => match std::str::from_utf8(&bytes) {
                Ok(text) if text.trim().is_empty() => continue,
                Ok(text) => server.handle_text(text.trim()),
                Err(error) => error_reply(DispatchError::MalformedJson {
                    message: error.to_string(),
                    source: None,
                }),
            },
        };
        writer.write_all(reply.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        replies += 1;
    }
    Ok(replies)
}

fn read_request_line<R: BufRead>(reader: &mut R) -> io::Result<RequestLine> {
    let mut buffer = Vec::new();
    let limit = MAX_REQUEST_BYTES as u64 + 1;
    let read = reader.by_ref().take(limit).read_until(b'\n', &mut buffer)?;
    if read == 0 {
        return Ok(RequestLine::End);
    }
    if buffer.len() > MAX_REQUEST_BYTES && buffer.last() != Some(&b'\n') {
        let rest = reader.skip_until(b'\n')?;
        return Ok(RequestLine::TooLarge(buffer.len() + rest));
    }
    Ok(RequestLine::Complete(buffer))
}

fn error_reply(error: DispatchError) -> String {
    JsonReply::from_outcome(Value::Null, Err(error))
        .into_value()
        .to_string()
}
