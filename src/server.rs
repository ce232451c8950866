//! Serves the line protocol over one connection.
use std::io;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::error::SubmitError;
use crate::line_reader::{Body, LineReader};
use crate::parser::ParsingError;
use crate::store::JobStore;
use crate::submission::Submitter;
use crate::types::protocol::{Command, Response};
use crate::types::serialisable::WireSerialisable;
use crate::util::bytes_to_human_str;

/// Reads commands from `r` and writes responses to `w` until the client
/// quits, hangs up, or `cancel` fires. Payloads over `max_payload_size` get
/// `JOB_TOO_BIG` and the connection is closed, since the rest of the stream
/// can't be trusted to line up with command boundaries.
pub async fn serve<S, R, W>(
    cancel: CancellationToken,
    submitter: &Submitter<S>,
    max_payload_size: u32,
    r: R,
    mut w: W,
) -> io::Result<()>
where
    S: JobStore,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut r: LineReader<_> = r.into();

    // Keep taking lines and parsing and processing them.
    loop {
        let line = select!(
           x = r.read_line() => match x? {
                Some(x) => x,
                None => return Ok(()),
           },
           _ = cancel.cancelled() => return Ok(()),
        );

        trace!(line = bytes_to_human_str(&line), "processing command");

        let cmd: Result<Command, ParsingError> = (&line as &[u8]).try_into();

        let (resp, close) = match cmd {
            Err(error) => (error.serialise_wire(), false),
            Ok(Command::Quit) => return Ok(()),
            Ok(Command::Status { id }) => {
                (respond(submitter.status(id).map(Response::Job)), false)
            },
            Ok(Command::Stats) => {
                (respond(submitter.dashboard().map(Response::Stats)), false)
            },
            Ok(Command::Submit { n_bytes, .. }) if n_bytes > max_payload_size => {
                debug!(n_bytes, max_payload_size, "payload too big");
                (Response::JobTooBig.serialise_wire(), true)
            },
            Ok(Command::Submit { owner, n_bytes }) => {
                let body = select!(
                    x = r.read_body(n_bytes as usize) => match x? {
                        Some(x) => x,
                        None => return Ok(()),
                    },
                    _ = cancel.cancelled() => return Ok(()),
                );

                let resp = match body {
                    Body::MissingCrlf => Response::ExpectedCrlf.serialise_wire(),
                    Body::Complete(data) => match std::str::from_utf8(&data) {
                        Ok(payload) => respond(
                            submitter.submit(&owner, payload).map(Response::Job),
                        ),
                        Err(_) => Response::BadPayload.serialise_wire(),
                    },
                };
                (resp, false)
            },
        };

        // Slightly convoluted, but ensures we write out the buffer properly
        // with cancel safety.
        select! {
            x = w.write_all(&resp) => x?,
            _ = cancel.cancelled() => return Ok(()),
        };

        // Flush once per response so pipelined requests get pipelined
        // answers.
        select! {
            x = w.flush() => x?,
            _ = cancel.cancelled() => return Ok(()),
        };

        if close {
            return Ok(());
        }
    }
}

fn respond(result: Result<Response, SubmitError>) -> Vec<u8> {
    match result {
        Ok(resp) => resp.serialise_wire(),
        Err(error) => {
            error!(%error, "request failed");
            Response::InternalError.serialise_wire()
        },
    }
}
