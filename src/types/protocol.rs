use serde::Serialize;
use tracing::error;

use super::job::JobView;
use super::serialisable::WireSerialisable;
use crate::dashboard::Dashboard;

/// A command sent by the client to the server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    /// Submits a payload of `n_bytes` bytes on behalf of `owner`. The payload
    /// follows on the next line. Responds with the job's view, which may be
    /// an existing job if the payload was seen before.
    ///
    /// On the wire: `submit <owner> <bytes>\r\n<payload>\r\n`
    Submit { owner: String, n_bytes: u32 },
    /// Reports on a job by id. Unknown ids get a view with state
    /// `not_found`, never an error.
    ///
    /// On the wire: `status <id>`
    Status { id: u64 },
    /// Returns queue-wide counts and the most recent jobs.
    ///
    /// On the wire: `stats`
    Stats,
    /// Closes the connection.
    ///
    /// On the wire: `quit`
    Quit,
}

/// A reply from the server to a command, other than parse errors.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Response {
    Job(JobView),
    Stats(Dashboard),
    /// The payload wasn't followed by CRLF.
    ExpectedCrlf,
    /// The payload is longer than the server accepts.
    JobTooBig,
    /// The payload isn't valid UTF-8.
    BadPayload,
    /// The job store couldn't complete the request.
    InternalError,
}

/// Wraps a YAML document as `OK <bytes>\r\n<data>\r\n`.
fn ok_with_yaml<T: Serialize>(value: &T) -> Vec<u8> {
    match serde_yaml::to_string(value) {
        Ok(data) => {
            let mut out = format!("OK {}\r\n", data.len()).into_bytes();
            out.extend_from_slice(data.as_bytes());
            out.extend_from_slice(b"\r\n");
            out
        },
        Err(error) => {
            error!(%error, "failed to encode response");
            b"INTERNAL_ERROR\r\n".to_vec()
        },
    }
}

impl WireSerialisable for Response {
    fn serialise_wire(&self) -> Vec<u8> {
        match self {
            Response::Job(view) => ok_with_yaml(view),
            Response::Stats(dash) => ok_with_yaml(dash),
            Response::ExpectedCrlf => b"EXPECTED_CRLF\r\n".to_vec(),
            Response::JobTooBig => b"JOB_TOO_BIG\r\n".to_vec(),
            Response::BadPayload => b"BAD_FORMAT\r\n".to_vec(),
            Response::InternalError => b"INTERNAL_ERROR\r\n".to_vec(),
        }
    }
}
