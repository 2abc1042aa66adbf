use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use sim_spawn_proto::{RequestFrame, ResponseFrame, SimRequest, SimResponse};
use tracing::{debug, trace};

use super::ConnectionError;
use crate::tick::CancelToken;

/// Newline-delimited JSON request/response channel. One request in flight at
/// a time; responses carrying another id are stale and get dropped.
pub(crate) struct Connection {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    pending: Vec<u8>,
    next_id: u64,
    timeout: Duration,
    poll_interval: Duration,
}

impl Connection {
    pub(crate) fn new(
        stream: TcpStream,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Self, ConnectionError> {
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(timeout))?;
        let reader_stream = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(reader_stream),
            writer: BufWriter::new(stream),
            pending: Vec::new(),
            next_id: 1,
            timeout,
            poll_interval,
        })
    }

    pub(crate) fn set_poll_interval(&mut self, poll_interval: Duration) {
        self.poll_interval = poll_interval;
    }

    pub(crate) fn call(
        &mut self,
        operation: &'static str,
        request: SimRequest,
    ) -> Result<SimResponse, ConnectionError> {
        let id = self.send(request)?;
        self.receive(id, operation, None)?
            .ok_or_else(|| ConnectionError::Protocol(format!("{operation} was abandoned")))
    }

    /// Like `call`, but yields `Ok(None)` as soon as `cancel` is set. The
    /// late answer, if any, is discarded by the next call.
    pub(crate) fn call_cancellable(
        &mut self,
        operation: &'static str,
        request: SimRequest,
        cancel: &CancelToken,
    ) -> Result<Option<SimResponse>, ConnectionError> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        let id = self.send(request)?;
        self.receive(id, operation, Some(cancel))
    }

    fn send(&mut self, request: SimRequest) -> Result<u64, ConnectionError> {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        let frame = RequestFrame { id, request };
        serde_json::to_writer(&mut self.writer, &frame)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        trace!(id, "request sent");
        Ok(id)
    }

    fn receive(
        &mut self,
        id: u64,
        operation: &'static str,
        cancel: Option<&CancelToken>,
    ) -> Result<Option<SimResponse>, ConnectionError> {
        // No deadline when the timeout does not fit in an `Instant`.
        let deadline = Instant::now().checked_add(self.timeout);
        loop {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                return Ok(None);
            }
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => self.timeout,
            };
            if remaining.is_zero() {
                return Err(ConnectionError::Timeout {
                    operation,
                    timeout: self.timeout,
                });
            }
            let window = match cancel {
                Some(_) => remaining.min(self.poll_interval),
                None => remaining,
            };
            self.reader.get_ref().set_read_timeout(Some(window))?;

            match self.reader.read_until(b'\n', &mut self.pending) {
                Ok(0) => return Err(ConnectionError::Closed),
                Ok(_) => {
                    if self.pending.last() != Some(&b'\n') {
                        return Err(ConnectionError::Closed);
                    }
                    let line = std::mem::take(&mut self.pending);
                    let trimmed = line.trim_ascii();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let frame: ResponseFrame = serde_json::from_slice(trimmed)?;
                    if frame.id != id {
                        debug!(
                            expected = id,
                            received = frame.id,
                            kind = frame.response.kind(),
                            "dropping stale response"
                        );
                        continue;
                    }
                    return Ok(Some(frame.response));
                }
                Err(err) if is_poll_expiry(&err) => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }
}

fn is_poll_expiry(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}
