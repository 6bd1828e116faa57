//! Transport for module jobs.
//!
//! Every job gets its own TCP connection: connect, write the whole frame,
//! read until the module closes the stream, done. Nothing here retries.
//!
//! An endpoint timeout is a deadline for the whole round trip. Each socket
//! call gets whatever is left of it, so a peer trickling bytes cannot keep
//! the caller blocked past the deadline.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

use crate::protocol::{build_frame, Job};

/// Upper bound on a module response (1MB).
pub const MAX_RESPONSE_SIZE: usize = 1024 * 1024;

const READ_CHUNK_SIZE: usize = 4096;

/// Where the signing module listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    /// Deadline for connect, write and read together. `None` blocks
    /// indefinitely.
    pub timeout: Option<Duration>,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn connect(&self, deadline: Option<Instant>) -> Result<TcpStream, TransportError> {
        match self.time_left(Stage::Connect, deadline)? {
            None => TcpStream::connect((self.host.as_str(), self.port))
                .map_err(|e| self.failure(Stage::Connect, e)),
            Some(left) => self.connect_timeout(left),
        }
    }

    /// Time remaining before `deadline`, or a timeout error once it passed.
    fn time_left(
        &self,
        stage: Stage,
        deadline: Option<Instant>,
    ) -> Result<Option<Duration>, TransportError> {
        let Some(deadline) = deadline else {
            return Ok(None);
        };
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return Err(self.timed_out(stage));
        }
        Ok(Some(left))
    }

    fn timed_out(&self, stage: Stage) -> TransportError {
        TransportError::Timeout {
            stage,
            endpoint: self.to_string(),
            timeout: self.timeout.unwrap_or_default(),
        }
    }

    fn write_frame(
        &self,
        stream: &mut TcpStream,
        frame: &[u8],
        deadline: Option<Instant>,
    ) -> Result<(), TransportError> {
        let mut written = 0;
        while written < frame.len() {
            if let Some(left) = self.time_left(Stage::Write, deadline)? {
                stream
                    .set_write_timeout(Some(left))
                    .map_err(|e| self.failure(Stage::Write, e))?;
            }
            match stream.write(&frame[written..]) {
                Ok(0) => {
                    return Err(self.failure(Stage::Write, io::ErrorKind::WriteZero.into()));
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(self.failure(Stage::Write, e)),
            }
        }
        stream.flush().map_err(|e| self.failure(Stage::Write, e))
    }

    /// Reads until the module closes the stream.
    fn read_response(
        &self,
        stream: &mut TcpStream,
        deadline: Option<Instant>,
    ) -> Result<Vec<u8>, TransportError> {
        let mut response = Vec::new();
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            if let Some(left) = self.time_left(Stage::Read, deadline)? {
                stream
                    .set_read_timeout(Some(left))
                    .map_err(|e| self.failure(Stage::Read, e))?;
            }
            match stream.read(&mut chunk) {
                Ok(0) => return Ok(response),
                Ok(n) => {
                    response.extend_from_slice(&chunk[..n]);
                    if response.len() > MAX_RESPONSE_SIZE {
                        return Err(TransportError::ResponseTooLarge {
                            endpoint: self.to_string(),
                            max: MAX_RESPONSE_SIZE,
                        });
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(self.failure(Stage::Read, e)),
            }
        }
    }

    fn connect_timeout(&self, timeout: Duration) -> Result<TcpStream, TransportError> {
        let addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| self.failure(Stage::Connect, e))?;

        let mut last_err = io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            "host resolved to no addresses",
        );
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = e,
            }
        }
        Err(self.failure(Stage::Connect, last_err))
    }

    fn failure(&self, stage: Stage, source: io::Error) -> TransportError {
        let endpoint = self.to_string();
        if let Some(timeout) = self.timeout {
            if matches!(
                source.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            ) {
                return TransportError::Timeout {
                    stage,
                    endpoint,
                    timeout,
                };
            }
        }
        match stage {
            Stage::Connect => TransportError::ConnectFailed { endpoint, source },
            Stage::Write => TransportError::WriteFailed { endpoint, source },
            Stage::Read => TransportError::ReadFailed { endpoint, source },
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Point in a round trip where the transport failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Connect,
    Write,
    Read,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Connect => "connect",
            Stage::Write => "write",
            Stage::Read => "read",
        })
    }
}

/// Errors from a single module round trip.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {endpoint}: {source}")]
    ConnectFailed {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to send job to {endpoint}: {source}")]
    WriteFailed {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to read response from {endpoint}: {source}")]
    ReadFailed {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("{stage} to {endpoint} timed out after {timeout:?}")]
    Timeout {
        stage: Stage,
        endpoint: String,
        timeout: Duration,
    },

    #[error("job payload of {0} bytes does not fit a frame")]
    FrameTooLarge(usize),

    #[error("response from {endpoint} exceeds {max} bytes")]
    ResponseTooLarge { endpoint: String, max: usize },
}

/// Sends one job and returns the module's raw, unclassified response.
pub fn send_job(job: Job, payload: &[u8], endpoint: &Endpoint) -> Result<Vec<u8>, TransportError> {
    let frame = build_frame(job, payload).ok_or(TransportError::FrameTooLarge(payload.len()))?;

    debug!(
        "Dispatching job={}, payload_len={}, endpoint={}",
        job,
        payload.len(),
        endpoint
    );

    let deadline = endpoint.timeout.map(|timeout| Instant::now() + timeout);
    let mut stream = endpoint.connect(deadline)?;
    endpoint.write_frame(&mut stream, &frame, deadline)?;
    let response = endpoint.read_response(&mut stream, deadline)?;

    debug!("Job {} answered with {} bytes", job, response.len());
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::FakeModule;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_send_job_round_trip() {
        let module = FakeModule::serve(vec![vec![9, 8, 7, 6, 5]]);

        let response = send_job(Job::SignVote, &[1, 2, 3, 4], &module.endpoint).unwrap();
        assert_eq!(response, vec![9, 8, 7, 6, 5]);

        let requests = module.join();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0],
            vec![8, 0, 0, 0, 2, 0, 0, 0, 1, 2, 3, 4],
            "length word, job number, payload"
        );
    }

    #[test]
    fn test_each_job_uses_fresh_connection() {
        let module = FakeModule::serve(vec![vec![1], vec![2]]);

        assert_eq!(send_job(Job::LoadKey, &[], &module.endpoint).unwrap(), vec![1]);
        assert_eq!(send_job(Job::GenerateKey, &[], &module.endpoint).unwrap(), vec![2]);

        assert_eq!(module.join().len(), 2);
    }

    #[test]
    fn test_connect_refused() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let endpoint = Endpoint::new("127.0.0.1", port);
        let err = send_job(Job::LoadKey, &[], &endpoint).unwrap_err();
        assert!(matches!(err, TransportError::ConnectFailed { .. }), "{err}");
    }

    #[test]
    fn test_read_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        // Accept and hold the connection open without answering
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_millis(500));
            drop(stream);
        });

        let endpoint = Endpoint::new("127.0.0.1", port).with_timeout(Duration::from_millis(100));
        let err = send_job(Job::SignVote, &[0; 4], &endpoint).unwrap_err();
        assert!(
            matches!(
                err,
                TransportError::Timeout {
                    stage: Stage::Read,
                    ..
                }
            ),
            "{err}"
        );

        server.join().unwrap();
    }

    #[test]
    fn test_deadline_covers_whole_response() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        // Each byte arrives well inside the timeout, the whole response does not
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            for _ in 0..40 {
                thread::sleep(Duration::from_millis(30));
                if stream.write_all(&[1]).is_err() {
                    break;
                }
            }
        });

        let endpoint = Endpoint::new("127.0.0.1", port).with_timeout(Duration::from_millis(150));
        let started = Instant::now();
        let err = send_job(Job::SignVote, &[0; 4], &endpoint).unwrap_err();
        assert!(
            matches!(
                err,
                TransportError::Timeout {
                    stage: Stage::Read,
                    ..
                }
            ),
            "{err}"
        );
        assert!(started.elapsed() < Duration::from_millis(800));

        server.join().unwrap();
    }

    #[test]
    fn test_response_size_capped() {
        let module = FakeModule::serve(vec![vec![0; MAX_RESPONSE_SIZE + 1]]);
        let err = send_job(Job::GenerateKey, &[], &module.endpoint).unwrap_err();
        assert!(matches!(err, TransportError::ResponseTooLarge { .. }), "{err}");
        module.join();
    }

    #[test]
    fn test_endpoint_display() {
        assert_eq!(Endpoint::new("10.0.0.1", 49999).to_string(), "10.0.0.1:49999");
    }
}
