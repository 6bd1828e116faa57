//! In-process stand-in for the signing module's TCP listener.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};

use crate::dispatch::Endpoint;

pub(crate) struct FakeModule {
    pub endpoint: Endpoint,
    handle: JoinHandle<Vec<Vec<u8>>>,
}

impl FakeModule {
    /// Answers one connection per entry in `responses`, in order.
    ///
    /// Returns every received frame, length word included, from [`join`].
    ///
    /// [`join`]: FakeModule::join
    pub fn serve(responses: Vec<Vec<u8>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = thread::spawn(move || {
            let mut requests = Vec::new();
            for response in responses {
                let (mut stream, _) = listener.accept().unwrap();

                let mut len_buf = [0u8; 4];
                stream.read_exact(&mut len_buf).unwrap();
                let mut body = vec![0u8; u32::from_le_bytes(len_buf) as usize];
                stream.read_exact(&mut body).unwrap();
                let mut frame = len_buf.to_vec();
                frame.extend_from_slice(&body);
                requests.push(frame);

                stream.write_all(&response).unwrap();
            }
            requests
        });

        Self {
            endpoint: Endpoint::new("127.0.0.1", port),
            handle,
        }
    }

    pub fn join(self) -> Vec<Vec<u8>> {
        self.handle.join().unwrap()
    }
}
