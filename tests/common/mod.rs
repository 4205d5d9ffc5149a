#![allow(dead_code)]

pub mod temp_files {
    use std::io::Write;

    use tempfile::NamedTempFile;

    /// Write `content` to a temporary file ending in `.{ext}`.
    pub fn create_temp_config(content: &str, ext: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new()
            .prefix("routescope_test_")
            .suffix(&format!(".{ext}"))
            .tempfile()
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    pub fn create_temp_yaml(content: &str) -> NamedTempFile {
        create_temp_config(content, "yaml")
    }

    pub fn create_temp_toml(content: &str) -> NamedTempFile {
        create_temp_config(content, "toml")
    }
}

pub mod exchange {
    use routescope::server::{
        BufferedResponse, Dispatched, MemoryRequest, Server, SharedRequest, SharedResponse,
    };

    pub fn pair(method: &str, target: &str) -> (SharedRequest, SharedResponse) {
        (
            MemoryRequest::new(method, target).into_shared(),
            BufferedResponse::new().into_shared(),
        )
    }

    pub fn get(server: &Server, target: &str) -> Dispatched {
        let (req, res) = pair("GET", target);
        server.dispatch(req, res)
    }

    pub fn body(out: &Dispatched) -> String {
        String::from_utf8_lossy(out.response.borrow().body()).into_owned()
    }

    pub fn status(out: &Dispatched) -> u16 {
        out.response.borrow().status()
    }
}

pub mod db {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use routescope::db::{BackendError, Connection, Row};
    use serde_json::Value;

    /// Connection that records every statement and answers queries from a
    /// queue of canned result sets.
    #[derive(Default)]
    pub struct RecordingConnection {
        pub log: RefCell<Vec<(String, Vec<Value>)>>,
        results: RefCell<VecDeque<Vec<Row>>>,
        fail_with: RefCell<Option<String>>,
    }

    impl RecordingConnection {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_rows(&self, rows: Vec<Value>) {
            let rows = rows
                .into_iter()
                .filter_map(|v| v.as_object().cloned())
                .collect();
            self.results.borrow_mut().push_back(rows);
        }

        pub fn fail_next(&self, message: &str) {
            *self.fail_with.borrow_mut() = Some(message.to_string());
        }

        pub fn statements(&self) -> Vec<String> {
            self.log.borrow().iter().map(|(sql, _)| sql.clone()).collect()
        }

        pub fn params(&self, index: usize) -> Vec<Value> {
            self.log.borrow()[index].1.clone()
        }

        fn record(&self, sql: &str, params: &[Value]) -> Result<(), BackendError> {
            self.log.borrow_mut().push((sql.to_string(), params.to_vec()));
            match self.fail_with.borrow_mut().take() {
                Some(message) => Err(message.into()),
                None => Ok(()),
            }
        }
    }

    impl Connection for RecordingConnection {
        fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, BackendError> {
            self.record(sql, params)?;
            Ok(self.results.borrow_mut().pop_front().unwrap_or_default())
        }

        fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, BackendError> {
            self.record(sql, params)?;
            Ok(1)
        }
    }
}

pub mod http {
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpStream};
    use std::time::Duration;

    /// Send a raw HTTP/1.1 request and return the whole response text.
    pub fn send_request(addr: &SocketAddr, req: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(req.as_bytes()).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let mut buf = Vec::new();
        let mut tmp = [0u8; 1024];
        loop {
            match stream.read(&mut tmp) {
                Ok(0) => break,
                Ok(n) => buf.extend_from_slice(&tmp[..n]),
                Err(_) => break,
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    pub fn get(addr: &SocketAddr, path: &str) -> String {
        send_request(
            addr,
            &format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"),
        )
    }

    pub fn status_line(response: &str) -> &str {
        response.lines().next().unwrap_or("")
    }

    pub fn body(response: &str) -> &str {
        response.split_once("\r\n\r\n").map(|(_, b)| b).unwrap_or("")
    }
}
