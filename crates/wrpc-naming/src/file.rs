//! `file:///path/to/endpoints` — one `host:port` per line, re-read in full on
//! every refresh (no change-detection cache, unlike [`crate::list`]: a file
//! naming source is expected to be rewritten in place by an external process,
//! so every refresh re-reads it unconditionally).

use std::fs;
use std::sync::Weak;

use wrpc_core::{Code, Result, WrpcError};
use wrpc_endpoint::EndpointSet;

use crate::observer::{EndPointUpdateObserver, ObserverToken, Observable};
use crate::resolve::resolve_host_port;
use crate::service::NamingService;

pub struct FileNamingService {
    protocol: String,
    observable: Observable,
}

impl FileNamingService {
    pub fn new(protocol: &str) -> Self {
        Self {
            protocol: protocol.to_string(),
            observable: Observable::new(),
        }
    }
}

impl NamingService for FileNamingService {
    fn protocol(&self) -> &str {
        &self.protocol
    }

    fn refresh(&self, address: &str) -> Result<()> {
        let content = fs::read_to_string(address).map_err(|e| {
            WrpcError::with_detail(Code::InvalidArgument, format!("open {address}: {e}"))
        })?;

        let mut endpoints = EndpointSet::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some((ip, port)) = resolve_host_port(line) {
                endpoints.insert(wrpc_endpoint::Endpoint::new(ip, port));
            } else {
                #[cfg(feature = "tracing")]
                tracing::warn!(line, "file naming service: invalid host:port, skipping");
            }
        }
        self.observable.notify_update(&endpoints);
        Ok(())
    }

    fn add_observer(&self, observer: Weak<dyn EndPointUpdateObserver>) -> ObserverToken {
        self.observable.add_observer(observer)
    }

    fn remove_observer(&self, token: ObserverToken) -> bool {
        self.observable.remove_observer(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Recorder(AtomicUsize);

    impl EndPointUpdateObserver for Recorder {
        fn on_update(&self, endpoints: &EndpointSet) {
            self.0.store(endpoints.len(), Ordering::SeqCst);
        }
    }

    #[test]
    fn reads_one_endpoint_per_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "10.0.0.1:80").unwrap();
        writeln!(file, "10.0.0.2:81").unwrap();
        writeln!(file, "# not a real comment, just garbage").unwrap();

        let svc = FileNamingService::new("file");
        let recorder = Arc::new(Recorder(AtomicUsize::new(0)));
        svc.add_observer(Arc::downgrade(&recorder) as Weak<dyn EndPointUpdateObserver>);

        svc.refresh(file.path().to_str().unwrap()).unwrap();
        assert_eq!(recorder.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn missing_file_is_an_error() {
        let svc = FileNamingService::new("file");
        assert!(svc.refresh("/nonexistent/path").is_err());
    }
}
