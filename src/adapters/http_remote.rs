//! Home-server remote over HTTP (blocking `reqwest`).
//!
//! | Call            | Request                                   | Timeout            |
//! |-----------------|-------------------------------------------|--------------------|
//! | `notify_status` | `POST {base}/api/status` (JSON)           | `status_timeout_ms`|
//! | weight upload   | `POST {base}/api/weight` (JSON)           | `remote_timeout_ms`|
//! | barcode upload  | `POST {base}/barcode-lookup?upc=<code>`   | `status_timeout_ms`|
//! | `fetch_jobs`    | `GET {base}/api/jobs`                     | `remote_timeout_ms`|
//!
//! The base URL and timeouts are read from the live config snapshot on
//! every call.  An empty `home_server_url` makes every call fail with
//! [`RemoteError::NotConfigured`], so everything buffers locally.

use std::time::Duration;

use log::trace;
use reqwest::blocking::{Client, RequestBuilder, Response};

use crate::app::ports::{RemoteError, RemotePort, StatusReport};
use crate::config::ConfigHandle;
use crate::records::Record;
use crate::scheduler::jobs::JobSpec;

const USER_AGENT: &str = concat!("trashcan/", env!("CARGO_PKG_VERSION"));

#[derive(Clone)]
pub struct HttpRemote {
    client: Client,
    config: ConfigHandle,
}

impl HttpRemote {
    pub fn new(config: ConfigHandle) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|_| RemoteError::Transport)?;
        Ok(Self { client, config })
    }

    /// Base URL without trailing slash, plus the two timeouts.
    fn endpoint(&self) -> Result<(String, Duration, Duration), RemoteError> {
        let cfg = self.config.snapshot();
        let base = cfg.home_server_url.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(RemoteError::NotConfigured);
        }
        Ok((
            base.to_owned(),
            Duration::from_millis(u64::from(cfg.status_timeout_ms)),
            Duration::from_millis(u64::from(cfg.remote_timeout_ms)),
        ))
    }

    fn send(request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = request.send().map_err(classify)?;
        let status = response.status();
        trace!("HTTP | {} {}", status.as_u16(), response.url());
        if status.is_success() {
            Ok(response)
        } else {
            Err(RemoteError::Http(status.as_u16()))
        }
    }
}

fn classify(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Timeout
    } else if e.is_decode() {
        RemoteError::Decode
    } else if let Some(status) = e.status() {
        RemoteError::Http(status.as_u16())
    } else {
        RemoteError::Transport
    }
}

impl RemotePort for HttpRemote {
    fn notify_status(&self, report: &StatusReport) -> Result<(), RemoteError> {
        let (base, short, _) = self.endpoint()?;
        Self::send(
            self.client
                .post(format!("{base}/api/status"))
                .timeout(short)
                .json(report),
        )
        .map(drop)
    }

    fn upload(&self, record: &Record) -> Result<(), RemoteError> {
        let (base, short, long) = self.endpoint()?;
        let request = match record {
            Record::Weight(w) => self
                .client
                .post(format!("{base}/api/weight"))
                .timeout(long)
                .json(w),
            Record::Barcode(b) => self
                .client
                .post(format!("{base}/barcode-lookup"))
                .query(&[("upc", b.code.as_str())])
                .timeout(short)
                .json(b),
        };
        Self::send(request).map(drop)
    }

    fn fetch_jobs(&self) -> Result<Vec<JobSpec>, RemoteError> {
        let (base, _, long) = self.endpoint()?;
        Self::send(self.client.get(format!("{base}/api/jobs")).timeout(long))?
            .json::<Vec<JobSpec>>()
            .map_err(|_| RemoteError::Decode)
    }
}
