use std::io::Read;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, RANGE, USER_AGENT};

use crate::error::GribError;
use crate::index::ByteRange;

pub const STATUS_OK: u16 = 200;
pub const STATUS_PARTIAL_CONTENT: u16 = 206;

pub struct HttpBody {
    pub status: u16,
    pub reader: Box<dyn Read + Send>,
}

impl HttpBody {
    pub fn expect_status(self, url: &str, expected: u16) -> Result<Self, GribError> {
        if self.status != expected {
            return Err(GribError::Status {
                url: url.to_string(),
                status: self.status,
                expected,
            });
        }
        Ok(self)
    }
}

pub trait HttpSource: Send + Sync {
    fn get(&self, url: &str, range: Option<ByteRange>) -> Result<HttpBody, GribError>;
}

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self, GribError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("gribdl/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| GribError::Http(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| GribError::Http(err.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpSource for HttpClient {
    fn get(&self, url: &str, range: Option<ByteRange>) -> Result<HttpBody, GribError> {
        let mut request = self.client.get(url);
        if let Some(range) = range {
            request = request.header(RANGE, range.header_value());
        }
        let response = request
            .send()
            .map_err(|err| GribError::Http(err.to_string()))?;
        Ok(HttpBody {
            status: response.status().as_u16(),
            reader: Box::new(response),
        })
    }
}
