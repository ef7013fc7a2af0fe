// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reqwest-backed byte fetcher.

use async_trait::async_trait;
use bytes::Bytes;
use ifc_lite_viewer_core::{ByteFetcher, FetchError};
use std::time::Duration;

/// HTTP fetcher for worker code and remote models.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Other(e.to_string()))?;
        Ok(Self { client })
    }

    fn convert_error(err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(err.to_string())
        } else if err.is_connect() {
            FetchError::Connection(err.to_string())
        } else if err.is_builder() {
            FetchError::InvalidUrl(err.to_string())
        } else {
            FetchError::Other(err.to_string())
        }
    }
}

#[async_trait]
impl ByteFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let response = self.client.get(url).send().await.map_err(Self::convert_error)?;
        let status = response.status();
        if !status.is_success() {
            tracing::debug!(url = %url, status = status.as_u16(), "Fetch rejected");
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(Self::convert_error)?;
        tracing::debug!(url = %url, size = body.len(), "Fetched");
        Ok(body)
    }
}
