//! Shared plumbing for REST calls to external services.

use std::time::Duration;

use reqwest::{Client, Response};

use crate::error::{Result, ServiceError};

/// Build an HTTP client with the given request timeout.
pub(crate) fn http_client(timeout_secs: u64) -> Result<Client> {
    let client = Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(ServiceError::Http)?;
    Ok(client)
}

/// Turn a non-success response into a `ServiceError::Status`.
pub(crate) async fn ensure_success(service: &'static str, response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::Status {
        service,
        status,
        body,
    }
    .into())
}

/// Encode an image as PNG bytes for upload.
pub(crate) fn encode_png(image: &image::DynamicImage) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    image.write_to(&mut std::io::Cursor::new(&mut data), image::ImageFormat::Png)?;
    Ok(data)
}
