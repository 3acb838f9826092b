//! # Metrics module
//!
//! This module expose the prometheus metrics gathered from the operator

use hyper::{
    header::{self, HeaderValue, InvalidHeaderValue},
    Body, Request, Response, StatusCode,
};
use prometheus::{gather, Encoder, TextEncoder};

// -----------------------------------------------------------------------------
// Error enum

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to serialize metrics, {0}")]
    PrometheusSerialize(prometheus::Error),
    #[error("failed to parse header value given by prometheus, {0}")]
    PrometheusInvalidHeader(InvalidHeaderValue),
}

// -----------------------------------------------------------------------------
// Helper methods

/// returns the metrics of the default registry in the prometheus text format
pub fn encode() -> Result<(Vec<u8>, String), Error> {
    let encoder = TextEncoder::new();
    let mut buf = vec![];

    encoder
        .encode(&gather(), &mut buf)
        .map_err(Error::PrometheusSerialize)?;

    Ok((buf, encoder.format_type().to_string()))
}

#[cfg_attr(feature = "trace", tracing::instrument)]
/// returns in the [`Response`] object the encoded metrics gathered from the
/// application
pub async fn handler(_req: &Request<Body>) -> Result<Response<Body>, Error> {
    let (buf, format) = encode()?;
    let mut res = Response::default();

    res.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&format).map_err(Error::PrometheusInvalidHeader)?,
    );

    *res.status_mut() = StatusCode::OK;
    *res.body_mut() = Body::from(buf);

    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_in_text_format() {
        let (_, format) = encode().expect("metrics to be encoded");

        assert!(format.starts_with("text/plain"));
    }
}
