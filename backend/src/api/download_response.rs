//! Attachment response for document downloads.

use axum::body::Body;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

/// File body served as `application/octet-stream` with a download filename
pub struct DownloadResponse {
    data: Bytes,
    filename: String,
}

impl DownloadResponse {
    pub fn attachment(data: Bytes, filename: impl Into<String>) -> Self {
        Self {
            data,
            filename: filename.into(),
        }
    }
}

/// `attachment; filename="..."` with characters that would break the quoted
/// string replaced.
fn content_disposition(filename: &str) -> HeaderValue {
    let safe: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", safe))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

impl IntoResponse for DownloadResponse {
    fn into_response(self) -> Response {
        let headers = [
            (CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
            (CONTENT_LENGTH, HeaderValue::from(self.data.len())),
            (CONTENT_DISPOSITION, content_disposition(&self.filename)),
        ];
        (StatusCode::OK, headers, Body::from(self.data)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_attachment_headers() {
        let response =
            DownloadResponse::attachment(Bytes::from_static(b"data"), "Quarterly report.pdf")
                .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/octet-stream"
        );
        assert_eq!(response.headers().get(CONTENT_LENGTH).unwrap(), "4");
        assert_eq!(
            response.headers().get(CONTENT_DISPOSITION).unwrap(),
            "attachment; filename=\"Quarterly report.pdf\""
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"data");
    }

    #[test]
    fn test_filename_is_sanitized() {
        let value = content_disposition("evil\"name\r\n.txt");
        assert_eq!(value, "attachment; filename=\"evil_name__.txt\"");
        assert_eq!(content_disposition("résumé.pdf"), "attachment; filename=\"r_sum_.pdf\"");
    }
}
