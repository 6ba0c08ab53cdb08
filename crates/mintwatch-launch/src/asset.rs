//! Attachment download.

use crate::http::{self, send_error, status_error};
use async_trait::async_trait;
use mintwatch_core::{
    error::MintError,
    traits::{AssetSource, ImageAsset},
};
use tracing::debug;

/// Upper bound on a downloaded attachment.
const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

/// Downloads attachment images over HTTP.
pub struct HttpAssetSource {
    client: reqwest::Client,
}

impl HttpAssetSource {
    pub fn new(timeout_secs: u64) -> Result<Self, MintError> {
        Ok(Self {
            client: http::client(timeout_secs)?,
        })
    }
}

/// Image type from the leading bytes.
pub fn sniff_image(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => Some("image/png"),
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [b'G', b'I', b'F', b'8', ..] => Some("image/gif"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("image/webp"),
        _ => None,
    }
}

fn extension(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "jpg",
    }
}

/// File name for the upload: the URL's last path segment without its
/// query, with an extension matching the detected type.
fn file_name(url: &str, content_type: &str) -> String {
    let stem = reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .map(|seg| seg.split('.').next().unwrap_or_default().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "image".to_string());
    format!("{stem}.{}", extension(content_type))
}

#[async_trait]
impl AssetSource for HttpAssetSource {
    async fn fetch_image(&self, url: &str) -> Result<ImageAsset, MintError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| send_error("image download", e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error("image download", status, &body));
        }

        let declared = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or_default().trim().to_ascii_lowercase());

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| MintError::Transient(format!("image download body: {e}")))?;
        if bytes.is_empty() {
            return Err(MintError::Permanent(format!("empty image at {url}")));
        }
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(MintError::Permanent(format!(
                "image at {url} is {} bytes, over the {MAX_IMAGE_BYTES} limit",
                bytes.len()
            )));
        }

        // The sniffed type wins; a declared image type without a known
        // signature is not trusted.
        let content_type = sniff_image(&bytes).ok_or_else(|| {
            MintError::Permanent(format!(
                "not a decodable image at {url} (declared {})",
                declared.as_deref().unwrap_or("nothing")
            ))
        })?;

        debug!("downloaded {} bytes of {content_type} from {url}", bytes.len());
        Ok(ImageAsset {
            bytes: bytes.to_vec(),
            content_type: content_type.to_string(),
            file_name: file_name(url, content_type),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{closed_url, serve, Canned};

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];

    #[test]
    fn test_sniff_image() {
        assert_eq!(sniff_image(PNG), Some("image/png"));
        assert_eq!(sniff_image(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
        assert_eq!(sniff_image(b"GIF89a"), Some("image/gif"));
        assert_eq!(sniff_image(b"RIFF\0\0\0\0WEBPVP8 "), Some("image/webp"));
        assert_eq!(sniff_image(b"<html>"), None);
        assert_eq!(sniff_image(b""), None);
    }

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(
            file_name("https://pbs.test/media/AbC123.jpg?format=jpg&name=large", "image/jpeg"),
            "AbC123.jpg"
        );
        assert_eq!(file_name("https://pbs.test/media/x", "image/png"), "x.png");
        assert_eq!(file_name("https://pbs.test/", "image/gif"), "image.gif");
    }

    #[tokio::test]
    async fn test_fetch_png() {
        let (base, seen) = serve(vec![Canned {
            status: 200,
            content_type: "image/png",
            body: PNG.to_vec(),
        }])
        .await;
        let source = HttpAssetSource::new(5).unwrap();
        let asset = source
            .fetch_image(&format!("{base}/media/logo.png"))
            .await
            .unwrap();
        assert_eq!(asset.content_type, "image/png");
        assert_eq!(asset.file_name, "logo.png");
        assert_eq!(asset.bytes, PNG);
        assert_eq!(
            seen.lock().unwrap()[0].request_line(),
            "GET /media/logo.png HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn test_non_image_is_permanent() {
        let (base, _) = serve(vec![Canned {
            status: 200,
            content_type: "text/html",
            body: b"<html></html>".to_vec(),
        }])
        .await;
        let source = HttpAssetSource::new(5).unwrap();
        let err = source.fetch_image(&format!("{base}/x")).await.unwrap_err();
        assert!(matches!(err, MintError::Permanent(_)));
    }

    #[tokio::test]
    async fn test_missing_image_is_permanent() {
        let (base, _) = serve(vec![Canned::json(404, "{}")]).await;
        let source = HttpAssetSource::new(5).unwrap();
        let err = source.fetch_image(&format!("{base}/x")).await.unwrap_err();
        assert!(matches!(err, MintError::Permanent(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transient() {
        let source = HttpAssetSource::new(5).unwrap();
        let err = source
            .fetch_image(&format!("{}/x", closed_url().await))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
