use async_trait::async_trait;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, Region};

/// Object storage addressed by key. Writes overwrite.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), BlobError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError>;
}

/// Client for S3-compatible object storage.
pub struct S3BlobStore {
    bucket: Box<Bucket>,
}

impl S3BlobStore {
    pub fn new(
        bucket_name: &str,
        region: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self, BlobError> {
        let region = Region::Custom {
            region: region.to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| BlobError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| BlobError::Config(e.to_string()))?
            .with_path_style();

        Ok(Self { bucket })
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), BlobError> {
        let response = self
            .bucket
            .put_object_with_content_type(key, data, content_type)
            .await
            .map_err(|e| classify_s3_error(key, e))?;
        check_status(key, response.status_code())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        let response = self
            .bucket
            .get_object(key)
            .await
            .map_err(|e| classify_s3_error(key, e))?;
        check_status(key, response.status_code())?;
        Ok(response.bytes().to_vec())
    }
}

fn check_status(key: &str, status: u16) -> Result<(), BlobError> {
    match status {
        200..=299 => Ok(()),
        404 => Err(BlobError::NotFound(key.to_string())),
        403 => Err(BlobError::AccessDenied(key.to_string())),
        code => Err(BlobError::Unavailable(format!("status {code} for {key}"))),
    }
}

fn classify_s3_error(key: &str, err: S3Error) -> BlobError {
    match err {
        S3Error::HttpFailWithBody(status, body) => match check_status(key, status) {
            Err(BlobError::Unavailable(_)) => {
                BlobError::Unavailable(format!("status {status} for {key}: {body}"))
            }
            Err(other) => other,
            Ok(()) => BlobError::Unavailable(body),
        },
        other => BlobError::Unavailable(other.to_string()),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("access denied to object: {0}")]
    AccessDenied(String),

    #[error("object storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(check_status("k", 200).is_ok());
        assert!(matches!(check_status("k", 404), Err(BlobError::NotFound(k)) if k == "k"));
        assert!(matches!(check_status("k", 403), Err(BlobError::AccessDenied(_))));
        assert!(matches!(check_status("k", 503), Err(BlobError::Unavailable(_))));
    }

    #[test]
    fn test_http_fail_with_body_maps_to_not_found() {
        let err = classify_s3_error(
            "photos/x.jpg",
            S3Error::HttpFailWithBody(404, "NoSuchKey".into()),
        );
        assert!(matches!(err, BlobError::NotFound(_)));
    }
}
