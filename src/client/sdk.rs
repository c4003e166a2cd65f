//! Backend calls through the AWS SDK S3 [`Client`].
//!
//! [`Client`]: aws_sdk_s3::Client
use super::request::{AbortRequest, CompleteRequest, CreateRequest, UploadPartRequest};
use crate::error::{Error, ErrorRepr, Result};
use crate::state::UploadId;

use aws_config::SdkConfig;
use aws_sdk_s3 as s3;
use s3::error::ProvideErrorMetadata;
use s3::presigning::PresigningConfig;
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::time::Duration;
use tracing::warn;

/// Stable classification of backend service errors for caller-facing
/// reporting, derived from the S3 error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ServiceErrorKind {
    NotAuthorized,
    NotFound,
    Conflict,
    Throttling,
    Configuration,
    Unknown,
}

impl ServiceErrorKind {
    /// Classify an S3 error code.
    pub fn classify(code: Option<&str>) -> Self {
        match code {
            Some("AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch"
            | "ExpiredToken" | "InvalidToken") => Self::NotAuthorized,
            Some("NoSuchBucket" | "NoSuchKey" | "NoSuchUpload" | "NotFound") => Self::NotFound,
            Some("BucketAlreadyExists" | "BucketAlreadyOwnedByYou" | "OperationAborted") => {
                Self::Conflict
            }
            Some("SlowDown" | "RequestLimitExceeded" | "Throttling" | "ThrottlingException") => {
                Self::Throttling
            }
            Some(
                "InvalidBucketName" | "PermanentRedirect" | "IllegalLocationConstraintException"
                | "AuthorizationHeaderMalformed",
            ) => Self::Configuration,
            _ => Self::Unknown,
        }
    }
}

impl Display for ServiceErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotAuthorized => "not-authorized",
            Self::NotFound => "not-found",
            Self::Conflict => "conflict",
            Self::Throttling => "throttling",
            Self::Configuration => "configuration",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A pre-signed part PUT ready to hand to the background transport.
#[derive(Debug, Clone)]
pub struct PresignedUploadPart {
    /// The time-limited URL authorizing the PUT.
    pub url: String,
    /// Headers that were signed into the URL and must be sent with it.
    pub headers: HashMap<String, String>,
}

/// S3 [`Client`] type from the AWS SDK.
///
/// [`Client`]: aws_sdk_s3::Client
#[derive(Debug, Clone)]
pub struct SdkClient(s3::Client);

impl SdkClient {
    /// Create a new `SdkClient` from an existing SDK `Client`.
    ///
    /// [`Client`]: aws_sdk_s3::Client
    pub fn new(client: s3::Client) -> Self {
        SdkClient(client)
    }

    /// Create a new `SdkClient` from an [`SdkConfig`].
    ///
    /// [`SdkConfig`]: aws_config::SdkConfig
    pub fn from_sdk_config(config: SdkConfig) -> Self {
        let client = s3::Client::new(&config);
        Self::new(client)
    }

    /// Issue the `CreateMultipartUpload` call, returning the assigned id.
    pub async fn create_upload(&self, req: CreateRequest) -> Result<UploadId> {
        req.validate()?;
        let builder = req.with_builder(self.0.create_multipart_upload());

        let uri = req.uri();
        let resp = builder.send().await.map_err(|e| {
            warn!(%uri, code = e.code(), service_error = %ServiceErrorKind::classify(e.code()), "create upload failed");
            ErrorRepr::Create {
                uri: uri.clone(),
                source: Box::new(e),
            }
        })?;

        match resp.upload_id() {
            Some(id) if !id.is_empty() => Ok(UploadId::from(id)),
            _ => Err(ErrorRepr::Missing("CreateMultipartUpload", "upload id").into()),
        }
    }

    /// Pre-sign the PUT for one part.
    pub async fn presign_upload_part(
        &self,
        req: UploadPartRequest,
        expires_in: Duration,
    ) -> Result<PresignedUploadPart> {
        req.validate()?;
        let id = req.id().clone();
        let part = req.part_number();
        let builder = req.with_builder(self.0.upload_part());

        let config = PresigningConfig::expires_in(expires_in).map_err(|e| ErrorRepr::Presign {
            id: id.clone(),
            part,
            source: Box::new(e),
        })?;
        let presigned = builder.presigned(config).await.map_err(|e| {
            warn!(%id, %part, code = e.code(), service_error = %ServiceErrorKind::classify(e.code()), "presigning part failed");
            ErrorRepr::Presign {
                id: id.clone(),
                part,
                source: Box::new(e),
            }
        })?;

        let headers = presigned
            .headers()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Ok(PresignedUploadPart {
            url: presigned.uri().to_string(),
            headers,
        })
    }

    /// Issue the `CompleteMultipartUpload` call with the ordered part list.
    pub async fn complete_upload(&self, req: CompleteRequest) -> Result<()> {
        req.validate()?;
        let id = req.id().clone();
        let builder = req.with_builder(self.0.complete_multipart_upload());

        builder
            .send()
            .await
            .map_err(|e| {
                warn!(%id, code = e.code(), service_error = %ServiceErrorKind::classify(e.code()), "complete upload failed");
                Error::from(ErrorRepr::Complete {
                    id: id.clone(),
                    source: Box::new(e),
                })
            })
            .map(|_| ())
    }

    /// Issue the `AbortMultipartUpload` call.
    pub async fn abort_upload(&self, req: AbortRequest) -> Result<()> {
        req.validate()?;
        let id = req.id().clone();
        let builder = req.with_builder(self.0.abort_multipart_upload());

        builder
            .send()
            .await
            .map_err(|e| {
                warn!(%id, code = e.code(), service_error = %ServiceErrorKind::classify(e.code()), "abort upload failed");
                Error::from(ErrorRepr::Abort {
                    id: id.clone(),
                    source: Box::new(e),
                })
            })
            .map(|_| ())
    }
}
