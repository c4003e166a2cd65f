//! Request objects for the backend multipart-upload operations.
//!
//! Each request validates its inputs before any network call and knows how
//! to set the required properties on the corresponding SDK request builder.
use crate::error::{ErrorRepr, Result};
use crate::parts::{CompletedParts, PartNumber};
use crate::state::UploadId;
use crate::uri::ObjectUri;

/// SDK builder for a `CreateMultipartUpload` request.
pub type CreateRequestBuilder =
    aws_sdk_s3::operation::create_multipart_upload::builders::CreateMultipartUploadFluentBuilder;

/// SDK builder for an `UploadPart` request.
pub type UploadPartRequestBuilder =
    aws_sdk_s3::operation::upload_part::builders::UploadPartFluentBuilder;

/// SDK builder for a `CompleteMultipartUpload` request.
pub type CompleteRequestBuilder =
    aws_sdk_s3::operation::complete_multipart_upload::builders::CompleteMultipartUploadFluentBuilder;

/// SDK builder for an `AbortMultipartUpload` request.
pub type AbortRequestBuilder =
    aws_sdk_s3::operation::abort_multipart_upload::builders::AbortMultipartUploadFluentBuilder;

/// Request object for creating a new multipart upload.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub(crate) uri: ObjectUri,
    pub(crate) content_type: Option<String>,
}

impl CreateRequest {
    /// Create a new `CreateRequest` from the minimum required.
    pub fn new(uri: ObjectUri) -> Self {
        Self {
            uri,
            content_type: None,
        }
    }

    /// Set the content type recorded on the created object.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Set the required properties on the SDK request builder for the operation.
    pub fn with_builder(&self, builder: CreateRequestBuilder) -> CreateRequestBuilder {
        builder
            .bucket(&*self.uri.bucket)
            .key(&*self.uri.key)
            .set_content_type(self.content_type.clone())
    }

    /// Returns a reference to the `ObjectUri` for this request.
    pub fn uri(&self) -> &ObjectUri {
        &self.uri
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.uri.is_empty() {
            return Err(ErrorRepr::Missing("CreateRequest", "empty object uri").into());
        }
        Ok(())
    }
}

/// Request object for pre-signing one part's PUT.
#[derive(Debug, Clone)]
pub struct UploadPartRequest {
    pub(crate) id: UploadId,
    pub(crate) uri: ObjectUri,
    pub(crate) part_number: PartNumber,
    pub(crate) bytes: u64,
}

impl UploadPartRequest {
    /// Create a new `UploadPartRequest` from the minimum required.
    pub fn new(id: UploadId, uri: ObjectUri, part_number: PartNumber, bytes: u64) -> Self {
        Self {
            id,
            uri,
            part_number,
            bytes,
        }
    }

    /// Set the required properties on the SDK request builder for the operation.
    pub fn with_builder(&self, builder: UploadPartRequestBuilder) -> UploadPartRequestBuilder {
        builder
            .bucket(&*self.uri.bucket)
            .key(&*self.uri.key)
            .upload_id(&*self.id)
            .part_number(*self.part_number)
    }

    /// Returns the upload id this part belongs to.
    pub fn id(&self) -> &UploadId {
        &self.id
    }

    /// Returns the addressed part number.
    pub fn part_number(&self) -> PartNumber {
        self.part_number
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.uri.is_empty() {
            return Err(ErrorRepr::Missing("UploadPartRequest", "empty object uri").into());
        }
        if self.id.is_empty() {
            return Err(ErrorRepr::Missing("UploadPartRequest", "empty upload id").into());
        }
        if *self.part_number < 1 {
            return Err(
                ErrorRepr::Missing("UploadPartRequest", "part number below one").into(),
            );
        }
        if self.bytes == 0 {
            return Err(ErrorRepr::Missing("UploadPartRequest", "empty part body").into());
        }
        Ok(())
    }
}

/// Request object for completing a multipart upload.
#[derive(Debug, Clone)]
pub struct CompleteRequest {
    pub(crate) id: UploadId,
    pub(crate) uri: ObjectUri,
    pub(crate) parts: CompletedParts,
}

impl CompleteRequest {
    /// Create a new `CompleteRequest` from the minimum required.
    pub fn new(id: UploadId, uri: ObjectUri, parts: CompletedParts) -> Self {
        Self { id, uri, parts }
    }

    /// Set the required properties on the SDK request builder for the operation.
    pub fn with_builder(&self, builder: CompleteRequestBuilder) -> CompleteRequestBuilder {
        builder
            .bucket(&*self.uri.bucket)
            .key(&*self.uri.key)
            .upload_id(&*self.id)
            .multipart_upload(aws_sdk_s3::types::CompletedMultipartUpload::from(
                &self.parts,
            ))
    }

    /// Returns the upload id being completed.
    pub fn id(&self) -> &UploadId {
        &self.id
    }

    /// Returns the ordered completed-part list sent with this request.
    pub fn completed_parts(&self) -> &CompletedParts {
        &self.parts
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.uri.is_empty() {
            return Err(ErrorRepr::Missing("CompleteRequest", "empty object uri").into());
        }
        if self.id.is_empty() {
            return Err(ErrorRepr::Missing("CompleteRequest", "empty upload id").into());
        }
        if self.parts.count() == 0 {
            return Err(ErrorRepr::Missing("CompleteRequest", "no completed parts").into());
        }
        Ok(())
    }
}

/// Request object for aborting a multipart upload.
#[derive(Debug, Clone)]
pub struct AbortRequest {
    pub(crate) id: UploadId,
    pub(crate) uri: ObjectUri,
}

impl AbortRequest {
    /// Create a new `AbortRequest` from the minimum required.
    pub fn new(id: UploadId, uri: ObjectUri) -> Self {
        Self { id, uri }
    }

    /// Set the required properties on the SDK request builder for the operation.
    pub fn with_builder(&self, builder: AbortRequestBuilder) -> AbortRequestBuilder {
        builder
            .bucket(&*self.uri.bucket)
            .key(&*self.uri.key)
            .upload_id(&*self.id)
    }

    /// Returns the upload id being aborted.
    pub fn id(&self) -> &UploadId {
        &self.id
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.uri.is_empty() {
            return Err(ErrorRepr::Missing("AbortRequest", "empty object uri").into());
        }
        if self.id.is_empty() {
            return Err(ErrorRepr::Missing("AbortRequest", "empty upload id").into());
        }
        Ok(())
    }
}
