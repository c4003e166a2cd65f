//! The address of an object in S3.
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt::{self, Formatter};
use std::ops::Deref;

/// The address of an uploaded object in S3.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectUri {
    /// The S3 bucket for the object.
    ///
    /// This should be the plain bucket name, e.g., "my-s3-bucket".
    pub bucket: Bucket,
    /// The full key of this object within the bucket.
    pub key: Key,
}

impl ObjectUri {
    /// Create a new `ObjectUri` from bucket and object key.
    pub fn new(bucket: impl Into<Bucket>, key: impl Into<Key>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.bucket.is_empty() || self.key.is_empty()
    }
}

impl fmt::Display for ObjectUri {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", &self.bucket, &self.key)
    }
}

impl<T: Into<Bucket>, U: Into<Key>> From<(T, U)> for ObjectUri {
    fn from((b, k): (T, U)) -> Self {
        ObjectUri::new(b.into(), k.into())
    }
}

/// The destination bucket for an upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bucket(Cow<'static, str>);

impl Bucket {
    /// Create a new `Bucket`.
    pub fn new<T: Into<Cow<'static, str>>>(bucket: T) -> Self {
        let bucket: Cow<'static, str> = bucket.into();
        match bucket.strip_suffix("/") {
            Some(v) => Self(Cow::Owned(v.to_string())),
            _ => Self(bucket),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Deref for Bucket {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for Bucket {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

impl From<String> for Bucket {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// The full key of an object within a bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key(Cow<'static, str>);

impl Key {
    /// Create a new `Key`.
    pub fn new<T: Into<Cow<'static, str>>>(key: T) -> Self {
        let key: Cow<'static, str> = key.into();
        match key.strip_prefix("/") {
            Some(v) => Self(Cow::Owned(v.to_string())),
            _ => Self(key),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Deref for Key {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_display_strips_separators() {
        let uri = ObjectUri::from(("a-bucket/", "/an/object/key.dat"));
        assert_eq!(uri.to_string(), "s3://a-bucket/an/object/key.dat");
    }

    #[test]
    fn uri_empty_checks_both_fields() {
        assert!(ObjectUri::from(("", "key")).is_empty());
        assert!(ObjectUri::from(("bucket", "")).is_empty());
        assert!(!ObjectUri::from(("bucket", "key")).is_empty());
    }
}
