//! Operation results
//!
//! Every dispatcher call resolves to an [`OperationResult`] instead of a
//! `Result`: callers branch on [`OperationResult::is_success`] rather than
//! propagating errors. Values are only constructible through [`OperationResult::ok`]
//! and [`OperationResult::failure`], which keeps `value` and `error`
//! mutually exclusive. Deserialization goes through the same constructors and
//! rejects records that break that rule.

use crate::error::{BAD_REQUEST_STATUS, ErrorKind, TransportError};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Failure details carried by an unsuccessful result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    pub kind: ErrorKind,
    pub message: String,
    pub status_code: u16,
}

impl OperationError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, status_code: u16) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code,
        }
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({}): {}", self.kind, self.status_code, self.message)
    }
}

impl std::error::Error for OperationError {}

impl From<TransportError> for OperationError {
    fn from(err: TransportError) -> Self {
        Self::new(err.kind(), err.message(), err.status_code())
    }
}

/// Tagged outcome of a transport call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationResult<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<OperationError>,
    status: Option<u16>,
}

#[derive(Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct RawOperationResult<T> {
    success: bool,
    // A present field always holds a value, so `()` serialized as `null` survives.
    #[serde(default, deserialize_with = "present")]
    value: Option<T>,
    #[serde(default)]
    error: Option<OperationError>,
    #[serde(default)]
    status: Option<u16>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for OperationResult<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;

        let raw = RawOperationResult::<T>::deserialize(deserializer)?;
        match (raw.success, raw.value, raw.error) {
            (true, Some(value), None) => {
                let status = raw
                    .status
                    .ok_or_else(|| D::Error::missing_field("status"))?;
                if !(200..300).contains(&status) {
                    return Err(D::Error::custom(format!(
                        "successful result with non-2xx status {status}"
                    )));
                }
                Ok(Self::ok(value, status))
            }
            (false, None, Some(error)) => {
                if raw.status.is_some_and(|s| s != error.status_code) {
                    return Err(D::Error::custom("status does not match error status_code"));
                }
                Ok(Self::failure(error))
            }
            (true, _, _) => Err(D::Error::custom(
                "successful result must carry a value and no error",
            )),
            (false, _, _) => Err(D::Error::custom(
                "failed result must carry an error and no value",
            )),
        }
    }
}

/// Result of a call that produces no payload.
pub type Outcome = OperationResult<()>;

impl<T> OperationResult<T> {
    /// Successful result for a response with the given status.
    ///
    /// A non-2xx status is never reported as a success: the value is dropped
    /// and a protocol error takes its place.
    pub fn ok(value: T, status: u16) -> Self {
        if !(200..300).contains(&status) {
            return Self::failure(OperationError::new(
                ErrorKind::Protocol,
                format!("unexpected status {status}"),
                status,
            ));
        }
        Self {
            success: true,
            value: Some(value),
            error: None,
            status: Some(status),
        }
    }

    /// Failed result.
    pub fn failure(error: OperationError) -> Self {
        Self {
            success: false,
            status: Some(error.status_code),
            value: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn error(&self) -> Option<&OperationError> {
        self.error.as_ref()
    }

    /// HTTP status observed for this call (or the bad-request equivalent
    /// for failures without a response).
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn into_value(self) -> Option<T> {
        self.value
    }

    pub fn into_result(self) -> Result<T, OperationError> {
        match (self.value, self.error) {
            (Some(v), None) => Ok(v),
            (_, Some(e)) => Err(e),
            (None, None) => Err(OperationError::new(
                ErrorKind::Transport,
                "result holds neither value nor error",
                BAD_REQUEST_STATUS,
            )),
        }
    }

    /// Transform the value, keeping status and error untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OperationResult<U> {
        OperationResult {
            success: self.success,
            value: self.value.map(f),
            error: self.error,
            status: self.status,
        }
    }
}

impl<T> From<TransportError> for OperationResult<T> {
    fn from(err: TransportError) -> Self {
        Self::failure(err.into())
    }
}

impl<T> From<crate::error::Result<OperationResult<T>>> for OperationResult<T> {
    fn from(res: crate::error::Result<OperationResult<T>>) -> Self {
        res.unwrap_or_else(Self::from)
    }
}
