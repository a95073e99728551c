// Copyright 2025 RisingWave Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// The error kinds surfaced by the store. Each variant carries a
/// human-readable context string; callers prepend field or path
/// breadcrumbs when propagating (see [`WithContext`]).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("parse error: {0}")]
    ParseError(String),
    #[error("convert error: {0}")]
    ConvertError(String),
    #[error("format error: {0}")]
    FormatError(String),
    #[error("no such file: {0}")]
    NoSuchFile(String),
    #[error("io error: {0}")]
    IoError(String),
    #[error("end of input: {0}")]
    EndOfInput(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("stalled: {0}")]
    Stalled(String),
    #[error("version mismatch: {0}")]
    VersionMismatch(String),
    #[error("type clash: {0}")]
    TypeClash(String),
}

impl Error {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    pub fn convert(msg: impl Into<String>) -> Self {
        Self::ConvertError(msg.into())
    }

    pub fn format(msg: impl Into<String>) -> Self {
        Self::FormatError(msg.into())
    }

    pub fn type_clash(msg: impl Into<String>) -> Self {
        Self::TypeClash(msg.into())
    }

    /// Prepend a breadcrumb to the context string, e.g. turning
    /// `type clash: expected count` into `type clash: .port: expected count`.
    pub fn context(self, crumb: impl AsRef<str>) -> Self {
        let prepend = |s: String| format!("{}: {}", crumb.as_ref(), s);
        match self {
            Self::InvalidArgument(s) => Self::InvalidArgument(prepend(s)),
            Self::ParseError(s) => Self::ParseError(prepend(s)),
            Self::ConvertError(s) => Self::ConvertError(prepend(s)),
            Self::FormatError(s) => Self::FormatError(prepend(s)),
            Self::NoSuchFile(s) => Self::NoSuchFile(prepend(s)),
            Self::IoError(s) => Self::IoError(prepend(s)),
            Self::EndOfInput(s) => Self::EndOfInput(prepend(s)),
            Self::Timeout(s) => Self::Timeout(prepend(s)),
            Self::Stalled(s) => Self::Stalled(prepend(s)),
            Self::VersionMismatch(s) => Self::VersionMismatch(prepend(s)),
            Self::TypeClash(s) => Self::TypeClash(prepend(s)),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Self::NoSuchFile(e.to_string()),
            _ => Self::IoError(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::ParseError(e.to_string())
    }
}

/// Breadcrumb propagation for results.
pub trait WithContext {
    #[must_use]
    fn context(self, crumb: impl AsRef<str>) -> Self;
}

impl<T> WithContext for Result<T> {
    fn context(self, crumb: impl AsRef<str>) -> Self {
        self.map_err(|e| e.context(crumb))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breadcrumbs() {
        let err: Result<()> = Err(Error::type_clash("expected count"));
        let err = err.context(".port").context("conn");
        assert_eq!(
            err.unwrap_err().to_string(),
            "type clash: conn: .port: expected count"
        );
    }

    #[test]
    fn test_io_error_kinds() {
        let not_found = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(Error::from(not_found), Error::NoSuchFile(_)));
        let other = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(Error::from(other), Error::IoError(_)));
    }
}
