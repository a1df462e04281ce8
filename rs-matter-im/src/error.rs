/*
 *
 *    Copyright (c) 2020-2022 Project CHIP Authors
 *
 *    Licensed under the Apache License, Version 2.0 (the "License");
 *    you may not use this file except in compliance with the License.
 *    You may obtain a copy of the License at
 *
 *        http://www.apache.org/licenses/LICENSE-2.0
 *
 *    Unless required by applicable law or agreed to in writing, software
 *    distributed under the License is distributed on an "AS IS" BASIS,
 *    WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *    See the License for the specific language governing permissions and
 *    limitations under the License.
 */

use core::{array::TryFromSliceError, fmt, str::Utf8Error};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorCode {
    AttributeNotFound,
    ClusterNotFound,
    EndpointNotFound,
    Busy,
    /// The peer closed the exchange, or the transport could not deliver a message
    ConnectionAborted,
    DataVersionMismatch,
    Failure,
    Invalid,
    InvalidAction,
    InvalidData,
    InvalidDataType,
    InvalidOpcode,
    InvalidProto,
    /// An operation was attempted in a state of the interaction which does not allow it
    InvalidState,
    /// A received IM message could not be decoded
    MalformedMessage,
    NoSpace,
    NoSpaceExchanges,
    NotFound,
    /// An entry or a message can never fit in the negotiated payload size,
    /// or a fixed-capacity table (like the subscriptions one) is full
    ResourceExhausted,
    StdIoError,
    /// A subscription was lost: its liveness timer expired or the peer tore it down
    SubscriptionDropped,
    Timeout,
    TLVNotFound,
    TLVTypeMismatch,
    /// The peer is not authorized to access a path
    UnsupportedAccess,
    Utf8Fail,
}

impl From<ErrorCode> for Error {
    fn from(code: ErrorCode) -> Self {
        Self::new(code)
    }
}

pub struct Error {
    code: ErrorCode,
    #[cfg(all(feature = "std", feature = "backtrace"))]
    backtrace: std::backtrace::Backtrace,
    #[cfg(all(feature = "std", feature = "backtrace"))]
    inner: Option<Box<dyn std::error::Error + Send>>,
}

impl Error {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            #[cfg(all(feature = "std", feature = "backtrace"))]
            backtrace: std::backtrace::Backtrace::capture(),
            #[cfg(all(feature = "std", feature = "backtrace"))]
            inner: None,
        }
    }

    #[cfg(all(feature = "std", feature = "backtrace"))]
    pub fn new_with_details(
        code: ErrorCode,
        detailed_err: Box<dyn std::error::Error + Send>,
    ) -> Self {
        Self {
            code,
            backtrace: std::backtrace::Backtrace::capture(),
            inner: Some(detailed_err),
        }
    }

    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    #[cfg(all(feature = "std", feature = "backtrace"))]
    pub const fn backtrace(&self) -> &std::backtrace::Backtrace {
        &self.backtrace
    }

    #[cfg(all(feature = "std", feature = "backtrace"))]
    pub fn details(&self) -> Option<&(dyn std::error::Error + Send)> {
        self.inner.as_ref().map(|err| err.as_ref())
    }

    pub fn remap<F>(self, matcher: F, to: Self) -> Self
    where
        F: FnOnce(&Self) -> bool,
    {
        if matcher(&self) {
            to
        } else {
            self
        }
    }

    pub fn map_invalid(self, to: Self) -> Self {
        self.remap(
            |e| matches!(e.code(), ErrorCode::Invalid | ErrorCode::InvalidData),
            to,
        )
    }

    pub fn map_invalid_action(self) -> Self {
        self.map_invalid(Error::new(ErrorCode::InvalidAction))
    }

    /// Collapse all decoding failures (TLV structure, missing mandatory fields,
    /// bad UTF-8) into `ErrorCode::MalformedMessage`.
    pub fn map_malformed(self) -> Self {
        self.remap(
            |e| {
                matches!(
                    e.code(),
                    ErrorCode::Invalid
                        | ErrorCode::InvalidData
                        | ErrorCode::NotFound
                        | ErrorCode::TLVNotFound
                        | ErrorCode::TLVTypeMismatch
                        | ErrorCode::Utf8Fail
                )
            },
            Error::new(ErrorCode::MalformedMessage),
        )
    }

    /// Whether a subscription failing with this error might recover by resubscribing.
    pub const fn is_resubscribable(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::Timeout | ErrorCode::SubscriptionDropped | ErrorCode::ConnectionAborted
        )
    }
}

impl Clone for Error {
    fn clone(&self) -> Self {
        Self::new(self.code)
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Eq for Error {}

#[cfg(all(feature = "std", feature = "backtrace"))]
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::new_with_details(ErrorCode::StdIoError, Box::new(e))
    }
}

#[cfg(all(feature = "std", not(feature = "backtrace")))]
impl From<std::io::Error> for Error {
    fn from(_e: std::io::Error) -> Self {
        Self::new(ErrorCode::StdIoError)
    }
}

impl From<TryFromSliceError> for Error {
    fn from(_e: TryFromSliceError) -> Self {
        Self::new(ErrorCode::Invalid)
    }
}

impl From<Utf8Error> for Error {
    fn from(_e: Utf8Error) -> Self {
        Self::new(ErrorCode::Utf8Fail)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[cfg(not(all(feature = "std", feature = "backtrace")))]
        {
            write!(f, "Error::{}", self)?;
        }

        #[cfg(all(feature = "std", feature = "backtrace"))]
        {
            writeln!(f, "Error::{} {{", self)?;
            write!(f, "{}", self.backtrace())?;
            writeln!(f, "}}")?;
        }

        Ok(())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[cfg(all(feature = "std", feature = "backtrace"))]
        {
            write!(
                f,
                "{:?}: {}",
                self.code(),
                self.inner
                    .as_ref()
                    .map_or(String::new(), |err| { err.to_string() })
            )
        }
        #[cfg(not(all(feature = "std", feature = "backtrace")))]
        {
            write!(f, "{:?}", self.code())
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter<'_>) {
        defmt::write!(f, "Error::{}", self.code)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
