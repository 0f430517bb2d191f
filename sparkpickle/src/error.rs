// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::{error::Error as _, fmt, io};

/// Errors encountered while reading a pickle file.
///
/// To inspect the details of the error use [`details`](Self::details) or
/// [`into_details`](Self::into_details)
/// to get a [`Details`] which contains more precise error information.
///
/// See [`Details`] for all possible errors.
#[derive(thiserror::Error, Debug)]
#[repr(transparent)]
#[error(transparent)]
pub struct Error {
    details: Box<Details>,
}

impl Error {
    pub fn new(details: Details) -> Self {
        Self {
            details: Box::new(details),
        }
    }

    pub fn details(&self) -> &Details {
        &self.details
    }

    pub fn into_details(self) -> Details {
        *self.details
    }

    /// Whether this error came from the byte source rather than from the data in it.
    pub fn is_io(&self) -> bool {
        matches!(*self.details, Details::Io(_))
    }

    /// Whether the byte source ended before the decoder was done with it.
    pub(crate) fn is_unexpected_eof(&self) -> bool {
        matches!(&*self.details, Details::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}

impl From<Details> for Error {
    fn from(details: Details) -> Self {
        Self::new(details)
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Self::new(Details::Io(error))
    }
}

#[derive(thiserror::Error)]
pub enum Details {
    /// The byte source itself failed. The error is passed through untouched.
    #[error(transparent)]
    Io(io::Error),

    #[error("Header validation failed: not a NullWritable/BytesWritable SequenceFile")]
    HeaderMismatch,

    #[error("Record validation failed: expected a zero key length, found {0:02x?}")]
    RecordMarkerMismatch(Vec<u8>),

    #[error("Failed to parse BytesWritable length: only {0} of 4 bytes available")]
    LengthDecode(usize),

    #[error("Object stream parsing integrity error: declared {expected} bytes, consumed {actual}")]
    ObjectStreamIntegrity { expected: u64, actual: u64 },

    #[error("Sync marker mismatch at offset {offset}")]
    SyncMarkerMismatch { offset: u64 },

    #[error("Unable to allocate {desired} bytes (maximum allowed: {maximum})")]
    MemoryAllocation { desired: usize, maximum: usize },

    #[error("A pickled batch must be a sequence, found {0}")]
    BatchNotSequence(&'static str),

    #[error("Invalid Java serialization magic: {0:#06x}")]
    JavaStreamMagic(u16),

    #[error("Unsupported Java serialization version: {0}")]
    JavaStreamVersion(u16),

    #[error("Unknown Java serialization type code: {0:#04x}")]
    UnknownTypeCode(u8),

    #[error("Java serialization type code {found} is not valid here, expected {expected}")]
    UnexpectedContent {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Back reference to unknown handle {0:#x}")]
    InvalidHandle(u32),

    #[error("Externalizable class {0} was not written in block data mode")]
    UnsupportedExternalizable(String),

    #[error("Invalid Java field type code: {0:?}")]
    InvalidFieldType(char),

    #[error("Negative length in Java serialization stream: {0}")]
    NegativeLength(i64),

    #[error("Invalid modified UTF-8 string")]
    InvalidModifiedUtf8,

    #[error("Unknown pickle opcode: {0:#04x}")]
    UnknownOpcode(u8),

    #[error("Pickle opcode {0} is not supported")]
    UnsupportedOpcode(&'static str),

    #[error("Pickle opcode {0} needs more items than the stack holds")]
    PickleStackUnderflow(&'static str),

    #[error("Pickle opcode {0} found no MARK on the stack")]
    PickleMarkNotFound(&'static str),

    #[error("Pickle memo has no entry {0}")]
    PickleMemoMissing(u64),

    #[error("Invalid pickle literal: {0:?}")]
    PickleInvalidLiteral(String),

    #[error("Pickle opcode {opcode} cannot be applied to {found}")]
    PickleUnexpectedType {
        opcode: &'static str,
        found: &'static str,
    },

    #[error("Structure nests deeper than {0} levels or refers to itself")]
    NestingTooDeep(usize),

    #[error("Pickled protocol {0} is newer than this reader understands")]
    PickleProtocol(u8),

    #[error("Invalid utf-8 string")]
    ConvertToUtf8(#[source] std::string::FromUtf8Error),
}

impl From<io::Error> for Details {
    fn from(error: io::Error) -> Self {
        Details::Io(error)
    }
}

impl fmt::Debug for Details {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut msg = self.to_string();
        if let Some(e) = self.source() {
            msg.extend([": ", &e.to_string()]);
        }
        write!(f, "{msg}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn io_errors_keep_their_kind_and_message() {
        let err = Error::from(io::Error::new(io::ErrorKind::PermissionDenied, "nope"));
        assert!(err.is_io());
        assert_eq!(err.to_string(), "nope");
        match err.into_details() {
            Details::Io(e) => assert_eq!(e.kind(), io::ErrorKind::PermissionDenied),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn integrity_error_reports_both_sizes() {
        let err: Error = Details::ObjectStreamIntegrity {
            expected: 10,
            actual: 7,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Object stream parsing integrity error: declared 10 bytes, consumed 7"
        );
        assert!(!err.is_io());
    }

    #[test]
    fn debug_appends_the_source() {
        let utf8 = String::from_utf8(vec![0xff]).unwrap_err();
        let details = Details::ConvertToUtf8(utf8);
        assert!(format!("{details:?}").starts_with("Invalid utf-8 string: "));
    }
}
