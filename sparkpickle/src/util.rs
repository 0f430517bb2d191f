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

use crate::{SparkPickleResult, error::Details};
use std::io::{self, ErrorKind, Read};

/// Maximum number of bytes that can be allocated for a single length-prefixed
/// item (a string, a byte blob, an array). This is a protection against
/// ill-formed data, whose length field might be interpreted as enormous.
pub const DEFAULT_MAX_ALLOCATION_BYTES: usize = 512 * 1024 * 1024;

/// Default limit on how deep a pickled value or a Java object graph may nest.
///
/// Both decoders recurse once per level, so this must keep a decode within the 2 MiB stack of
/// a spawned thread, unoptimized builds included.
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Limits applied while decoding one file.
///
/// They are carried by the [`Reader`](crate::Reader) that owns the decode pass; nothing is
/// process-wide.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Limits {
    pub max_allocation_bytes: usize,
    pub max_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_allocation_bytes: DEFAULT_MAX_ALLOCATION_BYTES,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl Limits {
    pub fn safe_len(&self, len: usize) -> SparkPickleResult<usize> {
        if len <= self.max_allocation_bytes {
            Ok(len)
        } else {
            Err(Details::MemoryAllocation {
                desired: len,
                maximum: self.max_allocation_bytes,
            }
            .into())
        }
    }
}

/// A byte source that knows how far it has been read.
///
/// The position starts at the offset given on creation, zero by default, and only ever moves
/// forward.
#[derive(Debug)]
pub struct Positioned<R> {
    inner: R,
    position: u64,
}

impl<R: Read> Positioned<R> {
    pub fn new(inner: R) -> Self {
        Self::starting_at(inner, 0)
    }

    /// Wrap a source whose next byte sits at absolute offset `offset`, such as a file that was
    /// already seeked or partly read.
    pub fn starting_at(inner: R, offset: u64) -> Self {
        Self {
            inner,
            position: offset,
        }
    }

    /// Absolute offset of the next byte to be read.
    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Read up to `n` bytes, stopping early only at the end of the stream.
    ///
    /// An empty result means the stream was already exhausted.
    pub fn read_up_to(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(n);
        (&mut *self).take(n as u64).read_to_end(&mut buf)?;
        Ok(buf)
    }

    pub fn read_array<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn read_u8(&mut self) -> io::Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Read exactly `len` bytes into a fresh buffer, refusing lengths above the limit.
    pub fn read_vec(&mut self, len: usize, limits: &Limits) -> SparkPickleResult<Vec<u8>> {
        let mut buf = vec![0u8; limits.safe_len(len)?];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Read bytes up to and including the next `\n`, which is stripped.
    pub fn read_line(&mut self, limits: &Limits) -> SparkPickleResult<Vec<u8>> {
        let mut line = Vec::new();
        loop {
            match self.read_u8()? {
                b'\n' => return Ok(line),
                byte => {
                    line.push(byte);
                    limits.safe_len(line.len())?;
                }
            }
        }
    }
}

impl<R: Read> Read for Positioned<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = loop {
            match self.inner.read(buf) {
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                other => break other?,
            }
        };
        self.position += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn position_follows_reads() -> anyhow::Result<()> {
        let mut stream = Positioned::new(&b"abcdefgh"[..]);
        assert_eq!(stream.position(), 0);
        assert_eq!(stream.read_array::<3>()?, *b"abc");
        assert_eq!(stream.position(), 3);
        assert_eq!(stream.read_u8()?, b'd');
        assert_eq!(stream.position(), 4);
        Ok(())
    }

    #[test]
    fn position_counts_from_the_starting_offset() -> anyhow::Result<()> {
        let source = &b"abcdefgh"[..];
        let mut stream = Positioned::starting_at(source, 100);
        assert_eq!(stream.read_up_to(5)?, b"abcde");
        assert_eq!(stream.position(), 105);
        assert_eq!(*stream.get_ref(), b"fgh");
        Ok(())
    }

    #[test]
    fn read_up_to_stops_at_the_end() -> anyhow::Result<()> {
        let mut stream = Positioned::new(&b"abcdef"[..]);
        assert_eq!(stream.read_up_to(4)?, b"abcd");
        assert_eq!(stream.read_up_to(4)?, b"ef");
        assert_eq!(stream.read_up_to(4)?, b"");
        assert_eq!(stream.position(), 6);
        Ok(())
    }

    #[test]
    fn read_line_strips_the_newline() -> anyhow::Result<()> {
        let mut stream = Positioned::new(&b"I42\nrest"[..]);
        assert_eq!(stream.read_line(&Limits::default())?, b"I42");
        assert_eq!(stream.position(), 4);
        Ok(())
    }

    #[test]
    fn read_vec_respects_the_limit() {
        let limits = Limits {
            max_allocation_bytes: 4,
            ..Limits::default()
        };
        let mut stream = Positioned::new(&[0u8; 16][..]);
        assert!(stream.read_vec(4, &limits).is_ok());
        let err = stream.read_vec(5, &limits).unwrap_err();
        assert!(matches!(
            err.details(),
            Details::MemoryAllocation {
                desired: 5,
                maximum: 4
            }
        ));
    }

    #[test]
    fn short_read_is_unexpected_eof() {
        let mut stream = Positioned::new(&b"ab"[..]);
        let err = stream.read_array::<4>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }
}
