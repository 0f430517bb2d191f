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

//! Decoding of one record payload: a Java `byte[][]` whose byte arrays are pickled batches.

use crate::{
    Error, SparkPickleResult,
    error::Details,
    javaobj::{self, BlobSink},
    pickle,
    types::Value,
    util::{Limits, Positioned},
};
use log::{debug, trace};
use std::io::Read;

/// Receives the offset right after each decoded batch.
pub type ProgressFn<'a> = dyn FnMut(u64) + 'a;

/// Unpickles every `byte[]` in place and checks it used up exactly its declared length.
struct PickleBatchSink<'p, 'a> {
    limits: &'p Limits,
    progress: Option<&'p mut ProgressFn<'a>>,
}

impl<R: Read> BlobSink<R> for PickleBatchSink<'_, '_> {
    type Batch = Vec<Value>;

    fn consume_blob(
        &mut self,
        stream: &mut Positioned<R>,
        length: u32,
    ) -> SparkPickleResult<Vec<Value>> {
        let pos = stream.position();
        let batch = pickle::unpickle(stream, self.limits)?;
        let consumed = stream.position() - pos;
        if consumed != u64::from(length) {
            return Err(Details::ObjectStreamIntegrity {
                expected: length.into(),
                actual: consumed,
            }
            .into());
        }
        trace!("Pickled batch of {length} bytes at offset {pos}");
        if let Some(progress) = self.progress.as_deref_mut() {
            progress(pos + u64::from(length));
        }
        match batch {
            Value::List(items)
            | Value::Tuple(items)
            | Value::Set(items)
            | Value::FrozenSet(items) => Ok(items),
            other => Err(Details::BatchNotSequence(other.type_name()).into()),
        }
    }
}

/// Decode the payload of a record that declares `declared_size` bytes, returning the values of
/// all its batches in order.
pub fn decode_payload<R: Read>(
    stream: &mut Positioned<R>,
    declared_size: u32,
    limits: &Limits,
    progress: Option<&mut ProgressFn<'_>>,
) -> SparkPickleResult<Vec<Value>> {
    let start = stream.position();
    let mut sink = PickleBatchSink { limits, progress };
    let parsed = javaobj::parse_one(stream, &mut sink, limits)
        .map_err(|e| truncation_to_integrity(e, declared_size, stream.position() - start))?;
    let consumed = stream.position() - start;
    if consumed != u64::from(declared_size) {
        return Err(Details::ObjectStreamIntegrity {
            expected: declared_size.into(),
            actual: consumed,
        }
        .into());
    }
    debug!(
        "Record payload of {declared_size} bytes held {} batches",
        parsed.batches.len()
    );
    Ok(parsed.batches.into_iter().flatten().collect())
}

/// The payload promised bytes the stream does not have.
fn truncation_to_integrity(error: Error, declared_size: u32, consumed: u64) -> Error {
    if error.is_unexpected_eof() {
        Details::ObjectStreamIntegrity {
            expected: declared_size.into(),
            actual: consumed,
        }
        .into()
    } else {
        error
    }
}
