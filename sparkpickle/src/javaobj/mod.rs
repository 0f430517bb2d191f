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

//! Reader for the Java Object Serialization Stream Protocol.
//!
//! The reader parses exactly one top-level element and then stops, leaving whatever follows in
//! the stream untouched. `byte[]` arrays are never read here: their length is handed to a
//! [`BlobSink`], which must consume exactly that many bytes from the stream itself.

mod content;

pub use content::{
    ArrayElements, ClassDesc, Content, FieldDesc, FieldType, FieldValue, JavaArray, JavaObject,
    TypeCode,
};

use crate::{
    SparkPickleResult,
    error::Details,
    util::{Limits, Positioned},
};
use content::{
    BASE_WIRE_HANDLE, SC_BLOCK_DATA, SC_EXTERNALIZABLE, SC_SERIALIZABLE, SC_WRITE_METHOD,
    STREAM_MAGIC, STREAM_VERSION,
};
use log::trace;
use std::{io::Read, rc::Rc};

/// Receives the opaque `byte[]` regions of an object stream.
///
/// When the parser meets a byte array it stops right before the first element and calls
/// [`consume_blob`](Self::consume_blob). The sink reads the region straight from the stream and
/// returns whatever it made of it; the parser then carries on after the region.
pub trait BlobSink<R> {
    type Batch;

    /// Consume exactly `length` bytes starting at the current stream position.
    fn consume_blob(
        &mut self,
        stream: &mut Positioned<R>,
        length: u32,
    ) -> SparkPickleResult<Self::Batch>;
}

/// A sink that keeps the raw bytes of every blob.
#[derive(Debug, Default)]
pub struct CollectBlobs {
    pub limits: Limits,
}

impl<R: Read> BlobSink<R> for CollectBlobs {
    type Batch = Vec<u8>;

    fn consume_blob(
        &mut self,
        stream: &mut Positioned<R>,
        length: u32,
    ) -> SparkPickleResult<Vec<u8>> {
        stream.read_vec(length as usize, &self.limits)
    }
}

/// The top-level element of a stream and the sink output for each blob, in encounter order.
#[derive(Debug)]
pub struct ParsedStream<B> {
    pub content: Content,
    pub batches: Vec<B>,
}

/// Parse one top-level element from `stream`, feeding every `byte[]` to `sink`.
pub fn parse_one<R: Read, S: BlobSink<R>>(
    stream: &mut Positioned<R>,
    sink: &mut S,
    limits: &Limits,
) -> SparkPickleResult<ParsedStream<S::Batch>> {
    let mut parser = ObjectStreamParser {
        stream,
        sink,
        limits,
        handles: Vec::new(),
        batches: Vec::new(),
        depth: 0,
    };
    let content = parser.parse()?;
    Ok(ParsedStream {
        content,
        batches: parser.batches,
    })
}

#[derive(Debug)]
enum Handle {
    /// Assigned, but the element it belongs to is still being read.
    Pending,
    ClassDesc(Rc<ClassDesc>),
    String(Rc<str>),
    /// Objects, arrays, enum constants and classes are referred to by handle only.
    Opaque,
}

struct ObjectStreamParser<'s, R, S: BlobSink<R>> {
    stream: &'s mut Positioned<R>,
    sink: &'s mut S,
    limits: &'s Limits,
    handles: Vec<Handle>,
    batches: Vec<S::Batch>,
    depth: usize,
}

impl<R: Read, S: BlobSink<R>> ObjectStreamParser<'_, R, S> {
    fn parse(&mut self) -> SparkPickleResult<Content> {
        let magic = u16::from_be_bytes(self.stream.read_array()?);
        if magic != STREAM_MAGIC {
            return Err(Details::JavaStreamMagic(magic).into());
        }
        let version = u16::from_be_bytes(self.stream.read_array()?);
        if version != STREAM_VERSION {
            return Err(Details::JavaStreamVersion(version).into());
        }
        let code = self.read_type_code()?;
        self.read_content(code, false)
    }

    fn read_type_code(&mut self) -> SparkPickleResult<TypeCode> {
        TypeCode::try_from(self.stream.read_u8()?)
    }

    fn read_i32(&mut self) -> SparkPickleResult<i32> {
        Ok(i32::from_be_bytes(self.stream.read_array()?))
    }

    fn read_length(&mut self) -> SparkPickleResult<u32> {
        let length = self.read_i32()?;
        u32::try_from(length).map_err(|_| Details::NegativeLength(length.into()).into())
    }

    fn read_utf(&mut self) -> SparkPickleResult<String> {
        let len = u16::from_be_bytes(self.stream.read_array()?);
        let bytes = self.stream.read_vec(len.into(), self.limits)?;
        decode_modified_utf8(&bytes)
    }

    fn read_long_utf(&mut self) -> SparkPickleResult<String> {
        let len = u64::from_be_bytes(self.stream.read_array()?);
        let len = usize::try_from(len).unwrap_or(usize::MAX);
        let bytes = self.stream.read_vec(len, self.limits)?;
        decode_modified_utf8(&bytes)
    }

    fn new_handle(&mut self, handle: Handle) -> u32 {
        let index = self.handles.len();
        self.handles.push(handle);
        BASE_WIRE_HANDLE + index as u32
    }

    fn set_handle(&mut self, wire: u32, handle: Handle) {
        if let Some(slot) = self.handles.get_mut((wire - BASE_WIRE_HANDLE) as usize) {
            *slot = handle;
        }
    }

    fn lookup(&self, wire: u32) -> SparkPickleResult<&Handle> {
        wire.checked_sub(BASE_WIRE_HANDLE)
            .and_then(|index| self.handles.get(index as usize))
            .ok_or_else(|| Details::InvalidHandle(wire).into())
    }

    /// Run `read` one nesting level deeper, failing once `max_depth` is exceeded.
    fn nested<T>(
        &mut self,
        read: impl FnOnce(&mut Self) -> SparkPickleResult<T>,
    ) -> SparkPickleResult<T> {
        if self.depth >= self.limits.max_depth {
            return Err(Details::NestingTooDeep(self.limits.max_depth).into());
        }
        self.depth += 1;
        let result = read(self);
        self.depth -= 1;
        result
    }

    fn read_content(&mut self, code: TypeCode, block_data: bool) -> SparkPickleResult<Content> {
        self.nested(|parser| parser.read_content_inner(code, block_data))
    }

    fn read_content_inner(
        &mut self,
        code: TypeCode,
        block_data: bool,
    ) -> SparkPickleResult<Content> {
        match code {
            TypeCode::Null => Ok(Content::Null),
            TypeCode::Reference => {
                let wire = u32::from_be_bytes(self.stream.read_array()?);
                Ok(match self.lookup(wire)? {
                    Handle::ClassDesc(class) => Content::ClassDesc(Rc::clone(class)),
                    Handle::String(s) => Content::String(Rc::clone(s)),
                    Handle::Pending | Handle::Opaque => Content::Reference(wire),
                })
            }
            TypeCode::ClassDesc | TypeCode::ProxyClassDesc => {
                Ok(Content::ClassDesc(self.read_new_class_desc(code)?))
            }
            TypeCode::Object => self.read_object(),
            TypeCode::String => {
                let s: Rc<str> = self.read_utf()?.into();
                self.new_handle(Handle::String(Rc::clone(&s)));
                Ok(Content::String(s))
            }
            TypeCode::LongString => {
                let s: Rc<str> = self.read_long_utf()?.into();
                self.new_handle(Handle::String(Rc::clone(&s)));
                Ok(Content::String(s))
            }
            TypeCode::Array => self.read_array(),
            TypeCode::Class => {
                let class = self.read_required_class_desc()?;
                let handle = self.new_handle(Handle::Opaque);
                Ok(Content::Class { handle, class })
            }
            TypeCode::Enum => {
                let class = self.read_required_class_desc()?;
                let handle = self.new_handle(Handle::Opaque);
                let constant = match self.read_type_code()? {
                    code @ (TypeCode::String | TypeCode::LongString | TypeCode::Reference) => {
                        match self.read_content(code, false)? {
                            Content::String(s) => s,
                            _ => return Err(unexpected("enum constant name", TypeCode::Reference)),
                        }
                    }
                    other => return Err(unexpected("enum constant name", other)),
                };
                Ok(Content::Enum {
                    handle,
                    class,
                    constant,
                })
            }
            TypeCode::BlockData if block_data => {
                let len = self.stream.read_u8()?;
                Ok(Content::BlockData(self.stream.read_vec(len.into(), self.limits)?))
            }
            TypeCode::BlockDataLong if block_data => {
                let len = self.read_length()?;
                Ok(Content::BlockData(self.stream.read_vec(len as usize, self.limits)?))
            }
            TypeCode::Reset => {
                self.handles.clear();
                let next = self.read_type_code()?;
                self.read_content(next, block_data)
            }
            other => Err(unexpected("content", other)),
        }
    }

    /// Read contents up to and including `TC_ENDBLOCKDATA`.
    fn read_annotations(&mut self) -> SparkPickleResult<Vec<Content>> {
        let mut annotations = Vec::new();
        loop {
            match self.read_type_code()? {
                TypeCode::EndBlockData => return Ok(annotations),
                code => annotations.push(self.read_content(code, true)?),
            }
        }
    }

    /// Superclass descriptors nest like contents and count against the same depth.
    fn read_class_desc(&mut self) -> SparkPickleResult<Option<Rc<ClassDesc>>> {
        self.nested(Self::read_class_desc_inner)
    }

    fn read_class_desc_inner(&mut self) -> SparkPickleResult<Option<Rc<ClassDesc>>> {
        match self.read_type_code()? {
            TypeCode::Null => Ok(None),
            code @ (TypeCode::ClassDesc | TypeCode::ProxyClassDesc) => {
                self.read_new_class_desc(code).map(Some)
            }
            TypeCode::Reference => {
                let wire = u32::from_be_bytes(self.stream.read_array()?);
                match self.lookup(wire)? {
                    Handle::ClassDesc(class) => Ok(Some(Rc::clone(class))),
                    _ => Err(Details::InvalidHandle(wire).into()),
                }
            }
            other => Err(unexpected("class descriptor", other)),
        }
    }

    fn read_required_class_desc(&mut self) -> SparkPickleResult<Rc<ClassDesc>> {
        self.read_class_desc()?
            .ok_or_else(|| unexpected("class descriptor", TypeCode::Null))
    }

    fn read_new_class_desc(&mut self, code: TypeCode) -> SparkPickleResult<Rc<ClassDesc>> {
        let (wire, class) = if code == TypeCode::ProxyClassDesc {
            let wire = self.new_handle(Handle::Pending);
            let count = self.read_length()?;
            let mut interfaces = Vec::new();
            for _ in 0..count {
                interfaces.push(self.read_utf()?);
            }
            let annotations = self.read_annotations()?;
            let super_class = self.read_class_desc()?;
            let class = ClassDesc {
                name: "$Proxy".to_owned(),
                serial_version_uid: 0,
                flags: SC_SERIALIZABLE,
                fields: Vec::new(),
                annotations,
                super_class,
                proxy_interfaces: interfaces,
            };
            (wire, class)
        } else {
            let name = self.read_utf()?;
            let serial_version_uid = i64::from_be_bytes(self.stream.read_array()?);
            let wire = self.new_handle(Handle::Pending);
            let flags = self.stream.read_u8()?;
            let count = u16::from_be_bytes(self.stream.read_array()?);
            let mut fields = Vec::with_capacity(count.into());
            for _ in 0..count {
                let field_type = FieldType::try_from(self.stream.read_u8()?)?;
                let name = self.read_utf()?;
                let class_name = if field_type.is_primitive() {
                    None
                } else {
                    let code = self.read_type_code()?;
                    match self.read_content(code, false)? {
                        Content::String(s) => Some(s),
                        _ => return Err(unexpected("field class name", code)),
                    }
                };
                fields.push(FieldDesc {
                    field_type,
                    name,
                    class_name,
                });
            }
            let annotations = self.read_annotations()?;
            let super_class = self.read_class_desc()?;
            let class = ClassDesc {
                name,
                serial_version_uid,
                flags,
                fields,
                annotations,
                super_class,
                proxy_interfaces: Vec::new(),
            };
            (wire, class)
        };
        trace!("Class descriptor {} at handle {wire:#x}", class.name);
        let class = Rc::new(class);
        self.set_handle(wire, Handle::ClassDesc(Rc::clone(&class)));
        Ok(class)
    }

    fn read_field_value(&mut self, field_type: FieldType) -> SparkPickleResult<FieldValue> {
        Ok(match field_type {
            FieldType::Byte => FieldValue::Byte(i8::from_be_bytes(self.stream.read_array()?)),
            FieldType::Char => FieldValue::Char(u16::from_be_bytes(self.stream.read_array()?)),
            FieldType::Double => FieldValue::Double(f64::from_be_bytes(self.stream.read_array()?)),
            FieldType::Float => FieldValue::Float(f32::from_be_bytes(self.stream.read_array()?)),
            FieldType::Int => FieldValue::Int(self.read_i32()?),
            FieldType::Long => FieldValue::Long(i64::from_be_bytes(self.stream.read_array()?)),
            FieldType::Short => FieldValue::Short(i16::from_be_bytes(self.stream.read_array()?)),
            FieldType::Boolean => FieldValue::Boolean(self.stream.read_u8()? != 0),
            FieldType::Object | FieldType::Array => {
                let code = self.read_type_code()?;
                FieldValue::Object(self.read_content(code, false)?)
            }
        })
    }

    fn read_object(&mut self) -> SparkPickleResult<Content> {
        let class = self.read_required_class_desc()?;
        let handle = self.new_handle(Handle::Opaque);
        let mut fields = Vec::new();
        let mut annotations = Vec::new();
        for desc in class.hierarchy().iter().rev() {
            if desc.flags & SC_EXTERNALIZABLE != 0 {
                if desc.flags & SC_BLOCK_DATA == 0 {
                    return Err(Details::UnsupportedExternalizable(desc.name.clone()).into());
                }
                annotations.extend(self.read_annotations()?);
            } else if desc.flags & SC_SERIALIZABLE != 0 {
                for field in &desc.fields {
                    let value = self.read_field_value(field.field_type)?;
                    fields.push((field.name.clone(), value));
                }
                if desc.flags & SC_WRITE_METHOD != 0 {
                    annotations.extend(self.read_annotations()?);
                }
            }
        }
        Ok(Content::Object(Box::new(JavaObject {
            handle,
            class,
            fields,
            annotations,
        })))
    }

    fn read_array(&mut self) -> SparkPickleResult<Content> {
        let class = self.read_required_class_desc()?;
        let handle = self.new_handle(Handle::Opaque);
        let size = self.read_length()?;
        let component = class
            .component_type()
            .ok_or_else(|| Details::InvalidFieldType(class.name.chars().nth(1).unwrap_or('?')))?;
        let elements = match component {
            FieldType::Byte => {
                let start = self.stream.position();
                trace!("byte[{size}] at offset {start}");
                let batch = self.sink.consume_blob(self.stream, size)?;
                self.batches.push(batch);
                ArrayElements::Blob {
                    length: size,
                    batch: self.batches.len() - 1,
                }
            }
            FieldType::Object | FieldType::Array => {
                let mut items = Vec::new();
                for _ in 0..size {
                    let code = self.read_type_code()?;
                    items.push(self.read_content(code, false)?);
                }
                ArrayElements::Objects(items)
            }
            primitive => {
                self.limits.safe_len((size as usize).saturating_mul(primitive.width()))?;
                let mut items = Vec::with_capacity(size as usize);
                for _ in 0..size {
                    items.push(self.read_field_value(primitive)?);
                }
                ArrayElements::Primitive(items)
            }
        };
        Ok(Content::Array(Box::new(JavaArray {
            handle,
            class,
            elements,
        })))
    }
}

fn unexpected(expected: &'static str, found: TypeCode) -> crate::Error {
    Details::UnexpectedContent {
        expected,
        found: found.name(),
    }
    .into()
}

/// Decode Java's modified UTF-8: `NUL` is two bytes and supplementary characters are written
/// as surrogate pairs of three bytes each.
pub fn decode_modified_utf8(bytes: &[u8]) -> SparkPickleResult<String> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    let continuation = |b: Option<&u8>| match b {
        Some(&b) if b & 0xC0 == 0x80 => Ok(u16::from(b & 0x3F)),
        _ => Err(crate::Error::from(Details::InvalidModifiedUtf8)),
    };
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            units.push(b.into());
            i += 1;
        } else if b & 0xE0 == 0xC0 {
            let b1 = continuation(bytes.get(i + 1))?;
            units.push((u16::from(b & 0x1F) << 6) | b1);
            i += 2;
        } else if b & 0xF0 == 0xE0 {
            let b1 = continuation(bytes.get(i + 1))?;
            let b2 = continuation(bytes.get(i + 2))?;
            units.push((u16::from(b & 0x0F) << 12) | (b1 << 6) | b2);
            i += 3;
        } else {
            return Err(Details::InvalidModifiedUtf8.into());
        }
    }
    Ok(char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::DEFAULT_MAX_DEPTH;
    use pretty_assertions::assert_eq;
    use sparkpickle_test_helper::on_default_thread_stack;

    const BYTE_ARRAY_ARRAY: &[u8] = &[
        0xAC, 0xED, 0x00, 0x05, // magic, version
        0x75, // TC_ARRAY
        0x72, 0x00, 0x03, b'[', b'[', b'B', // TC_CLASSDESC "[[B"
        0x4B, 0xFD, 0x19, 0x15, 0x67, 0x67, 0xDB, 0x37, // serialVersionUID
        0x02, 0x00, 0x00, // SC_SERIALIZABLE, no fields
        0x78, 0x70, // end of annotations, no superclass
        0x00, 0x00, 0x00, 0x02, // two elements
        0x75, // TC_ARRAY
        0x72, 0x00, 0x02, b'[', b'B', // TC_CLASSDESC "[B"
        0xAC, 0xF3, 0x17, 0xF8, 0x06, 0x08, 0x54, 0xE0, //
        0x02, 0x00, 0x00, 0x78, 0x70, //
        0x00, 0x00, 0x00, 0x03, b'a', b'b', b'c', //
        0x75, 0x71, 0x00, 0x7E, 0x00, 0x02, // TC_ARRAY, TC_REFERENCE to "[B"
        0x00, 0x00, 0x00, 0x01, b'z', //
        0xFF, // trailing byte, left alone
    ];

    #[test]
    fn byte_arrays_go_to_the_sink() -> anyhow::Result<()> {
        let mut stream = Positioned::new(BYTE_ARRAY_ARRAY);
        let mut sink = CollectBlobs::default();
        let parsed = parse_one(&mut stream, &mut sink, &Limits::default())?;
        assert_eq!(parsed.batches, [b"abc".to_vec(), b"z".to_vec()]);
        assert_eq!(stream.position(), BYTE_ARRAY_ARRAY.len() as u64 - 1);

        let Content::Array(outer) = &parsed.content else {
            panic!("expected an array, got {:?}", parsed.content);
        };
        assert_eq!(outer.class.name, "[[B");
        let ArrayElements::Objects(items) = &outer.elements else {
            panic!("expected object elements");
        };
        let lengths: Vec<_> = items
            .iter()
            .map(|item| match item {
                Content::Array(inner) => inner.elements.clone(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(
            lengths,
            [
                ArrayElements::Blob { length: 3, batch: 0 },
                ArrayElements::Blob { length: 1, batch: 1 }
            ]
        );
        Ok(())
    }

    #[test]
    fn reads_objects_with_fields_and_strings() -> anyhow::Result<()> {
        // new java.lang.Integer(7) followed by nothing.
        let bytes: &[u8] = &[
            0xAC, 0xED, 0x00, 0x05, 0x73, // TC_OBJECT
            0x72, 0x00, 0x11, b'j', b'a', b'v', b'a', b'.', b'l', b'a', b'n', b'g', b'.', b'I',
            b'n', b't', b'e', b'g', b'e', b'r', //
            0x12, 0xE2, 0xA0, 0xA4, 0xF7, 0x81, 0x87, 0x38, //
            0x02, 0x00, 0x01, b'I', 0x00, 0x05, b'v', b'a', b'l', b'u', b'e', //
            0x78, // end of annotations
            0x72, 0x00, 0x10, b'j', b'a', b'v', b'a', b'.', b'l', b'a', b'n', b'g', b'.', b'N',
            b'u', b'm', b'b', b'e', b'r', //
            0x86, 0xAC, 0x95, 0x1D, 0x0B, 0x94, 0xE0, 0x8B, //
            0x02, 0x00, 0x00, 0x78, 0x70, //
            0x00, 0x00, 0x00, 0x07,
        ];
        let mut stream = Positioned::new(bytes);
        let parsed = parse_one(&mut stream, &mut CollectBlobs::default(), &Limits::default())?;
        let Content::Object(object) = parsed.content else {
            panic!("expected an object");
        };
        assert_eq!(object.class.name, "java.lang.Integer");
        assert_eq!(object.fields, [("value".to_owned(), FieldValue::Int(7))]);
        assert_eq!(stream.position(), bytes.len() as u64);
        Ok(())
    }

    #[test]
    fn rejects_bad_magic() {
        let mut stream = Positioned::new(&[0xCA, 0xFE, 0x00, 0x05][..]);
        let err = parse_one(&mut stream, &mut CollectBlobs::default(), &Limits::default())
            .unwrap_err();
        assert!(matches!(err.details(), Details::JavaStreamMagic(0xCAFE)));
    }

    #[test]
    fn rejects_unknown_handles() {
        let bytes: &[u8] = &[0xAC, 0xED, 0x00, 0x05, 0x71, 0x00, 0x7E, 0x00, 0x09];
        let err = parse_one(
            &mut Positioned::new(bytes),
            &mut CollectBlobs::default(),
            &Limits::default(),
        )
        .unwrap_err();
        assert!(matches!(err.details(), Details::InvalidHandle(0x7E0009)));
    }

    #[test]
    fn strings_are_shared_through_references() -> anyhow::Result<()> {
        let bytes: &[u8] = &[
            0xAC, 0xED, 0x00, 0x05, 0x75, // TC_ARRAY
            0x72, 0x00, 0x13, b'[', b'L', b'j', b'a', b'v', b'a', b'.', b'l', b'a', b'n', b'g',
            b'.', b'S', b't', b'r', b'i', b'n', b'g', b';', //
            0xAD, 0xD2, 0x56, 0xE7, 0xE9, 0x1D, 0x7B, 0x47, //
            0x02, 0x00, 0x00, 0x78, 0x70, //
            0x00, 0x00, 0x00, 0x02, //
            0x74, 0x00, 0x02, b'h', b'i', // TC_STRING "hi"
            0x71, 0x00, 0x7E, 0x00, 0x02, // TC_REFERENCE to "hi"
        ];
        let parsed = parse_one(
            &mut Positioned::new(bytes),
            &mut CollectBlobs::default(),
            &Limits::default(),
        )?;
        let mut strings = Vec::new();
        parsed.content.visit(&mut |c| {
            if let Content::String(s) = c {
                strings.push(s.to_string());
            }
        });
        assert_eq!(strings, ["hi", "hi"]);
        Ok(())
    }

    /// `depth` `Object[]` arrays, each holding the next one, the innermost one empty.
    fn nested_object_arrays(depth: usize) -> Vec<u8> {
        let mut bytes = vec![0xAC, 0xED, 0x00, 0x05, 0x75, 0x72, 0x00, 0x13];
        bytes.extend(b"[Ljava.lang.Object;");
        bytes.extend([0x90, 0xCE, 0x58, 0x9F, 0x10, 0x73, 0x29, 0x6C]);
        bytes.extend([0x02, 0x00, 0x00, 0x78, 0x70]);
        for _ in 1..depth {
            bytes.extend([0x00, 0x00, 0x00, 0x01]);
            bytes.extend([0x75, 0x71, 0x00, 0x7E, 0x00, 0x00]);
        }
        bytes.extend([0x00, 0x00, 0x00, 0x00]);
        bytes
    }

    fn parse_default(bytes: &[u8]) -> SparkPickleResult<Content> {
        let mut stream = Positioned::new(bytes);
        parse_one(&mut stream, &mut CollectBlobs::default(), &Limits::default())
            .map(|parsed| parsed.content)
    }

    #[test]
    fn nested_arrays_within_the_default_depth() {
        let depth = on_default_thread_stack(|| {
            let mut content = parse_default(&nested_object_arrays(DEFAULT_MAX_DEPTH - 1))?;
            let mut depth = 0;
            while let Content::Array(array) = content {
                depth += 1;
                match array.elements {
                    ArrayElements::Objects(mut items) if !items.is_empty() => {
                        content = items.swap_remove(0);
                    }
                    _ => break,
                }
            }
            SparkPickleResult::Ok(depth)
        });
        assert_eq!(depth.ok(), Some(DEFAULT_MAX_DEPTH - 1));
    }

    #[test]
    fn nested_arrays_beyond_the_default_depth() {
        let result = on_default_thread_stack(|| {
            parse_default(&nested_object_arrays(DEFAULT_MAX_DEPTH * 8)).map(|_| ())
        });
        assert!(matches!(
            result.map_err(crate::Error::into_details),
            Err(Details::NestingTooDeep(DEFAULT_MAX_DEPTH))
        ));
    }

    #[test]
    fn superclass_chains_count_towards_the_depth() {
        // An object whose class descriptor has a hundred thousand superclasses.
        let mut bytes = vec![0xAC, 0xED, 0x00, 0x05, 0x73];
        for _ in 0..100_000 {
            bytes.extend([0x72, 0x00, 0x01, b'A']);
            bytes.extend([0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01]);
            bytes.extend([0x02, 0x00, 0x00, 0x78]);
        }
        bytes.push(0x70);
        let limits = Limits {
            max_depth: 10,
            ..Limits::default()
        };
        let err = parse_one(
            &mut Positioned::new(bytes.as_slice()),
            &mut CollectBlobs::default(),
            &limits,
        )
        .unwrap_err();
        assert!(matches!(err.details(), Details::NestingTooDeep(10)));
    }

    #[test]
    fn modified_utf8() -> anyhow::Result<()> {
        assert_eq!(decode_modified_utf8(b"plain")?, "plain");
        assert_eq!(decode_modified_utf8(&[0xC0, 0x80])?, "\0");
        assert_eq!(decode_modified_utf8(&[0xC3, 0xA9])?, "é");
        // U+1F600 as a surrogate pair
        assert_eq!(
            decode_modified_utf8(&[0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80])?,
            "\u{1F600}"
        );
        assert!(decode_modified_utf8(&[0xC3]).is_err());
        Ok(())
    }
}
