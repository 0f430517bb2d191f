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
use std::rc::Rc;
use strum_macros::{FromRepr, IntoStaticStr};

pub const STREAM_MAGIC: u16 = 0xACED;
pub const STREAM_VERSION: u16 = 5;
pub const BASE_WIRE_HANDLE: u32 = 0x7E_0000;

pub const SC_WRITE_METHOD: u8 = 0x01;
pub const SC_SERIALIZABLE: u8 = 0x02;
pub const SC_EXTERNALIZABLE: u8 = 0x04;
pub const SC_BLOCK_DATA: u8 = 0x08;
pub const SC_ENUM: u8 = 0x10;

/// The tag byte in front of every element of a Java serialization stream.
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromRepr, IntoStaticStr)]
#[repr(u8)]
pub enum TypeCode {
    #[strum(serialize = "TC_NULL")]
    Null = 0x70,
    #[strum(serialize = "TC_REFERENCE")]
    Reference = 0x71,
    #[strum(serialize = "TC_CLASSDESC")]
    ClassDesc = 0x72,
    #[strum(serialize = "TC_OBJECT")]
    Object = 0x73,
    #[strum(serialize = "TC_STRING")]
    String = 0x74,
    #[strum(serialize = "TC_ARRAY")]
    Array = 0x75,
    #[strum(serialize = "TC_CLASS")]
    Class = 0x76,
    #[strum(serialize = "TC_BLOCKDATA")]
    BlockData = 0x77,
    #[strum(serialize = "TC_ENDBLOCKDATA")]
    EndBlockData = 0x78,
    #[strum(serialize = "TC_RESET")]
    Reset = 0x79,
    #[strum(serialize = "TC_BLOCKDATALONG")]
    BlockDataLong = 0x7A,
    #[strum(serialize = "TC_EXCEPTION")]
    Exception = 0x7B,
    #[strum(serialize = "TC_LONGSTRING")]
    LongString = 0x7C,
    #[strum(serialize = "TC_PROXYCLASSDESC")]
    ProxyClassDesc = 0x7D,
    #[strum(serialize = "TC_ENUM")]
    Enum = 0x7E,
}

impl TypeCode {
    pub fn name(self) -> &'static str {
        self.into()
    }
}

impl TryFrom<u8> for TypeCode {
    type Error = crate::Error;

    fn try_from(code: u8) -> SparkPickleResult<Self> {
        TypeCode::from_repr(code).ok_or_else(|| Details::UnknownTypeCode(code).into())
    }
}

/// Field and array component types, as written in class descriptors.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
    Object,
    Array,
}

impl FieldType {
    pub fn is_primitive(self) -> bool {
        !matches!(self, FieldType::Object | FieldType::Array)
    }

    /// Encoded width of a primitive value, zero for references.
    pub fn width(self) -> usize {
        match self {
            FieldType::Byte | FieldType::Boolean => 1,
            FieldType::Char | FieldType::Short => 2,
            FieldType::Int | FieldType::Float => 4,
            FieldType::Long | FieldType::Double => 8,
            FieldType::Object | FieldType::Array => 0,
        }
    }
}

impl TryFrom<u8> for FieldType {
    type Error = crate::Error;

    fn try_from(code: u8) -> SparkPickleResult<Self> {
        Ok(match code {
            b'B' => FieldType::Byte,
            b'C' => FieldType::Char,
            b'D' => FieldType::Double,
            b'F' => FieldType::Float,
            b'I' => FieldType::Int,
            b'J' => FieldType::Long,
            b'S' => FieldType::Short,
            b'Z' => FieldType::Boolean,
            b'L' => FieldType::Object,
            b'[' => FieldType::Array,
            other => return Err(Details::InvalidFieldType(other as char).into()),
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDesc {
    pub field_type: FieldType,
    pub name: String,
    /// JVM type signature of reference fields, e.g. `Ljava/lang/String;`.
    pub class_name: Option<Rc<str>>,
}

/// A class descriptor: what the stream says about a serialized class.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassDesc {
    pub name: String,
    pub serial_version_uid: i64,
    pub flags: u8,
    pub fields: Vec<FieldDesc>,
    pub annotations: Vec<Content>,
    pub super_class: Option<Rc<ClassDesc>>,
    /// Interface names, only for dynamic proxy classes.
    pub proxy_interfaces: Vec<String>,
}

impl ClassDesc {
    /// This class followed by its superclasses, most derived first.
    pub fn hierarchy(self: &Rc<Self>) -> Vec<Rc<ClassDesc>> {
        let mut chain = vec![Rc::clone(self)];
        let mut current = self.super_class.clone();
        while let Some(class) = current {
            current = class.super_class.clone();
            chain.push(class);
        }
        chain
    }

    pub fn is_enum(&self) -> bool {
        self.flags & SC_ENUM != 0
    }

    /// Component type of an array class such as `[I` or `[Ljava.lang.Object;`.
    pub fn component_type(&self) -> Option<FieldType> {
        let bytes = self.name.as_bytes();
        match bytes.first() {
            Some(b'[') => bytes.get(1).and_then(|&c| FieldType::try_from(c).ok()),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Byte(i8),
    Char(u16),
    Double(f64),
    Float(f32),
    Int(i32),
    Long(i64),
    Short(i16),
    Boolean(bool),
    Object(Content),
}

#[derive(Clone, Debug, PartialEq)]
pub struct JavaObject {
    pub handle: u32,
    pub class: Rc<ClassDesc>,
    /// Field values of every serializable class in the hierarchy, superclasses first.
    pub fields: Vec<(String, FieldValue)>,
    /// Data written by `writeObject` or `writeExternal`.
    pub annotations: Vec<Content>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ArrayElements {
    /// A `byte[]` handed to the blob sink; `batch` indexes the sink's output.
    Blob { length: u32, batch: usize },
    Primitive(Vec<FieldValue>),
    Objects(Vec<Content>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct JavaArray {
    pub handle: u32,
    pub class: Rc<ClassDesc>,
    pub elements: ArrayElements,
}

/// One element of a Java serialization stream.
#[derive(Clone, Debug, PartialEq)]
pub enum Content {
    Null,
    String(Rc<str>),
    Object(Box<JavaObject>),
    Array(Box<JavaArray>),
    Enum {
        handle: u32,
        class: Rc<ClassDesc>,
        constant: Rc<str>,
    },
    Class {
        handle: u32,
        class: Rc<ClassDesc>,
    },
    ClassDesc(Rc<ClassDesc>),
    BlockData(Vec<u8>),
    /// A back reference to an object, array, enum constant or class seen earlier.
    Reference(u32),
}

impl Content {
    /// Walk this content and everything nested in it, depth first.
    pub fn visit<'c>(&'c self, f: &mut dyn FnMut(&'c Content)) {
        f(self);
        match self {
            Content::Object(object) => {
                for (_, value) in &object.fields {
                    if let FieldValue::Object(content) = value {
                        content.visit(f);
                    }
                }
                for content in &object.annotations {
                    content.visit(f);
                }
            }
            Content::Array(array) => {
                if let ArrayElements::Objects(items) = &array.elements {
                    for content in items {
                        content.visit(f);
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn desc(name: &str, super_class: Option<Rc<ClassDesc>>) -> Rc<ClassDesc> {
        Rc::new(ClassDesc {
            name: name.to_owned(),
            serial_version_uid: 0,
            flags: SC_SERIALIZABLE,
            fields: vec![],
            annotations: vec![],
            super_class,
            proxy_interfaces: vec![],
        })
    }

    #[test]
    fn type_codes_round_trip_through_bytes() -> anyhow::Result<()> {
        assert_eq!(TypeCode::try_from(0x75)?, TypeCode::Array);
        assert_eq!(TypeCode::Array.name(), "TC_ARRAY");
        assert!(matches!(
            TypeCode::try_from(0x42).map_err(crate::Error::into_details),
            Err(Details::UnknownTypeCode(0x42))
        ));
        Ok(())
    }

    #[test]
    fn component_types() {
        assert_eq!(desc("[B", None).component_type(), Some(FieldType::Byte));
        assert_eq!(desc("[[B", None).component_type(), Some(FieldType::Array));
        assert_eq!(
            desc("[Ljava.lang.Object;", None).component_type(),
            Some(FieldType::Object)
        );
        assert_eq!(desc("java.lang.Integer", None).component_type(), None);
    }

    #[test]
    fn hierarchy_lists_most_derived_first() {
        let number = desc("java.lang.Number", None);
        let integer = desc("java.lang.Integer", Some(number));
        let names: Vec<_> = integer.hierarchy().iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, ["java.lang.Integer", "java.lang.Number"]);
        assert!(!integer.is_enum());
    }
}
