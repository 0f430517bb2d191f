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

use strum_macros::{EnumIter, FromRepr, IntoStaticStr};

/// Pickle opcodes of protocols 0 to 5.
#[derive(Clone, Copy, Debug, Eq, PartialEq, EnumIter, FromRepr, IntoStaticStr)]
#[repr(u8)]
pub enum Opcode {
    #[strum(serialize = "MARK")]
    Mark = b'(',
    #[strum(serialize = "STOP")]
    Stop = b'.',
    #[strum(serialize = "POP")]
    Pop = b'0',
    #[strum(serialize = "POP_MARK")]
    PopMark = b'1',
    #[strum(serialize = "DUP")]
    Dup = b'2',
    #[strum(serialize = "FLOAT")]
    Float = b'F',
    #[strum(serialize = "INT")]
    Int = b'I',
    #[strum(serialize = "BININT")]
    BinInt = b'J',
    #[strum(serialize = "BININT1")]
    BinInt1 = b'K',
    #[strum(serialize = "LONG")]
    Long = b'L',
    #[strum(serialize = "BININT2")]
    BinInt2 = b'M',
    #[strum(serialize = "NONE")]
    None = b'N',
    #[strum(serialize = "PERSID")]
    PersId = b'P',
    #[strum(serialize = "BINPERSID")]
    BinPersId = b'Q',
    #[strum(serialize = "REDUCE")]
    Reduce = b'R',
    #[strum(serialize = "STRING")]
    String = b'S',
    #[strum(serialize = "BINSTRING")]
    BinString = b'T',
    #[strum(serialize = "SHORT_BINSTRING")]
    ShortBinString = b'U',
    #[strum(serialize = "UNICODE")]
    Unicode = b'V',
    #[strum(serialize = "BINUNICODE")]
    BinUnicode = b'X',
    #[strum(serialize = "APPEND")]
    Append = b'a',
    #[strum(serialize = "BUILD")]
    Build = b'b',
    #[strum(serialize = "GLOBAL")]
    Global = b'c',
    #[strum(serialize = "DICT")]
    Dict = b'd',
    #[strum(serialize = "EMPTY_DICT")]
    EmptyDict = b'}',
    #[strum(serialize = "APPENDS")]
    Appends = b'e',
    #[strum(serialize = "GET")]
    Get = b'g',
    #[strum(serialize = "BINGET")]
    BinGet = b'h',
    #[strum(serialize = "INST")]
    Inst = b'i',
    #[strum(serialize = "LONG_BINGET")]
    LongBinGet = b'j',
    #[strum(serialize = "LIST")]
    List = b'l',
    #[strum(serialize = "EMPTY_LIST")]
    EmptyList = b']',
    #[strum(serialize = "OBJ")]
    Obj = b'o',
    #[strum(serialize = "PUT")]
    Put = b'p',
    #[strum(serialize = "BINPUT")]
    BinPut = b'q',
    #[strum(serialize = "LONG_BINPUT")]
    LongBinPut = b'r',
    #[strum(serialize = "SETITEM")]
    SetItem = b's',
    #[strum(serialize = "TUPLE")]
    Tuple = b't',
    #[strum(serialize = "EMPTY_TUPLE")]
    EmptyTuple = b')',
    #[strum(serialize = "SETITEMS")]
    SetItems = b'u',
    #[strum(serialize = "BINFLOAT")]
    BinFloat = b'G',

    // Protocol 2
    #[strum(serialize = "PROTO")]
    Proto = 0x80,
    #[strum(serialize = "NEWOBJ")]
    NewObj = 0x81,
    #[strum(serialize = "EXT1")]
    Ext1 = 0x82,
    #[strum(serialize = "EXT2")]
    Ext2 = 0x83,
    #[strum(serialize = "EXT4")]
    Ext4 = 0x84,
    #[strum(serialize = "TUPLE1")]
    Tuple1 = 0x85,
    #[strum(serialize = "TUPLE2")]
    Tuple2 = 0x86,
    #[strum(serialize = "TUPLE3")]
    Tuple3 = 0x87,
    #[strum(serialize = "NEWTRUE")]
    NewTrue = 0x88,
    #[strum(serialize = "NEWFALSE")]
    NewFalse = 0x89,
    #[strum(serialize = "LONG1")]
    Long1 = 0x8A,
    #[strum(serialize = "LONG4")]
    Long4 = 0x8B,

    // Protocol 3
    #[strum(serialize = "BINBYTES")]
    BinBytes = b'B',
    #[strum(serialize = "SHORT_BINBYTES")]
    ShortBinBytes = b'C',

    // Protocol 4
    #[strum(serialize = "SHORT_BINUNICODE")]
    ShortBinUnicode = 0x8C,
    #[strum(serialize = "BINUNICODE8")]
    BinUnicode8 = 0x8D,
    #[strum(serialize = "BINBYTES8")]
    BinBytes8 = 0x8E,
    #[strum(serialize = "EMPTY_SET")]
    EmptySet = 0x8F,
    #[strum(serialize = "ADDITEMS")]
    AddItems = 0x90,
    #[strum(serialize = "FROZENSET")]
    FrozenSet = 0x91,
    #[strum(serialize = "NEWOBJ_EX")]
    NewObjEx = 0x92,
    #[strum(serialize = "STACK_GLOBAL")]
    StackGlobal = 0x93,
    #[strum(serialize = "MEMOIZE")]
    Memoize = 0x94,
    #[strum(serialize = "FRAME")]
    Frame = 0x95,

    // Protocol 5
    #[strum(serialize = "BYTEARRAY8")]
    ByteArray8 = 0x96,
    #[strum(serialize = "NEXT_BUFFER")]
    NextBuffer = 0x97,
    #[strum(serialize = "READONLY_BUFFER")]
    ReadonlyBuffer = 0x98,
}

/// The highest pickle protocol this crate reads.
pub const HIGHEST_PROTOCOL: u8 = 5;

impl Opcode {
    pub fn name(self) -> &'static str {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use strum::IntoEnumIterator;

    #[test]
    fn names_follow_pickletools() {
        assert_eq!(Opcode::from_repr(b'K'), Some(Opcode::BinInt1));
        assert_eq!(Opcode::BinInt1.name(), "BININT1");
        assert_eq!(Opcode::from_repr(0x95).map(Opcode::name), Some("FRAME"));
        assert_eq!(Opcode::from_repr(0xFF), None);
    }

    #[test]
    fn every_opcode_has_a_distinct_byte_and_name() {
        let mut names = HashSet::new();
        for opcode in Opcode::iter() {
            assert_eq!(Opcode::from_repr(opcode as u8), Some(opcode));
            assert!(names.insert(opcode.name()), "{} is listed twice", opcode.name());
        }
        assert_eq!(names.len(), 68);
    }
}
