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

//! A pickle virtual machine producing [`Value`]s.
//!
//! The machine reads one opcode at a time and returns as soon as it executes `STOP`, so a
//! pickle embedded in a larger stream is consumed exactly.
//!
//! Containers stored in the memo are kept in an arena while the pickle runs and the stack only
//! holds references to them, so that later `APPEND`s or `SETITEM`s through a memo entry are seen
//! by every holder. The final value is materialized after `STOP`.

mod literal;
mod opcode;

pub use opcode::{HIGHEST_PROTOCOL, Opcode};

use crate::{
    SparkPickleResult,
    error::Details,
    types::Value,
    util::{Limits, Positioned},
};
use log::{trace, warn};
use std::{
    collections::{HashMap, HashSet, hash_map::Entry},
    io::Read,
    mem,
};

/// Run the pickle at the current position of `stream` up to and including its `STOP` opcode.
pub fn unpickle<R: Read>(stream: &mut Positioned<R>, limits: &Limits) -> SparkPickleResult<Value> {
    Unpickler::new(stream, limits).run()
}

/// A value under construction.
#[derive(Clone, Debug)]
enum Node {
    Value(Value),
    List(Vec<Node>),
    Tuple(Vec<Node>),
    Dict(Vec<(Node, Node)>),
    Set(Vec<Node>),
    FrozenSet(Vec<Node>),
    Object {
        class: Box<Node>,
        args: Box<Node>,
        state: Option<Box<Node>>,
    },
    /// Index into the arena of memoized nodes.
    Ref(usize),
}

impl Node {
    fn kind(&self) -> &'static str {
        match self {
            Node::Value(v) => v.type_name(),
            Node::List(_) => "list",
            Node::Tuple(_) => "tuple",
            Node::Dict(_) => "dict",
            Node::Set(_) => "set",
            Node::FrozenSet(_) => "frozenset",
            Node::Object { .. } => "object",
            Node::Ref(_) => "memo reference",
        }
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        Node::Value(value)
    }
}

fn unexpected_type(op: Opcode, node: &Node) -> crate::Error {
    Details::PickleUnexpectedType {
        opcode: op.name(),
        found: node.kind(),
    }
    .into()
}

struct Unpickler<'s, R> {
    stream: &'s mut Positioned<R>,
    limits: &'s Limits,
    stack: Vec<Node>,
    /// Stack heights at each open `MARK`.
    marks: Vec<usize>,
    memo: HashMap<u64, usize>,
    arena: Vec<Node>,
}

impl<'s, R: Read> Unpickler<'s, R> {
    fn new(stream: &'s mut Positioned<R>, limits: &'s Limits) -> Self {
        Self {
            stream,
            limits,
            stack: Vec::new(),
            marks: Vec::new(),
            memo: HashMap::new(),
            arena: Vec::new(),
        }
    }

    fn run(mut self) -> SparkPickleResult<Value> {
        loop {
            let code = self.stream.read_u8()?;
            let op = Opcode::from_repr(code).ok_or(Details::UnknownOpcode(code))?;
            if let Some(top) = self.execute(op)? {
                return Resolver::new(&self.arena, self.limits).resolve(&top, 0);
            }
        }
    }

    /// Execute one opcode. Returns the pickled object once `STOP` is reached.
    fn execute(&mut self, op: Opcode) -> SparkPickleResult<Option<Node>> {
        match op {
            Opcode::Proto => {
                let protocol = self.stream.read_u8()?;
                if protocol > HIGHEST_PROTOCOL {
                    return Err(Details::PickleProtocol(protocol).into());
                }
                trace!("Pickle protocol {protocol}");
            }
            Opcode::Frame => {
                let _frame_len: [u8; 8] = self.stream.read_array()?;
            }
            Opcode::Stop => return self.pop(op).map(Some),

            Opcode::Mark => self.marks.push(self.stack.len()),
            Opcode::Pop => {
                if self.stack.len() > self.floor() {
                    self.stack.pop();
                } else {
                    self.pop_mark(op)?;
                }
            }
            Opcode::PopMark => {
                self.pop_mark(op)?;
            }
            Opcode::Dup => {
                let index = self.share_top(op)?;
                self.stack.push(Node::Ref(index));
            }

            Opcode::None => self.push(Value::None),
            Opcode::NewTrue => self.push(Value::Bool(true)),
            Opcode::NewFalse => self.push(Value::Bool(false)),
            Opcode::Int => {
                let line = self.read_line()?;
                self.push(literal::parse_int(&line)?);
            }
            Opcode::BinInt => {
                let value = i32::from_le_bytes(self.stream.read_array()?);
                self.push(Value::Int(value.into()));
            }
            Opcode::BinInt1 => {
                let value = self.stream.read_u8()?;
                self.push(Value::Int(value.into()));
            }
            Opcode::BinInt2 => {
                let value = u16::from_le_bytes(self.stream.read_array()?);
                self.push(Value::Int(value.into()));
            }
            Opcode::Long => {
                let line = self.read_line()?;
                self.push(literal::parse_long(&line)?);
            }
            Opcode::Long1 => {
                let len = self.stream.read_u8()?;
                let bytes = self.stream.read_vec(len.into(), self.limits)?;
                self.push(literal::decode_long(&bytes));
            }
            Opcode::Long4 => {
                let len = self.read_signed_len()?;
                let bytes = self.stream.read_vec(len, self.limits)?;
                self.push(literal::decode_long(&bytes));
            }
            Opcode::Float => {
                let line = self.read_line()?;
                self.push(Value::Float(literal::parse_float(&line)?));
            }
            Opcode::BinFloat => {
                let value = f64::from_be_bytes(self.stream.read_array()?);
                self.push(Value::Float(value));
            }

            Opcode::String => {
                let line = self.read_line()?;
                self.push(literal::byte_string(literal::parse_quoted_string(&line)?));
            }
            Opcode::BinString => {
                let len = self.read_signed_len()?;
                let bytes = self.stream.read_vec(len, self.limits)?;
                self.push(literal::byte_string(bytes));
            }
            Opcode::ShortBinString => {
                let len = self.stream.read_u8()?;
                let bytes = self.stream.read_vec(len.into(), self.limits)?;
                self.push(literal::byte_string(bytes));
            }
            Opcode::Unicode => {
                let line = self.read_line()?;
                self.push(Value::String(literal::parse_raw_unicode_escape(&line)?));
            }
            Opcode::ShortBinUnicode => {
                let len = self.stream.read_u8()?;
                self.read_utf8(len.into())?;
            }
            Opcode::BinUnicode => {
                let len = u32::from_le_bytes(self.stream.read_array()?);
                self.read_utf8(len as usize)?;
            }
            Opcode::BinUnicode8 => {
                let len = self.read_len8()?;
                self.read_utf8(len)?;
            }
            Opcode::ShortBinBytes => {
                let len = self.stream.read_u8()?;
                self.read_bytes(len.into())?;
            }
            Opcode::BinBytes => {
                let len = u32::from_le_bytes(self.stream.read_array()?);
                self.read_bytes(len as usize)?;
            }
            Opcode::BinBytes8 | Opcode::ByteArray8 => {
                let len = self.read_len8()?;
                self.read_bytes(len)?;
            }

            Opcode::EmptyList => self.stack.push(Node::List(Vec::new())),
            Opcode::List => {
                let items = self.pop_mark(op)?;
                self.stack.push(Node::List(items));
            }
            Opcode::Append => {
                let item = self.pop(op)?;
                match self.top_mut(op)? {
                    Node::List(items) => items.push(item),
                    other => return Err(unexpected_type(op, other)),
                }
            }
            Opcode::Appends => {
                let new_items = self.pop_mark(op)?;
                match self.top_mut(op)? {
                    Node::List(items) => items.extend(new_items),
                    other => return Err(unexpected_type(op, other)),
                }
            }

            Opcode::EmptyTuple => self.stack.push(Node::Tuple(Vec::new())),
            Opcode::Tuple => {
                let items = self.pop_mark(op)?;
                self.stack.push(Node::Tuple(items));
            }
            Opcode::Tuple1 | Opcode::Tuple2 | Opcode::Tuple3 => {
                let n = match op {
                    Opcode::Tuple1 => 1,
                    Opcode::Tuple2 => 2,
                    _ => 3,
                };
                let items = self.pop_n(op, n)?;
                self.stack.push(Node::Tuple(items));
            }

            Opcode::EmptyDict => self.stack.push(Node::Dict(Vec::new())),
            Opcode::Dict => {
                let items = self.pop_mark(op)?;
                let pairs = pairs(op, items)?;
                self.stack.push(Node::Dict(pairs));
            }
            Opcode::SetItem => {
                let value = self.pop(op)?;
                let key = self.pop(op)?;
                match self.top_mut(op)? {
                    Node::Dict(entries) => entries.push((key, value)),
                    other => return Err(unexpected_type(op, other)),
                }
            }
            Opcode::SetItems => {
                let items = self.pop_mark(op)?;
                let new_pairs = pairs(op, items)?;
                match self.top_mut(op)? {
                    Node::Dict(entries) => entries.extend(new_pairs),
                    other => return Err(unexpected_type(op, other)),
                }
            }

            Opcode::EmptySet => self.stack.push(Node::Set(Vec::new())),
            Opcode::AddItems => {
                let new_items = self.pop_mark(op)?;
                match self.top_mut(op)? {
                    Node::Set(items) => items.extend(new_items),
                    other => return Err(unexpected_type(op, other)),
                }
            }
            Opcode::FrozenSet => {
                let items = self.pop_mark(op)?;
                self.stack.push(Node::FrozenSet(items));
            }

            Opcode::Put => {
                let line = self.read_line()?;
                let key = memo_key(&line)?;
                self.memoize(op, key)?;
            }
            Opcode::BinPut => {
                let key = self.stream.read_u8()?;
                self.memoize(op, key.into())?;
            }
            Opcode::LongBinPut => {
                let key = u32::from_le_bytes(self.stream.read_array()?);
                self.memoize(op, key.into())?;
            }
            Opcode::Memoize => {
                let key = self.memo.len() as u64;
                self.memoize(op, key)?;
            }
            Opcode::Get => {
                let line = self.read_line()?;
                let key = memo_key(&line)?;
                self.recall(key)?;
            }
            Opcode::BinGet => {
                let key = self.stream.read_u8()?;
                self.recall(key.into())?;
            }
            Opcode::LongBinGet => {
                let key = u32::from_le_bytes(self.stream.read_array()?);
                self.recall(key.into())?;
            }

            Opcode::Global => {
                let module = self.read_text_line()?;
                let name = self.read_text_line()?;
                self.push(Value::Global { module, name });
            }
            Opcode::StackGlobal => {
                let name = self.pop_value(op)?;
                let module = self.pop_value(op)?;
                match (module, name) {
                    (Value::String(module), Value::String(name)) => {
                        self.push(Value::Global { module, name })
                    }
                    (Value::String(_), other) | (other, _) => {
                        return Err(Details::PickleUnexpectedType {
                            opcode: op.name(),
                            found: other.type_name(),
                        }
                        .into());
                    }
                }
            }
            Opcode::Reduce => {
                let args = self.pop(op)?;
                let callable = self.pop(op)?;
                let node = self.reduce(callable, args)?;
                self.stack.push(node);
            }
            Opcode::NewObj => {
                let args = self.pop(op)?;
                let class = self.pop(op)?;
                self.stack.push(object(class, args));
            }
            Opcode::NewObjEx => {
                let kwargs = self.pop(op)?;
                let args = self.pop(op)?;
                let class = self.pop(op)?;
                self.stack
                    .push(object(class, Node::Tuple(vec![args, kwargs])));
            }
            Opcode::Inst => {
                let module = self.read_text_line()?;
                let name = self.read_text_line()?;
                let args = self.pop_mark(op)?;
                self.stack.push(object(
                    Value::Global { module, name }.into(),
                    Node::Tuple(args),
                ));
            }
            Opcode::Obj => {
                let mut items = self.pop_mark(op)?.into_iter();
                let class = items
                    .next()
                    .ok_or(Details::PickleStackUnderflow(op.name()))?;
                self.stack.push(object(class, Node::Tuple(items.collect())));
            }
            Opcode::Build => {
                let new_state = self.pop(op)?;
                match self.top_mut(op)? {
                    Node::Object { state, .. } => *state = Some(Box::new(new_state)),
                    other => return Err(unexpected_type(op, other)),
                }
            }

            Opcode::PersId
            | Opcode::BinPersId
            | Opcode::Ext1
            | Opcode::Ext2
            | Opcode::Ext4
            | Opcode::NextBuffer
            | Opcode::ReadonlyBuffer => {
                return Err(Details::UnsupportedOpcode(op.name()).into());
            }
        }
        Ok(None)
    }

    fn push(&mut self, value: Value) {
        self.stack.push(Node::Value(value));
    }

    /// Lowest stack index visible above the innermost open mark.
    fn floor(&self) -> usize {
        self.marks.last().copied().unwrap_or(0)
    }

    fn pop(&mut self, op: Opcode) -> SparkPickleResult<Node> {
        if self.stack.len() <= self.floor() {
            return Err(Details::PickleStackUnderflow(op.name()).into());
        }
        self.stack
            .pop()
            .ok_or_else(|| Details::PickleStackUnderflow(op.name()).into())
    }

    fn pop_n(&mut self, op: Opcode, n: usize) -> SparkPickleResult<Vec<Node>> {
        if self.stack.len() < self.floor() + n {
            return Err(Details::PickleStackUnderflow(op.name()).into());
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    /// Pop a node and materialize it.
    fn pop_value(&mut self, op: Opcode) -> SparkPickleResult<Value> {
        let node = self.pop(op)?;
        Resolver::new(&self.arena, self.limits).resolve(&node, 0)
    }

    fn pop_mark(&mut self, op: Opcode) -> SparkPickleResult<Vec<Node>> {
        let mark = self
            .marks
            .pop()
            .ok_or(Details::PickleMarkNotFound(op.name()))?;
        Ok(self.stack.split_off(mark))
    }

    /// The node on top of the stack, looking through memo references.
    fn top_mut(&mut self, op: Opcode) -> SparkPickleResult<&mut Node> {
        if self.stack.len() <= self.floor() {
            return Err(Details::PickleStackUnderflow(op.name()).into());
        }
        let Self { stack, arena, .. } = self;
        match stack.last_mut() {
            Some(Node::Ref(index)) => Ok(&mut arena[*index]),
            Some(node) => Ok(node),
            None => Err(Details::PickleStackUnderflow(op.name()).into()),
        }
    }

    /// Move the top of the stack into the arena, leaving a reference in its place.
    fn share_top(&mut self, op: Opcode) -> SparkPickleResult<usize> {
        if self.stack.len() <= self.floor() {
            return Err(Details::PickleStackUnderflow(op.name()).into());
        }
        let next = self.arena.len();
        let Some(top) = self.stack.last_mut() else {
            return Err(Details::PickleStackUnderflow(op.name()).into());
        };
        if let Node::Ref(index) = *top {
            return Ok(index);
        }
        let node = mem::replace(top, Node::Ref(next));
        self.arena.push(node);
        Ok(next)
    }

    fn memoize(&mut self, op: Opcode, key: u64) -> SparkPickleResult<()> {
        let index = self.share_top(op)?;
        self.memo.insert(key, index);
        Ok(())
    }

    fn recall(&mut self, key: u64) -> SparkPickleResult<()> {
        let index = *self
            .memo
            .get(&key)
            .ok_or(Details::PickleMemoMissing(key))?;
        self.stack.push(Node::Ref(index));
        Ok(())
    }

    fn read_line(&mut self) -> SparkPickleResult<Vec<u8>> {
        self.stream.read_line(self.limits)
    }

    fn read_text_line(&mut self) -> SparkPickleResult<String> {
        String::from_utf8(self.read_line()?).map_err(|e| Details::ConvertToUtf8(e).into())
    }

    fn read_signed_len(&mut self) -> SparkPickleResult<usize> {
        let len = i32::from_le_bytes(self.stream.read_array()?);
        usize::try_from(len).map_err(|_| Details::NegativeLength(len.into()).into())
    }

    fn read_len8(&mut self) -> SparkPickleResult<usize> {
        let len = u64::from_le_bytes(self.stream.read_array()?);
        Ok(usize::try_from(len).unwrap_or(usize::MAX))
    }

    fn read_utf8(&mut self, len: usize) -> SparkPickleResult<()> {
        let bytes = self.stream.read_vec(len, self.limits)?;
        let s = String::from_utf8(bytes).map_err(Details::ConvertToUtf8)?;
        self.push(Value::String(s));
        Ok(())
    }

    fn read_bytes(&mut self, len: usize) -> SparkPickleResult<()> {
        let bytes = self.stream.read_vec(len, self.limits)?;
        self.push(Value::Bytes(bytes));
        Ok(())
    }

    /// Apply `callable` to `args`, folding the few builtins that have a native counterpart.
    fn reduce(&mut self, callable: Node, args: Node) -> SparkPickleResult<Node> {
        let function = Resolver::new(&self.arena, self.limits).resolve(&callable, 0)?;
        let Value::Global { module, name } = &function else {
            return Ok(object(callable, args));
        };
        let folded = match (module.as_str(), name.as_str()) {
            ("_codecs", "encode") => {
                let args = self.resolve_args(&args)?;
                encode(&args)
            }
            ("builtins" | "__builtin__", "bytearray") => {
                let args = self.resolve_args(&args)?;
                match args.as_slice() {
                    [] => Some(Value::Bytes(Vec::new())),
                    [Value::Bytes(b)] => Some(Value::Bytes(b.clone())),
                    _ => encode(&args),
                }
            }
            ("builtins" | "__builtin__", kind @ ("set" | "frozenset")) => {
                let args = self.resolve_args(&args)?;
                let items = match args.as_slice() {
                    [] => Some(Vec::new()),
                    [seq] => seq.items().map(<[Value]>::to_vec),
                    _ => None,
                };
                items.map(|items| match kind {
                    "set" => Value::Set(items),
                    _ => Value::FrozenSet(items),
                })
            }
            ("copyreg" | "copy_reg", "_reconstructor") => {
                // _reconstructor(cls, base, state) creates a bare instance of cls.
                if let Node::Tuple(items) = self.deref(&args) {
                    if let [class, _base, base_state] = items.as_slice() {
                        let args = match base_state {
                            Node::Value(Value::None) => Vec::new(),
                            other => vec![other.clone()],
                        };
                        return Ok(object(class.clone(), Node::Tuple(args)));
                    }
                }
                None
            }
            _ => None,
        };
        Ok(match folded {
            Some(value) => Node::Value(value),
            None => {
                trace!("Keeping {function} as an opaque object");
                object(callable, args)
            }
        })
    }

    fn deref<'n>(&'n self, node: &'n Node) -> &'n Node {
        match node {
            Node::Ref(index) => &self.arena[*index],
            other => other,
        }
    }

    fn resolve_args(&self, args: &Node) -> SparkPickleResult<Vec<Value>> {
        match Resolver::new(&self.arena, self.limits).resolve(args, 0)? {
            Value::Tuple(items) => Ok(items),
            other => Err(Details::PickleUnexpectedType {
                opcode: Opcode::Reduce.name(),
                found: other.type_name(),
            }
            .into()),
        }
    }
}

fn object(class: Node, args: Node) -> Node {
    Node::Object {
        class: Box::new(class),
        args: Box::new(args),
        state: None,
    }
}

fn pairs(op: Opcode, items: Vec<Node>) -> SparkPickleResult<Vec<(Node, Node)>> {
    if items.len() % 2 != 0 {
        return Err(Details::PickleStackUnderflow(op.name()).into());
    }
    let mut items = items.into_iter();
    let mut pairs = Vec::with_capacity(items.len() / 2);
    while let (Some(key), Some(value)) = (items.next(), items.next()) {
        pairs.push((key, value));
    }
    Ok(pairs)
}

fn memo_key(line: &[u8]) -> SparkPickleResult<u64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| {
            Details::PickleInvalidLiteral(String::from_utf8_lossy(line).into_owned()).into()
        })
}

/// `str.encode` for the encodings the pickler emits.
fn encode(args: &[Value]) -> Option<Value> {
    let (text, encoding) = match args {
        [Value::String(text), Value::String(encoding)] => (text, encoding.as_str()),
        [Value::String(text)] => (text, "utf-8"),
        _ => return None,
    };
    match encoding.to_ascii_lowercase().replace('_', "-").as_str() {
        "latin1" | "latin-1" | "iso-8859-1" => text
            .chars()
            .map(|c| u8::try_from(c).ok())
            .collect::<Option<Vec<u8>>>()
            .map(Value::Bytes),
        "utf-8" | "utf8" => Some(Value::Bytes(text.as_bytes().to_vec())),
        "ascii" if text.is_ascii() => Some(Value::Bytes(text.as_bytes().to_vec())),
        other => {
            warn!("Cannot encode pickled text as {other}, keeping the call opaque");
            None
        }
    }
}

/// Turns nodes into values, following memo references.
struct Resolver<'a> {
    arena: &'a [Node],
    limits: &'a Limits,
    budget: usize,
}

impl<'a> Resolver<'a> {
    fn new(arena: &'a [Node], limits: &'a Limits) -> Self {
        Self {
            arena,
            limits,
            budget: limits.max_allocation_bytes / mem::size_of::<Value>(),
        }
    }

    fn resolve_all(&mut self, nodes: &[Node], depth: usize) -> SparkPickleResult<Vec<Value>> {
        nodes.iter().map(|n| self.resolve(n, depth + 1)).collect()
    }

    fn resolve(&mut self, node: &Node, depth: usize) -> SparkPickleResult<Value> {
        if depth > self.limits.max_depth {
            return Err(Details::NestingTooDeep(self.limits.max_depth).into());
        }
        self.budget = self.budget.checked_sub(1).ok_or(Details::MemoryAllocation {
            desired: self.limits.max_allocation_bytes.saturating_add(1),
            maximum: self.limits.max_allocation_bytes,
        })?;
        Ok(match node {
            Node::Value(value) => value.clone(),
            Node::List(items) => Value::List(self.resolve_all(items, depth)?),
            Node::Tuple(items) => Value::Tuple(self.resolve_all(items, depth)?),
            Node::Set(items) => Value::Set(dedup(self.resolve_all(items, depth)?)),
            Node::FrozenSet(items) => Value::FrozenSet(dedup(self.resolve_all(items, depth)?)),
            Node::Dict(entries) => {
                let mut resolved = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    resolved.push((self.resolve(key, depth + 1)?, self.resolve(value, depth + 1)?));
                }
                Value::Dict(dedup_keys(resolved))
            }
            Node::Object { class, args, state } => Value::Object {
                class: Box::new(self.resolve(class, depth + 1)?),
                args: Box::new(self.resolve(args, depth + 1)?),
                state: match state {
                    Some(state) => Some(Box::new(self.resolve(state, depth + 1)?)),
                    None => None,
                },
            },
            Node::Ref(index) => {
                let arena = self.arena;
                self.resolve(&arena[*index], depth)?
            }
        })
    }
}

/// Python keys are compared by their rendering, which is exact for the hashable types
/// pickles carry.
fn key_of(value: &Value) -> String {
    format!("{value:?}")
}

fn dedup(items: Vec<Value>) -> Vec<Value> {
    if items.len() < 2 {
        return items;
    }
    let mut seen = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|item| seen.insert(key_of(item)))
        .collect()
}

/// Later assignments to an existing key replace its value in place, as in a `dict`.
fn dedup_keys(entries: Vec<(Value, Value)>) -> Vec<(Value, Value)> {
    if entries.len() < 2 {
        return entries;
    }
    let mut index: HashMap<String, usize> = HashMap::with_capacity(entries.len());
    let mut out: Vec<(Value, Value)> = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        match index.entry(key_of(&key)) {
            Entry::Occupied(slot) => out[*slot.get()].1 = value,
            Entry::Vacant(slot) => {
                slot.insert(out.len());
                out.push((key, value));
            }
        }
    }
    out
}
