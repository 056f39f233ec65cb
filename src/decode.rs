use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};
use crate::marker::Marker;
use crate::value::{List, Map, Value};
use crate::{Timestamp, MAX_DEPTH};

/// Decode-side options.
#[derive(Clone, Debug)]
pub struct DecodeOptions {
    /// Reserved escape hatch for a historical ambiguity: the protocol
    /// text once listed 0x34 under both string and binary. The
    /// bytecode map here always dispatches 0x34-0x37 as binary, which
    /// is this flag's default; the flag is accepted so wrappers can
    /// pass it through, and currently changes nothing.
    pub assuming_x34_as_bytes: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            assuming_x34_as_bytes: true,
        }
    }
}

/// Decode one value from the front of a Hessian 2.0 byte stream.
///
/// The value is self-delimiting; bytes past its end are ignored.
pub fn decode(data: &[u8]) -> Result<Value> {
    decode_with_options(data, &DecodeOptions::default())
}

/// Decode with explicit options. Unknown/reserved options never
/// cause an error.
pub fn decode_with_options(data: &[u8], _options: &DecodeOptions) -> Result<Value> {
    Decoder::new(data).read_value()
}

/// Positional reader over a fully-buffered input. Keeps the original
/// slice so every error can name an absolute offset.
#[derive(Clone, Debug)]
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn pos(&self) -> usize {
        self.pos
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn skip(&mut self) {
        self.pos += 1;
    }

    fn next_byte(&mut self, step: &'static str) -> Result<u8> {
        let b = self.peek().ok_or(Error::LengthTooShort {
            pos: self.pos,
            step,
            expected: 1,
            actual: 0,
        })?;
        self.pos += 1;
        Ok(b)
    }

    fn next_bytes(&mut self, len: usize, step: &'static str) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(Error::LengthTooShort {
                pos: self.pos,
                step,
                expected: len,
                actual: self.remaining(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn read_u16(&mut self, step: &'static str) -> Result<u16> {
        Ok(BigEndian::read_u16(self.next_bytes(2, step)?))
    }

    fn read_i32(&mut self, step: &'static str) -> Result<i32> {
        Ok(BigEndian::read_i32(self.next_bytes(4, step)?))
    }

    fn read_i64(&mut self, step: &'static str) -> Result<i64> {
        Ok(BigEndian::read_i64(self.next_bytes(8, step)?))
    }

    fn read_f64(&mut self, step: &'static str) -> Result<f64> {
        Ok(BigEndian::read_f64(self.next_bytes(8, step)?))
    }

    /// Consume the bytes holding exactly `chars` UTF-8 characters,
    /// walking by leading-byte width, and validate them. The wire's
    /// string length fields count characters, not bytes.
    fn read_utf8(&mut self, chars: usize) -> Result<&'a str> {
        let start = self.pos;
        let mut end = start;
        for _ in 0..chars {
            let lead = *self.data.get(end).ok_or(Error::BadUtf8 { pos: start })?;
            end += if lead < 0x80 {
                1
            } else if lead < 0xe0 {
                2
            } else if lead < 0xf0 {
                3
            } else {
                4
            };
        }
        if end > self.data.len() {
            return Err(Error::BadUtf8 { pos: start });
        }
        let s = std::str::from_utf8(&self.data[start..end])
            .map_err(|_| Error::BadUtf8 { pos: start })?;
        self.pos = end;
        Ok(s)
    }
}

/// A field layout learned from a 'C' record, awaiting 'O' instances.
#[derive(Clone, Debug)]
struct ClassDef {
    name: String,
    fields: Vec<String>,
}

/// The decoding engine.
///
/// `refs` holds every composite in materialization order; a composite
/// is appended the moment its header is consumed, before its body, so
/// back-references inside the body land on the partially built
/// container and cycles come out connected. `types` and `classes`
/// grow in first-appearance order and are indexed by later records.
/// One `Decoder` is one top-level invocation; nothing crosses calls.
#[derive(Debug)]
pub struct Decoder<'a> {
    reader: Reader<'a>,
    refs: Vec<Value>,
    types: Vec<String>,
    classes: Vec<ClassDef>,
    depth: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            reader: Reader::new(data),
            refs: Vec::new(),
            types: Vec::new(),
            classes: Vec::new(),
            depth: 0,
        }
    }

    /// Decode the next value, of any kind.
    pub fn read_value(&mut self) -> Result<Value> {
        if self.depth >= MAX_DEPTH {
            return Err(Error::DepthLimit {
                pos: self.reader.pos(),
            });
        }
        self.depth += 1;
        let value = self.dispatch();
        self.depth -= 1;
        value
    }

    fn dispatch(&mut self) -> Result<Value> {
        loop {
            let pos = self.reader.pos();
            let tag = self.reader.peek().ok_or(Error::LengthTooShort {
                pos,
                step: "value tag",
                expected: 1,
                actual: 0,
            })?;
            return match Marker::from_u8(tag) {
                // A definition prefixes the value that follows it.
                Marker::ClassDef => {
                    self.read_class_def()?;
                    continue;
                }
                Marker::Null => {
                    self.reader.skip();
                    Ok(Value::Null)
                }
                Marker::True => {
                    self.reader.skip();
                    Ok(Value::Bool(true))
                }
                Marker::False => {
                    self.reader.skip();
                    Ok(Value::Bool(false))
                }
                Marker::Int
                | Marker::IntOne(_)
                | Marker::IntTwo(_)
                | Marker::IntThree(_)
                | Marker::Long
                | Marker::LongOne(_)
                | Marker::LongTwo(_)
                | Marker::LongThree(_)
                | Marker::LongFour => self.read_int().map(Value::Int),
                Marker::Double
                | Marker::DoubleZero
                | Marker::DoubleOne
                | Marker::DoubleByte
                | Marker::DoubleShort
                | Marker::DoubleMillis => self.read_double().map(Value::Double),
                Marker::ShortString(_)
                | Marker::MediumString(_)
                | Marker::StrChunk
                | Marker::StrFinal => self.read_string().map(Value::String),
                Marker::ShortBinary(_)
                | Marker::MediumBinary(_)
                | Marker::BinChunk
                | Marker::BinFinal => self.read_binary().map(Value::Binary),
                Marker::DateMillis | Marker::DateMinutes => self.read_date().map(Value::Date),
                Marker::MapUntyped | Marker::MapTyped => self.read_map(),
                Marker::ListVarTyped
                | Marker::ListFixedTyped
                | Marker::ListVarUntyped
                | Marker::ListFixedUntyped
                | Marker::ListTypedDirect(_)
                | Marker::ListUntypedDirect(_) => self.read_list(),
                Marker::Object | Marker::ObjectDirect(_) => self.read_object(),
                Marker::Ref => self.read_ref(),
                Marker::End | Marker::Reserved(_) => Err(Error::BadTag { pos, tag }),
            };
        }
    }

    /// Read any int or long form as an i64; the model does not keep
    /// the wire's int/long distinction.
    fn read_int(&mut self) -> Result<i64> {
        let pos = self.reader.pos();
        let tag = self.reader.next_byte("int tag")?;
        match Marker::from_u8(tag) {
            Marker::IntOne(v) => Ok(v as i64),
            Marker::IntTwo(hi) => {
                let lo = self.reader.next_byte("two-octet int")?;
                Ok(((hi as i64) << 8) | lo as i64)
            }
            Marker::IntThree(hi) => {
                let b = self.reader.next_bytes(2, "three-octet int")?;
                Ok(((hi as i64) << 16) | ((b[0] as i64) << 8) | b[1] as i64)
            }
            Marker::Int => Ok(self.reader.read_i32("'I' int")? as i64),
            Marker::LongOne(v) => Ok(v as i64),
            Marker::LongTwo(hi) => {
                let lo = self.reader.next_byte("two-octet long")?;
                Ok(((hi as i64) << 8) | lo as i64)
            }
            Marker::LongThree(hi) => {
                let b = self.reader.next_bytes(2, "three-octet long")?;
                Ok(((hi as i64) << 16) | ((b[0] as i64) << 8) | b[1] as i64)
            }
            Marker::LongFour => Ok(self.reader.read_i32("'Y' long")? as i64),
            Marker::Long => self.reader.read_i64("'L' long"),
            _ => Err(Error::BadTag { pos, tag }),
        }
    }

    fn read_double(&mut self) -> Result<f64> {
        let pos = self.reader.pos();
        let tag = self.reader.next_byte("double tag")?;
        match Marker::from_u8(tag) {
            Marker::DoubleZero => Ok(0.0),
            Marker::DoubleOne => Ok(1.0),
            Marker::DoubleByte => Ok(self.reader.next_byte("byte double")? as i8 as f64),
            Marker::DoubleShort => {
                let b = self.reader.next_bytes(2, "short double")?;
                Ok(BigEndian::read_i16(b) as f64)
            }
            Marker::DoubleMillis => Ok(self.reader.read_i32("milli double")? as f64 / 1000.0),
            Marker::Double => self.reader.read_f64("'D' double"),
            _ => Err(Error::BadTag { pos, tag }),
        }
    }

    /// Read a string: any run of 'R' chunks, then one final form.
    fn read_string(&mut self) -> Result<String> {
        let mut out = String::new();
        loop {
            let pos = self.reader.pos();
            let tag = self.reader.next_byte("string tag")?;
            match Marker::from_u8(tag) {
                Marker::StrChunk => {
                    let len = self.reader.read_u16("string chunk length")? as usize;
                    out.push_str(self.reader.read_utf8(len)?);
                }
                Marker::StrFinal => {
                    let len = self.reader.read_u16("string length")? as usize;
                    out.push_str(self.reader.read_utf8(len)?);
                    return Ok(out);
                }
                Marker::ShortString(len) => {
                    out.push_str(self.reader.read_utf8(len as usize)?);
                    return Ok(out);
                }
                Marker::MediumString(hi) => {
                    let lo = self.reader.next_byte("medium string length")?;
                    let len = ((hi as usize) << 8) | lo as usize;
                    out.push_str(self.reader.read_utf8(len)?);
                    return Ok(out);
                }
                _ => return Err(Error::BadTag { pos, tag }),
            }
        }
    }

    /// Read binary data: any run of 'A' chunks, then one final form.
    fn read_binary(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let pos = self.reader.pos();
            let tag = self.reader.next_byte("binary tag")?;
            match Marker::from_u8(tag) {
                Marker::BinChunk => {
                    let len = self.reader.read_u16("binary chunk length")? as usize;
                    out.extend_from_slice(self.reader.next_bytes(len, "binary chunk")?);
                }
                Marker::BinFinal => {
                    let len = self.reader.read_u16("binary length")? as usize;
                    out.extend_from_slice(self.reader.next_bytes(len, "binary data")?);
                    return Ok(out);
                }
                Marker::ShortBinary(len) => {
                    out.extend_from_slice(
                        self.reader.next_bytes(len as usize, "binary data")?,
                    );
                    return Ok(out);
                }
                Marker::MediumBinary(hi) => {
                    let lo = self.reader.next_byte("medium binary length")?;
                    let len = ((hi as usize) << 8) | lo as usize;
                    out.extend_from_slice(self.reader.next_bytes(len, "binary data")?);
                    return Ok(out);
                }
                _ => return Err(Error::BadTag { pos, tag }),
            }
        }
    }

    /// Both date forms come back as UTC instants: 'J' carries
    /// milliseconds, 'K' whole minutes.
    fn read_date(&mut self) -> Result<Timestamp> {
        let pos = self.reader.pos();
        let tag = self.reader.next_byte("date tag")?;
        match Marker::from_u8(tag) {
            Marker::DateMillis => Ok(Timestamp::from_millis(self.reader.read_i64("date")?)),
            Marker::DateMinutes => Ok(Timestamp::from_mins(
                self.reader.read_i32("minute date")? as i64,
            )),
            _ => Err(Error::BadTag { pos, tag }),
        }
    }

    fn read_map(&mut self) -> Result<Value> {
        let map = Map::new();
        self.refs.push(Value::Map(map.clone()));
        let pos = self.reader.pos();
        let tag = self.reader.next_byte("map tag")?;
        match Marker::from_u8(tag) {
            Marker::MapTyped => {
                let class = self.read_type()?;
                map.set_class_name(Some(class));
            }
            Marker::MapUntyped => {}
            _ => return Err(Error::BadTag { pos, tag }),
        }
        loop {
            match self.reader.peek() {
                None => {
                    return Err(Error::LengthTooShort {
                        pos: self.reader.pos(),
                        step: "map body",
                        expected: 1,
                        actual: 0,
                    })
                }
                Some(b) if Marker::from_u8(b) == Marker::End => {
                    self.reader.skip();
                    return Ok(Value::Map(map));
                }
                Some(_) => {
                    let key = self.read_value()?;
                    let value = self.read_value()?;
                    map.insert(key, value);
                }
            }
        }
    }

    /// Type-name protocol: a string defines the next table slot and
    /// yields itself, an int indexes an earlier slot.
    fn read_type(&mut self) -> Result<String> {
        let pos = self.reader.pos();
        let tag = self.reader.peek().ok_or(Error::LengthTooShort {
            pos,
            step: "type",
            expected: 1,
            actual: 0,
        })?;
        match Marker::from_u8(tag) {
            Marker::ShortString(_)
            | Marker::MediumString(_)
            | Marker::StrChunk
            | Marker::StrFinal => {
                let name = self.read_string()?;
                self.types.push(name.clone());
                Ok(name)
            }
            Marker::Int
            | Marker::IntOne(_)
            | Marker::IntTwo(_)
            | Marker::IntThree(_)
            | Marker::Long
            | Marker::LongOne(_)
            | Marker::LongTwo(_)
            | Marker::LongThree(_)
            | Marker::LongFour => {
                let index = self.read_int()?;
                match usize::try_from(index).ok().and_then(|i| self.types.get(i)) {
                    Some(name) => Ok(name.clone()),
                    None => Err(Error::BadTypeIndex {
                        pos,
                        index,
                        len: self.types.len(),
                    }),
                }
            }
            _ => Err(Error::BadTag { pos, tag }),
        }
    }

    fn read_list(&mut self) -> Result<Value> {
        let pos = self.reader.pos();
        let tag = self.reader.next_byte("list tag")?;
        let list = List::new();
        match Marker::from_u8(tag) {
            Marker::ListVarTyped => {
                // The type is informational here; reading it keeps the
                // type table's indices aligned.
                self.read_type()?;
                self.refs.push(Value::List(list.clone()));
                self.read_list_terminated(&list)?;
            }
            Marker::ListVarUntyped => {
                self.refs.push(Value::List(list.clone()));
                self.read_list_terminated(&list)?;
            }
            Marker::ListFixedTyped => {
                self.read_type()?;
                let len = self.read_length()?;
                self.refs.push(Value::List(list.clone()));
                self.read_list_fixed(&list, len)?;
            }
            Marker::ListFixedUntyped => {
                let len = self.read_length()?;
                self.refs.push(Value::List(list.clone()));
                self.read_list_fixed(&list, len)?;
            }
            Marker::ListTypedDirect(len) => {
                self.read_type()?;
                self.refs.push(Value::List(list.clone()));
                self.read_list_fixed(&list, len as usize)?;
            }
            Marker::ListUntypedDirect(len) => {
                self.refs.push(Value::List(list.clone()));
                self.read_list_fixed(&list, len as usize)?;
            }
            _ => return Err(Error::BadTag { pos, tag }),
        }
        Ok(Value::List(list))
    }

    fn read_list_terminated(&mut self, list: &List) -> Result<()> {
        loop {
            match self.reader.peek() {
                None => {
                    return Err(Error::LengthTooShort {
                        pos: self.reader.pos(),
                        step: "list body",
                        expected: 1,
                        actual: 0,
                    })
                }
                Some(b) if Marker::from_u8(b) == Marker::End => {
                    self.reader.skip();
                    return Ok(());
                }
                Some(_) => list.push(self.read_value()?),
            }
        }
    }

    fn read_list_fixed(&mut self, list: &List, len: usize) -> Result<()> {
        // Don't trust the wire: each element needs at least one byte,
        // so cap the reservation by what's actually left.
        list.items
            .borrow_mut()
            .reserve(len.min(self.reader.remaining()));
        for _ in 0..len {
            let value = self.read_value()?;
            list.push(value);
        }
        Ok(())
    }

    /// Read a non-negative int used as a length or count field.
    fn read_length(&mut self) -> Result<usize> {
        let pos = self.reader.pos();
        let tag = self.reader.peek().unwrap_or(0);
        let len = self.read_int()?;
        usize::try_from(len).map_err(|_| Error::BadTag { pos, tag })
    }

    fn read_ref(&mut self) -> Result<Value> {
        self.reader.skip();
        let pos = self.reader.pos();
        let index = self.read_int()?;
        usize::try_from(index)
            .ok()
            .and_then(|i| self.refs.get(i))
            .cloned()
            .ok_or(Error::BadRef {
                pos,
                index,
                len: self.refs.len(),
            })
    }

    /// 'C': learn a class layout. Definitions are not values; the
    /// caller keeps reading for the value that follows.
    fn read_class_def(&mut self) -> Result<()> {
        self.reader.skip();
        let name = self.read_string()?;
        let count = self.read_length()?;
        let mut fields = Vec::with_capacity(count.min(self.reader.remaining()));
        for _ in 0..count {
            fields.push(self.read_string()?);
        }
        self.classes.push(ClassDef { name, fields });
        Ok(())
    }

    /// 'O' or 0x60-0x6f: materialize an instance of a learned class
    /// as a class-named map, fields in definition order.
    fn read_object(&mut self) -> Result<Value> {
        let pos = self.reader.pos();
        let tag = self.reader.next_byte("object tag")?;
        let index = match Marker::from_u8(tag) {
            Marker::Object => self.read_int()?,
            Marker::ObjectDirect(idx) => idx as i64,
            _ => return Err(Error::BadTag { pos, tag }),
        };
        let def = usize::try_from(index)
            .ok()
            .and_then(|i| self.classes.get(i))
            .cloned()
            .ok_or(Error::BadClassIndex {
                pos,
                index,
                len: self.classes.len(),
            })?;
        let map = Map::with_class(def.name);
        self.refs.push(Value::Map(map.clone()));
        for field in def.fields {
            let value = self.read_value()?;
            map.insert(Value::String(field), value);
        }
        Ok(Value::Map(map))
    }
}
