use std::collections::HashMap;

use crate::marker::Marker;
use crate::value::{List, Map, Value};
use crate::Timestamp;

/// Encode-side options. Present for signature symmetry with
/// [`DecodeOptions`](crate::DecodeOptions) and forward compatibility;
/// currently carries no knobs.
#[derive(Clone, Debug, Default)]
pub struct EncodeOptions {}

/// Encode a value into a self-delimiting Hessian 2.0 byte stream.
///
/// Encoding cannot fail: every [`Value`] has a wire representation.
pub fn encode(value: &Value) -> Vec<u8> {
    encode_with_options(value, &EncodeOptions::default())
}

/// Encode a value with explicit options.
pub fn encode_with_options(value: &Value, _options: &EncodeOptions) -> Vec<u8> {
    let mut encoder = Encoder::new();
    encoder.write_value(value);
    encoder.into_bytes()
}

/// The encoding engine: a growable output buffer plus the two
/// per-invocation interning tables.
///
/// `refs` maps a composite's allocation address to its position in
/// emission order, so a list or map reachable twice through the value
/// graph is emitted once and back-referenced after that. `types` maps
/// a type name to its first-appearance index. Neither table survives
/// past [`into_bytes`](Encoder::into_bytes); a fresh `Encoder` is one
/// top-level invocation.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
    refs: HashMap<usize, usize>,
    types: HashMap<String, usize>,
}

/// Strings are chunked at this many characters per non-final chunk.
const STR_CHUNK_CHARS: usize = 0x8000;

/// Binaries are chunked at this many bytes, matching the reference
/// Java implementation bit for bit.
const BIN_CHUNK_BYTES: usize = 4093;

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the encoder and hand the encoded bytes to the caller.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Append one value, of any kind, to the output.
    pub fn write_value(&mut self, v: &Value) {
        match v {
            Value::Null => self.buf.push(Marker::Null.into()),
            Value::Bool(v) => self
                .buf
                .push(if *v { Marker::True } else { Marker::False }.into()),
            Value::Int(v) => self.write_int(*v),
            Value::Double(v) => self.write_double(*v),
            Value::String(v) => self.write_string(v),
            Value::Binary(v) => self.write_binary(v),
            Value::Date(v) => self.write_date(*v),
            Value::List(v) => self.write_list(v),
            Value::Map(v) => self.write_map(v),
        }
    }

    /// Emit an integer in the narrowest form that holds it: the one-,
    /// two-, or three-octet compact forms, then 'I', then 'L'.
    fn write_int(&mut self, v: i64) {
        if (-0x10..=0x2f).contains(&v) {
            self.buf.push(Marker::IntOne(v as i8).into());
        } else if (-0x800..=0x7ff).contains(&v) {
            self.buf.push(Marker::IntTwo((v >> 8) as i8).into());
            self.buf.push(v as u8);
        } else if (-0x40000..=0x3ffff).contains(&v) {
            self.buf.push(Marker::IntThree((v >> 16) as i8).into());
            self.buf.push((v >> 8) as u8);
            self.buf.push(v as u8);
        } else if i32::try_from(v).is_ok() {
            self.buf.push(Marker::Int.into());
            self.buf.extend_from_slice(&(v as i32).to_be_bytes());
        } else {
            self.buf.push(Marker::Long.into());
            self.buf.extend_from_slice(&v.to_be_bytes());
        }
    }

    /// Emit a double, preferring the compact forms when they
    /// round-trip exactly: 0.0/1.0 as bare tags, integral values as a
    /// byte or short, milli-scaled values as a 32-bit int, and the
    /// full IEEE form otherwise.
    fn write_double(&mut self, v: f64) {
        let millis = v * 1000.0;
        if v == 0.0 {
            self.buf.push(Marker::DoubleZero.into());
        } else if v == 1.0 {
            self.buf.push(Marker::DoubleOne.into());
        } else if v.fract() == 0.0 && (-128.0..=127.0).contains(&v) {
            self.buf.push(Marker::DoubleByte.into());
            self.buf.push(v as i8 as u8);
        } else if v.fract() == 0.0 && (-32768.0..=32767.0).contains(&v) {
            self.buf.push(Marker::DoubleShort.into());
            self.buf.extend_from_slice(&(v as i16).to_be_bytes());
        } else if millis.fract() == 0.0
            && (i32::MIN as f64..=i32::MAX as f64).contains(&millis)
            && (millis as i32) as f64 / 1000.0 == v
        {
            self.buf.push(Marker::DoubleMillis.into());
            self.buf.extend_from_slice(&(millis as i32).to_be_bytes());
        } else {
            self.buf.push(Marker::Double.into());
            self.buf.extend_from_slice(&v.to_be_bytes());
        }
    }

    /// Emit a string. Length fields count characters, not bytes (the
    /// wire's length unit is the Unicode scalar). Strings over 0xffff
    /// characters are split into 0x8000-character 'R' chunks with an
    /// 'S' chunk carrying the remainder.
    fn write_string(&mut self, v: &str) {
        let chars = bytecount::num_chars(v.as_bytes());
        if chars <= 31 {
            self.buf.push(Marker::ShortString(chars as u8).into());
            self.buf.extend_from_slice(v.as_bytes());
        } else if chars <= 1023 {
            self.buf.push(Marker::MediumString((chars >> 8) as u8).into());
            self.buf.push(chars as u8);
            self.buf.extend_from_slice(v.as_bytes());
        } else if chars <= 0xffff {
            self.buf.push(Marker::StrFinal.into());
            self.buf.extend_from_slice(&(chars as u16).to_be_bytes());
            self.buf.extend_from_slice(v.as_bytes());
        } else {
            let mut rest = v;
            let mut remaining = chars;
            while remaining > STR_CHUNK_CHARS {
                let split = char_boundary(rest, STR_CHUNK_CHARS);
                self.buf.push(Marker::StrChunk.into());
                self.buf
                    .extend_from_slice(&(STR_CHUNK_CHARS as u16).to_be_bytes());
                self.buf.extend_from_slice(rest[..split].as_bytes());
                rest = &rest[split..];
                remaining -= STR_CHUNK_CHARS;
            }
            self.buf.push(Marker::StrFinal.into());
            self.buf.extend_from_slice(&(remaining as u16).to_be_bytes());
            self.buf.extend_from_slice(rest.as_bytes());
        }
    }

    /// Emit binary data. Payloads over 1023 bytes split into
    /// 4093-byte chunks; each chunk, including the final one, uses
    /// the shortest form for its own length, so every non-final chunk
    /// is an 'A' record and the final chunk may be an inline form.
    fn write_binary(&mut self, v: &[u8]) {
        if v.is_empty() {
            self.buf.push(Marker::ShortBinary(0).into());
            return;
        }
        let mut chunks = v.chunks(BIN_CHUNK_BYTES).peekable();
        while let Some(chunk) = chunks.next() {
            let len = chunk.len();
            if len <= 15 {
                self.buf.push(Marker::ShortBinary(len as u8).into());
            } else if len <= 1023 {
                self.buf.push(Marker::MediumBinary((len >> 8) as u8).into());
                self.buf.push(len as u8);
            } else {
                let marker = if chunks.peek().is_some() {
                    Marker::BinChunk
                } else {
                    Marker::BinFinal
                };
                self.buf.push(marker.into());
                self.buf.extend_from_slice(&(len as u16).to_be_bytes());
            }
            self.buf.extend_from_slice(chunk);
        }
    }

    /// Emit a date. Only the 64-bit millisecond form is produced; the
    /// minute form is decode-side legacy.
    fn write_date(&mut self, v: Timestamp) {
        self.buf.push(Marker::DateMillis.into());
        self.buf.extend_from_slice(&v.as_millis().to_be_bytes());
    }

    /// Emit a list as an untyped fixed-length list, or a
    /// back-reference if this exact list was emitted before.
    fn write_list(&mut self, v: &List) {
        if self.try_write_ref(v.addr()) {
            return;
        }
        let items = v.items.borrow();
        let len = items.len();
        if len <= 15 {
            self.buf.push(Marker::ListUntypedDirect(len as u8).into());
        } else {
            self.buf.push(Marker::ListFixedUntyped.into());
            self.write_int(len as i64);
        }
        for item in items.iter() {
            self.write_value(item);
        }
    }

    /// Emit a map ('M' with an interned type name when it carries a
    /// class, 'H' otherwise), or a back-reference if this exact map
    /// was emitted before.
    fn write_map(&mut self, v: &Map) {
        if self.try_write_ref(v.addr()) {
            return;
        }
        let inner = v.borrow_inner();
        match inner.class {
            Some(ref class) => {
                self.buf.push(Marker::MapTyped.into());
                self.write_type(class);
            }
            None => self.buf.push(Marker::MapUntyped.into()),
        }
        for (k, v) in inner.entries.iter() {
            self.write_value(k);
            self.write_value(v);
        }
        self.buf.push(Marker::End.into());
    }

    /// Type-name protocol: first appearance emits the literal string
    /// and claims the next table index, later appearances emit the
    /// index as an int.
    fn write_type(&mut self, name: &str) {
        match self.types.get(name) {
            Some(&index) => self.write_int(index as i64),
            None => {
                self.types.insert(name.to_string(), self.types.len());
                self.write_string(name);
            }
        }
    }

    /// If `addr` was seen before, emit a back-reference to it and
    /// report true. Otherwise claim the next reference index for it,
    /// so back-references inside the composite's own body resolve.
    fn try_write_ref(&mut self, addr: usize) -> bool {
        match self.refs.get(&addr) {
            Some(&index) => {
                self.buf.push(Marker::Ref.into());
                self.write_int(index as i64);
                true
            }
            None => {
                self.refs.insert(addr, self.refs.len());
                false
            }
        }
    }
}

/// Byte offset just past the first `chars` characters of `s`.
/// `s` must hold at least that many.
fn char_boundary(s: &str, chars: usize) -> usize {
    s.char_indices()
        .nth(chars)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

#[cfg(test)]
mod test {
    use super::*;

    fn enc(v: impl Into<Value>) -> Vec<u8> {
        encode(&v.into())
    }

    mod null_and_bool {
        use super::*;

        #[test]
        fn spec() {
            assert_eq!(enc(Value::Null), b"N");
            assert_eq!(enc(true), b"T");
            assert_eq!(enc(false), b"F");
        }
    }

    mod int {
        use super::*;

        #[test]
        fn one_octet() {
            assert_eq!(enc(0i64), [0x90]);
            assert_eq!(enc(1i64), [0x91]);
            assert_eq!(enc(16i64), [0xa0]);
            assert_eq!(enc(-0x10i64), [0x80]);
            assert_eq!(enc(0x2fi64), [0xbf]);
        }

        #[test]
        fn two_octet() {
            assert_eq!(enc(1000i64), [0xcb, 0xe8]);
            assert_eq!(enc(-0x800i64), [0xc0, 0x00]);
            assert_eq!(enc(0x7ffi64), [0xcf, 0xff]);
        }

        #[test]
        fn three_octet() {
            assert_eq!(enc(16000i64), [0xd4, 0x3e, 0x80]);
            assert_eq!(enc(-65000i64), [0xd3, 0x02, 0x18]);
            assert_eq!(enc(-0x40000i64), [0xd0, 0x00, 0x00]);
            assert_eq!(enc(0x3ffffi64), [0xd7, 0xff, 0xff]);
        }

        #[test]
        fn int32() {
            assert_eq!(enc(500_000i64), [0x49, 0x00, 0x07, 0xa1, 0x20]);
            assert_eq!(enc(i32::MIN as i64), [0x49, 0x80, 0x00, 0x00, 0x00]);
            assert_eq!(enc(i32::MAX as i64), [0x49, 0x7f, 0xff, 0xff, 0xff]);
        }

        #[test]
        fn long() {
            assert_eq!(
                enc(9_000_000_000_000_000i64),
                [0x4c, 0x00, 0x1f, 0xf9, 0x73, 0xca, 0xfa, 0x80, 0x00]
            );
            assert_eq!(
                enc(80_000_000_000i64),
                [0x4c, 0x00, 0x00, 0x00, 0x12, 0xa0, 0x5f, 0x20, 0x00]
            );
            assert_eq!(
                enc(-9_000_000_000_000_000_000i64),
                [0x4c, 0x83, 0x19, 0x93, 0xaf, 0x1d, 0x7c, 0x00, 0x00]
            );
            assert_eq!(
                enc(i64::MIN),
                [0x4c, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
            );
            assert_eq!(
                enc(i64::MAX),
                [0x4c, 0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]
            );
        }

        #[test]
        fn shortest_form_is_chosen() {
            // Output length must be exactly the matching row's width.
            let rows: [(i64, i64, usize); 5] = [
                (-0x10, 0x2f, 1),
                (-0x800, 0x7ff, 2),
                (-0x40000, 0x3ffff, 3),
                (i32::MIN as i64, i32::MAX as i64, 5),
                (i64::MIN, i64::MAX, 9),
            ];
            for (case, expect) in [
                (0, 1),
                (0x2f, 1),
                (0x30, 2),
                (0x7ff, 2),
                (0x800, 3),
                (0x3ffff, 3),
                (0x40000, 5),
                (i32::MAX as i64, 5),
                (i32::MAX as i64 + 1, 9),
                (-0x11, 2),
                (-0x801, 3),
                (-0x40001, 5),
                (i32::MIN as i64 - 1, 9),
            ] {
                let out = enc(case);
                assert_eq!(out.len(), expect, "width for {}", case);
                let row = rows
                    .iter()
                    .find(|&&(lo, hi, _)| (lo..=hi).contains(&case))
                    .unwrap();
                assert_eq!(out.len(), row.2, "row match for {}", case);
            }
        }
    }

    mod double {
        use super::*;

        #[test]
        fn spec() {
            assert_eq!(enc(0.0), [0x5b]);
            assert_eq!(enc(1.0), [0x5c]);
            assert_eq!(enc(3.0), [0x5d, 0x03]);
            assert_eq!(enc(-1.0), [0x5d, 0xff]);
            assert_eq!(enc(127.0), [0x5d, 0x7f]);
            assert_eq!(enc(-128.0), [0x5d, 0x80]);
            assert_eq!(enc(300.0), [0x5e, 0x01, 0x2c]);
            assert_eq!(enc(10000.0), [0x5e, 0x27, 0x10]);
            assert_eq!(enc(3.14), [0x5f, 0x00, 0x00, 0x0c, 0x44]);
            assert_eq!(
                enc(3.1415926),
                [0x44, 0x40, 0x09, 0x21, 0xfb, 0x4d, 0x12, 0xd8, 0x4a]
            );
        }

        #[test]
        fn millis_form_boundaries() {
            // One decimal digit is milli-exact.
            assert_eq!(enc(0.1), [0x5f, 0x00, 0x00, 0x00, 0x64]);
            // Milli value past i32 range falls through to 'D'.
            assert_eq!(enc(2_147_483.648)[0], 0x44);
            // Non-integral milli value falls through to 'D'.
            assert_eq!(enc(3_000_000.5)[0], 0x44);
        }

        #[test]
        fn full_ieee_keeps_bits() {
            let v = std::f64::consts::E;
            let out = enc(v);
            assert_eq!(out[0], 0x44);
            assert_eq!(&out[1..], &v.to_be_bytes());
        }
    }

    mod string {
        use super::*;

        #[test]
        fn spec() {
            assert_eq!(enc(""), [0x00]);
            assert_eq!(enc("hello"), [0x05, 0x68, 0x65, 0x6c, 0x6c, 0x6f]);
            // Length counts characters, not UTF-8 bytes.
            assert_eq!(
                enc("中文测试"),
                [0x04, 0xe4, 0xb8, 0xad, 0xe6, 0x96, 0x87, 0xe6, 0xb5, 0x8b, 0xe8, 0xaf, 0x95]
            );
        }

        #[test]
        fn medium_form() {
            let s = "a".repeat(128);
            let mut expect = vec![0x30, 0x80];
            expect.extend_from_slice(s.as_bytes());
            assert_eq!(enc(s.as_str()), expect);

            let s = "b".repeat(1023);
            let out = enc(s.as_str());
            assert_eq!(&out[..2], &[0x33, 0xff]);
            assert_eq!(out.len(), 2 + 1023);
        }

        #[test]
        fn final_chunk_form() {
            let s = "abc".repeat(1024);
            let mut expect = vec![0x53, 0x0c, 0x00];
            expect.extend_from_slice(s.as_bytes());
            assert_eq!(enc(s.as_str()), expect);
        }

        #[test]
        fn chunked_over_u16() {
            // 0x14000 chars: two full 'R' chunks and a 0x4000 'S' tail.
            let s = "x".repeat(0x14000);
            let out = enc(s.as_str());
            assert_eq!(&out[..3], &[0x52, 0x80, 0x00]);
            let second = 3 + 0x8000;
            assert_eq!(&out[second..second + 3], &[0x52, 0x80, 0x00]);
            let tail = second + 3 + 0x8000;
            assert_eq!(&out[tail..tail + 3], &[0x53, 0x40, 0x00]);
            assert_eq!(out.len(), tail + 3 + 0x4000);
        }

        #[test]
        fn chunk_split_respects_char_boundaries() {
            // Multi-byte characters: the chunk boundary must fall
            // between scalars, never inside a UTF-8 sequence.
            let s = "中".repeat(0x10000 + 10);
            let out = enc(s.as_str());
            assert_eq!(&out[..3], &[0x52, 0x80, 0x00]);
            let second = 3 + 0x8000 * 3;
            assert_eq!(&out[second..second + 3], &[0x52, 0x80, 0x00]);
            let tail = second + 3 + 0x8000 * 3;
            assert_eq!(&out[tail..tail + 3], &[0x53, 0x00, 0x0a]);
            assert_eq!(out.len(), tail + 3 + 10 * 3);
        }
    }

    mod binary {
        use super::*;

        #[test]
        fn spec() {
            assert_eq!(enc(Vec::<u8>::new()), [0x20]);
            assert_eq!(
                enc(b"hello".to_vec()),
                [0x25, 0x68, 0x65, 0x6c, 0x6c, 0x6f]
            );
            let mut expect = vec![0x34, 0x80];
            expect.extend_from_slice(&[0x61; 128]);
            assert_eq!(enc(vec![0x61; 128]), expect);
        }

        #[test]
        fn single_final_chunk() {
            let payload = b"abc".repeat(1024);
            let mut expect = vec![0x42, 0x0c, 0x00];
            expect.extend_from_slice(&payload);
            assert_eq!(enc(payload), expect);
        }

        #[test]
        fn chunked_with_inline_tail() {
            // 5000 bytes: one full 'A' chunk, then a 907-byte
            // inline-length chunk finishing the stream.
            let payload = vec![0u8; 5000];
            let out = enc(payload);
            assert_eq!(&out[..3], &[0x41, 0x0f, 0xfd]);
            let tail = 3 + 4093;
            assert_eq!(&out[tail..tail + 2], &[0x37, 0x8b]);
            assert_eq!(out.len(), tail + 2 + 907);
        }

        #[test]
        fn nonfinal_chunks_are_4093() {
            let payload = vec![1u8; 4093 * 2 + 4093];
            let out = enc(payload);
            let mut pos = 0;
            for _ in 0..2 {
                assert_eq!(&out[pos..pos + 3], &[0x41, 0x0f, 0xfd]);
                pos += 3 + 4093;
            }
            assert_eq!(&out[pos..pos + 3], &[0x42, 0x0f, 0xfd]);
            assert_eq!(out.len(), pos + 3 + 4093);
        }
    }

    mod date {
        use super::*;

        #[test]
        fn spec() {
            // 2021-02-03 11:22:33 UTC
            let t = Timestamp::from_millis(1_612_351_353_000);
            assert_eq!(
                enc(t),
                [0x4a, 0x00, 0x00, 0x01, 0x77, 0x65, 0xe9, 0xbc, 0xa8]
            );
        }
    }

    mod list {
        use super::*;

        #[test]
        fn short_form() {
            let list = List::from(vec![Value::Int(1), Value::from("a")]);
            assert_eq!(encode(&list.into()), [0x7a, 0x91, 0x01, b'a']);
        }

        #[test]
        fn long_form() {
            let list: List = (0..16).map(Value::Int).collect();
            let out = encode(&list.into());
            assert_eq!(&out[..2], &[0x58, 0xa0]);
            assert_eq!(out.len(), 2 + 16);
        }

        #[test]
        fn empty() {
            assert_eq!(encode(&List::new().into()), [0x78]);
        }
    }

    mod map {
        use super::*;

        #[test]
        fn untyped_spec() {
            let m = Map::new();
            m.insert("a", 1i64);
            m.insert("b", Value::Null);
            m.insert("c", "3");
            assert_eq!(
                encode(&m.into()),
                [0x48, 0x01, b'a', 0x91, 0x01, b'b', 0x4e, 0x01, b'c', 0x01, b'3', 0x5a]
            );
        }

        #[test]
        fn typed_emits_class_name() {
            let name = "java.util.concurrent.ConcurrentHashMap";
            let m = Map::with_class(name);
            m.insert("a", "1");
            m.insert("b", "2");
            let out = encode(&m.into());
            assert_eq!(out[0], 0x4d);
            assert_eq!(out[1] as usize, name.len());
            assert_eq!(&out[2..2 + name.len()], name.as_bytes());
            assert_eq!(
                &out[2 + name.len()..],
                &[0x01, b'a', 0x01, b'1', 0x01, b'b', 0x01, b'2', 0x5a]
            );
        }

        #[test]
        fn type_names_intern() {
            // Same class twice: literal once, index 0 the second time.
            let name = b"com.example.Bean";
            let outer = Map::new();
            let a = Map::with_class("com.example.Bean");
            let b = Map::with_class("com.example.Bean");
            outer.insert("a", a);
            outer.insert("b", b);
            let out = encode(&outer.into());
            let literal_hits = out
                .windows(name.len())
                .filter(|&w| w == &name[..])
                .count();
            assert_eq!(literal_hits, 1);
            // Second typed map header is 'M' followed by int 0.
            assert!(out.windows(2).any(|w| w == &[0x4d, 0x90][..]));
        }
    }

    mod refs {
        use super::*;

        #[test]
        fn shared_map_becomes_backref() {
            let shared = Map::new();
            shared.insert("a", "1");
            shared.insert("b", "2");
            let outer = Map::new();
            outer.insert("m1", shared.clone());
            outer.insert("m2", shared);
            assert_eq!(
                encode(&outer.into()),
                [
                    0x48, 0x02, b'm', b'1', 0x48, 0x01, b'a', 0x01, b'1', 0x01, b'b', 0x01, b'2',
                    0x5a, 0x02, b'm', b'2', 0x51, 0x91, 0x5a
                ]
            );
        }

        #[test]
        fn equal_but_distinct_maps_emit_twice() {
            let outer = List::new();
            let a = Map::new();
            a.insert("k", 1i64);
            let b = Map::new();
            b.insert("k", 1i64);
            outer.push(a);
            outer.push(b);
            let out = encode(&outer.into());
            let full_maps = out.iter().filter(|&&b| b == 0x48).count();
            assert_eq!(full_maps, 2);
            assert!(!out.contains(&0x51));
        }

        #[test]
        fn shared_list_backref() {
            let shared = List::from(vec![Value::Int(1)]);
            let outer = List::new();
            outer.push(shared.clone());
            outer.push(shared);
            // Outer registers as ref 0, inner as ref 1.
            assert_eq!(encode(&outer.into()), [0x7a, 0x79, 0x91, 0x51, 0x91]);
        }

        #[test]
        fn self_referential_map() {
            let m = Map::new();
            m.insert("me", m.clone());
            assert_eq!(
                encode(&m.into()),
                [0x48, 0x02, b'm', b'e', 0x51, 0x90, 0x5a]
            );
        }
    }
}
