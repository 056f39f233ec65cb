//! A codec for the Hessian 2.0 binary serialization format, the
//! self-describing object encoding used by Java RPC stacks such as
//! Dubbo (see <http://hessian.caucho.com/doc/hessian-serialization.html>).
//!
//! Values live in a small universal model ([`Value`]): null, boolean,
//! 64-bit integer, double, string, binary, millisecond timestamp,
//! list, and map. Maps may carry a Java class name, which the wire
//! writes as the typed-map (`M`) form. Lists and maps are shared
//! handles, so one composite appearing several times in a value graph
//! is emitted once and back-referenced after that — including cycles.
//!
//! ```
//! use hessian2::{decode, encode, Map, Value};
//!
//! let bean = Map::with_class("com.example.Bean");
//! bean.insert("a", 1i64);
//! bean.insert("b", "2");
//!
//! let bytes = encode(&Value::Map(bean));
//! let back = decode(&bytes).unwrap();
//! assert_eq!(back.as_map().unwrap().get_str("a"), Some(Value::Int(1)));
//! ```
//!
//! # Bytecode map
//!
//! ```text
//! x00 - x1f    utf-8 string, length 0-31
//! x20 - x2f    binary data, length 0-15
//! x30 - x33    utf-8 string, length 0-1023
//! x34 - x37    binary data, length 0-1023
//! x38 - x3f    three-octet compact long (-x40000 to x3ffff)
//! x40          reserved
//! x41          binary data non-final chunk ('A')
//! x42          binary data final chunk ('B')
//! x43          object type definition ('C')
//! x44          64-bit IEEE encoded double ('D')
//! x45          reserved
//! x46          boolean false ('F')
//! x47          reserved
//! x48          untyped map ('H')
//! x49          32-bit signed integer ('I')
//! x4a          64-bit UTC millisecond date ('J')
//! x4b          32-bit UTC minute date ('K')
//! x4c          64-bit signed long integer ('L')
//! x4d          map with type ('M')
//! x4e          null ('N')
//! x4f          object instance ('O')
//! x50          reserved
//! x51          reference to map/list/object ('Q')
//! x52          utf-8 string non-final chunk ('R')
//! x53          utf-8 string final chunk ('S')
//! x54          boolean true ('T')
//! x55          variable-length list ('U')
//! x56          fixed-length list ('V')
//! x57          variable-length untyped list ('W')
//! x58          fixed-length untyped list ('X')
//! x59          long encoded as 32-bit int ('Y')
//! x5a          list/map terminator ('Z')
//! x5b          double 0.0
//! x5c          double 1.0
//! x5d          double represented as byte
//! x5e          double represented as short
//! x5f          double represented as milli-scaled 32-bit int
//! x60 - x6f    object with direct type
//! x70 - x77    fixed list with direct length
//! x78 - x7f    fixed untyped list with direct length
//! x80 - xbf    one-octet compact int (-x10 to x2f, x90 is 0)
//! xc0 - xcf    two-octet compact int (-x800 to x7ff)
//! xd0 - xd7    three-octet compact int (-x40000 to x3ffff)
//! xd8 - xef    one-octet compact long (-x8 to xf, xe0 is 0)
//! xf0 - xff    two-octet compact long (-x800 to x7ff, xf8 is 0)
//! ```

mod decode;
mod encode;
mod error;
mod marker;
mod timestamp;
mod value;

pub use self::decode::{decode, decode_with_options, DecodeOptions, Decoder};
pub use self::encode::{encode, encode_with_options, EncodeOptions, Encoder};
pub use self::error::{Error, Result};
pub use self::timestamp::Timestamp;
pub use self::value::{List, Map, Value, CLASS_KEY};

/// Maximum nesting depth the decoder will follow before giving up.
/// Keeps adversarial input (a run of one-element list tags, say) from
/// exhausting the stack.
pub const MAX_DEPTH: usize = 128;
