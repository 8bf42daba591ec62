// AMF0 value

use byteorder::{BigEndian, ByteOrder};
use std::collections::HashMap;

use super::decode::AMFDecodingCursor;
use super::AMF3Value;
use crate::error::{CodecError, EncodeError};

const AMF0_TYPE_NUMBER: u8 = 0x00;
const AMF0_TYPE_BOOL: u8 = 0x01;
const AMF0_TYPE_STRING: u8 = 0x02;
const AMF0_TYPE_OBJECT: u8 = 0x03;
const AMF0_TYPE_NULL: u8 = 0x05;
const AMF0_TYPE_UNDEFINED: u8 = 0x06;
const AMF0_TYPE_REF: u8 = 0x07;
const AMF0_TYPE_ARRAY: u8 = 0x08;
const AMF0_TYPE_STRICT_ARRAY: u8 = 0x0A;
const AMF0_TYPE_DATE: u8 = 0x0B;
const AMF0_TYPE_LONG_STRING: u8 = 0x0C;
const AMF0_TYPE_XML_DOC: u8 = 0x0F;
const AMF0_TYPE_TYPED_OBJ: u8 = 0x10;
const AMF0_TYPE_SWITCH_AMF3: u8 = 0x11;

const AMF0_OBJECT_TERM_CODE: u8 = 0x09;

/// Recursion guard against a peer nesting objects deep enough to blow the
/// stack; well past anything a real RTMP command argument ever needs.
const MAX_DECODE_DEPTH: usize = 64;

/// AMF0 compatible value
#[derive(Debug, Clone, PartialEq)]
pub enum AMF0Value {
    Number {
        value: f64,
    },
    Bool {
        value: bool,
    },
    String {
        value: String,
    },
    Object {
        properties: HashMap<String, AMF0Value>,
    },
    Null,
    Undefined,
    Ref {
        addr: i64,
    },
    Array {
        items: HashMap<String, AMF0Value>,
    },
    StrictArray {
        items: Vec<AMF0Value>,
    },
    Date {
        timestamp: f64,
    },
    LongString {
        value: String,
    },
    XmlDocument {
        content: String,
    },
    TypedObject {
        type_name: String,
        properties: HashMap<String, AMF0Value>,
    },
    SwitchAmf3 {
        value: AMF3Value,
    },
}

impl AMF0Value {
    /// Obtains a string representation of the value
    /// Used for debug logging purposes
    pub fn to_debug_string(&self, tabs: &str) -> String {
        match self {
            AMF0Value::Number { value } => {
                format!("{}", value)
            }
            AMF0Value::Bool { value } => {
                if *value {
                    "TRUE".to_string()
                } else {
                    "FALSE".to_string()
                }
            }
            AMF0Value::String { value } => {
                format!("'{}'", value)
            }
            AMF0Value::Object { properties } => {
                let mut res = "{\n".to_string();

                for (key, value) in properties.iter() {
                    res.push_str(tabs);
                    res.push_str("    '");
                    res.push_str(key);
                    res.push_str("' = ");
                    res.push_str(&value.to_debug_string(&format!("{}    ", tabs)));
                    res.push('\n');
                }

                res.push_str(tabs);
                res.push('}');

                res
            }
            AMF0Value::Null => "NULL".to_string(),
            AMF0Value::Undefined => "UNDEFINED".to_string(),
            AMF0Value::Ref { addr } => {
                format!("REF#{}", addr)
            }
            AMF0Value::Array { items } => {
                let mut res = "ARRAY [\n".to_string();

                for (key, value) in items.iter() {
                    res.push_str(tabs);
                    res.push_str("    '");
                    res.push_str(key);
                    res.push_str("' = ");
                    res.push_str(&value.to_debug_string(&format!("{}    ", tabs)));
                    res.push('\n');
                }

                res.push_str(tabs);
                res.push(']');

                res
            }
            AMF0Value::StrictArray { items } => {
                let mut res = "STRICT_ARRAY [\n".to_string();

                for value in items.iter() {
                    res.push_str(tabs);
                    res.push_str("    ");
                    res.push_str(&value.to_debug_string(&format!("{}    ", tabs)));
                    res.push('\n');
                }

                res.push_str(tabs);
                res.push(']');

                res
            }
            AMF0Value::Date { timestamp } => {
                format!("DATE({})", timestamp)
            }
            AMF0Value::LongString { value } => {
                format!("L'{}'", value)
            }
            AMF0Value::XmlDocument { content } => {
                format!("XML'{}'", content)
            }
            AMF0Value::TypedObject {
                type_name,
                properties,
            } => {
                let mut res = format!("{} {}\n", type_name, "{");

                for (key, value) in properties.iter() {
                    res.push_str(tabs);
                    res.push_str("    '");
                    res.push_str(key);
                    res.push_str("' = ");
                    res.push_str(&value.to_debug_string(&format!("{}    ", tabs)));
                    res.push('\n');
                }

                res.push_str(tabs);
                res.push('}');

                res
            }
            AMF0Value::SwitchAmf3 { value } => format!("AMF3({})", value.to_debug_string(tabs)),
        }
    }

    // Value check functions:

    /// Returns true if the value is AMF3
    pub fn is_amf3(&self) -> bool {
        matches!(self, AMF0Value::SwitchAmf3 { value: _ })
    }

    /// Returns true if the value is undefined
    pub fn is_undefined(&self) -> bool {
        match self {
            AMF0Value::Undefined => true,
            AMF0Value::SwitchAmf3 { value } => value.is_undefined(),
            _ => false,
        }
    }

    /// Returns true if the value is null
    pub fn is_null(&self) -> bool {
        match self {
            AMF0Value::Null => true,
            AMF0Value::SwitchAmf3 { value } => value.is_null(),
            _ => false,
        }
    }

    /// Returns the value as boolean
    pub fn get_bool(&self) -> bool {
        match self {
            AMF0Value::Bool { value } => *value,
            AMF0Value::Number { value } => *value != 0.0,
            AMF0Value::SwitchAmf3 { value } => value.get_bool(),
            _ => false,
        }
    }

    /// Returns the value as integer
    pub fn get_integer(&self) -> i64 {
        match self {
            AMF0Value::Number { value } => *value as i64,
            AMF0Value::Ref { addr } => *addr,
            AMF0Value::Date { timestamp } => *timestamp as i64,
            AMF0Value::SwitchAmf3 { value } => value.get_integer(),
            _ => 0,
        }
    }

    /// Returns the value as float
    pub fn get_float(&self) -> f64 {
        match self {
            AMF0Value::Number { value } => *value,
            AMF0Value::Ref { addr } => *addr as f64,
            AMF0Value::Date { timestamp } => *timestamp,
            AMF0Value::SwitchAmf3 { value } => value.get_float(),
            _ => 0.0,
        }
    }

    /// Returns the value as float
    pub fn get_string(&self) -> &str {
        match self {
            AMF0Value::String { value } => value.as_str(),
            AMF0Value::LongString { value } => value.as_str(),
            AMF0Value::XmlDocument { content } => content.as_str(),
            AMF0Value::SwitchAmf3 { value } => value.get_string(),
            _ => "",
        }
    }

    /// Returns the value as byte array
    pub fn get_byte_array(&self) -> Option<&Vec<u8>> {
        match self {
            AMF0Value::SwitchAmf3 { value } => value.get_byte_array(),
            _ => None,
        }
    }

    /// Returns the value as object (HashMap)
    pub fn get_object(&self) -> Option<&HashMap<String, AMF0Value>> {
        match self {
            AMF0Value::Object { properties } => Some(properties),
            AMF0Value::Array { items } => Some(items),
            AMF0Value::TypedObject {
                type_name: _,
                properties,
            } => Some(properties),
            _ => None,
        }
    }

    /// Gets the value of a property (for objects)
    pub fn get_object_property(&self, property_name: &str) -> Option<&AMF0Value> {
        let obj = self.get_object();

        match obj {
            Some(o) => o.get(property_name),
            None => None,
        }
    }

    /// Returns the value as array (Vec)
    pub fn get_array(&self) -> Option<&Vec<AMF0Value>> {
        match self {
            AMF0Value::StrictArray { items } => Some(items),
            _ => None,
        }
    }

    /// Gets an element of the array, given its index
    pub fn get_array_element(&self, index: usize) -> Option<&AMF0Value> {
        let arr = self.get_array();

        match arr {
            Some(a) => a.get(index),
            None => None,
        }
    }

    // Encoding functions:

    /// Encodes value into bytes
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let mut buf = match self {
            AMF0Value::Number { value } => {
                let mut buf = vec![AMF0_TYPE_NUMBER];
                buf.extend(Self::encode_number(*value));
                buf
            }
            AMF0Value::Bool { value } => {
                let mut buf = vec![AMF0_TYPE_BOOL];
                buf.extend(Self::encode_bool(*value));
                buf
            }
            AMF0Value::String { value } => {
                let mut buf = vec![AMF0_TYPE_STRING];
                buf.extend(Self::encode_string(value)?);
                buf
            }
            AMF0Value::Object { properties } => {
                let mut buf = vec![AMF0_TYPE_OBJECT];
                buf.extend(Self::encode_object(properties)?);
                buf
            }
            AMF0Value::Null => vec![AMF0_TYPE_NULL],
            AMF0Value::Undefined => vec![AMF0_TYPE_UNDEFINED],
            AMF0Value::Ref { addr } => {
                let mut buf = vec![AMF0_TYPE_REF];
                buf.extend(Self::encode_ref(*addr as u16));
                buf
            }
            AMF0Value::Array { items } => {
                let mut buf = vec![AMF0_TYPE_ARRAY];
                buf.extend(Self::encode_array(items)?);
                buf
            }
            AMF0Value::StrictArray { items } => {
                let mut buf = vec![AMF0_TYPE_STRICT_ARRAY];
                buf.extend(Self::encode_strict_array(items)?);
                buf
            }
            AMF0Value::Date { timestamp } => {
                let mut buf = vec![AMF0_TYPE_DATE];
                buf.extend(Self::encode_date(*timestamp));
                buf
            }
            AMF0Value::LongString { value } => {
                let mut buf = vec![AMF0_TYPE_LONG_STRING];
                buf.extend(Self::encode_long_string(value)?);
                buf
            }
            AMF0Value::XmlDocument { content } => {
                let mut buf = vec![AMF0_TYPE_XML_DOC];
                buf.extend(Self::encode_long_string(content)?);
                buf
            }
            AMF0Value::TypedObject {
                type_name,
                properties,
            } => {
                let mut buf = vec![AMF0_TYPE_TYPED_OBJ];
                buf.extend(Self::encode_typed_object(type_name, properties)?);
                buf
            }
            AMF0Value::SwitchAmf3 { value } => {
                let mut buf = vec![AMF0_TYPE_SWITCH_AMF3];
                buf.extend(value.encode()?);
                buf
            }
        };
        buf.shrink_to_fit();
        Ok(buf)
    }

    /// Encodes number value
    pub fn encode_number(num: f64) -> Vec<u8> {
        let mut buf = vec![0; 8];
        BigEndian::write_f64(&mut buf, num);
        buf
    }

    /// Encodes boolean value
    pub fn encode_bool(b: bool) -> Vec<u8> {
        if b {
            vec![0x01]
        } else {
            vec![0x00]
        }
    }

    /// Encodes date value
    pub fn encode_date(ts: f64) -> Vec<u8> {
        let mut buf = vec![0x00, 0x00];
        buf.extend(Self::encode_number(ts));
        buf
    }

    /// Encodes a short (u16-length-prefixed) string value
    pub fn encode_string(s: &str) -> Result<Vec<u8>, EncodeError> {
        if s.len() > u16::MAX as usize {
            return Err(EncodeError::WrongType {
                field: "string",
                reason: "string too long for a short AMF0 string, use LongString".to_string(),
            });
        }
        let mut buf = vec![0x00; 2];
        BigEndian::write_u16(&mut buf, s.len() as u16);
        buf.extend(s.as_bytes());
        Ok(buf)
    }

    /// Encodes a long (u32-length-prefixed) string value
    pub fn encode_long_string(s: &str) -> Result<Vec<u8>, EncodeError> {
        if s.len() > u32::MAX as usize {
            return Err(EncodeError::WrongType {
                field: "long_string",
                reason: "string too long to encode".to_string(),
            });
        }
        let mut buf = vec![0x00; 4];
        BigEndian::write_u32(&mut buf, s.len() as u32);
        buf.extend(s.as_bytes());
        Ok(buf)
    }

    /// Encodes object value
    pub fn encode_object(o: &HashMap<String, AMF0Value>) -> Result<Vec<u8>, EncodeError> {
        let mut buf = Vec::new();

        let mut keys: Vec<&str> = Vec::with_capacity(o.len());

        for key in o.keys() {
            keys.push(key);
        }

        keys.sort();

        for key in keys {
            buf.extend(Self::encode_string(key)?);
            let value = o.get(key).unwrap();
            buf.extend(value.encode()?);
        }

        buf.extend(Self::encode_string("")?);
        buf.push(AMF0_OBJECT_TERM_CODE);

        Ok(buf)
    }

    /// Encodes array value
    pub fn encode_array(arr: &HashMap<String, AMF0Value>) -> Result<Vec<u8>, EncodeError> {
        let mut buf = vec![0u8; 4];
        BigEndian::write_u32(&mut buf, arr.len() as u32);
        buf.extend(Self::encode_object(arr)?);
        Ok(buf)
    }

    /// Encodes strict array value
    pub fn encode_strict_array(arr: &Vec<AMF0Value>) -> Result<Vec<u8>, EncodeError> {
        let mut buf = vec![0u8; 4];
        BigEndian::write_u32(&mut buf, arr.len() as u32);

        for item in arr {
            buf.extend(item.encode()?);
        }

        Ok(buf)
    }

    /// Encodes reference value
    pub fn encode_ref(index: u16) -> Vec<u8> {
        let mut buf = vec![0x00; 2];
        BigEndian::write_u16(&mut buf, index);
        buf
    }

    /// Encodes typed object value
    pub fn encode_typed_object(
        type_name: &str,
        o: &HashMap<String, AMF0Value>,
    ) -> Result<Vec<u8>, EncodeError> {
        let mut buf = Self::encode_string(type_name)?;
        buf.extend(Self::encode_object(o)?);
        Ok(buf)
    }

    // Decoding functions:

    /// Decodes one AMF0 value from `buffer` at `cursor`.
    pub fn decode(cursor: &mut AMFDecodingCursor, buffer: &[u8]) -> Result<AMF0Value, CodecError> {
        Self::decode_at_depth(cursor, buffer, 0)
    }

    fn decode_at_depth(
        cursor: &mut AMFDecodingCursor,
        buffer: &[u8],
        depth: usize,
    ) -> Result<AMF0Value, CodecError> {
        if depth > MAX_DECODE_DEPTH {
            return Err(CodecError::Decode(
                "AMF0 value nested too deeply".to_string(),
            ));
        }

        let marker = cursor.read_u8(buffer)?;
        match marker {
            AMF0_TYPE_NUMBER => Ok(AMF0Value::Number {
                value: cursor.read_f64_be(buffer)?,
            }),
            AMF0_TYPE_BOOL => Ok(AMF0Value::Bool {
                value: cursor.read_u8(buffer)? != 0,
            }),
            AMF0_TYPE_STRING => {
                let len = cursor.read_u16_be(buffer)? as usize;
                Ok(AMF0Value::String {
                    value: cursor.read_utf8(buffer, len)?,
                })
            }
            AMF0_TYPE_OBJECT => Ok(AMF0Value::Object {
                properties: Self::decode_object_body(cursor, buffer, depth)?,
            }),
            AMF0_TYPE_NULL => Ok(AMF0Value::Null),
            AMF0_TYPE_UNDEFINED => Ok(AMF0Value::Undefined),
            AMF0_TYPE_REF => Ok(AMF0Value::Ref {
                addr: cursor.read_u16_be(buffer)? as i64,
            }),
            AMF0_TYPE_ARRAY => {
                let _count = cursor.read_u32_be(buffer)?;
                Ok(AMF0Value::Array {
                    items: Self::decode_object_body(cursor, buffer, depth)?,
                })
            }
            AMF0_TYPE_STRICT_ARRAY => {
                let count = cursor.read_u32_be(buffer)? as usize;
                let mut items = Vec::with_capacity(count.min(4096));
                for _ in 0..count {
                    items.push(Self::decode_at_depth(cursor, buffer, depth + 1)?);
                }
                Ok(AMF0Value::StrictArray { items })
            }
            AMF0_TYPE_DATE => {
                let timestamp = cursor.read_f64_be(buffer)?;
                cursor
                    .skip(2)
                    .map_err(|_| CodecError::Decode("truncated AMF0 date".to_string()))?;
                Ok(AMF0Value::Date { timestamp })
            }
            AMF0_TYPE_LONG_STRING => {
                let len = cursor.read_u32_be(buffer)? as usize;
                Ok(AMF0Value::LongString {
                    value: cursor.read_utf8(buffer, len)?,
                })
            }
            AMF0_TYPE_XML_DOC => {
                let len = cursor.read_u32_be(buffer)? as usize;
                Ok(AMF0Value::XmlDocument {
                    content: cursor.read_utf8(buffer, len)?,
                })
            }
            AMF0_TYPE_TYPED_OBJ => {
                let name_len = cursor.read_u16_be(buffer)? as usize;
                let type_name = cursor.read_utf8(buffer, name_len)?;
                Ok(AMF0Value::TypedObject {
                    type_name,
                    properties: Self::decode_object_body(cursor, buffer, depth)?,
                })
            }
            AMF0_TYPE_SWITCH_AMF3 => Ok(AMF0Value::SwitchAmf3 {
                value: AMF3Value::decode(cursor, buffer)?,
            }),
            other => Err(CodecError::Decode(format!("unknown AMF0 marker: {other}"))),
        }
    }

    /// Decodes the key/value pairs shared by Object, Array and TypedObject,
    /// up to the empty-key + 0x09 terminator.
    fn decode_object_body(
        cursor: &mut AMFDecodingCursor,
        buffer: &[u8],
        depth: usize,
    ) -> Result<HashMap<String, AMF0Value>, CodecError> {
        let mut properties = HashMap::new();
        loop {
            let key_len = cursor.read_u16_be(buffer)? as usize;
            let key = cursor.read_utf8(buffer, key_len)?;
            if key.is_empty() {
                let term = cursor.read_u8(buffer)?;
                if term != AMF0_OBJECT_TERM_CODE {
                    return Err(CodecError::Decode(
                        "AMF0 object missing terminator after empty key".to_string(),
                    ));
                }
                break;
            }
            let value = Self::decode_at_depth(cursor, buffer, depth + 1)?;
            properties.insert(key, value);
        }
        Ok(properties)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: &AMF0Value) -> AMF0Value {
        let encoded = value.encode().unwrap();
        let mut cursor = AMFDecodingCursor::new(encoded.len());
        let decoded = AMF0Value::decode(&mut cursor, &encoded).unwrap();
        assert_eq!(cursor.consumed(), encoded.len());
        decoded
    }

    #[test]
    fn number_roundtrip() {
        let v = AMF0Value::Number { value: 42.5 };
        assert_eq!(roundtrip(&v), v);
    }

    #[test]
    fn bool_roundtrip() {
        let v = AMF0Value::Bool { value: true };
        assert_eq!(roundtrip(&v), v);
    }

    #[test]
    fn string_roundtrip() {
        let v = AMF0Value::String {
            value: "connect".to_string(),
        };
        assert_eq!(roundtrip(&v), v);
    }

    #[test]
    fn null_and_undefined_roundtrip() {
        assert_eq!(roundtrip(&AMF0Value::Null), AMF0Value::Null);
        assert_eq!(roundtrip(&AMF0Value::Undefined), AMF0Value::Undefined);
    }

    #[test]
    fn object_roundtrip() {
        let mut properties = HashMap::new();
        properties.insert(
            "app".to_string(),
            AMF0Value::String {
                value: "live".to_string(),
            },
        );
        properties.insert("objectEncoding".to_string(), AMF0Value::Number { value: 0.0 });
        let v = AMF0Value::Object { properties };
        assert_eq!(roundtrip(&v), v);
    }

    #[test]
    fn strict_array_roundtrip() {
        let v = AMF0Value::StrictArray {
            items: vec![
                AMF0Value::Number { value: 1.0 },
                AMF0Value::String {
                    value: "x".to_string(),
                },
            ],
        };
        assert_eq!(roundtrip(&v), v);
    }

    #[test]
    fn nested_object_roundtrip() {
        let mut inner = HashMap::new();
        inner.insert("a".to_string(), AMF0Value::Number { value: 1.0 });
        let mut outer = HashMap::new();
        outer.insert("inner".to_string(), AMF0Value::Object { properties: inner });
        let v = AMF0Value::Object { properties: outer };
        assert_eq!(roundtrip(&v), v);
    }

    #[test]
    fn switch_amf3_roundtrip() {
        let v = AMF0Value::SwitchAmf3 {
            value: AMF3Value::String {
                value: "hi".to_string(),
            },
        };
        assert_eq!(roundtrip(&v), v);
    }

    #[test]
    fn decode_rejects_unknown_marker() {
        let mut cursor = AMFDecodingCursor::new(1);
        assert!(AMF0Value::decode(&mut cursor, &[0xFF]).is_err());
    }

    #[test]
    fn decode_rejects_truncated_number() {
        let mut cursor = AMFDecodingCursor::new(2);
        assert!(AMF0Value::decode(&mut cursor, &[AMF0_TYPE_NUMBER, 0x00]).is_err());
    }
}
