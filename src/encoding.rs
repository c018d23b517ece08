// Copyright 2014-2015 Galen Clark Haynes
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

// Rust XML-RPC library

//! Serialization of values, calls and responses to XML-RPC documents.
//!
//! Every function here is pure: it only builds text. Application handlers
//! may call [`serialize_method_response`] and [`serialize_fault`] directly
//! to produce a response body outside the dispatcher.
//!
//! Serialization does not check its input. A string holding characters XML
//! forbids, or a non-finite double, yields a document no parser accepts;
//! check with [`Value::validate`] first. The dispatcher and the client both
//! do, answering with a `-32500` fault or refusing to send.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use xml::escape::escape_str_pcdata;

use crate::value::Value;

const XML_HEADER: &str = "<?xml version=\"1.0\"?>";

pub type EncodeResult = fmt::Result;

fn escape_str(wr: &mut dyn fmt::Write, v: &str) -> EncodeResult {
    let escaped = escape_str_pcdata(v);
    if escaped.contains('\r') {
        // parsers normalize a literal CR away, a character reference survives
        wr.write_str(&escaped.replace('\r', "&#xD;"))
    } else {
        wr.write_str(&escaped)
    }
}

/// A structure for implementing serialization to XML-RPC.
pub struct Encoder<'a> {
    writer: &'a mut dyn fmt::Write,
}

impl<'a> Encoder<'a> {
    /// Creates a new XML-RPC encoder whose output will be written to the writer
    /// specified.
    pub fn new(writer: &'a mut dyn fmt::Write) -> Encoder<'a> {
        Encoder { writer }
    }

    pub fn emit_value(&mut self, value: &Value) -> EncodeResult {
        self.writer.write_str("<value>")?;
        match value {
            Value::Int(v) => write!(self.writer, "<int>{}</int>", v)?,
            Value::Bool(v) => write!(self.writer, "<boolean>{}</boolean>", *v as u8)?,
            // Display for f64 never switches to exponent notation and
            // prints the shortest text that parses back to the same bits
            Value::Double(v) => write!(self.writer, "<double>{}</double>", v)?,
            Value::String(v) => {
                self.writer.write_str("<string>")?;
                escape_str(self.writer, v)?;
                self.writer.write_str("</string>")?;
            }
            Value::DateTime(v) => {
                self.writer.write_str("<dateTime.iso8601>")?;
                escape_str(self.writer, v.as_str())?;
                self.writer.write_str("</dateTime.iso8601>")?;
            }
            Value::Base64(v) => write!(self.writer, "<base64>{}</base64>", STANDARD.encode(v))?,
            Value::Array(values) => {
                self.writer.write_str("<array><data>")?;
                for elt in values {
                    self.emit_value(elt)?;
                }
                self.writer.write_str("</data></array>")?;
            }
            Value::Struct(members) => {
                self.writer.write_str("<struct>")?;
                for (name, elt) in members {
                    self.emit_member(name, elt)?;
                }
                self.writer.write_str("</struct>")?;
            }
            Value::Nil => self.writer.write_str("<nil/>")?,
        }
        self.writer.write_str("</value>")
    }

    fn emit_member(&mut self, name: &str, value: &Value) -> EncodeResult {
        self.writer.write_str("<member><name>")?;
        escape_str(self.writer, name)?;
        self.writer.write_str("</name>")?;
        self.emit_value(value)?;
        self.writer.write_str("</member>")
    }

    fn emit_params(&mut self, params: &[Value]) -> EncodeResult {
        self.writer.write_str("<params>")?;
        for param in params {
            self.writer.write_str("<param>")?;
            self.emit_value(param)?;
            self.writer.write_str("</param>")?;
        }
        self.writer.write_str("</params>")
    }

    pub fn emit_method_call(&mut self, method_name: &str, params: &[Value]) -> EncodeResult {
        self.writer.write_str(XML_HEADER)?;
        self.writer.write_str("<methodCall><methodName>")?;
        escape_str(self.writer, method_name)?;
        self.writer.write_str("</methodName>")?;
        self.emit_params(params)?;
        self.writer.write_str("</methodCall>")
    }

    pub fn emit_method_response(&mut self, value: &Value) -> EncodeResult {
        self.writer.write_str(XML_HEADER)?;
        self.writer.write_str("<methodResponse>")?;
        self.emit_params(std::slice::from_ref(value))?;
        self.writer.write_str("</methodResponse>")
    }

    pub fn emit_fault(&mut self, code: i32, message: &str) -> EncodeResult {
        self.writer.write_str(XML_HEADER)?;
        self.writer.write_str("<methodResponse><fault><value><struct>")?;
        self.emit_member("faultCode", &Value::Int(code))?;
        self.writer.write_str("<member><name>faultString</name><value><string>")?;
        escape_str(self.writer, message)?;
        self.writer.write_str("</string></value></member>")?;
        self.writer.write_str("</struct></value></fault></methodResponse>")
    }
}

fn render<F>(f: F) -> String
where
    F: FnOnce(&mut Encoder) -> EncodeResult,
{
    let mut s = String::new();
    // writing into a String cannot fail
    let _ = f(&mut Encoder::new(&mut s));
    s
}

/// Encodes a single value as a `<value>` fragment.
pub fn encode(value: &Value) -> String {
    render(|e| e.emit_value(value))
}

pub fn serialize_method_call(method_name: &str, params: &[Value]) -> String {
    render(|e| e.emit_method_call(method_name, params))
}

/// Builds a success `methodResponse` carrying `value`.
pub fn serialize_method_response(value: &Value) -> String {
    render(|e| e.emit_method_response(value))
}

/// Builds a success `methodResponse` from a list of results.
///
/// A response carries exactly one value: a single result is sent as is,
/// zero or several results are wrapped into one array.
pub fn serialize_method_response_params(params: &[Value]) -> String {
    match params {
        [single] => serialize_method_response(single),
        many => serialize_method_response(&Value::Array(many.to_vec())),
    }
}

/// Builds a fault `methodResponse` with `faultCode` and `faultString` members.
pub fn serialize_fault(code: i32, message: &str) -> String {
    render(|e| e.emit_fault(code, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{DateTime, Struct};

    #[test]
    fn test_encode_scalars() {
        assert_eq!("<value><int>-7</int></value>", encode(&Value::Int(-7)));
        assert_eq!("<value><boolean>0</boolean></value>", encode(&Value::Bool(false)));
        assert_eq!("<value><double>1000000</double></value>", encode(&Value::Double(1e6)));
        assert_eq!("<value><base64>AQID</base64></value>", encode(&Value::base64(vec![1u8, 2, 3])));
        assert_eq!("<value><nil/></value>", encode(&Value::Nil));
        assert_eq!(
            "<value><dateTime.iso8601>19980717T14:08:55</dateTime.iso8601></value>",
            encode(&DateTime::parse("19980717T14:08:55").unwrap().into())
        );
    }

    #[test]
    fn test_escaping() {
        assert_eq!(
            "<value><string>a &lt;b&gt; &amp; c&#xD;\n</string></value>",
            encode(&Value::from("a <b> & c\r\n"))
        );

        let mut m = Struct::new();
        m.insert("<k>".to_string(), Value::Int(1));
        assert_eq!(
            "<value><struct><member><name>&lt;k&gt;</name><value><int>1</int></value></member></struct></value>",
            Value::Struct(m).to_string()
        );
    }

    #[test]
    fn test_fault_shape() {
        assert_eq!(
            "<?xml version=\"1.0\"?><methodResponse><fault><value><struct>\
             <member><name>faultCode</name><value><int>-32601</int></value></member>\
             <member><name>faultString</name><value><string>requested method 'x&amp;y' not found</string></value></member>\
             </struct></value></fault></methodResponse>",
            serialize_fault(-32601, "requested method 'x&y' not found")
        );
    }

    #[test]
    fn test_response_params_convention() {
        assert_eq!(
            serialize_method_response(&Value::Int(1)),
            serialize_method_response_params(&[Value::Int(1)])
        );
        assert_eq!(
            serialize_method_response(&Value::Array(vec![Value::Int(1), Value::Int(2)])),
            serialize_method_response_params(&[Value::Int(1), Value::Int(2)])
        );
        assert_eq!(
            serialize_method_response(&Value::Array(vec![])),
            serialize_method_response_params(&[])
        );
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let mut m = Struct::new();
        m.insert("b".to_string(), Value::Double(0.1));
        m.insert("a".to_string(), Value::Array(vec![Value::Nil, "x".into()]));
        let value = Value::Struct(m);
        assert_eq!(serialize_method_response(&value), serialize_method_response(&value));
    }
}
