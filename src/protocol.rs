// Copyright 2014-2015 Galen Clark Haynes
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

// Rust XML-RPC library

use crate::decoding::{self, DecodeOptions};
use crate::encoding;
use crate::error::{DeserializeError, ValueError};
use crate::value::{self, ToValue, Value};

/// Request body is not a well-formed XML-RPC document.
pub const PARSE_ERROR: i32 = -32700;
/// No handler is registered under the requested name.
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Invalid method parameters.
pub const INVALID_PARAMS: i32 = -32602;
/// The handler failed while executing.
pub const INTERNAL_ERROR: i32 = -32500;

#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub method_name: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("fault {code}: {message}")]
pub struct Fault {
    pub code: i32,
    pub message: String,
}

/// Exactly one of a result value or a fault.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodResponse {
    Success(Value),
    Fault(Fault),
}

impl MethodCall {
    pub fn new(method_name: impl Into<String>) -> MethodCall {
        MethodCall {
            method_name: method_name.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(method_name: impl Into<String>, params: Vec<Value>) -> MethodCall {
        MethodCall {
            method_name: method_name.into(),
            params,
        }
    }

    /// Appends a native argument, converting it with `ToValue`.
    pub fn arg<T: ToValue + ?Sized>(mut self, object: &T) -> Result<MethodCall, ValueError> {
        self.params.push(object.to_value()?);
        Ok(self)
    }

    pub fn from_bytes(body: &[u8]) -> Result<MethodCall, DeserializeError> {
        decoding::parse_method_call(body, &DecodeOptions::default())
    }

    pub fn to_xml(&self) -> String {
        encoding::serialize_method_call(&self.method_name, &self.params)
    }
}

impl Fault {
    pub fn new(code: i32, message: impl Into<String>) -> Fault {
        Fault {
            code,
            message: message.into(),
        }
    }
}

impl MethodResponse {
    pub fn fault(code: i32, message: impl Into<String>) -> MethodResponse {
        MethodResponse::Fault(Fault::new(code, message))
    }

    pub fn from_bytes(body: &[u8]) -> Result<MethodResponse, DeserializeError> {
        decoding::parse_method_response(body, &DecodeOptions::default())
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, MethodResponse::Fault(_))
    }

    /// Checks that the response serializes to a document parsers accept.
    pub fn validate(&self) -> Result<(), ValueError> {
        match self {
            MethodResponse::Success(value) => value.validate(),
            MethodResponse::Fault(fault) => value::check_text(&fault.message),
        }
    }

    pub fn to_xml(&self) -> String {
        match self {
            MethodResponse::Success(value) => encoding::serialize_method_response(value),
            MethodResponse::Fault(fault) => encoding::serialize_fault(fault.code, &fault.message),
        }
    }

    pub fn into_result(self) -> Result<Value, Fault> {
        match self {
            MethodResponse::Success(value) => Ok(value),
            MethodResponse::Fault(fault) => Err(fault),
        }
    }
}

impl From<Value> for MethodResponse {
    fn from(value: Value) -> Self {
        MethodResponse::Success(value)
    }
}

impl From<Fault> for MethodResponse {
    fn from(fault: Fault) -> Self {
        MethodResponse::Fault(fault)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode() {
        let expected = "<?xml version=\"1.0\"?><methodCall><methodName>method_name_value</methodName><params><param><value><string>string_value</string></value></param><param><value><double>4.2</double></value></param><param><value><boolean>1</boolean></value></param></params></methodCall>";

        let request = MethodCall::new("method_name_value")
            .arg("string_value")
            .and_then(|r| r.arg(&4.2))
            .and_then(|r| r.arg(&true))
            .unwrap();

        assert_eq!(expected, request.to_xml());
    }

    #[test]
    fn test_arg_out_of_range() {
        let err = MethodCall::new("m").arg(&(1u64 << 40)).unwrap_err();
        assert_eq!(ValueError::OutOfRange(1 << 40), err);
    }

    #[test]
    fn test_call_survives_bytes() {
        let call = MethodCall::with_params("echo", vec![Value::Int(42)]);
        let parsed = MethodCall::from_bytes(call.to_xml().as_bytes()).unwrap();
        assert_eq!(call, parsed);
    }

    #[test]
    fn test_validate_response() {
        assert!(MethodResponse::from(Value::Int(1)).validate().is_ok());
        assert!(MethodResponse::from(Value::Double(f64::NAN)).validate().is_err());
        assert_eq!(
            Err(ValueError::InvalidChar('\u{7}')),
            MethodResponse::fault(1, "bell \u{7}").validate()
        );
    }

    #[test]
    fn test_fault_response_into_result() {
        let response = MethodResponse::fault(-1, "nope");
        assert!(response.is_fault());
        let fault = response.into_result().unwrap_err();
        assert_eq!(-1, fault.code);
        assert_eq!("fault -1: nope", fault.to_string());
    }
}
