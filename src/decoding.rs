// Copyright 2014-2015 Galen Clark Haynes
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

// Rust XML-RPC library

//! Parsing of `methodCall` and `methodResponse` documents.
//!
//! The builder pulls events from `xml-rs` and descends the document
//! recursively, one element per call. Documents containing a DTD are
//! rejected, both by a byte scan up front and by the parser when the root
//! element starts (the scan misses non-ASCII encodings such as UTF-16), so
//! no declared entity is ever expanded; undeclared entity references are
//! errors in `xml-rs` itself.
//!
//! Untagged `<value>` text decodes as a string. Duplicate struct members
//! keep the last occurrence.

use std::io::Read;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use xml::common::Position as _;
use xml::reader::{EventReader, ParserConfig, XmlEvent};

use crate::error::{DeserializeError, ErrorKind, Position};
use crate::protocol::{Fault, MethodCall, MethodResponse};
use crate::value::{Array, DateTime, Struct, Value, MAX_NESTING};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Accept the `<nil/>` extension.
    pub allow_nil: bool,
}

impl DecodeOptions {
    pub fn with_nil() -> DecodeOptions {
        DecodeOptions { allow_nil: true }
    }
}

pub fn parse_method_call(body: &[u8], options: &DecodeOptions) -> Result<MethodCall, DeserializeError> {
    reject_dtd(body)?;
    Builder::new(body, options).build_method_call()
}

pub fn parse_method_response(
    body: &[u8],
    options: &DecodeOptions,
) -> Result<MethodResponse, DeserializeError> {
    reject_dtd(body)?;
    Builder::new(body, options).build_method_response()
}

/// Parses a bare `<value>` fragment.
pub fn parse_value(body: &[u8], options: &DecodeOptions) -> Result<Value, DeserializeError> {
    reject_dtd(body)?;
    Builder::new(body, options).build_root_value()
}

fn reject_dtd(body: &[u8]) -> Result<(), DeserializeError> {
    const MARKERS: [&[u8]; 2] = [b"<!DOCTYPE", b"<!ENTITY"];
    for marker in MARKERS {
        if body.windows(marker.len()).any(|w| w == marker) {
            return Err(dtd_error());
        }
    }
    Ok(())
}

fn dtd_error() -> DeserializeError {
    DeserializeError::new(ErrorKind::MalformedXml, "document type declarations are not allowed")
}

/// The subset of parser events the builder cares about.
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Start(String),
    End(String),
    Text(String),
    Eof,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Start(name) => format!("<{}>", name),
            Token::End(name) => format!("</{}>", name),
            Token::Text(text) => format!("text {:?}", text),
            Token::Eof => "end of document".to_string(),
        }
    }

    fn is_blank(&self) -> bool {
        matches!(self, Token::Text(t) if t.trim().is_empty())
    }
}

struct Builder<'o, R: Read> {
    parser: EventReader<R>,
    options: &'o DecodeOptions,
    depth: usize,
}

impl<'o, R: Read> Builder<'o, R> {
    fn new(src: R, options: &'o DecodeOptions) -> Builder<'o, R> {
        let config = ParserConfig::new()
            .trim_whitespace(false)
            .whitespace_to_characters(true)
            .cdata_to_characters(true)
            .coalesce_characters(true)
            .ignore_comments(true);
        Builder {
            parser: EventReader::new_with_config(src, config),
            options,
            depth: 0,
        }
    }

    fn position(&self) -> Position {
        let pos = self.parser.position();
        Position {
            row: pos.row,
            column: pos.column,
        }
    }

    fn error(&self, kind: ErrorKind, message: impl Into<String>) -> DeserializeError {
        DeserializeError::new(kind, message).at(self.position())
    }

    fn unexpected(&self, expected: &str, found: &Token) -> DeserializeError {
        self.error(
            ErrorKind::StructuralError,
            format!("expected {}, found {}", expected, found.describe()),
        )
    }

    /// Next token, text included.
    fn next_raw(&mut self) -> Result<Token, DeserializeError> {
        loop {
            let event = self.parser.next().map_err(|e| {
                let pos = e.position();
                DeserializeError::new(ErrorKind::MalformedXml, e.msg().to_string()).at(Position {
                    row: pos.row,
                    column: pos.column,
                })
            })?;
            match event {
                XmlEvent::StartElement { name, .. } => {
                    // the parser exposes a DTD once the root element starts,
                    // before any entity it declares can be expanded
                    if self.parser.doctype().is_some() {
                        return Err(dtd_error().at(self.position()));
                    }
                    return Ok(Token::Start(name.local_name));
                }
                XmlEvent::EndElement { name } => return Ok(Token::End(name.local_name)),
                XmlEvent::Characters(s) => return Ok(Token::Text(s)),
                XmlEvent::EndDocument => return Ok(Token::Eof),
                // declaration, processing instructions
                _ => {}
            }
        }
    }

    /// Next token, skipping whitespace between elements.
    fn next_token(&mut self) -> Result<Token, DeserializeError> {
        loop {
            let token = self.next_raw()?;
            if !token.is_blank() {
                return Ok(token);
            }
        }
    }

    fn expect_start(&mut self, name: &str) -> Result<(), DeserializeError> {
        match self.next_token()? {
            Token::Start(ref n) if n == name => Ok(()),
            other => Err(self.unexpected(&format!("<{}>", name), &other)),
        }
    }

    fn expect_end(&mut self, name: &str) -> Result<(), DeserializeError> {
        match self.next_token()? {
            Token::End(ref n) if n == name => Ok(()),
            other => Err(self.unexpected(&format!("</{}>", name), &other)),
        }
    }

    fn expect_eof(&mut self) -> Result<(), DeserializeError> {
        match self.next_token()? {
            Token::Eof => Ok(()),
            other => Err(self.unexpected("end of document", &other)),
        }
    }

    /// Reads the text content of `<tag>`, whose start was already consumed.
    fn read_text(&mut self, tag: &str) -> Result<String, DeserializeError> {
        match self.next_raw()? {
            Token::End(ref n) if n == tag => Ok(String::new()),
            Token::Text(text) => match self.next_raw()? {
                Token::End(ref n) if n == tag => Ok(text),
                other => Err(self.unexpected(&format!("</{}>", tag), &other)),
            },
            other => Err(self.unexpected(&format!("text inside <{}>", tag), &other)),
        }
    }

    fn root(&mut self, name: &str) -> Result<(), DeserializeError> {
        match self.next_token()? {
            Token::Start(ref n) if n == name => Ok(()),
            other => Err(self.error(
                ErrorKind::MalformedXml,
                format!("expected <{}> document, found {}", name, other.describe()),
            )),
        }
    }

    fn build_method_call(&mut self) -> Result<MethodCall, DeserializeError> {
        self.root("methodCall")?;

        let method_name = match self.next_token()? {
            Token::Start(ref n) if n == "methodName" => self.read_text("methodName")?.trim().to_string(),
            other => {
                return Err(self.error(
                    ErrorKind::MissingMethodName,
                    format!("expected <methodName>, found {}", other.describe()),
                ))
            }
        };
        if method_name.is_empty() {
            return Err(self.error(ErrorKind::MissingMethodName, "empty <methodName>"));
        }

        let params = match self.next_token()? {
            Token::Start(ref n) if n == "params" => {
                let params = self.build_params()?;
                self.expect_end("methodCall")?;
                params
            }
            Token::End(ref n) if n == "methodCall" => Vec::new(),
            other => return Err(self.unexpected("<params>", &other)),
        };
        self.expect_eof()?;

        Ok(MethodCall { method_name, params })
    }

    fn build_method_response(&mut self) -> Result<MethodResponse, DeserializeError> {
        self.root("methodResponse")?;

        let response = match self.next_token()? {
            Token::Start(ref n) if n == "params" => {
                let mut params = self.build_params()?;
                if params.len() != 1 {
                    return Err(self.error(
                        ErrorKind::StructuralError,
                        format!("a response carries exactly one param, found {}", params.len()),
                    ));
                }
                MethodResponse::Success(params.remove(0))
            }
            Token::Start(ref n) if n == "fault" => {
                self.expect_start("value")?;
                let value = self.build_value()?;
                self.expect_end("fault")?;
                MethodResponse::Fault(self.build_fault(value)?)
            }
            other => return Err(self.unexpected("<params> or <fault>", &other)),
        };
        self.expect_end("methodResponse")?;
        self.expect_eof()?;

        Ok(response)
    }

    fn build_root_value(&mut self) -> Result<Value, DeserializeError> {
        self.root("value")?;
        let value = self.build_value()?;
        self.expect_eof()?;
        Ok(value)
    }

    fn build_fault(&self, value: Value) -> Result<Fault, DeserializeError> {
        let code = value.get("faultCode").and_then(Value::as_i32);
        let message = value.get("faultString").and_then(Value::as_str);
        match (code, message) {
            (Some(code), Some(message)) => Ok(Fault::new(code, message)),
            _ => Err(self.error(
                ErrorKind::StructuralError,
                "fault must be a struct with int faultCode and string faultString",
            )),
        }
    }

    /// Reads `<param><value>..</value></param>` entries until `</params>`.
    fn build_params(&mut self) -> Result<Vec<Value>, DeserializeError> {
        let mut results = Vec::new();
        loop {
            match self.next_token()? {
                Token::Start(ref n) if n == "param" => {
                    self.expect_start("value")?;
                    results.push(self.build_value()?);
                    self.expect_end("param")?;
                }
                Token::End(ref n) if n == "params" => return Ok(results),
                other => return Err(self.unexpected("<param>", &other)),
            }
        }
    }

    /// Builds the content of a `<value>` whose start tag was consumed,
    /// through its end tag.
    fn build_value(&mut self) -> Result<Value, DeserializeError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error(
                ErrorKind::StructuralError,
                format!("values nested deeper than {} levels", MAX_NESTING),
            ));
        }
        self.depth += 1;
        let value = self.build_value_content();
        self.depth -= 1;
        value
    }

    fn build_value_content(&mut self) -> Result<Value, DeserializeError> {
        match self.next_raw()? {
            Token::End(ref n) if n == "value" => Ok(Value::String(String::new())),
            Token::Start(tag) => {
                let value = self.build_typed(&tag)?;
                self.expect_end("value")?;
                Ok(value)
            }
            Token::Text(text) => match self.next_raw()? {
                Token::End(ref n) if n == "value" => Ok(Value::String(text)),
                Token::Start(tag) if text.trim().is_empty() => {
                    let value = self.build_typed(&tag)?;
                    self.expect_end("value")?;
                    Ok(value)
                }
                other => Err(self.unexpected("</value>", &other)),
            },
            other => Err(self.unexpected("a value", &other)),
        }
    }

    fn build_typed(&mut self, tag: &str) -> Result<Value, DeserializeError> {
        match tag {
            "int" | "i4" => {
                let text = self.read_text(tag)?;
                text.trim()
                    .parse::<i32>()
                    .map(Value::Int)
                    .map_err(|_| self.invalid(tag, &text))
            }
            "boolean" => match self.read_text(tag)?.trim() {
                "0" => Ok(Value::Bool(false)),
                "1" => Ok(Value::Bool(true)),
                other => Err(self.invalid(tag, other)),
            },
            "double" => {
                let text = self.read_text(tag)?;
                match text.trim().parse::<f64>() {
                    Ok(n) if n.is_finite() => Ok(Value::Double(n)),
                    _ => Err(self.invalid(tag, &text)),
                }
            }
            "string" => self.read_text(tag).map(Value::String),
            "dateTime.iso8601" => {
                let text = self.read_text(tag)?;
                DateTime::parse(&text)
                    .map(Value::DateTime)
                    .map_err(|_| self.invalid(tag, &text))
            }
            "base64" => {
                let text = self.read_text(tag)?;
                let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
                STANDARD
                    .decode(compact)
                    .map(Value::Base64)
                    .map_err(|_| self.invalid(tag, &text))
            }
            "array" => self.build_array(),
            "struct" => self.build_struct(),
            "nil" if self.options.allow_nil => {
                self.expect_end("nil")?;
                Ok(Value::Nil)
            }
            other => Err(self.error(ErrorKind::UnknownType, format!("unknown value type <{}>", other))),
        }
    }

    fn invalid(&self, tag: &str, text: &str) -> DeserializeError {
        self.error(ErrorKind::InvalidValue, format!("invalid <{}> content {:?}", tag, text))
    }

    fn build_array(&mut self) -> Result<Value, DeserializeError> {
        self.expect_start("data")?;
        let mut values = Array::new();
        loop {
            match self.next_token()? {
                Token::Start(ref n) if n == "value" => values.push(self.build_value()?),
                Token::End(ref n) if n == "data" => break,
                other => return Err(self.unexpected("<value> or </data>", &other)),
            }
        }
        self.expect_end("array")?;
        Ok(Value::Array(values))
    }

    fn build_struct(&mut self) -> Result<Value, DeserializeError> {
        let mut members = Struct::new();
        loop {
            match self.next_token()? {
                Token::Start(ref n) if n == "member" => {}
                Token::End(ref n) if n == "struct" => return Ok(Value::Struct(members)),
                other => return Err(self.unexpected("<member> or </struct>", &other)),
            }

            let key = match self.next_token()? {
                Token::Start(ref n) if n == "name" => self.read_text("name")?,
                other => return Err(self.unexpected("<name> in <member>", &other)),
            };
            self.expect_start("value")?;
            let value = self.build_value()?;
            self.expect_end("member")?;

            members.insert(key, value);
        }
    }
}
