// Copyright 2014-2015 Galen Clark Haynes
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

#![deny(non_camel_case_types)]

//! XML-RPC library, including serialization, method dispatch and remote
//! procedure calling.
//!
//! # What is XML-RPC?
//!
//! A remote procedure call protocol that encodes method calls and their
//! responses as XML documents sent over HTTP POST.
//!
//! Full specification of the XML-RPC protocol is found here:
//! http://xmlrpc.scripting.com/spec.html
//!
//! Additional errata and hints can be found here:
//! http://effbot.org/zone/xmlrpc-errata.htm
//!
//! # Layout
//!
//! - [`value`]: the typed value model and native conversions
//! - [`decoding`] / [`encoding`]: the wire codec
//! - [`dispatch`] and [`hooks`]: server-side method dispatch
//! - [`client`]: calls to a remote endpoint
//! - [`http`]: a hyper listener feeding request bodies to a dispatcher

pub mod client;
pub mod config;
pub mod decoding;
pub mod dispatch;
pub mod encoding;
pub mod error;
pub mod hooks;
pub mod http;
pub mod protocol;
pub mod value;

pub use client::Client;
pub use config::{ClientConfig, ServerConfig};
pub use decoding::{parse_method_call, parse_method_response, DecodeOptions};
pub use dispatch::{Dispatcher, Handler, HandlerResult, Registry};
pub use encoding::{
    serialize_fault, serialize_method_call, serialize_method_response, serialize_method_response_params,
};
pub use error::{ClientError, DeserializeError, ErrorKind, HandlerError, TransportError, ValueError};
pub use hooks::{ErrorHook, LogObserver, MissHook, NoopObserver, Observer};
pub use http::HttpServer;
pub use protocol::{Fault, MethodCall, MethodResponse};
pub use value::{from_value, Array, DateTime, Struct, ToValue, Value};
