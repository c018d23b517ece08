// Copyright 2014-2015 Galen Clark Haynes
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

// Rust XML-RPC library

use hyper::client::HttpConnector;
use hyper::header::{CONTENT_TYPE, USER_AGENT};
use hyper::{Body, Method, Request, Uri};
use log::{debug, trace};

use crate::config::ClientConfig;
use crate::decoding;
use crate::error::{ClientError, TransportError};
use crate::protocol::{MethodCall, MethodResponse};
use crate::value::Value;

/// Sends method calls to one XML-RPC endpoint.
///
/// A call resolves to the result value, or to a `ClientError` telling a
/// server fault, a transport failure and an unreadable response apart.
/// Nothing is retried.
pub struct Client {
    http: hyper::Client<HttpConnector>,
    uri: Uri,
    config: ClientConfig,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Client, ClientError> {
        let url = config.url();
        let uri = url
            .parse::<Uri>()
            .map_err(|_| TransportError::InvalidUri(url.clone()))?;
        Ok(Client {
            http: hyper::Client::new(),
            uri,
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn method_call(&self, method_name: &str, params: &[Value]) -> Result<Value, ClientError> {
        self.call(&MethodCall::with_params(method_name, params.to_vec())).await
    }

    pub async fn call(&self, call: &MethodCall) -> Result<Value, ClientError> {
        call.params.iter().try_for_each(Value::validate)?;
        let body = self.remote_call(call.to_xml()).await?;
        let response = decoding::parse_method_response(&body, &self.config.decode)?;
        match response {
            MethodResponse::Success(value) => Ok(value),
            MethodResponse::Fault(fault) => {
                debug!("method '{}' returned {}", call.method_name, fault);
                Err(ClientError::Fault(fault))
            }
        }
    }

    async fn remote_call(&self, body: String) -> Result<Vec<u8>, TransportError> {
        debug!("Send XMLRPC request to: {}", self.uri);
        trace!("XMLRPC body: {}", body);

        let request = Request::builder()
            .method(Method::POST)
            .uri(self.uri.clone())
            .header(CONTENT_TYPE, "text/xml")
            .header(USER_AGENT, self.config.user_agent.as_str())
            .body(Body::from(body))
            .map_err(|e| TransportError::InvalidUri(e.to_string()))?;

        let exchange = async {
            let response = self.http.request(request).await?;
            let status = response.status();
            let bytes = hyper::body::to_bytes(response.into_body()).await?;
            Ok::<_, hyper::Error>((status, bytes))
        };
        let (status, bytes) = tokio::time::timeout(self.config.timeout, exchange)
            .await
            .map_err(|_| TransportError::Timeout)??;

        trace!("Response body: {}", String::from_utf8_lossy(&bytes));

        if !status.is_success() {
            return Err(TransportError::Status(status));
        }
        Ok(bytes.to_vec())
    }
}
