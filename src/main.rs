use std::net::SocketAddr;
use std::process;
use std::sync::Arc;

use clap::{crate_version, value_parser, Arg, ArgAction, ArgMatches, Command};
use log::{debug, error};

use xmlrpc_kit::protocol::INVALID_PARAMS;
use xmlrpc_kit::{
    Client, ClientConfig, ClientError, Dispatcher, HandlerError, HandlerResult, HttpServer, Registry,
    ServerConfig, Struct, Value,
};

struct EchoContext {
    name: String,
}

async fn echo(params: Vec<Value>, _ctx: Arc<EchoContext>) -> HandlerResult {
    params
        .into_iter()
        .next()
        .ok_or_else(|| HandlerError::fault(INVALID_PARAMS, "echo takes one param"))
}

async fn context(_params: Vec<Value>, ctx: Arc<EchoContext>) -> HandlerResult {
    Ok(Value::from(ctx.name.as_str()))
}

#[tokio::main]
async fn main() {
    let matches = Command::new("xmlrpc-echo")
        .version(crate_version!())
        .about("Serve or call a demo XML-RPC endpoint")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Verbose mode")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("serve")
                .about("Serve the 'echo' and 'context' methods")
                .arg(
                    Arg::new("bind")
                        .long("bind")
                        .value_name("ADDR")
                        .value_parser(value_parser!(SocketAddr))
                        .default_value("127.0.0.1:8000"),
                )
                .arg(Arg::new("path").long("path").default_value("/"))
                .arg(
                    Arg::new("name")
                        .long("name")
                        .help("Value returned by the 'context' method")
                        .default_value("xmlrpc-echo"),
                ),
        )
        .subcommand(
            Command::new("call")
                .about("Call a method on a remote endpoint and print the result as JSON")
                .arg(Arg::new("url").long("url").required(true))
                .arg(Arg::new("method").index(1).required(true))
                .arg(
                    Arg::new("args")
                        .help("Call parameters, each parsed as JSON or taken as a plain string")
                        .index(2)
                        .num_args(0..),
                ),
        )
        .get_matches();

    // Init logging to DEBUG only if user required it
    let level = if matches.get_flag("verbose") { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let code = match matches.subcommand() {
        Some(("serve", sub)) => serve(sub).await,
        Some(("call", sub)) => call(sub).await,
        _ => 2,
    };
    process::exit(code);
}

async fn serve(matches: &ArgMatches) -> i32 {
    let bind = matches
        .get_one::<SocketAddr>("bind")
        .copied()
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8000)));
    let path = matches.get_one::<String>("path").map(String::as_str).unwrap_or("/");
    let name = matches
        .get_one::<String>("name")
        .cloned()
        .unwrap_or_else(|| "xmlrpc-echo".to_string());
    debug!("Using name: {}", name);

    let registry = Registry::new()
        .with_method("echo", echo)
        .and_then(|r| r.with_method("context", context));
    let registry = match registry {
        Ok(registry) => registry,
        Err(e) => {
            error!("{}", e);
            return 1;
        }
    };

    let dispatcher = Arc::new(Dispatcher::new(registry, EchoContext { name }));
    let server = HttpServer::new(dispatcher, ServerConfig::new(bind).path(path));
    match server.serve().await {
        Ok(()) => 0,
        Err(e) => {
            error!("{}", e);
            1
        }
    }
}

async fn call(matches: &ArgMatches) -> i32 {
    let url = matches.get_one::<String>("url").map(String::as_str).unwrap_or_default();
    let method = matches.get_one::<String>("method").map(String::as_str).unwrap_or_default();
    let params: Vec<Value> = matches
        .get_many::<String>("args")
        .map(|args| args.map(|arg| parse_arg(arg)).collect())
        .unwrap_or_default();

    let client = match ClientConfig::from_url(url)
        .map_err(|e| e.to_string())
        .and_then(|config| Client::new(config).map_err(|e| e.to_string()))
    {
        Ok(client) => client,
        Err(e) => {
            error!("{}", e);
            return 1;
        }
    };

    match client.method_call(method, &params).await {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(json) => {
                println!("{}", json);
                0
            }
            Err(e) => {
                error!("cannot print result: {}", e);
                1
            }
        },
        Err(ClientError::Fault(fault)) => {
            eprintln!("{}", fault);
            1
        }
        Err(e) => {
            error!("{}", e);
            1
        }
    }
}

fn parse_arg(arg: &str) -> Value {
    match serde_json::from_str::<serde_json::Value>(arg) {
        Ok(json) => json_to_value(json),
        Err(_) => Value::String(arg.to_string()),
    }
}

fn json_to_value(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Nil,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64().and_then(|i| i32::try_from(i).ok()) {
            Some(i) => Value::Int(i),
            None => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => Value::Array(items.into_iter().map(json_to_value).collect()),
        serde_json::Value::Object(members) => Value::Struct(
            members
                .into_iter()
                .map(|(k, v)| (k, json_to_value(v)))
                .collect::<Struct>(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arg() {
        assert_eq!(Value::Int(999), parse_arg("999"));
        assert_eq!(Value::Double(1.5), parse_arg("1.5"));
        assert_eq!(Value::String("hello".to_string()), parse_arg("hello"));
        assert_eq!(Value::String("quoted".to_string()), parse_arg("\"quoted\""));

        let value = parse_arg(r#"{"test": [1, true, null]}"#);
        assert_eq!(Some(1), value["test"][0].as_i32());
        assert_eq!(Some(true), value["test"][1].as_bool());
        assert!(value["test"][2].is_nil());
    }

    #[test]
    fn test_wide_ints_become_doubles() {
        assert_eq!(Value::Double(4294967296.0), parse_arg("4294967296"));
    }
}
