use proptest::prelude::*;

use xmlrpc_kit::encoding::encode;
use xmlrpc_kit::{
    parse_method_call, parse_method_response, serialize_fault, serialize_method_call, serialize_method_response,
    DateTime, DecodeOptions, MethodCall, MethodResponse, ToValue, Value,
};

fn arb_date_time() -> impl Strategy<Value = DateTime> {
    "[0-9]{4}[0-9]{2}[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}(Z|[+-][0-9]{2}:[0-9]{2})?"
        .prop_map(|s| DateTime::parse(&s).unwrap())
}

fn arb_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i32>().prop_map(Value::Int),
        any::<bool>().prop_map(Value::Bool),
        any::<f64>().prop_filter("finite", |d| d.is_finite()).prop_map(Value::Double),
        "[a-zA-Z0-9 <>&'\"\r\n\té߀😀]{0,16}".prop_map(Value::String),
        arb_date_time().prop_map(Value::DateTime),
        prop::collection::vec(any::<u8>(), 0..32).prop_map(Value::Base64),
        Just(Value::Nil),
    ]
}

/// Recursive value generator with bounded depth
fn arb_value() -> impl Strategy<Value = Value> {
    arb_leaf().prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..6).prop_map(Value::Struct),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_call_roundtrip(name in "[a-zA-Z][a-zA-Z0-9_.]{0,12}", params in prop::collection::vec(arb_value(), 0..4)) {
        let body = serialize_method_call(&name, &params);
        let call = parse_method_call(body.as_bytes(), &DecodeOptions::with_nil()).unwrap();
        prop_assert_eq!(MethodCall::with_params(name, params), call);
    }

    #[test]
    fn prop_response_roundtrip(value in arb_value()) {
        let body = serialize_method_response(&value);
        let response = parse_method_response(body.as_bytes(), &DecodeOptions::with_nil()).unwrap();
        prop_assert_eq!(MethodResponse::Success(value), response);
    }

    #[test]
    fn prop_serialize_is_idempotent(value in arb_value()) {
        let once = serialize_method_response(&value);
        let decoded = parse_method_response(once.as_bytes(), &DecodeOptions::with_nil())
            .unwrap()
            .into_result()
            .unwrap();
        prop_assert_eq!(once, serialize_method_response(&decoded));
    }

    #[test]
    fn prop_valid_strings_roundtrip(s in any::<String>()) {
        let value = Value::String(s);
        prop_assume!(value.validate().is_ok());
        let body = serialize_method_response(&value);
        let response = parse_method_response(body.as_bytes(), &DecodeOptions::default()).unwrap();
        prop_assert_eq!(MethodResponse::Success(value), response);
    }

    #[test]
    fn prop_control_chars_fail_validation(
        head in "[a-z]{0,4}",
        c in prop::sample::select(vec!['\u{0}', '\u{1}', '\u{8}', '\u{B}', '\u{C}', '\u{1F}', '\u{FFFE}', '\u{FFFF}']),
    ) {
        let value = Value::String(format!("{}{}", head, c));
        prop_assert!(value.validate().is_err());
        let joined = format!("{}{}", head, c);
        prop_assert!(joined.to_value().is_err());
    }

    #[test]
    fn prop_doubles_are_bit_exact(d in any::<f64>().prop_filter("finite", |d| d.is_finite())) {
        let body = serialize_method_response(&Value::Double(d));
        let value = parse_method_response(body.as_bytes(), &DecodeOptions::default())
            .unwrap()
            .into_result()
            .unwrap();
        prop_assert_eq!(Some(d.to_bits()), value.as_f64().map(f64::to_bits));
    }

    #[test]
    fn prop_fault_roundtrip(code in any::<i32>(), message in "[a-zA-Z0-9 <>&'\"]{0,32}") {
        let body = serialize_fault(code, &message);
        let response = parse_method_response(body.as_bytes(), &DecodeOptions::default()).unwrap();
        prop_assert_eq!(MethodResponse::fault(code, message), response);
    }
}

#[test]
fn negative_zero_survives() {
    let body = serialize_method_response(&Value::Double(-0.0));
    let value = parse_method_response(body.as_bytes(), &DecodeOptions::default())
        .unwrap()
        .into_result()
        .unwrap();
    assert!(value.as_f64().unwrap().is_sign_negative());
}

#[test]
fn nil_needs_opt_in() {
    let body = serialize_method_response(&Value::Nil);
    assert!(parse_method_response(body.as_bytes(), &DecodeOptions::default()).is_err());
    assert_eq!(
        MethodResponse::Success(Value::Nil),
        parse_method_response(body.as_bytes(), &DecodeOptions::with_nil()).unwrap()
    );
}

#[test]
fn carriage_return_survives() {
    let value = Value::from("line\r\nnext\r");
    let body = serialize_method_response(&value);
    assert!(body.contains("&#xD;"));
    assert_eq!(
        MethodResponse::Success(value),
        parse_method_response(body.as_bytes(), &DecodeOptions::default()).unwrap()
    );
}

#[test]
fn bare_value_encoding() {
    assert_eq!("<value><int>7</int></value>", encode(&Value::Int(7)));
}
