//! Conversions shared by command handlers.
//!
//! Hashes and raw bytes travel as hex strings; amounts travel as coin
//! denominated decimals and are held internally as integer base units.

use serde_json::{Map, Number, Value};

use crate::protocol::{RPC_INVALID_PARAMETER, RpcError};

/// Base units per coin.
pub const COIN: i64 = 100_000_000;

/// Largest representable amount, in base units.
pub const MAX_MONEY: i64 = 21_000_000 * COIN;

/// Number of decimal places accepted in an amount.
const AMOUNT_DECIMALS: usize = 8;

/// A 256-bit hash in internal (little-endian) byte order.
pub type Hash256 = [u8; 32];

/// Returns true when `amount` lies within `0..=MAX_MONEY`.
pub fn money_range(amount: i64) -> bool {
    (0..=MAX_MONEY).contains(&amount)
}

/// Parses a 64-character hex string into a hash.
///
/// The hex text is in display order, so the bytes are reversed.
///
/// # Errors
///
/// Returns a type error for non-strings and an invalid parameter error for
/// malformed hex or a wrong length.
pub fn parse_hash_v(value: &Value, name: &str) -> Result<Hash256, RpcError> {
    let text = value
        .as_str()
        .ok_or_else(|| RpcError::type_error(format!("{name} must be a string")))?;
    if !is_hex(text) {
        return Err(not_hex(name, text));
    }
    if text.len() != 64 {
        return Err(RpcError::invalid_parameter(format!(
            "{name} must be of length 64 (not {})",
            text.len()
        )));
    }
    let mut hash: Hash256 = [0; 32];
    hex::decode_to_slice(text, &mut hash).map_err(|_| not_hex(name, text))?;
    hash.reverse();
    Ok(hash)
}

/// Parses the hash stored under `key`.
///
/// # Errors
///
/// As [`parse_hash_v`]; a missing key is reported as a type error.
pub fn parse_hash_o(object: &Map<String, Value>, key: &str) -> Result<Hash256, RpcError> {
    parse_hash_v(object.get(key).unwrap_or(&Value::Null), key)
}

/// Decodes a non-empty, even-length hex string.
///
/// # Errors
///
/// Returns a type error for non-strings and an invalid parameter error for
/// malformed hex.
pub fn parse_hex_v(value: &Value, name: &str) -> Result<Vec<u8>, RpcError> {
    let text = value
        .as_str()
        .ok_or_else(|| RpcError::type_error(format!("{name} must be a string")))?;
    if !is_hex(text) {
        return Err(not_hex(name, text));
    }
    hex::decode(text).map_err(|_| not_hex(name, text))
}

/// Decodes the hex string stored under `key`.
///
/// # Errors
///
/// As [`parse_hex_v`]; a missing key is reported as a type error.
pub fn parse_hex_o(object: &Map<String, Value>, key: &str) -> Result<Vec<u8>, RpcError> {
    parse_hex_v(object.get(key).unwrap_or(&Value::Null), key)
}

/// Parses a coin-denominated amount into base units.
///
/// Accepts JSON numbers and decimal strings, optionally in exponent
/// notation, with at most eight significant decimal places.
///
/// # Errors
///
/// Returns a type error for other value kinds, malformed or over-precise
/// amounts, and amounts outside `0..=MAX_MONEY`.
pub fn amount_from_value(value: &Value) -> Result<i64, RpcError> {
    let text = match value {
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.trim().to_owned(),
        _ => return Err(RpcError::type_error("Amount is not a number or string")),
    };
    let amount = parse_fixed_point(&text).ok_or_else(|| RpcError::type_error("Invalid amount"))?;
    if !money_range(amount) {
        return Err(RpcError::type_error("Amount out of range"));
    }
    Ok(amount)
}

/// Renders base units as a coin-denominated JSON number.
pub fn value_from_amount(amount: i64) -> Value {
    Number::from_f64(amount as f64 / COIN as f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::Number(0.into()))
}

/// Formats a command-line usage example for help text.
pub fn help_example_cli(method: &str, args: &str) -> String {
    format!("> noderpc-cli {method} {args}\n")
}

/// Formats a raw JSON-RPC usage example for help text.
pub fn help_example_rpc(method: &str, args: &str) -> String {
    format!(
        "> curl --user myusername --data-binary '{{\"jsonrpc\": \"1.0\", \"id\":\"curltest\", \
         \"method\": \"{method}\", \"params\": [{args}] }}' \
         -H 'content-type: text/plain;' http://127.0.0.1:8232/\n"
    )
}

/// Help text shown by commands gated behind an experimental feature switch.
pub fn experimental_disabled_help_msg(rpc: &str, enable_arg: &str) -> String {
    format!(
        "\nWARNING: {rpc} is disabled.\n\
         To enable it, restart the node with the -experimentalfeatures and\n\
         -{enable_arg} command-line options, or add these two lines\n\
         to the configuration file:\n\n\
         experimentalfeatures=1\n\
         {enable_arg}=1\n"
    )
}

fn is_hex(text: &str) -> bool {
    !text.is_empty() && text.len() % 2 == 0 && text.bytes().all(|byte| byte.is_ascii_hexdigit())
}

fn not_hex(name: &str, text: &str) -> RpcError {
    RpcError::new(
        RPC_INVALID_PARAMETER,
        format!("{name} must be hexadecimal string (not '{text}')"),
    )
}

fn parse_fixed_point(text: &str) -> Option<i64> {
    let (mantissa, exponent) = match text.split_once(['e', 'E']) {
        Some((mantissa, exponent)) => (mantissa, exponent.parse::<i32>().ok()?),
        None => (text, 0),
    };
    let unsigned = mantissa.strip_prefix('-').unwrap_or(mantissa);
    let negative = unsigned.len() != mantissa.len();
    let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    let all_digits = |part: &str| part.bytes().all(|byte| byte.is_ascii_digit());
    if !all_digits(whole) || !all_digits(fraction) {
        return None;
    }

    // `digits * 10^-scale` is the coin value; trailing zeros carry no precision.
    let mut digits = format!("{whole}{fraction}");
    let mut scale = i64::try_from(fraction.len()).ok()? - i64::from(exponent);
    while scale > 0 && digits.ends_with('0') {
        digits.pop();
        scale -= 1;
    }
    let decimals = i64::try_from(AMOUNT_DECIMALS).ok()?;
    if scale > decimals {
        return None;
    }
    let significant = digits.trim_start_matches('0');
    if significant.is_empty() {
        return Some(0);
    }
    let shift = u32::try_from(decimals - scale).ok()?;
    let amount = significant
        .parse::<i64>()
        .ok()?
        .checked_mul(10_i64.checked_pow(shift)?)?;
    if negative { amount.checked_neg() } else { Some(amount) }
}
