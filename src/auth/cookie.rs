//! The `selector.validator` value carried by the refresh cookie.

const SEPARATOR: char = '.';

/// Join a selector and validator into the value handed to the client.
#[must_use]
pub fn encode_cookie_value(selector: &str, validator: &str) -> String {
    format!("{selector}{SEPARATOR}{validator}")
}

/// Split a cookie value on the first `.`.
///
/// Returns `None` for an empty value, a missing separator, or an empty half.
#[must_use]
pub fn decode_cookie_value(value: &str) -> Option<(&str, &str)> {
    let (selector, validator) = value.split_once(SEPARATOR)?;
    if selector.is_empty() || validator.is_empty() {
        return None;
    }
    Some((selector, validator))
}
