//! Wire rendering of outbound messages.

use serde_json::Value;

/// Serialize a message for remote delivery.
///
/// Removes, at every depth, keys starting with `_` (local metadata such as
/// stored private keys or collection bookkeeping) and the `bto`/`bcc`
/// audience fields, which must never reach a remote server.
pub fn serialize_public(message: &Value) -> Result<String, serde_json::Error> {
    let mut public = message.clone();
    strip_private(&mut public);
    serde_json::to_string(&public)
}

fn strip_private(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|key, _| !is_private_key(key));
            map.values_mut().for_each(strip_private);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_private),
        _ => {}
    }
}

fn is_private_key(key: &str) -> bool {
    key.starts_with('_') || key == "bto" || key == "bcc"
}
