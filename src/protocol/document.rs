//! Request and response documents

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{Map, Value};

use super::{LinkError, Result};

/// Field carrying the request name on the wire
pub const REQ_FIELD: &str = "req";

/// Replaces `req` when no reply is wanted
pub const CMD_FIELD: &str = "cmd";

/// Field carrying a peripheral-side error in a reply
pub const ERR_FIELD: &str = "err";

/// The request name travels in `req` (or `cmd`); callers may not set either
fn check_field(field: &str) -> Result<()> {
    if field == REQ_FIELD || field == CMD_FIELD {
        return Err(LinkError::ReservedField);
    }
    Ok(())
}

/// One outgoing request document
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    name: String,
    fields: Map<String, Value>,
}

impl Request {
    pub fn new(name: &str) -> Self {
        let mut fields = Map::new();
        fields.insert(REQ_FIELD.to_string(), Value::String(name.to_string()));
        Self {
            name: name.to_string(),
            fields,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn add_string(&mut self, field: &str, value: &str) -> Result<()> {
        self.add_value(field, Value::String(value.to_string()))
    }

    pub fn add_bool(&mut self, field: &str, value: bool) -> Result<()> {
        self.add_value(field, Value::Bool(value))
    }

    pub fn add_integer(&mut self, field: &str, value: i64) -> Result<()> {
        self.add_value(field, Value::from(value))
    }

    /// Set `field.nested`, turning `field` into an object if it is not one
    pub fn add_nested_string(&mut self, field: &str, nested: &str, value: &str) -> Result<()> {
        check_field(field)?;
        let slot = self
            .fields
            .entry(field.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        if let Value::Object(inner) = slot {
            inner.insert(nested.to_string(), Value::String(value.to_string()));
        }
        Ok(())
    }

    /// Binary payloads travel base64-encoded because the wire is text
    pub fn add_binary(&mut self, field: &str, payload: &[u8]) -> Result<()> {
        self.add_value(field, Value::String(STANDARD.encode(payload)))
    }

    pub fn add_value(&mut self, field: &str, value: Value) -> Result<()> {
        check_field(field)?;
        self.fields.insert(field.to_string(), value);
        Ok(())
    }

    /// Compact JSON, without the terminator
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.fields).map_err(|_| LinkError::Parse)
    }

    /// Same document sent as a command, which the peripheral does not answer
    pub fn to_command_bytes(&self) -> Result<Vec<u8>> {
        let mut fields = self.fields.clone();
        fields.remove(REQ_FIELD);
        fields.insert(CMD_FIELD.to_string(), Value::String(self.name.clone()));
        serde_json::to_vec(&fields).map_err(|_| LinkError::Parse)
    }
}

/// Parsed reply document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    fields: Map<String, Value>,
}

impl Response {
    /// Parse a reply body; trailing whitespace (the terminator) is accepted
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Object(fields)) => Ok(Self { fields }),
            _ => Err(LinkError::Parse),
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(Value::as_bool)
    }

    /// Peripheral-reported error text, if any
    pub fn err(&self) -> Option<&str> {
        match self.get(ERR_FIELD)? {
            Value::String(text) => Some(text.as_str()),
            _ => Some(""),
        }
    }

    pub fn decode_binary(&self, field: &str) -> Option<Vec<u8>> {
        STANDARD.decode(self.get_str(field)?).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_carries_name_and_fields() {
        let mut req = Request::new("hub.set");
        req.add_string("product", "com.example:sensor").unwrap();
        req.add_bool("heartbeat", true).unwrap();
        req.add_integer("seconds", 300).unwrap();

        assert_eq!(req.name(), "hub.set");
        assert_eq!(
            Value::Object(req.fields().clone()),
            json!({
                "req": "hub.set",
                "product": "com.example:sensor",
                "heartbeat": true,
                "seconds": 300
            })
        );
    }

    #[test]
    fn adding_a_field_twice_overwrites() {
        let mut req = Request::new("card.attn");
        req.add_string("mode", "disarm").unwrap();
        req.add_string("mode", "arm").unwrap();
        assert_eq!(req.fields()["mode"], json!("arm"));
        assert_eq!(req.fields().len(), 2);
    }

    #[test]
    fn nested_strings_share_one_object() {
        let mut req = Request::new("note.add");
        req.add_nested_string("body", "temp", "21.5").unwrap();
        req.add_nested_string("body", "unit", "C").unwrap();
        assert_eq!(req.fields()["body"], json!({"temp": "21.5", "unit": "C"}));

        req.add_bool("flag", true).unwrap();
        req.add_nested_string("flag", "inner", "x").unwrap();
        assert_eq!(req.fields()["flag"], json!({"inner": "x"}));
    }

    #[test]
    fn binary_is_base64_inline() {
        let mut req = Request::new("note.add");
        req.add_binary("payload", &[0x00, 0xFF, 0x10, 0x20, 0x30]).unwrap();
        assert_eq!(req.fields()["payload"], json!("AP8QIDA="));

        req.add_binary("short", b"M").unwrap();
        assert_eq!(req.fields()["short"], json!("TQ=="));
    }

    #[test]
    fn serializes_compact() {
        let mut req = Request::new("hub.status");
        req.add_bool("sync", false).unwrap();
        let bytes = req.to_bytes().unwrap();
        assert!(!bytes.contains(&b' '));
        assert!(!bytes.contains(&b'\n'));
        let back = Response::parse(&bytes).unwrap();
        assert_eq!(back.fields(), req.fields());
    }

    #[test]
    fn command_form_swaps_req_for_cmd() {
        let mut req = Request::new("card.location.mode");
        req.add_bool("delete", true).unwrap();
        let cmd = Response::parse(&req.to_command_bytes().unwrap()).unwrap();
        assert_eq!(cmd.get_str("cmd"), Some("card.location.mode"));
        assert_eq!(cmd.get("req"), None);
        assert_eq!(cmd.get_bool("delete"), Some(true));
    }

    #[test]
    fn response_parses_with_terminator() {
        let rsp = Response::parse(b"{\"connected\":true,\"signal\":-71}\n").unwrap();
        assert_eq!(rsp.get_bool("connected"), Some(true));
        assert_eq!(rsp.get_i64("signal"), Some(-71));
        assert_eq!(rsp.err(), None);

        assert!(Response::parse(b"{}\n").unwrap().is_empty());
    }

    #[test]
    fn response_rejects_non_objects() {
        assert_eq!(Response::parse(b"[1,2]\n"), Err(LinkError::Parse));
        assert_eq!(Response::parse(b"{\"a\":"), Err(LinkError::Parse));
        assert_eq!(Response::parse(b""), Err(LinkError::Parse));
    }

    #[test]
    fn response_exposes_err_and_binary() {
        let rsp = Response::parse(br#"{"err":"{io} failed","payload":"AP8QIDA="}"#).unwrap();
        assert_eq!(rsp.err(), Some("{io} failed"));
        assert_eq!(
            rsp.decode_binary("payload"),
            Some(vec![0x00, 0xFF, 0x10, 0x20, 0x30])
        );
        assert_eq!(rsp.decode_binary("err"), None);
    }

    #[test]
    fn request_name_fields_are_reserved() {
        let mut req = Request::new("card.attn");
        assert_eq!(req.add_string("req", "hub.set"), Err(LinkError::ReservedField));
        assert_eq!(req.add_bool("cmd", true), Err(LinkError::ReservedField));
        assert_eq!(
            req.add_nested_string("req", "inner", "x"),
            Err(LinkError::ReservedField)
        );
        assert_eq!(req.fields()["req"], json!("card.attn"));
        assert_eq!(req.fields().len(), 1);

        let cmd = Response::parse(&req.to_command_bytes().unwrap()).unwrap();
        assert_eq!(cmd.get_str("cmd"), Some("card.attn"));
    }
}
