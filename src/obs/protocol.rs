//! OBS websocket v5 message definitions
//!
//! Every frame is a JSON object `{"op": <u8>, "d": {...}}` sent as a text
//! message over the `obswebsocket.json` sub-protocol.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::ObsError;

/// Sub-protocol requested during the websocket upgrade
pub const SUBPROTOCOL: &str = "obswebsocket.json";

/// Close code OBS uses when the identify message fails authentication
pub const CLOSE_AUTHENTICATION_FAILED: u16 = 4009;

/// Message operation codes
pub mod op {
    pub const HELLO: u8 = 0;
    pub const IDENTIFY: u8 = 1;
    pub const IDENTIFIED: u8 = 2;
    pub const REQUEST: u8 = 6;
    pub const REQUEST_RESPONSE: u8 = 7;
}

/// Raw inbound frame before the payload is interpreted
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
}

impl Envelope {
    pub fn parse(text: &str) -> Result<Self, ObsError> {
        serde_json::from_str(text).map_err(|e| ObsError::Protocol(format!("bad frame: {e}")))
    }

    pub fn payload<T: for<'de> Deserialize<'de>>(self) -> Result<T, ObsError> {
        serde_json::from_value(self.d)
            .map_err(|e| ObsError::Protocol(format!("bad payload for op {}: {e}", self.op)))
    }
}

/// Outbound frame
#[derive(Debug, Serialize)]
pub struct Outgoing<T> {
    pub op: u8,
    pub d: T,
}

impl<T: Serialize> Outgoing<T> {
    pub fn to_text(&self) -> Result<String, ObsError> {
        serde_json::to_string(self).map_err(|e| ObsError::Protocol(e.to_string()))
    }
}

/// Hello (op 0)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    #[serde(default = "default_rpc_version")]
    pub rpc_version: u32,
    #[serde(default)]
    pub authentication: Option<AuthChallenge>,
}

fn default_rpc_version() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct AuthChallenge {
    #[serde(default)]
    pub challenge: String,
    #[serde(default)]
    pub salt: String,
}

/// Identify (op 1)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identify {
    pub rpc_version: u32,
    pub event_subscriptions: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<String>,
}

impl Identify {
    /// Build the identify reply for a hello. The token is only included when
    /// OBS asked for one and we have a password.
    pub fn for_hello(hello: &Hello, password: Option<&str>) -> Self {
        let authentication = match (&hello.authentication, password) {
            (Some(auth), Some(password)) => {
                Some(compute_auth(password, &auth.salt, &auth.challenge))
            }
            _ => None,
        };

        Self {
            rpc_version: hello.rpc_version,
            event_subscriptions: 0,
            authentication,
        }
    }
}

/// Identified (op 2)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identified {
    #[serde(default = "default_rpc_version")]
    pub negotiated_rpc_version: u32,
}

/// Request (op 6)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPayload<'a> {
    pub request_type: &'a str,
    pub request_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_data: Option<Value>,
}

/// RequestResponse (op 7)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    pub request_id: String,
    pub request_status: RequestStatus,
    #[serde(default)]
    pub response_data: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct RequestStatus {
    pub result: bool,
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub comment: Option<String>,
}

impl RequestResponse {
    /// Turn the response into its data, or the failure OBS reported.
    pub fn into_result(self, request_type: &str) -> Result<Value, ObsError> {
        if !self.request_status.result {
            return Err(ObsError::RequestFailed {
                request_type: request_type.to_string(),
                code: self.request_status.code,
                comment: self.request_status.comment.unwrap_or_default(),
            });
        }
        Ok(self.response_data.unwrap_or(Value::Null))
    }
}

/// obs-websocket v5 authentication string:
/// `base64(sha256(base64(sha256(password + salt)) + challenge))`
pub fn compute_auth(password: &str, salt: &str, challenge: &str) -> String {
    let secret = BASE64.encode(Sha256::digest(format!("{password}{salt}").as_bytes()));
    BASE64.encode(Sha256::digest(format!("{secret}{challenge}").as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_compute_auth_fixture() {
        let token = compute_auth(
            "supersecretpassword",
            "lM1GncleQOaCu9lT1yeUZhFYnqhsLLP1G5lAGo3ixaI=",
            "+IxH4CnCiqpX1rM9scsNynZzbOe4KhDeYcTNS3PDaeY=",
        );
        assert_eq!(token, "1Ct943GAT+6YQUUX47Ia/ncufilbe6+oD6lY+5kaCu4=");
    }

    #[test]
    fn test_compute_auth_short_inputs() {
        assert_eq!(
            compute_auth("hunter2", "salt", "challenge"),
            "6wBfUL6veUkD5SNgIOr1TMt9f7OxcqAbus2+WDaJbAg="
        );
    }

    #[test]
    fn test_identify_without_challenge_omits_token() {
        let hello: Hello = serde_json::from_value(json!({"rpcVersion": 1})).unwrap();
        let identify = Identify::for_hello(&hello, Some("pw"));
        let text = Outgoing { op: op::IDENTIFY, d: identify }.to_text().unwrap();
        assert!(!text.contains("authentication"));
        assert!(text.contains("\"eventSubscriptions\":0"));
    }

    #[test]
    fn test_identify_without_password_omits_token() {
        let hello: Hello = serde_json::from_value(json!({
            "rpcVersion": 1,
            "authentication": {"challenge": "c", "salt": "s"}
        }))
        .unwrap();
        assert!(Identify::for_hello(&hello, None).authentication.is_none());
        assert_eq!(
            Identify::for_hello(&hello, Some("p")).authentication,
            Some(compute_auth("p", "s", "c"))
        );
    }

    #[test]
    fn test_failed_response_into_result() {
        let resp: RequestResponse = serde_json::from_value(json!({
            "requestType": "GetSceneItemId",
            "requestId": "getItem-1",
            "requestStatus": {"result": false, "code": 600, "comment": "No scene items were found"}
        }))
        .unwrap();
        let err = resp.into_result("GetSceneItemId").unwrap_err();
        assert!(matches!(err, ObsError::RequestFailed { code: 600, .. }));
    }

    #[test]
    fn test_request_payload_serialization() {
        let frame = Outgoing {
            op: op::REQUEST,
            d: RequestPayload {
                request_type: "GetInputMute",
                request_id: "duckGetMute-3",
                request_data: Some(json!({"inputName": "Music"})),
            },
        };
        let value: Value = serde_json::from_str(&frame.to_text().unwrap()).unwrap();
        assert_eq!(value["op"], 6);
        assert_eq!(value["d"]["requestType"], "GetInputMute");
        assert_eq!(value["d"]["requestData"]["inputName"], "Music");
    }
}
