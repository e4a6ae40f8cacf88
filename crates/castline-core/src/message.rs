//! Protocol messages.
//!
//! Every frame is a JSON object with exactly one key naming the message kind,
//! e.g. `{"request":{"id":1,"data":{"getStatus":{}}}}`. The device sends
//! [`MessageToClient`]; the remote controller sends [`MessageToServer`].

use crate::auth::Challenge;
use crate::status::{StatusTopLeft, StatusTopRight};
use serde::{Deserialize, Serialize};

/// Protocol version announced in `hello`.
pub const API_VERSION: &str = "0.1";

/// Client-chosen correlation token, echoed in the matching response.
pub type RequestId = i64;

/// Messages sent from the device to the remote controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageToClient {
    /// Unsolicited event.
    Event(Event),
    /// Answer to a request.
    Response {
        id: RequestId,
        result: ResultCode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<ResponseData>,
    },
}

impl MessageToClient {
    /// The `hello` event that opens every connection.
    pub fn hello(authentication: Challenge) -> Self {
        Self::Event(Event::Hello {
            api_version: API_VERSION.to_string(),
            authentication,
        })
    }

    /// A response without payload.
    pub fn result(id: RequestId, result: ResultCode) -> Self {
        Self::Response {
            id,
            result,
            data: None,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Event {
    Hello {
        api_version: String,
        authentication: Challenge,
    },
}

/// Outcome carried by a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResultCode {
    Ok,
    WrongPassword,
}

/// Payload attached to a successful response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ResponseData {
    GetStatus {
        top_left: StatusTopLeft,
        top_right: StatusTopRight,
    },
}

/// Messages sent from the remote controller to the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageToServer {
    Request { id: RequestId, data: Request },
}

impl MessageToServer {
    /// Decode one text frame.
    ///
    /// A request whose kind is not known yields
    /// [`DecodeError::UnknownRequest`] so the caller still learns the id.
    pub fn from_json(text: &str) -> Result<Self, DecodeError> {
        let raw: RawMessageToServer = serde_json::from_str(text)?;
        let RawMessageToServer::Request { id, data } = raw;
        let kind = single_key(&data);
        match serde_json::from_value::<Request>(data) {
            Ok(data) => Ok(Self::Request { id, data }),
            Err(err) => match kind {
                Some(kind) if !Request::KINDS.contains(&kind.as_str()) => {
                    Err(DecodeError::UnknownRequest { id, kind })
                }
                _ => Err(err.into()),
            },
        }
    }
}

/// Envelope with the request payload left undecoded.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
enum RawMessageToServer {
    Request {
        id: RequestId,
        data: serde_json::Value,
    },
}

fn single_key(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Object(map) if map.len() == 1 => map.keys().next().cloned(),
        serde_json::Value::String(kind) => Some(kind.clone()),
        _ => None,
    }
}

/// Request kinds understood by the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Request {
    /// Answer to the `hello` challenge.
    Identify { authentication: String },
    GetStatus {},
    SetRecord { on: bool },
    SetStream { on: bool },
    SetMute { on: bool },
    SetTorch { on: bool },
    SetZoom { x: f32 },
    SetScene { id: String },
}

impl Request {
    /// Wire names of every variant.
    pub const KINDS: &'static [&'static str] = &[
        "identify",
        "getStatus",
        "setRecord",
        "setStream",
        "setMute",
        "setTorch",
        "setZoom",
        "setScene",
    ];

    /// The command carried by this request, if it is one.
    pub fn into_command(self) -> Option<Command> {
        match self {
            Self::Identify { .. } | Self::GetStatus {} => None,
            Self::SetRecord { on } => Some(Command::SetRecord(on)),
            Self::SetStream { on } => Some(Command::SetStream(on)),
            Self::SetMute { on } => Some(Command::SetMute(on)),
            Self::SetTorch { on } => Some(Command::SetTorch(on)),
            Self::SetZoom { x } => Some(Command::SetZoom(x)),
            Self::SetScene { id } => Some(Command::SetScene(id)),
        }
    }
}

/// A state-changing action requested by the remote controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetRecord(bool),
    SetStream(bool),
    SetMute(bool),
    SetTorch(bool),
    SetZoom(f32),
    SetScene(String),
}

/// Error decoding an inbound frame.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown request kind '{kind}' (id {id})")]
    UnknownRequest { id: RequestId, kind: String },
}
