//! Frame types

use super::constants::op;
use serde_json::Value;

/// Frame operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    /// Client command
    Command,
    /// Server reply
    Reply,
}

impl OpCode {
    /// Wire value
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Command => op::COMMAND,
            Self::Reply => op::COMMAND_REPLY,
        }
    }

    /// Parse a wire value
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            op::COMMAND => Some(Self::Command),
            op::COMMAND_REPLY => Some(Self::Reply),
            _ => None,
        }
    }
}

/// A framed command or reply
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Identifier chosen by the sender
    pub request_id: i32,
    /// Request this frame answers (0 for commands)
    pub response_to: i32,
    /// Operation
    pub op_code: OpCode,
    /// Document body
    pub body: Value,
}

impl Message {
    /// Build a command frame
    pub fn command(request_id: i32, body: Value) -> Self {
        Self {
            request_id,
            response_to: 0,
            op_code: OpCode::Command,
            body,
        }
    }

    /// Build a reply frame answering `response_to`
    pub fn reply(request_id: i32, response_to: i32, body: Value) -> Self {
        Self {
            request_id,
            response_to,
            op_code: OpCode::Reply,
            body,
        }
    }

    /// Name of the command (first key of the body), if this is a command
    pub fn command_name(&self) -> Option<&str> {
        match (&self.op_code, &self.body) {
            (OpCode::Command, Value::Object(map)) => map.keys().next().map(String::as_str),
            _ => None,
        }
    }
}
