//! Server-to-client Bolt messages.

use crate::packstream::{PackStreamError, Structure, Value, ValueMap};

use super::sig;

/// A message sent from the server to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Request completed; metadata varies by request kind.
    Success {
        /// Response metadata
        metadata: ValueMap,
    },

    /// One row of a streamed result.
    Record {
        /// Field values for this row
        fields: Vec<Value>,
    },

    /// Request failed; metadata carries `code` and `message`.
    Failure {
        /// Failure metadata
        metadata: ValueMap,
    },

    /// Request was not executed because the session is in a failed
    /// state.
    Ignored,
}

impl Response {
    /// Get the message signature byte.
    pub fn signature(&self) -> u8 {
        match self {
            Response::Success { .. } => sig::SUCCESS,
            Response::Record { .. } => sig::RECORD,
            Response::Failure { .. } => sig::FAILURE,
            Response::Ignored => sig::IGNORED,
        }
    }

    /// Get the message name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Response::Success { .. } => "SUCCESS",
            Response::Record { .. } => "RECORD",
            Response::Failure { .. } => "FAILURE",
            Response::Ignored => "IGNORED",
        }
    }

    /// Build a SUCCESS response.
    pub fn success(metadata: ValueMap) -> Self {
        Response::Success { metadata }
    }

    /// Build a RECORD response.
    pub fn record(fields: Vec<Value>) -> Self {
        Response::Record { fields }
    }

    /// Build a FAILURE response from a code and message.
    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        let metadata = ValueMap::from([
            ("code", Value::String(code.into())),
            ("message", Value::String(message.into())),
        ]);
        Response::Failure { metadata }
    }

    /// Check if this is a SUCCESS response.
    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success { .. })
    }

    /// Check if this is a FAILURE response.
    pub fn is_failure(&self) -> bool {
        matches!(self, Response::Failure { .. })
    }

    /// Check if this is a RECORD response.
    pub fn is_record(&self) -> bool {
        matches!(self, Response::Record { .. })
    }

    /// Failure code, if this is a FAILURE carrying one.
    pub fn failure_code(&self) -> Option<&str> {
        match self {
            Response::Failure { metadata } => metadata.get_str("code"),
            _ => None,
        }
    }

    /// Failure message, if this is a FAILURE carrying one.
    pub fn failure_message(&self) -> Option<&str> {
        match self {
            Response::Failure { metadata } => metadata.get_str("message"),
            _ => None,
        }
    }

    /// Convert to a PackStream structure.
    pub fn to_structure(&self) -> Structure {
        match self {
            Response::Success { metadata } => {
                Structure::new(sig::SUCCESS, vec![Value::Map(metadata.clone())])
            }
            Response::Record { fields } => {
                Structure::new(sig::RECORD, vec![Value::List(fields.clone())])
            }
            Response::Failure { metadata } => {
                Structure::new(sig::FAILURE, vec![Value::Map(metadata.clone())])
            }
            Response::Ignored => Structure::new(sig::IGNORED, vec![]),
        }
    }

    /// Parse from a PackStream structure.
    pub fn from_structure(s: &Structure) -> Result<Self, PackStreamError> {
        match s.signature {
            sig::SUCCESS => Ok(Response::Success {
                metadata: metadata_field(s, "SUCCESS")?,
            }),
            sig::RECORD => {
                let fields = match s.fields.first() {
                    Some(Value::List(list)) => list.clone(),
                    Some(_) => {
                        return Err(PackStreamError::InvalidStructure(
                            "RECORD fields must be a list".to_string(),
                        ))
                    }
                    None => Vec::new(),
                };
                Ok(Response::Record { fields })
            }
            sig::FAILURE => Ok(Response::Failure {
                metadata: metadata_field(s, "FAILURE")?,
            }),
            // Some peers send IGNORED with a metadata map; tolerate both
            sig::IGNORED => Ok(Response::Ignored),
            other => Err(PackStreamError::InvalidStructure(format!(
                "Unknown response signature: 0x{:02X}",
                other
            ))),
        }
    }
}

fn metadata_field(s: &Structure, name: &str) -> Result<ValueMap, PackStreamError> {
    match s.fields.first() {
        Some(Value::Map(m)) => Ok(m.clone()),
        Some(_) => Err(PackStreamError::InvalidStructure(format!(
            "{} metadata must be a map",
            name
        ))),
        None => Ok(ValueMap::new()),
    }
}
