//! Client-to-server Bolt messages.

use crate::packstream::{PackStreamError, Structure, Value, ValueMap};

use super::sig;

/// A message sent from the client to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Initialize the session. Sent once after the handshake.
    Init {
        /// Client name and version, e.g. `"AsyncBolt/1.0"`
        client_name: String,
        /// Authentication token (scheme, principal, credentials, ...)
        auth_token: ValueMap,
    },

    /// Execute a statement with parameters.
    Run {
        /// Statement text
        statement: String,
        /// Statement parameters
        parameters: ValueMap,
    },

    /// Discard all records pending from the last RUN.
    DiscardAll,

    /// Retrieve all records pending from the last RUN.
    PullAll,

    /// Acknowledge a failure, clearing the server's Failed state.
    AckFailure,

    /// Return the session to a clean Ready state, dropping pending work.
    Reset,
}

impl Request {
    /// Get the message signature byte.
    pub fn signature(&self) -> u8 {
        match self {
            Request::Init { .. } => sig::INIT,
            Request::Run { .. } => sig::RUN,
            Request::DiscardAll => sig::DISCARD_ALL,
            Request::PullAll => sig::PULL_ALL,
            Request::AckFailure => sig::ACK_FAILURE,
            Request::Reset => sig::RESET,
        }
    }

    /// Get the message name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Request::Init { .. } => "INIT",
            Request::Run { .. } => "RUN",
            Request::DiscardAll => "DISCARD_ALL",
            Request::PullAll => "PULL_ALL",
            Request::AckFailure => "ACK_FAILURE",
            Request::Reset => "RESET",
        }
    }

    /// Build a RUN request.
    pub fn run(statement: impl Into<String>, parameters: ValueMap) -> Self {
        Request::Run {
            statement: statement.into(),
            parameters,
        }
    }

    /// Convert to a PackStream structure.
    pub fn to_structure(&self) -> Structure {
        match self {
            Request::Init {
                client_name,
                auth_token,
            } => Structure::new(
                sig::INIT,
                vec![
                    Value::String(client_name.clone()),
                    Value::Map(auth_token.clone()),
                ],
            ),
            Request::Run {
                statement,
                parameters,
            } => Structure::new(
                sig::RUN,
                vec![
                    Value::String(statement.clone()),
                    Value::Map(parameters.clone()),
                ],
            ),
            Request::DiscardAll => Structure::new(sig::DISCARD_ALL, vec![]),
            Request::PullAll => Structure::new(sig::PULL_ALL, vec![]),
            Request::AckFailure => Structure::new(sig::ACK_FAILURE, vec![]),
            Request::Reset => Structure::new(sig::RESET, vec![]),
        }
    }

    /// Parse from a PackStream structure.
    pub fn from_structure(s: &Structure) -> Result<Self, PackStreamError> {
        match s.signature {
            sig::INIT => {
                let (client_name, auth_token) = two_fields(s, "INIT")?;
                let client_name = client_name
                    .as_str()
                    .ok_or_else(|| {
                        PackStreamError::InvalidStructure(
                            "INIT client_name must be a string".to_string(),
                        )
                    })?
                    .to_string();
                let auth_token = auth_token
                    .as_map()
                    .ok_or_else(|| {
                        PackStreamError::InvalidStructure(
                            "INIT auth_token must be a map".to_string(),
                        )
                    })?
                    .clone();
                Ok(Request::Init {
                    client_name,
                    auth_token,
                })
            }
            sig::RUN => {
                let (statement, parameters) = two_fields(s, "RUN")?;
                let statement = statement
                    .as_str()
                    .ok_or_else(|| {
                        PackStreamError::InvalidStructure(
                            "RUN statement must be a string".to_string(),
                        )
                    })?
                    .to_string();
                let parameters = parameters
                    .as_map()
                    .ok_or_else(|| {
                        PackStreamError::InvalidStructure(
                            "RUN parameters must be a map".to_string(),
                        )
                    })?
                    .clone();
                Ok(Request::Run {
                    statement,
                    parameters,
                })
            }
            sig::DISCARD_ALL => zero_fields(s, "DISCARD_ALL", Request::DiscardAll),
            sig::PULL_ALL => zero_fields(s, "PULL_ALL", Request::PullAll),
            sig::ACK_FAILURE => zero_fields(s, "ACK_FAILURE", Request::AckFailure),
            sig::RESET => zero_fields(s, "RESET", Request::Reset),
            other => Err(PackStreamError::InvalidStructure(format!(
                "Unknown request signature: 0x{:02X}",
                other
            ))),
        }
    }
}

fn two_fields<'a>(s: &'a Structure, name: &str) -> Result<(&'a Value, &'a Value), PackStreamError> {
    if s.fields.len() != 2 {
        return Err(PackStreamError::InvalidStructure(format!(
            "{} requires 2 fields, got {}",
            name,
            s.fields.len()
        )));
    }
    Ok((&s.fields[0], &s.fields[1]))
}

fn zero_fields(s: &Structure, name: &str, request: Request) -> Result<Request, PackStreamError> {
    if !s.fields.is_empty() {
        return Err(PackStreamError::InvalidStructure(format!(
            "{} takes no fields, got {}",
            name,
            s.fields.len()
        )));
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_roundtrip() {
        let auth = ValueMap::from([
            ("scheme", Value::from("basic")),
            ("principal", Value::from("neo4j")),
            ("credentials", Value::from("password")),
        ]);
        let request = Request::Init {
            client_name: "AsyncBolt/1.0".to_string(),
            auth_token: auth,
        };

        let structure = request.to_structure();
        assert_eq!(structure.signature, sig::INIT);
        assert_eq!(structure.len(), 2);

        let parsed = Request::from_structure(&structure).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_run_roundtrip() {
        let request = Request::run("RETURN 1 AS num", ValueMap::new());
        let structure = request.to_structure();
        assert_eq!(structure.signature, sig::RUN);

        let parsed = Request::from_structure(&structure).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_zero_field_messages() {
        for request in [
            Request::DiscardAll,
            Request::PullAll,
            Request::AckFailure,
            Request::Reset,
        ] {
            let structure = request.to_structure();
            assert!(structure.is_empty());
            assert_eq!(Request::from_structure(&structure).unwrap(), request);
        }
    }

    #[test]
    fn test_signatures() {
        assert_eq!(
            Request::Init {
                client_name: String::new(),
                auth_token: ValueMap::new()
            }
            .signature(),
            0x01
        );
        assert_eq!(Request::run("", ValueMap::new()).signature(), 0x10);
        assert_eq!(Request::DiscardAll.signature(), 0x2F);
        assert_eq!(Request::PullAll.signature(), 0x3F);
        assert_eq!(Request::AckFailure.signature(), 0x0E);
        assert_eq!(Request::Reset.signature(), 0x0F);
    }

    #[test]
    fn test_wrong_arity_rejected() {
        let structure = Structure::new(sig::RUN, vec![Value::String("only one".into())]);
        let err = Request::from_structure(&structure).unwrap_err();
        assert!(matches!(err, PackStreamError::InvalidStructure(_)));

        let structure = Structure::new(sig::RESET, vec![Value::Null]);
        let err = Request::from_structure(&structure).unwrap_err();
        assert!(matches!(err, PackStreamError::InvalidStructure(_)));
    }

    #[test]
    fn test_wrong_field_type_rejected() {
        let structure = Structure::new(sig::RUN, vec![Value::Integer(1), Value::Map(ValueMap::new())]);
        let err = Request::from_structure(&structure).unwrap_err();
        assert!(matches!(err, PackStreamError::InvalidStructure(_)));
    }

    #[test]
    fn test_unknown_signature_rejected() {
        let structure = Structure::new(0x42, vec![]);
        let err = Request::from_structure(&structure).unwrap_err();
        assert!(matches!(err, PackStreamError::InvalidStructure(_)));
    }

    #[test]
    fn test_names() {
        assert_eq!(Request::PullAll.name(), "PULL_ALL");
        assert_eq!(Request::Reset.name(), "RESET");
    }
}
