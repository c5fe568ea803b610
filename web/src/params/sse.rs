use serde::Deserialize;
use sse::connection::ClientId;

use crate::error::{Error, Result};

fn validate(client_id: String) -> Result<ClientId> {
    if client_id.trim().is_empty() {
        return Err(Error::InvalidClientId);
    }
    Ok(client_id)
}

/// Query string naming the client a request is about, e.g. `?clientId=abc`
#[derive(Debug, Deserialize)]
pub(crate) struct ClientParams {
    #[serde(rename = "clientId")]
    client_id: String,
}

impl ClientParams {
    pub(crate) fn client_id(self) -> Result<ClientId> {
        validate(self.client_id)
    }
}

/// Query string for pushing a message; without `message` the current time in
/// milliseconds is sent.
#[derive(Debug, Deserialize)]
pub(crate) struct SendParams {
    #[serde(rename = "clientId")]
    client_id: String,
    message: Option<String>,
}

impl SendParams {
    pub(crate) fn into_parts(self) -> Result<(ClientId, Option<String>)> {
        Ok((validate(self.client_id)?, self.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_client_id_is_rejected() {
        let params = ClientParams {
            client_id: "  ".to_string(),
        };
        assert_eq!(params.client_id(), Err(Error::InvalidClientId));
    }

    #[test]
    fn test_send_params_deserialize_from_camel_case() {
        let params: SendParams =
            serde_json::from_str(r#"{"clientId": "c1", "message": "hi"}"#).unwrap();
        assert_eq!(
            params.into_parts().unwrap(),
            ("c1".to_string(), Some("hi".to_string()))
        );
    }
}
