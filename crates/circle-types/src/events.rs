use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{MessageResponse, NotificationResponse};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, name: String },

    /// Something happened that the user should hear about
    Notification(NotificationResponse),

    /// A direct message arrived
    MessageCreate(MessageResponse),

    /// A friend came online or went offline
    PresenceUpdate { user_id: Uuid, online: bool },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identify_wire_format() {
        let cmd: GatewayCommand =
            serde_json::from_str(r#"{"type":"Identify","data":{"token":"abc"}}"#).unwrap();
        let GatewayCommand::Identify { token } = cmd;
        assert_eq!(token, "abc");
    }

    #[test]
    fn test_presence_is_adjacently_tagged() {
        let id = Uuid::nil();
        let json = serde_json::to_value(GatewayEvent::PresenceUpdate { user_id: id, online: true }).unwrap();
        assert_eq!(json["type"], "PresenceUpdate");
        assert_eq!(json["data"]["online"], true);
    }
}
