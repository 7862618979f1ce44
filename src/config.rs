//! Runtime configuration
//!
//! Every option can come from the command line or the environment.

use clap::Parser;

use crate::server::{Hub, HubOptions, DEFAULT_AVATAR};
use crate::types::RoomId;

/// Topic rooms that always exist, with ids stable across restarts
pub const DEFAULT_TOPIC_ROOMS: [(&str, &str); 2] = [
    ("77dac06c-bb59-4854-8b4b-928d078454cc", "General"),
    ("fe09b952-7690-4978-96cf-5a5c8e74ecaf", "Random"),
];

/// Multi-room WebSocket chat hub
#[derive(Parser, Debug, Clone)]
#[command(name = "room_hub", version, about)]
pub struct Config {
    /// Address to listen on
    #[arg(env = "ROOM_HUB_ADDR", default_value = "127.0.0.1:8080")]
    pub addr: String,

    /// Messages kept per room before the oldest is dropped
    #[arg(
        long,
        env = "ROOM_HUB_MAX_SAVED_MESSAGES",
        default_value_t = 500,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub max_saved_messages: u32,

    /// Messages returned per history page
    #[arg(
        long,
        env = "ROOM_HUB_MAX_RETURNED_MESSAGES",
        default_value_t = 20,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub max_returned_messages: u32,

    /// Extra topic room to create at startup (repeatable)
    #[arg(long = "topic-room", env = "ROOM_HUB_TOPIC_ROOMS", value_delimiter = ',')]
    pub topic_rooms: Vec<String>,

    /// Avatar URL given to new users
    #[arg(long, env = "ROOM_HUB_DEFAULT_AVATAR", default_value = DEFAULT_AVATAR)]
    pub default_avatar: String,

    /// Placeholder messages seeded into each default topic room
    #[arg(long, env = "ROOM_HUB_SEED_MESSAGES", default_value_t = 0)]
    pub seed_messages: usize,

    /// Capacity of the hub's inbound queue
    #[arg(
        long,
        env = "ROOM_HUB_COMMAND_BUFFER",
        default_value_t = 256,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub command_buffer: u32,
}

impl Config {
    pub fn hub_options(&self) -> HubOptions {
        HubOptions {
            max_saved_messages: self.max_saved_messages as usize,
            max_returned_messages: self.max_returned_messages as usize,
            default_avatar: self.default_avatar.clone(),
        }
    }

    /// Create the default and configured topic rooms, then seed history
    pub fn seed(&self, hub: &Hub) {
        for (id, name) in DEFAULT_TOPIC_ROOMS {
            let room_id = RoomId::from(id);
            hub.create_topic_room(room_id.clone(), name);
            if self.seed_messages > 0 {
                hub.seed_history(&room_id, self.seed_messages);
            }
        }

        for name in self.topic_rooms.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            hub.create_topic_room(RoomId::generate(), name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["room_hub"]).unwrap();
        assert_eq!(config.addr, "127.0.0.1:8080");
        assert_eq!(config.hub_options(), HubOptions::default());
        assert!(config.topic_rooms.is_empty());
        assert_eq!(config.seed_messages, 0);
        assert_eq!(config.command_buffer, 256);
    }

    #[test]
    fn test_flags() {
        let config = Config::try_parse_from([
            "room_hub",
            "0.0.0.0:9000",
            "--max-saved-messages",
            "50",
            "--max-returned-messages",
            "5",
            "--topic-room",
            "Rust",
            "--topic-room",
            "Music,Books",
        ])
        .unwrap();

        assert_eq!(config.addr, "0.0.0.0:9000");
        let options = config.hub_options();
        assert_eq!(options.max_saved_messages, 50);
        assert_eq!(options.max_returned_messages, 5);
        assert_eq!(config.topic_rooms, vec!["Rust", "Music", "Books"]);
    }

    #[test]
    fn test_zero_limits_rejected() {
        assert!(Config::try_parse_from(["room_hub", "--max-saved-messages", "0"]).is_err());
        assert!(Config::try_parse_from(["room_hub", "--max-returned-messages", "0"]).is_err());
    }
}
