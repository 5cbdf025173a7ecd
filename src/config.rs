use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// huddle chat relay server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "huddle-server", version, about = "Room-scoped chat relay server")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "HUDDLE_PORT", default_value = "3000")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "HUDDLE_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./huddle.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "HUDDLE_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Messages retained per room; the oldest are evicted first
    #[arg(long, env = "HUDDLE_HISTORY_CAPACITY", default_value = "100")]
    pub history_capacity: usize,

    /// Room joined automatically on first auth; empty disables auto-join
    #[arg(long, env = "HUDDLE_DEFAULT_ROOM", default_value = "lobby")]
    pub default_room: String,

    /// Call-signal relay audience: "room" or "global"
    #[arg(long, env = "HUDDLE_SIGNAL_SCOPE", default_value = "room")]
    pub signal_scope: String,

    /// Seconds before an expiring message is removed from history
    #[arg(long, env = "HUDDLE_MESSAGE_TTL_SECS", default_value = "10")]
    pub message_ttl_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            bind_address: "0.0.0.0".to_string(),
            config: "./huddle.toml".to_string(),
            json_logs: false,
            generate_config: false,
            history_capacity: 100,
            default_room: "lobby".to_string(),
            signal_scope: "room".to_string(),
            message_ttl_secs: 10,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (HUDDLE_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("HUDDLE_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# huddle Chat Relay Server Configuration
# Place this file at ./huddle.toml or specify with --config <path>
# All settings can be overridden via environment variables (HUDDLE_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 3000)
# port = 3000

# Bind address (default: 0.0.0.0 — all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Messages retained per room. When a room's history exceeds this bound the
# oldest messages are evicted first. (default: 100)
# history_capacity = 100

# Room joined automatically the first time a connection authenticates.
# Set to "" to disable auto-join. (default: "lobby")
# default_room = "lobby"

# Audience for relayed call signals:
#   "room"   — the sender's current room, sender excluded
#   "global" — every connection except the sender
# Both behaviors exist in deployed variants; pick one per deployment.
# signal_scope = "room"

# Seconds an expiring message stays in history before automatic removal
# message_ttl_secs = 10
"#
    .to_string()
}
