//! Core records shared by the registries, the key resolver and the handlers.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Seconds since the Unix epoch.
pub type Timestamp = u64;

/// Response `status` value for a successful request.
pub const STATUS_SUCCESS: &str = "SUCCESS";
/// Response `status` value for a rejected request.
pub const STATUS_ERROR: &str = "ERROR";

/// Which trust model a protocol-channel request is authenticated under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequesterClass {
    /// Remote agent holding a pre-shared or rotating secret.
    #[serde(rename = "wraith")]
    Agent,
    /// Operator client holding a session token.
    Manager,
}

impl RequesterClass {
    /// Stable lowercase name, used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "wraith",
            Self::Manager => "manager",
        }
    }
}

impl fmt::Display for RequesterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address a session is bound to. `*` on the wire means any address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpLock {
    /// Usable from any address.
    Any,
    /// Usable only from this address.
    Address(IpAddr),
}

impl IpLock {
    /// Wire form of the wildcard lock.
    pub const WILDCARD: &'static str = "*";

    /// Whether a request from `ip` may use a session with this lock.
    pub fn permits(&self, ip: IpAddr) -> bool {
        match self {
            Self::Any => true,
            Self::Address(locked) => *locked == ip,
        }
    }
}

impl fmt::Display for IpLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str(Self::WILDCARD),
            Self::Address(ip) => write!(f, "{ip}"),
        }
    }
}

impl FromStr for IpLock {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == Self::WILDCARD {
            Ok(Self::Any)
        } else {
            s.parse().map(Self::Address)
        }
    }
}

impl Serialize for IpLock {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IpLock {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A manager session created by a successful autoconf.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Public session identifier (`sessionID` on the wire).
    #[serde(rename = "assignedID")]
    pub assigned_id: String,
    /// Account that logged in.
    pub username: String,
    /// Inner-layer key and proof of session ownership.
    pub session_token: String,
    /// Address lock.
    #[serde(rename = "creatorIP")]
    pub creator_ip: IpLock,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last authenticated use.
    pub last_seen_at: Timestamp,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("assigned_id", &self.assigned_id)
            .field("username", &self.username)
            .field("session_token", &"<redacted>")
            .field("creator_ip", &self.creator_ip)
            .field("created_at", &self.created_at)
            .field("last_seen_at", &self.last_seen_at)
            .finish()
    }
}

/// Failed-login throttling record for one source address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanEntry {
    /// Throttled address.
    pub ip: IpAddr,
    /// Failures left before the address is blocked.
    pub attempts_remaining: u32,
    /// End of the current block window.
    pub blocked_until: Timestamp,
    /// Shown to a blocked client.
    pub reason: Option<String>,
}

impl BanEntry {
    /// True while the entry rejects every request from its address.
    pub fn is_blocking(&self, now: Timestamp) -> bool {
        self.attempts_remaining == 0 && self.blocked_until > now
    }

    /// True once the block window has passed and the entry can be purged.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.blocked_until <= now
    }
}

/// Operator account checked by autoconf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerAccount {
    /// Login name. Never contains `|`.
    pub username: String,
    /// Argon2 PHC string.
    pub password_hash: String,
}

/// Decrypted request object handed to a protocol handler.
///
/// Always a JSON object carrying `reqType`. Manager payloads additionally
/// carry `sessionToken` and the injected `sessionID`.
#[derive(Clone, PartialEq)]
pub struct DecodedPayload(Map<String, Value>);

impl DecodedPayload {
    /// Field naming the command.
    pub const REQ_TYPE: &'static str = "reqType";
    /// Field carrying the manager's session token.
    pub const SESSION_TOKEN: &'static str = "sessionToken";
    /// Field injected with the authenticated session id.
    pub const SESSION_ID: &'static str = "sessionID";

    /// Wrap a decoded value. Returns `None` unless it is a JSON object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Whether `key` is present, whatever its value.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// String field access.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// The `reqType` field if it is a string.
    pub fn req_type(&self) -> Option<&str> {
        self.str_field(Self::REQ_TYPE)
    }

    /// The injected `sessionID`, present on authenticated manager payloads.
    pub fn session_id(&self) -> Option<&str> {
        self.str_field(Self::SESSION_ID)
    }

    pub(crate) fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }
}

impl fmt::Debug for DecodedPayload {
    // Payloads carry session tokens; only the shape is printed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedPayload")
            .field("req_type", &self.req_type())
            .field("fields", &self.0.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Outbound response object: `status` plus auxiliary fields.
///
/// Keys serialize in sorted order, which keeps the encoding canonical.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResponseBody(Map<String, Value>);

impl ResponseBody {
    /// `{"status": "SUCCESS"}`
    pub fn success() -> Self {
        Self::with_status(STATUS_SUCCESS)
    }

    /// `{"status": "ERROR", "message": message}`
    pub fn error(message: impl Into<String>) -> Self {
        Self::with_status(STATUS_ERROR).with("message", message.into())
    }

    fn with_status(status: &str) -> Self {
        let mut map = Map::new();
        map.insert("status".to_string(), Value::from(status));
        Self(map)
    }

    /// Add or replace a field.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn status(&self) -> Option<&str> {
        self.0.get("status").and_then(Value::as_str)
    }

    pub fn message(&self) -> Option<&str> {
        self.0.get("message").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}
