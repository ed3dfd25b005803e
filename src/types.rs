//! Wire types for conversations, messages, and structured search.
//!
//! DESIGN
//! ======
//! These mirror the backend's JSON documents (camelCase keys, `sender`
//! discriminator on messages) so serde round-trips stay lossless. Fields the
//! backend adds for its own bookkeeping (`id`, `type`, storage metadata) are
//! ignored on decode.

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::AssistantError;

/// Seconds since the Unix epoch, as stored by the backend.
pub type Timestamp = i64;

/// Current time in backend timestamp units.
#[must_use]
pub fn now_timestamp() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

// =============================================================================
// CHASSIS ID
// =============================================================================

static CHASSIS_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^C\d{6}_[PK]\d{4}$").expect("chassis id pattern is valid"));

/// Vehicle manufacturing division encoded in a chassis id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Division {
    P,
    K,
}

impl Division {
    #[must_use]
    pub fn as_char(self) -> char {
        match self {
            Self::P => 'P',
            Self::K => 'K',
        }
    }
}

/// Chassis identifier of the form `C751875_P2024`: six-digit chassis number,
/// division letter, four-digit order year.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChassisId(String);

impl ChassisId {
    /// Validate and wrap a raw id string.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::InvalidChassisId`] when `raw` does not match
    /// `C\d{6}_[PK]\d{4}`.
    pub fn parse(raw: &str) -> Result<Self, AssistantError> {
        if CHASSIS_ID_PATTERN.is_match(raw) {
            Ok(Self(raw.to_owned()))
        } else {
            Err(AssistantError::InvalidChassisId(raw.to_owned()))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The six-digit chassis number.
    #[must_use]
    pub fn chassis_number(&self) -> &str {
        &self.0[1..7]
    }

    #[must_use]
    pub fn division(&self) -> Division {
        if self.0.as_bytes()[8] == b'K' { Division::K } else { Division::P }
    }

    /// The four-digit order year.
    #[must_use]
    pub fn year(&self) -> &str {
        &self.0[9..]
    }
}

impl TryFrom<String> for ChassisId {
    type Error = AssistantError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<ChassisId> for String {
    fn from(id: ChassisId) -> Self {
        id.0
    }
}

impl fmt::Display for ChassisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// CONVERSATION
// =============================================================================

/// One user's exchange with the assistant about one chassis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub conversation_id: String,
    pub user_id: String,
    pub chassis_id: ChassisId,
    #[serde(default)]
    pub timestamp: Timestamp,
    /// Chronological; insertion order is display order.
    #[serde(default)]
    pub messages: Vec<Message>,
}

// =============================================================================
// MESSAGES
// =============================================================================

/// A conversation entry, discriminated by its `sender` field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sender", rename_all = "snake_case")]
pub enum Message {
    User(UserMessage),
    Assistant(AssistantMessage),
    SearchResults(SearchResultsMessage),
    SearchRequest(SearchRequestMessage),
}

impl Message {
    #[must_use]
    pub fn message_id(&self) -> &str {
        match self {
            Self::User(m) => &m.message_id,
            Self::Assistant(m) => &m.message_id,
            Self::SearchResults(m) => &m.message_id,
            Self::SearchRequest(m) => &m.message_id,
        }
    }

    #[must_use]
    pub fn conversation_id(&self) -> &str {
        match self {
            Self::User(m) => &m.conversation_id,
            Self::Assistant(m) => &m.conversation_id,
            Self::SearchResults(m) => &m.conversation_id,
            Self::SearchRequest(m) => &m.conversation_id,
        }
    }

    #[must_use]
    pub fn content(&self) -> &str {
        match self {
            Self::User(m) => &m.content,
            Self::Assistant(m) => &m.content,
            Self::SearchResults(m) => &m.content,
            Self::SearchRequest(m) => &m.content,
        }
    }

    #[must_use]
    pub fn timestamp(&self) -> Timestamp {
        match self {
            Self::User(m) => m.timestamp,
            Self::Assistant(m) => m.timestamp,
            Self::SearchResults(m) => m.timestamp,
            Self::SearchRequest(m) => m.timestamp,
        }
    }

    /// Wire name of the variant (`user`, `assistant`, ...).
    #[must_use]
    pub fn sender(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Assistant(_) => "assistant",
            Self::SearchResults(_) => "search_results",
            Self::SearchRequest(_) => "search_request",
        }
    }

    /// `true` for an assistant reply the backend is still generating.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Assistant(m) if m.state == MessageState::Pending)
    }
}

/// Plain user-authored text. An empty `message_id` marks a local
/// placeholder the backend has not yet acknowledged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMessage {
    pub conversation_id: String,
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: Timestamp,
    /// Local sequence number of an unacknowledged placeholder; never on the wire.
    #[serde(skip)]
    pub local_seq: Option<u64>,
}

/// Generation state of an assistant reply.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageState {
    Pending,
    #[default]
    Completed,
}

/// Tri-state user feedback on an assistant reply.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum Liked {
    Liked,
    #[default]
    Neutral,
    Disliked,
}

impl Liked {
    /// Feedback value to record when the user clicks `requested` while the
    /// message currently holds `self`: clicking the active state clears it.
    #[must_use]
    pub fn toggled(self, requested: Liked) -> Liked {
        if requested == self { Liked::Neutral } else { requested }
    }
}

impl TryFrom<i8> for Liked {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Liked),
            0 => Ok(Self::Neutral),
            -1 => Ok(Self::Disliked),
            other => Err(format!("liked must be 1, 0 or -1, got {other}")),
        }
    }
}

impl From<Liked> for i8 {
    fn from(liked: Liked) -> Self {
        match liked {
            Liked::Liked => 1,
            Liked::Neutral => 0,
            Liked::Disliked => -1,
        }
    }
}

/// Assistant reply. `content` is only meaningful once `state` is
/// [`MessageState::Completed`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantMessage {
    pub conversation_id: String,
    pub message_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: Timestamp,
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default)]
    pub followup_prompts: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub liked: Liked,
    #[serde(default)]
    pub state: MessageState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<String>,
}

/// Ranked search hits. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultsMessage {
    pub conversation_id: String,
    pub message_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: Timestamp,
    #[serde(default)]
    pub results: Vec<ChassisAiSearchResult>,
    #[serde(default)]
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_chassis: Option<ChassisAiSearchResult>,
}

/// The facet selection a user submitted for a structured search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequestMessage {
    pub conversation_id: String,
    /// Empty until the backend has persisted the request.
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: Timestamp,
    #[serde(default)]
    pub query: Vec<SearchKey>,
}

impl SearchRequestMessage {
    #[must_use]
    pub fn is_acknowledged(&self) -> bool {
        !self.message_id.is_empty()
    }
}

/// Response to `POST /conversation/{id}/message`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePair {
    pub user_message: UserMessage,
    pub assistant_message: AssistantMessage,
}

/// Record counts removed by a delete call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteCounts {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub conversation: u32,
    #[serde(default)]
    pub message: u32,
}

// =============================================================================
// SEARCH
// =============================================================================

/// Facet tier as reported by `/search/keys`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKeyKind {
    Top,
    Broad,
    Extended,
}

/// A filter facet of the structured search.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchKey {
    /// Assigned client-side from catalog order.
    #[serde(default)]
    pub id: String,
    /// Index column name, e.g. `fuel_tank_location1`.
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SearchKeyKind,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub selected: bool,
}

impl SearchKey {
    /// Column name as title-cased words: `rear_suspension` -> `Rear Suspension`.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name
            .split('_')
            .filter(|part| !part.is_empty())
            .map(|part| {
                let mut chars = part.chars();
                chars
                    .next()
                    .map(|first| first.to_uppercase().chain(chars).collect::<String>())
                    .unwrap_or_default()
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A CAD part linked to a chassis record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindchillCadItem {
    #[serde(default, deserialize_with = "null_as_default")]
    pub product_item_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub part_number: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub part_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub part_version: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub part_state: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub last_modified_date: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub part_url: String,
    #[serde(rename = "ID", default, deserialize_with = "null_as_default")]
    pub id: String,
}

/// One chassis record returned by the search index.
///
/// Only the columns the widget reads are typed; the remaining index columns
/// (suspension, tanks, drivelines, ...) are kept in `attributes` keyed by
/// column name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChassisAiSearchResult {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub division: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub chassis_number: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub chassis_year: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub schedule_date: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub dealer: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub customer_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub base_model: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "defect_count")]
    pub defects: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub links: Vec<WindchillCadItem>,
    #[serde(rename = "_score", default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

/// Index documents carry raw columns; a `null` reads as the column default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Defect counts arrive as integers, floats, numeric strings, or `null`.
#[allow(clippy::cast_possible_truncation)]
fn defect_count<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let count = match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok().map(|f| f.round() as i64),
        _ => None,
    };
    Ok(count.unwrap_or_default())
}

impl ChassisAiSearchResult {
    /// Text value of an index column, typed or not. Empty strings count as
    /// absent.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<String> {
        let typed = match name {
            "ID" => Some(self.id.as_str()),
            "division" => Some(self.division.as_str()),
            "chassis_number" => Some(self.chassis_number.as_str()),
            "chassis_year" => Some(self.chassis_year.as_str()),
            "schedule_date" => Some(self.schedule_date.as_str()),
            "dealer" => Some(self.dealer.as_str()),
            "customer_name" => Some(self.customer_name.as_str()),
            "base_model" => Some(self.base_model.as_str()),
            "description" => Some(self.description.as_str()),
            "defects" => return Some(self.defects.to_string()),
            _ => None,
        };
        if let Some(value) = typed {
            return (!value.is_empty()).then(|| value.to_owned());
        }
        match self.attributes.get(name)? {
            serde_json::Value::String(s) if s.is_empty() => None,
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}
