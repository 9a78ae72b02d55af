use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use tokio::sync::broadcast;
use tracing::debug;

use crate::game::GameSnapshot;
use crate::points::{PointsQuest, PointsUpdate};
use crate::progression::{Player, ProgressionSignal};
use crate::quest::Quest;
use crate::reward::Reward;

// ============================================================================
// Server -> Client Events
// ============================================================================

/// A state change announced to every connected dashboard.
///
/// Serializes as the bare payload; the wire name comes from [`SyncEvent::name`].
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SyncEvent {
    QuestCreated(Quest),
    QuestAccepted(Quest),
    #[serde(rename_all = "camelCase")]
    QuestCompleted {
        quest: Quest,
        level: u32,
        xp: u64,
        gems: u64,
        signals: Vec<ProgressionSignal>,
    },
    #[serde(rename_all = "camelCase")]
    QuestDeleted { quest_id: String },
    RewardCreated(Reward),
    RewardUnlocked(Reward),
    RewardClaimed(Reward),
    #[serde(rename_all = "camelCase")]
    RewardDeleted { reward_id: String },
    #[serde(rename_all = "camelCase")]
    PlayerUpdated { player: Player, pet_name: Option<String> },
    /// Full state, sent only to the client that asked for it
    StateSnapshot(Box<GameSnapshot>),

    // Points board
    PointsQuestCreated(PointsQuest),
    PointsQuestCompleted(PointsUpdate),
    PointsQuestUncompleted(PointsUpdate),
    #[serde(rename_all = "camelCase")]
    PointsQuestDeleted { quest_id: i64 },
    #[serde(rename_all = "camelCase")]
    PointsUpdated { total_points: i64 },
}

impl SyncEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SyncEvent::QuestCreated(_) | SyncEvent::PointsQuestCreated(_) => "quest:created",
            SyncEvent::QuestAccepted(_) => "quest:accepted",
            SyncEvent::QuestCompleted { .. } | SyncEvent::PointsQuestCompleted(_) => "quest:completed",
            SyncEvent::PointsQuestUncompleted(_) => "quest:uncompleted",
            SyncEvent::QuestDeleted { .. } | SyncEvent::PointsQuestDeleted { .. } => "quest:deleted",
            SyncEvent::RewardCreated(_) => "reward:created",
            SyncEvent::RewardUnlocked(_) => "reward:unlocked",
            SyncEvent::RewardClaimed(_) => "reward:claimed",
            SyncEvent::RewardDeleted { .. } => "reward:deleted",
            SyncEvent::PlayerUpdated { .. } => "player:updated",
            SyncEvent::StateSnapshot(_) => "state:snapshot",
            SyncEvent::PointsUpdated { .. } => "points:updated",
        }
    }
}

/// Event envelope as it goes over the wire
#[derive(Debug, Clone)]
pub struct SyncMessage {
    pub event: SyncEvent,
    /// Game state revision after the mutation; absent for points board events
    pub revision: Option<u64>,
    pub emitted_at: DateTime<Utc>,
}

impl SyncMessage {
    pub fn new(event: SyncEvent, revision: Option<u64>) -> Self {
        Self {
            event,
            revision,
            emitted_at: Utc::now(),
        }
    }
}

impl Serialize for SyncMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("SyncMessage", 4)?;
        state.serialize_field("type", self.event.name())?;
        state.serialize_field("payload", &self.event)?;
        match self.revision {
            Some(revision) => state.serialize_field("revision", &revision)?,
            None => state.skip_field("revision")?,
        }
        state.serialize_field("emittedAt", &self.emitted_at)?;
        state.end()
    }
}

// ============================================================================
// Client -> Server Messages
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Ask for a full `state:snapshot`, e.g. after missing events
    Refresh,
}

// ============================================================================
// Broadcaster
// ============================================================================

/// Fire-and-forget fan-out to WebSocket clients.
///
/// Sending never fails and never waits: with no subscribers the event is
/// dropped, and a subscriber that falls behind the channel capacity loses
/// the oldest events.
#[derive(Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<SyncMessage>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncMessage> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Emit an event that is not tied to a game revision
    pub fn emit(&self, event: SyncEvent) {
        self.send(SyncMessage::new(event, None));
    }

    /// Emit the events of one committed game mutation
    pub fn emit_all(&self, revision: u64, events: Vec<SyncEvent>) {
        for event in events {
            self.send(SyncMessage::new(event, Some(revision)));
        }
    }

    fn send(&self, msg: SyncMessage) {
        debug!(
            "Broadcasting {} (revision {:?}) to {} receivers",
            msg.event.name(),
            msg.revision,
            self.tx.receiver_count()
        );
        // Ignore send errors (no receivers)
        let _ = self.tx.send(msg);
    }
}

// ============================================================================
// Encoding/Decoding
// ============================================================================

pub fn encode_json(msg: &SyncMessage) -> Result<String, String> {
    serde_json::to_string(msg).map_err(|e| format!("Failed to encode message: {}", e))
}

/// Encode as a MessagePack array: [type, payload, revision]
pub fn encode_msgpack(msg: &SyncMessage) -> Result<Vec<u8>, String> {
    // Named encoding keeps payload structs as maps
    rmp_serde::to_vec_named(&(msg.event.name(), &msg.event, msg.revision))
        .map_err(|e| format!("Failed to encode message: {}", e))
}

pub fn decode_client_text(text: &str) -> Result<ClientMessage, String> {
    serde_json::from_str(text).map_err(|e| format!("Failed to decode message: {}", e))
}

/// Decode a binary frame: either `{"type": ..}` or `[type, ..]` in MessagePack
pub fn decode_client_binary(data: &[u8]) -> Result<ClientMessage, String> {
    use rmpv::Value;
    use std::io::Cursor;

    let value = rmpv::decode::read_value(&mut Cursor::new(data))
        .map_err(|e| format!("Failed to decode MessagePack: {}", e))?;

    let msg_type = match &value {
        Value::Array(items) => items.first().and_then(|v| v.as_str()),
        Value::Map(entries) => entries
            .iter()
            .find(|(k, _)| k.as_str() == Some("type"))
            .and_then(|(_, v)| v.as_str()),
        _ => None,
    }
    .ok_or("Message type must be string")?;

    match msg_type {
        "refresh" => Ok(ClientMessage::Refresh),
        _ => Err(format!("Unknown message type: {}", msg_type)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::{NewQuest, Quest};

    fn sample_quest() -> Quest {
        Quest::from_new(
            NewQuest {
                name: "Feed the cat".to_string(),
                description: "Fill the bowl".to_string(),
                xp_reward: 10,
                ..NewQuest::default()
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_json_envelope_shape() {
        let quest = sample_quest();
        let msg = SyncMessage::new(SyncEvent::QuestCreated(quest.clone()), Some(7));
        let json: serde_json::Value = serde_json::from_str(&encode_json(&msg).unwrap()).unwrap();

        assert_eq!(json["type"], "quest:created");
        assert_eq!(json["revision"], 7);
        assert_eq!(json["payload"]["id"], quest.id);
        assert_eq!(json["payload"]["xpReward"], 10);
        assert!(json["emittedAt"].is_string());
    }

    #[test]
    fn test_points_events_have_no_revision() {
        let msg = SyncMessage::new(SyncEvent::PointsUpdated { total_points: 40 }, None);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "points:updated");
        assert_eq!(json["payload"]["totalPoints"], 40);
        assert!(json.get("revision").is_none());
    }

    #[test]
    fn test_msgpack_frame() {
        let msg = SyncMessage::new(SyncEvent::QuestDeleted { quest_id: "q1".to_string() }, Some(3));
        let bytes = encode_msgpack(&msg).unwrap();

        let value = rmpv::decode::read_value(&mut std::io::Cursor::new(bytes)).unwrap();
        let array = value.as_array().unwrap();
        assert_eq!(array[0].as_str(), Some("quest:deleted"));
        let payload = array[1].as_map().unwrap();
        assert_eq!(payload[0].0.as_str(), Some("questId"));
        assert_eq!(payload[0].1.as_str(), Some("q1"));
        assert_eq!(array[2].as_u64(), Some(3));
    }

    #[test]
    fn test_decode_client_messages() {
        assert_eq!(decode_client_text(r#"{"type":"refresh"}"#).unwrap(), ClientMessage::Refresh);
        assert!(decode_client_text(r#"{"type":"attack"}"#).is_err());

        #[derive(Serialize)]
        struct Raw {
            r#type: &'static str,
        }
        let bytes = rmp_serde::to_vec_named(&Raw { r#type: "refresh" }).unwrap();
        assert_eq!(decode_client_binary(&bytes).unwrap(), ClientMessage::Refresh);

        let bytes = rmp_serde::to_vec(&("refresh",)).unwrap();
        assert_eq!(decode_client_binary(&bytes).unwrap(), ClientMessage::Refresh);

        let bytes = rmp_serde::to_vec(&("dance",)).unwrap();
        assert!(decode_client_binary(&bytes).is_err());
    }

    #[tokio::test]
    async fn test_emit_without_receivers_is_silent() {
        let broadcaster = Broadcaster::new(4);
        broadcaster.emit(SyncEvent::PointsUpdated { total_points: 1 });

        let mut rx = broadcaster.subscribe();
        broadcaster.emit_all(
            2,
            vec![
                SyncEvent::QuestDeleted { quest_id: "a".to_string() },
                SyncEvent::RewardDeleted { reward_id: "b".to_string() },
            ],
        );
        let first = rx.recv().await.unwrap();
        assert_eq!(first.event.name(), "quest:deleted");
        assert_eq!(first.revision, Some(2));
        assert_eq!(rx.recv().await.unwrap().event.name(), "reward:deleted");
    }

    #[tokio::test]
    async fn test_slow_receiver_lags() {
        let broadcaster = Broadcaster::new(2);
        let mut rx = broadcaster.subscribe();
        for i in 0..5 {
            broadcaster.emit(SyncEvent::PointsUpdated { total_points: i });
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(3))
        ));
    }
}
