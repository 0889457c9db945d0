//! Source → destination channel pairs.

use serde::{Deserialize, Deserializer, Serialize};

use crate::gateway::ChannelId;

/// One donor channel relayed to one or more recipients.
///
/// Accepts both `donorId` (HTTP API) and `donor_id` (YAML config). Channel ids
/// may be given as numbers or numeric strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelPair {
    pub id: String,
    #[serde(alias = "donor_id", deserialize_with = "channel_id")]
    pub donor_id: ChannelId,
    #[serde(alias = "recipient_ids", deserialize_with = "channel_ids")]
    pub recipient_ids: Vec<ChannelId>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Number(i64),
    Text(String),
}

impl IdRepr {
    fn parse<E: serde::de::Error>(self) -> Result<ChannelId, E> {
        match self {
            IdRepr::Number(n) => Ok(n),
            IdRepr::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid channel id '{s}'"))),
        }
    }
}

fn channel_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ChannelId, D::Error> {
    IdRepr::deserialize(deserializer)?.parse()
}

fn channel_ids<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<ChannelId>, D::Error> {
    Vec::<IdRepr>::deserialize(deserializer)?
        .into_iter()
        .map(IdRepr::parse)
        .collect()
}
