//! Player data types.
//!
//! Upstream DTOs mirror the Riot JSON and stay private to the crate; the
//! public types are what gets cached and served.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::player::Platform;

/// Riot account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Globally unique player id.
    pub puuid: String,
    /// Riot ID name part.
    pub game_name: String,
    /// Riot ID tag part.
    pub tag_line: String,
}

impl Account {
    /// `game_name#tag_line`.
    pub fn riot_id(&self) -> String {
        format!("{}#{}", self.game_name, self.tag_line)
    }
}

/// Summoner profile on one platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Encrypted summoner id, when the upstream still reports it.
    pub id: Option<String>,
    /// Summoner level.
    pub level: u32,
    /// Profile icon id.
    pub icon_id: u32,
}

/// Mastery of one champion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mastery {
    pub champion_id: u32,
    pub level: u32,
    pub points: u64,
    /// Unix milliseconds.
    pub last_played_at: i64,
    pub points_since_last_level: u64,
    pub points_until_next_level: i64,
    pub tokens_earned: u32,
}

/// Assembled player data, cached as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub account: Account,
    pub profile: Profile,
    pub masteries: Vec<Mastery>,
    pub region: Platform,
    pub loaded_at: DateTime<Utc>,
}

impl PlayerRecord {
    /// Mastery entry for `champion_id`, if the player has one.
    pub fn mastery_for(&self, champion_id: u32) -> Option<&Mastery> {
        self.masteries.iter().find(|m| m.champion_id == champion_id)
    }

    /// Sum of mastery points over every champion.
    pub fn total_points(&self) -> u64 {
        self.masteries.iter().map(|m| m.points).sum()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SummonerDto {
    #[serde(default)]
    id: Option<String>,
    profile_icon_id: u32,
    summoner_level: u32,
}

impl From<SummonerDto> for Profile {
    fn from(dto: SummonerDto) -> Self {
        Self {
            id: dto.id,
            level: dto.summoner_level,
            icon_id: dto.profile_icon_id,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MasteryDto {
    champion_id: u32,
    champion_level: u32,
    champion_points: u64,
    #[serde(default)]
    last_play_time: i64,
    #[serde(default)]
    champion_points_since_last_level: u64,
    #[serde(default)]
    champion_points_until_next_level: i64,
    #[serde(default)]
    tokens_earned: u32,
}

impl From<MasteryDto> for Mastery {
    fn from(dto: MasteryDto) -> Self {
        Self {
            champion_id: dto.champion_id,
            level: dto.champion_level,
            points: dto.champion_points,
            last_played_at: dto.last_play_time,
            points_since_last_level: dto.champion_points_since_last_level,
            points_until_next_level: dto.champion_points_until_next_level,
            tokens_earned: dto.tokens_earned,
        }
    }
}
