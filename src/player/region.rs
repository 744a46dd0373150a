//! Riot routing values and upstream URLs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Platform (shard) a summoner lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Euw1,
    Eun1,
    Tr1,
    Ru,
    Me1,
    Na1,
    Br1,
    La1,
    La2,
    Oc1,
    Kr,
    Jp1,
    Ph2,
    Sg2,
    Th2,
    Tw2,
    Vn2,
}

impl Platform {
    /// All known platforms.
    pub const ALL: [Platform; 17] = [
        Self::Euw1,
        Self::Eun1,
        Self::Tr1,
        Self::Ru,
        Self::Me1,
        Self::Na1,
        Self::Br1,
        Self::La1,
        Self::La2,
        Self::Oc1,
        Self::Kr,
        Self::Jp1,
        Self::Ph2,
        Self::Sg2,
        Self::Th2,
        Self::Tw2,
        Self::Vn2,
    ];

    /// Lowercase platform code, as used in hostnames.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Euw1 => "euw1",
            Self::Eun1 => "eun1",
            Self::Tr1 => "tr1",
            Self::Ru => "ru",
            Self::Me1 => "me1",
            Self::Na1 => "na1",
            Self::Br1 => "br1",
            Self::La1 => "la1",
            Self::La2 => "la2",
            Self::Oc1 => "oc1",
            Self::Kr => "kr",
            Self::Jp1 => "jp1",
            Self::Ph2 => "ph2",
            Self::Sg2 => "sg2",
            Self::Th2 => "th2",
            Self::Tw2 => "tw2",
            Self::Vn2 => "vn2",
        }
    }

    /// Regional cluster serving the account API for this platform.
    pub fn regional(&self) -> RegionalRoute {
        match self {
            Self::Euw1 | Self::Eun1 | Self::Tr1 | Self::Ru | Self::Me1 => RegionalRoute::Europe,
            Self::Na1 | Self::Br1 | Self::La1 | Self::La2 | Self::Oc1 => RegionalRoute::Americas,
            Self::Kr
            | Self::Jp1
            | Self::Ph2
            | Self::Sg2
            | Self::Th2
            | Self::Tw2
            | Self::Vn2 => RegionalRoute::Asia,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Platform {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|platform| platform.code() == code)
            .ok_or_else(|| RelayError::InvalidRegion(s.to_string()))
    }
}

/// Regional routing cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionalRoute {
    Europe,
    Americas,
    Asia,
}

impl RegionalRoute {
    /// Lowercase route name, as used in hostnames.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Europe => "europe",
            Self::Americas => "americas",
            Self::Asia => "asia",
        }
    }
}

impl fmt::Display for RegionalRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Upstream URL builder.
///
/// `host_template` must contain `{route}`, replaced by a platform code or a
/// regional route name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoints {
    /// Base URL template.
    pub host_template: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            host_template: "https://{route}.api.riotgames.com".to_string(),
        }
    }
}

impl Endpoints {
    /// Create endpoints from a host template.
    pub fn new(host_template: impl Into<String>) -> Self {
        Self {
            host_template: host_template.into(),
        }
    }

    fn host(&self, route: &str) -> String {
        self.host_template.replace("{route}", route)
    }

    /// Account by Riot ID, on the regional cluster.
    pub fn account_url(&self, route: RegionalRoute, game_name: &str, tag_line: &str) -> String {
        format!(
            "{}/riot/account/v1/accounts/by-riot-id/{}/{}",
            self.host(route.code()),
            urlencoding::encode(game_name),
            urlencoding::encode(tag_line)
        )
    }

    /// Summoner profile by PUUID, on the platform.
    pub fn profile_url(&self, platform: Platform, puuid: &str) -> String {
        format!(
            "{}/lol/summoner/v4/summoners/by-puuid/{}",
            self.host(platform.code()),
            urlencoding::encode(puuid)
        )
    }

    /// Champion masteries by PUUID, on the platform.
    pub fn mastery_url(&self, platform: Platform, puuid: &str) -> String {
        format!(
            "{}/lol/champion-mastery/v4/champion-masteries/by-puuid/{}",
            self.host(platform.code()),
            urlencoding::encode(puuid)
        )
    }
}
