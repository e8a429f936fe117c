//! Campaign model

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Identifier of a campaign as assigned by the backend.
///
/// Backend ids are opaque strings (e.g. `"c1"`); locally created campaigns
/// use a UUID v7 so they sort by creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CampaignId(String);

impl CampaignId {
    /// Mint a new campaign id
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CampaignId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CampaignId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("campaign id cannot be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl TryFrom<String> for CampaignId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<CampaignId> for String {
    fn from(id: CampaignId) -> Self {
        id.0
    }
}

/// Game or page type of a campaign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CampaignType {
    #[default]
    Wheel,
    Quiz,
    Scratch,
    Jackpot,
    Form,
    Article,
}

impl CampaignType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wheel => "wheel",
            Self::Quiz => "quiz",
            Self::Scratch => "scratch",
            Self::Jackpot => "jackpot",
            Self::Form => "form",
            Self::Article => "article",
        }
    }
}

impl fmt::Display for CampaignType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Publication status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

/// Editable JSON sections of a campaign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CampaignSection {
    Config,
    Design,
    GameConfig,
    ArticleConfig,
    FormFields,
}

/// A marketing campaign as edited in the builder.
///
/// The section payloads are free-form JSON owned by the editor; this crate
/// only diffs, stores and ships them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: CampaignType,
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub design: Value,
    #[serde(default)]
    pub game_config: Value,
    #[serde(default)]
    pub article_config: Value,
    #[serde(default)]
    pub form_fields: Value,
    /// Server revision this state was based on
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub status: CampaignStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

impl Campaign {
    /// Create an empty, never-saved campaign
    #[must_use]
    pub fn new(name: impl Into<String>, kind: CampaignType) -> Self {
        Self {
            id: CampaignId::generate(),
            name: name.into(),
            kind,
            config: Value::Null,
            design: Value::Null,
            game_config: Value::Null,
            article_config: Value::Null,
            form_fields: Value::Null,
            revision: 0,
            status: CampaignStatus::Draft,
            created_by: None,
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    #[must_use]
    pub const fn section(&self, section: CampaignSection) -> &Value {
        match section {
            CampaignSection::Config => &self.config,
            CampaignSection::Design => &self.design,
            CampaignSection::GameConfig => &self.game_config,
            CampaignSection::ArticleConfig => &self.article_config,
            CampaignSection::FormFields => &self.form_fields,
        }
    }

    pub fn section_mut(&mut self, section: CampaignSection) -> &mut Value {
        match section {
            CampaignSection::Config => &mut self.config,
            CampaignSection::Design => &mut self.design,
            CampaignSection::GameConfig => &mut self.game_config,
            CampaignSection::ArticleConfig => &mut self.article_config,
            CampaignSection::FormFields => &mut self.form_fields,
        }
    }

    /// Serialized JSON size in bytes
    pub fn snapshot_size(&self) -> Result<usize> {
        Ok(serde_json::to_vec(self)?.len())
    }
}
