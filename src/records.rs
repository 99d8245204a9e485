use std::collections::BTreeMap;

/// A scalar value attached to an action or event's `extra` map. Strings and
/// numbers cover everything the source's free-form `extra` dict actually
/// carries (loan ids, amounts, prices, cycle numbers).
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum ExtraValue {
    Number(f64),
    Text(String),
}

impl From<f64> for ExtraValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i64> for ExtraValue {
    fn from(v: i64) -> Self {
        Self::Number(v as f64)
    }
}

impl From<String> for ExtraValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for ExtraValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

pub type Extra = BTreeMap<String, ExtraValue>;

/// One agent action taken during a tick.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ActionInfo {
    pub message: String,
    pub agent_id: String,
    pub time: i64,
    #[serde(rename = "type")]
    pub type_: String,
    pub extra: Extra,
}

/// One event emitted by the environment or a pool during a tick.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct EventInfo {
    pub message: String,
    pub time: i64,
    #[serde(rename = "type")]
    pub type_: String,
    pub extra: Extra,
}
