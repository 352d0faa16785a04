//! Domain types persisted by the store: addresses, roster entries and messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;

// ── Addresses ────────────────────────────────────────────────────

/// An XMPP address of the form `local@domain/resource`.
///
/// The empty address (`Jid::default()`) stands for "unset", e.g. a message
/// whose sender has not been filled in yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Jid {
    local: Option<String>,
    domain: String,
    resource: Option<String>,
}

impl Jid {
    /// The address without its resource part.
    pub fn bare(&self) -> Jid {
        Jid {
            local: self.local.clone(),
            domain: self.domain.clone(),
            resource: None,
        }
    }

    pub fn localpart(&self) -> &str {
        self.local.as_deref().unwrap_or("")
    }

    pub fn domainpart(&self) -> &str {
        &self.domain
    }

    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.domain.is_empty()
    }

    pub fn is_bare(&self) -> bool {
        self.resource.is_none()
    }
}

impl FromStr for Jid {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Jid::default());
        }
        let invalid = || StoreError::InvalidAddress(s.to_string());

        let (addr, resource) = match s.split_once('/') {
            Some((_, "")) => return Err(invalid()),
            Some((addr, res)) => (addr, Some(res.to_string())),
            None => (s, None),
        };
        let (local, domain) = match addr.split_once('@') {
            Some(("", _)) => return Err(invalid()),
            Some((local, domain)) => (Some(local.to_string()), domain),
            None => (None, addr),
        };
        if domain.is_empty() || domain.contains('@') {
            return Err(invalid());
        }

        Ok(Jid {
            local,
            domain: domain.to_string(),
            resource,
        })
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(local) = &self.local {
            write!(f, "{local}@")?;
        }
        f.write_str(&self.domain)?;
        if let Some(res) = &self.resource {
            write!(f, "/{res}")?;
        }
        Ok(())
    }
}

impl TryFrom<String> for Jid {
    type Error = StoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Jid> for String {
    fn from(j: Jid) -> Self {
        j.to_string()
    }
}

// ── Roster ───────────────────────────────────────────────────────

/// Presence subscription state of a roster entry.
///
/// `Remove` only ever appears in roster pushes; it is an instruction to
/// delete the entry and is never written to the database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subscription {
    #[default]
    None,
    To,
    From,
    Both,
    Remove,
}

impl Subscription {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::To => "to",
            Self::From => "from",
            Self::Both => "both",
            Self::Remove => "remove",
        }
    }
}

impl FromStr for Subscription {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "" => Ok(Self::None),
            "to" => Ok(Self::To),
            "from" => Ok(Self::From),
            "both" => Ok(Self::Both),
            "remove" => Ok(Self::Remove),
            other => Err(StoreError::UnknownValue {
                field: "subscription",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contact list entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterItem {
    pub jid: Jid,
    pub name: String,
    pub subscription: Subscription,
    #[serde(default)]
    pub groups: Vec<String>,
}

impl RosterItem {
    pub fn new(jid: Jid, name: impl Into<String>, subscription: Subscription) -> Self {
        Self {
            jid,
            name: name.into(),
            subscription,
            groups: Vec::new(),
        }
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }
}

// ── Messages ─────────────────────────────────────────────────────

/// The `type` attribute of a message stanza.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Normal,
    Chat,
    GroupChat,
    Headline,
    Error,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Chat => "chat",
            Self::GroupChat => "groupchat",
            Self::Headline => "headline",
            Self::Error => "error",
        }
    }
}

impl FromStr for MessageType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" | "" => Ok(Self::Normal),
            "chat" => Ok(Self::Chat),
            "groupchat" => Ok(Self::GroupChat),
            "headline" => Ok(Self::Headline),
            "error" => Ok(Self::Error),
            other => Err(StoreError::UnknownValue {
                field: "message type",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stanza id stamped on a message by some entity (usually an archive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StanzaId {
    pub id: String,
    pub by: Jid,
}

impl StanzaId {
    pub fn new(id: impl Into<String>, by: Jid) -> Self {
        Self { id: id.into(), by }
    }
}

/// A chat message as seen on the wire, before it is stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// True if the local account sent this message.
    pub sent: bool,
    pub to: Jid,
    pub from: Jid,
    /// The protocol `id` attribute.
    pub id: String,
    /// Client assigned idempotency token.
    pub origin_id: Option<String>,
    pub body: String,
    pub msg_type: MessageType,
    /// Server asserted delivery time, if any.
    pub delay: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stanza_ids: Vec<StanzaId>,
}

impl ChatMessage {
    /// The bare address of the other party in the conversation.
    pub fn roster_jid(&self) -> Jid {
        if self.sent {
            self.to.bare()
        } else {
            self.from.bare()
        }
    }

    /// The id assigned by the archive of `account`, if the message carries one.
    pub fn archive_id(&self, account: &Jid) -> Option<&str> {
        let account = account.bare();
        self.stanza_ids
            .iter()
            .find(|sid| sid.by.bare() == account)
            .map(|sid| sid.id.as_str())
    }

    /// The dedup token: the origin id, or the protocol id when none was set.
    pub fn dedup_id(&self) -> Option<&str> {
        match self.origin_id.as_deref() {
            Some(origin) if !origin.is_empty() => Some(origin),
            _ if !self.id.is_empty() => Some(self.id.as_str()),
            _ => None,
        }
    }
}

/// A message row read back from history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub sent: bool,
    pub to: Jid,
    pub from: Jid,
    pub id: String,
    pub origin_id: Option<String>,
    pub body: String,
    pub msg_type: MessageType,
    pub delay: DateTime<Utc>,
    pub archive_id: Option<String>,
    pub received: bool,
}

/// Where archive backfill for one conversation should resume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveCursor {
    pub jid: Jid,
    pub archive_id: String,
    pub delay: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_address() {
        let j: Jid = "juliet@example.com/balcony".parse().unwrap();
        assert_eq!(j.localpart(), "juliet");
        assert_eq!(j.domainpart(), "example.com");
        assert_eq!(j.resource(), Some("balcony"));
        assert_eq!(j.bare().to_string(), "juliet@example.com");
        assert_eq!(j.to_string(), "juliet@example.com/balcony");
    }

    #[test]
    fn parse_domain_only() {
        let j: Jid = "example.com".parse().unwrap();
        assert_eq!(j.localpart(), "");
        assert_eq!(j.domainpart(), "example.com");
        assert!(j.is_bare());
    }

    #[test]
    fn parse_empty_is_unset() {
        let j: Jid = "".parse().unwrap();
        assert!(j.is_empty());
        assert_eq!(j, Jid::default());
    }

    #[test]
    fn parse_rejects_malformed() {
        for bad in ["@example.com", "a@", "a@b@c", "a@b/", "/res"] {
            assert!(bad.parse::<Jid>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn resource_may_contain_slash_and_at() {
        let j: Jid = "a@b/c/d@e".parse().unwrap();
        assert_eq!(j.resource(), Some("c/d@e"));
    }

    #[test]
    fn roster_jid_follows_direction() {
        let mut msg = ChatMessage {
            to: "romeo@example.net/orchard".parse().unwrap(),
            from: "juliet@example.com/balcony".parse().unwrap(),
            ..Default::default()
        };
        assert_eq!(msg.roster_jid().to_string(), "juliet@example.com");
        msg.sent = true;
        assert_eq!(msg.roster_jid().to_string(), "romeo@example.net");
    }

    #[test]
    fn archive_id_only_from_own_archive() {
        let account: Jid = "romeo@example.net/orchard".parse().unwrap();
        let msg = ChatMessage {
            stanza_ids: vec![
                StanzaId::new("muc-1", "room@muc.example.net".parse().unwrap()),
                StanzaId::new("mine-7", "romeo@example.net".parse().unwrap()),
            ],
            ..Default::default()
        };
        assert_eq!(msg.archive_id(&account), Some("mine-7"));

        let other: Jid = "juliet@example.com".parse().unwrap();
        assert_eq!(msg.archive_id(&other), None);
    }

    #[test]
    fn dedup_id_falls_back_to_protocol_id() {
        let mut msg = ChatMessage {
            id: "stanza-1".to_string(),
            ..Default::default()
        };
        assert_eq!(msg.dedup_id(), Some("stanza-1"));
        msg.origin_id = Some("origin-1".to_string());
        assert_eq!(msg.dedup_id(), Some("origin-1"));
        msg.origin_id = None;
        msg.id.clear();
        assert_eq!(msg.dedup_id(), None);
    }

    #[test]
    fn enum_strings_roundtrip() {
        for sub in [
            Subscription::None,
            Subscription::To,
            Subscription::From,
            Subscription::Both,
            Subscription::Remove,
        ] {
            assert_eq!(sub.as_str().parse::<Subscription>().unwrap(), sub);
        }
        assert_eq!("groupchat".parse::<MessageType>().unwrap(), MessageType::GroupChat);
        assert!("bogus".parse::<MessageType>().is_err());
    }
}
