use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Player identifier
pub type PlayerId = i64;

/// Music source identifier
pub type SourceId = i64;

/// Device found by SSDP discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Device description URL from the LOCATION header
    pub location: String,
    /// Search target (ST) the device answered for
    pub service_type: Option<String>,
    pub usn: Option<String>,
    pub cache_control: Option<String>,
    pub server: Option<String>,
    /// Every header, names upper-cased
    pub headers: BTreeMap<String, String>,
}

impl DeviceDescriptor {
    /// Host part of the location URL, used to open the command channel
    pub fn host(&self) -> Option<String> {
        extract_host(&self.location)
    }

    /// Seconds the announcement stays valid, from `CACHE-CONTROL: max-age=N`
    pub fn max_age(&self) -> Option<u64> {
        self.cache_control.as_deref()?.split(',').find_map(|directive| {
            let (name, value) = directive.split_once('=')?;
            if name.trim().eq_ignore_ascii_case("max-age") {
                value.trim().parse().ok()
            } else {
                None
            }
        })
    }
}

/// Extract the host from an `http://` or `https://` URL
pub fn extract_host(url: &str) -> Option<String> {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))?;
    let host = rest.split(['/', ':', '?']).next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

/// A speaker or receiver known to the HEOS system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub pid: PlayerId,
    /// Group the player belongs to, if any
    #[serde(default, deserialize_with = "opt_id")]
    pub gid: Option<String>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub version: String,
    /// `wired`, `wifi` or `unknown`
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default, deserialize_with = "opt_id")]
    pub lineout: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    pub control: Option<String>,
    #[serde(default)]
    pub serial: Option<String>,
}

/// Whether the account on the device is signed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    SignedIn,
    SignedOut,
}

/// `aid` values of `browse/add_to_queue`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddToQueueType {
    PlayNow = 1,
    PlayNext = 2,
    AddToEnd = 3,
    ReplaceAndPlay = 4,
}

impl fmt::Display for AddToQueueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

/// What `browse/add_to_queue` needs to append something to a queue.
///
/// Without a media id the whole container is added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub source_id: SourceId,
    pub container_id: String,
    pub media_id: Option<String>,
}

impl MediaRef {
    pub fn track(source_id: SourceId, container_id: impl Into<String>, media_id: impl Into<String>) -> Self {
        Self {
            source_id,
            container_id: container_id.into(),
            media_id: Some(media_id.into()),
        }
    }

    pub fn container(source_id: SourceId, container_id: impl Into<String>) -> Self {
        Self {
            source_id,
            container_id: container_id.into(),
            media_id: None,
        }
    }
}

/// One entry of a player queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    /// 1-based position; shifts whenever the queue changes
    pub qid: u32,
    #[serde(default)]
    pub song: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default, deserialize_with = "opt_id")]
    pub mid: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    pub album_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    pub sid: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    pub cid: Option<String>,
}

impl QueueItem {
    /// The reference needed to add this item again, if the device told us
    /// where it came from
    pub fn media_ref(&self) -> Option<MediaRef> {
        let source_id = self.sid.as_deref()?.parse().ok()?;
        Some(MediaRef {
            source_id,
            container_id: self.cid.clone()?,
            media_id: self.mid.clone(),
        })
    }
}

/// A music source (service, library, input, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MusicSource {
    pub sid: SourceId,
    pub name: String,
    #[serde(rename = "type", default)]
    pub source_type: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default, deserialize_with = "yes_true")]
    pub available: bool,
    #[serde(default)]
    pub service_username: Option<String>,
}

/// One entry returned by `browse/browse` or `browse/search`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseItem {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub item_type: String,
    #[serde(default, deserialize_with = "yes_true")]
    pub container: bool,
    #[serde(default, deserialize_with = "yes_true")]
    pub playable: bool,
    #[serde(default, deserialize_with = "opt_id")]
    pub cid: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    pub mid: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    pub sid: Option<String>,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
}

impl BrowseItem {
    /// Reference for adding this item to a queue, given the source and
    /// container it was browsed from
    pub fn media_ref(&self, source_id: SourceId, parent_container: &str) -> MediaRef {
        match (&self.cid, &self.mid) {
            (Some(cid), _) if self.container => MediaRef::container(source_id, cid.clone()),
            (_, Some(mid)) => MediaRef::track(source_id, parent_container, mid.clone()),
            _ => MediaRef::container(source_id, parent_container),
        }
    }
}

/// Ids arrive as numbers or strings depending on the verb
fn opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Flags arrive as `"yes"`/`"no"`, `"true"`/`"false"` or JSON booleans
fn yes_true<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Bool(b)) => b,
        Some(serde_json::Value::String(s)) => {
            s.eq_ignore_ascii_case("yes") || s.eq_ignore_ascii_case("true")
        }
        _ => false,
    })
}
