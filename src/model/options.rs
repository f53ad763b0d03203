//! Typed connection-string options shared by the URI codec and the driver options builder.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Read preference mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadPreference {
    /// Read from primary only.
    #[default]
    Primary,
    /// Read from primary, fall back to a secondary.
    PrimaryPreferred,
    /// Read from secondaries only.
    Secondary,
    /// Read from a secondary, fall back to the primary.
    SecondaryPreferred,
    /// Read from the member with the lowest latency.
    Nearest,
}

impl ReadPreference {
    pub const ALL: [ReadPreference; 5] = [
        Self::Primary,
        Self::PrimaryPreferred,
        Self::Secondary,
        Self::SecondaryPreferred,
        Self::Nearest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::PrimaryPreferred => "primaryPreferred",
            Self::Secondary => "secondary",
            Self::SecondaryPreferred => "secondaryPreferred",
            Self::Nearest => "nearest",
        }
    }
}

impl FromStr for ReadPreference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                Error::validation(
                    "readPreference",
                    "expected one of primary, primaryPreferred, secondary, secondaryPreferred, nearest",
                )
            })
    }
}

impl fmt::Display for ReadPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `readPreferenceTags` group: ordered `key:value` pairs.
pub type TagSet = Vec<(String, String)>;

/// Read concern level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadConcernLevel {
    Local,
    Majority,
    Linearizable,
    Available,
    Snapshot,
}

impl ReadConcernLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Majority => "majority",
            Self::Linearizable => "linearizable",
            Self::Available => "available",
            Self::Snapshot => "snapshot",
        }
    }
}

impl FromStr for ReadConcernLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        [
            Self::Local,
            Self::Majority,
            Self::Linearizable,
            Self::Available,
            Self::Snapshot,
        ]
        .into_iter()
        .find(|level| level.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| {
            Error::validation(
                "readConcernLevel",
                "expected one of local, majority, linearizable, available, snapshot",
            )
        })
    }
}

/// The `w` write concern component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WriteConcernW {
    /// Acknowledge writes from the given number of nodes.
    Nodes(u32),
    /// Tag set name, including the special `majority`.
    Tag(String),
}

impl WriteConcernW {
    /// Numeric values become node counts, anything else is a tag set name.
    pub fn parse(value: &str) -> Self {
        match value.parse::<u32>() {
            Ok(n) => Self::Nodes(n),
            Err(_) => Self::Tag(value.to_string()),
        }
    }

    pub fn is_majority(&self) -> bool {
        matches!(self, Self::Tag(tag) if tag == "majority")
    }
}

impl fmt::Display for WriteConcernW {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nodes(n) => write!(f, "{}", n),
            Self::Tag(tag) => f.write_str(tag),
        }
    }
}

/// Wire compression algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compressor {
    Snappy,
    Zlib,
}

impl Compressor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Snappy => "snappy",
            Self::Zlib => "zlib",
        }
    }
}

impl FromStr for Compressor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "snappy" => Ok(Self::Snappy),
            "zlib" => Ok(Self::Zlib),
            _ => Err(Error::validation(
                "compressors",
                "expected a comma-separated list of snappy, zlib",
            )),
        }
    }
}

/// Inclusive bounds accepted for `zlibCompressionLevel` (-1 selects the library default).
pub const ZLIB_LEVEL_RANGE: std::ops::RangeInclusive<i8> = -1..=9;

/// Binary subtype used for UUID values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UuidRepresentation {
    Unspecified,
    Standard,
    CsharpLegacy,
    JavaLegacy,
    PythonLegacy,
}

impl UuidRepresentation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::Standard => "standard",
            Self::CsharpLegacy => "csharpLegacy",
            Self::JavaLegacy => "javaLegacy",
            Self::PythonLegacy => "pythonLegacy",
        }
    }
}

impl FromStr for UuidRepresentation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        [
            Self::Unspecified,
            Self::Standard,
            Self::CsharpLegacy,
            Self::JavaLegacy,
            Self::PythonLegacy,
        ]
        .into_iter()
        .find(|repr| repr.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| {
            Error::validation(
                "uuidRepresentation",
                "expected one of unspecified, standard, csharpLegacy, javaLegacy, pythonLegacy",
            )
        })
    }
}

/// Everything in a connection string's query section that is not
/// authentication or TLS related.
///
/// `None` means "not specified": the driver's own default applies and the
/// option is left out of the serialized URI.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionOptions {
    pub replica_set: Option<String>,
    pub read_preference: ReadPreference,
    pub read_preference_tags: Vec<TagSet>,
    pub max_staleness_seconds: Option<u32>,
    pub read_concern_level: Option<ReadConcernLevel>,
    pub w: Option<WriteConcernW>,
    pub w_timeout_ms: Option<u64>,
    pub journal: Option<bool>,
    pub min_pool_size: Option<u32>,
    pub max_pool_size: Option<u32>,
    pub wait_queue_multiple: Option<u32>,
    pub wait_queue_timeout_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub socket_timeout_ms: Option<u64>,
    pub server_selection_timeout_ms: Option<u64>,
    pub server_selection_try_once: Option<bool>,
    pub heartbeat_frequency_ms: Option<u64>,
    pub local_threshold_ms: Option<u64>,
    pub max_idle_time_ms: Option<u64>,
    pub compressors: BTreeSet<Compressor>,
    pub zlib_compression_level: Option<i8>,
    pub app_name: Option<String>,
    pub retry_writes: Option<bool>,
    pub uuid_representation: Option<UuidRepresentation>,
    pub direct_connection: Option<bool>,
}

impl ConnectionOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(level) = self.zlib_compression_level
            && !ZLIB_LEVEL_RANGE.contains(&level)
        {
            return Err(Error::validation(
                "zlibCompressionLevel",
                "expected an integer between -1 and 9",
            ));
        }

        if self
            .replica_set
            .as_deref()
            .is_some_and(|name| name.is_empty())
        {
            return Err(Error::validation("replicaSet", "must not be empty"));
        }

        for tag_set in &self.read_preference_tags {
            if tag_set.iter().any(|(k, _)| k.is_empty()) {
                return Err(Error::validation(
                    "readPreferenceTags",
                    "tag keys must not be empty",
                ));
            }
        }

        if !self.read_preference_tags.is_empty() && self.read_preference == ReadPreference::Primary
        {
            return Err(Error::validation(
                "readPreferenceTags",
                "cannot be combined with readPreference primary",
            ));
        }

        Ok(())
    }
}
