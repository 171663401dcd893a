//! Core types for the content cache
//!
//! Defines the records held by the cache:
//! - Collection and item identities
//! - Collection records (what "resolving" a collection finds)
//! - Content items (one element of a collection)
//! - Change events published on every write

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use ulid::Ulid;

/// Unique collection identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CollectionId(pub Ulid);

impl CollectionId {
    /// Generate new collection ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for CollectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CollectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CollectionId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

/// Unique content item identifier, stable across updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemId(pub Ulid);

impl ItemId {
    /// Generate new item ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ItemId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

/// Collection metadata as last reported by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRecord {
    /// Collection ID
    pub id: CollectionId,
    /// Display name
    pub name: String,
    /// Structure, e.g. `list`, `paired`, `list:paired`
    pub collection_type: String,
    /// Element count reported by the server (may exceed what is cached)
    pub element_count: u32,
    /// Whether the server has finished populating the collection
    pub populated: bool,
    /// Last server-side update
    pub update_time: DateTime<Utc>,
}

impl CollectionRecord {
    /// Create a populated `list` collection record
    #[must_use]
    pub fn new(name: impl Into<String>, element_count: u32) -> Self {
        Self {
            id: CollectionId::new(),
            name: name.into(),
            collection_type: "list".to_string(),
            element_count,
            populated: true,
            update_time: Utc::now(),
        }
    }

    /// With explicit ID
    #[inline]
    #[must_use]
    pub fn with_id(mut self, id: CollectionId) -> Self {
        self.id = id;
        self
    }

    /// With collection type
    #[inline]
    #[must_use]
    pub fn with_collection_type(mut self, collection_type: impl Into<String>) -> Self {
        self.collection_type = collection_type.into();
        self
    }

    /// Mark as still being populated
    #[inline]
    #[must_use]
    pub fn unpopulated(mut self) -> Self {
        self.populated = false;
        self
    }
}

/// Kind of element held by a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    /// A dataset
    #[default]
    Dataset,
    /// A nested collection
    Collection,
}

/// Processing state of an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    /// Created, not yet scheduled
    #[default]
    New,
    /// Waiting for a job slot
    Queued,
    /// Job running
    Running,
    /// Finished successfully
    Ok,
    /// Finished with an error
    Error,
    /// Held by the user or an upstream failure
    Paused,
    /// Materialized on demand only
    Deferred,
    /// Contents dropped; metadata kept
    Discarded,
}

impl ItemState {
    /// Whether the state can still change without user action
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::New | Self::Queued | Self::Running)
    }
}

/// One element of a collection
///
/// Everything except `id`, `parent_id` and `element_index` is payload the
/// watcher never interprets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Item ID
    pub id: ItemId,
    /// Owning collection
    pub parent_id: CollectionId,
    /// Zero-based position within the parent
    pub element_index: u32,
    /// Element name within the collection
    pub element_identifier: String,
    /// Dataset or nested collection
    pub kind: ElementKind,
    /// Processing state
    pub state: ItemState,
    /// Size in bytes, if known
    pub size: Option<u64>,
    /// Opaque nested metadata
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Last update
    pub update_time: DateTime<Utc>,
}

impl ContentItem {
    /// Create a new dataset element
    #[must_use]
    pub fn new(parent_id: CollectionId, element_index: u32, element_identifier: impl Into<String>) -> Self {
        Self {
            id: ItemId::new(),
            parent_id,
            element_index,
            element_identifier: element_identifier.into(),
            kind: ElementKind::Dataset,
            state: ItemState::New,
            size: None,
            metadata: serde_json::Map::new(),
            update_time: Utc::now(),
        }
    }

    /// With state
    #[inline]
    #[must_use]
    pub fn with_state(mut self, state: ItemState) -> Self {
        self.state = state;
        self
    }

    /// With element kind
    #[inline]
    #[must_use]
    pub fn with_kind(mut self, kind: ElementKind) -> Self {
        self.kind = kind;
        self
    }

    /// With size
    #[inline]
    #[must_use]
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Set a metadata field
    pub fn set_field(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// Get a metadata field
    #[inline]
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }
}

/// What a write did to the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// New item cached
    Inserted,
    /// Existing item replaced by a fresher copy
    Updated,
    /// Item dropped from the cache
    Removed,
    /// Collection record replaced
    CollectionUpdated,
}

impl ChangeKind {
    /// Whether the change can shift positions within the collection
    #[inline]
    #[must_use]
    pub fn is_structural(&self) -> bool {
        !matches!(self, Self::Updated)
    }
}

/// Notification published after every cache write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Collection the change belongs to
    pub collection_id: CollectionId,
    /// Affected item (absent for collection updates)
    pub item_id: Option<ItemId>,
    /// Position of the affected item
    pub element_index: Option<u32>,
    /// What happened
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub(crate) fn item(item: &ContentItem, kind: ChangeKind) -> Self {
        Self {
            collection_id: item.parent_id,
            item_id: Some(item.id),
            element_index: Some(item.element_index),
            kind,
        }
    }

    pub(crate) fn collection(collection_id: CollectionId) -> Self {
        Self {
            collection_id,
            item_id: None,
            element_index: None,
            kind: ChangeKind::CollectionUpdated,
        }
    }
}

/// Read request for a contiguous run of a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowQuery {
    /// Collection to read
    pub collection_id: CollectionId,
    /// First element index
    pub start_index: u32,
    /// Maximum number of items
    pub count: u32,
}

impl WindowQuery {
    /// Create window query
    #[inline]
    #[must_use]
    pub fn new(collection_id: CollectionId, start_index: u32, count: u32) -> Self {
        Self {
            collection_id,
            start_index,
            count,
        }
    }

    /// Last index covered, inclusive (`None` for an empty query)
    ///
    /// Clamped to `u32::MAX` so the top of the index range stays readable.
    #[inline]
    #[must_use]
    pub fn last_index(&self) -> Option<u32> {
        let span = self.count.checked_sub(1)?;
        Some(self.start_index.saturating_add(span))
    }

    /// Whether `index` falls inside the query
    #[inline]
    #[must_use]
    pub fn contains(&self, index: u32) -> bool {
        index
            .checked_sub(self.start_index)
            .is_some_and(|offset| offset < self.count)
    }
}
