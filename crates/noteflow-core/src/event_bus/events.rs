//! Event type definitions for the event bus.
//!
//! This module defines the closed catalog of application events. Each event
//! has a `namespace:action` wire name and exactly one payload type, bound
//! together at compile time through the [`Event`] trait.
//!
//! Payloads are plain cloneable records. State-change payloads carry an
//! epoch-millisecond `timestamp`; entity payloads carry the entity id and,
//! where the entity can live in a folder, a `folder_id` that serializes as
//! `null` when the entity is unfiled.

use serde::{Deserialize, Serialize};

/// A payload type bound to exactly one [`EventName`].
pub trait Event: Clone + Send + Sync + 'static {
    /// The wire name of this event.
    const NAME: EventName;

    /// Wrap this payload into the application event sum type.
    fn into_app_event(self) -> AppEvent;

    /// Borrow the payload back out of an [`AppEvent`], if it carries this type.
    fn from_app_event(event: &AppEvent) -> Option<&Self>;
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

macro_rules! event_registry {
    ($(
        $(#[$doc:meta])*
        $variant:ident => $name:literal, $payload:ident;
    )*) => {
        /// Name of every event in the catalog.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum EventName {
            $(
                $(#[$doc])*
                #[serde(rename = $name)]
                $variant,
            )*
        }

        impl EventName {
            /// Every event name, in catalog order.
            pub const ALL: &'static [EventName] = &[$(EventName::$variant,)*];

            /// The `namespace:action` wire string.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(EventName::$variant => $name,)*
                }
            }

            /// Resolve a wire string. Unknown names resolve to `None`.
            pub fn parse(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(EventName::$variant),)*
                    _ => None,
                }
            }
        }

        /// Root event enum for all application events
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(tag = "event", content = "data")]
        pub enum AppEvent {
            $(
                $(#[$doc])*
                #[serde(rename = $name)]
                $variant($payload),
            )*
        }

        impl AppEvent {
            /// Get the name of this event
            pub fn name(&self) -> EventName {
                match self {
                    $(AppEvent::$variant(_) => EventName::$variant,)*
                }
            }
        }

        $(
            impl Event for $payload {
                const NAME: EventName = EventName::$variant;

                fn into_app_event(self) -> AppEvent {
                    AppEvent::$variant(self)
                }

                fn from_app_event(event: &AppEvent) -> Option<&Self> {
                    match event {
                        AppEvent::$variant(payload) => Some(payload),
                        _ => None,
                    }
                }
            }

            impl From<$payload> for AppEvent {
                fn from(payload: $payload) -> Self {
                    AppEvent::$variant(payload)
                }
            }
        )*
    };
}

event_registry! {
    /// A note was created.
    NoteCreated => "note:created", NoteCreated;
    /// A note's content or metadata changed.
    NoteUpdated => "note:updated", NoteUpdated;
    /// A note was deleted.
    NoteDeleted => "note:deleted", NoteDeleted;
    /// A note moved between folders.
    NoteMoved => "note:moved", NoteMoved;
    /// A folder was created.
    FolderCreated => "folder:created", FolderCreated;
    /// A folder was renamed or re-parented.
    FolderUpdated => "folder:updated", FolderUpdated;
    /// A folder was deleted.
    FolderDeleted => "folder:deleted", FolderDeleted;
    /// A photo was uploaded.
    PhotoUploaded => "photo:uploaded", PhotoUploaded;
    /// A photo was deleted.
    PhotoDeleted => "photo:deleted", PhotoDeleted;
    /// A link was saved.
    LinkCreated => "link:created", LinkCreated;
    /// A link was deleted.
    LinkDeleted => "link:deleted", LinkDeleted;
    /// A label was created.
    LabelCreated => "label:created", LabelCreated;
    /// A label was deleted.
    LabelDeleted => "label:deleted", LabelDeleted;
    /// A label was attached to an entity.
    LabelAssigned => "label:assigned", LabelAssigned;
    /// Labels were suggested for an entity by the classifier.
    LabelClassified => "label:classified", LabelClassified;
    /// A file was uploaded.
    FileUploaded => "file:uploaded", FileUploaded;
    /// A file was deleted.
    FileDeleted => "file:deleted", FileDeleted;
    /// A search query ran.
    SearchPerformed => "search:performed", SearchPerformed;
    /// The bus finished construction.
    SystemInitialized => "system:initialized", SystemInitialized;
    /// A listener was disabled by its circuit breaker.
    SystemListenerError => "system:listener_error", ListenerErrorEvent;
    /// A storage adapter reported a failure.
    SystemStorageError => "system:storage_error", StorageErrorEvent;
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventName::parse(s).ok_or_else(|| format!("unknown event name: {}", s))
    }
}

impl EventName {
    /// The namespace half of the name (`note` for `note:created`).
    pub fn namespace(self) -> &'static str {
        self.as_str().split(':').next().unwrap_or_default()
    }
}

/// Note creation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteCreated {
    /// Identifier of the new note.
    pub note_id: String,
    /// Containing folder, `None` when unfiled.
    pub folder_id: Option<String>,
    /// Note title.
    pub title: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// Note update payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteUpdated {
    /// Identifier of the note.
    pub note_id: String,
    /// Containing folder, `None` when unfiled.
    pub folder_id: Option<String>,
    /// Names of the fields that changed.
    pub changes: Vec<String>,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// Note deletion payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteDeleted {
    /// Identifier of the note.
    pub note_id: String,
    /// Folder the note lived in, `None` when unfiled.
    pub folder_id: Option<String>,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// Note move payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteMoved {
    /// Identifier of the note.
    pub note_id: String,
    /// Previous folder, `None` when it was unfiled.
    pub from_folder_id: Option<String>,
    /// New folder, `None` when it is now unfiled.
    pub to_folder_id: Option<String>,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// Folder creation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderCreated {
    /// Identifier of the new folder.
    pub folder_id: String,
    /// Display name.
    pub name: String,
    /// Parent folder, `None` at the top level.
    pub parent_id: Option<String>,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// Folder update payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderUpdated {
    /// Identifier of the folder.
    pub folder_id: String,
    /// Display name after the update.
    pub name: String,
    /// Parent folder after the update.
    pub parent_id: Option<String>,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// Folder deletion payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderDeleted {
    /// Identifier of the folder.
    pub folder_id: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// Photo upload payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoUploaded {
    /// Identifier of the photo.
    pub photo_id: String,
    /// Containing folder, `None` when unfiled.
    pub folder_id: Option<String>,
    /// Original file name.
    pub file_name: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// Photo deletion payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoDeleted {
    /// Identifier of the photo.
    pub photo_id: String,
    /// Folder the photo lived in, `None` when unfiled.
    pub folder_id: Option<String>,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// Link creation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkCreated {
    /// Identifier of the link.
    pub link_id: String,
    /// Containing folder, `None` when unfiled.
    pub folder_id: Option<String>,
    /// Target URL.
    pub url: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// Link deletion payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkDeleted {
    /// Identifier of the link.
    pub link_id: String,
    /// Folder the link lived in, `None` when unfiled.
    pub folder_id: Option<String>,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// Label creation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelCreated {
    /// Identifier of the label.
    pub label_id: String,
    /// Display name.
    pub name: String,
    /// Display color, e.g. `#ffaa00`.
    pub color: Option<String>,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// Label deletion payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelDeleted {
    /// Identifier of the label.
    pub label_id: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// Label assignment payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelAssigned {
    /// Identifier of the label.
    pub label_id: String,
    /// Identifier of the labelled note, photo, link or file.
    pub entity_id: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// Classifier result payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelClassified {
    /// Identifier of the classified entity.
    pub entity_id: String,
    /// Suggested label names, most confident first.
    pub labels: Vec<String>,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// File upload payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUploaded {
    /// Identifier of the file.
    pub file_id: String,
    /// Containing folder, `None` when unfiled.
    pub folder_id: Option<String>,
    /// Original file name.
    pub file_name: String,
    /// MIME type reported by the uploader.
    pub mime_type: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// File deletion payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDeleted {
    /// Identifier of the file.
    pub file_id: String,
    /// Folder the file lived in, `None` when unfiled.
    pub folder_id: Option<String>,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// Search payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPerformed {
    /// The raw query string.
    pub query: String,
    /// Number of hits returned.
    pub result_count: usize,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// System pulse emitted once after bus construction. Carries no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SystemInitialized;

/// Raised when a listener's circuit breaker opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerErrorEvent {
    /// The event whose listener kept failing.
    pub event: EventName,
    /// The last error reported by the listener.
    pub error: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// Raised by storage adapters when a CRUD call fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageErrorEvent {
    /// The failed operation, e.g. `note.save`.
    pub operation: String,
    /// Error message from the adapter.
    pub error: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

fn folder_label(folder_id: &Option<String>) -> &str {
    folder_id.as_deref().unwrap_or("unfiled")
}

impl AppEvent {
    /// Get a short description of this event for logging
    pub fn description(&self) -> String {
        match self {
            AppEvent::NoteCreated(e) => {
                format!("Note {} created in {}", e.note_id, folder_label(&e.folder_id))
            }
            AppEvent::NoteUpdated(e) => {
                format!("Note {} updated ({})", e.note_id, e.changes.join(", "))
            }
            AppEvent::NoteDeleted(e) => format!("Note {} deleted", e.note_id),
            AppEvent::NoteMoved(e) => format!(
                "Note {} moved from {} to {}",
                e.note_id,
                folder_label(&e.from_folder_id),
                folder_label(&e.to_folder_id)
            ),
            AppEvent::FolderCreated(e) => format!("Folder {} ({}) created", e.folder_id, e.name),
            AppEvent::FolderUpdated(e) => format!("Folder {} renamed to {}", e.folder_id, e.name),
            AppEvent::FolderDeleted(e) => format!("Folder {} deleted", e.folder_id),
            AppEvent::PhotoUploaded(e) => {
                format!("Photo {} uploaded ({} bytes)", e.file_name, e.size_bytes)
            }
            AppEvent::PhotoDeleted(e) => format!("Photo {} deleted", e.photo_id),
            AppEvent::LinkCreated(e) => format!("Link {} saved", e.url),
            AppEvent::LinkDeleted(e) => format!("Link {} deleted", e.link_id),
            AppEvent::LabelCreated(e) => format!("Label {} created", e.name),
            AppEvent::LabelDeleted(e) => format!("Label {} deleted", e.label_id),
            AppEvent::LabelAssigned(e) => {
                format!("Label {} assigned to {}", e.label_id, e.entity_id)
            }
            AppEvent::LabelClassified(e) => {
                format!("{} classified as [{}]", e.entity_id, e.labels.join(", "))
            }
            AppEvent::FileUploaded(e) => {
                format!("File {} uploaded ({})", e.file_name, e.mime_type)
            }
            AppEvent::FileDeleted(e) => format!("File {} deleted", e.file_id),
            AppEvent::SearchPerformed(e) => {
                format!("Search '{}' returned {} results", e.query, e.result_count)
            }
            AppEvent::SystemInitialized(_) => "Event bus initialized".to_string(),
            AppEvent::SystemListenerError(e) => {
                format!("Listener for {} disabled: {}", e.event, e.error)
            }
            AppEvent::SystemStorageError(e) => {
                format!("Storage {} failed: {}", e.operation, e.error)
            }
        }
    }
}
