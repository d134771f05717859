//! Domain services and the seams to external collaborators

pub mod auth;
pub mod filter;
pub mod logging;
pub mod mediaserver;
pub mod message;
pub mod meta_cache;
pub mod metadata;
pub mod progress;
pub mod subtitle;
pub mod sync;
pub mod system;
pub mod transfer;
pub mod wallpaper;
pub mod words;

pub use auth::{AuthenticatedUser, SessionStore};
pub use filter::{FilterCandidate, FilterMatch, RuleFilter};
pub use logging::{LogBuffer, LogBufferLayer};
pub use mediaserver::{MediaServer, MediaSyncService, UnconfiguredMediaServer};
pub use message::{MessageCenter, MessageChannel, MessageService, UnconfiguredChannel};
pub use meta_cache::MetaCache;
pub use metadata::{MediaInfo, MetadataProvider, TmdbInfo, UnconfiguredMetadata};
pub use progress::ProgressRegistry;
pub use subtitle::{SubtitleProvider, UnconfiguredSubtitles};
pub use sync::SyncService;
pub use transfer::{FileTransfer, LocalFileTransfer, TransferOutcome, TransferRequest};
pub use wallpaper::WallpaperService;
pub use words::{WordsEngine, WordsOutcome};
