//! tagrw-host: runtime for reading and overwriting NFC tags
//!
//! The permission gate, record codec, URL normalizer and the session state
//! machine, plus the driver loop, transport seam, observer sinks and the
//! offline asset cache around them.
//!
//! ```rust
//! use std::sync::Arc;
//! use tagrw_api::{Detection, NdefMessage, PermissionState, TagRecord};
//! use tagrw_host::{MemoryObserver, PermissionGate, SimulatedReader, TagSession};
//!
//! # tokio_test_block_on(async {
//! let observer = Arc::new(MemoryObserver::new());
//! let mut session = TagSession::new(
//!     PermissionGate::new("nfc", PermissionState::Granted),
//!     Arc::new(SimulatedReader::new()),
//!     observer.clone(),
//! );
//! session.start().await.unwrap();
//! session
//!     .on_detection(Detection::new(NdefMessage::single(TagRecord::text("hi"))))
//!     .await
//!     .unwrap();
//! assert_eq!(observer.count(), 2);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

pub mod cache;
pub mod codec;
pub mod config;
pub mod driver;
pub mod error;
pub mod observer;
pub mod permission;
pub mod session;
pub mod transport;
pub mod url;

pub use cache::{Asset, AssetCache, AssetFetcher, CacheError, CacheResolution, MapFetcher};
pub use codec::RecordCodec;
pub use config::{CacheConfig, ConfigError, SessionConfig, SessionConfigBuilder};
pub use driver::{DriverError, ReaderSink, SessionCommand, SessionInbox, SessionSender};
pub use error::SessionError;
pub use observer::{
    ChannelObserver, CompositeObserver, JsonLinesObserver, MemoryObserver, NullObserver,
    ObserverError, SessionEvent, SessionObserver,
};
pub use permission::{PermissionGate, PermissionSource, PermissionStatus, SimulatedPermissions};
pub use session::{DetectionOutcome, PendingWrite, SessionSnapshot, TagSession};
pub use tagrw_api::{
    Detection, NdefMessage, Notification, PermissionState, ReadOutcome, RecordKind, SessionMode,
    TagRecord, WritePayload, WriteRequest,
};
pub use transport::{ReaderEvent, SimulatedReader, TagTransport, TransportError};
