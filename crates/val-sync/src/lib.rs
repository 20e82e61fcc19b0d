//! `val-sync` — optimistic synchronisation of content modules.
//!
//! A [`SyncEngine`] owns the authoritative tree, pending patch queue and
//! status of every module. UI layers subscribe to [`Topic`]s and read
//! referentially stable snapshots; edits are applied locally first and
//! reconciled with the content API through a [`Transport`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use chrono::Utc;
//! use serde_json::json;
//! use val_path::SourcePath;
//! use val_patch::{patch_path_of, Op};
//! use val_schema::SchemaKind;
//! use val_sync::{spawn_background, HttpTransport, SyncConfig, SyncEngine, Topic};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SyncConfig::from_env()?;
//! let engine = Arc::new(SyncEngine::new(HttpTransport::new(&config)?, config));
//! engine.init().await?;
//!
//! let title = SourcePath::new(r#"/content/blog.val.ts?p="posts".0."title""#)?;
//! let _sub = engine.subscribe(Topic::Shallow(title.clone()), || println!("title changed"));
//! let (module, path) = patch_path_of(&title);
//! engine.add_patch(&module, SchemaKind::String, vec![Op::replace(path, json!("Hello"))], Utc::now())?;
//!
//! let background = spawn_background(Arc::clone(&engine));
//! background.cancel();
//! # Ok(())
//! # }
//! ```

pub mod background;
pub mod config;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod http;
pub mod listeners;
pub mod status;
pub mod transport;

pub use background::spawn_background;
pub use config::SyncConfig;
pub use engine::{PatchState, ShallowResult, Snapshot, SyncEngine, VersionMarker};
pub use error::{ConfigError, SyncError, TransportError};
pub use http::HttpTransport;
pub use listeners::{ListenerRegistry, Subscription, Topic};
pub use status::{ServiceStatus, SyncStatus};
pub use transport::{ModuleSource, PatchSubmission, Progress, SourcesResponse, SubmitResponse, Transport};
