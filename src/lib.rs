//! # Repo Scout
//!
//! A repository intelligence pipeline: it queries a local git working copy,
//! queries a remote hosting API under a strict rate budget, reconciles both
//! into comparison and digest reports, and exports the results as linkable,
//! timestamped markdown notes into a personal knowledge vault.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐      ┌───────────────────┐
//! │ LocalRepository│      │   HostingClient   │
//! │   Inspector    │      │ (RateLimited      │
//! │  (git engine)  │      │    Transport)     │
//! └───────┬────────┘      └─────────┬─────────┘
//!         │                         │
//!         └─────────┬───────────────┘
//!                   ▼
//!            ┌─────────────┐      ┌─────────────┐
//!            │  Reconciler │─────▶│ NoteExporter│
//!            │  (reports)  │      │   (vault)   │
//!            └─────────────┘      └─────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types and the rate budget |
//! | [`error`] | Error taxonomy with user-facing hints |
//! | [`transport`] | Rate-limited HTTP transport |
//! | [`hosting`] | Typed hosting API client with pagination |
//! | [`inspector`] | Read-only local git queries |
//! | [`reconcile`] | Report building and cross-referencing |
//! | [`export`] | Vault note rendering and atomic writes |
//! | [`pipeline`] | Top-level operation surface |

pub mod config;
pub mod error;
pub mod export;
pub mod hosting;
pub mod inspector;
pub mod models;
pub mod pipeline;
pub mod reconcile;
pub mod transport;

pub use error::{Error, Result};
pub use pipeline::Pipeline;
