//! `sat-relay`: reliable chunked transfer of imagery and telemetry over an
//! at-least-once publish/subscribe transport.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐  header, chunks   ┌───────────────────┐  objects   ┌────────┐
//!  │  Sender  │──────────────────▶│ ReassemblyEngine  │───────────▶│  Sink  │
//!  └────┬─────┘   (any order,     │ (owns the record  │            └────────┘
//!       │          duplicates)    │  store, sweeps)   │
//!  ┌────▼──────────┐              └─────────▲─────────┘
//!  │ Telemetry     │  one envelope          │ Message { topic, payload }
//!  │ Publisher     │─────────┐              │
//!  └───────────────┘         │     ┌────────┴──────────┐
//!                            └────▶│     Transport     │  memory / UDP / simulator
//!                                  └───────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`chunk`]      — split a wire buffer into checksummed chunks and join them
//! - [`envelope`]   — CBOR wire envelopes with alias-aware decode
//! - [`encoding`]   — `raw` / `zstd` payload encodings
//! - [`integrity`]  — CRC-32 checksums and SHA-256 digests
//! - [`sender`]     — object send pipeline and publish-with-retry
//! - [`state`]      — send pipeline states
//! - [`telemetry`]  — single-message telemetry samples
//! - [`store`]      — reassembly records, idle sweep, capacity eviction
//! - [`receiver`]   — reassembly engine and receive loop
//! - [`sink`]       — where finalized objects go
//! - [`timer`]      — retry budget and backoff
//! - [`config`]     — sender / receiver parameters and topic names
//! - [`transport`]  — transport trait and in-process transport
//! - [`simulator`]  — fault-injecting transport for testing
//! - [`packet`]     — datagram framing for the UDP transport
//! - [`socket`]     — async UDP transport

pub mod chunk;
pub mod config;
pub mod encoding;
pub mod envelope;
pub mod integrity;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod simulator;
pub mod sink;
pub mod socket;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod timer;
pub mod transport;
