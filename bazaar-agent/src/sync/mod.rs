//! Offline-first sync: the durable queue, the remote client it drains
//! through, the conflict resolvers it calls on 409s, and the network
//! signal that gates how aggressively it drains.

pub mod client;
pub mod conflict;
pub mod network;
pub mod queue;

pub use client::{HttpSyncClient, PushOutcome, SyncClient};
pub use conflict::ConflictMetadata;
pub use network::{strategy_for, FixedNetworkMonitor, NetworkMonitor, NetworkQuality, NetworkSignal, SyncStrategy};
pub use queue::OfflineQueue;
