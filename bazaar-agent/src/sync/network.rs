//! Network signal and the sync strategy it implies.
//!
//! The pipeline never probes the network directly (spec §6): it consumes a
//! signal value produced by whatever platform collaborator is available.
//! `NetworkMonitor` is an injected trait, not a process-wide singleton.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NetworkQuality {
    Poor,
    Fair,
    Good,
    Excellent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkSignal {
    pub available: bool,
    pub metered: bool,
    pub quality: NetworkQuality,
}

impl NetworkSignal {
    pub fn offline() -> Self {
        Self { available: false, metered: false, quality: NetworkQuality::Poor }
    }
}

/// What the offline queue worker is permitted to drain under the current
/// network conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    OfflineOnly,
    CriticalOnly,
    MinimalSync,
    NormalSync,
    FullSync,
}

impl SyncStrategy {
    /// Whether an operation at `priority` may be drained under this strategy.
    pub fn permits(self, priority: crate::storage::OperationPriority) -> bool {
        use crate::storage::OperationPriority::*;
        match self {
            SyncStrategy::OfflineOnly => false,
            SyncStrategy::CriticalOnly => matches!(priority, Critical),
            SyncStrategy::MinimalSync => matches!(priority, Critical | High),
            SyncStrategy::NormalSync => matches!(priority, Critical | High | Normal),
            SyncStrategy::FullSync => true,
        }
    }
}

/// Derives the sync strategy from a network signal, per spec §4.8:
/// no network ⇒ offline only; poor quality ⇒ critical only; metered +
/// fair-or-better ⇒ minimal; unmetered + good ⇒ normal; unmetered +
/// excellent ⇒ full.
pub fn strategy_for(signal: NetworkSignal) -> SyncStrategy {
    if !signal.available {
        return SyncStrategy::OfflineOnly;
    }
    if signal.quality == NetworkQuality::Poor {
        return SyncStrategy::CriticalOnly;
    }
    if signal.metered {
        return SyncStrategy::MinimalSync;
    }
    match signal.quality {
        NetworkQuality::Excellent => SyncStrategy::FullSync,
        _ => SyncStrategy::NormalSync,
    }
}

/// Supplies the current network signal. Implementations own whatever
/// platform polling is needed; the agent re-evaluates every 15 s per the
/// network-quality-reassessment timeout in spec §5.
pub trait NetworkMonitor: Send + Sync {
    fn current(&self) -> NetworkSignal;
}

/// A monitor backed by a value the caller updates directly — used for the
/// `bazaar_core` engine's simple `Arc<AtomicBool>` availability flag when no
/// richer platform signal exists, and in tests.
pub struct FixedNetworkMonitor {
    signal: parking_lot::Mutex<NetworkSignal>,
}

impl FixedNetworkMonitor {
    pub fn new(signal: NetworkSignal) -> Self {
        Self { signal: parking_lot::Mutex::new(signal) }
    }

    pub fn set(&self, signal: NetworkSignal) {
        *self.signal.lock() = signal;
    }
}

impl NetworkMonitor for FixedNetworkMonitor {
    fn current(&self) -> NetworkSignal {
        *self.signal.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::OperationPriority;

    #[test]
    fn offline_signal_permits_nothing() {
        let strategy = strategy_for(NetworkSignal::offline());
        assert_eq!(strategy, SyncStrategy::OfflineOnly);
        assert!(!strategy.permits(OperationPriority::Critical));
    }

    #[test]
    fn poor_quality_permits_only_critical() {
        let signal = NetworkSignal { available: true, metered: false, quality: NetworkQuality::Poor };
        let strategy = strategy_for(signal);
        assert_eq!(strategy, SyncStrategy::CriticalOnly);
        assert!(strategy.permits(OperationPriority::Critical));
        assert!(!strategy.permits(OperationPriority::High));
    }

    #[test]
    fn metered_fair_permits_critical_and_high_only() {
        let signal = NetworkSignal { available: true, metered: true, quality: NetworkQuality::Fair };
        let strategy = strategy_for(signal);
        assert_eq!(strategy, SyncStrategy::MinimalSync);
        assert!(strategy.permits(OperationPriority::High));
        assert!(!strategy.permits(OperationPriority::Normal));
    }

    #[test]
    fn unmetered_excellent_permits_everything() {
        let signal = NetworkSignal { available: true, metered: false, quality: NetworkQuality::Excellent };
        assert_eq!(strategy_for(signal), SyncStrategy::FullSync);
    }
}
