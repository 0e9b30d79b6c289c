pub mod deposit_monitor;
pub mod payout_dispatcher;
pub mod registry;
pub mod sweep;

pub use deposit_monitor::{CycleSummary, DepositMonitor, MonitorConfig, MonitorError, WalletOutcome};
pub use payout_dispatcher::{DispatchOutcome, DispatcherError, PayoutDispatcher};
pub use registry::{NetworkProfile, NetworkRegistry, RegistryError, VaultGuardError, VaultLease};
pub use sweep::{PrepareOutcome, SweepError, SweepOrchestrator, SweepOutcome, SweepResult};
