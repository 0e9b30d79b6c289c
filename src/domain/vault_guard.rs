//! Vault Guard
//!
//! Decides whether the custodial vault can fund a payout without dropping below
//! its reserve levels. Decisions are computed from a balance snapshot taken
//! immediately before the transfer and are never cached or reused.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::network::Network;

/// Reserve levels for one network's vault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservePolicy {
    /// Settlement token that must remain in the vault after a payout
    pub min_settlement_reserve: Decimal,
    /// Native balance the vault needs to keep paying fees
    pub min_gas_reserve: Decimal,
    /// Native amount sent to a temp wallet before sweeping it
    pub sweep_fee_reserve: Decimal,
}

impl ReservePolicy {
    /// Defaults used by the production workers
    pub fn default_for(network: Network) -> Self {
        match network {
            Network::Arbitrum => Self {
                min_settlement_reserve: Decimal::from(50),
                min_gas_reserve: Decimal::new(1, 2),   // 0.01 ETH
                sweep_fee_reserve: Decimal::new(1, 3), // 0.001 ETH
            },
            Network::Bsc => Self {
                min_settlement_reserve: Decimal::from(50),
                min_gas_reserve: Decimal::new(2, 2),   // 0.02 BNB
                sweep_fee_reserve: Decimal::new(2, 3), // 0.002 BNB
            },
            Network::Tron => Self {
                min_settlement_reserve: Decimal::from(50),
                min_gas_reserve: Decimal::from(100),
                sweep_fee_reserve: Decimal::from(5),
            },
        }
    }
}

/// Live vault balances read at decision time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultSnapshot {
    pub settlement_balance: Decimal,
    pub native_balance: Decimal,
}

impl VaultSnapshot {
    /// Largest payout the settlement reserve still allows
    pub fn payout_headroom(&self, policy: &ReservePolicy) -> Decimal {
        (self.settlement_balance - policy.min_settlement_reserve).max(Decimal::ZERO)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    InsufficientSettlementFunds {
        shortfall: Decimal,
        balance: Decimal,
        amount: Decimal,
        min_reserve: Decimal,
    },
    InsufficientGasReserve {
        balance: Decimal,
        required: Decimal,
    },
    InvalidAmount(Decimal),
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::InsufficientSettlementFunds {
                shortfall,
                balance,
                amount,
                min_reserve,
            } => write!(
                f,
                "Insufficient settlement funds: vault holds {}, payout {} would breach reserve {} (short by {})",
                balance, amount, min_reserve, shortfall
            ),
            DenyReason::InsufficientGasReserve { balance, required } => write!(
                f,
                "Insufficient gas reserve: vault native balance {} below required {}",
                balance, required
            ),
            DenyReason::InvalidAmount(amount) => {
                write!(f, "Payout amount must be positive, got {}", amount)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Deny(DenyReason),
}

impl GuardDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardDecision::Allow)
    }

    /// Human-readable explanation for logs and backend reports
    pub fn reason(&self) -> String {
        match self {
            GuardDecision::Allow => "Vault reserves sufficient".to_string(),
            GuardDecision::Deny(reason) => reason.to_string(),
        }
    }
}

/// Stateless reserve checks for a single network's vault
#[derive(Debug, Clone, Copy)]
pub struct VaultGuard {
    network: Network,
    policy: ReservePolicy,
}

impl VaultGuard {
    pub fn new(network: Network, policy: ReservePolicy) -> Self {
        Self { network, policy }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn policy(&self) -> &ReservePolicy {
        &self.policy
    }

    /// Settlement check: `balance - amount >= min_reserve`
    pub fn check_settlement(&self, balance: Decimal, amount: Decimal) -> GuardDecision {
        if amount <= Decimal::ZERO {
            return GuardDecision::Deny(DenyReason::InvalidAmount(amount));
        }

        let remaining = balance - amount;
        if remaining < self.policy.min_settlement_reserve {
            let shortfall = self.policy.min_settlement_reserve - remaining;
            return GuardDecision::Deny(DenyReason::InsufficientSettlementFunds {
                shortfall,
                balance,
                amount,
                min_reserve: self.policy.min_settlement_reserve,
            });
        }
        GuardDecision::Allow
    }

    /// Gas check: `native_balance >= min_gas_reserve`
    pub fn check_gas(&self, native_balance: Decimal) -> GuardDecision {
        if native_balance < self.policy.min_gas_reserve {
            return GuardDecision::Deny(DenyReason::InsufficientGasReserve {
                balance: native_balance,
                required: self.policy.min_gas_reserve,
            });
        }
        GuardDecision::Allow
    }

    /// Evaluate both checks against one snapshot, settlement first
    pub fn evaluate(&self, snapshot: &VaultSnapshot, amount: Decimal) -> GuardDecision {
        let settlement = self.check_settlement(snapshot.settlement_balance, amount);
        if !settlement.is_allowed() {
            tracing::warn!("[VaultGuard] {} payout denied: {}", self.network, settlement.reason());
            return settlement;
        }

        let gas = self.check_gas(snapshot.native_balance);
        if !gas.is_allowed() {
            tracing::warn!("[VaultGuard] {} payout denied: {}", self.network, gas.reason());
            return gas;
        }

        tracing::debug!(
            "[VaultGuard] {} payout {} allowed (vault {} / native {})",
            self.network,
            amount,
            snapshot.settlement_balance,
            snapshot.native_balance
        );
        GuardDecision::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn guard(min_reserve: Decimal, min_gas: Decimal) -> VaultGuard {
        VaultGuard::new(
            Network::Tron,
            ReservePolicy {
                min_settlement_reserve: min_reserve,
                min_gas_reserve: min_gas,
                sweep_fee_reserve: dec!(5),
            },
        )
    }

    #[test]
    fn test_payout_breaching_reserve_denied() {
        // 120 - 100 = 20 < 50
        let decision = guard(dec!(50), dec!(100)).check_settlement(dec!(120), dec!(100));
        match decision {
            GuardDecision::Deny(DenyReason::InsufficientSettlementFunds { shortfall, .. }) => {
                assert_eq!(shortfall, dec!(30));
            }
            other => panic!("expected settlement deny, got {:?}", other),
        }
    }

    #[test]
    fn test_boundary_amount_allowed() {
        let g = guard(dec!(50), dec!(100));
        assert_eq!(g.check_settlement(dec!(120), dec!(70)), GuardDecision::Allow);
        assert!(!g.check_settlement(dec!(120), dec!(70.000001)).is_allowed());
    }

    #[test]
    fn test_gas_reserve() {
        let g = guard(dec!(50), dec!(100));
        assert!(g.check_gas(dec!(100)).is_allowed());
        assert_eq!(
            g.check_gas(dec!(99.9)),
            GuardDecision::Deny(DenyReason::InsufficientGasReserve {
                balance: dec!(99.9),
                required: dec!(100),
            })
        );
    }

    #[test]
    fn test_evaluate_checks_settlement_before_gas() {
        let g = guard(dec!(50), dec!(100));
        let snapshot = VaultSnapshot {
            settlement_balance: dec!(10),
            native_balance: dec!(0),
        };
        let decision = g.evaluate(&snapshot, dec!(5));
        assert!(matches!(
            decision,
            GuardDecision::Deny(DenyReason::InsufficientSettlementFunds { .. })
        ));
    }

    #[test]
    fn test_evaluate_denies_low_gas() {
        let g = guard(dec!(50), dec!(100));
        let snapshot = VaultSnapshot {
            settlement_balance: dec!(1000),
            native_balance: dec!(20),
        };
        assert!(matches!(
            g.evaluate(&snapshot, dec!(5)),
            GuardDecision::Deny(DenyReason::InsufficientGasReserve { .. })
        ));
    }

    #[test]
    fn test_non_positive_amount_denied() {
        let g = guard(dec!(0), dec!(0));
        assert_eq!(
            g.check_settlement(dec!(10), dec!(0)),
            GuardDecision::Deny(DenyReason::InvalidAmount(dec!(0)))
        );
    }

    #[test]
    fn test_reason_is_human_readable() {
        let decision = guard(dec!(50), dec!(100)).check_settlement(dec!(120), dec!(100));
        let reason = decision.reason();
        assert!(reason.contains("Insufficient settlement funds"));
        assert!(reason.contains("30"));
    }

    #[test]
    fn test_headroom() {
        let policy = ReservePolicy::default_for(Network::Bsc);
        let snapshot = VaultSnapshot {
            settlement_balance: dec!(80),
            native_balance: dec!(1),
        };
        assert_eq!(snapshot.payout_headroom(&policy), dec!(30));
        let empty = VaultSnapshot {
            settlement_balance: dec!(10),
            native_balance: dec!(1),
        };
        assert_eq!(empty.payout_headroom(&policy), Decimal::ZERO);
    }

    #[test]
    fn test_default_policies() {
        assert_eq!(ReservePolicy::default_for(Network::Arbitrum).sweep_fee_reserve, dec!(0.001));
        assert_eq!(ReservePolicy::default_for(Network::Bsc).min_gas_reserve, dec!(0.02));
        assert_eq!(ReservePolicy::default_for(Network::Tron).min_gas_reserve, dec!(100));
    }
}
