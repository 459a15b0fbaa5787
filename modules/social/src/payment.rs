//! Payment gate and treasury
//!
//! Edits and deletes cost money to discourage frivolous content churn. The
//! gate is a pure check composed as a precondition: it converts a submitted
//! payment into reference-currency value at the oracle rate and compares it
//! against a fixed minimum. Accepted payments accumulate in the treasury
//! until the admin withdraws them over the external transfer rail.

use agoranet_core::{
    Address, AgoranetError, AgoranetResult, Amount, PaymentConfig, Rate, TransferAgent,
};
use agoranet_state::{treasury_key, StateStore};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

/// Payment authorization gate
///
/// Side-effect free; the enclosing operation fails with
/// `PaymentInsufficient` before any mutation happens.
pub struct PaymentGate {
    config: PaymentConfig,
}

impl PaymentGate {
    pub fn new(config: PaymentConfig) -> Self {
        Self { config }
    }

    /// Authorize a payment at the given rate
    ///
    /// The threshold is inclusive: a converted value exactly equal to the
    /// minimum charge passes.
    pub fn authorize(&self, paid: Amount, rate: Rate) -> AgoranetResult<()> {
        let value = rate.value_of(paid);
        if value >= self.config.min_charge_ref {
            Ok(())
        } else {
            Err(AgoranetError::PaymentInsufficient {
                required: self.config.min_charge_ref,
                provided: value,
            })
        }
    }

    /// Accepted payment denomination
    pub fn denomination(&self) -> &str {
        &self.config.denomination
    }
}

/// Accumulated payment balance
pub struct Treasury<S: StateStore> {
    state: Arc<S>,
    balance: RwLock<Amount>,
}

impl<S: StateStore + 'static> Treasury<S> {
    pub fn new(state: Arc<S>) -> Self {
        Self {
            state,
            balance: RwLock::new(Amount::ZERO),
        }
    }

    /// Restore the balance from the store
    pub async fn load(&self) -> AgoranetResult<()> {
        if let Some(bytes) = self.state.get(&treasury_key()).await? {
            let value: u128 = bincode::deserialize(&bytes)?;
            *self.balance.write() = Amount::new(value);
        }
        Ok(())
    }

    /// Current balance
    pub fn balance(&self) -> Amount {
        *self.balance.read()
    }

    /// Credit an accepted payment
    pub async fn credit(&self, amount: Amount) -> AgoranetResult<Amount> {
        let new_balance = self.balance.read().saturating_add(amount);
        self.state
            .set(&treasury_key(), &bincode::serialize(&new_balance.0)?)
            .await?;
        *self.balance.write() = new_balance;

        debug!("Treasury credited {}, balance {}", amount, new_balance);
        Ok(new_balance)
    }

    /// Transfer the whole balance to `to` over the external rail
    ///
    /// All-or-nothing: the balance is decremented only after the transfer
    /// succeeds; on failure the bookkeeping is untouched.
    pub async fn withdraw_all(
        &self,
        to: Address,
        agent: &dyn TransferAgent,
    ) -> AgoranetResult<Amount> {
        let amount = *self.balance.read();

        agent.transfer(to, amount).await?;

        self.state
            .set(&treasury_key(), &bincode::serialize(&0u128)?)
            .await?;
        *self.balance.write() = Amount::ZERO;

        info!("Treasury withdrew {} to {}", amount, to);
        Ok(amount)
    }
}

/// Transfer agent for deployments where settlement happens out of band
///
/// Always succeeds; the transfer itself is executed by the external payment
/// rail that consumes the audit trail.
pub struct NullTransferAgent;

#[async_trait]
impl TransferAgent for NullTransferAgent {
    async fn transfer(&self, to: Address, amount: Amount) -> AgoranetResult<()> {
        debug!("Null transfer of {} to {}", amount, to);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agoranet_state::MemoryStateStore;

    struct FailingAgent;

    #[async_trait]
    impl TransferAgent for FailingAgent {
        async fn transfer(&self, _to: Address, _amount: Amount) -> AgoranetResult<()> {
            Err(AgoranetError::TransferFailed("rail offline".to_string()))
        }
    }

    fn gate() -> PaymentGate {
        PaymentGate::new(PaymentConfig::default())
    }

    #[test]
    fn test_payment_below_threshold_rejected() {
        // 1 token at 2 ref units/token = 2 ref units < 5
        let result = gate().authorize(Amount::from_tokens(1), Rate::from_ref_units(2));
        assert!(matches!(
            result,
            Err(AgoranetError::PaymentInsufficient { required, provided })
                if required == 5 * Rate::SCALE && provided == 2 * Rate::SCALE
        ));
    }

    #[test]
    fn test_payment_at_exact_threshold_passes() {
        // 2.5 tokens at 2 ref units/token = exactly 5 ref units
        let paid = Amount::new(25 * Amount::ONE_TOKEN / 10);
        assert!(gate().authorize(paid, Rate::from_ref_units(2)).is_ok());

        // One base unit less fails
        let short = Amount::new(paid.0 - 1);
        assert!(gate().authorize(short, Rate::from_ref_units(2)).is_err());
    }

    #[test]
    fn test_payment_above_threshold_passes() {
        assert!(gate()
            .authorize(Amount::from_tokens(10), Rate::from_ref_units(2))
            .is_ok());
    }

    #[test]
    fn test_maximum_payment_passes() {
        // Conversion saturates instead of wrapping, so an absurdly large
        // payment still clears the threshold
        assert!(gate()
            .authorize(Amount::new(u128::MAX), Rate::from_ref_units(2))
            .is_ok());
    }

    #[tokio::test]
    async fn test_treasury_credit_accumulates() {
        let treasury = Treasury::new(Arc::new(MemoryStateStore::new()));

        treasury.credit(Amount::from_tokens(3)).await.unwrap();
        treasury.credit(Amount::from_tokens(4)).await.unwrap();

        assert_eq!(treasury.balance(), Amount::from_tokens(7));
    }

    #[tokio::test]
    async fn test_withdraw_all_zeroes_balance() {
        let treasury = Treasury::new(Arc::new(MemoryStateStore::new()));
        treasury.credit(Amount::from_tokens(5)).await.unwrap();

        let withdrawn = treasury
            .withdraw_all(Address([9u8; 32]), &NullTransferAgent)
            .await
            .unwrap();

        assert_eq!(withdrawn, Amount::from_tokens(5));
        assert_eq!(treasury.balance(), Amount::ZERO);
    }

    #[tokio::test]
    async fn test_failed_transfer_leaves_balance() {
        let treasury = Treasury::new(Arc::new(MemoryStateStore::new()));
        treasury.credit(Amount::from_tokens(5)).await.unwrap();

        let result = treasury.withdraw_all(Address([9u8; 32]), &FailingAgent).await;

        assert!(matches!(result, Err(AgoranetError::TransferFailed(_))));
        assert_eq!(treasury.balance(), Amount::from_tokens(5));
    }

    #[tokio::test]
    async fn test_treasury_balance_survives_reload() {
        let state = Arc::new(MemoryStateStore::new());

        {
            let treasury = Treasury::new(state.clone());
            treasury.credit(Amount::from_tokens(2)).await.unwrap();
        }

        let reloaded = Treasury::new(state);
        reloaded.load().await.unwrap();
        assert_eq!(reloaded.balance(), Amount::from_tokens(2));
    }
}
