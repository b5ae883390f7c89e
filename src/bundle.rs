//! Bundle assembly
//!
//! Intents become signed swap transactions in the order the cycle produced
//! them. A bundle never holds more transactions than the cycle's capacity
//! and is never padded.

use solana_sdk::transaction::VersionedTransaction;
use std::sync::Arc;
use tracing::debug;

use crate::amm::{AmmClient, QuoteContext};
use crate::errors::{EngineError, EngineResult};
use crate::types::TradeIntent;

/// Signed transactions for one cycle plus the wallets behind them
#[derive(Debug, Default)]
pub struct AssembledBundle {
    pub transactions: Vec<VersionedTransaction>,
    pub slot_ids: Vec<usize>,
}

impl AssembledBundle {
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

pub struct BundleAssembler {
    amm: Arc<dyn AmmClient>,
}

impl BundleAssembler {
    pub fn new(amm: Arc<dyn AmmClient>) -> Self {
        Self { amm }
    }

    /// Build one transaction per intent, keeping intent order
    ///
    /// Fails without building anything if there are more intents than
    /// `capacity`; the scheduler never collects more than that.
    pub async fn assemble(
        &self,
        ctx: &QuoteContext,
        intents: &[TradeIntent],
        capacity: usize,
    ) -> EngineResult<AssembledBundle> {
        if intents.len() > capacity {
            return Err(EngineError::relay(format!(
                "{} intents exceed bundle capacity {}",
                intents.len(),
                capacity
            )));
        }

        let mut bundle = AssembledBundle {
            transactions: Vec::with_capacity(intents.len()),
            slot_ids: Vec::with_capacity(intents.len()),
        };
        for intent in intents {
            let tx = self.amm.build_swap_transaction(ctx, intent).await?;
            debug!(
                wallet = intent.slot_id,
                direction = %intent.direction,
                amount_in = intent.amount_in,
                min_amount_out = intent.min_amount_out,
                "Swap transaction built"
            );
            bundle.transactions.push(tx);
            bundle.slot_ids.push(intent.slot_id);
        }
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quote::QuoteContextProvider;
    use crate::test_utils::{clmm_program, decode_mock_swap, wallet_slots, MockAmm, MockChain};
    use crate::types::Direction;
    use solana_sdk::pubkey::Pubkey;
    use solana_sdk::signature::Signer;

    async fn setup() -> (Arc<MockAmm>, Arc<QuoteContext>) {
        let token = Pubkey::new_unique();
        let amm = Arc::new(MockAmm::new(token, 1.0));
        let mut provider = QuoteContextProvider::new(
            amm.clone(),
            Arc::new(MockChain::new(6)),
            Pubkey::new_unique(),
            token,
            vec![clmm_program()],
        );
        let ctx = provider.get().await.unwrap();
        (amm, ctx)
    }

    fn intent(slot: &crate::wallet::WalletSlot, direction: Direction, amount_in: u64) -> TradeIntent {
        TradeIntent {
            slot_id: slot.id(),
            owner: slot.keypair_arc(),
            direction,
            amount_in,
            min_amount_out: amount_in / 2,
            remaining_accounts: vec![],
        }
    }

    #[tokio::test]
    async fn test_assemble_keeps_order_and_fields() {
        let (amm, ctx) = setup().await;
        let slots = wallet_slots(3);
        let intents = vec![
            intent(&slots[2], Direction::Sell, 300),
            intent(&slots[0], Direction::Buy, 100),
        ];

        let bundle = BundleAssembler::new(amm.clone())
            .assemble(&ctx, &intents, 3)
            .await
            .unwrap();

        assert_eq!(bundle.len(), 2);
        assert_eq!(bundle.slot_ids, vec![2, 0]);
        for (tx, intent) in bundle.transactions.iter().zip(&intents) {
            let decoded = decode_mock_swap(tx).unwrap();
            assert_eq!(decoded.payer, intent.owner.pubkey());
            assert_eq!(decoded.direction, intent.direction);
            assert_eq!(decoded.amount_in, intent.amount_in);
            assert_eq!(decoded.min_amount_out, intent.min_amount_out);
        }
        assert_eq!(
            amm.built().await,
            vec![(2, Direction::Sell), (0, Direction::Buy)]
        );
    }

    #[tokio::test]
    async fn test_assemble_empty_and_over_capacity() {
        let (amm, ctx) = setup().await;
        let assembler = BundleAssembler::new(amm.clone());

        let empty = assembler.assemble(&ctx, &[], 2).await.unwrap();
        assert!(empty.is_empty());

        let slots = wallet_slots(3);
        let intents: Vec<_> = slots.iter().map(|s| intent(s, Direction::Buy, 10)).collect();
        assert!(assembler.assemble(&ctx, &intents, 2).await.is_err());
        assert!(amm.built().await.is_empty());
    }
}
