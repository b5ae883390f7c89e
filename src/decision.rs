//! Per-wallet trade decisions
//!
//! Each candidate wallet is evaluated once per cycle and ends in exactly one
//! of two places: a [`TradeIntent`] for the bundle, or eviction from the pool.
//!
//! ```text
//! Candidate -> QuoteOk ---------------------------> IntentEmitted
//!           -> QuoteInsufficient -> FallbackAttempted -> IntentEmitted
//!                                                    -> Evicted
//!           -> Evicted (dust)
//! ```
//!
//! A wallet below the dust threshold is evicted before any direction is
//! picked. In buy mode there is no fallback: an unaffordable buy is evicted
//! straight away.

use solana_sdk::pubkey::Pubkey;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::amm::QuoteContext;
use crate::chain::ChainState;
use crate::config::TradingConfig;
use crate::errors::EngineResult;
use crate::quote::QuoteEngine;
use crate::random::Randomness;
use crate::types::{Direction, SwapSide, TradeIntent, TradeMode};
use crate::wallet::WalletSlot;

/// Where a slot is in its evaluation for the current cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Candidate,
    QuoteOk,
    QuoteInsufficient,
    FallbackAttempted,
    IntentEmitted,
    Evicted,
}

impl SlotState {
    fn can_move_to(self, next: SlotState) -> bool {
        use SlotState::*;
        matches!(
            (self, next),
            (Candidate, QuoteOk)
                | (Candidate, QuoteInsufficient)
                | (Candidate, Evicted)
                | (QuoteOk, IntentEmitted)
                | (QuoteInsufficient, FallbackAttempted)
                | (QuoteInsufficient, Evicted)
                | (FallbackAttempted, IntentEmitted)
                | (FallbackAttempted, Evicted)
        )
    }
}

/// Why a wallet left the pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvictReason {
    /// Lamports do not cover the buy cost plus fee buffer
    InsufficientFunds { required: u64, available: u64 },
    /// Token balance does not exceed the sell quantity
    InsufficientTokens { required: u64, available: u64 },
    /// Lamport balance under the dust threshold
    Dust { balance: u64, threshold: u64 },
}

impl fmt::Display for EvictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvictReason::InsufficientFunds {
                required,
                available,
            } => write!(f, "insufficient SOL: need {} lamports, have {}", required, available),
            EvictReason::InsufficientTokens {
                required,
                available,
            } => write!(f, "insufficient tokens: need more than {}, have {}", required, available),
            EvictReason::Dust { balance, threshold } => {
                write!(f, "dust balance {} below {} lamports", balance, threshold)
            }
        }
    }
}

/// Terminal result for one slot in one cycle
#[derive(Debug, Clone)]
pub enum Decision {
    Intent { intent: TradeIntent, fallback: bool },
    Evict { reason: EvictReason },
}

/// A side that could not be traded, kept for the fallback step
enum Shortfall {
    Funds { required: u64, available: u64 },
    Tokens { required: u64, available: u64 },
}

impl Shortfall {
    fn into_reason(self) -> EvictReason {
        match self {
            Shortfall::Funds {
                required,
                available,
            } => EvictReason::InsufficientFunds {
                required,
                available,
            },
            Shortfall::Tokens {
                required,
                available,
            } => EvictReason::InsufficientTokens {
                required,
                available,
            },
        }
    }
}

struct Tracker {
    slot_id: usize,
    state: SlotState,
}

impl Tracker {
    fn new(slot_id: usize) -> Self {
        Self {
            slot_id,
            state: SlotState::Candidate,
        }
    }

    fn advance(&mut self, next: SlotState) {
        debug_assert!(
            self.state.can_move_to(next),
            "illegal slot transition {:?} -> {:?}",
            self.state,
            next
        );
        trace!(wallet = self.slot_id, from = ?self.state, to = ?next, "Slot state");
        self.state = next;
    }
}

/// Decides direction and size for each candidate wallet
pub struct DecisionEngine {
    quotes: QuoteEngine,
    chain: Arc<dyn ChainState>,
    trading: TradingConfig,
}

impl DecisionEngine {
    pub fn new(quotes: QuoteEngine, chain: Arc<dyn ChainState>, trading: TradingConfig) -> Self {
        Self {
            quotes,
            chain,
            trading,
        }
    }

    /// Evaluate one wallet
    ///
    /// Collaborator failures propagate and abort the cycle; everything a
    /// wallet can get wrong by itself ends in [`Decision::Evict`].
    pub async fn decide(
        &self,
        ctx: &QuoteContext,
        slot: &WalletSlot,
        rng: &mut dyn Randomness,
    ) -> EngineResult<Decision> {
        let mut tracker = Tracker::new(slot.id());
        let owner = slot.pubkey();
        let balance = self.chain.get_balance(&owner).await?;

        if balance < self.trading.min_lamports {
            debug!(wallet = slot.id(), balance, "Wallet is dust");
            tracker.advance(SlotState::Evicted);
            return Ok(Decision::Evict {
                reason: EvictReason::Dust {
                    balance,
                    threshold: self.trading.min_lamports,
                },
            });
        }

        let first = match self.trading.mode {
            TradeMode::Buy => Direction::Buy,
            TradeMode::Mixed => rng.direction(),
        };

        let attempt = match first {
            Direction::Buy => {
                let quantity = self.random_quantity(ctx, Direction::Buy, rng);
                self.try_buy(ctx, slot, balance, quantity).await?
            }
            Direction::Sell => self.try_sell(ctx, slot, &owner, rng).await?,
        };

        let shortfall = match attempt {
            Ok(intent) => {
                tracker.advance(SlotState::QuoteOk);
                tracker.advance(SlotState::IntentEmitted);
                return Ok(Decision::Intent {
                    intent,
                    fallback: false,
                });
            }
            Err(shortfall) => {
                tracker.advance(SlotState::QuoteInsufficient);
                shortfall
            }
        };

        let fallback = match (self.trading.mode, first, shortfall) {
            (TradeMode::Buy, _, shortfall) => {
                return Ok(self.evict(&mut tracker, shortfall));
            }
            (TradeMode::Mixed, Direction::Buy, _) => {
                tracker.advance(SlotState::FallbackAttempted);
                self.try_sell(ctx, slot, &owner, rng).await?
            }
            (TradeMode::Mixed, Direction::Sell, Shortfall::Tokens { required, .. }) => {
                tracker.advance(SlotState::FallbackAttempted);
                // Buy the quantity the sell wanted, priced by the pool
                self.try_buy(ctx, slot, balance, required).await?
            }
            (TradeMode::Mixed, Direction::Sell, shortfall) => {
                return Ok(self.evict(&mut tracker, shortfall));
            }
        };

        match fallback {
            Ok(intent) => {
                tracker.advance(SlotState::IntentEmitted);
                debug!(
                    wallet = slot.id(),
                    from = %first,
                    to = %intent.direction,
                    "Fell back to the opposite side"
                );
                Ok(Decision::Intent {
                    intent,
                    fallback: true,
                })
            }
            Err(shortfall) => Ok(self.evict(&mut tracker, shortfall)),
        }
    }

    fn evict(&self, tracker: &mut Tracker, shortfall: Shortfall) -> Decision {
        tracker.advance(SlotState::Evicted);
        Decision::Evict {
            reason: shortfall.into_reason(),
        }
    }

    fn random_quantity(&self, ctx: &QuoteContext, direction: Direction, rng: &mut dyn Randomness) -> u64 {
        let t = &self.trading;
        let ui = match direction {
            Direction::Buy => rng.uniform_f64(t.min_buy_quantity, t.max_buy_quantity),
            Direction::Sell => rng.uniform_f64(t.min_sell_quantity, t.max_sell_quantity),
        };
        QuoteEngine::to_base_units(ui, ctx.token_decimals)
    }

    /// Buy `quantity` token base units if the wallet can pay for them
    async fn try_buy(
        &self,
        ctx: &QuoteContext,
        slot: &WalletSlot,
        balance: u64,
        quantity: u64,
    ) -> EngineResult<Result<TradeIntent, Shortfall>> {
        // What selling the wanted tokens would return, plus the slippage margin
        let reverse = self.quotes.quote(ctx, quantity, SwapSide::Sol).await?;
        let cost = self.quotes.buy_cost_lamports(&reverse);

        if !QuoteEngine::affordable(balance, cost, self.trading.buffer_lamports) {
            debug!(
                wallet = slot.id(),
                balance,
                cost,
                buffer = self.trading.buffer_lamports,
                "Buy not affordable"
            );
            return Ok(Err(Shortfall::Funds {
                required: cost.saturating_add(self.trading.buffer_lamports),
                available: balance,
            }));
        }

        let forward = self.quotes.quote(ctx, cost, SwapSide::Token).await?;
        Ok(Ok(TradeIntent {
            slot_id: slot.id(),
            owner: slot.keypair_arc(),
            direction: Direction::Buy,
            amount_in: cost,
            min_amount_out: forward.min_amount_out,
            remaining_accounts: forward.remaining_accounts,
        }))
    }

    /// Sell a random quantity if the wallet holds more than it
    async fn try_sell(
        &self,
        ctx: &QuoteContext,
        slot: &WalletSlot,
        owner: &Pubkey,
        rng: &mut dyn Randomness,
    ) -> EngineResult<Result<TradeIntent, Shortfall>> {
        let quantity = self.random_quantity(ctx, Direction::Sell, rng);
        let tokens = self.chain.get_token_balance(owner, &ctx.token_mint).await?;
        if tokens <= quantity {
            debug!(wallet = slot.id(), tokens, quantity, "Not enough tokens to sell");
            return Ok(Err(Shortfall::Tokens {
                required: quantity,
                available: tokens,
            }));
        }

        let quote = self.quotes.quote(ctx, quantity, SwapSide::Sol).await?;
        Ok(Ok(TradeIntent {
            slot_id: slot.id(),
            owner: slot.keypair_arc(),
            direction: Direction::Sell,
            amount_in: quantity,
            min_amount_out: quote.min_amount_out,
            remaining_accounts: quote.remaining_accounts,
        }))
    }
}
