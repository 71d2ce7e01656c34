use serde::{Deserialize, Serialize};

use crate::bout::{DRAW, WIN};
use crate::selection::Recommendation;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub roi: f64,
    pub bets: usize,
}

/// Flat-stake ROI over every favourite (`p > 0.5`), returns weighted by the
/// predicted probability. `won[i]` is whether the side priced at `prices[i]`
/// (decimal odds) won.
pub fn run_backtest(probabilities: &[f64], won: &[bool], prices: &[f64]) -> BacktestResult {
    let mut weighted_return = 0.0_f64;
    let mut weight = 0.0_f64;
    let mut bets = 0usize;
    for ((p, w), d) in probabilities.iter().zip(won).zip(prices) {
        if *p <= 0.5 {
            continue;
        }
        let ret = if *w { d - 1.0 } else { -1.0 };
        weighted_return += ret * p;
        weight += p.abs();
        bets += 1;
    }
    if bets == 0 || weight <= 0.0 {
        return BacktestResult::default();
    }
    BacktestResult {
        roi: weighted_return / weight,
        bets,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BankrollSummary {
    pub starting: f64,
    pub ending: f64,
    pub peak: f64,
    pub max_drawdown: f64,
    pub bets: usize,
    pub staked: f64,
}

impl BankrollSummary {
    pub fn profit(&self) -> f64 {
        self.ending - self.starting
    }

    /// Profit per unit staked.
    pub fn yield_on_stake(&self) -> f64 {
        if self.staked > 0.0 {
            self.profit() / self.staked
        } else {
            0.0
        }
    }
}

/// Walks a bankroll through recommendations in order, staking
/// `stake_fraction` of the current bankroll each time. `result` is from the
/// backed side's perspective; a draw refunds the stake.
pub fn simulate_bankroll(starting: f64, bets: &[(Recommendation, f64)]) -> BankrollSummary {
    let mut bankroll = starting;
    let mut peak = starting;
    let mut max_drawdown = 0.0_f64;
    let mut staked = 0.0_f64;
    let mut count = 0usize;

    for (rec, result) in bets {
        if bankroll <= 0.0 {
            break;
        }
        let stake = bankroll * rec.stake_fraction;
        if stake <= 0.0 {
            continue;
        }
        staked += stake;
        count += 1;
        if *result == WIN {
            bankroll += stake * (rec.decimal_odds - 1.0);
        } else if *result != DRAW {
            bankroll -= stake;
        }
        peak = peak.max(bankroll);
        if peak > 0.0 {
            max_drawdown = max_drawdown.max((peak - bankroll) / peak);
        }
    }

    BankrollSummary {
        starting,
        ending: bankroll,
        peak,
        max_drawdown,
        bets: count,
        staked,
    }
}
