//! Trader Evaluator
//! Rule-based scoring of traders against a token's aggregated data.
//!
//! Rules are data, not trait objects: each rule names a condition over one
//! metric (or tag), a signed score delta, and an optional hard verdict.
//! Evaluation is a fold over the ordered rule list. A rule whose metric is
//! absent from the aggregated data is skipped and recorded as skipped in
//! the trace, which is how partial-source data flows through without
//! crashing anything.

use chrono::Utc;
use std::collections::HashMap;
use tracing::debug;

use crate::config::{OverridePolicy, PipelineConfig, RiskThresholds};
use crate::models::{
    AggregatedData, Evaluation, TraceDetail, TraceEntry, Trader, Verdict,
};

/// Metric names shared between the merge step and the rule set
pub mod metric {
    pub const TOTAL_BOUGHT_USD: &str = "total_bought_usd";
    pub const TOTAL_SOLD_USD: &str = "total_sold_usd";
    pub const REALIZED_PROFIT_USD: &str = "realized_profit_usd";
    pub const REALIZED_PROFIT_30D: &str = "realized_profit_30d";
    pub const BUY_TRANSACTIONS: &str = "buy_transactions";
    pub const SELL_TRANSACTIONS: &str = "sell_transactions";
    pub const HOLDING_AMOUNT: &str = "holding_amount";
    pub const WINRATE: &str = "winrate";
    pub const PNL_PCT_7D: &str = "pnl_pct_7d";
    pub const PNL_PCT_30D: &str = "pnl_pct_30d";
    pub const TOP_ROI: &str = "top_roi";
    pub const NO_BUY_HOLD_RATIO: &str = "no_buy_hold_ratio";
    pub const FAST_TX_RATIO: &str = "fast_tx_ratio";
    pub const SELL_PASS_BUY_RATIO: &str = "sell_pass_buy_ratio";
    pub const TOKEN_LIQUIDITY_USD: &str = "token_liquidity_usd";
    pub const TOKEN_VOLUME_24H: &str = "token_volume_24h";
}

/// What a rule tests
#[derive(Debug, Clone)]
pub enum Condition {
    /// Fires when the trader carries the tag
    TagPresent { tag: String },
    /// Fires when the metric is strictly below the threshold
    Below { metric: String, threshold: f64 },
    /// Fires when the metric is strictly above the threshold
    Above { metric: String, threshold: f64 },
    /// Always fires; contributes weight x metric value
    Weighted { metric: String, weight: f64 },
}

impl Condition {
    /// The metric this condition needs, if any
    fn required_metric(&self) -> Option<&str> {
        match self {
            Condition::TagPresent { .. } => None,
            Condition::Below { metric, .. }
            | Condition::Above { metric, .. }
            | Condition::Weighted { metric, .. } => Some(metric),
        }
    }
}

/// One scoring rule: name, condition, contribution, optional hard verdict
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub condition: Condition,
    pub delta: f64,
    pub hard_verdict: Option<Verdict>,
}

impl Rule {
    pub fn tag(name: &str, tag: &str, delta: f64) -> Self {
        Self {
            name: name.to_string(),
            condition: Condition::TagPresent {
                tag: tag.to_string(),
            },
            delta,
            hard_verdict: None,
        }
    }

    pub fn below(name: &str, metric: &str, threshold: f64, delta: f64) -> Self {
        Self {
            name: name.to_string(),
            condition: Condition::Below {
                metric: metric.to_string(),
                threshold,
            },
            delta,
            hard_verdict: None,
        }
    }

    pub fn above(name: &str, metric: &str, threshold: f64, delta: f64) -> Self {
        Self {
            name: name.to_string(),
            condition: Condition::Above {
                metric: metric.to_string(),
                threshold,
            },
            delta,
            hard_verdict: None,
        }
    }

    pub fn weighted(name: &str, metric: &str, weight: f64) -> Self {
        Self {
            name: name.to_string(),
            condition: Condition::Weighted {
                metric: metric.to_string(),
                weight,
            },
            delta: 0.0,
            hard_verdict: None,
        }
    }

    /// Attach a hard verdict fired together with the condition
    pub fn forcing(mut self, verdict: Verdict) -> Self {
        self.hard_verdict = Some(verdict);
        self
    }
}

/// Internal result of applying one rule to one trader
enum Fire {
    Skipped(String),
    NotTriggered,
    Scored(f64),
}

impl Rule {
    fn apply(&self, trader: &Trader) -> Fire {
        if let Some(metric) = self.condition.required_metric() {
            if !trader.metrics.contains_key(metric) {
                return Fire::Skipped(metric.to_string());
            }
        }

        match &self.condition {
            Condition::TagPresent { tag } => {
                if trader.tags.iter().any(|t| t == tag) {
                    Fire::Scored(self.delta)
                } else {
                    Fire::NotTriggered
                }
            }
            Condition::Below { metric, threshold } => {
                if trader.metrics[metric.as_str()] < *threshold {
                    Fire::Scored(self.delta)
                } else {
                    Fire::NotTriggered
                }
            }
            Condition::Above { metric, threshold } => {
                if trader.metrics[metric.as_str()] > *threshold {
                    Fire::Scored(self.delta)
                } else {
                    Fire::NotTriggered
                }
            }
            Condition::Weighted { metric, weight } => {
                Fire::Scored(weight * trader.metrics[metric.as_str()])
            }
        }
    }
}

/// Applies the configured rule list to every trader seen on a token
pub struct TraderEvaluator {
    rules: Vec<Rule>,
    thresholds: RiskThresholds,
    override_policy: OverridePolicy,
}

impl TraderEvaluator {
    pub fn new(rules: Vec<Rule>, thresholds: RiskThresholds, policy: OverridePolicy) -> Self {
        Self {
            rules,
            thresholds,
            override_policy: policy,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            Self::default_rules(),
            config.risk_thresholds,
            config.override_policy,
        )
    }

    /// The production rule set, mirroring the filters the system always
    /// applied: sandwich bots are out, phishing-pattern wallets and weak
    /// monthly PnL count against, consistent winners count for.
    pub fn default_rules() -> Vec<Rule> {
        vec![
            Rule::tag("sandwich_bot", "sandwich_bot", -100.0).forcing(Verdict::Reject),
            Rule::above("fast_flipper", metric::FAST_TX_RATIO, 0.40, -20.0),
            Rule::above("sells_exceed_buys", metric::SELL_PASS_BUY_RATIO, 0.10, -20.0),
            Rule::above("no_buy_holder", metric::NO_BUY_HOLD_RATIO, 0.60, -10.0),
            Rule::below("weak_monthly_pnl", metric::PNL_PCT_30D, 0.75, -25.0),
            Rule::below("no_big_winners", metric::TOP_ROI, 0.30, -15.0),
            Rule::weighted("winrate_bonus", metric::WINRATE, 20.0),
            Rule::above("active_wallet", metric::REALIZED_PROFIT_30D, 5000.0, 10.0),
        ]
    }

    /// Evaluate every trader found in the aggregated data
    ///
    /// Output is ordered by wallet address so repeated evaluations of the
    /// same data compare equal.
    pub fn evaluate(&self, token_address: &str, data: &AggregatedData) -> Vec<Evaluation> {
        let mut traders = merge_traders(data);
        traders.sort_by(|a, b| a.address.cmp(&b.address));

        let evaluations: Vec<Evaluation> = traders
            .iter()
            .map(|trader| self.evaluate_trader(token_address, trader))
            .collect();

        debug!(
            token = token_address,
            traders = evaluations.len(),
            "evaluation done"
        );
        evaluations
    }

    fn evaluate_trader(&self, token_address: &str, trader: &Trader) -> Evaluation {
        let mut score = 0.0;
        let mut trace = Vec::new();
        let mut forced: Option<Verdict> = None;

        for rule in &self.rules {
            match rule.apply(trader) {
                Fire::Skipped(missing) => {
                    trace.push(TraceEntry {
                        rule: rule.name.clone(),
                        detail: TraceDetail::Skipped { missing },
                    });
                }
                Fire::NotTriggered => {
                    trace.push(TraceEntry {
                        rule: rule.name.clone(),
                        detail: TraceDetail::Passed,
                    });
                }
                Fire::Scored(delta) => {
                    score += delta;
                    if let Some(verdict) = rule.hard_verdict {
                        trace.push(TraceEntry {
                            rule: rule.name.clone(),
                            detail: TraceDetail::Override { verdict },
                        });
                        forced = Some(verdict);
                        if self.override_policy == OverridePolicy::FirstWins {
                            break;
                        }
                    } else {
                        trace.push(TraceEntry {
                            rule: rule.name.clone(),
                            detail: TraceDetail::Scored { delta },
                        });
                    }
                }
            }
        }

        let verdict = forced.unwrap_or_else(|| self.threshold_verdict(score));

        Evaluation {
            trader: trader.address.clone(),
            token_address: token_address.to_string(),
            score,
            verdict,
            trace,
            evaluated_at: Utc::now(),
        }
    }

    fn threshold_verdict(&self, score: f64) -> Verdict {
        if score < self.thresholds.reject {
            Verdict::Reject
        } else if score < self.thresholds.flag {
            Verdict::Flag
        } else {
            Verdict::Pass
        }
    }
}

/// Merge per-source payloads into one trader list
///
/// Flow and behavior records meet on the wallet address; token-level market
/// numbers are folded into every trader's metric map under `token_`-prefixed
/// names so rules can react to token context too.
pub fn merge_traders(data: &AggregatedData) -> Vec<Trader> {
    let mut by_wallet: HashMap<String, Trader> = HashMap::new();

    if let Some(flows) = data.flows() {
        for flow in flows {
            let trader = by_wallet
                .entry(flow.wallet.clone())
                .or_insert_with(|| Trader {
                    address: flow.wallet.clone(),
                    metrics: HashMap::new(),
                    tags: Vec::new(),
                });
            trader
                .metrics
                .insert(metric::TOTAL_BOUGHT_USD.to_string(), flow.total_bought_usd);
            trader
                .metrics
                .insert(metric::TOTAL_SOLD_USD.to_string(), flow.total_sold_usd);
            trader.metrics.insert(
                metric::REALIZED_PROFIT_USD.to_string(),
                flow.total_sold_usd - flow.total_bought_usd,
            );
            trader.metrics.insert(
                metric::BUY_TRANSACTIONS.to_string(),
                flow.buy_transactions as f64,
            );
            trader.metrics.insert(
                metric::SELL_TRANSACTIONS.to_string(),
                flow.sell_transactions as f64,
            );
            trader
                .metrics
                .insert(metric::HOLDING_AMOUNT.to_string(), flow.holding_amount);
        }
    }

    if let Some(profiles) = data.behavior() {
        for profile in profiles {
            let trader = by_wallet
                .entry(profile.wallet.clone())
                .or_insert_with(|| Trader {
                    address: profile.wallet.clone(),
                    metrics: HashMap::new(),
                    tags: Vec::new(),
                });
            trader.tags = profile.tags.clone();
            trader
                .metrics
                .insert(metric::WINRATE.to_string(), profile.winrate);
            trader
                .metrics
                .insert(metric::PNL_PCT_7D.to_string(), profile.pnl_pct_7d);
            trader
                .metrics
                .insert(metric::PNL_PCT_30D.to_string(), profile.pnl_pct_30d);
            trader.metrics.insert(
                metric::REALIZED_PROFIT_30D.to_string(),
                profile.realized_profit_30d,
            );
            if let Some(roi) = profile.top_roi {
                trader.metrics.insert(metric::TOP_ROI.to_string(), roi);
            }
            trader.metrics.insert(
                metric::NO_BUY_HOLD_RATIO.to_string(),
                profile.no_buy_hold_ratio,
            );
            trader
                .metrics
                .insert(metric::FAST_TX_RATIO.to_string(), profile.fast_tx_ratio);
            trader.metrics.insert(
                metric::SELL_PASS_BUY_RATIO.to_string(),
                profile.sell_pass_buy_ratio,
            );
        }
    }

    if let Some(market) = data.market() {
        for trader in by_wallet.values_mut() {
            trader.metrics.insert(
                metric::TOKEN_LIQUIDITY_USD.to_string(),
                market.liquidity_usd,
            );
            trader
                .metrics
                .insert(metric::TOKEN_VOLUME_24H.to_string(), market.volume_24h);
        }
    }

    by_wallet.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        SourceKind, SourcePayload, SourceResult, TokenMarket, TraderFlow, TraderProfile,
    };

    fn trader_with(metrics: &[(&str, f64)], tags: &[&str]) -> Trader {
        Trader {
            address: "w1".to_string(),
            metrics: metrics
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn evaluator(rules: Vec<Rule>, policy: OverridePolicy) -> TraderEvaluator {
        TraderEvaluator::new(rules, RiskThresholds::default(), policy)
    }

    #[test]
    fn test_override_short_circuits_in_order() {
        // [R1: score -5, R2: forces Reject, R3: score +10] -> Reject, no R3
        let rules = vec![
            Rule::below("r1", "m", 100.0, -5.0),
            Rule::tag("r2", "bot", 0.0).forcing(Verdict::Reject),
            Rule::weighted("r3", "m", 10.0),
        ];
        let eval = evaluator(rules, OverridePolicy::FirstWins);
        let trader = trader_with(&[("m", 1.0)], &["bot"]);
        let result = eval.evaluate_trader("tok", &trader);

        assert_eq!(result.verdict, Verdict::Reject);
        assert_eq!(result.trace.len(), 2);
        assert_eq!(result.trace[0].detail, TraceDetail::Scored { delta: -5.0 });
        assert_eq!(
            result.trace[1].detail,
            TraceDetail::Override {
                verdict: Verdict::Reject
            }
        );
        assert!(!result.trace.iter().any(|t| t.rule == "r3"));
        assert!((result.score - (-5.0)).abs() < f64::EPSILON);
    }

    #[test]
    fn test_last_wins_policy_runs_all_rules() {
        let rules = vec![
            Rule::tag("r1", "bot", 0.0).forcing(Verdict::Reject),
            Rule::tag("r2", "vip", 0.0).forcing(Verdict::Pass),
        ];
        let eval = evaluator(rules, OverridePolicy::LastWins);
        let trader = trader_with(&[], &["bot", "vip"]);
        let result = eval.evaluate_trader("tok", &trader);

        assert_eq!(result.verdict, Verdict::Pass);
        assert_eq!(result.trace.len(), 2);
    }

    #[test]
    fn test_missing_metric_is_skipped_not_fatal() {
        let rules = vec![
            Rule::below("needs_pnl", metric::PNL_PCT_30D, 0.75, -25.0),
            Rule::weighted("winrate", metric::WINRATE, 20.0),
        ];
        let eval = evaluator(rules, OverridePolicy::FirstWins);
        let trader = trader_with(&[(metric::WINRATE, 0.5)], &[]);
        let result = eval.evaluate_trader("tok", &trader);

        assert_eq!(
            result.trace[0].detail,
            TraceDetail::Skipped {
                missing: metric::PNL_PCT_30D.to_string()
            }
        );
        assert!((result.score - 10.0).abs() < f64::EPSILON);
        assert_eq!(result.verdict, Verdict::Pass);
    }

    #[test]
    fn test_threshold_verdicts() {
        let eval = evaluator(
            vec![Rule::weighted("w", "m", 1.0)],
            OverridePolicy::FirstWins,
        );

        let result = eval.evaluate_trader("tok", &trader_with(&[("m", -40.0)], &[]));
        assert_eq!(result.verdict, Verdict::Reject);

        let result = eval.evaluate_trader("tok", &trader_with(&[("m", -10.0)], &[]));
        assert_eq!(result.verdict, Verdict::Flag);

        let result = eval.evaluate_trader("tok", &trader_with(&[("m", 5.0)], &[]));
        assert_eq!(result.verdict, Verdict::Pass);
    }

    #[test]
    fn test_default_rules_reject_sandwich_bot() {
        let eval = TraderEvaluator::new(
            TraderEvaluator::default_rules(),
            RiskThresholds::default(),
            OverridePolicy::FirstWins,
        );
        let trader = trader_with(
            &[(metric::WINRATE, 0.9), (metric::PNL_PCT_30D, 2.0)],
            &["sandwich_bot"],
        );
        let result = eval.evaluate_trader("tok", &trader);
        assert_eq!(result.verdict, Verdict::Reject);
    }

    fn sample_aggregate() -> AggregatedData {
        let mut results = HashMap::new();
        results.insert(
            SourceKind::Bullx,
            SourceResult::ok(
                "tok",
                SourceKind::Bullx,
                SourcePayload::TraderFlows(vec![TraderFlow {
                    wallet: "wallet_a".to_string(),
                    total_bought_usd: 1000.0,
                    total_sold_usd: 2500.0,
                    buy_transactions: 4,
                    sell_transactions: 3,
                    holding_amount: 10.0,
                }]),
                1,
            ),
        );
        results.insert(
            SourceKind::Gmgn,
            SourceResult::ok(
                "tok",
                SourceKind::Gmgn,
                SourcePayload::TraderBehavior(vec![TraderProfile {
                    wallet: "wallet_b".to_string(),
                    tags: vec!["smart_money".to_string()],
                    winrate: 0.7,
                    pnl_pct_7d: 0.3,
                    pnl_pct_30d: 1.4,
                    realized_profit_7d: 4000.0,
                    realized_profit_30d: 12000.0,
                    top_roi: Some(0.8),
                    no_buy_hold_ratio: 0.1,
                    fast_tx_ratio: 0.05,
                    sell_pass_buy_ratio: 0.01,
                }]),
                1,
            ),
        );
        results.insert(
            SourceKind::DexScreener,
            SourceResult::ok(
                "tok",
                SourceKind::DexScreener,
                SourcePayload::TokenMarket(TokenMarket {
                    name: Some("Tok".to_string()),
                    symbol: Some("TOK".to_string()),
                    price_usd: Some(0.5),
                    liquidity_usd: 80000.0,
                    volume_24h: 40000.0,
                }),
                1,
            ),
        );
        AggregatedData {
            token_address: "tok".to_string(),
            results,
            complete: true,
        }
    }

    #[test]
    fn test_merge_traders_unions_wallets() {
        let merged = merge_traders(&sample_aggregate());
        assert_eq!(merged.len(), 2);

        let a = merged.iter().find(|t| t.address == "wallet_a").unwrap();
        assert!((a.metrics[metric::REALIZED_PROFIT_USD] - 1500.0).abs() < f64::EPSILON);
        assert!((a.metrics[metric::TOKEN_LIQUIDITY_USD] - 80000.0).abs() < f64::EPSILON);
        assert!(!a.metrics.contains_key(metric::WINRATE));

        let b = merged.iter().find(|t| t.address == "wallet_b").unwrap();
        assert_eq!(b.tags, vec!["smart_money"]);
        assert!((b.metrics[metric::WINRATE] - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn test_evaluate_produces_ordered_evaluations() {
        let eval = TraderEvaluator::new(
            TraderEvaluator::default_rules(),
            RiskThresholds::default(),
            OverridePolicy::FirstWins,
        );
        let evaluations = eval.evaluate("tok", &sample_aggregate());
        assert_eq!(evaluations.len(), 2);
        assert_eq!(evaluations[0].trader, "wallet_a");
        assert_eq!(evaluations[1].trader, "wallet_b");
        // wallet_b: good winrate, strong pnl, active -> Pass
        assert_eq!(evaluations[1].verdict, Verdict::Pass);
    }
}
