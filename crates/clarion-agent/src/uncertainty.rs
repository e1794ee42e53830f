//! Certainty and regret arithmetic over proposed tool calls.
//!
//! Arguments are treated as independent: a call's certainty is the product of
//! its arguments' certainties and a sequence's certainty is the product of its
//! calls'. Correlated arguments (a start/end page pair, say) are therefore
//! scored as if unrelated.

use std::collections::BTreeMap;
use std::sync::Arc;

use clarion_core::{
    ArgRef, ArgumentState, DomainSize, RESOLVED, Tool, ToolCall, UNKNOWN, is_unknown,
};
use clarion_tooling::ToolRegistry;
use serde_json::Value;
use tracing::{debug, warn};

/// Certainty assigned to an unknown argument with an unbounded domain.
pub const EPSILON: f64 = 1e-3;

/// Certainty of one call with its per-argument breakdown.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CallCertainty {
    /// Product of the argument certainties
    pub certainty: f64,
    /// Certainty per argument name
    pub arguments: BTreeMap<String, f64>,
}

/// Certainty of a call sequence with per-call breakdowns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SequenceCertainty {
    /// Product of the call certainties
    pub certainty: f64,
    /// Breakdown keyed `"{index}_{tool_name}"`
    pub calls: BTreeMap<String, BTreeMap<String, f64>>,
}

/// Importance-weighted unresolved uncertainty.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Regret {
    /// Sum over all arguments
    pub total: f64,
    /// Regret per `"tool.arg"`
    pub arguments: BTreeMap<String, f64>,
}

/// Scores proposed calls against the registry's argument domains.
pub struct UncertaintyCalculator {
    /// Source of tool and domain definitions
    registry: Arc<ToolRegistry>,
}

impl UncertaintyCalculator {
    /// Create a calculator over a registry.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// Certainty of one argument value.
    ///
    /// Known values are certain. Unknown values get `1 / |domain|` for
    /// domains with more than one value and [`EPSILON`] otherwise, as do names
    /// the tool does not define. An unknown value is never fully certain, even
    /// when its domain admits a single value.
    pub fn arg_certainty(&self, tool: &Tool, arg_name: &str, value: &Value) -> f64 {
        if !is_unknown(value) {
            return 1.0;
        }
        let Some(arg) = tool.argument(arg_name) else {
            warn!("Unknown argument {arg_name} for tool {}", tool.name);
            return EPSILON;
        };
        match arg.domain.size() {
            DomainSize::Finite(size) if size > 1 => 1.0 / size as f64,
            DomainSize::Finite(_) | DomainSize::Infinite => EPSILON,
        }
    }

    /// Computes argument states for a call without storing them.
    fn score_call(&self, call: &ToolCall) -> Option<(f64, BTreeMap<String, ArgumentState>)> {
        let tool = self.registry.tool(&call.tool_name)?;
        let mut certainty = 1.0;
        let mut states = BTreeMap::new();
        for arg in &tool.arguments {
            let provided = call.arguments.get(&arg.name);
            // Optional arguments fall back to their default and never count as unresolved.
            let (value, arg_certainty) = if arg.required {
                let value = provided
                    .cloned()
                    .unwrap_or_else(|| Value::String(UNKNOWN.to_owned()));
                let arg_certainty = self.arg_certainty(&tool, &arg.name, &value);
                (value, arg_certainty)
            } else {
                let value = provided
                    .filter(|value| !is_unknown(value))
                    .cloned()
                    .unwrap_or_else(|| arg.default.clone().unwrap_or(Value::Null));
                (value, 1.0)
            };
            certainty *= arg_certainty;
            states.insert(
                arg.name.clone(),
                ArgumentState {
                    value,
                    certainty: arg_certainty,
                },
            );
        }
        Some((certainty, states))
    }

    /// Certainty of one call; stores fresh argument states on the call.
    ///
    /// A call to an unknown tool has certainty `0.0`.
    pub fn call_certainty(&self, call: &mut ToolCall) -> CallCertainty {
        let Some((certainty, states)) = self.score_call(call) else {
            warn!("Unknown tool: {}", call.tool_name);
            call.arg_states.clear();
            return CallCertainty::default();
        };
        let arguments = states
            .iter()
            .map(|(name, state)| (name.clone(), state.certainty))
            .collect();
        call.arg_states = states;
        debug!("{} certainty {certainty:.4}", call.tool_name);
        CallCertainty {
            certainty,
            arguments,
        }
    }

    /// Certainty of a call sequence; order independent.
    pub fn sequence_certainty(&self, calls: &mut [ToolCall]) -> SequenceCertainty {
        let mut certainty = 1.0;
        let mut breakdown = BTreeMap::new();
        for (index, call) in calls.iter_mut().enumerate() {
            let scored = self.call_certainty(call);
            certainty *= scored.certainty;
            breakdown.insert(format!("{index}_{}", call.tool_name), scored.arguments);
        }
        SequenceCertainty {
            certainty,
            calls: breakdown,
        }
    }

    /// Sum of `importance * (1 - certainty)` over every argument of every call.
    pub fn regret(&self, calls: &[ToolCall]) -> Regret {
        let mut regret = Regret::default();
        for call in calls {
            let Some(tool) = self.registry.tool(&call.tool_name) else {
                continue;
            };
            let Some((_, states)) = self.score_call(call) else {
                continue;
            };
            for arg in &tool.arguments {
                let Some(state) = states.get(&arg.name) else {
                    continue;
                };
                let arg_regret = arg.domain.importance * (1.0 - state.certainty);
                regret.total += arg_regret;
                *regret
                    .arguments
                    .entry(format!("{}.{}", call.tool_name, arg.name))
                    .or_insert(0.0) += arg_regret;
            }
        }
        regret
    }

    /// Copy of `calls` where every targeted argument holds the resolved marker.
    fn resolve_targets(&self, calls: &[ToolCall], targets: &[ArgRef]) -> Vec<ToolCall> {
        let mut resolved = calls.to_vec();
        for target in targets {
            let Some(tool) = self.registry.tool(target.tool()) else {
                continue;
            };
            if tool.argument(target.arg()).is_none() {
                continue;
            }
            for call in resolved
                .iter_mut()
                .filter(|call| call.tool_name == target.tool())
            {
                if !call.is_known(target.arg()) {
                    call.arguments
                        .insert(target.arg().to_owned(), Value::String(RESOLVED.to_owned()));
                }
            }
        }
        resolved
    }

    /// Expected value of perfect information for a question's targets.
    pub fn evpi(&self, calls: &[ToolCall], targets: &[ArgRef]) -> f64 {
        let mut current = calls.to_vec();
        let mut simulated = self.resolve_targets(calls, targets);
        let before = self.sequence_certainty(&mut current).certainty;
        let after = self.sequence_certainty(&mut simulated).certainty;
        after - before
    }

    /// Regret removed if a question's targets were resolved.
    pub fn regret_reduction(&self, calls: &[ToolCall], targets: &[ArgRef]) -> f64 {
        let simulated = self.resolve_targets(calls, targets);
        self.regret(calls).total - self.regret(&simulated).total
    }
}

/// Exploitation (`evpi + regret_reduction`) plus an exploration bonus that
/// favours rarely-asked-about arguments.
pub fn ucb_score(
    evpi: f64,
    regret_reduction: f64,
    counts: &BTreeMap<String, u32>,
    targets: &[ArgRef],
    total_clarifications: u32,
    exploration_constant: f64,
) -> f64 {
    let mean_target_count = if targets.is_empty() {
        0.0
    } else {
        let sum: u32 = targets
            .iter()
            .map(|target| counts.get(&target.key()).copied().unwrap_or(0))
            .sum();
        f64::from(sum) / targets.len() as f64
    };
    let exploration = exploration_constant
        * ((f64::from(total_clarifications) + 1.0).ln() / (mean_target_count + 1.0)).sqrt();
    evpi + regret_reduction + exploration
}

/// Minimum UCB score needed to ask another question.
pub fn dynamic_threshold(base: f64, total_clarifications: u32, alpha: f64) -> f64 {
    base * (1.0 + alpha * f64::from(total_clarifications))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use clarion_core::{Argument, ArgumentDomain};
    use clarion_tooling::{Plugin, PluginResponse, ToolResult};
    use serde_json::{Map, json};

    const AIRPORTS: [&str; 10] = [
        "SFO", "LAX", "JFK", "ORD", "SEA", "BOS", "DEN", "ATL", "MIA", "DFW",
    ];

    struct TravelPlugin;

    #[async_trait]
    impl Plugin for TravelPlugin {
        fn name(&self) -> &str {
            "travel"
        }

        fn tools(&self) -> Vec<Tool> {
            vec![
                Tool::new("book_flight", "Book a flight")
                    .with_argument(Argument::required(
                        "travel_from",
                        ArgumentDomain::finite(AIRPORTS).with_importance(0.8),
                    ))
                    .with_argument(Argument::required(
                        "travel_to",
                        ArgumentDomain::finite(AIRPORTS).with_importance(0.8),
                    ))
                    .with_argument(Argument::optional(
                        "class",
                        ArgumentDomain::finite(["economy", "business"]),
                        json!("economy"),
                    )),
                Tool::new("send_note", "Send a note").with_argument(Argument::required(
                    "text",
                    ArgumentDomain::string().with_importance(0.4),
                )),
                Tool::new("read_page", "Read one page").with_argument(Argument::required(
                    "page_num",
                    ArgumentDomain::numeric_range(1.0, 1.0),
                )),
            ]
        }

        async fn execute_tool(
            &self,
            _tool_name: &str,
            _params: &Map<String, Value>,
        ) -> ToolResult<PluginResponse> {
            Ok(PluginResponse::success("ok"))
        }
    }

    fn calculator() -> UncertaintyCalculator {
        let registry = ToolRegistry::new()
            .with_plugin(Arc::new(TravelPlugin))
            .unwrap();
        UncertaintyCalculator::new(Arc::new(registry))
    }

    fn flight() -> ToolCall {
        ToolCall::new("book_flight")
            .with_argument("travel_from", "SFO")
            .with_unknown("travel_to")
    }

    fn close(left: f64, right: f64) -> bool {
        (left - right).abs() < 1e-9
    }

    #[test]
    fn test_flight_example() {
        let calc = calculator();
        let mut call = flight();
        let scored = calc.call_certainty(&mut call);

        assert!(close(scored.arguments["travel_to"], 0.1));
        assert!(close(scored.arguments["travel_from"], 1.0));
        assert!(close(scored.arguments["class"], 1.0));
        assert!(close(scored.certainty, 0.1));
        assert_eq!(call.arg_states["class"].value, json!("economy"));
    }

    #[test]
    fn test_known_calls_are_certain() {
        let calc = calculator();
        let mut call = ToolCall::new("book_flight")
            .with_argument("travel_from", "SFO")
            .with_argument("travel_to", "LAX")
            .with_unknown("class");
        assert!(close(calc.call_certainty(&mut call).certainty, 1.0));
    }

    #[test]
    fn test_unknown_tool_and_argument() {
        let calc = calculator();
        let mut call = ToolCall::new("teleport").with_unknown("where");
        let scored = calc.call_certainty(&mut call);
        assert!(close(scored.certainty, 0.0));
        assert!(scored.arguments.is_empty());

        let tool = Tool::new("bare", "");
        assert!(close(calc.arg_certainty(&tool, "ghost", &json!(UNKNOWN)), EPSILON));
        assert!(close(calc.arg_certainty(&tool, "ghost", &json!("set")), 1.0));
    }

    #[test]
    fn test_unbounded_domain_uses_epsilon() {
        let calc = calculator();
        let mut call = ToolCall::new("send_note").with_unknown("text");
        assert!(close(calc.call_certainty(&mut call).certainty, EPSILON));
    }

    #[test]
    fn test_single_value_domain_stays_uncertain() {
        let calc = calculator();
        let mut call = ToolCall::new("read_page").with_unknown("page_num");
        let scored = calc.call_certainty(&mut call);
        assert!(scored.certainty < 1.0);
        assert!(close(scored.arguments["page_num"], EPSILON));

        let mut known = ToolCall::new("read_page").with_argument("page_num", 1);
        assert!(close(calc.call_certainty(&mut known).certainty, 1.0));
    }

    #[test]
    fn test_sequence_is_order_independent() {
        let calc = calculator();
        let note = ToolCall::new("send_note").with_unknown("text");
        let mut forward = vec![flight(), note.clone()];
        let mut backward = vec![note, flight()];

        let first = calc.sequence_certainty(&mut forward);
        let second = calc.sequence_certainty(&mut backward);
        assert!(close(first.certainty, second.certainty));
        assert!(close(first.certainty, 0.1 * EPSILON));
        assert!(first.calls.contains_key("0_book_flight"));
        assert!(second.calls.contains_key("1_book_flight"));
    }

    #[test]
    fn test_regret_breakdown() {
        let calc = calculator();
        let regret = calc.regret(&[flight()]);
        assert!(close(regret.arguments["book_flight.travel_to"], 0.8 * 0.9));
        assert!(close(regret.arguments["book_flight.travel_from"], 0.0));
        assert!(close(regret.total, 0.72));
    }

    #[test]
    fn test_evpi_and_regret_reduction() {
        let calc = calculator();
        let calls = vec![flight()];
        let target = vec![ArgRef::new("book_flight", "travel_to")];

        assert!(close(calc.evpi(&calls, &target), 0.9));
        assert!(close(calc.regret_reduction(&calls, &target), 0.72));

        let known = vec![ArgRef::new("book_flight", "travel_from")];
        assert!(close(calc.evpi(&calls, &known), 0.0));
        assert!(close(calc.regret_reduction(&calls, &known), 0.0));

        let absent = vec![ArgRef::new("send_note", "text")];
        assert!(close(calc.evpi(&calls, &absent), 0.0));
    }

    #[test]
    fn test_ucb_exploration_diminishes() {
        let targets = vec![ArgRef::new("book_flight", "travel_to")];
        let mut counts = BTreeMap::new();
        let fresh = ucb_score(0.0, 0.0, &counts, &targets, 4, 1.0);
        counts.insert("book_flight.travel_to".to_owned(), 3);
        let repeated = ucb_score(0.0, 0.0, &counts, &targets, 4, 1.0);

        assert!(fresh > repeated);
        assert!(close(fresh, 5.0f64.ln().sqrt()));
        assert!(close(ucb_score(0.2, 0.3, &BTreeMap::new(), &[], 0, 1.0), 0.5));
    }

    #[test]
    fn test_dynamic_threshold_grows() {
        assert!(close(dynamic_threshold(0.1, 0, 0.05), 0.1));
        assert!(close(dynamic_threshold(0.1, 10, 0.05), 0.15));
        assert!(dynamic_threshold(0.1, 3, 0.05) <= dynamic_threshold(0.1, 4, 0.05));
        assert!(close(dynamic_threshold(0.1, 100, 0.0), 0.1));
    }
}
