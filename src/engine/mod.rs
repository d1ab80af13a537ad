//! Rule dispatch engine
//!
//! CDD Principle: Domain Services - One traversal feeds every active rule
//! - A dispatch table maps each node kind to the rules registered for it, in registration order
//! - Rules see nodes on entry (pre-order) and on exit (post-order), never each other's findings
//! - A rule that fails is isolated: its failure becomes a finding and the others carry on

use crate::domain::violations::{LintError, Violation};
use crate::parser::{NodeKind, Script, SyntaxNode};
use crate::rules::{ActiveRule, Emitter};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Visit,
    Leave,
}

/// Walks a parsed script once, offering each node to the rules that registered its kind
#[derive(Debug, Default, Clone, Copy)]
pub struct DispatchEngine;

impl DispatchEngine {
    pub fn new() -> Self {
        Self
    }

    /// Run `rules` over `script` and return their findings ordered by position
    pub fn run(&self, script: &Script, rules: Vec<ActiveRule>) -> Vec<Violation> {
        let mut walk = Walk::new(rules);
        walk.node(&script.root);

        let mut violations = walk.sink;
        violations.sort();
        violations
    }
}

/// State of one traversal
struct Walk {
    rules: Vec<ActiveRule>,
    table: HashMap<NodeKind, Vec<usize>>,
    faulted: Vec<bool>,
    sink: Vec<Violation>,
}

impl Walk {
    fn new(rules: Vec<ActiveRule>) -> Self {
        let mut table: HashMap<NodeKind, Vec<usize>> = HashMap::new();
        for (index, active) in rules.iter().enumerate() {
            for kind in active.rule.node_kinds() {
                let entry = table.entry(*kind).or_default();
                if entry.last() != Some(&index) {
                    entry.push(index);
                }
            }
        }

        Self {
            faulted: vec![false; rules.len()],
            rules,
            table,
            sink: Vec::new(),
        }
    }

    fn node(&mut self, node: &SyntaxNode) {
        self.offer(node, Phase::Visit);
        for child in &node.children {
            self.node(child);
        }
        self.offer(node, Phase::Leave);
    }

    fn offer(&mut self, node: &SyntaxNode, phase: Phase) {
        let Some(indices) = self.table.get(&node.kind) else {
            return;
        };

        for &index in indices {
            if self.faulted[index] {
                continue;
            }

            let active = &mut self.rules[index];
            let rule = &mut active.rule;
            let mut emitter = Emitter::new(&active.name, active.severity, &mut self.sink);
            let outcome = catch_unwind(AssertUnwindSafe(|| match phase {
                Phase::Visit => rule.visit(node, &mut emitter),
                Phase::Leave => rule.leave(node, &mut emitter),
            }));

            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(error)) => error.message,
                Err(payload) => panic_message(payload.as_ref()),
            };

            let error = LintError::rule_internal(active.name.clone(), failure);
            tracing::warn!("{} at {}; rule disabled for this script", error, node.start);
            self.sink.push(Violation::new(
                active.name.clone(),
                active.severity,
                node.start,
                error.to_string(),
            ));
            self.faulted[index] = true;
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::violations::{Position, Severity};
    use crate::parser::{CompatibilityLevel, ScriptParser, SqlParser};
    use crate::rules::{Rule, RuleError, RuleResult};
    use std::sync::{Arc, Mutex};

    fn parse(sql: &str) -> Script {
        SqlParser::default().parse(sql, CompatibilityLevel::default()).unwrap()
    }

    /// Records every callback it receives into a shared log
    struct Recorder {
        label: &'static str,
        kinds: Vec<NodeKind>,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Rule for Recorder {
        fn node_kinds(&self) -> &[NodeKind] {
            &self.kinds
        }

        fn visit(&mut self, node: &SyntaxNode, _emitter: &mut Emitter<'_>) -> RuleResult {
            self.log.lock().unwrap().push(format!("{}:visit:{:?}", self.label, node.kind));
            Ok(())
        }

        fn leave(&mut self, node: &SyntaxNode, _emitter: &mut Emitter<'_>) -> RuleResult {
            self.log.lock().unwrap().push(format!("{}:leave:{:?}", self.label, node.kind));
            Ok(())
        }
    }

    /// Emits at every statement, fails on the n-th one
    struct Faulty {
        fail_at: usize,
        seen: usize,
        panics: bool,
    }

    impl Rule for Faulty {
        fn node_kinds(&self) -> &[NodeKind] {
            NodeKind::STATEMENTS
        }

        fn visit(&mut self, node: &SyntaxNode, emitter: &mut Emitter<'_>) -> RuleResult {
            self.seen += 1;
            if self.seen == self.fail_at {
                if self.panics {
                    panic!("boom");
                }
                return Err(RuleError::new("gave up"));
            }
            emitter.emit(node.start, "statement");
            Ok(())
        }
    }

    fn active(name: &str, rule: impl Rule + 'static) -> ActiveRule {
        ActiveRule::new(name, Severity::Error, Box::new(rule))
    }

    #[test]
    fn test_pre_and_post_order_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let rules = vec![
            active(
                "first",
                Recorder {
                    label: "a",
                    kinds: vec![NodeKind::If, NodeKind::Select],
                    log: Arc::clone(&log),
                },
            ),
            active(
                "second",
                Recorder {
                    label: "b",
                    kinds: vec![NodeKind::Select],
                    log: Arc::clone(&log),
                },
            ),
        ];

        let violations = DispatchEngine::new().run(&parse("IF 1 = 1\n    SELECT 1;"), rules);
        assert!(violations.is_empty());
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "a:visit:If",
                "a:visit:Select",
                "b:visit:Select",
                "a:leave:Select",
                "b:leave:Select",
                "a:leave:If",
            ]
        );
    }

    #[test]
    fn test_duplicate_kinds_are_offered_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let rules = vec![active(
            "dup",
            Recorder {
                label: "a",
                kinds: vec![NodeKind::Print, NodeKind::Print],
                log: Arc::clone(&log),
            },
        )];

        DispatchEngine::new().run(&parse("PRINT 'x';"), rules);
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_output_is_sorted() {
        let script = parse("PRINT 'x';\nSELECT * FROM dbo.t;");
        let rules = vec![
            active("select-star", crate::rules::prohibit::SelectStar::new()),
            active("print-statement", crate::rules::prohibit::PrintStatement::new()),
            active(
                "set-ansi",
                crate::rules::required::RequiredStatement::set_ansi(),
            ),
        ];

        let violations = DispatchEngine::new().run(&script, rules);
        let keys: Vec<_> = violations
            .iter()
            .map(|v| (v.line, v.column, v.rule_name.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![(1, 1, "print-statement"), (1, 1, "set-ansi"), (2, 8, "select-star")]
        );
    }

    #[test]
    fn test_failing_rule_is_isolated() {
        let script = parse("SELECT 1;\nSELECT 2;\nSELECT 3;");
        let rules = vec![
            active(
                "faulty",
                Faulty {
                    fail_at: 2,
                    seen: 0,
                    panics: false,
                },
            ),
            active(
                "healthy",
                Faulty {
                    fail_at: usize::MAX,
                    seen: 0,
                    panics: false,
                },
            ),
        ];

        let violations = DispatchEngine::new().run(&script, rules);
        let faulty: Vec<_> = violations.iter().filter(|v| v.rule_name == "faulty").collect();
        let healthy = violations.iter().filter(|v| v.rule_name == "healthy").count();

        assert_eq!(healthy, 3);
        assert_eq!(faulty.len(), 2);
        assert_eq!(faulty[1].position(), Position::new(2, 1));
        assert!(faulty[1].message.contains("gave up"));
    }

    #[test]
    fn test_panicking_rule_is_isolated() {
        let script = parse("SELECT 1;\nSELECT 2;");
        let rules = vec![
            active(
                "panicky",
                Faulty {
                    fail_at: 1,
                    seen: 0,
                    panics: true,
                },
            ),
            active("print-statement", crate::rules::prohibit::PrintStatement::new()),
        ];

        let violations = DispatchEngine::new().run(&script, rules);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule_name, "panicky");
        assert_eq!(violations[0].position(), Position::START);
        assert!(violations[0].message.contains("boom"));
    }

    #[test]
    fn test_runs_are_deterministic() {
        let sql = "select * from t;\nPRINT 'x'\nIF 1 = 1 SELECT a FROM b;";
        let run = || {
            let registry = crate::rules::RuleRegistry::build(&Default::default(), Vec::new()).unwrap();
            DispatchEngine::new().run(&parse(sql), registry.instantiate().unwrap())
        };

        let first = run();
        assert!(!first.is_empty());
        assert_eq!(first, run());
        assert!(first.windows(2).all(|pair| pair[0] <= pair[1]));
    }
}
