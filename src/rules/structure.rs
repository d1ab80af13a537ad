//! Structural pairing rule for conditional blocks

use crate::parser::{NodeKind, SyntaxNode};
use crate::rules::{Emitter, Rule, RuleResult};

/// Flags IF and ELSE branches whose body is not a BEGIN ... END block
#[derive(Debug, Default)]
pub struct ConditionalBeginEnd {
    depth: usize,
}

impl ConditionalBeginEnd {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_branch(&self, node: &SyntaxNode, emitter: &mut Emitter<'_>) {
        let Some(body) = node.statements().next() else {
            return;
        };
        let exempt = body.is(NodeKind::BeginEnd) || (node.is(NodeKind::ElseClause) && body.is(NodeKind::If));
        if exempt {
            return;
        }

        let mut message = format!(
            "Expected BEGIN and END statement within {} block",
            node.text.to_ascii_uppercase()
        );
        if self.depth > 1 {
            message.push_str(&format!(" (nested conditional at depth {})", self.depth));
        }
        emitter.emit(node.start, message);
    }
}

impl Rule for ConditionalBeginEnd {
    fn node_kinds(&self) -> &[NodeKind] {
        &[NodeKind::If, NodeKind::ElseClause]
    }

    fn visit(&mut self, node: &SyntaxNode, emitter: &mut Emitter<'_>) -> RuleResult {
        if node.is(NodeKind::If) {
            self.depth += 1;
        }
        self.check_branch(node, emitter);
        Ok(())
    }

    fn leave(&mut self, node: &SyntaxNode, _emitter: &mut Emitter<'_>) -> RuleResult {
        if node.is(NodeKind::If) {
            self.depth = self.depth.saturating_sub(1);
        }
        Ok(())
    }
}
