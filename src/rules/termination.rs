//! Statement termination rule

use crate::parser::{NodeKind, SyntaxNode};
use crate::rules::{Emitter, Rule, RuleResult};

/// Flags simple statements that are not followed by `;`
///
/// Containers (blocks, conditionals, loops, routine bodies, labels and `GO`) never need one.
#[derive(Debug, Default)]
pub struct SemicolonTermination;

impl SemicolonTermination {
    pub fn new() -> Self {
        Self
    }
}

impl Rule for SemicolonTermination {
    fn node_kinds(&self) -> &[NodeKind] {
        NodeKind::STATEMENTS
    }

    fn visit(&mut self, node: &SyntaxNode, emitter: &mut Emitter<'_>) -> RuleResult {
        if !node.kind.is_container() && !node.terminated {
            emitter.emit(node.end, "Statement not terminated with semicolon");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::rules::test_support::run_rule;
    use rstest::rstest;

    #[rstest]
    #[case::no_errors("SELECT a FROM dbo.t;\nUPDATE dbo.t SET a = 1;", vec![])]
    #[case::one_error("SELECT a FROM dbo.t\nPRINT 'x';", vec![(1, 20)])]
    #[case::two_errors("SELECT 1\nSELECT 2\nSELECT 3;", vec![(1, 9), (2, 9)])]
    #[case::tab_indented("SELECT 1;\n\tSELECT a FROM dbo.t", vec![(2, 24)])]
    #[case::nested_in_block("IF 1 = 1\nBEGIN\n    SELECT 1\nEND", vec![(3, 13)])]
    #[case::containers(
        "BEGIN TRY\n    SELECT 1;\nEND TRY\nBEGIN CATCH\n    SELECT 2;\nEND CATCH\nGO\nWHILE 1 = 1\nBEGIN\n    BREAK;\nEND",
        vec![]
    )]
    fn test_semicolon_termination(#[case] sql: &str, #[case] expected: Vec<(u32, u32)>) {
        assert_eq!(run_rule("semicolon-termination", sql), expected);
    }
}
