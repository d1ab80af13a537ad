//! Required-statement rules
//!
//! Each rule is a latch: it waits for a prerequisite statement, and the first disqualifying
//! statement seen before it produces one violation at the top of the script.

use crate::domain::violations::Position;
use crate::parser::{NodeDetail, NodeKind, SyntaxNode};
use crate::rules::{Emitter, Rule, RuleResult};

/// Which statements satisfy the rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prerequisite {
    /// `SET <option> ON`, possibly among other options in the same statement
    OptionOn(&'static str),
    /// `SET TRANSACTION ISOLATION LEVEL ...` with any level
    IsolationLevel,
}

/// Which statements fire the rule while it is unsatisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disqualifier {
    /// Anything except SET, USE, GO, DECLARE and PRINT
    AnyStatement,
    /// SELECT, INSERT, UPDATE, DELETE and MERGE
    RowsetAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Latch {
    Waiting,
    Satisfied,
    Reported,
}

#[derive(Debug)]
pub struct RequiredStatement {
    prerequisite: Prerequisite,
    disqualifier: Disqualifier,
    message: &'static str,
    latch: Latch,
}

impl RequiredStatement {
    fn new(prerequisite: Prerequisite, disqualifier: Disqualifier, message: &'static str) -> Self {
        Self {
            prerequisite,
            disqualifier,
            message,
            latch: Latch::Waiting,
        }
    }

    pub fn set_ansi() -> Self {
        Self::new(
            Prerequisite::OptionOn("ANSI_NULLS"),
            Disqualifier::AnyStatement,
            "Expected SET ANSI_NULLS ON near top of file",
        )
    }

    pub fn set_nocount() -> Self {
        Self::new(
            Prerequisite::OptionOn("NOCOUNT"),
            Disqualifier::RowsetAction,
            "Expected SET NOCOUNT ON near top of file",
        )
    }

    pub fn set_quoted_identifier() -> Self {
        Self::new(
            Prerequisite::OptionOn("QUOTED_IDENTIFIER"),
            Disqualifier::AnyStatement,
            "Expected SET QUOTED_IDENTIFIER ON near top of file",
        )
    }

    pub fn set_transaction_isolation_level() -> Self {
        Self::new(
            Prerequisite::IsolationLevel,
            Disqualifier::RowsetAction,
            "Expected SET TRANSACTION ISOLATION LEVEL near top of file",
        )
    }

    fn satisfies(&self, node: &SyntaxNode) -> bool {
        match (self.prerequisite, &node.detail) {
            (Prerequisite::OptionOn(option), NodeDetail::SetOption { options, value }) => {
                value == "ON" && options.iter().any(|o| o == option)
            }
            (Prerequisite::IsolationLevel, _) => node.is(NodeKind::SetIsolationLevel),
            _ => false,
        }
    }

    fn disqualifies(&self, node: &SyntaxNode) -> bool {
        match self.disqualifier {
            Disqualifier::RowsetAction => node.kind.is_rowset_action(),
            Disqualifier::AnyStatement => !matches!(
                node.kind,
                NodeKind::SetOption
                    | NodeKind::SetIsolationLevel
                    | NodeKind::SetVariable
                    | NodeKind::Use
                    | NodeKind::BatchSeparator
                    | NodeKind::Declare
                    | NodeKind::Print
            ),
        }
    }
}

impl Rule for RequiredStatement {
    fn node_kinds(&self) -> &[NodeKind] {
        NodeKind::STATEMENTS
    }

    fn visit(&mut self, node: &SyntaxNode, emitter: &mut Emitter<'_>) -> RuleResult {
        if self.latch != Latch::Waiting {
            return Ok(());
        }

        if self.satisfies(node) {
            self.latch = Latch::Satisfied;
        } else if self.disqualifies(node) {
            emitter.emit(Position::START, self.message);
            self.latch = Latch::Reported;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::rules::test_support::run_rule;
    use rstest::rstest;

    #[rstest]
    #[case::satisfied_first("SET ANSI_NULLS ON;\nSELECT 1;", vec![])]
    #[case::after_declare_and_print("DECLARE @a INT;\nPRINT 'x';\nSET ANSI_NULLS ON;\nSELECT 1;", vec![])]
    #[case::combined_options("SET ANSI_NULLS, QUOTED_IDENTIFIER ON;\nSELECT 1;", vec![])]
    #[case::missing("SELECT 1;\nSELECT 2;", vec![(1, 1)])]
    #[case::too_late("SELECT 1;\nSET ANSI_NULLS ON;\nSELECT 2;", vec![(1, 1)])]
    #[case::turned_off("SET ANSI_NULLS OFF;\nSELECT 1;", vec![(1, 1)])]
    #[case::any_statement("EXEC dbo.p;\nSET ANSI_NULLS ON;", vec![(1, 1)])]
    fn test_set_ansi(#[case] sql: &str, #[case] expected: Vec<(u32, u32)>) {
        assert_eq!(run_rule("set-ansi", sql), expected);
    }

    #[rstest]
    #[case::satisfied("SET QUOTED_IDENTIFIER ON;\nCREATE TABLE dbo.t (id INT);", vec![])]
    #[case::missing("CREATE TABLE dbo.t (id INT);", vec![(1, 1)])]
    fn test_set_quoted_identifier(#[case] sql: &str, #[case] expected: Vec<(u32, u32)>) {
        assert_eq!(run_rule("set-quoted-identifier", sql), expected);
    }

    #[rstest]
    #[case::satisfied("SET NOCOUNT ON;\nSELECT 1;", vec![])]
    #[case::no_rowset_action("EXEC dbo.p;\nPRINT 'done';", vec![])]
    #[case::inside_procedure(
        "CREATE PROCEDURE dbo.p AS\nBEGIN\n    SET NOCOUNT ON;\n    SELECT 1;\nEND",
        vec![]
    )]
    #[case::missing("UPDATE dbo.t SET a = 1;\nDELETE FROM dbo.t;", vec![(1, 1)])]
    fn test_set_nocount(#[case] sql: &str, #[case] expected: Vec<(u32, u32)>) {
        assert_eq!(run_rule("set-nocount", sql), expected);
    }

    #[rstest]
    #[case::satisfied("SET TRANSACTION ISOLATION LEVEL SNAPSHOT;\nSELECT 1;", vec![])]
    #[case::missing("SELECT 1;", vec![(1, 1)])]
    #[case::late("INSERT INTO dbo.t VALUES (1);\nSET TRANSACTION ISOLATION LEVEL READ COMMITTED;", vec![(1, 1)])]
    fn test_set_transaction_isolation_level(#[case] sql: &str, #[case] expected: Vec<(u32, u32)>) {
        assert_eq!(run_rule("set-transaction-isolation-level", sql), expected);
    }
}
