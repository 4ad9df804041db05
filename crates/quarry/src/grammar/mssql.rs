use super::{quote_with, Dialect, Grammar};

/// Microsoft SQL Server (T-SQL).
///
/// A bare limit renders as `TOP n` before the column list. Once an offset is
/// involved the statement switches to `OFFSET m ROWS FETCH NEXT n ROWS ONLY`,
/// which T-SQL only accepts after an ORDER BY.
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlGrammar;

impl Grammar for MssqlGrammar {
    fn dialect(&self) -> Dialect {
        Dialect::Mssql
    }

    fn quote_identifier(&self, ident: &str) -> String {
        quote_with(ident, '[', ']')
    }

    fn native_placeholder(&self, index: usize) -> String {
        format!("@P{index}")
    }

    fn top(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
        match (limit, offset) {
            (Some(l), None) => Some(format!("TOP {l}")),
            _ => None,
        }
    }

    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
        let offset = offset?;
        Some(match limit {
            Some(l) => format!("OFFSET {offset} ROWS FETCH NEXT {l} ROWS ONLY"),
            None => format!("OFFSET {offset} ROWS"),
        })
    }

    fn offset_requires_order(&self) -> bool {
        true
    }
}
