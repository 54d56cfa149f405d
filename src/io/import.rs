use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim};
use serde::Deserialize;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::application::{AppError, LedgerService};
use crate::domain::{parse_points, Points, TransactionKind, UserId};

/// One requested mutation read from a batch file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// 1-based line in the source file (header is line 1)
    pub line: usize,
    pub user_id: UserId,
    pub kind: TransactionKind,
    pub amount: Points,
}

/// A row that could not be turned into an [`Operation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportError {
    pub line: usize,
    pub field: Option<String>,
    pub error: String,
}

/// Result of parsing a batch file.
#[derive(Debug, Clone, Default)]
pub struct ParsedOperations {
    pub operations: Vec<Operation>,
    pub errors: Vec<ImportError>,
}

/// An operation the ledger refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub operation: Operation,
    pub error: AppError,
}

/// Result of applying operations to the ledger.
#[derive(Debug, Clone, Default)]
pub struct ImportResult {
    pub applied: usize,
    pub rejected: Vec<Rejection>,
}

#[derive(Debug, Deserialize)]
struct OperationRecord {
    user_id: String,
    kind: String,
    amount: String,
}

/// Loads batches of charge/use operations into the ledger.
pub struct Importer {
    service: Arc<LedgerService>,
}

impl Importer {
    pub fn new(service: Arc<LedgerService>) -> Self {
        Self { service }
    }

    /// Parse `user_id,kind,amount` rows. Malformed rows are collected as
    /// errors; parsing continues with the next row.
    pub fn parse_operations_csv<R: Read>(reader: R) -> ParsedOperations {
        let mut csv_reader = ReaderBuilder::new().trim(Trim::All).from_reader(reader);
        let mut parsed = ParsedOperations::default();

        for (row_idx, result) in csv_reader.deserialize::<OperationRecord>().enumerate() {
            let line = row_idx + 2;

            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    parsed.errors.push(ImportError {
                        line,
                        field: None,
                        error: format!("CSV parse error: {}", e),
                    });
                    continue;
                }
            };

            match parse_record(line, &record) {
                Ok(operation) => parsed.operations.push(operation),
                Err(error) => parsed.errors.push(error),
            }
        }

        parsed
    }

    /// Apply operations. Rows for the same user run in file order; different
    /// users run concurrently, one task each.
    pub async fn apply(&self, operations: Vec<Operation>) -> Result<ImportResult> {
        let mut per_user: BTreeMap<UserId, Vec<Operation>> = BTreeMap::new();
        for operation in operations {
            per_user.entry(operation.user_id).or_default().push(operation);
        }

        let mut tasks = JoinSet::new();
        for (user_id, operations) in per_user {
            let service = Arc::clone(&self.service);
            tasks.spawn(async move {
                let mut applied = 0;
                let mut rejected = Vec::new();
                for operation in operations {
                    match service
                        .apply(user_id, operation.kind, operation.amount)
                        .await
                    {
                        Ok(balance) => {
                            applied += 1;
                            debug!(line = operation.line, user_id, balance = balance.amount, "row applied");
                        }
                        Err(error) => {
                            warn!("Line {}: {}", operation.line, error);
                            rejected.push(Rejection { operation, error });
                        }
                    }
                }
                (applied, rejected)
            });
        }

        let mut result = ImportResult::default();
        while let Some(joined) = tasks.join_next().await {
            let (applied, rejected) = joined.context("Import task failed")?;
            result.applied += applied;
            result.rejected.extend(rejected);
        }
        result.rejected.sort_by_key(|r| r.operation.line);

        Ok(result)
    }

    /// Parse and apply in one step.
    pub async fn import_csv<R: Read>(&self, reader: R) -> Result<(ParsedOperations, ImportResult)> {
        let mut parsed = Self::parse_operations_csv(reader);
        for error in &parsed.errors {
            warn!("Line {}: {}", error.line, error.error);
        }
        let operations = std::mem::take(&mut parsed.operations);
        let result = self.apply(operations).await?;
        Ok((parsed, result))
    }
}

fn parse_record(line: usize, record: &OperationRecord) -> Result<Operation, ImportError> {
    let user_id = record.user_id.parse::<UserId>().map_err(|e| ImportError {
        line,
        field: Some("user_id".to_string()),
        error: format!("Invalid user id '{}': {}", record.user_id, e),
    })?;
    if user_id == 0 {
        return Err(ImportError {
            line,
            field: Some("user_id".to_string()),
            error: "User id must be positive".to_string(),
        });
    }

    let kind = TransactionKind::from_str(&record.kind).ok_or_else(|| ImportError {
        line,
        field: Some("kind".to_string()),
        error: format!("Invalid kind '{}' (expected charge or use)", record.kind),
    })?;

    let amount = parse_points(&record.amount).map_err(|e| ImportError {
        line,
        field: Some("amount".to_string()),
        error: format!("Invalid amount '{}': {}", record.amount, e),
    })?;

    Ok(Operation {
        line,
        user_id,
        kind,
        amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_rows() {
        let data = "user_id,kind,amount\n1,charge,1000\n1, USE ,500\n2,Charge,\"1,500\"\n";
        let parsed = Importer::parse_operations_csv(data.as_bytes());

        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        assert_eq!(parsed.operations.len(), 3);
        assert_eq!(
            parsed.operations[1],
            Operation {
                line: 3,
                user_id: 1,
                kind: TransactionKind::Use,
                amount: 500
            }
        );
        assert_eq!(parsed.operations[2].amount, 1500);
    }

    #[test]
    fn test_parse_collects_errors_with_lines() {
        let data =
            "user_id,kind,amount\nabc,charge,10\n1,refund,10\n1,charge,ten\n1,use,5\n0,charge,1\n";
        let parsed = Importer::parse_operations_csv(data.as_bytes());

        assert_eq!(parsed.operations.len(), 1);
        let lines: Vec<usize> = parsed.errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![2, 3, 4, 6]);
        assert_eq!(parsed.errors[1].field.as_deref(), Some("kind"));
    }

    #[test]
    fn test_negative_amount_parses_and_is_left_to_the_ledger() {
        let data = "user_id,kind,amount\n1,charge,-5\n";
        let parsed = Importer::parse_operations_csv(data.as_bytes());
        assert_eq!(parsed.operations[0].amount, -5);
    }

    #[tokio::test]
    async fn test_apply_keeps_per_user_order() {
        let service = Arc::new(LedgerService::default());
        let importer = Importer::new(Arc::clone(&service));

        let data = "user_id,kind,amount\n1,charge,1000\n2,use,10\n1,use,500\n1,use,600\n2,charge,10\n";
        let (parsed, result) = importer.import_csv(data.as_bytes()).await.unwrap();

        assert!(parsed.errors.is_empty());
        assert_eq!(result.applied, 3);
        let lines: Vec<usize> = result.rejected.iter().map(|r| r.operation.line).collect();
        assert_eq!(lines, vec![3, 5]);
        assert_eq!(service.get_balance(1).amount, 500);
        assert_eq!(service.get_balance(2).amount, 10);
    }
}
