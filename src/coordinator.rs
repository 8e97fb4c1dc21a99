//! Statement coordination
//!
//! Takes an already-built [`StatementDescriptor`] and drives it to
//! completion against the driver binding: ordering of paired members,
//! batched round trips with sequential fallback, generated-key read-back,
//! affected-row reconciliation, and deadline arithmetic before every
//! physical round trip.

use crate::descriptor::{
    BatchStatement, GeneratedKeySpec, PairedBatchStatement, PairedStatement, RowSemantics,
    SimpleStatement, StatementDescriptor,
};
use crate::driver::{DriverBinding, DriverCapabilities};
use crate::error::{Error, Result};
use crate::reconcile;
use crate::stream::RowStream;
use crate::types::{ParamGroup, Row, Value};
use std::time::{Duration, Instant};

/// Transaction facts the coordinator needs to gate execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionContext {
    pub in_transaction: bool,
}

/// Metadata valid only for the statement just executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionMetadata {
    pub in_transaction: bool,
    pub elapsed: Duration,
}

/// Affected-row result of a modifying descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    /// Total affected rows (first member for paired descriptors).
    pub affected: u64,
    /// Per-item affected rows, one entry per submitted parameter group in
    /// submission order.
    pub per_item: Vec<u64>,
    /// Server-generated identity values read back, in row order.
    pub generated_keys: Vec<Value>,
    pub metadata: ExecutionMetadata,
}

/// Executes statement descriptors against a borrowed driver binding.
///
/// The coordinator is stateless apart from the capability snapshot taken
/// at setup; the session owns the connection and lends it per call.
pub struct StatementCoordinator {
    capabilities: DriverCapabilities,
}

impl StatementCoordinator {
    pub fn new(capabilities: DriverCapabilities) -> Self {
        Self { capabilities }
    }

    pub fn capabilities(&self) -> &DriverCapabilities {
        &self.capabilities
    }

    /// Execute a modifying descriptor.
    pub fn execute(
        &self,
        driver: &mut dyn DriverBinding,
        descriptor: &StatementDescriptor,
        ctx: &ExecutionContext,
    ) -> Result<ExecutionResult> {
        self.execute_returning(driver, descriptor, ctx, &mut [])
    }

    /// Execute a modifying descriptor, binding generated keys back into
    /// the caller's rows by position.
    pub fn execute_returning(
        &self,
        driver: &mut dyn DriverBinding,
        descriptor: &StatementDescriptor,
        ctx: &ExecutionContext,
        rows: &mut [Row],
    ) -> Result<ExecutionResult> {
        descriptor.validate()?;
        let started = Instant::now();
        let deadline = descriptor.timeout().map(|t| started + t);

        let (affected, per_item, generated_keys) = match descriptor {
            StatementDescriptor::Simple(stmt) => {
                tracing::debug!(sql = %stmt.sql, "executing simple statement");
                self.execute_simple(driver, stmt, deadline, rows)?
            }
            StatementDescriptor::Paired(pair) => {
                // pure guard, checked before touching the connection
                if !ctx.in_transaction {
                    return Err(Error::ChildWithoutTransaction);
                }
                tracing::debug!(first = %pair.first.sql, second = %pair.second.sql, "executing paired statement");
                self.execute_paired(driver, pair, deadline, rows)?
            }
            StatementDescriptor::Batch(batch) => {
                tracing::debug!(sql = %batch.sql, size = batch.len(), "executing batch statement");
                self.execute_batch(driver, batch, deadline, rows)?
            }
            StatementDescriptor::PairedBatch(pair) => {
                if !ctx.in_transaction {
                    return Err(Error::ChildWithoutTransaction);
                }
                tracing::debug!(
                    first = %pair.first.sql,
                    second = %pair.second.sql,
                    size = pair.first.len(),
                    "executing paired batch statement"
                );
                self.execute_paired_batch(driver, pair, deadline, rows)?
            }
        };

        Ok(ExecutionResult {
            affected,
            per_item,
            generated_keys,
            metadata: ExecutionMetadata {
                in_transaction: ctx.in_transaction,
                elapsed: started.elapsed(),
            },
        })
    }

    /// Open a row stream for a query descriptor. A batch query produces
    /// one result sequence per parameter group, consumed lazily in order.
    pub fn query<'d>(
        &self,
        driver: &'d mut dyn DriverBinding,
        descriptor: &StatementDescriptor,
    ) -> Result<RowStream<'d>> {
        descriptor.validate()?;
        let deadline = descriptor.timeout().map(|t| Instant::now() + t);
        let (queries, optimistic_lock) = match descriptor {
            StatementDescriptor::Simple(stmt) => (
                vec![(stmt.sql.clone(), stmt.params.clone())],
                stmt.optimistic_lock,
            ),
            StatementDescriptor::Batch(batch) => (
                batch
                    .param_groups
                    .iter()
                    .map(|group| (batch.sql.clone(), group.clone()))
                    .collect(),
                batch.optimistic_lock,
            ),
            StatementDescriptor::Paired(_) | StatementDescriptor::PairedBatch(_) => {
                return Err(Error::InvalidDescriptor(
                    "paired descriptors cannot produce a row stream".to_string(),
                ));
            }
        };
        self.apply_deadline(driver, deadline)?;
        RowStream::open(driver, queries, optimistic_lock)
    }

    fn execute_simple(
        &self,
        driver: &mut dyn DriverBinding,
        stmt: &SimpleStatement,
        deadline: Option<Instant>,
        rows: &mut [Row],
    ) -> Result<(u64, Vec<u64>, Vec<Value>)> {
        let (affected, keys) = self.run_update(driver, stmt, deadline, rows)?;
        reconcile::check_optimistic_lock(expects_rows(stmt), affected, 0).into_result()?;
        if stmt.row_semantics == RowSemantics::ExactlyOne && affected > 1 {
            tracing::warn!(sql = %stmt.sql, affected, "expected exactly one affected row");
        }
        Ok((affected, vec![affected], keys))
    }

    /// Execute one simple statement and read its generated keys, without
    /// reconciliation.
    fn run_update(
        &self,
        driver: &mut dyn DriverBinding,
        stmt: &SimpleStatement,
        deadline: Option<Instant>,
        rows: &mut [Row],
    ) -> Result<(u64, Vec<Value>)> {
        self.apply_deadline(driver, deadline)?;
        let affected = driver.execute_update(&stmt.sql, &stmt.params)?;
        let keys = self.read_generated_keys(driver, stmt.generated_keys.as_ref(), rows)?;
        Ok((affected, keys))
    }

    fn execute_paired(
        &self,
        driver: &mut dyn DriverBinding,
        pair: &PairedStatement,
        deadline: Option<Instant>,
        rows: &mut [Row],
    ) -> Result<(u64, Vec<u64>, Vec<Value>)> {
        // The first member always fully completes before the second
        // begins; the second depends on the first's identifiers.
        let (first_affected, keys) = self.run_update(driver, &pair.first, deadline, rows)?;

        if pair.conflict_tolerant && first_affected == 0 {
            tracing::debug!("conflict-tolerant pair affected no rows; skipping second member");
            return Ok((0, vec![0], keys));
        }
        reconcile::check_optimistic_lock(expects_rows(&pair.first), first_affected, 0)
            .into_result()?;

        let second = match pair.key_param_index {
            Some(position) => {
                let mut stmt = pair.second.clone();
                let key = keys.first().cloned().ok_or(Error::GeneratedKeyCountMismatch {
                    expected: 1,
                    actual: 0,
                })?;
                set_param(&mut stmt.params, position, key)?;
                stmt
            }
            None => pair.second.clone(),
        };

        let (second_affected, _) = self.run_update(driver, &second, deadline, rows)?;
        reconcile::check_optimistic_lock(expects_rows(&pair.second), second_affected, 0)
            .into_result()?;
        reconcile::check_pair(first_affected, second_affected).into_result()?;

        Ok((first_affected, vec![first_affected], keys))
    }

    fn execute_batch(
        &self,
        driver: &mut dyn DriverBinding,
        batch: &BatchStatement,
        deadline: Option<Instant>,
        rows: &mut [Row],
    ) -> Result<(u64, Vec<u64>, Vec<Value>)> {
        let counts = self.run_batch(
            driver,
            &batch.sql,
            &batch.param_groups,
            expects_rows_batch(batch),
            deadline,
        )?;
        let keys = self.read_generated_keys(driver, batch.generated_keys.as_ref(), rows)?;
        let total = counts.iter().sum();
        Ok((total, counts, keys))
    }

    fn execute_paired_batch(
        &self,
        driver: &mut dyn DriverBinding,
        pair: &PairedBatchStatement,
        deadline: Option<Instant>,
        rows: &mut [Row],
    ) -> Result<(u64, Vec<u64>, Vec<Value>)> {
        // Conflict-tolerant pairs expect zero-row items from the first
        // member, so its optimistic check is suspended and the zero items
        // are dropped from the second member instead.
        let first_expects = !pair.conflict_tolerant && expects_rows_batch(&pair.first);
        let first_counts = self.run_batch(
            driver,
            &pair.first.sql,
            &pair.first.param_groups,
            first_expects,
            deadline,
        )?;
        let keys = self.read_generated_keys(driver, pair.first.generated_keys.as_ref(), rows)?;

        let live: Vec<usize> = first_counts
            .iter()
            .enumerate()
            .filter(|(_, &count)| count > 0 || !pair.conflict_tolerant)
            .map(|(i, _)| i)
            .collect();

        if live.is_empty() {
            tracing::debug!("conflict-tolerant batch pair affected no rows; skipping second member");
            return Ok((0, first_counts, keys));
        }

        let mut second_groups = Vec::with_capacity(live.len());
        for &index in &live {
            let mut group = pair.second.param_groups[index].clone();
            if let Some(position) = pair.key_param_index {
                let key = keys
                    .get(index)
                    .cloned()
                    .ok_or(Error::GeneratedKeyCountMismatch {
                        expected: index + 1,
                        actual: keys.len(),
                    })?;
                set_param(&mut group, position, key)?;
            }
            second_groups.push(group);
        }

        let second_counts = self.run_batch(
            driver,
            &pair.second.sql,
            &second_groups,
            expects_rows_batch(&pair.second),
            deadline,
        )?;

        // reconcile per item: the first differing pair is fatal
        for (slot, &index) in live.iter().enumerate() {
            reconcile::check_pair(first_counts[index], second_counts[slot]).into_result()?;
        }

        let total = first_counts.iter().sum();
        Ok((total, first_counts, keys))
    }

    /// Execute one batch, batched where the driver supports it and
    /// sequentially otherwise, reconciling per item so the first bad item
    /// aborts before further round trips.
    fn run_batch(
        &self,
        driver: &mut dyn DriverBinding,
        sql: &str,
        param_groups: &[ParamGroup],
        expects_rows: bool,
        deadline: Option<Instant>,
    ) -> Result<Vec<u64>> {
        if param_groups.is_empty() {
            return Ok(Vec::new());
        }
        if self.capabilities.batch_updates {
            self.apply_deadline(driver, deadline)?;
            let counts = driver.execute_batch(sql, param_groups)?;
            reconcile::check_batch_len(param_groups.len(), counts.len()).into_result()?;
            for (index, &count) in counts.iter().enumerate() {
                reconcile::check_optimistic_lock(expects_rows, count, index).into_result()?;
            }
            Ok(counts)
        } else {
            let mut counts = Vec::with_capacity(param_groups.len());
            for (index, group) in param_groups.iter().enumerate() {
                self.apply_deadline(driver, deadline)?;
                let count = driver.execute_update(sql, group)?;
                reconcile::check_optimistic_lock(expects_rows, count, index).into_result()?;
                counts.push(count);
            }
            Ok(counts)
        }
    }

    fn read_generated_keys(
        &self,
        driver: &mut dyn DriverBinding,
        spec: Option<&GeneratedKeySpec>,
        rows: &mut [Row],
    ) -> Result<Vec<Value>> {
        let Some(spec) = spec else {
            return Ok(Vec::new());
        };
        if !self.capabilities.generated_keys {
            return Err(Error::Unsupported("generated keys".to_string()));
        }
        let keys = driver.generated_keys()?;
        if keys.len() != spec.expected_rows {
            return Err(Error::GeneratedKeyCountMismatch {
                expected: spec.expected_rows,
                actual: keys.len(),
            });
        }
        for (key, row) in keys.iter().zip(rows.iter_mut()) {
            row.set(spec.column_index, key.clone())?;
        }
        Ok(keys)
    }

    /// Recompute the remaining time before a physical round trip. Time
    /// already spent on earlier members is deducted; a spent deadline
    /// fails without issuing a round trip that cannot be honored.
    fn apply_deadline(
        &self,
        driver: &mut dyn DriverBinding,
        deadline: Option<Instant>,
    ) -> Result<()> {
        let Some(deadline) = deadline else {
            return Ok(());
        };
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(Error::Timeout);
        }
        if self.capabilities.statement_timeout {
            driver.set_statement_timeout(Some(remaining))?;
        }
        Ok(())
    }
}

fn expects_rows(stmt: &SimpleStatement) -> bool {
    stmt.optimistic_lock || stmt.row_semantics == RowSemantics::ExactlyOne
}

fn expects_rows_batch(batch: &BatchStatement) -> bool {
    batch.optimistic_lock || batch.row_semantics == RowSemantics::ExactlyOne
}

fn set_param(params: &mut ParamGroup, position: usize, value: Value) -> Result<()> {
    let width = params.len();
    match params.get_mut(position) {
        Some(slot) => {
            *slot = value;
            Ok(())
        }
        None => Err(Error::ColumnOutOfRange {
            index: position,
            width,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::PairOrder;
    use crate::mock::{MockDriver, StatementKind};

    fn coordinator(driver: &MockDriver) -> StatementCoordinator {
        StatementCoordinator::new(driver.capabilities())
    }

    fn in_tx() -> ExecutionContext {
        ExecutionContext {
            in_transaction: true,
        }
    }

    fn no_tx() -> ExecutionContext {
        ExecutionContext {
            in_transaction: false,
        }
    }

    #[test]
    fn optimistic_lock_zero_rows_never_succeeds() {
        let mut driver = MockDriver::new();
        driver.push_update_result(Ok(0));
        let coordinator = coordinator(&driver);

        let descriptor = StatementDescriptor::Simple(
            SimpleStatement::new("UPDATE t SET v = ? WHERE id = ? AND version = ?")
                .with_optimistic_lock(),
        );
        let err = coordinator
            .execute(&mut driver, &descriptor, &no_tx())
            .unwrap_err();
        assert_eq!(err, Error::OptimisticLockFailed { index: 0 });
    }

    #[test]
    fn paired_outside_transaction_fails_before_any_driver_call() {
        let mut driver = MockDriver::new();
        let coordinator = coordinator(&driver);

        let descriptor = StatementDescriptor::Paired(PairedStatement::new(
            SimpleStatement::new("INSERT INTO parent VALUES (?)"),
            SimpleStatement::new("INSERT INTO child VALUES (?)"),
            PairOrder::ParentFirst,
        ));
        let err = coordinator
            .execute(&mut driver, &descriptor, &no_tx())
            .unwrap_err();
        assert_eq!(err, Error::ChildWithoutTransaction);
        assert_eq!(driver.counts().total(), 0);
    }

    #[test]
    fn paired_members_execute_strictly_in_order_and_reconcile() {
        let mut driver = MockDriver::new();
        driver.push_update_result(Ok(1));
        driver.push_update_result(Ok(1));
        let coordinator = coordinator(&driver);

        let descriptor = StatementDescriptor::Paired(PairedStatement::new(
            SimpleStatement::new("INSERT INTO parent VALUES (?)"),
            SimpleStatement::new("INSERT INTO child VALUES (?)"),
            PairOrder::ParentFirst,
        ));
        let result = coordinator
            .execute(&mut driver, &descriptor, &in_tx())
            .unwrap();
        assert_eq!(result.affected, 1);

        let executed = driver.executed();
        assert_eq!(executed.len(), 2);
        assert!(executed[0].sql.contains("parent"));
        assert!(executed[1].sql.contains("child"));
    }

    #[test]
    fn paired_mismatch_is_fatal() {
        let mut driver = MockDriver::new();
        driver.push_update_result(Ok(2));
        driver.push_update_result(Ok(1));
        let coordinator = coordinator(&driver);

        let descriptor = StatementDescriptor::Paired(PairedStatement::new(
            SimpleStatement::new("UPDATE parent SET v = ?"),
            SimpleStatement::new("UPDATE child SET v = ?"),
            PairOrder::ParentFirst,
        ));
        let err = coordinator
            .execute(&mut driver, &descriptor, &in_tx())
            .unwrap_err();
        assert_eq!(err, Error::ParentChildMismatch { first: 2, second: 1 });
    }

    #[test]
    fn conflict_tolerant_pair_short_circuits_on_zero_first_rows() {
        let mut driver = MockDriver::new();
        driver.push_update_result(Ok(0));
        let coordinator = coordinator(&driver);

        let descriptor = StatementDescriptor::Paired(
            PairedStatement::new(
                SimpleStatement::new("INSERT INTO parent VALUES (?) ON CONFLICT DO NOTHING"),
                SimpleStatement::new("INSERT INTO child VALUES (?)"),
                PairOrder::ParentFirst,
            )
            .conflict_tolerant(),
        );
        let result = coordinator
            .execute(&mut driver, &descriptor, &in_tx())
            .unwrap();
        assert_eq!(result.affected, 0);
        // the second member was never issued
        assert_eq!(driver.counts().execute_update, 1);
    }

    #[test]
    fn generated_keys_are_bound_into_caller_rows_and_second_member_params() {
        let mut driver = MockDriver::new();
        driver.push_update_result(Ok(1));
        driver.push_generated_keys(vec![Value::Int(42)]);
        driver.push_update_result(Ok(1));
        let coordinator = coordinator(&driver);

        let descriptor = StatementDescriptor::Paired(
            PairedStatement::new(
                SimpleStatement::new("INSERT INTO parent (name) VALUES (?)")
                    .with_params(vec![Value::text("a")])
                    .with_generated_keys(GeneratedKeySpec {
                        column_index: 0,
                        expected_rows: 1,
                    }),
                SimpleStatement::new("INSERT INTO child (id, extra) VALUES (?, ?)")
                    .with_params(vec![Value::Null, Value::text("b")]),
                PairOrder::ParentFirst,
            )
            .with_key_param_index(0),
        );
        let mut rows = vec![Row::new(vec![Value::Null, Value::text("a")])];
        let result = coordinator
            .execute_returning(&mut driver, &descriptor, &in_tx(), &mut rows)
            .unwrap();

        assert_eq!(result.affected, 1);
        assert_eq!(result.generated_keys, vec![Value::Int(42)]);
        assert_eq!(rows[0].get(0), Some(&Value::Int(42)));

        // the child statement received the generated id
        let executed = driver.executed();
        assert_eq!(executed[1].param_groups[0][0], Value::Int(42));
    }

    #[test]
    fn generated_key_count_mismatch_is_detected() {
        let mut driver = MockDriver::new();
        driver.push_update_result(Ok(2));
        driver.push_generated_keys(vec![Value::Int(1)]);
        let coordinator = coordinator(&driver);

        let descriptor = StatementDescriptor::Simple(
            SimpleStatement::new("INSERT INTO t VALUES (?), (?)").with_generated_keys(
                GeneratedKeySpec {
                    column_index: 0,
                    expected_rows: 2,
                },
            ),
        );
        let err = coordinator
            .execute(&mut driver, &descriptor, &no_tx())
            .unwrap_err();
        assert_eq!(
            err,
            Error::GeneratedKeyCountMismatch {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn batch_yields_one_count_per_group_in_order() {
        let mut driver = MockDriver::new();
        driver.push_batch_result(Ok(vec![1, 1, 1]));
        let coordinator = coordinator(&driver);

        let groups = vec![
            vec![Value::Int(1)],
            vec![Value::Int(2)],
            vec![Value::Int(3)],
        ];
        let descriptor =
            StatementDescriptor::Batch(BatchStatement::new("INSERT INTO t VALUES (?)", groups));
        let result = coordinator
            .execute(&mut driver, &descriptor, &no_tx())
            .unwrap();
        assert_eq!(result.per_item, vec![1, 1, 1]);
        assert_eq!(result.affected, 3);
        assert_eq!(driver.counts().execute_batch, 1);
    }

    #[test]
    fn partial_batch_result_is_an_error() {
        let mut driver = MockDriver::new();
        driver.push_batch_result(Ok(vec![1, 1]));
        let coordinator = coordinator(&driver);

        let groups = vec![
            vec![Value::Int(1)],
            vec![Value::Int(2)],
            vec![Value::Int(3)],
        ];
        let descriptor =
            StatementDescriptor::Batch(BatchStatement::new("INSERT INTO t VALUES (?)", groups));
        let err = coordinator
            .execute(&mut driver, &descriptor, &no_tx())
            .unwrap_err();
        assert_eq!(
            err,
            Error::BatchSizeMismatch {
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn sequential_fallback_aborts_on_the_first_bad_item() {
        let mut driver = MockDriver::with_capabilities(DriverCapabilities {
            batch_updates: false,
            ..DriverCapabilities::default()
        });
        driver.push_update_result(Ok(1));
        driver.push_update_result(Ok(0));
        driver.push_update_result(Ok(1));
        let coordinator = StatementCoordinator::new(driver.capabilities());

        let groups = vec![
            vec![Value::Int(1)],
            vec![Value::Int(2)],
            vec![Value::Int(3)],
        ];
        let descriptor = StatementDescriptor::Batch(
            BatchStatement::new("UPDATE t SET v = 1 WHERE id = ?", groups).with_optimistic_lock(),
        );
        let err = coordinator
            .execute(&mut driver, &descriptor, &no_tx())
            .unwrap_err();
        assert_eq!(err, Error::OptimisticLockFailed { index: 1 });
        // the third item was never issued
        assert_eq!(driver.counts().execute_update, 2);
    }

    #[test]
    fn spent_deadline_fails_without_a_round_trip() {
        let mut driver = MockDriver::new();
        let coordinator = coordinator(&driver);

        let descriptor = StatementDescriptor::Simple(
            SimpleStatement::new("SELECT pg_sleep(10)").with_timeout(Duration::ZERO),
        );
        let err = coordinator
            .execute(&mut driver, &descriptor, &no_tx())
            .unwrap_err();
        assert_eq!(err, Error::Timeout);
        assert_eq!(driver.counts().execute_update, 0);
    }

    #[test]
    fn remaining_time_is_forwarded_to_the_driver() {
        let mut driver = MockDriver::new();
        let coordinator = coordinator(&driver);

        let descriptor = StatementDescriptor::Simple(
            SimpleStatement::new("UPDATE t SET v = 1").with_timeout(Duration::from_secs(30)),
        );
        coordinator
            .execute(&mut driver, &descriptor, &no_tx())
            .unwrap();
        assert_eq!(driver.counts().set_statement_timeout, 1);
        assert!(driver.last_timeout().unwrap() <= Duration::from_secs(30));
    }

    #[test]
    fn paired_batch_filters_conflicted_items_from_the_second_member() {
        let mut driver = MockDriver::new();
        driver.push_batch_result(Ok(vec![1, 0, 1]));
        driver.push_batch_result(Ok(vec![1, 1]));
        let coordinator = coordinator(&driver);

        let first = BatchStatement::new(
            "INSERT INTO parent VALUES (?) ON CONFLICT DO NOTHING",
            vec![
                vec![Value::Int(1)],
                vec![Value::Int(2)],
                vec![Value::Int(3)],
            ],
        );
        let second = BatchStatement::new(
            "INSERT INTO child VALUES (?)",
            vec![
                vec![Value::Int(1)],
                vec![Value::Int(2)],
                vec![Value::Int(3)],
            ],
        );
        let descriptor = StatementDescriptor::PairedBatch(
            PairedBatchStatement::new(first, second, PairOrder::ParentFirst).conflict_tolerant(),
        );
        let result = coordinator
            .execute(&mut driver, &descriptor, &in_tx())
            .unwrap();
        assert_eq!(result.affected, 2);
        assert_eq!(result.per_item, vec![1, 0, 1]);

        let executed = driver.executed();
        assert_eq!(executed[1].kind, StatementKind::Batch);
        assert_eq!(
            executed[1].param_groups,
            vec![vec![Value::Int(1)], vec![Value::Int(3)]]
        );
    }

    #[test]
    fn paired_batch_mismatch_reports_the_offending_item() {
        let mut driver = MockDriver::new();
        driver.push_batch_result(Ok(vec![1, 1]));
        driver.push_batch_result(Ok(vec![1, 2]));
        let coordinator = coordinator(&driver);

        let first = BatchStatement::new(
            "UPDATE parent SET v = ?",
            vec![vec![Value::Int(1)], vec![Value::Int(2)]],
        );
        let second = BatchStatement::new(
            "UPDATE child SET v = ?",
            vec![vec![Value::Int(1)], vec![Value::Int(2)]],
        );
        let descriptor = StatementDescriptor::PairedBatch(PairedBatchStatement::new(
            first,
            second,
            PairOrder::ParentFirst,
        ));
        let err = coordinator
            .execute(&mut driver, &descriptor, &in_tx())
            .unwrap_err();
        assert_eq!(err, Error::ParentChildMismatch { first: 1, second: 2 });
    }

    #[test]
    fn query_on_paired_descriptor_is_rejected() {
        let mut driver = MockDriver::new();
        let coordinator = coordinator(&driver);

        let descriptor = StatementDescriptor::Paired(PairedStatement::new(
            SimpleStatement::new("SELECT 1"),
            SimpleStatement::new("SELECT 2"),
            PairOrder::ParentFirst,
        ));
        let err = coordinator.query(&mut driver, &descriptor).unwrap_err();
        assert!(matches!(err, Error::InvalidDescriptor(_)));
    }
}
