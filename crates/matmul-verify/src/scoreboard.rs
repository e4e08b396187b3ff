//! Scoreboard
//!
//! Pairs the expected stream with the actual stream strictly in arrival order: the n-th
//! expected transaction is compared with the n-th actual one, whatever the cycle distance
//! between them. Anything left unpaired when both producers have finished is a stream
//! imbalance (a dropped or duplicated valid pulse).

use crate::error::{VerifyError, VerifyResult};
use crate::monitor::{Transaction, TransactionReceiver};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// What to do after the first mismatching pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Record the first mismatch in full, count but do not compare the rest
    #[default]
    FailFast,
    /// Compare every pair and record every mismatch
    CollectAll,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    /// Pairing position, 0-based
    pub position: usize,
    pub expected: Transaction,
    pub actual: Transaction,
}

impl Mismatch {
    /// First differing cell, row-major
    pub fn first_difference(&self) -> Option<(usize, usize)> {
        self.expected.matrix.first_difference(&self.actual.matrix)
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "element mismatch at position {}: expected matrix {} (input cycle {}), got matrix {} (output cycle {})",
            self.position,
            self.expected.matrix,
            self.expected.cycle,
            self.actual.matrix,
            self.actual.cycle
        )?;
        if let Some((i, j)) = self.first_difference() {
            write!(f, "; first difference at [{}][{}]", i, j)?;
        }
        Ok(())
    }
}

/// Unpaired transactions left at the end of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamImbalance {
    pub expected_total: usize,
    pub actual_total: usize,
    /// Expected transactions no output ever matched
    pub missing: Vec<Transaction>,
    /// Output transactions nothing was expected for
    pub unexpected: Vec<Transaction>,
}

impl fmt::Display for StreamImbalance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stream imbalance: {} expected transactions, {} actual",
            self.expected_total, self.actual_total
        )?;
        if let Some(first) = self.missing.first() {
            write!(
                f,
                "; {} without output, first from input cycle {}",
                self.missing.len(),
                first.cycle
            )?;
        }
        if let Some(first) = self.unexpected.first() {
            write!(
                f,
                "; {} unexpected outputs, first at cycle {}",
                self.unexpected.len(),
                first.cycle
            )?;
        }
        Ok(())
    }
}

/// Everything that went wrong in one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreboardFailure {
    pub name: String,
    pub compared: usize,
    pub matched: usize,
    pub mismatches: Vec<Mismatch>,
    pub imbalance: Option<StreamImbalance>,
}

impl fmt::Display for ScoreboardFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Scoreboard '{}' failed: {} of {} compared transactions matched",
            self.name, self.matched, self.compared
        )?;
        for mismatch in &self.mismatches {
            write!(f, "\n  {}", mismatch)?;
        }
        if let Some(imbalance) = &self.imbalance {
            write!(f, "\n  {}", imbalance)?;
        }
        Ok(())
    }
}

impl std::error::Error for ScoreboardFailure {}

/// Final state of a scoreboard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreboardReport {
    pub name: String,
    pub expected: usize,
    pub received: usize,
    pub compared: usize,
    pub matched: usize,
    pub mismatches: Vec<Mismatch>,
    pub leftover_expected: Vec<Transaction>,
    pub leftover_actual: Vec<Transaction>,
}

impl ScoreboardReport {
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty()
            && self.leftover_expected.is_empty()
            && self.leftover_actual.is_empty()
            && self.expected == self.received
    }

    pub fn failure(&self) -> Option<ScoreboardFailure> {
        if self.passed() {
            return None;
        }
        let imbalance = (self.expected != self.received
            || !self.leftover_expected.is_empty()
            || !self.leftover_actual.is_empty())
        .then(|| StreamImbalance {
            expected_total: self.expected,
            actual_total: self.received,
            missing: self.leftover_expected.clone(),
            unexpected: self.leftover_actual.clone(),
        });
        Some(ScoreboardFailure {
            name: self.name.clone(),
            compared: self.compared,
            matched: self.matched,
            mismatches: self.mismatches.clone(),
            imbalance,
        })
    }

    /// The report itself on success, one consolidated error otherwise
    pub fn into_result(self) -> VerifyResult<Self> {
        match self.failure() {
            None => Ok(self),
            Some(failure) => Err(VerifyError::Scoreboard(Box::new(failure))),
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "expected={}, received={}, compared={}, matched={}, errors={}, expQ: {}, recvQ: {}",
            self.expected,
            self.received,
            self.compared,
            self.matched,
            self.mismatches.len(),
            self.leftover_expected.len(),
            self.leftover_actual.len()
        )
    }
}

pub struct Scoreboard {
    name: String,
    policy: FailurePolicy,
    exp_q: VecDeque<Transaction>,
    recv_q: VecDeque<Transaction>,
    expected: usize,
    received: usize,
    compared: usize,
    matched: usize,
    mismatches: Vec<Mismatch>,
}

impl Scoreboard {
    pub fn new(name: impl Into<String>, policy: FailurePolicy) -> Self {
        Scoreboard {
            name: name.into(),
            policy,
            exp_q: VecDeque::new(),
            recv_q: VecDeque::new(),
            expected: 0,
            received: 0,
            compared: 0,
            matched: 0,
            mismatches: Vec::new(),
        }
    }

    pub fn add_expected(&mut self, transaction: Transaction) {
        self.exp_q.push_back(transaction);
        self.expected += 1;
        self.compare();
    }

    pub fn add_actual(&mut self, transaction: Transaction) {
        self.recv_q.push_back(transaction);
        self.received += 1;
        self.compare();
    }

    fn halted(&self) -> bool {
        self.policy == FailurePolicy::FailFast && !self.mismatches.is_empty()
    }

    fn compare(&mut self) {
        while !self.exp_q.is_empty() && !self.recv_q.is_empty() {
            let (Some(expected), Some(actual)) = (self.exp_q.pop_front(), self.recv_q.pop_front())
            else {
                break;
            };
            let position = self.compared;
            self.compared += 1;
            if self.halted() {
                continue;
            }

            if expected.matrix == actual.matrix {
                self.matched += 1;
                debug!(
                    "Scoreboard '{}': transaction {} matched (cycle {} -> {})",
                    self.name, position, expected.cycle, actual.cycle
                );
            } else {
                let mismatch = Mismatch {
                    position,
                    expected,
                    actual,
                };
                warn!("Scoreboard '{}': {}", self.name, mismatch);
                self.mismatches.push(mismatch);
            }
        }
    }

    /// Number of transactions waiting for a partner, `(expected, actual)`
    pub fn pending(&self) -> (usize, usize) {
        (self.exp_q.len(), self.recv_q.len())
    }

    pub fn report(self) -> ScoreboardReport {
        ScoreboardReport {
            name: self.name,
            expected: self.expected,
            received: self.received,
            compared: self.compared,
            matched: self.matched,
            mismatches: self.mismatches,
            leftover_expected: self.exp_q.into(),
            leftover_actual: self.recv_q.into(),
        }
    }

    /// Consume both streams until both producers hang up
    pub async fn run(
        mut self,
        mut expected: TransactionReceiver,
        mut actual: TransactionReceiver,
    ) -> ScoreboardReport {
        loop {
            tokio::select! {
                biased;
                Some(transaction) = expected.recv() => self.add_expected(transaction),
                Some(transaction) = actual.recv() => self.add_actual(transaction),
                else => break,
            }
        }
        let report = self.report();
        debug!("Scoreboard '{}' finished: {}", report.name, report.summary());
        report
    }

    pub fn spawn(
        self,
        expected: TransactionReceiver,
        actual: TransactionReceiver,
    ) -> JoinHandle<ScoreboardReport> {
        tokio::spawn(self.run(expected, actual))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Matrix;
    use tokio::sync::mpsc;

    fn txn(cycle: u64, values: &[[u64; 2]; 2]) -> Transaction {
        Transaction {
            cycle,
            matrix: Matrix::from_u64_rows(9, values).unwrap(),
        }
    }

    #[test]
    fn test_in_order_pairs_pass() {
        let mut sb = Scoreboard::new("dut", FailurePolicy::FailFast);
        sb.add_expected(txn(4, &[[19, 22], [43, 50]]));
        sb.add_expected(txn(6, &[[1, 2], [3, 4]]));
        assert_eq!(sb.pending(), (2, 0));
        sb.add_actual(txn(5, &[[19, 22], [43, 50]]));
        sb.add_actual(txn(7, &[[1, 2], [3, 4]]));
        assert_eq!(sb.pending(), (0, 0));

        let report = sb.report();
        assert!(report.passed());
        assert_eq!(report.matched, 2);
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_actual_may_arrive_first() {
        let mut sb = Scoreboard::new("dut", FailurePolicy::FailFast);
        sb.add_actual(txn(5, &[[1, 1], [1, 1]]));
        assert_eq!(sb.pending(), (0, 1));
        sb.add_expected(txn(4, &[[1, 1], [1, 1]]));
        assert!(sb.report().passed());
    }

    #[test]
    fn test_single_element_mismatch_reported() {
        let mut sb = Scoreboard::new("dut", FailurePolicy::FailFast);
        sb.add_expected(txn(4, &[[19, 22], [43, 50]]));
        sb.add_actual(txn(5, &[[19, 22], [43, 51]]));

        let report = sb.report();
        assert!(!report.passed());
        assert_eq!(report.mismatches.len(), 1);
        assert_eq!(report.mismatches[0].first_difference(), Some((1, 1)));

        let err = report.into_result().unwrap_err();
        let text = err.to_string();
        assert!(text.contains("element mismatch at position 0"), "{}", text);
        assert!(text.contains("first difference at [1][1]"), "{}", text);
    }

    #[test]
    fn test_fail_fast_stops_comparing() {
        let mut sb = Scoreboard::new("dut", FailurePolicy::FailFast);
        for cycle in 0..3 {
            sb.add_expected(txn(cycle, &[[1, 1], [1, 1]]));
            sb.add_actual(txn(cycle + 1, &[[2, 2], [2, 2]]));
        }
        let report = sb.report();
        assert_eq!(report.compared, 3);
        assert_eq!(report.mismatches.len(), 1);
        assert_eq!(report.matched, 0);
    }

    #[test]
    fn test_collect_all_records_every_mismatch() {
        let mut sb = Scoreboard::new("dut", FailurePolicy::CollectAll);
        sb.add_expected(txn(0, &[[1, 1], [1, 1]]));
        sb.add_expected(txn(2, &[[2, 2], [2, 2]]));
        sb.add_expected(txn(4, &[[3, 3], [3, 3]]));
        sb.add_actual(txn(1, &[[0, 1], [1, 1]]));
        sb.add_actual(txn(3, &[[2, 2], [2, 2]]));
        sb.add_actual(txn(5, &[[3, 3], [3, 0]]));

        let report = sb.report();
        assert_eq!(report.matched, 1);
        let positions: Vec<usize> = report.mismatches.iter().map(|m| m.position).collect();
        assert_eq!(positions, vec![0, 2]);
    }

    #[test]
    fn test_leftovers_are_imbalance() {
        let mut sb = Scoreboard::new("dut", FailurePolicy::FailFast);
        sb.add_expected(txn(0, &[[1, 1], [1, 1]]));
        sb.add_expected(txn(2, &[[2, 2], [2, 2]]));
        sb.add_actual(txn(1, &[[1, 1], [1, 1]]));

        let failure = sb.report().failure().unwrap();
        assert!(failure.mismatches.is_empty());
        let imbalance = failure.imbalance.unwrap();
        assert_eq!(imbalance.expected_total, 2);
        assert_eq!(imbalance.actual_total, 1);
        assert_eq!(imbalance.missing.len(), 1);
        assert_eq!(imbalance.missing[0].cycle, 2);

        let mut sb = Scoreboard::new("dut", FailurePolicy::FailFast);
        sb.add_actual(txn(1, &[[1, 1], [1, 1]]));
        let failure = sb.report().failure().unwrap();
        assert_eq!(failure.imbalance.unwrap().unexpected.len(), 1);
    }

    #[tokio::test]
    async fn test_run_drains_both_channels() {
        let (exp_tx, exp_rx) = mpsc::unbounded_channel();
        let (act_tx, act_rx) = mpsc::unbounded_channel();
        let handle = Scoreboard::new("dut", FailurePolicy::FailFast).spawn(exp_rx, act_rx);

        for cycle in 0..10u64 {
            act_tx.send(txn(cycle * 2 + 1, &[[cycle, 0], [0, cycle]])).unwrap();
            exp_tx.send(txn(cycle * 2, &[[cycle, 0], [0, cycle]])).unwrap();
        }
        drop(exp_tx);
        drop(act_tx);

        let report = handle.await.unwrap();
        assert!(report.passed(), "{}", report.summary());
        assert_eq!(report.matched, 10);
    }
}
