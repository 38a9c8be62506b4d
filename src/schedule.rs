use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::loan::{LoanAccount, LoanTerms, ScheduleEntry};
use crate::types::{InterestMethod, LoanId};

/// generates and maintains amortization schedules. Rows are created in bulk
/// at disbursement or regeneration and mutated incrementally as payments
/// arrive or are reversed.
pub struct ScheduleEngine;

impl ScheduleEngine {
    /// produce one row per installment, due dates spaced by the configured
    /// frequency, principal/interest split per the interest method
    pub fn generate(
        loan_id: LoanId,
        terms: &LoanTerms,
        start_date: NaiveDate,
    ) -> Result<Vec<ScheduleEntry>> {
        if terms.term_periods == 0 {
            return Err(LedgerError::InsufficientScheduleData { loan_id });
        }

        let splits = match terms.interest_method {
            InterestMethod::DecliningBalance => Self::declining_balance(terms),
            InterestMethod::FlatRate => Self::flat_rate(terms),
            InterestMethod::DecliningBalanceEqualInstallment => Self::equal_installment(terms),
        };

        let rows = splits
            .into_iter()
            .enumerate()
            .map(|(i, (principal_due, interest_due))| {
                let n = i as u32 + 1;
                ScheduleEntry {
                    loan_id,
                    installment_number: n,
                    due_date: terms.frequency.due_date(start_date, n),
                    principal_due,
                    interest_due,
                    fee_due: Money::ZERO,
                    total_due: principal_due + interest_due,
                    paid_amount: Money::ZERO,
                }
            })
            .collect();
        Ok(rows)
    }

    /// equal principal portions, interest on the remaining balance
    fn declining_balance(terms: &LoanTerms) -> Vec<(Money, Money)> {
        let n = terms.term_periods;
        let rate = terms
            .interest_rate
            .period_rate(terms.frequency.periods_per_year());
        let base_principal = terms.principal / Decimal::from(n);

        let mut splits = Vec::with_capacity(n as usize);
        let mut balance = terms.principal;
        for i in 1..=n {
            // last installment absorbs the rounding remainder
            let principal_due = if i == n { balance } else { base_principal };
            let interest_due = balance * rate;
            splits.push((principal_due, interest_due));
            balance -= principal_due;
        }
        splits
    }

    /// interest charged on the full principal for every period, principal
    /// split evenly
    fn flat_rate(terms: &LoanTerms) -> Vec<(Money, Money)> {
        let n = terms.term_periods;
        let rate = terms
            .interest_rate
            .period_rate(terms.frequency.periods_per_year());
        let base_principal = terms.principal / Decimal::from(n);
        let interest_per_period = terms.principal * rate;

        let mut splits = Vec::with_capacity(n as usize);
        let mut remaining = terms.principal;
        for i in 1..=n {
            let principal_due = if i == n { remaining } else { base_principal };
            splits.push((principal_due, interest_per_period));
            remaining -= principal_due;
        }
        splits
    }

    /// equal total installments (EMI), interest on the remaining balance
    fn equal_installment(terms: &LoanTerms) -> Vec<(Money, Money)> {
        let n = terms.term_periods;
        let rate = terms
            .interest_rate
            .period_rate(terms.frequency.periods_per_year());
        let emi = Self::installment_amount(terms.principal, rate, n);

        let mut splits = Vec::with_capacity(n as usize);
        let mut balance = terms.principal;
        for i in 1..=n {
            let interest_due = balance * rate;
            let principal_due = if i == n {
                // final installment clears the balance exactly
                balance
            } else {
                (emi - interest_due).min(balance)
            };
            splits.push((principal_due, interest_due));
            balance -= principal_due;
        }
        splits
    }

    /// EMI = P * r * (1 + r)^n / ((1 + r)^n - 1)
    fn installment_amount(principal: Money, period_rate: Decimal, periods: u32) -> Money {
        if period_rate.is_zero() {
            return principal / Decimal::from(periods);
        }
        let mut compound = Decimal::ONE;
        let base = Decimal::ONE + period_rate;
        for _ in 0..periods {
            compound *= base;
        }
        let numerator = principal.as_decimal() * period_rate * compound;
        let denominator = compound - Decimal::ONE;
        Money::from_decimal(numerator / denominator)
    }

    /// apply a payment to schedule rows oldest-due-first, reducing each
    /// row's outstanding until the amount is exhausted. Returns the amount
    /// actually absorbed by the schedule.
    pub fn apply_payment(rows: &mut [ScheduleEntry], amount: Money) -> Money {
        let mut remaining = amount;
        for row in rows.iter_mut() {
            if remaining.is_zero() {
                break;
            }
            let portion = remaining.min(row.outstanding());
            row.paid_amount += portion;
            remaining -= portion;
        }
        amount - remaining
    }

    /// un-apply a reversed payment newest-paid-first (LIFO), reducing each
    /// row's paid amount until the full amount has been backed out. Returns
    /// the amount actually removed.
    pub fn unapply_payment(rows: &mut [ScheduleEntry], amount: Money) -> Money {
        let mut remaining = amount;
        for row in rows.iter_mut().rev() {
            if remaining.is_zero() {
                break;
            }
            let portion = remaining.min(row.paid_amount);
            row.paid_amount -= portion;
            remaining -= portion;
        }
        amount - remaining
    }

    /// whether the observed day-spacing of the existing rows disagrees with
    /// the spacing a fresh schedule would have by more than one day
    pub fn needs_regeneration(
        existing: &[ScheduleEntry],
        terms: &LoanTerms,
        start_date: NaiveDate,
    ) -> bool {
        if existing.len() < 2 {
            return false;
        }
        let actual = (existing[1].due_date - existing[0].due_date).num_days();
        let expected = (terms.frequency.due_date(start_date, 2)
            - terms.frequency.due_date(start_date, 1))
        .num_days();
        (actual - expected).abs() > 1
    }

    /// rebuild the schedule from current loan terms and reapply the summed
    /// historical payments oldest-first, preserving paid-vs-outstanding
    /// state across the new installment boundaries. Returns `None` when the
    /// existing spacing already matches and regeneration was not forced.
    pub fn regenerate(
        loan: &LoanAccount,
        existing: &[ScheduleEntry],
        historical_paid: Money,
        force: bool,
    ) -> Result<Option<Vec<ScheduleEntry>>> {
        if existing.is_empty() {
            return Err(LedgerError::InsufficientScheduleData { loan_id: loan.id });
        }
        let start_date = loan.disbursed_on.unwrap_or(existing[0].due_date);
        if !force && !Self::needs_regeneration(existing, &loan.terms, start_date) {
            return Ok(None);
        }

        let mut rows = Self::generate(loan.id, &loan.terms, start_date)?;
        if historical_paid.is_positive() {
            Self::apply_payment(&mut rows, historical_paid);
        }
        Ok(Some(rows))
    }
}
