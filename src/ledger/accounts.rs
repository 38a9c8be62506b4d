use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::types::{AccountId, AccountType, TenantId};

/// chart-of-accounts entry. The running balance is derived state, mutated
/// only through journal posting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub tenant_id: TenantId,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub category: String,
    pub active: bool,
    pub balance: Money,
}

impl Account {
    pub fn new(
        tenant_id: TenantId,
        code: impl Into<String>,
        name: impl Into<String>,
        account_type: AccountType,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            code: code.into(),
            name: name.into(),
            account_type,
            category: category.into(),
            active: true,
            balance: Money::ZERO,
        }
    }

    /// apply a posted debit to the running balance
    pub fn apply_debit(&mut self, amount: Money) {
        if self.account_type.debit_increases() {
            self.balance += amount;
        } else {
            self.balance -= amount;
        }
    }

    /// apply a posted credit to the running balance
    pub fn apply_credit(&mut self, amount: Money) {
        if self.account_type.debit_increases() {
            self.balance -= amount;
        } else {
            self.balance += amount;
        }
    }

    /// accounts referenced by posted entries are deactivated, never deleted
    pub fn deactivate(&mut self) {
        self.active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_balance_moves_with_debits() {
        let mut cash = Account::new(Uuid::new_v4(), "1001", "Cash", AccountType::Asset, "current");
        cash.apply_debit(Money::from_major(500));
        assert_eq!(cash.balance, Money::from_major(500));
        cash.apply_credit(Money::from_major(200));
        assert_eq!(cash.balance, Money::from_major(300));
    }

    #[test]
    fn test_income_balance_moves_with_credits() {
        let mut income = Account::new(
            Uuid::new_v4(),
            "4001",
            "Interest Income",
            AccountType::Income,
            "operating",
        );
        income.apply_credit(Money::from_major(100));
        assert_eq!(income.balance, Money::from_major(100));
        income.apply_debit(Money::from_major(40));
        assert_eq!(income.balance, Money::from_major(60));
    }
}
