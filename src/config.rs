use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::types::{AccountId, PaymentChannel, ProductId};

/// how a product's money movements reach the general ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountingMode {
    /// no journal entries produced for this product
    None,
    Cash,
    Accrual,
}

/// GL role a resolved account plays in a posting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountRole {
    Portfolio,
    InterestReceivable,
    InterestIncome,
    FeeIncome,
    PenaltyIncome,
    FundSource,
    Provision,
    WriteOffExpense,
    OverpaymentLiability,
}

impl fmt::Display for AccountRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccountRole::Portfolio => "portfolio",
            AccountRole::InterestReceivable => "interest receivable",
            AccountRole::InterestIncome => "interest income",
            AccountRole::FeeIncome => "fee income",
            AccountRole::PenaltyIncome => "penalty income",
            AccountRole::FundSource => "fund source",
            AccountRole::Provision => "provision",
            AccountRole::WriteOffExpense => "write-off expense",
            AccountRole::OverpaymentLiability => "overpayment liability",
        };
        write!(f, "{name}")
    }
}

/// per-product GL account references, snapshotted onto each loan at creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductAccountingConfig {
    pub product_id: ProductId,
    pub mode: AccountingMode,
    pub portfolio: Option<AccountId>,
    pub interest_receivable: Option<AccountId>,
    pub interest_income: Option<AccountId>,
    pub fee_income: Option<AccountId>,
    pub penalty_income: Option<AccountId>,
    pub fund_source: Option<AccountId>,
    pub provision: Option<AccountId>,
    pub write_off_expense: Option<AccountId>,
    pub overpayment_liability: Option<AccountId>,
    /// per-channel asset account overriding the default fund source
    pub channel_mappings: HashMap<PaymentChannel, AccountId>,
    /// per-fee-definition income account overriding the default fee income
    pub fee_mappings: HashMap<Uuid, AccountId>,
}

impl ProductAccountingConfig {
    /// config for a product with no GL integration
    pub fn disabled(product_id: ProductId) -> Self {
        Self {
            product_id,
            mode: AccountingMode::None,
            portfolio: None,
            interest_receivable: None,
            interest_income: None,
            fee_income: None,
            penalty_income: None,
            fund_source: None,
            provision: None,
            write_off_expense: None,
            overpayment_liability: None,
            channel_mappings: HashMap::new(),
            fee_mappings: HashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.mode != AccountingMode::None
    }

    /// the account configured for a base role, ignoring channel/fee overrides
    pub fn role_account(&self, role: AccountRole) -> Option<AccountId> {
        match role {
            AccountRole::Portfolio => self.portfolio,
            AccountRole::InterestReceivable => self.interest_receivable,
            AccountRole::InterestIncome => self.interest_income,
            AccountRole::FeeIncome => self.fee_income,
            AccountRole::PenaltyIncome => self.penalty_income,
            AccountRole::FundSource => self.fund_source,
            AccountRole::Provision => self.provision,
            AccountRole::WriteOffExpense => self.write_off_expense,
            AccountRole::OverpaymentLiability => self.overpayment_liability,
        }
    }
}
