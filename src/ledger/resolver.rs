use uuid::Uuid;

use crate::config::{AccountRole, ProductAccountingConfig};
use crate::errors::{LedgerError, Result};
use crate::types::{AccountId, PaymentChannel};

/// maps a (product config, role, channel/fee) to the concrete GL account.
/// Resolution is always scoped to a single product's config and never
/// guesses across products or tenants.
pub struct AccountResolver;

impl AccountResolver {
    /// resolve a base role with no override dimension
    pub fn resolve(config: &ProductAccountingConfig, role: AccountRole) -> Result<AccountId> {
        config.role_account(role).ok_or(LedgerError::NotConfigured {
            role,
            product_id: config.product_id,
        })
    }

    /// fund-source leg for disbursement/repayment: channel-specific mapping
    /// first, then the product default, otherwise a hard error before any
    /// ledger write
    pub fn fund_source(
        config: &ProductAccountingConfig,
        channel: Option<PaymentChannel>,
    ) -> Result<AccountId> {
        if let Some(channel) = channel {
            if let Some(account) = config.channel_mappings.get(&channel) {
                return Ok(*account);
            }
        }
        Self::resolve(config, AccountRole::FundSource)
    }

    /// fee income leg: fee-specific mapping first, then the product default
    pub fn fee_income(
        config: &ProductAccountingConfig,
        fee_id: Option<Uuid>,
    ) -> Result<AccountId> {
        if let Some(fee_id) = fee_id {
            if let Some(account) = config.fee_mappings.get(&fee_id) {
                return Ok(*account);
            }
        }
        Self::resolve(config, AccountRole::FeeIncome)
    }
}
