use super::account::AccountRecord;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Validation flag shown next to an entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryStatus {
    #[default]
    Valid,
    DueSoon,
}

/// One account inside a batch list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    account_no: String,
    installment: u32,
    account: Option<AccountRecord>,
    status: EntryStatus,
}

impl ListEntry {
    /// Builds an entry; installments of zero are stored as one.
    pub fn new(account_no: impl Into<String>, installment: u32, account: Option<AccountRecord>) -> Self {
        Self {
            account_no: account_no.into().trim().to_owned(),
            installment: installment.max(1),
            account,
            status: EntryStatus::Valid,
        }
    }

    pub fn with_status(mut self, status: EntryStatus) -> Self {
        self.status = status;
        self
    }

    pub fn account_no(&self) -> &str {
        &self.account_no
    }

    pub fn installment(&self) -> u32 {
        self.installment
    }

    pub fn account(&self) -> Option<&AccountRecord> {
        self.account.as_ref()
    }

    pub fn status(&self) -> EntryStatus {
        self.status
    }

    /// Entries without a resolved account are kept but never submitted.
    pub fn participates(&self) -> bool {
        self.account.is_some() && !self.account_no.is_empty()
    }

    pub fn amount(&self) -> Decimal {
        self.account
            .as_ref()
            .map(AccountRecord::amount)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn total(&self) -> Decimal {
        self.amount() * Decimal::from(self.installment)
    }

    /// `accountNo` for a single installment, `accountNo_installment` otherwise.
    pub fn token(&self) -> String {
        if self.installment <= 1 {
            self.account_no.clone()
        } else {
            format!("{}_{}", self.account_no, self.installment)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn token_carries_installment_suffix() {
        let account = AccountRecord::new("020002", dec!(1500));
        let single = ListEntry::new("020002", 1, Some(account.clone()));
        let double = ListEntry::new("020002", 2, Some(account));
        assert_eq!(single.token(), "020002");
        assert_eq!(double.token(), "020002_2");
        assert_eq!(double.total(), dec!(3000));
    }

    #[test]
    fn zero_installment_is_treated_as_one() {
        let entry = ListEntry::new("1", 0, Some(AccountRecord::new("1", dec!(10))));
        assert_eq!(entry.installment(), 1);
        assert_eq!(entry.token(), "1");
    }

    #[test]
    fn unresolved_entries_do_not_participate() {
        let entry = ListEntry::new("020009", 3, None);
        assert!(!entry.participates());
        assert_eq!(entry.total(), Decimal::ZERO);
    }
}
