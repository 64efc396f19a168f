use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// ASLAAS value queued when the operator accepts the suggestion without typing one.
pub const DEFAULT_ASLAAS: &str = "APPLIED";

/// Recurring-deposit account as exposed by the account directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountRecord {
    pub account_no: String,
    pub account_name: String,
    pub aslaas_no: String,
    /// Portal denomination text, e.g. `"2,000.00 Cr."`.
    pub denomination: String,
    pub amount: Decimal,
    pub month_paid_upto: u32,
    pub next_due_date: Option<NaiveDate>,
}

impl AccountRecord {
    pub fn new(account_no: impl Into<String>, amount: Decimal) -> Self {
        Self {
            account_no: account_no.into(),
            amount,
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.account_name = name.into();
        self
    }

    pub fn with_aslaas(mut self, aslaas_no: impl Into<String>) -> Self {
        self.aslaas_no = aslaas_no.into();
        self
    }

    pub fn with_next_due_date(mut self, date: NaiveDate) -> Self {
        self.next_due_date = Some(date);
        self
    }

    /// Monthly installment amount.
    ///
    /// Falls back to the denomination text when the numeric amount was never
    /// populated; unparsable text yields zero.
    pub fn amount(&self) -> Decimal {
        if self.amount > Decimal::ZERO {
            return self.amount;
        }

        parse_denomination(&self.denomination).unwrap_or(Decimal::ZERO)
    }

    pub fn has_aslaas(&self) -> bool {
        !self.aslaas_no.trim().is_empty()
    }

    /// Returns `true` when the next installment falls within `days` of `today`
    /// (inclusive on both ends). Overdue accounts are not "due soon".
    pub fn is_due_within(&self, days: u32, today: NaiveDate) -> bool {
        let Some(due) = self.next_due_date else {
            return false;
        };

        due >= today && due <= today + Duration::days(i64::from(days))
    }
}

/// Pending ASLAAS annotation for an account, written back to the directory
/// only after a batch run succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AslaasUpdate {
    pub account_no: String,
    pub aslaas_no: String,
}

impl AslaasUpdate {
    pub fn new(account_no: impl Into<String>, aslaas_no: &str) -> Self {
        Self {
            account_no: account_no.into().trim().to_owned(),
            aslaas_no: normalize_aslaas(aslaas_no),
        }
    }
}

/// Upper-cases the value; blank input becomes [`DEFAULT_ASLAAS`].
pub fn normalize_aslaas(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        DEFAULT_ASLAAS.to_owned()
    } else {
        trimmed.to_uppercase()
    }
}

fn parse_denomination(text: &str) -> Option<Decimal> {
    let cleaned = text.replace(" Cr.", "").replace(',', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}
