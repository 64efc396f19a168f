use serde::{Deserialize, Serialize};
use std::fmt;

/// How a list is paid at the portal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    #[default]
    Cash,
    DopCheque,
    NonDopCheque,
}

impl PaymentMode {
    pub const ALL: [PaymentMode; 3] = [
        PaymentMode::Cash,
        PaymentMode::DopCheque,
        PaymentMode::NonDopCheque,
    ];

    /// Wire token used as the payload prefix.
    pub fn token(self) -> &'static str {
        match self {
            PaymentMode::Cash => "cash",
            PaymentMode::DopCheque => "dop_cheque",
            PaymentMode::NonDopCheque => "non_dop_cheque",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PaymentMode::Cash => "Cash",
            PaymentMode::DopCheque => "DOP Cheque",
            PaymentMode::NonDopCheque => "Non DOP Cheque",
        }
    }

    /// DOP cheque lists are the only ones without an amount ceiling.
    pub fn is_ceiling_bound(self) -> bool {
        !matches!(self, PaymentMode::DopCheque)
    }

    /// Accepts labels and tokens case-insensitively; anything unrecognized is cash.
    pub fn parse_lenient(value: &str) -> Self {
        let normalized = value.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "dop_cheque" => PaymentMode::DopCheque,
            "non_dop_cheque" => PaymentMode::NonDopCheque,
            _ => PaymentMode::Cash,
        }
    }
}

impl fmt::Display for PaymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenient_parsing_accepts_labels_and_tokens() {
        assert_eq!(PaymentMode::parse_lenient("DOP Cheque"), PaymentMode::DopCheque);
        assert_eq!(PaymentMode::parse_lenient("dop_cheque"), PaymentMode::DopCheque);
        assert_eq!(
            PaymentMode::parse_lenient("Non DOP Cheque"),
            PaymentMode::NonDopCheque
        );
        assert_eq!(
            PaymentMode::parse_lenient("NON_DOP_CHEQUE"),
            PaymentMode::NonDopCheque
        );
        assert_eq!(PaymentMode::parse_lenient("cheque"), PaymentMode::Cash);
        assert_eq!(PaymentMode::parse_lenient(""), PaymentMode::Cash);
    }

    #[test]
    fn only_dop_cheque_is_unbounded() {
        assert!(PaymentMode::Cash.is_ceiling_bound());
        assert!(PaymentMode::NonDopCheque.is_ceiling_bound());
        assert!(!PaymentMode::DopCheque.is_ceiling_bound());
    }

    #[test]
    fn tokens_round_trip_through_lenient_parse() {
        for mode in PaymentMode::ALL {
            assert_eq!(PaymentMode::parse_lenient(mode.token()), mode);
            assert_eq!(PaymentMode::parse_lenient(mode.label()), mode);
        }
    }
}
