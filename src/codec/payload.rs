use crate::model::{BatchList, ListEntry, PaymentMode};
use std::collections::HashSet;

/// Account numbers longer than this are truncated on input.
pub const MAX_ACCOUNT_DIGITS: usize = 12;

/// Tokens of participating entries in insertion order, first occurrence of
/// each account number only.
pub fn participating_tokens(entries: &[ListEntry]) -> Vec<String> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .filter(|entry| entry.participates())
        .filter(|entry| seen.insert(entry.account_no().to_owned()))
        .map(ListEntry::token)
        .collect()
}

/// Canonical identity of a list's payload; empty when nothing participates.
pub fn signature(entries: &[ListEntry]) -> String {
    participating_tokens(entries).join(",")
}

pub fn payload_token(entries: &[ListEntry]) -> String {
    format!("[{}]", participating_tokens(entries).join(", "))
}

pub fn payload_with_mode(mode: PaymentMode, entries: &[ListEntry]) -> String {
    format!("{}:{}", mode.token(), payload_token(entries))
}

/// Joins the mode-prefixed segments of `lists` in the order given.
pub fn combined_payload<'a>(lists: impl IntoIterator<Item = &'a BatchList>) -> String {
    lists
        .into_iter()
        .map(BatchList::payload_with_mode)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Keeps ASCII digits only, at most [`MAX_ACCOUNT_DIGITS`] of them.
pub fn normalize_account_input(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_digit)
        .take(MAX_ACCOUNT_DIGITS)
        .collect()
}

/// Digits only with leading zeros stripped; empty or zero becomes `1`.
pub fn normalize_installment_input(raw: &str) -> u32 {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    let trimmed = digits.trim_start_matches('0');
    match trimmed.parse::<u32>() {
        Ok(value) if value > 0 => value,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AccountRecord;
    use rust_decimal_macros::dec;

    fn resolved(account_no: &str, installment: u32) -> ListEntry {
        ListEntry::new(
            account_no,
            installment,
            Some(AccountRecord::new(account_no, dec!(100))),
        )
    }

    #[test]
    fn signature_skips_unresolved_and_duplicate_accounts() {
        let entries = vec![
            resolved("020001", 1),
            ListEntry::new("020005", 1, None),
            resolved("020002", 2),
            resolved("020001", 3),
        ];
        assert_eq!(signature(&entries), "020001,020002_2");
        assert_eq!(payload_token(&entries), "[020001, 020002_2]");
    }

    #[test]
    fn empty_lists_encode_as_empty_brackets() {
        assert_eq!(signature(&[]), "");
        assert_eq!(payload_with_mode(PaymentMode::DopCheque, &[]), "dop_cheque:[]");
    }

    #[test]
    fn combined_payload_joins_segments_in_order() {
        let mut first = BatchList::new(1);
        let mut second = BatchList::new(2);
        let none = HashSet::new();
        first.add_entry(resolved("1", 1), &none).unwrap();
        second.add_entry(resolved("2", 2), &none).unwrap();
        second.set_mode(PaymentMode::NonDopCheque);

        assert_eq!(
            combined_payload([&first, &second]),
            "cash:[1], non_dop_cheque:[2_2]"
        );
    }

    #[test]
    fn account_input_keeps_twelve_digits() {
        assert_eq!(normalize_account_input("02-0001 abc"), "020001");
        assert_eq!(normalize_account_input("1234567890123456"), "123456789012");
    }

    #[test]
    fn installment_input_defaults_to_one() {
        assert_eq!(normalize_installment_input(""), 1);
        assert_eq!(normalize_installment_input("000"), 1);
        assert_eq!(normalize_installment_input("007"), 7);
        assert_eq!(normalize_installment_input("x3"), 3);
        assert_eq!(normalize_installment_input("99999999999"), 1);
    }
}
