use rust_decimal::Decimal;

use crate::domain::WithdrawalError;

/// Banks offered on the withdrawal form.
pub const SUPPORTED_BANKS: &[&str] = &[
    "Vietcombank (VCB)",
    "Agribank",
    "BIDV",
    "VietinBank",
    "MB Bank",
    "Techcombank",
    "ACB",
    "VPBank",
    "TPBank",
    "Sacombank",
    "CAKE",
    "TIMO",
];

/// Look up a supported bank by full name, by the name before the
/// parenthesised code, or by the code itself. Case-insensitive.
pub fn resolve_bank(name: &str) -> Option<&'static str> {
    let wanted = name.trim().to_ascii_lowercase();
    if wanted.is_empty() {
        return None;
    }

    SUPPORTED_BANKS.iter().copied().find(|bank| {
        let full = bank.to_ascii_lowercase();
        if full == wanted {
            return true;
        }
        match full.split_once(" (") {
            Some((short, code)) => short == wanted || code.trim_end_matches(')') == wanted,
            None => false,
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayoutMethod {
    #[default]
    Bank,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalRequest {
    pub method: PayoutMethod,
    pub bank: String,
    pub account_number: String,
    pub payee_name: String,
    pub amount: Decimal,
}

fn canonical_bank(bank: String) -> String {
    resolve_bank(&bank).map(str::to_string).unwrap_or(bank)
}

impl WithdrawalRequest {
    /// A bank transfer request. The payee name is stored upper-cased, as
    /// banks expect it. A recognised bank is stored under its listed name;
    /// anything else is kept as given and fails [`validate`](Self::validate).
    pub fn bank_transfer(
        bank: impl Into<String>,
        account_number: impl Into<String>,
        payee_name: &str,
        amount: Decimal,
    ) -> Self {
        Self {
            method: PayoutMethod::Bank,
            bank: canonical_bank(bank.into()),
            account_number: account_number.into().trim().to_string(),
            payee_name: payee_name.trim().to_uppercase(),
            amount,
        }
    }

    /// Check the request against the balance available right now.
    ///
    /// Rules run in a fixed order and the first failure is returned:
    /// funds, minimum, required fields, bank.
    pub fn validate(&self, available: Decimal, minimum: Decimal) -> Result<(), WithdrawalError> {
        if self.amount > available {
            return Err(WithdrawalError::InsufficientFunds {
                requested: self.amount,
                available,
            });
        }
        if self.amount < minimum || self.amount <= Decimal::ZERO {
            return Err(WithdrawalError::BelowMinimum {
                amount: self.amount,
                minimum,
            });
        }
        if self.account_number.is_empty() {
            return Err(WithdrawalError::MissingField("account number"));
        }
        if self.payee_name.is_empty() {
            return Err(WithdrawalError::MissingField("payee name"));
        }
        match self.method {
            PayoutMethod::Bank if resolve_bank(&self.bank).is_none() => {
                Err(WithdrawalError::UnknownBank(self.bank.clone()))
            }
            PayoutMethod::Bank => Ok(()),
        }
    }
}

/// Where an open withdrawal session currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WithdrawalStep {
    Form { error: Option<WithdrawalError> },
    Processing,
    Success,
}

impl Default for WithdrawalStep {
    fn default() -> Self {
        Self::Form { error: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn min() -> Decimal {
        Decimal::from(3_000_000)
    }

    fn request(amount: i64) -> WithdrawalRequest {
        let amount = Decimal::from(amount);
        WithdrawalRequest::bank_transfer("BIDV", "0123456789", "nguyen van a", amount)
    }

    #[test]
    fn insufficient_funds_wins_over_below_minimum() {
        let err = request(100).validate(Decimal::from(50), min()).unwrap_err();
        assert!(matches!(err, WithdrawalError::InsufficientFunds { .. }));
    }

    #[test]
    fn below_minimum_is_rejected() {
        let err = request(2_999_999).validate(Decimal::from(10_000_000), min()).unwrap_err();
        assert_eq!(
            err,
            WithdrawalError::BelowMinimum {
                amount: Decimal::from(2_999_999),
                minimum: min()
            }
        );
    }

    #[test]
    fn exact_minimum_is_accepted() {
        assert_eq!(request(3_000_000).validate(Decimal::from(3_000_000), min()), Ok(()));
    }

    #[test]
    fn required_fields_and_bank_are_checked() {
        let mut req = request(3_000_000);
        req.account_number.clear();
        assert_eq!(
            req.validate(Decimal::from(5_000_000), min()),
            Err(WithdrawalError::MissingField("account number"))
        );

        let mut req = request(3_000_000);
        req.bank = "Bank of Nowhere".to_string();
        assert!(matches!(
            req.validate(Decimal::from(5_000_000), min()),
            Err(WithdrawalError::UnknownBank(_))
        ));
    }

    #[test]
    fn payee_is_upper_cased() {
        assert_eq!(request(1).payee_name, "NGUYEN VAN A");
    }

    #[test]
    fn banks_resolve_by_name_or_code() {
        assert_eq!(resolve_bank("vcb"), Some("Vietcombank (VCB)"));
        assert_eq!(resolve_bank("Vietcombank"), Some("Vietcombank (VCB)"));
        assert_eq!(resolve_bank("mb bank"), Some("MB Bank"));
        assert_eq!(resolve_bank("nope"), None);
        assert_eq!(resolve_bank(""), None);
    }

    #[test]
    fn bank_is_stored_under_its_listed_name() {
        let amount = Decimal::from(3_000_000);
        let known = WithdrawalRequest::bank_transfer(" vcb ", "1", "a", amount);
        assert_eq!(known.bank, "Vietcombank (VCB)");

        let unknown = WithdrawalRequest::bank_transfer("Bank of Nowhere", "1", "a", amount);
        assert_eq!(unknown.bank, "Bank of Nowhere");
        assert_eq!(
            unknown.validate(Decimal::from(1_000), min()).unwrap_err(),
            WithdrawalError::InsufficientFunds {
                requested: amount,
                available: Decimal::from(1_000),
            }
        );
    }
}
