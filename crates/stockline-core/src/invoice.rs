//! # Invoice Numbers
//!
//! Year-scoped invoice numbering on top of the sequence generator.
//!
//! ## Format
//! ```text
//! scope key:       INV-2025
//! invoice number:  INV-2025-0001
//!                  │    │    └── sequence value, zero-padded to 4 digits
//!                  │    └─────── calendar year (UTC) of the sale
//!                  └──────────── prefix
//! ```
//!
//! A new year means a new scope key, whose counter starts again at 1.
//! Values past 9999 simply grow wider (`INV-2025-10000`).

use chrono::{DateTime, Datelike, Utc};

use crate::INVOICE_NUMBER_WIDTH;

/// The sequence scope invoice numbers are drawn from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InvoiceScope {
    prefix: String,
    year: i32,
}

impl InvoiceScope {
    pub fn new(prefix: impl Into<String>, year: i32) -> Self {
        InvoiceScope {
            prefix: prefix.into(),
            year,
        }
    }

    /// Scope for the UTC calendar year containing `at`.
    pub fn for_date(prefix: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::new(prefix, at.year())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// Sequence scope key, e.g. `INV-2025`.
    pub fn key(&self) -> String {
        format!("{}-{}", self.prefix, self.year)
    }

    /// Invoice number for a sequence value, e.g. `INV-2025-0001`.
    pub fn format_number(&self, value: i64) -> String {
        format!(
            "{}-{}-{:0width$}",
            self.prefix,
            self.year,
            value,
            width = INVOICE_NUMBER_WIDTH
        )
    }

    /// Splits an invoice number issued under this scope back into its value.
    pub fn parse_number(&self, invoice_number: &str) -> Option<i64> {
        let rest = invoice_number.strip_prefix(&self.key())?.strip_prefix('-')?;
        if rest.len() < INVOICE_NUMBER_WIDTH || !rest.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        rest.parse().ok()
    }
}

impl std::fmt::Display for InvoiceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_scope_key_and_number() {
        let scope = InvoiceScope::new("INV", 2025);
        assert_eq!(scope.key(), "INV-2025");
        assert_eq!(scope.format_number(1), "INV-2025-0001");
        assert_eq!(scope.format_number(42), "INV-2025-0042");
        assert_eq!(scope.format_number(12345), "INV-2025-12345");
    }

    #[test]
    fn test_scope_rolls_over_by_year() {
        let dec = Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap();
        let jan = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(InvoiceScope::for_date("INV", dec).key(), "INV-2025");
        assert_eq!(InvoiceScope::for_date("INV", jan).key(), "INV-2026");
    }

    #[test]
    fn test_parse_number() {
        let scope = InvoiceScope::new("INV", 2025);
        assert_eq!(scope.parse_number("INV-2025-0007"), Some(7));
        assert_eq!(scope.parse_number("INV-2025-10000"), Some(10000));
        assert_eq!(scope.parse_number("INV-2024-0007"), None);
        assert_eq!(scope.parse_number("INV-2025-7"), None);
        assert_eq!(scope.parse_number("INV-2025-00x7"), None);
    }
}
