use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Seller or buyer of a business document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub name: String,
    pub street: String,
    pub zip: String,
    pub city: String,
    /// ISO 3166-1 alpha-2 country code.
    pub country: String,
    /// VAT id or tax number. Mandatory for the seller, optional for the buyer.
    pub tax_id: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// One position of a document.
///
/// Amounts are integer minor currency units (cents); the tax rate is in
/// basis points (`1900` = 19 %).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: i64,
    pub unit: String,
    pub unit_price: i64,
    pub tax_rate_bp: u32,
}

impl LineItem {
    /// Net, tax and gross of this line, or `None` if any of them does not
    /// fit in an `i64`.
    pub fn totals(&self) -> Option<LineTotals> {
        let net = self.quantity.checked_mul(self.unit_price)?;
        let tax = percent_of(net, self.tax_rate_bp)?;
        Some(LineTotals {
            net,
            tax,
            gross: net.checked_add(tax)?,
        })
    }
}

/// Derived amounts of a single line item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineTotals {
    pub net: i64,
    pub tax: i64,
    pub gross: i64,
}

/// Derived document totals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub net: i64,
    pub tax: i64,
    pub gross: i64,
}

/// Caller-supplied semantic fields of a record.
///
/// Frozen by value at issuance: a [`crate::Record`] owns its content and never
/// hands out mutable access once issued.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordContent {
    pub issue_date: NaiveDate,
    pub delivery_start: Option<NaiveDate>,
    pub delivery_end: Option<NaiveDate>,
    pub seller: Party,
    pub buyer: Party,
    /// ISO 4217 currency code.
    pub currency: String,
    pub line_items: Vec<LineItem>,
    pub tax_exempt: bool,
    pub tax_exempt_reason: Option<String>,
    pub notes: Option<String>,
    pub payment_terms: Option<String>,
}

impl RecordContent {
    /// Document totals: the sum of every line's net, tax and gross amount.
    ///
    /// Fails with `AmountOverflow` instead of clamping or wrapping.
    pub fn totals(&self) -> Result<Totals, TypeError> {
        let mut totals = Totals::default();
        for (i, item) in self.line_items.iter().enumerate() {
            let line = item
                .totals()
                .ok_or(TypeError::AmountOverflow { line: Some(i) })?;
            let sum = |acc: i64, value: i64| {
                acc.checked_add(value)
                    .ok_or(TypeError::AmountOverflow { line: None })
            };
            totals = Totals {
                net: sum(totals.net, line.net)?,
                tax: sum(totals.tax, line.tax)?,
                gross: sum(totals.gross, line.gross)?,
            };
        }
        Ok(totals)
    }

    /// Content of a compensating document: every quantity is negated so the
    /// totals cancel the original exactly.
    pub fn negated(&self, issue_date: NaiveDate, reason: &str) -> Self {
        let mut content = self.clone();
        content.issue_date = issue_date;
        for item in &mut content.line_items {
            item.quantity = -item.quantity;
        }
        content.notes = Some(reason.to_string());
        content
    }
}

/// `amount * rate_bp / 10_000`, rounded half away from zero.
fn percent_of(amount: i64, rate_bp: u32) -> Option<i64> {
    let scaled = i128::from(amount) * i128::from(rate_bp);
    let quotient = scaled / 10_000;
    let remainder = scaled % 10_000;
    let rounded = if remainder.abs() * 2 >= 10_000 {
        quotient + scaled.signum()
    } else {
        quotient
    };
    i64::try_from(rounded).ok()
}
