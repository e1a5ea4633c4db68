//! Materials and labour cost aggregation.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{AppError, Result};

/// Anything priced as quantity × unit cost plus VAT.
pub trait CostLine {
    fn quantity(&self) -> f64;
    fn unit_cost(&self) -> f64;
    fn vat_percentage(&self) -> f64;

    fn total(&self) -> f64 {
        line_total(self.quantity(), self.unit_cost(), self.vat_percentage())
    }
}

pub fn line_total(quantity: f64, unit_cost: f64, vat_percentage: f64) -> f64 {
    quantity * unit_cost * (1.0 + vat_percentage / 100.0)
}

pub fn sum<'a, T, I>(lines: I) -> f64
where
    T: CostLine + 'a,
    I: IntoIterator<Item = &'a T>,
{
    lines.into_iter().map(CostLine::total).sum()
}

/// Round to whole cents for API output.
pub fn round_amount(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn format_amount(value: f64) -> String {
    format!("{:.2}", round_amount(value))
}

pub fn validate_line(quantity: f64, unit_cost: f64, vat_percentage: f64) -> Result<()> {
    if !quantity.is_finite() || quantity < 0.0 {
        return Err(AppError::Validation(
            "Quantity must be a non-negative number".to_string(),
        ));
    }
    if !unit_cost.is_finite() || unit_cost < 0.0 {
        return Err(AppError::Validation(
            "Unit cost must be a non-negative number".to_string(),
        ));
    }
    if !vat_percentage.is_finite() || !(0.0..=100.0).contains(&vat_percentage) {
        return Err(AppError::Validation(
            "VAT percentage must be between 0 and 100".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostSummary {
    pub materials_by_category: Vec<CategoryTotal>,
    pub materials_total: f64,
    pub labour_total: f64,
    pub total: f64,
}

/// Summarise material lines grouped by category, plus labour.
///
/// `materials` yields `(category, line)` pairs; categories come out sorted
/// by name.
pub fn summarize<'a, M, L>(
    materials: impl IntoIterator<Item = (&'a str, &'a M)>,
    labour: impl IntoIterator<Item = &'a L>,
) -> CostSummary
where
    M: CostLine + 'a,
    L: CostLine + 'a,
{
    let mut by_category: BTreeMap<&str, f64> = BTreeMap::new();
    for (category, line) in materials {
        *by_category.entry(category).or_default() += line.total();
    }

    let materials_total: f64 = by_category.values().sum();
    let labour_total = sum(labour);

    CostSummary {
        materials_by_category: by_category
            .into_iter()
            .map(|(category, total)| CategoryTotal {
                category: category.to_string(),
                total: round_amount(total),
            })
            .collect(),
        materials_total: round_amount(materials_total),
        labour_total: round_amount(labour_total),
        total: round_amount(materials_total + labour_total),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Line(f64, f64, f64);

    impl CostLine for Line {
        fn quantity(&self) -> f64 {
            self.0
        }
        fn unit_cost(&self) -> f64 {
            self.1
        }
        fn vat_percentage(&self) -> f64 {
            self.2
        }
    }

    #[test]
    fn vat_is_applied_on_top() {
        let total = sum(&[Line(2.0, 10.0, 21.0)]);
        assert!((total - 24.2).abs() < 1e-9);
        assert_eq!(format_amount(total), "24.20");
    }

    #[test]
    fn zero_vat() {
        assert_eq!(line_total(3.0, 4.5, 0.0), 13.5);
    }

    #[test]
    fn groups_by_category() {
        let concrete = Line(1.0, 100.0, 0.0);
        let rebar = Line(2.0, 25.0, 0.0);
        let tiles = Line(10.0, 3.0, 10.0);
        let labour = [Line(8.0, 40.0, 0.0)];

        let summary = summarize(
            [
                ("Structure", &concrete),
                ("Finishes", &tiles),
                ("Structure", &rebar),
            ],
            labour.iter(),
        );

        assert_eq!(summary.materials_by_category.len(), 2);
        assert_eq!(summary.materials_by_category[0].category, "Finishes");
        assert_eq!(summary.materials_by_category[0].total, 33.0);
        assert_eq!(summary.materials_by_category[1].total, 150.0);
        assert_eq!(summary.materials_total, 183.0);
        assert_eq!(summary.labour_total, 320.0);
        assert_eq!(summary.total, 503.0);
    }

    #[test]
    fn rejects_bad_lines() {
        assert!(validate_line(-1.0, 1.0, 0.0).is_err());
        assert!(validate_line(1.0, f64::NAN, 0.0).is_err());
        assert!(validate_line(1.0, 1.0, 101.0).is_err());
        assert!(validate_line(0.0, 0.0, 100.0).is_ok());
    }
}
