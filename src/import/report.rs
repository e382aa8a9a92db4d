//! Per-category success/error breakdown of a finished import.

use serde::Serialize;

use crate::import::models::{CategoryImportResult, ImportResult};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReportSlice {
    /// Unrounded share of the category's rows, in `[0, 100]`.
    pub percentage: f64,
    pub imports: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportBreakdown {
    pub title: String,
    pub success: ReportSlice,
    pub error: ReportSlice,
}

impl From<&CategoryImportResult> for ReportBreakdown {
    fn from(category: &CategoryImportResult) -> Self {
        let total = category.imported_rows.saturating_add(category.rows_with_error);
        let share = |rows: u64| {
            if total == 0 {
                0.0
            } else {
                rows as f64 * 100.0 / total as f64
            }
        };

        Self {
            title: category.name.clone(),
            success: ReportSlice {
                percentage: share(category.imported_rows),
                imports: category.imported_rows,
            },
            error: ReportSlice {
                percentage: share(category.rows_with_error),
                imports: category.rows_with_error,
            },
        }
    }
}

/// One breakdown per category, in server order.
pub fn build_report(result: &ImportResult) -> Vec<ReportBreakdown> {
    result.imports.iter().map(ReportBreakdown::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(name: &str, imported_rows: u64, rows_with_error: u64) -> CategoryImportResult {
        CategoryImportResult {
            name: name.into(),
            imported_rows,
            rows_with_error,
        }
    }

    #[test]
    fn splits_rows_into_percentages() {
        let report = build_report(&ImportResult {
            imports: vec![category("Organizations", 9, 1)],
        });

        assert_eq!(report.len(), 1);
        assert_eq!(report[0].title, "Organizations");
        assert_eq!(report[0].success, ReportSlice { percentage: 90.0, imports: 9 });
        assert_eq!(report[0].error, ReportSlice { percentage: 10.0, imports: 1 });
    }

    #[test]
    fn empty_category_is_zero_not_nan() {
        let report = build_report(&ImportResult {
            imports: vec![category("Cost Centers", 0, 0)],
        });

        assert_eq!(report[0].success.percentage, 0.0);
        assert_eq!(report[0].error.percentage, 0.0);
    }

    #[test]
    fn percentages_are_not_rounded() {
        let report = build_report(&ImportResult {
            imports: vec![category("Members", 1, 2)],
        });

        assert!((report[0].success.percentage - 100.0 / 3.0).abs() < 1e-9);
        assert!((report[0].error.percentage - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn preserves_category_order() {
        let report = build_report(&ImportResult {
            imports: vec![
                category("Organizations", 2, 0),
                category("Cost Centers", 0, 4),
                category("Members", 5, 5),
            ],
        });

        let titles: Vec<_> = report.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["Organizations", "Cost Centers", "Members"]);
        assert_eq!(report[1].error.percentage, 100.0);
        assert_eq!(report[2].success.percentage, 50.0);
    }

    #[test]
    fn no_categories_gives_empty_report() {
        assert!(build_report(&ImportResult::default()).is_empty());
    }
}
