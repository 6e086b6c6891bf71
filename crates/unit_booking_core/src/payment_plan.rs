//! crates/unit_booking_core/src/payment_plan.rs
//!
//! The payment-plan engine: maps a unit's plan prices and a plan selector to a
//! dated milestone schedule. Pure and deterministic for a given `today`.

use chrono::{Duration, NaiveDate};
use std::fmt;
use std::str::FromStr;

use crate::domain::{PlanPrices, Unit};
use crate::error::{BookingError, BookingResult};

/// Administrative fee charged on top of the plan price.
pub const ADM_FEE_RATE: f64 = 0.02;
/// Flat registration fee, in the unit's currency.
pub const REGISTRATION_FEE: f64 = 420.0;

const PRE_HANDOVER_MILESTONES: [&str; 6] = [
    "Down Payment",
    "Site clearance & Enabling works",
    "50% Foundation Completion",
    "100% Foundation Completion",
    "100% Superstructure completion",
    "Completion",
];

/// Day offsets from today of the six pre-handover milestones.
const PRE_HANDOVER_OFFSETS: [i64; 6] = [0, 8, 39, 131, 281, 497];

/// Day offsets of the semi-annual post-handover installments, up to 4 years.
const POST_HANDOVER_OFFSETS: [i64; 8] = [679, 863, 1044, 1228, 1410, 1594, 1775, 1959];

const POST_HANDOVER_PRE_SPLIT: [f64; 6] = [10.0, 5.0, 10.0, 5.0, 10.0, 10.0];
const POST_HANDOVER_SHARE: f64 = 50.0;

/// One of the five supported plan selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentPlan {
    Sale30_70,
    FullComp40_60,
    PostHandover2Year,
    PostHandover3Year,
    PostHandover4Year,
}

impl PaymentPlan {
    pub const ALL: [PaymentPlan; 5] = [
        PaymentPlan::Sale30_70,
        PaymentPlan::FullComp40_60,
        PaymentPlan::PostHandover2Year,
        PaymentPlan::PostHandover3Year,
        PaymentPlan::PostHandover4Year,
    ];

    pub fn selector(&self) -> &'static str {
        match self {
            PaymentPlan::Sale30_70 => "30/70",
            PaymentPlan::FullComp40_60 => "40/60",
            PaymentPlan::PostHandover2Year => "2",
            PaymentPlan::PostHandover3Year => "3",
            PaymentPlan::PostHandover4Year => "4",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PaymentPlan::Sale30_70 => "30:70 Full Payment on Completion",
            PaymentPlan::FullComp40_60 => "40:60 Full Payment on Completion",
            PaymentPlan::PostHandover2Year => "Post-Handover-2 Years Payment Plan",
            PaymentPlan::PostHandover3Year => "Post-Handover-3 Years Payment Plan",
            PaymentPlan::PostHandover4Year => "Post-Handover-4 Years Payment Plan",
        }
    }

    /// The unit price this plan is sold at, if the unit offers it.
    pub fn price(&self, prices: &PlanPrices) -> Option<f64> {
        match self {
            PaymentPlan::Sale30_70 => prices.sale_30_70,
            PaymentPlan::FullComp40_60 => prices.full_comp_40_60,
            PaymentPlan::PostHandover2Year => prices.post_handover_2_year,
            PaymentPlan::PostHandover3Year => prices.post_handover_3_year,
            PaymentPlan::PostHandover4Year => prices.post_handover_4_year,
        }
    }

    fn post_handover_years(&self) -> Option<usize> {
        match self {
            PaymentPlan::PostHandover2Year => Some(2),
            PaymentPlan::PostHandover3Year => Some(3),
            PaymentPlan::PostHandover4Year => Some(4),
            _ => None,
        }
    }

    /// (day offset, milestone, percentage) rows for this plan.
    fn template(&self) -> Vec<(i64, String, f64)> {
        let pre_handover = |split: [f64; 6]| {
            PRE_HANDOVER_OFFSETS
                .iter()
                .zip(PRE_HANDOVER_MILESTONES)
                .zip(split)
                .map(|((offset, milestone), pct)| (*offset, milestone.to_string(), pct))
                .collect::<Vec<_>>()
        };

        match self.post_handover_years() {
            None => {
                let (down, completion) = match self {
                    PaymentPlan::Sale30_70 => (10.0, 70.0),
                    _ => (20.0, 60.0),
                };
                pre_handover([down, 5.0, 5.0, 5.0, 5.0, completion])
            }
            Some(years) => {
                let installments = years * 2;
                let share = POST_HANDOVER_SHARE / installments as f64;
                let mut rows = pre_handover(POST_HANDOVER_PRE_SPLIT);
                rows.extend(
                    POST_HANDOVER_OFFSETS
                        .iter()
                        .take(installments)
                        .enumerate()
                        .map(|(i, offset)| {
                            (*offset, format!("Post Handover Payment {}", i + 1), share)
                        }),
                );
                rows
            }
        }
    }
}

impl fmt::Display for PaymentPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.selector())
    }
}

impl FromStr for PaymentPlan {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let selector = s.trim();
        PaymentPlan::ALL
            .into_iter()
            .find(|plan| plan.selector() == selector)
            .ok_or_else(|| BookingError::Validation(format!("unknown payment plan '{}'", s)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleRow {
    pub date: NaiveDate,
    pub milestone: String,
    pub percentage: f64,
    pub amount: f64,
}

impl ScheduleRow {
    /// The date as printed on offers, e.g. `16 Oct 2026`.
    pub fn display_date(&self) -> String {
        self.date.format("%d %b %Y").to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentSchedule {
    pub plan: PaymentPlan,
    pub unit_price: f64,
    pub adm_fee: f64,
    pub registration_fee: f64,
    pub total_price: f64,
    pub rows: Vec<ScheduleRow>,
}

impl PaymentSchedule {
    /// An empty schedule means the unit does not offer the plan.
    pub fn is_available(&self) -> bool {
        !self.rows.is_empty()
    }

    fn unavailable(plan: PaymentPlan) -> Self {
        Self {
            plan,
            unit_price: 0.0,
            adm_fee: 0.0,
            registration_fee: 0.0,
            total_price: 0.0,
            rows: Vec::new(),
        }
    }
}

/// Builds the schedule for `plan`, dated from `today`.
///
/// Returns an empty schedule when the unit has no price for the plan.
pub fn build_schedule(prices: &PlanPrices, plan: PaymentPlan, today: NaiveDate) -> PaymentSchedule {
    let unit_price = match plan.price(prices) {
        Some(price) if price > 0.0 => price,
        _ => return PaymentSchedule::unavailable(plan),
    };

    let rows = plan
        .template()
        .into_iter()
        .map(|(offset, milestone, percentage)| ScheduleRow {
            date: today + Duration::days(offset),
            milestone,
            percentage,
            amount: unit_price * percentage / 100.0,
        })
        .collect();

    let adm_fee = unit_price * ADM_FEE_RATE;
    PaymentSchedule {
        plan,
        unit_price,
        adm_fee,
        registration_fee: REGISTRATION_FEE,
        total_price: unit_price + adm_fee + REGISTRATION_FEE,
        rows,
    }
}

/// Schedule for a unit and a selector string, rejecting unusable input.
pub fn compute_payment_schedule(
    unit: &Unit,
    selector: &str,
    today: NaiveDate,
) -> BookingResult<PaymentSchedule> {
    let plan: PaymentPlan = selector.parse()?;
    // Zero means the plan is not offered.
    match plan.price(&unit.prices).filter(|price| *price != 0.0) {
        None => Err(BookingError::Validation(format!(
            "unit {} has no price for plan {}",
            unit.unit_number, plan
        ))),
        Some(price) if !price.is_finite() || price < 0.0 => Err(BookingError::Validation(
            format!("unit {} has an invalid price for plan {}", unit.unit_number, plan),
        )),
        Some(_) => Ok(build_schedule(&unit.prices, plan, today)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    fn all_prices(price: f64) -> PlanPrices {
        PlanPrices {
            sale_30_70: Some(price),
            full_comp_40_60: Some(price),
            post_handover_2_year: Some(price),
            post_handover_3_year: Some(price),
            post_handover_4_year: Some(price),
        }
    }

    #[test]
    fn thirty_seventy_matches_contract_rows() {
        let prices = PlanPrices {
            sale_30_70: Some(1_000_000.0),
            ..Default::default()
        };
        let schedule = build_schedule(&prices, PaymentPlan::Sale30_70, today());

        assert_eq!(schedule.rows.len(), 6);
        let first = &schedule.rows[0];
        assert_eq!(first.milestone, "Down Payment");
        assert_eq!(first.percentage, 10.0);
        assert_eq!(first.amount, 100_000.0);
        assert_eq!(first.date, today());
        let last = schedule.rows.last().unwrap();
        assert_eq!(last.milestone, "Completion");
        assert_eq!(last.percentage, 70.0);
        assert_eq!(last.amount, 700_000.0);
        assert_eq!(last.date, today() + Duration::days(497));
    }

    #[test]
    fn forty_sixty_uses_twenty_percent_down() {
        let prices = PlanPrices {
            full_comp_40_60: Some(500_000.0),
            ..Default::default()
        };
        let schedule = build_schedule(&prices, PaymentPlan::FullComp40_60, today());
        let pcts: Vec<f64> = schedule.rows.iter().map(|r| r.percentage).collect();
        assert_eq!(pcts, vec![20.0, 5.0, 5.0, 5.0, 5.0, 60.0]);
    }

    #[test]
    fn percentages_and_amounts_sum_for_every_plan() {
        for price in [1.0, 420.0, 999_999.0, 1_000_000.0, 3_275_500.5] {
            for plan in PaymentPlan::ALL {
                let schedule = build_schedule(&all_prices(price), plan, today());
                let pct: f64 = schedule.rows.iter().map(|r| r.percentage).sum();
                let amount: f64 = schedule.rows.iter().map(|r| r.amount).sum();
                assert!((pct - 100.0).abs() <= 0.1, "{plan}: pct {pct}");
                assert!((amount - price).abs() <= 1.0, "{plan}: amount {amount}");
            }
        }
    }

    #[test]
    fn post_handover_plans_have_two_installments_per_year() {
        for (plan, installments) in [
            (PaymentPlan::PostHandover2Year, 4),
            (PaymentPlan::PostHandover3Year, 6),
            (PaymentPlan::PostHandover4Year, 8),
        ] {
            let schedule = build_schedule(&all_prices(1_200_000.0), plan, today());
            assert_eq!(schedule.rows.len(), 6 + installments);
            let pre: f64 = schedule.rows[..6].iter().map(|r| r.percentage).sum();
            assert_eq!(pre, 50.0);
            assert_eq!(
                schedule.rows[6 + installments - 1].milestone,
                format!("Post Handover Payment {}", installments)
            );
        }
    }

    #[test]
    fn four_year_plan_reproduces_day_offsets() {
        let schedule =
            build_schedule(&all_prices(800_000.0), PaymentPlan::PostHandover4Year, today());
        let offsets: Vec<i64> = schedule
            .rows
            .iter()
            .map(|r| (r.date - today()).num_days())
            .collect();
        assert_eq!(
            offsets,
            vec![0, 8, 39, 131, 281, 497, 679, 863, 1044, 1228, 1410, 1594, 1775, 1959]
        );
    }

    #[test]
    fn same_inputs_give_identical_schedules() {
        let prices = all_prices(750_000.0);
        for plan in PaymentPlan::ALL {
            assert_eq!(
                build_schedule(&prices, plan, today()),
                build_schedule(&prices, plan, today())
            );
        }
    }

    #[test]
    fn totals_add_adm_and_registration_fees() {
        let schedule = build_schedule(&all_prices(1_000_000.0), PaymentPlan::Sale30_70, today());
        assert_eq!(schedule.adm_fee, 20_000.0);
        assert_eq!(schedule.total_price, 1_020_420.0);
    }

    #[test]
    fn missing_price_yields_empty_schedule() {
        let schedule = build_schedule(&PlanPrices::default(), PaymentPlan::PostHandover3Year, today());
        assert!(!schedule.is_available());
        assert!(schedule.rows.is_empty());
    }

    #[test]
    fn zero_price_is_rejected_like_a_missing_one() {
        let unit = crate::normalize::normalize_unit(crate::domain::RawUnit {
            unit_number: Some("A-101".to_string()),
            prices: PlanPrices {
                sale_30_70: Some(0.0),
                ..PlanPrices::default()
            },
            ..Default::default()
        });
        for selector in ["30/70", "40/60"] {
            match compute_payment_schedule(&unit, selector, today()) {
                Err(BookingError::Validation(message)) => assert!(message.contains("has no price")),
                other => panic!("{selector}: unexpected result {:?}", other),
            }
        }
    }

    #[test]
    fn selector_parsing() {
        assert_eq!("30/70".parse::<PaymentPlan>().unwrap(), PaymentPlan::Sale30_70);
        assert_eq!(" 4 ".parse::<PaymentPlan>().unwrap(), PaymentPlan::PostHandover4Year);
        assert!(matches!(
            "5".parse::<PaymentPlan>(),
            Err(BookingError::Validation(_))
        ));
    }

    #[test]
    fn display_date_is_day_month_year() {
        let row = ScheduleRow {
            date: today(),
            milestone: "Down Payment".to_string(),
            percentage: 10.0,
            amount: 1.0,
        };
        assert_eq!(row.display_date(), "16 Oct 2026");
    }
}
