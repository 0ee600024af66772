//! Salary structure and the derived-field computation run before every save.
//!
//! Components resolve against the monthly wage, PF is charged on the basic
//! component, and the whole structure is refused when the components add up
//! to more than the wage.

use crate::model::attendance::round2;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use utoipa::ToSchema;

/// Component whose amount PF is charged on.
pub const BASIC_COMPONENT: &str = "basic";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Computation {
    Fixed,
    Percentage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ComponentInput {
    #[schema(example = "Basic")]
    pub name: String,
    pub computation: Computation,
    /// Fixed amount, or percent of the monthly wage
    #[schema(example = 50.0)]
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SalaryComponent {
    pub name: String,
    pub computation: Computation,
    pub value: f64,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Deduction {
    #[schema(example = "Professional Tax")]
    pub name: String,
    #[schema(example = 200.0)]
    pub amount: f64,
}

/// Raw inputs of a structure, as sent by HR.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SalaryInput {
    #[schema(example = 50000.0)]
    pub monthly_wage: f64,
    pub components: Vec<ComponentInput>,
    #[schema(example = 12.0)]
    #[serde(default)]
    pub pf_percentage: f64,
    #[serde(default)]
    pub deductions: Vec<Deduction>,
}

/// Inputs plus every derived field.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedSalary {
    pub monthly_wage: f64,
    pub yearly_wage: f64,
    pub components: Vec<SalaryComponent>,
    pub pf_percentage: f64,
    pub employee_pf: f64,
    pub employer_pf: f64,
    pub deductions: Vec<Deduction>,
    pub gross_salary: f64,
    pub total_deductions: f64,
    pub net_salary: f64,
}

#[derive(Debug, PartialEq)]
pub enum SalaryError {
    NonPositiveWage,
    EmptyComponentName,
    NegativeValue(String),
    PercentageOutOfRange(String),
    ExceedsWage { gross: f64, monthly_wage: f64 },
}

impl SalaryError {
    pub fn message(&self) -> String {
        match self {
            SalaryError::NonPositiveWage => "monthly_wage must be greater than zero".to_string(),
            SalaryError::EmptyComponentName => "Component name must not be empty".to_string(),
            SalaryError::NegativeValue(name) => format!("{name} must not be negative"),
            SalaryError::PercentageOutOfRange(name) => {
                format!("{name} percentage must be between 0 and 100")
            }
            SalaryError::ExceedsWage {
                gross,
                monthly_wage,
            } => format!(
                "Total of salary components ({gross:.2}) exceeds monthly wage ({monthly_wage:.2})"
            ),
        }
    }
}

impl SalaryInput {
    pub fn compute(&self) -> Result<ComputedSalary, SalaryError> {
        let wage = self.monthly_wage;
        if !(wage > 0.0) {
            return Err(SalaryError::NonPositiveWage);
        }
        check_percentage("pf", self.pf_percentage)?;

        let mut components = Vec::with_capacity(self.components.len());
        for input in &self.components {
            let name = input.name.trim();
            if name.is_empty() {
                return Err(SalaryError::EmptyComponentName);
            }
            let amount = match input.computation {
                Computation::Fixed => {
                    check_non_negative(name, input.value)?;
                    input.value
                }
                Computation::Percentage => {
                    check_percentage(name, input.value)?;
                    wage * input.value / 100.0
                }
            };
            components.push(SalaryComponent {
                name: name.to_string(),
                computation: input.computation,
                value: input.value,
                amount: round2(amount),
            });
        }

        for deduction in &self.deductions {
            if deduction.name.trim().is_empty() {
                return Err(SalaryError::EmptyComponentName);
            }
            check_non_negative(deduction.name.trim(), deduction.amount)?;
        }

        let gross = round2(components.iter().map(|c| c.amount).sum());
        if gross > wage {
            return Err(SalaryError::ExceedsWage {
                gross,
                monthly_wage: wage,
            });
        }

        let basic = components
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(BASIC_COMPONENT))
            .map(|c| c.amount)
            .unwrap_or(0.0);
        let pf = round2(basic * self.pf_percentage / 100.0);

        let itemized: f64 = self.deductions.iter().map(|d| d.amount).sum();
        let total_deductions = round2(pf + itemized);

        Ok(ComputedSalary {
            monthly_wage: wage,
            yearly_wage: round2(wage * 12.0),
            components,
            pf_percentage: self.pf_percentage,
            employee_pf: pf,
            employer_pf: pf,
            deductions: self
                .deductions
                .iter()
                .map(|d| Deduction {
                    name: d.name.trim().to_string(),
                    amount: round2(d.amount),
                })
                .collect(),
            gross_salary: gross,
            total_deductions,
            net_salary: round2(gross - total_deductions),
        })
    }
}

fn check_non_negative(name: &str, value: f64) -> Result<(), SalaryError> {
    if value >= 0.0 {
        Ok(())
    } else {
        Err(SalaryError::NegativeValue(name.to_string()))
    }
}

fn check_percentage(name: &str, value: f64) -> Result<(), SalaryError> {
    if (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(SalaryError::PercentageOutOfRange(name.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct SalaryStructure {
    pub id: u64,
    pub user_id: u64,
    pub user_name: Option<String>,
    pub monthly_wage: f64,
    pub yearly_wage: f64,
    #[schema(value_type = Vec<SalaryComponent>)]
    pub components: Json<Vec<SalaryComponent>>,
    pub pf_percentage: f64,
    pub employee_pf: f64,
    pub employer_pf: f64,
    #[schema(value_type = Vec<Deduction>)]
    pub deductions: Json<Vec<Deduction>>,
    pub gross_salary: f64,
    pub total_deductions: f64,
    pub net_salary: f64,
    #[schema(value_type = String, format = "date")]
    pub effective_from: NaiveDate,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

pub const SALARY_COLUMNS: &str = r#"
    s.id, s.user_id, u.name AS user_name, s.monthly_wage, s.yearly_wage, s.components,
    s.pf_percentage, s.employee_pf, s.employer_pf, s.deductions, s.gross_salary,
    s.total_deductions, s.net_salary, s.effective_from, s.updated_at
"#;
