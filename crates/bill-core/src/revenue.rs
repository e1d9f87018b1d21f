//! Task-level rounding and project-level base revenue.

use serde::Serialize;

use crate::aggregate::{ProjectTotals, TaskTotals};
use crate::amount::{Hours, Money};

/// Rounds minutes up to the next multiple of `increment`.
///
/// An increment of zero (or less) disables rounding. 16 minutes at a
/// 15-minute increment is 30; 15 stays 15; 0 stays 0.
pub const fn rounded_minutes(total_minutes: i64, increment: i64) -> i64 {
    if increment <= 0 || total_minutes <= 0 {
        return total_minutes;
    }
    let remainder = total_minutes % increment;
    if remainder == 0 {
        total_minutes
    } else {
        total_minutes - remainder + increment
    }
}

/// A task after rounding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskBilling {
    pub task_name: String,
    pub entry_count: usize,
    pub actual_minutes: i64,
    pub rounded_minutes: i64,
    pub rounded_hours: Hours,
}

pub fn round_task(task: &TaskTotals, increment: i64) -> TaskBilling {
    let rounded = rounded_minutes(task.actual_minutes, increment);
    TaskBilling {
        task_name: task.task_name.clone(),
        entry_count: task.entry_count,
        actual_minutes: task.actual_minutes,
        rounded_minutes: rounded,
        rounded_hours: Hours::from_minutes(rounded),
    }
}

/// Rounded tasks and base revenue for one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectRevenue {
    pub tasks: Vec<TaskBilling>,
    pub actual_minutes: i64,
    pub rounded_minutes: i64,
    /// Sum of the task-level rounded hours.
    pub rounded_hours: Hours,
    pub base_revenue: Money,
}

/// Rounds every task and prices the project.
///
/// Project hours are the sum of already-rounded task hours, not a fresh
/// conversion of the project's minutes; the two can differ by a hundredth
/// per task and the persisted figures use the task sum.
pub fn price_project(project: &ProjectTotals, increment: i64, rate: Money) -> ProjectRevenue {
    let tasks: Vec<TaskBilling> = project
        .tasks
        .iter()
        .map(|task| round_task(task, increment))
        .collect();
    let rounded_hours: Hours = tasks.iter().map(|t| t.rounded_hours).sum();

    ProjectRevenue {
        actual_minutes: tasks.iter().map(|t| t.actual_minutes).sum(),
        rounded_minutes: tasks.iter().map(|t| t.rounded_minutes).sum(),
        rounded_hours,
        base_revenue: Money::for_hours(rounded_hours, rate),
        tasks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::aggregate::ProjectKey;

    fn task(name: &str, minutes: i64) -> TaskTotals {
        TaskTotals {
            task_name: name.to_string(),
            actual_minutes: minutes,
            entry_count: 1,
        }
    }

    #[test]
    fn ceiling_edge_cases() {
        assert_eq!(rounded_minutes(16, 15), 30);
        assert_eq!(rounded_minutes(15, 15), 15);
        assert_eq!(rounded_minutes(0, 15), 0);
        assert_eq!(rounded_minutes(1, 15), 15);
        assert_eq!(rounded_minutes(16, 0), 16);
        assert_eq!(rounded_minutes(7, 6), 12);
    }

    #[test]
    fn rounding_is_monotone_and_bounded() {
        for increment in [1, 5, 6, 10, 15, 30, 60] {
            for minutes in 0..=600 {
                let rounded = rounded_minutes(minutes, increment);
                assert!(rounded >= minutes, "{minutes} @ {increment}");
                assert!(rounded - minutes < increment, "{minutes} @ {increment}");
                assert_eq!(rounded % increment, 0, "{minutes} @ {increment}");
            }
        }
    }

    #[test]
    fn three_entries_same_task_scenario() {
        // 16 + 40 + 61 minutes on one task at 15-minute rounding, $50/h
        let project = ProjectTotals {
            project: ProjectKey::Unassigned,
            tasks: vec![TaskTotals {
                task_name: "Design".to_string(),
                actual_minutes: 16 + 40 + 61,
                entry_count: 3,
            }],
        };
        let priced = price_project(&project, 15, Money::from_cents(5000));
        assert_eq!(priced.actual_minutes, 117);
        assert_eq!(priced.rounded_minutes, 120);
        assert_eq!(priced.rounded_hours, Hours::from_hundredths(200));
        assert_eq!(priced.base_revenue, Money::from_cents(10_000));
    }

    #[test]
    fn project_hours_sum_rounded_task_hours() {
        // three 20-minute tasks: 0.33 each, 0.99 total; 60 minutes would be 1.00
        let project = ProjectTotals {
            project: ProjectKey::Unassigned,
            tasks: vec![task("A", 20), task("B", 20), task("C", 20)],
        };
        let priced = price_project(&project, 0, Money::from_cents(10_000));
        assert_eq!(priced.rounded_minutes, 60);
        assert_eq!(priced.rounded_hours, Hours::from_hundredths(99));
        assert_eq!(priced.base_revenue, Money::from_cents(9900));
    }
}
