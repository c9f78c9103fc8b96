//! Human and machine output for the subcommands.
//!
//! `--json` prints one pretty JSON document on stdout. Otherwise results are
//! aligned text tables; logs go to stderr either way.

use mt5d_core::orchestrator::{StepOutcome, StepReport};
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Left-aligned columns two spaces apart, a dashed rule under the header.
pub struct Table {
    headers: Vec<&'static str>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: &[&'static str]) -> Self {
        Self {
            headers: headers.to_vec(),
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    fn widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.chars().count());
            }
        }
        widths
    }

    pub fn render(&self) -> String {
        let widths = self.widths();
        let mut out = render_line(self.headers.iter().copied(), &widths);
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        out.push_str(&format!("{}\n", rule.join("  ")));
        for row in &self.rows {
            out.push_str(&render_line(row.iter().map(String::as_str), &widths));
        }
        out
    }

    pub fn print(&self) {
        print!("{}", self.render());
    }
}

fn render_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let padded: Vec<String> = cells
        .zip(widths)
        .map(|(c, &w)| format!("{c:w$}"))
        .collect();
    format!("{}\n", padded.join("  ").trim_end())
}

/// Short outcome text; a failure keeps only the first line of its reason.
pub fn outcome_label(outcome: &StepOutcome) -> String {
    match outcome {
        StepOutcome::Skipped => "skipped".to_string(),
        StepOutcome::Completed => "completed".to_string(),
        StepOutcome::Failed { reason } => {
            format!("failed: {}", reason.lines().next().unwrap_or_default())
        }
    }
}

/// Step table followed by a one-line tally.
pub fn render_reports(reports: &[StepReport]) -> String {
    let mut table = Table::new(&["STEP", "CRITICALITY", "OUTCOME"]);
    let (mut completed, mut skipped, mut failed) = (0, 0, 0);
    for r in reports {
        match r.outcome {
            StepOutcome::Completed => completed += 1,
            StepOutcome::Skipped => skipped += 1,
            StepOutcome::Failed { .. } => failed += 1,
        }
        table.push(vec![
            r.step.to_string(),
            r.criticality.to_string(),
            outcome_label(&r.outcome),
        ]);
    }
    format!(
        "{}\n{completed} completed, {skipped} skipped, {failed} failed\n",
        table.render()
    )
}

pub fn print_reports(reports: &[StepReport]) {
    print!("{}", render_reports(reports));
}

#[cfg(test)]
mod tests {
    use super::*;
    use mt5d_core::types::{Criticality, StepId};

    #[test]
    fn columns_align_to_widest_cell() {
        let mut t = Table::new(&["STEP", "STATUS"]);
        t.push(vec!["install-python".into(), "done".into()]);
        t.push(vec!["init-prefix".into(), "pending".into()]);
        let text = t.render();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "STEP            STATUS");
        assert_eq!(lines[1], "--------------  -------");
        assert_eq!(lines[2], "install-python  done");
        assert_eq!(lines[3], "init-prefix     pending");
    }

    #[test]
    fn report_tallies_outcomes_and_trims_failure_reason() {
        let reports = vec![
            StepReport {
                step: StepId::InitPrefix,
                criticality: Criticality::Required,
                outcome: StepOutcome::Skipped,
            },
            StepReport {
                step: StepId::InstallFonts,
                criticality: Criticality::Optional,
                outcome: StepOutcome::Failed {
                    reason: "winetricks exited 1\ntraceback follows".into(),
                },
            },
            StepReport {
                step: StepId::DeployBridge,
                criticality: Criticality::Required,
                outcome: StepOutcome::Completed,
            },
        ];
        let text = render_reports(&reports);
        assert!(text.contains("failed: winetricks exited 1"));
        assert!(!text.contains("traceback"));
        assert!(text.ends_with("1 completed, 1 skipped, 1 failed\n"), "{text}");
    }
}
