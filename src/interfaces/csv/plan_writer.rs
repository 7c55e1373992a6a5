use crate::domain::item::RepaymentItem;
use crate::domain::plan::InstallmentPlan;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

/// One output row describing a plan's reconciled state.
#[derive(Debug, Serialize, PartialEq)]
pub struct PlanSummary {
    pub plan: String,
    pub order: String,
    pub status: &'static str,
    /// Number of settled steps.
    pub paid: usize,
    pub count: u32,
}

impl PlanSummary {
    pub fn new(plan: &InstallmentPlan, items: &[RepaymentItem]) -> Self {
        Self {
            plan: plan.reference.to_string(),
            order: plan.order_reference.clone(),
            status: plan.status.as_str(),
            paid: items.iter().filter(|item| item.is_settled()).count(),
            count: plan.count,
        }
    }
}

/// Writes plan summaries as CSV with a `plan,order,status,paid,count` header.
pub struct PlanWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> PlanWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_summaries(
        &mut self,
        summaries: impl IntoIterator<Item = PlanSummary>,
    ) -> Result<()> {
        for summary in summaries {
            self.writer.serialize(summary)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
