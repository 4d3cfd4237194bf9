//! Insight context for an external text-generation service
//!
//! Only aggregated rollup data leaves the core. The service's answer is passed
//! back to the caller unmodified.

use crate::aggregator::{FlowTotals, Rollups, SummaryMetrics};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;

/// Number of busiest timeline buckets included in the context
pub const BUSIEST_PERIODS: usize = 5;

#[derive(Debug)]
pub enum InsightError {
    Provider(String),
}

impl std::fmt::Display for InsightError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InsightError::Provider(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for InsightError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusyPeriod {
    pub start_ms: i64,
    pub units: i64,
}

/// Aggregated view of one rollup handed to the insight service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InsightContext {
    pub window: String,
    pub summary: SummaryMetrics,
    pub categories: BTreeMap<String, FlowTotals>,
    /// Product name to current stock
    pub stock_levels: BTreeMap<String, i64>,
    /// Busiest timeline buckets by units moved, busiest first
    pub busiest_periods: Vec<BusyPeriod>,
}

impl InsightContext {
    pub fn from_rollups(rollups: &Rollups) -> Self {
        let mut busiest_periods: Vec<BusyPeriod> = rollups
            .timeline
            .buckets
            .iter()
            .map(|b| BusyPeriod {
                start_ms: b.start_ms,
                units: b.incoming + b.outgoing,
            })
            .filter(|p| p.units > 0)
            .collect();
        busiest_periods.sort_by(|a, b| b.units.cmp(&a.units).then(a.start_ms.cmp(&b.start_ms)));
        busiest_periods.truncate(BUSIEST_PERIODS);

        Self {
            window: rollups.window.to_string(),
            summary: rollups.summary,
            categories: rollups.category_breakdown.clone(),
            stock_levels: rollups
                .product_snapshot
                .iter()
                .map(|p| (p.name.clone(), p.current_stock))
                .collect(),
            busiest_periods,
        }
    }

    /// Plain-language description of the context
    pub fn describe(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for InsightContext {
    fn fmt(&self, out: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let summary = &self.summary;

        writeln!(out, "Inventory movement data for the {}:", self.window)?;
        writeln!(out)?;
        writeln!(out, "Summary:")?;
        writeln!(out, "- Total transactions: {}", summary.total_movements)?;
        writeln!(
            out,
            "- Total incoming inventory: {} ({} transactions)",
            summary.incoming_items, summary.incoming_count
        )?;
        writeln!(
            out,
            "- Total outgoing inventory: {} ({} transactions)",
            summary.outgoing_items, summary.outgoing_count
        )?;
        writeln!(out, "- Net inventory change: {}", summary.net_change)?;

        writeln!(out)?;
        writeln!(out, "Category Analysis:")?;
        for (category, totals) in &self.categories {
            writeln!(
                out,
                "- {}: incoming {}, outgoing {}, net {}",
                category,
                totals.incoming,
                totals.outgoing,
                totals.net()
            )?;
        }

        writeln!(out)?;
        writeln!(out, "Current Stock:")?;
        for (name, stock) in &self.stock_levels {
            writeln!(out, "- {}: {} units", name, stock)?;
        }

        if !self.busiest_periods.is_empty() {
            writeln!(out)?;
            writeln!(out, "Busiest Periods:")?;
            for period in &self.busiest_periods {
                writeln!(out, "- {}: {} units", format_period(period.start_ms), period.units)?;
            }
        }

        Ok(())
    }
}

fn format_period(start_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(start_ms)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| start_ms.to_string())
}

/// Frame `question` with the aggregated context
pub fn render_prompt(question: &str, context: &InsightContext) -> String {
    format!(
        "Here is the context about our inventory data:\n\n{}\n\
         Based on this data, please answer the following question:\n{}\n\n\
         Please provide a clear and concise answer, focusing on the most relevant insights from the data.\n",
        context.describe(),
        question.trim()
    )
}

/// External text-generation collaborator
#[async_trait]
pub trait InsightProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, InsightError>;
}

/// Ask `provider` about `context`; the answer (or the error text) is returned as-is
pub async fn ask(provider: &dyn InsightProvider, question: &str, context: &InsightContext) -> String {
    let prompt = render_prompt(question, context);
    log::debug!("📥 Insight prompt: {} chars", prompt.len());

    match provider.generate(&prompt).await {
        Ok(answer) => answer,
        Err(e) => {
            log::warn!("⚠️  Insight provider failed: {}", e);
            format!("Error getting insights: {}", e)
        }
    }
}
