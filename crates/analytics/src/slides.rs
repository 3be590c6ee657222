//! Monthly report deck. Each slide kind carries its own payload; consumers
//! match on the kind.

use practice_core::period::DateInterval;
use practice_core::types::{Consultation, MonthKey, PaymentRecord, PracticeSettings};
use serde::{Deserialize, Serialize};

use crate::churn::ChurnClassifier;
use crate::engine::{self, PipelineSummary};
use crate::snapshot::{self, ClinicianMetrics, MonthMetrics};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Slide {
    Revenue(RevenueSlide),
    Sessions(SessionsSlide),
    Clients(ClientsSlide),
    Retention(RetentionSlide),
    Clinicians(CliniciansSlide),
    Consultations(ConsultationsSlide),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueSlide {
    pub month: String,
    pub revenue: f64,
    pub target: f64,
    /// Percent change against the previous month, when it had revenue.
    pub change_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsSlide {
    pub sessions: usize,
    pub capacity_utilization: f64,
    pub attendance_rate: f64,
    pub notes_compliance_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientsSlide {
    pub active: usize,
    pub new: usize,
    pub churned: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionSlide {
    pub retention_rate: Option<f64>,
    pub churn_window_days: i64,
    /// Clients past the churn window at month end.
    pub lapsed_clients: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliniciansSlide {
    pub clinicians: Vec<ClinicianMetrics>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultationsSlide {
    pub pipeline: PipelineSummary,
}

impl Slide {
    pub fn title(&self) -> &'static str {
        match self {
            Slide::Revenue(_) => "Revenue",
            Slide::Sessions(_) => "Sessions",
            Slide::Clients(_) => "Clients",
            Slide::Retention(_) => "Retention",
            Slide::Clinicians(_) => "Clinicians",
            Slide::Consultations(_) => "Consultations",
        }
    }

    /// Plain-text rendering for terminals and logs.
    pub fn render(&self) -> String {
        let body = match self {
            Slide::Revenue(s) => {
                let change = s
                    .change_pct
                    .map(|c| format!(" ({c:+.1}% vs prior month)"))
                    .unwrap_or_default();
                format!("${:.2} of ${:.2} target{change}", s.revenue, s.target)
            }
            Slide::Sessions(s) => format!(
                "{} sessions, {:.0}% of capacity, {:.0}% attendance, {:.0}% notes complete",
                s.sessions,
                s.capacity_utilization * 100.0,
                s.attendance_rate * 100.0,
                s.notes_compliance_rate * 100.0
            ),
            Slide::Clients(s) => format!("{} active, {} new, {} churned", s.active, s.new, s.churned),
            Slide::Retention(s) => {
                let rate = s
                    .retention_rate
                    .map(|r| format!("{:.0}% retained", r * 100.0))
                    .unwrap_or_else(|| "no prior month".to_string());
                format!(
                    "{rate}; {} clients past {} days without a session",
                    s.lapsed_clients, s.churn_window_days
                )
            }
            Slide::Clinicians(s) => s
                .clinicians
                .iter()
                .map(|c| {
                    format!(
                        "{}: ${:.2} / {} sessions / {} clients",
                        c.name, c.revenue, c.sessions, c.active_clients
                    )
                })
                .collect::<Vec<_>>()
                .join("\n  "),
            Slide::Consultations(s) => format!(
                "{} requests: {} inquiry, {} scheduled, {} completed, {} converted, {} lost ({:.0}% conversion)",
                s.pipeline.total,
                s.pipeline.inquiry,
                s.pipeline.scheduled,
                s.pipeline.completed,
                s.pipeline.converted,
                s.pipeline.lost,
                s.pipeline.conversion_rate * 100.0
            ),
        };
        format!("{}\n  {body}", self.title())
    }
}

/// Build the report deck for one month.
pub fn build_deck(
    records: &[PaymentRecord],
    consultations: &[Consultation],
    settings: &PracticeSettings,
    key: MonthKey,
) -> Vec<Slide> {
    let current = snapshot::month_metrics(records, settings, key);
    build_deck_from(&current, records, consultations, settings, key)
}

/// Build a deck around metrics that may have come from elsewhere (for
/// example the remote endpoint). Slides needing raw records use `records`.
pub fn build_deck_from(
    current: &MonthMetrics,
    records: &[PaymentRecord],
    consultations: &[Consultation],
    settings: &PracticeSettings,
    key: MonthKey,
) -> Vec<Slide> {
    let interval = DateInterval::spanning(key, key);
    let prev = key.prev();
    let in_prev = engine::MetricsEngine::new(records).records_for_month(prev.month0 as i32, prev.year);
    let prev_revenue = engine::revenue(&in_prev);
    let change_pct = (prev_revenue > 0.0).then(|| (current.revenue - prev_revenue) / prev_revenue * 100.0);

    let month_end = interval.last_day();
    let through_month_end: Vec<&PaymentRecord> = records.iter().filter(|r| r.date_paid <= month_end).collect();
    let lapsed = ChurnClassifier::new(settings.churn_window_days)
        .churned_as_of(&through_month_end, month_end)
        .len();

    let mut deck = vec![
        Slide::Revenue(RevenueSlide {
            month: current.label.clone(),
            revenue: current.revenue,
            target: settings.target_monthly_revenue,
            change_pct,
        }),
        Slide::Sessions(SessionsSlide {
            sessions: current.sessions,
            capacity_utilization: current.capacity_utilization,
            attendance_rate: settings.attendance_rate,
            notes_compliance_rate: settings.notes_compliance_rate,
        }),
        Slide::Clients(ClientsSlide {
            active: current.active_clients,
            new: current.new_clients,
            churned: current.churned_clients,
        }),
        Slide::Retention(RetentionSlide {
            retention_rate: current.retention_rate,
            churn_window_days: settings.churn_window_days,
            lapsed_clients: lapsed,
        }),
        Slide::Clinicians(CliniciansSlide {
            clinicians: current.clinicians.clone(),
        }),
    ];
    if !consultations.is_empty() {
        deck.push(Slide::Consultations(ConsultationsSlide {
            pipeline: engine::consultation_pipeline(consultations, &interval),
        }));
    }
    deck
}
