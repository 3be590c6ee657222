//! Seeded generator for a practice's clinicians, clients, sessions,
//! payments and consultation pipeline.

use chrono::{Datelike, Duration, NaiveDate};
use practice_analytics::MetricsEngine;
use practice_core::types::{
    Client, Clinician, Consultation, ConsultationStage, DemoData, MonthKey, PaymentRecord, Session,
    DEFAULT_CHURN_WINDOW_DAYS,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;
use uuid::Uuid;

use crate::config::{ClinicianConfig, PracticeConfig};
use crate::GeneratorError;

const INTAKE_CPT: &str = "90791";
const FOLLOW_UP_CPTS: &[&str] = &["90837", "90834", "90832"];
const FIRST_NAMES: &[&str] = &[
    "Alex", "Bailey", "Casey", "Devon", "Emery", "Finley", "Harper", "Jesse", "Kai", "Logan",
    "Morgan", "Quinn", "Riley", "Rowan", "Sawyer", "Taylor",
];

struct ActiveClient {
    index: usize,
    last_session: Option<NaiveDate>,
}

pub struct DemoGenerator {
    config: PracticeConfig,
    rng: StdRng,
}

impl DemoGenerator {
    pub fn new(config: PracticeConfig) -> Result<Self, GeneratorError> {
        config.validate()?;
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self { config, rng })
    }

    /// Produce the full bundle. The same config always yields the same data.
    pub fn generate(mut self) -> DemoData {
        let clinicians: Vec<Clinician> = self
            .config
            .clinicians
            .iter()
            .enumerate()
            .map(|(i, c)| Clinician {
                id: format!("clin-{:02}", i + 1),
                name: c.name.clone(),
            })
            .collect();

        let mut clients: Vec<Client> = Vec::new();
        let mut sessions: Vec<Session> = Vec::new();
        let mut payments: Vec<PaymentRecord> = Vec::new();
        let mut caseloads: Vec<Vec<ActiveClient>> = clinicians.iter().map(|_| Vec::new()).collect();

        let configs = self.config.clinicians.clone();
        let mut key = self.config.start_month;
        for month_index in 0..self.config.months {
            for (slot, (clinician, cfg)) in clinicians.iter().zip(&configs).enumerate() {
                // Ramp the opening month to half the target caseload.
                let intakes = if month_index == 0 {
                    cfg.target_caseload / 2
                } else {
                    let open = cfg.target_caseload.saturating_sub(caseloads[slot].len() as u32);
                    open.min(self.rng.gen_range(0..=self.config.max_new_clients_per_clinician))
                };
                for _ in 0..intakes {
                    let first_session = self.random_day(key);
                    clients.push(Client {
                        id: format!("client-{:04}", clients.len() + 1),
                        clinician_id: clinician.id.clone(),
                        first_session,
                        churned_on: None,
                    });
                    caseloads[slot].push(ActiveClient {
                        index: clients.len() - 1,
                        last_session: None,
                    });
                }

                let mut remaining = Vec::with_capacity(caseloads[slot].len());
                for mut active in std::mem::take(&mut caseloads[slot]) {
                    self.run_month(key, clinician, cfg, &mut active, &clients, &mut sessions, &mut payments);
                    let attended_before = active.last_session.is_some();
                    if attended_before && self.rng.gen_bool(self.config.monthly_churn_probability) {
                        clients[active.index].churned_on = active.last_session;
                    } else {
                        remaining.push(active);
                    }
                }
                caseloads[slot] = remaining;
            }
            key = key.next();
        }

        let consultations = self.consultations(&clinicians);

        sessions.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.client_id.cmp(&b.client_id)));
        payments.sort_by(|a, b| a.date_paid.cmp(&b.date_paid).then_with(|| a.client_id.cmp(&b.client_id)));
        let monthly = MetricsEngine::new(&payments).monthly_series(DEFAULT_CHURN_WINDOW_DAYS);

        info!(
            clinicians = clinicians.len(),
            clients = clients.len(),
            payments = payments.len(),
            months = monthly.len(),
            "Generated demo practice data"
        );

        DemoData {
            practice_name: self.config.practice_name.clone(),
            clinicians,
            clients,
            sessions,
            payments,
            consultations,
            monthly,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn run_month(
        &mut self,
        key: MonthKey,
        clinician: &Clinician,
        cfg: &ClinicianConfig,
        active: &mut ActiveClient,
        clients: &[Client],
        sessions: &mut Vec<Session>,
        payments: &mut Vec<PaymentRecord>,
    ) {
        let client = &clients[active.index];
        let whole = cfg.sessions_per_client.trunc() as u32;
        let extra = u32::from(self.rng.gen_bool(cfg.sessions_per_client.fract()));

        let mut dates: Vec<NaiveDate> = (0..whole + extra).map(|_| self.random_day(key)).collect();
        if active.last_session.is_none() {
            // The intake lands on the recorded first-session date.
            dates.retain(|d| *d > client.first_session);
            dates.push(client.first_session);
        }
        dates.sort();

        for date in dates {
            let intake = active.last_session.is_none() && date == client.first_session;
            let attended = intake || self.rng.gen_bool(self.config.attendance_rate);
            let cpt_code = if intake {
                INTAKE_CPT
            } else {
                FOLLOW_UP_CPTS[self.rng.gen_range(0..FOLLOW_UP_CPTS.len())]
            };
            sessions.push(Session {
                client_id: client.id.clone(),
                clinician_id: clinician.id.clone(),
                date,
                cpt_code: cpt_code.to_string(),
                attended,
            });
            if attended {
                payments.push(PaymentRecord {
                    clinician_id: clinician.id.clone(),
                    clinician: clinician.name.clone(),
                    date_paid: date,
                    appointment_date: Some(date),
                    cpt_code: cpt_code.to_string(),
                    client_id: client.id.clone(),
                    amount: cfg.session_fee,
                });
                active.last_session = Some(date);
            }
        }
    }

    fn consultations(&mut self, clinicians: &[Clinician]) -> Vec<Consultation> {
        let last = self.config.last_month();
        let mut out = Vec::new();
        let mut key = self.config.start_month;
        while key <= last {
            for _ in 0..self.config.consultations_per_month {
                let requested_on = self.random_day(key);
                // Recent requests are still moving through the pipeline.
                let stage = if key == last {
                    match self.rng.gen_range(0..3) {
                        0 => ConsultationStage::Inquiry,
                        1 => ConsultationStage::Scheduled,
                        _ => ConsultationStage::Completed,
                    }
                } else if self.rng.gen_bool(self.config.consultation_conversion_rate) {
                    ConsultationStage::Converted
                } else {
                    ConsultationStage::Lost
                };
                let clinician_id = matches!(stage, ConsultationStage::Converted | ConsultationStage::Scheduled)
                    .then(|| clinicians[self.rng.gen_range(0..clinicians.len())].id.clone());
                let first = FIRST_NAMES[self.rng.gen_range(0..FIRST_NAMES.len())];
                let initial = (b'A' + self.rng.gen_range(0..26u8)) as char;

                out.push(Consultation {
                    id: Uuid::from_u128(self.rng.gen()),
                    client_name: format!("{first} {initial}."),
                    clinician_id,
                    requested_on,
                    stage,
                });
            }
            key = key.next();
        }
        out.sort_by_key(|c| c.requested_on);
        out
    }

    fn random_day(&mut self, key: MonthKey) -> NaiveDate {
        let days = key.last_day().day() as i64;
        key.first_day() + Duration::days(self.rng.gen_range(0..days))
    }
}
