//! Read-only movement statistics and the rows behind file exports.

use chrono::{Duration, NaiveDate, Utc};
use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait, QueryOrder, QuerySelect};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::entities::{audit_entry, movement, product, state, user};
use crate::errors::ServiceError;
use crate::export::MovementRow;
use crate::forms::ReportFilter;
use crate::services::views::{newest_first, AuditView, Lookup, MovementView};

const DEFAULT_RANGE_DAYS: i64 = 30;
const TOP_PRODUCTS: usize = 5;
const RECENT_MOVEMENTS: usize = 10;
const DASHBOARD_RECENT: usize = 5;
const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StateCount {
    pub state: String,
    pub color: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NamedCount {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DayCount {
    pub day: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProductLoanDuration {
    pub product_id: i32,
    pub product: String,
    pub loans: usize,
    pub average_days: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct LoanDurations {
    /// `None` until at least one loan has been returned.
    pub average_days: Option<f64>,
    pub completed_loans: usize,
    pub per_product: Vec<ProductLoanDuration>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub state_filter: Option<String>,
    pub total_products: usize,
    pub products_by_state: Vec<StateCount>,
    pub movements_by_user: Vec<NamedCount>,
    pub movements_by_day: Vec<DayCount>,
    pub top_products: Vec<NamedCount>,
    pub recent_movements: Vec<MovementView>,
    pub loan_durations: LoanDurations,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub total_products: u64,
    pub total_users: u64,
    pub total_movements: u64,
    pub total_audit_entries: u64,
    pub recent_audit: Vec<AuditView>,
    pub recent_movements: Vec<MovementView>,
}

/// Everything the aggregator reads, loaded up front.
#[derive(Debug, Default)]
pub struct ReportData {
    pub products: Vec<product::Model>,
    pub states: Vec<state::Model>,
    pub users: Vec<user::Model>,
    pub movements: Vec<movement::Model>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn ranked(counts: HashMap<String, usize>) -> Vec<NamedCount> {
    let mut ranked: Vec<NamedCount> = counts
        .into_iter()
        .map(|(name, count)| NamedCount { name, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    ranked
}

/// Resolves the default date range: the last thirty days up to `today`.
pub fn effective_range(filter: &ReportFilter, today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let end = filter.end.unwrap_or(today);
    let start = filter.start.unwrap_or_else(|| {
        end.checked_sub_signed(Duration::days(DEFAULT_RANGE_DAYS))
            .unwrap_or(NaiveDate::MIN)
    });
    (start, end)
}

/// Pairs each entry into Loaned with the next exit from Loaned, per product.
pub fn loan_durations(movements: &[movement::Model], lookup: &Lookup) -> LoanDurations {
    let mut by_product: BTreeMap<i32, Vec<&movement::Model>> = BTreeMap::new();
    for m in movements {
        by_product.entry(m.product_id).or_default().push(m);
    }

    let mut all_days = Vec::new();
    let mut per_product = Vec::new();
    for (product_id, mut history) in by_product {
        history.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at).then(a.id.cmp(&b.id)));

        let mut opened = None;
        let mut days = Vec::new();
        for m in history {
            if m.new_state == state::LOANED {
                opened.get_or_insert(m.occurred_at);
            } else if m.previous_state == state::LOANED {
                if let Some(start) = opened.take() {
                    let seconds = (m.occurred_at - start).num_seconds().max(0) as f64;
                    days.push(seconds / SECONDS_PER_DAY);
                }
            }
        }

        if !days.is_empty() {
            let average = days.iter().sum::<f64>() / days.len() as f64;
            per_product.push(ProductLoanDuration {
                product_id,
                product: lookup.product_name(product_id),
                loans: days.len(),
                average_days: round2(average),
            });
            all_days.extend(days);
        }
    }

    let average_days = (!all_days.is_empty())
        .then(|| round2(all_days.iter().sum::<f64>() / all_days.len() as f64));
    LoanDurations {
        average_days,
        completed_loans: all_days.len(),
        per_product,
    }
}

/// Computes every report section from preloaded rows.
pub fn aggregate(data: &ReportData, filter: &ReportFilter, today: NaiveDate) -> Report {
    let lookup = Lookup::new(&data.products, &data.users, &data.states);
    let (start, end) = effective_range(filter, today);
    let mut warnings = Vec::new();

    let mut per_state: HashMap<i32, usize> = HashMap::new();
    for p in &data.products {
        *per_state.entry(p.state_id).or_default() += 1;
    }
    let mut states: Vec<&state::Model> = data.states.iter().collect();
    states.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.id.cmp(&b.id)));
    let count_for = |s: &state::Model| StateCount {
        state: s.name.clone(),
        color: s.color.clone(),
        count: per_state.get(&s.id).copied().unwrap_or(0),
    };
    let products_by_state = match filter.state.as_deref() {
        None => states.iter().map(|s| count_for(*s)).collect(),
        Some(name) => match states.iter().find(|s| s.name == name) {
            Some(found) => vec![count_for(*found)],
            None => {
                warnings.push(format!("Unknown state filter: {}", name));
                vec![StateCount {
                    state: name.to_string(),
                    color: String::new(),
                    count: 0,
                }]
            }
        },
    };

    let mut by_user: HashMap<String, usize> = HashMap::new();
    let mut by_product: HashMap<String, usize> = HashMap::new();
    let mut by_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for m in &data.movements {
        *by_user.entry(lookup.username(m.user_id)).or_default() += 1;
        *by_product.entry(lookup.product_name(m.product_id)).or_default() += 1;
        let day = m.occurred_at.date_naive();
        if day >= start && day <= end {
            *by_day.entry(day).or_default() += 1;
        }
    }

    let mut recent = data.movements.clone();
    newest_first(&mut recent);
    recent.truncate(RECENT_MOVEMENTS);

    let mut top_products = ranked(by_product);
    top_products.truncate(TOP_PRODUCTS);

    Report {
        start,
        end,
        state_filter: filter.state.clone(),
        total_products: data.products.len(),
        products_by_state,
        movements_by_user: ranked(by_user),
        movements_by_day: by_day
            .into_iter()
            .map(|(day, count)| DayCount {
                day: day.format("%Y-%m-%d").to_string(),
                count,
            })
            .collect(),
        top_products,
        recent_movements: recent.iter().map(|m| lookup.movement_view(m)).collect(),
        loan_durations: loan_durations(&data.movements, &lookup),
        warnings,
    }
}

/// Full movement history as export rows, newest first.
pub fn movement_rows(data: &ReportData) -> Vec<MovementRow> {
    let lookup = Lookup::new(&data.products, &data.users, &data.states);
    let mut movements = data.movements.clone();
    newest_first(&mut movements);
    movements
        .iter()
        .map(|m| MovementRow {
            date: m.occurred_at.format("%Y-%m-%d %H:%M").to_string(),
            product: lookup.product_name(m.product_id),
            user: lookup.username(m.user_id),
            previous_state: m.previous_state.clone(),
            new_state: m.new_state.clone(),
        })
        .collect()
}

#[derive(Clone)]
pub struct ReportService {
    db: Arc<DatabaseConnection>,
}

impl ReportService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn load(&self) -> Result<ReportData, ServiceError> {
        let db = &*self.db;
        Ok(ReportData {
            products: product::Entity::find().all(db).await?,
            states: state::Entity::find().all(db).await?,
            users: user::Entity::find().all(db).await?,
            movements: movement::Entity::find().all(db).await?,
        })
    }

    #[instrument(skip(self))]
    pub async fn report(&self, filter: &ReportFilter) -> Result<Report, ServiceError> {
        let data = self.load().await?;
        let report = aggregate(&data, filter, Utc::now().date_naive());
        for warning in &report.warnings {
            warn!(%warning, "report filter");
        }
        debug!(
            movements = data.movements.len(),
            start = %report.start,
            end = %report.end,
            "report aggregated"
        );
        Ok(report)
    }

    pub async fn export_rows(&self) -> Result<Vec<MovementRow>, ServiceError> {
        let data = self.load().await?;
        Ok(movement_rows(&data))
    }

    pub async fn dashboard(&self) -> Result<DashboardStats, ServiceError> {
        let db = &*self.db;
        let recent_audit = audit_entry::Entity::find()
            .order_by_desc(audit_entry::Column::OccurredAt)
            .order_by_desc(audit_entry::Column::Id)
            .limit(DASHBOARD_RECENT as u64)
            .all(db)
            .await?;
        let recent_movements = movement::Entity::find()
            .order_by_desc(movement::Column::OccurredAt)
            .order_by_desc(movement::Column::Id)
            .limit(DASHBOARD_RECENT as u64)
            .all(db)
            .await?;

        let products = product::Entity::find().all(db).await?;
        let users = user::Entity::find().all(db).await?;
        let lookup = Lookup::new(&products, &users, &[]);

        Ok(DashboardStats {
            total_products: products.len() as u64,
            total_users: users.len() as u64,
            total_movements: movement::Entity::find().count(db).await?,
            total_audit_entries: audit_entry::Entity::find().count(db).await?,
            recent_audit: recent_audit.iter().map(|a| lookup.audit_view(a)).collect(),
            recent_movements: recent_movements
                .iter()
                .map(|m| lookup.movement_view(m))
                .collect(),
        })
    }
}
