use std::future::Future;

use anyhow::{Context, Result, bail};
use chrono::{Datelike, Local, NaiveDate};
use serde::Serialize;
use serde_json::Value;

use crate::dates::{format_long_date, format_short_date, parse_brew_date_in};
use crate::models::{BrewRecord, BrewStats, BrewStatus, Ingredient, Reading};
use crate::normalize::parse_brews_csv;
use crate::stats::brew_stats_on;

pub const NO_READINGS: &str = "No readings";
pub const NO_NOTES: &str = "No notes yet.";

/// Remote storage for the brew set.
///
/// Reads come back as the published CSV export; writes push one whole record
/// to the script endpoint, which upserts the matching row by id.
pub trait BrewStore {
    fn fetch_csv(&self) -> impl Future<Output = Result<String>> + Send;
    fn push_brew(&self, brew: &BrewRecord) -> impl Future<Output = Result<()>> + Send;
}

/// Decide whether a script-endpoint response means the write succeeded.
///
/// The body is read leniently: anything that isn't a JSON object counts as
/// `{}`. A non-2xx status or an explicit `"success": false` is a failure,
/// reported with the server's `error` text when it sent one.
pub fn interpret_push_response(status: u16, body: &str) -> Result<()> {
    let data: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let ok = (200..300).contains(&status);
    let rejected = data.get("success") == Some(&Value::Bool(false));
    if ok && !rejected {
        return Ok(());
    }

    match data.get("error") {
        Some(Value::String(msg)) if !msg.is_empty() => bail!("{msg}"),
        _ => bail!("Request failed: {status}"),
    }
}

/// Build an ingredient from user input. Blank or unparseable costs count as
/// zero; negative costs and empty item names are rejected.
pub fn parse_ingredient(item: &str, cost: &str) -> Result<Ingredient> {
    let item = item.trim();
    if item.is_empty() {
        bail!("Ingredient item is required");
    }
    let cost = cost
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|c| c.is_finite())
        .unwrap_or(0.0);
    if cost < 0.0 {
        bail!("Ingredient cost cannot be negative: {cost}");
    }
    Ok(Ingredient {
        item: item.to_string(),
        cost,
    })
}

/// One row of the brew list.
#[derive(Debug, Clone, Serialize)]
pub struct BrewSummary {
    pub id: String,
    pub name: String,
    pub status: BrewStatus,
    /// Long-format date of the first reading, or [`NO_READINGS`].
    pub started: String,
    pub readings: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub label: String,
    pub sg: Option<f64>,
}

/// SG-over-time series for one brew. Lives exactly as long as the
/// [`DetailView`] that owns it.
#[derive(Debug, Serialize)]
pub struct SgChart {
    pub brew_id: String,
    pub points: Vec<ChartPoint>,
}

impl SgChart {
    fn build(brew: &BrewRecord, current_year: i32) -> Self {
        let points = brew
            .readings
            .iter()
            .map(|r| ChartPoint {
                label: format_short_date(parse_brew_date_in(&r.date, current_year)),
                sg: r.normalized_sg(),
            })
            .collect();
        tracing::debug!(brew = %brew.id, "chart created");
        Self {
            brew_id: brew.id.clone(),
            points,
        }
    }
}

impl Drop for SgChart {
    fn drop(&mut self) {
        tracing::debug!(brew = %self.brew_id, "chart released");
    }
}

/// Everything the detail screen shows for one brew.
#[derive(Debug, Serialize)]
pub struct DetailView {
    pub brew: BrewRecord,
    pub stats: BrewStats,
    pub chart: SgChart,
    pub ingredients_total: f64,
}

impl DetailView {
    #[must_use]
    pub fn notes_text(&self) -> &str {
        if self.brew.notes.is_empty() {
            NO_NOTES
        } else {
            &self.brew.notes
        }
    }

    /// Label of the action that flips the fermenting flag.
    #[must_use]
    pub fn toggle_label(&self) -> &'static str {
        if self.brew.fermenting {
            "Mark as complete"
        } else {
            "Mark as fermenting"
        }
    }
}

/// Input for [`BrewService::log_reading`].
#[derive(Debug, Clone)]
pub struct NewReading {
    pub date: String,
    pub sg: f64,
    pub temp: Option<f64>,
}

/// Application state: the last fetched brew set and the store it came from.
///
/// Every mutation is applied to the in-memory record, pushed, and followed by
/// a full re-fetch. A failed push returns its error without re-fetching, so
/// the local edit stays visible until the next [`refresh`](Self::refresh).
pub struct BrewService<S> {
    store: S,
    brews: Vec<BrewRecord>,
    last_error: Option<String>,
}

impl<S: BrewStore> BrewService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            brews: Vec::new(),
            last_error: None,
        }
    }

    /// Replace the in-memory set with a fresh copy from the store. On failure
    /// the set is emptied and the message kept in [`last_error`](Self::last_error).
    pub async fn refresh(&mut self) -> Result<usize> {
        let loaded = match self.store.fetch_csv().await {
            Ok(csv) => parse_brews_csv(csv.as_bytes()),
            Err(e) => Err(e),
        };
        match loaded {
            Ok(brews) => {
                tracing::debug!(count = brews.len(), "brews loaded");
                self.brews = brews;
                self.last_error = None;
                Ok(self.brews.len())
            }
            Err(e) => {
                self.brews.clear();
                self.last_error = Some(format!("{e:#}"));
                Err(e.context("Could not load brews"))
            }
        }
    }

    pub fn brews(&self) -> &[BrewRecord] {
        &self.brews
    }

    pub fn brew(&self, id: &str) -> Option<&BrewRecord> {
        self.brews.iter().find(|b| b.id == id)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn summaries(&self) -> Vec<BrewSummary> {
        self.summaries_on(Local::now().date_naive())
    }

    pub fn summaries_on(&self, today: NaiveDate) -> Vec<BrewSummary> {
        self.brews
            .iter()
            .map(|brew| {
                let stats = brew_stats_on(brew, today);
                let started = if brew.readings.is_empty() {
                    NO_READINGS.to_string()
                } else {
                    format_long_date(stats.start_date)
                };
                BrewSummary {
                    id: brew.id.clone(),
                    name: brew.name.clone(),
                    status: stats.status,
                    started,
                    readings: stats.count,
                }
            })
            .collect()
    }

    pub fn open_detail(&self, id: &str) -> Option<DetailView> {
        self.open_detail_on(id, Local::now().date_naive())
    }

    pub fn open_detail_on(&self, id: &str, today: NaiveDate) -> Option<DetailView> {
        let brew = self.brew(id)?.clone();
        let stats = brew_stats_on(&brew, today);
        let chart = SgChart::build(&brew, today.year());
        let ingredients_total = brew.ingredients_total();
        Some(DetailView {
            brew,
            stats,
            chart,
            ingredients_total,
        })
    }

    /// Create a new brew with a random id. Returns the id.
    pub async fn start_brew(&mut self, name: &str, notes: &str) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            bail!("Brew name is required");
        }
        let brew = BrewRecord::new(
            uuid::Uuid::new_v4().to_string(),
            name.to_string(),
            notes.trim().to_string(),
        );
        let id = brew.id.clone();
        tracing::debug!(%id, name, "starting brew");
        self.persist(brew).await?;
        Ok(id)
    }

    pub async fn log_reading(&mut self, id: &str, reading: NewReading) -> Result<()> {
        if !reading.sg.is_finite() {
            bail!("SG must be a number");
        }
        let date = reading.date.trim();
        if date.is_empty() {
            bail!("Reading date is required");
        }
        let date = date.to_string();
        self.mutate(id, move |brew| {
            brew.readings.push(Reading {
                date,
                sg: Some(reading.sg),
                temp: reading.temp.filter(|t| t.is_finite()),
            });
            Ok(())
        })
        .await
    }

    pub async fn save_notes(&mut self, id: &str, notes: &str) -> Result<()> {
        let notes = notes.trim().to_string();
        self.mutate(id, move |brew| {
            brew.notes = notes;
            Ok(())
        })
        .await
    }

    pub async fn add_ingredient(&mut self, id: &str, ingredient: Ingredient) -> Result<()> {
        self.mutate(id, move |brew| {
            brew.ingredients.push(ingredient);
            Ok(())
        })
        .await
    }

    pub async fn edit_ingredient(
        &mut self,
        id: &str,
        index: usize,
        ingredient: Ingredient,
    ) -> Result<()> {
        self.mutate(id, move |brew| {
            let slot = brew
                .ingredients
                .get_mut(index)
                .with_context(|| format!("No ingredient at position {}", index + 1))?;
            *slot = ingredient;
            Ok(())
        })
        .await
    }

    pub async fn delete_ingredient(&mut self, id: &str, index: usize) -> Result<Ingredient> {
        let mut removed = None;
        self.mutate(id, |brew| {
            if index >= brew.ingredients.len() {
                bail!("No ingredient at position {}", index + 1);
            }
            removed = Some(brew.ingredients.remove(index));
            Ok(())
        })
        .await?;
        removed.context("ingredient vanished during delete")
    }

    /// Flip the fermenting flag. Returns the new value.
    pub async fn toggle_fermenting(&mut self, id: &str) -> Result<bool> {
        let mut now_fermenting = false;
        self.mutate(id, |brew| {
            brew.fermenting = !brew.fermenting;
            now_fermenting = brew.fermenting;
            Ok(())
        })
        .await?;
        Ok(now_fermenting)
    }

    async fn mutate(
        &mut self,
        id: &str,
        apply: impl FnOnce(&mut BrewRecord) -> Result<()>,
    ) -> Result<()> {
        let Some(brew) = self.brews.iter_mut().find(|b| b.id == id) else {
            bail!("Brew not found: {id}");
        };
        apply(brew)?;
        let snapshot = brew.clone();
        self.persist(snapshot).await
    }

    /// Push one record, then re-fetch the full set.
    async fn persist(&mut self, brew: BrewRecord) -> Result<()> {
        self.store
            .push_brew(&brew)
            .await
            .with_context(|| format!("Failed to save brew {}", brew.id))?;
        tracing::debug!(id = %brew.id, "brew saved, refreshing");
        self.refresh().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const SHEET: &str = "id,name,readings,notes,ingredients,fermenting
b1,Cider,\"[{\"\"date\"\":\"\"2024-03-01\"\",\"\"SG\"\":1.050},{\"\"date\"\":\"\"2024-03-08\"\",\"\"SG\"\":1.010}]\",tart,\"[{\"\"item\"\":\"\"Apples\"\",\"\"cost\"\":12.5}]\",true
b2,Mead,,,,false
";

    /// In-memory sheet: pushes upsert rows, fetches render them back as CSV.
    #[derive(Default)]
    struct FakeStore {
        rows: Mutex<Vec<BrewRecord>>,
        pushes: Mutex<Vec<BrewRecord>>,
        fetches: Mutex<usize>,
        seed_csv: Option<String>,
        fail_fetch: bool,
        reject_push: bool,
    }

    impl FakeStore {
        fn seeded() -> Self {
            Self {
                rows: Mutex::new(parse_brews_csv(SHEET.as_bytes()).unwrap()),
                ..Self::default()
            }
        }

        fn fetches(&self) -> usize {
            *self.fetches.lock().unwrap()
        }
    }

    fn to_csv(rows: &[BrewRecord]) -> String {
        let mut w = csv::Writer::from_writer(Vec::new());
        w.write_record(["id", "name", "readings", "notes", "ingredients", "fermenting"])
            .unwrap();
        for b in rows {
            w.write_record([
                b.id.clone(),
                b.name.clone(),
                serde_json::to_string(&b.readings).unwrap(),
                b.notes.clone(),
                serde_json::to_string(&b.ingredients).unwrap(),
                b.fermenting.to_string(),
            ])
            .unwrap();
        }
        String::from_utf8(w.into_inner().unwrap()).unwrap()
    }

    impl BrewStore for FakeStore {
        async fn fetch_csv(&self) -> Result<String> {
            *self.fetches.lock().unwrap() += 1;
            if self.fail_fetch {
                bail!("Failed to load data: 500");
            }
            if let Some(csv) = &self.seed_csv {
                return Ok(csv.clone());
            }
            Ok(to_csv(&self.rows.lock().unwrap()))
        }

        async fn push_brew(&self, brew: &BrewRecord) -> Result<()> {
            self.pushes.lock().unwrap().push(brew.clone());
            if self.reject_push {
                return interpret_push_response(200, r#"{"success":false,"error":"Sheet locked"}"#);
            }
            let mut rows = self.rows.lock().unwrap();
            match rows.iter_mut().find(|r| r.id == brew.id) {
                Some(row) => *row = brew.clone(),
                None => rows.push(brew.clone()),
            }
            Ok(())
        }
    }

    async fn loaded(store: FakeStore) -> BrewService<FakeStore> {
        let mut service = BrewService::new(store);
        service.refresh().await.unwrap();
        service
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    #[test]
    fn test_push_response_success() {
        assert!(interpret_push_response(200, r#"{"success":true}"#).is_ok());
        assert!(interpret_push_response(200, "").is_ok());
        assert!(interpret_push_response(204, "not json").is_ok());
    }

    #[test]
    fn test_push_response_rejected_with_message() {
        let err = interpret_push_response(200, r#"{"success":false,"error":"Sheet locked"}"#)
            .unwrap_err();
        assert_eq!(err.to_string(), "Sheet locked");
    }

    #[test]
    fn test_push_response_generic_message() {
        let err = interpret_push_response(200, r#"{"success":false}"#).unwrap_err();
        assert_eq!(err.to_string(), "Request failed: 200");
        let err = interpret_push_response(500, "<html>oops</html>").unwrap_err();
        assert_eq!(err.to_string(), "Request failed: 500");
        let err = interpret_push_response(403, r#"{"error":"Forbidden"}"#).unwrap_err();
        assert_eq!(err.to_string(), "Forbidden");
    }

    #[test]
    fn test_parse_ingredient() {
        let ing = parse_ingredient("  Honey ", "9.99").unwrap();
        assert_eq!(ing.item, "Honey");
        assert!((ing.cost - 9.99).abs() < 1e-12);
        assert_eq!(parse_ingredient("Yeast", "").unwrap().cost, 0.0);
        assert_eq!(parse_ingredient("Yeast", "cheap").unwrap().cost, 0.0);
        assert!(parse_ingredient("  ", "1").is_err());
        assert!(parse_ingredient("Yeast", "-2").is_err());
    }

    #[tokio::test]
    async fn test_refresh_loads_identified_records() {
        let service = loaded(FakeStore::seeded()).await;
        assert_eq!(service.brews().len(), 2);
        assert!(service.brew("b2").is_some_and(|b| !b.fermenting));
        assert!(service.last_error().is_none());
    }

    #[tokio::test]
    async fn test_refresh_failure_clears_set() {
        let mut service = loaded(FakeStore::seeded()).await;
        service.store.fail_fetch = true;
        assert!(service.refresh().await.is_err());
        assert!(service.brews().is_empty());
        assert!(service.last_error().unwrap().contains("500"));
    }

    #[tokio::test]
    async fn test_start_brew_pushes_then_refetches() {
        let mut service = loaded(FakeStore::default()).await;
        let id = service.start_brew("  Stout ", " roasty ").await.unwrap();

        assert_eq!(service.store.fetches(), 2);
        let brew = service.brew(&id).unwrap();
        assert_eq!(brew.name, "Stout");
        assert_eq!(brew.notes, "roasty");
        assert!(brew.fermenting);
        assert!(uuid::Uuid::parse_str(&id).is_ok());
    }

    #[tokio::test]
    async fn test_start_brew_requires_name() {
        let mut service = loaded(FakeStore::default()).await;
        assert!(service.start_brew("   ", "").await.is_err());
        assert!(service.store.pushes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_log_reading_appends() {
        let mut service = loaded(FakeStore::seeded()).await;
        service
            .log_reading(
                "b1",
                NewReading {
                    date: "2024-03-12".into(),
                    sg: 1008.0,
                    temp: Some(19.5),
                },
            )
            .await
            .unwrap();

        let brew = service.brew("b1").unwrap();
        assert_eq!(brew.readings.len(), 3);
        assert_eq!(brew.readings[2].sg, Some(1008.0));
        assert_eq!(brew.readings[2].temp, Some(19.5));
    }

    #[tokio::test]
    async fn test_log_reading_rejects_bad_sg() {
        let mut service = loaded(FakeStore::seeded()).await;
        let reading = NewReading {
            date: "2024-03-12".into(),
            sg: f64::NAN,
            temp: None,
        };
        assert!(service.log_reading("b1", reading).await.is_err());
        assert!(service.store.pushes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_brew() {
        let mut service = loaded(FakeStore::seeded()).await;
        let err = service.save_notes("nope", "x").await.unwrap_err();
        assert!(err.to_string().contains("Brew not found"));
    }

    #[tokio::test]
    async fn test_failed_push_skips_refetch_and_keeps_local_edit() {
        let mut service = loaded(FakeStore {
            reject_push: true,
            ..FakeStore::seeded()
        })
        .await;

        let err = service.save_notes("b1", "new notes").await.unwrap_err();
        assert!(format!("{err:#}").contains("Sheet locked"));
        assert_eq!(service.store.fetches(), 1);
        assert_eq!(service.brew("b1").unwrap().notes, "new notes");
    }

    #[tokio::test]
    async fn test_ingredient_add_edit_delete() {
        let mut service = loaded(FakeStore::seeded()).await;
        service
            .add_ingredient("b1", parse_ingredient("Yeast", "4").unwrap())
            .await
            .unwrap();
        assert_eq!(service.brew("b1").unwrap().ingredients.len(), 2);

        service
            .edit_ingredient("b1", 0, parse_ingredient("Bramleys", "15").unwrap())
            .await
            .unwrap();
        assert_eq!(service.brew("b1").unwrap().ingredients[0].item, "Bramleys");

        let removed = service.delete_ingredient("b1", 1).await.unwrap();
        assert_eq!(removed.item, "Yeast");
        assert_eq!(service.brew("b1").unwrap().ingredients.len(), 1);

        assert!(service.delete_ingredient("b1", 5).await.is_err());
        assert!(
            service
                .edit_ingredient("b1", 5, parse_ingredient("x", "1").unwrap())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_toggle_fermenting() {
        let mut service = loaded(FakeStore::seeded()).await;
        assert!(!service.toggle_fermenting("b1").await.unwrap());
        assert!(!service.brew("b1").unwrap().fermenting);
        assert!(service.toggle_fermenting("b1").await.unwrap());

        let pushed = service.store.pushes.lock().unwrap();
        assert_eq!(pushed.len(), 2);
        assert!(!pushed[0].fermenting);
    }

    #[tokio::test]
    async fn test_summaries() {
        let service = loaded(FakeStore::seeded()).await;
        let rows = service.summaries_on(today());
        assert_eq!(rows[0].started, "March 1, 2024");
        assert_eq!(rows[0].status, BrewStatus::Ready);
        assert_eq!(rows[0].readings, 2);
        assert_eq!(rows[1].started, NO_READINGS);
        assert_eq!(rows[1].status, BrewStatus::New);
    }

    #[tokio::test]
    async fn test_open_detail() {
        let service = loaded(FakeStore::seeded()).await;
        let view = service.open_detail_on("b1", today()).unwrap();

        assert_eq!(view.stats.abv, Some(5.3));
        assert_eq!(view.stats.days, Some(14));
        assert!((view.ingredients_total - 12.5).abs() < 1e-12);
        assert_eq!(view.notes_text(), "tart");
        assert_eq!(view.toggle_label(), "Mark as complete");
        assert_eq!(
            view.chart.points,
            vec![
                ChartPoint {
                    label: "01/03".into(),
                    sg: Some(1.050)
                },
                ChartPoint {
                    label: "08/03".into(),
                    sg: Some(1.010)
                },
            ]
        );

        let mead = service.open_detail_on("b2", today()).unwrap();
        assert_eq!(mead.notes_text(), NO_NOTES);
        assert_eq!(mead.toggle_label(), "Mark as fermenting");
        assert!(mead.chart.points.is_empty());

        assert!(service.open_detail("missing").is_none());
    }

    #[tokio::test]
    async fn test_refresh_accepts_headerless_sheet() {
        let store = FakeStore {
            seed_csv: Some("x1,Porter,,,,\n".into()),
            ..FakeStore::default()
        };
        let service = loaded(store).await;
        assert_eq!(service.brews()[0].name, "Porter");
        assert!(service.brews()[0].fermenting);
    }
}
