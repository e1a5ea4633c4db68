use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::{
    db::models::Project,
    domain::{cost::{self, CostSummary}, phase},
    error::Result,
    routes::projects::cost_summary,
    AppState,
};

/// Mounted behind the `ViewReports` layer.
pub fn router() -> Router<AppState> {
    Router::new().route("/costs", get(cost_report))
}

#[derive(Debug, Serialize)]
pub struct ProjectCostReport {
    pub project_id: String,
    pub name: String,
    pub current_phase: u8,
    pub progress: f64,
    pub costs: CostSummary,
}

#[derive(Debug, Serialize)]
pub struct CostReport {
    pub projects: Vec<ProjectCostReport>,
    pub materials_total: f64,
    pub labour_total: f64,
    pub total: f64,
}

async fn cost_report(State(state): State<AppState>) -> Result<Json<CostReport>> {
    let projects = sqlx::query_as::<_, Project>("SELECT * FROM projects ORDER BY name ASC")
        .fetch_all(&state.db.pool)
        .await?;

    let mut rows = Vec::with_capacity(projects.len());
    for project in projects {
        let current = phase::clamp_current_phase(project.current_phase);
        rows.push(ProjectCostReport {
            costs: cost_summary(&state.db.pool, &project.id).await?,
            project_id: project.id,
            name: project.name,
            current_phase: current,
            progress: phase::progress_percent(current),
        });
    }

    let materials_total: f64 = rows.iter().map(|r| r.costs.materials_total).sum();
    let labour_total: f64 = rows.iter().map(|r| r.costs.labour_total).sum();

    Ok(Json(CostReport {
        projects: rows,
        materials_total: cost::round_amount(materials_total),
        labour_total: cost::round_amount(labour_total),
        total: cost::round_amount(materials_total + labour_total),
    }))
}
