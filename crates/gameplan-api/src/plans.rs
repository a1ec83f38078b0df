use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use uuid::Uuid;

use gameplan_db::models::PlanRow;
use gameplan_types::api::{PlanCreate, PlanResponse, PlanUpdate};

use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::{fmt_ts, parse_id, parse_ts, AppState};

const RECENT_LIMIT: u32 = 5;

pub async fn create_plan(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<PlanCreate>,
) -> Result<impl IntoResponse, ApiError> {
    if req.title.trim().is_empty() {
        return Err(ApiError::Validation("Title must not be empty".to_string()));
    }

    let now = fmt_ts(Utc::now());
    let plan = PlanRow {
        id: Uuid::new_v4().to_string(),
        user_id: user.id,
        title: req.title,
        description: req.description,
        start_date: Some(fmt_ts(req.start_date)),
        end_date: Some(fmt_ts(req.end_date)),
        created_at: now.clone(),
        updated_at: now,
    };
    state.db.create_plan(&plan)?;

    Ok((StatusCode::CREATED, Json(plan_response(&plan))))
}

pub async fn list_plans(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let plans = state.db.list_plans(&user.id, None)?;
    Ok(Json(plans.iter().map(plan_response).collect::<Vec<_>>()))
}

pub async fn recent_plans(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let plans = state.db.list_plans(&user.id, Some(RECENT_LIMIT))?;
    Ok(Json(plans.iter().map(plan_response).collect::<Vec<_>>()))
}

pub async fn last_plan(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let plan = state
        .db
        .list_plans(&user.id, Some(1))?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::NotFound("No plans found".to_string()))?;
    Ok(Json(plan_response(&plan)))
}

pub async fn update_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<Uuid>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<PlanUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let mut plan = state
        .db
        .get_plan(&user.id, &plan_id.to_string())?
        .ok_or_else(|| ApiError::NotFound("Plan not found".to_string()))?;

    if let Some(title) = req.title {
        plan.title = title;
    }
    if let Some(description) = req.description {
        plan.description = Some(description);
    }
    if let Some(start_date) = req.start_date {
        plan.start_date = Some(fmt_ts(start_date));
    }
    if let Some(end_date) = req.end_date {
        plan.end_date = Some(fmt_ts(end_date));
    }
    plan.updated_at = fmt_ts(Utc::now());

    if !state.db.update_plan(&plan)? {
        return Err(ApiError::NotFound("Plan not found".to_string()));
    }

    Ok(Json(plan_response(&plan)))
}

pub async fn delete_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<Uuid>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.db.delete_plan(&user.id, &plan_id.to_string())? {
        return Err(ApiError::NotFound("Plan not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

fn plan_response(plan: &PlanRow) -> PlanResponse {
    PlanResponse {
        id: parse_id(&plan.id),
        user_id: parse_id(&plan.user_id),
        title: plan.title.clone(),
        description: plan.description.clone(),
        start_date: plan.start_date.as_deref().map(parse_ts),
        end_date: plan.end_date.as_deref().map(parse_ts),
        created_at: parse_ts(&plan.created_at),
        updated_at: parse_ts(&plan.updated_at),
    }
}
