use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use uuid::Uuid;

use gameplan_db::models::ClassRow;
use gameplan_db::Database;
use gameplan_types::api::{ClassCreate, ClassResponse, ClassUpdate};

use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::{fmt_ts, parse_id, parse_ts, AppState};

pub async fn create_class(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<ClassCreate>,
) -> Result<impl IntoResponse, ApiError> {
    if req.title.trim().is_empty() {
        return Err(ApiError::Validation("Title must not be empty".to_string()));
    }

    let plan_ids = req.plan_ids.unwrap_or_default();
    ensure_plans_owned(&state.db, &user.id, &plan_ids)?;

    let now = fmt_ts(Utc::now());
    let class = ClassRow {
        id: Uuid::new_v4().to_string(),
        user_id: user.id,
        title: req.title,
        description: req.description,
        schedule_info: req.schedule_info,
        created_at: now.clone(),
        updated_at: now,
    };
    state.db.create_class(&class)?;

    for plan_id in &plan_ids {
        state.db.add_class_plan(&class.id, &plan_id.to_string())?;
    }

    let response = class_response(&state.db, &class)?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn list_classes(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let classes = state.db.list_classes(&user.id)?;
    let mut responses = Vec::with_capacity(classes.len());
    for class in &classes {
        responses.push(class_response(&state.db, class)?);
    }
    Ok(Json(responses))
}

pub async fn get_class(
    State(state): State<AppState>,
    Path(class_id): Path<Uuid>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let class = state
        .db
        .get_class(&user.id, &class_id.to_string())?
        .ok_or_else(|| ApiError::NotFound("Class not found".to_string()))?;
    Ok(Json(class_response(&state.db, &class)?))
}

pub async fn update_class(
    State(state): State<AppState>,
    Path(class_id): Path<Uuid>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<ClassUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let mut class = state
        .db
        .get_class(&user.id, &class_id.to_string())?
        .ok_or_else(|| ApiError::NotFound("Class not found".to_string()))?;

    if let Some(title) = req.title {
        class.title = title;
    }
    if let Some(description) = req.description {
        class.description = Some(description);
    }
    if let Some(schedule_info) = req.schedule_info {
        class.schedule_info = Some(schedule_info);
    }
    class.updated_at = fmt_ts(Utc::now());

    if !state.db.update_class(&class)? {
        return Err(ApiError::NotFound("Class not found".to_string()));
    }

    // A provided list replaces the association set wholesale.
    if let Some(plan_ids) = req.plan_ids {
        ensure_plans_owned(&state.db, &class.user_id, &plan_ids)?;
        let ids: Vec<String> = plan_ids.iter().map(|id| id.to_string()).collect();
        state.db.set_class_plans(&class.id, &ids)?;
    }

    Ok(Json(class_response(&state.db, &class)?))
}

pub async fn delete_class(
    State(state): State<AppState>,
    Path(class_id): Path<Uuid>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.db.delete_class(&user.id, &class_id.to_string())? {
        return Err(ApiError::NotFound("Class not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

// -- Plan associations --

pub async fn add_plan(
    State(state): State<AppState>,
    Path((class_id, plan_id)): Path<(Uuid, Uuid)>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let class = state
        .db
        .get_class(&user.id, &class_id.to_string())?
        .ok_or_else(|| ApiError::NotFound("Class not found".to_string()))?;

    if state.db.get_plan(&user.id, &plan_id.to_string())?.is_none() {
        return Err(ApiError::NotFound("Plan not found".to_string()));
    }

    state.db.add_class_plan(&class.id, &plan_id.to_string())?;
    Ok(Json(class_response(&state.db, &class)?))
}

pub async fn remove_plan(
    State(state): State<AppState>,
    Path((class_id, plan_id)): Path<(Uuid, Uuid)>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let class = state
        .db
        .get_class(&user.id, &class_id.to_string())?
        .ok_or_else(|| ApiError::NotFound("Class not found".to_string()))?;

    if !state.db.remove_class_plan(&class.id, &plan_id.to_string())? {
        return Err(ApiError::NotFound(
            "Plan not associated with class".to_string(),
        ));
    }

    Ok(Json(class_response(&state.db, &class)?))
}

fn ensure_plans_owned(db: &Database, user_id: &str, plan_ids: &[Uuid]) -> Result<(), ApiError> {
    for plan_id in plan_ids {
        if db.get_plan(user_id, &plan_id.to_string())?.is_none() {
            return Err(ApiError::NotFound("Plan not found".to_string()));
        }
    }
    Ok(())
}

fn class_response(db: &Database, class: &ClassRow) -> Result<ClassResponse, ApiError> {
    let plan_ids = db
        .class_plan_ids(&class.id)?
        .iter()
        .map(|id| parse_id(id))
        .collect();

    Ok(ClassResponse {
        id: parse_id(&class.id),
        user_id: parse_id(&class.user_id),
        title: class.title.clone(),
        description: class.description.clone(),
        schedule_info: class.schedule_info.clone(),
        plan_ids,
        created_at: parse_ts(&class.created_at),
        updated_at: parse_ts(&class.updated_at),
    })
}
